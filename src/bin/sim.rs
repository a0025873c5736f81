//! Micept sync simulator
//!
//! Runs the sync engine against a simulated game client and prints a run
//! summary on stdout.
//!
//! Run with: micept-sim --cycles 3

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use micept::error::Result;
use micept::sim::SimulatedClient;
use micept::sync::{visibility_channel, EngineEventType};
use micept::{
    EngineConfig, LocalSource, PositionTracker, PreferencesStore, Profile, SyncEngine,
    TriggerPolicy,
};

#[derive(Parser, Debug)]
#[command(name = "micept-sim")]
#[command(about = "Run the Micept sync engine against a simulated game client")]
struct Args {
    /// Background poll interval in ms
    #[arg(long, env = "MICEPT_POLL_INTERVAL_MS", default_value = "2000")]
    poll_interval_ms: u64,

    /// Time spent in each game flow phase in ms
    #[arg(long, env = "MICEPT_STEP_MS", default_value = "500")]
    step_ms: u64,

    /// Queue cycles to run (0 = until interrupted)
    #[arg(long, env = "MICEPT_CYCLES", default_value = "3")]
    cycles: u32,

    /// Leave ready checks to time out
    #[arg(long, env = "MICEPT_NO_AUTO_ACCEPT")]
    no_auto_accept: bool,

    /// Accept firing policy (guarded, every-observation)
    #[arg(long, env = "MICEPT_TRIGGER_POLICY", default_value = "guarded")]
    trigger_policy: TriggerPolicy,

    /// Preferences file (defaults to the platform config directory)
    #[arg(long, env = "MICEPT_CONFIG")]
    config: Option<String>,

    /// Log as JSON lines
    #[arg(long, env = "MICEPT_LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    // stderr only; stdout carries the run summary
    let fmt = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .boxed()
    };
    tracing_subscriber::registry()
        .with(fmt)
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let store = Arc::new(match &args.config {
        Some(path) => PreferencesStore::open(shellexpand::tilde(path).to_string()),
        None => PreferencesStore::open_default()?,
    });
    let prefs = store.get();
    tracing::info!("Preferences at {:?}: {:?}", store.path(), prefs);

    let config = EngineConfig {
        poll_interval_ms: args.poll_interval_ms,
        trigger_policy: args.trigger_policy,
        initial_automation: prefs.auto_accept && !args.no_auto_accept,
        ..EngineConfig::default()
    };

    let source = Arc::new(LocalSource::default());
    let (notifier, gate) = visibility_channel(prefs.window_visible);
    let engine = SyncEngine::new(source.clone(), gate, config);

    let settings = store
        .clone()
        .watch_settings(engine.subscribe(), notifier.gate());

    let mut events = engine.subscribe();
    let event_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match event.event_type {
                    EngineEventType::SnapshotChanged => {
                        tracing::info!(
                            "Snapshot changed ({:?}): {}",
                            event.changes,
                            json!(event.snapshot)
                        )
                    }
                    _ => tracing::info!("{:?}: {}", event.event_type, json!(event.data)),
                },
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Event log missed {} events", missed)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    engine.start().await;

    // The window settles back where it was left
    let tracker = PositionTracker::new(store.clone(), engine.config().position_debounce());
    let home = prefs.window_position;
    for offset in (0..=40).step_by(10) {
        tracker.on_moved(home.x + offset, home.y + offset);
    }
    tracker.on_moved(home.x, home.y);
    if notifier.set_visible(true) {
        tracing::info!("Window shown");
    }

    let client = SimulatedClient::new(source.clone(), Duration::from_millis(args.step_ms));
    let profile = Profile::new(
        Profile::riot_id(Some("Micept"), Some("SIM"), "Micept"),
        30,
        29,
    )
    .with_xp(420, 580);
    client.connect(profile).await;

    let report = tokio::select! {
        report = client.run(args.cycles) => Some(report),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
            None
        }
    };

    client.disconnect().await;
    tokio::time::sleep(engine.config().position_debounce()).await;
    engine.stop();
    event_log.abort();
    settings.abort();

    let summary = json!({
        "report": report,
        "stats": engine.stats(),
        "snapshot": engine.snapshot(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
