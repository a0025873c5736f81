use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use micept::sync::{changed_groups, VisibilityGate};
use micept::{EngineConfig, LocalSource, Phase, Profile, Snapshot, SyncEngine, Update};

fn in_game() -> Snapshot {
    Snapshot {
        connected: true,
        phase: Phase::InProgress,
        automation_enabled: true,
        profile: Some(Profile::new("Tester#EUW", 187, 4_862).with_xp(1_204, 1_796)),
    }
}

fn bench_change_detection(c: &mut Criterion) {
    let a = in_game();
    let mut b = in_game();
    b.profile = Some(Profile::new("Tester#EUW", 187, 4_862).with_xp(1_384, 1_616));

    let mut group = c.benchmark_group("change_detection");
    group.bench_function("equal", |bench| {
        bench.iter(|| changed_groups(black_box(&a), black_box(&a)))
    });
    group.bench_function("profile_changed", |bench| {
        bench.iter(|| changed_groups(black_box(&a), black_box(&b)))
    });
    group.finish();
}

fn bench_apply(c: &mut Criterion) {
    let source = Arc::new(LocalSource::new(in_game()));
    let engine = SyncEngine::new(
        source,
        VisibilityGate::always_visible(),
        EngineConfig::default(),
    );
    engine.apply(Update::Full(in_game()));

    let mut group = c.benchmark_group("apply");
    group.bench_function("suppressed_full", |bench| {
        bench.iter(|| engine.apply(black_box(Update::Full(in_game()))))
    });

    let mut flip = false;
    group.bench_function("phase_toggle", |bench| {
        bench.iter(|| {
            flip = !flip;
            let phase = if flip { Phase::Lobby } else { Phase::Matchmaking };
            engine.apply(black_box(Update::Phase(phase)))
        })
    });
    group.finish();
}

criterion_group!(benches, bench_change_detection, bench_apply);
criterion_main!(benches);
