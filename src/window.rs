//! Window position persistence
//!
//! Drag notifications arrive many times per second; [`PositionTracker`]
//! writes only the position the window settles on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::sync::Debouncer;
use crate::types::WindowPosition;

/// Destination of persisted window positions
#[async_trait]
pub trait PositionSink: Send + Sync {
    async fn persist_position(&self, position: WindowPosition) -> Result<()>;
}

/// Debounced writer of window positions
pub struct PositionTracker {
    debouncer: Debouncer<WindowPosition>,
}

impl PositionTracker {
    pub fn new(sink: Arc<dyn PositionSink>, delay: Duration) -> Self {
        let debouncer = Debouncer::new("window position write", delay, move |position: WindowPosition| {
            let sink = sink.clone();
            async move {
                sink.persist_position(position).await?;
                tracing::debug!("Window position saved: ({}, {})", position.x, position.y);
                Ok(())
            }
        });
        Self { debouncer }
    }

    /// Record a move notification. Dropped when called outside a tokio runtime.
    pub fn on_moved(&self, x: i32, y: i32) {
        self.debouncer.schedule(WindowPosition::new(x, y));
    }

    /// Whether a write is waiting for the window to settle
    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Drop the pending write
    pub fn cancel(&self) {
        self.debouncer.cancel_pending();
    }
}
