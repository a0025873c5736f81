//! Window visibility gate
//!
//! The host reports foreground/background changes through a
//! [`VisibilityNotifier`]; everything else holds a read-only
//! [`VisibilityGate`]. Background polling is skipped while the window is
//! hidden.

use tokio::sync::watch;

/// Read side of the visibility cell
#[derive(Debug, Clone)]
pub struct VisibilityGate {
    rx: watch::Receiver<bool>,
}

/// Write side of the visibility cell, owned by the host notification handler
#[derive(Debug)]
pub struct VisibilityNotifier {
    tx: watch::Sender<bool>,
}

/// Create a visibility cell starting at `visible`
pub fn visibility_channel(visible: bool) -> (VisibilityNotifier, VisibilityGate) {
    let (tx, rx) = watch::channel(visible);
    (VisibilityNotifier { tx }, VisibilityGate { rx })
}

impl VisibilityGate {
    /// A gate that is visible forever (no host notifications)
    pub fn always_visible() -> Self {
        visibility_channel(true).1
    }

    pub fn is_visible(&self) -> bool {
        *self.rx.borrow()
    }

    /// Receiver woken on every visibility change
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }
}

impl VisibilityNotifier {
    /// Record a host visibility notification
    ///
    /// Returns `true` when the value changed. Repeated notifications with the
    /// same value do not wake listeners.
    pub fn set_visible(&self, visible: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == visible {
                false
            } else {
                *current = visible;
                true
            }
        });
        if changed {
            tracing::debug!(
                "Window is now {}",
                if visible { "visible" } else { "hidden" }
            );
        }
        changed
    }

    pub fn is_visible(&self) -> bool {
        *self.tx.borrow()
    }

    /// Another read-only gate on the same cell
    pub fn gate(&self) -> VisibilityGate {
        VisibilityGate {
            rx: self.tx.subscribe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_follow_notifications() {
        let (notifier, gate) = visibility_channel(true);
        assert!(gate.is_visible());

        assert!(notifier.set_visible(false));
        assert!(!gate.is_visible());
        assert!(!notifier.gate().is_visible());

        assert!(!notifier.set_visible(false));
        assert!(notifier.set_visible(true));
        assert!(gate.is_visible());
    }

    #[tokio::test]
    async fn test_watchers_only_wake_on_change() {
        let (notifier, gate) = visibility_channel(true);
        let mut rx = gate.watch();
        let _ = *rx.borrow_and_update();

        notifier.set_visible(true);
        assert!(!rx.has_changed().unwrap());

        notifier.set_visible(false);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());
    }

    #[test]
    fn test_always_visible() {
        assert!(VisibilityGate::always_visible().is_visible());
    }
}
