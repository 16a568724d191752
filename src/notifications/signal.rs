use std::sync::Arc;
use tokio::sync::Notify;

/// One-shot wakeup for a session with undelivered changes. Firing before
/// anyone waits leaves a permit, so the next wait returns at once.
#[derive(Debug, Clone, Default)]
pub struct WakeSignal {
    notify: Arc<Notify>,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        self.notify.notify_one();
    }

    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::WakeSignal;
    use std::time::Duration;

    #[tokio::test]
    async fn fire_before_wait_is_not_lost() {
        let signal = WakeSignal::new();
        signal.fire();
        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .expect("permit stored");
    }

    #[tokio::test]
    async fn unfired_signal_keeps_waiting() {
        let signal = WakeSignal::new();
        let waited = tokio::time::timeout(Duration::from_millis(20), signal.wait()).await;
        assert!(waited.is_err());
    }
}
