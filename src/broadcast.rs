use std::sync::Arc;
use tokio::sync::broadcast;

use crate::telemetry::UpdatePayload;

const CHANNEL_CAPACITY: usize = 16;

/// Fan-out of per-tick updates. Emitting with no subscribers is not an
/// error; subscribers that fall behind skip to the newest snapshots.
#[derive(Clone)]
pub struct BroadcastPort {
    sender: broadcast::Sender<Arc<UpdatePayload>>,
}

impl BroadcastPort {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<UpdatePayload>> {
        self.sender.subscribe()
    }

    pub fn emit(&self, payload: Arc<UpdatePayload>) {
        match self.sender.send(payload) {
            Ok(receivers) => tracing::trace!(receivers, "update emitted"),
            Err(_) => tracing::trace!("update emitted with no subscribers"),
        }
    }
}

impl Default for BroadcastPort {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;

    fn payload(timestamp: i64) -> Arc<UpdatePayload> {
        Arc::new(UpdatePayload {
            speed_bytes_per_sec: 0,
            download_speed_bytes_per_sec: 0,
            upload_speed_bytes_per_sec: 0,
            daily: Arc::new(Ledger::new()),
            timestamp,
        })
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let port = BroadcastPort::new();
        port.emit(payload(1));
    }

    #[tokio::test]
    async fn every_subscriber_gets_the_update() {
        let port = BroadcastPort::new();
        let mut a = port.subscribe();
        let mut b = port.subscribe();
        port.emit(payload(7));
        assert_eq!(a.recv().await.expect("a").timestamp, 7);
        assert_eq!(b.recv().await.expect("b").timestamp, 7);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_ahead() {
        let port = BroadcastPort::new();
        let mut slow = port.subscribe();
        for ts in 0..(CHANNEL_CAPACITY as i64 + 4) {
            port.emit(payload(ts));
        }
        assert!(matches!(
            slow.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        assert_eq!(slow.recv().await.expect("next").timestamp, 4);
    }
}
