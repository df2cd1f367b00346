use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Per-location broadcast of committed events, backing LISTEN/NOTIFY.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a location's events, creating its channel on first use.
    pub fn subscribe(&self, location_id: Ulid) -> broadcast::Receiver<Event> {
        self.channels
            .entry(location_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish to current subscribers. No-op when nobody listens.
    pub fn send(&self, location_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&location_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop channels whose subscribers have all gone away.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cancelled(location_id: Ulid) -> Event {
        Event::BookingCancelled {
            id: Ulid::new(),
            location_id,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_its_location_only() {
        let hub = NotifyHub::new();
        let here = Ulid::new();
        let elsewhere = Ulid::new();
        let mut rx = hub.subscribe(here);

        hub.send(elsewhere, &cancelled(elsewhere));
        let event = cancelled(here);
        hub.send(here, &event);

        assert_eq!(rx.recv().await.unwrap(), event);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let id = Ulid::new();
        hub.send(id, &cancelled(id));
        assert_eq!(hub.channel_count(), 0);
    }

    #[test]
    fn prune_drops_abandoned_channels() {
        let hub = NotifyHub::new();
        let kept = Ulid::new();
        let _rx = hub.subscribe(kept);
        drop(hub.subscribe(Ulid::new()));
        assert_eq!(hub.channel_count(), 2);

        hub.prune();
        assert_eq!(hub.channel_count(), 1);
    }
}
