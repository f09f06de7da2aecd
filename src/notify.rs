use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{CoachId, Event};

const CHANNEL_CAPACITY: usize = 256;

/// In-process broadcast hub for schedule changes, one channel per coach.
/// An embedding layer subscribes to refresh calendars; nothing here delivers
/// notifications to end users.
pub struct ScheduleFeed {
    channels: DashMap<CoachId, broadcast::Sender<Event>>,
}

impl Default for ScheduleFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleFeed {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to schedule changes for a coach. Creates the channel if needed.
    pub fn subscribe(&self, coach_id: CoachId) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(coach_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish an applied event. No-op if nobody is listening.
    pub fn send(&self, coach_id: CoachId, event: &Event) {
        if let Some(sender) = self.channels.get(&coach_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop a coach's channel.
    pub fn remove(&self, coach_id: &CoachId) {
        self.channels.remove(coach_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Status;
    use ulid::Ulid;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let feed = ScheduleFeed::new();
        let coach = Ulid::new();
        let mut rx = feed.subscribe(coach);

        let event = Event::StatusChanged {
            id: Ulid::new(),
            coach_id: coach,
            status: Status::Confirmed,
        };
        feed.send(coach, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let feed = ScheduleFeed::new();
        let coach = Ulid::new();
        // No subscriber — should not panic
        feed.send(
            coach,
            &Event::SlotRemoved {
                id: Ulid::new(),
                coach_id: coach,
            },
        );
    }
}
