use std::fmt;

use scrutin_contracts::StatusObserver;
use scrutin_model::RunState;
use tokio::sync::broadcast;

use super::events::{RunEvent, RunEventPublisher};

/// Lightweight in-process event bus that fans out run notifications to
/// observers inside the host. Publishing never blocks; with no subscriber the
/// event is dropped, and lagging subscribers lose the oldest events.
pub struct InProcRunEventBus {
    sender: broadcast::Sender<RunEvent>,
    channel_capacity: usize,
}

impl fmt::Debug for InProcRunEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcRunEventBus")
            .field("channel_capacity", &self.channel_capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl InProcRunEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            channel_capacity: capacity,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }
}

impl RunEventPublisher for InProcRunEventBus {
    fn publish(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }
}

impl StatusObserver for InProcRunEventBus {
    fn on_status_changed(&self, state: RunState) {
        self.publish(RunEvent::StatusChanged { state });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrutin_model::RunId;

    #[tokio::test]
    async fn status_changes_reach_subscribers() {
        let bus = InProcRunEventBus::new(8);
        let mut rx = bus.subscribe();
        let owner = RunId::new();

        bus.on_status_changed(RunState::Running { owner });
        bus.on_status_changed(RunState::Stopped);

        assert_eq!(
            rx.recv().await.unwrap(),
            RunEvent::StatusChanged {
                state: RunState::Running { owner }
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            RunEvent::StatusChanged {
                state: RunState::Stopped
            }
        );
    }

    #[test]
    fn publishing_without_subscribers_is_silent() {
        let bus = InProcRunEventBus::new(1);
        bus.publish(RunEvent::StatusChanged {
            state: RunState::Stopped,
        });
    }
}
