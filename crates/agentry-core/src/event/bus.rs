//! Broadcast bus for `ProcessEvent`s.
//!
//! The orchestrator reports through the typed `publish_*` methods; consumers
//! either take the raw broadcast receiver or [`ProcessWatch`] one process.
//! Publishing with no subscribers is a no-op.

use agentry_types::error::CallbackError;
use agentry_types::event::ProcessEvent;
use agentry_types::process::{ProcessId, ProcessTransition};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ProcessEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProcessEvent> {
        self.sender.subscribe()
    }

    /// Receive events for one process only.
    pub fn watch(&self, process_id: ProcessId) -> ProcessWatch {
        ProcessWatch {
            process_id,
            receiver: self.sender.subscribe(),
        }
    }

    pub fn publish_transition(&self, transition: &ProcessTransition, action: &str) {
        self.publish(ProcessEvent::Transitioned {
            process_id: transition.process_id,
            agent: transition.agent.clone(),
            action: action.to_string(),
            state: transition.state.clone(),
            at: transition.updated_at,
        });
    }

    pub fn publish_accepted(&self, process_id: ProcessId, agent: &str, action: &str) {
        self.publish(ProcessEvent::Accepted {
            process_id,
            agent: agent.to_string(),
            action: action.to_string(),
        });
    }

    /// Report how delivery of a process's final snapshot went.
    pub fn publish_callback(&self, process_id: ProcessId, url: &str, result: &Result<(), CallbackError>) {
        let url = url.to_string();
        self.publish(match result {
            Ok(()) => ProcessEvent::CallbackDelivered { process_id, url },
            Err(e) => ProcessEvent::CallbackFailed {
                process_id,
                url,
                error: e.to_string(),
            },
        });
    }

    fn publish(&self, event: ProcessEvent) {
        let _ = self.sender.send(event);
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

/// A subscription filtered to a single process.
pub struct ProcessWatch {
    process_id: ProcessId,
    receiver: broadcast::Receiver<ProcessEvent>,
}

impl ProcessWatch {
    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    /// The next event for the watched process, or `None` once the bus is gone.
    ///
    /// Events dropped because this watcher lagged behind are skipped.
    pub async fn next(&mut self) -> Option<ProcessEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.process_id() == self.process_id => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(process_id = %self.process_id, skipped, "process watch lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Wait until the process commits a transition into `state`.
    pub async fn until_state(&mut self, state: &str) -> Option<ProcessEvent> {
        while let Some(event) = self.next().await {
            if matches!(&event, ProcessEvent::Transitioned { state: s, .. } if s == state) {
                return Some(event);
            }
        }
        None
    }
}
