//! Progress events for external observers.
//!
//! Delivery is advisory: each subscriber gets a bounded buffer, events that
//! do not fit are dropped for that subscriber, and a subscriber that has
//! gone away is removed. Nothing the optimizer does depends on whether an
//! event was received.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bo_types::{Observation, TerminationReason};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OptimizerEvent {
    Started {
        run_id: Uuid,
        seed: u64,
    },
    /// Emitted after each seeding batch (iteration 0) and each guided iteration.
    IterationComplete {
        iteration: usize,
        best_objective: Option<f64>,
        convergence_score: f64,
        batch: Vec<Observation>,
    },
    NewBest {
        iteration: usize,
        observation: Observation,
    },
    Converged {
        iteration: usize,
        score: f64,
    },
    Finished {
        reason: TerminationReason,
        best_objective: Option<f64>,
        evaluations: usize,
    },
}

/// Events buffered per subscriber before newer ones are dropped.
pub const EVENT_BUFFER: usize = 1024;

/// Fan-out of events to any number of subscribers.
#[derive(Debug)]
pub(crate) struct EventBus {
    capacity: usize,
    subscribers: Vec<Sender<OptimizerEvent>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(EVENT_BUFFER)
    }
}

impl EventBus {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self) -> Receiver<OptimizerEvent> {
        let (tx, rx) = bounded(self.capacity);
        self.subscribers.push(tx);
        rx
    }

    pub fn emit(&mut self, event: OptimizerEvent) {
        if self.subscribers.is_empty() {
            return;
        }
        self.subscribers
            .retain(|tx| match tx.try_send(event.clone()) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => false,
            });
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
