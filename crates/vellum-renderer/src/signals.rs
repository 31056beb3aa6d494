//! The signal bus.
//!
//! A single-threaded publish/subscribe store of named variable values.
//! Broadcasts merge into current state immediately (last-write-wins per
//! key) and enqueue one delivery task; the renderer drains the queue in
//! FIFO order, so a `receive_batch` handler that broadcasts again gets
//! deterministic ordering instead of incidental call-stack ordering.

use serde_json::Value;
use smol_str::SmolStr;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// A signal value plus the flag distinguishing tabular payloads from
/// scalars, which governs downstream type handling.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalValue {
    pub value: Value,
    pub is_data: bool,
}

impl SignalValue {
    pub fn scalar(value: Value) -> Self {
        Self {
            value,
            is_data: false,
        }
    }

    pub fn data(value: Value) -> Self {
        Self {
            value,
            is_data: true,
        }
    }
}

/// Atomic set of signal updates: all keys apply together in one
/// dispatch cycle.
pub type Batch = BTreeMap<SmolStr, SignalValue>;

/// One initial value contributed by an instance at hydration time.
#[derive(Debug, Clone)]
pub struct InitialSignal {
    pub variable_id: SmolStr,
    pub value: Value,
    pub is_data: bool,
    /// When two instances initialize the same variable, the higher
    /// priority wins; ties go to the first registered.
    pub priority: i32,
}

/// A queued delivery: the originating instance id plus the batch.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub origin: SmolStr,
    pub batch: Batch,
}

#[derive(Debug, Default)]
pub struct SignalBus {
    state: BTreeMap<SmolStr, SignalValue>,
    queue: VecDeque<Delivery>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `batch` into current state and enqueue a delivery task.
    /// Safe to call re-entrantly from a delivery handler.
    pub fn broadcast(&mut self, origin: impl Into<SmolStr>, batch: Batch) {
        if batch.is_empty() {
            return;
        }
        for (id, value) in &batch {
            self.state.insert(id.clone(), value.clone());
        }
        self.queue.push_back(Delivery {
            origin: origin.into(),
            batch,
        });
    }

    /// Resolve initial values across instances. Registration order of
    /// the outer slice is instance registration order, which breaks
    /// priority ties.
    pub fn register_initial_signals(&mut self, contributions: &[Vec<InitialSignal>]) {
        let mut winners: HashMap<SmolStr, i32> = HashMap::new();
        for signals in contributions {
            for signal in signals {
                let current = winners.get(&signal.variable_id);
                if current.is_some_and(|&prio| prio >= signal.priority) {
                    continue;
                }
                winners.insert(signal.variable_id.clone(), signal.priority);
                self.state.insert(
                    signal.variable_id.clone(),
                    SignalValue {
                        value: signal.value.clone(),
                        is_data: signal.is_data,
                    },
                );
            }
        }
    }

    /// Next queued delivery, FIFO.
    pub fn take_next(&mut self) -> Option<Delivery> {
        self.queue.pop_front()
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn value_of(&self, id: &str) -> Option<&SignalValue> {
        self.state.get(id)
    }

    pub fn state(&self) -> &BTreeMap<SmolStr, SignalValue> {
        &self.state
    }

    /// Snapshot of current state as one batch (used for the initial
    /// delivery after hydration).
    pub fn snapshot(&self) -> Batch {
        self.state.clone()
    }

    pub fn clear(&mut self) {
        self.state.clear();
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn init(id: &str, value: Value, priority: i32) -> InitialSignal {
        InitialSignal {
            variable_id: id.into(),
            value,
            is_data: false,
            priority,
        }
    }

    #[test]
    fn higher_priority_wins_regardless_of_registration_order() {
        let mut bus = SignalBus::new();
        bus.register_initial_signals(&[
            vec![init("x", json!(1), 1)],
            vec![init("x", json!(5), 5)],
        ]);
        assert_eq!(bus.value_of("x").unwrap().value, json!(5));

        let mut bus = SignalBus::new();
        bus.register_initial_signals(&[
            vec![init("x", json!(5), 5)],
            vec![init("x", json!(1), 1)],
        ]);
        assert_eq!(bus.value_of("x").unwrap().value, json!(5));
    }

    #[test]
    fn priority_ties_go_to_first_registered() {
        let mut bus = SignalBus::new();
        bus.register_initial_signals(&[
            vec![init("x", json!("first"), 1)],
            vec![init("x", json!("second"), 1)],
        ]);
        assert_eq!(bus.value_of("x").unwrap().value, json!("first"));
    }

    #[test]
    fn broadcast_is_last_write_wins_and_fifo() {
        let mut bus = SignalBus::new();
        let mut batch = Batch::new();
        batch.insert("x".into(), SignalValue::scalar(json!(1)));
        bus.broadcast("a", batch);

        let mut batch = Batch::new();
        batch.insert("x".into(), SignalValue::scalar(json!(2)));
        bus.broadcast("b", batch);

        assert_eq!(bus.value_of("x").unwrap().value, json!(2));
        assert_eq!(bus.take_next().unwrap().origin, "a");
        assert_eq!(bus.take_next().unwrap().origin, "b");
        assert!(bus.take_next().is_none());
    }
}
