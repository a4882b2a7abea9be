//! Scriptable stand-ins for the remote service and the notification sink.

use crate::{
    errors::RemoteWriteError,
    notification::{
        NotificationRef,
        NotificationSink,
        Outcome,
    },
    remote::{
        Address,
        RemoteData,
        RemoteKey,
        RemoteReader,
        RemoteWriter,
        WriteArgs,
        WriteReceipt,
    },
};
use std::{
    collections::{
        HashMap,
        HashSet,
        VecDeque,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};
use tokio::sync::watch;

/// Holds reads or writes until released. Dropping it releases as well.
pub struct Gate {
    tx: watch::Sender<bool>,
}

impl Gate {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, rx)
    }

    pub fn release(&self) {
        let _ = self.tx.send(true);
    }
}

async fn pass(gate: Option<watch::Receiver<bool>>) {
    if let Some(mut rx) = gate {
        let _ = rx.wait_for(|open| *open).await;
    }
}

#[derive(Debug, Default)]
struct RemoteState {
    values: HashMap<RemoteKey, RemoteData>,
    failing_reads: HashSet<RemoteKey>,
    reads: HashMap<RemoteKey, usize>,
    read_callers: Vec<(RemoteKey, Option<Address>)>,
    read_gate: Option<watch::Receiver<bool>>,
    write_gate: Option<watch::Receiver<bool>>,
    write_outcomes: VecDeque<Result<(), String>>,
    writes: Vec<(&'static str, WriteArgs)>,
    effects: HashMap<&'static str, Vec<(RemoteKey, Option<RemoteData>)>>,
}

/// In-memory remote service. Clones share state, so a test can keep a handle
/// while the controller owns another.
#[derive(Clone, Debug, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_value(&self, key: RemoteKey, value: RemoteData) {
        self.state().values.insert(key, value);
    }

    pub fn clear_value(&self, key: RemoteKey) {
        self.state().values.remove(&key);
    }

    pub fn fail_reads(&self, key: RemoteKey) {
        self.state().failing_reads.insert(key);
    }

    pub fn heal_reads(&self, key: RemoteKey) {
        self.state().failing_reads.remove(&key);
    }

    /// Applies `key = value` when a write to `method` is accepted.
    pub fn on_success(&self, method: &'static str, key: RemoteKey, value: Option<RemoteData>) {
        self.state()
            .effects
            .entry(method)
            .or_default()
            .push((key, value));
    }

    pub fn reject_next_write(&self, reason: impl Into<String>) {
        self.state().write_outcomes.push_back(Err(reason.into()));
    }

    pub fn hold_reads(&self) -> Gate {
        let (gate, rx) = Gate::new();
        self.state().read_gate = Some(rx);
        gate
    }

    pub fn hold_writes(&self) -> Gate {
        let (gate, rx) = Gate::new();
        self.state().write_gate = Some(rx);
        gate
    }

    pub fn read_count(&self, key: RemoteKey) -> usize {
        self.state().reads.get(&key).copied().unwrap_or_default()
    }

    pub fn total_reads(&self) -> usize {
        self.state().reads.values().sum()
    }

    pub fn read_callers(&self) -> Vec<(RemoteKey, Option<Address>)> {
        self.state().read_callers.clone()
    }

    pub fn writes(&self) -> Vec<(&'static str, WriteArgs)> {
        self.state().writes.clone()
    }
}

impl RemoteReader for FakeRemote {
    type Error = String;

    async fn read_value(
        &self,
        key: RemoteKey,
        caller: Option<&Address>,
    ) -> Result<Option<RemoteData>, Self::Error> {
        let gate = {
            let mut state = self.state();
            *state.reads.entry(key).or_default() += 1;
            state.read_callers.push((key, caller.copied()));
            state.read_gate.clone()
        };
        pass(gate).await;
        let state = self.state();
        if state.failing_reads.contains(&key) {
            return Err(format!("read of {key} failed"));
        }
        Ok(state.values.get(&key).cloned())
    }
}

impl RemoteWriter for FakeRemote {
    async fn invoke(
        &self,
        method: &'static str,
        args: WriteArgs,
    ) -> Result<WriteReceipt, RemoteWriteError> {
        let gate = {
            let mut state = self.state();
            state.writes.push((method, args));
            state.write_gate.clone()
        };
        pass(gate).await;
        let mut state = self.state();
        match state.write_outcomes.pop_front() {
            Some(Err(reason)) => Err(RemoteWriteError::new(reason)),
            Some(Ok(())) | None => {
                let effects = state.effects.get(method).cloned().unwrap_or_default();
                for (key, value) in effects {
                    match value {
                        Some(value) => state.values.insert(key, value),
                        None => state.values.remove(&key),
                    };
                }
                let tx_hash = format!("0x{:064x}", state.writes.len());
                Ok(WriteReceipt {
                    tx_hash: Some(tx_hash),
                })
            }
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RecordedNotification {
    Created {
        id: NotificationRef,
        message: String,
    },
    Resolved {
        id: NotificationRef,
        outcome: Outcome,
        message: String,
    },
}

/// Notification sink that records every call in order.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<RecordedNotification>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedNotification> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl NotificationSink for RecordingSink {
    fn create_pending(&self, message: &str) -> NotificationRef {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let id = NotificationRef::new(events.len() as u64 + 1);
        events.push(RecordedNotification::Created {
            id,
            message: message.to_string(),
        });
        id
    }

    fn resolve(&self, id: NotificationRef, outcome: Outcome, message: &str) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedNotification::Resolved {
                id,
                outcome,
                message: message.to_string(),
            });
    }
}
