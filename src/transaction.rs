//! Drives one write action through Idle → Pending → Succeeded | Failed,
//! keeping a single notification in step with it and invalidating the cached
//! values the write could have changed.

use crate::{
    cache::RemoteValueCache,
    catalog::{
        self,
        ActionName,
        Payload,
    },
    derived::{
        DerivedInputs,
        DerivedState,
        derive,
    },
    errors::{
        RejectedAction,
        RemoteReadError,
        RemoteWriteError,
    },
    notification::{
        NotificationRef,
        NotificationSink,
        Outcome,
    },
    remote::{
        Address,
        RemoteKey,
        RemoteReader,
        RemoteWriter,
    },
};
use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Mutex,
        MutexGuard,
        PoisonError,
    },
};
use tracing::{
    error,
    info,
    warn,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TransactionId(u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransactionStatus {
    Idle,
    Pending,
    Succeeded,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionStatus::Succeeded | TransactionStatus::Failed)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transaction {
    pub id: TransactionId,
    pub action: ActionName,
    pub status: TransactionStatus,
    pub notification: Option<NotificationRef>,
    pub error: Option<RemoteWriteError>,
}

impl Transaction {
    fn new(id: TransactionId, action: ActionName) -> Self {
        Self {
            id,
            action,
            status: TransactionStatus::Idle,
            notification: None,
            error: None,
        }
    }

    /// Idle → Pending. Returns false for any other starting state.
    fn begin(&mut self, notification: NotificationRef) -> bool {
        if self.status != TransactionStatus::Idle {
            return false;
        }
        self.status = TransactionStatus::Pending;
        self.notification = Some(notification);
        true
    }

    /// Pending → Succeeded | Failed. Terminal states are never left.
    fn settle(&mut self, result: Result<(), RemoteWriteError>) -> bool {
        if self.status != TransactionStatus::Pending {
            return false;
        }
        match result {
            Ok(()) => self.status = TransactionStatus::Succeeded,
            Err(err) => {
                self.status = TransactionStatus::Failed;
                self.error = Some(err);
            }
        }
        true
    }
}

/// Terminal result of one `execute` call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Settlement {
    pub id: TransactionId,
    pub action: ActionName,
    pub status: TransactionStatus,
    pub error: Option<RemoteWriteError>,
    /// Refresh failure after a successful write; the affected keys stay stale.
    pub refresh_error: Option<RemoteReadError>,
}

#[derive(Debug, Default)]
struct Ledger {
    next_id: u64,
    transactions: BTreeMap<TransactionId, Transaction>,
}

pub struct TransactionController<R, W, S> {
    reader: R,
    writer: W,
    sink: S,
    cache: RemoteValueCache,
    caller: Option<Address>,
    ledger: Mutex<Ledger>,
}

impl<R, W, S> TransactionController<R, W, S>
where
    R: RemoteReader,
    W: RemoteWriter,
    S: NotificationSink,
{
    pub fn new(
        reader: R,
        writer: W,
        sink: S,
        cache: RemoteValueCache,
        caller: Option<Address>,
    ) -> Self {
        Self {
            reader,
            writer,
            sink,
            cache,
            caller,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cache(&self) -> &RemoteValueCache {
        &self.cache
    }

    pub fn caller(&self) -> Option<Address> {
        self.caller
    }

    /// Runs `action` once. Local rejections return `Err` without creating a
    /// notification or touching the remote service; remote failures settle as
    /// `Failed` and are returned as `Ok`.
    pub async fn execute(
        &self,
        action: ActionName,
        payload: Payload,
    ) -> Result<Settlement, RejectedAction> {
        let request = catalog::shape(action, payload, &self.cache.snapshot(), self.caller)?;

        let id = {
            let mut ledger = self.ledger();
            ledger.next_id += 1;
            let id = TransactionId(ledger.next_id);
            let mut transaction = Transaction::new(id, action);
            // the notification exists before the write is issued
            let notification = self.sink.create_pending(action.pending_message());
            transaction.begin(notification);
            ledger.transactions.insert(id, transaction);
            id
        };
        info!(%id, %action, "transaction pending");

        // let the pending notification render before anything can resolve it
        tokio::task::yield_now().await;

        let result = self
            .writer
            .invoke(request.method, request.args)
            .await
            .map(|receipt| {
                info!(%id, %action, tx_hash = ?receipt.tx_hash, "remote call accepted");
            });

        let (status, error, notification) = {
            let mut ledger = self.ledger();
            match ledger.transactions.get_mut(&id) {
                Some(transaction) => {
                    if !transaction.settle(result.clone()) {
                        warn!(%id, status = ?transaction.status, "transaction already settled");
                    }
                    (
                        transaction.status,
                        transaction.error.clone(),
                        transaction.notification,
                    )
                }
                None => {
                    // only reachable if the entry was discarded while pending
                    warn!(%id, "transaction missing from ledger at settlement");
                    let status = if result.is_ok() {
                        TransactionStatus::Succeeded
                    } else {
                        TransactionStatus::Failed
                    };
                    (status, result.clone().err(), None)
                }
            }
        };

        let mut refresh_error = None;
        match &error {
            None => {
                if let Some(notification) = notification {
                    self.sink.resolve(
                        notification,
                        Outcome::Success,
                        action.success_message(),
                    );
                }
                info!(%id, %action, "transaction succeeded");
                self.cache.mark_stale(request.affected);
                if let Err(err) = self.refresh(request.affected).await {
                    warn!(%id, %action, error = %err, "refresh after settlement failed");
                    refresh_error = Some(err);
                }
            }
            Some(err) => {
                if let Some(notification) = notification {
                    self.sink.resolve(
                        notification,
                        Outcome::Failure,
                        action.failure_message(),
                    );
                }
                error!(%id, %action, reason = %err.reason, "transaction failed");
            }
        }

        Ok(Settlement {
            id,
            action,
            status,
            error,
            refresh_error,
        })
    }

    /// Re-reads `keys` into the shared cache.
    pub async fn refresh(&self, keys: &[RemoteKey]) -> Result<(), RemoteReadError> {
        self.cache
            .refresh(&self.reader, keys, self.caller.as_ref())
            .await
    }

    pub async fn refresh_all(&self) -> Result<(), RemoteReadError> {
        self.refresh(&RemoteKey::ALL).await
    }

    pub fn status(&self, id: TransactionId) -> Option<TransactionStatus> {
        self.ledger()
            .transactions
            .get(&id)
            .map(|transaction| transaction.status)
    }

    pub fn transaction(&self, id: TransactionId) -> Option<Transaction> {
        self.ledger().transactions.get(&id).cloned()
    }

    /// All tracked transactions in issue order.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.ledger().transactions.values().cloned().collect()
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.ledger()
            .transactions
            .values()
            .filter(|transaction| transaction.status == TransactionStatus::Pending)
            .cloned()
            .collect()
    }

    pub fn is_pending(&self, action: ActionName) -> bool {
        self.ledger().transactions.values().any(|transaction| {
            transaction.action == action
                && transaction.status == TransactionStatus::Pending
        })
    }

    /// Forgets a settled transaction once the UI has shown its outcome.
    /// Pending transactions are kept.
    pub fn acknowledge(&self, id: TransactionId) -> Option<Transaction> {
        let mut ledger = self.ledger();
        let settled = ledger
            .transactions
            .get(&id)
            .is_some_and(|transaction| transaction.status.is_terminal());
        if settled {
            ledger.transactions.remove(&id)
        } else {
            None
        }
    }

    pub fn derived_state(&self, selected_quantity: u32) -> DerivedState {
        derive(
            &self.cache.snapshot(),
            &DerivedInputs {
                selected_quantity,
                caller: self.caller,
                now: chrono::Utc::now(),
            },
        )
    }
}
