//! Single-slot bookkeeping for the session's in-flight transaction.
//!
//! At most one write may be outstanding per dialog session. The slot is
//! reserved before the chain ever sees the write and released only on a
//! terminal outcome, which is what serializes writes: a second request finds
//! the slot occupied and is refused without touching the chain.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::classify;
use crate::core::error::{ClassifiedError, StakingError, StakingResult};
use crate::core::traits::{ChainClient, TxStatus};
use crate::core::types::{PendingTransaction, TxId, TxKind};

/// Lifecycle notifications emitted on the channel binding.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    Submitted {
        kind: TxKind,
        tx: TxId,
    },
    Confirmed {
        kind: TxKind,
        tx: TxId,
    },
    Failed {
        kind: TxKind,
        tx: Option<TxId>,
        error: ClassifiedError,
    },
}

/// Terminal outcome of one tracked transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum TxOutcome {
    Confirmed {
        kind: TxKind,
        tx: TxId,
    },
    Failed {
        kind: TxKind,
        tx: Option<TxId>,
        error: ClassifiedError,
    },
}

/// Owns the `Option<PendingTransaction>` slot and the confirmation watch.
pub struct TransactionTracker {
    chain: Arc<dyn ChainClient>,
    slot: RwLock<Option<PendingTransaction>>,
    events: RwLock<Option<mpsc::UnboundedSender<TrackerEvent>>>,
}

impl TransactionTracker {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self {
            chain,
            slot: RwLock::new(None),
            events: RwLock::new(None),
        }
    }

    /// Channel binding for observers that do not await the request methods
    /// directly. Replaces any previous subscription.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<TrackerEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.events.write().await = Some(sender);
        receiver
    }

    pub async fn pending(&self) -> Option<PendingTransaction> {
        self.slot.read().await.clone()
    }

    pub async fn pending_kind(&self) -> Option<TxKind> {
        self.slot.read().await.as_ref().map(|pending| pending.kind)
    }

    pub async fn is_idle(&self) -> bool {
        self.slot.read().await.is_none()
    }

    /// Reserve the slot for `kind` before the write is submitted.
    ///
    /// Fails with [`StakingError::TransactionInFlight`] while any other write
    /// is outstanding; an occupied slot is never overwritten.
    pub async fn try_reserve(&self, kind: TxKind) -> StakingResult<()> {
        let mut slot = self.slot.write().await;
        if let Some(pending) = slot.as_ref() {
            warn!(
                in_flight = %pending.kind,
                requested = %kind,
                "write refused, a transaction is already in flight"
            );
            return Err(StakingError::TransactionInFlight(pending.kind));
        }
        *slot = Some(PendingTransaction::reserve(kind));
        debug!(kind = %kind, "transaction slot reserved");
        Ok(())
    }

    /// Attach the identifier returned by the chain to the reserved slot.
    pub async fn record_submission(&self, tx: &TxId) {
        let kind = {
            let mut slot = self.slot.write().await;
            match slot.as_mut() {
                Some(pending) => {
                    pending.tx = Some(tx.clone());
                    pending.kind
                }
                None => {
                    warn!(tx = %tx, "submission recorded without a reserved slot");
                    return;
                }
            }
        };
        info!(kind = %kind, tx = %tx, "transaction submitted");
        self.emit(TrackerEvent::Submitted {
            kind,
            tx: tx.clone(),
        })
        .await;
    }

    /// Release the slot after a submit call failed before returning an
    /// identifier.
    pub async fn abort_reservation(&self) {
        if let Some(pending) = self.slot.write().await.take() {
            debug!(kind = %pending.kind, "reservation released before submission");
        }
    }

    /// Await the terminal outcome of the submitted transaction, then clear
    /// the slot and emit the matching event.
    pub async fn track_to_completion(&self) -> StakingResult<TxOutcome> {
        let pending = self.slot.read().await.clone();
        let Some(pending) = pending else {
            return Err(StakingError::NothingInFlight);
        };
        let Some(tx) = pending.tx else {
            return Err(StakingError::NothingInFlight);
        };

        let status = self.chain.await_confirmation(&tx).await;
        *self.slot.write().await = None;

        let outcome = match status {
            TxStatus::Confirmed => {
                info!(kind = %pending.kind, tx = %tx, "transaction confirmed");
                TxOutcome::Confirmed {
                    kind: pending.kind,
                    tx,
                }
            }
            TxStatus::Failed(failure) => {
                let error = classify::classify(&failure);
                warn!(
                    kind = %pending.kind,
                    tx = %tx,
                    category = ?error.category,
                    message = %error.message,
                    "transaction failed"
                );
                TxOutcome::Failed {
                    kind: pending.kind,
                    tx: Some(tx),
                    error,
                }
            }
        };
        self.emit(outcome.clone().into()).await;
        Ok(outcome)
    }

    async fn emit(&self, event: TrackerEvent) {
        let events = self.events.read().await;
        if let Some(sender) = events.as_ref() {
            // A dropped receiver just means nobody is listening anymore.
            let _ = sender.send(event);
        }
    }
}

impl From<TxOutcome> for TrackerEvent {
    fn from(outcome: TxOutcome) -> Self {
        match outcome {
            TxOutcome::Confirmed { kind, tx } => TrackerEvent::Confirmed { kind, tx },
            TxOutcome::Failed { kind, tx, error } => TrackerEvent::Failed { kind, tx, error },
        }
    }
}
