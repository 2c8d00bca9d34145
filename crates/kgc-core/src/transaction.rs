//! All-or-nothing clone transaction
//!
//! A [`CloneTransaction`] is an ordered list of `(ForwardOp, RollbackAction)`
//! pairs. `commit` runs the forward operations in registration order; if one
//! fails, the rollback actions of every *completed* step run in reverse
//! order and the original failure is returned.
//!
//! Both halves are plain data, so a transaction can be inspected and tested
//! without executing it.
//!
//! # Ordering
//!
//! Forward: 1, 2, ..., N. Rollback after step k fails: k-1, k-2, ..., 1.
//! Steps never run concurrently.

use crate::config::Collections;
use crate::error::TransactionError;
use crate::ids::TxnToken;
use kgc_store::{Record, RecordStore, StoreError};
use std::sync::Arc;

/// Forward step: persist one batch of cloned rows
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardOp {
    /// Write cloned entities
    PersistEntities(Vec<Record>),
    /// Write cloned edges
    PersistEdges(Vec<Record>),
}

impl ForwardOp {
    /// Records carried by this step
    #[inline]
    #[must_use]
    pub fn records(&self) -> &[Record] {
        match self {
            Self::PersistEntities(records) | Self::PersistEdges(records) => records,
        }
    }

    /// Ids of the records carried by this step
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.records().iter().map(|r| r.id.clone()).collect()
    }

    /// Matching compensation
    #[must_use]
    pub fn inverse(&self) -> RollbackAction {
        match self {
            Self::PersistEntities(_) => RollbackAction::DeleteEntities(self.ids()),
            Self::PersistEdges(_) => RollbackAction::DeleteEdges(self.ids()),
        }
    }

    fn collection<'a>(&self, collections: &'a Collections) -> &'a str {
        match self {
            Self::PersistEntities(_) => &collections.cloned_entities,
            Self::PersistEdges(_) => &collections.cloned_edges,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::PersistEntities(r) => format!("persist {} entities", r.len()),
            Self::PersistEdges(r) => format!("persist {} edges", r.len()),
        }
    }
}

/// Compensation for one forward step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackAction {
    /// Delete cloned entities by id
    DeleteEntities(Vec<String>),
    /// Delete cloned edges by id
    DeleteEdges(Vec<String>),
}

impl RollbackAction {
    /// Ids this action deletes
    #[inline]
    #[must_use]
    pub fn ids(&self) -> &[String] {
        match self {
            Self::DeleteEntities(ids) | Self::DeleteEdges(ids) => ids,
        }
    }

    fn collection<'a>(&self, collections: &'a Collections) -> &'a str {
        match self {
            Self::DeleteEntities(_) => &collections.cloned_entities,
            Self::DeleteEdges(_) => &collections.cloned_edges,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::DeleteEntities(ids) => format!("delete {} entities", ids.len()),
            Self::DeleteEdges(ids) => format!("delete {} edges", ids.len()),
        }
    }
}

/// Transaction lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Not begun
    Idle,
    /// Accepting and executing steps
    Open,
    /// Every step succeeded
    Committed,
    /// A step failed and all completed steps were undone
    RolledBack,
    /// A rollback action failed
    Failed,
}

/// Result of a successful commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    /// Token held during the commit
    pub token: TxnToken,
    /// Steps executed
    pub steps: usize,
    /// Records written across all steps
    pub records_written: usize,
}

#[derive(Debug)]
struct RollbackFault {
    step: usize,
    action: String,
    source: StoreError,
}

/// A chunk write failed part way through a step
#[derive(Debug)]
pub(crate) struct PersistFailure {
    /// The failed create call
    pub(crate) source: StoreError,
    /// Set if removing the step's earlier chunks failed too
    pub(crate) cleanup: Option<StoreError>,
    /// Rows of this step left in the store
    pub(crate) orphaned: usize,
}

/// Executes steps against the record store, in bounded chunks
#[derive(Debug, Clone)]
pub(crate) struct StoreWriter {
    store: Arc<dyn RecordStore>,
    collections: Collections,
    chunk_size: usize,
}

impl StoreWriter {
    pub(crate) fn new(
        store: Arc<dyn RecordStore>,
        collections: Collections,
        chunk_size: usize,
    ) -> Self {
        Self {
            store,
            collections,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Write a batch chunk by chunk
    ///
    /// If a chunk fails, chunks this step already wrote are deleted before
    /// the error is returned. A failed delete is reported in
    /// [`PersistFailure::cleanup`] with the rows it left behind.
    async fn persist(&self, op: &ForwardOp) -> Result<usize, PersistFailure> {
        let collection = op.collection(&self.collections);
        let mut written: Vec<String> = Vec::new();

        for chunk in op.records().chunks(self.chunk_size) {
            if let Err(source) = self.store.create_many(collection, chunk.to_vec()).await {
                let mut failure = PersistFailure {
                    source,
                    cleanup: None,
                    orphaned: 0,
                };
                if !written.is_empty() {
                    if let Err(cleanup) = self.delete_ids(collection, &written).await {
                        tracing::error!(
                            fatal = true,
                            collection,
                            orphaned = written.len(),
                            "Failed to remove partial batch after write failure: {}",
                            cleanup
                        );
                        failure.orphaned = written.len();
                        failure.cleanup = Some(cleanup);
                    }
                }
                return Err(failure);
            }
            written.extend(chunk.iter().map(|r| r.id.clone()));
        }

        Ok(written.len())
    }

    async fn undo(&self, action: &RollbackAction) -> Result<usize, StoreError> {
        self.delete_ids(action.collection(&self.collections), action.ids())
            .await
    }

    /// Delete ids chunk by chunk, stopping at the first failure
    pub(crate) async fn delete_ids(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<usize, StoreError> {
        let mut removed = 0;
        for chunk in ids.chunks(self.chunk_size) {
            removed += self.store.delete_many(collection, chunk).await?;
        }
        Ok(removed)
    }

    pub(crate) fn collections(&self) -> &Collections {
        &self.collections
    }
}

/// Ordered, all-or-nothing sequence of store writes
#[derive(Debug)]
pub struct CloneTransaction {
    writer: StoreWriter,
    token: Option<TxnToken>,
    forward: Vec<ForwardOp>,
    rollback_stack: Vec<RollbackAction>,
    completed: usize,
    state: TransactionState,
}

impl CloneTransaction {
    /// Create idle transaction
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        collections: Collections,
        write_chunk_size: usize,
    ) -> Self {
        Self::with_writer(StoreWriter::new(store, collections, write_chunk_size))
    }

    pub(crate) fn with_writer(writer: StoreWriter) -> Self {
        Self {
            writer,
            token: None,
            forward: Vec::new(),
            rollback_stack: Vec::new(),
            completed: 0,
            state: TransactionState::Idle,
        }
    }

    /// Reset steps and acquire a fresh token
    pub fn begin(&mut self) -> TxnToken {
        if !self.forward.is_empty() {
            tracing::warn!(
                "Restarting transaction with {} unexecuted steps",
                self.forward.len() - self.completed
            );
        }
        self.forward.clear();
        self.rollback_stack.clear();
        self.completed = 0;
        self.state = TransactionState::Open;

        let token = TxnToken::acquire();
        self.token = Some(token);
        tracing::debug!(%token, "Transaction begun");
        token
    }

    /// Queue a step; nothing runs until `commit`
    pub fn register_operation(&mut self, forward: ForwardOp, rollback: RollbackAction) {
        self.forward.push(forward);
        self.rollback_stack.push(rollback);
    }

    /// Queue a step paired with its natural inverse
    pub fn register(&mut self, forward: ForwardOp) {
        let rollback = forward.inverse();
        self.register_operation(forward, rollback);
    }

    /// Run every step in order
    ///
    /// # Errors
    /// - `TransactionError::NotBegun` without `begin`
    /// - `TransactionError::StepFailed` for the first failing step, after
    ///   all completed steps were rolled back
    /// - `TransactionError::RollbackFailed` if undoing failed, including
    ///   the failing step's own partial chunks; carries the step failure
    ///   as `original`
    pub async fn commit(&mut self) -> Result<TransactionReceipt, TransactionError> {
        let token = self.token.ok_or(TransactionError::NotBegun)?;
        tracing::debug!(%token, steps = self.forward.len(), "Committing transaction");

        let mut records_written = 0;
        for index in 0..self.forward.len() {
            let op = &self.forward[index];
            match self.writer.persist(op).await {
                Ok(written) => {
                    records_written += written;
                    self.completed = index + 1;
                }
                Err(PersistFailure {
                    source,
                    cleanup,
                    orphaned,
                }) => {
                    let step = index + 1;
                    let operation = op.describe();
                    let failure = TransactionError::StepFailed {
                        step,
                        operation: operation.clone(),
                        source,
                    };
                    tracing::warn!(%token, "Transaction step failed, rolling back: {}", failure);

                    // The failing step's own leftovers are the first fault
                    let partial = cleanup.map(|source| RollbackFault {
                        step,
                        action: format!("remove {orphaned} rows of partial {operation}"),
                        source,
                    });
                    let unwound = self.unwind().await;
                    if partial.is_some() {
                        self.state = TransactionState::Failed;
                    }

                    return Err(match partial.or(unwound) {
                        None => failure,
                        Some(fault) => TransactionError::RollbackFailed {
                            step: fault.step,
                            action: fault.action,
                            source: fault.source,
                            original: Some(Box::new(failure)),
                        },
                    });
                }
            }
        }

        let steps = self.forward.len();
        self.state = TransactionState::Committed;
        self.release();
        Ok(TransactionReceipt {
            token,
            steps,
            records_written,
        })
    }

    /// Undo every completed step in reverse order
    ///
    /// # Errors
    /// - `TransactionError::NotBegun` without `begin`
    /// - `TransactionError::RollbackFailed` if any action failed
    pub async fn rollback(&mut self) -> Result<(), TransactionError> {
        if self.token.is_none() {
            return Err(TransactionError::NotBegun);
        }
        match self.unwind().await {
            None => Ok(()),
            Some(fault) => Err(TransactionError::RollbackFailed {
                step: fault.step,
                action: fault.action,
                source: fault.source,
                original: None,
            }),
        }
    }

    /// Each action runs once; a failing action is logged and the remaining
    /// ones still run. The first failure is returned.
    async fn unwind(&mut self) -> Option<RollbackFault> {
        let mut first_fault = None;

        for index in (0..self.completed).rev() {
            let action = &self.rollback_stack[index];
            match self.writer.undo(action).await {
                Ok(removed) => {
                    tracing::debug!(step = index + 1, removed, "Rolled back {}", action.describe());
                }
                Err(source) => {
                    tracing::error!(
                        fatal = true,
                        step = index + 1,
                        "Rollback action failed ({}): {}",
                        action.describe(),
                        source
                    );
                    if first_fault.is_none() {
                        first_fault = Some(RollbackFault {
                            step: index + 1,
                            action: action.describe(),
                            source,
                        });
                    }
                }
            }
        }

        self.completed = 0;
        self.state = if first_fault.is_some() {
            TransactionState::Failed
        } else {
            TransactionState::RolledBack
        };
        self.release();
        first_fault
    }

    fn release(&mut self) {
        if let Some(token) = self.token.take() {
            tracing::debug!(%token, state = ?self.state, "Transaction token released");
        }
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Token held while open
    #[inline]
    #[must_use]
    pub fn token(&self) -> Option<TxnToken> {
        self.token
    }

    /// Registered steps
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// No steps registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Steps that have run and not been undone
    #[inline]
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Registered forward steps
    #[inline]
    #[must_use]
    pub fn forward_ops(&self) -> &[ForwardOp] {
        &self.forward
    }

    /// Registered rollback actions, in registration order
    #[inline]
    #[must_use]
    pub fn rollback_actions(&self) -> &[RollbackAction] {
        &self.rollback_stack
    }
}
