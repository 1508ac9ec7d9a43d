//! Idempotency ledger.
//!
//! Mutations that accept an idempotency key execute at most once per
//! `(user, operation, key)`. The store enforces the unique index; the
//! ledger resolves hits back to the live entity the winning call produced.

use std::sync::Arc;

use tracing::debug;

use adreel_models::{
    Checkpoint, IdempotencyOperation, IdempotencyRecord, Message, RenderJob, ResultRef,
};
use adreel_store::MemoryStore;

use crate::error::{EngineError, EngineResult};

/// The live entity a prior guarded call produced.
#[derive(Debug, Clone)]
pub enum ResolvedResult {
    Checkpoint(Checkpoint),
    RenderJob(RenderJob),
    Message(Message),
}

impl ResolvedResult {
    /// The checkpoint, when the guarded operation produced one.
    pub fn into_checkpoint(self) -> Option<Checkpoint> {
        match self {
            ResolvedResult::Checkpoint(c) => Some(c),
            _ => None,
        }
    }

    /// The render job, when the guarded operation produced one.
    pub fn into_render_job(self) -> Option<RenderJob> {
        match self {
            ResolvedResult::RenderJob(j) => Some(j),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct IdempotencyLedger {
    store: Arc<MemoryStore>,
}

impl IdempotencyLedger {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Look up a prior result for `(user, operation, key)`.
    ///
    /// `None` key means the caller opted out of idempotency. A hit is
    /// resolved against the live entity table; entities are never deleted,
    /// so a dangling reference is an internal fault.
    pub async fn check(
        &self,
        user_id: &str,
        operation: IdempotencyOperation,
        key: Option<&str>,
    ) -> EngineResult<Option<ResolvedResult>> {
        let Some(key) = key else {
            return Ok(None);
        };
        let Some(record) = self.store.get_idempotency(user_id, operation, key).await else {
            return Ok(None);
        };
        debug!(
            user_id = %user_id,
            operation = %operation,
            key = %key,
            "Idempotency hit, replaying stored result"
        );
        self.resolve(&record.result).await.map(Some)
    }

    /// Record the result of a completed guarded operation.
    ///
    /// Losing a store race means another writer already recorded an
    /// equivalent result under this key; the loss is swallowed.
    pub async fn store(&self, record: IdempotencyRecord) {
        let key = record.key.clone();
        let operation = record.operation;
        match self.store.insert_idempotency(record).await {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => {
                debug!(
                    operation = %operation,
                    key = %key,
                    "Lost idempotency insert race, keeping winner's record"
                );
            }
            Err(e) => {
                // insert_idempotency only fails on the unique index
                debug!(error = %e, "Unexpected idempotency insert failure");
            }
        }
    }

    /// Claim `(user, operation, key)` before doing the work.
    ///
    /// Used by render submission, where the job id is known up front and
    /// the ledger row must exist before the job does. Returns the winning
    /// record when another caller got there first.
    pub async fn reserve(
        &self,
        record: IdempotencyRecord,
    ) -> EngineResult<Option<IdempotencyRecord>> {
        let user_id = record.user_id.clone();
        let operation = record.operation;
        let key = record.key.clone();
        match self.store.insert_idempotency(record).await {
            Ok(()) => Ok(None),
            Err(e) if e.is_already_exists() => {
                let winner = self
                    .store
                    .get_idempotency(&user_id, operation, &key)
                    .await
                    .ok_or_else(|| {
                        EngineError::internal("idempotency record vanished after insert conflict")
                    })?;
                Ok(Some(winner))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Drop a claim whose guarded work never produced a result.
    ///
    /// A reservation left behind by a failed operation would shadow every
    /// later call under the same key with a dangling reference.
    pub async fn release(&self, user_id: &str, operation: IdempotencyOperation, key: &str) {
        debug!(
            user_id = %user_id,
            operation = %operation,
            key = %key,
            "Releasing idempotency claim"
        );
        self.store.remove_idempotency(user_id, operation, key).await;
    }

    /// Resolve a stored reference to the live entity.
    pub async fn resolve(&self, result: &ResultRef) -> EngineResult<ResolvedResult> {
        let resolved = match result {
            ResultRef::Checkpoint(id) => self
                .store
                .get_checkpoint(id)
                .await
                .map(ResolvedResult::Checkpoint),
            ResultRef::RenderJob(id) => self
                .store
                .get_render_job(id)
                .await
                .map(ResolvedResult::RenderJob),
            ResultRef::Message(id) => self.store.get_message(id).await.map(ResolvedResult::Message),
        };
        resolved.map_err(|e| {
            EngineError::internal(format!("idempotency record references missing entity: {}", e))
        })
    }
}
