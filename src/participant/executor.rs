//! Transition task execution.
//!
//! Each task moves one partition one state hop, through the lifecycle
//! `Created → Validated → Executing → {Succeeded, Failed} → Finalized`:
//!
//! - validation rejects messages missing fromState/toState/partition; a
//!   rejected message is discarded without ever entering Executing.
//! - Executing holds the partition's mutex for the full task, so two
//!   transitions for one partition can never run concurrently; transitions
//!   for different partitions run in parallel on the worker pool.
//! - a fromState mismatch fails the task without side effects; the stale
//!   or duplicate message races a state that already moved on.
//! - transition-logic errors convert the task to Failed: the rollback hook
//!   runs, and the persisted observed state is forced to the error state.
//! - finalization deletes the message (the acknowledgment) exactly once
//!   regardless of outcome and emits timing statistics. If persistence
//!   itself fails, rollback runs again but the message is still deleted:
//!   at-most-once effective processing beats redelivering a message that
//!   cannot be processed.
//!
//! There is no watchdog for transition logic that hangs; a hung transition
//! pins its pool slot and its partition lock until it returns.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use super::engine::{StateMachineEngine, TransitionTask};
use crate::constants::{DROPPED_STATE, ERROR_STATE};
use crate::error::{OrchestratorError, Result};
use crate::metrics::{TRANSITION_EXECUTION_DELAY, TRANSITION_QUEUE_DELAY, TRANSITIONS_TOTAL};
use crate::model::{CurrentState, Message, MessageType};
use crate::store::{ClusterStore, WriteOutcome, paths};

/// Attempts for the observed-state read-modify-write before giving up.
/// Conflicts come from sibling partitions of the same resource updating the
/// shared record concurrently.
const PERSIST_ATTEMPTS: usize = 10;

pub struct TransitionExecutor {
    cluster: String,
    node: String,
    /// Session the executor persists observed state under; a new executor is
    /// built for every session, never reusing a stale token.
    session: String,
    store: Arc<dyn ClusterStore>,
    engine: Arc<StateMachineEngine>,
    pool: Arc<Semaphore>,
}

impl TransitionExecutor {
    pub fn new(
        cluster: impl Into<String>,
        node: impl Into<String>,
        session: impl Into<String>,
        store: Arc<dyn ClusterStore>,
        engine: Arc<StateMachineEngine>,
        pool_size: usize,
    ) -> Self {
        TransitionExecutor {
            cluster: cluster.into(),
            node: node.into(),
            session: session.into(),
            store,
            engine,
            pool: Arc::new(Semaphore::new(pool_size)),
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    /// Execute a message under the worker-pool bound: blocks for a pool
    /// slot, then runs the message to completion. Callers spawn this onto
    /// the runtime to execute messages concurrently.
    pub async fn run_on_pool(&self, message: Message) -> Result<()> {
        let _permit = self
            .pool
            .acquire()
            .await
            .expect("executor pool semaphore is never closed");
        self.execute(message).await
    }

    /// Execute one message to completion, including finalization.
    pub async fn execute(&self, mut message: Message) -> Result<()> {
        match message.message_type() {
            Some(MessageType::NoOp) => {
                self.ack(&message).await;
                return Ok(());
            }
            Some(MessageType::StateTransition) => {}
            None => {
                self.ack(&message).await;
                return Err(OrchestratorError::Validation(format!(
                    "message {} has unknown type",
                    message.id()
                )));
            }
        }

        message.mark_execute_start();
        let tasks = match self.engine.create_handler(&message) {
            Ok(tasks) => tasks,
            Err(e) => {
                // Configuration/validation failure: not retryable, ack so
                // the queue cannot loop on an unprocessable message.
                self.ack(&message).await;
                return Err(e);
            }
        };

        // A transition message naming no partition (absent field, or a
        // batch with an empty list) expands to zero tasks; report it
        // instead of acknowledging it as a success.
        if tasks.is_empty() {
            self.ack(&message).await;
            return Err(OrchestratorError::Validation(format!(
                "message {} names no partition",
                message.id()
            )));
        }

        let mut first_error = None;
        for task in tasks {
            if let Err(e) = self.run_task(&message, task).await {
                first_error = first_error.or(Some(e));
            }
        }

        // Finalize: the message is deleted exactly once, success or not.
        self.ack(&message).await;
        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// One partition's transition under its execution lock.
    async fn run_task(&self, message: &Message, task: TransitionTask) -> Result<()> {
        let ctx = &task.context;
        let outcome = async {
            // Created -> Validated.
            message.validate_transition()?;
            if ctx.partition.is_empty() {
                return Err(OrchestratorError::Validation(format!(
                    "message {} names no partition",
                    message.id()
                )));
            }

            // Validated -> Executing: blocks until the prior task for this
            // partition releases the lock.
            let mut machine = task.machine.lock().await;
            if machine.current_state() != ctx.from_state {
                // Stale or duplicate message; no side effects.
                return Err(OrchestratorError::StalePrecondition {
                    partition: ctx.partition.clone(),
                    expected: ctx.from_state.clone(),
                    actual: machine.current_state().to_string(),
                });
            }

            let model = message.state_model_def().unwrap_or("").to_string();
            match machine.fire(ctx) {
                Ok(()) => {
                    // Executing -> Succeeded.
                    machine.set_current_state(&ctx.to_state);
                    if let Err(persist_err) = self.persist_state(ctx, &ctx.to_state, &model).await {
                        // Rollback again defensively; the message is still
                        // acknowledged by the caller.
                        warn!(
                            partition = %ctx.partition,
                            error = %persist_err,
                            "observed-state persistence failed after transition"
                        );
                        machine.rollback(ctx, &persist_err);
                        machine.set_current_state(ERROR_STATE);
                        return Err(persist_err);
                    }
                    info!(
                        resource = %ctx.resource,
                        partition = %ctx.partition,
                        from = %ctx.from_state,
                        to = %ctx.to_state,
                        "transition succeeded"
                    );
                    // A dropped replica has no further lifecycle; free its
                    // machine so a re-added partition starts fresh.
                    if ctx.to_state == DROPPED_STATE {
                        self.engine.remove_machine(&ctx.resource, &ctx.partition);
                    }
                    Ok(())
                }
                Err(e) => {
                    // Executing -> Failed: rollback, then force the error
                    // state both in memory and in the store.
                    error!(
                        resource = %ctx.resource,
                        partition = %ctx.partition,
                        from = %ctx.from_state,
                        to = %ctx.to_state,
                        error = %e,
                        "transition logic failed"
                    );
                    machine.rollback(ctx, &e);
                    machine.set_current_state(ERROR_STATE);
                    if let Err(persist_err) = self.persist_state(ctx, ERROR_STATE, &model).await {
                        warn!(
                            partition = %ctx.partition,
                            error = %persist_err,
                            "failed to persist error state"
                        );
                    }
                    Err(e)
                }
            }
        }
        .await;

        self.report_stats(message, &task, outcome.is_ok());
        outcome
    }

    /// Update this partition's entry inside the per-(node, session,
    /// resource) observed-state record, with optimistic version checks.
    async fn persist_state(
        &self,
        ctx: &super::state_model::TransitionContext,
        state: &str,
        model: &str,
    ) -> Result<()> {
        let path = paths::observed_state(&self.cluster, &self.node, &self.session, &ctx.resource);

        for _ in 0..PERSIST_ATTEMPTS {
            let existing = self.store.read(&path).await?;
            let (mut current, expected_version) = match existing {
                Some(read) => (CurrentState::from_record(read.record), Some(read.version)),
                None => (
                    CurrentState::new(&ctx.resource, &self.session, model),
                    None,
                ),
            };
            current.set_state(&ctx.partition, state);

            match self
                .store
                .write(&path, current.into_record(), expected_version)
                .await?
            {
                WriteOutcome::Written(_) => return Ok(()),
                WriteOutcome::VersionConflict => {
                    // Sibling partition updated the record; re-read.
                    debug!(path, "observed-state write conflicted, retrying");
                }
            }
        }
        Err(OrchestratorError::Persistence(format!(
            "observed-state write at {path} kept conflicting after {PERSIST_ATTEMPTS} attempts"
        )))
    }

    /// Delete the message from this node's queue. Deletion is the
    /// acknowledgment.
    async fn ack(&self, message: &Message) {
        let path = paths::message(&self.cluster, &self.node, message.id());
        if let Err(e) = self.store.delete(&path).await {
            // The message will be redelivered; the stale-precondition check
            // makes the retry harmless.
            warn!(message = message.id(), error = %e, "failed to delete message");
        }
    }

    /// Best-effort timing statistics; never affects the transition outcome.
    fn report_stats(&self, message: &Message, task: &TransitionTask, success: bool) {
        let transition = format!("{}--{}", task.context.from_state, task.context.to_state);
        let labels = [
            self.cluster.as_str(),
            self.node.as_str(),
            task.context.resource.as_str(),
            transition.as_str(),
        ];

        TRANSITIONS_TOTAL
            .with_label_values(&[
                labels[0],
                labels[1],
                labels[2],
                labels[3],
                if success { "true" } else { "false" },
            ])
            .inc();

        // Missing timestamps skip the latency observations silently rather
        // than failing the task.
        let now = chrono::Utc::now().timestamp_millis();
        if let (Some(created), Some(started)) =
            (message.create_timestamp(), message.execute_start_timestamp())
        {
            if started >= created {
                TRANSITION_QUEUE_DELAY
                    .with_label_values(&labels)
                    .observe((started - created) as f64 / 1000.0);
            }
            if now >= started {
                TRANSITION_EXECUTION_DELAY
                    .with_label_values(&labels)
                    .observe((now - started) as f64 / 1000.0);
            }
        } else {
            debug!(message = message.id(), "missing timestamps, skipping latency stats");
        }
    }
}
