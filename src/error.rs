//! Crate-level error types.
//!
//! # Error Hierarchy
//!
//! The crate uses a two-layer error hierarchy:
//!
//! ## Store Layer (`crate::store::StoreError`)
//!
//! Errors raised by the coordination-store collaborator: unavailability,
//! optimistic version conflicts, serialization failures. These convert into
//! [`OrchestratorError`] via a `From` impl so they propagate through the
//! controller and participant layers with `?`.
//!
//! ## Orchestration Layer ([`OrchestratorError`])
//!
//! The taxonomy used by the rebalance pipeline and the transition executor:
//!
//! - [`Config`](OrchestratorError::Config): missing state-model definition,
//!   malformed placement policy. Fatal to the affected pipeline run or task,
//!   never retried automatically.
//! - [`Validation`](OrchestratorError::Validation): malformed message. The
//!   task is discarded without ever executing.
//! - [`StalePrecondition`](OrchestratorError::StalePrecondition): observed
//!   state no longer matches a message's fromState. Expected under duplicate
//!   delivery; the task fails without side effects.
//! - [`TransitionExecution`](OrchestratorError::TransitionExecution): the
//!   state model's transition logic failed. Rollback is invoked and the
//!   persisted state is forced to the error state.
//! - [`Persistence`](OrchestratorError::Persistence): a store write failed
//!   after a transition completed. Rollback is invoked again, but the message
//!   is still acknowledged so an unprocessable message cannot loop forever.
//! - [`Store`](OrchestratorError::Store): the coordination store itself is
//!   unreachable. A pipeline run aborts and waits for the next trigger.
//!
//! Failures affecting one partition are isolated: they never block pipeline
//! computation or message delivery for other partitions.

use thiserror::Error;

use crate::store::StoreError;

/// Result type for orchestration operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors raised by the controller pipeline and the transition executor.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Invalid or missing configuration (state-model definition, placement
    /// policy, replica counts). Not retryable.
    #[error("configuration error: {0}")]
    Config(String),

    /// A message failed structural validation and was discarded.
    #[error("validation error: {0}")]
    Validation(String),

    /// A transition message's fromState no longer matches the partition's
    /// current state. Expected for stale or duplicate messages.
    #[error("stale precondition for {partition}: expected {expected}, current state is {actual}")]
    StalePrecondition {
        partition: String,
        expected: String,
        actual: String,
    },

    /// The state model's transition logic returned an error.
    #[error("transition execution failed: {0}")]
    TransitionExecution(String),

    /// Persisting the observed state after a transition failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The coordination store is unreachable or returned an unrecoverable
    /// read failure.
    #[error("coordination store error: {0}")]
    Store(#[from] StoreError),
}

impl OrchestratorError {
    /// True for errors that are expected under normal duplicate-message
    /// conditions and should not be logged as fatal.
    pub fn is_expected(&self) -> bool {
        matches!(self, OrchestratorError::StalePrecondition { .. })
    }
}
