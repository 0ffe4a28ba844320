//! Stage 6: address and persist surviving messages.
//!
//! Each selected message is resolved against the live instance set through
//! the criteria evaluator and written to the target node's message queue.
//! Writes retry briefly on store hiccups; a write that still fails aborts
//! the run (the next trigger regenerates the message from a fresh snapshot,
//! and selection re-suppresses anything that did land).

use std::sync::Arc;

use async_trait::async_trait;
use backon::Retryable;
use tracing::{info, warn};

use super::{PipelineContext, Stage};
use crate::controller::criteria::{self, Criteria};
use crate::error::{OrchestratorError, Result};
use crate::metrics::PIPELINE_MESSAGES_EMITTED;
use crate::retry;
use crate::store::{ClusterStore, paths};

pub struct TaskAssignmentStage {
    store: Arc<dyn ClusterStore>,
}

impl TaskAssignmentStage {
    pub fn new(store: Arc<dyn ClusterStore>) -> Self {
        TaskAssignmentStage { store }
    }
}

#[async_trait]
impl Stage for TaskAssignmentStage {
    fn name(&self) -> &'static str {
        "task_assignment"
    }

    async fn process(&self, ctx: &mut PipelineContext<'_>) -> Result<()> {
        let cluster = ctx.snapshot.cluster().to_string();

        for message in ctx.selected.drain(..) {
            let Some(target) = message.target() else {
                continue;
            };

            // Address through the evaluator against this run's snapshot; a
            // target outside the snapshot's live set is skipped, not an
            // error. A node that dies after the snapshot still receives the
            // message; its next session ignores it as stale.
            let rows = criteria::evaluate(&Criteria::for_instance(target), ctx.snapshot);
            if rows.is_empty() {
                warn!(target, "message target no longer live, dropping");
                continue;
            }

            let path = paths::message(&cluster, target, message.id());
            let record = message.record().clone();
            let store = Arc::clone(&self.store);
            (|| {
                let store = Arc::clone(&store);
                let path = path.clone();
                let record = record.clone();
                async move { store.write(&path, record, None).await }
            })
            .retry(retry::store_policy())
            .await
            .map_err(OrchestratorError::from)?;

            PIPELINE_MESSAGES_EMITTED.inc();
            info!(
                target,
                resource = message.resource().unwrap_or(""),
                partition = message.partition().unwrap_or(""),
                from = message.from_state().unwrap_or(""),
                to = message.to_state().unwrap_or(""),
                "transition message delivered"
            );
        }
        Ok(())
    }
}
