//! Stage 2: project observed state into a per-resource table, fenced by
//! session.
//!
//! Observed-state records written under a session other than the node's
//! current live session are from a previous incarnation of that node and
//! must not influence the pipeline: the node lost those replicas when its
//! session expired. Only entries under the current session survive into the
//! table.
//!
//! Pending messages are projected here too, keyed by (resource, partition,
//! node), so message selection can suppress duplicates without another
//! store read.

use async_trait::async_trait;
use tracing::trace;

use super::{PipelineContext, Stage};
use crate::error::Result;
use crate::model::MessageType;

pub struct CurrentStateComputationStage;

#[async_trait]
impl Stage for CurrentStateComputationStage {
    fn name(&self) -> &'static str {
        "current_state_computation"
    }

    async fn process(&self, ctx: &mut PipelineContext<'_>) -> Result<()> {
        let snapshot = ctx.snapshot;

        for live in snapshot.live_instances() {
            let node = live.node();
            let session = live.session_id();

            // The snapshot holds observed state for every (node, session)
            // pair present in the store; only the current session passes.
            for (resource, current) in snapshot.observed_state_for(node, session) {
                if current.session_id() != session {
                    trace!(
                        node,
                        resource,
                        stale = current.session_id(),
                        "dropping observed state from stale session"
                    );
                    continue;
                }
                if !ctx.resources.contains_key(resource) {
                    continue;
                }
                let table = ctx.current_states.entry(resource.to_string()).or_default();
                for (partition, state) in current.partition_states() {
                    table
                        .entry(partition.to_string())
                        .or_default()
                        .insert(node.to_string(), state.to_string());
                }
            }

            for message in snapshot.messages_for(node) {
                if message.message_type() != Some(MessageType::StateTransition) {
                    continue;
                }
                if let (Some(resource), Some(partition)) = (message.resource(), message.partition())
                {
                    ctx.pending.insert(
                        (
                            resource.to_string(),
                            partition.to_string(),
                            node.to_string(),
                        ),
                        message.clone(),
                    );
                }
            }
        }
        Ok(())
    }
}
