//! Stage 4: generate candidate transition messages.
//!
//! For each (partition, node) where the target state differs from the
//! observed state, emit one message for the *single next* state on the legal
//! path from observed to target. Multi-hop jumps are never generated; the
//! pipeline converges over successive runs as each hop completes.
//!
//! Nodes holding a replica that no longer appears in the target map are
//! driven back toward the model's initial state the same way.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{PipelineContext, Stage};
use crate::error::Result;
use crate::model::Message;

pub struct MessageGenerationStage;

#[async_trait]
impl Stage for MessageGenerationStage {
    fn name(&self) -> &'static str {
        "message_generation"
    }

    async fn process(&self, ctx: &mut PipelineContext<'_>) -> Result<()> {
        let PipelineContext {
            snapshot,
            controller,
            resources,
            current_states,
            best_possible,
            candidates,
            ..
        } = ctx;

        for (resource, partitions) in best_possible.iter() {
            let Some(ideal) = resources.get(resource) else {
                continue;
            };
            let Ok(model_name) = ideal.state_model_def_ref() else {
                continue;
            };
            let Some(def) = snapshot.state_model_def(model_name) else {
                continue;
            };
            let observed_partitions = current_states.get(resource);

            for (partition, target_map) in partitions {
                let observed_map = observed_partitions.and_then(|p| p.get(partition));

                // Union of targeted nodes and nodes still reporting state.
                let mut nodes: BTreeSet<&String> = target_map.keys().collect();
                if let Some(observed) = observed_map {
                    nodes.extend(observed.keys());
                }

                for node in nodes {
                    let Some(live) = snapshot.live_instance(node) else {
                        continue;
                    };
                    let observed = observed_map
                        .and_then(|m| m.get(node))
                        .map(String::as_str)
                        .unwrap_or_else(|| def.initial_state());
                    let target = target_map
                        .get(node)
                        .map(String::as_str)
                        .unwrap_or_else(|| def.initial_state());
                    if observed == target {
                        continue;
                    }

                    let Some(next) = def.next_state(observed, target) else {
                        warn!(
                            resource,
                            partition,
                            node = node.as_str(),
                            observed,
                            target,
                            "no legal path between states"
                        );
                        continue;
                    };

                    debug!(
                        resource,
                        partition,
                        node = node.as_str(),
                        from = observed,
                        to = next,
                        "generated candidate transition"
                    );
                    candidates.push(Message::state_transition(
                        controller,
                        node,
                        live.session_id(),
                        resource,
                        partition,
                        observed,
                        next,
                        model_name,
                    ));
                }
            }
        }
        Ok(())
    }
}
