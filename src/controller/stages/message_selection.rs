//! Stage 5: suppress unsafe or redundant candidates.
//!
//! Three suppression rules:
//!
//! 1. A pending, undeleted message for the same (node, partition) means the
//!    participant has not acknowledged the previous instruction; emitting
//!    another would race it. Re-running the pipeline against an unchanged
//!    snapshot therefore re-suppresses everything it emitted last time.
//! 2. Occupancy bounds: a transition into a bounded state is only sent when
//!    the partition's *current* holders of that state (plus selections made
//!    earlier in this run) leave room. A secondary→primary promotion waits
//!    until every other node has moved off the primary state first, so a
//!    transient dual-primary is impossible.
//! 3. A candidate whose replica is already at rest (from == to) carries no
//!    information.
//!
//! Candidates are processed per partition in the definition's transition
//! priority order, which places demotions ahead of the promotions they
//! unblock and makes selection deterministic.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tracing::debug;

use super::{PipelineContext, Stage};
use crate::error::Result;
use crate::metrics::PIPELINE_MESSAGES_SUPPRESSED;
use crate::model::Message;

pub struct MessageSelectionStage;

#[async_trait]
impl Stage for MessageSelectionStage {
    fn name(&self) -> &'static str {
        "message_selection"
    }

    async fn process(&self, ctx: &mut PipelineContext<'_>) -> Result<()> {
        let PipelineContext {
            snapshot,
            resources,
            current_states,
            pending,
            candidates,
            selected,
            ..
        } = ctx;

        // Group candidates per (resource, partition).
        let mut groups: BTreeMap<(String, String), Vec<Message>> = BTreeMap::new();
        for message in candidates.drain(..) {
            let key = (
                message.resource().unwrap_or("").to_string(),
                message.partition().unwrap_or("").to_string(),
            );
            groups.entry(key).or_default().push(message);
        }

        for ((resource, partition), mut group) in groups {
            let Some(ideal) = resources.get(&resource) else {
                continue;
            };
            let Some(def) = ideal
                .state_model_def_ref()
                .ok()
                .and_then(|name| snapshot.state_model_def(name))
            else {
                continue;
            };
            group.sort_by_key(|m| {
                def.transition_priority(m.from_state().unwrap_or(""), m.to_state().unwrap_or(""))
            });

            // Current holders per state for this partition.
            let mut occupancy: HashMap<String, usize> = HashMap::new();
            if let Some(observed) = current_states.get(&resource).and_then(|p| p.get(&partition)) {
                for state in observed.values() {
                    *occupancy.entry(state.clone()).or_default() += 1;
                }
            }

            for message in group {
                let node = message.target().unwrap_or("");
                let from = message.from_state().unwrap_or("");
                let to = message.to_state().unwrap_or("");

                if from == to {
                    PIPELINE_MESSAGES_SUPPRESSED
                        .with_label_values(&["at_rest"])
                        .inc();
                    continue;
                }

                if pending.contains_key(&(
                    resource.clone(),
                    partition.clone(),
                    node.to_string(),
                )) {
                    PIPELINE_MESSAGES_SUPPRESSED
                        .with_label_values(&["pending"])
                        .inc();
                    debug!(resource, partition, node, "suppressing duplicate of pending message");
                    continue;
                }

                // Only exactly-bounded states (the primary-equivalent) fence
                // transitions. Occupancy counts *observed* holders plus
                // reservations made earlier in this run, never states a
                // selected-but-unacknowledged message might produce, so a
                // promotion waits until every other holder has demonstrably
                // moved off the state.
                if let crate::model::StateBound::Exact(bound) = def.state_bound(to) {
                    let holders = occupancy.get(to).copied().unwrap_or(0);
                    if holders >= bound {
                        PIPELINE_MESSAGES_SUPPRESSED
                            .with_label_values(&["occupancy"])
                            .inc();
                        debug!(
                            resource,
                            partition,
                            node,
                            to,
                            holders,
                            bound,
                            "deferring transition until destination state has room"
                        );
                        continue;
                    }
                }

                // Reserve the destination so a second candidate into the
                // same bounded state cannot also pass this run.
                *occupancy.entry(to.to_string()).or_default() += 1;
                selected.push(message);
            }
        }
        Ok(())
    }
}
