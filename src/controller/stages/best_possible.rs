//! Stage 3: derive the target node→state mapping per partition.
//!
//! AUTO modes walk the partition's preference list intersected with live,
//! assignable nodes and hand out states in the definition's priority order,
//! respecting each state's occupancy bound (one primary, replica-count
//! secondaries, the rest to lower-priority states). CUSTOMIZED modes take
//! the explicit map as-is, restricted to live nodes.

use async_trait::async_trait;
use tracing::warn;

use super::{PartitionStateMap, PipelineContext, Stage, StateMap};
use crate::controller::cache::ClusterSnapshot;
use crate::error::Result;
use crate::model::{IdealState, StateModelDefinition};

pub struct BestPossibleStateStage;

#[async_trait]
impl Stage for BestPossibleStateStage {
    fn name(&self) -> &'static str {
        "best_possible_state"
    }

    async fn process(&self, ctx: &mut PipelineContext<'_>) -> Result<()> {
        let PipelineContext {
            snapshot,
            resources,
            best_possible,
            ..
        } = ctx;

        for (resource, ideal) in resources.iter() {
            match compute_resource_target(snapshot, resource, ideal) {
                Ok(target) => {
                    best_possible.insert(resource.clone(), target);
                }
                // Configuration errors are isolated to their resource.
                Err(e) => warn!(resource, error = %e, "skipping resource"),
            }
        }
        Ok(())
    }
}

fn compute_resource_target(
    snapshot: &ClusterSnapshot,
    resource: &str,
    ideal: &IdealState,
) -> Result<PartitionStateMap> {
    let model_name = ideal.state_model_def_ref()?;
    let def = snapshot.state_model_def(model_name).ok_or_else(|| {
        crate::error::OrchestratorError::Config(format!(
            "resource {resource}: state model definition {model_name} not found"
        ))
    })?;
    let mode = ideal.rebalance_mode()?;

    let mut target = PartitionStateMap::new();
    for partition in ideal.partition_names()? {
        let state_map = if mode.is_auto() {
            let replica_count = ideal.replica_count(snapshot.live_node_count())?;
            let preferred: Vec<String> = ideal
                .preference_list(&partition)
                .unwrap_or(&[])
                .iter()
                .filter(|node| snapshot.is_node_assignable(node))
                .cloned()
                .collect();
            auto_assign(preferred, def, replica_count)
        } else {
            ideal
                .instance_state_map(&partition)
                .map(|explicit| {
                    explicit
                        .iter()
                        .filter(|(node, _)| snapshot.is_node_assignable(node))
                        .map(|(node, state)| (node.clone(), state.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };
        target.insert(partition, state_map);
    }
    Ok(target)
}

/// Hand out states in priority order along the preference list.
fn auto_assign(
    preferred: Vec<String>,
    def: &StateModelDefinition,
    replica_count: usize,
) -> StateMap {
    let mut assignment = StateMap::new();
    let mut remaining = preferred.into_iter();

    for state in def.states() {
        let bound = def.state_bound(state).resolve(replica_count);
        for _ in 0..bound {
            match remaining.next() {
                Some(node) => {
                    assignment.insert(node, state.to_string());
                }
                None => return assignment,
            }
        }
    }
    assignment
}
