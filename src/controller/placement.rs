//! Deterministic placement calculation.
//!
//! Pure function: no I/O, no ambient randomness. The seed is the sole
//! entropy source, so the same inputs always produce the same assignment:
//! reproducible rollouts and testable placements.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::{OrchestratorError, Result};

/// Role a node plays for one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaRole {
    /// The single authoritative replica.
    Primary,
    /// One of `replica_count` following replicas.
    Secondary,
}

/// Placement of one partition: an ordered preference list (primary first)
/// and the node→role map.
#[derive(Debug, Clone)]
pub struct PartitionPlacement {
    pub preference_list: Vec<String>,
    pub role_map: BTreeMap<String, ReplicaRole>,
}

/// Compute a preference-ordered replica assignment for every partition of a
/// resource.
///
/// Requires strictly more nodes than replicas, so a partition's primary and
/// all its secondaries land on distinct nodes. Partition names are
/// `{resource_id}_{index}`.
pub fn compute_placement(
    node_ids: &[String],
    partition_count: usize,
    replica_count: usize,
    resource_id: &str,
    seed: u64,
) -> Result<BTreeMap<String, PartitionPlacement>> {
    if node_ids.len() <= replica_count {
        return Err(OrchestratorError::Config(format!(
            "resource {resource_id}: {} nodes cannot host {replica_count} replicas plus a primary",
            node_ids.len()
        )));
    }

    let mut nodes: Vec<&String> = node_ids.iter().collect();
    nodes.sort();
    let n = nodes.len();

    let mut shuffled: Vec<usize> = (0..partition_count).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    shuffled.shuffle(&mut rng);

    let mut placements = BTreeMap::new();
    for (position, &partition_index) in shuffled.iter().enumerate() {
        let mut preference_list = Vec::with_capacity(replica_count + 1);
        let mut role_map = BTreeMap::new();

        let primary = nodes[position % n];
        preference_list.push(primary.clone());
        role_map.insert(primary.clone(), ReplicaRole::Primary);

        for j in 1..=replica_count {
            let secondary = nodes[(position + j) % n];
            preference_list.push(secondary.clone());
            role_map.insert(secondary.clone(), ReplicaRole::Secondary);
        }

        placements.insert(
            format!("{resource_id}_{partition_index}"),
            PartitionPlacement {
                preference_list,
                role_map,
            },
        );
    }
    Ok(placements)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("n{i}")).collect()
    }

    #[test]
    fn rejects_too_few_nodes() {
        let result = compute_placement(&nodes(2), 4, 2, "db", 0);
        assert!(matches!(result, Err(OrchestratorError::Config(_))));
    }

    #[test]
    fn every_partition_has_distinct_replicas() {
        let placements = compute_placement(&nodes(5), 16, 2, "db", 7).unwrap();
        assert_eq!(placements.len(), 16);
        for placement in placements.values() {
            assert_eq!(placement.preference_list.len(), 3);
            assert_eq!(placement.role_map.len(), 3);
            let primaries = placement
                .role_map
                .values()
                .filter(|r| **r == ReplicaRole::Primary)
                .count();
            assert_eq!(primaries, 1);
        }
    }
}
