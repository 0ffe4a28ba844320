//! Tests for the deterministic placement calculator.

use helmsman::controller::placement::{ReplicaRole, compute_placement};
use helmsman::error::OrchestratorError;

fn nodes(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("n{i}")).collect()
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn test_same_seed_same_placement() {
    let a = compute_placement(&nodes(5), 12, 2, "db", 99).unwrap();
    let b = compute_placement(&nodes(5), 12, 2, "db", 99).unwrap();

    assert_eq!(a.len(), b.len());
    for (partition, placement) in &a {
        assert_eq!(placement.preference_list, b[partition].preference_list);
    }
}

#[test]
fn test_different_seed_different_placement() {
    let a = compute_placement(&nodes(5), 12, 2, "db", 1).unwrap();
    let b = compute_placement(&nodes(5), 12, 2, "db", 2).unwrap();

    let moved = a
        .iter()
        .filter(|(partition, placement)| {
            placement.preference_list != b[*partition].preference_list
        })
        .count();
    assert!(moved > 0, "seeds 1 and 2 produced identical placements");
}

#[test]
fn test_node_order_does_not_matter() {
    let mut reversed = nodes(5);
    reversed.reverse();

    let a = compute_placement(&nodes(5), 8, 1, "db", 7).unwrap();
    let b = compute_placement(&reversed, 8, 1, "db", 7).unwrap();
    for (partition, placement) in &a {
        assert_eq!(placement.preference_list, b[partition].preference_list);
    }
}

// ============================================================================
// Role structure
// ============================================================================

#[test]
fn test_exactly_one_primary_per_partition() {
    let placements = compute_placement(&nodes(4), 16, 2, "db", 0).unwrap();
    assert_eq!(placements.len(), 16);

    for placement in placements.values() {
        let primaries = placement
            .role_map
            .values()
            .filter(|role| **role == ReplicaRole::Primary)
            .count();
        let secondaries = placement
            .role_map
            .values()
            .filter(|role| **role == ReplicaRole::Secondary)
            .count();
        assert_eq!(primaries, 1);
        assert_eq!(secondaries, 2);
    }
}

#[test]
fn test_replicas_on_distinct_nodes() {
    let placements = compute_placement(&nodes(5), 32, 3, "db", 11).unwrap();
    for placement in placements.values() {
        // role_map is keyed by node, so its size equals the number of
        // distinct nodes used.
        assert_eq!(placement.role_map.len(), 4);
        assert_eq!(placement.preference_list.len(), 4);
    }
}

#[test]
fn test_primary_heads_preference_list() {
    let placements = compute_placement(&nodes(3), 6, 1, "db", 5).unwrap();
    for placement in placements.values() {
        let head = &placement.preference_list[0];
        assert_eq!(placement.role_map[head], ReplicaRole::Primary);
    }
}

#[test]
fn test_partition_names_cover_index_range() {
    let placements = compute_placement(&nodes(3), 4, 1, "db", 3).unwrap();
    for i in 0..4 {
        assert!(placements.contains_key(&format!("db_{i}")));
    }
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_too_few_nodes_rejected() {
    let result = compute_placement(&nodes(3), 4, 3, "db", 0);
    assert!(matches!(result, Err(OrchestratorError::Config(_))));
}

#[test]
fn test_equal_nodes_and_replicas_rejected() {
    // replica_count secondaries plus one primary needs replicas + 1 nodes.
    let result = compute_placement(&nodes(2), 4, 2, "db", 0);
    assert!(result.is_err());
}

#[test]
fn test_zero_partitions_is_empty() {
    let placements = compute_placement(&nodes(3), 0, 1, "db", 0).unwrap();
    assert!(placements.is_empty());
}
