//! Tests for the controller rebalance pipeline.
//!
//! Each test seeds a [`MemoryStore`] with placement policy, liveness, and
//! observed state, runs one pipeline pass, and inspects the messages that
//! land on node queues. No participant runs; observed state is written
//! directly, standing in for transition executors.

use std::sync::Arc;

use helmsman::config::ControllerConfig;
use helmsman::controller::Controller;
use helmsman::model::{
    CurrentState, IdealState, InstanceConfig, LiveInstance, Message, RebalanceMode,
    StateModelDefinition,
};
use helmsman::store::{ClusterStore, MemoryStore, paths};

const CLUSTER: &str = "test";

async fn setup() -> (Arc<MemoryStore>, Controller) {
    let store = Arc::new(MemoryStore::new());
    let def = StateModelDefinition::primary_secondary();
    store
        .write(
            &paths::state_model_def(CLUSTER, def.name()),
            def.to_record(),
            None,
        )
        .await
        .unwrap();
    let controller = Controller::new(
        ControllerConfig::new(CLUSTER),
        Arc::clone(&store) as Arc<dyn ClusterStore>,
    )
    .unwrap();
    (store, controller)
}

async fn add_resource(store: &MemoryStore, resource: &str, preference: &[&str]) {
    let mut ideal = IdealState::new(
        resource,
        1,
        preference.len().saturating_sub(1),
        "PrimarySecondary",
        RebalanceMode::Auto,
    );
    ideal.set_preference_list(
        format!("{resource}_0"),
        preference.iter().map(|n| n.to_string()).collect(),
    );
    store
        .write(&paths::placement(CLUSTER, resource), ideal.into_record(), None)
        .await
        .unwrap();
}

async fn join(store: &MemoryStore, node: &str, session: &str) {
    store
        .write(
            &paths::live_instance(CLUSTER, node),
            LiveInstance::new(node, session).into_record(),
            None,
        )
        .await
        .unwrap();
}

async fn observe(store: &MemoryStore, node: &str, session: &str, resource: &str, states: &[(&str, &str)]) {
    let mut current = CurrentState::new(resource, session, "PrimarySecondary");
    for (partition, state) in states {
        current.set_state(partition, *state);
    }
    store
        .write(
            &paths::observed_state(CLUSTER, node, session, resource),
            current.into_record(),
            None,
        )
        .await
        .unwrap();
}

async fn queue(store: &MemoryStore, node: &str) -> Vec<Message> {
    let mut messages = Vec::new();
    for id in store
        .list_children(&paths::message_queue(CLUSTER, node))
        .await
        .unwrap()
    {
        let read = store
            .read(&paths::message(CLUSTER, node, &id))
            .await
            .unwrap()
            .unwrap();
        messages.push(Message::from_record(read.record));
    }
    messages
}

fn transition(message: &Message) -> (&str, &str) {
    (
        message.from_state().unwrap_or(""),
        message.to_state().unwrap_or(""),
    )
}

// ============================================================================
// Bootstrap
// ============================================================================

#[tokio::test]
async fn test_bootstrap_emits_single_hop_only() {
    let (store, controller) = setup().await;
    add_resource(&store, "db", &["n1", "n2"]).await;
    join(&store, "n1", "s1").await;
    join(&store, "n2", "s2").await;

    controller.run_once().await.unwrap();

    // n1's target is PRIMARY but nothing is observed yet, so the first hop
    // from OFFLINE stops at SECONDARY.
    let n1 = queue(&store, "n1").await;
    assert_eq!(n1.len(), 1);
    assert_eq!(transition(&n1[0]), ("OFFLINE", "SECONDARY"));
    assert_eq!(n1[0].target_session(), Some("s1"));

    let n2 = queue(&store, "n2").await;
    assert_eq!(n2.len(), 1);
    assert_eq!(transition(&n2[0]), ("OFFLINE", "SECONDARY"));
}

#[tokio::test]
async fn test_rerun_suppresses_pending_duplicates() {
    let (store, controller) = setup().await;
    add_resource(&store, "db", &["n1", "n2"]).await;
    join(&store, "n1", "s1").await;
    join(&store, "n2", "s2").await;

    controller.run_once().await.unwrap();
    controller.run_once().await.unwrap();
    controller.run_once().await.unwrap();

    // Unacknowledged messages suppress regeneration, so repeated passes over
    // an unchanged cluster emit nothing new.
    assert_eq!(queue(&store, "n1").await.len(), 1);
    assert_eq!(queue(&store, "n2").await.len(), 1);
}

#[tokio::test]
async fn test_converged_cluster_emits_nothing() {
    let (store, controller) = setup().await;
    add_resource(&store, "db", &["n1", "n2"]).await;
    join(&store, "n1", "s1").await;
    join(&store, "n2", "s2").await;
    observe(&store, "n1", "s1", "db", &[("db_0", "PRIMARY")]).await;
    observe(&store, "n2", "s2", "db", &[("db_0", "SECONDARY")]).await;

    controller.run_once().await.unwrap();

    assert!(queue(&store, "n1").await.is_empty());
    assert!(queue(&store, "n2").await.is_empty());
}

// ============================================================================
// Promotion safety
// ============================================================================

#[tokio::test]
async fn test_promotion_proceeds_when_primary_vacant() {
    let (store, controller) = setup().await;
    add_resource(&store, "db", &["n1", "n2"]).await;
    join(&store, "n1", "s1").await;
    join(&store, "n2", "s2").await;
    observe(&store, "n1", "s1", "db", &[("db_0", "SECONDARY")]).await;
    observe(&store, "n2", "s2", "db", &[("db_0", "SECONDARY")]).await;

    controller.run_once().await.unwrap();

    let n1 = queue(&store, "n1").await;
    assert_eq!(n1.len(), 1);
    assert_eq!(transition(&n1[0]), ("SECONDARY", "PRIMARY"));
    assert!(queue(&store, "n2").await.is_empty());
}

#[tokio::test]
async fn test_promotion_waits_for_observed_demotion() {
    let (store, controller) = setup().await;
    add_resource(&store, "db", &["n1", "n2"]).await;
    join(&store, "n1", "s1").await;
    join(&store, "n2", "s2").await;
    // Roles are reversed from the preference list: n2 currently holds the
    // primary that n1 should take over.
    observe(&store, "n1", "s1", "db", &[("db_0", "SECONDARY")]).await;
    observe(&store, "n2", "s2", "db", &[("db_0", "PRIMARY")]).await;

    controller.run_once().await.unwrap();

    // Only the demotion goes out; promoting n1 now would mean two primaries.
    let n2 = queue(&store, "n2").await;
    assert_eq!(n2.len(), 1);
    assert_eq!(transition(&n2[0]), ("PRIMARY", "SECONDARY"));
    assert!(queue(&store, "n1").await.is_empty());

    // The demotion completes: n2 reports SECONDARY and acknowledges.
    observe(&store, "n2", "s2", "db", &[("db_0", "SECONDARY")]).await;
    store
        .delete(&paths::message(CLUSTER, "n2", n2[0].id()))
        .await
        .unwrap();

    controller.run_once().await.unwrap();

    let n1 = queue(&store, "n1").await;
    assert_eq!(n1.len(), 1);
    assert_eq!(transition(&n1[0]), ("SECONDARY", "PRIMARY"));
}

// ============================================================================
// Session fencing
// ============================================================================

#[tokio::test]
async fn test_stale_session_observed_state_is_ignored() {
    let (store, controller) = setup().await;
    add_resource(&store, "db", &["n1", "n2"]).await;
    // n1 reconnected under s1-new; its old incarnation reported PRIMARY.
    join(&store, "n1", "s1-new").await;
    join(&store, "n2", "s2").await;
    observe(&store, "n1", "s1-old", "db", &[("db_0", "PRIMARY")]).await;

    controller.run_once().await.unwrap();

    // The stale PRIMARY does not exist as far as the pipeline is concerned:
    // n1 starts over from OFFLINE, and the stale holder does not block
    // anything.
    let n1 = queue(&store, "n1").await;
    assert_eq!(n1.len(), 1);
    assert_eq!(transition(&n1[0]), ("OFFLINE", "SECONDARY"));
    assert_eq!(n1[0].target_session(), Some("s1-new"));
}

// ============================================================================
// Membership and configuration
// ============================================================================

#[tokio::test]
async fn test_dead_node_receives_nothing() {
    let (store, controller) = setup().await;
    add_resource(&store, "db", &["n1", "n2"]).await;
    join(&store, "n1", "s1").await;
    // n2 never joined.

    controller.run_once().await.unwrap();

    assert_eq!(queue(&store, "n1").await.len(), 1);
    assert!(queue(&store, "n2").await.is_empty());
}

#[tokio::test]
async fn test_disabled_node_receives_nothing() {
    let (store, controller) = setup().await;
    add_resource(&store, "db", &["n1", "n2"]).await;
    join(&store, "n1", "s1").await;
    join(&store, "n2", "s2").await;

    let mut config = InstanceConfig::new("n2");
    config.set_enabled(false);
    store
        .write(
            &paths::instance_config(CLUSTER, "n2"),
            config.into_record(),
            None,
        )
        .await
        .unwrap();

    controller.run_once().await.unwrap();

    assert_eq!(queue(&store, "n1").await.len(), 1);
    assert!(queue(&store, "n2").await.is_empty());
}

#[tokio::test]
async fn test_unassigned_replica_is_driven_home() {
    let (store, controller) = setup().await;
    add_resource(&store, "db", &["n1", "n2"]).await;
    join(&store, "n1", "s1").await;
    join(&store, "n2", "s2").await;
    join(&store, "n3", "s3").await;
    observe(&store, "n1", "s1", "db", &[("db_0", "PRIMARY")]).await;
    observe(&store, "n2", "s2", "db", &[("db_0", "SECONDARY")]).await;
    // n3 holds a replica the placement no longer assigns to it.
    observe(&store, "n3", "s3", "db", &[("db_0", "SECONDARY")]).await;

    controller.run_once().await.unwrap();

    let n3 = queue(&store, "n3").await;
    assert_eq!(n3.len(), 1);
    assert_eq!(transition(&n3[0]), ("SECONDARY", "OFFLINE"));
}

#[tokio::test]
async fn test_malformed_policy_does_not_poison_run() {
    let (store, controller) = setup().await;
    add_resource(&store, "db", &["n1", "n2"]).await;

    // A second resource whose record is missing everything.
    store
        .write(
            &paths::placement(CLUSTER, "broken"),
            helmsman::record::Record::new("broken"),
            None,
        )
        .await
        .unwrap();

    join(&store, "n1", "s1").await;
    join(&store, "n2", "s2").await;

    controller.run_once().await.unwrap();
    assert_eq!(queue(&store, "n1").await.len(), 1);
}

// ============================================================================
// Customized placement
// ============================================================================

#[tokio::test]
async fn test_customized_map_is_taken_verbatim() {
    let (store, controller) = setup().await;
    join(&store, "n1", "s1").await;
    join(&store, "n2", "s2").await;

    let mut ideal = IdealState::new("cache", 1, 1, "PrimarySecondary", RebalanceMode::Customized);
    let mut map = std::collections::BTreeMap::new();
    map.insert("n2".to_string(), "PRIMARY".to_string());
    ideal.set_instance_state_map("cache_0", map);
    store
        .write(&paths::placement(CLUSTER, "cache"), ideal.into_record(), None)
        .await
        .unwrap();

    controller.run_once().await.unwrap();

    // Preference order is irrelevant in CUSTOMIZED mode; n2 is the one
    // driven toward PRIMARY and n1 stays untouched.
    let n2 = queue(&store, "n2").await;
    assert_eq!(n2.len(), 1);
    assert_eq!(transition(&n2[0]), ("OFFLINE", "SECONDARY"));
    assert!(queue(&store, "n1").await.is_empty());
}
