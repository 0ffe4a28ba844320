//! End-to-end convergence: admin declares a resource, participants host it,
//! and repeated controller passes drive every partition to a full
//! primary/secondary assignment.
//!
//! The controller's event loop is not spawned; each round is one explicit
//! `run_once` followed by a synchronous drain of every node's queue, which
//! makes convergence deterministic to assert on.

use std::collections::BTreeMap;
use std::sync::Arc;

use helmsman::admin::ClusterAdmin;
use helmsman::config::{ControllerConfig, ParticipantConfig};
use helmsman::controller::Controller;
use helmsman::model::{Message, StateModelDefinition};
use helmsman::participant::Participant;
use helmsman::participant::state_model::{SpecFactory, StateModelFactory, StateModelSpec};
use helmsman::store::{ClusterStore, MemoryStore, paths};

const CLUSTER: &str = "e2e";
const NODES: [&str; 3] = ["n1", "n2", "n3"];

struct Replica;

fn factory() -> Arc<dyn StateModelFactory> {
    let spec = StateModelSpec::new("PrimarySecondary")
        .on("OFFLINE", "SECONDARY", |_m: &mut Replica, _ctx| Ok(()))
        .on("SECONDARY", "PRIMARY", |_m, _ctx| Ok(()))
        .on("PRIMARY", "SECONDARY", |_m, _ctx| Ok(()))
        .on("SECONDARY", "OFFLINE", |_m, _ctx| Ok(()))
        .on("OFFLINE", "DROPPED", |_m, _ctx| Ok(()))
        .on("ERROR", "OFFLINE", |_m, _ctx| Ok(()));
    Arc::new(SpecFactory::new(spec, |_resource, _partition| Replica))
}

async fn drain(store: &Arc<MemoryStore>, participant: &Participant) {
    let queue = paths::message_queue(CLUSTER, participant.node());
    for id in store.list_children(&queue).await.unwrap() {
        let path = paths::message(CLUSTER, participant.node(), &id);
        if let Some(read) = store.read(&path).await.unwrap() {
            let mut message = Message::from_record(read.record);
            message.mark_read();
            let _ = participant.executor().execute(message).await;
        }
    }
}

/// partition -> state -> holder count, aggregated over all nodes.
async fn state_census(admin: &ClusterAdmin) -> BTreeMap<String, BTreeMap<String, usize>> {
    let mut census: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    for node in NODES {
        for current in admin.observed_state(node).await.unwrap() {
            for (partition, state) in current.partition_states() {
                *census
                    .entry(partition.to_string())
                    .or_default()
                    .entry(state.to_string())
                    .or_default() += 1;
            }
        }
    }
    census
}

#[tokio::test]
async fn test_cluster_converges_to_full_assignment() {
    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn ClusterStore> = Arc::clone(&store) as Arc<dyn ClusterStore>;

    let admin = ClusterAdmin::new(CLUSTER, Arc::clone(&dyn_store));
    admin
        .add_state_model_def(&StateModelDefinition::primary_secondary())
        .await
        .unwrap();
    admin
        .add_resource(
            "db",
            &NODES.map(str::to_string),
            4,
            1,
            "PrimarySecondary",
            42,
        )
        .await
        .unwrap();

    let mut participants = Vec::new();
    for node in NODES {
        let participant = Participant::connect(
            ParticipantConfig::new(CLUSTER, node),
            Arc::clone(&dyn_store),
        )
        .await
        .unwrap();
        participant.register_factory(factory()).await.unwrap();
        participants.push(participant);
    }

    let controller =
        Controller::new(ControllerConfig::new(CLUSTER), Arc::clone(&dyn_store)).unwrap();

    // Bootstrap needs two hops (OFFLINE→SECONDARY, then SECONDARY→PRIMARY
    // for the preferred node); give it a few rounds of headroom.
    for _ in 0..4 {
        controller.run_once().await.unwrap();
        for participant in &participants {
            drain(&store, participant).await;
        }
    }

    let census = state_census(&admin).await;
    assert_eq!(census.len(), 4, "all four partitions have observed state");
    for (partition, states) in &census {
        assert_eq!(
            states.get("PRIMARY"),
            Some(&1),
            "{partition} has exactly one primary: {states:?}"
        );
        assert_eq!(
            states.get("SECONDARY"),
            Some(&1),
            "{partition} has exactly one secondary: {states:?}"
        );
        assert_eq!(states.get("ERROR"), None);
    }

    // Converged: another pass emits nothing.
    controller.run_once().await.unwrap();
    for node in NODES {
        assert!(
            store
                .list_children(&paths::message_queue(CLUSTER, node))
                .await
                .unwrap()
                .is_empty(),
            "{node} received messages after convergence"
        );
    }
}

#[tokio::test]
async fn test_failover_after_primary_disconnects() {
    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn ClusterStore> = Arc::clone(&store) as Arc<dyn ClusterStore>;

    let admin = ClusterAdmin::new(CLUSTER, Arc::clone(&dyn_store));
    admin
        .add_state_model_def(&StateModelDefinition::primary_secondary())
        .await
        .unwrap();
    admin
        .add_resource(
            "db",
            &NODES.map(str::to_string),
            1,
            1,
            "PrimarySecondary",
            7,
        )
        .await
        .unwrap();

    let mut participants = Vec::new();
    for node in NODES {
        let participant = Participant::connect(
            ParticipantConfig::new(CLUSTER, node),
            Arc::clone(&dyn_store),
        )
        .await
        .unwrap();
        participant.register_factory(factory()).await.unwrap();
        participants.push(participant);
    }
    let controller =
        Controller::new(ControllerConfig::new(CLUSTER), Arc::clone(&dyn_store)).unwrap();

    for _ in 0..4 {
        controller.run_once().await.unwrap();
        for participant in &participants {
            drain(&store, participant).await;
        }
    }

    // Find and kill the current primary.
    let mut primary_index = None;
    for (i, participant) in participants.iter().enumerate() {
        for current in admin.observed_state(participant.node()).await.unwrap() {
            if current.partition_states().any(|(_, s)| s == "PRIMARY") {
                primary_index = Some(i);
            }
        }
    }
    let dead = participants.remove(primary_index.expect("a primary was elected"));
    dead.disconnect().await.unwrap();

    for _ in 0..4 {
        controller.run_once().await.unwrap();
        for participant in &participants {
            drain(&store, participant).await;
        }
    }

    // One of the survivors holds the primary now.
    let mut primaries = 0;
    for participant in &participants {
        for current in admin.observed_state(participant.node()).await.unwrap() {
            primaries += current
                .partition_states()
                .filter(|(_, s)| *s == "PRIMARY")
                .count();
        }
    }
    assert_eq!(primaries, 1, "surviving nodes elected a new primary");
}
