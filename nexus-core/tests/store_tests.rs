// Tests for the persisted graph store

use nexus_core::data::{MemoryStore, PersistedState};
use nexus_core::store::GraphStore;
use std::collections::HashSet;
use std::sync::Arc;

const ROOT: &str = "https://www.notion.so/root";
const CHILD: &str = "https://www.notion.so/child";

fn create_store() -> GraphStore {
    GraphStore::new(PersistedState::new(Arc::new(MemoryStore::new())))
}

// ============================================================================
// Merge Tests
// ============================================================================

#[tokio::test]
async fn test_upsert_link_records_both_pages() {
    let store = create_store();

    store.upsert_link(ROOT, "Root", CHILD, "Child").await.unwrap();

    let data = store.load().await.unwrap();
    assert_eq!(data.pages[ROOT].name, "Root");
    assert_eq!(data.pages[CHILD].name, "Child");
    assert_eq!(data.links.len(), 1);
    assert_eq!(data.links[0].source, ROOT);
    assert_eq!(data.links[0].target, CHILD);
    assert_eq!(data.links[0].source_name, "Root");
    assert_eq!(data.links[0].target_name, "Child");
}

#[tokio::test]
async fn test_repeated_upsert_is_idempotent() {
    let store = create_store();

    store.upsert_link(ROOT, "Root", CHILD, "Child").await.unwrap();
    let before = store.load().await.unwrap();

    let stats = store.upsert_link(ROOT, "Root", CHILD, "Child").await.unwrap();
    assert!(stats.is_empty());
    assert_eq!(store.load().await.unwrap(), before);
}

#[tokio::test]
async fn test_latest_names_win_and_pairs_stay_unique() {
    let store = create_store();
    let third = "https://www.notion.so/third";

    let calls = [
        (ROOT, "Root", CHILD, "Child"),
        (ROOT, "Root", third, "Third"),
        (ROOT, "Root v2", CHILD, "Child v2"),
        (CHILD, "Child v2", third, "Third"),
        (ROOT, "Root v3", third, "Third v3"),
    ];
    for (s, sn, t, tn) in calls {
        store.upsert_link(s, sn, t, tn).await.unwrap();
    }

    let data = store.load().await.unwrap();
    let pairs: HashSet<(&str, &str)> = data
        .links
        .iter()
        .map(|l| (l.source.as_str(), l.target.as_str()))
        .collect();
    assert_eq!(pairs.len(), data.links.len());
    assert_eq!(data.links.len(), 3);

    let root_child = data
        .links
        .iter()
        .find(|l| l.source == ROOT && l.target == CHILD)
        .unwrap();
    assert_eq!(root_child.source_name, "Root v2");
    assert_eq!(root_child.target_name, "Child v2");

    let root_third = data
        .links
        .iter()
        .find(|l| l.source == ROOT && l.target == third)
        .unwrap();
    assert_eq!(root_third.source_name, "Root v3");
    assert_eq!(root_third.target_name, "Third v3");
}

#[tokio::test]
async fn test_rename_cascade_through_store() {
    let store = create_store();
    store.upsert_page(ROOT, "A").await.unwrap();
    store.upsert_link(ROOT, "A", CHILD, "Child").await.unwrap();

    store.rename_cascade(ROOT, "A", "B").await.unwrap();

    let data = store.load().await.unwrap();
    assert_eq!(data.pages[ROOT].name, "B");
    assert_eq!(data.links[0].source_name, "B");
}

#[tokio::test]
async fn test_clear_empties_graph() {
    let store = create_store();
    store.upsert_link(ROOT, "Root", CHILD, "Child").await.unwrap();

    store.clear().await.unwrap();

    let counts = store.counts().await.unwrap();
    assert_eq!(counts.pages, 0);
    assert_eq!(counts.links, 0);
}

// ============================================================================
// Interleaving Tests
// ============================================================================

#[tokio::test]
async fn test_stale_writer_drops_update_and_resweep_heals() {
    let store = create_store();
    let state = store.state().clone();
    let other = "https://www.notion.so/other";

    // Writer A and writer B both read the empty graph.
    let mut a = state.scan_data().await.unwrap();
    let mut b = state.scan_data().await.unwrap();

    a.upsert_link(ROOT, "Root", CHILD, "Child", 1);
    b.upsert_link(ROOT, "Root", other, "Other", 2);

    state.set_scan_data(&a).await.unwrap();
    state.set_scan_data(&b).await.unwrap();

    // B's stale write lost A's link.
    let data = store.load().await.unwrap();
    assert!(!data.links.iter().any(|l| l.target == CHILD));

    // The next idempotent sweep by A restores it.
    store.upsert_link(ROOT, "Root", CHILD, "Child").await.unwrap();
    let data = store.load().await.unwrap();
    assert_eq!(data.links.len(), 2);
}

// ============================================================================
// Snapshot Tests
// ============================================================================

#[tokio::test]
async fn test_snapshot_links_match_node_ids() {
    let store = create_store();
    store.upsert_link(ROOT, "Root", CHILD, "Child").await.unwrap();

    let payload = store.snapshot().await.unwrap();
    let ids: HashSet<&str> = payload.nodes.iter().map(|n| n.id.as_str()).collect();
    for link in &payload.links {
        assert!(ids.contains(link.source.as_str()));
        assert!(ids.contains(link.target.as_str()));
    }
    for node in &payload.nodes {
        assert_eq!(node.id, node.href);
    }
}
