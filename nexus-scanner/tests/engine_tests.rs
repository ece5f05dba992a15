// Tests for the engine: scan lifecycle, observer, rendering and control

use async_trait::async_trait;
use nexus_core::{
    Database, GraphPayload, GraphStore, KeyValueStore, MemoryStore, PersistedState, RenderIntent,
};
use nexus_scanner::error::Result;
use nexus_scanner::{
    Command, ControlClient, Engine, EngineConfig, GraphRenderer, PageEvent, ScanError,
    StaticBrowser,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const ROOT: &str = "https://www.notion.so/root";
const CHILD: &str = "https://www.notion.so/child";
const OTHER: &str = "https://www.notion.so/other";

const ROOT_HTML: &str = r#"<html><head><title>Root | Notion</title></head><body>
    <main><a href="/child">Child</a></main>
</body></html>"#;

const CHILD_HTML: &str = r#"<html><head><title>Child | Notion</title></head><body>
    <main><p>Child body</p></main>
</body></html>"#;

const OTHER_HTML: &str = r#"<html><head><title>Other | Notion</title></head><body>
    <main><p>Other body</p></main>
</body></html>"#;

const UNTITLED_HTML: &str = r#"<html><body><main><a href="/child">Child</a></main></body></html>"#;

fn create_browser() -> Arc<StaticBrowser> {
    let browser = StaticBrowser::new()
        .with_page(ROOT, ROOT_HTML)
        .with_page(CHILD, CHILD_HTML)
        .with_page(OTHER, OTHER_HTML);
    browser.set_current(ROOT);
    Arc::new(browser)
}

fn create_engine(browser: Arc<StaticBrowser>) -> Engine {
    Engine::new(browser, Arc::new(MemoryStore::new()), EngineConfig::default())
}

/// Let spawned tasks run and virtual time pass.
async fn settle(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

#[derive(Default)]
struct RecordingRenderer {
    rendered: Mutex<Vec<GraphPayload>>,
    closed: AtomicUsize,
}

#[async_trait]
impl GraphRenderer for RecordingRenderer {
    async fn render(&self, payload: &GraphPayload) -> Result<()> {
        self.rendered.lock().unwrap().push(payload.clone());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Scan Lifecycle Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_start_scan_records_current_page_and_links() {
    let mut engine = create_engine(create_browser());

    engine.start_scan().await.unwrap();
    assert!(engine.is_scanning());
    assert!(engine.state().scanning().await.unwrap());

    let data = engine.graph().load().await.unwrap();
    assert_eq!(data.pages[ROOT].name, "Root");
    assert_eq!(data.pages[CHILD].name, "Child");
    assert_eq!(data.links.len(), 1);
    assert_eq!(data.links[0].source_name, "Root");
    assert_eq!(data.links[0].target_name, "Child");
}

#[tokio::test(start_paused = true)]
async fn test_periodic_sweeps_keep_links_unique() {
    let mut engine = create_engine(create_browser());

    engine.start_scan().await.unwrap();
    settle(10_000).await;

    let data = engine.graph().load().await.unwrap();
    assert_eq!(data.links.len(), 1);
    assert_eq!(data.pages.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_periodic_sweep_records_late_content() {
    let browser = create_browser();
    browser.set_page(ROOT, CHILD_HTML.replace("Child", "Root").as_str());
    let mut engine = create_engine(browser.clone());

    engine.start_scan().await.unwrap();
    assert!(engine.graph().load().await.unwrap().links.is_empty());

    browser.set_page(ROOT, ROOT_HTML);
    settle(2_500).await;

    let data = engine.graph().load().await.unwrap();
    assert_eq!(data.links.len(), 1);
    assert_eq!(data.links[0].target, CHILD);
    assert_eq!(data.links[0].target_name, "Child");
}

#[tokio::test(start_paused = true)]
async fn test_start_scan_clears_previous_data() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let stale = GraphStore::new(PersistedState::new(store.clone()));
    stale.upsert_page(OTHER, "Stale").await.unwrap();

    let mut engine = Engine::new(create_browser(), store, EngineConfig::default());
    engine.start_scan().await.unwrap();

    let data = engine.graph().load().await.unwrap();
    assert!(!data.pages.contains_key(OTHER));
}

#[tokio::test(start_paused = true)]
async fn test_stop_scan_ignores_later_events() {
    let browser = create_browser();
    let mut engine = create_engine(browser.clone());
    let events = engine.events();

    engine.start_scan().await.unwrap();
    settle(100).await;
    engine.stop_scan().await.unwrap();
    assert!(!engine.is_scanning());
    assert!(!engine.state().scanning().await.unwrap());

    browser.set_current(OTHER);
    let _ = events.send(PageEvent::DomMutated);
    settle(10_000).await;

    let data = engine.graph().load().await.unwrap();
    assert!(!data.pages.contains_key(OTHER));
}

#[tokio::test(start_paused = true)]
async fn test_placeholder_title_is_retried() {
    let browser = create_browser();
    browser.set_page(ROOT, UNTITLED_HTML);
    let mut engine = create_engine(browser.clone());

    engine.start_scan().await.unwrap();
    let data = engine.graph().load().await.unwrap();
    assert_eq!(data.pages[ROOT].name, "Untitled Page");
    assert_eq!(data.links[0].source_name, "Untitled Page");

    browser.set_page(ROOT, ROOT_HTML);
    settle(1_500).await;

    let data = engine.graph().load().await.unwrap();
    assert_eq!(data.pages[ROOT].name, "Root");
    assert_eq!(data.links.len(), 1);
    assert_eq!(data.links[0].source_name, "Root");
    assert_eq!(engine.session().unwrap().current().unwrap().title, "Root");
}

// ============================================================================
// Observer Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_in_place_navigation_keeps_source_name() {
    let browser = create_browser();
    browser.set_page(
        ROOT,
        r#"<html><head><title>笔记 Notes | Notion</title></head><body><main></main></body></html>"#,
    );
    let mut engine = create_engine(browser.clone());
    let events = engine.events();

    engine.start_scan().await.unwrap();
    settle(100).await;
    assert_eq!(engine.graph().load().await.unwrap().pages[ROOT].name, "笔记");

    browser.set_current(OTHER);
    events.send(PageEvent::DomMutated).unwrap();
    settle(2_000).await;

    let data = engine.graph().load().await.unwrap();
    assert_eq!(data.pages[ROOT].name, "笔记");
    let link = data.links.iter().find(|l| l.target == OTHER).unwrap();
    assert_eq!(link.source_name, "笔记");
}

#[tokio::test(start_paused = true)]
async fn test_in_place_navigation_records_edge() {
    let browser = create_browser();
    let mut engine = create_engine(browser.clone());
    let events = engine.events();

    engine.start_scan().await.unwrap();
    settle(100).await;

    browser.set_current(OTHER);
    events.send(PageEvent::DomMutated).unwrap();
    settle(2_000).await;

    let data = engine.graph().load().await.unwrap();
    let link = data.links.iter().find(|l| l.target == OTHER).unwrap();
    assert_eq!(link.source, ROOT);
    assert_eq!(link.source_name, "Root");
    assert_eq!(link.target_name, "Other");
    assert_eq!(engine.session().unwrap().current().unwrap().url, OTHER);
}

#[tokio::test(start_paused = true)]
async fn test_navigation_intent_then_history_traversal() {
    let browser = create_browser();
    let mut engine = create_engine(browser.clone());
    let events = engine.events();

    engine.start_scan().await.unwrap();
    events.send(PageEvent::NavigationIntent).unwrap();
    settle(100).await;

    browser.set_current(OTHER);
    events.send(PageEvent::HistoryTraversed).unwrap();
    settle(2_000).await;

    let data = engine.graph().load().await.unwrap();
    assert!(data.links.iter().any(|l| l.source == ROOT && l.target == OTHER));
}

#[tokio::test(start_paused = true)]
async fn test_hover_and_click_events() {
    let browser = create_browser();
    browser.set_page(
        ROOT,
        r#"<html><head><title>Root | Notion</title></head><body>
            <main><p>No links yet</p></main>
        </body></html>"#,
    );
    let mut engine = create_engine(browser.clone());
    let events = engine.events();

    engine.start_scan().await.unwrap();
    assert!(engine.graph().load().await.unwrap().links.is_empty());

    // A mention popup mounts the link after the sweep ran
    browser.set_page(ROOT, ROOT_HTML);
    events
        .send(PageEvent::LinkHovered {
            href: "/child".to_string(),
        })
        .unwrap();
    events
        .send(PageEvent::LinkClicked {
            href: "/child".to_string(),
        })
        .unwrap();
    settle(100).await;

    let data = engine.graph().load().await.unwrap();
    assert_eq!(data.links.len(), 1);
    assert_eq!(data.links[0].source, ROOT);
    assert_eq!(data.links[0].target, CHILD);

    let from = engine.context().handoff.take().await.unwrap();
    assert_eq!(from.url, ROOT);
    assert_eq!(from.title.as_deref(), Some("Root"));
}

// ============================================================================
// Graph Rendering Tests
// ============================================================================

#[tokio::test]
async fn test_show_graph_without_data() {
    let mut engine = create_engine(create_browser());

    let result = engine.show_graph().await;
    assert!(matches!(result, Err(ScanError::NoScanData)));

    let ack = engine.execute(Command::ShowGraph).await;
    assert!(!ack.success);
    assert_eq!(ack.error.as_deref(), Some("No scan data available"));
}

#[tokio::test(start_paused = true)]
async fn test_toggle_overlay_renders_then_closes() {
    let renderer = Arc::new(RecordingRenderer::default());
    let mut engine = create_engine(create_browser()).with_renderer(renderer.clone());

    engine.start_scan().await.unwrap();

    assert!(engine.execute(Command::ToggleOverlay).await.success);
    {
        let rendered = renderer.rendered.lock().unwrap();
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].nodes.len(), 2);
        assert_eq!(rendered[0].links.len(), 1);
        let root = rendered[0].nodes.iter().find(|n| n.id == ROOT).unwrap();
        assert!(root.is_root);
    }

    assert!(engine.execute(Command::ToggleOverlay).await.success);
    assert_eq!(renderer.closed.load(Ordering::SeqCst), 1);
    assert_eq!(renderer.rendered.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_render_intents() {
    let browser = create_browser();
    let renderer = Arc::new(RecordingRenderer::default());
    let mut engine = create_engine(browser.clone()).with_renderer(renderer.clone());

    let target = format!("{}?pvs=4", CHILD);
    engine
        .handle_intent(RenderIntent::Navigate { url: target.clone() })
        .await
        .unwrap();
    assert_eq!(browser.history(), vec![target]);

    engine.handle_intent(RenderIntent::Close).await.unwrap();
    assert_eq!(renderer.closed.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Persistence Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_resume_keeps_recorded_data() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nexus.db");

    {
        let store: Arc<dyn KeyValueStore> = Arc::new(Database::new(&db_path).unwrap());
        let mut engine = Engine::new(create_browser(), store, EngineConfig::default());
        engine.start_scan().await.unwrap();
        // Process goes away without a clean stop
        engine.session().unwrap().stop();
    }

    let browser = create_browser();
    browser.set_current(CHILD);
    let store: Arc<dyn KeyValueStore> = Arc::new(Database::new(&db_path).unwrap());
    let mut engine = Engine::new(browser, store, EngineConfig::default());

    engine.resume().await.unwrap();
    assert!(engine.is_scanning());
    assert!(!engine.is_auto_browsing());

    let data = engine.graph().load().await.unwrap();
    assert!(data.pages.contains_key(ROOT));
    assert_eq!(data.links.len(), 1);
    assert_eq!(engine.session().unwrap().current().unwrap().url, CHILD);
}

#[tokio::test]
async fn test_resume_without_flags_is_idle() {
    let mut engine = create_engine(create_browser());

    engine.resume().await.unwrap();
    assert!(!engine.is_scanning());
    assert!(engine.graph().load().await.unwrap().pages.is_empty());
}

// ============================================================================
// Control Channel Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_spawned_engine_answers_commands() {
    let (handle, task) = create_engine(create_browser()).spawn();

    let ack = handle.send(Command::StartScan).await.unwrap();
    assert!(ack.success);
    let ack = handle.send(Command::ShowGraph).await.unwrap();
    assert!(ack.success);
    let ack = handle
        .intent(RenderIntent::Navigate {
            url: CHILD.to_string(),
        })
        .await
        .unwrap();
    assert!(ack.success);

    drop(handle);
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_control_client_reinjects_once() {
    let (dead, task) = create_engine(create_browser()).spawn();
    task.abort();
    let _ = task.await;

    let injected = Arc::new(AtomicUsize::new(0));
    let counter = injected.clone();
    let mut client = ControlClient::new(dead, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        create_engine(create_browser()).spawn().0
    });

    let ack = client.send(Command::StartScan).await.unwrap();
    assert!(ack.success);
    assert_eq!(injected.load(Ordering::SeqCst), 1);

    let ack = client.send(Command::StopScan).await.unwrap();
    assert!(ack.success);
    assert_eq!(injected.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_control_client_surfaces_second_failure() {
    let (dead, task) = create_engine(create_browser()).spawn();
    task.abort();
    let _ = task.await;

    let replacement = dead.clone();
    let mut client = ControlClient::new(dead, move || replacement.clone());

    let result = client.send(Command::StartScan).await;
    assert!(matches!(result, Err(ScanError::EndpointUnavailable(_))));
}
