// The engine: owns the scan and auto-browse sessions and answers commands

use crate::autobrowse::{AutoBrowser, BrowseOutcome, BrowseSummary};
use crate::browser::{Browser, PageEvent};
use crate::config::EngineConfig;
use crate::context::ScanContext;
use crate::error::{Result, ScanError};
use crate::handoff::HandoffSlot;
use crate::navigation::{NavigationObserver, capture_page, schedule_retitle};
use crate::session::ScanSession;
use crate::sources::{database_sweep, full_sweep, log_failure, sidebar_sweep, sweep_loop};
use async_trait::async_trait;
use nexus_core::{
    GraphPayload, GraphStore, KeyValueStore, MemoryStore, PersistedState, RenderIntent,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Control commands from the toggle/status surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    ToggleOverlay,
    StartScan,
    StopScan,
    ShowGraph,
    StartAutoBrowse,
    StopAutoBrowse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl From<Result<()>> for Ack {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => Ack::ok(),
            Err(e) => Ack::failed(e),
        }
    }
}

/// Displays graph payloads. The engine only hands over finished snapshots.
#[async_trait]
pub trait GraphRenderer: Send + Sync {
    async fn render(&self, payload: &GraphPayload) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

struct ActiveScan {
    session: Arc<ScanSession>,
}

struct ActiveBrowse {
    token: CancellationToken,
    task: JoinHandle<BrowseSummary>,
}

pub struct Engine {
    ctx: ScanContext,
    renderer: Option<Arc<dyn GraphRenderer>>,
    overlay_open: bool,
    scan: Option<ActiveScan>,
    browse: Option<ActiveBrowse>,
    events_tx: UnboundedSender<PageEvent>,
    events_rx: Arc<Mutex<UnboundedReceiver<PageEvent>>>,
}

impl Engine {
    pub fn new(
        browser: Arc<dyn Browser>,
        store: Arc<dyn KeyValueStore>,
        config: EngineConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let ctx = ScanContext::new(
            browser,
            GraphStore::new(PersistedState::new(store)),
            HandoffSlot::new(Arc::new(MemoryStore::new())),
            Arc::new(config),
        );
        Self {
            ctx,
            renderer: None,
            overlay_open: false,
            scan: None,
            browse: None,
            events_tx,
            events_rx: Arc::new(Mutex::new(events_rx)),
        }
    }

    /// Keep the handoff slot somewhere that survives the engine, so a
    /// re-created engine can still complete the edge.
    pub fn with_handoff_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.ctx.handoff = HandoffSlot::new(store);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn GraphRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn context(&self) -> &ScanContext {
        &self.ctx
    }

    pub fn graph(&self) -> &GraphStore {
        &self.ctx.store
    }

    pub fn state(&self) -> &PersistedState {
        self.ctx.store.state()
    }

    /// Sender for page events. Events sent while no scan runs are dropped
    /// when the next scan starts.
    pub fn events(&self) -> UnboundedSender<PageEvent> {
        self.events_tx.clone()
    }

    pub fn session(&self) -> Option<Arc<ScanSession>> {
        self.scan.as_ref().map(|scan| scan.session.clone())
    }

    pub fn is_scanning(&self) -> bool {
        self.scan
            .as_ref()
            .is_some_and(|scan| scan.session.is_active())
    }

    pub fn is_auto_browsing(&self) -> bool {
        self.browse
            .as_ref()
            .is_some_and(|browse| !browse.task.is_finished())
    }

    /// Start a fresh scan: previous scan data is cleared first.
    pub async fn start_scan(&mut self) -> Result<()> {
        self.ctx.store.clear().await?;
        self.state().set_scanning(true).await?;
        self.begin_scan().await
    }

    /// Start observing without touching recorded data. No-op while a scan is
    /// already running.
    async fn begin_scan(&mut self) -> Result<()> {
        if self.is_scanning() {
            return Ok(());
        }

        let session = Arc::new(ScanSession::new());
        info!("Scan mode activated (session {})", session.id());

        {
            let mut events = self.events_rx.lock().await;
            while events.try_recv().is_ok() {}
        }

        match capture_page(&self.ctx, &session).await {
            Ok(Some(capture)) if self.ctx.resolver().is_placeholder(&capture.title) => {
                schedule_retitle(
                    self.ctx.clone(),
                    session.clone(),
                    self.ctx.config.timings.title_retry_delay,
                );
            }
            Ok(_) => {}
            Err(e) => warn!("Page capture failed: {}", e),
        }

        log_failure("Full sweep", full_sweep(&self.ctx, &session).await);
        log_failure("Sidebar sweep", sidebar_sweep(&self.ctx, &session).await);
        log_failure("Database sweep", database_sweep(&self.ctx, &session).await);

        tokio::spawn(sweep_loop(self.ctx.clone(), session.clone()));

        let ctx = self.ctx.clone();
        let observed = session.clone();
        let events = self.events_rx.clone();
        tokio::spawn(async move {
            NavigationObserver::new(ctx, observed).await.run(events).await;
        });

        self.scan = Some(ActiveScan { session });
        Ok(())
    }

    /// Stop scanning. Auto-browse depends on the scan and stops with it.
    pub async fn stop_scan(&mut self) -> Result<()> {
        if self.browse.is_some() {
            self.stop_auto_browse().await?;
        }
        if let Some(scan) = self.scan.take() {
            scan.session.stop();
            info!("Scan mode deactivated (session {})", scan.session.id());
        }
        self.state().set_scanning(false).await?;
        Ok(())
    }

    /// Snapshot the graph and hand it to the renderer.
    pub async fn show_graph(&mut self) -> Result<GraphPayload> {
        let data = self.ctx.store.load().await?;
        if data.pages.is_empty() {
            return Err(ScanError::NoScanData);
        }

        let payload = data.snapshot();
        debug!(
            "Generated graph data: {} nodes, {} links",
            payload.nodes.len(),
            payload.links.len()
        );
        if let Some(renderer) = &self.renderer {
            renderer.render(&payload).await?;
            self.overlay_open = true;
        }
        Ok(payload)
    }

    pub async fn toggle_overlay(&mut self) -> Result<()> {
        if self.overlay_open {
            self.close_overlay().await
        } else {
            self.show_graph().await.map(|_| ())
        }
    }

    async fn close_overlay(&mut self) -> Result<()> {
        if let Some(renderer) = &self.renderer {
            renderer.close().await?;
        }
        self.overlay_open = false;
        Ok(())
    }

    /// Act on a message from the rendering surface. Navigation targets are
    /// used verbatim.
    pub async fn handle_intent(&mut self, intent: RenderIntent) -> Result<()> {
        match intent {
            RenderIntent::Close => self.close_overlay().await,
            RenderIntent::Navigate { url } => {
                info!("Navigating to {} from graph", url);
                self.ctx.browser.navigate(&url).await
            }
        }
    }

    pub async fn start_auto_browse(&mut self) -> Result<()> {
        if self.is_auto_browsing() {
            return Ok(());
        }
        if !self.is_scanning() {
            self.state().set_scanning(true).await?;
            self.begin_scan().await?;
        }
        let Some(session) = self.session() else {
            return Err(ScanError::Other("scan session missing".to_string()));
        };

        self.state().set_auto_browsing(true).await?;
        info!("Auto-browse started");

        let token = CancellationToken::new();
        let driver = AutoBrowser::new(self.ctx.clone(), session, token.clone());
        let state = self.state().clone();
        let task = tokio::spawn(async move {
            let summary = driver.run().await;
            if summary.outcome != BrowseOutcome::Stopped {
                log_failure("Progress reset", state.set_progress(None).await.map_err(Into::into));
                log_failure(
                    "Auto-browse flag reset",
                    state.set_auto_browsing(false).await.map_err(Into::into),
                );
            }
            summary
        });

        self.browse = Some(ActiveBrowse { token, task });
        Ok(())
    }

    pub async fn stop_auto_browse(&mut self) -> Result<()> {
        if let Some(browse) = self.browse.take() {
            browse.token.cancel();
            info!("Auto-browse stopped");
        }
        self.state().set_auto_browsing(false).await?;
        self.state().set_progress(None).await?;
        Ok(())
    }

    /// Wait for the running auto-browse session to end on its own.
    pub async fn wait_auto_browse(&mut self) -> Result<Option<BrowseSummary>> {
        match self.browse.take() {
            Some(browse) => Ok(Some(browse.task.await?)),
            None => Ok(None),
        }
    }

    /// Pick up where the persisted flags say we were, without clearing data.
    pub async fn resume(&mut self) -> Result<()> {
        let state = self.state().clone();
        if state.scanning().await? {
            self.begin_scan().await?;
        }
        if state.auto_browsing().await? {
            self.start_auto_browse().await?;
        }
        Ok(())
    }

    pub async fn execute(&mut self, command: Command) -> Ack {
        debug!("Engine received {:?}", command);
        let result = match command {
            Command::ToggleOverlay => self.toggle_overlay().await,
            Command::StartScan => self.start_scan().await,
            Command::StopScan => self.stop_scan().await,
            Command::ShowGraph => self.show_graph().await.map(|_| ()),
            Command::StartAutoBrowse => self.start_auto_browse().await,
            Command::StopAutoBrowse => self.stop_auto_browse().await,
        };
        if let Err(e) = &result {
            warn!("{:?} failed: {}", command, e);
        }
        result.into()
    }

    /// Move the engine onto its own task and return the handle that talks to
    /// it. The task ends, stopping any scan, once every handle is dropped.
    pub fn spawn(self) -> (EngineHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Request>(32);
        let events = self.events();
        let task = tokio::spawn(async move {
            let mut engine = self;
            while let Some(request) = rx.recv().await {
                match request {
                    Request::Command { command, reply } => {
                        let ack = engine.execute(command).await;
                        let _ = reply.send(ack);
                    }
                    Request::Intent { intent, reply } => {
                        let ack: Ack = engine.handle_intent(intent).await.into();
                        let _ = reply.send(ack);
                    }
                }
            }
            log_failure("Shutdown", engine.stop_scan().await);
        });
        (EngineHandle { tx, events }, task)
    }
}

enum Request {
    Command {
        command: Command,
        reply: oneshot::Sender<Ack>,
    },
    Intent {
        intent: RenderIntent,
        reply: oneshot::Sender<Ack>,
    },
}

/// Cheap, cloneable connection to a spawned engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Request>,
    events: UnboundedSender<PageEvent>,
}

impl EngineHandle {
    async fn request(&self, request: Request, rx: oneshot::Receiver<Ack>) -> Result<Ack> {
        self.tx
            .send(request)
            .await
            .map_err(|_| ScanError::EndpointUnavailable("engine is not running".to_string()))?;
        rx.await
            .map_err(|_| ScanError::EndpointUnavailable("engine dropped the request".to_string()))
    }

    pub async fn send(&self, command: Command) -> Result<Ack> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Command { command, reply }, rx).await
    }

    pub async fn intent(&self, intent: RenderIntent) -> Result<Ack> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Intent { intent, reply }, rx).await
    }

    pub fn events(&self) -> UnboundedSender<PageEvent> {
        self.events.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

type Injector = Box<dyn Fn() -> EngineHandle + Send + Sync>;

/// Sends commands, re-creating the engine once when nobody is listening.
pub struct ControlClient {
    handle: EngineHandle,
    inject: Injector,
}

impl ControlClient {
    pub fn new<F>(handle: EngineHandle, inject: F) -> Self
    where
        F: Fn() -> EngineHandle + Send + Sync + 'static,
    {
        Self {
            handle,
            inject: Box::new(inject),
        }
    }

    pub fn handle(&self) -> &EngineHandle {
        &self.handle
    }

    /// Deliver `command`. If the engine is gone, inject a new one and retry
    /// the same command once; a second failure is returned to the caller.
    pub async fn send(&mut self, command: Command) -> Result<Ack> {
        match self.handle.send(command).await {
            Err(ScanError::EndpointUnavailable(reason)) => {
                warn!("Engine unreachable ({}), injecting a new one", reason);
                self.handle = (self.inject)();
                self.handle.send(command).await
            }
            other => other,
        }
    }
}
