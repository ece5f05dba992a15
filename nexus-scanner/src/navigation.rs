// Page capture and in-place navigation detection

use crate::browser::PageEvent;
use crate::context::ScanContext;
use crate::error::Result;
use crate::handoff::FromPage;
use crate::link::canonicalize;
use crate::session::{ScanSession, pause};
use crate::sources::{database_sweep, log_failure, on_click, on_hover};
use crate::title::{PREVIOUS_PAGE, clean_name};
use nexus_core::MergeStats;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

/// What a page capture recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub url: String,
    pub title: String,
    /// Page the navigation came from, when the handoff slot named one.
    pub from: Option<String>,
    pub stats: MergeStats,
}

/// Record the page the browser currently shows and, if the handoff slot names
/// a different page, the edge from that page to this one. A known from-page
/// keeps its stored name.
///
/// A placeholder title never overwrites a name the store already has; the
/// delayed title retry fixes it up instead.
pub async fn capture_page(ctx: &ScanContext, session: &ScanSession) -> Result<Option<Capture>> {
    if !session.is_active() {
        return Ok(None);
    }

    let page = ctx.page().await?;
    let (url, title) = {
        let doc = page.parse();
        (
            canonicalize(doc.location(), None),
            ctx.resolver().page_title(&doc),
        )
    };
    let from = ctx
        .handoff
        .take()
        .await
        .map(|from| FromPage {
            url: canonicalize(&from.url, None),
            title: from.title.filter(|t| !t.trim().is_empty()),
        })
        .filter(|from| from.url != url);

    if !session.is_active() {
        return Ok(None);
    }

    let resolver = ctx.resolver();
    let placeholder = resolver.is_placeholder(&title);
    let mut recorded_title = title.clone();
    let stats = ctx
        .store
        .merge(|data, now| {
            let mut stats = match data.pages.get(&url) {
                Some(known) if placeholder => {
                    recorded_title = known.name.clone();
                    MergeStats::default()
                }
                _ => data.upsert_page(&url, &title, now),
            };

            if let Some(from) = &from {
                let from_name = match data.pages.get(&from.url) {
                    Some(known) if !resolver.is_placeholder(&known.name) => known.name.clone(),
                    known => from
                        .title
                        .clone()
                        .filter(|t| !resolver.is_placeholder(t))
                        .or_else(|| known.map(|k| k.name.clone()))
                        .unwrap_or_else(|| PREVIOUS_PAGE.to_string()),
                };
                stats += data.upsert_link(&from.url, &from_name, &url, &recorded_title, now);
            }
            stats
        })
        .await?;

    session.set_current(&url, &recorded_title);
    info!("Recording page: {} {}", recorded_title, url);
    if let Some(from) = &from {
        debug!("Link created from navigation: {} -> {}", from.url, url);
    }

    Ok(Some(Capture {
        url,
        title: recorded_title,
        from: from.map(|f| f.url),
        stats,
    }))
}

/// Resolve the current page's title again and, if it is now a real title,
/// rename the page and every link endpoint still carrying the old name.
pub async fn retitle(ctx: &ScanContext, session: &ScanSession) -> Result<MergeStats> {
    if !session.is_active() {
        return Ok(MergeStats::default());
    }

    let page = ctx.page().await?;
    let (url, title) = {
        let doc = page.parse();
        (
            canonicalize(doc.location(), None),
            ctx.resolver().page_title(&doc),
        )
    };
    if ctx.resolver().is_placeholder(&title) || !session.is_active() {
        return Ok(MergeStats::default());
    }

    let stats = ctx
        .store
        .merge(|data, now| match data.pages.get(&url).map(|p| p.name.clone()) {
            Some(old) if old != title => data.rename_cascade(&url, &old, &title, now),
            _ => MergeStats::default(),
        })
        .await?;

    session.retitle(&url, &title);
    if !stats.is_empty() {
        info!("Page title updated (retry): {} -> {}", url, title);
    }
    Ok(stats)
}

/// Run [`retitle`] once after `delay`, unless the session ends first.
pub fn schedule_retitle(ctx: ScanContext, session: Arc<ScanSession>, delay: Duration) {
    tokio::spawn(async move {
        if pause(&session.token(), delay).await {
            log_failure("Title retry", retitle(&ctx, &session).await);
        }
    });
}

/// Watches the event stream for in-place navigations and dispatches link
/// events to the listeners.
pub struct NavigationObserver {
    ctx: ScanContext,
    session: Arc<ScanSession>,
    last_url: String,
    last_title: String,
}

impl NavigationObserver {
    pub async fn new(ctx: ScanContext, session: Arc<ScanSession>) -> Self {
        let (last_url, last_title) = match ctx.page().await {
            Ok(page) => {
                let title = page.parse().title().unwrap_or_default();
                (page.url, title)
            }
            Err(_) => (String::new(), String::new()),
        };
        Self {
            ctx,
            session,
            last_url,
            last_title,
        }
    }

    pub async fn handle(&mut self, event: PageEvent) {
        if !self.session.is_active() {
            return;
        }
        match event {
            PageEvent::LinkHovered { href } => {
                log_failure("Hover listener", on_hover(&self.ctx, &self.session, &href).await)
            }
            PageEvent::LinkClicked { href } => {
                log_failure("Click listener", on_click(&self.ctx, &self.session, &href).await)
            }
            PageEvent::DomMutated => log_failure("Mutation check", self.check_mutation().await),
            PageEvent::HistoryTraversed => self.schedule_capture(),
            PageEvent::NavigationIntent => {
                log_failure("Navigation intent", self.hand_off_current().await)
            }
        }
    }

    async fn check_mutation(&mut self) -> Result<()> {
        let page = self.ctx.page().await?;
        let title = page.parse().title().unwrap_or_default();
        if page.url == self.last_url && title == self.last_title {
            return Ok(());
        }

        if !self.last_url.is_empty() && page.url != self.last_url {
            let from = FromPage {
                url: canonicalize(&self.last_url, None),
                title: Some(clean_name(&self.ctx.resolver().strip_suffix(&self.last_title)))
                    .filter(|t| !t.is_empty()),
            };
            self.ctx.handoff.put(&from).await?;
        }

        debug!("Navigation detected: {} -> {}", self.last_url, page.url);
        self.last_url = page.url;
        self.last_title = title;
        self.schedule_capture();
        Ok(())
    }

    async fn hand_off_current(&self) -> Result<()> {
        if let Some(current) = self.session.current() {
            self.ctx
                .handoff
                .put(&FromPage {
                    url: current.url,
                    title: Some(current.title),
                })
                .await?;
        }
        Ok(())
    }

    /// After the settle delay: capture the page and sweep its data view;
    /// after the late delay: retry the title.
    fn schedule_capture(&self) {
        let ctx = self.ctx.clone();
        let session = self.session.clone();
        tokio::spawn(async move {
            let token = session.token();
            if !pause(&token, ctx.config.timings.settle_delay).await {
                return;
            }
            log_failure("Page capture", capture_page(&ctx, &session).await);
            log_failure("Database sweep", database_sweep(&ctx, &session).await);

            if pause(&token, ctx.config.timings.late_title_retry_delay).await {
                log_failure("Title retry", retitle(&ctx, &session).await);
            }
        });
    }

    /// Consume events until the session stops or every sender is gone.
    pub async fn run(mut self, events: Arc<Mutex<UnboundedReceiver<PageEvent>>>) {
        let token = self.session.token();
        let mut events = events.lock().await;
        loop {
            let event = tokio::select! {
                _ = token.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle(event).await;
        }
        debug!("Observer for session {} finished", self.session.id());
    }
}
