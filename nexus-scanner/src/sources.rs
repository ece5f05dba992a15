// Observation sources: DOM sweeps and the hover/click listeners
//
// Every source reads a fresh snapshot, extracts plain observations while the
// snapshot is alive, then merges them into the graph store in one
// read-merge-write cycle. All of them are idempotent, so a merge lost to a
// concurrent writer is repaired by the next run.

use crate::config::Timings;
use crate::context::ScanContext;
use crate::dom::{Anchor, Document, Region};
use crate::error::Result;
use crate::handoff::FromPage;
use crate::link::canonicalize;
use crate::session::{ScanSession, pause};
use crate::title::{DATABASE, UNTITLED, link_name};
use nexus_core::MergeStats;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Canonical URL of the document and the name the session knows it by.
fn here(ctx: &ScanContext, session: &ScanSession, doc: &Document) -> (String, String) {
    let url = canonicalize(doc.location(), None);
    let title = match session.current() {
        Some(current) if current.url == url => current.title,
        _ => ctx.resolver().page_title(doc),
    };
    (url, title)
}

/// Distinct targets in first-seen order. A later anchor only replaces the
/// name when the first one resolved to nothing better than "Untitled".
fn distinct_targets(targets: Vec<(String, Anchor)>, skip: &str) -> Vec<(String, String)> {
    let mut order: Vec<String> = Vec::new();
    let mut names: HashMap<String, String> = HashMap::new();

    for (url, anchor) in targets {
        if url == skip {
            continue;
        }
        let name = link_name(&anchor);
        match names.get_mut(&url) {
            Some(existing) => {
                if existing.as_str() == UNTITLED && name != UNTITLED {
                    *existing = name;
                }
            }
            None => {
                order.push(url.clone());
                names.insert(url, name);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|url| names.remove(&url).map(|name| (url, name)))
        .collect()
}

pub(crate) fn log_failure<T>(operation: &str, result: Result<T>) {
    if let Err(e) = result {
        warn!("{} failed: {}", operation, e);
    }
}

/// Record an edge from the current page to every in-scope anchor target.
pub async fn full_sweep(ctx: &ScanContext, session: &ScanSession) -> Result<MergeStats> {
    if !session.is_active() {
        return Ok(MergeStats::default());
    }

    let page = ctx.page().await?;
    let (current, current_name, targets) = {
        let doc = page.parse();
        let (current, current_name) = here(ctx, session, &doc);
        let anchors = ctx.scoped(&doc, doc.anchors(Region::Document));
        let targets = distinct_targets(anchors, &current);
        (current, current_name, targets)
    };
    debug!("Full sweep of {} found {} targets", current, targets.len());

    if targets.is_empty() || !session.is_active() {
        return Ok(MergeStats::default());
    }

    let resolver = ctx.resolver();
    let stats = ctx
        .store
        .merge(|data, now| {
            let mut stats = MergeStats::default();
            for (target, name) in &targets {
                let source_name = resolver.settle_name(data, &current, &current_name);
                let name = resolver.settle_name(data, target, name);
                stats += data.upsert_link(&current, &source_name, target, &name, now);
            }
            stats
        })
        .await?;

    if stats.pages_added > 0 || stats.links_added > 0 {
        info!(
            "Full sweep: {} new pages, {} new links",
            stats.pages_added, stats.links_added
        );
    }
    Ok(stats)
}

/// Record sidebar targets as pages. No edges: sidebar entries are global,
/// not references from the current page. Known pages keep their names.
pub async fn sidebar_sweep(ctx: &ScanContext, session: &ScanSession) -> Result<MergeStats> {
    if !session.is_active() {
        return Ok(MergeStats::default());
    }

    let page = ctx.page().await?;
    let entries: Option<Vec<(String, String)>> = {
        let doc = page.parse();
        if doc.has_region(Region::Sidebar) {
            Some(
                ctx.scoped(&doc, doc.anchors(Region::Sidebar))
                    .into_iter()
                    .map(|(url, anchor)| (url, anchor.text))
                    .filter(|(_, name)| !name.is_empty())
                    .collect(),
            )
        } else {
            None
        }
    };

    let Some(entries) = entries else {
        debug!("Sidebar not found");
        return Ok(MergeStats::default());
    };
    if entries.is_empty() || !session.is_active() {
        return Ok(MergeStats::default());
    }

    let stats = ctx
        .store
        .merge(|data, now| {
            let mut stats = MergeStats::default();
            for (url, name) in &entries {
                stats += data.ensure_page(url, name, now);
            }
            stats
        })
        .await?;

    if stats.pages_added > 0 {
        info!("Recorded {} new pages from sidebar", stats.pages_added);
    }
    Ok(stats)
}

/// How an auto-scroll run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollOutcome {
    /// Height stopped changing after this many growing attempts.
    Settled(usize),
    /// Still growing when the attempt budget ran out.
    Exhausted,
    /// The container disappeared or was never there.
    Missing,
    Cancelled,
}

/// Scroll `container` to the bottom until its height stops changing, at most
/// `max_scroll_attempts` growth steps.
pub async fn auto_scroll(
    ctx: &ScanContext,
    session: &ScanSession,
    container: &str,
    timings: &Timings,
) -> Result<ScrollOutcome> {
    let token = session.token();
    let Some(mut last_height) = ctx.browser.scroll_to_bottom(container).await? else {
        return Ok(ScrollOutcome::Missing);
    };

    for attempt in 0..timings.max_scroll_attempts {
        if !pause(&token, timings.scroll_interval).await {
            return Ok(ScrollOutcome::Cancelled);
        }
        let Some(height) = ctx.browser.scroll_to_bottom(container).await? else {
            return Ok(ScrollOutcome::Missing);
        };
        if !pause(&token, timings.scroll_settle).await {
            return Ok(ScrollOutcome::Cancelled);
        }
        if height == last_height {
            debug!("{} settled at height {}", container, height);
            return Ok(ScrollOutcome::Settled(attempt));
        }
        last_height = height;
    }
    Ok(ScrollOutcome::Exhausted)
}

/// Scroll the data view to mount lazy rows, then record every row as a page
/// and as an edge from the current page.
pub async fn database_sweep(ctx: &ScanContext, session: &ScanSession) -> Result<MergeStats> {
    if !session.is_active() {
        return Ok(MergeStats::default());
    }

    let page = ctx.page().await?;
    let container = {
        let doc = page.parse();
        doc.region_selector(Region::DataView)
    };
    let Some(container) = container else {
        return Ok(MergeStats::default());
    };

    let outcome = auto_scroll(ctx, session, container, &ctx.config.timings).await?;
    if outcome == ScrollOutcome::Cancelled || !session.is_active() {
        return Ok(MergeStats::default());
    }

    let page = ctx.page().await?;
    let (current, source_name, rows) = {
        let doc = page.parse();
        let current = canonicalize(doc.location(), None);
        let source_name = match session.current() {
            Some(known) if known.url == current => known.title,
            _ => DATABASE.to_string(),
        };
        let rows = distinct_targets(ctx.scoped(&doc, doc.anchors(Region::DataView)), &current);
        (current, source_name, rows)
    };
    debug!("Database sweep of {} found {} rows", current, rows.len());

    if rows.is_empty() || !session.is_active() {
        return Ok(MergeStats::default());
    }

    let resolver = ctx.resolver();
    let stats = ctx
        .store
        .merge(|data, now| {
            let mut stats = MergeStats::default();
            for (url, name) in &rows {
                let source_name = resolver.settle_name(data, &current, &source_name);
                let name = resolver.settle_name(data, url, name);
                stats += data.upsert_page(url, &name, now);
                stats += data.upsert_link(&current, &source_name, url, &name, now);
            }
            stats
        })
        .await?;

    if stats.pages_added > 0 {
        info!(
            "Recorded {} new database pages, {} entries total",
            stats.pages_added,
            rows.len()
        );
    }
    Ok(stats)
}

/// Hovering an in-scope link records its target and the edge to it, once per
/// target per session.
pub async fn on_hover(ctx: &ScanContext, session: &ScanSession, href: &str) -> Result<MergeStats> {
    if !session.is_active() || !ctx.in_scope(href) {
        return Ok(MergeStats::default());
    }

    let page = ctx.page().await?;
    let (current, current_name, target, name) = {
        let doc = page.parse();
        let (current, current_name) = here(ctx, session, &doc);
        let target = canonicalize(href, doc.base());
        let anchor = doc.find_anchor(href).unwrap_or_else(|| Anchor::bare(href));
        (current, current_name, target, link_name(&anchor))
    };

    if target.is_empty() || !session.mark_hovered(&target) {
        return Ok(MergeStats::default());
    }

    debug!("Link hovered: {} -> {} ({})", current_name, name, target);
    let resolver = ctx.resolver();
    Ok(ctx
        .store
        .merge(|data, now| {
            let source_name = resolver.settle_name(data, &current, &current_name);
            let name = resolver.settle_name(data, &target, &name);
            data.upsert_link(&current, &source_name, &target, &name, now)
        })
        .await?)
}

/// Clicking an in-scope link leaves the current page in the handoff slot so
/// the next capture can complete the edge.
pub async fn on_click(ctx: &ScanContext, session: &ScanSession, href: &str) -> Result<()> {
    if !session.is_active() || !ctx.in_scope(href) {
        return Ok(());
    }
    let Some(current) = session.current() else {
        return Ok(());
    };

    debug!("Link clicked (navigating): {} -> {}", current.title, href);
    ctx.handoff
        .put(&FromPage {
            url: current.url,
            title: Some(current.title),
        })
        .await?;
    Ok(())
}

/// Re-run the full and database sweeps every `sweep_interval` until the
/// session stops. One failing sweep never ends the loop.
pub async fn sweep_loop(ctx: ScanContext, session: Arc<ScanSession>) {
    let token = session.token();
    let mut ticker = tokio::time::interval(ctx.config.timings.sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        log_failure("Full sweep", full_sweep(&ctx, &session).await);
        log_failure("Database sweep", database_sweep(&ctx, &session).await);
    }
    debug!("Sweep loop for session {} finished", session.id());
}
