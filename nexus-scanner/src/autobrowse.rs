// Auto-browse: bounded breadth-first traversal driven through the browser

use crate::config::BrowseConfig;
use crate::context::ScanContext;
use crate::dom::Region;
use crate::error::Result;
use crate::navigation::capture_page;
use crate::session::{ScanSession, pause};
use crate::sources::log_failure;
use crate::title::{clean_name, link_name};
use nexus_core::BrowseProgress;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseEntry {
    pub url: String,
    pub depth: usize,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowseOutcome {
    /// The frontier ran dry.
    Exhausted,
    /// Neither the first seeding nor its retry found anything to visit.
    NoSeeds,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseSummary {
    pub outcome: BrowseOutcome,
    pub visited: Vec<String>,
    pub progress: BrowseProgress,
}

/// One auto-browse session.
///
/// Every URL enters the queue at most once and is visited at most once; the
/// visited set only ever grows until the session ends.
pub struct AutoBrowser {
    ctx: ScanContext,
    scan: Arc<ScanSession>,
    token: CancellationToken,
    config: BrowseConfig,
    queue: VecDeque<BrowseEntry>,
    visited: HashSet<String>,
    visits: Vec<String>,
    last_depth: usize,
}

impl AutoBrowser {
    pub fn new(ctx: ScanContext, scan: Arc<ScanSession>, token: CancellationToken) -> Self {
        let config = ctx.config.browse.clone();
        Self {
            ctx,
            scan,
            token,
            config,
            queue: VecDeque::new(),
            visited: HashSet::new(),
            visits: Vec::new(),
            last_depth: 0,
        }
    }

    pub fn queue(&self) -> &VecDeque<BrowseEntry> {
        &self.queue
    }

    fn is_live(&self) -> bool {
        !self.token.is_cancelled()
    }

    fn progress(&self) -> BrowseProgress {
        BrowseProgress {
            current: self.visits.len(),
            total: self.visits.len() + self.queue.len(),
        }
    }

    async fn publish_progress(&self) {
        if !self.is_live() {
            return;
        }
        log_failure(
            "Progress update",
            self.ctx
                .store
                .state()
                .set_progress(Some(self.progress()))
                .await
                .map_err(Into::into),
        );
    }

    fn enqueue(&mut self, url: String, depth: usize, title: String) -> bool {
        if self.visited.contains(&url) || self.queue.iter().any(|e| e.url == url) {
            return false;
        }
        debug!("Added to queue (depth {}): {} {}", depth, title, url);
        self.queue.push_back(BrowseEntry { url, depth, title });
        true
    }

    /// Queue sidebar entries at depth 0, minus whatever the seed policy
    /// treats as navigation chrome.
    pub async fn seed(&mut self) -> Result<usize> {
        let page = self.ctx.page().await?;
        let candidates: Vec<(String, String)> = {
            let doc = page.parse();
            self.ctx
                .scoped(&doc, doc.anchors(Region::Sidebar))
                .into_iter()
                .enumerate()
                .filter_map(|(index, (url, anchor))| {
                    let label = clean_name(&anchor.text);
                    if self.config.seed_policy.admits(index, &label) {
                        Some((url, link_name(&anchor)))
                    } else {
                        debug!("Skipping sidebar entry {}: {}", index, label);
                        None
                    }
                })
                .collect()
        };

        let added = candidates
            .into_iter()
            .filter(|(url, title)| self.enqueue(url.clone(), 0, title.clone()))
            .count();
        info!("Added {} pages to browse queue", added);
        self.publish_progress().await;
        Ok(added)
    }

    /// Queue the current page's outbound links at `depth`, unless that is
    /// already past the depth cap.
    pub async fn collect(&mut self, depth: usize) -> Result<usize> {
        if depth > self.config.max_depth {
            return Ok(0);
        }

        let page = self.ctx.page().await?;
        let candidates: Vec<(String, String)> = {
            let doc = page.parse();
            let here = crate::link::canonicalize(doc.location(), None);
            self.ctx
                .scoped(&doc, doc.anchors(Region::Document))
                .into_iter()
                .filter(|(url, _)| *url != here)
                .map(|(url, anchor)| (url, link_name(&anchor)))
                .collect()
        };

        let added = candidates
            .into_iter()
            .filter(|(url, title)| self.enqueue(url.clone(), depth, title.clone()))
            .count();
        if added > 0 {
            info!("Collected {} new pages from current page (depth {})", added, depth);
        }
        self.publish_progress().await;
        Ok(added)
    }

    async fn capture(&self) {
        log_failure("Page capture", capture_page(&self.ctx, &self.scan).await);
    }

    /// Run the traversal to completion or until the token is cancelled.
    pub async fn run(mut self) -> BrowseSummary {
        let outcome = self.traverse().await;
        let progress = self.progress();
        info!(
            "Auto-browse finished ({:?}): visited {} pages",
            outcome,
            self.visits.len()
        );
        BrowseSummary {
            outcome,
            visited: self.visits,
            progress,
        }
    }

    async fn traverse(&mut self) -> BrowseOutcome {
        self.queue.clear();
        self.visited.clear();
        match self.ctx.current_url().await {
            Ok(here) => {
                self.visited.insert(here);
            }
            Err(e) => warn!("Could not read current location: {}", e),
        }

        let seeded = self.seed().await.unwrap_or_else(|e| {
            warn!("Seeding failed: {}", e);
            0
        });
        if seeded == 0 {
            debug!("Browse queue is empty, retrying collection");
            if !pause(&self.token, self.config.seed_retry_delay).await {
                return BrowseOutcome::Stopped;
            }
            let retried = self.seed().await.unwrap_or_else(|e| {
                warn!("Seeding failed: {}", e);
                0
            });
            if retried == 0 {
                warn!("Failed to collect sidebar pages for auto-browse");
                return BrowseOutcome::NoSeeds;
            }
        }

        loop {
            if !self.is_live() {
                return BrowseOutcome::Stopped;
            }

            let Some(entry) = self.queue.pop_front() else {
                debug!("Browse queue empty, collecting more pages");
                let depth = self.last_depth + 1;
                match self.collect(depth).await {
                    Ok(0) => return BrowseOutcome::Exhausted,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Collection failed: {}", e);
                        return BrowseOutcome::Exhausted;
                    }
                }
            };

            if self.visited.contains(&entry.url) {
                debug!("Page already visited, skipping: {}", entry.url);
                continue;
            }
            if entry.depth > self.config.max_depth {
                debug!("Max depth reached, skipping: {}", entry.url);
                continue;
            }

            self.visited.insert(entry.url.clone());
            self.visits.push(entry.url.clone());
            self.last_depth = entry.depth;
            self.publish_progress().await;

            let here = self.ctx.current_url().await.unwrap_or_default();
            if entry.url == here {
                debug!("Already on {}, collecting links in place", entry.title);
                self.capture().await;
                log_failure("Link collection", self.collect(entry.depth + 1).await);
                if !pause(&self.token, self.config.visit_interval).await {
                    return BrowseOutcome::Stopped;
                }
                continue;
            }

            info!("Browsing page (depth {}): {} {}", entry.depth, entry.title, entry.url);
            if let Err(e) = self.ctx.browser.navigate(&entry.url).await {
                warn!("Navigation to {} failed: {}", entry.url, e);
                continue;
            }

            if !pause(&self.token, self.config.load_delay).await {
                return BrowseOutcome::Stopped;
            }
            self.capture().await;

            if !pause(&self.token, self.config.collect_delay).await {
                return BrowseOutcome::Stopped;
            }
            if entry.depth < self.config.max_depth {
                log_failure("Link collection", self.collect(entry.depth + 1).await);
            }

            if !pause(&self.token, self.config.visit_interval).await {
                return BrowseOutcome::Stopped;
            }
        }
    }
}
