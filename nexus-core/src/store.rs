use crate::data::PersistedState;
use crate::error::Result;
use crate::model::{
    GraphLink, GraphNode, GraphPayload, LinkRecord, PageRecord, ScanCounts, ScanData, now_millis,
};
use std::collections::HashSet;
use std::ops::AddAssign;
use tracing::debug;

/// What a merge changed. An empty value means the merge was a no-op and
/// nothing needs to be written back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub pages_added: usize,
    pub pages_renamed: usize,
    pub links_added: usize,
    pub links_updated: usize,
}

impl MergeStats {
    pub fn is_empty(&self) -> bool {
        *self == MergeStats::default()
    }
}

impl AddAssign for MergeStats {
    fn add_assign(&mut self, other: Self) {
        self.pages_added += other.pages_added;
        self.pages_renamed += other.pages_renamed;
        self.links_added += other.links_added;
        self.links_updated += other.links_updated;
    }
}

impl ScanData {
    /// Insert the page, or rename it if the name differs. The first-seen
    /// timestamp survives renames.
    pub fn upsert_page(&mut self, url: &str, name: &str, now: i64) -> MergeStats {
        let mut stats = MergeStats::default();
        if url.is_empty() {
            return stats;
        }

        match self.pages.get_mut(url) {
            None => {
                self.pages.insert(
                    url.to_string(),
                    PageRecord {
                        name: name.to_string(),
                        href: url.to_string(),
                        timestamp: now,
                        updated_at: None,
                    },
                );
                stats.pages_added = 1;
            }
            Some(page) if page.name != name => {
                debug!("Page name updated: {} -> {}", page.name, name);
                page.name = name.to_string();
                page.updated_at = Some(now);
                stats.pages_renamed = 1;
            }
            Some(_) => {}
        }
        stats
    }

    /// Insert the page only if it is not known yet; never renames.
    pub fn ensure_page(&mut self, url: &str, name: &str, now: i64) -> MergeStats {
        if url.is_empty() || self.pages.contains_key(url) {
            return MergeStats::default();
        }
        self.upsert_page(url, name, now)
    }

    /// Record `source -> target`. Both endpoints are upserted; a repeated
    /// observation rewrites the stored endpoint names instead of appending.
    pub fn upsert_link(
        &mut self,
        source: &str,
        source_name: &str,
        target: &str,
        target_name: &str,
        now: i64,
    ) -> MergeStats {
        if source.is_empty() || target.is_empty() || source == target {
            return MergeStats::default();
        }

        let mut stats = self.upsert_page(source, source_name, now);
        stats += self.upsert_page(target, target_name, now);

        match self
            .links
            .iter_mut()
            .find(|l| l.source == source && l.target == target)
        {
            None => {
                self.links.push(LinkRecord {
                    source: source.to_string(),
                    target: target.to_string(),
                    source_name: source_name.to_string(),
                    target_name: target_name.to_string(),
                });
                stats.links_added = 1;
            }
            Some(link) => {
                if link.source_name != source_name || link.target_name != target_name {
                    link.source_name = source_name.to_string();
                    link.target_name = target_name.to_string();
                    stats.links_updated = 1;
                }
            }
        }
        stats
    }

    /// Rename a known page and every link endpoint that still carries
    /// `old_name` for it. Endpoint names that already diverged are kept.
    pub fn rename_cascade(
        &mut self,
        url: &str,
        old_name: &str,
        new_name: &str,
        now: i64,
    ) -> MergeStats {
        let mut stats = MergeStats::default();
        let Some(page) = self.pages.get_mut(url) else {
            return stats;
        };

        if page.name != new_name {
            page.name = new_name.to_string();
            page.updated_at = Some(now);
            stats.pages_renamed = 1;
        }

        if old_name == new_name {
            return stats;
        }

        for link in self.links.iter_mut() {
            let mut touched = false;
            if link.target == url && link.target_name == old_name {
                link.target_name = new_name.to_string();
                touched = true;
            }
            if link.source == url && link.source_name == old_name {
                link.source_name = new_name.to_string();
                touched = true;
            }
            if touched {
                stats.links_updated += 1;
            }
        }
        stats
    }

    /// Project into the render payload. Links whose endpoints are not both
    /// known pages are left out of the projection but kept in storage.
    pub fn snapshot(&self) -> GraphPayload {
        let links: Vec<GraphLink> = self
            .links
            .iter()
            .filter(|l| self.pages.contains_key(&l.source) && self.pages.contains_key(&l.target))
            .map(|l| GraphLink {
                source: l.source.clone(),
                target: l.target.clone(),
                source_name: l.source_name.clone(),
                target_name: l.target_name.clone(),
            })
            .collect();

        let targets: HashSet<&str> = links.iter().map(|l| l.target.as_str()).collect();

        let nodes = self
            .pages
            .values()
            .map(|page| GraphNode {
                id: page.href.clone(),
                name: page.name.clone(),
                href: page.href.clone(),
                is_root: !targets.contains(page.href.as_str()),
            })
            .collect();

        GraphPayload { nodes, links }
    }

    pub fn counts(&self) -> ScanCounts {
        ScanCounts {
            pages: self.pages.len(),
            links: self.links.len(),
        }
    }
}

/// The shared graph, persisted under `scanData`.
///
/// Each operation is one read-merge-write cycle against the persisted copy.
/// Two cycles from different writers may interleave and the later write wins;
/// callers rely on re-running idempotent sweeps to heal lost updates.
#[derive(Clone)]
pub struct GraphStore {
    state: PersistedState,
}

impl GraphStore {
    pub fn new(state: PersistedState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &PersistedState {
        &self.state
    }

    pub async fn load(&self) -> Result<ScanData> {
        self.state.scan_data().await
    }

    pub async fn clear(&self) -> Result<()> {
        self.state.set_scan_data(&ScanData::default()).await
    }

    /// Reload, apply `f`, and write back only if `f` reports a change.
    pub async fn merge<F>(&self, f: F) -> Result<MergeStats>
    where
        F: FnOnce(&mut ScanData, i64) -> MergeStats + Send,
    {
        let mut data = self.state.scan_data().await?;
        let stats = f(&mut data, now_millis());
        if !stats.is_empty() {
            self.state.set_scan_data(&data).await?;
        }
        Ok(stats)
    }

    pub async fn upsert_page(&self, url: &str, name: &str) -> Result<MergeStats> {
        self.merge(|data, now| data.upsert_page(url, name, now)).await
    }

    pub async fn upsert_link(
        &self,
        source: &str,
        source_name: &str,
        target: &str,
        target_name: &str,
    ) -> Result<MergeStats> {
        self.merge(|data, now| {
            data.upsert_link(source, source_name, target, target_name, now)
        })
        .await
    }

    pub async fn rename_cascade(
        &self,
        url: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<MergeStats> {
        self.merge(|data, now| data.rename_cascade(url, old_name, new_name, now)).await
    }

    pub async fn snapshot(&self) -> Result<GraphPayload> {
        Ok(self.load().await?.snapshot())
    }

    pub async fn counts(&self) -> Result<ScanCounts> {
        Ok(self.load().await?.counts())
    }
}
