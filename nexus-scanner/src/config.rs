use crate::title::TitleResolver;
use std::time::Duration;

/// Timer settings for the scan loop and the navigation observer.
#[derive(Debug, Clone)]
pub struct Timings {
    pub sweep_interval: Duration,
    pub settle_delay: Duration,
    pub title_retry_delay: Duration,
    pub late_title_retry_delay: Duration,
    pub scroll_interval: Duration,
    pub scroll_settle: Duration,
    pub max_scroll_attempts: usize,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(2),
            settle_delay: Duration::from_millis(1500),
            title_retry_delay: Duration::from_secs(1),
            late_title_retry_delay: Duration::from_secs(2),
            scroll_interval: Duration::from_millis(500),
            scroll_settle: Duration::from_millis(300),
            max_scroll_attempts: 10,
        }
    }
}

/// Decides which sidebar entries seed an auto-browse session.
///
/// Sidebars open with fixed chrome (home, inbox, search, ...). Entries are
/// dropped either by position or by label; labels are compared
/// case-insensitively against the whole cleaned entry name.
#[derive(Debug, Clone)]
pub struct SeedPolicy {
    pub skip_leading: usize,
    pub skip_labels: Vec<String>,
}

impl SeedPolicy {
    /// Skip a fixed number of leading entries and nothing else.
    pub fn skip_first(count: usize) -> Self {
        Self {
            skip_leading: count,
            skip_labels: Vec::new(),
        }
    }

    pub fn with_skip_labels(mut self, labels: Vec<String>) -> Self {
        self.skip_labels = labels;
        self
    }

    pub fn admits(&self, index: usize, label: &str) -> bool {
        if index < self.skip_leading {
            return false;
        }
        let label = label.trim().to_lowercase();
        !self
            .skip_labels
            .iter()
            .any(|skip| skip.to_lowercase() == label)
    }
}

impl Default for SeedPolicy {
    fn default() -> Self {
        let labels = [
            "Home",
            "Meetings",
            "Notion AI",
            "Inbox",
            "Search",
            "Settings",
            "Trash",
            "Templates",
            "Help",
            "Updates",
        ];
        Self {
            skip_leading: 0,
            skip_labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowseConfig {
    pub max_depth: usize,
    pub load_delay: Duration,
    pub collect_delay: Duration,
    pub visit_interval: Duration,
    pub seed_retry_delay: Duration,
    pub seed_policy: SeedPolicy,
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            load_delay: Duration::from_secs(4),
            collect_delay: Duration::from_secs(2),
            visit_interval: Duration::from_secs(2),
            seed_retry_delay: Duration::from_secs(2),
            seed_policy: SeedPolicy::default(),
        }
    }
}

/// Everything the engine needs to know about the workspace it observes.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub domain_marker: String,
    pub site_suffixes: Vec<String>,
    pub site_name: String,
    pub timings: Timings,
    pub browse: BrowseConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            domain_marker: "notion.so".to_string(),
            site_suffixes: vec![" | Notion".to_string(), " - Notion".to_string()],
            site_name: "Notion".to_string(),
            timings: Timings::default(),
            browse: BrowseConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domain_marker(mut self, marker: impl Into<String>) -> Self {
        self.domain_marker = marker.into();
        self
    }

    pub fn with_site_name(mut self, name: impl Into<String>, suffixes: Vec<String>) -> Self {
        self.site_name = name.into();
        self.site_suffixes = suffixes;
        self
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.browse.max_depth = depth;
        self
    }

    pub fn with_browse(mut self, browse: BrowseConfig) -> Self {
        self.browse = browse;
        self
    }

    pub fn with_seed_policy(mut self, policy: SeedPolicy) -> Self {
        self.browse.seed_policy = policy;
        self
    }

    pub fn resolver(&self) -> TitleResolver {
        TitleResolver::new(self.site_suffixes.clone(), self.site_name.clone())
    }
}
