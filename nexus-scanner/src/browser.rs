// The live page the engine observes and steers

use crate::error::{Result, ScanError};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

/// Host-side view of one browser tab.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn current_url(&self) -> Result<String>;

    /// Rendered HTML of the current page.
    async fn document(&self) -> Result<String>;

    async fn navigate(&self, url: &str) -> Result<()>;

    /// Scroll the first element matching `container` to its bottom and report
    /// its scroll height, or `None` when no such element is rendered.
    async fn scroll_to_bottom(&self, container: &str) -> Result<Option<u64>>;
}

/// Things that happen in the page which the engine reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PageEvent {
    LinkHovered { href: String },
    LinkClicked { href: String },
    /// The document subtree changed; the URL or title may have moved with it.
    DomMutated,
    /// Back/forward.
    HistoryTraversed,
    /// An in-page transition is about to change the location.
    NavigationIntent,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn container_present(html: &str, container: &str) -> bool {
    match Selector::parse(container) {
        Ok(selector) => Html::parse_document(html).select(&selector).next().is_some(),
        Err(_) => false,
    }
}

struct LoadedPage {
    url: String,
    body: String,
}

/// Fetches pages over HTTP. Every document is static, so scroll height is the
/// body length and never grows. A non-success answer leaves the previous page
/// in place.
pub struct HttpBrowser {
    client: Client,
    page: AsyncMutex<LoadedPage>,
}

impl HttpBrowser {
    pub fn new() -> Result<Self> {
        Self::with_timeout(10)
    }

    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Nexus/0.1 (https://github.com/nexus-graph/nexus)")
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.div_ceil(2)))
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            client,
            page: AsyncMutex::new(LoadedPage {
                url: String::new(),
                body: String::new(),
            }),
        })
    }

    /// New browser already showing `url`.
    pub async fn open(url: &str) -> Result<Self> {
        let browser = Self::new()?;
        browser.navigate(url).await?;
        Ok(browser)
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn current_url(&self) -> Result<String> {
        Ok(self.page.lock().await.url.clone())
    }

    async fn document(&self) -> Result<String> {
        Ok(self.page.lock().await.body.clone())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let target = url::Url::parse(url)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", url, e)))?;
        debug!("Fetching {}", target);

        let response = self.client.get(target).send().await?;
        let status = response.status();
        let final_url = response.url().to_string();
        if !status.is_success() {
            return Err(ScanError::Browser(format!("{} answered {}", final_url, status)));
        }
        let body = response.text().await?;

        let mut page = self.page.lock().await;
        page.url = final_url;
        page.body = body;
        Ok(())
    }

    async fn scroll_to_bottom(&self, container: &str) -> Result<Option<u64>> {
        let page = self.page.lock().await;
        if container_present(&page.body, container) {
            Ok(Some(page.body.len() as u64))
        } else {
            Ok(None)
        }
    }
}

/// In-memory pages keyed by URL. Replays recorded workspaces and drives tests.
#[derive(Default)]
pub struct StaticBrowser {
    pages: Mutex<HashMap<String, String>>,
    current: Mutex<String>,
    scroll_heights: Mutex<HashMap<String, VecDeque<u64>>>,
    history: Mutex<Vec<String>>,
    scrolls: Mutex<usize>,
}

impl StaticBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.set_page(url, html);
        self
    }

    /// Heights reported by successive scrolls on `url`; the last one repeats.
    pub fn with_scroll_heights(self, url: &str, heights: Vec<u64>) -> Self {
        lock(&self.scroll_heights).insert(url.to_string(), heights.into());
        self
    }

    pub fn set_page(&self, url: &str, html: &str) {
        lock(&self.pages).insert(url.to_string(), html.to_string());
    }

    /// Move to `url` without recording a navigation, like an in-page
    /// transition the engine did not issue.
    pub fn set_current(&self, url: &str) {
        *lock(&self.current) = url.to_string();
    }

    /// Every URL passed to `navigate`, in order.
    pub fn history(&self) -> Vec<String> {
        lock(&self.history).clone()
    }

    pub fn scroll_count(&self) -> usize {
        *lock(&self.scrolls)
    }
}

#[async_trait]
impl Browser for StaticBrowser {
    async fn current_url(&self) -> Result<String> {
        Ok(lock(&self.current).clone())
    }

    async fn document(&self) -> Result<String> {
        let current = lock(&self.current).clone();
        Ok(lock(&self.pages)
            .get(&current)
            .cloned()
            .unwrap_or_else(|| "<html><body></body></html>".to_string()))
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        lock(&self.history).push(url.to_string());
        *lock(&self.current) = url.to_string();
        Ok(())
    }

    async fn scroll_to_bottom(&self, container: &str) -> Result<Option<u64>> {
        let current = lock(&self.current).clone();
        let html = lock(&self.pages).get(&current).cloned().unwrap_or_default();
        if !container_present(&html, container) {
            return Ok(None);
        }

        *lock(&self.scrolls) += 1;
        let mut heights = lock(&self.scroll_heights);
        let height = match heights.get_mut(&current) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().copied(),
            None => None,
        };
        Ok(Some(height.unwrap_or(html.len() as u64)))
    }
}
