use crate::browser::Browser;
use crate::config::EngineConfig;
use crate::dom::{Anchor, Document};
use crate::error::Result;
use crate::handoff::HandoffSlot;
use crate::link::{canonicalize, is_in_scope};
use crate::title::TitleResolver;
use nexus_core::GraphStore;
use std::sync::Arc;

/// Location and HTML of the page as last read from the browser.
#[derive(Debug, Clone)]
pub struct PageSource {
    pub url: String,
    pub html: String,
}

impl PageSource {
    /// Parse for querying. The result must be dropped before the next
    /// `.await`.
    pub fn parse(&self) -> Document {
        Document::parse(&self.url, &self.html)
    }
}

/// Collaborators shared by every source, the observer and the driver.
#[derive(Clone)]
pub struct ScanContext {
    pub browser: Arc<dyn Browser>,
    pub store: GraphStore,
    pub handoff: HandoffSlot,
    pub config: Arc<EngineConfig>,
    resolver: TitleResolver,
}

impl ScanContext {
    pub fn new(
        browser: Arc<dyn Browser>,
        store: GraphStore,
        handoff: HandoffSlot,
        config: Arc<EngineConfig>,
    ) -> Self {
        let resolver = config.resolver();
        Self {
            browser,
            store,
            handoff,
            config,
            resolver,
        }
    }

    pub fn resolver(&self) -> &TitleResolver {
        &self.resolver
    }

    pub async fn page(&self) -> Result<PageSource> {
        let url = self.browser.current_url().await?;
        let html = self.browser.document().await?;
        Ok(PageSource { url, html })
    }

    pub async fn current_url(&self) -> Result<String> {
        let url = self.browser.current_url().await?;
        Ok(canonicalize(&url, None))
    }

    pub fn in_scope(&self, href: &str) -> bool {
        is_in_scope(href, &self.config.domain_marker)
    }

    /// Canonical URLs of the in-scope anchors, paired with the anchors.
    pub fn scoped(&self, doc: &Document, anchors: Vec<Anchor>) -> Vec<(String, Anchor)> {
        anchors
            .into_iter()
            .filter(|anchor| self.in_scope(&anchor.href))
            .map(|anchor| (canonicalize(&anchor.href, doc.base()), anchor))
            .filter(|(url, _)| !url.is_empty())
            .collect()
    }
}
