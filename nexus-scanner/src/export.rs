// One-shot graph of the current view, independent of the graph store

use crate::config::EngineConfig;
use crate::dom::{Document, Region};
use crate::link::{is_in_scope, should_ignore, strip_query};
use nexus_core::{GraphLink, GraphNode, GraphPayload};
use std::collections::HashMap;
use tracing::debug;

const CURRENT_PAGE: &str = "Current Page";

#[derive(Default)]
struct ViewGraph {
    payload: GraphPayload,
    index: HashMap<String, usize>,
}

impl ViewGraph {
    /// Add a node keyed by `href` minus query and fragment. Returns its
    /// position, or `None` for unnamed links. Re-adding as a root promotes an
    /// existing node.
    fn add_node(&mut self, name: &str, href: &str, is_root: bool) -> Option<usize> {
        let name = name.trim();
        if href.is_empty() || name.is_empty() {
            return None;
        }
        let id = strip_query(href).to_string();

        if let Some(&position) = self.index.get(&id) {
            if is_root {
                self.payload.nodes[position].is_root = true;
            }
            return Some(position);
        }

        self.payload.nodes.push(GraphNode {
            id: id.clone(),
            name: name.to_string(),
            href: id.clone(),
            is_root,
        });
        let position = self.payload.nodes.len() - 1;
        self.index.insert(id, position);
        Some(position)
    }

    fn add_link(&mut self, source: usize, target: usize, source_name: &str) -> bool {
        let (source, target) = (&self.payload.nodes[source], &self.payload.nodes[target]);
        if source.id == target.id {
            return false;
        }
        let exists = self
            .payload
            .links
            .iter()
            .any(|l| l.source == source.id && l.target == target.id);
        if exists {
            return false;
        }
        let link = GraphLink {
            source: source.id.clone(),
            target: target.id.clone(),
            source_name: source_name.to_string(),
            target_name: target.name.clone(),
        };
        self.payload.links.push(link);
        true
    }
}

/// Graph of what one snapshot shows: sidebar entries as roots, main-content
/// links as edges from the current page. Functional links are left out.
pub fn scan_current_view(doc: &Document, config: &EngineConfig) -> GraphPayload {
    let mut graph = ViewGraph::default();
    let keep = |href: &str, text: &str| {
        is_in_scope(href, &config.domain_marker) && !should_ignore(href, text)
    };

    let mut sidebar_nodes = 0;
    for anchor in doc.anchors(Region::Sidebar) {
        if keep(&anchor.href, &anchor.text)
            && graph
                .add_node(&anchor.text, &anchor.href, true)
                .is_some()
        {
            sidebar_nodes += 1;
        }
    }
    debug!("Sidebar nodes found: {}", sidebar_nodes);

    let resolver = config.resolver();
    let title = doc
        .title()
        .map(|t| resolver.strip_suffix(&t))
        .filter(|t| !t.is_empty())
        .or_else(|| doc.first_text(Region::Main, "h1"))
        .unwrap_or_else(|| CURRENT_PAGE.to_string());

    let Some(current) = graph.add_node(&title, &doc.pathname(), false) else {
        return graph.payload;
    };

    let mut content_links = 0;
    for anchor in doc.anchors(Region::Main) {
        if !keep(&anchor.href, &anchor.text) {
            continue;
        }
        if let Some(target) = graph.add_node(&anchor.text, &anchor.href, false)
            && graph.add_link(current, target, &title)
        {
            content_links += 1;
        }
    }
    debug!("Page content links found: {}", content_links);

    graph.payload
}
