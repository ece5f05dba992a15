use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Milliseconds since the Unix epoch, the unit of every timestamp in [`ScanData`].
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A page of the workspace, keyed by its canonical URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    pub name: String,
    pub href: String,
    /// First-seen time. Never rewritten once set.
    pub timestamp: i64,
    /// Last time `name` changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

/// A directed reference between two pages, with the endpoint names as they
/// were last observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRecord {
    pub source: String,
    pub target: String,
    pub source_name: String,
    pub target_name: String,
}

/// The persisted graph: pages by canonical URL plus the list of links.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanData {
    #[serde(default)]
    pub pages: BTreeMap<String, PageRecord>,
    #[serde(default)]
    pub links: Vec<LinkRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCounts {
    pub pages: usize,
    pub links: usize,
}

/// Auto-browse progress as shown by the status surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseProgress {
    pub current: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    pub href: String,
    #[serde(rename = "isRoot")]
    pub is_root: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphLink {
    pub source: String,
    pub target: String,
    pub source_name: String,
    pub target_name: String,
}

/// Read-only graph handed to the rendering collaborator. Every link endpoint
/// is the `id` of some node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphPayload {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
}

impl GraphPayload {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Messages the rendering surface sends back to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum RenderIntent {
    #[serde(rename = "CLOSE_OVERLAY")]
    Close,
    #[serde(rename = "NAVIGATE")]
    Navigate { url: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_data_uses_camel_case_keys() {
        let mut data = ScanData::default();
        data.pages.insert(
            "https://www.notion.so/a".to_string(),
            PageRecord {
                name: "A".to_string(),
                href: "https://www.notion.so/a".to_string(),
                timestamp: 1,
                updated_at: Some(2),
            },
        );
        data.links.push(LinkRecord {
            source: "https://www.notion.so/a".to_string(),
            target: "https://www.notion.so/b".to_string(),
            source_name: "A".to_string(),
            target_name: "B".to_string(),
        });

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["pages"]["https://www.notion.so/a"]["updatedAt"], 2);
        assert_eq!(json["links"][0]["sourceName"], "A");
        assert_eq!(json["links"][0]["targetName"], "B");
    }

    #[test]
    fn test_scan_data_missing_fields_default() {
        let data: ScanData = serde_json::from_str("{}").unwrap();
        assert!(data.pages.is_empty());
        assert!(data.links.is_empty());
    }

    #[test]
    fn test_render_intent_wire_format() {
        let navigate: RenderIntent =
            serde_json::from_str(r#"{"action":"NAVIGATE","url":"https://www.notion.so/x"}"#)
                .unwrap();
        assert_eq!(
            navigate,
            RenderIntent::Navigate {
                url: "https://www.notion.so/x".to_string()
            }
        );

        let close: RenderIntent = serde_json::from_str(r#"{"action":"CLOSE_OVERLAY"}"#).unwrap();
        assert_eq!(close, RenderIntent::Close);
    }

    #[test]
    fn test_graph_node_is_root_key() {
        let node = GraphNode {
            id: "x".to_string(),
            name: "X".to_string(),
            href: "x".to_string(),
            is_root: true,
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["isRoot"], true);
    }
}
