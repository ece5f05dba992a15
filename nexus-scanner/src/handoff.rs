use nexus_core::{KeyValueStore, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

pub const KEY_FROM_PAGE: &str = "nexusFromPage";

/// The page a navigation started from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FromPage {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Single scratch cell carrying the outgoing page across one navigation.
///
/// Last write wins; `take` always empties the cell.
#[derive(Clone)]
pub struct HandoffSlot {
    store: Arc<dyn KeyValueStore>,
}

impl HandoffSlot {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn put(&self, from: &FromPage) -> Result<(), StoreError> {
        debug!("Handoff set: {} ({:?})", from.url, from.title);
        self.store
            .set(KEY_FROM_PAGE, serde_json::to_value(from)?)
            .await
    }

    /// Consume the slot. A value that cannot be read back as a [`FromPage`]
    /// counts as "no previous page".
    pub async fn take(&self) -> Option<FromPage> {
        let value = match self.store.get(KEY_FROM_PAGE).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Handoff read failed: {}", e);
                return None;
            }
        };

        if let Err(e) = self.store.remove(KEY_FROM_PAGE).await {
            warn!("Handoff clear failed: {}", e);
        }

        match serde_json::from_value::<FromPage>(value?) {
            Ok(from) if !from.url.is_empty() => Some(from),
            Ok(_) => None,
            Err(e) => {
                warn!("Discarding unreadable handoff: {}", e);
                None
            }
        }
    }
}
