//! Core data model and persistence for Nexus.
//!
//! The graph of a wiki workspace is kept as a [`model::ScanData`] value under a
//! single key of an external key-value store. Every writer reloads it, merges
//! its observation and writes it back (see [`store::GraphStore`]).

use colored::Colorize;

pub mod data;
pub mod error;
pub mod model;
pub mod report;
pub mod store;

pub use data::{Database, KeyValueStore, MemoryStore, PersistedState};
pub use error::StoreError;
pub use model::{
    BrowseProgress, GraphLink, GraphNode, GraphPayload, LinkRecord, PageRecord, RenderIntent,
    ScanCounts, ScanData,
};
pub use store::{GraphStore, MergeStats};

pub fn print_banner() {
    println!(
        "{}",
        r#"
  _ __   _____  ___   _ ___
 | '_ \ / _ \ \/ / | | / __|
 | | | |  __/>  <| |_| \__ \
 |_| |_|\___/_/\_\\__,_|___/
"#
        .bright_cyan()
        .bold()
    );
    println!(
        "  {} {}\n",
        "workspace link-graph recorder".bright_white(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
