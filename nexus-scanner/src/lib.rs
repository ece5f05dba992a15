//! Crawl/record engine for Nexus.
//!
//! Observes a live workspace session through a [`Browser`], records every page
//! and link it sees into the persisted graph, and can drive a bounded
//! breadth-first auto-browse of the workspace.

pub mod autobrowse;
pub mod browser;
pub mod config;
pub mod context;
pub mod dom;
pub mod engine;
pub mod error;
pub mod export;
pub mod handoff;
pub mod link;
pub mod navigation;
pub mod session;
pub mod sources;
pub mod title;

pub use autobrowse::{AutoBrowser, BrowseOutcome, BrowseSummary};
pub use browser::{Browser, HttpBrowser, PageEvent, StaticBrowser};
pub use config::{BrowseConfig, EngineConfig, SeedPolicy, Timings};
pub use context::ScanContext;
pub use dom::Document;
pub use engine::{Ack, Command, ControlClient, Engine, EngineHandle, GraphRenderer};
pub use error::ScanError;
pub use export::scan_current_view;
pub use session::ScanSession;
