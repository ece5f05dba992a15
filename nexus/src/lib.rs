pub mod handlers;

pub use handlers::{
    InitOutcome, clear_state, engine_config, expand_path, format_counts, initialize_database,
    open_database, status_report,
};
