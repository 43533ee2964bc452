#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;

use lucent::{Graph, GraphOptions, Result};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a test subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// In-memory options whose workers stay idle unless asked to flush.
pub fn quiet_options() -> GraphOptions {
    GraphOptions::in_memory()
        .flush_interval(Duration::from_secs(60))
        .reopen_interval(Duration::from_secs(60))
}

pub fn open_graph(opts: GraphOptions) -> Result<Graph> {
    init_tracing();
    Graph::open(opts)
}

pub fn quiet_graph() -> Result<Graph> {
    open_graph(quiet_options())
}
