//! Client surface of the podchat engine: session management, the push
//! channel, and the coalescing poll loop that keeps the inbox converged.

pub mod poller;
pub mod push;
pub mod session;

use tracing_subscriber::{fmt, EnvFilter};

pub use session::{spawn_cleanup_worker, Session};

/// Initialises structured logging for binaries embedding the engine.
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("podchat_client=debug,podchat_sync=debug,podchat_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
