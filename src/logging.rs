use std::io;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the tracing subscriber.
/// - Respects `RUST_LOG` if set, otherwise `info,tower_http=info`
/// - Writes to stderr so CLI output on stdout stays pure JSON
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_writer(io::stderr)
        .try_init();
}
