//! Tracing subscriber setup for the registry binary.

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Install the global tracing subscriber.
///
/// Defaults to INFO on stderr; `RUST_LOG` overrides per target. Events go to
/// stderr so the binary's stdout stays a clean event/JSON stream.
pub fn init() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}
