// Tracing subscriber setup
//
// Library code only emits through `tracing` macros. Binaries and demos call
// init_logging once at startup to get output on stderr.

use anyhow::{anyhow, Result};
use tracing_subscriber::prelude::*;

/// Install a global subscriber filtered by RUST_LOG, falling back to `default_filter`
pub fn init_logging(default_filter: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    // Bridge log crate → tracing (for dependencies using log crate)
    tracing_log::LogTracer::init().ok();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        // Whichever call wins the global slot, the next one must fail
        let _ = init_logging("debug");
        assert!(init_logging("info").is_err());
    }
}
