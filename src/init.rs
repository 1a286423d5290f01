//! Process-level initialization helpers for embedding hosts.

use anyhow::Result;

/// Install the default tracing subscriber: stderr, env-filtered, engine
/// logs at info. Embedding hosts that bring their own subscriber skip
/// this.
pub fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fabula=info".parse()?),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;
    Ok(())
}
