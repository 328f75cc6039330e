//! Tracing setup for the asset keeper binaries.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset: `level` for our code, and the
/// embedded database capped at `warn` so query chatter stays out of the logs.
pub fn default_directives(level: Level) -> String {
    let db_level = if level < Level::WARN { level } else { Level::WARN };
    format!(
        "{level},surrealdb={db},surrealdb_core={db},surrealkv={db}",
        level = level.as_str().to_lowercase(),
        db = db_level.as_str().to_lowercase(),
    )
}

/// Install the global subscriber. `json` switches to newline-delimited JSON.
///
/// Later calls are no-ops.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
            .ok();
    } else {
        registry.with(fmt::layer().with_target(false)).try_init().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_noise_is_capped_at_warn() {
        let d = default_directives(Level::DEBUG);
        assert!(d.starts_with("debug,"));
        assert!(d.contains("surrealdb=warn"));
    }

    #[test]
    fn quieter_levels_pass_through() {
        // tracing orders ERROR below WARN.
        let d = default_directives(Level::ERROR);
        assert!(d.contains("surrealdb=error"));
    }

    #[test]
    fn init_twice_is_harmless() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
    }
}
