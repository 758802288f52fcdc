//! Tracing subscriber setup for the command-line binary.
//!
//! `RUST_LOG` wins when set. Otherwise the verbosity count picks the level
//! for this crate and the database drivers stay at `warn`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const NOISY_MODULES: &[&str] = &["r2d2", "postgres", "tokio_postgres"];

pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

fn build_filter(verbosity: u8) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut directives = String::from(level_for(verbosity));
    for module in NOISY_MODULES {
        directives.push_str(&format!(",{}=warn", module));
    }
    EnvFilter::new(directives)
}

/// Installs the global subscriber writing to stderr. Calling it twice is a
/// no-op.
pub fn init(verbosity: u8) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = tracing_subscriber::registry()
        .with(build_filter(verbosity))
        .with(fmt_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_for(0), "info");
        assert_eq!(level_for(1), "debug");
        assert_eq!(level_for(2), "trace");
        assert_eq!(level_for(9), "trace");
    }

    #[test]
    fn init_twice_does_not_panic() {
        init(0);
        init(2);
    }
}
