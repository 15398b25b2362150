//! Log filter and subscriber setup for the `fanout` binary.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Level overrides from the command line. `RUST_LOG`, when set, replaces all of it.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default level for every target.
    pub level: String,
    /// `(crate, level)` pairs from `--log-component`, applied after `level`.
    pub components: Vec<(String, String)>,
    pub json: bool,
}

impl LogConfig {
    /// `EnvFilter` directives, e.g. `"info,fanout_core=debug"`.
    pub fn directives(&self) -> String {
        std::iter::once(self.level.to_ascii_lowercase())
            .chain(
                self.components
                    .iter()
                    .map(|(target, level)| format!("{}={}", target.replace('-', "_"), level)),
            )
            .collect::<Vec<_>>()
            .join(",")
    }

    fn filter(&self) -> EnvFilter {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }
        EnvFilter::try_new(self.directives()).unwrap_or_else(|e| {
            eprintln!("invalid log directives {:?}: {e}; using info", self.directives());
            EnvFilter::new("info")
        })
    }
}

/// Parse one `crate=level` override.
pub fn parse_component(raw: &str) -> Result<(String, String), String> {
    let (target, level) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected crate=level, got {raw:?}"))?;
    let (target, level) = (target.trim(), level.trim().to_ascii_lowercase());
    if target.is_empty() {
        return Err(format!("missing crate name in {raw:?}"));
    }
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => Ok((target.to_string(), level)),
        other => Err(format!("unknown level {other:?} for {target}")),
    }
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init_tracing(config: &LogConfig) {
    let registry = tracing_subscriber::registry().with(config.filter());
    if config.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
