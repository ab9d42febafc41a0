use log::LevelFilter;

/// Crates under wgpu that are governed by [`LoggingConfig::backend_level`].
const BACKEND_CRATES: [&str; 4] = ["wgpu", "wgpu_core", "wgpu_hal", "naga"];

/// Logger configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level for every target without a more specific directive.
    pub level: LevelFilter,
    /// Level for the graphics backend crates, which are chatty at `info`.
    pub backend_level: LevelFilter,
    /// Per-target directives, e.g. `("veil_engine::surface", Trace)`.
    /// Later entries win over earlier ones.
    pub targets: Vec<(String, LevelFilter)>,
    /// When set, a non-empty `RUST_LOG` replaces the directives above.
    pub honor_env: bool,
    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            backend_level: LevelFilter::Warn,
            targets: Vec::new(),
            honor_env: true,
            write_style: env_logger::WriteStyle::Auto,
        }
    }
}

impl LoggingConfig {
    /// Adds a directive for `target`.
    pub fn with_target(mut self, target: impl Into<String>, level: LevelFilter) -> Self {
        self.targets.push((target.into(), level));
        self
    }

    /// The `env_logger` filter string built from this config, ignoring
    /// `RUST_LOG`.
    pub fn filter(&self) -> String {
        let mut parts = vec![level_name(self.level).to_string()];
        parts.extend(
            BACKEND_CRATES
                .iter()
                .map(|krate| format!("{krate}={}", level_name(self.backend_level))),
        );
        parts.extend(
            self.targets
                .iter()
                .map(|(target, level)| format!("{target}={}", level_name(*level))),
        );
        parts.join(",")
    }

    fn effective_filter(&self) -> String {
        if self.honor_env {
            if let Some(env) = std::env::var("RUST_LOG").ok().filter(|v| !v.trim().is_empty()) {
                return env;
            }
        }
        self.filter()
    }
}

fn level_name(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}

/// Installs `env_logger` as the global logger.
///
/// Returns `false` when a logger was already installed, by an earlier call
/// or by the host; the existing one is left in place.
pub fn init_logging(config: LoggingConfig) -> bool {
    let filter = config.effective_filter();
    let installed = env_logger::Builder::new()
        .parse_filters(&filter)
        .write_style(config.write_style)
        .try_init()
        .is_ok();
    if installed {
        log::debug!("logging initialized with filter `{filter}`");
    }
    installed
}
