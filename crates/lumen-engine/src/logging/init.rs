use env_logger::WriteStyle;
use log::LevelFilter;

/// Environment variable consulted when no explicit filter is configured.
pub const FILTER_ENV: &str = "LUMEN_LOG";

/// Logger configuration.
///
/// Filters use the `env_logger` directive syntax, e.g. `lumen_engine=debug`,
/// or `lumen_engine::render=trace` for per-frame stats.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter: Option<String>,
    /// Checked in order after `filter`; the first one set wins.
    pub env_vars: Vec<&'static str>,
    pub default_level: LevelFilter,
    pub write_style: WriteStyle,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: None,
            env_vars: vec![FILTER_ENV, "RUST_LOG"],
            default_level: LevelFilter::Info,
            write_style: WriteStyle::Auto,
            timestamps: false,
        }
    }
}

/// Where the active filter came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSource {
    Config(String),
    Env { var: &'static str, directives: String },
    Default(LevelFilter),
}

impl LoggingConfig {
    pub fn with_filter(mut self, directives: impl Into<String>) -> Self {
        self.filter = Some(directives.into());
        self
    }

    pub fn with_timestamps(mut self) -> Self {
        self.timestamps = true;
        self
    }

    /// Picks the filter; `lookup` reads an environment variable.
    pub fn resolve_filter(&self, lookup: impl Fn(&str) -> Option<String>) -> FilterSource {
        if let Some(f) = self.filter.as_deref().filter(|f| !f.trim().is_empty()) {
            return FilterSource::Config(f.to_owned());
        }
        self.env_vars
            .iter()
            .find_map(|&var| {
                lookup(var)
                    .filter(|v| !v.trim().is_empty())
                    .map(|directives| FilterSource::Env { var, directives })
            })
            .unwrap_or(FilterSource::Default(self.default_level))
    }

    fn builder(&self, source: &FilterSource) -> env_logger::Builder {
        let mut builder = env_logger::Builder::new();
        match source {
            FilterSource::Config(d) | FilterSource::Env { directives: d, .. } => {
                builder.parse_filters(d);
            }
            FilterSource::Default(level) => {
                builder.filter_level(*level);
            }
        }
        builder.write_style(self.write_style);
        if !self.timestamps {
            builder.format_timestamp(None);
        }
        builder
    }
}

/// Installs `env_logger` as the global logger.
///
/// Returns `false` if a logger was already installed, by an earlier call or
/// by the host; the existing one stays in place.
pub fn init_logging(config: LoggingConfig) -> bool {
    let source = config.resolve_filter(|var| std::env::var(var).ok());
    match config.builder(&source).try_init() {
        Ok(()) => {
            log::debug!("logging initialized from {source:?}");
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |var: &str| pairs.iter().find(|(k, _)| *k == var).map(|(_, v)| (*v).to_owned())
    }

    // ── filter resolution ─────────────────────────────────────────────────

    #[test]
    fn explicit_filter_beats_environment() {
        let config = LoggingConfig::default().with_filter("lumen_engine=trace");
        let source = config.resolve_filter(env(&[("RUST_LOG", "warn")]));
        assert_eq!(source, FilterSource::Config("lumen_engine=trace".into()));
    }

    #[test]
    fn engine_variable_is_checked_before_rust_log() {
        let config = LoggingConfig::default();
        let source = config.resolve_filter(env(&[("RUST_LOG", "warn"), (FILTER_ENV, "debug")]));
        assert_eq!(source, FilterSource::Env { var: FILTER_ENV, directives: "debug".into() });

        let source = config.resolve_filter(env(&[("RUST_LOG", "warn")]));
        assert_eq!(source, FilterSource::Env { var: "RUST_LOG", directives: "warn".into() });
    }

    #[test]
    fn blank_values_fall_through_to_default_level() {
        let config = LoggingConfig { default_level: LevelFilter::Error, ..Default::default() }.with_filter("  ");
        let source = config.resolve_filter(env(&[(FILTER_ENV, ""), ("RUST_LOG", " ")]));
        assert_eq!(source, FilterSource::Default(LevelFilter::Error));
    }

    // ── installation ──────────────────────────────────────────────────────

    #[test]
    fn second_install_leaves_the_first_in_place() {
        // Whichever call wins, the next one must report the logger as taken.
        init_logging(LoggingConfig::default().with_filter("off"));
        assert!(!init_logging(LoggingConfig::default()));
    }
}
