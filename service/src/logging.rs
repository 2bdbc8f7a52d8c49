use crate::config::{Config, RustEnv};
use log::LevelFilter;
use simplelog::{self, ConfigBuilder};

/// Modules to filter out from logging when not in Trace mode.
/// The HTTP and event stream stacks log every frame and poll at debug level.
const FILTERED_MODULES: &[&str] = &[
    "reqwest",
    "hyper",
    "hyper_util",
    "eventsource_client",
    "mio",
    "rustls",
];

pub struct Logger {}

impl Logger {
    /// Initializes the global logger for the client process.
    ///
    /// Every line carries its module target, so output from the push
    /// connection task (`sse::connection`), the reconcilers and the refetcher
    /// (`api_client::refetch`) can be told apart when they interleave.
    /// Below Trace, the HTTP and event stream stacks are filtered out.
    pub fn init_logger(config: &Config) {
        let log_level_filter = Self::convert_level_filter(config.log_level_filter);
        let apply_filters = Self::should_filter_dependencies(config.log_level_filter);
        let log_config = Self::build_log_config(apply_filters);

        simplelog::TermLogger::init(
            log_level_filter,
            log_config,
            simplelog::TerminalMode::Mixed,
            Self::color_choice(&config.runtime_env),
        )
        .unwrap_or_else(|e| eprintln!("Logger already initialized: {e}"));
    }

    /// Deployed clients ship their output to a log collector; escape codes
    /// only belong on a developer's terminal.
    fn color_choice(runtime_env: &RustEnv) -> simplelog::ColorChoice {
        match runtime_env {
            RustEnv::Development => simplelog::ColorChoice::Auto,
            RustEnv::Staging | RustEnv::Production => simplelog::ColorChoice::Never,
        }
    }

    /// Converts log::LevelFilter to simplelog::LevelFilter.
    fn convert_level_filter(level: LevelFilter) -> simplelog::LevelFilter {
        match level {
            LevelFilter::Off => simplelog::LevelFilter::Off,
            LevelFilter::Error => simplelog::LevelFilter::Error,
            LevelFilter::Warn => simplelog::LevelFilter::Warn,
            LevelFilter::Info => simplelog::LevelFilter::Info,
            LevelFilter::Debug => simplelog::LevelFilter::Debug,
            LevelFilter::Trace => simplelog::LevelFilter::Trace,
        }
    }

    /// Determines whether dependency logging should be filtered.
    ///
    /// Returns `false` for Trace level (show all logs), `true` for all other levels.
    fn should_filter_dependencies(level: LevelFilter) -> bool {
        level != LevelFilter::Trace
    }

    /// Builds a simplelog Config with optional module filtering.
    ///
    /// When `apply_filters` is true, logs from noisy dependencies are suppressed.
    fn build_log_config(apply_filters: bool) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder
            .set_time_format_rfc3339()
            .set_target_level(simplelog::LevelFilter::Trace)
            .set_location_level(simplelog::LevelFilter::Off);

        if apply_filters {
            for module in FILTERED_MODULES {
                builder.add_filter_ignore_str(module);
            }
        }

        builder.build()
    }
}
