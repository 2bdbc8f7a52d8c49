use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default base URL of the platform API when `BASE_URL` is not set.
pub const DEFAULT_BASE_URL: &str = "http://localhost:4000";

/// Default path of the Server-Sent Events stream, relative to the base URL.
pub const DEFAULT_SSE_PATH: &str = "/realtime/events";

#[derive(Clone, Debug, PartialEq)]
pub enum RustEnv {
    Development,
    Production,
    Staging,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RustEnvParseError;

impl FromStr for RustEnv {
    type Err = RustEnvParseError;
    fn from_str(level: &str) -> Result<RustEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RustEnv::Development),
            "production" => Ok(RustEnv::Production),
            "staging" => Ok(RustEnv::Staging),
            _ => Err(RustEnvParseError),
        }
    }
}

impl fmt::Display for RustEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RustEnv::Development => write!(f, "development"),
            RustEnv::Production => write!(f, "production"),
            RustEnv::Staging => write!(f, "staging"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Base URL of the platform API. Pull fetches, the push stream and the
    /// join request are all resolved against it.
    #[arg(short, long, env, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Identifier of the signed-in user. Messages sent by this user never
    /// raise a conversation's unread count.
    #[arg(short, long, env)]
    user_id: Option<String>,

    /// Bearer token presented on the push stream and on every pull fetch.
    #[arg(long, env, hide_env_values = true)]
    access_token: Option<String>,

    /// Path of the Server-Sent Events stream.
    #[arg(long, env, default_value = DEFAULT_SSE_PATH)]
    pub sse_path: String,

    /// Delay in milliseconds before the first reconnect attempt after the stream drops
    #[arg(long, env, default_value_t = 500)]
    pub reconnect_initial_delay_ms: u64,

    /// Upper bound in seconds for the reconnect delay
    #[arg(long, env, default_value_t = 30)]
    pub reconnect_max_delay_secs: u64,

    /// Factor the reconnect delay grows by after each failed attempt
    #[arg(long, env, default_value_t = 2)]
    pub reconnect_backoff_factor: u32,

    /// Number of messages per cached message page
    #[arg(long, env, default_value_t = 50)]
    pub message_page_size: u32,

    /// Number of notifications per cached notification page
    #[arg(long, env, default_value_t = 20)]
    pub notification_page_size: u32,

    /// Capacity of the cache change broadcast. Slow subscribers that fall
    /// further behind re-read their entries.
    #[arg(long, env, default_value_t = 256)]
    pub cache_event_capacity: usize,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Set the Rust runtime environment to use.
    #[arg(
    short,
    long,
    env,
    default_value_t = RustEnv::Development,
    value_parser = clap::builder::PossibleValuesParser::new([
        "DEVELOPMENT", "PRODUCTION", "STAGING",
        "development", "production", "staging"
    ])
        .map(|s| s.parse::<RustEnv>().unwrap()),
    )]
    pub runtime_env: RustEnv,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn set_user_id(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn set_access_token(mut self, access_token: String) -> Self {
        self.access_token = Some(access_token);
        self
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_token.clone()
    }

    pub fn reconnect_initial_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_delay_ms)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_max_delay_secs)
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }

    pub fn is_production(&self) -> bool {
        self.runtime_env() == RustEnv::Production
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["elearning_platform_rs"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_rust_env_parses_case_insensitively() {
        assert_eq!("PRODUCTION".parse::<RustEnv>(), Ok(RustEnv::Production));
        assert_eq!("staging".parse::<RustEnv>(), Ok(RustEnv::Staging));
        assert_eq!("qa".parse::<RustEnv>(), Err(RustEnvParseError));
    }

    #[test]
    fn test_identity_flags_are_read() {
        let config = parse(&["--user-id", "u1", "--access-token", "secret"]);

        assert_eq!(config.user_id(), Some("u1"));
        assert_eq!(config.access_token(), Some("secret".to_string()));
    }

    #[test]
    fn test_reconnect_delays_convert_units() {
        let config = parse(&[
            "--reconnect-initial-delay-ms",
            "250",
            "--reconnect-max-delay-secs",
            "10",
        ]);

        assert_eq!(config.reconnect_initial_delay(), Duration::from_millis(250));
        assert_eq!(config.reconnect_max_delay(), Duration::from_secs(10));
    }

    #[test]
    fn test_log_level_and_runtime_env_flags() {
        let config = parse(&["--log-level-filter", "DEBUG", "--runtime-env", "PRODUCTION"]);

        assert_eq!(config.log_level_filter, LevelFilter::Debug);
        assert!(config.is_production());
    }

    #[test]
    fn test_setters_override_parsed_identity() {
        let config = parse(&[])
            .set_user_id("u2".to_string())
            .set_access_token("token-2".to_string());

        assert_eq!(config.user_id(), Some("u2"));
        assert_eq!(config.access_token(), Some("token-2".to_string()));
    }
}
