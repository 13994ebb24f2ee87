use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub overrides: OverrideConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Unit the poll interval is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    #[default]
    Milliseconds,
    Seconds,
    Minutes,
}

impl TimeUnit {
    pub fn to_duration(self, amount: u64) -> Duration {
        match self {
            TimeUnit::Milliseconds => Duration::from_millis(amount),
            TimeUnit::Seconds => Duration::from_secs(amount),
            TimeUnit::Minutes => Duration::from_secs(amount.saturating_mul(60)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    /// Delay between the end of one poll cycle and the start of the next
    #[serde(default = "default_poll_interval")]
    pub interval: u64,
    #[serde(default)]
    pub interval_unit: TimeUnit,
    /// Demand requested by subscribers on subscribe (negative = source default page)
    #[serde(default = "default_num_notifications")]
    pub num_notifications: i64,
    /// Consecutive fetch failures before a subscription cancels itself (0 = never)
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverrideConfig {
    /// resource name -> full version string
    #[serde(default)]
    pub full: HashMap<String, String>,
    /// resource name -> abbreviated version (`v16`, `16`, `v16.0.0`)
    #[serde(default)]
    pub abbreviated: HashMap<String, String>,
    #[serde(default = "default_media_type_prefix")]
    pub media_type_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of the human-readable format
    #[serde(default)]
    pub json: bool,
}

fn default_poll_interval() -> u64 {
    1000 // 1 second
}

fn default_num_notifications() -> i64 {
    crate::poll::DEFAULT_NUM_NOTIFICATIONS
}

fn default_max_consecutive_failures() -> u32 {
    5
}

fn default_page_size() -> u32 {
    crate::notification::DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> u32 {
    crate::notification::MAX_PAGE_SIZE
}

fn default_media_type_prefix() -> String {
    crate::notification::DEFAULT_MEDIA_TYPE_PREFIX.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Prefix of environment overrides, e.g. `CHANGE_NOTIFICATIONS_POLL__INTERVAL_UNIT`
pub const ENV_PREFIX: &str = "CHANGE_NOTIFICATIONS";

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        Self::layered(Environment::with_prefix(ENV_PREFIX))
    }

    fn layered(environment: Environment) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("poll.interval", default_poll_interval() as i64)?
            .set_default("poll.interval_unit", "milliseconds")?
            .set_default("poll.num_notifications", default_num_notifications())?
            .set_default(
                "poll.max_consecutive_failures",
                default_max_consecutive_failures() as i64,
            )?
            .set_default("source.default_page_size", default_page_size() as i64)?
            .set_default("source.max_page_size", default_max_page_size() as i64)?
            .set_default("logging.level", default_log_level())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Field names contain `_`, so sections are split on `__`:
            // CHANGE_NOTIFICATIONS_POLL__INTERVAL_UNIT, CHANGE_NOTIFICATIONS_SOURCE__DEFAULT_PAGE_SIZE
            .add_source(
                environment
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        self.interval_unit.to_duration(self.interval)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            interval_unit: TimeUnit::default(),
            num_notifications: default_num_notifications(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl Default for OverrideConfig {
    fn default() -> Self {
        Self {
            full: HashMap::new(),
            abbreviated: HashMap::new(),
            media_type_prefix: default_media_type_prefix(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
