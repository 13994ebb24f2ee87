mod settings;

pub use settings::{
    LoggingConfig, OverrideConfig, PollConfig, Settings, SourceConfig, TimeUnit, ENV_PREFIX,
};
