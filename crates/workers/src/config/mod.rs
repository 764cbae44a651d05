mod loader;
mod schema;

pub use loader::{
    apply_env_overrides, load, load_from_file, load_from_str, resolve_rules, LoadError,
    CONFIG_ENV, DEFAULT_CONFIG_PATH,
};
pub use schema::{
    HostwatchConfig, InfluxSection, NotificationSection, PollerSection, SmsSection, SmtpSection,
};
