// Command-line options for Next Train Finder
use crate::ntf_models::MtrScheduleClient;
use clap::Parser;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "ntf", version, about = "Live MTR next-train arrivals in your terminal")]
pub struct Config {
    /// Next-train schedule endpoint
    #[arg(long, default_value = MtrScheduleClient::DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = MtrScheduleClient::REQUEST_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Countdown refresh interval in milliseconds
    #[arg(long, default_value_t = Config::DEFAULT_TICK_MILLIS)]
    pub tick_millis: u64,

    /// Log filter (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, short = 'l', default_value = "warn")]
    pub log_level: String,

    /// Disable ANSI colours
    #[arg(long)]
    pub no_color: bool,
}

impl Config {
    pub const DEFAULT_TICK_MILLIS: u64 = 1000;

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_millis.max(100))
    }
}
