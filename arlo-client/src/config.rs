use crate::constant;
use arlo_api::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;
use tokio::time::Duration;

/// Selects which wire protocol is used to change a base station's
/// active mode.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeApi {
    /// Pick per base station: stations that report a unique id are
    /// driven through the automation protocol, older ones through the
    /// notify protocol.
    Auto,
    /// Always use the notify protocol.
    V1,
    /// Always use the automation protocol.
    V2,
}

impl FromStr for ModeApi {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "auto" => Ok(ModeApi::Auto),
            "v1" => Ok(ModeApi::V1),
            "v2" => Ok(ModeApi::V2),
            _ => Err(Error::ConfigError(format!(
                "'{}' is not a mode api; expected auto, v1 or v2",
                s
            ))),
        }
    }
}

/// Everything the client needs to talk to the cloud service. The
/// daemon builds one of these from its configuration file; defaults
/// here match what the service expects from a stock installation.

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub username: String,
    pub password: String,
    pub host: String,

    /// Directory for cached videos, packet dumps, and notifications.
    pub storage_dir: PathBuf,

    pub packet_dump: bool,
    pub cache_videos: bool,
    pub no_media_upload: bool,

    pub motion_debounce: Duration,
    pub ding_debounce: Duration,
    pub recent_window: Duration,
    pub request_timeout: Duration,

    /// Idle limit on the event stream. Zero falls back to the
    /// service's own stream watchdog interval.
    pub stream_timeout: Duration,

    /// `strftime` pattern used to render last-capture timestamps.
    pub last_format: String,

    pub user_agent: String,
    pub mode_api: ModeApi,

    /// How often device state is polled, independent of the event
    /// stream.
    pub scan_interval: Duration,

    /// Re-run device discovery every this many hours. Zero disables.
    pub refresh_devices_every: u64,

    /// Tear down and rebuild the cloud session every this many
    /// minutes. Zero disables.
    pub reconnect_every: u64,

    pub http_connections: usize,
    pub http_max_size: usize,
}

impl ClientOptions {
    pub fn new(username: &str, password: &str) -> Self {
        ClientOptions {
            username: String::from(username),
            password: String::from(password),
            host: String::from(constant::DEFAULT_HOST),
            storage_dir: PathBuf::new(),
            packet_dump: false,
            cache_videos: false,
            no_media_upload: false,
            motion_debounce: Duration::from_secs(30),
            ding_debounce: Duration::from_secs(10),
            recent_window: Duration::from_secs(600),
            request_timeout: Duration::from_secs(60),
            stream_timeout: Duration::from_secs(0),
            last_format: String::from("%m-%d %H:%M"),
            user_agent: String::from("apple"),
            mode_api: ModeApi::Auto,
            scan_interval: Duration::from_secs(
                constant::FAST_REFRESH_INTERVAL,
            ),
            refresh_devices_every: 0,
            reconnect_every: 0,
            http_connections: 5,
            http_max_size: 10,
        }
    }

    /// Checks the options for problems a `connect()` would only
    /// stumble over later.

    pub fn validate(&self) -> Result<()> {
        if self.username.is_empty() {
            return Err(Error::ConfigError(String::from(
                "'username' must not be empty",
            )));
        }

        if self.password.is_empty() {
            return Err(Error::ConfigError(String::from(
                "'password' must not be empty",
            )));
        }

        if let Err(e) = reqwest::Url::parse(&self.host) {
            return Err(Error::ConfigError(format!(
                "'host' is not a url -- {}",
                e
            )));
        }

        if self.http_connections == 0 || self.http_max_size == 0 {
            return Err(Error::ConfigError(String::from(
                "http pool sizes must be positive",
            )));
        }

        if self.scan_interval.is_zero() {
            return Err(Error::ConfigError(String::from(
                "'scan_interval' must be positive",
            )));
        }

        Ok(())
    }

    /// Maps the configured persona onto the header value sent with
    /// every request. Unknown personas pass through verbatim so a
    /// user can supply a full agent string.

    pub fn user_agent_header(&self) -> &str {
        match self.user_agent.as_str() {
            "apple" => constant::APPLE_USER_AGENT,
            "linux" => constant::LINUX_USER_AGENT,
            other => other,
        }
    }
}
