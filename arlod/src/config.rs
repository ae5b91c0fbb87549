//! The daemon's configuration. A small TOML file names the cloud
//! account and tunes the client; everything except the credentials
//! has a default. Time-valued keys are written in whole seconds
//! (except where noted) and are coerced into durations here, so the
//! rest of the code never sees raw integers.

use arlo_client::{constant, ClientOptions, ModeApi};
use serde_derive::Deserialize;
use std::env;
use std::path::PathBuf;
use tokio::time::Duration;
use tracing::Level;

#[derive(Deserialize)]
pub struct Config {
    log_level: Option<String>,
    pub cloud: Cloud,
}

impl Config {
    pub fn get_log_level(&self) -> Level {
        let v = self.log_level.as_deref().unwrap_or("warn");

        match v {
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            "trace" => Level::TRACE,
            _ => Level::WARN,
        }
    }
}

/// The `[cloud]` table. Field meanings follow the client options;
/// `refresh_devices_every` is in hours and `reconnect_every` in
/// minutes, everything else time-valued is in seconds.

#[derive(Deserialize)]
pub struct Cloud {
    username: String,
    password: String,
    host: Option<String>,
    scan_interval: Option<u64>,
    packet_dump: Option<bool>,
    cache_videos: Option<bool>,
    no_media_upload: Option<bool>,
    motion_debounce: Option<u64>,
    ding_debounce: Option<u64>,
    recent_window: Option<u64>,
    request_timeout: Option<u64>,
    stream_timeout: Option<u64>,
    last_format: Option<String>,
    storage_dir: Option<String>,
    user_agent: Option<String>,
    mode_api: Option<String>,
    refresh_devices_every: Option<u64>,
    reconnect_every: Option<u64>,
    http_connections: Option<usize>,
    http_max_size: Option<usize>,
}

impl Cloud {
    pub fn get_host(&self) -> &str {
        self.host.as_deref().unwrap_or(constant::DEFAULT_HOST)
    }

    pub fn get_scan_interval(&self) -> Duration {
        Duration::from_secs(
            self.scan_interval.unwrap_or(constant::FAST_REFRESH_INTERVAL),
        )
    }

    pub fn get_motion_debounce(&self) -> Duration {
        Duration::from_secs(self.motion_debounce.unwrap_or(30))
    }

    pub fn get_ding_debounce(&self) -> Duration {
        Duration::from_secs(self.ding_debounce.unwrap_or(10))
    }

    pub fn get_recent_window(&self) -> Duration {
        Duration::from_secs(self.recent_window.unwrap_or(600))
    }

    pub fn get_request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.unwrap_or(60))
    }

    pub fn get_stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout.unwrap_or(0))
    }

    pub fn get_last_format(&self) -> &str {
        self.last_format.as_deref().unwrap_or("%m-%d %H:%M")
    }

    /// The storage directory. When the config leaves it unset (or
    /// empty), a `.arlo` directory under the user's home is used.

    pub fn get_storage_dir(&self) -> PathBuf {
        match self.storage_dir.as_deref() {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => {
                let base =
                    env::var("HOME").unwrap_or_else(|_| String::from("."));

                PathBuf::from(base).join(".arlo")
            }
        }
    }

    pub fn get_user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or("apple")
    }

    pub fn get_refresh_devices_every(&self) -> u64 {
        self.refresh_devices_every.unwrap_or(0)
    }

    pub fn get_reconnect_every(&self) -> u64 {
        self.reconnect_every.unwrap_or(0)
    }

    pub fn get_http_connections(&self) -> usize {
        self.http_connections.unwrap_or(5)
    }

    pub fn get_http_max_size(&self) -> usize {
        self.http_max_size.unwrap_or(10)
    }

    /// Assembles the client options this configuration describes.
    /// This is the seam between the file format and the client; a
    /// bad `mode_api` or host URL is caught here, before any network
    /// traffic.

    pub fn client_options(&self) -> arlo_api::Result<ClientOptions> {
        let mut opts = ClientOptions::new(&self.username, &self.password);

        opts.host = String::from(self.get_host());
        opts.storage_dir = self.get_storage_dir();
        opts.packet_dump = self.packet_dump.unwrap_or(false);
        opts.cache_videos = self.cache_videos.unwrap_or(false);
        opts.no_media_upload = self.no_media_upload.unwrap_or(false);
        opts.motion_debounce = self.get_motion_debounce();
        opts.ding_debounce = self.get_ding_debounce();
        opts.recent_window = self.get_recent_window();
        opts.request_timeout = self.get_request_timeout();
        opts.stream_timeout = self.get_stream_timeout();
        opts.last_format = String::from(self.get_last_format());
        opts.user_agent = String::from(self.get_user_agent());
        opts.mode_api =
            self.mode_api.as_deref().unwrap_or("auto").parse::<ModeApi>()?;
        opts.scan_interval = self.get_scan_interval();
        opts.refresh_devices_every = self.get_refresh_devices_every();
        opts.reconnect_every = self.get_reconnect_every();
        opts.http_connections = self.get_http_connections();
        opts.http_max_size = self.get_http_max_size();

        opts.validate()?;
        Ok(opts)
    }
}

struct CmdLine {
    config_file: Option<String>,
    verbosity: u8,
    print_cfg: bool,
}

fn parse_cmdline() -> CmdLine {
    use clap::{Arg, ArgAction, Command};

    // Define the command line arguments.

    let matches = Command::new("arlod")
        .version("0.1")
        .about("Exposes Arlo cloud cameras to a home-automation host.")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Specifies the configuration file")
                .num_args(1),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Sets verbosity of log; can be used more than once"),
        )
        .arg(
            Arg::new("print_cfg")
                .long("print-config")
                .action(ArgAction::SetTrue)
                .help("Displays the configuration and exits"),
        )
        .get_matches();

    CmdLine {
        config_file: matches.get_one::<String>("config").cloned(),
        verbosity: matches.get_count("verbose"),
        print_cfg: matches.get_flag("print_cfg"),
    }
}

fn parse_config(path: &str, contents: &str) -> Option<Config> {
    match toml::from_str(contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            print!("ERROR: {},\n       ignoring {}\n", e, path);
            None
        }
    }
}

async fn from_file(path: &str) -> Option<Config> {
    use tokio::fs;

    if let Ok(contents) = fs::read(path).await {
        let contents = String::from_utf8_lossy(&contents);

        parse_config(path, &contents)
    } else {
        None
    }
}

async fn find_cfg() -> Option<Config> {
    const CFG_FILE: &str = "arlod.toml";

    // Create a vector of directories that could contain a
    // configuration file. The directories will be searched in their
    // order within the vector.

    let mut dirs = vec![String::from("./")];

    // If the user has `HOME` defined, append their home directory to
    // the search path. Note the end of the path has a period. This is
    // done so the file will be named `.arlod.toml` in the home
    // directory.

    if let Ok(home) = env::var("HOME") {
        dirs.push(format!("{}/.", home))
    }

    // Add other, common configuration areas.

    dirs.push(String::from("/usr/local/etc/"));
    dirs.push(String::from("/etc/"));

    // Iterate through the directories. The first file that is found
    // and can be parsed is used as the configuration.

    for dir in dirs {
        let file = format!("{}{}", &dir, CFG_FILE);

        if let Some(cfg) = from_file(&file).await {
            return Some(cfg);
        }
    }

    print!("ERROR: no usable configuration found\n");
    None
}

fn dump_config(cfg: &Config) {
    println!("Configuration:");
    println!("    log level: {}\n", cfg.get_log_level());

    println!("Cloud account:");
    println!("    username: {}", &cfg.cloud.username);
    println!("    host: {}", cfg.cloud.get_host());
    println!("    user agent: {}", cfg.cloud.get_user_agent());
    println!("    storage: {}\n", cfg.cloud.get_storage_dir().display());

    println!("Tuning:");
    println!("    scan interval: {:?}", cfg.cloud.get_scan_interval());
    println!("    motion debounce: {:?}", cfg.cloud.get_motion_debounce());
    println!("    ding debounce: {:?}", cfg.cloud.get_ding_debounce());
    println!("    recent window: {:?}", cfg.cloud.get_recent_window());
    println!("    request timeout: {:?}", cfg.cloud.get_request_timeout());
    println!("    stream timeout: {:?}", cfg.cloud.get_stream_timeout());
    println!(
        "    refresh devices every: {} h",
        cfg.cloud.get_refresh_devices_every()
    );
    println!(
        "    reconnect every: {} min",
        cfg.cloud.get_reconnect_every()
    );
    println!(
        "    http pool: {}/{}",
        cfg.cloud.get_http_connections(),
        cfg.cloud.get_http_max_size()
    );
}

#[tracing::instrument(name = "loading config")]
pub async fn get() -> Option<Config> {
    let cmdline = parse_cmdline();
    let mut cfg = match &cmdline.config_file {
        Some(path) => from_file(path).await,
        None => find_cfg().await,
    }?;

    // The number of '-v' options raises the log level.

    match cmdline.verbosity {
        0 => (),
        1 => cfg.log_level = Some(String::from("info")),
        2 => cfg.log_level = Some(String::from("debug")),
        _ => cfg.log_level = Some(String::from("trace")),
    };

    if cmdline.print_cfg {
        dump_config(&cfg);
        None
    } else {
        Some(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[cloud]
username = "user@example.com"
password = "hunter2"
"#;

    #[test]
    fn test_required_keys() {
        // Verify that a missing [cloud] section fails.

        assert!(
            toml::from_str::<Config>("").is_err(),
            "TOML parser accepted missing [cloud] section"
        );

        // Verify the credentials are required.

        assert!(
            toml::from_str::<Config>(
                r#"
[cloud]
password = "hunter2"
"#,
            )
            .is_err(),
            "TOML parser accepted [cloud] section with missing username"
        );

        assert!(
            toml::from_str::<Config>(
                r#"
[cloud]
username = "user@example.com"
"#,
            )
            .is_err(),
            "TOML parser accepted [cloud] section with missing password"
        );
    }

    #[test]
    fn test_bad_types() {
        assert!(
            toml::from_str::<Config>(
                r#"
[cloud]
username = "user@example.com"
password = "hunter2"
scan_interval = "fast"
"#,
            )
            .is_err(),
            "TOML parser accepted non-integer scan_interval"
        );

        assert!(
            toml::from_str::<Config>(
                r#"
[cloud]
username = "user@example.com"
password = "hunter2"
packet_dump = 5
"#,
            )
            .is_err(),
            "TOML parser accepted non-boolean packet_dump"
        );

        // The integer knobs reject negative values outright.

        assert!(
            toml::from_str::<Config>(
                r#"
[cloud]
username = "user@example.com"
password = "hunter2"
http_connections = -1
"#,
            )
            .is_err(),
            "TOML parser accepted negative http_connections"
        );
    }

    #[test]
    fn test_log_level() {
        let cfg = toml::from_str::<Config>(MINIMAL).unwrap();

        assert_eq!(cfg.get_log_level(), Level::WARN);

        for (text, level) in [
            ("info", Level::INFO),
            ("debug", Level::DEBUG),
            ("trace", Level::TRACE),
            ("bogus", Level::WARN),
        ] {
            let cfg = toml::from_str::<Config>(&format!(
                "log_level = \"{}\"\n{}",
                text, MINIMAL
            ))
            .unwrap();

            assert_eq!(cfg.get_log_level(), level);
        }
    }

    #[test]
    fn test_defaults() {
        let cfg = toml::from_str::<Config>(MINIMAL).unwrap();
        let cloud = &cfg.cloud;

        assert_eq!(cloud.get_host(), constant::DEFAULT_HOST);
        assert_eq!(cloud.get_scan_interval(), Duration::from_secs(60));
        assert_eq!(cloud.get_motion_debounce(), Duration::from_secs(30));
        assert_eq!(cloud.get_ding_debounce(), Duration::from_secs(10));
        assert_eq!(cloud.get_recent_window(), Duration::from_secs(600));
        assert_eq!(cloud.get_request_timeout(), Duration::from_secs(60));
        assert_eq!(cloud.get_stream_timeout(), Duration::from_secs(0));
        assert_eq!(cloud.get_last_format(), "%m-%d %H:%M");
        assert_eq!(cloud.get_user_agent(), "apple");
        assert_eq!(cloud.get_refresh_devices_every(), 0);
        assert_eq!(cloud.get_reconnect_every(), 0);
        assert_eq!(cloud.get_http_connections(), 5);
        assert_eq!(cloud.get_http_max_size(), 10);
        assert!(cloud
            .get_storage_dir()
            .to_string_lossy()
            .ends_with(".arlo"));
    }

    #[test]
    fn test_coercion() {
        let cfg = toml::from_str::<Config>(
            r#"
[cloud]
username = "user@example.com"
password = "hunter2"
scan_interval = 90
motion_debounce = 45
stream_timeout = 120
refresh_devices_every = 4
reconnect_every = 30
storage_dir = "/var/lib/arlo"
"#,
        )
        .unwrap();
        let cloud = &cfg.cloud;

        assert_eq!(cloud.get_scan_interval(), Duration::from_secs(90));
        assert_eq!(cloud.get_motion_debounce(), Duration::from_secs(45));
        assert_eq!(cloud.get_stream_timeout(), Duration::from_secs(120));

        // Hours and minutes pass through as counts; the client
        // scales them.

        assert_eq!(cloud.get_refresh_devices_every(), 4);
        assert_eq!(cloud.get_reconnect_every(), 30);
        assert_eq!(
            cloud.get_storage_dir(),
            PathBuf::from("/var/lib/arlo")
        );

        // An explicitly empty storage_dir falls back to the default.

        let cfg = toml::from_str::<Config>(
            r#"
[cloud]
username = "user@example.com"
password = "hunter2"
storage_dir = ""
"#,
        )
        .unwrap();

        assert!(cfg
            .cloud
            .get_storage_dir()
            .to_string_lossy()
            .ends_with(".arlo"));
    }

    #[test]
    fn test_client_options() {
        let cfg = toml::from_str::<Config>(
            r#"
[cloud]
username = "user@example.com"
password = "hunter2"
host = "https://cloud.example.com"
packet_dump = true
cache_videos = true
no_media_upload = true
last_format = "%H:%M"
user_agent = "linux"
mode_api = "v2"
http_connections = 8
http_max_size = 16
"#,
        )
        .unwrap();
        let opts = cfg.cloud.client_options().unwrap();

        assert_eq!(opts.username, "user@example.com");
        assert_eq!(opts.password, "hunter2");
        assert_eq!(opts.host, "https://cloud.example.com");
        assert!(opts.packet_dump);
        assert!(opts.cache_videos);
        assert!(opts.no_media_upload);
        assert_eq!(opts.last_format, "%H:%M");
        assert_eq!(opts.user_agent, "linux");
        assert_eq!(opts.mode_api, ModeApi::V2);
        assert_eq!(opts.http_connections, 8);
        assert_eq!(opts.http_max_size, 16);

        // Every valid configuration must satisfy the client's own
        // validation.

        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_bad_mode_api() {
        let cfg = toml::from_str::<Config>(
            r#"
[cloud]
username = "user@example.com"
password = "hunter2"
mode_api = "v3"
"#,
        )
        .unwrap();

        assert!(cfg.cloud.client_options().is_err());
    }
}
