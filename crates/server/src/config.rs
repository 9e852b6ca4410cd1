// crates/server/src/config.rs
//! Runtime configuration, read once from the environment at startup.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use ari_web_observability::LogFormat;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_REPORTS_DIR: &str = "/tmp/reports";
pub const DEFAULT_UPLOADS_DIR: &str = "/tmp/uploads";
pub const DEFAULT_PWSH_PATH: &str = "pwsh";
pub const DEFAULT_PS_MODULE_PATH: &str =
    "/opt/microsoft/powershell/7/Modules:/usr/local/share/powershell/Modules";
pub const DEFAULT_EVENT_BUFFER: usize = 1024;
/// Every request preallocates its event buffer, so it is capped.
pub const MAX_EVENT_BUFFER: usize = 65_536;
pub const DEFAULT_CHECK_TIMEOUT_SECS: u64 = 30;

/// Immutable server configuration shared through `AppState`.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub reports_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub pwsh_path: PathBuf,
    pub ps_module_path: Option<String>,
    /// Frontend assets served as the fallback route, if any.
    pub static_dir: Option<PathBuf>,
    /// Kill the inventory process when the client disconnects mid-stream.
    pub cancel_on_disconnect: bool,
    /// Per-job event buffer; slow clients lose the oldest events beyond this.
    pub event_buffer: usize,
    pub check_timeout: Duration,
    pub log_format: LogFormat,
    /// Settings that were rejected and replaced by a fallback value.
    pub invalid: Vec<InvalidSetting>,
}

/// An environment value that could not be used as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSetting {
    pub key: &'static str,
    pub value: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            reports_dir: PathBuf::from(DEFAULT_REPORTS_DIR),
            uploads_dir: PathBuf::from(DEFAULT_UPLOADS_DIR),
            pwsh_path: PathBuf::from(DEFAULT_PWSH_PATH),
            ps_module_path: Some(DEFAULT_PS_MODULE_PATH.to_string()),
            static_dir: None,
            cancel_on_disconnect: false,
            event_buffer: DEFAULT_EVENT_BUFFER,
            check_timeout: Duration::from_secs(DEFAULT_CHECK_TIMEOUT_SECS),
            log_format: LogFormat::Pretty,
            invalid: Vec::new(),
        }
    }
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Unparseable values fall back to their defaults and are recorded in
    /// `invalid`; call [`Config::warn_invalid`] once logging is up.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let mut invalid = Vec::new();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let static_dir = get("STATIC_DIR").map(PathBuf::from).or_else(|| {
            let public = PathBuf::from("public");
            public.is_dir().then_some(public)
        });

        let ps_module_path = match get("ARI_PS_MODULE_PATH") {
            Some(v) if v == "-" => None,
            Some(v) => Some(v),
            None => defaults.ps_module_path,
        };

        let cancel_on_disconnect = match get("ARI_CANCEL_ON_DISCONNECT") {
            Some(raw) => parse_bool(&mut invalid, "ARI_CANCEL_ON_DISCONNECT", raw, defaults.cancel_on_disconnect),
            None => defaults.cancel_on_disconnect,
        };

        let raw_buffer = get("ARI_EVENT_BUFFER");
        let mut event_buffer =
            parse_or::<usize>(&mut invalid, "ARI_EVENT_BUFFER", raw_buffer.clone(), defaults.event_buffer);
        if !(1..=MAX_EVENT_BUFFER).contains(&event_buffer) {
            invalid.push(InvalidSetting {
                key: "ARI_EVENT_BUFFER",
                value: raw_buffer.unwrap_or_default(),
            });
            event_buffer = event_buffer.clamp(1, MAX_EVENT_BUFFER);
        }

        Self {
            host: parse_or(&mut invalid, "ARI_HOST", get("ARI_HOST"), defaults.host),
            port: parse_or(&mut invalid, "PORT", get("PORT"), defaults.port),
            reports_dir: get("ARI_REPORTS_DIR").map(PathBuf::from).unwrap_or(defaults.reports_dir),
            uploads_dir: get("ARI_UPLOADS_DIR").map(PathBuf::from).unwrap_or(defaults.uploads_dir),
            pwsh_path: get("ARI_PWSH_PATH").map(PathBuf::from).unwrap_or(defaults.pwsh_path),
            ps_module_path,
            static_dir,
            cancel_on_disconnect,
            event_buffer,
            check_timeout: Duration::from_secs(parse_or(
                &mut invalid,
                "ARI_CHECK_TIMEOUT_SECS",
                get("ARI_CHECK_TIMEOUT_SECS"),
                DEFAULT_CHECK_TIMEOUT_SECS,
            )),
            log_format: parse_or(&mut invalid, "ARI_LOG_FORMAT", get("ARI_LOG_FORMAT"), defaults.log_format),
            invalid,
        }
    }

    /// Log every rejected setting.
    pub fn warn_invalid(&self) {
        for setting in &self.invalid {
            tracing::warn!(
                key = setting.key,
                value = %setting.value,
                "invalid configuration value, using fallback"
            );
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_or<T: FromStr>(
    invalid: &mut Vec<InvalidSetting>,
    key: &'static str,
    value: Option<String>,
    default: T,
) -> T {
    match value {
        None => default,
        Some(raw) => match raw.parse() {
            Ok(v) => v,
            Err(_) => {
                invalid.push(InvalidSetting { key, value: raw });
                default
            }
        },
    }
}

fn parse_bool(
    invalid: &mut Vec<InvalidSetting>,
    key: &'static str,
    raw: String,
    default: bool,
) -> bool {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            invalid.push(InvalidSetting { key, value: raw });
            default
        }
    }
}
