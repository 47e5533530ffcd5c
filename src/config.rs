use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use url::Url;

use crate::remote::RemoteSettings;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Sidecar for the Qoyod sync dashboard. Speaks newline-delimited JSON on
/// stdin/stdout; diagnostics go to stderr.
#[derive(Debug, Parser)]
#[command(name = "qoyodd", version)]
pub struct Cli {
    /// Base URL of the dashboard backend.
    #[arg(long, env = "QOYOD_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Optional TOML file with the same keys.
    #[arg(long, env = "QOYODD_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "QOYOD_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    /// Send the tunnel bypass header (development tunnels only).
    #[arg(long, env = "QOYOD_TUNNEL_BYPASS")]
    pub tunnel_bypass: Option<bool>,

    #[arg(long, env = "QOYODD_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, value_enum, env = "QOYODD_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    backend_url: Option<String>,
    request_timeout_secs: Option<u64>,
    tunnel_bypass: Option<bool>,
    logging: LoggingSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LoggingSection {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub remote: RemoteSettings,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Command line and environment win over the file.
    pub fn resolve(cli: Cli) -> anyhow::Result<Self> {
        let file = match cli.config.as_deref() {
            Some(path) => load_file(path)?,
            None => FileConfig::default(),
        };

        let raw_url = cli
            .backend_url
            .or(file.backend_url)
            .ok_or_else(|| anyhow!("backend url is required (--backend-url or QOYOD_BACKEND_URL)"))?;
        let backend_url = Url::parse(raw_url.trim())
            .with_context(|| format!("invalid backend url {raw_url:?}"))?;
        if backend_url.cannot_be_a_base() {
            return Err(anyhow!("backend url {raw_url:?} cannot carry a path"));
        }

        let timeout_secs = cli
            .request_timeout_secs
            .or(file.request_timeout_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(anyhow!("request timeout must be at least one second"));
        }

        Ok(Config {
            remote: RemoteSettings {
                backend_url,
                request_timeout: Duration::from_secs(timeout_secs),
                tunnel_bypass: cli.tunnel_bypass.or(file.tunnel_bypass).unwrap_or(false),
            },
            log_level: cli
                .log_level
                .or(file.logging.level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_format: cli.log_format.or(file.logging.format).unwrap_or_default(),
        })
    }
}

fn load_file(path: &Path) -> anyhow::Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["qoyodd"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("parse args")
    }

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}.toml",
            name,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::write(&p, contents).expect("write config");
        p
    }

    #[test]
    fn flags_resolve_with_defaults() {
        let config = Config::resolve(cli(&["--backend-url", "https://api.example.test/v1/"]))
            .expect("resolve");
        assert_eq!(config.remote.backend_url.as_str(), "https://api.example.test/v1/");
        assert_eq!(config.remote.request_timeout, Duration::from_secs(30));
        assert!(!config.remote.tunnel_bypass);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn flags_override_file_values() {
        let path = temp_file(
            "qoyodd-config",
            r#"
backend_url = "https://file.example.test"
request_timeout_secs = 5
tunnel_bypass = true

[logging]
level = "debug"
format = "json"
"#,
        );
        let config = Config::resolve(cli(&[
            "--config",
            path.to_str().expect("utf8 path"),
            "--request-timeout-secs",
            "9",
        ]))
        .expect("resolve");
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.remote.backend_url.host_str(), Some("file.example.test"));
        assert_eq!(config.remote.request_timeout, Duration::from_secs(9));
        assert!(config.remote.tunnel_bypass);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn unusable_urls_and_timeouts_are_rejected() {
        assert!(Config::resolve(cli(&["--backend-url", "not a url"])).is_err());
        assert!(Config::resolve(cli(&["--backend-url", "mailto:ops@example.test"])).is_err());
        assert!(Config::resolve(cli(&[
            "--backend-url",
            "https://api.example.test",
            "--request-timeout-secs",
            "0"
        ]))
        .is_err());
    }
}
