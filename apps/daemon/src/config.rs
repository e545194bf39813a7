//! Daemon configuration from the environment
//!
//! | Variable | Default |
//! |---|---|
//! | `PUSHMUX_BASE_URL` | unset (no connections until set) |
//! | `PUSHMUX_LISTENERS` | `<data dir>/pushmux/listeners.json` |
//! | `PUSHMUX_RETRY_DELAY_SECS` | 10 |
//! | `PUSHMUX_MONITOR_INTERVAL_SECS` | 60 |
//! | `PUSHMUX_DEBOUNCE_MS` | 500 |
//! | `PUSHMUX_LOG_DIR` | `<data dir>/pushmux/logs` |

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use pushmux_core::{BaseUrl, SupervisorConfig};

const APP_DIR: &str = "pushmux";
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub base_url: Option<BaseUrl>,
    pub listeners_path: PathBuf,
    pub supervisor: SupervisorConfig,
    /// Quiet period before a changed listener file is reloaded
    pub debounce: Duration,
    pub log_dir: PathBuf,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let base_url = var("PUSHMUX_BASE_URL")
            .map(|raw| BaseUrl::parse(&raw).context("PUSHMUX_BASE_URL"))
            .transpose()?;

        let mut supervisor = SupervisorConfig::default();
        if let Some(secs) = var("PUSHMUX_RETRY_DELAY_SECS") {
            supervisor = supervisor.with_retry_delay(parse_secs("PUSHMUX_RETRY_DELAY_SECS", &secs)?);
        }
        if let Some(secs) = var("PUSHMUX_MONITOR_INTERVAL_SECS") {
            supervisor = supervisor
                .with_monitor_interval(parse_secs("PUSHMUX_MONITOR_INTERVAL_SECS", &secs)?);
        }
        supervisor
            .validate()
            .context("invalid supervisor settings")?;

        let debounce = match var("PUSHMUX_DEBOUNCE_MS") {
            Some(ms) => Duration::from_millis(
                ms.trim()
                    .parse()
                    .with_context(|| format!("PUSHMUX_DEBOUNCE_MS: not a number: {}", ms))?,
            ),
            None => DEFAULT_DEBOUNCE,
        };

        let listeners_path = var("PUSHMUX_LISTENERS")
            .map(PathBuf::from)
            .unwrap_or_else(|| app_data_dir().join("listeners.json"));
        let log_dir = var("PUSHMUX_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| app_data_dir().join("logs"));

        Ok(Self {
            base_url,
            listeners_path,
            supervisor,
            debounce,
            log_dir,
        })
    }
}

/// Machine-local data directory for the daemon.
///
/// - Linux: ~/.local/share/pushmux/
/// - macOS: ~/Library/Application Support/pushmux/
/// - Windows: %LOCALAPPDATA%/pushmux/
fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn parse_secs(name: &str, raw: &str) -> Result<Duration> {
    let secs: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{}: not a number: {}", name, raw))?;
    if secs == 0 {
        bail!("{} must be greater than zero", name);
    }
    Ok(Duration::from_secs(secs))
}
