use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

const DEFAULT_PORT: u16 = 4700;
const DEFAULT_AI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_AI_MODEL: &str = "gpt-4";

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

// ─── RetentionConfig ──────────────────────────────────────────────────────────

/// Data-retention periods (`[retention]` in config.toml), in days.
///
/// Records older than the period for their category become eligible for
/// deletion or anonymization on the next scheduled cleanup pass.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Analytics events older than this are deleted (default: 365).
    pub analytics_days: u32,
    /// Users with no activity for this long are anonymized (default: 730).
    pub user_activity_days: u32,
    /// Backup artifacts older than this are eligible for deletion (default: 30).
    /// Recognized for forward compatibility; backups are managed by the
    /// hosting platform and no cleanup acts on this value yet.
    pub backup_days: u32,
    /// Interval between scheduled cleanup passes, in seconds (default: 86400).
    pub cleanup_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            analytics_days: 365,
            user_activity_days: 730,
            backup_days: 30,
            cleanup_interval_secs: 86_400,
        }
    }
}

impl RetentionConfig {
    /// Unix-seconds cutoff below which analytics events are deleted.
    pub fn analytics_cutoff(&self, now: chrono::DateTime<chrono::Utc>) -> i64 {
        (now - chrono::Duration::days(i64::from(self.analytics_days))).timestamp()
    }

    /// Unix-seconds cutoff below which inactive users are anonymized.
    pub fn activity_cutoff(&self, now: chrono::DateTime<chrono::Utc>) -> i64 {
        (now - chrono::Duration::days(i64::from(self.user_activity_days))).timestamp()
    }
}

// ─── AiConfig ────────────────────────────────────────────────────────────────

/// Course-generation model provider (`[ai]` in config.toml).
///
/// The model call itself is an opaque external collaborator — only the
/// endpoint, credential, and bounds live here.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AiConfig {
    /// Chat-completions base URL (default: https://api.openai.com/v1).
    pub base_url: String,
    /// Provider API key. Empty = course generation disabled.
    pub api_key: String,
    /// Model identifier (default: gpt-4).
    pub model: String,
    /// Per-request timeout in seconds (default: 30).
    pub timeout_secs: u64,
    /// Attempts per generation call, including the first (default: 3).
    pub max_retries: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_AI_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_AI_MODEL.to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

// ─── ObservabilityConfig ─────────────────────────────────────────────────────

/// Observability settings (`[observability]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log SQLite queries that exceed this threshold (milliseconds). Default: 100.
    /// Set to 0 to disable slow query logging.
    pub slow_query_threshold_ms: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            slow_query_threshold_ms: 100,
        }
    }
}

// ─── TOML config file ────────────────────────────────────────────────────────

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// REST API port (default: 4700).
    port: Option<u16>,
    /// Bind address (default: "127.0.0.1").
    bind_address: Option<String>,
    /// Log level filter string, e.g. "debug", "info,academyd=trace" (default: "info").
    log: Option<String>,
    /// Log output format: "pretty" (default) | "json" (structured for log aggregators).
    log_format: Option<String>,
    /// Include raw error detail in error responses. Never enable in production.
    dev_mode: Option<bool>,
    /// HS256 secret for end-user bearer tokens. Empty = user auth disabled.
    jwt_secret: Option<String>,
    /// Shared service credential for data-lifecycle actions. These actions
    /// affect other users' data, so they require this dedicated key rather
    /// than an end-user token. Empty = data-lifecycle endpoints disabled.
    gdpr_api_key: Option<String>,
    /// Retention periods (`[retention]`).
    retention: Option<RetentionConfig>,
    /// Course-generation provider (`[ai]`).
    ai: Option<AiConfig>,
    /// Observability settings (`[observability]`).
    observability: Option<ObservabilityConfig>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── ServiceConfig ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub log: String,
    /// Log output format: "pretty" (default) | "json".
    pub log_format: String,
    /// Bind address for the REST server (ACADEMYD_BIND env var).
    pub bind_address: String,
    /// Verbose error detail in responses (ACADEMYD_DEV env var). Default: false.
    pub dev_mode: bool,
    /// HS256 secret for end-user bearer tokens (ACADEMYD_JWT_SECRET env var).
    pub jwt_secret: String,
    /// Service credential gating data-lifecycle actions (ACADEMYD_GDPR_API_KEY env var).
    pub gdpr_api_key: String,
    /// Retention periods per data category.
    pub retention: RetentionConfig,
    /// Course-generation provider settings.
    pub ai: AiConfig,
    /// Slow-query threshold and friends.
    pub observability: ObservabilityConfig,
}

impl ServiceConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        bind_address: Option<String>,
        dev_mode: bool,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);

        // Load TOML as the lowest-priority override layer
        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let log_format = std::env::var("ACADEMYD_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let bind_address = bind_address
            .or(std::env::var("ACADEMYD_BIND").ok().filter(|s| !s.is_empty()))
            .or(toml.bind_address)
            .unwrap_or_else(default_bind_address);

        let dev_mode = dev_mode || toml.dev_mode.unwrap_or(false);

        let jwt_secret = std::env::var("ACADEMYD_JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.jwt_secret)
            .unwrap_or_default();
        if jwt_secret.is_empty() {
            warn!("jwt_secret not configured — end-user authentication will fail");
        }

        let gdpr_api_key = std::env::var("ACADEMYD_GDPR_API_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.gdpr_api_key)
            .unwrap_or_default();

        let retention = toml.retention.unwrap_or_default();

        let mut ai = toml.ai.unwrap_or_default();
        if let Ok(key) = std::env::var("ACADEMYD_AI_KEY") {
            if !key.is_empty() {
                ai.api_key = key;
            }
        }

        let observability = toml.observability.unwrap_or_default();

        Self {
            port,
            data_dir,
            log,
            log_format,
            bind_address,
            dev_mode,
            jwt_secret,
            gdpr_api_key,
            retention,
            ai,
            observability,
        }
    }
}

// ─── Hot-reloadable config subset ────────────────────────────────────────────

/// Non-critical config fields that can be changed without restarting the service.
#[derive(Debug, Clone)]
pub struct HotConfig {
    pub retention: RetentionConfig,
}

/// Watches `config.toml` for changes and reloads the retention periods.
///
/// Uses the `notify` crate (kqueue on macOS, inotify on Linux) to detect file
/// modifications. Only `[retention]` is reloaded; port, credentials, and other
/// startup-only fields require a full restart.
pub struct ConfigWatcher {
    pub hot: Arc<RwLock<HotConfig>>,
    // Hold the watcher alive; dropping it stops the file watch.
    _watcher: notify_debouncer_full::Debouncer<
        notify_debouncer_full::notify::RecommendedWatcher,
        notify_debouncer_full::FileIdMap,
    >,
}

impl ConfigWatcher {
    /// Start watching `{data_dir}/config.toml` for changes.
    ///
    /// Returns `None` if the watcher could not be created (non-fatal; the
    /// service runs fine without hot-reload).
    pub fn start(data_dir: &Path, hot: Arc<RwLock<HotConfig>>) -> Option<Self> {
        let config_path = data_dir.join("config.toml");

        let hot_clone = hot.clone();
        let config_path_clone = config_path.clone();
        let rt_handle = tokio::runtime::Handle::current();

        let watcher = notify_debouncer_full::new_debouncer(
            std::time::Duration::from_secs(2),
            None,
            move |result: notify_debouncer_full::DebounceEventResult| {
                if let Ok(events) = result {
                    // Only act on modify/create events
                    let relevant = events.iter().any(|e| {
                        use notify_debouncer_full::notify::EventKind;
                        matches!(e.event.kind, EventKind::Modify(_) | EventKind::Create(_))
                    });
                    if relevant {
                        let hot = hot_clone.clone();
                        let path = config_path_clone.clone();
                        rt_handle.spawn(async move {
                            let retention = load_hot_retention(&path);
                            let mut guard = hot.write().await;
                            if guard.retention != retention {
                                info!(
                                    analytics_days = retention.analytics_days,
                                    user_activity_days = retention.user_activity_days,
                                    "config.toml reloaded — retention periods updated"
                                );
                                guard.retention = retention;
                            }
                        });
                    }
                }
            },
        );

        match watcher {
            Ok(mut debouncer) => {
                use notify_debouncer_full::notify::Watcher as _;
                // Watch the data_dir (parent of config.toml) since watching a
                // non-existent file fails on some platforms.
                let watch_path = config_path.parent().unwrap_or_else(|| Path::new("."));
                if let Err(e) = debouncer.watcher().watch(
                    watch_path,
                    notify_debouncer_full::notify::RecursiveMode::NonRecursive,
                ) {
                    warn!("config watcher failed to start: {e} — hot-reload disabled");
                    return None;
                }
                info!(path = %config_path.display(), "config hot-reload watcher started");
                Some(Self {
                    hot,
                    _watcher: debouncer,
                })
            }
            Err(e) => {
                warn!("config watcher creation failed: {e} — hot-reload disabled");
                None
            }
        }
    }
}

/// Load only the hot-reloadable fields from config.toml.
fn load_hot_retention(path: &Path) -> RetentionConfig {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| toml::from_str::<TomlConfig>(&s).ok())
        .and_then(|t| t.retention)
        .unwrap_or_default()
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("academyd");
        }
    }
    #[cfg(target_os = "linux")]
    {
        // $XDG_DATA_HOME/academyd or ~/.local/share/academyd
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("academyd");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("academyd");
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("academyd");
        }
    }
    // Fallback
    PathBuf::from(".academyd")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_a_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ServiceConfig::new(None, Some(dir.path().to_path_buf()), None, None, false);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.bind_address, "127.0.0.1");
        assert_eq!(cfg.retention.analytics_days, 365);
        assert_eq!(cfg.retention.user_activity_days, 730);
        assert!(!cfg.dev_mode);
    }

    #[test]
    fn toml_overrides_defaults_and_cli_overrides_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            r#"
port = 5100
gdpr_api_key = "svc-key"

[retention]
analytics_days = 30
user_activity_days = 90
"#,
        )
        .unwrap();

        let cfg = ServiceConfig::new(None, Some(dir.path().to_path_buf()), None, None, false);
        assert_eq!(cfg.port, 5100);
        assert_eq!(cfg.gdpr_api_key, "svc-key");
        assert_eq!(cfg.retention.analytics_days, 30);

        let cfg = ServiceConfig::new(Some(6000), Some(dir.path().to_path_buf()), None, None, false);
        assert_eq!(cfg.port, 6000, "CLI port wins over TOML");
    }

    #[test]
    fn retention_cutoffs_subtract_whole_days() {
        let cfg = RetentionConfig {
            analytics_days: 1,
            user_activity_days: 2,
            ..RetentionConfig::default()
        };
        let now = chrono::Utc::now();
        assert_eq!(cfg.analytics_cutoff(now), now.timestamp() - 86_400);
        assert_eq!(cfg.activity_cutoff(now), now.timestamp() - 2 * 86_400);
    }
}
