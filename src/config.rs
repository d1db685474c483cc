//! YAML configuration: defaults, loading, validation.
//!
//! Every section carries a `Default` impl and `#[serde(default)]`, so a
//! partial config file works and an absent file falls back to defaults
//! entirely. Durations are humantime strings ("30s", "2m", "5m").

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Error type for configuration handling.
#[derive(Debug)]
pub enum ConfigError {
    /// Reading or writing the config file failed.
    Io(String),
    /// The file is not valid YAML or has the wrong shape.
    Parse(String),
    /// The values are structurally valid but unusable.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "config file: {}", msg),
            ConfigError::Parse(msg) => write!(f, "parsing config: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub thresholds: ThresholdsConfig,
    pub polling: PollingConfig,
    pub alerts: AlertsConfig,
    pub auto_terminate: AutoTerminateConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Full connection string; wins over the individual fields below.
    pub url: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Name of an environment variable to read the password from;
    /// takes precedence over `password` when set.
    pub password_env: String,
    pub sslmode: String,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            host: String::new(),
            port: 5432,
            database: String::new(),
            user: String::new(),
            password: String::new(),
            password_env: String::new(),
            sslmode: "prefer".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    pub idle_transaction: IdleTransactionThresholds,
    pub connection_pool: ConnectionPoolThresholds,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleTransactionThresholds {
    #[serde(with = "humantime_serde")]
    pub warning: Duration,
    #[serde(with = "humantime_serde")]
    pub critical: Duration,
}

impl Default for IdleTransactionThresholds {
    fn default() -> Self {
        Self {
            warning: Duration::from_secs(30),
            critical: Duration::from_secs(120),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionPoolThresholds {
    pub warning_percent: u8,
    pub critical_percent: u8,
}

impl Default for ConnectionPoolThresholds {
    fn default() -> Self {
        Self {
            warning_percent: 75,
            critical_percent: 90,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Per-cycle query timeout, applied as the server-side
    /// statement_timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Minimum spacing between two pool alerts of the same severity.
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
    pub slack: SlackConfig,
    pub webhook: WebhookConfig,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(300),
            slack: SlackConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub enabled: bool,
    pub webhook_url: String,
    pub channel: String,
    pub mention_users: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            method: "POST".to_string(),
            headers: HashMap::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoTerminateConfig {
    pub enabled: bool,
    /// Minimum idle-in-transaction time before a session is considered.
    #[serde(with = "humantime_serde")]
    pub after: Duration,
    /// Log would-be terminations instead of executing them.
    pub dry_run: bool,
    pub exclude_apps: Vec<String>,
    pub exclude_ips: Vec<String>,
    pub protected_apps: Vec<ProtectedAppConfig>,
}

impl Default for AutoTerminateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            after: Duration::from_secs(300),
            dry_run: true,
            exclude_apps: vec!["pgsentry".to_string(), "pg_dump".to_string()],
            exclude_ips: Vec::new(),
            protected_apps: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectedAppConfig {
    pub name: String,
    /// App-specific idle threshold, replacing the global `after`.
    #[serde(with = "humantime_serde")]
    pub min_idle_duration: Duration,
    /// When set the app is never auto-terminated, only manually.
    pub require_confirmation: bool,
}

/// Default config file location: `~/.config/pgsentry/config.yaml`.
pub fn default_path() -> Result<PathBuf, ConfigError> {
    let dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::Io("cannot determine config directory".to_string()))?;
    Ok(dir.join("pgsentry").join("config.yaml"))
}

impl Config {
    /// Reads and parses the file at `path`, expanding `${VAR}` references
    /// in connection fields and channel URLs.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        let mut cfg: Config =
            serde_yaml::from_str(&data).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.expand_env_vars();
        Ok(cfg)
    }

    /// Loads the default path if the file exists, defaults otherwise.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let path = match default_path() {
            Ok(p) => p,
            Err(_) => return Ok(Config::default()),
        };
        if !path.exists() {
            return Ok(Config::default());
        }
        Self::load(&path)
    }

    /// Writes the config to `path`, creating the directory 0700 and the
    /// file 0600 since it can hold a password.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            create_private_dir(dir)
                .map_err(|e| ConfigError::Io(format!("{}: {}", dir.display(), e)))?;
        }
        let data = serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, data)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        }
        Ok(())
    }

    fn expand_env_vars(&mut self) {
        for field in [
            &mut self.connection.url,
            &mut self.connection.host,
            &mut self.connection.user,
            &mut self.connection.password,
            &mut self.connection.database,
            &mut self.alerts.slack.webhook_url,
            &mut self.alerts.webhook.url,
        ] {
            *field = expand_env(field);
        }
    }

    /// Resolved password: `password_env` wins when set, then the literal
    /// `password` field.
    pub fn password(&self) -> String {
        if !self.connection.password_env.is_empty() {
            return std::env::var(&self.connection.password_env).unwrap_or_default();
        }
        self.connection.password.clone()
    }

    /// Assembles the libpq connection string. An explicit `url` wins,
    /// then the `DATABASE_URL` environment variable, then the individual
    /// fields in key=value form.
    pub fn connection_string(&self) -> String {
        if !self.connection.url.is_empty() {
            return self.connection.url.clone();
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                return url;
            }
        }

        let mut parts = vec![
            format!("host={}", self.connection.host),
            format!("port={}", self.connection.port),
        ];
        if !self.connection.database.is_empty() {
            parts.push(format!("dbname={}", self.connection.database));
        }
        if !self.connection.user.is_empty() {
            parts.push(format!("user={}", self.connection.user));
        }
        let password = self.password();
        if !password.is_empty() {
            parts.push(format!("password={}", password));
        }
        parts.push(format!("sslmode={}", self.connection.sslmode));
        parts.push(format!(
            "connect_timeout={}",
            self.connection.connect_timeout.as_secs()
        ));
        parts.join(" ")
    }

    /// Startup validation. An invalid threshold pair is fatal here so the
    /// monitor never sees one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.url.is_empty()
            && self.connection.host.is_empty()
            && std::env::var("DATABASE_URL").unwrap_or_default().is_empty()
        {
            return Err(ConfigError::Invalid(
                "no database connection configured: set connection.url, connection.host, \
                 or DATABASE_URL"
                    .to_string(),
            ));
        }
        if self.thresholds.idle_transaction.warning >= self.thresholds.idle_transaction.critical {
            return Err(ConfigError::Invalid(
                "idle_transaction.warning must be less than critical".to_string(),
            ));
        }
        if self.thresholds.connection_pool.warning_percent
            >= self.thresholds.connection_pool.critical_percent
        {
            return Err(ConfigError::Invalid(
                "connection_pool.warning_percent must be less than critical_percent".to_string(),
            ));
        }
        Ok(())
    }
}

fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    if dir.exists() {
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
    }
    #[cfg(not(unix))]
    {
        std::fs::create_dir_all(dir)
    }
}

/// Expands `${VAR}` references against the process environment. Unset
/// variables expand to the empty string, matching what operators expect
/// from shell-style substitution.
fn expand_env(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find('}') {
            Some(end) => {
                let name = &rest[start + 2..start + 2 + end];
                out.push_str(&std::env::var(name).unwrap_or_default());
                rest = &rest[start + 2 + end + 1..];
            }
            None => {
                // unterminated reference, keep literally
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.connection.port, 5432);
        assert_eq!(cfg.connection.sslmode, "prefer");
        assert_eq!(cfg.thresholds.idle_transaction.warning, Duration::from_secs(30));
        assert_eq!(cfg.thresholds.idle_transaction.critical, Duration::from_secs(120));
        assert_eq!(cfg.thresholds.connection_pool.warning_percent, 75);
        assert_eq!(cfg.thresholds.connection_pool.critical_percent, 90);
        assert_eq!(cfg.polling.interval, Duration::from_secs(5));
        assert_eq!(cfg.alerts.cooldown, Duration::from_secs(300));
        assert!(!cfg.auto_terminate.enabled);
        assert!(cfg.auto_terminate.dry_run);
        assert_eq!(cfg.auto_terminate.exclude_apps, vec!["pgsentry", "pg_dump"]);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg: Config = serde_yaml::from_str(
            r#"
connection:
  host: db.internal
  user: monitor
thresholds:
  idle_transaction:
    warning: 1m
"#,
        )
        .unwrap();
        assert_eq!(cfg.connection.host, "db.internal");
        assert_eq!(cfg.connection.port, 5432);
        assert_eq!(cfg.thresholds.idle_transaction.warning, Duration::from_secs(60));
        // untouched sections keep their defaults
        assert_eq!(cfg.thresholds.idle_transaction.critical, Duration::from_secs(120));
        assert_eq!(cfg.polling.interval, Duration::from_secs(5));
    }

    #[test]
    fn test_protected_apps_parse() {
        let cfg: Config = serde_yaml::from_str(
            r#"
auto_terminate:
  enabled: true
  dry_run: false
  protected_apps:
    - name: billing-batch
      min_idle_duration: 10m
      require_confirmation: false
    - name: migration-runner
      require_confirmation: true
"#,
        )
        .unwrap();
        assert!(cfg.auto_terminate.enabled);
        assert!(!cfg.auto_terminate.dry_run);
        assert_eq!(cfg.auto_terminate.protected_apps.len(), 2);
        assert_eq!(
            cfg.auto_terminate.protected_apps[0].min_idle_duration,
            Duration::from_secs(600)
        );
        assert!(cfg.auto_terminate.protected_apps[1].require_confirmation);
    }

    #[test]
    fn test_validate_rejects_misordered_idle_thresholds() {
        let mut cfg = Config::default();
        cfg.connection.host = "localhost".to_string();
        cfg.thresholds.idle_transaction.warning = Duration::from_secs(120);
        cfg.thresholds.idle_transaction.critical = Duration::from_secs(120);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_misordered_pool_thresholds() {
        let mut cfg = Config::default();
        cfg.connection.host = "localhost".to_string();
        cfg.thresholds.connection_pool.warning_percent = 90;
        cfg.thresholds.connection_pool.critical_percent = 75;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_defaults_with_host() {
        let mut cfg = Config::default();
        cfg.connection.host = "localhost".to_string();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_connection_string_from_fields() {
        let mut cfg = Config::default();
        cfg.connection.host = "db.internal".to_string();
        cfg.connection.database = "orders".to_string();
        cfg.connection.user = "monitor".to_string();
        cfg.connection.password = "s3cret".to_string();
        assert_eq!(
            cfg.connection_string(),
            "host=db.internal port=5432 dbname=orders user=monitor password=s3cret \
             sslmode=prefer connect_timeout=10"
        );
    }

    #[test]
    fn test_connection_string_url_wins() {
        let mut cfg = Config::default();
        cfg.connection.url = "postgres://monitor@db/orders".to_string();
        cfg.connection.host = "ignored".to_string();
        assert_eq!(cfg.connection_string(), "postgres://monitor@db/orders");
    }

    #[test]
    fn test_password_env_takes_precedence() {
        let mut cfg = Config::default();
        cfg.connection.password = "literal".to_string();
        cfg.connection.password_env = "PGSENTRY_TEST_PASSWORD".to_string();
        unsafe { std::env::set_var("PGSENTRY_TEST_PASSWORD", "from-env") };
        assert_eq!(cfg.password(), "from-env");
        unsafe { std::env::remove_var("PGSENTRY_TEST_PASSWORD") };
    }

    #[test]
    fn test_expand_env() {
        unsafe { std::env::set_var("PGSENTRY_TEST_HOST", "db.example.com") };
        assert_eq!(expand_env("${PGSENTRY_TEST_HOST}"), "db.example.com");
        assert_eq!(expand_env("pre-${PGSENTRY_TEST_HOST}-post"), "pre-db.example.com-post");
        assert_eq!(expand_env("no refs"), "no refs");
        assert_eq!(expand_env("${PGSENTRY_TEST_UNSET_VAR}"), "");
        assert_eq!(expand_env("${UNTERMINATED"), "${UNTERMINATED");
        unsafe { std::env::remove_var("PGSENTRY_TEST_HOST") };
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let mut cfg = Config::default();
        cfg.connection.host = "db.internal".to_string();
        cfg.connection.user = "monitor".to_string();
        cfg.thresholds.idle_transaction.warning = Duration::from_secs(45);
        cfg.alerts.slack.enabled = true;
        cfg.alerts.slack.channel = "#db-alerts".to_string();
        cfg.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.connection.host, "db.internal");
        assert_eq!(loaded.thresholds.idle_transaction.warning, Duration::from_secs(45));
        assert!(loaded.alerts.slack.enabled);
        assert_eq!(loaded.alerts.slack.channel, "#db-alerts");
    }

    #[cfg(unix)]
    #[test]
    fn test_save_restricts_file_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        Config::default().save(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
