//! Process configuration, loaded once at startup and never mutated after.
//!
//! Sources are layered with [`figment`], lowest precedence first:
//!
//! 1. built-in defaults,
//! 2. a TOML file (explicit path, or `config.toml` in the platform config
//!    directory when present),
//! 3. `PDF_RENDERER_<SECTION>__<KEY>` environment variables (`auth` secrets
//!    taken verbatim),
//! 4. the unprefixed `PORT`, `RENDER_TOKEN`, `BASIC_USER` and `BASIC_PASS`,
//! 5. command-line [`Overrides`].

pub mod error;
mod secret;

pub use crate::secret::Secret;
use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use figment::value::UncasedStr;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "PDF_RENDERER_";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Prefixed secret variables (without `ENV_PREFIX`) and their keys. Read
/// verbatim instead of through figment's value parsing, which would turn
/// `00123` into `123`.
const PREFIXED_SECRETS: [(&str, &str); 3] = [
    ("AUTH__BEARER_TOKEN", "auth.bearer_token"),
    ("AUTH__BASIC_USER", "auth.basic_user"),
    ("AUTH__BASIC_PASS", "auth.basic_pass"),
];

/// Unprefixed variables and the keys they populate, also read verbatim.
const LEGACY_SECRETS: [(&str, &str); 3] = [
    ("RENDER_TOKEN", "auth.bearer_token"),
    ("BASIC_USER", "auth.basic_user"),
    ("BASIC_PASS", "auth.basic_pass"),
];

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub chrome: ChromeConfig,
    pub settle: SettleConfig,
    pub log: LogConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Maximum accepted request body, in bytes.
    pub body_limit: usize,
}
impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: DEFAULT_PORT, body_limit: DEFAULT_BODY_LIMIT }
    }
}

/// Secrets guarding `POST /pdf`. With none of them set the service is open.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub bearer_token: Option<Secret>,
    pub basic_user: Option<Secret>,
    pub basic_pass: Option<Secret>,
}
impl AuthConfig {
    pub fn bearer_token(&self) -> Option<&str> {
        Secret::non_empty(self.bearer_token.as_ref())
    }

    pub fn basic_user(&self) -> Option<&str> {
        Secret::non_empty(self.basic_user.as_ref())
    }

    pub fn basic_pass(&self) -> Option<&str> {
        Secret::non_empty(self.basic_pass.as_ref())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChromeConfig {
    /// Path or name of the Chrome executable; searched on `PATH` when unset.
    pub executable: Option<PathBuf>,
    /// Keep Chrome's sandbox enabled.
    pub sandbox: bool,
    /// Extra launch arguments.
    pub args: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SettleConfig {
    pub fonts: bool,
    pub before_print: bool,
    pub eager_images: bool,
    pub asset_timeout_ms: u64,
    pub delay_ms: u64,
}
impl Default for SettleConfig {
    fn default() -> Self {
        Self { fonts: true, before_print: false, eager_images: true, asset_timeout_ms: 5_000, delay_ms: 50 }
    }
}
impl SettleConfig {
    pub fn asset_timeout(&self) -> Duration {
        Duration::from_millis(self.asset_timeout_ms)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    pub level: String,
}
impl Default for LogConfig {
    fn default() -> Self {
        Self { format: LogFormat::default(), level: "info".to_string() }
    }
}

/// Values given on the command line; they beat every other source.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl Config {
    /// Default location of the config file, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "pdf-renderer").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Assembles the layered figment without extracting it.
    pub fn figment(config_file: Option<&Path>, overrides: &Overrides) -> Result<Figment> {
        let file = match config_file {
            Some(path) if !path.exists() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|path| path.exists()),
        };

        let mut figment = Figment::new();
        if let Some(path) = &file {
            tracing::debug!(path = %path.display(), "Loading configuration file");
            figment = figment.merge(Toml::file(path));
        }
        let is_secret = |key: &UncasedStr| PREFIXED_SECRETS.iter().any(|(var, _)| key.as_str().eq_ignore_ascii_case(var));
        figment = figment.merge(Env::prefixed(ENV_PREFIX).filter(move |key| !is_secret(key)).split("__"));
        for (var, key) in PREFIXED_SECRETS {
            if let Ok(value) = std::env::var(format!("{ENV_PREFIX}{var}")) {
                figment = figment.merge((key, value));
            }
        }
        figment = figment.merge(Env::raw().only(&["PORT"]).map(|_| "server.port".into()));
        for (var, key) in LEGACY_SECRETS {
            if let Ok(value) = std::env::var(var) {
                figment = figment.merge((key, value));
            }
        }
        if let Some(host) = &overrides.host {
            figment = figment.merge(("server.host", host));
        }
        if let Some(port) = overrides.port {
            figment = figment.merge(("server.port", port));
        }
        Ok(figment)
    }

    pub fn load(config_file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let config: Self = Self::figment(config_file, overrides)?
            .extract()
            .map_err(|e| ErrorKind::Load(e.to_string()))?;
        let auth = &config.auth;
        if auth.basic_user().is_some() != auth.basic_pass().is_some() {
            tracing::warn!("Only one of BASIC_USER/BASIC_PASS is set; basic auth disabled and unmatched requests rejected");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn load_in(jail: &mut Jail, file: Option<&str>) -> Config {
        jail.clear_env();
        Config::load(file.map(Path::new), &Overrides::default()).unwrap()
    }

    #[test]
    fn test_defaults() {
        Jail::expect_with(|jail| {
            let config = load_in(jail, None);
            assert_eq!(config.server.host, "0.0.0.0");
            assert_eq!(config.server.port, 8080);
            assert_eq!(config.server.body_limit, 2 * 1024 * 1024);
            assert!(config.auth.bearer_token().is_none());
            assert!(!config.chrome.sandbox);
            assert!(config.settle.fonts);
            assert!(!config.settle.before_print);
            assert_eq!(config.settle.delay(), Duration::from_millis(50));
            assert_eq!(config.log.format, LogFormat::Compact);
            Ok(())
        });
    }

    #[test]
    fn test_legacy_environment() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("PORT", "9090");
            jail.set_env("RENDER_TOKEN", "00123");
            jail.set_env("BASIC_USER", "alice");
            jail.set_env("BASIC_PASS", "");
            let config = Config::load(None, &Overrides::default()).unwrap();
            assert_eq!(config.server.port, 9090);
            assert_eq!(config.auth.bearer_token(), Some("00123"));
            assert_eq!(config.auth.basic_user(), Some("alice"));
            assert_eq!(config.auth.basic_pass(), None);
            Ok(())
        });
    }

    #[test]
    fn test_file_then_env_then_overrides() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "renderer.toml",
                r#"
                    [server]
                    port = 7000
                    host = "127.0.0.1"

                    [settle]
                    delay_ms = 10

                    [log]
                    format = "json"
                "#,
            )?;
            let config = load_in(jail, Some("renderer.toml"));
            assert_eq!(config.server.port, 7000);
            assert_eq!(config.settle.delay_ms, 10);
            assert_eq!(config.log.format, LogFormat::Json);

            jail.set_env("PDF_RENDERER_SETTLE__DELAY_MS", "25");
            jail.set_env("PDF_RENDERER_AUTH__BEARER_TOKEN", "12345");
            jail.set_env("PORT", "7500");
            let config = Config::load(Some(Path::new("renderer.toml")), &Overrides::default()).unwrap();
            assert_eq!(config.settle.delay_ms, 25);
            assert_eq!(config.auth.bearer_token(), Some("12345"));
            assert_eq!(config.server.port, 7500);

            let overrides = Overrides { host: Some("::1".into()), port: Some(8000) };
            let config = Config::load(Some(Path::new("renderer.toml")), &overrides).unwrap();
            assert_eq!(config.server.host, "::1");
            assert_eq!(config.server.port, 8000);
            Ok(())
        });
    }

    #[test]
    fn test_prefixed_secrets_are_verbatim() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("PDF_RENDERER_AUTH__BEARER_TOKEN", "00123");
            jail.set_env("PDF_RENDERER_AUTH__BASIC_USER", "true");
            jail.set_env("PDF_RENDERER_AUTH__BASIC_PASS", "1.50");
            let config = Config::load(None, &Overrides::default()).unwrap();
            assert_eq!(config.auth.bearer_token(), Some("00123"));
            assert_eq!(config.auth.basic_user(), Some("true"));
            assert_eq!(config.auth.basic_pass(), Some("1.50"));

            // The unprefixed variable still wins.
            jail.set_env("RENDER_TOKEN", "0042");
            let config = Config::load(None, &Overrides::default()).unwrap();
            assert_eq!(config.auth.bearer_token(), Some("0042"));
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            let err = Config::load(Some(Path::new("nope.toml")), &Overrides::default()).unwrap_err();
            assert!(matches!(&*err, ErrorKind::NotFound(_)));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_value() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("PORT", "not-a-port");
            let err = Config::load(None, &Overrides::default()).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Load(_)));
            Ok(())
        });
    }
}
