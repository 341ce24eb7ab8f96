//! Configuration loaded once at startup from `~/.docker/dockmon.yml`.
//!
//! The document keeps the historical `registry:` layout and adds an optional
//! `gc:` section whose defaults match the values the tool always used.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "dockmon.yml";

/// Root of the YAML document.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub registry: RegistryClientConfig,
    #[serde(default)]
    pub gc: GcConfig,
}

/// Everything the registry-facing components need, passed explicitly.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryClientConfig {
    /// Hosts without scheme, e.g. `registry.example.com:5000`.
    pub domain: Vec<String>,
    #[serde(default)]
    pub ssl: SslConfig,
    #[serde(default)]
    pub login: LoginConfig,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SslConfig {
    #[serde(default)]
    pub is_https: bool,
    #[serde(default)]
    pub certs: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginConfig {
    #[serde(default)]
    pub is_auth: bool,
    /// Keyed by network authority (`host[:port]`).
    #[serde(default)]
    pub auths: HashMap<String, AuthEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthEntry {
    /// Base64 `user:password`, as stored by `docker login`.
    pub auth: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GcConfig {
    pub daemon_port: u16,
    /// Directory holding `cert.pem`, `key.pem` and `ca.pem`.
    pub cert_dir: Option<PathBuf>,
    /// Per-hostname overrides of `cert_dir`.
    pub host_cert_dirs: HashMap<String, PathBuf>,
    pub container_label: String,
    pub config_dir: String,
    pub read_only_config: String,
    pub writable_config: String,
    pub live_config: String,
    pub settle_delay_ms: u64,
    pub readiness_attempts: u32,
    pub readiness_max_delay_ms: u64,
    pub abort_on_step_failure: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            daemon_port: 2376,
            cert_dir: None,
            host_cert_dirs: HashMap::new(),
            container_label: "registry".to_string(),
            config_dir: "/etc/docker/registry".to_string(),
            read_only_config: "rcfg.yml".to_string(),
            writable_config: "wcfg.yml".to_string(),
            live_config: "config.yml".to_string(),
            settle_delay_ms: 500,
            readiness_attempts: 5,
            readiness_max_delay_ms: 4000,
            abort_on_step_failure: false,
        }
    }
}

/// `~/.docker`, the directory docker itself uses for client material.
pub fn docker_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docker")
}

pub fn default_config_path() -> PathBuf {
    docker_home().join(DEFAULT_CONFIG_FILE)
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_yaml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.domain.is_empty() {
            return Err(ConfigError::Invalid(
                "registry.domain must list at least one host".to_string(),
            ));
        }
        if let Some(blank) = self.registry.domain.iter().find(|d| d.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "registry.domain contains a blank entry: {:?}",
                blank
            )));
        }
        Ok(())
    }
}

impl RegistryClientConfig {
    pub fn scheme(&self) -> &'static str {
        if self.ssl.is_https {
            "https"
        } else {
            "http"
        }
    }

    /// Base URL for a configured domain; the scheme applies to every host.
    pub fn host_url(&self, domain: &str) -> String {
        format!("{}://{}", self.scheme(), domain.trim_end_matches('/'))
    }

    pub fn host_urls(&self) -> Vec<String> {
        self.domain.iter().map(|d| self.host_url(d)).collect()
    }

    /// Registry URL for listing and deleting. The configured scheme always
    /// applies; a URL with a different scheme is rejected since the TLS
    /// policy follows `ssl.isHttps`.
    pub fn registry_host_url(&self, host: &str) -> Result<String, ConfigError> {
        match host.split_once("://") {
            Some((scheme, rest)) if scheme == self.scheme() => Ok(self.host_url(rest)),
            Some((scheme, _)) => Err(ConfigError::Invalid(format!(
                "{} uses {} but registry.ssl.isHttps selects {}",
                host,
                scheme,
                self.scheme()
            ))),
            None => Ok(self.host_url(host)),
        }
    }

    /// Host URL for GC, taken as given; a bare domain gets the configured scheme.
    pub fn gc_host_url(&self, host: &str) -> String {
        if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            self.host_url(host)
        }
    }

    pub fn credential_for(&self, authority: &str) -> Option<&str> {
        self.login
            .auths
            .get(authority)
            .and_then(|entry| entry.auth.as_deref())
    }

    /// Certificate bundle to verify against; `None` means system trust
    /// (https) or no verification at all (http).
    pub fn ca_bundle(&self) -> Option<&Path> {
        if self.ssl.is_https {
            self.ssl.certs.as_deref()
        } else {
            None
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
impl RegistryClientConfig {
    /// Plain-http config with optional credentials, for tests against mock servers.
    pub fn for_tests(auths: &[(&str, &str)]) -> Self {
        Self {
            domain: vec!["localhost:5000".to_string()],
            ssl: SslConfig::default(),
            login: LoginConfig {
                is_auth: !auths.is_empty(),
                auths: auths
                    .iter()
                    .map(|(host, token)| {
                        (
                            host.to_string(),
                            AuthEntry {
                                auth: Some(token.to_string()),
                            },
                        )
                    })
                    .collect(),
            },
            timeout_secs: None,
        }
    }
}

impl GcConfig {
    pub fn cert_dir_for(&self, hostname: &str) -> PathBuf {
        self.host_cert_dirs
            .get(hostname)
            .cloned()
            .or_else(|| self.cert_dir.clone())
            .unwrap_or_else(docker_home)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn readiness_max_delay(&self) -> Duration {
        Duration::from_millis(self.readiness_max_delay_ms)
    }

    pub fn copy_command(&self, src: &str, dst: &str) -> String {
        format!("cp {0}/{1} {0}/{2}", self.config_dir, src, dst)
    }

    pub fn garbage_collect_command(&self) -> String {
        format!(
            "/bin/registry garbage-collect {}/{}",
            self.config_dir, self.live_config
        )
    }
}
