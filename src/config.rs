use crate::namespace::NamespaceFilter;
use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::{env, fs, path::Path};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub tls: Tls,
    #[serde(default)]
    pub log: Log,
    #[serde(rename = "registry")]
    pub registries: BTreeMap<String, String>,
    #[serde(default)]
    pub image_pull_secret: String,
    #[serde(default, rename = "image_pull_secret_append")]
    pub append_image_pull_secret: bool,
    #[serde(default)]
    pub force_image_pull_policy: bool,
    #[serde(default)]
    pub image_pull_policy_to_force: PullPolicy,
    #[serde(default)]
    pub default_storage_class: String,
    #[serde(default)]
    pub exclude_namespaces: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Tls {
    #[serde(default = "default_cert_file")]
    pub cert_file: PathBuf,
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,
}

impl Default for Tls {
    fn default() -> Self {
        Tls {
            cert_file: default_cert_file(),
            key_file: default_key_file(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Log {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub output: LogOutput,
    #[serde(default = "default_log_file_path")]
    pub file_path: PathBuf,
    #[serde(default)]
    pub rotation: LogRotation,
    /// Rotated files kept next to the active one.
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
}

impl Default for Log {
    fn default() -> Self {
        Log {
            level: default_log_level(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file_path: default_log_file_path(),
            rotation: LogRotation::default(),
            max_backups: default_max_backups(),
        }
    }
}

impl Log {
    /// `fatal` has no tracing counterpart and maps to `error`.
    pub fn level_directive(&self) -> &str {
        if self.level.eq_ignore_ascii_case("fatal") {
            "error"
        } else {
            &self.level
        }
    }

    pub fn writes_file(&self) -> bool {
        matches!(self.output, LogOutput::File | LogOutput::Both)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    File,
    Both,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

/// Kubernetes container image pull policy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PullPolicy {
    Always,
    #[default]
    IfNotPresent,
    Never,
}

impl PullPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PullPolicy::Always => "Always",
            PullPolicy::IfNotPresent => "IfNotPresent",
            PullPolicy::Never => "Never",
        }
    }
}

impl fmt::Display for PullPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully resolved mutation rules, built once at startup and shared read-only
/// by every admission request.
///
/// Empty strings and disabled flags from the file are folded into `None`, so a
/// rule applies exactly when its field is `Some`.
#[derive(Debug, Clone, Default)]
pub struct MutationConfig {
    pub registries: BTreeMap<String, String>,
    pub image_pull_secret: Option<String>,
    pub append_image_pull_secret: bool,
    pub forced_pull_policy: Option<PullPolicy>,
    pub default_storage_class: Option<String>,
    pub excluded_namespaces: NamespaceFilter,
}

impl Config {
    fn validate(&self) -> Result<()> {
        if self.registries.is_empty() {
            anyhow::bail!("At least one entry is required under 'registry'");
        }
        self.log
            .level_directive()
            .parse::<tracing::Level>()
            .map_err(|_| anyhow::anyhow!("Invalid log level '{}'", self.log.level))?;
        if self.log.writes_file() {
            if self.log.file_path.file_name().is_none() {
                anyhow::bail!(
                    "Log file path '{}' does not name a file",
                    self.log.file_path.display()
                );
            }
            if self.log.max_backups == 0 {
                anyhow::bail!("'log.max_backups' must be at least 1");
            }
        }
        Ok(())
    }

    pub fn mutation_config(&self) -> Result<MutationConfig> {
        let excluded_namespaces = NamespaceFilter::new(self.exclude_namespaces.iter().cloned())
            .context("Invalid glob pattern in 'exclude_namespaces'")?;

        Ok(MutationConfig {
            registries: self.registries.clone(),
            image_pull_secret: non_empty(&self.image_pull_secret),
            append_image_pull_secret: self.append_image_pull_secret,
            forced_pull_policy: self
                .force_image_pull_policy
                .then_some(self.image_pull_policy_to_force),
            default_storage_class: non_empty(&self.default_storage_class),
            excluded_namespaces,
        })
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    info!("Loading config from file {}", path.as_ref().display());
    let yaml_str = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

    let expanded = expand_env_vars(&yaml_str)?;

    let config: Config = serde_yaml_ng::from_str(&expanded)
        .context("Failed to parse YAML config after environment variable expansion")?;
    config.validate().context("Invalid configuration")?;

    Ok(config)
}

/// Replaces `${VAR}` placeholders with environment variables values.
/// Returns an error if any env var is missing or regex fails.
fn expand_env_vars(input: &str) -> Result<String> {
    let re =
        Regex::new(r"\$\{([^}]+)}").context("Invalid regex pattern for env var substitution")?;

    if let Some(missing) = re
        .captures_iter(input)
        .map(|caps| caps[1].to_string())
        .find(|var_name| env::var(var_name).is_err())
    {
        anyhow::bail!("Missing environment variable: {}", missing);
    }

    let result = re.replace_all(input, |caps: &regex::Captures| {
        env::var(&caps[1]).unwrap_or_default()
    });

    Ok(result.into_owned())
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8443
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file_path() -> PathBuf {
    PathBuf::from("log.json")
}

fn default_max_backups() -> usize {
    5
}

fn default_cert_file() -> PathBuf {
    PathBuf::from("/run/secrets/tls/webhook-server-tls.crt")
}

fn default_key_file() -> PathBuf {
    PathBuf::from("/run/secrets/tls/webhook-server-tls.key")
}
