// src/config/models.rs
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Top-level balancer configuration, as loaded from YAML or JSON.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub port: u16,
    #[serde(default)]
    pub sticky: bool,
    pub backends: Vec<BackendInfo>,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

impl Config {
    /// Validates structural invariants the loader itself cannot express
    /// (serde already rejects a `port` that doesn't fit in `u16`).
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for b in &self.backends {
            if !seen.insert((b.host.clone(), b.port)) {
                bail!(
                    "duplicate backend '{}:{}' in configuration",
                    b.host,
                    b.port
                );
            }
        }

        match self.strategy.name.as_str() {
            "ROUND_ROBIN" | "LEAST_CONN" | "LEAST_RESP" => {}
            other => bail!("unrecognized strategy name '{}' in config file", other),
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

/// The out-of-band control-plane/dashboard listener. Its `/backends`
/// surface is an external collaborator over the Dispatcher; never reached
/// from the front-end data-plane port.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_port")]
    pub port: u16,
    #[serde(default = "default_dashboard_dir")]
    pub dashboard_dir: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            port: default_admin_port(),
            dashboard_dir: default_dashboard_dir(),
        }
    }
}

fn default_admin_port() -> u16 {
    9091
}

fn default_dashboard_dir() -> String {
    "dashboard".to_string()
}

/// The wire shape of a backend entry: just host and port. `url` is derived,
/// never deserialized directly.
#[derive(Debug, Clone, Deserialize, Serialize)]
struct RawBackendInfo {
    host: String,
    port: u16,
}

/// An external, serializable descriptor of a backend, with its absolute
/// upstream URL pre-parsed at construction/deserialization time.
#[derive(Debug, Clone)]
pub struct BackendInfo {
    pub host: String,
    pub port: u16,
    pub url: Url,
}

impl BackendInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();
        let url = Url::parse(&format!("http://{}:{}", host, port))
            .with_context(|| format!("parsing backend host '{}'", host))?;
        Ok(Self { host, port, url })
    }
}

impl PartialEq for BackendInfo {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl<'de> Deserialize<'de> for BackendInfo {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawBackendInfo::deserialize(deserializer)?;
        BackendInfo::new(raw.host, raw.port).map_err(serde::de::Error::custom)
    }
}

impl Serialize for BackendInfo {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        RawBackendInfo {
            host: self.host.clone(),
            port: self.port,
        }
        .serialize(serializer)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    pub name: String,
    #[serde(default)]
    pub properties: serde_yaml::Value,
}

/// Casts the loosely-typed `properties` blob into a concrete strategy
/// properties struct, mirroring the source's own generic re-marshal trick.
pub fn cast_properties<T: for<'de> Deserialize<'de>>(
    properties: &serde_yaml::Value,
) -> Result<T> {
    serde_yaml::from_value(properties.clone()).context("parsing strategy properties")
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RoundRobinProperties {
    #[serde(default)]
    pub weights: Option<Vec<u32>>,
}
