use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::xfr::{TsigAlgorithm, TsigKey};

/// Top-level TOML config: `[server]`, any number of `[[zone]]` tables, and
/// any number of `[[tsig_key]]` tables. Mirrors the teacher's flat,
/// env-overridable `DnsConfig`, but loaded once from a `-c FILE` at startup
/// rather than from environment variables, since this daemon's configuration
/// surface (zones, keys, masters) doesn't fit a handful of env vars.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default, rename = "zone")]
    pub zones: Vec<ZoneSection>,
    #[serde(default, rename = "tsig_key")]
    pub tsig_keys: Vec<TsigKeySection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: Vec<String>,
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    #[serde(default = "default_xfr_concurrency")]
    pub xfr_concurrency: usize,
    #[serde(default = "default_bootstrap_retries")]
    pub max_bootstrap_retries: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub pid_file: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        ServerSection {
            listen: default_listen(),
            worker_threads: default_worker_threads(),
            xfr_concurrency: default_xfr_concurrency(),
            max_bootstrap_retries: default_bootstrap_retries(),
            log_level: default_log_level(),
            pid_file: None,
        }
    }
}

fn default_listen() -> Vec<String> {
    vec![format!("0.0.0.0:{}", crate::constants::PORT)]
}
fn default_worker_threads() -> usize {
    0
}
fn default_xfr_concurrency() -> usize {
    8
}
fn default_bootstrap_retries() -> usize {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneSection {
    pub name: String,
    #[serde(default)]
    pub kind: ZoneKind,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub masters: Vec<String>,
    #[serde(default)]
    pub allow_transfer: Vec<String>,
    #[serde(default)]
    pub allow_notify: Vec<String>,
    #[serde(default)]
    pub notify: Vec<String>,
    #[serde(default)]
    pub tsig_key: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    #[default]
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TsigKeySection {
    pub name: String,
    #[serde(default = "default_tsig_algorithm")]
    pub algorithm: String,
    pub secret: String,
}

fn default_tsig_algorithm() -> String {
    "hmac-sha256".to_string()
}

/// Fully resolved, validated configuration ready for `crate::server` to act
/// on: parsed bind addresses, parsed master addresses, and TSIG keys decoded
/// from base64 into `xfr::TsigKey`.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub listen_addrs: Vec<SocketAddr>,
    pub worker_threads: usize,
    pub xfr_concurrency: usize,
    pub max_bootstrap_retries: usize,
    pub log_level: String,
    pub zones: Vec<ResolvedZone>,
    pub tsig_keys: HashMap<String, TsigKey>,
    /// Path to write this process's PID to on startup, if configured.
    pub pid_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedZone {
    pub name: String,
    pub kind: ZoneKind,
    pub file: Option<String>,
    pub masters: Vec<SocketAddr>,
    pub allow_transfer: Vec<String>,
    pub allow_notify: Vec<String>,
    /// Secondaries to send an outbound NOTIFY to whenever this zone
    /// publishes a new generation (RFC 1996 §3.3, the "also-notify" list).
    pub notify: Vec<SocketAddr>,
    pub tsig_key: Option<String>,
}

impl DaemonConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text)?;
        Self::resolve(raw)
    }

    fn resolve(raw: RawConfig) -> Result<Self, ConfigError> {
        let mut tsig_keys = HashMap::new();
        for key in &raw.tsig_keys {
            let algorithm = TsigAlgorithm::from_name(&key.algorithm)
                .ok_or_else(|| ConfigError::InvalidTsigSecret(key.name.clone()))?;
            let tsig_key = TsigKey::new(&key.name, algorithm, &key.secret)
                .map_err(|_| ConfigError::InvalidTsigSecret(key.name.clone()))?;
            tsig_keys.insert(key.name.clone(), tsig_key);
        }

        let mut seen = std::collections::HashSet::new();
        let mut zones = Vec::with_capacity(raw.zones.len());
        for zone in raw.zones {
            if !seen.insert(zone.name.clone()) {
                return Err(ConfigError::DuplicateZone(zone.name));
            }
            if let Some(ref key_name) = zone.tsig_key
                && !tsig_keys.contains_key(key_name)
            {
                return Err(ConfigError::UnknownTsigKey(key_name.clone()));
            }
            let masters = zone
                .masters
                .iter()
                .map(|addr| {
                    addr.parse::<SocketAddr>()
                        .map_err(|_| ConfigError::InvalidMasterAddress(addr.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let notify = zone
                .notify
                .iter()
                .map(|addr| {
                    addr.parse::<SocketAddr>()
                        .map_err(|_| ConfigError::InvalidMasterAddress(addr.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            zones.push(ResolvedZone {
                name: zone.name,
                kind: zone.kind,
                file: zone.file,
                masters,
                allow_transfer: zone.allow_transfer,
                allow_notify: zone.allow_notify,
                notify,
                tsig_key: zone.tsig_key,
            });
        }

        let listen_addrs = raw
            .server
            .listen
            .iter()
            .map(|addr| {
                addr.parse::<SocketAddr>()
                    .map_err(|_| ConfigError::InvalidBindAddress(addr.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DaemonConfig {
            listen_addrs,
            worker_threads: raw.server.worker_threads,
            xfr_concurrency: raw.server.xfr_concurrency,
            max_bootstrap_retries: raw.server.max_bootstrap_retries,
            log_level: raw.server.log_level,
            zones,
            tsig_keys,
            pid_file: raw.server.pid_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [server]
        listen = ["127.0.0.1:5353"]

        [[tsig_key]]
        name = "example-key"
        algorithm = "hmac-sha256"
        secret = "c2VjcmV0a2V5MTIzNA=="

        [[zone]]
        name = "example.com."
        kind = "secondary"
        masters = ["192.0.2.1:53"]
        tsig_key = "example-key"
    "#;

    #[test]
    fn parses_sample_config() {
        let cfg = DaemonConfig::parse(SAMPLE).unwrap();
        assert_eq!(cfg.listen_addrs, vec!["127.0.0.1:5353".parse().unwrap()]);
        assert_eq!(cfg.zones.len(), 1);
        assert_eq!(cfg.zones[0].kind, ZoneKind::Secondary);
        assert!(cfg.tsig_keys.contains_key("example-key"));
    }

    #[test]
    fn rejects_unknown_tsig_key_reference() {
        let bad = r#"
            [[zone]]
            name = "example.com."
            tsig_key = "missing-key"
        "#;
        let err = DaemonConfig::parse(bad).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTsigKey(_)));
    }

    #[test]
    fn rejects_duplicate_zone_names() {
        let bad = r#"
            [[zone]]
            name = "example.com."
            [[zone]]
            name = "example.com."
        "#;
        let err = DaemonConfig::parse(bad).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateZone(_)));
    }

    #[test]
    fn default_config_has_sensible_defaults() {
        let cfg = DaemonConfig::parse("").unwrap();
        assert_eq!(cfg.worker_threads, 0);
        assert_eq!(cfg.xfr_concurrency, 8);
        assert!(cfg.zones.is_empty());
    }
}
