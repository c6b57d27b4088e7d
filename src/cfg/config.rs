// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::cfg::enums::{LogFormat, LogLevel, LogRotation, YesNo};

/// Process-wide configuration, loaded once at boot and static thereafter.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Listener address, database count and client limits.
    #[serde(default)]
    pub server: ServerConfig,
    /// Log verbosity, destination and line format.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Compact-encoding thresholds for container values.
    #[serde(default)]
    pub encodings: EncodingConfig,
    /// Slow-log sampling thresholds.
    #[serde(default)]
    pub slowlog: SlowlogConfig,
    /// Active TTL reclamation cycle tuning.
    #[serde(default)]
    pub expire: ExpireConfig,
    /// Cluster-mode switches; slot routing stays off unless enabled.
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Optional password required before any other command.
    #[serde(default, rename = "requirepass")]
    pub requirepass: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind", rename = "bind")]
    /// Address the TCP listener binds to.
    pub bind: String,

    #[serde(default = "default_port", rename = "port")]
    /// Listener port.
    pub port: u16,

    #[serde(default = "default_databases", rename = "databases")]
    /// Number of numbered databases selectable with SELECT.
    pub databases: usize,

    #[serde(default = "default_maxclients", rename = "maxclients")]
    /// Upper bound on simultaneously connected clients.
    pub maxclients: usize,

    #[serde(default, rename = "maxmemory")]
    /// Memory ceiling in bytes; 0 means unbounded.
    pub maxmemory: u64,

    #[serde(default, rename = "timeout", with = "serde_secs")]
    /// Idle client timeout; zero disables the check.
    pub timeout: Duration,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default, rename = "loglevel")]
    /// Verbosity threshold; `RUST_LOG` overrides it when set.
    pub level: LogLevel,

    #[serde(default, rename = "logfile")]
    /// Log file path; empty logs to stderr.
    pub file: String,

    #[serde(default, rename = "logformat")]
    /// Text lines or JSON objects.
    pub format: LogFormat,

    #[serde(default, rename = "logfile-rotation")]
    /// Rotation policy; only meaningful with a `logfile`.
    pub rotation: LogRotation,
}

/// Thresholds controlling when a container abandons its compact encoding.
/// Conversions are one-way; a large value never shrinks back.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EncodingConfig {
    #[serde(default = "default_intset_max", rename = "intset-max-entries")]
    pub intset_max_entries: usize,

    #[serde(default = "default_list_listpack", rename = "list-max-listpack-size")]
    /// Negative values select a byte cap per node (-2 = 8 KiB); positive
    /// values cap entries per node.
    pub list_max_listpack_size: i64,

    #[serde(default = "default_hash_entries", rename = "hash-max-listpack-entries")]
    pub hash_max_listpack_entries: usize,

    #[serde(default = "default_hash_value", rename = "hash-max-listpack-value")]
    pub hash_max_listpack_value: usize,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SlowlogConfig {
    #[serde(default = "default_slowlog_slower", rename = "slowlog-log-slower-than")]
    /// Microsecond threshold above which a command is logged; negative
    /// disables sampling.
    pub log_slower_than: i64,

    #[serde(default = "default_slowlog_len", rename = "slowlog-max-len")]
    /// Ring capacity; the oldest entry is dropped once full.
    pub max_len: usize,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ExpireConfig {
    #[serde(default = "default_expire_ms", rename = "active-expire-cycle-ms")]
    /// Tick interval of the background expiration cycle.
    pub cycle_ms: u64,

    #[serde(default = "default_expire_samples", rename = "active-expire-samples")]
    /// Keys sampled from each database's expiry index per tick.
    pub samples_per_db: usize,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ClusterConfig {
    #[serde(default = "default_no", rename = "cluster-enabled")]
    pub enabled: YesNo,

    #[serde(default, rename = "cluster-announce-ip")]
    /// Address advertised in MOVED replies and CLUSTER NODES; falls back to
    /// the bind address when empty.
    pub announce_ip: String,

    #[serde(default, rename = "cluster-announce-port")]
    /// Advertised port; 0 falls back to the listener port.
    pub announce_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            databases: default_databases(),
            maxclients: default_maxclients(),
            maxmemory: 0,
            timeout: Duration::ZERO,
        }
    }
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            intset_max_entries: default_intset_max(),
            list_max_listpack_size: default_list_listpack(),
            hash_max_listpack_entries: default_hash_entries(),
            hash_max_listpack_value: default_hash_value(),
        }
    }
}

impl Default for SlowlogConfig {
    fn default() -> Self {
        Self {
            log_slower_than: default_slowlog_slower(),
            max_len: default_slowlog_len(),
        }
    }
}

impl Default for ExpireConfig {
    fn default() -> Self {
        Self {
            cycle_ms: default_expire_ms(),
            samples_per_db: default_expire_samples(),
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            enabled: YesNo::No,
            announce_ip: String::new(),
            announce_port: 0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            encodings: EncodingConfig::default(),
            slowlog: SlowlogConfig::default(),
            expire: ExpireConfig::default(),
            cluster: ClusterConfig::default(),
            requirepass: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    6379
}
fn default_databases() -> usize {
    16
}
fn default_maxclients() -> usize {
    10000
}
fn default_intset_max() -> usize {
    512
}
fn default_list_listpack() -> i64 {
    -2
}
fn default_hash_entries() -> usize {
    128
}
fn default_hash_value() -> usize {
    64
}
fn default_slowlog_slower() -> i64 {
    10_000
}
fn default_slowlog_len() -> usize {
    128
}
fn default_expire_ms() -> u64 {
    100
}
fn default_expire_samples() -> usize {
    20
}
fn default_no() -> YesNo {
    YesNo::No
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(self.server.port != 0, "port must be non-zero");
        ensure!(self.server.databases >= 1, "databases must be >= 1");
        ensure!(self.server.maxclients >= 1, "maxclients must be >= 1");
        ensure!(
            self.encodings.list_max_listpack_size != 0,
            "list-max-listpack-size must be non-zero"
        );
        ensure!(
            self.encodings.list_max_listpack_size >= -5,
            "list-max-listpack-size below -5 selects no byte cap"
        );
        ensure!(
            self.expire.cycle_ms >= 1,
            "active-expire-cycle-ms must be >= 1"
        );
        ensure!(
            self.expire.samples_per_db >= 1,
            "active-expire-samples must be >= 1"
        );

        ensure!(
            self.logging.rotation == LogRotation::Never
                || !self.logging.file.is_empty(),
            "logfile-rotation requires a logfile"
        );

        if let Some(pass) = &self.requirepass {
            ensure!(!pass.is_empty(), "requirepass must not be empty when set");
        }
        Ok(())
    }

    /// Byte cap for a single quicklist node, resolved from the
    /// `list-max-listpack-size` convention (negative exponent scale).
    pub fn list_node_byte_cap(&self) -> usize {
        match self.encodings.list_max_listpack_size {
            -1 => 4 * 1024,
            -2 => 8 * 1024,
            -3 => 16 * 1024,
            -4 => 32 * 1024,
            -5 => 64 * 1024,
            // Positive values cap entries, not bytes; oversized payloads
            // still split at the default byte cap.
            _ => 8 * 1024,
        }
    }

    /// Entry cap per quicklist node when `list-max-listpack-size` is
    /// positive.
    pub fn list_node_entry_cap(&self) -> Option<usize> {
        if self.encodings.list_max_listpack_size > 0 {
            Some(self.encodings.list_max_listpack_size as usize)
        } else {
            None
        }
    }

    /// `host:port` advertised to cluster clients in MOVED replies.
    pub fn cluster_announce_addr(&self) -> String {
        let ip = if self.cluster.announce_ip.is_empty() {
            self.server.bind.as_str()
        } else {
            self.cluster.announce_ip.as_str()
        };
        let port = if self.cluster.announce_port == 0 {
            self.server.port
        } else {
            self.cluster.announce_port
        };
        format!("{ip}:{port}")
    }
}

/// Serde helpers for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.server.port, 6379);
        assert_eq!(cfg.server.databases, 16);
        assert_eq!(cfg.encodings.intset_max_entries, 512);
        assert_eq!(cfg.list_node_byte_cap(), 8 * 1024);
        assert_eq!(cfg.slowlog.log_slower_than, 10_000);
        assert_eq!(cfg.slowlog.max_len, 128);
        assert_eq!(cfg.logging.level, LogLevel::Notice);
        assert_eq!(cfg.logging.format, LogFormat::Text);
        assert!(cfg.logging.file.is_empty());
    }

    #[test]
    fn logging_section_parses_and_validates() {
        let yaml = r#"
logging:
  loglevel: "debug"
  logfile: "/var/log/kv-server.log"
  logformat: "json"
  logfile-rotation: "daily"
"#;
        let mut cfg: Config = serde_yaml::from_str(yaml).expect("yaml parses");
        cfg.validate_and_normalize().expect("valid");
        assert_eq!(cfg.logging.level, LogLevel::Debug);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert_eq!(cfg.logging.rotation, LogRotation::Daily);

        // Rotation without a file target is refused.
        let yaml = "logging:\n  logfile-rotation: \"hourly\"\n";
        let mut cfg: Config = serde_yaml::from_str(yaml).expect("yaml parses");
        assert!(cfg.validate_and_normalize().is_err());
    }

    #[test]
    fn parses_redis_style_keys() {
        let yaml = r#"
server:
  bind: "0.0.0.0"
  port: 7000
  databases: 4
encodings:
  intset-max-entries: 128
  list-max-listpack-size: -3
cluster:
  cluster-enabled: "yes"
"#;
        let mut cfg: Config = serde_yaml::from_str(yaml).expect("yaml parses");
        cfg.validate_and_normalize().expect("valid");
        assert_eq!(cfg.server.port, 7000);
        assert_eq!(cfg.encodings.intset_max_entries, 128);
        assert_eq!(cfg.list_node_byte_cap(), 16 * 1024);
        assert!(cfg.cluster.enabled.as_bool());
        assert_eq!(cfg.cluster_announce_addr(), "0.0.0.0:7000");
    }

    #[test]
    fn rejects_zero_databases() {
        let yaml = "server:\n  databases: 0\n";
        let mut cfg: Config = serde_yaml::from_str(yaml).expect("yaml parses");
        assert!(cfg.validate_and_normalize().is_err());
    }
}
