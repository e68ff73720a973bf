// src/config.rs

//! Configuration for both process roles. The Name Server uses a small
//! declarative config, mirroring how a coordinator process is configured;
//! the Storage Server uses the fuller raw-then-validated pattern since it
//! owns on-disk state and more moving parts.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Configuration for a Name Server process.
#[derive(Debug, Clone, Deserialize)]
pub struct NmConfig {
    #[serde(default = "default_nm_host")]
    pub host: String,

    #[serde(default = "default_nm_port")]
    pub port: u16,

    #[serde(with = "humantime_serde", default = "default_sweep_interval")]
    pub heartbeat_check_interval: Duration,

    #[serde(with = "humantime_serde", default = "default_heartbeat_timeout")]
    pub heartbeat_timeout: Duration,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_nm_host() -> String {
    "0.0.0.0".to_string()
}
fn default_nm_port() -> u16 {
    5050
}
fn default_sweep_interval() -> Duration {
    Duration::from_secs(5)
}
fn default_heartbeat_timeout() -> Duration {
    Duration::from_secs(15)
}
fn default_log_level() -> String {
    "info".to_string()
}

impl NmConfig {
    pub async fn from_file(path: &str) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read NM config file at '{path}'"))?;
        let config: NmConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse TOML from '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.heartbeat_timeout <= self.heartbeat_check_interval {
            return Err(anyhow!(
                "heartbeat_timeout ({:?}) must exceed heartbeat_check_interval ({:?})",
                self.heartbeat_timeout,
                self.heartbeat_check_interval
            ));
        }
        Ok(())
    }
}

/// A raw representation of a Storage Server config file before validation.
#[derive(Deserialize)]
struct RawSsConfig {
    #[serde(default = "default_ss_host")]
    host: String,
    #[serde(default = "default_client_port")]
    client_port: u16,
    nm_host: String,
    #[serde(default = "default_nm_port")]
    nm_port: u16,
    ss_id: String,
    #[serde(default = "default_data_dir")]
    data_dir: String,
    #[serde(with = "humantime_serde", default = "default_heartbeat_interval")]
    heartbeat_interval: Duration,
    #[serde(default = "default_log_level")]
    log_level: String,
}

fn default_ss_host() -> String {
    "0.0.0.0".to_string()
}
fn default_client_port() -> u16 {
    6001
}
fn default_data_dir() -> String {
    "data".to_string()
}
fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(5)
}

/// Represents the final, validated Storage Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsConfig {
    pub host: String,
    pub client_port: u16,
    pub nm_host: String,
    pub nm_port: u16,
    pub ss_id: String,
    pub data_dir: String,
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    pub log_level: String,
}

impl SsConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read SS config file at '{path}'"))?;
        let raw: RawSsConfig = toml::from_str(&contents)
            .with_context(|| format!("failed to parse TOML from '{path}'"))?;

        let config = SsConfig {
            host: raw.host,
            client_port: raw.client_port,
            nm_host: raw.nm_host,
            nm_port: raw.nm_port,
            ss_id: raw.ss_id,
            data_dir: raw.data_dir,
            heartbeat_interval: raw.heartbeat_interval,
            log_level: raw.log_level,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.ss_id.trim().is_empty() {
            return Err(anyhow!("ss_id cannot be empty"));
        }
        if self.client_port == 0 {
            return Err(anyhow!("client_port cannot be 0"));
        }
        if self.nm_port == 0 {
            return Err(anyhow!("nm_port cannot be 0"));
        }
        if self.nm_host.trim().is_empty() {
            return Err(anyhow!("nm_host cannot be empty"));
        }
        Ok(())
    }
}
