use std::net::Ipv4Addr;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::Interface;
use crate::error::InitError;
use crate::lease_table::{DEFAULT_LEASE_SECS, MAX_CLIENTS};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhcpConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub interface: String,
    #[serde(default = "default_server_ip")]
    pub server_ip: String,
    #[serde(default = "default_netmask")]
    pub netmask: String,
    /// Router option; the server's own address when empty
    #[serde(default)]
    pub gateway: String,
    #[serde(default = "default_range_start")]
    pub range_start: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_lease_time")]
    pub lease_time_secs: u32,
    /// Offer the server itself as DNS resolver
    #[serde(default)]
    pub advertise_dns: bool,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Typed view of a [`DhcpConfig`], checked and ready to build the server from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub interface: Interface,
    pub range_start: Ipv4Addr,
    pub pool_size: usize,
    pub lease_secs: u32,
    pub dns_server: Option<Ipv4Addr>,
}

fn default_true() -> bool {
    true
}

fn default_server_ip() -> String {
    "192.168.4.1".to_string()
}

fn default_netmask() -> String {
    "255.255.255.0".to_string()
}

fn default_range_start() -> String {
    "192.168.4.2".to_string()
}

fn default_pool_size() -> usize {
    MAX_CLIENTS
}

fn default_lease_time() -> u32 {
    DEFAULT_LEASE_SECS
}

fn default_port() -> u16 {
    67
}

fn parse_addr(field: &str, value: &str) -> Result<Ipv4Addr, InitError> {
    value
        .parse()
        .map_err(|_| InitError::InvalidConfig(format!("{field}: '{value}' is not an IPv4 address")))
}

impl Default for DhcpConfig {
    fn default() -> Self {
        serde_json::from_str("{}").unwrap()
    }
}

impl DhcpConfig {
    /// Load from a JSON file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config {}", path.display()))
        } else {
            info!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn resolve(&self) -> Result<ResolvedConfig, InitError> {
        let address = parse_addr("server_ip", &self.server_ip)?;
        let netmask = parse_addr("netmask", &self.netmask)?;
        let gateway = if self.gateway.is_empty() {
            address
        } else {
            parse_addr("gateway", &self.gateway)?
        };
        let range_start = parse_addr("range_start", &self.range_start)?;

        if self.lease_time_secs == 0 {
            return Err(InitError::InvalidConfig(
                "lease_time_secs must be greater than 0".to_string(),
            ));
        }

        if self.pool_size > MAX_CLIENTS {
            return Err(InitError::PoolTooLarge {
                requested: self.pool_size,
                capacity: MAX_CLIENTS,
            });
        }

        let start = u64::from(u32::from(range_start));
        let server = u64::from(u32::from(address));
        if server >= start && server < start.saturating_add(self.pool_size as u64) {
            return Err(InitError::InvalidConfig(format!(
                "server_ip {address} must not be within the pool starting at {range_start}"
            )));
        }

        Ok(ResolvedConfig {
            interface: Interface {
                address,
                netmask,
                gateway,
            },
            range_start,
            pool_size: self.pool_size,
            lease_secs: self.lease_time_secs,
            dns_server: self.advertise_dns.then_some(address),
        })
    }
}
