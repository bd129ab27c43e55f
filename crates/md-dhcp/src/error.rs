use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors surfaced while bringing the server up. Nothing after startup is fatal.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Pool of {requested} addresses exceeds capacity of {capacity}")]
    PoolTooLarge { requested: usize, capacity: usize },

    #[error("Pool of {count} addresses starting at {start} runs past 255.255.255.255")]
    AddressOverflow { start: Ipv4Addr, count: usize },

    #[error("Failed to bind DHCP socket: {0}")]
    Bind(#[from] std::io::Error),
}
