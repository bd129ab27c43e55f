pub mod builder;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod lease_table;
pub mod options;
pub mod packet;
pub mod server;

pub use config::DhcpConfig;
pub use dispatcher::Dispatcher;
pub use error::InitError;
pub use lease_table::{HwAddr, LeaseEntry, LeaseTable};
pub use packet::DhcpMessage;
pub use server::DhcpServer;

use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Addressing of the interface the server answers on. Read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interface {
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

pub struct DhcpState {
    pub dispatcher: Dispatcher,
}

pub type SharedDhcpState = Arc<RwLock<DhcpState>>;

/// Build the lease table and dispatcher described by `config`.
pub fn new_state(config: &DhcpConfig) -> Result<SharedDhcpState, InitError> {
    let resolved = config.resolve()?;
    let table = LeaseTable::new(resolved.range_start, resolved.pool_size, resolved.lease_secs)?;
    let dispatcher = Dispatcher::new(table, resolved.interface, resolved.dns_server);
    Ok(Arc::new(RwLock::new(DhcpState { dispatcher })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_state() {
        let state = new_state(&DhcpConfig::default()).unwrap();
        let s = state.read().await;
        assert_eq!(s.dispatcher.table().len(), lease_table::MAX_CLIENTS);
        assert_eq!(s.dispatcher.table().bound_count(), 0);
        assert_eq!(s.dispatcher.interface().address, Ipv4Addr::new(192, 168, 4, 1));
    }

    #[tokio::test]
    async fn test_new_state_pool_too_large() {
        let config = DhcpConfig {
            pool_size: lease_table::MAX_CLIENTS + 1,
            server_ip: "192.168.4.200".to_string(),
            ..Default::default()
        };
        assert!(matches!(new_state(&config), Err(InitError::PoolTooLarge { .. })));
    }
}
