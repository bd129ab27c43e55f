use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

use crate::Interface;
use crate::builder::build_reply;
use crate::lease_table::{LeaseSlot, LeaseTable};
use crate::options::MessageType;
use crate::packet::{BOOTREQUEST, DhcpMessage};

/// Per-message DHCP state machine over a lease table.
///
/// Whether a client is discovering or confirming is decided only by whether
/// the table already holds an entry for its hardware address.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    table: LeaseTable,
    interface: Interface,
    dns_server: Option<Ipv4Addr>,
}

impl Dispatcher {
    pub fn new(table: LeaseTable, interface: Interface, dns_server: Option<Ipv4Addr>) -> Self {
        Self {
            table,
            interface,
            dns_server,
        }
    }

    pub fn table(&self) -> &LeaseTable {
        &self.table
    }

    pub fn interface(&self) -> &Interface {
        &self.interface
    }

    /// Handle one inbound message, returning the reply to broadcast (if any).
    pub fn handle(&mut self, mut msg: DhcpMessage) -> Option<DhcpMessage> {
        if msg.op != BOOTREQUEST {
            debug!("Ignoring message with op {}", msg.op);
            return None;
        }

        let Some(code) = msg.msg_type() else {
            debug!("Dropping message from {} without a valid message type", msg.hw_addr());
            return None;
        };

        let (reply_type, slot) = match MessageType::try_from(code) {
            Ok(MessageType::Discover) => self.handle_discover(&msg),
            Ok(MessageType::Request) => self.handle_request(&msg),
            Ok(MessageType::Release) => {
                self.handle_release(&msg);
                None
            }
            _ => {
                debug!("Ignoring DHCP message type {} from {}", code, msg.hw_addr());
                None
            }
        }?;

        build_reply(
            &mut msg,
            reply_type,
            self.table.entry(slot),
            &self.interface,
            self.dns_server,
        );
        Some(msg)
    }

    fn handle_discover(&mut self, msg: &DhcpMessage) -> Option<(MessageType, LeaseSlot)> {
        let hw = msg.hw_addr();
        debug!("DHCPDISCOVER from {}", hw);

        let slot = match self.table.lookup(hw) {
            Some(slot) => slot,
            None => match self.table.allocate(hw) {
                Some(slot) => slot,
                None => {
                    warn!("No free address for {}, pool of {} exhausted", hw, self.table.len());
                    return None;
                }
            },
        };

        info!("DHCPOFFER {} to {}", self.table.entry(slot).address, hw);
        Some((MessageType::Offer, slot))
    }

    fn handle_request(&mut self, msg: &DhcpMessage) -> Option<(MessageType, LeaseSlot)> {
        let hw = msg.hw_addr();

        let Some(slot) = self.table.lookup(hw) else {
            debug!("DHCPREQUEST from {} with no prior offer", hw);
            return None;
        };

        let Some(requested) = msg.requested_ip() else {
            debug!("DHCPREQUEST from {} without requested IP", hw);
            return None;
        };

        let bound = self.table.entry(slot).address;
        if requested != bound {
            warn!(
                "DHCPREQUEST from {} for {} but {} is bound, releasing",
                hw, requested, bound
            );
            self.table.release(slot);
            return None;
        }

        info!("DHCPACK {} to {}", bound, hw);
        Some((MessageType::Ack, slot))
    }

    fn handle_release(&mut self, msg: &DhcpMessage) {
        let hw = msg.hw_addr();
        match self.table.lookup(hw) {
            Some(slot) => {
                info!("DHCPRELEASE of {} from {}", self.table.entry(slot).address, hw);
                self.table.release(slot);
            }
            None => debug!("DHCPRELEASE from {} with no lease", hw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease_table::{HwAddr, MAX_CLIENTS};
    use crate::options::{self, OPT_LEASE_TIME, OPT_ROUTER, OPT_SUBNET_MASK};
    use crate::packet::BOOTREPLY;
    use crate::packet::tests::make_request;
    use std::collections::HashSet;

    const SERVER: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);
    const START: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 2);

    fn dispatcher(pool: usize) -> Dispatcher {
        let table = LeaseTable::new(START, pool, 3600).unwrap();
        let interface = Interface {
            address: SERVER,
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: SERVER,
        };
        Dispatcher::new(table, interface, None)
    }

    fn mac(n: u8) -> [u8; 6] {
        [0x02, 0, 0, 0, 0, n]
    }

    fn discover(n: u8) -> DhcpMessage {
        DhcpMessage::parse(&make_request(mac(n), &[53, 1, 1, 255])).unwrap()
    }

    fn request(n: u8, ip: Ipv4Addr) -> DhcpMessage {
        let [a, b, c, d] = ip.octets();
        DhcpMessage::parse(&make_request(mac(n), &[53, 1, 3, 50, 4, a, b, c, d, 255])).unwrap()
    }

    fn release(n: u8) -> DhcpMessage {
        DhcpMessage::parse(&make_request(mac(n), &[53, 1, 7, 255])).unwrap()
    }

    #[test]
    fn test_discover_offers_first_address() {
        let mut d = dispatcher(3);
        let reply = d.handle(discover(1)).unwrap();

        assert_eq!(reply.op, BOOTREPLY);
        assert_eq!(reply.msg_type(), Some(MessageType::Offer as u8));
        assert_eq!(reply.yiaddr, START);
        assert_eq!(reply.xid, 0x12345678);
        assert_eq!(
            options::find_ipv4(&reply.options, OPT_SUBNET_MASK),
            Some(Ipv4Addr::new(255, 255, 255, 0))
        );
        assert_eq!(options::find_ipv4(&reply.options, OPT_ROUTER), Some(SERVER));
        assert_eq!(options::find_u32(&reply.options, OPT_LEASE_TIME), Some(3600));
        assert_eq!(d.table().bound_count(), 1);
    }

    #[test]
    fn test_discover_is_stable() {
        let mut d = dispatcher(3);
        let first = d.handle(discover(1)).unwrap().yiaddr;
        d.handle(discover(2)).unwrap();
        let second = d.handle(discover(1)).unwrap().yiaddr;
        assert_eq!(first, second);
        assert_eq!(d.table().bound_count(), 2);
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut d = dispatcher(MAX_CLIENTS);
        let mut seen = HashSet::new();
        for n in 0..MAX_CLIENTS as u8 {
            let reply = d.handle(discover(n)).unwrap();
            assert!(seen.insert(reply.yiaddr));
        }
        assert!(d.handle(discover(200)).is_none());
        assert_eq!(d.table().bound_count(), MAX_CLIENTS);
    }

    #[test]
    fn test_request_acks_offered_address() {
        let mut d = dispatcher(3);
        let offered = d.handle(discover(1)).unwrap().yiaddr;
        let ack = d.handle(request(1, offered)).unwrap();
        assert_eq!(ack.msg_type(), Some(MessageType::Ack as u8));
        assert_eq!(ack.yiaddr, offered);
    }

    #[test]
    fn test_request_without_offer_dropped() {
        let mut d = dispatcher(3);
        assert!(d.handle(request(1, START)).is_none());
        assert_eq!(d.table().bound_count(), 0);
    }

    #[test]
    fn test_request_without_address_dropped() {
        let mut d = dispatcher(3);
        d.handle(discover(1)).unwrap();
        let msg = DhcpMessage::parse(&make_request(mac(1), &[53, 1, 3, 255])).unwrap();
        assert!(d.handle(msg).is_none());
        // binding kept
        assert!(d.table().lookup(HwAddr(mac(1))).is_some());
    }

    #[test]
    fn test_request_mismatch_frees_entry() {
        let mut d = dispatcher(1);
        d.handle(discover(1)).unwrap();
        assert!(d.handle(request(1, Ipv4Addr::new(192, 168, 4, 99))).is_none());
        assert_eq!(d.table().lookup(HwAddr(mac(1))), None);

        // another client can now claim it
        let reply = d.handle(discover(2)).unwrap();
        assert_eq!(reply.yiaddr, START);
    }

    #[test]
    fn test_release() {
        let mut d = dispatcher(1);
        d.handle(discover(1)).unwrap();
        assert!(d.handle(release(1)).is_none());
        assert_eq!(d.table().bound_count(), 0);

        // releasing again, or from an unknown client, changes nothing
        assert!(d.handle(release(1)).is_none());
        assert!(d.handle(release(9)).is_none());
        assert_eq!(d.table().bound_count(), 0);

        assert_eq!(d.handle(discover(2)).unwrap().yiaddr, START);
    }

    #[test]
    fn test_ignores_replies() {
        let mut d = dispatcher(3);
        let mut msg = discover(1);
        msg.op = BOOTREPLY;
        assert!(d.handle(msg).is_none());
        assert_eq!(d.table().bound_count(), 0);
    }

    #[test]
    fn test_missing_or_malformed_type_dropped() {
        let mut d = dispatcher(3);
        let none = DhcpMessage::parse(&make_request(mac(1), &[255])).unwrap();
        assert!(d.handle(none).is_none());
        let long = DhcpMessage::parse(&make_request(mac(1), &[53, 2, 1, 1, 255])).unwrap();
        assert!(d.handle(long).is_none());
        assert_eq!(d.table().bound_count(), 0);
    }

    #[test]
    fn test_other_types_ignored() {
        let mut d = dispatcher(3);
        d.handle(discover(1)).unwrap();
        for t in [4u8, 8, 42] {
            let msg = DhcpMessage::parse(&make_request(mac(1), &[53, 1, t, 255])).unwrap();
            assert!(d.handle(msg).is_none());
        }
        assert_eq!(d.table().bound_count(), 1);
    }

    #[test]
    fn test_dns_option_when_enabled() {
        let table = LeaseTable::new(START, 2, 60).unwrap();
        let interface = Interface {
            address: SERVER,
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: SERVER,
        };
        let mut d = Dispatcher::new(table, interface, Some(SERVER));
        let reply = d.handle(discover(1)).unwrap();
        assert_eq!(options::find_ipv4(&reply.options, options::OPT_DNS_SERVER), Some(SERVER));
    }

    #[test]
    fn test_bindings_stay_unique() {
        let mut d = dispatcher(3);
        let script: Vec<DhcpMessage> = vec![
            discover(1),
            discover(2),
            request(1, START),
            release(2),
            discover(3),
            discover(2),
            request(3, Ipv4Addr::new(1, 2, 3, 4)),
            discover(4),
            discover(1),
        ];
        for msg in script {
            d.handle(msg);
            let owners: HashSet<_> = d.table().bound().map(|e| e.owner).collect();
            assert_eq!(owners.len(), d.table().bound_count());
        }
    }
}
