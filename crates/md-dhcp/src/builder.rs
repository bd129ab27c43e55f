use std::net::Ipv4Addr;

use crate::Interface;
use crate::lease_table::LeaseEntry;
use crate::options::{self, MessageType};
use crate::packet::{BOOTREPLY, DhcpMessage, MAGIC_COOKIE};

/// Turn a request into a reply of `reply_type` for `entry`, in place.
///
/// Transaction id, hardware address and relay fields are kept as the client
/// sent them so the reply matches the request.
pub fn build_reply(
    msg: &mut DhcpMessage,
    reply_type: MessageType,
    entry: &LeaseEntry,
    interface: &Interface,
    dns_server: Option<Ipv4Addr>,
) {
    msg.op = BOOTREPLY;
    msg.secs = 0;
    msg.flags = 0;
    msg.yiaddr = entry.address;
    msg.cookie = MAGIC_COOKIE;

    options::encode_options(&mut msg.options, reply_type, entry, interface, dns_server);
}
