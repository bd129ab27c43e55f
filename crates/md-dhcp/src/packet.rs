//! DHCPv4 message layout (RFC 2131)

use std::net::Ipv4Addr;
use thiserror::Error;

use crate::lease_table::HwAddr;
use crate::options::{self, OPT_MSG_TYPE, OPT_REQUESTED_IP, OPTIONS_LEN};

/// DHCP magic cookie
pub const MAGIC_COOKIE: u32 = 0x6382_5363;

pub const BOOTREQUEST: u8 = 1;
pub const BOOTREPLY: u8 = 2;

/// Fixed header plus magic cookie
pub const HEADER_LEN: usize = 240;

/// Size of a serialized message
pub const MESSAGE_LEN: usize = HEADER_LEN + OPTIONS_LEN;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DhcpParseError {
    #[error("Packet too short: {0} bytes (minimum 240)")]
    TooShort(usize),
    #[error("Invalid magic cookie")]
    InvalidMagic,
}

/// A DHCP message with its options kept as a raw, fixed-size region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpMessage {
    pub op: u8,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: [u8; 16],
    pub sname: [u8; 64],
    pub file: [u8; 128],
    pub cookie: u32,
    pub options: [u8; OPTIONS_LEN],
}

impl DhcpMessage {
    /// Parse a message from a single datagram.
    ///
    /// Options past `OPTIONS_LEN` bytes are cut off; a shorter options area is
    /// zero-filled.
    pub fn parse(data: &[u8]) -> Result<Self, DhcpParseError> {
        if data.len() < HEADER_LEN {
            return Err(DhcpParseError::TooShort(data.len()));
        }

        let cookie = u32::from_be_bytes([data[236], data[237], data[238], data[239]]);
        if cookie != MAGIC_COOKIE {
            return Err(DhcpParseError::InvalidMagic);
        }

        let mut chaddr = [0u8; 16];
        chaddr.copy_from_slice(&data[28..44]);
        let mut sname = [0u8; 64];
        sname.copy_from_slice(&data[44..108]);
        let mut file = [0u8; 128];
        file.copy_from_slice(&data[108..236]);

        let mut options = [0u8; OPTIONS_LEN];
        let opt_data = &data[HEADER_LEN..];
        let n = opt_data.len().min(OPTIONS_LEN);
        options[..n].copy_from_slice(&opt_data[..n]);

        Ok(DhcpMessage {
            op: data[0],
            htype: data[1],
            hlen: data[2],
            hops: data[3],
            xid: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            secs: u16::from_be_bytes([data[8], data[9]]),
            flags: u16::from_be_bytes([data[10], data[11]]),
            ciaddr: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            yiaddr: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
            siaddr: Ipv4Addr::new(data[20], data[21], data[22], data[23]),
            giaddr: Ipv4Addr::new(data[24], data[25], data[26], data[27]),
            chaddr,
            sname,
            file,
            cookie,
            options,
        })
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MESSAGE_LEN);

        buf.push(self.op);
        buf.push(self.htype);
        buf.push(self.hlen);
        buf.push(self.hops);
        buf.extend_from_slice(&self.xid.to_be_bytes());
        buf.extend_from_slice(&self.secs.to_be_bytes());
        buf.extend_from_slice(&self.flags.to_be_bytes());
        buf.extend_from_slice(&self.ciaddr.octets());
        buf.extend_from_slice(&self.yiaddr.octets());
        buf.extend_from_slice(&self.siaddr.octets());
        buf.extend_from_slice(&self.giaddr.octets());
        buf.extend_from_slice(&self.chaddr);
        buf.extend_from_slice(&self.sname);
        buf.extend_from_slice(&self.file);
        buf.extend_from_slice(&self.cookie.to_be_bytes());
        buf.extend_from_slice(&self.options);

        buf
    }

    /// Client hardware address, the lease key
    pub fn hw_addr(&self) -> HwAddr {
        HwAddr::from_chaddr(&self.chaddr)
    }

    /// Raw DHCP message type (option 53)
    pub fn msg_type(&self) -> Option<u8> {
        options::find_option(&self.options, OPT_MSG_TYPE, 1).map(|v| v[0])
    }

    /// Requested IP address (option 50)
    pub fn requested_ip(&self) -> Option<Ipv4Addr> {
        options::find_ipv4(&self.options, OPT_REQUESTED_IP)
    }

    /// Iterate over the options present in the message
    pub fn options(&self) -> options::OptionIter<'_> {
        options::OptionIter::new(&self.options)
    }
}
