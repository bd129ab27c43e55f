use std::net::Ipv4Addr;

use crate::Interface;
use crate::lease_table::LeaseEntry;

/// Size of the fixed options region carried by every message (RFC 2131 §2)
pub const OPTIONS_LEN: usize = 312;

/// DHCP option codes (RFC 2132)
pub const OPT_PAD: u8 = 0;
pub const OPT_SUBNET_MASK: u8 = 1;
pub const OPT_ROUTER: u8 = 3;
pub const OPT_DNS_SERVER: u8 = 6;
pub const OPT_REQUESTED_IP: u8 = 50;
pub const OPT_LEASE_TIME: u8 = 51;
pub const OPT_MSG_TYPE: u8 = 53;
pub const OPT_SERVER_ID: u8 = 54;
pub const OPT_END: u8 = 255;

/// DHCP message types (option 53)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Discover),
            2 => Ok(Self::Offer),
            3 => Ok(Self::Request),
            4 => Ok(Self::Decline),
            5 => Ok(Self::Ack),
            6 => Ok(Self::Nak),
            7 => Ok(Self::Release),
            8 => Ok(Self::Inform),
            other => Err(other),
        }
    }
}

/// A single option as it sits in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawOption<'a> {
    pub code: u8,
    pub value: &'a [u8],
}

/// Bounds-checked iterator over the TLV sequence of an options buffer.
///
/// Stops at the end marker, or as soon as an option header or its declared
/// length would run past the end of the buffer. PAD bytes are skipped.
#[derive(Debug, Clone)]
pub struct OptionIter<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> OptionIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }
}

impl<'a> Iterator for OptionIter<'a> {
    type Item = RawOption<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let code = *self.buf.get(self.pos)?;
            match code {
                OPT_END => {
                    self.pos = self.buf.len();
                    return None;
                }
                OPT_PAD => {
                    self.pos += 1;
                }
                _ => {
                    let len = match self.buf.get(self.pos + 1) {
                        Some(&len) => len as usize,
                        None => {
                            self.pos = self.buf.len();
                            return None;
                        }
                    };
                    let start = self.pos + 2;
                    let Some(value) = self.buf.get(start..start + len) else {
                        self.pos = self.buf.len();
                        return None;
                    };
                    self.pos = start + len;
                    return Some(RawOption { code, value });
                }
            }
        }
    }
}

/// Find an option by code, accepting it only if its length is `expected_len`.
///
/// The first option carrying `code` decides the outcome: a wrong length ends
/// the search without looking further.
pub fn find_option(options: &[u8], code: u8, expected_len: usize) -> Option<&[u8]> {
    let opt = OptionIter::new(options).find(|o| o.code == code)?;
    if opt.value.len() == expected_len {
        Some(opt.value)
    } else {
        None
    }
}

/// Read a 4-byte address option.
pub fn find_ipv4(options: &[u8], code: u8) -> Option<Ipv4Addr> {
    let v = find_option(options, code, 4)?;
    Some(Ipv4Addr::new(v[0], v[1], v[2], v[3]))
}

/// Read a 4-byte big-endian integer option.
pub fn find_u32(options: &[u8], code: u8) -> Option<u32> {
    let v = find_option(options, code, 4)?;
    Some(u32::from_be_bytes([v[0], v[1], v[2], v[3]]))
}

struct OptionWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl OptionWriter<'_> {
    fn put(&mut self, code: u8, data: &[u8]) {
        self.buf[self.len] = code;
        self.buf[self.len + 1] = data.len() as u8;
        self.buf[self.len + 2..self.len + 2 + data.len()].copy_from_slice(data);
        self.len += 2 + data.len();
    }

    fn put_ipv4(&mut self, code: u8, ip: Ipv4Addr) {
        self.put(code, &ip.octets());
    }
}

/// Encode the reply option set into `dest`, returning the number of bytes used.
///
/// The buffer is zeroed first so nothing the client sent survives. Order:
/// message type, subnet mask, router, server id, lease time, DNS server (only
/// when `dns_server` is set), end.
pub fn encode_options(
    dest: &mut [u8; OPTIONS_LEN],
    msg_type: MessageType,
    entry: &LeaseEntry,
    interface: &Interface,
    dns_server: Option<Ipv4Addr>,
) -> usize {
    dest.fill(0);

    let mut w = OptionWriter { buf: dest, len: 0 };
    w.put(OPT_MSG_TYPE, &[msg_type as u8]);
    w.put_ipv4(OPT_SUBNET_MASK, interface.netmask);
    w.put_ipv4(OPT_ROUTER, interface.gateway);
    w.put_ipv4(OPT_SERVER_ID, interface.address);
    w.put(OPT_LEASE_TIME, &entry.lease_secs.to_be_bytes());
    if let Some(dns) = dns_server {
        w.put_ipv4(OPT_DNS_SERVER, dns);
    }
    w.buf[w.len] = OPT_END;
    w.len + 1
}
