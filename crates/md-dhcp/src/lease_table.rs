use std::fmt;
use std::net::Ipv4Addr;

use tracing::debug;

use crate::error::InitError;

/// Maximum number of clients the pool can serve.
pub const MAX_CLIENTS: usize = 5;

/// Lease time reported to clients when none is configured.
pub const DEFAULT_LEASE_SECS: u32 = 60 * 60;

/// Length of the hardware address used as the lease key.
pub const HWADDR_LEN: usize = 6;

/// Link-layer address of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HwAddr(pub [u8; HWADDR_LEN]);

impl HwAddr {
    /// Take the first `HWADDR_LEN` bytes of a `chaddr` field.
    pub fn from_chaddr(chaddr: &[u8; 16]) -> Self {
        let mut addr = [0u8; HWADDR_LEN];
        addr.copy_from_slice(&chaddr[..HWADDR_LEN]);
        Self(addr)
    }
}

impl fmt::Display for HwAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// One pool slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseEntry {
    pub address: Ipv4Addr,
    pub lease_secs: u32,
    /// `None` while the slot is free
    pub owner: Option<HwAddr>,
}

impl LeaseEntry {
    const INERT: Self = Self {
        address: Ipv4Addr::UNSPECIFIED,
        lease_secs: 0,
        owner: None,
    };

    pub fn is_free(&self) -> bool {
        self.owner.is_none()
    }
}

/// Handle to a slot of a [`LeaseTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseSlot(usize);

/// Fixed-capacity table of address bindings.
///
/// Slot `i` always holds `start + i`; only the owner of a slot ever changes.
#[derive(Debug, Clone)]
pub struct LeaseTable {
    entries: [LeaseEntry; MAX_CLIENTS],
    active: usize,
}

impl LeaseTable {
    /// Build a table of `count` free entries starting at `start`.
    pub fn new(start: Ipv4Addr, count: usize, lease_secs: u32) -> Result<Self, InitError> {
        if count > MAX_CLIENTS {
            return Err(InitError::PoolTooLarge {
                requested: count,
                capacity: MAX_CLIENTS,
            });
        }

        let mut entries = [LeaseEntry::INERT; MAX_CLIENTS];
        let base = u32::from(start);
        for (i, entry) in entries.iter_mut().take(count).enumerate() {
            let address = base
                .checked_add(i as u32)
                .ok_or(InitError::AddressOverflow { start, count })?;
            *entry = LeaseEntry {
                address: Ipv4Addr::from(address),
                lease_secs,
                owner: None,
            };
        }

        Ok(Self {
            entries,
            active: count,
        })
    }

    /// Find the slot bound to `hw`.
    pub fn lookup(&self, hw: HwAddr) -> Option<LeaseSlot> {
        self.active_entries()
            .iter()
            .position(|e| e.owner == Some(hw))
            .map(LeaseSlot)
    }

    /// Bind the first free slot to `hw`. `None` when the pool is exhausted.
    pub fn allocate(&mut self, hw: HwAddr) -> Option<LeaseSlot> {
        let index = self.active_entries().iter().position(LeaseEntry::is_free)?;
        let entry = &mut self.entries[index];
        entry.owner = Some(hw);
        debug!("Bound {} to {}", entry.address, hw);
        Some(LeaseSlot(index))
    }

    /// Return a slot to the pool. Releasing a free slot does nothing.
    pub fn release(&mut self, slot: LeaseSlot) {
        let entry = &mut self.entries[slot.0];
        if let Some(owner) = entry.owner.take() {
            debug!("Freed {} (was {})", entry.address, owner);
        }
    }

    pub fn entry(&self, slot: LeaseSlot) -> &LeaseEntry {
        &self.entries[slot.0]
    }

    /// All usable entries, in slot order.
    pub fn entries(&self) -> impl Iterator<Item = &LeaseEntry> {
        self.active_entries().iter()
    }

    /// Entries currently bound to a client.
    pub fn bound(&self) -> impl Iterator<Item = &LeaseEntry> {
        self.entries().filter(|e| !e.is_free())
    }

    pub fn bound_count(&self) -> usize {
        self.bound().count()
    }

    /// Number of usable entries.
    pub fn len(&self) -> usize {
        self.active
    }

    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    pub fn capacity(&self) -> usize {
        MAX_CLIENTS
    }

    fn active_entries(&self) -> &[LeaseEntry] {
        &self.entries[..self.active]
    }
}
