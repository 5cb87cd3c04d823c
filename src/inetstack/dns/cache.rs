// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! DNS cache entry storage.
//!
//! Each cache slot is a pool backed buffer holding a fixed size resolution
//! record at the start, immediately followed by the wire format encoding of
//! the DNS name being resolved. An empty buffer marks a free slot.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    memory::Buffer,
    network::config::DNS_MAX_ADDR_SIZE,
};
use ::std::net::{
    IpAddr,
    Ipv4Addr,
    Ipv6Addr,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Size of the encoded resolution record at the start of a cache buffer.
pub const DNS_CACHE_ENTRY_SIZE: usize = 29;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Resolution state of a DNS cache entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DnsEntryState {
    /// Entry allocated, no socket activity yet.
    Open,
    /// Socket open, query not yet sent.
    Request,
    /// Query sent, waiting for the server response.
    Wait,
    /// Resolution completed.
    Valid,
    /// All retry attempts exhausted.
    Timeout,
    /// The name or the server response was invalid.
    NotValid,
    /// Retention period elapsed, slot awaiting release.
    Expired,
}

/// Resolution record stored at the start of a cache buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DnsCacheEntry {
    /// Tick at which the entry is evicted from the cache.
    pub expiry_tick: u32,
    /// Tick at which an unanswered request is retried.
    pub retry_tick: u32,
    /// Resolved network address, valid in the Valid state only.
    pub resolved_addr: [u8; DNS_MAX_ADDR_SIZE],
    /// Current resolution state.
    pub state: DnsEntryState,
    /// Number of retry attempts made so far.
    pub retry_count: u8,
    /// Transaction ID used to match server responses.
    pub transaction_id: u16,
    /// Set when the entry resolves an IPv6 address.
    pub is_ipv6: bool,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl DnsEntryState {
    fn encode(self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Request => 1,
            Self::Wait => 2,
            Self::Valid => 3,
            Self::Timeout => 4,
            Self::NotValid => 5,
            Self::Expired => 6,
        }
    }

    fn decode(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Open),
            1 => Some(Self::Request),
            2 => Some(Self::Wait),
            3 => Some(Self::Valid),
            4 => Some(Self::Timeout),
            5 => Some(Self::NotValid),
            6 => Some(Self::Expired),
            _ => None,
        }
    }
}

impl DnsCacheEntry {
    /// Creates a new entry in the Open state.
    pub fn new(transaction_id: u16, is_ipv6: bool, expiry_tick: u32, retry_tick: u32) -> Self {
        Self {
            expiry_tick,
            retry_tick,
            resolved_addr: [0; DNS_MAX_ADDR_SIZE],
            state: DnsEntryState::Open,
            retry_count: 0,
            transaction_id,
            is_ipv6,
        }
    }

    /// Encodes the entry into its little endian record format.
    pub fn encode(&self) -> [u8; DNS_CACHE_ENTRY_SIZE] {
        let mut raw: [u8; DNS_CACHE_ENTRY_SIZE] = [0; DNS_CACHE_ENTRY_SIZE];
        raw[0..4].copy_from_slice(&self.expiry_tick.to_le_bytes());
        raw[4..8].copy_from_slice(&self.retry_tick.to_le_bytes());
        raw[8..24].copy_from_slice(&self.resolved_addr);
        raw[24] = self.state.encode();
        raw[25] = self.retry_count;
        raw[26..28].copy_from_slice(&self.transaction_id.to_le_bytes());
        raw[28] = self.is_ipv6 as u8;
        raw
    }

    /// Decodes an entry from its little endian record format.
    pub fn decode(raw: &[u8; DNS_CACHE_ENTRY_SIZE]) -> Option<Self> {
        let mut expiry_raw: [u8; 4] = [0; 4];
        let mut retry_raw: [u8; 4] = [0; 4];
        let mut resolved_addr: [u8; DNS_MAX_ADDR_SIZE] = [0; DNS_MAX_ADDR_SIZE];
        expiry_raw.copy_from_slice(&raw[0..4]);
        retry_raw.copy_from_slice(&raw[4..8]);
        resolved_addr.copy_from_slice(&raw[8..24]);
        Some(Self {
            expiry_tick: u32::from_le_bytes(expiry_raw),
            retry_tick: u32::from_le_bytes(retry_raw),
            resolved_addr,
            state: DnsEntryState::decode(raw[24])?,
            retry_count: raw[25],
            transaction_id: u16::from_le_bytes([raw[26], raw[27]]),
            is_ipv6: raw[28] != 0,
        })
    }

    /// Reads the entry stored at the start of a cache buffer. Returns None
    /// for free slots and unreadable records.
    pub fn load(buffer: &Buffer) -> Option<Self> {
        let mut raw: [u8; DNS_CACHE_ENTRY_SIZE] = [0; DNS_CACHE_ENTRY_SIZE];
        if !buffer.read(0, &mut raw) {
            return None;
        }
        Self::decode(&raw)
    }

    /// Writes the entry to the start of a cache buffer.
    pub fn store(&self, buffer: &mut Buffer) -> bool {
        buffer.write(0, &self.encode())
    }

    /// Returns the resolved address as an IP address of the entry flavour.
    pub fn resolved_ip(&self) -> IpAddr {
        if self.is_ipv6 {
            let mut octets: [u8; 16] = [0; 16];
            octets.copy_from_slice(&self.resolved_addr);
            IpAddr::V6(Ipv6Addr::from(octets))
        } else {
            IpAddr::V4(Ipv4Addr::new(
                self.resolved_addr[0],
                self.resolved_addr[1],
                self.resolved_addr[2],
                self.resolved_addr[3],
            ))
        }
    }
}
