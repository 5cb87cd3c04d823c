// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! DNS query formatting and response parsing.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::inetstack::dns::{
    cache::DnsCacheEntry,
    name,
};
use crate::runtime::{
    memory::{
        Buffer,
        SharedMemoryPool,
    },
    network::config::DNS_MAX_ADDR_SIZE,
};
use ::rand::{
    rngs::SmallRng,
    Rng,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Well known DNS server UDP port.
pub const DNS_PORT: u16 = 53;

/// Internet class 'A' record type.
pub const RECORD_TYPE_A: u8 = 1;

/// Internet class 'AAAA' record type.
pub const RECORD_TYPE_AAAA: u8 = 28;

/// Size of the fixed DNS message header.
const HEADER_SIZE: usize = 12;

/// Size of the fixed fields of an answer resource record.
const RESOURCE_RECORD_SIZE: usize = 10;

//======================================================================================================================
// Enumerations
//======================================================================================================================

/// Outcome of checking a response message against a cache entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseCheck {
    /// The header and question section are valid. The answer section holds
    /// the given number of records starting at the given payload offset.
    Answers { count: u16, offset: usize },
    /// The server reported a format error or a name error.
    NameError,
    /// The question section does not match the original query.
    Invalid,
    /// The message is malformed or reports a transient server condition
    /// and should be discarded, leaving the retry timer running.
    Ignore,
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Selects the resource record type for the given address flavour.
fn record_type(is_ipv6: bool) -> u8 {
    if is_ipv6 {
        RECORD_TYPE_AAAA
    } else {
        RECORD_TYPE_A
    }
}

/// Selects the resource record address size for the given address flavour.
fn addr_size(is_ipv6: bool) -> usize {
    if is_ipv6 {
        16
    } else {
        4
    }
}

/// Formats a standard recursive query message for the given cache entry.
/// The transaction ID is carried in native byte order, since it is only
/// ever matched against the echoed copy in the response. Returns None on
/// pool exhaustion.
pub fn format_query(pool: &SharedMemoryPool, entry: &DnsCacheEntry, encoded_name: &[u8]) -> Option<Buffer> {
    let mut header: [u8; HEADER_SIZE] = [0; HEADER_SIZE];
    header[0..2].copy_from_slice(&entry.transaction_id.to_ne_bytes());
    header[2] = 0x01;
    header[5] = 0x01;
    let footer: [u8; 4] = [0, record_type(entry.is_ipv6), 0, 1];

    let mut message: Buffer = Buffer::new(pool.clone());
    if message.append(&header) && message.append(encoded_name) && message.append(&footer) {
        Some(message)
    } else {
        None
    }
}

/// Checks the header and question section of a response message against the
/// original query. The flag check requires a standard query response with
/// recursion available and without truncation.
pub fn check_response(payload: &Buffer, encoded_name: &[u8], is_ipv6: bool) -> ResponseCheck {
    let mut header: [u8; HEADER_SIZE] = [0; HEADER_SIZE];
    if !payload.read(0, &mut header) {
        return ResponseCheck::Ignore;
    }
    if (header[2] & 0xFB) != 0x81 || (header[3] & 0x80) != 0x80 {
        return ResponseCheck::Ignore;
    }

    // Format and name errors are terminal. Other error codes indicate an
    // unresponsive server and leave the entry waiting for a retry.
    let response_code: u8 = header[3] & 0x0F;
    if response_code == 1 || response_code == 3 {
        return ResponseCheck::NameError;
    }
    if response_code != 0 {
        return ResponseCheck::Ignore;
    }

    // The question section must echo the query exactly.
    let question_count: u16 = u16::from_be_bytes([header[4], header[5]]);
    if question_count != 1 {
        return ResponseCheck::Invalid;
    }
    if !name::matches_at(payload, HEADER_SIZE, encoded_name) {
        return ResponseCheck::Invalid;
    }
    let mut question: [u8; 4] = [0; 4];
    if !payload.read(HEADER_SIZE + encoded_name.len(), &mut question) {
        return ResponseCheck::Invalid;
    }
    if question != [0, record_type(is_ipv6), 0, 1] {
        return ResponseCheck::Invalid;
    }

    let count: u16 = u16::from_be_bytes([header[6], header[7]]);
    let offset: usize = HEADER_SIZE + encoded_name.len() + 4;
    ResponseCheck::Answers { count, offset }
}

/// Scans the answer section for Internet class records of the requested
/// flavour. The records form a tree of canonical name references with the
/// address records at the leaves, so only the address records are read.
/// When a response carries several candidate addresses one is selected
/// uniformly at random by size one reservoir sampling.
pub fn scan_answers(
    payload: &Buffer,
    mut offset: usize,
    count: u16,
    is_ipv6: bool,
    rng: &mut SmallRng,
) -> Option<[u8; DNS_MAX_ADDR_SIZE]> {
    let wanted_type: u8 = record_type(is_ipv6);
    let wanted_size: usize = addr_size(is_ipv6);
    let mut selected: Option<[u8; DNS_MAX_ADDR_SIZE]> = None;
    let mut candidates: u32 = 0;

    for _ in 0..count {
        // The record name is assumed valid and is not checked.
        offset = match name::skip(payload, offset) {
            Some(offset) => offset,
            None => break,
        };
        let mut record: [u8; RESOURCE_RECORD_SIZE] = [0; RESOURCE_RECORD_SIZE];
        if !payload.read(offset, &mut record) {
            break;
        }
        offset += RESOURCE_RECORD_SIZE;

        if record[0] == 0 && record[1] == wanted_type && record[2] == 0 && record[3] == 1 {
            let mut resolved_addr: [u8; DNS_MAX_ADDR_SIZE] = [0; DNS_MAX_ADDR_SIZE];
            if !payload.read(offset, &mut resolved_addr[..wanted_size]) {
                break;
            }
            candidates += 1;
            if rng.gen_range(0..candidates) == 0 {
                selected = Some(resolved_addr);
            }
        }
        offset += u16::from_be_bytes([record[8], record[9]]) as usize;
    }
    selected
}
