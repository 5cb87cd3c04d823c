// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! DNS name validation and wire format handling.
//!
//! Names are validated on admission using the RFC1035 preferred name syntax
//! and stored in their length prefixed wire format. Stored names are matched
//! byte exactly, so matching is case sensitive. This departs from the case
//! insensitive matching described by RFC1035 and is a deliberate
//! simplification for a cache of this size.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::memory::Buffer;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Largest supported encoded name size, including the root label.
pub const MAX_ENCODED_NAME_SIZE: usize = 255;

/// Largest supported label size.
const MAX_LABEL_SIZE: usize = 63;

/// Compression pointer marker in a name length octet.
const COMPRESSION_MARKER: u8 = 0xC0;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Validates a DNS name and encodes it into its wire format of length
/// prefixed labels followed by the empty root label. Returns None if the
/// name does not use the RFC1035 preferred name syntax.
pub fn encode(name: &str) -> Option<Vec<u8>> {
    let mut encoded: Vec<u8> = Vec::with_capacity(name.len() + 2);
    for label in name.split('.') {
        let label: &[u8] = label.as_bytes();
        if label.is_empty() || label.len() > MAX_LABEL_SIZE {
            return None;
        }
        if !label[0].is_ascii_alphabetic() {
            return None;
        }
        if !label.iter().all(|byte| byte.is_ascii_alphanumeric() || *byte == b'-') {
            return None;
        }
        if label[label.len() - 1] == b'-' {
            return None;
        }
        encoded.push(label.len() as u8);
        encoded.extend_from_slice(label);
    }
    encoded.push(0);
    if encoded.len() > MAX_ENCODED_NAME_SIZE {
        return None;
    }
    Some(encoded)
}

/// Compares an encoded name against the buffer contents at the given
/// offset. The match is byte exact and includes the terminating root label.
pub fn matches_at(buffer: &Buffer, offset: usize, encoded: &[u8]) -> bool {
    let mut stored: Vec<u8> = vec![0; encoded.len()];
    buffer.read(offset, &mut stored) && stored == encoded
}

/// Advances past an encoded name in a message buffer, following the DNS
/// compression convention where a length octet with the two top bits set
/// replaces the remainder of the name with a two octet pointer. Returns the
/// offset of the first octet after the name, or None if the name runs past
/// the end of the buffer.
pub fn skip(buffer: &Buffer, mut offset: usize) -> Option<usize> {
    loop {
        let mut length: [u8; 1] = [0];
        if !buffer.read(offset, &mut length) {
            return None;
        }
        if length[0] == 0 {
            return Some(offset + 1);
        }
        if length[0] & COMPRESSION_MARKER == COMPRESSION_MARKER {
            return Some(offset + 2);
        }
        offset += 1 + length[0] as usize;
    }
}
