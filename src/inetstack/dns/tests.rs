// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::inetstack::{
    dns::{
        cache::{
            DnsCacheEntry,
            DnsEntryState,
            DNS_CACHE_ENTRY_SIZE,
        },
        message::{
            self,
            ResponseCheck,
        },
        name,
        SharedDnsClient,
    },
    test_helpers::{
        SharedTestDhcp,
        SharedTestStack,
        TestFixture,
    },
};
use crate::runtime::{
    memory::Buffer,
    network::{
        config::DnsConfig,
        types::NetworkStatus,
    },
};
use ::anyhow::Result;
use ::rand::{
    rngs::SmallRng,
    SeedableRng,
};
use ::std::{
    collections::HashSet,
    net::{
        IpAddr,
        Ipv4Addr,
        Ipv6Addr,
    },
};

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Builds a pool backed buffer holding the given bytes.
fn buffer_from(fixture: &TestFixture, bytes: &[u8]) -> Result<Buffer> {
    let mut buffer: Buffer = Buffer::new(fixture.pool.clone());
    crate::ensure_eq!(buffer.append(bytes), true);
    Ok(buffer)
}

/// Builds a response message header and question section for the given
/// encoded name.
fn response_message(flags: [u8; 2], answer_count: u16, encoded_name: &[u8], question_footer: [u8; 4]) -> Vec<u8> {
    let mut bytes: Vec<u8> = vec![0; 12];
    bytes[2] = flags[0];
    bytes[3] = flags[1];
    bytes[5] = 0x01;
    bytes[6..8].copy_from_slice(&answer_count.to_be_bytes());
    bytes.extend_from_slice(encoded_name);
    bytes.extend_from_slice(&question_footer);
    bytes
}

/// Appends an answer record with a compressed name reference.
fn append_answer(bytes: &mut Vec<u8>, record_type: u8, rdata: &[u8]) {
    bytes.extend_from_slice(&[0xC0, 0x0C]);
    bytes.extend_from_slice(&[0, record_type, 0, 1]);
    bytes.extend_from_slice(&[0, 0, 0, 60]);
    bytes.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
    bytes.extend_from_slice(rdata);
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

/// Tests wire format encoding of a well formed name.
#[test]
fn name_encodes_wire_format() -> Result<()> {
    crate::ensure_eq!(name::encode("ab.c"), Some(vec![2, b'a', b'b', 1, b'c', 0]));
    crate::ensure_eq!(name::encode("a.example.com").is_some(), true);
    crate::ensure_eq!(name::encode("a1-b.c").is_some(), true);
    Ok(())
}

/// Tests rejection of names outside the preferred name syntax.
#[test]
fn name_rejects_malformed_names() -> Result<()> {
    crate::ensure_eq!(name::encode(""), None);
    crate::ensure_eq!(name::encode("1abc"), None);
    crate::ensure_eq!(name::encode("-abc"), None);
    crate::ensure_eq!(name::encode("abc-"), None);
    crate::ensure_eq!(name::encode("abc..def"), None);
    crate::ensure_eq!(name::encode("ab_c.de"), None);

    // Labels are limited to 63 octets and the whole encoded name to 255.
    let long_label: String = "a".repeat(64);
    crate::ensure_eq!(name::encode(&long_label), None);
    let long_name: String = [
        "a".repeat(63),
        "a".repeat(63),
        "a".repeat(63),
        "a".repeat(63),
    ]
    .join(".");
    crate::ensure_eq!(name::encode(&long_name), None);
    Ok(())
}

/// Tests skipping encoded and compressed names in a message buffer.
#[test]
fn name_skip_follows_compression() -> Result<()> {
    let fixture: TestFixture = TestFixture::new();
    let plain: Buffer = buffer_from(&fixture, &[3, b'f', b'o', b'o', 0, 0xAA])?;
    crate::ensure_eq!(name::skip(&plain, 0), Some(5));

    let compressed: Buffer = buffer_from(&fixture, &[3, b'f', b'o', b'o', 0xC0, 0x0C, 0xAA])?;
    crate::ensure_eq!(name::skip(&compressed, 0), Some(6));

    let truncated: Buffer = buffer_from(&fixture, &[3, b'f'])?;
    crate::ensure_eq!(name::skip(&truncated, 0), None);
    Ok(())
}

/// Tests the cache entry record format round trip.
#[test]
fn cache_entry_record_roundtrip() -> Result<()> {
    let mut entry: DnsCacheEntry = DnsCacheEntry::new(0xABCD, false, 5000, 100);
    entry.state = DnsEntryState::Wait;
    entry.retry_count = 2;
    entry.resolved_addr[0..4].copy_from_slice(&[93, 184, 216, 34]);
    crate::ensure_eq!(DnsCacheEntry::decode(&entry.encode()), Some(entry));

    // An undefined state octet invalidates the record.
    let mut raw: [u8; DNS_CACHE_ENTRY_SIZE] = entry.encode();
    raw[24] = 0xFF;
    crate::ensure_eq!(DnsCacheEntry::decode(&raw), None);
    Ok(())
}

/// Tests cache entry storage in a pool backed buffer.
#[test]
fn cache_entry_buffer_storage() -> Result<()> {
    let fixture: TestFixture = TestFixture::new();
    let mut buffer: Buffer = Buffer::new(fixture.pool.clone());

    // An empty buffer marks a free cache slot.
    crate::ensure_eq!(DnsCacheEntry::load(&buffer), None);

    crate::ensure_eq!(buffer.reset(DNS_CACHE_ENTRY_SIZE), true);
    let entry: DnsCacheEntry = DnsCacheEntry::new(0x1234, true, 9000, 4500);
    crate::ensure_eq!(entry.store(&mut buffer), true);
    crate::ensure_eq!(DnsCacheEntry::load(&buffer), Some(entry));
    Ok(())
}

/// Tests resolved address extraction for both address flavours.
#[test]
fn cache_entry_resolved_ip_flavours() -> Result<()> {
    let mut entry: DnsCacheEntry = DnsCacheEntry::new(1, false, 0, 0);
    entry.resolved_addr[0..4].copy_from_slice(&[1, 2, 3, 4]);
    crate::ensure_eq!(entry.resolved_ip(), IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)));

    let mut entry: DnsCacheEntry = DnsCacheEntry::new(2, true, 0, 0);
    entry.resolved_addr[15] = 1;
    crate::ensure_eq!(entry.resolved_ip(), IpAddr::V6(Ipv6Addr::LOCALHOST));
    Ok(())
}

/// Tests the layout of a formatted query message.
#[test]
fn query_message_format() -> Result<()> {
    let fixture: TestFixture = TestFixture::new();
    let encoded_name: Vec<u8> = name::encode("example.com").ok_or_else(|| anyhow::anyhow!("name should encode"))?;
    let entry: DnsCacheEntry = DnsCacheEntry::new(0xBEEF, false, 0, 0);
    let message: Buffer = match message::format_query(&fixture.pool, &entry, &encoded_name) {
        Some(message) => message,
        None => anyhow::bail!("query should format"),
    };

    let mut bytes: Vec<u8> = vec![0; message.size()];
    crate::ensure_eq!(message.read(0, &mut bytes), true);
    crate::ensure_eq!(bytes.len(), 12 + encoded_name.len() + 4);
    crate::ensure_eq!(bytes[0..2], 0xBEEFu16.to_ne_bytes());
    crate::ensure_eq!(bytes[2..12], [0x01, 0, 0, 0x01, 0, 0, 0, 0, 0, 0]);
    crate::ensure_eq!(bytes[12..12 + encoded_name.len()], encoded_name[..]);
    crate::ensure_eq!(bytes[12 + encoded_name.len()..], [0, 1, 0, 1]);
    Ok(())
}

/// Tests header and question section validation of response messages.
#[test]
fn response_check_vectors() -> Result<()> {
    let fixture: TestFixture = TestFixture::new();
    let encoded_name: Vec<u8> = name::encode("example.com").ok_or_else(|| anyhow::anyhow!("name should encode"))?;
    let question: [u8; 4] = [0, 1, 0, 1];
    let offset: usize = 12 + encoded_name.len() + 4;

    // A well formed response reports its answer count and section offset.
    let valid: Buffer = buffer_from(&fixture, &response_message([0x81, 0x80], 2, &encoded_name, question))?;
    crate::ensure_eq!(
        message::check_response(&valid, &encoded_name, false),
        ResponseCheck::Answers { count: 2, offset }
    );

    // Name errors are terminal; other error codes leave the retry running.
    let name_error: Buffer = buffer_from(&fixture, &response_message([0x81, 0x83], 0, &encoded_name, question))?;
    crate::ensure_eq!(message::check_response(&name_error, &encoded_name, false), ResponseCheck::NameError);
    let server_fail: Buffer = buffer_from(&fixture, &response_message([0x81, 0x82], 0, &encoded_name, question))?;
    crate::ensure_eq!(message::check_response(&server_fail, &encoded_name, false), ResponseCheck::Ignore);

    // Queries and truncated responses are discarded outright.
    let not_response: Buffer = buffer_from(&fixture, &response_message([0x01, 0x00], 0, &encoded_name, question))?;
    crate::ensure_eq!(message::check_response(&not_response, &encoded_name, false), ResponseCheck::Ignore);

    // A question section that does not echo the query is invalid.
    let other_name: Vec<u8> = name::encode("example.org").ok_or_else(|| anyhow::anyhow!("name should encode"))?;
    let wrong_name: Buffer = buffer_from(&fixture, &response_message([0x81, 0x80], 1, &other_name, question))?;
    crate::ensure_eq!(message::check_response(&wrong_name, &encoded_name, false), ResponseCheck::Invalid);
    let wrong_type: Buffer = buffer_from(&fixture, &response_message([0x81, 0x80], 1, &encoded_name, [0, 28, 0, 1]))?;
    crate::ensure_eq!(message::check_response(&wrong_type, &encoded_name, false), ResponseCheck::Invalid);
    Ok(())
}

/// Tests that the answer scan skips canonical name records and reads only
/// the address records.
#[test]
fn answer_scan_skips_cname_records() -> Result<()> {
    let fixture: TestFixture = TestFixture::new();
    let encoded_name: Vec<u8> = name::encode("example.com").ok_or_else(|| anyhow::anyhow!("name should encode"))?;
    let mut bytes: Vec<u8> = response_message([0x81, 0x80], 2, &encoded_name, [0, 1, 0, 1]);
    let offset: usize = bytes.len();
    append_answer(&mut bytes, 5, &[3, b'w', b'w', b'w', 0xC0, 0x0C]);
    append_answer(&mut bytes, 1, &[93, 184, 216, 34]);

    let payload: Buffer = buffer_from(&fixture, &bytes)?;
    let mut rng: SmallRng = SmallRng::seed_from_u64(1);
    let resolved: Option<[u8; 16]> = message::scan_answers(&payload, offset, 2, false, &mut rng);
    crate::ensure_eq!(resolved.map(|addr| [addr[0], addr[1], addr[2], addr[3]]), Some([93, 184, 216, 34]));
    Ok(())
}

/// Tests that reservoir sampling can select any of the candidate records.
#[test]
fn answer_scan_samples_all_candidates() -> Result<()> {
    let fixture: TestFixture = TestFixture::new();
    let encoded_name: Vec<u8> = name::encode("example.com").ok_or_else(|| anyhow::anyhow!("name should encode"))?;
    let mut bytes: Vec<u8> = response_message([0x81, 0x80], 3, &encoded_name, [0, 1, 0, 1]);
    let offset: usize = bytes.len();
    append_answer(&mut bytes, 1, &[1, 0, 0, 1]);
    append_answer(&mut bytes, 1, &[2, 0, 0, 2]);
    append_answer(&mut bytes, 1, &[3, 0, 0, 3]);
    let payload: Buffer = buffer_from(&fixture, &bytes)?;

    let mut picked: HashSet<u8> = HashSet::new();
    for seed in 0..64 {
        let mut rng: SmallRng = SmallRng::seed_from_u64(seed);
        match message::scan_answers(&payload, offset, 3, false, &mut rng) {
            Some(addr) => {
                crate::ensure_eq!([1, 2, 3].contains(&addr[0]), true);
                picked.insert(addr[0]);
            },
            None => anyhow::bail!("scan should select a record"),
        }
    }
    crate::ensure_eq!(picked.len(), 3);
    Ok(())
}

/// Tests server list ordering and address replacement.
#[test]
fn server_list_ordering() -> Result<()> {
    let fixture: TestFixture = TestFixture::new();
    let mut client: SharedDnsClient = fixture.dns_client(DnsConfig::default());
    let server_a: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    let server_b: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
    let server_c: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3));

    // Equal priorities keep their relative insertion order behind higher
    // priority records.
    crate::ensure_eq!(client.add_server(server_a, 1), true);
    crate::ensure_eq!(client.add_server(server_b, 2), true);
    crate::ensure_eq!(client.add_server(server_c, 1), true);
    let addresses: Vec<IpAddr> = client.servers.iter().map(|server| server.address()).collect();
    crate::ensure_eq!(addresses, vec![server_b, server_c, server_a]);

    // Re-adding an address replaces its record.
    crate::ensure_eq!(client.add_server(server_a, 3), true);
    let addresses: Vec<IpAddr> = client.servers.iter().map(|server| server.address()).collect();
    crate::ensure_eq!(addresses, vec![server_a, server_b, server_c]);

    crate::ensure_eq!(client.remove_server(server_b), true);
    crate::ensure_eq!(client.remove_server(server_b), false);

    // IPv6 servers need IPv6 support enabled.
    crate::ensure_eq!(client.add_server(IpAddr::V6(Ipv6Addr::LOCALHOST), 0), false);
    Ok(())
}

/// Tests round robin server selection across retry attempts.
#[test]
fn server_selection_rotates() -> Result<()> {
    let fixture: TestFixture = TestFixture::new();
    let mut client: SharedDnsClient = fixture.dns_client(DnsConfig::default());
    crate::ensure_eq!(client.select_server(0), None);

    let server_a: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    let server_b: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
    let server_c: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3));
    client.add_server(server_a, 2);
    client.add_server(server_b, 1);
    client.add_server(server_c, 0);

    let selected: Vec<Option<IpAddr>> = (0..4u8)
        .map(|retry| client.select_server(retry).map(|server| server.address()))
        .collect();
    crate::ensure_eq!(
        selected,
        vec![Some(server_a), Some(server_b), Some(server_c), Some(server_a)]
    );

    // Selection ends once the retry count is exhausted.
    crate::ensure_eq!(client.select_server(4), None);
    Ok(())
}

/// Tests that a full cache evicts the entry with the earliest expiry.
#[test]
fn cache_eviction_replaces_earliest_expiry() -> Result<()> {
    let mut fixture: TestFixture = TestFixture::new();
    let mut client: SharedDnsClient = fixture.dns_client(DnsConfig::default());
    client.add_default_servers();

    crate::ensure_eq!(client.query("aaa.example", false), Err(NetworkStatus::Retry));
    fixture.platform.advance(8);
    crate::ensure_eq!(client.query("bbb.example", false), Err(NetworkStatus::Retry));
    fixture.platform.advance(8);
    crate::ensure_eq!(client.query("ccc.example", false), Err(NetworkStatus::Retry));

    let cached: Vec<&str> = ["aaa.example", "bbb.example", "ccc.example"]
        .into_iter()
        .filter(|dns_name| {
            let encoded_name: Vec<u8> = name::encode(dns_name).unwrap_or_default();
            client
                .dns_cache
                .iter()
                .any(|buffer| name::matches_at(buffer, DNS_CACHE_ENTRY_SIZE, &encoded_name))
        })
        .collect();
    crate::ensure_eq!(cached, vec!["bbb.example", "ccc.example"]);
    Ok(())
}

/// Tests that lease supplied DNS servers are installed in lease order.
#[test]
fn dhcp_servers_feed_server_list() -> Result<()> {
    let fixture: TestFixture = TestFixture::new();
    let mut client: SharedDnsClient = fixture.dns_client(DnsConfig::default());
    let lease: [Ipv4Addr; 2] = [Ipv4Addr::new(10, 0, 0, 53), Ipv4Addr::new(10, 0, 1, 53)];
    let mut dhcp: SharedTestDhcp = SharedTestDhcp::new(false);
    dhcp.set_dns_servers(&lease);

    // Without a lease no servers are installed.
    crate::ensure_eq!(client.add_dhcp_servers(&dhcp), false);
    crate::ensure_eq!(client.servers.is_empty(), true);

    dhcp.set_ready(true);
    crate::ensure_eq!(client.add_dhcp_servers(&dhcp), true);
    let addresses: Vec<IpAddr> = client.servers.iter().map(|server| server.address()).collect();
    crate::ensure_eq!(addresses, vec![IpAddr::V4(lease[0]), IpAddr::V4(lease[1])]);

    // Installing the same lease again keeps the order stable.
    crate::ensure_eq!(client.add_dhcp_servers(&dhcp), true);
    let addresses: Vec<IpAddr> = client.servers.iter().map(|server| server.address()).collect();
    crate::ensure_eq!(addresses, vec![IpAddr::V4(lease[0]), IpAddr::V4(lease[1])]);

    // An empty lease reports no installation.
    dhcp.set_dns_servers(&[]);
    crate::ensure_eq!(client.add_dhcp_servers(&dhcp), false);
    Ok(())
}

/// Tests that a cache hit of the wrong address flavour does not refresh
/// the retention period of the stored entry.
#[test]
fn flavour_mismatch_keeps_retention() -> Result<()> {
    let mut fixture: TestFixture = TestFixture::new();
    let config: DnsConfig = DnsConfig::new(None, None, None, Some(true));
    let mut client: SharedDnsClient = fixture.dns_client(config);
    client.add_default_servers();
    crate::ensure_eq!(client.query("example.com", false), Err(NetworkStatus::Retry));

    // Mark the entry resolved so it can be served from the cache.
    let mut entry: DnsCacheEntry = match DnsCacheEntry::load(&client.dns_cache[0]) {
        Some(entry) => entry,
        None => anyhow::bail!("an entry should have been allocated"),
    };
    entry.state = DnsEntryState::Valid;
    entry.resolved_addr[0..4].copy_from_slice(&[93, 184, 216, 34]);
    crate::ensure_eq!(entry.store(&mut client.dns_cache[0]), true);
    let expiry_before: u32 = entry.expiry_tick;

    // A lookup of the other address flavour leaves the expiry untouched.
    fixture.platform.advance(1024);
    crate::ensure_eq!(client.query("example.com", true), Err(NetworkStatus::NotValid));
    let entry: DnsCacheEntry = match DnsCacheEntry::load(&client.dns_cache[0]) {
        Some(entry) => entry,
        None => anyhow::bail!("the entry should still be cached"),
    };
    crate::ensure_eq!(entry.expiry_tick, expiry_before);

    // A served hit refreshes it.
    crate::ensure_eq!(
        client.query("example.com", false),
        Ok(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)))
    );
    let entry: DnsCacheEntry = match DnsCacheEntry::load(&client.dns_cache[0]) {
        Some(entry) => entry,
        None => anyhow::bail!("the entry should still be cached"),
    };
    crate::ensure_eq!(entry.expiry_tick, expiry_before.wrapping_add(1024));
    Ok(())
}

/// Tests query precondition failures.
#[test]
fn query_preconditions() -> Result<()> {
    let fixture: TestFixture = TestFixture::new();
    let mut client: SharedDnsClient = fixture.dns_client(DnsConfig::default());

    // No configured servers.
    crate::ensure_eq!(client.query("example.com", false), Err(NetworkStatus::NetworkDown));
    client.add_default_servers();

    // IPv6 lookups need IPv6 support enabled.
    crate::ensure_eq!(client.query("example.com", true), Err(NetworkStatus::Unsupported));

    // Malformed names are rejected before touching the cache.
    crate::ensure_eq!(client.query("bad..name", false), Err(NetworkStatus::NotValid));

    // Physical link down.
    let mut stack: SharedTestStack = fixture.stack.clone();
    stack.set_phy_link_up(false);
    crate::ensure_eq!(client.query("example.com", false), Err(NetworkStatus::NetworkDown));
    Ok(())
}
