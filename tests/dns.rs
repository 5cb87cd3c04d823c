// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! End to end tests for the DNS client against a scripted socket driver.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::std::net::{
    IpAddr,
    Ipv4Addr,
};
use ::tickstack::{
    inetstack::{
        dns::name,
        test_helpers::{
            TestFixture,
            UdpSendRecord,
        },
    },
    runtime::network::config::DnsConfig,
    NetworkStatus,
    SharedDnsClient,
    StackNotify,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Retry interval of the default configuration in ticks.
const RETRY_INTERVAL_TICKS: u32 = 4096;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Builds a response message with a single address answer record, echoing
/// the transaction ID and question of the given query message.
fn dns_response(query: &[u8], addr: [u8; 4]) -> Vec<u8> {
    let mut response: Vec<u8> = vec![0; 12];
    response[0..2].copy_from_slice(&query[0..2]);
    response[2] = 0x81;
    response[3] = 0x80;
    response[5] = 0x01;
    response[7] = 0x01;

    // Question section echoed from the query, then one answer record with a
    // compressed name reference back to it.
    response.extend_from_slice(&query[12..]);
    response.extend_from_slice(&[0xC0, 0x0C]);
    response.extend_from_slice(&[0, 1, 0, 1]);
    response.extend_from_slice(&[0, 0, 0, 60]);
    response.extend_from_slice(&[0, 4]);
    response.extend_from_slice(&addr);
    response
}

/// Drives a name resolution to completion by answering the first query sent
/// to the scripted driver with the given address.
fn resolve(fixture: &mut TestFixture, client: &mut SharedDnsClient, dns_name: &str, addr: [u8; 4]) -> Result<IpAddr> {
    if client.query(dns_name, false) != Err(NetworkStatus::Retry) {
        anyhow::bail!("initial query should report a retry");
    }
    fixture.run_for(64);

    let sent: Vec<UdpSendRecord> = fixture.stack.udp_sent();
    let request: &UdpSendRecord = match sent.last() {
        Some(request) => request,
        None => anyhow::bail!("a query message should have been sent"),
    };
    let response: Vec<u8> = dns_response(&request.bytes, addr);
    fixture
        .stack
        .queue_udp_datagram(request.socket, request.remote_addr, request.remote_port, &response);
    fixture.stack.notify(request.socket, StackNotify::UdpMessageReceived);
    fixture.run_for(64);

    match client.query(dns_name, false) {
        Ok(resolved) => Ok(resolved),
        Err(status) => anyhow::bail!("resolution should have completed: {}", status),
    }
}

//======================================================================================================================
// Integration Tests
//======================================================================================================================

/// Tests a full resolution round trip, including query socket release once
/// the resolution completes.
#[test]
fn resolves_name_end_to_end() -> Result<()> {
    let mut fixture: TestFixture = TestFixture::new();
    let mut client: SharedDnsClient = fixture.dns_client(DnsConfig::default());
    client.add_default_servers();

    let resolved: IpAddr = resolve(&mut fixture, &mut client, "example.com", [93, 184, 216, 34])?;
    ::tickstack::ensure_eq!(resolved, IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)));

    // The first query goes to the primary server on the well known port.
    let sent: Vec<UdpSendRecord> = fixture.stack.udp_sent();
    ::tickstack::ensure_eq!(sent[0].remote_addr, IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)));
    ::tickstack::ensure_eq!(sent[0].remote_port, 53);

    // The query message carries the encoded name in its question section.
    let encoded_name: Vec<u8> = match name::encode("example.com") {
        Some(encoded_name) => encoded_name,
        None => anyhow::bail!("name should encode"),
    };
    ::tickstack::ensure_eq!(sent[0].bytes[12..12 + encoded_name.len()], encoded_name[..]);

    // With all entries resolved the query socket is released.
    ::tickstack::ensure_eq!(fixture.stack.open_socket_count(), 0);
    Ok(())
}

/// Tests that retries rotate through the configured servers and end in a
/// cached timeout once all attempts are exhausted.
#[test]
fn rotates_servers_until_timeout() -> Result<()> {
    let mut fixture: TestFixture = TestFixture::new();
    let mut client: SharedDnsClient = fixture.dns_client(DnsConfig::default());
    let server_a: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    let server_b: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
    let server_c: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3));
    client.add_server(server_a, 2);
    client.add_server(server_b, 1);
    client.add_server(server_c, 0);

    ::tickstack::ensure_eq!(client.query("example.com", false), Err(NetworkStatus::Retry));
    fixture.run_for(5 * RETRY_INTERVAL_TICKS);

    // The default configuration makes four attempts in round robin order.
    let targets: Vec<IpAddr> = fixture
        .stack
        .udp_sent()
        .iter()
        .map(|request| request.remote_addr)
        .collect();
    ::tickstack::ensure_eq!(targets, vec![server_a, server_b, server_c, server_a]);
    ::tickstack::ensure_eq!(client.query("example.com", false), Err(NetworkStatus::Timeout));
    Ok(())
}

/// Tests that cache hits refresh the retention period of valid entries and
/// that expired entries are released.
#[test]
fn cache_hit_refreshes_retention() -> Result<()> {
    let mut fixture: TestFixture = TestFixture::new();
    let mut client: SharedDnsClient = fixture.dns_client(DnsConfig::default());
    client.add_default_servers();
    let resolved: IpAddr = resolve(&mut fixture, &mut client, "example.com", [93, 184, 216, 34])?;

    // Each hit inside the 60 second retention period pushes the expiry out,
    // so the entry outlives its original retention window.
    fixture.run_for(40 * 1024);
    ::tickstack::ensure_eq!(client.query("example.com", false), Ok(resolved));
    fixture.run_for(40 * 1024);
    ::tickstack::ensure_eq!(client.query("example.com", false), Ok(resolved));

    // Without further hits the entry expires and the next query starts a
    // fresh resolution.
    fixture.run_for(70 * 1024);
    ::tickstack::ensure_eq!(client.query("example.com", false), Err(NetworkStatus::Retry));
    Ok(())
}

/// Tests that a cache entry only serves lookups of its own address flavour.
#[test]
fn cached_flavour_must_match() -> Result<()> {
    let fixture: TestFixture = TestFixture::new();
    let config: DnsConfig = DnsConfig::new(None, None, None, Some(true));
    let mut client: SharedDnsClient = fixture.dns_client(config);
    client.add_default_servers();

    ::tickstack::ensure_eq!(client.query("example.com", false), Err(NetworkStatus::Retry));
    ::tickstack::ensure_eq!(client.query("example.com", true), Err(NetworkStatus::NotValid));
    Ok(())
}
