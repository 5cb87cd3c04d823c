// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Recursive DNS client.
//!
//! Resolution requests are served from a small cache of pool backed entries.
//! A cache miss allocates an entry and hands it to the worker task, which
//! drives the per entry state machine through socket open, query send and
//! retry processing. Callers poll [SharedDnsClient::query] until it reports
//! a terminal status for the name.

pub mod cache;
pub mod message;
pub mod name;

#[cfg(test)]
mod tests;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::cache::{
    DnsCacheEntry,
    DnsEntryState,
    DNS_CACHE_ENTRY_SIZE,
};

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::inetstack::dns::message::DNS_PORT;
use crate::runtime::{
    memory::{
        Buffer,
        SharedMemoryPool,
    },
    network::{
        config::{
            DnsConfig,
            DNS_CACHE_SIZE,
            DNS_MAX_SERVERS,
        },
        socket::{
            DhcpClient,
            SocketStack,
        },
        types::{
            NetworkStatus,
            NotifyCallback,
            SocketId,
        },
    },
    scheduler::{
        prioritise,
        SharedScheduler,
        TaskHandle,
        TaskStatus,
    },
    ticks::{
        duration_to_ticks,
        tick_delta,
        tick_reached,
    },
    SharedBox,
    SharedObject,
};
use ::arrayvec::ArrayVec;
use ::rand::{
    rngs::SmallRng,
    SeedableRng,
};
use ::std::{
    net::{
        IpAddr,
        Ipv4Addr,
    },
    ops::{
        Deref,
        DerefMut,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Configured DNS server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DnsServer {
    /// Server network address.
    address: IpAddr,
    /// Selection priority. Higher values are preferred.
    priority: u8,
}

/// Recursive DNS resolver with a fixed size cache.
pub struct DnsClient {
    /// Resolver configuration descriptor.
    config: DnsConfig,
    /// Scheduler running the worker task.
    scheduler: SharedScheduler,
    /// Pool backing the cache and message buffers.
    pool: SharedMemoryPool,
    /// External TCP/IP stack socket driver.
    stack: SharedBox<dyn SocketStack>,
    /// Server list in priority order.
    servers: ArrayVec<DnsServer, DNS_MAX_SERVERS>,
    /// Cache slots. An empty buffer marks a free slot.
    dns_cache: Vec<Buffer>,
    /// Lazily opened IPv4 query socket.
    udp_socket_ipv4: Option<SocketId>,
    /// Lazily opened IPv6 query socket.
    udp_socket_ipv6: Option<SocketId>,
    /// Worker task driving the cache entry state machines.
    worker: Option<TaskHandle>,
    /// Transaction ID for the next allocated cache entry.
    next_xid: u16,
    /// Answer record selection source.
    rng: SmallRng,
}

#[derive(Clone)]
pub struct SharedDnsClient(SharedObject<DnsClient>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl DnsServer {
    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }
}

impl SharedDnsClient {
    /// Creates a DNS client and starts its worker task on the given
    /// scheduler. The server list starts out empty.
    pub fn new(
        config: DnsConfig,
        mut scheduler: SharedScheduler,
        pool: SharedMemoryPool,
        stack: SharedBox<dyn SocketStack>,
    ) -> Self {
        let seed: u64 = scheduler.random_seed();
        let dns_cache: Vec<Buffer> = (0..DNS_CACHE_SIZE).map(|_| Buffer::new(pool.clone())).collect();
        let mut client: SharedDnsClient = Self(SharedObject::new(DnsClient {
            config,
            scheduler: scheduler.clone(),
            pool,
            stack,
            servers: ArrayVec::new(),
            dns_cache,
            udp_socket_ipv4: None,
            udp_socket_ipv6: None,
            worker: None,
            next_xid: seed as u16,
            rng: SmallRng::seed_from_u64(seed),
        }));
        let mut worker_ref: SharedDnsClient = client.clone();
        let worker: TaskHandle = scheduler.start_task("dns-client", Box::new(move || worker_ref.worker_tick()));
        client.worker = Some(worker);
        client
    }
}

impl DnsClient {
    /// Installs the default primary and secondary servers from the
    /// configuration descriptor.
    pub fn add_default_servers(&mut self) {
        let [primary, secondary]: [IpAddr; 2] = self.config.get_default_servers();
        self.add_server(primary, 1);
        self.add_server(secondary, 0);
    }

    /// Installs the servers supplied by the DHCP lease, preserving the
    /// lease preference order. Reports false when no lease is held or the
    /// lease carries no servers.
    pub fn add_dhcp_servers(&mut self, dhcp: &dyn DhcpClient) -> bool {
        if !dhcp.ready() {
            return false;
        }
        let lease_servers: &[Ipv4Addr] = dhcp.dns_servers();
        for (index, address) in lease_servers.iter().enumerate() {
            // Descending priorities keep the lease order intact, since
            // equal priority insertion places new records first.
            let priority: u8 = (lease_servers.len() - index) as u8;
            self.add_server(IpAddr::V4(*address), priority);
        }
        !lease_servers.is_empty()
    }

    /// Adds a server to the list of available servers, replacing any
    /// existing record with the same address. A new record is inserted
    /// before records of equal or lower priority.
    pub fn add_server(&mut self, address: IpAddr, priority: u8) -> bool {
        self.remove_server(address);
        if matches!(address, IpAddr::V6(_)) && !self.config.get_support_ipv6() {
            return false;
        }
        if self.servers.is_full() {
            return false;
        }
        let position: usize = self
            .servers
            .iter()
            .position(|server| priority >= server.priority)
            .unwrap_or(self.servers.len());
        self.servers.insert(position, DnsServer { address, priority });
        true
    }

    /// Removes a server from the list of available servers.
    pub fn remove_server(&mut self, address: IpAddr) -> bool {
        let servers_before: usize = self.servers.len();
        self.servers.retain(|server| server.address != address);
        servers_before != self.servers.len()
    }

    /// Requests resolution of a DNS name. A resolved address is returned
    /// directly from the cache; a cache miss allocates an entry, kicks the
    /// worker task and reports `Retry`, as does an entry whose resolution
    /// is still in progress. Callers poll until a terminal status arrives.
    pub fn query(&mut self, dns_name: &str, use_ipv6: bool) -> Result<IpAddr, NetworkStatus> {
        if use_ipv6 && !self.config.get_support_ipv6() {
            return Err(NetworkStatus::Unsupported);
        }
        if !self.stack.phy_link_is_up() || self.servers.is_empty() {
            return Err(NetworkStatus::NetworkDown);
        }
        let encoded_name: Vec<u8> = match name::encode(dns_name) {
            Some(encoded_name) => encoded_name,
            None => return Err(NetworkStatus::NotValid),
        };

        // Process an existing cache entry for the name.
        let now: u32 = self.scheduler.ticks();
        let retention_ticks: u32 = duration_to_ticks(self.config.get_retention_time());
        for buffer in self.dns_cache.iter_mut() {
            let mut entry: DnsCacheEntry = match DnsCacheEntry::load(buffer) {
                Some(entry) => entry,
                None => continue,
            };
            if !name::matches_at(buffer, DNS_CACHE_ENTRY_SIZE, &encoded_name) {
                continue;
            }
            trace!("query(): cache entry 0x{:04x} hit, state {:?}", entry.transaction_id, entry.state);

            if entry.is_ipv6 != use_ipv6 {
                return Err(NetworkStatus::NotValid);
            }

            // A served hit refreshes the retention period, so the least
            // recently used entry always expires first.
            if entry.state == DnsEntryState::Valid {
                entry.expiry_tick = now.wrapping_add(retention_ticks);
                entry.store(buffer);
            }
            return match entry.state {
                DnsEntryState::Valid => Ok(entry.resolved_ip()),
                DnsEntryState::Timeout => Err(NetworkStatus::Timeout),
                DnsEntryState::NotValid => Err(NetworkStatus::NotValid),
                _ => Err(NetworkStatus::Retry),
            };
        }

        // Allocate a new cache entry and initiate the request process.
        self.alloc_entry(&encoded_name, use_ipv6, now, retention_ticks)?;
        if let Some(worker) = self.worker {
            self.scheduler.resume(worker);
        }
        Err(NetworkStatus::Retry)
    }

    /// Allocates a cache slot for a new resolution request, evicting the
    /// entry with the earliest expiry when no free slot remains.
    fn alloc_entry(
        &mut self,
        encoded_name: &[u8],
        use_ipv6: bool,
        now: u32,
        retention_ticks: u32,
    ) -> Result<(), NetworkStatus> {
        let index: usize = match self.dns_cache.iter().position(|buffer| buffer.size() < DNS_CACHE_ENTRY_SIZE) {
            Some(index) => index,
            None => {
                let mut victim: usize = 0;
                for (index, buffer) in self.dns_cache.iter().enumerate().skip(1) {
                    if let (Some(candidate), Some(current)) =
                        (DnsCacheEntry::load(buffer), DnsCacheEntry::load(&self.dns_cache[victim]))
                    {
                        if tick_delta(candidate.expiry_tick, current.expiry_tick) < 0 {
                            victim = index;
                        }
                    }
                }
                victim
            },
        };

        let entry: DnsCacheEntry =
            DnsCacheEntry::new(self.next_xid, use_ipv6, now.wrapping_add(retention_ticks), now);
        self.next_xid = self.next_xid.wrapping_add(1);

        let buffer: &mut Buffer = &mut self.dns_cache[index];
        if !buffer.reset(DNS_CACHE_ENTRY_SIZE) || !buffer.append(encoded_name) {
            buffer.reset(0);
            return Err(NetworkStatus::Retry);
        }
        entry.store(buffer);
        debug!("alloc_entry(): cache entry 0x{:04x} allocated in slot {}", entry.transaction_id, index);
        Ok(())
    }

    /// Main worker task loop. Processes inbound responses, then runs each
    /// cache entry state machine, then releases idle query sockets.
    fn worker_tick(&mut self) -> TaskStatus {
        // Without a network or a server list no progress can be made, so
        // the cache is cleared and the worker sleeps until the next query.
        if !self.stack.phy_link_is_up() || self.servers.is_empty() {
            for buffer in self.dns_cache.iter_mut() {
                buffer.reset(0);
            }
            return TaskStatus::Suspend;
        }

        let mut status: TaskStatus = TaskStatus::Suspend;
        if let Some(socket) = self.udp_socket_ipv4 {
            status = prioritise(status, self.process_response(socket));
        }
        if let Some(socket) = self.udp_socket_ipv6 {
            status = prioritise(status, self.process_response(socket));
        }

        let mut sockets_in_use: bool = false;
        for index in 0..self.dns_cache.len() {
            status = prioritise(status, self.process_entry(index, &mut sockets_in_use));
        }

        if !sockets_in_use {
            if let Some(socket) = self.udp_socket_ipv4 {
                if self.stack.udp_close(socket) != NetworkStatus::Retry {
                    self.udp_socket_ipv4 = None;
                }
            }
            if let Some(socket) = self.udp_socket_ipv6 {
                if self.stack.udp_close(socket) != NetworkStatus::Retry {
                    self.udp_socket_ipv6 = None;
                }
            }
        }
        status
    }

    /// Processes the next response datagram on the given socket, if any.
    /// Responses are matched on the transaction ID alone. The datagram
    /// source address is not checked, since a forged response would carry a
    /// forged source address as well.
    fn process_response(&mut self, socket: SocketId) -> TaskStatus {
        let (_, _, payload): (IpAddr, u16, Buffer) = match self.stack.udp_receive_from(socket) {
            Ok(datagram) => datagram,
            Err(_) => return TaskStatus::Suspend,
        };
        let mut xid_raw: [u8; 2] = [0; 2];
        if !payload.read(0, &mut xid_raw) {
            return TaskStatus::RunImmediate;
        }
        let xid: u16 = u16::from_ne_bytes(xid_raw);

        let index: usize = match self.dns_cache.iter().position(|buffer| {
            matches!(DnsCacheEntry::load(buffer), Some(entry) if entry.transaction_id == xid)
        }) {
            Some(index) => index,
            None => return TaskStatus::RunImmediate,
        };
        let mut entry: DnsCacheEntry = match DnsCacheEntry::load(&self.dns_cache[index]) {
            Some(entry) => entry,
            None => return TaskStatus::RunImmediate,
        };

        let stored_name: Vec<u8> = Self::stored_name(&self.dns_cache[index]);
        match message::check_response(&payload, &stored_name, entry.is_ipv6) {
            message::ResponseCheck::Answers { count, offset } => {
                if let Some(resolved_addr) = message::scan_answers(&payload, offset, count, entry.is_ipv6, &mut self.rng)
                {
                    entry.resolved_addr = resolved_addr;
                    entry.state = DnsEntryState::Valid;
                    entry.store(&mut self.dns_cache[index]);
                    debug!("process_response(): cache entry 0x{:04x} resolved", entry.transaction_id);
                }
            },
            message::ResponseCheck::NameError | message::ResponseCheck::Invalid => {
                entry.state = DnsEntryState::NotValid;
                entry.store(&mut self.dns_cache[index]);
            },
            message::ResponseCheck::Ignore => (),
        }
        TaskStatus::RunImmediate
    }

    /// Runs the state machine for a single cache entry.
    fn process_entry(&mut self, index: usize, sockets_in_use: &mut bool) -> TaskStatus {
        let mut entry: DnsCacheEntry = match DnsCacheEntry::load(&self.dns_cache[index]) {
            Some(entry) => entry,
            None => return TaskStatus::Suspend,
        };
        let now: u32 = self.scheduler.ticks();
        let status: TaskStatus = match entry.state {

            // Open the query socket for the selected server address family.
            DnsEntryState::Open => {
                *sockets_in_use = true;
                match self.select_server(entry.retry_count) {
                    Some(server) => {
                        if self.ensure_socket(matches!(server.address, IpAddr::V6(_))).is_some() {
                            entry.state = DnsEntryState::Request;
                        }
                        TaskStatus::run_later_ms(10)
                    },
                    None => {
                        entry.state = DnsEntryState::NotValid;
                        TaskStatus::RunImmediate
                    },
                }
            },

            // Format and send the query message, then start the retry timer.
            DnsEntryState::Request => {
                *sockets_in_use = true;
                match self.select_server(entry.retry_count) {
                    Some(server) => {
                        if self.send_request(index, &entry, server) {
                            entry.retry_tick = now.wrapping_add(duration_to_ticks(self.config.get_retry_interval()));
                            entry.state = DnsEntryState::Wait;
                        }
                        TaskStatus::run_later_ms(10)
                    },
                    None => {
                        entry.state = DnsEntryState::NotValid;
                        TaskStatus::RunImmediate
                    },
                }
            },

            // Wait for a response until the retry timer expires, then move
            // on to the next server in the round robin sequence.
            DnsEntryState::Wait => {
                *sockets_in_use = true;
                if tick_reached(now, entry.retry_tick) {
                    entry.retry_count += 1;
                    entry.state = if entry.retry_count > self.config.get_retry_count() {
                        warn!("process_entry(): cache entry 0x{:04x} timed out", entry.transaction_id);
                        DnsEntryState::Timeout
                    } else {
                        DnsEntryState::Request
                    };
                    TaskStatus::RunImmediate
                } else {
                    TaskStatus::RunLater(tick_delta(entry.retry_tick, now) as u32)
                }
            },

            // Terminal states persist until the retention period elapses.
            DnsEntryState::Valid | DnsEntryState::Timeout | DnsEntryState::NotValid => {
                if tick_reached(now, entry.expiry_tick) {
                    entry.state = DnsEntryState::Expired;
                    TaskStatus::RunImmediate
                } else {
                    TaskStatus::RunLater(tick_delta(entry.expiry_tick, now) as u32)
                }
            },

            // Release the cache slot.
            DnsEntryState::Expired => {
                self.dns_cache[index].reset(0);
                return TaskStatus::Suspend;
            },
        };
        entry.store(&mut self.dns_cache[index]);
        status
    }

    /// Formats and sends a query message for the given cache entry.
    fn send_request(&mut self, index: usize, entry: &DnsCacheEntry, server: DnsServer) -> bool {
        let socket: SocketId = match self.ensure_socket(matches!(server.address, IpAddr::V6(_))) {
            Some(socket) => socket,
            None => return false,
        };
        let stored_name: Vec<u8> = Self::stored_name(&self.dns_cache[index]);
        let mut request: Buffer = match message::format_query(&self.pool, entry, &stored_name) {
            Some(request) => request,
            None => return false,
        };
        let sent: bool = self.stack.udp_send_to(socket, server.address, DNS_PORT, &mut request) == NetworkStatus::Success;
        if sent {
            debug!(
                "send_request(): cache entry 0x{:04x} query sent to {}",
                entry.transaction_id, server.address
            );
        }
        sent
    }

    /// Selects the server for the given retry attempt, cycling through the
    /// priority ordered server list so that each retry targets the next
    /// configured server.
    fn select_server(&self, retry_count: u8) -> Option<DnsServer> {
        if self.servers.is_empty() || retry_count > self.config.get_retry_count() {
            return None;
        }
        Some(self.servers[retry_count as usize % self.servers.len()])
    }

    /// Returns the query socket for the given address family, opening it on
    /// first use. Socket notifications resume the worker task.
    fn ensure_socket(&mut self, use_ipv6: bool) -> Option<SocketId> {
        let existing: Option<SocketId> = if use_ipv6 { self.udp_socket_ipv6 } else { self.udp_socket_ipv4 };
        if existing.is_some() {
            return existing;
        }
        let worker: TaskHandle = self.worker?;
        let mut scheduler: SharedScheduler = self.scheduler.clone();
        let notify: NotifyCallback = Box::new(move |_| scheduler.resume(worker));
        let socket: SocketId = self.stack.udp_open(use_ipv6, 0, worker, notify)?;
        if use_ipv6 {
            self.udp_socket_ipv6 = Some(socket);
        } else {
            self.udp_socket_ipv4 = Some(socket);
        }
        Some(socket)
    }

    /// Reads the encoded name stored after the cache entry record.
    fn stored_name(buffer: &Buffer) -> Vec<u8> {
        let mut stored_name: Vec<u8> = vec![0; buffer.size().saturating_sub(DNS_CACHE_ENTRY_SIZE)];
        buffer.read(DNS_CACHE_ENTRY_SIZE, &mut stored_name);
        stored_name
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Deref for SharedDnsClient {
    type Target = DnsClient;

    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

impl DerefMut for SharedDnsClient {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.deref_mut()
    }
}
