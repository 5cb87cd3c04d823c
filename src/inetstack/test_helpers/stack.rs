// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    memory::{
        Buffer,
        SharedMemoryPool,
    },
    network::{
        socket::{
            DhcpClient,
            SocketStack,
        },
        types::{
            NetworkStatus,
            NotifyCallback,
            SocketId,
            StackNotify,
        },
    },
    scheduler::{
        SharedScheduler,
        TaskHandle,
    },
    SharedObject,
};
use ::std::{
    collections::{
        HashMap,
        VecDeque,
    },
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

/// Captured outbound datagram.
#[derive(Clone, Debug)]
pub struct UdpSendRecord {
    pub socket: SocketId,
    pub remote_addr: IpAddr,
    pub remote_port: u16,
    pub bytes: Vec<u8>,
}

/// Captured connection request.
#[derive(Clone, Copy, Debug)]
pub struct TcpConnectRecord {
    pub socket: SocketId,
    pub remote_addr: IpAddr,
    pub remote_port: u16,
}

/// Per-socket state held by the scripted socket driver.
struct TestSocket {
    is_ipv6: bool,
    local_port: u16,
    app_task: TaskHandle,
    notify: NotifyCallback,
    udp_inbound: VecDeque<(IpAddr, u16, Vec<u8>)>,
    tcp_inbound: VecDeque<Vec<u8>>,
}

/// Scripted socket driver. Outbound traffic is captured for inspection and
/// inbound traffic is queued by the test. Stack notifications are delivered
/// through the registered callbacks and resume the application task, the
/// way a socket driver would.
pub struct TestStack {
    pool: SharedMemoryPool,
    scheduler: SharedScheduler,
    phy_link_up: bool,
    open_fails: bool,
    connect_status: NetworkStatus,
    send_status: NetworkStatus,
    close_status: NetworkStatus,
    next_socket: u32,
    sockets: HashMap<u32, TestSocket>,
    udp_sent: Vec<UdpSendRecord>,
    tcp_sent: Vec<(SocketId, Vec<u8>)>,
    connect_requests: Vec<TcpConnectRecord>,
    last_opened: Option<SocketId>,
}

#[derive(Clone)]
pub struct SharedTestStack(SharedObject<TestStack>);

/// Scripted DHCP client.
pub struct TestDhcp {
    ready: bool,
    dns_servers: Vec<Ipv4Addr>,
}

#[derive(Clone)]
pub struct SharedTestDhcp(SharedObject<TestDhcp>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl SharedTestStack {
    pub fn new(scheduler: SharedScheduler, pool: SharedMemoryPool) -> Self {
        Self(SharedObject::new(TestStack {
            pool,
            scheduler,
            phy_link_up: true,
            open_fails: false,
            connect_status: NetworkStatus::Success,
            send_status: NetworkStatus::Success,
            close_status: NetworkStatus::Success,
            next_socket: 1,
            sockets: HashMap::new(),
            udp_sent: Vec::new(),
            tcp_sent: Vec::new(),
            connect_requests: Vec::new(),
            last_opened: None,
        }))
    }
}

impl TestStack {
    pub fn set_phy_link_up(&mut self, phy_link_up: bool) {
        self.phy_link_up = phy_link_up;
    }

    pub fn set_open_fails(&mut self, open_fails: bool) {
        self.open_fails = open_fails;
    }

    pub fn set_connect_status(&mut self, status: NetworkStatus) {
        self.connect_status = status;
    }

    pub fn set_send_status(&mut self, status: NetworkStatus) {
        self.send_status = status;
    }

    pub fn set_close_status(&mut self, status: NetworkStatus) {
        self.close_status = status;
    }

    /// Queues an inbound datagram on the given socket.
    pub fn queue_udp_datagram(&mut self, socket: SocketId, remote_addr: IpAddr, remote_port: u16, bytes: &[u8]) {
        if let Some(socket_state) = self.sockets.get_mut(&u32::from(socket)) {
            socket_state.udp_inbound.push_back((remote_addr, remote_port, bytes.to_vec()));
        }
    }

    /// Queues inbound connection data on the given socket.
    pub fn queue_tcp_data(&mut self, socket: SocketId, bytes: &[u8]) {
        if let Some(socket_state) = self.sockets.get_mut(&u32::from(socket)) {
            socket_state.tcp_inbound.push_back(bytes.to_vec());
        }
    }

    /// Delivers a stack notification to the socket's registered callback
    /// and resumes its application task.
    pub fn notify(&mut self, socket: SocketId, notification: StackNotify) {
        let mut scheduler: SharedScheduler = self.scheduler.clone();
        if let Some(socket_state) = self.sockets.get_mut(&u32::from(socket)) {
            let app_task: TaskHandle = socket_state.app_task;
            (socket_state.notify)(notification);
            scheduler.resume(app_task);
        }
    }

    /// Completes a pending TCP close by delivering the closed notification
    /// and releasing the socket.
    pub fn complete_tcp_close(&mut self, socket: SocketId) {
        self.notify(socket, StackNotify::TcpSocketClosed);
        self.sockets.remove(&u32::from(socket));
    }

    pub fn udp_sent(&self) -> Vec<UdpSendRecord> {
        self.udp_sent.clone()
    }

    pub fn tcp_sent(&self) -> Vec<(SocketId, Vec<u8>)> {
        self.tcp_sent.clone()
    }

    pub fn connect_requests(&self) -> Vec<TcpConnectRecord> {
        self.connect_requests.clone()
    }

    pub fn last_opened(&self) -> Option<SocketId> {
        self.last_opened
    }

    pub fn open_socket_count(&self) -> usize {
        self.sockets.len()
    }

    /// Returns the address family and local port of an open socket.
    pub fn socket_info(&self, socket: SocketId) -> Option<(bool, u16)> {
        self.sockets
            .get(&u32::from(socket))
            .map(|socket_state| (socket_state.is_ipv6, socket_state.local_port))
    }

    fn open_socket(
        &mut self,
        is_ipv6: bool,
        local_port: u16,
        app_task: TaskHandle,
        notify: NotifyCallback,
    ) -> Option<SocketId> {
        if self.open_fails {
            return None;
        }
        let socket: SocketId = SocketId::from(self.next_socket);
        self.next_socket += 1;
        self.sockets.insert(
            u32::from(socket),
            TestSocket {
                is_ipv6,
                local_port,
                app_task,
                notify,
                udp_inbound: VecDeque::new(),
                tcp_inbound: VecDeque::new(),
            },
        );
        self.last_opened = Some(socket);
        Some(socket)
    }

    fn buffer_bytes(payload: &Buffer) -> Vec<u8> {
        let mut bytes: Vec<u8> = vec![0; payload.size()];
        payload.read(0, &mut bytes);
        bytes
    }
}

impl SharedTestDhcp {
    pub fn new(ready: bool) -> Self {
        Self(SharedObject::new(TestDhcp {
            ready,
            dns_servers: Vec::new(),
        }))
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.0.deref_mut().ready = ready;
    }

    /// Scripts the DNS servers reported with the lease.
    pub fn set_dns_servers(&mut self, servers: &[Ipv4Addr]) {
        self.0.deref_mut().dns_servers = servers.to_vec();
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl SocketStack for SharedTestStack {
    fn phy_link_is_up(&self) -> bool {
        self.phy_link_up
    }

    fn udp_open(
        &mut self,
        use_ipv6: bool,
        local_port: u16,
        app_task: TaskHandle,
        notify: NotifyCallback,
    ) -> Option<SocketId> {
        self.deref_mut().open_socket(use_ipv6, local_port, app_task, notify)
    }

    fn udp_send_to(
        &mut self,
        socket: SocketId,
        remote_addr: IpAddr,
        remote_port: u16,
        payload: &mut Buffer,
    ) -> NetworkStatus {
        if !self.sockets.contains_key(&u32::from(socket)) {
            return NetworkStatus::NotOpen;
        }
        if self.send_status != NetworkStatus::Success {
            return self.send_status;
        }
        let record: UdpSendRecord = UdpSendRecord {
            socket,
            remote_addr,
            remote_port,
            bytes: TestStack::buffer_bytes(payload),
        };
        payload.reset(0);
        self.deref_mut().udp_sent.push(record);
        NetworkStatus::Success
    }

    fn udp_receive_from(&mut self, socket: SocketId) -> Result<(IpAddr, u16, Buffer), NetworkStatus> {
        let pool: SharedMemoryPool = self.pool.clone();
        let socket_state: &mut TestSocket = match self.deref_mut().sockets.get_mut(&u32::from(socket)) {
            Some(socket_state) => socket_state,
            None => return Err(NetworkStatus::NotOpen),
        };
        let (remote_addr, remote_port, bytes): (IpAddr, u16, Vec<u8>) = match socket_state.udp_inbound.pop_front() {
            Some(datagram) => datagram,
            None => return Err(NetworkStatus::Retry),
        };
        let mut payload: Buffer = Buffer::new(pool);
        if !payload.append(&bytes) {
            return Err(NetworkStatus::Retry);
        }
        Ok((remote_addr, remote_port, payload))
    }

    fn udp_close(&mut self, socket: SocketId) -> NetworkStatus {
        let status: NetworkStatus = self.close_status;
        if status == NetworkStatus::Success {
            self.deref_mut().sockets.remove(&u32::from(socket));
        }
        status
    }

    fn tcp_open(
        &mut self,
        use_ipv6: bool,
        local_port: u16,
        app_task: TaskHandle,
        notify: NotifyCallback,
    ) -> Option<SocketId> {
        self.deref_mut().open_socket(use_ipv6, local_port, app_task, notify)
    }

    fn tcp_connect(&mut self, socket: SocketId, remote_addr: IpAddr, remote_port: u16) -> NetworkStatus {
        if !self.sockets.contains_key(&u32::from(socket)) {
            return NetworkStatus::NotOpen;
        }
        self.deref_mut().connect_requests.push(TcpConnectRecord {
            socket,
            remote_addr,
            remote_port,
        });
        self.connect_status
    }

    fn tcp_send(&mut self, socket: SocketId, payload: &mut Buffer) -> NetworkStatus {
        if !self.sockets.contains_key(&u32::from(socket)) {
            return NetworkStatus::NotOpen;
        }
        if self.send_status != NetworkStatus::Success {
            return self.send_status;
        }
        let bytes: Vec<u8> = TestStack::buffer_bytes(payload);
        payload.reset(0);
        self.deref_mut().tcp_sent.push((socket, bytes));
        NetworkStatus::Success
    }

    fn tcp_receive(&mut self, socket: SocketId, payload: &mut Buffer) -> NetworkStatus {
        let socket_state: &mut TestSocket = match self.deref_mut().sockets.get_mut(&u32::from(socket)) {
            Some(socket_state) => socket_state,
            None => return NetworkStatus::NotOpen,
        };
        let bytes: Vec<u8> = match socket_state.tcp_inbound.pop_front() {
            Some(bytes) => bytes,
            None => return NetworkStatus::Retry,
        };
        if payload.reset(bytes.len()) && payload.write(0, &bytes) {
            NetworkStatus::Success
        } else {
            NetworkStatus::Retry
        }
    }

    // A TCP close completes asynchronously. The socket stays open until the
    // test delivers the closed notification with [TestStack::complete_tcp_close].
    fn tcp_close(&mut self, socket: SocketId) -> NetworkStatus {
        if !self.sockets.contains_key(&u32::from(socket)) {
            return NetworkStatus::NotOpen;
        }
        self.close_status
    }
}

impl DhcpClient for SharedTestDhcp {
    fn ready(&self) -> bool {
        self.0.ready
    }

    fn dns_servers(&self) -> &[Ipv4Addr] {
        &self.0.dns_servers
    }
}

impl Deref for SharedTestStack {
    type Target = TestStack;

    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

impl DerefMut for SharedTestStack {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.deref_mut()
    }
}
