// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    memory::Buffer,
    network::types::{
        NetworkStatus,
        NotifyCallback,
        SocketId,
    },
    scheduler::TaskHandle,
};
use ::std::net::{
    IpAddr,
    Ipv4Addr,
};

//======================================================================================================================
// Traits
//======================================================================================================================

/// Boundary to the asynchronous socket driver of an external TCP/IP stack.
/// Socket state changes are reported through the notification callback
/// registered at open time; the driver resumes the application task after
/// delivering a notification.
pub trait SocketStack {
    /// Reports whether the physical network link is up.
    fn phy_link_is_up(&self) -> bool;

    /// Opens a UDP socket bound to the given local port. A port of zero
    /// selects an ephemeral port.
    fn udp_open(
        &mut self,
        use_ipv6: bool,
        local_port: u16,
        app_task: TaskHandle,
        notify: NotifyCallback,
    ) -> Option<SocketId>;

    /// Sends a datagram to the given remote endpoint. The payload buffer is
    /// drained on success and left untouched otherwise.
    fn udp_send_to(&mut self, socket: SocketId, remote_addr: IpAddr, remote_port: u16, payload: &mut Buffer)
        -> NetworkStatus;

    /// Receives the next queued datagram along with its source endpoint.
    fn udp_receive_from(&mut self, socket: SocketId) -> Result<(IpAddr, u16, Buffer), NetworkStatus>;

    /// Closes a UDP socket. May report Retry if the driver cannot release
    /// the socket yet.
    fn udp_close(&mut self, socket: SocketId) -> NetworkStatus;

    /// Opens a TCP socket bound to the given local port.
    fn tcp_open(
        &mut self,
        use_ipv6: bool,
        local_port: u16,
        app_task: TaskHandle,
        notify: NotifyCallback,
    ) -> Option<SocketId>;

    /// Initiates a connection to the given remote endpoint. Completion is
    /// reported through the notification callback.
    fn tcp_connect(&mut self, socket: SocketId, remote_addr: IpAddr, remote_port: u16) -> NetworkStatus;

    /// Sends the buffer contents over the connection. The payload buffer is
    /// drained on success and left untouched otherwise.
    fn tcp_send(&mut self, socket: SocketId, payload: &mut Buffer) -> NetworkStatus;

    /// Receives queued connection data into the given buffer, replacing its
    /// contents.
    fn tcp_receive(&mut self, socket: SocketId, payload: &mut Buffer) -> NetworkStatus;

    /// Closes a TCP socket. May report Retry if the driver cannot release
    /// the socket yet.
    fn tcp_close(&mut self, socket: SocketId) -> NetworkStatus;
}

/// Boundary to the external DHCP client.
pub trait DhcpClient {
    /// Reports whether a DHCP lease has been obtained.
    fn ready(&self) -> bool;

    /// Returns the DNS server addresses supplied by the current lease, in
    /// preference order. Empty until a lease has been obtained.
    fn dns_servers(&self) -> &[Ipv4Addr];
}
