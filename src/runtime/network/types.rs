// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::fmt;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Socket identifier issued by the socket driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SocketId(u32);

/// Outcome vocabulary shared by all network operations. Protocol level
/// results are always expressed with these values rather than with the
/// runtime failure type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkStatus {
    /// The operation completed.
    Success,
    /// The link or socket is connected.
    Connected,
    /// The link or socket is not connected.
    NotConnected,
    /// The socket has not been opened.
    NotOpen,
    /// The request is malformed or cannot be satisfied.
    NotValid,
    /// The operation is in progress and should be retried later.
    Retry,
    /// The payload exceeds the supported size.
    Oversized,
    /// The underlying network is unavailable.
    NetworkDown,
    /// The operation timed out.
    Timeout,
    /// The requested feature is not supported.
    Unsupported,
    /// The socket driver reported an internal error.
    DriverFailure,
}

/// Notifications delivered by the socket driver to the application task
/// registered with the socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackNotify {
    PhyLinkUp,
    PhyLinkDown,
    UdpSocketOpened,
    UdpSocketClosed,
    UdpMessageSent,
    UdpMessageReceived,
    UdpArpTimeout,
    TcpSocketOpened,
    TcpSocketConnected,
    TcpSocketClosed,
    TcpConnectTimeout,
    TcpDataReceived,
}

/// Socket notification callback.
pub type NotifyCallback = Box<dyn FnMut(StackNotify)>;

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl SocketId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl From<u32> for SocketId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<SocketId> for u32 {
    fn from(id: SocketId) -> Self {
        id.0
    }
}

impl fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
