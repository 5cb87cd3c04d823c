// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Generic network links.
//!
//! A network link is an abstract point to point connection which hides the
//! transport details from higher layer protocol components.

pub mod tcp;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::tcp::SharedTcpLink;

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    memory::Buffer,
    network::types::NetworkStatus,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Connection state notifications delivered to the link client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkNotify {
    /// The link connection has been established.
    Connected,
    /// The link connection has been closed, locally or by the remote host.
    Disconnected,
}

/// Link notification callback.
pub type LinkNotifyCallback = Box<dyn FnMut(LinkNotify)>;

//======================================================================================================================
// Traits
//======================================================================================================================

/// Abstract point to point network connection.
pub trait NetworkLink {
    /// Initiates the link connection process. Completion is reported
    /// through the notification callback.
    fn connect(&mut self) -> NetworkStatus;

    /// Initiates the link disconnection process. Completion is reported
    /// through the notification callback.
    fn disconnect(&mut self) -> NetworkStatus;

    /// Sends the buffer contents over the link. The buffer is drained on
    /// success and left untouched otherwise.
    fn send(&mut self, payload: &mut Buffer) -> NetworkStatus;

    /// Receives queued link data into the given buffer, replacing its
    /// contents. Data queued before a remote close can still be drained.
    fn receive(&mut self, payload: &mut Buffer) -> NetworkStatus;

    /// Reports the current link status. Transitional states are reported
    /// as `Retry`.
    fn monitor(&self) -> NetworkStatus;

    /// Assigns the notification callback for connection state changes.
    fn set_notify_handler(&mut self, notify: LinkNotifyCallback);
}
