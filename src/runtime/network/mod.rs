// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

pub mod config;
pub mod socket;
pub mod types;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::{
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
};
