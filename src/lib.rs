// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![deny(clippy::all)]

#[macro_use]
extern crate log;

pub mod inetstack;
pub mod runtime;

pub use crate::inetstack::{
    dns::SharedDnsClient,
    link::{
        LinkNotify,
        NetworkLink,
        SharedTcpLink,
    },
};
pub use crate::runtime::{
    fail::Fail,
    memory::{
        Buffer,
        SharedMemoryPool,
    },
    network::types::{
        NetworkStatus,
        SocketId,
        StackNotify,
    },
    scheduler::{
        SharedScheduler,
        TaskHandle,
        TaskStatus,
    },
};

/// Asserts equality in unit tests, propagating a test failure instead of panicking.
#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr $(,)?) => {{
        match (&$left, &$right) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    ::anyhow::bail!(
                        "ensure_eq failed: `{}` == `{}` ({:?} != {:?})",
                        stringify!($left),
                        stringify!($right),
                        left_val,
                        right_val
                    );
                }
            },
        }
    }};
}

#[macro_export]
macro_rules! ensure_neq {
    ($left:expr, $right:expr $(,)?) => {{
        match (&$left, &$right) {
            (left_val, right_val) => {
                if *left_val == *right_val {
                    ::anyhow::bail!(
                        "ensure_neq failed: `{}` != `{}` ({:?} == {:?})",
                        stringify!($left),
                        stringify!($right),
                        left_val,
                        right_val
                    );
                }
            },
        }
    }};
}
