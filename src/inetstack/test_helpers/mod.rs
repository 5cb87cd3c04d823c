// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Scripted test doubles for the platform clock, the socket driver and the
//! DHCP client, used by the unit and integration test suites.

mod platform;
mod stack;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::{
    platform::SharedTestPlatform,
    stack::{
        SharedTestDhcp,
        SharedTestStack,
        TcpConnectRecord,
        UdpSendRecord,
    },
};

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::inetstack::dns::SharedDnsClient;
use crate::runtime::{
    memory::SharedMemoryPool,
    network::config::DnsConfig,
    scheduler::SharedScheduler,
    SharedBox,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Scheduler, pool and socket driver fixture shared by the test suites.
pub struct TestFixture {
    pub platform: SharedTestPlatform,
    pub scheduler: SharedScheduler,
    pub pool: SharedMemoryPool,
    pub stack: SharedTestStack,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl TestFixture {
    pub fn new() -> Self {
        let platform: SharedTestPlatform = SharedTestPlatform::new(0);
        let scheduler: SharedScheduler = SharedScheduler::new(Box::new(platform.clone()));
        let pool: SharedMemoryPool = SharedMemoryPool::new(64);
        let stack: SharedTestStack = SharedTestStack::new(scheduler.clone(), pool.clone());
        Self {
            platform,
            scheduler,
            pool,
            stack,
        }
    }

    /// Creates a DNS client backed by the fixture services.
    pub fn dns_client(&self, config: DnsConfig) -> SharedDnsClient {
        SharedDnsClient::new(
            config,
            self.scheduler.clone(),
            self.pool.clone(),
            SharedBox::new(Box::new(self.stack.clone())),
        )
    }

    /// Repeatedly steps the scheduler while advancing the platform clock,
    /// covering at least the given number of ticks.
    pub fn run_for(&mut self, ticks: u32) {
        let mut elapsed: u32 = 0;
        while elapsed < ticks {
            self.scheduler.step();
            self.platform.advance(8);
            elapsed += 8;
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
