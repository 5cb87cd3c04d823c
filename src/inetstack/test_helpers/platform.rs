// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    ticks::Platform,
    SharedObject,
};
use ::std::ops::DerefMut;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Manually advanced platform clock for tests. Waiting in any power state
/// advances the clock by the full requested delay.
pub struct TestPlatform {
    /// Current tick counter value.
    now: u32,
    /// Requested wait delays, in order.
    waits: Vec<u32>,
}

#[derive(Clone)]
pub struct SharedTestPlatform(SharedObject<TestPlatform>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl SharedTestPlatform {
    pub fn new(now: u32) -> Self {
        Self(SharedObject::new(TestPlatform { now, waits: Vec::new() }))
    }

    /// Advances the clock by the given number of ticks.
    pub fn advance(&mut self, ticks: u32) {
        let platform: &mut TestPlatform = self.0.deref_mut();
        platform.now = platform.now.wrapping_add(ticks);
    }

    /// Returns the wait delays requested so far.
    pub fn waits(&self) -> Vec<u32> {
        self.0.waits.clone()
    }

    fn wait(&mut self, ticks: u32) {
        let platform: &mut TestPlatform = self.0.deref_mut();
        platform.waits.push(ticks);
        platform.now = platform.now.wrapping_add(ticks);
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Platform for SharedTestPlatform {
    fn ticks(&self) -> u32 {
        self.0.now
    }

    fn idle(&mut self, ticks: u32) {
        self.wait(ticks);
    }

    fn power_save(&mut self, ticks: u32) {
        self.wait(ticks);
    }

    fn deep_sleep(&mut self, ticks: u32) {
        self.wait(ticks);
    }

    fn random_seed(&mut self) -> u64 {
        0x1234_5678
    }
}
