// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Wrap-safe system tick arithmetic and the platform timing boundary.
//!
//! The tick counter is a free-running `u32` that wraps roughly every 48 days
//! at the default tick frequency. All deadline comparisons must go through
//! [`tick_delta`] or [`tick_reached`], which remain correct across the wrap
//! as long as the compared instants are within half the counter range of
//! each other.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::rand::{
    self,
    Rng,
};
use ::std::{
    thread,
    time::{
        Duration,
        Instant,
    },
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// System timer frequency in ticks per second.
pub const TICK_FREQ_HZ: u32 = 1024;

//======================================================================================================================
// Traits
//======================================================================================================================

/// Boundary to the platform timing and power management services.
pub trait Platform {
    /// Returns the current value of the free-running system tick counter.
    fn ticks(&self) -> u32;

    /// Busy waits for approximately the given number of ticks.
    fn idle(&mut self, ticks: u32);

    /// Waits for approximately the given number of ticks in a low-power state
    /// from which the platform can wake quickly.
    fn power_save(&mut self, ticks: u32);

    /// Waits for approximately the given number of ticks in the lowest
    /// available power state.
    fn deep_sleep(&mut self, ticks: u32);

    /// Returns a seed for pseudo-random number generation.
    fn random_seed(&mut self) -> u64;
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Hosted [Platform] implementation backed by the standard library clock.
pub struct HostPlatform {
    /// Reference instant for the tick counter.
    epoch: Instant,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl HostPlatform {
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Platform for HostPlatform {
    fn ticks(&self) -> u32 {
        let elapsed_ms: u128 = self.epoch.elapsed().as_millis();
        let ticks: u128 = (elapsed_ms * TICK_FREQ_HZ as u128) / 1000;
        ticks as u32
    }

    fn idle(&mut self, ticks: u32) {
        thread::sleep(ticks_to_duration(ticks));
    }

    fn power_save(&mut self, ticks: u32) {
        thread::sleep(ticks_to_duration(ticks));
    }

    fn deep_sleep(&mut self, ticks: u32) {
        thread::sleep(ticks_to_duration(ticks));
    }

    fn random_seed(&mut self) -> u64 {
        rand::thread_rng().gen()
    }
}

impl Default for HostPlatform {
    fn default() -> Self {
        Self::new()
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Converts a duration in milliseconds to the equivalent number of ticks,
/// rounding up so that a wait is never shorter than requested.
pub const fn ms_to_ticks(ms: u32) -> u32 {
    ((ms as u64) * (TICK_FREQ_HZ as u64)).div_ceil(1000) as u32
}

/// Converts a number of ticks to the equivalent duration in milliseconds.
pub const fn ticks_to_ms(ticks: u32) -> u32 {
    (((ticks as u64) * 1000) / (TICK_FREQ_HZ as u64)) as u32
}

/// Converts a duration to the equivalent number of ticks, rounding up.
pub fn duration_to_ticks(duration: Duration) -> u32 {
    ms_to_ticks(duration.as_millis() as u32)
}

/// Computes the signed difference `a - b` between two tick counter values.
/// The result is positive when `a` is later than `b`, regardless of counter
/// wrap, provided the instants are within half the counter range.
pub const fn tick_delta(a: u32, b: u32) -> i32 {
    a.wrapping_sub(b) as i32
}

/// Reports whether the tick counter has reached the given deadline.
pub const fn tick_reached(now: u32, deadline: u32) -> bool {
    tick_delta(now, deadline) >= 0
}

fn ticks_to_duration(ticks: u32) -> Duration {
    Duration::from_millis(ticks_to_ms(ticks) as u64)
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
