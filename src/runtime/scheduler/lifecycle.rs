// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Structures
//======================================================================================================================

/// Scheduler lifecycle notifications delivered to registered listeners.
/// Listeners may veto the power state transitions by returning false from
/// the corresponding Enter notification; the return value is ignored for
/// all other notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The scheduler main loop is about to start.
    SchedulerStartup,
    /// The scheduler main loop has terminated.
    SchedulerShutdown,
    /// The device is about to enter its power saving state.
    EnterPowerSave,
    /// The device has left its power saving state.
    ExitPowerSave,
    /// The device is about to enter its deep sleep state.
    EnterDeepSleep,
    /// The device has left its deep sleep state.
    ExitDeepSleep,
}

/// Lifecycle listener callback.
pub type LifecycleListener = Box<dyn FnMut(LifecycleEvent) -> bool>;
