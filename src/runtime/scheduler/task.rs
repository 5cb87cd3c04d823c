// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::ticks::ms_to_ticks;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Interval in ticks at which background tasks are re-run when the scheduler
/// has no foreground work.
pub const BACKGROUND_TASK_INTERVAL: u32 = 10;

/// Largest representable task delay in ticks.
const MAX_TASK_DELAY: u32 = 0x7fff_ffff;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Status returned by a task tick function to request its next activation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    /// Re-run the task as soon as possible.
    RunImmediate,
    /// Re-run the task opportunistically, without waking the device.
    RunBackground,
    /// Re-run the task after the given number of ticks, waking the device
    /// from idle if required.
    RunLater(u32),
    /// Re-run the task at the first opportunity after the given number of
    /// ticks, without waking the device.
    RunAfter(u32),
    /// Suspend the task until it is explicitly resumed.
    Suspend,
}

/// Opaque handle to a task registered with the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskHandle {
    key: usize,
}

/// Scheduler-side activation state of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum RunState {
    /// Queued for immediate execution.
    Ready,
    /// Tick function currently executing.
    Active,
    /// Waiting on the timer queue.
    Scheduled,
    /// Waiting on the background queue.
    Background,
    /// Waiting for an explicit resume.
    Suspended,
}

/// Per-task bookkeeping held in the scheduler task arena.
pub(super) struct TaskControl {
    /// Task name used for diagnostics.
    pub name: &'static str,
    /// Tick function. Taken out of the arena for the duration of each call.
    pub tick: Option<Box<dyn FnMut() -> TaskStatus>>,
    /// Current activation state.
    pub run_state: RunState,
    /// Tick at which a Scheduled or Background task becomes due.
    pub wake_tick: u32,
    /// Set when the task is resumed while its tick function is running.
    pub resume_pending: bool,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl TaskStatus {
    /// Requests re-activation after a delay given in milliseconds.
    pub fn run_later_ms(ms: u32) -> Self {
        Self::RunLater(ms_to_ticks(ms))
    }

    /// Requests opportunistic re-activation after a delay given in
    /// milliseconds.
    pub fn run_after_ms(ms: u32) -> Self {
        Self::RunAfter(ms_to_ticks(ms))
    }

    /// Clamps a requested delay to the valid range of 1 to 2^31-1 ticks.
    pub(super) fn clamp_delay(delay: u32) -> u32 {
        delay.clamp(1, MAX_TASK_DELAY)
    }

    /// Clamps any embedded delay to the valid range.
    fn normalise(self) -> Self {
        match self {
            Self::RunLater(delay) => Self::RunLater(Self::clamp_delay(delay)),
            Self::RunAfter(delay) => Self::RunAfter(Self::clamp_delay(delay)),
            other => other,
        }
    }

    /// Splits the status into its requested delay and background flag.
    /// Suspended tasks have no delay.
    fn delay(&self) -> Option<(u32, bool)> {
        match self {
            Self::RunImmediate => Some((0, false)),
            Self::RunLater(delay) => Some((Self::clamp_delay(*delay), false)),
            Self::RunBackground => Some((BACKGROUND_TASK_INTERVAL, true)),
            Self::RunAfter(delay) => Some((Self::clamp_delay(*delay), true)),
            Self::Suspend => None,
        }
    }
}

impl TaskHandle {
    pub(super) fn new(key: usize) -> Self {
        Self { key }
    }

    pub(super) fn key(&self) -> usize {
        self.key
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Combines two task status requests into the one that must be honoured
/// first. A suspend request yields to the other status. When a foreground
/// request meets a background request, both are compared as foreground so
/// the combined status can wake the device. Ties keep the first operand.
pub fn prioritise(status_a: TaskStatus, status_b: TaskStatus) -> TaskStatus {
    let status_a: TaskStatus = status_a.normalise();
    let status_b: TaskStatus = status_b.normalise();
    let (delay_a, background_a) = match status_a.delay() {
        Some(parts) => parts,
        None => return status_b,
    };
    let (delay_b, background_b) = match status_b.delay() {
        Some(parts) => parts,
        None => return status_a,
    };
    if background_a != background_b {
        if delay_a <= delay_b {
            demote_to_foreground(status_a, delay_a)
        } else {
            demote_to_foreground(status_b, delay_b)
        }
    } else if delay_a <= delay_b {
        status_a
    } else {
        status_b
    }
}

/// Reinterprets a task status as a foreground request with the given delay.
fn demote_to_foreground(status: TaskStatus, delay: u32) -> TaskStatus {
    match status {
        TaskStatus::RunBackground | TaskStatus::RunAfter(_) => TaskStatus::RunLater(delay),
        other => other,
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::{
        prioritise,
        TaskStatus,
        BACKGROUND_TASK_INTERVAL,
    };
    use ::anyhow::Result;

    /// Tests that a suspend request always yields to the other operand.
    #[test]
    fn prioritise_suspend_yields() -> Result<()> {
        crate::ensure_eq!(prioritise(TaskStatus::Suspend, TaskStatus::RunLater(50)), TaskStatus::RunLater(50));
        crate::ensure_eq!(prioritise(TaskStatus::RunBackground, TaskStatus::Suspend), TaskStatus::RunBackground);
        crate::ensure_eq!(prioritise(TaskStatus::Suspend, TaskStatus::Suspend), TaskStatus::Suspend);
        Ok(())
    }

    /// Tests that the earlier of two delays wins and that ties keep the
    /// first operand.
    #[test]
    fn prioritise_selects_earliest() -> Result<()> {
        crate::ensure_eq!(
            prioritise(TaskStatus::RunLater(100), TaskStatus::RunLater(20)),
            TaskStatus::RunLater(20)
        );
        crate::ensure_eq!(
            prioritise(TaskStatus::RunImmediate, TaskStatus::RunLater(1)),
            TaskStatus::RunImmediate
        );
        crate::ensure_eq!(
            prioritise(TaskStatus::RunLater(20), TaskStatus::RunLater(20)),
            TaskStatus::RunLater(20)
        );
        crate::ensure_eq!(
            prioritise(TaskStatus::RunAfter(20), TaskStatus::RunAfter(50)),
            TaskStatus::RunAfter(20)
        );
        Ok(())
    }

    /// Tests that mixing foreground and background requests produces a
    /// foreground status, so the combined request can wake the device.
    #[test]
    fn prioritise_mixed_queues() -> Result<()> {
        crate::ensure_eq!(
            prioritise(TaskStatus::RunAfter(5), TaskStatus::RunLater(100)),
            TaskStatus::RunLater(5)
        );
        crate::ensure_eq!(
            prioritise(TaskStatus::RunLater(100), TaskStatus::RunBackground),
            TaskStatus::RunLater(BACKGROUND_TASK_INTERVAL)
        );
        Ok(())
    }

    /// Tests that out-of-range delays are clamped.
    #[test]
    fn prioritise_clamps_delays() -> Result<()> {
        crate::ensure_eq!(
            prioritise(TaskStatus::RunLater(0), TaskStatus::RunLater(5)),
            TaskStatus::RunLater(1)
        );
        crate::ensure_eq!(
            prioritise(TaskStatus::RunLater(u32::MAX), TaskStatus::Suspend),
            TaskStatus::RunLater(0x7fff_ffff)
        );
        Ok(())
    }
}
