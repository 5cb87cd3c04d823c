// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    event::SharedEventQueue,
    logging,
    scheduler::{
        lifecycle::{
            LifecycleEvent,
            LifecycleListener,
        },
        task::{
            RunState,
            TaskControl,
            TaskHandle,
            TaskStatus,
            BACKGROUND_TASK_INTERVAL,
        },
    },
    ticks::{
        tick_delta,
        tick_reached,
        Platform,
    },
    SharedObject,
};
use ::slab::Slab;
use ::std::{
    collections::VecDeque,
    ops::{
        Deref,
        DerefMut,
    },
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Idle delays of at most this many ticks are serviced by busy waiting.
pub const STAY_AWAKE_THRESHOLD: u32 = 2;

/// Idle delays of at most this many ticks are serviced by the power saving
/// state. Longer delays use deep sleep.
pub const DEEP_SLEEP_THRESHOLD: u32 = 1024;

/// Idle delay reported when no timed task is waiting.
const IDLE_DELAY_NEVER: u32 = 0x7fff_ffff;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Cooperative tick-driven task scheduler.
pub struct Scheduler {
    /// Platform timing and power management services.
    platform: Box<dyn Platform>,
    /// Event queue drained at the top of every scheduler iteration.
    event_queue: SharedEventQueue,
    /// Task arena.
    tasks: Slab<TaskControl>,
    /// Tasks ready to run, in activation order.
    ready_queue: VecDeque<usize>,
    /// Timed tasks ordered by wake tick. Due entries wake the device.
    timer_queue: Vec<usize>,
    /// Background tasks ordered by wake tick. Due entries only run when the
    /// ready queue is empty and never wake the device.
    background_queue: Vec<usize>,
    /// Lifecycle listeners, notified newest first.
    lifecycle_listeners: Vec<LifecycleListener>,
    /// Number of outstanding stay awake requests.
    stay_awake_count: u32,
    /// Task whose tick function is currently executing.
    current_task: Option<usize>,
    /// Cleared by shutdown to terminate the main loop.
    running: bool,
    /// Busy wait ceiling in ticks.
    stay_awake_threshold: u32,
    /// Power save ceiling in ticks.
    deep_sleep_threshold: u32,
}

#[derive(Clone)]
pub struct SharedScheduler(SharedObject<Scheduler>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl SharedScheduler {
    /// Creates a scheduler with the default idle policy thresholds.
    pub fn new(platform: Box<dyn Platform>) -> Self {
        Self::with_thresholds(platform, STAY_AWAKE_THRESHOLD, DEEP_SLEEP_THRESHOLD)
    }

    /// Creates a scheduler with explicit idle policy thresholds.
    pub fn with_thresholds(platform: Box<dyn Platform>, stay_awake_threshold: u32, deep_sleep_threshold: u32) -> Self {
        logging::initialize();
        Self(SharedObject::new(Scheduler {
            platform,
            event_queue: SharedEventQueue::new(),
            tasks: Slab::new(),
            ready_queue: VecDeque::new(),
            timer_queue: Vec::new(),
            background_queue: Vec::new(),
            lifecycle_listeners: Vec::new(),
            stay_awake_count: 0,
            current_task: None,
            running: false,
            stay_awake_threshold,
            deep_sleep_threshold,
        }))
    }
}

impl Scheduler {
    /// Registers a new task and queues it for immediate execution.
    pub fn start_task(&mut self, name: &'static str, tick: Box<dyn FnMut() -> TaskStatus>) -> TaskHandle {
        let key: usize = self.tasks.insert(TaskControl {
            name,
            tick: Some(tick),
            run_state: RunState::Ready,
            wake_tick: 0,
            resume_pending: false,
        });
        debug!("start_task(): name={:?}, key={:?}", name, key);
        self.ready_queue.push_back(key);
        TaskHandle::new(key)
    }

    /// Moves a waiting or suspended task to the ready queue. Resuming a task
    /// that is already ready or running has no lasting effect beyond
    /// guaranteeing one further activation.
    pub fn resume(&mut self, handle: TaskHandle) {
        let key: usize = handle.key();
        let run_state: RunState = match self.tasks.get(key) {
            Some(task) => task.run_state,
            None => {
                warn!("resume(): stale task handle key={:?}", key);
                return;
            },
        };
        match run_state {
            RunState::Ready => (),
            RunState::Active => self.tasks[key].resume_pending = true,
            RunState::Scheduled => {
                self.timer_queue.retain(|&queued| queued != key);
                self.make_ready(key);
            },
            RunState::Background => {
                self.background_queue.retain(|&queued| queued != key);
                self.make_ready(key);
            },
            RunState::Suspended => self.make_ready(key),
        }
    }

    /// Returns the task whose tick function is currently executing.
    pub fn current_task(&self) -> Option<TaskHandle> {
        self.current_task.map(TaskHandle::new)
    }

    /// Returns the event queue drained by this scheduler.
    pub fn event_queue(&self) -> SharedEventQueue {
        self.event_queue.clone()
    }

    /// Returns the current system tick count.
    pub fn ticks(&self) -> u32 {
        self.platform.ticks()
    }

    /// Returns a pseudo-random seed from the platform entropy source.
    pub fn random_seed(&mut self) -> u64 {
        self.platform.random_seed()
    }

    /// Requests that the device stays out of its low power states until a
    /// matching can_sleep call is made.
    pub fn stay_awake(&mut self) {
        debug_assert!(self.stay_awake_count < u32::MAX);
        self.stay_awake_count = self.stay_awake_count.saturating_add(1);
    }

    /// Releases a previous stay awake request.
    pub fn can_sleep(&mut self) {
        debug_assert!(self.stay_awake_count > 0);
        self.stay_awake_count = self.stay_awake_count.saturating_sub(1);
    }

    /// Registers a lifecycle listener. Listeners are notified newest first.
    pub fn add_lifecycle_listener(&mut self, listener: LifecycleListener) {
        self.lifecycle_listeners.push(listener);
    }

    /// Requests termination of the scheduler main loop at the end of the
    /// current iteration.
    pub fn shutdown(&mut self) {
        self.running = false;
    }

    /// Runs the scheduler main loop until shutdown is requested.
    pub fn start(&mut self) {
        self.notify_lifecycle(LifecycleEvent::SchedulerStartup);
        self.running = true;
        while self.running {
            let idle_delay: u32 = self.step();
            if idle_delay > 0 {
                self.idle_wait(idle_delay);
            }
        }
        self.notify_lifecycle(LifecycleEvent::SchedulerShutdown);
    }

    /// Performs a single scheduler iteration, running at most one task tick
    /// function. Returns the number of ticks that may elapse before the next
    /// iteration is required, with zero indicating outstanding work.
    pub fn step(&mut self) -> u32 {
        // Wake the consumers of any queued events.
        while let Some(consumer) = self.event_queue.get_next_consumer() {
            self.resume(consumer);
        }

        // Promote due timed tasks in wake order.
        let now: u32 = self.platform.ticks();
        while let Some(&key) = self.timer_queue.first() {
            if !tick_reached(now, self.tasks[key].wake_tick) {
                break;
            }
            self.timer_queue.remove(0);
            self.make_ready(key);
        }

        // Background tasks only run when there is no foreground work.
        if self.ready_queue.is_empty() {
            while let Some(&key) = self.background_queue.first() {
                if !tick_reached(now, self.tasks[key].wake_tick) {
                    break;
                }
                self.background_queue.remove(0);
                self.make_ready(key);
            }
        }

        if let Some(key) = self.ready_queue.pop_front() {
            self.run_task(key);
            return 0;
        }

        if self.stay_awake_count > 0 {
            return 0;
        }
        self.next_wake_delay(now)
    }

    /// Runs the tick function of the given task and requeues the task
    /// according to the status it returns.
    fn run_task(&mut self, key: usize) {
        self.tasks[key].run_state = RunState::Active;
        self.current_task = Some(key);

        // The tick function is taken out of the arena for the duration of
        // the call, so that reentrant scheduler requests made by the task
        // never observe a task with a borrowed closure.
        let mut tick = match self.tasks[key].tick.take() {
            Some(tick) => tick,
            None => {
                error!("run_task(): task {:?} has no tick function", self.tasks[key].name);
                return;
            },
        };
        let status: TaskStatus = tick();
        self.current_task = None;
        self.tasks[key].tick = Some(tick);

        // A resume that arrived during the tick call overrides the status.
        if self.tasks[key].resume_pending {
            self.tasks[key].resume_pending = false;
            self.make_ready(key);
            return;
        }

        let now: u32 = self.platform.ticks();
        match status {
            TaskStatus::RunImmediate => self.make_ready(key),
            TaskStatus::RunLater(delay) => {
                self.tasks[key].run_state = RunState::Scheduled;
                self.tasks[key].wake_tick = now.wrapping_add(TaskStatus::clamp_delay(delay));
                Self::insert_by_wake(&mut self.timer_queue, &self.tasks, key);
            },
            TaskStatus::RunAfter(delay) => {
                self.tasks[key].run_state = RunState::Background;
                self.tasks[key].wake_tick = now.wrapping_add(TaskStatus::clamp_delay(delay));
                Self::insert_by_wake(&mut self.background_queue, &self.tasks, key);
            },
            TaskStatus::RunBackground => {
                self.tasks[key].run_state = RunState::Background;
                self.tasks[key].wake_tick = now.wrapping_add(BACKGROUND_TASK_INTERVAL);
                Self::insert_by_wake(&mut self.background_queue, &self.tasks, key);
            },
            TaskStatus::Suspend => {
                trace!("run_task(): suspending task {:?}", self.tasks[key].name);
                self.tasks[key].run_state = RunState::Suspended;
            },
        }
    }

    /// Appends a task to the ready queue.
    fn make_ready(&mut self, key: usize) {
        self.tasks[key].run_state = RunState::Ready;
        self.ready_queue.push_back(key);
    }

    /// Inserts a task into a wake-ordered queue, before the first entry with
    /// a strictly later wake tick. Entries with equal wake ticks keep their
    /// insertion order.
    fn insert_by_wake(queue: &mut Vec<usize>, tasks: &Slab<TaskControl>, key: usize) {
        let wake_tick: u32 = tasks[key].wake_tick;
        let position: usize = queue
            .iter()
            .position(|&queued| tick_delta(tasks[queued].wake_tick, wake_tick) > 0)
            .unwrap_or(queue.len());
        queue.insert(position, key);
    }

    /// Computes the delay in ticks until the earliest timed task becomes
    /// due. Background tasks never contribute a wake point.
    fn next_wake_delay(&self, now: u32) -> u32 {
        match self.timer_queue.first() {
            Some(&key) => {
                let delta: i32 = tick_delta(self.tasks[key].wake_tick, now);
                if delta <= 0 {
                    1
                } else {
                    delta as u32
                }
            },
            None => IDLE_DELAY_NEVER,
        }
    }

    /// Waits out an idle period, selecting the power state from the idle
    /// policy thresholds. Lifecycle listeners may veto a low power state, in
    /// which case the scheduler busy waits instead.
    fn idle_wait(&mut self, idle_delay: u32) {
        if self.stay_awake_count > 0 || idle_delay <= self.stay_awake_threshold {
            let delay: u32 = idle_delay.min(self.stay_awake_threshold);
            self.platform.idle(delay);
        } else if idle_delay <= self.deep_sleep_threshold {
            if self.notify_lifecycle(LifecycleEvent::EnterPowerSave) {
                self.platform.power_save(idle_delay);
                self.notify_lifecycle(LifecycleEvent::ExitPowerSave);
            } else {
                self.platform.idle(self.stay_awake_threshold);
            }
        } else if self.notify_lifecycle(LifecycleEvent::EnterDeepSleep) {
            self.platform.deep_sleep(idle_delay);
            self.notify_lifecycle(LifecycleEvent::ExitDeepSleep);
        } else {
            self.platform.idle(self.stay_awake_threshold);
        }
    }

    /// Delivers a lifecycle notification to all listeners, newest first.
    /// Returns false if any listener vetoed the notification.
    fn notify_lifecycle(&mut self, event: LifecycleEvent) -> bool {
        let mut approved: bool = true;
        for listener in self.lifecycle_listeners.iter_mut().rev() {
            approved &= listener(event);
        }
        approved
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Deref for SharedScheduler {
    type Target = Scheduler;

    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

impl DerefMut for SharedScheduler {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.deref_mut()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
