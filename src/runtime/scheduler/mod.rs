// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod lifecycle;
mod scheduler;
mod task;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::{
    lifecycle::{
        LifecycleEvent,
        LifecycleListener,
    },
    scheduler::{
        SharedScheduler,
        DEEP_SLEEP_THRESHOLD,
        STAY_AWAKE_THRESHOLD,
    },
    task::{
        prioritise,
        TaskHandle,
        TaskStatus,
        BACKGROUND_TASK_INTERVAL,
    },
};
