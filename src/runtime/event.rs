// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Event flags for signalling between tasks and interrupt-style callbacks.
//!
//! Each event carries 32 independent flag bits and is bound to at most one
//! consumer task. Any state modification places the event on its event
//! queue exactly once; the scheduler drains the queue at the start of every
//! iteration and resumes the associated consumers in event arrival order.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    scheduler::TaskHandle,
    SharedObject,
};
use ::std::{
    collections::VecDeque,
    ops::{
        Deref,
        DerefMut,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Event flag bits.
pub type EventBits = u32;

/// A set of 32 event flags with an optional consumer task.
pub struct Event {
    /// Current flag bits.
    bits: EventBits,
    /// Set while the event is waiting on the event queue.
    queued: bool,
    /// Task resumed when the event is dequeued.
    consumer: Option<TaskHandle>,
    /// Queue that collects modified events.
    queue: SharedEventQueue,
}

#[derive(Clone)]
pub struct SharedEvent(SharedObject<Event>);

/// FIFO of events with pending state modifications.
pub struct EventQueue {
    pending: VecDeque<SharedEvent>,
}

#[derive(Clone)]
pub struct SharedEventQueue(SharedObject<EventQueue>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl SharedEvent {
    /// Creates a new event with all flag bits clear.
    pub fn new(queue: SharedEventQueue, consumer: Option<TaskHandle>) -> Self {
        Self(SharedObject::new(Event {
            bits: 0,
            queued: false,
            consumer,
            queue,
        }))
    }

    /// Changes the consumer task bound to this event.
    pub fn set_consumer(&mut self, consumer: Option<TaskHandle>) {
        self.deref_mut().consumer = consumer;
    }

    /// Returns the current flag bits without modifying the event.
    pub fn get(&self) -> EventBits {
        self.bits
    }

    /// Reports whether all the flag bits in the mask are set.
    pub fn test_all(&self, mask: EventBits) -> bool {
        (self.bits & mask) == mask
    }

    /// Reports whether any of the flag bits in the mask are set.
    pub fn test_any(&self, mask: EventBits) -> bool {
        (self.bits & mask) != 0
    }

    /// Replaces the full set of flag bits, returning the prior bits.
    pub fn assign(&mut self, bits: EventBits) -> EventBits {
        let prior: EventBits = self.bits;
        self.deref_mut().bits = bits;
        self.enqueue();
        prior
    }

    /// Replaces the flag bits selected by the mask, returning the prior
    /// bits. Bits outside the mask are unchanged.
    pub fn assign_masked(&mut self, mask: EventBits, bits: EventBits) -> EventBits {
        let prior: EventBits = self.bits;
        self.deref_mut().bits = (prior & !mask) | (bits & mask);
        self.enqueue();
        prior
    }

    /// Sets the flag bits in the mask, returning the prior bits.
    pub fn set(&mut self, mask: EventBits) -> EventBits {
        let prior: EventBits = self.bits;
        self.deref_mut().bits = prior | mask;
        self.enqueue();
        prior
    }

    /// Clears the flag bits in the mask, returning the prior bits.
    pub fn clear(&mut self, mask: EventBits) -> EventBits {
        let prior: EventBits = self.bits;
        self.deref_mut().bits = prior & !mask;
        self.enqueue();
        prior
    }

    /// Atomically reads and clears all the flag bits. Unlike the other
    /// state modifications this does not queue the event, so a consumer can
    /// collect its flags without scheduling a redundant wakeup.
    pub fn reset(&mut self) -> EventBits {
        let prior: EventBits = self.bits;
        self.deref_mut().bits = 0;
        prior
    }

    /// Places the event on its event queue if it is not already waiting.
    fn enqueue(&mut self) {
        if !self.queued {
            self.deref_mut().queued = true;
            let this: SharedEvent = self.clone();
            self.deref_mut().queue.push(this);
        }
    }
}

impl SharedEventQueue {
    pub fn new() -> Self {
        Self(SharedObject::new(EventQueue {
            pending: VecDeque::new(),
        }))
    }

    /// Removes the oldest pending event from the queue and returns its
    /// consumer task. Events with no consumer are dequeued and discarded.
    pub fn get_next_consumer(&mut self) -> Option<TaskHandle> {
        while let Some(mut event) = self.deref_mut().pending.pop_front() {
            event.deref_mut().queued = false;
            if let Some(consumer) = event.consumer {
                return Some(consumer);
            }
        }
        None
    }

    fn push(&mut self, event: SharedEvent) {
        self.deref_mut().pending.push_back(event);
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Deref for SharedEvent {
    type Target = Event;

    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

impl DerefMut for SharedEvent {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.deref_mut()
    }
}

impl Deref for SharedEventQueue {
    type Target = EventQueue;

    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

impl DerefMut for SharedEventQueue {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.deref_mut()
    }
}

impl Default for SharedEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
