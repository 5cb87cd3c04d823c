// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod event;
pub mod fail;
pub mod logging;
pub mod memory;
pub mod network;
pub mod scheduler;
pub mod ticks;

pub use self::{
    event::{
        SharedEvent,
        SharedEventQueue,
    },
    fail::Fail,
    ticks::Platform,
};

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::{
    ops::{
        Deref,
        DerefMut,
    },
    rc::Rc,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Single-threaded shared ownership wrapper used throughout the runtime.
pub struct SharedObject<T>(Rc<T>);

/// Shared trait objects.
pub struct SharedBox<T: ?Sized>(SharedObject<Box<T>>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl<T> SharedObject<T> {
    pub fn new(object: T) -> Self {
        Self(Rc::new(object))
    }
}

impl<T: ?Sized> SharedBox<T> {
    pub fn new(boxed_object: Box<T>) -> Self {
        Self(SharedObject::<Box<T>>::new(boxed_object))
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl<T> Clone for SharedObject<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: ?Sized> Clone for SharedBox<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for SharedObject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

/// Dereferences a mutable reference to a shared object for use. This breaks Rust's ownership model because it allows
/// more than one mutable dereference of a shared object at a time. The runtime requires this because cooperative task
/// tick functions hold references to the same shared state as the scheduler that dispatches them; however, the runtime
/// also ensures that exactly one tick function runs at a time on a single thread. Due to this design, Rust's static
/// borrow checker is not able to ensure memory safety and we have chosen not to use the dynamic borrow checker.
impl<T> DerefMut for SharedObject<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        let ptr: *mut T = Rc::as_ptr(&self.0) as *mut T;
        unsafe { &mut *ptr }
    }
}

impl<T> AsRef<T> for SharedObject<T> {
    fn as_ref(&self) -> &T {
        self.0.as_ref()
    }
}

impl<T> AsMut<T> for SharedObject<T> {
    fn as_mut(&mut self) -> &mut T {
        self.deref_mut()
    }
}

impl<T: ?Sized> Deref for SharedBox<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

impl<T: ?Sized> DerefMut for SharedBox<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.deref_mut()
    }
}
