// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::SharedObject;
use ::std::ops::{
    Deref,
    DerefMut,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Size of a memory pool segment in bytes.
pub const MEMPOOL_SEGMENT_SIZE: usize = 64;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Fixed size block of pool memory.
pub type Segment = [u8; MEMPOOL_SEGMENT_SIZE];

/// Fixed capacity segment allocator. The full set of segments is allocated
/// up front; buffers and streams then draw segments from the free list and
/// return them when released.
pub struct MemoryPool {
    /// Segments not currently in use.
    free_list: Vec<Box<Segment>>,
    /// Total number of segments owned by the pool.
    capacity: usize,
}

#[derive(Clone)]
pub struct SharedMemoryPool(SharedObject<MemoryPool>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl SharedMemoryPool {
    /// Creates a pool holding the given number of segments.
    pub fn new(num_segments: usize) -> Self {
        let mut free_list: Vec<Box<Segment>> = Vec::with_capacity(num_segments);
        for _ in 0..num_segments {
            free_list.push(Box::new([0u8; MEMPOOL_SEGMENT_SIZE]));
        }
        Self(SharedObject::new(MemoryPool {
            free_list,
            capacity: num_segments,
        }))
    }

    /// Allocates a single segment, or fails if the pool is exhausted.
    pub fn alloc_segment(&mut self) -> Option<Box<Segment>> {
        self.deref_mut().free_list.pop()
    }

    /// Allocates the requested number of segments, or fails without
    /// allocating anything if the pool cannot satisfy the full request.
    pub fn alloc_segments(&mut self, num_segments: usize) -> Option<Vec<Box<Segment>>> {
        let free_list: &mut Vec<Box<Segment>> = &mut self.deref_mut().free_list;
        if free_list.len() < num_segments {
            return None;
        }
        Some(free_list.split_off(free_list.len() - num_segments))
    }

    /// Returns a segment to the free list.
    pub fn free_segment(&mut self, segment: Box<Segment>) {
        self.deref_mut().free_list.push(segment);
    }

    /// Returns a set of segments to the free list.
    pub fn free_segments(&mut self, segments: impl IntoIterator<Item = Box<Segment>>) {
        for segment in segments {
            self.free_segment(segment);
        }
    }

    /// Returns the number of segments currently available for allocation.
    pub fn segments_available(&self) -> usize {
        self.free_list.len()
    }

    /// Returns the total number of segments owned by the pool.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Deref for SharedMemoryPool {
    type Target = MemoryPool;

    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

impl DerefMut for SharedMemoryPool {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.deref_mut()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::{
        SharedMemoryPool,
        MEMPOOL_SEGMENT_SIZE,
    };
    use ::anyhow::Result;

    /// Tests single segment allocation and release.
    #[test]
    fn alloc_and_free_segment() -> Result<()> {
        let mut pool: SharedMemoryPool = SharedMemoryPool::new(2);
        crate::ensure_eq!(pool.segments_available(), 2);

        let segment = match pool.alloc_segment() {
            Some(segment) => segment,
            None => anyhow::bail!("allocation should succeed"),
        };
        crate::ensure_eq!(segment.len(), MEMPOOL_SEGMENT_SIZE);
        crate::ensure_eq!(pool.segments_available(), 1);

        pool.free_segment(segment);
        crate::ensure_eq!(pool.segments_available(), 2);
        Ok(())
    }

    /// Tests that multi-segment allocation is all or nothing.
    #[test]
    fn multi_segment_allocation_is_atomic() -> Result<()> {
        let mut pool: SharedMemoryPool = SharedMemoryPool::new(4);

        crate::ensure_eq!(pool.alloc_segments(5).is_none(), true);
        crate::ensure_eq!(pool.segments_available(), 4);

        let segments = match pool.alloc_segments(3) {
            Some(segments) => segments,
            None => anyhow::bail!("allocation should succeed"),
        };
        crate::ensure_eq!(segments.len(), 3);
        crate::ensure_eq!(pool.segments_available(), 1);

        // A further oversized request leaves the free list untouched.
        crate::ensure_eq!(pool.alloc_segments(2).is_none(), true);
        crate::ensure_eq!(pool.segments_available(), 1);

        pool.free_segments(segments);
        crate::ensure_eq!(pool.segments_available(), 4);
        Ok(())
    }
}
