// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Pool backed data buffers.
//!
//! A buffer presents a logically contiguous byte sequence stored in a list
//! of fixed size pool segments. Operations that grow a buffer draw segments
//! from the pool and fail cleanly when it is exhausted, leaving the buffer
//! contents unchanged. Dropping a buffer returns its segments to the pool.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::memory::pool::{
    Segment,
    SharedMemoryPool,
    MEMPOOL_SEGMENT_SIZE,
};
use ::std::mem;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Pool backed data buffer.
pub struct Buffer {
    /// Pool from which the buffer segments are drawn.
    pool: SharedMemoryPool,
    /// Segment list backing the buffer contents.
    segments: Vec<Box<Segment>>,
    /// Buffer contents size in bytes.
    size: usize,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Buffer {
    /// Creates a new empty buffer drawing on the given pool.
    pub fn new(pool: SharedMemoryPool) -> Self {
        Self {
            pool,
            segments: Vec::new(),
            size: 0,
        }
    }

    /// Returns the buffer contents size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Discards the buffer contents and allocates storage for the requested
    /// number of bytes. The new contents are unspecified. On pool exhaustion
    /// the buffer is left empty and this returns false.
    pub fn reset(&mut self, size: usize) -> bool {
        let segments: Vec<Box<Segment>> = mem::take(&mut self.segments);
        self.pool.free_segments(segments);
        self.size = 0;
        if size > 0 {
            match self.pool.alloc_segments(Self::segments_needed(size)) {
                Some(segments) => {
                    self.segments = segments;
                    self.size = size;
                },
                None => return false,
            }
        }
        true
    }

    /// Grows the buffer by the given number of bytes. The new bytes are
    /// unspecified. On pool exhaustion the buffer is unchanged and this
    /// returns false.
    pub fn extend(&mut self, size: usize) -> bool {
        if size == 0 {
            return true;
        }
        let new_size: usize = self.size + size;
        let extra_segments: usize = Self::segments_needed(new_size) - self.segments.len();
        if extra_segments > 0 {
            match self.pool.alloc_segments(extra_segments) {
                Some(segments) => self.segments.extend(segments),
                None => return false,
            }
        }
        self.size = new_size;
        true
    }

    /// Writes a block of data at the given offset. The write must lie
    /// entirely within the current buffer contents.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> bool {
        if offset + data.len() > self.size {
            return false;
        }
        self.copy_in(offset, data);
        true
    }

    /// Reads a block of data from the given offset. The read must lie
    /// entirely within the current buffer contents.
    pub fn read(&self, offset: usize, data: &mut [u8]) -> bool {
        if offset + data.len() > self.size {
            return false;
        }
        self.copy_out(offset, data);
        true
    }

    /// Appends a block of data to the end of the buffer, allocating
    /// additional segments as required. On pool exhaustion the buffer is
    /// unchanged and this returns false.
    pub fn append(&mut self, data: &[u8]) -> bool {
        let offset: usize = self.size;
        if !self.extend(data.len()) {
            return false;
        }
        self.copy_in(offset, data);
        true
    }

    /// Inserts a block of data at the start of the buffer. The existing
    /// contents are copied into a fresh segment list, so on pool exhaustion
    /// the buffer is unchanged and this returns false.
    pub fn prepend(&mut self, data: &[u8]) -> bool {
        if data.is_empty() {
            return true;
        }
        let new_size: usize = self.size + data.len();
        let mut segments: Vec<Box<Segment>> = match self.pool.alloc_segments(Self::segments_needed(new_size)) {
            Some(segments) => segments,
            None => return false,
        };
        Self::copy_to_segments(&mut segments, 0, data);
        for index in 0..self.size {
            let byte: u8 = self.byte(index);
            let target: usize = data.len() + index;
            segments[target / MEMPOOL_SEGMENT_SIZE][target % MEMPOOL_SEGMENT_SIZE] = byte;
        }
        let old_segments: Vec<Box<Segment>> = mem::replace(&mut self.segments, segments);
        self.pool.free_segments(old_segments);
        self.size = new_size;
        true
    }

    /// Copies the buffer contents into the target buffer, replacing its
    /// previous contents. The copy is atomic, so on pool exhaustion the
    /// target buffer is unchanged and this returns false.
    pub fn copy_to(&self, target: &mut Buffer) -> bool {
        let mut segments: Vec<Box<Segment>> = match target.pool.alloc_segments(Self::segments_needed(self.size)) {
            Some(segments) => segments,
            None => return false,
        };
        for index in 0..self.size {
            segments[index / MEMPOOL_SEGMENT_SIZE][index % MEMPOOL_SEGMENT_SIZE] = self.byte(index);
        }
        let old_segments: Vec<Box<Segment>> = mem::replace(&mut target.segments, segments);
        target.pool.free_segments(old_segments);
        target.size = self.size;
        true
    }

    /// Discards the given number of bytes from the start of the buffer,
    /// releasing fully consumed segments back to the pool. Fails if the new
    /// start offset lies beyond the buffer contents.
    pub fn rebase(&mut self, new_start: usize) -> bool {
        if new_start > self.size {
            return false;
        }
        if new_start == 0 {
            return true;
        }
        let new_size: usize = self.size - new_start;

        // Release whole leading segments, then shift any residual bytes
        // down to the start of the remaining segments.
        let whole_segments: usize = new_start / MEMPOOL_SEGMENT_SIZE;
        for segment in self.segments.drain(..whole_segments) {
            self.pool.free_segment(segment);
        }
        let shift: usize = new_start % MEMPOOL_SEGMENT_SIZE;
        if shift > 0 {
            for index in 0..new_size {
                let byte: u8 = self.byte(index + shift);
                self.set_byte(index, byte);
            }
        }
        self.size = new_size;

        // Trailing segments beyond the new contents are no longer needed.
        let segments_needed: usize = Self::segments_needed(new_size);
        while self.segments.len() > segments_needed {
            if let Some(segment) = self.segments.pop() {
                self.pool.free_segment(segment);
            }
        }
        true
    }

    /// Number of segments required to hold the given number of bytes.
    fn segments_needed(size: usize) -> usize {
        size.div_ceil(MEMPOOL_SEGMENT_SIZE)
    }

    fn byte(&self, index: usize) -> u8 {
        self.segments[index / MEMPOOL_SEGMENT_SIZE][index % MEMPOOL_SEGMENT_SIZE]
    }

    fn set_byte(&mut self, index: usize, value: u8) {
        self.segments[index / MEMPOOL_SEGMENT_SIZE][index % MEMPOOL_SEGMENT_SIZE] = value;
    }

    /// Copies a block of data into the segment list at the given offset.
    /// The caller has already checked the copy bounds.
    fn copy_in(&mut self, offset: usize, data: &[u8]) {
        Self::copy_to_segments(&mut self.segments, offset, data);
    }

    fn copy_to_segments(segments: &mut [Box<Segment>], mut offset: usize, data: &[u8]) {
        let mut remaining: &[u8] = data;
        while !remaining.is_empty() {
            let segment: usize = offset / MEMPOOL_SEGMENT_SIZE;
            let segment_offset: usize = offset % MEMPOOL_SEGMENT_SIZE;
            let chunk: usize = (MEMPOOL_SEGMENT_SIZE - segment_offset).min(remaining.len());
            segments[segment][segment_offset..segment_offset + chunk].copy_from_slice(&remaining[..chunk]);
            remaining = &remaining[chunk..];
            offset += chunk;
        }
    }

    /// Copies a block of data out of the segment list at the given offset.
    /// The caller has already checked the copy bounds.
    fn copy_out(&self, mut offset: usize, data: &mut [u8]) {
        let mut remaining: &mut [u8] = data;
        while !remaining.is_empty() {
            let segment: usize = offset / MEMPOOL_SEGMENT_SIZE;
            let segment_offset: usize = offset % MEMPOOL_SEGMENT_SIZE;
            let chunk: usize = (MEMPOOL_SEGMENT_SIZE - segment_offset).min(remaining.len());
            remaining[..chunk].copy_from_slice(&self.segments[segment][segment_offset..segment_offset + chunk]);
            remaining = &mut remaining[chunk..];
            offset += chunk;
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Drop for Buffer {
    fn drop(&mut self) {
        let segments: Vec<Box<Segment>> = mem::take(&mut self.segments);
        self.pool.free_segments(segments);
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use crate::runtime::memory::{
        Buffer,
        SharedMemoryPool,
        MEMPOOL_SEGMENT_SIZE,
    };
    use ::anyhow::Result;

    /// Tests writes and reads spanning a segment boundary.
    #[test]
    fn write_read_across_segments() -> Result<()> {
        let pool: SharedMemoryPool = SharedMemoryPool::new(4);
        let mut buffer: Buffer = Buffer::new(pool);
        crate::ensure_eq!(buffer.reset(150), true);
        crate::ensure_eq!(buffer.size(), 150);

        let pattern: Vec<u8> = (0..100).collect();
        crate::ensure_eq!(buffer.write(30, &pattern), true);

        let mut readback: [u8; 100] = [0; 100];
        crate::ensure_eq!(buffer.read(30, &mut readback), true);
        crate::ensure_eq!(readback.as_slice(), pattern.as_slice());

        // Reads and writes beyond the buffer contents are rejected.
        crate::ensure_eq!(buffer.write(51, &pattern), false);
        crate::ensure_eq!(buffer.read(51, &mut readback), false);
        Ok(())
    }

    /// Tests that append grows the buffer and preserves prior contents.
    #[test]
    fn append_preserves_contents() -> Result<()> {
        let pool: SharedMemoryPool = SharedMemoryPool::new(4);
        let mut buffer: Buffer = Buffer::new(pool.clone());

        crate::ensure_eq!(buffer.append(&[1; 60]), true);
        crate::ensure_eq!(buffer.append(&[2; 60]), true);
        crate::ensure_eq!(buffer.size(), 120);
        crate::ensure_eq!(pool.segments_available(), 2);

        let mut readback: [u8; 120] = [0; 120];
        crate::ensure_eq!(buffer.read(0, &mut readback), true);
        crate::ensure_eq!(readback[59], 1);
        crate::ensure_eq!(readback[60], 2);
        Ok(())
    }

    /// Tests that prepend shifts the existing contents after the new data.
    #[test]
    fn prepend_inserts_at_start() -> Result<()> {
        let pool: SharedMemoryPool = SharedMemoryPool::new(4);
        let mut buffer: Buffer = Buffer::new(pool);
        crate::ensure_eq!(buffer.append(&[7; 70]), true);
        crate::ensure_eq!(buffer.prepend(&[9; 10]), true);
        crate::ensure_eq!(buffer.size(), 80);

        let mut readback: [u8; 80] = [0; 80];
        crate::ensure_eq!(buffer.read(0, &mut readback), true);
        crate::ensure_eq!(readback[9], 9);
        crate::ensure_eq!(readback[10], 7);
        crate::ensure_eq!(readback[79], 7);
        Ok(())
    }

    /// Tests that rebase discards the requested prefix and releases fully
    /// consumed segments back to the pool.
    #[test]
    fn rebase_discards_prefix() -> Result<()> {
        let pool: SharedMemoryPool = SharedMemoryPool::new(4);
        let mut buffer: Buffer = Buffer::new(pool.clone());
        let pattern: Vec<u8> = (0..200u8).collect();
        crate::ensure_eq!(buffer.append(&pattern), true);
        crate::ensure_eq!(pool.segments_available(), 0);

        // Discarding 130 bytes leaves 70, which fit in two segments.
        crate::ensure_eq!(buffer.rebase(130), true);
        crate::ensure_eq!(buffer.size(), 70);
        crate::ensure_eq!(pool.segments_available(), 2);

        let mut readback: [u8; 70] = [0; 70];
        crate::ensure_eq!(buffer.read(0, &mut readback), true);
        crate::ensure_eq!(readback.as_slice(), &pattern[130..]);

        // Rebasing past the end of the buffer is rejected.
        crate::ensure_eq!(buffer.rebase(71), false);

        // Rebasing to the full size empties the buffer.
        crate::ensure_eq!(buffer.rebase(70), true);
        crate::ensure_eq!(buffer.size(), 0);
        crate::ensure_eq!(pool.segments_available(), 4);
        Ok(())
    }

    /// Tests that growth operations fail cleanly on pool exhaustion.
    #[test]
    fn pool_exhaustion_leaves_buffer_unchanged() -> Result<()> {
        let pool: SharedMemoryPool = SharedMemoryPool::new(2);
        let mut buffer: Buffer = Buffer::new(pool.clone());
        crate::ensure_eq!(buffer.append(&[5; 100]), true);

        crate::ensure_eq!(buffer.append(&[6; 100]), false);
        crate::ensure_eq!(buffer.prepend(&[6; 10]), false);
        crate::ensure_eq!(buffer.extend(100), false);
        crate::ensure_eq!(buffer.size(), 100);

        let mut readback: [u8; 100] = [0; 100];
        crate::ensure_eq!(buffer.read(0, &mut readback), true);
        crate::ensure_eq!(readback.as_slice(), &[5; 100]);
        Ok(())
    }

    /// Tests that copying to another buffer is atomic and replaces the
    /// target contents.
    #[test]
    fn copy_to_replaces_target() -> Result<()> {
        let pool: SharedMemoryPool = SharedMemoryPool::new(6);
        let mut source: Buffer = Buffer::new(pool.clone());
        let mut target: Buffer = Buffer::new(pool.clone());
        crate::ensure_eq!(source.append(&[3; 100]), true);
        crate::ensure_eq!(target.append(&[4; 10]), true);

        crate::ensure_eq!(source.copy_to(&mut target), true);
        crate::ensure_eq!(target.size(), 100);
        let mut readback: [u8; 100] = [0; 100];
        crate::ensure_eq!(target.read(0, &mut readback), true);
        crate::ensure_eq!(readback.as_slice(), &[3; 100]);

        // Exhaust the pool so a further copy fails without changes.
        let mut filler: Buffer = Buffer::new(pool.clone());
        let spare: usize = pool.segments_available();
        crate::ensure_eq!(filler.extend(spare * MEMPOOL_SEGMENT_SIZE), true);
        crate::ensure_eq!(source.copy_to(&mut target), false);
        crate::ensure_eq!(target.size(), 100);
        Ok(())
    }

    /// Tests that dropping a buffer returns its segments to the pool.
    #[test]
    fn drop_releases_segments() -> Result<()> {
        let pool: SharedMemoryPool = SharedMemoryPool::new(4);
        {
            let mut buffer: Buffer = Buffer::new(pool.clone());
            crate::ensure_eq!(buffer.reset(200), true);
            crate::ensure_eq!(pool.segments_available(), 0);
        }
        crate::ensure_eq!(pool.segments_available(), 4);
        Ok(())
    }
}
