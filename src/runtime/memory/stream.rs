// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Byte streams for single producer, single consumer task communication.
//!
//! Stream storage is drawn from the memory pool one segment at a time as
//! data is written and returned as it is consumed. A stream is bound to at
//! most one consumer task, which is resumed through the scheduler whenever
//! a write makes an empty stream non-empty.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    memory::{
        pool::{
            Segment,
            SharedMemoryPool,
            MEMPOOL_SEGMENT_SIZE,
        },
        Buffer,
    },
    scheduler::{
        SharedScheduler,
        TaskHandle,
    },
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

/// Single producer, single consumer byte stream.
pub struct Stream {
    /// Pool from which the stream segments are drawn.
    pool: SharedMemoryPool,
    /// Scheduler used to resume the consumer task.
    scheduler: SharedScheduler,
    /// Task resumed when the stream becomes non-empty.
    consumer: Option<TaskHandle>,
    /// Upper bound on the stream contents in bytes.
    max_size: usize,
    /// Segment list backing the stream contents.
    segments: VecDeque<Box<Segment>>,
    /// Offset of the oldest byte within the front segment.
    read_offset: usize,
    /// Number of bytes held in the stream.
    size: usize,
}

#[derive(Clone)]
pub struct SharedStream(SharedObject<Stream>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl SharedStream {
    /// Creates a new empty stream with the given maximum size.
    pub fn new(pool: SharedMemoryPool, scheduler: SharedScheduler, max_size: usize) -> Self {
        Self(SharedObject::new(Stream {
            pool,
            scheduler,
            consumer: None,
            max_size,
            segments: VecDeque::new(),
            read_offset: 0,
            size: 0,
        }))
    }
}

impl Stream {
    /// Binds the consumer task that is resumed on new data.
    pub fn set_consumer_task(&mut self, consumer: Option<TaskHandle>) {
        self.consumer = consumer;
    }

    /// Returns the number of bytes available for reading.
    pub fn read_capacity(&self) -> usize {
        self.size
    }

    /// Returns the number of bytes that can currently be written, limited
    /// by both the stream size bound and the segments left in the pool.
    pub fn write_capacity(&self) -> usize {
        let tail_slack: usize = self.segments.len() * MEMPOOL_SEGMENT_SIZE - (self.read_offset + self.size);
        let pool_space: usize = self.pool.segments_available() * MEMPOOL_SEGMENT_SIZE;
        (self.max_size - self.size).min(tail_slack + pool_space)
    }

    /// Writes as much of the data as fits, returning the number of bytes
    /// transferred.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let count: usize = data.len().min(self.write_capacity());
        if count == 0 {
            return 0;
        }
        let end: usize = self.read_offset + self.size;
        let segments_needed: usize = (end + count).div_ceil(MEMPOOL_SEGMENT_SIZE);
        let extra_segments: usize = segments_needed - self.segments.len();
        if extra_segments > 0 {
            match self.pool.alloc_segments(extra_segments) {
                Some(segments) => self.segments.extend(segments),
                None => return 0,
            }
        }
        for (position, &byte) in data[..count].iter().enumerate() {
            let index: usize = end + position;
            self.segments[index / MEMPOOL_SEGMENT_SIZE][index % MEMPOOL_SEGMENT_SIZE] = byte;
        }
        let was_empty: bool = self.size == 0;
        self.size += count;
        if was_empty {
            self.wake_consumer();
        }
        count
    }

    /// Writes the data in full, or nothing at all if it does not fit.
    pub fn write_all(&mut self, data: &[u8]) -> bool {
        if self.write_capacity() < data.len() {
            return false;
        }
        self.write(data) == data.len()
    }

    pub fn write_byte(&mut self, byte: u8) -> bool {
        self.write_all(&[byte])
    }

    /// Writes a delimited message, framed with a two byte little-endian
    /// length header. The write is atomic.
    pub fn write_message(&mut self, data: &[u8]) -> bool {
        if data.len() > u16::MAX as usize {
            return false;
        }
        if self.write_capacity() < data.len() + 2 {
            return false;
        }
        let header: [u8; 2] = (data.len() as u16).to_le_bytes();
        self.write(&header);
        self.write(data);
        true
    }

    /// Reads up to the output size, returning the number of bytes
    /// transferred.
    pub fn read(&mut self, data: &mut [u8]) -> usize {
        let count: usize = data.len().min(self.size);
        for (position, byte) in data[..count].iter_mut().enumerate() {
            *byte = self.byte_at(position);
        }
        self.release(count);
        count
    }

    /// Fills the output in full, or reads nothing if too few bytes are
    /// buffered.
    pub fn read_all(&mut self, data: &mut [u8]) -> bool {
        if self.size < data.len() {
            return false;
        }
        self.read(data) == data.len()
    }

    pub fn read_byte(&mut self) -> Option<u8> {
        let mut byte: [u8; 1] = [0];
        if self.read(&mut byte) == 1 {
            Some(byte[0])
        } else {
            None
        }
    }

    /// Returns the byte at the given offset from the stream head without
    /// consuming it.
    pub fn peek_byte(&self, offset: usize) -> Option<u8> {
        if offset < self.size {
            Some(self.byte_at(offset))
        } else {
            None
        }
    }

    /// Reads a delimited message into the given buffer, replacing its
    /// contents. Fails without consuming anything if no complete message is
    /// buffered or the buffer cannot hold the payload.
    pub fn read_message(&mut self, buffer: &mut Buffer) -> bool {
        if self.size < 2 {
            return false;
        }
        let header: [u8; 2] = [self.byte_at(0), self.byte_at(1)];
        let length: usize = u16::from_le_bytes(header) as usize;
        if self.size < 2 + length {
            return false;
        }
        let mut payload: Vec<u8> = vec![0; length];
        for (position, byte) in payload.iter_mut().enumerate() {
            *byte = self.byte_at(2 + position);
        }
        if !buffer.reset(length) {
            return false;
        }
        buffer.write(0, &payload);
        self.release(2 + length);
        true
    }

    /// Returns the contents of a buffer to the head of the stream, so that
    /// a consumer can push back data it cannot yet process. The buffer is
    /// emptied on success.
    pub fn push_back_buffer(&mut self, buffer: &mut Buffer) -> bool {
        let count: usize = buffer.size();
        if count == 0 {
            return true;
        }
        if self.size + count > self.max_size {
            return false;
        }
        let extra_bytes: usize = count.saturating_sub(self.read_offset);
        let extra_segments: usize = extra_bytes.div_ceil(MEMPOOL_SEGMENT_SIZE);
        if extra_segments > 0 {
            match self.pool.alloc_segments(extra_segments) {
                Some(segments) => {
                    for segment in segments {
                        self.segments.push_front(segment);
                        self.read_offset += MEMPOOL_SEGMENT_SIZE;
                    }
                },
                None => return false,
            }
        }
        let was_empty: bool = self.size == 0;
        self.read_offset -= count;
        for position in 0..count {
            let mut byte: [u8; 1] = [0];
            buffer.read(position, &mut byte);
            let index: usize = self.read_offset + position;
            self.segments[index / MEMPOOL_SEGMENT_SIZE][index % MEMPOOL_SEGMENT_SIZE] = byte[0];
        }
        self.size += count;
        buffer.reset(0);
        if was_empty {
            self.wake_consumer();
        }
        true
    }

    fn byte_at(&self, position: usize) -> u8 {
        let index: usize = self.read_offset + position;
        self.segments[index / MEMPOOL_SEGMENT_SIZE][index % MEMPOOL_SEGMENT_SIZE]
    }

    /// Consumes bytes from the stream head, returning fully drained
    /// segments to the pool.
    fn release(&mut self, count: usize) {
        self.read_offset += count;
        self.size -= count;
        while self.read_offset >= MEMPOOL_SEGMENT_SIZE {
            if let Some(segment) = self.segments.pop_front() {
                self.pool.free_segment(segment);
            }
            self.read_offset -= MEMPOOL_SEGMENT_SIZE;
        }
        if self.size == 0 {
            while let Some(segment) = self.segments.pop_back() {
                self.pool.free_segment(segment);
            }
            self.read_offset = 0;
        }
    }

    fn wake_consumer(&mut self) {
        if let Some(consumer) = self.consumer {
            let mut scheduler: SharedScheduler = self.scheduler.clone();
            scheduler.resume(consumer);
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Deref for SharedStream {
    type Target = Stream;

    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

impl DerefMut for SharedStream {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.deref_mut()
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        let segments: VecDeque<Box<Segment>> = ::std::mem::take(&mut self.segments);
        self.pool.free_segments(segments);
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
