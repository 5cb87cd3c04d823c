// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod buffer;
mod pool;
mod stream;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::{
    buffer::Buffer,
    pool::{
        Segment,
        SharedMemoryPool,
        MEMPOOL_SEGMENT_SIZE,
    },
    stream::SharedStream,
};
