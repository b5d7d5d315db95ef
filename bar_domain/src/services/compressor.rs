// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Streaming, block-granular compressor port.
//!
//! The archive pipeline feeds plaintext in on one side with [`Compressor::put_block`]
//! and drains compressed output on the other with [`Compressor::get_block`];
//! both sides operate in fixed-size blocks so the caller can interleave
//! compression with chunk writes without buffering a whole file.

use crate::error::BarResult;

pub trait Compressor: Send {
    /// Feeds one block of plaintext (on compress) or compressed data (on
    /// decompress) into the stream.
    fn put_block(&mut self, data: &[u8]) -> BarResult<()>;

    /// Drains up to `buf.len()` bytes of output, returning how many bytes
    /// were written.
    fn get_block(&mut self, buf: &mut [u8]) -> BarResult<usize>;

    /// Signals end of input; remaining buffered output becomes available
    /// through further [`Compressor::get_block`] calls.
    fn flush(&mut self) -> BarResult<()>;

    fn block_is_full(&self) -> bool;
    fn block_is_empty(&self) -> bool;

    fn total_in(&self) -> u64;
    fn total_out(&self) -> u64;
}
