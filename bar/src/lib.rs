// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # bar
//!
//! Infrastructure and application layer for the archiver: the chunk codec,
//! cipher engine, compressor, key store, storage multiplexer, and the
//! archive writer/reader/packer pipeline built on top of the ports defined
//! in `bar-domain`.

pub mod application;
pub mod infrastructure;

pub use bar_domain::{BarError, BarResult};
