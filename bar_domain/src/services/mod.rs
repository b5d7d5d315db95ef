// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Service ports: traits the infrastructure layer implements and the
//! application layer depends on, never the other way around.

pub mod chunk_io;
pub mod cipher_engine;
pub mod compressor;
pub mod key_store;
pub mod storage;

pub use chunk_io::ChunkIo;
pub use cipher_engine::{CipherEngine, CipherEngineFactory};
pub use compressor::Compressor;
pub use key_store::{KeyStore, PrivateKeyMaterial, PublicKeyMaterial, RANDOM_KEY_MAX_BITS, WRAP_ENVELOPE_LEN};
pub use storage::{StorageBackend, StorageReader, StorageWriter};
