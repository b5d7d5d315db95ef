// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Value objects: immutable, self-validating data that the domain operates
//! on.

pub mod chunk;
pub mod compress_algorithm;
pub mod crypt_algorithm;
pub mod file_metadata;
pub mod fragment_set;
pub mod part_size;
pub mod secure_password;

pub use chunk::{ChunkHeader, ChunkId, FieldKind, CHUNK_ID_FILE, CHUNK_ID_FILE_DATA, CHUNK_ID_FILE_ENTRY};
pub use compress_algorithm::CompressAlgorithm;
pub use crypt_algorithm::CryptAlgorithm;
pub use file_metadata::FileMetadata;
pub use fragment_set::{Fragment, FragmentSet};
pub use part_size::PartSize;
pub use secure_password::SecurePassword;
