// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Wire encoding for the `FILE`/`FILE_ENTRY`/`FILE_DATA` payloads, and the
//! "encrypt as one aligned unit" helper the writer and reader both build on.
//!
//! These are concrete, hand-written (de)serializers rather than a generic
//! field-kind interpreter: the field layout is fixed and small enough that a
//! schema engine would only add indirection.

use bar_domain::error::{BarError, BarResult};
use bar_domain::services::CipherEngine;
use bar_domain::value_objects::FileMetadata;

/// Rounds `len` up to the next multiple of `alignment` (treating 0 as 1).
pub fn align_up(len: usize, alignment: usize) -> usize {
    let alignment = alignment.max(1);
    let rem = len % alignment;
    if rem == 0 {
        len
    } else {
        len + (alignment - rem)
    }
}

pub fn encode_file_header(compress_id: u32, crypt_id: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(&compress_id.to_be_bytes());
    out.extend_from_slice(&crypt_id.to_be_bytes());
    out
}

pub fn decode_file_header(bytes: &[u8]) -> BarResult<(u32, u32)> {
    if bytes.len() < 8 {
        return Err(BarError::format("FILE chunk payload shorter than its two algorithm fields"));
    }
    let compress_id = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
    let crypt_id = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
    Ok((compress_id, crypt_id))
}

pub fn encode_file_entry(meta: &FileMetadata) -> Vec<u8> {
    let mut out = Vec::with_capacity(meta.wire_len() as usize);
    out.extend_from_slice(&meta.size.to_be_bytes());
    out.extend_from_slice(&meta.time_last_access.to_be_bytes());
    out.extend_from_slice(&meta.time_modified.to_be_bytes());
    out.extend_from_slice(&meta.time_last_changed.to_be_bytes());
    out.extend_from_slice(&meta.user_id.to_be_bytes());
    out.extend_from_slice(&meta.group_id.to_be_bytes());
    out.extend_from_slice(&meta.permission.to_be_bytes());
    let name_bytes = meta.name.as_bytes();
    out.extend_from_slice(&(name_bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(name_bytes);
    out
}

pub fn decode_file_entry(bytes: &[u8]) -> BarResult<FileMetadata> {
    if bytes.len() < 46 {
        return Err(BarError::format("FILE_ENTRY payload shorter than its fixed fields"));
    }
    let size = u64::from_be_bytes(bytes[0..8].try_into().unwrap());
    let time_last_access = u64::from_be_bytes(bytes[8..16].try_into().unwrap());
    let time_modified = u64::from_be_bytes(bytes[16..24].try_into().unwrap());
    let time_last_changed = u64::from_be_bytes(bytes[24..32].try_into().unwrap());
    let user_id = u32::from_be_bytes(bytes[32..36].try_into().unwrap());
    let group_id = u32::from_be_bytes(bytes[36..40].try_into().unwrap());
    let permission = u32::from_be_bytes(bytes[40..44].try_into().unwrap());
    let name_len = u16::from_be_bytes(bytes[44..46].try_into().unwrap()) as usize;
    let name_end = 46 + name_len;
    if bytes.len() < name_end {
        return Err(BarError::format("FILE_ENTRY name extends past its payload"));
    }
    let name = String::from_utf8(bytes[46..name_end].to_vec())?;
    Ok(FileMetadata {
        size,
        time_last_access,
        time_modified,
        time_last_changed,
        user_id,
        group_id,
        permission,
        name,
    })
}

pub const FILE_DATA_HEADER_LEN: usize = 16;

pub fn encode_file_data_header(part_offset: u64, part_size: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(FILE_DATA_HEADER_LEN);
    out.extend_from_slice(&part_offset.to_be_bytes());
    out.extend_from_slice(&part_size.to_be_bytes());
    out
}

pub fn decode_file_data_header(bytes: &[u8]) -> BarResult<(u64, u64)> {
    if bytes.len() < FILE_DATA_HEADER_LEN {
        return Err(BarError::format("FILE_DATA header fields shorter than 16 bytes"));
    }
    let part_offset = u64::from_be_bytes(bytes[0..8].try_into().unwrap());
    let part_size = u64::from_be_bytes(bytes[8..16].try_into().unwrap());
    Ok((part_offset, part_size))
}

/// Zero-pads `cleartext` up to `alignment` bytes, resets `cipher` to seed 0,
/// and encrypts the padded buffer as a single unit. Every definition field
/// group (a `FILE_ENTRY`'s metadata, a `FILE_DATA`'s offset/size pair) is
/// encrypted this way: independently of the surrounding bulk data stream, so
/// it can be re-serialized in place (e.g. back-patching `partSize`) without
/// disturbing any other cipher's running state.
pub fn encrypt_as_unit(cipher: &mut dyn CipherEngine, alignment: usize, cleartext: &[u8]) -> BarResult<Vec<u8>> {
    let mut padded = cleartext.to_vec();
    let target = align_up(padded.len(), alignment);
    padded.resize(target, 0);
    cipher.reset(0);
    cipher.encrypt(&padded)
}

/// Reverses [`encrypt_as_unit`]. The caller decodes fields directly out of
/// the returned (possibly zero-padded at the tail) plaintext.
pub fn decrypt_as_unit(cipher: &mut dyn CipherEngine, ciphertext: &[u8]) -> BarResult<Vec<u8>> {
    cipher.reset(0);
    cipher.decrypt(ciphertext)
}
