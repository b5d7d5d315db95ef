// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Streaming deflate compressor over `flate2`'s raw `Compress`/`Decompress`,
//! matching the `none`/`zip0`..`zip9` catalog.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use bar_domain::error::{BarError, BarResult};
use bar_domain::services::Compressor;
use bar_domain::value_objects::CompressAlgorithm;

const STAGING_CAPACITY: usize = 64 * 1024;

enum Engine {
    None,
    Compress(Box<Compress>),
    Decompress(Box<Decompress>),
}

/// Block-granular compressor/decompressor. `put_block` feeds input, a
/// staging buffer holds whatever `flate2` hasn't yet drained, and
/// `get_block` serves it back out in the caller's requested chunk size.
///
/// `block_length` is the archive writer/reader's cipher block length, not a
/// compression concept in its own right: `block_is_full`/`block_is_empty`
/// key off of it so the caller can pull exactly one cipher block's worth of
/// compressed bytes out at a time.
pub struct DeflateCompressor {
    engine: Engine,
    staged: Vec<u8>,
    finished: bool,
    block_length: usize,
}

impl DeflateCompressor {
    pub fn compressor(algorithm: CompressAlgorithm, block_length: usize) -> Self {
        match algorithm {
            CompressAlgorithm::None => {
                Self { engine: Engine::None, staged: Vec::new(), finished: false, block_length }
            }
            CompressAlgorithm::Zip(level) => Self {
                engine: Engine::Compress(Box::new(Compress::new(Compression::new(level as u32), false))),
                staged: Vec::with_capacity(STAGING_CAPACITY),
                finished: false,
                block_length,
            },
        }
    }

    pub fn decompressor(algorithm: CompressAlgorithm, block_length: usize) -> Self {
        match algorithm {
            CompressAlgorithm::None => {
                Self { engine: Engine::None, staged: Vec::new(), finished: false, block_length }
            }
            CompressAlgorithm::Zip(_) => Self {
                engine: Engine::Decompress(Box::new(Decompress::new(false))),
                staged: Vec::with_capacity(STAGING_CAPACITY),
                finished: false,
                block_length,
            },
        }
    }
}

impl Compressor for DeflateCompressor {
    fn put_block(&mut self, data: &[u8]) -> BarResult<()> {
        match &mut self.engine {
            Engine::None => {
                self.staged.extend_from_slice(data);
                Ok(())
            }
            Engine::Compress(compress) => {
                let mut out = vec![0u8; data.len().max(STAGING_CAPACITY)];
                let status = compress
                    .compress(data, &mut out, FlushCompress::None)
                    .map_err(|e| BarError::compression(e.to_string()))?;
                let written = compress.total_out() as usize - self.staged_out_so_far();
                self.staged.extend_from_slice(&out[..written]);
                let _ = status;
                Ok(())
            }
            Engine::Decompress(decompress) => {
                let mut out = vec![0u8; data.len().max(STAGING_CAPACITY) * 4];
                let status = decompress
                    .decompress(data, &mut out, FlushDecompress::None)
                    .map_err(|e| BarError::compression(e.to_string()))?;
                let written = decompress.total_out() as usize - self.staged_out_so_far();
                self.staged.extend_from_slice(&out[..written]);
                let _ = status;
                Ok(())
            }
        }
    }

    fn get_block(&mut self, buf: &mut [u8]) -> BarResult<usize> {
        let n = buf.len().min(self.staged.len());
        buf[..n].copy_from_slice(&self.staged[..n]);
        self.staged.drain(..n);
        Ok(n)
    }

    fn flush(&mut self) -> BarResult<()> {
        if self.finished {
            return Ok(());
        }
        match &mut self.engine {
            Engine::None => {}
            Engine::Compress(compress) => loop {
                let mut out = vec![0u8; STAGING_CAPACITY];
                let before = compress.total_out();
                let status = compress
                    .compress(&[], &mut out, FlushCompress::Finish)
                    .map_err(|e| BarError::compression(e.to_string()))?;
                let written = (compress.total_out() - before) as usize;
                self.staged.extend_from_slice(&out[..written]);
                if status == Status::StreamEnd {
                    break;
                }
            },
            Engine::Decompress(decompress) => loop {
                let mut out = vec![0u8; STAGING_CAPACITY];
                let before = decompress.total_out();
                let status = decompress
                    .decompress(&[], &mut out, FlushDecompress::Finish)
                    .map_err(|e| BarError::compression(e.to_string()))?;
                let written = (decompress.total_out() - before) as usize;
                self.staged.extend_from_slice(&out[..written]);
                if status == Status::StreamEnd {
                    break;
                }
            },
        }
        self.finished = true;
        Ok(())
    }

    fn block_is_full(&self) -> bool {
        self.staged.len() >= self.block_length.max(1)
    }

    fn block_is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    fn total_in(&self) -> u64 {
        match &self.engine {
            Engine::None => self.staged.len() as u64,
            Engine::Compress(c) => c.total_in(),
            Engine::Decompress(d) => d.total_in(),
        }
    }

    fn total_out(&self) -> u64 {
        match &self.engine {
            Engine::None => self.staged.len() as u64,
            Engine::Compress(c) => c.total_out(),
            Engine::Decompress(d) => d.total_out(),
        }
    }
}

impl DeflateCompressor {
    fn staged_out_so_far(&self) -> usize {
        self.total_out() as usize - self.staged.len()
    }
}
