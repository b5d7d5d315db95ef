// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Removable-media volume controller.
//!
//! One instance per archive. Tracks which numbered volume is currently
//! loaded and drives the unload/request/load handshake whenever the Device
//! or DVD storage backend needs a fresh one.

use std::collections::HashMap;

use tokio::process::Command;

use bar_domain::error::{BarError, BarResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeState {
    Unknown,
    Unloaded,
    Waiting,
    Loaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeEvent {
    NeedNew,
    Loaded,
    Failed,
    Finalize,
}

/// How the controller asks an operator (human or automation) to mount the
/// next volume. Tried in this order: a caller-supplied callback, a
/// configured external command, an interactive prompt.
pub enum VolumeRequest {
    Callback(Box<dyn Fn(u32) -> BarResult<()> + Send + Sync>),
    Command { template: String },
    InteractivePrompt,
}

/// Macro substitution shared with the Device/DVD storage backend:
/// `%device`, `%file`, `%image`, `%number`, `%sectors`.
pub fn substitute_macros(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("%{key}"), value);
    }
    out
}

pub struct VolumeController {
    state: VolumeState,
    current_volume: u32,
    wait_first_volume: bool,
    device: Option<String>,
    request: VolumeRequest,
}

impl VolumeController {
    pub fn new(device: Option<String>, wait_first_volume: bool, request: VolumeRequest) -> Self {
        Self {
            state: VolumeState::Unknown,
            current_volume: if wait_first_volume { 0 } else { 1 },
            wait_first_volume,
            device,
            request,
        }
    }

    pub fn state(&self) -> VolumeState {
        self.state
    }

    pub fn current_volume(&self) -> u32 {
        self.current_volume
    }

    pub fn apply(&mut self, event: VolumeEvent) {
        self.state = match (self.state, event) {
            (_, VolumeEvent::NeedNew) => VolumeState::Waiting,
            (VolumeState::Waiting, VolumeEvent::Loaded) => VolumeState::Loaded,
            (_, VolumeEvent::Failed) => VolumeState::Unloaded,
            (_, VolumeEvent::Finalize) => VolumeState::Unloaded,
            (state, _) => state,
        };
    }

    /// Runs the unload -> request -> load handshake for the next volume
    /// number, advancing `current_volume` and transitioning to `Loaded` on
    /// success.
    pub async fn ensure_loaded(&mut self) -> BarResult<u32> {
        if self.state == VolumeState::Loaded {
            return Ok(self.current_volume);
        }
        self.apply(VolumeEvent::NeedNew);

        let next = self.current_volume + if self.current_volume == 0 { 1 } else { 0 };
        let requested = next.max(1);

        self.issue_request(requested).await.map_err(|e| {
            self.apply(VolumeEvent::Failed);
            e
        })?;

        self.current_volume = requested;
        self.apply(VolumeEvent::Loaded);
        Ok(self.current_volume)
    }

    pub fn finalize(&mut self) {
        self.apply(VolumeEvent::Finalize);
    }

    async fn issue_request(&self, volume_number: u32) -> BarResult<()> {
        match &self.request {
            VolumeRequest::Callback(callback) => callback(volume_number),
            VolumeRequest::Command { template } => {
                let mut vars = HashMap::new();
                vars.insert("device", self.device.clone().unwrap_or_default());
                vars.insert("number", volume_number.to_string());
                let command_line = substitute_macros(template, &vars);
                let status = Command::new("sh")
                    .arg("-c")
                    .arg(&command_line)
                    .status()
                    .await
                    .map_err(|e| BarError::media(format!("volume request command failed to start: {e}")))?;
                if !status.success() {
                    return Err(BarError::media(format!(
                        "volume request command exited with {status}"
                    )));
                }
                Ok(())
            }
            VolumeRequest::InteractivePrompt => {
                eprintln!("Insert volume {volume_number} and press ENTER to continue...");
                let mut line = String::new();
                std::io::stdin()
                    .read_line(&mut line)
                    .map_err(|e| BarError::media(format!("failed to read volume prompt: {e}")))?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn macro_substitution_replaces_all_placeholders() {
        let mut vars = HashMap::new();
        vars.insert("device", "/dev/sr0".to_string());
        vars.insert("number", "3".to_string());
        let out = substitute_macros("burn %device volume %number", &vars);
        assert_eq!(out, "burn /dev/sr0 volume 3");
    }

    #[tokio::test]
    async fn ensure_loaded_invokes_callback_and_advances_volume() {
        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = seen.clone();
        let mut controller = VolumeController::new(
            None,
            false,
            VolumeRequest::Callback(Box::new(move |n| {
                seen_clone.store(n, Ordering::SeqCst);
                Ok(())
            })),
        );

        let n = controller.ensure_loaded().await.unwrap();
        assert_eq!(n, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(controller.state(), VolumeState::Loaded);

        // Already loaded: no further callback invocation required.
        let n2 = controller.ensure_loaded().await.unwrap();
        assert_eq!(n2, 1);
    }

    #[tokio::test]
    async fn failed_request_leaves_controller_unloaded() {
        let mut controller = VolumeController::new(
            None,
            false,
            VolumeRequest::Callback(Box::new(|_| Err(BarError::media("no medium")))),
        );
        assert!(controller.ensure_loaded().await.is_err());
        assert_eq!(controller.state(), VolumeState::Unloaded);
    }

    #[test]
    fn wait_first_volume_starts_numbering_at_zero() {
        let controller =
            VolumeController::new(None, true, VolumeRequest::InteractivePrompt);
        assert_eq!(controller.current_volume(), 0);
    }
}
