// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Rolling-window bandwidth limiter for remote storage transfers.
//!
//! Throttling is approximate: [`BandwidthLimiter::throttle`] is called after
//! each write and sleeps just long enough to bring the measured rate over
//! the trailing [`WINDOW`] back under the configured limit.

use std::time::{Duration, Instant};

use tokio::time::sleep;

const WINDOW: Duration = Duration::from_secs(1);

pub struct BandwidthLimiter {
    limit_bytes_per_sec: Option<u64>,
    window_start: Instant,
    window_bytes: u64,
}

impl BandwidthLimiter {
    pub fn new(limit_bytes_per_sec: Option<u64>) -> Self {
        Self { limit_bytes_per_sec, window_start: Instant::now(), window_bytes: 0 }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Records `bytes` transferred and sleeps if the trailing-window rate
    /// exceeds the configured limit.
    pub async fn throttle(&mut self, bytes: u64) {
        let Some(limit) = self.limit_bytes_per_sec else { return };
        if limit == 0 {
            return;
        }

        let elapsed = self.window_start.elapsed();
        if elapsed >= WINDOW {
            self.window_start = Instant::now();
            self.window_bytes = 0;
        }
        self.window_bytes += bytes;

        let expected = Duration::from_secs_f64(self.window_bytes as f64 / limit as f64);
        let actual = self.window_start.elapsed();
        if expected > actual {
            sleep(expected - actual).await;
        }
    }
}
