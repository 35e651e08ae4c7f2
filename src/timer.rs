// Copyright 2025 The dcSCTP Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::api::AssocTime;
use std::time::Duration;

/// An unreasonable long time, for SCTP purposes. Mainly used as upper bound.
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 3600);

/// A one-shot deadline timer.
///
/// The association owns all its timers and polls them with the current time, as there is no
/// scheduler driving callbacks. A started timer expires exactly once, after which it's stopped
/// until started again. Stopping a timer that isn't running has no effect.
///
/// Backoff (e.g. RTO doubling on T3-rtx expiry) is decided by the owner, which calls
/// [`Timer::set_duration`] before restarting the timer.
#[derive(Debug)]
pub struct Timer {
    duration: Duration,
    next_expiry: Option<AssocTime>,
}

impl Timer {
    pub fn new(duration: Duration) -> Self {
        Self { duration: duration.min(MAX_DURATION), next_expiry: None }
    }

    /// Returns true if the timer has expired at `now`. This method is not idempotent - a timer
    /// that expires is stopped, so calling it again returns false.
    pub fn expire(&mut self, now: AssocTime) -> bool {
        match self.next_expiry {
            Some(expiry) if expiry <= now => {
                self.next_expiry = None;
                true
            }
            _ => false,
        }
    }

    pub fn next_expiry(&self) -> Option<AssocTime> {
        self.next_expiry
    }

    pub fn is_running(&self) -> bool {
        self.next_expiry.is_some()
    }

    pub fn stop(&mut self) {
        self.next_expiry = None;
    }

    /// Starts the timer. If it's already running, it's restarted with its current duration.
    pub fn start(&mut self, now: AssocTime) {
        self.next_expiry = Some(now + self.duration);
    }

    /// Starts the timer unless it's already running.
    pub fn start_if_stopped(&mut self, now: AssocTime) {
        if !self.is_running() {
            self.start(now);
        }
    }

    /// Updates the timer's duration. This doesn't change the timer's current expiration time in
    /// case it's running.
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = duration.min(MAX_DURATION);
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}
