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

use crate::api::CongestionControlModule;
use crate::api::MaxBurstVariant;
use crate::api::Options;
use crate::types::Tsn;
use std::cmp::max;
use std::cmp::min;

/// One row of the HighSpeed TCP response function, see
/// <https://datatracker.ietf.org/doc/html/rfc3649#appendix-B>.
struct HighSpeedEntry {
    /// Lower bound of this row, in segments.
    threshold: usize,
    /// Number of segments the window grows per window of acknowledged data.
    increase: f64,
    /// Fraction of the window given up on packet loss.
    decrease: f64,
}

const HIGH_SPEED_TABLE: [HighSpeedEntry; 73] = [
    HighSpeedEntry { threshold: 38, increase: 1.0, decrease: 0.50 },
    HighSpeedEntry { threshold: 118, increase: 2.0, decrease: 0.44 },
    HighSpeedEntry { threshold: 221, increase: 3.0, decrease: 0.41 },
    HighSpeedEntry { threshold: 347, increase: 4.0, decrease: 0.38 },
    HighSpeedEntry { threshold: 495, increase: 5.0, decrease: 0.37 },
    HighSpeedEntry { threshold: 663, increase: 6.0, decrease: 0.35 },
    HighSpeedEntry { threshold: 851, increase: 7.0, decrease: 0.34 },
    HighSpeedEntry { threshold: 1058, increase: 8.0, decrease: 0.33 },
    HighSpeedEntry { threshold: 1284, increase: 9.0, decrease: 0.32 },
    HighSpeedEntry { threshold: 1529, increase: 10.0, decrease: 0.31 },
    HighSpeedEntry { threshold: 1793, increase: 11.0, decrease: 0.30 },
    HighSpeedEntry { threshold: 2076, increase: 12.0, decrease: 0.29 },
    HighSpeedEntry { threshold: 2378, increase: 13.0, decrease: 0.28 },
    HighSpeedEntry { threshold: 2699, increase: 14.0, decrease: 0.28 },
    HighSpeedEntry { threshold: 3039, increase: 15.0, decrease: 0.27 },
    HighSpeedEntry { threshold: 3399, increase: 16.0, decrease: 0.27 },
    HighSpeedEntry { threshold: 3778, increase: 17.0, decrease: 0.26 },
    HighSpeedEntry { threshold: 4177, increase: 18.0, decrease: 0.26 },
    HighSpeedEntry { threshold: 4596, increase: 19.0, decrease: 0.25 },
    HighSpeedEntry { threshold: 5036, increase: 20.0, decrease: 0.25 },
    HighSpeedEntry { threshold: 5497, increase: 21.0, decrease: 0.24 },
    HighSpeedEntry { threshold: 5979, increase: 22.0, decrease: 0.24 },
    HighSpeedEntry { threshold: 6483, increase: 23.0, decrease: 0.23 },
    HighSpeedEntry { threshold: 7009, increase: 24.0, decrease: 0.23 },
    HighSpeedEntry { threshold: 7558, increase: 25.0, decrease: 0.22 },
    HighSpeedEntry { threshold: 8130, increase: 26.0, decrease: 0.22 },
    HighSpeedEntry { threshold: 8726, increase: 27.0, decrease: 0.22 },
    HighSpeedEntry { threshold: 9346, increase: 28.0, decrease: 0.21 },
    HighSpeedEntry { threshold: 9991, increase: 29.0, decrease: 0.21 },
    HighSpeedEntry { threshold: 10661, increase: 30.0, decrease: 0.21 },
    HighSpeedEntry { threshold: 11358, increase: 31.0, decrease: 0.20 },
    HighSpeedEntry { threshold: 12082, increase: 32.0, decrease: 0.20 },
    HighSpeedEntry { threshold: 12834, increase: 33.0, decrease: 0.20 },
    HighSpeedEntry { threshold: 13614, increase: 34.0, decrease: 0.19 },
    HighSpeedEntry { threshold: 14424, increase: 35.0, decrease: 0.19 },
    HighSpeedEntry { threshold: 15265, increase: 36.0, decrease: 0.19 },
    HighSpeedEntry { threshold: 16137, increase: 37.0, decrease: 0.19 },
    HighSpeedEntry { threshold: 17042, increase: 38.0, decrease: 0.18 },
    HighSpeedEntry { threshold: 17981, increase: 39.0, decrease: 0.18 },
    HighSpeedEntry { threshold: 18955, increase: 40.0, decrease: 0.18 },
    HighSpeedEntry { threshold: 19965, increase: 41.0, decrease: 0.17 },
    HighSpeedEntry { threshold: 21013, increase: 42.0, decrease: 0.17 },
    HighSpeedEntry { threshold: 22101, increase: 43.0, decrease: 0.17 },
    HighSpeedEntry { threshold: 23230, increase: 44.0, decrease: 0.17 },
    HighSpeedEntry { threshold: 24402, increase: 45.0, decrease: 0.16 },
    HighSpeedEntry { threshold: 25618, increase: 46.0, decrease: 0.16 },
    HighSpeedEntry { threshold: 26881, increase: 47.0, decrease: 0.16 },
    HighSpeedEntry { threshold: 28193, increase: 48.0, decrease: 0.16 },
    HighSpeedEntry { threshold: 29557, increase: 49.0, decrease: 0.15 },
    HighSpeedEntry { threshold: 30975, increase: 50.0, decrease: 0.15 },
    HighSpeedEntry { threshold: 32450, increase: 51.0, decrease: 0.15 },
    HighSpeedEntry { threshold: 33986, increase: 52.0, decrease: 0.15 },
    HighSpeedEntry { threshold: 35586, increase: 53.0, decrease: 0.14 },
    HighSpeedEntry { threshold: 37253, increase: 54.0, decrease: 0.14 },
    HighSpeedEntry { threshold: 38992, increase: 55.0, decrease: 0.14 },
    HighSpeedEntry { threshold: 40808, increase: 56.0, decrease: 0.14 },
    HighSpeedEntry { threshold: 42707, increase: 57.0, decrease: 0.13 },
    HighSpeedEntry { threshold: 44694, increase: 58.0, decrease: 0.13 },
    HighSpeedEntry { threshold: 46776, increase: 59.0, decrease: 0.13 },
    HighSpeedEntry { threshold: 48961, increase: 60.0, decrease: 0.13 },
    HighSpeedEntry { threshold: 51258, increase: 61.0, decrease: 0.13 },
    HighSpeedEntry { threshold: 53677, increase: 62.0, decrease: 0.12 },
    HighSpeedEntry { threshold: 56230, increase: 63.0, decrease: 0.12 },
    HighSpeedEntry { threshold: 58932, increase: 64.0, decrease: 0.12 },
    HighSpeedEntry { threshold: 61799, increase: 65.0, decrease: 0.12 },
    HighSpeedEntry { threshold: 64851, increase: 66.0, decrease: 0.11 },
    HighSpeedEntry { threshold: 68113, increase: 67.0, decrease: 0.11 },
    HighSpeedEntry { threshold: 71617, increase: 68.0, decrease: 0.11 },
    HighSpeedEntry { threshold: 75401, increase: 69.0, decrease: 0.10 },
    HighSpeedEntry { threshold: 79517, increase: 70.0, decrease: 0.10 },
    HighSpeedEntry { threshold: 84035, increase: 71.0, decrease: 0.10 },
    HighSpeedEntry { threshold: 89053, increase: 72.0, decrease: 0.10 },
    HighSpeedEntry { threshold: 94717, increase: 73.0, decrease: 0.09 },
];

/// The congestion control algorithm of a path, selected by [`Options::cc_module`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CongestionControl {
    /// <https://datatracker.ietf.org/doc/html/rfc4960#section-7.2>
    Rfc4960,
    /// <https://datatracker.ietf.org/doc/html/rfc3649>, tracking the current row of the table.
    HighSpeed { index: usize },
}

impl CongestionControl {
    pub fn new(module: CongestionControlModule) -> Self {
        match module {
            CongestionControlModule::Rfc4960 => CongestionControl::Rfc4960,
            CongestionControlModule::HighSpeed => CongestionControl::HighSpeed { index: 0 },
        }
    }

    fn increase_factor(&self) -> f64 {
        match self {
            CongestionControl::Rfc4960 => 1.0,
            CongestionControl::HighSpeed { index } => HIGH_SPEED_TABLE[*index].increase,
        }
    }

    fn decrease_factor(&self) -> f64 {
        match self {
            CongestionControl::Rfc4960 => 0.5,
            CongestionControl::HighSpeed { index } => HIGH_SPEED_TABLE[*index].decrease,
        }
    }

    /// Moves to the table row matching the current window.
    fn update_index(&mut self, cwnd: usize, mtu: usize) {
        if let CongestionControl::HighSpeed { index } = self {
            if cwnd > HIGH_SPEED_TABLE[*index].threshold * mtu {
                while *index < HIGH_SPEED_TABLE.len() - 1
                    && cwnd > HIGH_SPEED_TABLE[*index].threshold * mtu
                {
                    *index += 1;
                }
            } else {
                while *index > 0 && cwnd <= HIGH_SPEED_TABLE[*index].threshold * mtu {
                    *index -= 1;
                }
            }
        }
    }

    fn reset_index(&mut self) {
        if let CongestionControl::HighSpeed { index } = self {
            *index = 0;
        }
    }
}

/// Returns the initial congestion window.
///
/// From <https://datatracker.ietf.org/doc/html/rfc4960#section-7.2.1>:
///
///   The initial cwnd before DATA transmission or after a sufficiently long idle period MUST be
///   set to min(4*MTU, max (2*MTU, 4380 bytes)).
pub fn initial_cwnd(options: &Options) -> usize {
    if options.initial_window > 0 {
        options.initial_window as usize * options.mtu
    } else {
        min(4 * options.mtu, max(2 * options.mtu, 4380))
    }
}

/// Congestion control variables of a single path.
#[derive(Debug)]
pub struct CongestionWindow {
    algorithm: CongestionControl,
    mtu: usize,
    fast_recovery_supported: bool,

    /// Congestion Window. Number of bytes that may be in-flight on this path.
    cwnd: usize,

    /// Slow start threshold.
    ssthresh: usize,

    /// Partial bytes acked, used in congestion avoidance.
    partial_bytes_acked: usize,

    /// The window used for sending by the temporary max burst variants.
    temp_cwnd: usize,

    /// If set, fast recovery is active until this TSN has been cumulative acked.
    fast_recovery_exit_point: Option<Tsn>,
}

impl CongestionWindow {
    pub fn new(options: &Options, peer_rwnd: usize) -> Self {
        let cwnd = initial_cwnd(options);
        Self {
            algorithm: CongestionControl::new(options.cc_module),
            mtu: options.mtu,
            fast_recovery_supported: options.fast_recovery_supported,
            cwnd,
            ssthresh: peer_rwnd,
            partial_bytes_acked: 0,
            temp_cwnd: cwnd,
            fast_recovery_exit_point: None,
        }
    }

    pub fn cwnd(&self) -> usize {
        self.cwnd
    }

    pub fn ssthresh(&self) -> usize {
        self.ssthresh
    }

    pub fn partial_bytes_acked(&self) -> usize {
        self.partial_bytes_acked
    }

    pub fn algorithm(&self) -> CongestionControl {
        self.algorithm
    }

    pub fn is_in_fast_recovery(&self) -> bool {
        self.fast_recovery_exit_point.is_some()
    }

    pub fn fast_recovery_exit_point(&self) -> Option<Tsn> {
        self.fast_recovery_exit_point
    }

    /// Returns the window that limits sending, which may be lowered temporarily by max burst.
    pub fn sending_window(&self, variant: MaxBurstVariant) -> usize {
        match variant {
            MaxBurstVariant::UseItOrLoseItTempCwnd
            | MaxBurstVariant::CongestionWindowLimitingTempCwnd => self.temp_cwnd,
            _ => self.cwnd,
        }
    }

    /// Updates the window with bytes newly acknowledged on this path by a SACK.
    ///
    /// `outstanding_before` is the number of bytes outstanding on the path before the SACK was
    /// processed and `outstanding_after` the number of bytes still outstanding.
    pub fn on_bytes_acked(
        &mut self,
        acked_bytes: usize,
        cum_ack_advanced: bool,
        outstanding_before: usize,
        outstanding_after: usize,
    ) {
        if self.is_in_fast_recovery() {
            log::debug!("fast recovery active. No cwnd increase, cwnd={}", self.cwnd);
            return;
        }

        let old_cwnd = self.cwnd;
        let old_pba = self.partial_bytes_acked;
        if self.cwnd <= self.ssthresh {
            self.partial_bytes_acked = 0;
            if cum_ack_advanced && outstanding_before >= self.cwnd {
                // From <https://datatracker.ietf.org/doc/html/rfc4960#section-7.2.1>:
                //
                //   Only when these three conditions are met can the cwnd be increased;
                //   otherwise, the cwnd MUST not be increased. If these conditions are met,
                //   then cwnd MUST be increased by, at most, the lesser of 1) the total size of
                //   the previously outstanding DATA chunk(s) acknowledged, and 2) the
                //   destination's path MTU.
                self.cwnd += min(self.mtu, acked_bytes);
                log::debug!(
                    "SS increase cwnd={} ({}), ssthresh={}",
                    self.cwnd,
                    old_cwnd,
                    self.ssthresh
                );
            }
        } else {
            // From <https://datatracker.ietf.org/doc/html/rfc4960#section-7.2.2>:
            //
            //   Whenever cwnd is greater than ssthresh, upon each SACK arrival that advances
            //   the Cumulative TSN Ack Point, increase partial_bytes_acked by the total number
            //   of bytes of all new chunks acknowledged in that SACK including chunks
            //   acknowledged by the new Cumulative TSN Ack and by Gap Ack Blocks.
            self.partial_bytes_acked += acked_bytes;
            self.algorithm.update_index(self.cwnd, self.mtu);
            let factor = self.algorithm.increase_factor();

            if cum_ack_advanced
                && outstanding_before >= self.cwnd
                && self.partial_bytes_acked >= self.cwnd
            {
                // From <https://datatracker.ietf.org/doc/html/rfc4960#section-7.2.2>:
                //
                //   When partial_bytes_acked is equal to or greater than cwnd and before the
                //   arrival of the SACK the sender had cwnd or more bytes of data outstanding
                //   (i.e., before arrival of the SACK, flightsize was greater than or equal to
                //   cwnd), increase cwnd by MTU, and reset partial_bytes_acked to
                //   (partial_bytes_acked - cwnd).
                self.cwnd += (factor * self.mtu as f64).round_ties_even() as usize;
                self.partial_bytes_acked = self.partial_bytes_acked.saturating_sub(self.cwnd);
                log::debug!(
                    "CA increase cwnd={} ({}), ssthresh={}, pba={} ({})",
                    self.cwnd,
                    old_cwnd,
                    self.ssthresh,
                    self.partial_bytes_acked,
                    old_pba
                );
            } else {
                log::debug!(
                    "CA unchanged cwnd={} ({}), ssthresh={}, pba={} ({})",
                    self.cwnd,
                    old_cwnd,
                    self.ssthresh,
                    self.partial_bytes_acked,
                    old_pba
                );
            }
        }

        // From <https://datatracker.ietf.org/doc/html/rfc4960#section-7.2.2>:
        //
        //   Same as in the slow start, when the sender does not transmit DATA on a given
        //   transport address, the cwnd of the transport address should be adjusted to 2*MTU.
        //   [...] when all of the data transmitted by the sender has been acknowledged by the
        //   receiver, partial_bytes_acked is initialized to 0.
        if outstanding_after == 0 {
            self.partial_bytes_acked = 0;
        }
    }

    /// Reacts to packet loss detected by fast retransmit. `highest_outstanding` is the highest TSN
    /// still outstanding on this path, which becomes the fast recovery exit point.
    pub fn on_packet_loss(&mut self, highest_outstanding: Tsn) {
        if self.is_in_fast_recovery() {
            // From <https://datatracker.ietf.org/doc/html/rfc4960#section-7.2.4>:
            //
            //   While in Fast Recovery, the ssthresh and cwnd SHOULD NOT change for any
            //   destinations due to a subsequent Fast Recovery event (i.e., one SHOULD NOT reduce
            //   the cwnd further due to a subsequent Fast Retransmit).
            log::debug!("packet loss detected (fast recovery). No changes.");
            return;
        }

        // From <https://datatracker.ietf.org/doc/html/rfc4960#section-7.2.3>:
        //
        //   Upon detection of packet losses from SACK (see Section 7.2.4), an endpoint should do
        //   the following:
        //
        //      ssthresh = max(cwnd/2, 4*MTU)
        //      cwnd = ssthresh
        //      partial_bytes_acked = 0
        let old_cwnd = self.cwnd;
        let old_pba = self.partial_bytes_acked;
        self.ssthresh = self.reduced_window();
        self.cwnd = self.ssthresh;
        self.partial_bytes_acked = 0;
        self.algorithm.update_index(self.cwnd, self.mtu);
        log::debug!(
            "packet loss detected (not fast recovery). cwnd={} ({}), ssthresh={}, pba={} ({})",
            self.cwnd,
            old_cwnd,
            self.ssthresh,
            self.partial_bytes_acked,
            old_pba
        );

        if self.fast_recovery_supported {
            // From <https://datatracker.ietf.org/doc/html/rfc4960#section-7.2.4>:
            //
            //   If not in Fast Recovery, enter Fast Recovery and mark the highest outstanding TSN
            //   as the Fast Recovery exit point.
            self.fast_recovery_exit_point = Some(highest_outstanding);
            log::debug!("fast recovery initiated with exit_point={}", highest_outstanding);
        }
    }

    /// Leaves fast recovery once the exit point has been cumulatively acknowledged.
    pub fn maybe_exit_fast_recovery(&mut self, cumulative_tsn_ack: Tsn) {
        if let Some(exit_point) = self.fast_recovery_exit_point {
            if cumulative_tsn_ack >= exit_point {
                log::debug!("fast recovery exited at cum_ack_tsn={}", cumulative_tsn_ack);
                self.fast_recovery_exit_point = None;
            }
        }
    }

    /// Reacts to the expiry of the path's T3-rtx timer.
    pub fn on_retransmission_timeout(&mut self) {
        // From <https://datatracker.ietf.org/doc/html/rfc4960#section-7.2.3>:
        //
        //   When the T3-rtx timer expires on an address, SCTP should perform slow start by:
        //
        //      ssthresh = max(cwnd/2, 4*MTU)
        //      cwnd = 1*MTU
        let old_cwnd = self.cwnd;
        self.ssthresh = self.reduced_window();
        self.cwnd = self.mtu;
        self.algorithm.reset_index();

        // Errata: <https://datatracker.ietf.org/doc/html/rfc8540#section-3.11>
        self.partial_bytes_acked = 0;
        self.fast_recovery_exit_point = None;
        log::debug!(
            "t3-rtx expired. cwnd={} ({}), ssthresh={}",
            self.cwnd,
            old_cwnd,
            self.ssthresh
        );
    }

    /// Limits the window before a sending round so that at most `max_burst` packets can be sent
    /// in one go, for the variants that do it by adjusting the window.
    pub fn apply_max_burst(
        &mut self,
        variant: MaxBurstVariant,
        max_burst: u32,
        outstanding_bytes: usize,
    ) {
        let limit = outstanding_bytes + max_burst as usize * self.mtu;
        let old_cwnd = self.cwnd;
        match variant {
            MaxBurstVariant::UseItOrLoseIt | MaxBurstVariant::CongestionWindowLimiting
                if self.cwnd > limit =>
            {
                self.cwnd = limit;
                if variant == MaxBurstVariant::CongestionWindowLimiting
                    && self.ssthresh < self.cwnd
                {
                    self.ssthresh = self.cwnd;
                }
                log::debug!(
                    "max burst limited cwnd={} ({}), ssthresh={}",
                    self.cwnd,
                    old_cwnd,
                    self.ssthresh
                );
            }
            MaxBurstVariant::UseItOrLoseItTempCwnd
            | MaxBurstVariant::CongestionWindowLimitingTempCwnd
                if self.cwnd > limit =>
            {
                self.temp_cwnd = limit;
                if variant == MaxBurstVariant::CongestionWindowLimitingTempCwnd
                    && self.ssthresh < self.temp_cwnd
                {
                    self.ssthresh = self.temp_cwnd;
                }
            }
            MaxBurstVariant::UseItOrLoseIt
            | MaxBurstVariant::CongestionWindowLimiting
            | MaxBurstVariant::UseItOrLoseItTempCwnd
            | MaxBurstVariant::CongestionWindowLimitingTempCwnd => {
                self.temp_cwnd = self.cwnd;
            }
            MaxBurstVariant::MaxBurst
            | MaxBurstVariant::AggressiveMaxBurst
            | MaxBurstVariant::TotalMaxBurst => {}
        }
    }

    fn reduced_window(&self) -> usize {
        let decrease = (self.algorithm.decrease_factor() * self.cwnd as f64).round_ties_even();
        max(self.cwnd - decrease as usize, 4 * self.mtu)
    }

    /// Overrides the current congestion window size.
    #[cfg(test)]
    pub fn set_cwnd(&mut self, cwnd: usize) {
        self.cwnd = cwnd;
        self.temp_cwnd = cwnd;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MTU: usize = 1500;

    fn options() -> Options {
        Options { mtu: MTU, ..Default::default() }
    }

    #[test]
    fn initial_window_follows_rfc4960() {
        assert_eq!(initial_cwnd(&options()), 4380);
        assert_eq!(initial_cwnd(&Options { mtu: 1000, ..Default::default() }), 4000);
        assert_eq!(initial_cwnd(&Options { mtu: 500, ..Default::default() }), 2000);
        assert_eq!(initial_cwnd(&Options { initial_window: 10, ..options() }), 15000);
    }

    #[test]
    fn initial_ssthresh_is_peer_rwnd() {
        let cc = CongestionWindow::new(&options(), 100_000);
        assert_eq!(cc.cwnd(), 4380);
        assert_eq!(cc.ssthresh(), 100_000);
        assert!(!cc.is_in_fast_recovery());
    }

    #[test]
    fn slow_start_increases_by_at_most_one_mtu() {
        let mut cc = CongestionWindow::new(&options(), 100_000);
        cc.on_bytes_acked(3000, true, 4380, 1380);
        assert_eq!(cc.cwnd(), 4380 + MTU);

        cc.on_bytes_acked(500, true, 6000, 1000);
        assert_eq!(cc.cwnd(), 4380 + MTU + 500);
    }

    #[test]
    fn slow_start_requires_full_window_and_advanced_cum_ack() {
        let mut cc = CongestionWindow::new(&options(), 100_000);
        cc.on_bytes_acked(1000, true, 2000, 1000);
        assert_eq!(cc.cwnd(), 4380);

        cc.on_bytes_acked(1000, false, 5000, 4000);
        assert_eq!(cc.cwnd(), 4380);
    }

    #[test]
    fn congestion_avoidance_grows_one_mtu_per_window() {
        let mut cc = CongestionWindow::new(&options(), 10_000);
        cc.set_cwnd(12_000);

        cc.on_bytes_acked(6000, true, 12_000, 6000);
        assert_eq!(cc.cwnd(), 12_000);
        assert_eq!(cc.partial_bytes_acked(), 6000);

        cc.on_bytes_acked(6000, true, 12_000, 6000);
        assert_eq!(cc.cwnd(), 13_500);
        assert_eq!(cc.partial_bytes_acked(), 0);
    }

    #[test]
    fn partial_bytes_acked_is_reset_when_nothing_outstanding() {
        let mut cc = CongestionWindow::new(&options(), 10_000);
        cc.set_cwnd(12_000);
        cc.on_bytes_acked(6000, true, 6000, 0);
        assert_eq!(cc.partial_bytes_acked(), 0);
    }

    #[test]
    fn packet_loss_halves_window_and_enters_fast_recovery() {
        let mut cc = CongestionWindow::new(&options(), 100_000);
        cc.set_cwnd(20_000);
        cc.on_packet_loss(Tsn(50));
        assert_eq!(cc.ssthresh(), 10_000);
        assert_eq!(cc.cwnd(), 10_000);
        assert_eq!(cc.fast_recovery_exit_point(), Some(Tsn(50)));

        // Not reduced again during fast recovery.
        cc.on_packet_loss(Tsn(60));
        assert_eq!(cc.cwnd(), 10_000);
        assert_eq!(cc.fast_recovery_exit_point(), Some(Tsn(50)));

        // And no increase.
        cc.on_bytes_acked(10_000, true, 20_000, 10_000);
        assert_eq!(cc.cwnd(), 10_000);

        cc.maybe_exit_fast_recovery(Tsn(49));
        assert!(cc.is_in_fast_recovery());
        cc.maybe_exit_fast_recovery(Tsn(50));
        assert!(!cc.is_in_fast_recovery());
    }

    #[test]
    fn packet_loss_keeps_at_least_four_mtus() {
        let mut cc = CongestionWindow::new(&options(), 100_000);
        cc.set_cwnd(7000);
        cc.on_packet_loss(Tsn(1));
        assert_eq!(cc.cwnd(), 4 * MTU);
        assert_eq!(cc.ssthresh(), 4 * MTU);
    }

    #[test]
    fn no_fast_recovery_when_unsupported() {
        let mut cc = CongestionWindow::new(
            &Options { fast_recovery_supported: false, ..options() },
            100_000,
        );
        cc.set_cwnd(20_000);
        cc.on_packet_loss(Tsn(50));
        assert!(!cc.is_in_fast_recovery());
        assert_eq!(cc.cwnd(), 10_000);

        // Reduced again, as there is no fast recovery.
        cc.on_packet_loss(Tsn(50));
        assert_eq!(cc.cwnd(), 6000);
    }

    #[test]
    fn retransmission_timeout_collapses_window() {
        let mut cc = CongestionWindow::new(&options(), 100_000);
        cc.set_cwnd(20_000);
        cc.on_packet_loss(Tsn(10));
        cc.on_retransmission_timeout();
        assert_eq!(cc.cwnd(), MTU);
        assert_eq!(cc.ssthresh(), 6000);
        assert!(!cc.is_in_fast_recovery());
    }

    #[test]
    fn high_speed_uses_standard_response_for_small_windows() {
        let options = Options { cc_module: CongestionControlModule::HighSpeed, ..options() };
        let mut cc = CongestionWindow::new(&options, 1000);
        cc.set_cwnd(10 * MTU);
        cc.on_bytes_acked(10 * MTU, true, 10 * MTU, 0);
        assert_eq!(cc.cwnd(), 11 * MTU);
        assert_eq!(cc.algorithm(), CongestionControl::HighSpeed { index: 0 });
    }

    #[test]
    fn high_speed_grows_faster_for_large_windows() {
        let options = Options { cc_module: CongestionControlModule::HighSpeed, ..options() };
        let mut cc = CongestionWindow::new(&options, 1000);
        cc.set_cwnd(200 * MTU);
        cc.on_bytes_acked(200 * MTU, true, 200 * MTU, 0);
        // 118 < 200 <= 221 segments selects the third row.
        assert_eq!(cc.algorithm(), CongestionControl::HighSpeed { index: 2 });
        assert_eq!(cc.cwnd(), 203 * MTU);
    }

    #[test]
    fn high_speed_decreases_less_for_large_windows() {
        let options = Options { cc_module: CongestionControlModule::HighSpeed, ..options() };
        let mut cc = CongestionWindow::new(&options, 1000);
        cc.set_cwnd(200 * MTU);
        cc.on_bytes_acked(1, true, 0, 1);
        assert_eq!(cc.algorithm(), CongestionControl::HighSpeed { index: 2 });

        cc.on_packet_loss(Tsn(1));
        // 300000 - rint(0.41 * 300000)
        assert_eq!(cc.cwnd(), 177_000);
        assert_eq!(cc.algorithm(), CongestionControl::HighSpeed { index: 0 });
    }

    #[test]
    fn high_speed_row_is_reset_on_retransmission_timeout() {
        let options = Options { cc_module: CongestionControlModule::HighSpeed, ..options() };
        let mut cc = CongestionWindow::new(&options, 1000);
        cc.set_cwnd(1000 * MTU);
        cc.on_bytes_acked(1, true, 0, 1);
        // 851 < 1000 <= 1058 segments.
        assert_eq!(cc.algorithm(), CongestionControl::HighSpeed { index: 7 });

        cc.on_retransmission_timeout();
        assert_eq!(cc.algorithm(), CongestionControl::HighSpeed { index: 0 });
        assert_eq!(cc.cwnd(), MTU);
    }

    #[test]
    fn use_it_or_lose_it_lowers_cwnd() {
        let mut cc = CongestionWindow::new(&options(), 100_000);
        cc.set_cwnd(20_000);
        cc.apply_max_burst(MaxBurstVariant::UseItOrLoseIt, 4, 3000);
        assert_eq!(cc.cwnd(), 9000);
        assert_eq!(cc.ssthresh(), 100_000);
        assert_eq!(cc.sending_window(MaxBurstVariant::UseItOrLoseIt), 9000);
    }

    #[test]
    fn congestion_window_limiting_remembers_window_in_ssthresh() {
        let mut cc = CongestionWindow::new(&options(), 1000);
        cc.set_cwnd(20_000);
        cc.apply_max_burst(MaxBurstVariant::CongestionWindowLimiting, 4, 3000);
        assert_eq!(cc.cwnd(), 9000);
        assert_eq!(cc.ssthresh(), 9000);
    }

    #[test]
    fn temporary_variants_keep_cwnd() {
        let mut cc = CongestionWindow::new(&options(), 1000);
        cc.set_cwnd(20_000);
        cc.apply_max_burst(MaxBurstVariant::CongestionWindowLimitingTempCwnd, 4, 3000);
        assert_eq!(cc.cwnd(), 20_000);
        assert_eq!(cc.ssthresh(), 9000);
        assert_eq!(cc.sending_window(MaxBurstVariant::CongestionWindowLimitingTempCwnd), 9000);

        // Below the limit, the temporary window follows cwnd.
        cc.apply_max_burst(MaxBurstVariant::UseItOrLoseItTempCwnd, 4, 15_000);
        assert_eq!(cc.sending_window(MaxBurstVariant::UseItOrLoseItTempCwnd), 20_000);
    }

    #[test]
    fn packet_counting_variants_leave_window_alone() {
        let mut cc = CongestionWindow::new(&options(), 1000);
        cc.set_cwnd(20_000);
        for variant in [
            MaxBurstVariant::MaxBurst,
            MaxBurstVariant::AggressiveMaxBurst,
            MaxBurstVariant::TotalMaxBurst,
        ] {
            cc.apply_max_burst(variant, 1, 0);
            assert_eq!(cc.sending_window(variant), 20_000);
        }
    }
}
