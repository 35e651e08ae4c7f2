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
use crate::api::DataDisposition;
use crate::api::GapListOptimization;
use crate::api::GapReport;
use crate::api::Options;
use crate::api::SackReport;
use crate::rx::gap_list::GapBlock;
use crate::rx::gap_list::GapList;
use crate::rx::gap_list::GapType;
use crate::rx::gap_list::MAX_GAP_COUNT;
use crate::timer::Timer;
use crate::types::Tsn;
use std::cmp::min;
use std::time::Duration;

/// The maximum number of accepted in-flight DATA chunks. This indicates the maximum difference from
/// this buffer's last cumulative ack TSN, and any received data. Data received beyond this limit
/// will be dropped, which will force the transmitter to send data that actually increases the last
/// cumulative acked TSN.
const MAX_ACCEPTED_OUTSTANDING_FRAGMENTS: u32 = 100000;

/// The maximum number of duplicate TSNs kept until the next SACK.
const MAX_DUPLICATE_TSNS: usize = MAX_GAP_COUNT;

/// IPv4 header and SCTP common header, which precede the SACK chunk in a packet.
const PACKET_OVERHEAD: usize = 20 + 12;
const SACK_CHUNK_HEADER_SIZE: usize = 16;
const NR_SACK_CHUNK_HEADER_SIZE: usize = 20;

#[derive(Debug, PartialEq)]
enum AckState {
    /// No need to send an ACK.
    Idle,

    /// Has received data chunks (but not yet end of packet).
    BecomingDelayed,

    /// Has received data chunks and the end of a packet. Delayed ack timer is running and a SACK
    /// will be sent on expiry, or when enough packets have been received.
    Delayed,

    /// Send a SACK immediately after handling this packet.
    Immediate,
}

/// Keeps track of received DATA chunks and handles all logic for _when_ to create SACKs and also
/// _how_ to generate them.
///
/// Received TSNs are tracked in a [`GapList`], which separates data that may still be reneged
/// (revokable) from data that the receiver has committed to (non-revokable), so that both SACKs
/// and NR-SACKs can be produced.
pub struct DataTracker {
    seen_packet: bool,
    ack_state: AckState,
    gap_list: GapList,
    duplicates: Vec<Tsn>,
    delayed_ack_timer: Timer,
    delayed_ack_max_timeout: Duration,
    packets_since_sack: u32,
    sack_frequency: u32,
    nr_sack: bool,
    disable_reneging: bool,
    optimization: GapListOptimization,
    gap_report_limit: usize,
    mtu: usize,
    sack_seq_num: u32,
    reported_overflows: u64,
}

impl DataTracker {
    pub fn new(peer_initial_tsn: Tsn, options: &Options) -> DataTracker {
        DataTracker {
            seen_packet: false,
            ack_state: AckState::Idle,
            gap_list: GapList::new(peer_initial_tsn - 1),
            duplicates: vec![],
            delayed_ack_timer: Timer::new(options.delayed_ack_timeout),
            delayed_ack_max_timeout: options.delayed_ack_timeout,
            packets_since_sack: 0,
            sack_frequency: options.sack_frequency.max(1),
            nr_sack: options.nr_sack,
            disable_reneging: options.disable_reneging,
            optimization: options.gap_list_optimization,
            gap_report_limit: min(options.gap_report_limit, MAX_GAP_COUNT),
            mtu: options.mtu,
            sack_seq_num: 0,
            reported_overflows: 0,
        }
    }

    pub fn update_rto(&mut self, rto: Duration) {
        let delayed_ack_tmo = min(rto / 2, self.delayed_ack_max_timeout);
        self.delayed_ack_timer.set_duration(delayed_ack_tmo);
    }

    pub fn next_timeout(&self) -> Option<AssocTime> {
        self.delayed_ack_timer.next_expiry()
    }

    /// Returns the last cumulative ack TSN - the last seen data chunk's TSN value before any packet
    /// loss was detected.
    pub fn last_cumulative_acked_tsn(&self) -> Tsn {
        self.gap_list.cum_ack_tsn()
    }

    pub fn highest_tsn_received(&self) -> Tsn {
        self.gap_list.highest_tsn_received()
    }

    pub fn gap_list(&self) -> &GapList {
        &self.gap_list
    }

    pub fn is_tsn_valid(&self, tsn: Tsn) -> bool {
        // Note that this method doesn't return `false` for old DATA chunks, as those are actually
        // valid, and receiving those may affect the generated SACK response (by setting "duplicate
        // TSNs").
        let difference = tsn.distance_to(self.last_cumulative_acked_tsn());
        difference <= MAX_ACCEPTED_OUTSTANDING_FRAGMENTS
    }

    pub fn is_duplicate(&self, tsn: Tsn) -> bool {
        tsn <= self.last_cumulative_acked_tsn() || self.gap_list.tsn_in_gap_list(tsn)
    }

    pub fn is_revokable(&self, tsn: Tsn) -> bool {
        self.gap_list.tsn_is_revokable(tsn)
    }

    fn maybe_add_duplicate_tsn(&mut self, tsn: Tsn) {
        if self.duplicates.len() < MAX_DUPLICATE_TSNS {
            self.duplicates.push(tsn);
        }
    }

    /// Call for every incoming data chunk. `revokable` tells if the data may later be reneged,
    /// which is ignored if reneging has been disabled.
    pub fn observe(&mut self, now: AssocTime, tsn: Tsn, revokable: bool) -> DataDisposition {
        // is_tsn_valid must be called prior to calling this method.
        debug_assert!(self.is_tsn_valid(tsn));

        let disposition = if self.is_duplicate(tsn) {
            self.maybe_add_duplicate_tsn(tsn);
            DataDisposition::Duplicate
        } else {
            let mut new_chunk_received = false;
            self.gap_list.update_gap_list(
                tsn,
                &mut new_chunk_received,
                revokable && !self.disable_reneging,
            );
            self.gap_list.try_to_advance_cum_ack_tsn();
            if new_chunk_received { DataDisposition::New } else { DataDisposition::Dropped }
        };

        // From <https://datatracker.ietf.org/doc/html/rfc9260#section-6.2>:
        //
        //   When a packet arrives with duplicate DATA chunk(s) and with no new DATA chunk(s), the
        //   endpoint MUST immediately send a SACK with no delay. If a packet arrives with duplicate
        //   DATA chunk(s) bundled with new DATA chunks, the endpoint MAY immediately send a SACK.
        if disposition == DataDisposition::Duplicate {
            self.update_ack_state(now, AckState::Immediate);
        }

        // From <https://datatracker.ietf.org/doc/html/rfc9260#section-6.7>:
        //
        //   Upon the reception of a new DATA chunk, an endpoint shall examine the continuity of the
        //   TSNs received. If the endpoint detects a gap in the received DATA chunk sequence, it
        //   SHOULD send a SACK with Gap Ack Blocks immediately. The data receiver continues sending
        //   a SACK after receipt of each SCTP packet that doesn't fill the gap.
        if self.gap_list.num_gaps(GapType::Any) > 0 {
            self.update_ack_state(now, AckState::Immediate);
        }

        if self.gap_list.overflow_count() > self.reported_overflows {
            self.update_ack_state(now, AckState::Immediate);
        }

        if !self.seen_packet {
            // From <https://datatracker.ietf.org/doc/html/rfc9260#section-5.1-8>:
            //
            //   After the reception of the first DATA chunk in an association, the endpoint MUST
            //   immediately respond with a SACK chunk to acknowledge the DATA chunk.
            self.seen_packet = true;
            self.update_ack_state(now, AckState::Immediate);
        }

        if self.ack_state == AckState::Idle {
            self.update_ack_state(now, AckState::BecomingDelayed);
        }
        disposition
    }

    /// Returns the total overflow count if any TSN couldn't be recorded since the last call.
    pub fn take_overflows(&mut self) -> Option<u64> {
        let overflows = self.gap_list.overflow_count();
        if overflows > self.reported_overflows {
            self.reported_overflows = overflows;
            Some(overflows)
        } else {
            None
        }
    }

    /// Returns the total number of TSNs that couldn't be recorded in the gap list.
    pub fn overflow_count(&self) -> u64 {
        self.gap_list.overflow_count()
    }

    /// Forgets a revokable TSN that the receive buffer discarded. It will be reported as missing
    /// in coming SACKs.
    pub fn renege(&mut self, tsn: Tsn) -> bool {
        if !self.gap_list.tsn_is_revokable(tsn) {
            return false;
        }
        log::debug!("Reneging tsn={}", tsn);
        self.gap_list.remove_from_gap_list(tsn)
    }

    /// Marks a TSN as non-revokable, e.g. when it has been delivered to the upper layer.
    pub fn mark_non_revokable(&mut self, tsn: Tsn) {
        if self.gap_list.tsn_is_revokable(tsn) {
            let mut new_chunk_received = false;
            self.gap_list.update_gap_list(tsn, &mut new_chunk_received, false);
        }
    }

    /// Called for incoming FORWARD-TSN chunks. Indicates if the chunk had any effect.
    pub fn handle_forward_tsn(&mut self, now: AssocTime, new_cumulative_tsn: Tsn) -> bool {
        // Old chunk already seen before?
        if new_cumulative_tsn <= self.last_cumulative_acked_tsn() {
            // From <https://datatracker.ietf.org/doc/html/rfc3758#section-3.6>:
            //
            //   Note, if the "New Cumulative TSN" value carried in the arrived FORWARD TSN chunk is
            //   found to be behind or at the current cumulative TSN point, the data receiver MUST
            //   treat this FORWARD TSN as out-of-date and MUST NOT update its Cumulative TSN. The
            //   receiver SHOULD send a SACK to its peer (the sender of the FORWARD TSN) since such
            //   a duplicate may indicate the previous SACK was lost in the network."
            self.update_ack_state(now, AckState::Immediate);
            return false;
        }

        // From <https://datatracker.ietf.org/doc/html/rfc3758#section-3.6>:
        //
        //   When a FORWARD TSN chunk arrives, the data receiver MUST first update its cumulative
        //   TSN point to the value carried in the FORWARD TSN chunk, and then MUST further advance
        //   its cumulative TSN point locally if possible, as shown by the following example [...]
        self.gap_list.forward_cum_ack_tsn(new_cumulative_tsn);

        // From <https://datatracker.ietf.org/doc/html/rfc3758#section-3.6>:
        //
        //   Any time a FORWARD TSN chunk arrives, for the purposes of sending a SACK, the receiver
        //   MUST follow the same rules as if a DATA chunk had been received (i.e., follow the
        //   delayed sack rules specified in [...]
        if self.ack_state == AckState::Idle {
            self.update_ack_state(now, AckState::BecomingDelayed);
        }
        true
    }

    /// Selects which gap lists go into the report, as revokable and non-revokable lists, and
    /// whether the non-revokable list is to be read as "everything received, minus revokable".
    fn select_gap_lists(&self) -> (Vec<GapBlock>, Vec<GapBlock>, bool) {
        let combined = self.gap_list.gaps(GapType::Any);
        if !self.nr_sack {
            return (combined.to_vec(), vec![], false);
        }

        let revokable = self.gap_list.gaps(GapType::Revokable);
        let non_revokable = self.gap_list.gaps(GapType::NonRevokable);

        // Optimized1: report all received TSNs as revokable, and non-revokable ones on top.
        let use_combined_as_r = self.optimization >= GapListOptimization::Optimized1
            && revokable.len() > combined.len();
        // Optimized2: report all received TSNs as non-revokable, minus the revokable ones. When
        // both would save as many blocks, Optimized1 is preferred.
        let use_combined_as_nr = self.optimization >= GapListOptimization::Optimized2
            && non_revokable.len() > combined.len();

        match (use_combined_as_r, use_combined_as_nr) {
            (true, true) if non_revokable.len() <= revokable.len() => {
                (combined.to_vec(), non_revokable.to_vec(), false)
            }
            (_, true) => (revokable.to_vec(), combined.to_vec(), true),
            (true, false) => (combined.to_vec(), non_revokable.to_vec(), false),
            (false, false) => (revokable.to_vec(), non_revokable.to_vec(), false),
        }
    }

    /// Creates a selective ack report and returns it. Note that this will modify state, so the
    /// report must be sent.
    pub fn create_selective_ack(&mut self, a_rwnd: u32) -> SackReport {
        let cumulative_tsn_ack = self.last_cumulative_acked_tsn();
        let (mut r_gaps, mut nr_gaps, subtract_r_gaps) = self.select_gap_lists();

        let chunk_header_size =
            if self.nr_sack { NR_SACK_CHUNK_HEADER_SIZE } else { SACK_CHUNK_HEADER_SIZE };
        let max_entries = self.mtu.saturating_sub(PACKET_OVERHEAD + chunk_header_size) / 4;

        truncate_gap_lists(
            &mut r_gaps,
            &mut nr_gaps,
            subtract_r_gaps,
            self.gap_report_limit,
            max_entries,
        );

        let mut duplicate_tsns = std::mem::take(&mut self.duplicates);
        duplicate_tsns.truncate(max_entries.saturating_sub(r_gaps.len() + nr_gaps.len()));

        // Zero marks an unsequenced report and is skipped on wrap.
        self.sack_seq_num = self.sack_seq_num.checked_add(1).unwrap_or(1);
        let gap_reports = r_gaps
            .iter()
            .map(|b| GapReport::new(b.start, b.stop, true))
            .chain(nr_gaps.iter().map(|b| GapReport::new(b.start, b.stop, false)))
            .collect();
        SackReport {
            cumulative_tsn_ack,
            a_rwnd,
            gap_reports,
            duplicate_tsns,
            nr_subtract_r_gaps: subtract_r_gaps,
            sack_seq_num: self.sack_seq_num,
        }
    }

    /// Indicates if a SACK should be sent. There may be many reasons to send a SACK, and if this
    /// function indicates so, it should be sent as soon as possible. Calling this function will
    /// make it clear a flag so that if it's called again, it will probably return false.
    ///
    /// If the delayed ack timer is running, this method will return false _unless_
    /// `also_if_delayed` is set to true. Then it will return true as well.
    pub fn should_send_ack(&mut self, now: AssocTime, also_if_delayed: bool) -> bool {
        if self.ack_state == AckState::Immediate
            || (also_if_delayed
                && (self.ack_state == AckState::BecomingDelayed
                    || self.ack_state == AckState::Delayed))
        {
            self.update_ack_state(now, AckState::Idle);
            return true;
        }

        false
    }

    pub fn handle_timeout(&mut self, now: AssocTime) {
        if self.delayed_ack_timer.expire(now) {
            self.update_ack_state(now, AckState::Immediate);
        }
    }

    /// Called at the end of processing an SCTP packet.
    pub fn observe_packet_end(&mut self, now: AssocTime) {
        // From <https://datatracker.ietf.org/doc/html/rfc9260#section-6.2-3>:
        //
        //   Specifically, an acknowledgement SHOULD be generated for at least every second packet
        //   (not every second DATA chunk) received and SHOULD be generated within 200 ms of the
        //   arrival of any unacknowledged DATA chunk."
        if matches!(self.ack_state, AckState::BecomingDelayed | AckState::Delayed) {
            self.packets_since_sack += 1;
            if self.packets_since_sack >= self.sack_frequency {
                self.update_ack_state(now, AckState::Immediate);
            } else if self.ack_state == AckState::BecomingDelayed {
                self.update_ack_state(now, AckState::Delayed);
            }
        }
    }

    fn update_ack_state(&mut self, now: AssocTime, new_state: AckState) {
        if self.ack_state != new_state {
            if self.ack_state == AckState::Delayed {
                self.delayed_ack_timer.stop();
            } else if new_state == AckState::Delayed {
                self.delayed_ack_timer.start(now);
            }
            if new_state == AckState::Idle {
                self.packets_since_sack = 0;
            }
            self.ack_state = new_state;
        }
    }
}

/// Limits the gap lists to `limit` blocks each, and to `max_entries` blocks in total.
///
/// When the non-revokable list is to be read as "all minus revokable", both lists are cut at the
/// same TSN, as a revokable TSN must never appear as non-revokable to the peer.
fn truncate_gap_lists(
    r_gaps: &mut Vec<GapBlock>,
    nr_gaps: &mut Vec<GapBlock>,
    subtract_r_gaps: bool,
    limit: usize,
    max_entries: usize,
) {
    if subtract_r_gaps {
        nr_gaps.truncate(min(limit, max_entries));
        loop {
            let last_stop = nr_gaps.last().map(|b| b.stop);
            r_gaps.retain(|b| last_stop.is_some_and(|stop| b.stop <= stop));
            if r_gaps.len() <= limit && r_gaps.len() + nr_gaps.len() <= max_entries {
                return;
            }
            nr_gaps.pop();
        }
    }

    r_gaps.truncate(limit);
    nr_gaps.truncate(limit);
    let total = r_gaps.len() + nr_gaps.len();
    if total > max_entries {
        let r_share = r_gaps.len() * max_entries / total;
        r_gaps.truncate(r_share);
        nr_gaps.truncate(max_entries - r_share);
    }
}
