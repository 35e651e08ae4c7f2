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
use crate::api::AcknowledgedChunk;
use crate::api::AssocTime;
use crate::api::ForwardTsn;
use crate::api::OutboundData;
use crate::api::PathId;
use crate::api::StreamId;
use crate::rx::gap_list::GapList;
use crate::rx::gap_list::GapType;
use crate::tx::path::Paths;
use crate::tx::send_queue::DataToSend;
use crate::types::Ssn;
use crate::types::Tsn;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq)]
enum AckState {
    Unacked,
    /// Acknowledged by a revokable gap block. The receiver may still renege it.
    Acked,
    /// Acknowledged by the cumulative ack or a non-revokable gap block.
    NrAcked,
}

/// State for DATA chunks in the queue - used in tests.
#[derive(Debug, PartialEq)]
pub(crate) enum ChunkState {
    /// Sent and counted as outstanding on its path.
    InFlight,

    /// Not acknowledged and not outstanding, e.g. reneged by the peer and waiting for T3-rtx.
    Nacked,

    /// Will be retransmitted when allowed.
    ToBeRetransmitted,

    /// Acknowledged by a revokable gap block.
    Acked,

    /// Acknowledged, and the peer will never take that back.
    NrAcked,

    /// Expired or retransmitted too many times (RFC 3758). It will not be retransmitted anymore.
    Abandoned,
}

/// Contains variables scoped to a processing of an incoming SACK.
#[derive(Debug, Default)]
pub(crate) struct AckInfo {
    pub cum_ack_advanced: bool,

    /// The shortest time between sending and acknowledging a chunk that was newly acknowledged,
    /// sent only once and last sent to the path the SACK arrived on.
    pub rtt: Option<Duration>,

    pub fast_retransmits: usize,

    pub reneged: usize,
}

#[derive(Debug)]
struct Item {
    data: DataToSend,
    chunk_size: usize,
    time_sent: AssocTime,
    transmissions: u32,
    retransmissions: u32,
    /// Number of SACKs that reported this chunk missing.
    gap_reports: u32,
    initial_destination: PathId,
    last_destination: PathId,
    next_destination: PathId,
    acked_on: Option<PathId>,
    ack_state: AckState,
    counted_as_newly_acked: bool,
    counts_as_outstanding: bool,
    fast_retransmitted: bool,
    reneged: bool,
    abandoned: bool,
}

impl Item {
    fn to_outbound(&self, tsn: Tsn, is_retransmission: bool) -> OutboundData {
        OutboundData {
            tsn,
            stream_id: self.data.stream_id,
            ssn: self.data.ssn,
            payload: self.data.payload.clone(),
            path: self.last_destination,
            is_retransmission,
        }
    }

    fn is_acked(&self) -> bool {
        self.ack_state != AckState::Unacked
    }

    fn stop_counting_as_outstanding(&mut self, paths: &mut Paths) {
        if self.counts_as_outstanding {
            self.counts_as_outstanding = false;
            let path = &mut paths[self.last_destination];
            path.outstanding_bytes = path.outstanding_bytes.saturating_sub(self.chunk_size);
        }
    }

    /// Marks the chunk as acknowledged. Returns true if it wasn't acknowledged before.
    fn ack(
        &mut self,
        now: AssocTime,
        sack_path: PathId,
        paths: &mut Paths,
        rtt: &mut Option<Duration>,
    ) -> bool {
        if self.is_acked() {
            return false;
        }
        self.ack_state = AckState::Acked;
        self.acked_on = Some(sack_path);
        self.gap_reports = 0;
        if self.abandoned {
            return true;
        }
        self.stop_counting_as_outstanding(paths);
        if !self.counted_as_newly_acked {
            self.counted_as_newly_acked = true;
            paths[self.last_destination].sack.newly_acked_bytes += self.chunk_size;
        }

        // From <https://datatracker.ietf.org/doc/html/rfc4960#section-6.3.1>:
        //
        //   C5)  Karn's algorithm: RTT measurements MUST NOT be made using packets that were
        //        retransmitted (and thus for which it is ambiguous whether the reply was for the
        //        first instance of the chunk or for a later instance)
        if self.transmissions == 1 && !self.reneged && self.last_destination == sack_path {
            let sample = now - self.time_sent;
            *rtt = Some(rtt.map_or(sample, |current| current.min(sample)));
        }
        true
    }

    fn renege(&mut self, now: AssocTime, paths: &mut Paths) {
        self.ack_state = AckState::Unacked;
        self.acked_on = None;
        self.reneged = true;
        self.gap_reports = 1;
        // From <https://datatracker.ietf.org/doc/html/rfc4960#section-6.3.2>:
        //
        //   R4)  Whenever a SACK is received missing a TSN that was previously acknowledged via a
        //        Gap Ack Block, start the T3-rtx for the destination address to which the DATA
        //        chunk was originally transmitted if it is not already running.
        paths[self.last_destination].start_t3_rtx_if_stopped(now);
    }
}

/// Keeps track of sent DATA chunks until the peer has acknowledged them with the cumulative TSN
/// ack, and handles acking, nacking, reneging, retransmission scheduling and abandoning.
///
/// Chunks acknowledged by non-revokable gap blocks are delivered from the peer's point of view,
/// so they are reported as acknowledged immediately even though they stay in the queue until
/// the cumulative ack reaches them.
#[derive(Debug)]
pub(crate) struct OutstandingData {
    last_cumulative_tsn_ack: Tsn,
    items: VecDeque<Item>,

    /// The highest TSN ever reported received in a gap block.
    highest_tsn_acked: Tsn,

    /// See <https://datatracker.ietf.org/doc/html/rfc3758#section-3.5>.
    advanced_peer_ack_point: Tsn,

    to_be_retransmitted: BTreeSet<Tsn>,
    partial_reliability: bool,
    swept: Vec<AcknowledgedChunk>,
    abandoned: Vec<(StreamId, Tsn)>,
}

impl OutstandingData {
    pub fn new(last_cumulative_tsn_ack: Tsn, partial_reliability: bool) -> Self {
        Self {
            last_cumulative_tsn_ack,
            items: VecDeque::new(),
            highest_tsn_acked: last_cumulative_tsn_ack,
            advanced_peer_ack_point: last_cumulative_tsn_ack,
            to_be_retransmitted: BTreeSet::new(),
            partial_reliability,
            swept: vec![],
            abandoned: vec![],
        }
    }

    fn index_of(&self, tsn: Tsn) -> Option<usize> {
        if tsn <= self.last_cumulative_tsn_ack {
            return None;
        }
        let index = (tsn.0.wrapping_sub(self.last_cumulative_tsn_ack.0) - 1) as usize;
        (index < self.items.len()).then_some(index)
    }

    fn tsn_at(&self, index: usize) -> Tsn {
        self.last_cumulative_tsn_ack + 1 + index as u32
    }

    pub fn last_cumulative_tsn_ack(&self) -> Tsn {
        self.last_cumulative_tsn_ack
    }

    /// The TSN that the next new chunk will be assigned.
    pub fn next_tsn(&self) -> Tsn {
        self.last_cumulative_tsn_ack + 1 + self.items.len() as u32
    }

    pub fn highest_outstanding_tsn(&self) -> Tsn {
        self.next_tsn() - 1
    }

    pub fn highest_tsn_acked(&self) -> Tsn {
        self.highest_tsn_acked
    }

    pub fn advanced_peer_ack_point(&self) -> Tsn {
        self.advanced_peer_ack_point
    }

    /// Returns true if no sent chunk waits for the cumulative ack.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_data_to_be_retransmitted(&self) -> bool {
        !self.to_be_retransmitted.is_empty()
    }

    /// TSNs queued for retransmission, lowest first.
    pub fn to_be_retransmitted(&self) -> Vec<Tsn> {
        self.to_be_retransmitted.iter().copied().collect()
    }

    /// Returns the destination, the chunk size and if it's a fast retransmission, for a chunk
    /// that is queued for retransmission.
    pub fn retransmission_info(&self, tsn: Tsn) -> Option<(PathId, usize, bool)> {
        let item = &self.items[self.index_of(tsn)?];
        Some((item.next_destination, item.chunk_size, item.fast_retransmitted))
    }

    /// Assigns the next TSN to `data` and records it as sent to `path`. Returns what to send, or
    /// None if the message had already expired and was abandoned instead.
    pub fn insert(
        &mut self,
        now: AssocTime,
        data: DataToSend,
        path: PathId,
        paths: &mut Paths,
    ) -> Option<OutboundData> {
        let tsn = self.next_tsn();
        let chunk_size = data.chunk_size();
        let mut item = Item {
            data,
            chunk_size,
            time_sent: now,
            transmissions: 1,
            retransmissions: 0,
            gap_reports: 0,
            initial_destination: path,
            last_destination: path,
            next_destination: path,
            acked_on: None,
            ack_state: AckState::Unacked,
            counted_as_newly_acked: false,
            counts_as_outstanding: false,
            fast_retransmitted: false,
            reneged: false,
            abandoned: false,
        };

        if self.partial_reliability && item.data.expires_at.is_some_and(|e| e <= now) {
            log::debug!("Message expired before being sent, abandoning tsn={}", tsn);
            item.abandoned = true;
            item.data.payload = vec![];
            self.abandoned.push((item.data.stream_id, tsn));
            self.items.push_back(item);
            return None;
        }

        item.counts_as_outstanding = true;
        paths[path].outstanding_bytes += chunk_size;
        let outbound = item.to_outbound(tsn, false);
        self.items.push_back(item);
        Some(outbound)
    }

    /// Indicates if the partial reliability policy of the chunk says it must not be sent again.
    pub fn must_be_abandoned(&self, now: AssocTime, tsn: Tsn) -> bool {
        match self.index_of(tsn) {
            Some(index) => self.item_must_be_abandoned(now, &self.items[index]),
            None => false,
        }
    }

    fn item_must_be_abandoned(&self, now: AssocTime, item: &Item) -> bool {
        if !self.partial_reliability || item.abandoned || item.is_acked() {
            return false;
        }
        item.data.expires_at.is_some_and(|e| e <= now)
            || item.data.max_retransmissions.is_some_and(|m| item.retransmissions >= u32::from(m))
    }

    pub fn abandon(&mut self, tsn: Tsn, paths: &mut Paths) {
        let Some(index) = self.index_of(tsn) else {
            return;
        };
        let item = &mut self.items[index];
        if item.abandoned {
            return;
        }
        log::debug!(
            "Abandoning tsn={}, transmissions={}, retransmissions={}",
            tsn,
            item.transmissions,
            item.retransmissions
        );
        item.stop_counting_as_outstanding(paths);
        item.abandoned = true;
        item.data.payload = vec![];
        self.to_be_retransmitted.remove(&tsn);
        self.abandoned.push((item.data.stream_id, tsn));
    }

    /// Sends a chunk that was queued for retransmission to its next destination.
    pub fn mark_retransmitted(
        &mut self,
        now: AssocTime,
        tsn: Tsn,
        paths: &mut Paths,
    ) -> Option<OutboundData> {
        let index = self.index_of(tsn)?;
        if !self.to_be_retransmitted.remove(&tsn) {
            return None;
        }
        let item = &mut self.items[index];
        item.transmissions += 1;
        item.retransmissions += 1;
        item.last_destination = item.next_destination;
        item.time_sent = now;
        item.gap_reports = 0;
        item.reneged = false;
        item.counted_as_newly_acked = false;
        item.counts_as_outstanding = true;
        paths[item.last_destination].outstanding_bytes += item.chunk_size;
        log::debug!(
            "Retransmitting tsn={} to {} (initially {}), retransmissions={}",
            tsn,
            item.last_destination,
            item.initial_destination,
            item.retransmissions
        );
        Some(item.to_outbound(tsn, true))
    }

    fn nr_ack(&mut self, index: usize) {
        let tsn = self.tsn_at(index);
        let item = &mut self.items[index];
        if item.ack_state == AckState::NrAcked {
            return;
        }
        item.ack_state = AckState::NrAcked;
        self.to_be_retransmitted.remove(&tsn);
        if !item.abandoned {
            self.swept.push(AcknowledgedChunk {
                tsn,
                stream_id: item.data.stream_id,
                payload_size: item.data.payload.len(),
            });
            item.data.payload = vec![];
        }
    }

    /// Processes the acknowledgement information of a SACK, which has been converted into a gap
    /// list.
    ///
    /// Per-path results (newly acked bytes, retransmission needs) are written to each path's
    /// [`crate::tx::path::SackScratch`], which the caller must have reset.
    pub fn handle_sack(
        &mut self,
        now: AssocTime,
        sack: &GapList,
        sack_path: PathId,
        num_gap_reports: u32,
        paths: &mut Paths,
    ) -> AckInfo {
        let mut info = AckInfo::default();
        let cumulative_tsn_ack = sack.cum_ack_tsn();

        while self.last_cumulative_tsn_ack < cumulative_tsn_ack {
            let Some(mut item) = self.items.pop_front() else {
                break;
            };
            let tsn = self.last_cumulative_tsn_ack + 1;
            self.last_cumulative_tsn_ack = tsn;
            self.to_be_retransmitted.remove(&tsn);
            info.cum_ack_advanced = true;

            let last_destination = item.last_destination;
            if item.ack(now, sack_path, paths, &mut info.rtt) && !item.abandoned {
                paths[last_destination].sack.new_cum_ack = true;
            }
            if item.ack_state != AckState::NrAcked && !item.abandoned {
                self.swept.push(AcknowledgedChunk {
                    tsn,
                    stream_id: item.data.stream_id,
                    payload_size: item.data.payload.len(),
                });
            }
            log::trace!("Cumulative acked tsn={}, acked_on={:?}", tsn, item.acked_on);
        }
        if self.highest_tsn_acked < self.last_cumulative_tsn_ack {
            self.highest_tsn_acked = self.last_cumulative_tsn_ack;
        }
        if self.advanced_peer_ack_point < self.last_cumulative_tsn_ack {
            self.advanced_peer_ack_point = self.last_cumulative_tsn_ack;
        }

        if sack.num_gaps(GapType::Any) == 0 {
            if self.last_cumulative_tsn_ack < self.highest_tsn_acked {
                // Everything above the cumulative ack that was acked before has been reneged.
                info.reneged += self.renege_range(now, self.highest_tsn_acked, paths);
                self.highest_tsn_acked = self.last_cumulative_tsn_ack;
            }
            return info;
        }
        if self.items.is_empty() {
            return info;
        }

        let highest_reported = sack.highest_tsn_received();
        if highest_reported < self.highest_tsn_acked {
            // The chunks above the last gap block have been reneged.
            info.reneged += self.renege_above(now, highest_reported, paths);
        }
        self.highest_tsn_acked = highest_reported;

        // Acknowledge everything inside the gap blocks.
        let mut highest_newly_acked: Option<Tsn> = None;
        for block in sack.gaps(GapType::Any) {
            let mut tsn = block.start;
            while tsn <= block.stop {
                if let Some(index) = self.index_of(tsn) {
                    let item = &mut self.items[index];
                    if item.ack(now, sack_path, paths, &mut info.rtt) {
                        self.to_be_retransmitted.remove(&tsn);
                        if !item.abandoned && highest_newly_acked.is_none_or(|h| h < tsn) {
                            highest_newly_acked = Some(tsn);
                        }
                    }
                    if sack.tsn_is_non_revokable(tsn) {
                        self.nr_ack(index);
                    }
                }
                tsn += 1;
            }
        }

        // Walk the chunks that are reported missing.
        let mut tsn = self.last_cumulative_tsn_ack + 1;
        while tsn < highest_reported {
            if let (false, Some(index)) = (sack.tsn_in_gap_list(tsn), self.index_of(tsn)) {
                self.handle_missing(
                    now,
                    index,
                    highest_newly_acked,
                    num_gap_reports,
                    paths,
                    &mut info,
                );
            }
            tsn += 1;
        }
        info
    }

    fn handle_missing(
        &mut self,
        now: AssocTime,
        index: usize,
        highest_newly_acked: Option<Tsn>,
        num_gap_reports: u32,
        paths: &mut Paths,
        info: &mut AckInfo,
    ) {
        let tsn = self.tsn_at(index);
        match self.items[index].ack_state {
            AckState::Acked => {
                self.items[index].renege(now, paths);
                info.reneged += 1;
                return;
            }
            AckState::NrAcked => return,
            AckState::Unacked => {}
        }

        let cum_ack_advanced = info.cum_ack_advanced;
        let item = &mut self.items[index];
        if item.abandoned {
            return;
        }

        // From <https://datatracker.ietf.org/doc/html/rfc4960#section-7.2.4>:
        //
        //   Whenever an endpoint receives a SACK that indicates that some TSNs are missing, it
        //   SHOULD wait for two further miss indications (via subsequent SACKs for a total of
        //   three missing reports) on the same TSNs before taking action with regard to Fast
        //   Retransmit.
        //
        //   Miss indications SHOULD follow the HTNA (Highest TSN Newly Acknowledged) algorithm.
        //   [...] Furthermore, if the sender is in Fast Recovery, then the missing report count
        //   for each TSN ... that is less than the highest TSN acknowledged is incremented when
        //   the Cumulative TSN Ack Point advances.
        let last_destination = item.last_destination;
        let reported_missing = highest_newly_acked.is_some_and(|h| h > tsn)
            || (cum_ack_advanced && paths[last_destination].cc.is_in_fast_recovery());
        if reported_missing {
            item.gap_reports += 1;
        }

        let fast_retransmit = item.gap_reports >= num_gap_reports
            && !item.fast_retransmitted
            && item.retransmissions == 0
            && !self.to_be_retransmitted.contains(&tsn);
        if fast_retransmit {
            if self.item_must_be_abandoned(now, &self.items[index]) {
                self.abandon(tsn, paths);
            } else {
                let item = &mut self.items[index];
                log::debug!("Fast retransmitting tsn={}, gap_reports={}", tsn, item.gap_reports);
                item.fast_retransmitted = true;
                item.next_destination = item.last_destination;
                item.stop_counting_as_outstanding(paths);
                self.to_be_retransmitted.insert(tsn);
                info.fast_retransmits += 1;

                let next = &mut paths[item.next_destination].sack;
                next.requires_rtx = true;
                if next.find_lowest_tsn {
                    next.lowest_tsn_retransmitted = true;
                }
            }
        }
        paths[last_destination].sack.find_lowest_tsn = false;
    }

    /// Reneges all acked chunks above the cumulative ack and up to `highest`.
    fn renege_range(&mut self, now: AssocTime, highest: Tsn, paths: &mut Paths) -> usize {
        let mut count = 0;
        for (index, item) in self.items.iter_mut().enumerate() {
            let tsn = self.last_cumulative_tsn_ack + 1 + index as u32;
            if tsn > highest {
                break;
            }
            if item.ack_state == AckState::Acked {
                item.renege(now, paths);
                count += 1;
            }
        }
        count
    }

    fn renege_above(&mut self, now: AssocTime, lowest: Tsn, paths: &mut Paths) -> usize {
        let mut count = 0;
        let highest = self.highest_tsn_acked;
        let mut tsn = lowest + 1;
        while tsn <= highest {
            if let Some(index) = self.index_of(tsn) {
                let item = &mut self.items[index];
                if item.ack_state == AckState::Acked {
                    item.renege(now, paths);
                    count += 1;
                }
            }
            tsn += 1;
        }
        count
    }

    /// Moves the chunks last sent to `path` to the retransmission queue after its T3-rtx timer
    /// has expired. Returns the number of bytes that are no longer in flight.
    pub fn nack_for_t3(&mut self, now: AssocTime, path: PathId, paths: &mut Paths) -> usize {
        let mut moved_bytes = 0;
        for index in 0..self.items.len() {
            let tsn = self.tsn_at(index);
            let item = &self.items[index];
            let affected = item.last_destination == path
                && !item.is_acked()
                && !item.abandoned
                && (item.counts_as_outstanding || item.reneged)
                && !self.to_be_retransmitted.contains(&tsn);
            if !affected {
                continue;
            }
            if self.item_must_be_abandoned(now, item) {
                self.abandon(tsn, paths);
                continue;
            }

            let item = &mut self.items[index];
            // A chunk that was fast retransmitted stays on the path it was last sent to.
            item.next_destination = if item.fast_retransmitted {
                item.last_destination
            } else {
                paths.next_active_after(item.last_destination).unwrap_or(item.last_destination)
            };
            if item.counts_as_outstanding {
                moved_bytes += item.chunk_size;
            }
            item.stop_counting_as_outstanding(paths);
            item.fast_retransmitted = false;
            item.gap_reports = 0;
            self.to_be_retransmitted.insert(tsn);
        }
        moved_bytes
    }

    /// Returns true if `path` still has chunks that wait for an acknowledgement or a
    /// retransmission on it.
    pub fn has_pending_for_path(&self, path: PathId) -> bool {
        self.items.iter().enumerate().any(|(index, item)| {
            if item.is_acked() || item.abandoned {
                return false;
            }
            if self.to_be_retransmitted.contains(&self.tsn_at(index)) {
                item.next_destination == path
            } else {
                item.last_destination == path && (item.counts_as_outstanding || item.reneged)
            }
        })
    }

    /// The highest TSN that is in flight on `path`.
    pub fn highest_outstanding_on_path(&self, path: PathId) -> Option<Tsn> {
        self.items
            .iter()
            .enumerate()
            .rev()
            .find(|(_, item)| item.last_destination == path && item.counts_as_outstanding)
            .map(|(index, _)| self.tsn_at(index))
    }

    /// Moves the advanced peer ack point over abandoned chunks, see
    /// <https://datatracker.ietf.org/doc/html/rfc3758#section-3.5> rule C1.
    pub fn advance_peer_ack_point(&mut self) -> Tsn {
        if self.advanced_peer_ack_point < self.last_cumulative_tsn_ack {
            self.advanced_peer_ack_point = self.last_cumulative_tsn_ack;
        }
        let mut tsn = self.advanced_peer_ack_point + 1;
        while let Some(index) = self.index_of(tsn) {
            let item = &self.items[index];
            if item.abandoned {
                self.advanced_peer_ack_point = tsn;
            } else if !item.is_acked() {
                break;
            }
            tsn += 1;
        }
        self.advanced_peer_ack_point
    }

    /// Creates a FORWARD-TSN that lets the peer skip the abandoned chunks, if any.
    pub fn create_forward_tsn(&self) -> Option<ForwardTsn> {
        if self.advanced_peer_ack_point <= self.last_cumulative_tsn_ack {
            return None;
        }

        // From <https://datatracker.ietf.org/doc/html/rfc3758#section-3.2>:
        //
        //   Stream-N: 16 bits (unsigned integer)
        //     This field holds a stream number that was skipped by this FWD-TSN.
        //
        //   Stream Sequence-N: 16 bit (unsigned integer)
        //     This field holds the sequence number associated with the stream that was skipped.
        //     The stream sequence field holds the largest stream sequence number in this stream
        //     being skipped.
        let mut skipped: BTreeMap<StreamId, Ssn> = BTreeMap::new();
        let mut tsn = self.last_cumulative_tsn_ack + 1;
        while tsn <= self.advanced_peer_ack_point {
            if let Some(index) = self.index_of(tsn) {
                let item = &self.items[index];
                if let (true, Some(ssn)) = (item.abandoned, item.data.ssn) {
                    skipped
                        .entry(item.data.stream_id)
                        .and_modify(|s| *s = (*s).max(ssn))
                        .or_insert(ssn);
                }
            }
            tsn += 1;
        }
        Some(ForwardTsn {
            new_cumulative_tsn: self.advanced_peer_ack_point,
            skipped_streams: skipped.into_iter().collect(),
        })
    }

    /// Returns the chunks that were acknowledged since the last call.
    pub fn take_swept(&mut self) -> Vec<AcknowledgedChunk> {
        std::mem::take(&mut self.swept)
    }

    /// Returns the chunks that were abandoned since the last call.
    pub fn take_abandoned(&mut self) -> Vec<(StreamId, Tsn)> {
        std::mem::take(&mut self.abandoned)
    }

    #[cfg(test)]
    pub fn get_chunk_states_for_testing(&self) -> Vec<(Tsn, ChunkState)> {
        let mut states = vec![(self.last_cumulative_tsn_ack, ChunkState::NrAcked)];
        for (index, item) in self.items.iter().enumerate() {
            let tsn = self.tsn_at(index);
            let state = if item.abandoned {
                ChunkState::Abandoned
            } else if item.ack_state == AckState::NrAcked {
                ChunkState::NrAcked
            } else if item.ack_state == AckState::Acked {
                ChunkState::Acked
            } else if self.to_be_retransmitted.contains(&tsn) {
                ChunkState::ToBeRetransmitted
            } else if item.counts_as_outstanding {
                ChunkState::InFlight
            } else {
                ChunkState::Nacked
            };
            states.push((tsn, state));
        }
        states
    }

    #[cfg(test)]
    pub fn gap_reports_for_testing(&self, tsn: Tsn) -> u32 {
        self.index_of(tsn).map_or(0, |index| self.items[index].gap_reports)
    }
}
