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
use crate::EventSink;
use crate::api::AcknowledgedChunk;
use crate::api::AssocTime;
use crate::api::AssociationEvent;
use crate::api::ControlChunk;
use crate::api::ForwardTsn;
use crate::api::MaxBurstVariant;
use crate::api::Options;
use crate::api::OutboundData;
use crate::api::PathId;
use crate::api::PathMetrics;
use crate::api::SackDisposition;
use crate::api::SackReport;
use crate::rx::gap_list::GapList;
use crate::tx::outstanding_data::OutstandingData;
use crate::tx::path::Path;
use crate::tx::path::Paths;
use crate::types::cmp_rfc1982_u32;
use crate::tx::send_queue::SendQueue;
use crate::types::Tsn;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;
use std::time::Duration;

/// A per-path timer that has expired.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PathTimer {
    T3Rtx,
    Heartbeat,
    HeartbeatAck,
}

/// Converts the gap reports of a SACK into a gap list, considering only TSNs up to `highest`.
///
/// When the non-revokable ranges are sent as a superset of the revokable ones, the revokable
/// TSNs are subtracted from them.
pub fn gap_list_from_report(sack: &SackReport, highest: Tsn) -> GapList {
    let mut list = GapList::new(sack.cumulative_tsn_ack);
    let mut new_chunk_received = false;
    for gap in sack.revokable_gaps() {
        let mut tsn = gap.start;
        while tsn <= gap.stop && tsn <= highest {
            list.update_gap_list(tsn, &mut new_chunk_received, true);
            tsn += 1;
        }
    }
    for gap in sack.non_revokable_gaps() {
        let mut tsn = gap.start;
        while tsn <= gap.stop && tsn <= highest {
            if !(sack.nr_subtract_r_gaps && list.tsn_is_revokable(tsn)) {
                list.update_gap_list(tsn, &mut new_chunk_received, false);
            }
            tsn += 1;
        }
    }
    list
}

/// The sending side of an association.
///
/// It owns the paths to the peer with their congestion control state and timers, and all chunks
/// that have been sent but not yet cumulatively acknowledged. It decides what to send next, and
/// reacts to SACKs and to expired retransmission and heartbeat timers.
pub struct RetransmissionQueue {
    num_gap_reports: u32,
    max_burst: u32,
    max_burst_variant: MaxBurstVariant,
    assoc_max_retrans: u32,
    path_max_retrans: u32,
    check_sack_seq_number: bool,

    /// If both peers support RFC 3758 - SCTP Partial Reliability Extension.
    partial_reliability: bool,

    paths: Paths,

    /// All the outstanding data chunks that are in-flight and that have not been cumulative acked.
    /// Note that it also contains chunks that have been acked in gap ack blocks.
    outstanding_data: OutstandingData,

    /// Receive Window. Number of bytes available in the receiver's RX buffer.
    peer_rwnd: usize,
    initial_peer_rwnd: usize,

    /// Set when the peer advertised a zero window with nothing in flight. Timeouts don't count as
    /// errors while probing.
    zero_window_probing: bool,

    last_sack_seq_num: Option<u32>,

    /// Association error counter, see <https://datatracker.ietf.org/doc/html/rfc4960#section-8.1>.
    error_count: u32,

    /// A sending round is all calls with the same time.
    burst_round: Option<AssocTime>,
    packets_in_burst: u32,

    tx_chunks_count: usize,
    rtx_chunks_count: usize,
    fast_rtx_chunks_count: usize,
    t3_expiry_count: usize,
    reneged_chunks_count: usize,

    events: Rc<RefCell<dyn EventSink>>,
}

impl RetransmissionQueue {
    pub fn new(
        events: Rc<RefCell<dyn EventSink>>,
        my_initial_tsn: Tsn,
        peer_a_rwnd: u32,
        options: &Options,
        partial_reliability: bool,
    ) -> Self {
        let peer_rwnd = peer_a_rwnd as usize;
        Self {
            num_gap_reports: options.num_gap_reports,
            max_burst: options.max_burst,
            max_burst_variant: options.max_burst_variant,
            assoc_max_retrans: options.assoc_max_retrans,
            path_max_retrans: options.path_max_retrans,
            check_sack_seq_number: options.check_sack_seq_number,
            partial_reliability,
            paths: Paths::new(options, peer_rwnd),
            outstanding_data: OutstandingData::new(my_initial_tsn - 1, partial_reliability),
            peer_rwnd,
            initial_peer_rwnd: peer_rwnd,
            zero_window_probing: false,
            last_sack_seq_num: None,
            error_count: 0,
            burst_round: None,
            packets_in_burst: 0,
            tx_chunks_count: 0,
            rtx_chunks_count: 0,
            fast_rtx_chunks_count: 0,
            t3_expiry_count: 0,
            reneged_chunks_count: 0,
            events,
        }
    }

    pub fn has_path(&self, path: PathId) -> bool {
        self.paths.contains(path)
    }

    pub fn primary_path(&self) -> PathId {
        self.paths.primary()
    }

    /// The RTO of the primary path.
    pub fn rto(&self) -> Duration {
        self.paths[self.paths.primary()].rto.rto()
    }

    pub fn peer_rwnd(&self) -> usize {
        self.peer_rwnd
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn next_tsn(&self) -> Tsn {
        self.outstanding_data.next_tsn()
    }

    pub fn last_cumulative_tsn_ack(&self) -> Tsn {
        self.outstanding_data.last_cumulative_tsn_ack()
    }

    /// Returns true if every sent chunk has been cumulatively acknowledged.
    pub fn is_drained(&self) -> bool {
        self.outstanding_data.is_empty()
    }

    pub fn outstanding_bytes(&self) -> usize {
        self.paths.total_outstanding_bytes()
    }

    pub fn next_timeout(&self) -> Option<AssocTime> {
        self.paths.next_timeout()
    }

    /// Starts the heartbeat timers of all paths, when the association becomes established.
    pub fn start_heartbeats(&mut self, now: AssocTime) {
        self.paths.iter_mut().for_each(|p| p.restart_heartbeat(now));
    }

    pub fn stop_timers(&mut self) {
        self.paths.iter_mut().for_each(Path::stop_timers);
    }

    fn update_receiver_window(&mut self, a_rwnd: u32) {
        self.peer_rwnd = (a_rwnd as usize)
            .saturating_sub(self.paths.total_outstanding_bytes())
            .min(self.initial_peer_rwnd);
    }

    fn emit_abandoned(&mut self) {
        for (stream_id, tsn) in self.outstanding_data.take_abandoned() {
            self.events.borrow_mut().add(AssociationEvent::OnMessageAbandoned { stream_id, tsn });
        }
    }

    fn maybe_request_forward_tsn(&mut self) {
        if !self.partial_reliability {
            return;
        }
        // From <https://datatracker.ietf.org/doc/html/rfc3758#section-3.5>:
        //
        //   C2) If, after step C1, the "Advanced.Peer.Ack.Point" is greater than the Cumulative
        //       TSN ACK carried in the received SACK, the data sender MUST send the data receiver
        //       a FORWARD TSN chunk containing the latest value of the "Advanced.Peer.Ack.Point".
        let advanced_peer_ack_point = self.outstanding_data.advance_peer_ack_point();
        if advanced_peer_ack_point > self.outstanding_data.last_cumulative_tsn_ack() {
            self.events
                .borrow_mut()
                .add(AssociationEvent::ForwardTsnNeeded(advanced_peer_ack_point));
        }
    }

    fn clear_error_counter(&mut self, path: PathId) {
        self.error_count = 0;
        let p = &mut self.paths[path];
        p.error_count = 0;
        if !p.active {
            log::info!("Path {} is active again", path);
            p.active = true;
            self.events
                .borrow_mut()
                .add(AssociationEvent::OnPathStatusChanged { path, active: true });
        }
    }

    /// Increments the error counters of the association and of `path`. Returns true if the
    /// association has failed.
    fn count_error(&mut self, path: PathId) -> bool {
        self.error_count += 1;
        let p = &mut self.paths[path];
        p.error_count += 1;
        log::debug!(
            "Error counters incremented, association={}, path {}={}",
            self.error_count,
            path,
            p.error_count
        );

        if self.error_count > self.assoc_max_retrans {
            log::warn!("Association error threshold exceeded ({})", self.error_count);
            return true;
        }

        // From <https://datatracker.ietf.org/doc/html/rfc4960#section-8.2>:
        //
        //   When the value of this counter exceeds the limit indicated in the protocol parameter
        //   'Path.Max.Retrans', the endpoint should mark the destination transport address as
        //   inactive, and a notification SHOULD be sent to the upper layer.
        if p.active && p.error_count > self.path_max_retrans {
            log::warn!("Path {} is inactive, errors={}", path, p.error_count);
            p.active = false;
            self.events
                .borrow_mut()
                .add(AssociationEvent::OnPathStatusChanged { path, active: false });
            if self.paths.primary() == path {
                if let Some(next) = self.paths.next_active_after(path) {
                    log::info!("Primary path changed from {} to {}", path, next);
                    self.paths.set_primary(next);
                    self.events.borrow_mut().add(AssociationEvent::OnPrimaryPathChanged(next));
                }
            }
        }

        if self.paths.all_inactive() {
            log::warn!("All paths are inactive");
            return true;
        }
        false
    }

    /// Handles a received SACK that arrived on `path`.
    pub fn handle_sack(
        &mut self,
        now: AssocTime,
        path: PathId,
        sack: &SackReport,
    ) -> SackDisposition {
        let highest_outstanding_tsn = self.outstanding_data.highest_outstanding_tsn();
        if !sack.is_canonical() || sack.cumulative_tsn_ack > highest_outstanding_tsn {
            log::warn!(
                "Ignoring invalid SACK, cum_tsn_ack={}, highest sent tsn={}",
                sack.cumulative_tsn_ack,
                highest_outstanding_tsn
            );
            return SackDisposition::Invalid;
        }

        if self.check_sack_seq_number && sack.sack_seq_num != 0 {
            // Sequence numbers wrap, so they are compared with serial arithmetic.
        let is_stale = |last| cmp_rfc1982_u32(sack.sack_seq_num, last) != Ordering::Greater;
        if self.last_sack_seq_num.is_some_and(is_stale) {
                log::debug!("Ignoring reordered SACK with seq_num={}", sack.sack_seq_num);
                return SackDisposition::OutOfOrder;
            }
            self.last_sack_seq_num = Some(sack.sack_seq_num);
        }

        let old_last_cumulative_tsn_ack = self.outstanding_data.last_cumulative_tsn_ack();
        if sack.cumulative_tsn_ack < old_last_cumulative_tsn_ack {
            // From <https://datatracker.ietf.org/doc/html/rfc4960#section-6.2.1>:
            //
            //   If Cumulative TSN Ack is less than the Cumulative TSN Ack Point, then drop the SACK
            //   chunk. Since Cumulative TSN Ack is monotonically increasing, a SACK chunk whose
            //   Cumulative TSN Ack is less than the Cumulative TSN Ack Point indicates an
            //   out-of-order SACK chunk.
            return SackDisposition::Stale;
        }

        let gap_list = gap_list_from_report(sack, highest_outstanding_tsn);
        let old_outstanding_bytes = self.paths.total_outstanding_bytes();
        let old_rwnd = self.peer_rwnd;
        self.paths.iter_mut().for_each(Path::begin_sack);
        if sack.a_rwnd > 0 {
            self.zero_window_probing = false;
        }

        let ack_info = self.outstanding_data.handle_sack(
            now,
            &gap_list,
            path,
            self.num_gap_reports,
            &mut self.paths,
        );
        self.fast_rtx_chunks_count += ack_info.fast_retransmits;
        self.reneged_chunks_count += ack_info.reneged;

        let cumulative_tsn_ack = self.outstanding_data.last_cumulative_tsn_ack();
        self.paths.iter_mut().for_each(|p| p.cc.maybe_exit_fast_recovery(cumulative_tsn_ack));

        if let Some(rtt) = ack_info.rtt {
            let p = &mut self.paths[path];
            if p.rto.wants_measurement(now) {
                p.rto.observe_rtt(now, rtt);
                log::debug!(
                    "Path {} rtt={:?}, srtt={:?}, rto={:?}",
                    path,
                    rtt,
                    p.rto.srtt(),
                    p.rto.rto()
                );
            }
        }

        self.update_receiver_window(sack.a_rwnd);
        if sack.a_rwnd == 0 && self.paths.total_outstanding_bytes() == 0 {
            self.zero_window_probing = true;
        }

        let mut acked_paths = vec![];
        for p in self.paths.iter_mut() {
            if p.sack.newly_acked_bytes > 0 {
                p.cc.on_bytes_acked(
                    p.sack.newly_acked_bytes,
                    p.sack.new_cum_ack,
                    p.sack.outstanding_before,
                    p.outstanding_bytes,
                );
                if self.max_burst_variant == MaxBurstVariant::MaxBurst {
                    p.packets_in_burst = 0;
                }
                acked_paths.push(p.id);
            }

            if p.sack.requires_rtx {
                let highest = self
                    .outstanding_data
                    .highest_outstanding_on_path(p.id)
                    .unwrap_or(highest_outstanding_tsn);
                p.cc.on_packet_loss(highest);
            }

            // From <https://datatracker.ietf.org/doc/html/rfc4960#section-6.3.2>:
            //
            //   R2)  Whenever all outstanding data sent to an address have been acknowledged,
            //        turn off the T3-rtx timer of that address.
            //
            //   R3)  Whenever a SACK is received that acknowledges the DATA chunk with the
            //        earliest outstanding TSN for that address, restart the T3-rtx timer for that
            //        address with its current RTO (if there is still outstanding data on that
            //        address).
            if p.outstanding_bytes == 0 && !self.outstanding_data.has_pending_for_path(p.id) {
                p.t3_rtx.stop();
            } else if p.sack.new_cum_ack || p.sack.lowest_tsn_retransmitted {
                p.start_t3_rtx(now);
            }
        }

        // From <https://datatracker.ietf.org/doc/html/rfc4960#section-8.3>:
        //
        //   When an outstanding TSN is acknowledged [...] the endpoint shall clear the error
        //   counter of the destination transport address to which the DATA chunk was last sent
        //   [...]. The endpoint shall also clear the association's error counter.
        for id in acked_paths {
            self.clear_error_counter(id);
        }

        self.emit_abandoned();
        self.maybe_request_forward_tsn();

        log::debug!(
            "Received SACK, cum_tsn_ack={} ({}), outstanding_bytes={} ({}), rwnd={} ({})",
            cumulative_tsn_ack,
            old_last_cumulative_tsn_ack,
            self.paths.total_outstanding_bytes(),
            old_outstanding_bytes,
            self.peer_rwnd,
            old_rwnd
        );
        SackDisposition::Processed
    }

    fn begin_burst_round(&mut self, now: AssocTime) {
        self.burst_round = Some(now);
        self.packets_in_burst = 0;
        for p in self.paths.iter_mut() {
            p.packets_in_burst = 0;
            p.cc.apply_max_burst(self.max_burst_variant, self.max_burst, p.outstanding_bytes);
        }
    }

    /// Indicates if a chunk of `size` bytes may be sent to `path` now.
    fn can_send(&self, path: PathId, size: usize, is_fast_retransmission: bool) -> bool {
        let p = &self.paths[path];

        // From <https://datatracker.ietf.org/doc/html/rfc4960#section-6.1>:
        //
        //   B) At any given time, the sender MUST NOT transmit new data to a given transport
        //      address if it has cwnd or more bytes of data outstanding to that transport address.
        //
        // From <https://datatracker.ietf.org/doc/html/rfc4960#section-7.2.4>:
        //
        //   3) Determine how many of the earliest (i.e., lowest TSN) DATA chunks marked for
        //      retransmission will fit into a single packet, subject to constraint of the path MTU
        //      of the destination transport address to which the packet is being sent. Call this
        //      value K. Retransmit those K DATA chunks in a single packet. When a Fast Retransmit
        //      is being performed, the sender SHOULD ignore the value of cwnd and SHOULD NOT delay
        //      retransmission for this packet.
        if !is_fast_retransmission
            && p.outstanding_bytes >= p.cc.sending_window(self.max_burst_variant)
        {
            return false;
        }

        // From <https://datatracker.ietf.org/doc/html/rfc4960#section-6.1>:
        //
        //   A) At any given time, the data sender MUST NOT transmit new data to any destination
        //      transport address if its peer's rwnd indicates that the peer has no buffer space
        //      (i.e., rwnd is 0; see Section 6.2.1). However, regardless of the value of rwnd
        //      (including if it is 0), the data sender can always have one DATA chunk in flight
        //      to the receiver if allowed by cwnd (see rule B, below).
        if size > self.peer_rwnd && self.paths.total_outstanding_bytes() > 0 {
            return false;
        }

        match self.max_burst_variant {
            MaxBurstVariant::MaxBurst | MaxBurstVariant::AggressiveMaxBurst => {
                p.packets_in_burst < self.max_burst
            }
            MaxBurstVariant::TotalMaxBurst => self.packets_in_burst < self.max_burst,
            _ => true,
        }
    }

    fn on_chunk_sent(&mut self, now: AssocTime, path: PathId, size: usize) {
        self.tx_chunks_count += 1;
        self.packets_in_burst += 1;
        self.peer_rwnd = self.peer_rwnd.saturating_sub(size);
        let p = &mut self.paths[path];
        p.packets_in_burst += 1;

        // From <https://datatracker.ietf.org/doc/html/rfc4960#section-6.3.2>:
        //
        //   R1)  Every time a DATA chunk is sent to any address (including a retransmission), if
        //        the T3-rtx timer of that address is not running, start it running so that it
        //        will expire after the RTO of that address.
        p.start_t3_rtx_if_stopped(now);
        p.restart_heartbeat(now);
    }

    /// Returns the next DATA chunk to send, if allowed. Chunks to be retransmitted are sent
    /// before new data, which is taken from `send_queue` and gets a TSN assigned.
    pub fn next_to_send(
        &mut self,
        now: AssocTime,
        send_queue: &mut SendQueue,
    ) -> Option<OutboundData> {
        if self.burst_round != Some(now) {
            self.begin_burst_round(now);
        }

        let mut result = None;
        for tsn in self.outstanding_data.to_be_retransmitted() {
            if self.outstanding_data.must_be_abandoned(now, tsn) {
                self.outstanding_data.abandon(tsn, &mut self.paths);
                continue;
            }
            let Some((path, size, fast)) = self.outstanding_data.retransmission_info(tsn) else {
                continue;
            };
            if !self.can_send(path, size, fast) {
                continue;
            }
            if let Some(data) = self.outstanding_data.mark_retransmitted(now, tsn, &mut self.paths)
            {
                self.rtx_chunks_count += 1;
                self.on_chunk_sent(now, path, size);
                result = Some(data);
                break;
            }
        }
        self.emit_abandoned();
        self.maybe_request_forward_tsn();
        if result.is_some() || self.outstanding_data.has_data_to_be_retransmitted() {
            return result;
        }

        loop {
            let size = send_queue.peek_chunk_size()?;
            let path = self.paths.destination_for_new_data();
            if !self.can_send(path, size, false) {
                return None;
            }
            let data = send_queue.produce()?;
            match self.outstanding_data.insert(now, data, path, &mut self.paths) {
                Some(outbound) => {
                    self.on_chunk_sent(now, path, size);
                    return Some(outbound);
                }
                None => {
                    self.emit_abandoned();
                    self.maybe_request_forward_tsn();
                }
            }
        }
    }

    /// Returns the per-path timers that have expired at `now`.
    pub fn expired_timers(&mut self, now: AssocTime) -> Vec<(PathId, PathTimer)> {
        let mut expired = vec![];
        for p in self.paths.iter_mut() {
            if p.t3_rtx.expire(now) {
                expired.push((p.id, PathTimer::T3Rtx));
            }
            if p.heartbeat.expire(now) {
                expired.push((p.id, PathTimer::Heartbeat));
            }
            if p.heartbeat_ack.expire(now) {
                expired.push((p.id, PathTimer::HeartbeatAck));
            }
        }
        expired
    }

    /// Handles the expiry of the T3-rtx timer of `path`. Returns true if the association has
    /// failed and must be aborted.
    pub fn on_retransmission_timeout(&mut self, now: AssocTime, path: PathId) -> bool {
        let Some(p) = self.paths.get_mut(path) else {
            return false;
        };
        self.t3_expiry_count += 1;
        let old_outstanding_bytes = p.outstanding_bytes;
        p.t3_rtx.stop();

        // From <https://datatracker.ietf.org/doc/html/rfc4960#section-6.3.3>:
        //
        //   E1)  For the destination address for which the timer expires, adjust its ssthresh
        //        with rules defined in Section 7.2.3 and set the cwnd <- MTU.
        //
        //   E2)  For the destination address for which the timer expires, set RTO <- RTO * 2
        //        ("back off the timer").
        p.rto.back_off();
        p.cc.on_retransmission_timeout();

        if !self.zero_window_probing && self.count_error(path) {
            return true;
        }

        //   E3)  Determine how many of the earliest (i.e., lowest TSN) outstanding DATA chunks
        //        for the address for which the T3-rtx has expired will fit into a single packet
        //        [...]
        //
        //   Note: Any DATA chunks that were sent to the address for which the T3-rtx timer
        //   expired but did not fit in one MTU (rule E3 above) should be marked for
        //   retransmission and sent as soon as cwnd allows (normally, when a SACK arrives).
        let moved_bytes = self.outstanding_data.nack_for_t3(now, path, &mut self.paths);
        self.peer_rwnd = (self.peer_rwnd + moved_bytes).min(self.initial_peer_rwnd);
        log::debug!(
            "t3-rtx expired on {}, rto={:?}, outstanding_bytes={} ({})",
            path,
            self.paths[path].rto.rto(),
            self.paths[path].outstanding_bytes,
            old_outstanding_bytes
        );

        self.emit_abandoned();
        self.maybe_request_forward_tsn();
        false
    }

    /// Called when the heartbeat timer of `path` has expired: a HEARTBEAT should be sent.
    pub fn send_heartbeat(&mut self, now: AssocTime, path: PathId) {
        let Some(p) = self.paths.get_mut(path) else {
            return;
        };
        p.on_heartbeat_sent(now);
        p.restart_heartbeat(now);
        self.events
            .borrow_mut()
            .add(AssociationEvent::SendControl(ControlChunk::HeartbeatRequest(path)));
    }

    /// Handles a HEARTBEAT on `path` that was not acknowledged in time. Returns true if the
    /// association has failed and must be aborted.
    pub fn on_heartbeat_timeout(&mut self, _now: AssocTime, path: PathId) -> bool {
        let Some(p) = self.paths.get_mut(path) else {
            return false;
        };
        p.heartbeat_ack.stop();
        if !p.active {
            return false;
        }
        // From <https://datatracker.ietf.org/doc/html/rfc4960#section-8.3>:
        //
        //   When the acknowledgement for a HEARTBEAT chunk is not received within the RTO, the
        //   sender should increment the error counter [...], double the value of RTO [...].
        p.rto.back_off();
        self.count_error(path)
    }

    pub fn on_heartbeat_ack(&mut self, now: AssocTime, path: PathId, rtt: Duration) {
        let Some(p) = self.paths.get_mut(path) else {
            return;
        };
        p.heartbeat_ack.stop();
        p.rto.observe_rtt(now, rtt);
        p.restart_heartbeat(now);
        self.clear_error_counter(path);
    }

    pub fn create_forward_tsn(&mut self) -> Option<ForwardTsn> {
        if !self.partial_reliability {
            return None;
        }
        self.outstanding_data.advance_peer_ack_point();
        self.outstanding_data.create_forward_tsn()
    }

    /// Returns the chunks that were acknowledged since the last call.
    pub fn sweep(&mut self) -> Vec<AcknowledgedChunk> {
        self.outstanding_data.take_swept()
    }

    pub fn tx_chunks_count(&self) -> usize {
        self.tx_chunks_count
    }

    pub fn rtx_chunks_count(&self) -> usize {
        self.rtx_chunks_count
    }

    pub fn fast_rtx_chunks_count(&self) -> usize {
        self.fast_rtx_chunks_count
    }

    pub fn t3_expiry_count(&self) -> usize {
        self.t3_expiry_count
    }

    pub fn reneged_chunks_count(&self) -> usize {
        self.reneged_chunks_count
    }

    pub fn path_metrics(&self) -> Vec<PathMetrics> {
        self.paths.iter().map(Path::metrics).collect()
    }

    #[cfg(test)]
    pub fn paths_mut(&mut self) -> &mut Paths {
        &mut self.paths
    }

    #[cfg(test)]
    pub fn get_chunk_states_for_testing(
        &self,
    ) -> Vec<(Tsn, crate::tx::outstanding_data::ChunkState)> {
        self.outstanding_data.get_chunk_states_for_testing()
    }
}
