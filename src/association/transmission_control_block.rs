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
use crate::api::AssocTime;
use crate::api::DataDisposition;
use crate::api::ForwardTsn;
use crate::api::Metrics;
use crate::api::Options;
use crate::api::PeerParameters;
use crate::api::ReceivedData;
use crate::api::ReceivedMessage;
use crate::api::SackReport;
use crate::rx::data_tracker::DataTracker;
use crate::rx::receive_buffer::ReceiveBuffer;
use crate::tx::retransmission_queue::RetransmissionQueue;
use crate::types::Tsn;
use std::cell::RefCell;
use std::rc::Rc;

/// The Transmission Control Block, holding everything that exists while an association is set up,
/// from receiving the peer's initial parameters until it's closed.
pub struct TransmissionControlBlock {
    pub my_initial_tsn: Tsn,
    pub peer_initial_tsn: Tsn,
    pub partial_reliability: bool,
    pub data_tracker: DataTracker,
    pub receive_buffer: ReceiveBuffer,
    pub retransmission_queue: RetransmissionQueue,
    sws_limit: usize,
    rx_chunks_count: usize,
    duplicate_tsns_count: usize,
}

impl TransmissionControlBlock {
    pub fn new(
        options: &Options,
        my_initial_tsn: Tsn,
        peer: &PeerParameters,
        events: Rc<RefCell<dyn EventSink>>,
    ) -> Self {
        let partial_reliability =
            options.enable_partial_reliability && peer.supports_partial_reliability;
        let mut data_tracker = DataTracker::new(peer.initial_tsn, options);
        data_tracker.update_rto(options.rto_initial);
        TransmissionControlBlock {
            my_initial_tsn,
            peer_initial_tsn: peer.initial_tsn,
            partial_reliability,
            data_tracker,
            receive_buffer: ReceiveBuffer::new(options.receive_buffer_size),
            retransmission_queue: RetransmissionQueue::new(
                events,
                my_initial_tsn,
                peer.a_rwnd,
                options,
                partial_reliability,
            ),
            sws_limit: options.sws_limit,
            rx_chunks_count: 0,
            duplicate_tsns_count: 0,
        }
    }

    /// Tracks and buffers an inbound DATA chunk. When the receive buffer is full, revokable data
    /// above `data.tsn` may be reneged to make room for it.
    pub fn receive_data(
        &mut self,
        now: AssocTime,
        data: ReceivedData,
        revokable: bool,
    ) -> DataDisposition {
        let tsn = data.tsn;
        if !self.data_tracker.is_tsn_valid(tsn) {
            log::warn!("Dropping tsn={}, too far ahead of the cumulative ack", tsn);
            return DataDisposition::Dropped;
        }
        self.rx_chunks_count += 1;

        if self.data_tracker.is_duplicate(tsn) {
            self.duplicate_tsns_count += 1;
            return self.data_tracker.observe(now, tsn, revokable);
        }

        let size = data.payload.len();
        if !self.receive_buffer.has_room_for(size) {
            if tsn > self.data_tracker.highest_tsn_received() {
                log::debug!("Receive buffer full, dropping tsn={}", tsn);
                return DataDisposition::Dropped;
            }
            let data_tracker = &self.data_tracker;
            let Some(evicted) = self
                .receive_buffer
                .make_room_for_tsn(size, tsn, |t| data_tracker.is_revokable(t))
            else {
                log::debug!("Receive buffer full and nothing to renege, dropping tsn={}", tsn);
                return DataDisposition::Dropped;
            };
            for evicted_tsn in evicted {
                self.data_tracker.renege(evicted_tsn);
            }
        }

        let disposition = self.data_tracker.observe(now, tsn, revokable);
        if disposition == DataDisposition::New {
            self.receive_buffer.insert(data);
        }
        disposition
    }

    /// Delivers the next message. Once delivered, data can't be reneged any longer.
    pub fn poll_received_message(&mut self) -> Option<ReceivedMessage> {
        let (tsn, message) = self.receive_buffer.pop()?;
        if tsn > self.data_tracker.last_cumulative_acked_tsn() {
            self.data_tracker.mark_non_revokable(tsn);
        }
        Some(message)
    }

    pub fn handle_forward_tsn(&mut self, now: AssocTime, forward_tsn: &ForwardTsn) {
        if self.data_tracker.handle_forward_tsn(now, forward_tsn.new_cumulative_tsn) {
            self.receive_buffer
                .handle_forward_tsn(forward_tsn.new_cumulative_tsn, &forward_tsn.skipped_streams);
        }
    }

    pub fn create_sack(&mut self) -> SackReport {
        let a_rwnd = self.receive_buffer.a_rwnd(self.sws_limit);
        self.data_tracker.create_selective_ack(a_rwnd)
    }

    /// Keeps the delayed ack timeout in line with the primary path's RTO.
    pub fn sync_rto(&mut self) {
        self.data_tracker.update_rto(self.retransmission_queue.rto());
    }

    pub fn next_timeout(&self) -> Option<AssocTime> {
        match (self.retransmission_queue.next_timeout(), self.data_tracker.next_timeout()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn metrics(&self) -> Metrics {
        let rq = &self.retransmission_queue;
        Metrics {
            tx_chunks_count: rq.tx_chunks_count(),
            rtx_chunks_count: rq.rtx_chunks_count(),
            fast_rtx_chunks_count: rq.fast_rtx_chunks_count(),
            t3_expiry_count: rq.t3_expiry_count(),
            reneged_chunks_count: rq.reneged_chunks_count(),
            rx_chunks_count: self.rx_chunks_count,
            duplicate_tsns_count: self.duplicate_tsns_count,
            gap_list_overflows: self.data_tracker.overflow_count(),
            peer_rwnd: rq.peer_rwnd(),
            primary_path: rq.primary_path(),
            paths: rq.path_metrics(),
        }
    }
}
