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

use crate::api::ReceivedData;
use crate::api::ReceivedMessage;
use crate::api::StreamId;
use crate::types::Ssn;
use crate::types::Tsn;
use std::collections::HashMap;
use std::collections::VecDeque;

#[derive(Debug)]
struct BufferedChunk {
    tsn: Tsn,
    stream_id: StreamId,
    ssn: Option<Ssn>,
    payload: Vec<u8>,
}

/// Holds received user data until it's delivered to the upper layer.
///
/// Unordered messages become deliverable directly, while ordered messages are held back per
/// stream until all messages with lower stream sequence numbers have been delivered. Messages that
/// are held back can be discarded again to make room for other data (reneging).
pub struct ReceiveBuffer {
    capacity: usize,
    queued_bytes: usize,
    /// Ordered messages waiting for earlier messages on their stream, sorted by TSN.
    pending: Vec<BufferedChunk>,
    /// Messages that can be delivered, in delivery order.
    ready: VecDeque<BufferedChunk>,
    next_ssn: HashMap<StreamId, Ssn>,
}

impl ReceiveBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queued_bytes: 0,
            pending: vec![],
            ready: VecDeque::new(),
            next_ssn: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }

    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.queued_bytes)
    }

    pub fn has_room_for(&self, size: usize) -> bool {
        size <= self.available()
    }

    pub fn has_deliverable(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Returns the receiver window to advertise.
    ///
    /// To avoid the silly window syndrome, a window that is small but not fully closed is
    /// advertised as a single byte.
    pub fn a_rwnd(&self, sws_limit: usize) -> u32 {
        let available = self.available();
        let threshold = sws_limit.min(self.capacity / 2);
        let a_rwnd = if available > 0 && available < threshold { 1 } else { available };
        u32::try_from(a_rwnd).unwrap_or(u32::MAX)
    }

    pub fn insert(&mut self, data: ReceivedData) {
        self.queued_bytes += data.payload.len();
        if data.unordered {
            self.ready.push_back(BufferedChunk {
                tsn: data.tsn,
                stream_id: data.stream_id,
                ssn: None,
                payload: data.payload,
            });
            return;
        }

        let chunk = BufferedChunk {
            tsn: data.tsn,
            stream_id: data.stream_id,
            ssn: Some(data.ssn),
            payload: data.payload,
        };
        let next_ssn = self.next_ssn.entry(data.stream_id).or_default();
        if data.ssn < *next_ssn {
            // Already skipped over, e.g. by a FORWARD-TSN. Nothing to wait for.
            self.ready.push_back(chunk);
        } else if data.ssn == *next_ssn {
            *next_ssn += 1;
            self.ready.push_back(chunk);
            self.release_pending(data.stream_id);
        } else {
            let idx = self.pending.partition_point(|c| c.tsn < chunk.tsn);
            self.pending.insert(idx, chunk);
        }
    }

    /// Moves messages that are now in sequence on `stream_id` to the deliverable queue.
    fn release_pending(&mut self, stream_id: StreamId) {
        let Some(next_ssn) = self.next_ssn.get_mut(&stream_id) else {
            return;
        };
        while let Some(idx) =
            self.pending.iter().position(|c| c.stream_id == stream_id && c.ssn == Some(*next_ssn))
        {
            *next_ssn += 1;
            let chunk = self.pending.remove(idx);
            self.ready.push_back(chunk);
        }
    }

    /// Pops the next deliverable message, with the TSN it was received with.
    pub fn pop(&mut self) -> Option<(Tsn, ReceivedMessage)> {
        let chunk = self.ready.pop_front()?;
        self.queued_bytes -= chunk.payload.len();
        Some((
            chunk.tsn,
            ReceivedMessage { stream_id: chunk.stream_id, ssn: chunk.ssn, payload: chunk.payload },
        ))
    }

    /// Finds undelivered data to discard so that `size` more bytes fit in the buffer, to be able
    /// to accept `tsn`. Only data with a higher TSN than `tsn`, for which `can_renege` holds, is
    /// considered, starting from the highest TSN.
    ///
    /// Returns the TSNs that were discarded, or `None` if not enough room could be made, in which
    /// case nothing is discarded.
    pub fn make_room_for_tsn(
        &mut self,
        size: usize,
        tsn: Tsn,
        can_renege: impl Fn(Tsn) -> bool,
    ) -> Option<Vec<Tsn>> {
        let mut candidates: Vec<(Tsn, usize)> = self
            .pending
            .iter()
            .chain(self.ready.iter().filter(|c| c.ssn.is_none()))
            .filter(|c| c.tsn > tsn && can_renege(c.tsn))
            .map(|c| (c.tsn, c.payload.len()))
            .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        let mut freed = self.available();
        let mut evicted = vec![];
        for (candidate, len) in candidates {
            if freed >= size {
                break;
            }
            freed += len;
            evicted.push(candidate);
        }
        if freed < size {
            return None;
        }

        self.discard(|c| evicted.contains(&c.tsn));
        Some(evicted)
    }

    fn discard(&mut self, predicate: impl Fn(&BufferedChunk) -> bool) -> usize {
        let mut removed = 0;
        self.pending.retain(|c| {
            let keep = !predicate(c);
            if !keep {
                removed += c.payload.len();
            }
            keep
        });
        self.ready.retain(|c| {
            let keep = !predicate(c);
            if !keep {
                removed += c.payload.len();
            }
            keep
        });
        self.queued_bytes -= removed;
        removed
    }

    /// Handles a FORWARD-TSN: drops held back data up to `new_cumulative_tsn` and moves the
    /// expected sequence number of the skipped streams past the abandoned messages. Returns the
    /// number of bytes that were discarded.
    pub fn handle_forward_tsn(
        &mut self,
        new_cumulative_tsn: Tsn,
        skipped_streams: &[(StreamId, Ssn)],
    ) -> usize {
        let mut removed = 0;
        self.pending.retain(|c| {
            let keep = c.tsn > new_cumulative_tsn;
            if !keep {
                removed += c.payload.len();
            }
            keep
        });
        self.queued_bytes -= removed;

        for (stream_id, ssn) in skipped_streams {
            let next_ssn = self.next_ssn.entry(*stream_id).or_default();
            if *ssn >= *next_ssn {
                *next_ssn = *ssn + 1;
            }
            self.release_pending(*stream_id);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.ready.clear();
        self.next_ssn.clear();
        self.queued_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(tsn: u32, stream: u16, ssn: u16, unordered: bool, size: usize) -> ReceivedData {
        ReceivedData {
            tsn: Tsn(tsn),
            stream_id: StreamId(stream),
            ssn: Ssn(ssn),
            unordered,
            payload: vec![tsn as u8; size],
        }
    }

    fn pop_tsns(buf: &mut ReceiveBuffer) -> Vec<u32> {
        std::iter::from_fn(|| buf.pop().map(|(tsn, _)| tsn.0)).collect()
    }

    #[test]
    fn delivers_ordered_messages_in_ssn_order() {
        let mut buf = ReceiveBuffer::new(1000);
        buf.insert(data(12, 1, 1, false, 10));
        assert!(!buf.has_deliverable());
        buf.insert(data(13, 1, 2, false, 10));
        buf.insert(data(11, 1, 0, false, 10));
        assert_eq!(buf.queued_bytes(), 30);
        assert_eq!(pop_tsns(&mut buf), vec![11, 12, 13]);
        assert_eq!(buf.queued_bytes(), 0);
    }

    #[test]
    fn streams_are_independent() {
        let mut buf = ReceiveBuffer::new(1000);
        buf.insert(data(11, 1, 1, false, 10));
        buf.insert(data(12, 2, 0, false, 10));
        assert_eq!(pop_tsns(&mut buf), vec![12]);
        buf.insert(data(13, 1, 0, false, 10));
        assert_eq!(pop_tsns(&mut buf), vec![13, 11]);
    }

    #[test]
    fn unordered_messages_are_delivered_directly() {
        let mut buf = ReceiveBuffer::new(1000);
        buf.insert(data(12, 1, 1, false, 10));
        buf.insert(data(13, 1, 0, true, 10));
        let (tsn, message) = buf.pop().unwrap();
        assert_eq!(tsn, Tsn(13));
        assert_eq!(message.ssn, None);
        assert!(buf.pop().is_none());
    }

    #[test]
    fn advertises_window_with_sws_avoidance() {
        let mut buf = ReceiveBuffer::new(10000);
        assert_eq!(buf.a_rwnd(3000), 10000);
        buf.insert(data(11, 1, 1, false, 8000));
        assert_eq!(buf.a_rwnd(3000), 1);
        buf.insert(data(12, 1, 2, false, 2000));
        assert_eq!(buf.a_rwnd(3000), 0);
        assert!(!buf.has_room_for(1));
    }

    #[test]
    fn makes_room_from_highest_tsn() {
        let mut buf = ReceiveBuffer::new(100);
        buf.insert(data(13, 1, 2, false, 40));
        buf.insert(data(14, 1, 3, false, 30));
        buf.insert(data(15, 1, 4, false, 30));
        assert_eq!(buf.available(), 0);

        let evicted = buf.make_room_for_tsn(50, Tsn(12), |_| true).unwrap();
        assert_eq!(evicted, vec![Tsn(15), Tsn(14)]);
        assert_eq!(buf.available(), 60);

        buf.insert(data(11, 1, 0, false, 40));
        buf.insert(data(12, 1, 1, false, 10));
        assert_eq!(pop_tsns(&mut buf), vec![11, 12, 13]);
    }

    #[test]
    fn does_not_evict_when_room_cant_be_made() {
        let mut buf = ReceiveBuffer::new(100);
        buf.insert(data(13, 1, 2, false, 50));
        buf.insert(data(14, 1, 3, false, 50));
        assert!(buf.make_room_for_tsn(60, Tsn(13), |_| true).is_none());
        assert!(buf.make_room_for_tsn(10, Tsn(12), |tsn| tsn != Tsn(14)).is_some());
        assert_eq!(buf.queued_bytes(), 50);
    }

    #[test]
    fn forward_tsn_skips_abandoned_messages() {
        let mut buf = ReceiveBuffer::new(1000);
        buf.insert(data(12, 1, 1, false, 10));
        buf.insert(data(14, 1, 3, false, 10));
        assert_eq!(buf.handle_forward_tsn(Tsn(13), &[(StreamId(1), Ssn(2))]), 10);
        assert_eq!(pop_tsns(&mut buf), vec![14]);
    }
}
