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
use crate::api::AssociationError;
use crate::api::Message;
use crate::api::Options;
use crate::api::SendOptions;
use crate::api::StreamId;
use crate::math::round_up_to_4;
use crate::types::Ssn;
use std::collections::HashMap;
use std::collections::VecDeque;

/// Size of the DATA chunk header.
///
/// See <https://datatracker.ietf.org/doc/html/rfc4960#section-3.3.1>.
pub const DATA_CHUNK_HEADER_SIZE: usize = 16;

/// Returns the padded size of a DATA chunk carrying `payload_size` bytes.
pub fn data_chunk_size(payload_size: usize) -> usize {
    round_up_to_4!(DATA_CHUNK_HEADER_SIZE + payload_size)
}

/// A message that is about to be assigned a TSN and be sent for the first time.
#[derive(Clone, Debug, PartialEq)]
pub struct DataToSend {
    pub stream_id: StreamId,

    /// Set for ordered messages.
    pub ssn: Option<Ssn>,

    pub payload: Vec<u8>,

    /// With partial reliability, the message is abandoned if not acknowledged by then.
    pub expires_at: Option<AssocTime>,

    /// With partial reliability, the number of allowed retransmissions.
    pub max_retransmissions: Option<u16>,
}

impl DataToSend {
    pub fn chunk_size(&self) -> usize {
        data_chunk_size(self.payload.len())
    }
}

struct QueuedMessage {
    stream_id: StreamId,
    unordered: bool,
    payload: Vec<u8>,
    expires_at: Option<AssocTime>,
    max_retransmissions: Option<u16>,
}

/// Messages waiting for their first transmission, in the order they were added.
///
/// Every message is carried in a single DATA chunk. Stream sequence numbers are assigned when a
/// message leaves the queue, so that a message that is never sent doesn't leave a hole in the
/// stream.
pub struct SendQueue {
    max_message_size: usize,
    max_buffer_size: usize,
    queue: VecDeque<QueuedMessage>,
    next_ssn: HashMap<StreamId, Ssn>,
    buffered: usize,
}

impl SendQueue {
    pub fn new(options: &Options) -> Self {
        Self {
            max_message_size: options.max_message_size,
            max_buffer_size: options.max_send_buffer_size,
            queue: VecDeque::new(),
            next_ssn: HashMap::new(),
            buffered: 0,
        }
    }

    /// Enqueues a message, recording its partial reliability policy relative to `now`.
    pub fn add(
        &mut self,
        now: AssocTime,
        message: Message,
        send_options: &SendOptions,
    ) -> Result<(), AssociationError> {
        let size = message.payload.len();
        if size == 0 {
            return Err(AssociationError::MessageEmpty);
        }
        if size > self.max_message_size {
            return Err(AssociationError::MessageTooLarge(size));
        }
        if self.buffered + size > self.max_buffer_size {
            return Err(AssociationError::ResourceExhaustion);
        }

        self.buffered += size;
        self.queue.push_back(QueuedMessage {
            stream_id: message.stream_id,
            unordered: send_options.unordered,
            payload: message.payload,
            expires_at: send_options.lifetime.map(|lifetime| now + lifetime),
            max_retransmissions: send_options.max_retransmissions,
        });
        Ok(())
    }

    /// Returns the chunk size of the next message to be produced.
    pub fn peek_chunk_size(&self) -> Option<usize> {
        self.queue.front().map(|m| data_chunk_size(m.payload.len()))
    }

    pub fn produce(&mut self) -> Option<DataToSend> {
        let message = self.queue.pop_front()?;
        self.buffered -= message.payload.len();
        let ssn = if message.unordered {
            None
        } else {
            let next_ssn = self.next_ssn.entry(message.stream_id).or_default();
            let ssn = *next_ssn;
            *next_ssn += 1;
            Some(ssn)
        };
        Some(DataToSend {
            stream_id: message.stream_id,
            ssn,
            payload: message.payload,
            expires_at: message.expires_at,
            max_retransmissions: message.max_retransmissions,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total number of payload bytes waiting to be sent.
    pub fn buffered_amount(&self) -> usize {
        self.buffered
    }

    pub fn reset(&mut self) {
        self.queue.clear();
        self.next_ssn.clear();
        self.buffered = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const NOW: AssocTime = AssocTime::zero();

    fn create_queue() -> SendQueue {
        SendQueue::new(&Options {
            max_message_size: 1000,
            max_send_buffer_size: 2000,
            ..Options::default()
        })
    }

    fn add(q: &mut SendQueue, sid: StreamId, size: usize) -> Result<(), AssociationError> {
        q.add(NOW, Message::new(sid, vec![0; size]), &SendOptions::default())
    }

    #[test]
    fn empty_buffer() {
        let mut q = create_queue();
        assert!(q.is_empty());
        assert!(q.produce().is_none());
        assert_eq!(q.peek_chunk_size(), None);
    }

    #[test]
    fn add_and_get_single_chunk() {
        let mut q = create_queue();
        add(&mut q, StreamId(1), 5).unwrap();
        assert_eq!(q.buffered_amount(), 5);
        assert_eq!(q.peek_chunk_size(), Some(24));

        let data = q.produce().unwrap();
        assert_eq!(data.stream_id, StreamId(1));
        assert_eq!(data.ssn, Some(Ssn(0)));
        assert_eq!(data.payload, vec![0; 5]);
        assert_eq!(data.chunk_size(), 24);
        assert!(q.is_empty());
        assert_eq!(q.buffered_amount(), 0);
    }

    #[test]
    fn assigns_ssn_per_ordered_stream() {
        let mut q = create_queue();
        add(&mut q, StreamId(1), 10).unwrap();
        add(&mut q, StreamId(2), 10).unwrap();
        q.add(
            NOW,
            Message::new(StreamId(1), vec![1; 10]),
            &SendOptions { unordered: true, ..Default::default() },
        )
        .unwrap();
        add(&mut q, StreamId(1), 10).unwrap();

        let ssns: Vec<_> = std::iter::from_fn(|| q.produce()).collect();
        assert_eq!(
            ssns.iter().map(|d| (d.stream_id, d.ssn)).collect::<Vec<_>>(),
            vec![
                (StreamId(1), Some(Ssn(0))),
                (StreamId(2), Some(Ssn(0))),
                (StreamId(1), None),
                (StreamId(1), Some(Ssn(1))),
            ]
        );
    }

    #[test]
    fn rejects_invalid_messages() {
        let mut q = create_queue();
        assert_eq!(add(&mut q, StreamId(1), 0), Err(AssociationError::MessageEmpty));
        assert_eq!(add(&mut q, StreamId(1), 1001), Err(AssociationError::MessageTooLarge(1001)));
        assert!(q.is_empty());
    }

    #[test]
    fn buffer_becomes_full_and_emptied() {
        let mut q = create_queue();
        add(&mut q, StreamId(1), 1000).unwrap();
        add(&mut q, StreamId(1), 1000).unwrap();
        assert_eq!(add(&mut q, StreamId(1), 1), Err(AssociationError::ResourceExhaustion));

        q.produce().unwrap();
        add(&mut q, StreamId(1), 1).unwrap();
        assert_eq!(q.buffered_amount(), 1001);

        q.reset();
        assert!(q.is_empty());
        assert_eq!(q.buffered_amount(), 0);
    }

    #[test]
    fn records_partial_reliability_policy() {
        let mut q = create_queue();
        let now = NOW + Duration::from_secs(10);
        q.add(
            now,
            Message::new(StreamId(1), vec![1; 10]),
            &SendOptions {
                lifetime: Some(Duration::from_millis(500)),
                max_retransmissions: Some(2),
                ..Default::default()
            },
        )
        .unwrap();

        let data = q.produce().unwrap();
        assert_eq!(data.expires_at, Some(now + Duration::from_millis(500)));
        assert_eq!(data.max_retransmissions, Some(2));
    }
}
