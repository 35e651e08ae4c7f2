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

use super::*;
use crate::api::GapReport;
use crate::api::StreamId;
use crate::packet::nr_sack_chunk;
use crate::packet::sack_chunk;
use crate::testing::event_helpers::expect_forward_tsn_needed;
use crate::testing::event_helpers::expect_no_event;
use crate::testing::event_helpers::expect_on_aborted;
use crate::testing::event_helpers::expect_on_closed;
use crate::testing::event_helpers::expect_on_connected;
use crate::testing::event_helpers::expect_on_gap_list_overflow;
use crate::testing::event_helpers::expect_on_message_abandoned;
use crate::testing::event_helpers::expect_send_control;
use crate::types::Ssn;

const NOW: AssocTime = AssocTime::zero();
const PATH: PathId = PathId(0);
const STREAM_ID: StreamId = StreamId(1);
const A_INITIAL_TSN: u32 = 1000;
const Z_INITIAL_TSN: u32 = 5000;
const A_RWND: u32 = 65536;
const PAYLOAD_SIZE: usize = 1000;

fn peer_parameters(initial_tsn: u32) -> PeerParameters {
    PeerParameters {
        initial_tsn: Tsn(initial_tsn),
        a_rwnd: A_RWND,
        supports_partial_reliability: true,
    }
}

fn drain_events(association: &mut Association) {
    while association.poll_event().is_some() {}
}

/// Sets up an association between "A", the active side, and "Z".
fn connect_with_options(options_a: &Options, options_z: &Options) -> (Association, Association) {
    let mut a = Association::with_initial_tsn("A", options_a, Tsn(A_INITIAL_TSN)).unwrap();
    let mut z = Association::with_initial_tsn("Z", options_z, Tsn(Z_INITIAL_TSN)).unwrap();
    a.connect(NOW).unwrap();
    z.accept(NOW, peer_parameters(A_INITIAL_TSN)).unwrap();
    a.on_init_ack(NOW, peer_parameters(Z_INITIAL_TSN)).unwrap();
    a.on_cookie_ack(NOW).unwrap();
    drain_events(&mut a);
    drain_events(&mut z);
    (a, z)
}

fn connect() -> (Association, Association) {
    connect_with_options(&Options::default(), &Options::default())
}

fn enqueue(association: &mut Association, count: usize, send_options: &SendOptions) {
    for _ in 0..count {
        association
            .enqueue_for_transmission(
                NOW,
                Message::new(STREAM_ID, vec![0; PAYLOAD_SIZE]),
                send_options,
            )
            .unwrap();
    }
}

fn send_all(association: &mut Association, now: AssocTime) -> Vec<OutboundData> {
    std::iter::from_fn(|| association.pop_next_deliverable(now)).collect()
}

fn to_received(data: OutboundData) -> ReceivedData {
    ReceivedData {
        tsn: data.tsn,
        stream_id: data.stream_id,
        ssn: data.ssn.unwrap_or_default(),
        unordered: data.ssn.is_none(),
        payload: data.payload,
    }
}

fn ordered_data(tsn: u32, ssn: u16, size: usize) -> ReceivedData {
    ReceivedData {
        tsn: Tsn(tsn),
        stream_id: STREAM_ID,
        ssn: Ssn(ssn),
        unordered: false,
        payload: vec![0; size],
    }
}

fn unordered_data(tsn: u32, size: usize) -> ReceivedData {
    ReceivedData { unordered: true, ..ordered_data(tsn, 0, size) }
}

/// Lets "Z" acknowledge what it has received, if a SACK is due.
fn maybe_ack(z: &mut Association, a: &mut Association, now: AssocTime) -> Option<SackDisposition> {
    if !z.should_send_sack(now) {
        return None;
    }
    let sack = z.build_sack_report().unwrap();
    Some(a.on_sack_received(now, PATH, &sack).unwrap())
}

fn tsns(chunks: &[AcknowledgedChunk]) -> Vec<Tsn> {
    let mut tsns: Vec<Tsn> = chunks.iter().map(|c| c.tsn).collect();
    tsns.sort();
    tsns
}

#[test]
fn establishes_connection() {
    let options = Options::default();
    let mut a = Association::with_initial_tsn("A", &options, Tsn(A_INITIAL_TSN)).unwrap();
    let mut z = Association::with_initial_tsn("Z", &options, Tsn(Z_INITIAL_TSN)).unwrap();

    a.connect(NOW).unwrap();
    assert_eq!(a.state(), AssociationState::CookieWait);
    assert_eq!(
        expect_send_control!(a.poll_event()),
        ControlChunk::Init { initial_tsn: Tsn(A_INITIAL_TSN), a_rwnd: A_RWND }
    );

    z.accept(NOW, peer_parameters(A_INITIAL_TSN)).unwrap();
    assert_eq!(z.state(), AssociationState::Established);
    expect_on_connected!(z.poll_event());

    a.on_init_ack(NOW, peer_parameters(Z_INITIAL_TSN)).unwrap();
    assert_eq!(a.state(), AssociationState::CookieEchoed);
    assert_eq!(expect_send_control!(a.poll_event()), ControlChunk::CookieEcho);

    a.on_cookie_ack(NOW).unwrap();
    assert_eq!(a.state(), AssociationState::Established);
    expect_on_connected!(a.poll_event());
    expect_no_event!(a.poll_event());

    let metrics = a.metrics().unwrap();
    assert_eq!(metrics.peer_rwnd, A_RWND as usize);
    assert_eq!(metrics.primary_path, PATH);
    assert_eq!(metrics.paths[0].cwnd, 4380);
}

#[test]
fn rejects_calls_in_wrong_state() {
    let mut a = Association::new("A", &Options::default()).unwrap();
    assert_eq!(
        a.enqueue_for_transmission(NOW, Message::new(STREAM_ID, vec![1]), &SendOptions::default()),
        Err(AssociationError::WrongState(AssociationState::Closed))
    );
    assert_eq!(
        a.on_sack_received(NOW, PATH, &SackReport::default()),
        Err(AssociationError::WrongState(AssociationState::Closed))
    );

    a.connect(NOW).unwrap();
    assert_eq!(a.connect(NOW), Err(AssociationError::WrongState(AssociationState::CookieWait)));
    assert_eq!(
        a.on_data_received(NOW, ordered_data(1, 0, 10), true),
        Err(AssociationError::WrongState(AssociationState::CookieWait))
    );
    assert_eq!(
        a.build_sack_report(),
        Err(AssociationError::WrongState(AssociationState::CookieWait))
    );
    assert_eq!(a.state(), AssociationState::CookieWait);
}

#[test]
fn rejects_unknown_path() {
    let (mut a, _z) = connect();
    assert_eq!(
        a.on_sack_received(NOW, PathId(7), &SackReport::default()),
        Err(AssociationError::PathNotFound(PathId(7)))
    );
    assert_eq!(
        a.on_heartbeat_ack(NOW, PathId(7), Duration::from_millis(10)),
        Err(AssociationError::PathNotFound(PathId(7)))
    );
    assert_eq!(
        a.on_shutdown_complete(NOW),
        Err(AssociationError::WrongState(AssociationState::Established))
    );
}

#[test]
fn sends_and_receives_messages() {
    let (mut a, mut z) = connect();
    enqueue(&mut a, 2, &SendOptions::default());

    let sent = send_all(&mut a, NOW);
    assert_eq!(sent.iter().map(|d| d.tsn).collect::<Vec<_>>(), vec![Tsn(1000), Tsn(1001)]);
    assert!(sent.iter().all(|d| d.path == PATH && !d.is_retransmission));

    let now = NOW + Duration::from_millis(10);
    for data in sent {
        assert_eq!(z.on_data_received(now, to_received(data), true), Ok(DataDisposition::New));
    }
    let first = z.poll_received_message().unwrap();
    assert_eq!(first.ssn, Some(Ssn(0)));
    assert_eq!(first.payload.len(), PAYLOAD_SIZE);
    assert_eq!(z.poll_received_message().unwrap().ssn, Some(Ssn(1)));
    assert!(z.poll_received_message().is_none());

    assert!(z.should_send_sack(now));
    let sack = z.build_sack_report().unwrap();
    assert_eq!(sack.cumulative_tsn_ack, Tsn(1001));
    assert!(sack.gap_reports.is_empty());
    assert_eq!(a.on_sack_received(now, PATH, &sack), Ok(SackDisposition::Processed));
    assert_eq!(tsns(&a.sweep_acknowledged()), vec![Tsn(1000), Tsn(1001)]);
    assert!(a.sweep_acknowledged().is_empty());

    let metrics = a.metrics().unwrap();
    assert_eq!(metrics.tx_chunks_count, 2);
    assert_eq!(metrics.rtx_chunks_count, 0);
    assert_eq!(metrics.paths[0].outstanding_bytes, 0);
    assert_eq!(z.metrics().unwrap().rx_chunks_count, 2);
}

#[test]
fn holds_back_ordered_messages_until_gap_is_filled() {
    let (_a, mut z) = connect();

    assert_eq!(z.on_data_received(NOW, ordered_data(1002, 2, 10), true), Ok(DataDisposition::New));
    assert_eq!(z.on_data_received(NOW, ordered_data(1001, 1, 10), true), Ok(DataDisposition::New));
    assert!(z.poll_received_message().is_none());

    let sack = z.build_sack_report().unwrap();
    assert_eq!(sack.cumulative_tsn_ack, Tsn(999));
    assert_eq!(sack.gap_reports, vec![GapReport::new(Tsn(1001), Tsn(1002), true)]);

    assert_eq!(z.on_data_received(NOW, ordered_data(1000, 0, 10), true), Ok(DataDisposition::New));
    let ssns: Vec<_> = std::iter::from_fn(|| z.poll_received_message()).map(|m| m.ssn).collect();
    assert_eq!(ssns, vec![Some(Ssn(0)), Some(Ssn(1)), Some(Ssn(2))]);
}

#[test]
fn reports_duplicate_tsns() {
    let (_a, mut z) = connect();

    assert_eq!(z.on_data_received(NOW, ordered_data(1000, 0, 10), true), Ok(DataDisposition::New));
    assert!(z.should_send_sack(NOW));
    z.build_sack_report().unwrap();

    assert_eq!(
        z.on_data_received(NOW, ordered_data(1000, 0, 10), true),
        Ok(DataDisposition::Duplicate)
    );
    assert!(z.should_send_sack(NOW));
    let sack = z.build_sack_report().unwrap();
    assert_eq!(sack.duplicate_tsns, vec![Tsn(1000)]);

    let metrics = z.metrics().unwrap();
    assert_eq!(metrics.rx_chunks_count, 2);
    assert_eq!(metrics.duplicate_tsns_count, 1);
}

#[test]
fn fast_retransmits_lost_chunk() {
    let (mut a, mut z) = connect();
    enqueue(&mut a, 5, &SendOptions::default());
    let sent = send_all(&mut a, NOW);
    assert_eq!(sent.len(), 5);

    let now = NOW + Duration::from_millis(10);
    for data in sent {
        if data.tsn == Tsn(1001) {
            continue;
        }
        z.on_data_received(now, to_received(data), true).unwrap();
        assert_eq!(maybe_ack(&mut z, &mut a, now), Some(SackDisposition::Processed));
    }
    assert_eq!(a.metrics().unwrap().fast_rtx_chunks_count, 1);

    let rtx = a.pop_next_deliverable(now).unwrap();
    assert_eq!(rtx.tsn, Tsn(1001));
    assert!(rtx.is_retransmission);
    assert!(a.pop_next_deliverable(now).is_none());

    z.on_data_received(now, to_received(rtx), true).unwrap();
    assert_eq!(std::iter::from_fn(|| z.poll_received_message()).count(), 5);
    let sack = z.build_sack_report().unwrap();
    assert_eq!(sack.cumulative_tsn_ack, Tsn(1004));
    assert_eq!(a.on_sack_received(now, PATH, &sack), Ok(SackDisposition::Processed));
    assert_eq!(
        tsns(&a.sweep_acknowledged()),
        vec![Tsn(1000), Tsn(1001), Tsn(1002), Tsn(1003), Tsn(1004)]
    );
    assert_eq!(a.metrics().unwrap().rtx_chunks_count, 1);
}

#[test]
fn retransmits_on_t3_expiry() {
    let (mut a, _z) = connect();
    enqueue(&mut a, 1, &SendOptions::default());
    assert_eq!(send_all(&mut a, NOW).len(), 1);
    assert_eq!(a.poll_timeout(), NOW + Duration::from_secs(3));

    let now = NOW + Duration::from_secs(3);
    a.advance_time(now);
    let rtx = a.pop_next_deliverable(now).unwrap();
    assert_eq!(rtx.tsn, Tsn(1000));
    assert!(rtx.is_retransmission);

    let metrics = a.metrics().unwrap();
    assert_eq!(metrics.t3_expiry_count, 1);
    assert_eq!(metrics.paths[0].cwnd, 1500);
    assert_eq!(metrics.paths[0].rto, Duration::from_secs(6));
    assert_eq!(a.poll_timeout(), now + Duration::from_secs(6));
    expect_no_event!(a.poll_event());
}

#[test]
fn aborts_after_too_many_retransmissions() {
    let options = Options { assoc_max_retrans: 1, ..Default::default() };
    let (mut a, _z) = connect_with_options(&options, &Options::default());
    enqueue(&mut a, 1, &SendOptions::default());
    send_all(&mut a, NOW);

    let now = a.poll_timeout();
    a.advance_time(now);
    assert!(a.pop_next_deliverable(now).unwrap().is_retransmission);
    expect_no_event!(a.poll_event());

    let now = a.poll_timeout();
    assert_eq!(now, NOW + Duration::from_secs(9));
    a.advance_time(now);
    assert_eq!(
        expect_send_control!(a.poll_event()),
        ControlChunk::Abort { reason: TOO_MANY_RETRANSMISSIONS.into() }
    );
    assert_eq!(expect_on_aborted!(a.poll_event()), ErrorKind::TooManyRetries);
    assert_eq!(a.state(), AssociationState::Closed);
    assert_eq!(a.poll_timeout(), AssocTime::infinite_future());
}

#[test]
fn sends_heartbeats_on_idle_path() {
    let (mut a, _z) = connect();
    assert_eq!(a.poll_timeout(), NOW + Duration::from_secs(33));

    let now = NOW + Duration::from_secs(33);
    a.advance_time(now);
    assert_eq!(expect_send_control!(a.poll_event()), ControlChunk::HeartbeatRequest(PATH));
    assert_eq!(a.poll_timeout(), now + Duration::from_secs(3));

    let now = now + Duration::from_millis(100);
    a.on_heartbeat_ack(now, PATH, Duration::from_millis(100)).unwrap();
    let metrics = a.metrics().unwrap();
    assert_eq!(metrics.paths[0].srtt, Duration::from_millis(100));
    assert_eq!(metrics.paths[0].rto, Duration::from_secs(1));
    expect_no_event!(a.poll_event());
}

#[test]
fn unanswered_heartbeat_counts_as_error() {
    let (mut a, _z) = connect();
    a.advance_time(NOW + Duration::from_secs(33));
    expect_send_control!(a.poll_event());

    a.advance_time(NOW + Duration::from_secs(36));
    let metrics = a.metrics().unwrap();
    assert_eq!(metrics.paths[0].error_count, 1);
    assert_eq!(metrics.paths[0].rto, Duration::from_secs(6));
    assert_eq!(a.state(), AssociationState::Established);
}

#[test]
fn retransmits_init_and_gives_up() {
    let options = Options { max_init_retransmits: 2, ..Default::default() };
    let mut a = Association::with_initial_tsn("A", &options, Tsn(A_INITIAL_TSN)).unwrap();
    a.connect(NOW).unwrap();
    expect_send_control!(a.poll_event());

    for expected_expiry in [3, 9] {
        let now = a.poll_timeout();
        assert_eq!(now, NOW + Duration::from_secs(expected_expiry));
        a.advance_time(now);
        assert!(matches!(expect_send_control!(a.poll_event()), ControlChunk::Init { .. }));
    }

    let now = a.poll_timeout();
    assert_eq!(now, NOW + Duration::from_secs(21));
    a.advance_time(now);
    assert_eq!(expect_on_aborted!(a.poll_event()), ErrorKind::TooManyRetries);
    assert_eq!(a.state(), AssociationState::Closed);
}

#[test]
fn graceful_shutdown_waits_for_outstanding_data() {
    let (mut a, mut z) = connect();
    enqueue(&mut a, 1, &SendOptions::default());
    let sent = send_all(&mut a, NOW);

    a.shutdown(NOW).unwrap();
    assert_eq!(a.state(), AssociationState::ShutdownPending);
    expect_no_event!(a.poll_event());
    assert_eq!(
        a.enqueue_for_transmission(NOW, Message::new(STREAM_ID, vec![1]), &SendOptions::default()),
        Err(AssociationError::WrongState(AssociationState::ShutdownPending))
    );

    let now = NOW + Duration::from_millis(10);
    for data in sent {
        z.on_data_received(now, to_received(data), true).unwrap();
    }
    assert_eq!(maybe_ack(&mut z, &mut a, now), Some(SackDisposition::Processed));
    assert_eq!(a.state(), AssociationState::ShutdownSent);
    assert_eq!(
        expect_send_control!(a.poll_event()),
        ControlChunk::Shutdown { cumulative_tsn_ack: Tsn(Z_INITIAL_TSN - 1) }
    );

    z.on_shutdown_received(now, Tsn(Z_INITIAL_TSN - 1)).unwrap();
    assert_eq!(z.state(), AssociationState::ShutdownAckSent);
    assert_eq!(expect_send_control!(z.poll_event()), ControlChunk::ShutdownAck);

    a.on_shutdown_ack(now).unwrap();
    assert_eq!(expect_send_control!(a.poll_event()), ControlChunk::ShutdownComplete);
    expect_on_closed!(a.poll_event());
    assert_eq!(a.state(), AssociationState::Closed);

    z.on_shutdown_complete(now).unwrap();
    expect_on_closed!(z.poll_event());
    assert_eq!(z.state(), AssociationState::Closed);
}

#[test]
fn shutdown_is_retransmitted_until_abort() {
    let options = Options { assoc_max_retrans: 1, ..Default::default() };
    let (mut a, _z) = connect_with_options(&options, &Options::default());
    a.shutdown(NOW).unwrap();
    assert_eq!(a.state(), AssociationState::ShutdownSent);
    expect_send_control!(a.poll_event());

    let now = a.poll_timeout();
    assert_eq!(now, NOW + Duration::from_secs(3));
    a.advance_time(now);
    assert!(matches!(expect_send_control!(a.poll_event()), ControlChunk::Shutdown { .. }));

    let now = a.poll_timeout();
    assert_eq!(now, NOW + Duration::from_secs(9));
    a.advance_time(now);
    assert!(matches!(expect_send_control!(a.poll_event()), ControlChunk::Abort { .. }));
    assert_eq!(expect_on_aborted!(a.poll_event()), ErrorKind::TooManyRetries);
}

#[test]
fn shutdown_while_connecting_closes() {
    let mut a = Association::new("A", &Options::default()).unwrap();
    a.connect(NOW).unwrap();
    expect_send_control!(a.poll_event());

    a.shutdown(NOW).unwrap();
    expect_on_closed!(a.poll_event());
    assert_eq!(a.state(), AssociationState::Closed);
}

#[test]
fn abort_drops_all_state() {
    let (mut a, _z) = connect();
    enqueue(&mut a, 3, &SendOptions::default());
    send_all(&mut a, NOW);

    a.abort("bye");
    assert_eq!(
        expect_send_control!(a.poll_event()),
        ControlChunk::Abort { reason: "bye".into() }
    );
    assert_eq!(expect_on_aborted!(a.poll_event()), ErrorKind::UserInitiated);
    assert_eq!(a.state(), AssociationState::Closed);
    assert!(a.metrics().is_none());
    assert!(a.pop_next_deliverable(NOW).is_none());
    assert_eq!(a.poll_timeout(), AssocTime::infinite_future());

    a.abort("again");
    expect_no_event!(a.poll_event());
}

#[test]
fn reset_allows_reconnecting() {
    let (mut a, _z) = connect();
    enqueue(&mut a, 1, &SendOptions::default());

    assert!(a.send_queue.buffered_amount() > 0);

    a.reset();
    expect_on_closed!(a.poll_event());
    assert_eq!(a.state(), AssociationState::Closed);
    assert_eq!(a.send_queue.buffered_amount(), 0);

    a.connect(NOW).unwrap();
    assert_eq!(a.state(), AssociationState::CookieWait);
}

#[test]
fn reneges_revokable_data_under_buffer_pressure() {
    let options_z = Options { receive_buffer_size: 4000, ..Default::default() };
    let (_a, mut z) = connect_with_options(&Options::default(), &options_z);

    for (tsn, ssn) in [(1002, 2), (1003, 3), (1004, 4), (1005, 5)] {
        assert_eq!(
            z.on_data_received(NOW, ordered_data(tsn, ssn, 1000), true),
            Ok(DataDisposition::New)
        );
    }
    // The buffer is full, and new data beyond the highest TSN doesn't fit.
    assert_eq!(
        z.on_data_received(NOW, ordered_data(1006, 6, 1000), true),
        Ok(DataDisposition::Dropped)
    );

    // Data filling the gap evicts the highest revokable TSN.
    assert_eq!(
        z.on_data_received(NOW, ordered_data(1000, 0, 1000), true),
        Ok(DataDisposition::New)
    );
    let sack = z.build_sack_report().unwrap();
    assert_eq!(sack.cumulative_tsn_ack, Tsn(1000));
    assert_eq!(sack.gap_reports, vec![GapReport::new(Tsn(1002), Tsn(1004), true)]);
    assert_eq!(sack.a_rwnd, 0);

    assert_eq!(z.poll_received_message().unwrap().ssn, Some(Ssn(0)));
    assert!(z.poll_received_message().is_none());
}

#[test]
fn drops_data_instead_of_reneging_when_disabled() {
    let options_z =
        Options { receive_buffer_size: 4000, disable_reneging: true, ..Default::default() };
    let (_a, mut z) = connect_with_options(&Options::default(), &options_z);

    for (tsn, ssn) in [(1002, 2), (1003, 3), (1004, 4), (1005, 5)] {
        z.on_data_received(NOW, ordered_data(tsn, ssn, 1000), true).unwrap();
    }
    assert_eq!(
        z.on_data_received(NOW, ordered_data(1000, 0, 1000), true),
        Ok(DataDisposition::Dropped)
    );
    let sack = z.build_sack_report().unwrap();
    assert_eq!(sack.cumulative_tsn_ack, Tsn(999));
    assert_eq!(sack.gap_reports, vec![GapReport::new(Tsn(1002), Tsn(1005), true)]);
}

#[test]
fn delivered_data_becomes_non_revokable() {
    let options_z = Options { nr_sack: true, ..Default::default() };
    let (_a, mut z) = connect_with_options(&Options::default(), &options_z);

    z.on_data_received(NOW, unordered_data(1001, 10), true).unwrap();
    z.on_data_received(NOW, ordered_data(1003, 3, 10), true).unwrap();
    let sack = z.build_sack_report().unwrap();
    assert_eq!(
        sack.gap_reports,
        vec![
            GapReport::new(Tsn(1001), Tsn(1001), true),
            GapReport::new(Tsn(1003), Tsn(1003), true)
        ]
    );

    assert_eq!(z.poll_received_message().unwrap().ssn, None);
    let sack = z.build_sack_report().unwrap();
    assert_eq!(
        sack.gap_reports,
        vec![
            GapReport::new(Tsn(1003), Tsn(1003), true),
            GapReport::new(Tsn(1001), Tsn(1001), false)
        ]
    );
}

#[test]
fn nr_sack_chunk_releases_non_revokable_data() {
    let options_z = Options { nr_sack: true, ..Default::default() };
    let (mut a, mut z) = connect_with_options(&Options::default(), &options_z);
    enqueue(&mut a, 5, &SendOptions::default());
    let sent = send_all(&mut a, NOW);

    let now = NOW + Duration::from_millis(10);
    for data in sent {
        match data.tsn.0 {
            1000 | 1002 => z.on_data_received(now, to_received(data), true).unwrap(),
            1004 => z.on_data_received(now, to_received(data), false).unwrap(),
            _ => continue,
        };
    }

    let chunk = z.build_sack_chunk().unwrap();
    assert_eq!(chunk[0], nr_sack_chunk::CHUNK_TYPE);
    assert_eq!(a.handle_sack_chunk(now, PATH, &chunk), Ok(SackDisposition::Processed));
    assert_eq!(tsns(&a.sweep_acknowledged()), vec![Tsn(1000), Tsn(1004)]);
}

#[test]
fn handles_serialized_sack_chunk() {
    let (mut a, mut z) = connect();
    enqueue(&mut a, 2, &SendOptions::default());
    for data in send_all(&mut a, NOW) {
        z.on_data_received(NOW, to_received(data), true).unwrap();
    }

    let chunk = z.build_sack_chunk().unwrap();
    assert_eq!(chunk[0], sack_chunk::CHUNK_TYPE);
    assert_eq!(a.handle_sack_chunk(NOW, PATH, &chunk), Ok(SackDisposition::Processed));
    assert_eq!(tsns(&a.sweep_acknowledged()), vec![Tsn(1000), Tsn(1001)]);

    assert!(matches!(
        a.handle_sack_chunk(NOW, PATH, &[0xff, 0, 0, 4]),
        Err(AssociationError::ParseFailed(_))
    ));
}

#[test]
fn reports_gap_list_overflow() {
    let (_a, mut z) = connect();

    for i in 0..500 {
        z.on_data_received(NOW, unordered_data(1001 + 2 * i, 1), true).unwrap();
    }
    drain_events(&mut z);

    assert_eq!(
        z.on_data_received(NOW, unordered_data(1001 + 2 * 500, 1), true),
        Ok(DataDisposition::Dropped)
    );
    assert_eq!(expect_on_gap_list_overflow!(z.poll_event()), 1);
    assert!(z.should_send_sack(NOW));
    assert_eq!(z.metrics().unwrap().gap_list_overflows, 1);

    // Filling the first gap frees room for a new one.
    z.on_data_received(NOW, unordered_data(1000, 1), true).unwrap();
    z.on_data_received(NOW, unordered_data(1001 + 2 * 500, 1), true).unwrap();
    expect_no_event!(z.poll_event());
}

#[test]
fn abandons_expired_message_and_forwards_tsn() {
    let (mut a, mut z) = connect();
    let send_options =
        SendOptions { lifetime: Some(Duration::from_millis(100)), ..Default::default() };
    enqueue(&mut a, 1, &send_options);
    let lost = send_all(&mut a, NOW);
    assert_eq!(lost.len(), 1);

    let now = NOW + Duration::from_secs(3);
    a.advance_time(now);
    assert_eq!(expect_on_message_abandoned!(a.poll_event()), (STREAM_ID, Tsn(1000)));
    assert_eq!(expect_forward_tsn_needed!(a.poll_event()), Tsn(1000));
    assert!(a.pop_next_deliverable(now).is_none());

    let chunk = a.create_forward_tsn_chunk().unwrap();
    z.handle_forward_tsn_chunk(now, &chunk).unwrap();
    let sack = z.build_sack_report().unwrap();
    assert_eq!(sack.cumulative_tsn_ack, Tsn(1000));
    a.on_sack_received(now, PATH, &sack).unwrap();
    assert!(a.sweep_acknowledged().is_empty());

    // The next message on the stream is delivered, as the receiver skipped the abandoned one.
    let message = Message::new(STREAM_ID, vec![1, 2, 3]);
    a.enqueue_for_transmission(now, message, &SendOptions::default()).unwrap();
    let data = a.pop_next_deliverable(now).unwrap();
    assert_eq!(data.tsn, Tsn(1001));
    assert_eq!(data.ssn, Some(Ssn(1)));
    z.on_data_received(now, to_received(data), true).unwrap();
    let message = z.poll_received_message().unwrap();
    assert_eq!(message.ssn, Some(Ssn(1)));
    assert_eq!(message.payload, vec![1, 2, 3]);
}

#[test]
fn ignores_stale_forward_tsn() {
    let (_a, mut z) = connect();
    z.on_data_received(NOW, ordered_data(1000, 0, 10), true).unwrap();
    z.build_sack_report().unwrap();

    let forward_tsn = ForwardTsn { new_cumulative_tsn: Tsn(999), skipped_streams: vec![] };
    z.on_forward_tsn(NOW, &forward_tsn).unwrap();
    assert!(z.should_send_sack(NOW));
    assert_eq!(z.build_sack_report().unwrap().cumulative_tsn_ack, Tsn(1000));
}
