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
use crate::api::AssociationError;
use crate::api::AssociationEvent;
use crate::api::AssociationState;
use crate::api::ControlChunk;
use crate::api::DataDisposition;
use crate::api::ErrorKind;
use crate::api::ForwardTsn;
use crate::api::Message;
use crate::api::Metrics;
use crate::api::Options;
use crate::api::OutboundData;
use crate::api::PathId;
use crate::api::PeerParameters;
use crate::api::ReceivedData;
use crate::api::ReceivedMessage;
use crate::api::SackDisposition;
use crate::api::SackReport;
use crate::api::SctpAssociation;
use crate::api::SendOptions;
use crate::association::state::CookieEchoState;
use crate::association::state::CookieWaitState;
use crate::association::state::ShutdownTimerState;
use crate::association::state::State;
use crate::association::transmission_control_block::TransmissionControlBlock;
use crate::events::Events;
use crate::packet::SerializableTlv;
use crate::packet::chunk::Chunk;
use crate::packet::forward_tsn_chunk::ForwardTsnChunk;
use crate::packet::nr_sack_chunk::NrSackChunk;
use crate::packet::sack_chunk::SackChunk;
use crate::timer::Timer;
use crate::transition_between;
use crate::tx::retransmission_queue::PathTimer;
use crate::tx::send_queue::SendQueue;
use crate::types::Tsn;
#[cfg(not(test))]
use log::info;
#[cfg(not(test))]
use log::warn;
use rand::Rng;
use std::cell::RefCell;
use std::cmp::min;
#[cfg(test)]
use std::println as info;
#[cfg(test)]
use std::println as warn;
use std::rc::Rc;
use std::time::Duration;

pub mod state;
pub mod transmission_control_block;

#[cfg(test)]
mod association_tests;

const MIN_INITIAL_TSN: u32 = u32::MIN;
const MAX_INITIAL_TSN: u32 = u32::MAX;

const TOO_MANY_RETRANSMISSIONS: &str = "Too many retransmissions";

struct LoggingEvents {
    parent: Rc<RefCell<dyn EventSink>>,
    name: String,
}

impl LoggingEvents {
    pub fn new(parent: Rc<RefCell<dyn EventSink>>, name: String) -> LoggingEvents {
        Self { parent, name }
    }
}

impl EventSink for LoggingEvents {
    fn add(&mut self, event: AssociationEvent) {
        let name = &self.name;
        match event {
            AssociationEvent::SendControl(ref chunk) => {
                info!("[{}] SendControl: {:?}", name, chunk);
            }
            AssociationEvent::OnConnected() => info!("[{}] OnConnected", name),
            AssociationEvent::OnClosed() => info!("[{}] OnClosed()", name),
            AssociationEvent::OnAborted(ref error, ref reason) => {
                info!("[{}] OnAborted({:?}, {})", name, error, reason);
            }
            AssociationEvent::OnPathStatusChanged { path, active } => {
                info!("[{}] OnPathStatusChanged({}, active={})", name, path, active);
            }
            AssociationEvent::OnPrimaryPathChanged(path) => {
                info!("[{}] OnPrimaryPathChanged({})", name, path);
            }
            AssociationEvent::OnMessageAbandoned { stream_id, tsn } => {
                info!("[{}] OnMessageAbandoned({:?}, tsn={})", name, stream_id, tsn);
            }
            AssociationEvent::ForwardTsnNeeded(tsn) => {
                info!("[{}] ForwardTsnNeeded({})", name, tsn);
            }
            AssociationEvent::OnGapListOverflow { overflows } => {
                warn!("[{}] OnGapListOverflow(overflows={})", name, overflows);
            }
        }
        self.parent.borrow_mut().add(event);
    }

    fn next_event(&mut self) -> Option<AssociationEvent> {
        self.parent.borrow_mut().next_event()
    }
}

fn closest_timeout(a: Option<AssocTime>, b: Option<AssocTime>) -> Option<AssocTime> {
    match (a, b) {
        (None, None) => None,
        (None, Some(_)) => b,
        (Some(_), None) => a,
        (Some(t1), Some(t2)) => Some(min(t1, t2)),
    }
}

/// Doubles the timer's duration, bounded by `max`, and restarts it.
fn backoff_and_restart(timer: &mut Timer, max: Duration, now: AssocTime) {
    timer.set_duration(min(timer.duration() * 2, max));
    timer.start(now);
}

/// An SCTP association.
///
/// The association is a synchronous state machine: it never reads a clock, spawns threads or does
/// I/O. The caller feeds it inbound chunks and the current time, sends the DATA chunks returned by
/// [`SctpAssociation::pop_next_deliverable`], and drains generated events with
/// [`SctpAssociation::poll_event`].
///
/// To create an association, use the [`Association::new`] method.
pub struct Association {
    name: String,
    now: AssocTime,
    options: Options,
    events: Rc<RefCell<dyn EventSink>>,
    state: State,
    send_queue: SendQueue,
    fixed_initial_tsn: Option<Tsn>,
}

impl Association {
    /// Creates a new `Association`.
    ///
    /// The provided `name` is only used for logging to identify this association.
    pub fn new(name: &str, options: &Options) -> Result<Self, AssociationError> {
        options.validate()?;
        let events: Rc<RefCell<Events>> = Rc::new(RefCell::new(Events::new()));
        let events: Rc<RefCell<dyn EventSink>> =
            Rc::new(RefCell::new(LoggingEvents::new(events, name.into())));
        Ok(Association {
            name: name.into(),
            now: AssocTime::zero(),
            options: options.clone(),
            events,
            state: State::Closed,
            send_queue: SendQueue::new(options),
            fixed_initial_tsn: None,
        })
    }

    /// Like [`Association::new`], but uses `initial_tsn` instead of a random initial TSN.
    pub fn with_initial_tsn(
        name: &str,
        options: &Options,
        initial_tsn: Tsn,
    ) -> Result<Self, AssociationError> {
        let mut association = Self::new(name, options)?;
        association.fixed_initial_tsn = Some(initial_tsn);
        Ok(association)
    }

    fn observe_time(&mut self, now: AssocTime) {
        if now > self.now {
            self.now = now;
        }
    }

    fn choose_initial_tsn(&self) -> Tsn {
        self.fixed_initial_tsn
            .unwrap_or_else(|| Tsn(rand::rng().random_range(MIN_INITIAL_TSN..MAX_INITIAL_TSN)))
    }

    fn new_tcb(&self, my_initial_tsn: Tsn, peer: &PeerParameters) -> TransmissionControlBlock {
        TransmissionControlBlock::new(&self.options, my_initial_tsn, peer, Rc::clone(&self.events))
    }

    fn send_control(&self, chunk: ControlChunk) {
        self.events.borrow_mut().add(AssociationEvent::SendControl(chunk));
    }

    fn data_tcb_mut(&mut self) -> Result<&mut TransmissionControlBlock, AssociationError> {
        let state = self.state();
        self.state.data_tcb_mut().ok_or(AssociationError::WrongState(state))
    }

    fn ensure_known_path(&self, path: PathId) -> Result<(), AssociationError> {
        match self.state.data_tcb() {
            None => Err(AssociationError::WrongState(self.state())),
            Some(tcb) if !tcb.retransmission_queue.has_path(path) => {
                Err(AssociationError::PathNotFound(path))
            }
            Some(_) => Ok(()),
        }
    }

    /// Drops all association state, which stops every timer, and reports the reason.
    fn internal_close(&mut self, error: ErrorKind, message: String) {
        if matches!(self.state, State::Closed) {
            return;
        }
        if let Some(tcb) = self.state.tcb_mut() {
            tcb.retransmission_queue.stop_timers();
            tcb.receive_buffer.clear();
        }
        self.send_queue.reset();
        self.state = State::Closed;
        if error == ErrorKind::NoError {
            info!("[{}] Association closed", self.name);
            self.events.borrow_mut().add(AssociationEvent::OnClosed());
        } else {
            warn!("[{}] Association aborted: {:?}, {}", self.name, error, message);
            self.events.borrow_mut().add(AssociationEvent::OnAborted(error, message));
        }
    }

    fn abort_after_too_many_retransmissions(&mut self) {
        self.send_control(ControlChunk::Abort { reason: TOO_MANY_RETRANSMISSIONS.into() });
        self.internal_close(ErrorKind::TooManyRetries, TOO_MANY_RETRANSMISSIONS.into());
    }

    fn send_init(&self, initial_tsn: Tsn) {
        self.send_control(ControlChunk::Init {
            initial_tsn,
            a_rwnd: u32::try_from(self.options.receive_buffer_size).unwrap_or(u32::MAX),
        });
    }

    fn establish(&mut self, now: AssocTime) {
        if let Some(tcb) = self.state.tcb_mut() {
            tcb.retransmission_queue.start_heartbeats(now);
        }
        info!("[{}] Association established", self.name);
        self.events.borrow_mut().add(AssociationEvent::OnConnected());
    }

    fn handle_t1_init_timeout(&mut self, now: AssocTime) {
        let State::CookieWait(s) = &mut self.state else { unreachable!() };
        if !s.t1_init.expire(now) {
            return;
        }
        if s.retransmits >= self.options.max_init_retransmits {
            self.internal_close(ErrorKind::TooManyRetries, "No INIT-ACK received".into());
            return;
        }
        s.retransmits += 1;
        backoff_and_restart(&mut s.t1_init, self.options.rto_max, now);
        let initial_tsn = s.initial_tsn;
        self.send_init(initial_tsn);
    }

    fn handle_t1_cookie_timeout(&mut self, now: AssocTime) {
        let State::CookieEchoed(s) = &mut self.state else { unreachable!() };
        if !s.t1_cookie.expire(now) {
            return;
        }
        if s.retransmits >= self.options.max_init_retransmits {
            self.internal_close(ErrorKind::TooManyRetries, "No COOKIE-ACK received".into());
            return;
        }
        s.retransmits += 1;
        backoff_and_restart(&mut s.t1_cookie, self.options.rto_max, now);
        self.send_control(ControlChunk::CookieEcho);
    }

    fn handle_t2_shutdown_timeout(&mut self, now: AssocTime) {
        let (State::ShutdownSent(s) | State::ShutdownAckSent(s)) = &mut self.state else {
            return;
        };
        if !s.t2_shutdown.expire(now) {
            return;
        }
        if s.retransmits >= self.options.assoc_max_retrans {
            self.abort_after_too_many_retransmissions();
            return;
        }
        s.retransmits += 1;
        backoff_and_restart(&mut s.t2_shutdown, self.options.rto_max, now);
        match &self.state {
            State::ShutdownSent(_) => self.send_shutdown(),
            _ => self.send_control(ControlChunk::ShutdownAck),
        }
    }

    /// Dispatches expired T3-rtx and heartbeat timers. Returns false if the association was
    /// aborted.
    fn handle_path_timeouts(&mut self, now: AssocTime) -> bool {
        let Some(tcb) = self.state.data_tcb_mut() else {
            return false;
        };
        for (path, timer) in tcb.retransmission_queue.expired_timers(now) {
            let abort = match timer {
                PathTimer::T3Rtx => tcb.retransmission_queue.on_retransmission_timeout(now, path),
                PathTimer::Heartbeat => {
                    tcb.retransmission_queue.send_heartbeat(now, path);
                    false
                }
                PathTimer::HeartbeatAck => tcb.retransmission_queue.on_heartbeat_timeout(now, path),
            };
            if abort {
                self.abort_after_too_many_retransmissions();
                return false;
            }
        }
        tcb.sync_rto();
        true
    }

    fn send_shutdown(&self) {
        if let Some(tcb) = self.state.tcb() {
            self.send_control(ControlChunk::Shutdown {
                cumulative_tsn_ack: tcb.data_tracker.last_cumulative_acked_tsn(),
            });
        }
    }

    fn maybe_send_shutdown(&mut self, now: AssocTime) {
        let State::ShutdownPending(tcb) = &self.state else { unreachable!() };
        if !tcb.retransmission_queue.is_drained() || !self.send_queue.is_empty() {
            // Not ready to shutdown yet.
            return;
        }

        // From <https://datatracker.ietf.org/doc/html/rfc9260.html#section-9.2-3>:
        //
        //   Once all its outstanding data has been acknowledged, the endpoint sends a SHUTDOWN
        //   chunk to its peer, including in the Cumulative TSN Ack field the last sequential TSN it
        //   has received from the peer. It SHOULD then start the T2-shutdown timer and enter the
        //   SHUTDOWN-SENT state.
        let mut t2_shutdown = Timer::new(self.options.t2_shutdown_timeout);
        t2_shutdown.start(now);

        transition_between!(self.state,
            State::ShutdownPending(tcb) =>
                State::ShutdownSent(ShutdownTimerState { t2_shutdown, retransmits: 0, tcb })
        );
        info!("[{}] Entering SHUTDOWN-SENT", self.name);

        self.send_shutdown();
    }

    fn maybe_send_shutdown_ack(&mut self, now: AssocTime) {
        let State::ShutdownReceived(tcb) = &self.state else { unreachable!() };
        if !tcb.retransmission_queue.is_drained() || !self.send_queue.is_empty() {
            // Not ready to shutdown yet.
            return;
        }

        // From <https://datatracker.ietf.org/doc/html/rfc9260#section-9.2-12>:
        //
        //   If the receiver of the SHUTDOWN chunk has no more outstanding DATA chunks, the SHUTDOWN
        //   chunk receiver MUST send a SHUTDOWN ACK chunk and start a T2-shutdown timer of its own,
        //   entering the SHUTDOWN-ACK-SENT state. If the timer expires, the endpoint MUST resend
        //   the SHUTDOWN ACK chunk [...]
        let mut t2_shutdown = Timer::new(self.options.t2_shutdown_timeout);
        t2_shutdown.start(now);

        transition_between!(self.state,
            State::ShutdownReceived(tcb) =>
                State::ShutdownAckSent(ShutdownTimerState { t2_shutdown, retransmits: 0, tcb })
        );
        info!("[{}] Entering SHUTDOWN-ACK-SENT", self.name);

        self.send_control(ControlChunk::ShutdownAck);
    }

    /// Moves a pending shutdown forward when the last outstanding data was acknowledged.
    fn maybe_progress_shutdown(&mut self, now: AssocTime) {
        match self.state {
            State::ShutdownPending(_) => self.maybe_send_shutdown(now),
            State::ShutdownReceived(_) => self.maybe_send_shutdown_ack(now),
            _ => {}
        }
    }
}

impl SctpAssociation for Association {
    fn poll_event(&mut self) -> Option<AssociationEvent> {
        self.events.borrow_mut().next_event()
    }

    fn state(&self) -> AssociationState {
        match self.state {
            State::Closed => AssociationState::Closed,
            State::CookieWait(_) => AssociationState::CookieWait,
            State::CookieEchoed(_) => AssociationState::CookieEchoed,
            State::Established(_) => AssociationState::Established,
            State::ShutdownPending(_) => AssociationState::ShutdownPending,
            State::ShutdownSent(_) => AssociationState::ShutdownSent,
            State::ShutdownReceived(_) => AssociationState::ShutdownReceived,
            State::ShutdownAckSent(_) => AssociationState::ShutdownAckSent,
        }
    }

    fn options(&self) -> &Options {
        &self.options
    }

    fn connect(&mut self, now: AssocTime) -> Result<(), AssociationError> {
        self.observe_time(now);
        if !matches!(self.state, State::Closed) {
            warn!("[{}] Called connect on a association that is not closed", self.name);
            return Err(AssociationError::WrongState(self.state()));
        }

        let initial_tsn = self.choose_initial_tsn();
        let mut t1_init = Timer::new(self.options.rto_initial);
        t1_init.start(now);
        self.state = State::CookieWait(CookieWaitState { t1_init, initial_tsn, retransmits: 0 });
        self.send_init(initial_tsn);
        Ok(())
    }

    fn on_init_ack(
        &mut self,
        now: AssocTime,
        peer: PeerParameters,
    ) -> Result<(), AssociationError> {
        self.observe_time(now);
        let State::CookieWait(CookieWaitState { initial_tsn, .. }) = self.state else {
            return Err(AssociationError::WrongState(self.state()));
        };

        let tcb = self.new_tcb(initial_tsn, &peer);
        let mut t1_cookie = Timer::new(self.options.rto_initial);
        t1_cookie.start(now);
        self.state = State::CookieEchoed(CookieEchoState { t1_cookie, retransmits: 0, tcb });
        self.send_control(ControlChunk::CookieEcho);
        Ok(())
    }

    fn on_cookie_ack(&mut self, now: AssocTime) -> Result<(), AssociationError> {
        self.observe_time(now);
        if !matches!(self.state, State::CookieEchoed(_)) {
            return Err(AssociationError::WrongState(self.state()));
        }

        transition_between!(self.state,
            State::CookieEchoed(CookieEchoState { tcb, .. }) => State::Established(tcb)
        );
        self.establish(now);
        Ok(())
    }

    fn accept(&mut self, now: AssocTime, peer: PeerParameters) -> Result<(), AssociationError> {
        self.observe_time(now);
        if !matches!(self.state, State::Closed) {
            return Err(AssociationError::WrongState(self.state()));
        }

        let tcb = self.new_tcb(self.choose_initial_tsn(), &peer);
        self.state = State::Established(tcb);
        self.establish(now);
        Ok(())
    }

    fn shutdown(&mut self, now: AssocTime) -> Result<(), AssociationError> {
        self.observe_time(now);

        // From <https://datatracker.ietf.org/doc/html/rfc9260#section-9.2-2>:
        //
        //   Upon receipt of the SHUTDOWN primitive from its upper layer, the endpoint enters the
        //   SHUTDOWN-PENDING state and remains there until all outstanding data has been
        //   acknowledged by its peer.
        match self.state {
            State::Closed => return Err(AssociationError::WrongState(AssociationState::Closed)),
            State::ShutdownPending(_)
            | State::ShutdownSent(_)
            | State::ShutdownAckSent(_)
            | State::ShutdownReceived(_) => {
                // Already shutting down.
            }
            State::CookieWait(_) => {
                // There is no outstanding data during the initial connection phase, so the
                // association can just be closed.
                self.internal_close(ErrorKind::NoError, String::new());
            }
            State::CookieEchoed(_) | State::Established(_) => {
                transition_between!(self.state,
                    State::CookieEchoed(CookieEchoState { tcb, .. }) | State::Established(tcb) =>
                        State::ShutdownPending(tcb)
                );
                info!("[{}] Entering SHUTDOWN-PENDING", self.name);

                self.maybe_send_shutdown(now);
            }
        }
        Ok(())
    }

    fn on_shutdown_received(
        &mut self,
        now: AssocTime,
        cumulative_tsn_ack: Tsn,
    ) -> Result<(), AssociationError> {
        self.observe_time(now);
        match self.state {
            State::Closed | State::CookieWait(_) | State::CookieEchoed(_) => {
                // From <https://datatracker.ietf.org/doc/html/rfc9260#section-9.2-21>:
                //
                //   If a SHUTDOWN chunk is received in the COOKIE-WAIT or COOKIE ECHOED state, the
                //   SHUTDOWN chunk SHOULD be silently discarded.
                Err(AssociationError::WrongState(self.state()))
            }
            State::ShutdownReceived(_) | State::ShutdownAckSent(_) => Ok(()),
            State::Established(_) | State::ShutdownPending(_) => {
                // From <https://datatracker.ietf.org/doc/html/rfc9260#section-9.2-6>:
                //
                //   Upon reception of the SHUTDOWN chunk, the peer endpoint does the following:
                //   enter the SHUTDOWN-RECEIVED state, stop accepting new data from its SCTP user,
                //   and verify, by checking the Cumulative TSN Ack field of the chunk, that all its
                //   outstanding DATA chunks have been received by the SHUTDOWN chunk sender.
                transition_between!(self.state,
                    State::Established(tcb) | State::ShutdownPending(tcb) =>
                        State::ShutdownReceived(tcb)
                );
                info!("[{}] Entering SHUTDOWN-RECEIVED", self.name);

                if let Some(tcb) = self.state.tcb_mut() {
                    let rq = &mut tcb.retransmission_queue;
                    if cumulative_tsn_ack > rq.last_cumulative_tsn_ack() {
                        // Handled as a SACK without gaps that leaves the peer's window as is.
                        let a_rwnd = rq.peer_rwnd() + rq.outstanding_bytes();
                        let sack = SackReport {
                            cumulative_tsn_ack,
                            a_rwnd: u32::try_from(a_rwnd).unwrap_or(u32::MAX),
                            ..Default::default()
                        };
                        let primary = rq.primary_path();
                        rq.handle_sack(now, primary, &sack);
                    }
                }
                self.maybe_send_shutdown_ack(now);
                Ok(())
            }
            State::ShutdownSent(_) => {
                // From <https://datatracker.ietf.org/doc/html/rfc9260#section-9.2-22>:
                //
                //   If an endpoint is in the SHUTDOWN-SENT state and receives a SHUTDOWN chunk from
                //   its peer, the endpoint SHOULD respond immediately with a SHUTDOWN ACK chunk to
                //   its peer and move into the SHUTDOWN-ACK-SENT state, restarting its T2-shutdown
                //   timer.
                transition_between!(self.state,
                    State::ShutdownSent(mut s) => {
                        s.t2_shutdown.start(now);
                        State::ShutdownAckSent(s)
                    }
                );
                info!("[{}] Entering SHUTDOWN-ACK-SENT", self.name);

                self.send_control(ControlChunk::ShutdownAck);
                Ok(())
            }
        }
    }

    fn on_shutdown_ack(&mut self, now: AssocTime) -> Result<(), AssociationError> {
        self.observe_time(now);
        if !matches!(self.state, State::ShutdownSent(_) | State::ShutdownAckSent(_)) {
            return Err(AssociationError::WrongState(self.state()));
        }

        // From <https://datatracker.ietf.org/doc/html/rfc9260#section-9.2-14>:
        //
        //   Upon the receipt of the SHUTDOWN ACK chunk, the sender of the SHUTDOWN chunk
        //   MUST stop the T2-shutdown timer, send a SHUTDOWN COMPLETE chunk to its peer,
        //   and remove all record of the association.
        self.send_control(ControlChunk::ShutdownComplete);
        self.internal_close(ErrorKind::NoError, String::new());
        Ok(())
    }

    fn on_shutdown_complete(&mut self, now: AssocTime) -> Result<(), AssociationError> {
        self.observe_time(now);
        if !matches!(self.state, State::ShutdownAckSent(_)) {
            return Err(AssociationError::WrongState(self.state()));
        }

        // From <https://datatracker.ietf.org/doc/html/rfc9260#section-9.2-15>:
        //
        //   If the endpoint is in the SHUTDOWN-ACK-SENT state, the endpoint SHOULD stop the
        //   T2-shutdown timer and remove all knowledge of the association (and thus the
        //   association enters the CLOSED state).
        self.internal_close(ErrorKind::NoError, String::new());
        Ok(())
    }

    fn abort(&mut self, reason: &str) {
        if matches!(self.state, State::Closed) {
            return;
        }
        if self.state.tcb().is_some() {
            self.send_control(ControlChunk::Abort { reason: reason.into() });
        }
        self.internal_close(ErrorKind::UserInitiated, reason.into());
    }

    fn reset(&mut self) {
        self.internal_close(ErrorKind::NoError, String::new());
    }

    fn on_data_received(
        &mut self,
        now: AssocTime,
        data: ReceivedData,
        revokable: bool,
    ) -> Result<DataDisposition, AssociationError> {
        self.observe_time(now);
        let tcb = self.data_tcb_mut()?;

        let disposition = tcb.receive_data(now, data, revokable);
        // Each DATA chunk is handled as a packet of its own.
        tcb.data_tracker.observe_packet_end(now);
        let overflows = tcb.data_tracker.take_overflows();

        if let Some(overflows) = overflows {
            self.events.borrow_mut().add(AssociationEvent::OnGapListOverflow { overflows });
        }

        if let State::ShutdownSent(s) = &mut self.state {
            // From <https://datatracker.ietf.org/doc/html/rfc9260#section-9.2-10>:
            //
            //   While in the SHUTDOWN-SENT state, the SHUTDOWN chunk sender MUST immediately
            //   respond to each received packet containing one or more DATA chunks with a
            //   SHUTDOWN chunk and restart the T2-shutdown timer.
            s.t2_shutdown.start(now);
            self.send_shutdown();
        }
        Ok(disposition)
    }

    fn on_sack_received(
        &mut self,
        now: AssocTime,
        path: PathId,
        sack: &SackReport,
    ) -> Result<SackDisposition, AssociationError> {
        self.observe_time(now);
        self.ensure_known_path(path)?;
        let tcb = self.data_tcb_mut()?;
        let disposition = tcb.retransmission_queue.handle_sack(now, path, sack);
        tcb.sync_rto();

        if disposition == SackDisposition::Processed {
            self.maybe_progress_shutdown(now);
        }
        Ok(disposition)
    }

    fn on_forward_tsn(
        &mut self,
        now: AssocTime,
        forward_tsn: &ForwardTsn,
    ) -> Result<(), AssociationError> {
        self.observe_time(now);
        let name = self.name.clone();
        let tcb = self.data_tcb_mut()?;
        if !tcb.partial_reliability {
            warn!("[{}] Received a FORWARD-TSN without partial reliability negotiated", name);
        }
        tcb.handle_forward_tsn(now, forward_tsn);
        tcb.data_tracker.observe_packet_end(now);
        Ok(())
    }

    fn should_send_sack(&mut self, now: AssocTime) -> bool {
        self.observe_time(now);
        match self.state.data_tcb_mut() {
            Some(tcb) => tcb.data_tracker.should_send_ack(now, false),
            None => false,
        }
    }

    fn build_sack_report(&mut self) -> Result<SackReport, AssociationError> {
        Ok(self.data_tcb_mut()?.create_sack())
    }

    fn build_sack_chunk(&mut self) -> Result<Vec<u8>, AssociationError> {
        let report = self.build_sack_report()?;
        Ok(if self.options.nr_sack {
            NrSackChunk::from_report(&report).to_vec()
        } else {
            SackChunk::from_report(&report).to_vec()
        })
    }

    fn handle_sack_chunk(
        &mut self,
        now: AssocTime,
        path: PathId,
        bytes: &[u8],
    ) -> Result<SackDisposition, AssociationError> {
        let parse_failed = |e: crate::packet::ChunkParseError| {
            AssociationError::ParseFailed(e.to_string())
        };
        let report = match Chunk::from_bytes(bytes).map_err(parse_failed)? {
            Chunk::Sack(sack) => sack.to_report().map_err(parse_failed)?,
            Chunk::NrSack(sack) => sack.to_report().map_err(parse_failed)?,
            Chunk::ForwardTsn(_) => {
                return Err(AssociationError::ParseFailed("not a SACK chunk".into()));
            }
        };
        self.on_sack_received(now, path, &report)
    }

    fn enqueue_for_transmission(
        &mut self,
        now: AssocTime,
        message: Message,
        send_options: &SendOptions,
    ) -> Result<(), AssociationError> {
        self.observe_time(now);
        if !matches!(self.state, State::Established(_)) {
            return Err(AssociationError::WrongState(self.state()));
        }
        self.send_queue.add(now, message, send_options)
    }

    fn pop_next_deliverable(&mut self, now: AssocTime) -> Option<OutboundData> {
        self.observe_time(now);
        let tcb = self.state.data_tcb_mut()?;
        tcb.retransmission_queue.next_to_send(now, &mut self.send_queue)
    }

    fn sweep_acknowledged(&mut self) -> Vec<AcknowledgedChunk> {
        match self.state.tcb_mut() {
            Some(tcb) => tcb.retransmission_queue.sweep(),
            None => vec![],
        }
    }

    fn poll_received_message(&mut self) -> Option<ReceivedMessage> {
        self.state.data_tcb_mut()?.poll_received_message()
    }

    fn create_forward_tsn(&mut self) -> Option<ForwardTsn> {
        self.state.data_tcb_mut()?.retransmission_queue.create_forward_tsn()
    }

    fn create_forward_tsn_chunk(&mut self) -> Option<Vec<u8>> {
        self.create_forward_tsn().map(|forward_tsn| ForwardTsnChunk::from(&forward_tsn).to_vec())
    }

    fn handle_forward_tsn_chunk(
        &mut self,
        now: AssocTime,
        bytes: &[u8],
    ) -> Result<(), AssociationError> {
        let forward_tsn = match Chunk::from_bytes(bytes) {
            Ok(Chunk::ForwardTsn(chunk)) => ForwardTsn::from(chunk),
            Ok(_) => return Err(AssociationError::ParseFailed("not a FORWARD-TSN chunk".into())),
            Err(e) => return Err(AssociationError::ParseFailed(e.to_string())),
        };
        self.on_forward_tsn(now, &forward_tsn)
    }

    fn on_retransmission_timeout(
        &mut self,
        now: AssocTime,
        path: PathId,
    ) -> Result<(), AssociationError> {
        self.observe_time(now);
        self.ensure_known_path(path)?;
        let tcb = self.data_tcb_mut()?;
        if tcb.retransmission_queue.on_retransmission_timeout(now, path) {
            self.abort_after_too_many_retransmissions();
        } else {
            tcb.sync_rto();
        }
        Ok(())
    }

    fn on_heartbeat_timeout(
        &mut self,
        now: AssocTime,
        path: PathId,
    ) -> Result<(), AssociationError> {
        self.observe_time(now);
        self.ensure_known_path(path)?;
        let tcb = self.data_tcb_mut()?;
        if tcb.retransmission_queue.on_heartbeat_timeout(now, path) {
            self.abort_after_too_many_retransmissions();
        }
        Ok(())
    }

    fn on_heartbeat_ack(
        &mut self,
        now: AssocTime,
        path: PathId,
        rtt: Duration,
    ) -> Result<(), AssociationError> {
        self.observe_time(now);
        self.ensure_known_path(path)?;
        let tcb = self.data_tcb_mut()?;
        tcb.retransmission_queue.on_heartbeat_ack(now, path, rtt);
        tcb.sync_rto();
        Ok(())
    }

    fn advance_time(&mut self, now: AssocTime) {
        if now < self.now {
            // Time is not allowed to go backwards.
            return;
        }
        self.now = now;
        match &mut self.state {
            State::Closed => {}
            State::CookieWait(s) => {
                debug_assert!(s.t1_init.is_running());
                self.handle_t1_init_timeout(now);
            }
            State::CookieEchoed(s) => {
                debug_assert!(s.t1_cookie.is_running());
                self.handle_t1_cookie_timeout(now);
            }
            State::Established(tcb)
            | State::ShutdownPending(tcb)
            | State::ShutdownSent(ShutdownTimerState { tcb, .. })
            | State::ShutdownReceived(tcb)
            | State::ShutdownAckSent(ShutdownTimerState { tcb, .. }) => {
                tcb.data_tracker.handle_timeout(now);
                if self.handle_path_timeouts(now) {
                    self.handle_t2_shutdown_timeout(now);
                }
            }
        }
    }

    fn poll_timeout(&self) -> AssocTime {
        let timeout = match self.state {
            State::Closed => None,
            State::CookieWait(ref s) => s.t1_init.next_expiry(),
            State::CookieEchoed(ref s) => s.t1_cookie.next_expiry(),
            State::Established(ref tcb)
            | State::ShutdownPending(ref tcb)
            | State::ShutdownReceived(ref tcb) => tcb.next_timeout(),
            State::ShutdownSent(ref s) | State::ShutdownAckSent(ref s) => {
                closest_timeout(s.tcb.next_timeout(), s.t2_shutdown.next_expiry())
            }
        };

        // Ensure that already expired timers don't return a time in the past.
        timeout.map(|t| t.max(self.now)).unwrap_or(AssocTime::infinite_future())
    }

    fn metrics(&self) -> Option<Metrics> {
        Some(self.state.tcb()?.metrics())
    }
}
