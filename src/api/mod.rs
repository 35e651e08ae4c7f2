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

use crate::rx::gap_list::MAX_GAP_COUNT;
use std::fmt;
use std::ops::Add;
use std::ops::Sub;
use std::time::Duration;
use thiserror::Error;

pub use crate::association::Association;
pub use crate::types::Ssn;
pub use crate::types::Tsn;

/// Represents a point in time relative to the creation of the association.
///
/// This is an absolute timestamp within the "Association Epoch". The association never reads a
/// clock itself; the caller provides the current time on every call that may need it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct AssocTime(Duration);

impl AssocTime {
    /// The moment the association was created (t=0).
    pub const fn zero() -> AssocTime {
        AssocTime(Duration::ZERO)
    }
    pub const fn infinite_future() -> AssocTime {
        AssocTime(Duration::MAX)
    }
}

impl Add<Duration> for AssocTime {
    type Output = AssocTime;
    fn add(self, rhs: Duration) -> AssocTime {
        AssocTime(self.0.saturating_add(rhs))
    }
}

impl Sub<Duration> for AssocTime {
    type Output = AssocTime;
    fn sub(self, rhs: Duration) -> AssocTime {
        AssocTime(self.0.saturating_sub(rhs))
    }
}

impl Sub<AssocTime> for AssocTime {
    type Output = Duration;
    fn sub(self, rhs: AssocTime) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

impl From<Duration> for AssocTime {
    fn from(value: Duration) -> Self {
        AssocTime(value)
    }
}

impl From<AssocTime> for Duration {
    fn from(value: AssocTime) -> Self {
        value.0
    }
}

/// Stream Identifier
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct StreamId(pub u16);

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one destination transport address of a multi-homed peer.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PathId(pub u16);

impl fmt::Debug for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Send options for sending messages.
#[derive(Clone, Debug, Default)]
pub struct SendOptions {
    /// If the message should be sent with unordered message delivery.
    pub unordered: bool,

    /// If set, will discard messages that haven't been acknowledged before the lifetime has
    /// expired. This is only available if the peer supports Partial Reliability Extension (RFC
    /// 3758).
    pub lifetime: Option<Duration>,

    /// If set, limits the number of retransmissions. This is only available if the peer supports
    /// Partial Reliability Extension (RFC 3758).
    pub max_retransmissions: Option<u16>,
}

/// A user message, sent as a whole in a single DATA chunk on the specified stream.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub stream_id: StreamId,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(stream_id: StreamId, payload: Vec<u8>) -> Self {
        Message { stream_id, payload }
    }
}

/// An inbound DATA chunk, as handed over by the transport receive path.
#[derive(Clone, Debug, PartialEq)]
pub struct ReceivedData {
    pub tsn: Tsn,
    pub stream_id: StreamId,
    pub ssn: Ssn,
    pub unordered: bool,
    pub payload: Vec<u8>,
}

/// A message that is ready to be delivered to the application.
#[derive(Clone, Debug, PartialEq)]
pub struct ReceivedMessage {
    pub stream_id: StreamId,
    pub ssn: Option<Ssn>,
    pub payload: Vec<u8>,
}

/// A DATA chunk handed over to the transport send path.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundData {
    pub tsn: Tsn,
    pub stream_id: StreamId,
    /// Unset for unordered messages.
    pub ssn: Option<Ssn>,
    pub payload: Vec<u8>,
    /// The destination the chunk must be sent to.
    pub path: PathId,
    pub is_retransmission: bool,
}

/// A chunk that the peer has acknowledged and that is no longer referenced by the association.
#[derive(Clone, Debug, PartialEq)]
pub struct AcknowledgedChunk {
    pub tsn: Tsn,
    pub stream_id: StreamId,
    pub payload_size: usize,
}

/// A reported range of received TSNs `[start, stop]`, both inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GapReport {
    pub start: Tsn,
    pub stop: Tsn,
    pub revokable: bool,
}

impl GapReport {
    pub fn new(start: Tsn, stop: Tsn, revokable: bool) -> Self {
        Self { start, stop, revokable }
    }
}

/// Selective acknowledgement as exchanged between the peers, independent of its wire encoding
/// (SACK or NR-SACK chunk).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SackReport {
    pub cumulative_tsn_ack: Tsn,
    pub a_rwnd: u32,
    /// Revokable ranges first, then non-revokable ranges, each in ascending order.
    pub gap_reports: Vec<GapReport>,
    pub duplicate_tsns: Vec<Tsn>,
    /// When set, the non-revokable ranges include the revokable ones, which must be subtracted.
    pub nr_subtract_r_gaps: bool,
    /// Incremented for every generated report, used to detect reordered SACKs.
    pub sack_seq_num: u32,
}

impl SackReport {
    pub fn revokable_gaps(&self) -> impl Iterator<Item = &GapReport> {
        self.gap_reports.iter().filter(|g| g.revokable)
    }

    pub fn non_revokable_gaps(&self) -> impl Iterator<Item = &GapReport> {
        self.gap_reports.iter().filter(|g| !g.revokable)
    }

    /// Returns true if both the revokable and the non-revokable ranges are individually sorted,
    /// non-overlapping, non-adjacent, and strictly above the cumulative ack.
    pub fn is_canonical(&self) -> bool {
        fn canonical<'a>(cum_ack: Tsn, gaps: impl Iterator<Item = &'a GapReport>) -> bool {
            let mut last = cum_ack;
            for gap in gaps {
                if gap.start > gap.stop || gap.start <= last + 1 {
                    return false;
                }
                last = gap.stop;
            }
            true
        }
        canonical(self.cumulative_tsn_ack, self.revokable_gaps())
            && canonical(self.cumulative_tsn_ack, self.non_revokable_gaps())
    }
}

/// Description of the peer learned during association setup.
#[derive(Clone, Debug, PartialEq)]
pub struct PeerParameters {
    pub initial_tsn: Tsn,
    pub a_rwnd: u32,
    pub supports_partial_reliability: bool,
}

/// The data that a FORWARD-TSN chunk carries.
#[derive(Clone, Debug, PartialEq)]
pub struct ForwardTsn {
    pub new_cumulative_tsn: Tsn,
    pub skipped_streams: Vec<(StreamId, Ssn)>,
}

/// How an inbound DATA chunk was handled.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DataDisposition {
    /// First time seen; it's tracked and buffered.
    New,
    /// Already received before. It will be reported in the next SACK.
    Duplicate,
    /// There was no room in the receive buffer; the chunk was discarded.
    Dropped,
}

/// How an inbound SACK was handled.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SackDisposition {
    Processed,
    /// The cumulative TSN ack was below the current one; only duplicate counters were updated.
    Stale,
    /// The SACK sequence number was not newer than the last one received.
    OutOfOrder,
    /// The gap ranges overlapped or were unordered, or the cumulative TSN ack acknowledged data
    /// that was never sent. Nothing was changed.
    Invalid,
}

/// Max burst strategies. See <https://datatracker.ietf.org/doc/html/rfc4960#section-6.1> and
/// <https://datatracker.ietf.org/doc/html/draft-allman-tcp-sack-13>.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MaxBurstVariant {
    /// Lower cwnd to `outstanding + max_burst * mtu` before sending.
    UseItOrLoseIt,
    /// As [`Self::UseItOrLoseIt`], but remembers the old cwnd in ssthresh.
    CongestionWindowLimiting,
    /// As [`Self::UseItOrLoseIt`], but using a temporary window that leaves cwnd unchanged.
    UseItOrLoseItTempCwnd,
    /// As [`Self::CongestionWindowLimiting`], but using a temporary window.
    CongestionWindowLimitingTempCwnd,
    /// Counts packets per path and sending round. A SACK that acknowledges data on a path also
    /// resets its count.
    MaxBurst,
    /// Counts packets per path; the count is only reset when a new sending round starts.
    AggressiveMaxBurst,
    /// Counts packets over all paths, per sending round.
    TotalMaxBurst,
}

/// Congestion control algorithm.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CongestionControlModule {
    /// <https://datatracker.ietf.org/doc/html/rfc4960#section-7.2>
    Rfc4960,
    /// <https://datatracker.ietf.org/doc/html/rfc3649>
    HighSpeed,
}

/// Selects how revokable and non-revokable gap ranges are packed into an NR-SACK.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum GapListOptimization {
    None,
    Optimized1,
    Optimized2,
    Shrunken,
}

/// Represents the category of an error that has occurred.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ErrorKind {
    /// Indicates that no error has occurred.
    NoError,

    /// The operation could not be completed because of too many retransmissions or timeouts.
    /// This typically indicates a loss of connectivity to the peer.
    TooManyRetries,

    /// The peer has reported an issue by sending an `ABORT` chunk.
    PeerReported,

    /// The peer has performed a protocol violation.
    ProtocolViolation,

    /// The association was aborted on request of the client application.
    UserInitiated,
}

/// Errors returned when the association is used incorrectly.
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum AssociationError {
    #[error("operation not allowed in state {0:?}")]
    WrongState(AssociationState),

    #[error("unknown path {0}")]
    PathNotFound(PathId),

    #[error("message of {0} bytes is larger than the maximum message size")]
    MessageTooLarge(usize),

    #[error("message payload is empty")]
    MessageEmpty,

    #[error("send buffer is full")]
    ResourceExhaustion,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(&'static str),

    #[error("failed to parse chunk: {0}")]
    ParseFailed(String),
}

/// User configurable options, fixed at association creation.
#[derive(Clone, Debug)]
pub struct Options {
    /// Maximum SCTP packet size, and the segment size used by congestion control.
    pub mtu: usize,

    /// Destinations of the peer. The association keeps one set of congestion control variables
    /// for each of them.
    pub paths: Vec<PathId>,

    /// The destination used for new data, as long as it's active.
    pub primary_path: PathId,

    /// The largest allowed message payload to be sent.
    pub max_message_size: usize,

    /// Send queue total size limit.
    pub max_send_buffer_size: usize,

    /// Local receive buffer, and the base for the advertised receiver window.
    pub receive_buffer_size: usize,

    /// Silly window syndrome avoidance limit, see
    /// <https://datatracker.ietf.org/doc/html/rfc4960#section-6.2.1>.
    pub sws_limit: usize,

    /// Initial RTO value.
    pub rto_initial: Duration,

    /// Minimum RTO value.
    pub rto_min: Duration,

    /// Maximum RTO value.
    pub rto_max: Duration,

    /// `Association.Max.Retrans`.
    pub assoc_max_retrans: u32,

    /// `Path.Max.Retrans`.
    pub path_max_retrans: u32,

    /// `Max.Init.Retransmits`.
    pub max_init_retransmits: u32,

    /// T2-shutdown timeout.
    pub t2_shutdown_timeout: Duration,

    /// Heartbeat interval on idle paths. Set to zero to disable.
    pub heartbeat_interval: Duration,

    /// The maximum time a SACK is delayed after the arrival of an unacknowledged packet.
    pub delayed_ack_timeout: Duration,

    /// Send a SACK at least after this many received packets.
    pub sack_frequency: u32,

    /// Number of missing reports before a chunk is fast retransmitted.
    pub num_gap_reports: u32,

    /// `Max.Burst`, in packets.
    pub max_burst: u32,

    pub max_burst_variant: MaxBurstVariant,

    /// Initial congestion window in MTUs. Zero selects the RFC 4960 formula.
    pub initial_window: u32,

    pub cc_module: CongestionControlModule,

    /// RFC 4960 fast recovery.
    pub fast_recovery_supported: bool,

    /// Generate NR-SACK chunks instead of SACK chunks.
    pub nr_sack: bool,

    pub gap_list_optimization: GapListOptimization,

    /// Upper bound of gap ranges reported per list in one SACK.
    pub gap_report_limit: usize,

    /// Ignore SACKs whose sequence number isn't newer than the last one processed.
    pub check_sack_seq_number: bool,

    /// Never discard received data under buffer pressure, which makes all received TSNs
    /// non-revokable.
    pub disable_reneging: bool,

    /// RFC 3758 Partial Reliability Extension.
    pub enable_partial_reliability: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            mtu: 1500,
            paths: vec![PathId(0)],
            primary_path: PathId(0),
            max_message_size: 64 * 1024,
            max_send_buffer_size: 2_000_000,
            receive_buffer_size: 64 * 1024,
            sws_limit: 3000,
            rto_initial: Duration::from_secs(3),
            rto_min: Duration::from_secs(1),
            rto_max: Duration::from_secs(60),
            assoc_max_retrans: 10,
            path_max_retrans: 5,
            max_init_retransmits: 8,
            t2_shutdown_timeout: Duration::from_secs(3),
            heartbeat_interval: Duration::from_secs(30),
            delayed_ack_timeout: Duration::from_millis(200),
            sack_frequency: 2,
            num_gap_reports: 3,
            max_burst: 4,
            max_burst_variant: MaxBurstVariant::UseItOrLoseIt,
            initial_window: 0,
            cc_module: CongestionControlModule::Rfc4960,
            fast_recovery_supported: true,
            nr_sack: false,
            gap_list_optimization: GapListOptimization::None,
            gap_report_limit: MAX_GAP_COUNT,
            check_sack_seq_number: false,
            disable_reneging: false,
            enable_partial_reliability: true,
        }
    }
}

impl Options {
    pub fn validate(&self) -> Result<(), AssociationError> {
        if self.mtu == 0 {
            return Err(AssociationError::InvalidConfiguration("mtu must be positive"));
        }
        if self.rto_min > self.rto_max {
            return Err(AssociationError::InvalidConfiguration("rto_min is larger than rto_max"));
        }
        if self.paths.is_empty() {
            return Err(AssociationError::InvalidConfiguration("no paths configured"));
        }
        if !self.paths.contains(&self.primary_path) {
            return Err(AssociationError::InvalidConfiguration("primary path is not a path"));
        }
        if self.num_gap_reports == 0 || self.sack_frequency == 0 {
            return Err(AssociationError::InvalidConfiguration("thresholds must be positive"));
        }
        Ok(())
    }
}

/// Control chunks that the association wants the transport to send.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlChunk {
    Init { initial_tsn: Tsn, a_rwnd: u32 },
    CookieEcho,
    Shutdown { cumulative_tsn_ack: Tsn },
    ShutdownAck,
    ShutdownComplete,
    Abort { reason: String },
    HeartbeatRequest(PathId),
}

/// Events generated by the association.
#[derive(Debug, PartialEq)]
pub enum AssociationEvent {
    /// A control chunk should be sent to the peer, on the primary path unless noted.
    SendControl(ControlChunk),

    /// Generated when the association reaches the ESTABLISHED state.
    OnConnected(),

    /// Generated when the association is closed in a controlled way.
    OnClosed(),

    /// Generated when the association has aborted, either decided by this endpoint due to e.g.
    /// too many retransmission attempts, or by request.
    OnAborted(ErrorKind, String),

    /// A path has changed between active and inactive.
    OnPathStatusChanged { path: PathId, active: bool },

    /// New data will be sent to a different destination.
    OnPrimaryPathChanged(PathId),

    /// A message was abandoned according to its partial reliability policy.
    OnMessageAbandoned { stream_id: StreamId, tsn: Tsn },

    /// The advanced peer ack point has moved beyond the cumulative ack, and a FORWARD-TSN should
    /// be sent, see [`SctpAssociation::create_forward_tsn`].
    ForwardTsnNeeded(Tsn),

    /// A received TSN could not be recorded in a gap list, as it was full. An immediate SACK is
    /// scheduled to let the peer advance.
    OnGapListOverflow { overflows: u64 },
}

/// Association state, as visible by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssociationState {
    Closed,
    CookieWait,
    CookieEchoed,
    Established,
    ShutdownPending,
    ShutdownSent,
    ShutdownReceived,
    ShutdownAckSent,
}

/// Congestion control variables of a single path.
#[derive(Clone, Debug, PartialEq)]
pub struct PathMetrics {
    pub path: PathId,
    pub active: bool,
    pub cwnd: usize,
    pub ssthresh: usize,
    pub outstanding_bytes: usize,
    pub srtt: Duration,
    pub rto: Duration,
    pub error_count: u32,
}

/// Tracked metrics.
#[derive(Clone, Debug, PartialEq)]
pub struct Metrics {
    pub tx_chunks_count: usize,
    pub rtx_chunks_count: usize,
    pub fast_rtx_chunks_count: usize,
    pub t3_expiry_count: usize,
    pub reneged_chunks_count: usize,
    pub rx_chunks_count: usize,
    pub duplicate_tsns_count: usize,
    pub gap_list_overflows: u64,
    pub peer_rwnd: usize,
    pub primary_path: PathId,
    pub paths: Vec<PathMetrics>,
}

/// The SCTP association core.
///
/// All mutating entry points are pure state transitions that must be called from a single thread
/// of control, in the order the events happened.
pub trait SctpAssociation {
    /// Returns the next generated event, if any.
    fn poll_event(&mut self) -> Option<AssociationEvent>;

    fn state(&self) -> AssociationState;

    fn options(&self) -> &Options;

    /// Starts association setup as the active side.
    fn connect(&mut self, now: AssocTime) -> Result<(), AssociationError>;

    /// Handles the INIT-ACK from the peer.
    fn on_init_ack(&mut self, now: AssocTime, peer: PeerParameters)
    -> Result<(), AssociationError>;

    /// Handles the COOKIE-ACK from the peer, establishing the association.
    fn on_cookie_ack(&mut self, now: AssocTime) -> Result<(), AssociationError>;

    /// Accepts an association initiated by the peer.
    fn accept(&mut self, now: AssocTime, peer: PeerParameters) -> Result<(), AssociationError>;

    /// Gracefully shuts down the association once all outstanding data has been acknowledged.
    fn shutdown(&mut self, now: AssocTime) -> Result<(), AssociationError>;

    fn on_shutdown_received(
        &mut self,
        now: AssocTime,
        cumulative_tsn_ack: Tsn,
    ) -> Result<(), AssociationError>;

    fn on_shutdown_ack(&mut self, now: AssocTime) -> Result<(), AssociationError>;

    fn on_shutdown_complete(&mut self, now: AssocTime) -> Result<(), AssociationError>;

    /// Aborts the association, dropping all state. Valid in any state.
    fn abort(&mut self, reason: &str);

    /// Resets the association to the closed state without notifying the peer, dropping all state.
    fn reset(&mut self);

    /// Handles an inbound DATA chunk. `revokable` indicates if the receiver keeps the right to
    /// discard it later under buffer pressure.
    fn on_data_received(
        &mut self,
        now: AssocTime,
        data: ReceivedData,
        revokable: bool,
    ) -> Result<DataDisposition, AssociationError>;

    /// Handles an inbound SACK, received on `path`.
    fn on_sack_received(
        &mut self,
        now: AssocTime,
        path: PathId,
        sack: &SackReport,
    ) -> Result<SackDisposition, AssociationError>;

    /// Handles a FORWARD-TSN from the peer.
    fn on_forward_tsn(
        &mut self,
        now: AssocTime,
        forward_tsn: &ForwardTsn,
    ) -> Result<(), AssociationError>;

    /// Indicates if a SACK is due. Clears the request.
    fn should_send_sack(&mut self, now: AssocTime) -> bool;

    /// Generates the SACK describing the current receive state.
    fn build_sack_report(&mut self) -> Result<SackReport, AssociationError>;

    /// Generates the SACK as a serialized SACK or NR-SACK chunk.
    fn build_sack_chunk(&mut self) -> Result<Vec<u8>, AssociationError>;

    /// Parses and handles a serialized SACK or NR-SACK chunk.
    fn handle_sack_chunk(
        &mut self,
        now: AssocTime,
        path: PathId,
        bytes: &[u8],
    ) -> Result<SackDisposition, AssociationError>;

    /// Queues a message for transmission.
    fn enqueue_for_transmission(
        &mut self,
        now: AssocTime,
        message: Message,
        send_options: &SendOptions,
    ) -> Result<(), AssociationError>;

    /// Returns the next DATA chunk that may be sent now, considering congestion control, the
    /// peer's receiver window and max burst limits.
    fn pop_next_deliverable(&mut self, now: AssocTime) -> Option<OutboundData>;

    /// Returns chunks that have been acknowledged since the last call.
    fn sweep_acknowledged(&mut self) -> Vec<AcknowledgedChunk>;

    /// Returns the next received message ready for delivery.
    fn poll_received_message(&mut self) -> Option<ReceivedMessage>;

    /// Returns the FORWARD-TSN to send, if the peer ack point can be advanced.
    fn create_forward_tsn(&mut self) -> Option<ForwardTsn>;

    /// Returns a serialized FORWARD-TSN chunk, if the peer ack point can be advanced.
    fn create_forward_tsn_chunk(&mut self) -> Option<Vec<u8>>;

    /// Parses and handles a serialized FORWARD-TSN chunk.
    fn handle_forward_tsn_chunk(
        &mut self,
        now: AssocTime,
        bytes: &[u8],
    ) -> Result<(), AssociationError>;

    /// Called when the T3-rtx timer of `path` has expired.
    fn on_retransmission_timeout(
        &mut self,
        now: AssocTime,
        path: PathId,
    ) -> Result<(), AssociationError>;

    /// Called when a heartbeat on `path` hasn't been answered in time.
    fn on_heartbeat_timeout(&mut self, now: AssocTime, path: PathId)
    -> Result<(), AssociationError>;

    /// Called when a HEARTBEAT-ACK was received on `path`.
    fn on_heartbeat_ack(
        &mut self,
        now: AssocTime,
        path: PathId,
        rtt: Duration,
    ) -> Result<(), AssociationError>;

    /// Fires all timers that have expired at `now`.
    fn advance_time(&mut self, now: AssocTime);

    /// Returns the earliest time a timer expires, or [`AssocTime::infinite_future`].
    fn poll_timeout(&self) -> AssocTime;

    fn metrics(&self) -> Option<Metrics>;
}
