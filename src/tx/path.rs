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
use crate::api::Options;
use crate::api::PathId;
use crate::api::PathMetrics;
use crate::timer::Timer;
use crate::tx::congestion_control::CongestionWindow;
use crate::tx::retransmission_timeout::RetransmissionTimeout;
use std::ops::Index;
use std::ops::IndexMut;
use std::time::Duration;

/// Variables that are reset when a SACK arrives and collected while it's processed.
#[derive(Debug, Default)]
pub struct SackScratch {
    /// Bytes outstanding on the path before the SACK was processed.
    pub outstanding_before: usize,

    /// Bytes acknowledged for the first time, by the cumulative ack or by gap blocks.
    pub newly_acked_bytes: usize,

    /// The cumulative ack covered a chunk last sent to this path.
    pub new_cum_ack: bool,

    /// A chunk last sent to this path was marked for fast retransmission.
    pub requires_rtx: bool,

    /// Set until the first missing chunk of this path has been found in the gap walk.
    pub find_lowest_tsn: bool,

    /// The lowest outstanding chunk of this path was fast retransmitted.
    pub lowest_tsn_retransmitted: bool,
}

/// One destination of the peer, with its own congestion control and timers.
#[derive(Debug)]
pub struct Path {
    pub id: PathId,
    pub active: bool,
    pub cc: CongestionWindow,
    pub rto: RetransmissionTimeout,
    pub t3_rtx: Timer,

    /// Sends a HEARTBEAT when the path has been idle for the heartbeat interval.
    pub heartbeat: Timer,

    /// Running while a HEARTBEAT is waiting for its HEARTBEAT-ACK.
    pub heartbeat_ack: Timer,

    pub error_count: u32,
    pub outstanding_bytes: usize,

    /// Packets sent in the current burst, for the counting max burst variants.
    pub packets_in_burst: u32,

    pub sack: SackScratch,

    heartbeat_interval: Duration,
}

impl Path {
    pub fn new(id: PathId, options: &Options, peer_rwnd: usize) -> Self {
        let rto = RetransmissionTimeout::new(options);
        Self {
            id,
            active: true,
            cc: CongestionWindow::new(options, peer_rwnd),
            t3_rtx: Timer::new(rto.rto()),
            heartbeat: Timer::new(options.heartbeat_interval + rto.rto()),
            heartbeat_ack: Timer::new(rto.rto()),
            rto,
            error_count: 0,
            outstanding_bytes: 0,
            packets_in_burst: 0,
            sack: SackScratch::default(),
            heartbeat_interval: options.heartbeat_interval,
        }
    }

    /// Starts (or restarts) the T3-rtx timer with the current RTO.
    pub fn start_t3_rtx(&mut self, now: AssocTime) {
        self.t3_rtx.set_duration(self.rto.rto());
        self.t3_rtx.start(now);
    }

    pub fn start_t3_rtx_if_stopped(&mut self, now: AssocTime) {
        if !self.t3_rtx.is_running() {
            self.start_t3_rtx(now);
        }
    }

    /// Restarts the idle timer. Heartbeats are disabled with a zero interval.
    pub fn restart_heartbeat(&mut self, now: AssocTime) {
        if self.heartbeat_interval.is_zero() {
            return;
        }
        // From <https://datatracker.ietf.org/doc/html/rfc4960#section-8.3>:
        //
        //   On an idle destination address that is allowed to heartbeat, it is recommended that
        //   a HEARTBEAT chunk is sent once per RTO of that destination address plus the protocol
        //   parameter 'HB.interval'.
        self.heartbeat.set_duration(self.heartbeat_interval + self.rto.rto());
        self.heartbeat.start(now);
    }

    /// Called when a HEARTBEAT has been sent on this path.
    pub fn on_heartbeat_sent(&mut self, now: AssocTime) {
        self.heartbeat_ack.set_duration(self.rto.rto());
        self.heartbeat_ack.start(now);
    }

    pub fn begin_sack(&mut self) {
        self.sack = SackScratch {
            outstanding_before: self.outstanding_bytes,
            find_lowest_tsn: true,
            ..Default::default()
        };
    }

    pub fn stop_timers(&mut self) {
        self.t3_rtx.stop();
        self.heartbeat.stop();
        self.heartbeat_ack.stop();
    }

    pub fn next_timeout(&self) -> Option<AssocTime> {
        [&self.t3_rtx, &self.heartbeat, &self.heartbeat_ack]
            .into_iter()
            .filter_map(Timer::next_expiry)
            .min()
    }

    pub fn metrics(&self) -> PathMetrics {
        PathMetrics {
            path: self.id,
            active: self.active,
            cwnd: self.cc.cwnd(),
            ssthresh: self.cc.ssthresh(),
            outstanding_bytes: self.outstanding_bytes,
            srtt: self.rto.srtt(),
            rto: self.rto.rto(),
            error_count: self.error_count,
        }
    }
}

/// All destinations of the peer, in configuration order, and the current primary path.
#[derive(Debug)]
pub struct Paths {
    paths: Vec<Path>,
    primary: PathId,
}

impl Paths {
    pub fn new(options: &Options, peer_rwnd: usize) -> Self {
        Self {
            paths: options.paths.iter().map(|id| Path::new(*id, options, peer_rwnd)).collect(),
            primary: options.primary_path,
        }
    }

    pub fn primary(&self) -> PathId {
        self.primary
    }

    pub fn set_primary(&mut self, id: PathId) {
        debug_assert!(self.contains(id));
        self.primary = id;
    }

    pub fn contains(&self, id: PathId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: PathId) -> Option<&Path> {
        self.paths.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: PathId) -> Option<&mut Path> {
        self.paths.iter_mut().find(|p| p.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Path> {
        self.paths.iter_mut()
    }

    /// Returns the first active path following `id` in configuration order, wrapping around,
    /// and never `id` itself.
    pub fn next_active_after(&self, id: PathId) -> Option<PathId> {
        let pos = self.paths.iter().position(|p| p.id == id)?;
        let len = self.paths.len();
        (1..len).map(|i| &self.paths[(pos + i) % len]).find(|p| p.active).map(|p| p.id)
    }

    /// The destination for new data: the primary path while it's active, otherwise an
    /// alternative active path.
    pub fn destination_for_new_data(&self) -> PathId {
        match self.get(self.primary) {
            Some(p) if p.active => self.primary,
            _ => self.next_active_after(self.primary).unwrap_or(self.primary),
        }
    }

    pub fn all_inactive(&self) -> bool {
        self.paths.iter().all(|p| !p.active)
    }

    pub fn total_outstanding_bytes(&self) -> usize {
        self.paths.iter().map(|p| p.outstanding_bytes).sum()
    }

    pub fn next_timeout(&self) -> Option<AssocTime> {
        self.paths.iter().filter_map(Path::next_timeout).min()
    }
}

impl Index<PathId> for Paths {
    type Output = Path;

    fn index(&self, id: PathId) -> &Path {
        match self.get(id) {
            Some(path) => path,
            None => panic!("unknown path {}", id),
        }
    }
}

impl IndexMut<PathId> for Paths {
    fn index_mut(&mut self, id: PathId) -> &mut Path {
        match self.get_mut(id) {
            Some(path) => path,
            None => panic!("unknown path {}", id),
        }
    }
}
