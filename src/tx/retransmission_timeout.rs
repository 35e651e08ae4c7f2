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
use std::time::Duration;

const RTO_ALPHA: f64 = 0.125;
const RTO_BETA: f64 = 0.25;

/// Estimates the round-trip time of a path and the retransmission timeout derived from it.
///
/// See <https://datatracker.ietf.org/doc/html/rfc4960#section-6.3.1>.
#[derive(Debug)]
pub struct RetransmissionTimeout {
    min_rto: f64,
    max_rto: f64,
    first_measurement: bool,
    srtt: f64,
    rtt_var: f64,
    rto: Duration,
    last_measurement: Option<AssocTime>,
}

impl RetransmissionTimeout {
    pub fn new(options: &Options) -> Self {
        Self {
            min_rto: options.rto_min.as_secs_f64(),
            max_rto: options.rto_max.as_secs_f64(),
            first_measurement: true,
            srtt: options.rto_initial.as_secs_f64(),
            rtt_var: 0.0,
            rto: options.rto_initial,
            last_measurement: None,
        }
    }

    pub fn rto(&self) -> Duration {
        self.rto
    }

    pub fn srtt(&self) -> Duration {
        Duration::from_secs_f64(self.srtt)
    }

    pub fn rtt_var(&self) -> Duration {
        Duration::from_secs_f64(self.rtt_var)
    }

    /// Indicates if a new measurement should be taken at `now`.
    ///
    /// From <https://datatracker.ietf.org/doc/html/rfc4960#section-6.3.1>:
    ///
    ///   C4)  When data is in flight and when allowed by rule C5 below, a new RTT measurement MUST
    ///        be made each round trip. Furthermore, new RTT measurements SHOULD be made no more
    ///        than once per round trip for a given destination transport address.
    pub fn wants_measurement(&self, now: AssocTime) -> bool {
        match self.last_measurement {
            None => true,
            Some(last) => now - last >= self.srtt(),
        }
    }

    pub fn observe_rtt(&mut self, now: AssocTime, measured_rtt: Duration) {
        self.last_measurement = Some(now);
        let rtt = measured_rtt.as_secs_f64();

        if self.first_measurement {
            self.srtt = rtt;
            self.rtt_var = rtt / 2.0;
            self.first_measurement = false;
        } else {
            self.rtt_var = (1.0 - RTO_BETA) * self.rtt_var + RTO_BETA * (self.srtt - rtt).abs();
            self.srtt = (1.0 - RTO_ALPHA) * self.srtt + RTO_ALPHA * rtt;
        }

        let rto = (self.srtt + 4.0 * self.rtt_var).clamp(self.min_rto, self.max_rto);
        self.rto = Duration::from_secs_f64(rto);
    }

    /// Doubles the timeout, as done when the retransmission timer expires.
    ///
    /// From <https://datatracker.ietf.org/doc/html/rfc4960#section-6.3.3>:
    ///
    ///   E2)  For the destination address for which the timer expires, set RTO <- RTO * 2 ("back
    ///        off the timer"). The maximum value discussed in rule C7 above (RTO.max) may be used
    ///        to provide an upper bound to this doubling operation.
    pub fn back_off(&mut self) {
        let rto = (self.rto.as_secs_f64() * 2.0).min(self.max_rto);
        self.rto = Duration::from_secs_f64(rto);
    }
}
