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

#[macro_export]
macro_rules! expect_event_0 {
    ($event:expr, $event_type:ident) => {
        match $event {
            None => panic!("No event emitted"),
            Some(e) => match (e) {
                AssociationEvent::$event_type() => {}
                _ => panic!("Expected $event_type, got {:?}", e),
            },
        }
    };
}

#[macro_export]
macro_rules! expect_event_1 {
    ($event:expr, $event_type:ident) => {
        match $event {
            None => panic!("No event emitted"),
            Some(e) => match (e) {
                AssociationEvent::$event_type(d) => d,
                _ => panic!("Expected $event_type, got {:?}", e),
            },
        }
    };
}

macro_rules! expect_send_control {
    ($event:expr) => {
        crate::expect_event_1!($event, SendControl)
    };
}

macro_rules! expect_on_connected {
    ($event:expr) => {
        crate::expect_event_0!($event, OnConnected)
    };
}

macro_rules! expect_on_closed {
    ($event:expr) => {
        crate::expect_event_0!($event, OnClosed)
    };
}

macro_rules! expect_primary_path_changed {
    ($event:expr) => {
        crate::expect_event_1!($event, OnPrimaryPathChanged)
    };
}

macro_rules! expect_forward_tsn_needed {
    ($event:expr) => {
        crate::expect_event_1!($event, ForwardTsnNeeded)
    };
}

macro_rules! expect_on_aborted {
    ($event:expr) => {
        match $event {
            None => panic!("No event emitted"),
            Some(e) => match (e) {
                AssociationEvent::OnAborted(kind, _) => kind,
                _ => panic!("Expected OnAborted, got {:?}", e),
            },
        }
    };
}

macro_rules! expect_on_path_status_changed {
    ($event:expr) => {
        match $event {
            None => panic!("No event emitted"),
            Some(e) => match (e) {
                AssociationEvent::OnPathStatusChanged { path, active } => (path, active),
                _ => panic!("Expected OnPathStatusChanged, got {:?}", e),
            },
        }
    };
}

macro_rules! expect_on_message_abandoned {
    ($event:expr) => {
        match $event {
            None => panic!("No event emitted"),
            Some(e) => match (e) {
                AssociationEvent::OnMessageAbandoned { stream_id, tsn } => (stream_id, tsn),
                _ => panic!("Expected OnMessageAbandoned, got {:?}", e),
            },
        }
    };
}

macro_rules! expect_on_gap_list_overflow {
    ($event:expr) => {
        match $event {
            None => panic!("No event emitted"),
            Some(e) => match (e) {
                AssociationEvent::OnGapListOverflow { overflows } => overflows,
                _ => panic!("Expected OnGapListOverflow, got {:?}", e),
            },
        }
    };
}

macro_rules! expect_no_event {
    ($event:expr) => {
        match $event {
            None => {}
            Some(e) => panic!("Expected no event, got {:?}", e),
        }
    };
}

#[allow(unused_imports)]
pub(crate) use expect_forward_tsn_needed;
pub(crate) use expect_no_event;
pub(crate) use expect_on_aborted;
pub(crate) use expect_on_closed;
pub(crate) use expect_on_connected;
pub(crate) use expect_on_gap_list_overflow;
pub(crate) use expect_on_message_abandoned;
pub(crate) use expect_on_path_status_changed;
#[allow(unused_imports)]
pub(crate) use expect_primary_path_changed;
pub(crate) use expect_send_control;
