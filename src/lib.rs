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

use crate::api::AssociationError;
use crate::api::Options;
use crate::api::SctpAssociation;

pub mod api;

pub(crate) mod association;
pub(crate) mod events;
pub(crate) mod packet;
pub(crate) mod rx;
pub(crate) mod timer;
pub(crate) mod tx;
pub(crate) mod types;

trait EventSink {
    fn add(&mut self, event: api::AssociationEvent);
    fn next_event(&mut self) -> Option<api::AssociationEvent>;
}

#[cfg(test)]
pub(crate) mod testing;

/// Returns the version of this crate.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Creates a new association, after validating `options`.
///
/// The provided `name` is only used for logging to identify this association.
pub fn new_association(
    name: &str,
    options: &Options,
) -> Result<Box<dyn SctpAssociation>, AssociationError> {
    Ok(Box::new(association::Association::new(name, options)?))
}

pub(crate) mod math {
    macro_rules! round_up_to_4 {
        ($a: expr) => {
            ($a + 3) & !3
        };
    }

    pub(crate) use round_up_to_4;
}
