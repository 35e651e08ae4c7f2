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

use crate::types::Tsn;

/// The maximum number of gap blocks a single list tracks. Received TSNs that would need more
/// blocks are not recorded, which bounds the memory used regardless of how fragmented the
/// received TSN sequence becomes.
pub const MAX_GAP_COUNT: usize = 500;

/// A closed range `[start, stop]` of received TSNs, above the cumulative ack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GapBlock {
    pub start: Tsn,
    pub stop: Tsn,
}

impl GapBlock {
    pub fn new(start: Tsn, stop: Tsn) -> Self {
        Self { start, stop }
    }

    pub fn contains(&self, tsn: Tsn) -> bool {
        tsn.is_between(self.start, self.stop)
    }
}

/// An ordered set of TSNs stored as non-overlapping, non-adjacent gap blocks.
///
/// The list doesn't own the cumulative ack; it's passed in by the owner, which allows several
/// lists to be kept in sync with a single watermark (see [`GapList`]).
#[derive(Clone, Debug, Default)]
pub struct SimpleGapList {
    blocks: Vec<GapBlock>,
    overflows: u64,
}

impl SimpleGapList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_gaps(&self) -> usize {
        self.blocks.len()
    }

    pub fn gaps(&self) -> &[GapBlock] {
        &self.blocks
    }

    pub fn gap_start(&self, index: usize) -> Option<Tsn> {
        self.blocks.get(index).map(|b| b.start)
    }

    pub fn gap_stop(&self, index: usize) -> Option<Tsn> {
        self.blocks.get(index).map(|b| b.stop)
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of times a TSN couldn't be recorded as the list was full.
    pub fn overflow_count(&self) -> u64 {
        self.overflows
    }

    pub fn highest_tsn(&self) -> Option<Tsn> {
        self.blocks.last().map(|b| b.stop)
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    /// Returns the index of the first block that ends at or after `tsn`.
    fn lower_bound(&self, tsn: Tsn) -> usize {
        self.blocks.partition_point(|b| b.stop < tsn)
    }

    pub fn tsn_in_gap_list(&self, tsn: Tsn) -> bool {
        let idx = self.lower_bound(tsn);
        idx < self.blocks.len() && self.blocks[idx].contains(tsn)
    }

    /// Drops all blocks that are implied by the cumulative ack `cum_ack_tsn`. A block that
    /// straddles the watermark keeps its part above it.
    pub fn forward_cum_ack_tsn(&mut self, cum_ack_tsn: Tsn) {
        let covered = self.blocks.partition_point(|b| b.stop <= cum_ack_tsn);
        self.blocks.drain(..covered);
        if let Some(first) = self.blocks.first_mut() {
            if first.start <= cum_ack_tsn {
                first.start = cum_ack_tsn + 1;
            }
        }
    }

    /// Absorbs the first block into `cum_ack_tsn` if it directly follows it. Returns true if the
    /// cumulative ack was advanced.
    pub fn try_to_advance_cum_ack_tsn(&mut self, cum_ack_tsn: &mut Tsn) -> bool {
        match self.blocks.first() {
            Some(first) if first.start == *cum_ack_tsn + 1 => {
                *cum_ack_tsn = first.stop;
                self.blocks.remove(0);
                true
            }
            _ => false,
        }
    }

    /// Removes a single TSN, shrinking or splitting the block holding it. Returns false if the TSN
    /// wasn't in the list.
    pub fn remove_from_gap_list(&mut self, tsn: Tsn) -> bool {
        self.remove(tsn, MAX_GAP_COUNT)
    }

    /// Removes `tsn`, allowing a split only while the list holds fewer than `capacity` blocks.
    fn remove(&mut self, tsn: Tsn, capacity: usize) -> bool {
        let idx = self.lower_bound(tsn);
        let Some(block) = self.blocks.get(idx).copied() else {
            return false;
        };
        if !block.contains(tsn) {
            return false;
        }

        if block.start == tsn && block.stop == tsn {
            self.blocks.remove(idx);
        } else if block.start == tsn {
            self.blocks[idx].start = tsn + 1;
        } else if block.stop == tsn {
            self.blocks[idx].stop = tsn - 1;
        } else if self.blocks.len() < capacity {
            self.blocks[idx].stop = tsn - 1;
            self.blocks.insert(idx + 1, GapBlock::new(tsn + 1, block.stop));
        } else {
            // No room for the upper half. Under-reporting received data is safe, as the peer will
            // just retransmit it.
            self.overflows += 1;
            self.blocks[idx].stop = tsn - 1;
        }
        true
    }

    /// Returns true if `tsn` is already recorded, or can be recorded without a new block beyond
    /// the capacity.
    fn has_room_for(&self, tsn: Tsn) -> bool {
        if self.blocks.len() < MAX_GAP_COUNT {
            return true;
        }
        let idx = self.lower_bound(tsn);
        let touches_next = self
            .blocks
            .get(idx)
            .is_some_and(|b| b.contains(tsn) || b.start == tsn + 1);
        let touches_prev = idx > 0 && self.blocks[idx - 1].stop + 1 == tsn;
        touches_next || touches_prev
    }

    /// Returns true if removing `tsn` would split a block of a full list.
    fn removal_needs_room(&self, tsn: Tsn) -> bool {
        let idx = self.lower_bound(tsn);
        self.blocks.len() >= MAX_GAP_COUNT
            && self.blocks.get(idx).is_some_and(|b| b.start < tsn && tsn < b.stop)
    }

    fn record_overflow(&mut self, tsn: Tsn) {
        self.overflows += 1;
        log::debug!("gap list full, not recording tsn={}", tsn);
    }

    /// Records the received `tsn`.
    ///
    /// A TSN directly following `cum_ack_tsn` advances it rather than creating a block; in that
    /// case true is returned. `new_chunk_received` is set if the TSN wasn't known before and it
    /// could be recorded.
    pub fn update_gap_list(
        &mut self,
        tsn: Tsn,
        cum_ack_tsn: &mut Tsn,
        new_chunk_received: &mut bool,
    ) -> bool {
        *new_chunk_received = false;
        if tsn <= *cum_ack_tsn {
            return false;
        }

        let idx = self.lower_bound(tsn);
        if idx < self.blocks.len() && self.blocks[idx].contains(tsn) {
            return false;
        }

        if tsn == *cum_ack_tsn + 1 {
            *cum_ack_tsn = tsn;
            *new_chunk_received = true;
            return true;
        }

        let extend_prev = idx > 0 && self.blocks[idx - 1].stop + 1 == tsn;
        let extend_next = idx < self.blocks.len() && self.blocks[idx].start == tsn + 1;

        match (extend_prev, extend_next) {
            (true, true) => {
                self.blocks[idx - 1].stop = self.blocks[idx].stop;
                self.blocks.remove(idx);
            }
            (true, false) => self.blocks[idx - 1].stop = tsn,
            (false, true) => self.blocks[idx].start = tsn,
            (false, false) => {
                if self.blocks.len() >= MAX_GAP_COUNT {
                    self.record_overflow(tsn);
                    return false;
                }
                self.blocks.insert(idx, GapBlock::new(tsn, tsn));
            }
        }
        *new_chunk_received = true;
        false
    }

    /// Validates the list invariants: blocks are well formed, strictly ordered with at least one
    /// missing TSN between them, and entirely above `cum_ack_tsn`.
    pub fn check(&self, cum_ack_tsn: Tsn) -> bool {
        self.is_ordered_above(cum_ack_tsn) && self.blocks.len() <= MAX_GAP_COUNT
    }

    fn is_ordered_above(&self, cum_ack_tsn: Tsn) -> bool {
        let mut last = cum_ack_tsn;
        for (i, block) in self.blocks.iter().enumerate() {
            if block.start > block.stop || block.start <= last {
                return false;
            }
            if i > 0 && block.start == last + 1 {
                return false;
            }
            last = block.stop;
        }
        true
    }
}

/// Selects one of the three views of a [`GapList`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GapType {
    Revokable,
    NonRevokable,
    Any,
}

/// Received TSNs above the cumulative ack, in three synchronized views.
///
/// The combined view is the union of the revokable and non-revokable views. A TSN may move from
/// revokable to non-revokable, but never back: once non-revokable, the receiver has committed
/// to never discard it.
#[derive(Clone, Debug, Default)]
pub struct GapList {
    revokable: SimpleGapList,
    non_revokable: SimpleGapList,
    combined: SimpleGapList,
    cum_ack_tsn: Tsn,
}

impl GapList {
    pub fn new(cum_ack_tsn: Tsn) -> Self {
        Self { cum_ack_tsn, ..Default::default() }
    }

    pub fn cum_ack_tsn(&self) -> Tsn {
        self.cum_ack_tsn
    }

    pub fn highest_tsn_received(&self) -> Tsn {
        self.combined.highest_tsn().unwrap_or(self.cum_ack_tsn)
    }

    fn list(&self, gap_type: GapType) -> &SimpleGapList {
        match gap_type {
            GapType::Revokable => &self.revokable,
            GapType::NonRevokable => &self.non_revokable,
            GapType::Any => &self.combined,
        }
    }

    pub fn num_gaps(&self, gap_type: GapType) -> usize {
        self.list(gap_type).num_gaps()
    }

    pub fn gaps(&self, gap_type: GapType) -> &[GapBlock] {
        self.list(gap_type).gaps()
    }

    pub fn gap_start(&self, gap_type: GapType, index: usize) -> Option<Tsn> {
        self.list(gap_type).gap_start(index)
    }

    pub fn gap_stop(&self, gap_type: GapType, index: usize) -> Option<Tsn> {
        self.list(gap_type).gap_stop(index)
    }

    pub fn tsn_in_gap_list(&self, tsn: Tsn) -> bool {
        self.combined.tsn_in_gap_list(tsn)
    }

    pub fn tsn_is_revokable(&self, tsn: Tsn) -> bool {
        self.revokable.tsn_in_gap_list(tsn)
    }

    pub fn tsn_is_non_revokable(&self, tsn: Tsn) -> bool {
        self.non_revokable.tsn_in_gap_list(tsn)
    }

    /// Total number of TSNs that couldn't be recorded in any of the views.
    pub fn overflow_count(&self) -> u64 {
        self.revokable.overflow_count()
            + self.non_revokable.overflow_count()
            + self.combined.overflow_count()
    }

    pub fn reset(&mut self, cum_ack_tsn: Tsn) {
        *self = Self::new(cum_ack_tsn);
    }

    fn forward_views(&mut self) {
        self.revokable.forward_cum_ack_tsn(self.cum_ack_tsn);
        self.non_revokable.forward_cum_ack_tsn(self.cum_ack_tsn);
    }

    /// Records a received TSN. `new_chunk_received` is set if the TSN wasn't seen before. Returns
    /// true if the cumulative ack advanced.
    ///
    /// A TSN is only recorded if both the combined view and the view given by `tsn_is_revokable`
    /// have room for it. Receiving a known revokable TSN as non-revokable moves it between views.
    pub fn update_gap_list(
        &mut self,
        tsn: Tsn,
        new_chunk_received: &mut bool,
        tsn_is_revokable: bool,
    ) -> bool {
        *new_chunk_received = false;
        if tsn <= self.cum_ack_tsn {
            return false;
        }
        if self.combined.tsn_in_gap_list(tsn) {
            if !tsn_is_revokable && self.revokable.tsn_in_gap_list(tsn) {
                self.move_to_non_revokable(tsn);
            }
            return false;
        }

        let view = if tsn_is_revokable { &mut self.revokable } else { &mut self.non_revokable };
        if tsn != self.cum_ack_tsn + 1 && !view.has_room_for(tsn) {
            view.record_overflow(tsn);
            return false;
        }

        let advanced =
            self.combined.update_gap_list(tsn, &mut self.cum_ack_tsn, new_chunk_received);
        if advanced {
            self.forward_views();
        } else if *new_chunk_received {
            let view = if tsn_is_revokable { &mut self.revokable } else { &mut self.non_revokable };
            let mut cum_ack_tsn = self.cum_ack_tsn;
            let mut recorded = false;
            view.update_gap_list(tsn, &mut cum_ack_tsn, &mut recorded);
            debug_assert!(recorded);
        }
        debug_assert!(self.check());
        advanced
    }

    /// Moves a revokable TSN to the non-revokable view. If either view lacks the room to do so,
    /// the TSN stays revokable, which only means the peer keeps its copy for longer.
    fn move_to_non_revokable(&mut self, tsn: Tsn) {
        if self.revokable.removal_needs_room(tsn) || !self.non_revokable.has_room_for(tsn) {
            log::debug!("No room to make tsn={} non-revokable", tsn);
            return;
        }
        self.revokable.remove_from_gap_list(tsn);
        let mut cum_ack_tsn = self.cum_ack_tsn;
        let mut recorded = false;
        self.non_revokable.update_gap_list(tsn, &mut cum_ack_tsn, &mut recorded);
        debug_assert!(recorded);
    }

    /// Absorbs gap blocks that directly follow the cumulative ack. Returns true if it advanced.
    pub fn try_to_advance_cum_ack_tsn(&mut self) -> bool {
        let mut advanced = false;
        while self.combined.try_to_advance_cum_ack_tsn(&mut self.cum_ack_tsn) {
            advanced = true;
        }
        if advanced {
            self.forward_views();
        }
        advanced
    }

    /// Moves the cumulative ack forward to `cum_ack_tsn`, as if every TSN up to it was received.
    pub fn forward_cum_ack_tsn(&mut self, cum_ack_tsn: Tsn) -> bool {
        if cum_ack_tsn <= self.cum_ack_tsn {
            return false;
        }
        self.cum_ack_tsn = cum_ack_tsn;
        self.combined.forward_cum_ack_tsn(cum_ack_tsn);
        self.forward_views();
        self.try_to_advance_cum_ack_tsn();
        true
    }

    /// Removes a reneged TSN from all views.
    ///
    /// The data of a reneged TSN is gone, so it must not be reported any longer. Splitting a block
    /// is therefore allowed even in a full list; the list shrinks again when the TSN is received
    /// anew.
    pub fn remove_from_gap_list(&mut self, tsn: Tsn) -> bool {
        self.revokable.remove(tsn, usize::MAX);
        self.non_revokable.remove(tsn, usize::MAX);
        let removed = self.combined.remove(tsn, usize::MAX);
        debug_assert!(self.check());
        removed
    }

    /// Validates that all views are well formed, and that the combined view is exactly the union
    /// of the two disjoint views.
    pub fn check(&self) -> bool {
        self.revokable.is_ordered_above(self.cum_ack_tsn)
            && self.non_revokable.is_ordered_above(self.cum_ack_tsn)
            && self.combined.is_ordered_above(self.cum_ack_tsn)
            && self.views_make_up_combined()
    }

    fn views_make_up_combined(&self) -> bool {
        let mut views: Vec<GapBlock> =
            self.revokable.gaps().iter().chain(self.non_revokable.gaps()).copied().collect();
        views.sort_by(|a, b| a.start.cmp(&b.start));

        let mut union: Vec<GapBlock> = Vec::with_capacity(views.len());
        for block in views {
            match union.last_mut() {
                Some(last) if block.start <= last.stop => return false,
                Some(last) if block.start == last.stop + 1 => last.stop = block.stop,
                _ => union.push(block),
            }
        }
        union == self.combined.gaps()
    }
}
