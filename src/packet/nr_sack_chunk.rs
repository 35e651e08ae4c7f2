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

use crate::api::SackReport;
use crate::packet::ChunkParseError;
use crate::packet::SerializableTlv;
use crate::packet::chunk::RawChunk;
use crate::packet::chunk::write_chunk_header;
use crate::packet::ensure;
use crate::packet::read_u16_be;
use crate::packet::read_u32_be;
use crate::packet::sack_chunk::GapAckBlock;
use crate::packet::sack_chunk::decode_gap_blocks;
use crate::packet::sack_chunk::encode_gap_blocks;
use crate::packet::write_u16_be;
use crate::packet::write_u32_be;
use crate::types::Tsn;
use std::fmt;

pub(crate) const CHUNK_TYPE: u8 = 16;

const SUBTRACT_R_GAPS_FLAG: u8 = 0x01;
const HEADER_SIZE: usize = 16;

/// Non-Renegable Selective Acknowledgement (NR-SACK) chunk
///
/// See <https://datatracker.ietf.org/doc/html/draft-natarajan-tsvwg-sctp-nrsack>.
///
/// ```txt
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Type = 16    |  Chunk Flags  |         Chunk Length          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      Cumulative TSN Ack                       |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |          Advertised Receiver Window Credit (a_rwnd)           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Number of R Gap Ack Blocks = N| Number of NR Gap Ack Blocks=M |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Number of Duplicate TSNs = X  |           Reserved            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   R Gap Ack Block #1 Start    |    R Gap Ack Block #1 End     |
/// /                              ...                              /
/// |   NR Gap Ack Block #1 Start   |    NR Gap Ack Block #1 End    |
/// /                              ...                              /
/// |                        Duplicate TSN 1                        |
/// /                              ...                              /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// When the flags carry `0x01`, the NR blocks cover every received TSN and the receiver of the
/// chunk must subtract the R blocks from them.
#[derive(Debug, PartialEq)]
pub struct NrSackChunk {
    pub cumulative_tsn_ack: Tsn,
    pub a_rwnd: u32,
    pub r_gap_ack_blocks: Vec<GapAckBlock>,
    pub nr_gap_ack_blocks: Vec<GapAckBlock>,
    pub duplicate_tsns: Vec<Tsn>,
    pub subtract_r_gaps: bool,
}

impl NrSackChunk {
    pub(crate) fn from_report(report: &SackReport) -> Self {
        Self {
            cumulative_tsn_ack: report.cumulative_tsn_ack,
            a_rwnd: report.a_rwnd,
            r_gap_ack_blocks: encode_gap_blocks(
                report.cumulative_tsn_ack,
                report.revokable_gaps(),
            ),
            nr_gap_ack_blocks: encode_gap_blocks(
                report.cumulative_tsn_ack,
                report.non_revokable_gaps(),
            ),
            duplicate_tsns: report.duplicate_tsns.clone(),
            subtract_r_gaps: report.nr_subtract_r_gaps,
        }
    }

    pub(crate) fn to_report(&self) -> Result<SackReport, ChunkParseError> {
        let mut gap_reports =
            decode_gap_blocks(self.cumulative_tsn_ack, &self.r_gap_ack_blocks, true)?;
        gap_reports.extend(decode_gap_blocks(
            self.cumulative_tsn_ack,
            &self.nr_gap_ack_blocks,
            false,
        )?);
        Ok(SackReport {
            cumulative_tsn_ack: self.cumulative_tsn_ack,
            a_rwnd: self.a_rwnd,
            gap_reports,
            duplicate_tsns: self.duplicate_tsns.clone(),
            nr_subtract_r_gaps: self.subtract_r_gaps,
            ..Default::default()
        })
    }
}

fn read_blocks(data: &[u8]) -> Vec<GapAckBlock> {
    data.chunks_exact(4)
        .map(|c| GapAckBlock::new(read_u16_be!(&c[0..2]), read_u16_be!(&c[2..4])))
        .collect()
}

impl TryFrom<RawChunk<'_>> for NrSackChunk {
    type Error = ChunkParseError;

    fn try_from(raw: RawChunk<'_>) -> Result<Self, ChunkParseError> {
        ensure!(raw.typ == CHUNK_TYPE, ChunkParseError::InvalidType);
        ensure!(raw.value.len() >= HEADER_SIZE, ChunkParseError::InvalidLength);

        let cumulative_tsn_ack = Tsn(read_u32_be!(&raw.value[0..4]));
        let a_rwnd = read_u32_be!(&raw.value[4..8]);
        let nbr_of_r_blocks = read_u16_be!(&raw.value[8..10]) as usize;
        let nbr_of_nr_blocks = read_u16_be!(&raw.value[10..12]) as usize;
        let nbr_of_dup_tsns = read_u16_be!(&raw.value[12..14]) as usize;

        let r_end = HEADER_SIZE + nbr_of_r_blocks * 4;
        let nr_end = r_end + nbr_of_nr_blocks * 4;
        ensure!(raw.value.len() == nr_end + nbr_of_dup_tsns * 4, ChunkParseError::InvalidLength);

        Ok(Self {
            cumulative_tsn_ack,
            a_rwnd,
            r_gap_ack_blocks: read_blocks(&raw.value[HEADER_SIZE..r_end]),
            nr_gap_ack_blocks: read_blocks(&raw.value[r_end..nr_end]),
            duplicate_tsns: raw.value[nr_end..]
                .chunks_exact(4)
                .map(|c| Tsn(read_u32_be!(c)))
                .collect(),
            subtract_r_gaps: raw.flags & SUBTRACT_R_GAPS_FLAG != 0,
        })
    }
}

impl SerializableTlv for NrSackChunk {
    fn serialize_to(&self, output: &mut [u8]) {
        let flags = if self.subtract_r_gaps { SUBTRACT_R_GAPS_FLAG } else { 0 };
        let value = write_chunk_header(CHUNK_TYPE, flags, self.value_size(), output);
        write_u32_be!(&mut value[0..4], self.cumulative_tsn_ack.0);
        write_u32_be!(&mut value[4..8], self.a_rwnd);
        write_u16_be!(&mut value[8..10], self.r_gap_ack_blocks.len() as u16);
        write_u16_be!(&mut value[10..12], self.nr_gap_ack_blocks.len() as u16);
        write_u16_be!(&mut value[12..14], self.duplicate_tsns.len() as u16);
        write_u16_be!(&mut value[14..16], 0);

        let blocks = self.r_gap_ack_blocks.iter().chain(&self.nr_gap_ack_blocks);
        let mut chunks = value[HEADER_SIZE..].chunks_exact_mut(4);
        for (block, chunk) in blocks.zip(&mut chunks) {
            write_u16_be!(&mut chunk[0..2], block.start);
            write_u16_be!(&mut chunk[2..4], block.end);
        }
        for (dup_tsn, chunk) in self.duplicate_tsns.iter().zip(&mut chunks) {
            write_u32_be!(chunk, dup_tsn.0);
        }
    }

    fn value_size(&self) -> usize {
        HEADER_SIZE
            + (self.r_gap_ack_blocks.len() + self.nr_gap_ack_blocks.len()) * 4
            + self.duplicate_tsns.len() * 4
    }
}

impl fmt::Display for NrSackChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NR-SACK, cum_ack_tsn={}, a_rwnd={}, r_gaps={}, nr_gaps={}",
            self.cumulative_tsn_ack,
            self.a_rwnd,
            self.r_gap_ack_blocks.len(),
            self.nr_gap_ack_blocks.len()
        )
    }
}
