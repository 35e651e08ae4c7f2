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

use crate::math::round_up_to_4;
use crate::packet::ChunkParseError;
use crate::packet::SerializableTlv;
use crate::packet::TLV_HEADER_SIZE;
use crate::packet::ensure;
use crate::packet::forward_tsn_chunk;
use crate::packet::forward_tsn_chunk::ForwardTsnChunk;
use crate::packet::nr_sack_chunk;
use crate::packet::nr_sack_chunk::NrSackChunk;
use crate::packet::read_u16_be;
use crate::packet::sack_chunk;
use crate::packet::sack_chunk::SackChunk;
use crate::packet::write_u16_be;
use std::cmp;

/// Intermediate representation of a chunk for which the type hasn't been fully discriminated, see
/// <https://datatracker.ietf.org/doc/html/rfc9260#section-3.2>.
///
/// ```txt
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Chunk Type   |  Chunk Flags  |         Chunk Length          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// \                                                               \
/// /                          Chunk Value                          /
/// \                                                               \
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug)]
pub(crate) struct RawChunk<'a> {
    pub(crate) typ: u8,
    pub(crate) flags: u8,
    pub(crate) value: &'a [u8],
}

impl<'a> RawChunk<'a> {
    /// Reads a chunk from `bytes` and returns a raw representation of the frame and the remaining
    /// data that was not consumed when reading this chunk.
    pub(crate) fn from_bytes(bytes: &'a [u8]) -> Result<(Self, &'a [u8]), ChunkParseError> {
        ensure!(bytes.len() >= TLV_HEADER_SIZE, ChunkParseError::InvalidLength);

        let length = read_u16_be!(&bytes[2..4]) as usize;
        ensure!(length >= TLV_HEADER_SIZE && length <= bytes.len(), ChunkParseError::InvalidLength);

        let padded_length = round_up_to_4!(length);
        let end_offset = cmp::min(padded_length, bytes.len());

        Ok((
            Self { typ: bytes[0], flags: bytes[1], value: &bytes[TLV_HEADER_SIZE..length] },
            &bytes[end_offset..],
        ))
    }
}

/// Writes a chunk header with the provided arguments and returns the remaining part of the chunk
/// (its value) that may be filled in by the caller with additional data.
#[inline]
pub fn write_chunk_header(typ: u8, flags: u8, value_size: usize, output: &mut [u8]) -> &mut [u8] {
    let serialized_size = TLV_HEADER_SIZE + value_size;
    assert!(output.len() >= serialized_size);
    output[0] = typ;
    output[1] = flags;
    write_u16_be!(&mut output[2..4], serialized_size as u16);
    &mut output[TLV_HEADER_SIZE..serialized_size]
}

/// The acknowledgement related chunks that an association consumes.
#[derive(Debug)]
pub enum Chunk {
    Sack(SackChunk),
    NrSack(NrSackChunk),
    ForwardTsn(ForwardTsnChunk),
}

impl Chunk {
    /// Parses a single chunk from the beginning of `bytes`.
    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, ChunkParseError> {
        let (raw, _) = RawChunk::from_bytes(bytes)?;
        Chunk::try_from(raw)
    }
}

impl TryFrom<RawChunk<'_>> for Chunk {
    type Error = ChunkParseError;

    fn try_from(raw: RawChunk<'_>) -> Result<Self, ChunkParseError> {
        match raw.typ {
            sack_chunk::CHUNK_TYPE => SackChunk::try_from(raw).map(Chunk::Sack),
            nr_sack_chunk::CHUNK_TYPE => NrSackChunk::try_from(raw).map(Chunk::NrSack),
            forward_tsn_chunk::CHUNK_TYPE => ForwardTsnChunk::try_from(raw)
                .map(Chunk::ForwardTsn)
                .map_err(|e| e.downcast().unwrap_or(ChunkParseError::InvalidValue)),
            _ => Err(ChunkParseError::InvalidType),
        }
    }
}

impl Chunk {
    pub(crate) fn as_serializable(&self) -> &dyn SerializableTlv {
        match self {
            Chunk::Sack(s) => s,
            Chunk::NrSack(s) => s,
            Chunk::ForwardTsn(s) => s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::read_u32_be;
    use crate::packet::write_u32_be;
    use crate::types::Tsn;

    // A test chunk that has a single u32 in its header, following the common chunk header.
    #[derive(Debug)]
    struct TestChunk {
        additional_data: u32,
    }
    const CHUNK_TYPE: u8 = 0x42;

    impl TryFrom<RawChunk<'_>> for TestChunk {
        type Error = ChunkParseError;

        fn try_from(raw: RawChunk<'_>) -> Result<Self, ChunkParseError> {
            ensure!(raw.typ == CHUNK_TYPE, ChunkParseError::InvalidType);
            ensure!(raw.value.len() == 4, ChunkParseError::InvalidLength);

            Ok(TestChunk { additional_data: read_u32_be!(&raw.value[0..4]) })
        }
    }

    impl SerializableTlv for TestChunk {
        fn serialize_to(&self, output: &mut [u8]) {
            let value = write_chunk_header(CHUNK_TYPE, 0, self.value_size(), output);
            write_u32_be!(&mut value[0..4], self.additional_data);
        }

        fn value_size(&self) -> usize {
            4
        }
    }

    #[test]
    fn parse_and_serialize_test_chunk() {
        const BYTES: &[u8] = &[0x42, 0x00, 0x00, 0x08, 0x00, 0x00, 0x7a, 0x69];
        let parsed = TestChunk::try_from(RawChunk::from_bytes(BYTES).unwrap().0).unwrap();
        assert_eq!(parsed.additional_data, 31337);
        assert_eq!(parsed.to_vec(), BYTES);
    }

    #[test]
    fn parse_insufficient_size() {
        const BYTES: &[u8] = &[0x42, 0x00, 0x00];
        assert_eq!(RawChunk::from_bytes(BYTES).unwrap_err(), ChunkParseError::InvalidLength);
    }

    #[test]
    fn parse_length_beyond_buffer() {
        const BYTES: &[u8] = &[0x42, 0x00, 0x00, 0x0c, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(RawChunk::from_bytes(BYTES).unwrap_err(), ChunkParseError::InvalidLength);
    }

    #[test]
    fn unsupported_chunk_type() {
        // COOKIE_ACK
        const BYTES: &[u8] = &[0x0b, 0x00, 0x00, 0x04];
        assert_eq!(Chunk::from_bytes(BYTES).unwrap_err(), ChunkParseError::InvalidType);
    }

    #[test]
    fn parse_sack_followed_by_forward_tsn() {
        const BYTES: &[u8] = &[
            // SACK, cum_ack=2, a_rwnd=4096, no gaps, no duplicates.
            0x03, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00,
            0x00, 0x00, //
            // FORWARD-TSN, new_cumulative_tsn=7.
            0xc0, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x07,
        ];
        let (raw, remaining) = RawChunk::from_bytes(BYTES).unwrap();
        let Chunk::Sack(sack) = Chunk::try_from(raw).unwrap() else {
            panic!("expected SACK");
        };
        assert_eq!(sack.cumulative_tsn_ack, Tsn(2));
        assert_eq!(sack.a_rwnd, 4096);
        assert_eq!(remaining.len(), 8);

        let chunk = Chunk::from_bytes(remaining).unwrap();
        assert!(matches!(chunk, Chunk::ForwardTsn(ref c) if c.new_cumulative_tsn == Tsn(7)));
        assert_eq!(chunk.as_serializable().to_vec(), remaining);
    }

    #[test]
    fn malformed_forward_tsn_keeps_parse_error() {
        const BYTES: &[u8] = &[0xc0, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(Chunk::from_bytes(BYTES).unwrap_err(), ChunkParseError::InvalidLength);
    }
}
