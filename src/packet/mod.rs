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

use thiserror::Error;

pub(crate) mod chunk;
pub(crate) mod forward_tsn_chunk;
pub(crate) mod nr_sack_chunk;
pub(crate) mod sack_chunk;

/// Size of the Type-Length-Value header, used by chunks.
pub(crate) const TLV_HEADER_SIZE: usize = 4;

macro_rules! read_u16_be {
    ($buf: expr) => {
        u16::from_be_bytes($buf[..2].try_into().unwrap())
    };
}

macro_rules! read_u32_be {
    ($buf: expr) => {
        u32::from_be_bytes($buf[..4].try_into().unwrap())
    };
}

macro_rules! write_u16_be {
    ($buf: expr, $n: expr) => {
        $buf[..2].copy_from_slice(&($n as u16).to_be_bytes());
    };
}

macro_rules! write_u32_be {
    ($buf: expr, $n: expr) => {
        $buf[..4].copy_from_slice(&($n as u32).to_be_bytes());
    };
}

macro_rules! ensure {
    ($cond: expr, $err: expr) => {
        if !$cond {
            return Err($err);
        }
    };
}

pub(crate) use ensure;
pub(crate) use read_u16_be;
pub(crate) use read_u32_be;
pub(crate) use write_u16_be;
pub(crate) use write_u32_be;

/// Trait for serialization/deserialization methods on chunks that have the same framing, but
/// handle metadata (type, flags etc) differently.
pub(crate) trait SerializableTlv {
    /// Serializes this TLV object to a byte array. Callers are expected to call
    /// [`Self::serialized_size`] prior to calling this method, to ensure that `output` is large
    /// enough.
    fn serialize_to(&self, output: &mut [u8]);

    /// Returns how many bytes of value payload this TLV object has, which together with the TLV
    /// header size becomes the full serialized size.
    fn value_size(&self) -> usize;

    /// Returns the number of bytes this TLV object serializes to.
    fn serialized_size(&self) -> usize {
        TLV_HEADER_SIZE + self.value_size()
    }

    fn to_vec(&self) -> Vec<u8> {
        let mut output = vec![0; self.serialized_size()];
        self.serialize_to(&mut output);
        output
    }
}

#[allow(clippy::enum_variant_names)]
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum ChunkParseError {
    #[error("The TLV data has an invalid length field, or payload size")]
    InvalidLength,

    #[error("Unexpected TLV type")]
    InvalidType,

    #[error("Invalid value")]
    InvalidValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_big_endian() {
        let a = &[0xca, 0xfe, 0xba, 0xbe];
        assert_eq!(read_u16_be!(a), 0xcafe);
        assert_eq!(read_u32_be!(a), 0xcafebabe);
    }

    #[test]
    fn write_big_endian() {
        let mut a: Vec<u8> = vec![0; 4];
        write_u16_be!(&mut a[2..], 0x1234);
        assert_eq!(a, &[0, 0, 0x12, 0x34]);
        write_u32_be!(&mut a, 0x01020304);
        assert_eq!(a, &[1, 2, 3, 4]);
    }

    fn checked(value: u32) -> Result<u32, ChunkParseError> {
        ensure!(value < 10, ChunkParseError::InvalidValue);
        Ok(value)
    }

    #[test]
    fn ensure_returns_error() {
        assert_eq!(checked(3), Ok(3));
        assert_eq!(checked(12), Err(ChunkParseError::InvalidValue));
    }
}
