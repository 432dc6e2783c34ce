// Copyright 2024 Adobe. All rights reserved.
// This file is licensed to you under the Apache License,
// Version 2.0 (http://www.apache.org/licenses/LICENSE-2.0)
// or the MIT license (http://opensource.org/licenses/MIT),
// at your option.

// Unless required by applicable law or agreed to in writing,
// this software is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR REPRESENTATIONS OF ANY KIND, either express or
// implied. See the LICENSE-MIT and LICENSE-APACHE files for the
// specific language governing permissions and limitations under
// each license.

use crate::{
    error::{Error, Result},
    metadata::ByteOrder,
};

const TIFF_MAGIC: u16 = 42;

/// Carrier for an Exif payload.
///
/// Holds the raw TIFF buffer, starting at the byte-order mark. `decode`
/// validates the TIFF header and records the byte order; the tag-level
/// codec consumes and produces this buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExifData {
    raw: Vec<u8>,
    byte_order: Option<ByteOrder>,
}

impl ExifData {
    /// Ingest a buffer that starts at the TIFF header.
    ///
    /// Returns the byte order announced by the header. The previous contents
    /// are replaced only on success.
    pub fn decode(&mut self, buf: &[u8]) -> Result<ByteOrder> {
        // byte-order mark (2), magic (2), IFD0 offset (4)
        if buf.len() < 8 {
            return Err(Error::CorruptedMetadata);
        }

        let byte_order = match (buf[0], buf[1]) {
            (b'I', b'I') => ByteOrder::LittleEndian,
            (b'M', b'M') => ByteOrder::BigEndian,
            _ => return Err(Error::CorruptedMetadata),
        };

        let magic = match byte_order {
            ByteOrder::LittleEndian => u16::from_le_bytes([buf[2], buf[3]]),
            ByteOrder::BigEndian => u16::from_be_bytes([buf[2], buf[3]]),
        };
        if magic != TIFF_MAGIC {
            return Err(Error::CorruptedMetadata);
        }

        self.raw = buf.to_vec();
        self.byte_order = Some(byte_order);

        Ok(byte_order)
    }

    /// Serialize back to the TIFF buffer handed to the container writer.
    pub fn encode(&self) -> Vec<u8> {
        self.raw.clone()
    }

    /// Replace the payload, validating the TIFF header.
    pub fn set_raw(&mut self, buf: &[u8]) -> Result<ByteOrder> {
        self.decode(buf)
    }

    pub fn byte_order(&self) -> Option<ByteOrder> {
        self.byte_order
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn clear(&mut self) {
        self.raw.clear();
        self.byte_order = None;
    }
}
