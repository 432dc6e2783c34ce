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

//! JP2 box framing primitives.
//!
//! Every structure in a JP2 file is a box: a 32-bit big-endian length
//! followed by a 32-bit box type (four ASCII characters), then the payload.
//! A length of 0 means the box extends to the end of the file; a length of 1
//! signals the 64-bit XLBox form, which this crate detects and rejects.

use std::io::Write;

use byteorder::{BigEndian, WriteBytesExt};

use crate::error::{Error, Result};

/// Size of the fixed box header: 4 byte length + 4 byte type.
pub(crate) const HEADER_SIZE: u64 = 8;

/// Size of the UUID prefix inside a `uuid` box.
pub(crate) const UUID_SIZE: u64 = 16;

// See section B.1.1 (JPEG 2000 Signature box) of the JPEG-2000 specification.
pub(crate) const JP2_SIGNATURE: [u8; 12] = [
    0x00, 0x00, 0x00, 0x0c, 0x6a, 0x50, 0x20, 0x20, 0x0d, 0x0a, 0x87, 0x0a,
];

// UUIDs identifying embedded metadata payloads.
//
// See http://www.jpeg.org/public/wg1n2600.doc for IPTC-NAA data in JPEG-2000
// and the XMP specification part 3 for XMP data in JPEG-2000 files.
pub(crate) const EXIF_UUID: [u8; 16] = *b"JpgTiffExif->JP2";
pub(crate) const IPTC_UUID: [u8; 16] = [
    0x33, 0xc7, 0xa4, 0xd2, 0xb8, 0x1d, 0x47, 0x23, 0xa0, 0xba, 0xf1, 0xa3, 0xe0, 0x97, 0xad, 0x38,
];
pub(crate) const XMP_UUID: [u8; 16] = [
    0xbe, 0x7a, 0xcf, 0xcb, 0x97, 0xa9, 0x42, 0xe8, 0x9c, 0x71, 0x99, 0x94, 0x91, 0xe3, 0xaf, 0xac,
];

// 'jp2 ' brand in the ftyp box.
const JP2_BRAND: u32 = 0x6a70_3220;

macro_rules! boxtype {
    ($( $name:ident => $value:expr ),*) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub(crate) enum BoxType {
            $( $name, )*
            Unknown(u32),
        }

        impl From<u32> for BoxType {
            fn from(t: u32) -> BoxType {
                match t {
                    $( $value => BoxType::$name, )*
                    _ => BoxType::Unknown(t),
                }
            }
        }

        impl From<BoxType> for u32 {
            fn from(t: BoxType) -> u32 {
                match t {
                    $( BoxType::$name => $value, )*
                    BoxType::Unknown(t) => t,
                }
            }
        }
    }
}

boxtype! {
    Signature => 0x6a50_2020,
    FileType => 0x6674_7970,
    Jp2Header => 0x6a70_3268,
    ImageHeader => 0x6968_6472,
    ColorSpec => 0x636f_6c72,
    Uuid => 0x7575_6964,
    Codestream => 0x6a70_3263
}

/// Render a box type as four ASCII characters, in file byte order.
pub(crate) fn fourcc(box_type: u32) -> String {
    box_type
        .to_be_bytes()
        .iter()
        .map(|&b| {
            if (0x20..=0x7e).contains(&b) {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}

/// A decoded 8-byte box header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BoxHeader {
    pub length: u32,
    pub box_type: BoxType,
}

impl BoxHeader {
    pub fn new(length: u32, box_type: BoxType) -> Self {
        Self { length, box_type }
    }

    /// Decode a header from the first 8 bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE as usize {
            return Err(Error::CorruptedMetadata);
        }

        let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let box_type = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);

        Ok(BoxHeader {
            length,
            box_type: BoxType::from(box_type),
        })
    }

    pub fn write<W: Write + ?Sized>(&self, writer: &mut W) -> Result<u64> {
        writer.write_u32::<BigEndian>(self.length)?;
        writer.write_u32::<BigEndian>(self.box_type.into())?;
        Ok(HEADER_SIZE)
    }

    pub fn fourcc(&self) -> String {
        fourcc(self.box_type.into())
    }
}

/// Validate the payload of a File Type box.
///
/// The payload is brand(4) + minor version(4) + N x compatibility(4). The
/// box is acceptable when the brand is 'jp2 ' and the compatibility list
/// names 'jp2 ' as well.
pub(crate) fn is_valid_file_type_box(data: &[u8]) -> bool {
    // brand and minor version are obligatory
    if data.len() < 8 || (data.len() - 8) % 4 != 0 {
        return false;
    }

    let brand = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);

    let compatible = data[8..]
        .chunks_exact(4)
        .any(|cl| u32::from_be_bytes([cl[0], cl[1], cl[2], cl[3]]) == JP2_BRAND);

    brand == JP2_BRAND && compatible
}
