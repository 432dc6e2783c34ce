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

//! Metadata payload carriers.
//!
//! These types own the byte-level framing of the three UUID payload formats.
//! Tag-level interpretation (the full TIFF tag table, the IPTC dictionary,
//! the XMP data model) lives behind these seams: each carrier accepts and
//! produces the byte buffer the corresponding external codec would consume.

pub mod exif;
pub mod iptc;
pub mod xmp;

pub use exif::ExifData;
pub use iptc::{IptcData, IptcDataset};
pub use xmp::XmpData;

/// TIFF byte order recovered from an Exif payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}
