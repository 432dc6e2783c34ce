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

#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]

//! This library reads and rewrites the embedded metadata of JPEG-2000 (JP2)
//! images: Exif, IPTC and XMP payloads carried in UUID boxes, and the ICC
//! colour profile carried in the JP2 Header's Colour Specification box. The
//! codestream itself is never decoded; rewriting preserves every box the
//! model does not own.
//!
//! # Example: reading metadata
//!
//! ```no_run
//! # use jp2meta::Result;
//! use jp2meta::Jp2Image;
//!
//! # fn main() -> Result<()> {
//! let image = Jp2Image::from_file("tests/fixtures/sample.jp2")?;
//! println!("{} x {}", image.pixel_width(), image.pixel_height());
//!
//! if let Some(icc) = image.icc_profile() {
//!     println!("ICC profile: {} bytes", icc.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Example: updating metadata in place
//!
//! ```no_run
//! # use jp2meta::Result;
//! use jp2meta::Jp2Image;
//!
//! # fn main() -> Result<()> {
//! let mut image = Jp2Image::from_file("tests/fixtures/sample.jp2")?;
//! image.iptc_mut().push(2, 5, b"Dublin".to_vec());
//! image.xmp_mut().set_packet("<?xpacket begin=\"\"?><x:xmpmeta xmlns:x=\"adobe:ns:meta/\"/><?xpacket end=\"w\"?>");
//! image.save_file("tests/fixtures/sample.jp2")?;
//! # Ok(())
//! # }
//! ```

pub mod asset_io;
mod boxes;
pub mod error;
mod jp2;
pub mod metadata;
mod utils;

pub use error::{Error, Result};
pub use jp2::{is_jp2, Jp2Image, PrintStructureOption};
pub use metadata::{ByteOrder, ExifData, IptcData, IptcDataset, XmpData};
