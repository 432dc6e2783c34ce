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

use thiserror::Error;

/// `Error` enumerates errors returned by most JP2 metadata operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The data source could not be opened.
    #[error("could not open data source: {0}")]
    DataSourceOpenFailed(String),

    /// The stream handed to the reader is not a JP2 image.
    #[error("data source is not a JPEG-2000 image")]
    NotAnImage,

    /// A box length, box ordering, or sub-box invariant was violated.
    #[error("corrupted JP2 metadata")]
    CorruptedMetadata,

    /// The data source reported an error while reading image data.
    #[error("failed to read image data")]
    FailedToReadImageData,

    /// The data source returned fewer bytes than a box header promised.
    #[error("input data read failed")]
    InputDataReadFailed,

    /// The output stream rejected a write.
    #[error("image write failed")]
    ImageWriteFailed,

    /// The input stream handed to the rewriter is not a JP2 image.
    #[error("no JP2 image found in input data")]
    NoImageInInputData,

    /// The stream handed to the structure printer is not a JP2 image.
    #[error("structure printing requires a JP2 stream")]
    NotAJpeg,

    /// The requested setting is not supported for JP2 images.
    #[error("invalid setting for a JP2 image: {0}")]
    InvalidSettingForImage(&'static str),

    #[error("insufficient memory space for operation")]
    InsufficientMemory,

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Stable ordinal for each surfaced failure kind.
    ///
    /// Helper variants that never cross the public API on their own map to
    /// the nearest surfaced code.
    pub fn code(&self) -> u32 {
        match self {
            Self::DataSourceOpenFailed(_) => 11,
            Self::NotAnImage => 12,
            Self::CorruptedMetadata | Self::InsufficientMemory => 14,
            Self::NotAJpeg => 15,
            Self::FailedToReadImageData | Self::IoError(_) => 20,
            Self::InputDataReadFailed => 21,
            Self::ImageWriteFailed => 22,
            Self::NoImageInInputData => 24,
            Self::InvalidSettingForImage(_) => 32,
        }
    }
}

/// A specialized `Result` type for JP2 metadata operations.
pub type Result<T> = std::result::Result<T, Error>;
