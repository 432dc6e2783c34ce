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

use std::{
    io::{Read, Seek, Write},
    path::Path,
};

use tempfile::NamedTempFile;

use crate::error::Result;

/// Positioned read access to an asset.
pub trait AssetRead: Read + Seek {}

impl AssetRead for std::fs::File {}
impl AssetRead for std::io::Cursor<&[u8]> {}
impl AssetRead for std::io::Cursor<&mut [u8]> {}
impl AssetRead for std::io::Cursor<Vec<u8>> {}

/// Positioned read/write access to an asset.
pub trait AssetReadWrite: AssetRead + Write {}

impl AssetReadWrite for std::fs::File {}
impl AssetReadWrite for std::io::Cursor<&mut [u8]> {}
impl AssetReadWrite for std::io::Cursor<Vec<u8>> {}

// Replace the destination with a finished temp file. Falls back to a copy
// when the temp dir and the destination are on different filesystems.
pub(crate) fn rename_or_move<P: AsRef<Path>>(temp: NamedTempFile, dest: P) -> Result<()> {
    match temp.persist(dest.as_ref()) {
        Ok(_) => Ok(()),
        Err(e) => {
            std::fs::copy(e.file.path(), dest.as_ref())?;
            Ok(())
        }
    }
}
