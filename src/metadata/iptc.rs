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

use std::io::Write;

use log::debug;

use crate::error::{Error, Result};

// IIM tag marker introducing every dataset.
const IIM_MARKER: u8 = 0x1c;

// Datasets longer than this use the extended length form.
const MAX_STANDARD_LEN: usize = 0x7fff;

/// One IIM dataset: record number, dataset number, raw value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IptcDataset {
    pub record: u8,
    pub dataset: u8,
    pub data: Vec<u8>,
}

/// Carrier for an IPTC IIM payload: an ordered collection of datasets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IptcData {
    datasets: Vec<IptcDataset>,
}

impl IptcData {
    /// Parse an IIM byte sequence.
    ///
    /// Each dataset is `0x1C record dataset length data`. When the most
    /// significant bit of the length is set, the low 15 bits give the size
    /// of an extended big-endian length field. Up to four trailing bytes
    /// that cannot hold another dataset are tolerated; anything else that
    /// does not start with the tag marker is an error. The previous
    /// contents are replaced only on success.
    pub fn decode(&mut self, buf: &[u8]) -> Result<()> {
        let mut datasets = Vec::new();
        let mut pos = 0usize;

        while pos + 4 < buf.len() {
            if buf[pos] != IIM_MARKER {
                return Err(Error::CorruptedMetadata);
            }
            let record = buf[pos + 1];
            let dataset = buf[pos + 2];

            let size_field = u16::from_be_bytes([buf[pos + 3], buf[pos + 4]]);
            pos += 5;

            let data_len = if size_field & 0x8000 != 0 {
                // extended dataset
                let size_of_size = (size_field & 0x7fff) as usize;
                if size_of_size > 4 || pos + size_of_size > buf.len() {
                    return Err(Error::CorruptedMetadata);
                }
                let mut len = 0usize;
                for &b in &buf[pos..pos + size_of_size] {
                    len = (len << 8) + b as usize;
                }
                pos += size_of_size;
                len
            } else {
                size_field as usize
            };

            let end = pos.checked_add(data_len).ok_or(Error::CorruptedMetadata)?;
            if end > buf.len() {
                return Err(Error::CorruptedMetadata);
            }

            datasets.push(IptcDataset {
                record,
                dataset,
                data: buf[pos..end].to_vec(),
            });
            pos = end;
        }

        if pos < buf.len() {
            debug!("ignoring {} trailing bytes after last IIM dataset", buf.len() - pos);
        }

        self.datasets = datasets;
        Ok(())
    }

    /// Serialize back to an IIM byte sequence.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();

        for ds in &self.datasets {
            out.push(IIM_MARKER);
            out.push(ds.record);
            out.push(ds.dataset);
            if ds.data.len() > MAX_STANDARD_LEN {
                // extended length: size-of-size with the high bit, then u32
                out.extend_from_slice(&0x8004u16.to_be_bytes());
                out.extend_from_slice(&(ds.data.len() as u32).to_be_bytes());
            } else {
                out.extend_from_slice(&(ds.data.len() as u16).to_be_bytes());
            }
            out.extend_from_slice(&ds.data);
        }

        out
    }

    pub fn push(&mut self, record: u8, dataset: u8, data: impl Into<Vec<u8>>) {
        self.datasets.push(IptcDataset {
            record,
            dataset,
            data: data.into(),
        });
    }

    pub fn datasets(&self) -> &[IptcDataset] {
        &self.datasets
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn clear(&mut self) {
        self.datasets.clear();
    }

    /// One row per dataset, for the recursive structure printer.
    pub(crate) fn print_structure(&self, out: &mut dyn Write, depth: usize) -> std::io::Result<()> {
        let indent = "  ".repeat(depth + 1);
        for ds in &self.datasets {
            writeln!(
                out,
                "{}Record | DataSet | Length  : {:3} | {:3} | {:6}",
                indent,
                ds.record,
                ds.dataset,
                ds.data.len()
            )?;
        }
        Ok(())
    }
}
