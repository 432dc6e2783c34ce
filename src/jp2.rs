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

//! JP2 container engine.
//!
//! [`Jp2Image`] walks the JP2 box tree to populate its metadata model, and
//! rewrites a JP2 stream from that model: unmodified boxes are copied
//! verbatim, the JP2 Header is re-encoded (with any ICC profile spliced into
//! its `colr` sub-box), stale metadata UUID boxes are stripped, and fresh
//! Exif/IPTC/XMP UUID boxes are emitted immediately after the header. The
//! codestream is never decoded.

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

use log::{debug, warn};

use crate::{
    asset_io::{rename_or_move, AssetRead, AssetReadWrite},
    boxes::{
        is_valid_file_type_box, BoxHeader, BoxType, EXIF_UUID, HEADER_SIZE, IPTC_UUID,
        JP2_SIGNATURE, UUID_SIZE, XMP_UUID,
    },
    error::{Error, Result},
    metadata::{ByteOrder, ExifData, IptcData, XmpData},
    utils::io_utils::{safe_vec, stream_len, tempfile_builder},
};

// Ceiling on the number of boxes visited in one walk, to bound pathological
// nesting.
const MAX_BOXES: usize = 1000;

// Non-standard preamble some writers put in front of the TIFF header.
const EXIF_PREAMBLE: [u8; 6] = [0x45, 0x78, 0x69, 0x66, 0x00, 0x00];

// Payload of the `colr` sub-box written when no ICC profile is defined:
// enumerated colourspace, method 1, sRGB, with the trailing bytes the
// original encoder always emitted after the colourspace.
const COLR_PLACEHOLDER: [u8; 15] = [
    0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x05, 0x1c, 0x75, 0x75, 0x69, 0x64,
];

// method (restricted ICC), precedence, approximation
const COLR_ICC_PREFIX: [u8; 3] = [0x02, 0x00, 0x00];

/// A minimal valid JP2 file: signature, `ftyp`, `jp2h` for a 1x1 greyscale
/// image, and a trivial codestream. Written verbatim by [`Jp2Image::create`].
pub(crate) const BLANK_JP2: [u8; 249] = [
    0x00, 0x00, 0x00, 0x0c, 0x6a, 0x50, 0x20, 0x20, 0x0d, 0x0a, 0x87, 0x0a,
    0x00, 0x00, 0x00, 0x14, 0x66, 0x74, 0x79, 0x70, 0x6a, 0x70, 0x32, 0x20,
    0x00, 0x00, 0x00, 0x00, 0x6a, 0x70, 0x32, 0x20, 0x00, 0x00, 0x00, 0x2d,
    0x6a, 0x70, 0x32, 0x68, 0x00, 0x00, 0x00, 0x16, 0x69, 0x68, 0x64, 0x72,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x07, 0x07,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x0f, 0x63, 0x6f, 0x6c, 0x72, 0x01, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x11, 0x00, 0x00, 0x00, 0x00, 0x6a, 0x70, 0x32,
    0x63, 0xff, 0x4f, 0xff, 0x51, 0x00, 0x29, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x07, 0x01, 0x01, 0xff, 0x64,
    0x00, 0x23, 0x00, 0x01, 0x43, 0x72, 0x65, 0x61, 0x74, 0x6f, 0x72, 0x3a,
    0x20, 0x4a, 0x61, 0x73, 0x50, 0x65, 0x72, 0x20, 0x56, 0x65, 0x72, 0x73,
    0x69, 0x6f, 0x6e, 0x20, 0x31, 0x2e, 0x39, 0x30, 0x30, 0x2e, 0x31, 0xff,
    0x52, 0x00, 0x0c, 0x00, 0x00, 0x00, 0x01, 0x00, 0x05, 0x04, 0x04, 0x00,
    0x01, 0xff, 0x5c, 0x00, 0x13, 0x40, 0x40, 0x48, 0x48, 0x50, 0x48, 0x48,
    0x50, 0x48, 0x48, 0x50, 0x48, 0x48, 0x50, 0x48, 0x48, 0x50, 0xff, 0x90,
    0x00, 0x0a, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2d, 0x00, 0x01, 0xff, 0x5d,
    0x00, 0x14, 0x00, 0x40, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x93, 0xcf, 0xb4,
    0x04, 0x00, 0x80, 0x80, 0x80, 0x80, 0x80, 0xff, 0xd9,
];

/// What [`Jp2Image::print_structure`] emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrintStructureOption {
    /// One line per outer box.
    Basic,
    /// Also descend into the JP2 Header and into Exif/IPTC payloads.
    Recursive,
    /// Stream the raw ICC profile bytes to the output.
    IccProfile,
    /// Stream the raw XMP packet bytes to the output.
    Xmp,
    /// Walk the structure without output, validating it for an IPTC erase.
    IptcErase,
}

/// Sniff the JP2 signature at the current stream position.
///
/// The position is restored unless `advance` is true and the signature
/// matched. A read error or EOF yields `false` with the position wherever
/// the failed read left it.
pub fn is_jp2(reader: &mut dyn AssetRead, advance: bool) -> bool {
    sniff_signature(reader, advance).unwrap_or(false)
}

fn sniff_signature(reader: &mut dyn AssetRead, advance: bool) -> std::io::Result<bool> {
    let mut buf = [0u8; 12];
    reader.read_exact(&mut buf)?;

    let matched = buf == JP2_SIGNATURE;
    if !advance || !matched {
        reader.seek(SeekFrom::Current(-12))?;
    }

    Ok(matched)
}

// Read exactly `len` payload bytes, with the allocation bounded up front.
fn read_payload(reader: &mut dyn AssetRead, len: u64) -> Result<Vec<u8>> {
    let mut buf = safe_vec(len, Some(0u8))?;
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(buf),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(Error::InputDataReadFailed),
        Err(_) => Err(Error::FailedToReadImageData),
    }
}

// Frame a payload as `length | "uuid" | UUID | payload`.
fn write_uuid_box(output: &mut dyn Write, uuid: &[u8; 16], payload: &[u8]) -> Result<()> {
    let total = (HEADER_SIZE + UUID_SIZE)
        .checked_add(payload.len() as u64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or(Error::CorruptedMetadata)?;

    let mut boxed: Vec<u8> = Vec::with_capacity(total as usize);
    BoxHeader::new(total, BoxType::Uuid).write(&mut boxed)?;
    boxed.extend_from_slice(uuid);
    boxed.extend_from_slice(payload);

    output.write_all(&boxed).map_err(|_| Error::ImageWriteFailed)
}

// Printable ASCII preview of a payload, one '.' per binary byte.
fn binary_to_string(data: &[u8]) -> String {
    data.iter()
        .map(|&b| {
            if (0x20..=0x7e).contains(&b) {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}

/// In-memory model of a JP2 file's metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct Jp2Image {
    pixel_width: u32,
    pixel_height: u32,
    exif: ExifData,
    iptc: IptcData,
    xmp: XmpData,
    icc_profile: Option<Vec<u8>>,
    byte_order: Option<ByteOrder>,
    box_limit: usize,
}

impl Default for Jp2Image {
    fn default() -> Self {
        Self {
            pixel_width: 0,
            pixel_height: 0,
            exif: ExifData::default(),
            iptc: IptcData::default(),
            xmp: XmpData::default(),
            icc_profile: None,
            byte_order: None,
            box_limit: MAX_BOXES,
        }
    }
}

impl Jp2Image {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the ceiling on boxes visited per walk.
    pub fn with_box_limit(mut self, box_limit: usize) -> Self {
        self.box_limit = box_limit;
        self
    }

    /// Write the blank template to a fresh backing store and return an empty
    /// model for it.
    pub fn create(output: &mut dyn AssetReadWrite) -> Result<Self> {
        output
            .write_all(&BLANK_JP2)
            .map_err(|_| Error::ImageWriteFailed)?;
        Ok(Self::new())
    }

    /// Create a new blank JP2 file at `path`.
    pub fn create_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file =
            File::create(path.as_ref()).map_err(|e| Error::DataSourceOpenFailed(e.to_string()))?;
        Self::create(&mut file)
    }

    /// Read the metadata model out of a JP2 stream.
    pub fn from_stream(reader: &mut dyn AssetRead) -> Result<Self> {
        let mut image = Self::new();
        image.read_metadata(reader)?;
        Ok(image)
    }

    /// Read the metadata model out of a JP2 file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file =
            File::open(path.as_ref()).map_err(|e| Error::DataSourceOpenFailed(e.to_string()))?;
        Self::from_stream(&mut file)
    }

    pub fn pixel_width(&self) -> u32 {
        self.pixel_width
    }

    pub fn pixel_height(&self) -> u32 {
        self.pixel_height
    }

    /// Byte order recovered from the last Exif payload read.
    pub fn byte_order(&self) -> Option<ByteOrder> {
        self.byte_order
    }

    pub fn exif(&self) -> &ExifData {
        &self.exif
    }

    pub fn exif_mut(&mut self) -> &mut ExifData {
        &mut self.exif
    }

    pub fn iptc(&self) -> &IptcData {
        &self.iptc
    }

    pub fn iptc_mut(&mut self) -> &mut IptcData {
        &mut self.iptc
    }

    pub fn xmp(&self) -> &XmpData {
        &self.xmp
    }

    pub fn xmp_mut(&mut self) -> &mut XmpData {
        &mut self.xmp
    }

    pub fn icc_profile(&self) -> Option<&[u8]> {
        self.icc_profile.as_deref()
    }

    /// Install an ICC profile to be spliced into the `colr` sub-box on the
    /// next write. An empty profile clears the setting.
    pub fn set_icc_profile(&mut self, profile: Vec<u8>) {
        if profile.is_empty() {
            self.icc_profile = None;
        } else {
            self.icc_profile = Some(profile);
        }
    }

    pub fn clear_icc_profile(&mut self) {
        self.icc_profile = None;
    }

    pub fn mime_type(&self) -> &'static str {
        "image/jp2"
    }

    /// JP2 images do not carry a comment.
    pub fn set_comment(&mut self, _comment: &str) -> Result<()> {
        Err(Error::InvalidSettingForImage("image comment"))
    }

    /// Populate the model from `reader`.
    ///
    /// Walks the outer box tree once, forward only. Metadata payloads that
    /// fail to decode are absorbed with a warning; structural violations
    /// abort with [`Error::CorruptedMetadata`].
    pub fn read_metadata(&mut self, reader: &mut dyn AssetRead) -> Result<()> {
        if !is_jp2(reader, false) {
            return Err(Error::NotAnImage);
        }

        let size = stream_len(reader).map_err(|_| Error::FailedToReadImageData)?;

        let mut boxes = 0usize;
        let mut last_box_type: Option<BoxType> = None;
        let mut signature_found = false;
        let mut file_type_found = false;

        loop {
            let mut header_buf = [0u8; 8];
            match reader.read_exact(&mut header_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(_) => return Err(Error::FailedToReadImageData),
            }

            boxes += 1;
            if boxes > self.box_limit {
                return Err(Error::CorruptedMetadata);
            }

            let position = reader
                .stream_position()
                .map_err(|_| Error::FailedToReadImageData)?;
            let header = BoxHeader::decode(&header_buf)?;
            let length = header.length as u64;
            debug!(
                "position: {position} box type: {} length: {length}",
                header.fourcc()
            );

            if length > HEADER_SIZE + (size - position) {
                return Err(Error::CorruptedMetadata);
            }
            if length == 0 {
                // tail box extends to the end of the file
                return Ok(());
            }
            if length == 1 {
                // XLBox form is not supported
                return Err(Error::CorruptedMetadata);
            }
            if length < HEADER_SIZE {
                return Err(Error::CorruptedMetadata);
            }

            match header.box_type {
                BoxType::Signature => {
                    // only one is allowed
                    if signature_found {
                        return Err(Error::CorruptedMetadata);
                    }
                    signature_found = true;
                }
                BoxType::FileType => {
                    // this box shall immediately follow the JPEG 2000
                    // Signature box
                    if file_type_found || last_box_type != Some(BoxType::Signature) {
                        return Err(Error::CorruptedMetadata);
                    }
                    file_type_found = true;
                    let data = read_payload(reader, length - HEADER_SIZE)?;
                    if !is_valid_file_type_box(&data) {
                        return Err(Error::CorruptedMetadata);
                    }
                }
                BoxType::Jp2Header => {
                    let box_end = position - HEADER_SIZE + length;
                    self.read_header_sub_boxes(reader, box_end, &mut boxes)?;
                }
                BoxType::Uuid => {
                    self.read_uuid_box(reader, length)?;
                }
                _ => {}
            }
            last_box_type = Some(header.box_type);

            // move to the next box
            reader
                .seek(SeekFrom::Start(position - HEADER_SIZE + length))
                .map_err(|_| Error::FailedToReadImageData)?;
        }

        Ok(())
    }

    // Walk the children of a JP2 Header box up to `box_end`.
    fn read_header_sub_boxes(
        &mut self,
        reader: &mut dyn AssetRead,
        box_end: u64,
        boxes: &mut usize,
    ) -> Result<()> {
        let mut colr_found = false;

        loop {
            let sub_start = reader
                .stream_position()
                .map_err(|_| Error::FailedToReadImageData)?;
            if sub_start + HEADER_SIZE > box_end {
                break;
            }

            let mut header_buf = [0u8; 8];
            match reader.read_exact(&mut header_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(_) => return Err(Error::FailedToReadImageData),
            }

            *boxes += 1;
            if *boxes > self.box_limit {
                return Err(Error::CorruptedMetadata);
            }

            let sub = BoxHeader::decode(&header_buf)?;
            let sub_len = sub.length as u64;
            debug!("subbox: {} length: {sub_len}", sub.fourcc());

            if sub_len == 0 {
                break;
            }
            if sub_len < HEADER_SIZE || sub_start + sub_len > box_end {
                return Err(Error::CorruptedMetadata);
            }

            let payload = read_payload(reader, sub_len - HEADER_SIZE)?;

            match sub.box_type {
                BoxType::ImageHeader => {
                    if sub.length != 22 {
                        return Err(Error::CorruptedMetadata);
                    }
                    // height(4) width(4) nc(2) bpc(1) C(1) UnkC(1) IPR(1)
                    let height = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                    let width = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
                    let compression_type = payload[11];
                    let unk_c = payload[12];
                    let ipr = payload[13];
                    if compression_type != 7 || unk_c > 1 || ipr > 1 {
                        return Err(Error::CorruptedMetadata);
                    }
                    self.pixel_height = height;
                    self.pixel_width = width;
                }
                BoxType::ColorSpec if !colr_found => {
                    // a conforming reader ignores every Colour Specification
                    // box after the first
                    colr_found = true;
                    if payload.is_empty() {
                        return Err(Error::CorruptedMetadata);
                    }
                    match payload[0] {
                        1 => {
                            // enumerated colourspace
                            if payload.len() < 7 {
                                return Err(Error::CorruptedMetadata);
                            }
                            let enum_cs =
                                u32::from_be_bytes([payload[3], payload[4], payload[5], payload[6]]);
                            if enum_cs != 16 && enum_cs != 17 {
                                return Err(Error::CorruptedMetadata);
                            }
                        }
                        2 => {
                            // restricted ICC profile after method, precedence
                            // and approximation; its size comes from the
                            // sub-box bounds, never from the profile header
                            if payload.len() < 3 {
                                return Err(Error::CorruptedMetadata);
                            }
                            let icc = &payload[3..];
                            if !icc.is_empty() {
                                self.icc_profile = Some(icc.to_vec());
                            }
                        }
                        method => {
                            debug!("skipping colr sub-box with method {method}");
                        }
                    }
                }
                _ => {}
            }

            // guarantee forward progress even when the dispatcher consumed a
            // different amount than the sub-box declared
            reader
                .seek(SeekFrom::Start(sub_start + sub_len))
                .map_err(|_| Error::CorruptedMetadata)?;
        }

        Ok(())
    }

    // Dispatch the payload of a `uuid` box into the model.
    fn read_uuid_box(&mut self, reader: &mut dyn AssetRead, box_length: u64) -> Result<()> {
        let mut uuid = [0u8; 16];
        if reader.read_exact(&mut uuid).is_err() {
            return Ok(());
        }

        let is_exif = uuid == EXIF_UUID;
        let is_iptc = uuid == IPTC_UUID;
        let is_xmp = uuid == XMP_UUID;
        if !(is_exif || is_iptc || is_xmp) {
            // unknown UUID payloads are preserved by the writer, untouched
            return Ok(());
        }

        if box_length < HEADER_SIZE + UUID_SIZE {
            return Err(Error::CorruptedMetadata);
        }
        let payload = read_payload(reader, box_length - HEADER_SIZE - UUID_SIZE)?;

        if is_exif {
            if payload.len() > 8 {
                // find the TIFF header
                let mut pos = if payload[0] == payload[1]
                    && (payload[0] == b'I' || payload[0] == b'M')
                {
                    Some(0)
                } else {
                    None
                };

                if pos.is_none() {
                    // forgive an Exif\0\0 preamble in front of the header
                    for i in 0..payload.len().saturating_sub(EXIF_PREAMBLE.len()) {
                        if payload[i..i + EXIF_PREAMBLE.len()] == EXIF_PREAMBLE {
                            pos = Some(i + EXIF_PREAMBLE.len());
                            warn!("reading non-standard UUID-EXIF_bad box");
                            break;
                        }
                    }
                }

                if let Some(pos) = pos {
                    debug!("Exif header found at position {pos}");
                    match self.exif.decode(&payload[pos..]) {
                        Ok(byte_order) => self.byte_order = Some(byte_order),
                        Err(_) => {
                            warn!("failed to decode Exif metadata");
                            self.exif.clear();
                        }
                    }
                }
            } else {
                warn!("failed to decode Exif metadata");
                self.exif.clear();
            }
        }

        if is_iptc && self.iptc.decode(&payload).is_err() {
            warn!("failed to decode IPTC metadata");
            self.iptc.clear();
        }

        if is_xmp {
            let mut packet = String::from_utf8_lossy(&payload).into_owned();
            if let Some(idx) = packet.find('<') {
                if idx > 0 {
                    warn!("removing {idx} characters from the beginning of the XMP packet");
                    packet = packet.split_off(idx);
                }
            }
            if !packet.is_empty() && self.xmp.decode(&packet).is_err() {
                // the raw packet is retained by the carrier
                warn!("failed to decode XMP metadata");
            }
        }

        Ok(())
    }

    // Re-encode a JP2 Header box: sub-boxes are copied verbatim up to the
    // first `colr`, which is replaced by either the enumerated placeholder
    // or the current ICC profile. Sub-boxes after `colr` are dropped.
    fn encode_jp2_header(&self, box_buf: &[u8]) -> Result<Vec<u8>> {
        let header = BoxHeader::decode(box_buf)?;
        let length = header.length as usize;
        if length > box_buf.len() {
            return Err(Error::CorruptedMetadata);
        }

        let icc_len = self.icc_profile.as_ref().map_or(0, Vec::len);
        let mut output: Vec<u8> = Vec::with_capacity(box_buf.len() + icc_len + 100);
        output.extend_from_slice(&[0u8; 8]); // outer header, rewritten below

        let mut count = HEADER_SIZE as usize;
        let mut wrote_color = false;

        while count < length && !wrote_color {
            if length - count < HEADER_SIZE as usize {
                return Err(Error::CorruptedMetadata);
            }
            let sub = BoxHeader::decode(&box_buf[count..])?;
            let sub_len = sub.length as usize;
            debug!("encode_jp2_header subbox: {} length: {sub_len}", sub.fourcc());
            if sub_len < HEADER_SIZE as usize || sub_len > length - count {
                return Err(Error::CorruptedMetadata);
            }

            if sub.box_type == BoxType::ColorSpec {
                wrote_color = true;
                match &self.icc_profile {
                    None => {
                        let new_len = HEADER_SIZE as u32 + COLR_PLACEHOLDER.len() as u32;
                        BoxHeader::new(new_len, BoxType::ColorSpec).write(&mut output)?;
                        output.extend_from_slice(&COLR_PLACEHOLDER);
                    }
                    Some(icc) => {
                        let new_len = (HEADER_SIZE + COLR_ICC_PREFIX.len() as u64)
                            .checked_add(icc.len() as u64)
                            .and_then(|n| u32::try_from(n).ok())
                            .ok_or(Error::CorruptedMetadata)?;
                        BoxHeader::new(new_len, BoxType::ColorSpec).write(&mut output)?;
                        output.extend_from_slice(&COLR_ICC_PREFIX);
                        output.extend_from_slice(icc);
                    }
                }
            } else {
                output.extend_from_slice(&box_buf[count..count + sub_len]);
            }

            count += sub_len;
        }

        let total = u32::try_from(output.len()).map_err(|_| Error::CorruptedMetadata)?;
        let outer = BoxHeader::new(total, BoxType::Jp2Header);
        let mut outer_buf = Vec::with_capacity(HEADER_SIZE as usize);
        outer.write(&mut outer_buf)?;
        output[..HEADER_SIZE as usize].copy_from_slice(&outer_buf);

        Ok(output)
    }

    /// Rewrite `input` to `output` with the current metadata model.
    ///
    /// Boxes are emitted in on-disk order: the JP2 Header is re-encoded,
    /// fresh Exif, IPTC and XMP UUID boxes follow it in that order, any
    /// pre-existing metadata UUID boxes are elided, and everything else is
    /// copied verbatim.
    pub fn write_metadata(
        &self,
        input: &mut dyn AssetRead,
        output: &mut dyn AssetReadWrite,
    ) -> Result<()> {
        match sniff_signature(input, true) {
            Ok(true) => {}
            Ok(false) => return Err(Error::NoImageInInputData),
            Err(_) => return Err(Error::InputDataReadFailed),
        }

        // write the JPEG2000 signature
        output
            .write_all(&JP2_SIGNATURE)
            .map_err(|_| Error::ImageWriteFailed)?;

        let size = stream_len(input).map_err(|_| Error::FailedToReadImageData)?;

        while input
            .stream_position()
            .map_err(|_| Error::FailedToReadImageData)?
            < size
        {
            let mut header_buf = [0u8; 8];
            match input.read_exact(&mut header_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Err(Error::InputDataReadFailed)
                }
                Err(_) => return Err(Error::FailedToReadImageData),
            }

            let position = input
                .stream_position()
                .map_err(|_| Error::FailedToReadImageData)?;
            let header = BoxHeader::decode(&header_buf)?;
            let mut length = header.length as u64;
            debug!("write box type: {} length: {length}", header.fourcc());

            if length == 0 {
                // null box size: this is the last box of the file
                length = size - position + HEADER_SIZE;
            }
            if length < HEADER_SIZE {
                // the box is broken, nothing more can be done
                return Err(Error::CorruptedMetadata);
            }

            // prevent a malicious length from driving a huge allocation
            if length - HEADER_SIZE > size - position {
                return Err(Error::CorruptedMetadata);
            }

            // whole box: the header bytes as read, then the payload
            let mut box_buf = Vec::with_capacity(length as usize);
            box_buf.extend_from_slice(&header_buf);
            box_buf.extend_from_slice(&read_payload(input, length - HEADER_SIZE)?);

            match header.box_type {
                BoxType::Jp2Header => {
                    let new_header = self.encode_jp2_header(&box_buf)?;
                    output
                        .write_all(&new_header)
                        .map_err(|_| Error::ImageWriteFailed)?;

                    // all updated metadata goes here, just after the header
                    if !self.exif.is_empty() {
                        let raw_exif = self.exif.encode();
                        if !raw_exif.is_empty() {
                            write_uuid_box(output, &EXIF_UUID, &raw_exif)?;
                        }
                    }

                    if !self.iptc.is_empty() {
                        let raw_iptc = self.iptc.encode();
                        if !raw_iptc.is_empty() {
                            write_uuid_box(output, &IPTC_UUID, &raw_iptc)?;
                        }
                    }

                    let packet = self.xmp.packet();
                    if !packet.is_empty() {
                        write_uuid_box(output, &XMP_UUID, packet.as_bytes())?;
                    }
                }
                BoxType::Uuid => {
                    if box_buf.len() < (HEADER_SIZE + UUID_SIZE) as usize {
                        return Err(Error::CorruptedMetadata);
                    }
                    let uuid = &box_buf[HEADER_SIZE as usize..(HEADER_SIZE + UUID_SIZE) as usize];
                    if uuid == EXIF_UUID || uuid == IPTC_UUID || uuid == XMP_UUID {
                        debug!("stripping old metadata UUID box");
                    } else {
                        output.write_all(&box_buf).map_err(|_| Error::ImageWriteFailed)?;
                    }
                }
                _ => {
                    output.write_all(&box_buf).map_err(|_| Error::ImageWriteFailed)?;
                }
            }
        }

        Ok(())
    }

    /// Rewrite the JP2 file at `path` in place.
    ///
    /// The new stream is assembled in a temporary file and only replaces
    /// `path` after the rewrite has fully succeeded.
    pub fn save_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut input =
            File::open(path.as_ref()).map_err(|e| Error::DataSourceOpenFailed(e.to_string()))?;

        let mut temp = tempfile_builder("jp2meta")?;
        self.write_metadata(&mut input, temp.as_file_mut())?;
        drop(input);

        rename_or_move(temp, path.as_ref())
    }

    /// Report the box structure of `reader` on `out`.
    pub fn print_structure(
        reader: &mut dyn AssetRead,
        out: &mut dyn Write,
        option: PrintStructureOption,
        depth: usize,
    ) -> Result<()> {
        match sniff_signature(reader, false) {
            Ok(true) => {}
            Ok(false) => return Err(Error::NotAJpeg),
            Err(_) => return Err(Error::FailedToReadImageData),
        }

        let b_print = matches!(
            option,
            PrintStructureOption::Basic | PrintStructureOption::Recursive
        );
        let b_recursive = option == PrintStructureOption::Recursive;
        let b_icc = option == PrintStructureOption::IccProfile;
        let b_xmp = option == PrintStructureOption::Xmp;

        if b_print {
            writeln!(out, "STRUCTURE OF JPEG2000 FILE:")?;
            writeln!(out, " address |   length | box       | data")?;
        }

        let size = stream_len(reader).map_err(|_| Error::FailedToReadImageData)?;
        let mut signature_found = false;
        let mut blf = false;

        loop {
            let mut header_buf = [0u8; 8];
            match reader.read_exact(&mut header_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(_) => return Err(Error::FailedToReadImageData),
            }

            let position = reader
                .stream_position()
                .map_err(|_| Error::FailedToReadImageData)?;
            let header = BoxHeader::decode(&header_buf)?;
            let length = header.length as u64;

            if length > HEADER_SIZE + (size - position) {
                return Err(Error::CorruptedMetadata);
            }
            if length == 1 {
                return Err(Error::CorruptedMetadata);
            }

            if b_print {
                write!(
                    out,
                    "{:8} | {:8} | {}      | ",
                    position - HEADER_SIZE,
                    length,
                    header.fourcc()
                )?;
                blf = true;
            }
            if header.box_type == BoxType::Codestream {
                lf(out, &mut blf)?;
                break;
            }
            if length == 0 {
                // tail box: nothing after it to walk
                lf(out, &mut blf)?;
                break;
            }
            if length < HEADER_SIZE {
                return Err(Error::CorruptedMetadata);
            }

            match header.box_type {
                BoxType::Signature => {
                    // only one is allowed
                    if signature_found {
                        return Err(Error::CorruptedMetadata);
                    }
                    signature_found = true;
                }
                BoxType::FileType => {
                    let data = read_payload(reader, length - HEADER_SIZE)?;
                    if !is_valid_file_type_box(&data) {
                        return Err(Error::CorruptedMetadata);
                    }
                }
                BoxType::Jp2Header => {
                    lf(out, &mut blf)?;
                    let box_end = position - HEADER_SIZE + length;
                    print_header_sub_boxes(
                        reader, out, box_end, size, b_print, b_icc, &mut blf,
                    )?;
                }
                BoxType::Uuid => {
                    let mut uuid = [0u8; 16];
                    if reader.read_exact(&mut uuid).is_ok() {
                        let is_exif = uuid == EXIF_UUID;
                        let is_iptc = uuid == IPTC_UUID;
                        let is_xmp = uuid == XMP_UUID;

                        if b_print {
                            if is_exif {
                                write!(out, "Exif: ")?;
                            } else if is_iptc {
                                write!(out, "IPTC: ")?;
                            } else if is_xmp {
                                write!(out, "XMP : ")?;
                            } else {
                                write!(out, "????: ")?;
                            }
                        }

                        if length < HEADER_SIZE + UUID_SIZE {
                            return Err(Error::CorruptedMetadata);
                        }
                        let payload = read_payload(reader, length - HEADER_SIZE - UUID_SIZE)?;

                        if b_print {
                            let preview = &payload[..payload.len().min(40)];
                            write!(out, "{}", binary_to_string(preview))?;
                        }
                        lf(out, &mut blf)?;

                        if is_exif
                            && b_recursive
                            && payload.len() > 8
                            && payload[0] == payload[1]
                            && (payload[0] == b'I' || payload[0] == b'M')
                        {
                            print_tiff_summary(out, &payload, depth)?;
                        }

                        if is_iptc && b_recursive {
                            let mut iptc = IptcData::default();
                            if iptc.decode(&payload).is_ok() {
                                iptc.print_structure(out, depth)?;
                            }
                        }

                        if is_xmp && b_xmp {
                            out.write_all(&payload)?;
                        }
                    }
                }
                _ => {}
            }

            // move to the next box
            reader
                .seek(SeekFrom::Start(position - HEADER_SIZE + length))
                .map_err(|_| Error::FailedToReadImageData)?;
            if b_print {
                lf(out, &mut blf)?;
            }
        }

        Ok(())
    }
}

fn lf(out: &mut dyn Write, blf: &mut bool) -> Result<()> {
    if *blf {
        writeln!(out)?;
        *blf = false;
    }
    Ok(())
}

// One row per JP2 Header sub-box; streams the ICC bytes instead when asked.
fn print_header_sub_boxes(
    reader: &mut dyn AssetRead,
    out: &mut dyn Write,
    box_end: u64,
    stream_size: u64,
    b_print: bool,
    b_icc: bool,
    blf: &mut bool,
) -> Result<()> {
    loop {
        let sub_addr = reader
            .stream_position()
            .map_err(|_| Error::FailedToReadImageData)?;
        if sub_addr + HEADER_SIZE > box_end {
            break;
        }

        let mut header_buf = [0u8; 8];
        match reader.read_exact(&mut header_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(_) => return Err(Error::FailedToReadImageData),
        }

        let sub = BoxHeader::decode(&header_buf)?;
        let sub_len = sub.length as u64;
        let remaining = stream_size - (sub_addr + HEADER_SIZE);
        if sub_len < HEADER_SIZE || sub_len - HEADER_SIZE > remaining {
            return Err(Error::CorruptedMetadata);
        }

        let payload = read_payload(reader, sub_len - HEADER_SIZE)?;

        if b_print {
            let preview = &payload[..payload.len().min(30)];
            write!(
                out,
                "{:8} | {:8} |  sub:{} | {}",
                sub_addr,
                sub_len,
                sub.fourcc(),
                binary_to_string(preview)
            )?;
            *blf = true;
        }

        match sub.box_type {
            BoxType::ImageHeader => {
                if sub.length != 22 {
                    return Err(Error::CorruptedMetadata);
                }
                let compression_type = payload[11];
                let unk_c = payload[12];
                let ipr = payload[13];
                if compression_type != 7 || unk_c > 1 || ipr > 1 {
                    return Err(Error::CorruptedMetadata);
                }
            }
            BoxType::ColorSpec => {
                if payload.is_empty() {
                    return Err(Error::CorruptedMetadata);
                }
                match payload[0] {
                    1 => {
                        // enumerated colourspace
                        if payload.len() < 7 {
                            return Err(Error::CorruptedMetadata);
                        }
                        let enum_cs =
                            u32::from_be_bytes([payload[3], payload[4], payload[5], payload[6]]);
                        if enum_cs != 16 && enum_cs != 17 {
                            return Err(Error::CorruptedMetadata);
                        }
                    }
                    2 => {
                        // restricted ICC profile; same bounds as the read path
                        if payload.len() < 3 {
                            return Err(Error::CorruptedMetadata);
                        }
                        let icc_length = payload.len() - 3;
                        if b_print {
                            write!(out, " | iccLength:{icc_length}")?;
                        }
                        if b_icc {
                            out.write_all(&payload[3..])?;
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }

        lf(out, blf)?;
    }

    Ok(())
}

// Compact rendition of a TIFF header and its first IFD, for the recursive
// structure printer. Bounds violations end the summary rather than fail it.
fn print_tiff_summary(out: &mut dyn Write, payload: &[u8], depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth + 1);
    let little_endian = payload[0] == b'I';

    let read_u16 = |b: &[u8]| -> u16 {
        if little_endian {
            u16::from_le_bytes([b[0], b[1]])
        } else {
            u16::from_be_bytes([b[0], b[1]])
        }
    };
    let read_u32 = |b: &[u8]| -> u32 {
        if little_endian {
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        } else {
            u32::from_be_bytes([b[0], b[1], b[2], b[3]])
        }
    };

    let ifd_offset = read_u32(&payload[4..8]) as usize;
    writeln!(
        out,
        "{indent}TIFF header, {}-endian, IFD0 at offset {ifd_offset}",
        if little_endian { "little" } else { "big" }
    )?;

    if ifd_offset + 2 > payload.len() {
        return Ok(());
    }
    let entries = read_u16(&payload[ifd_offset..]);
    for i in 0..entries as usize {
        let entry = ifd_offset + 2 + i * 12;
        if entry + 12 > payload.len() {
            break;
        }
        let tag = read_u16(&payload[entry..]);
        let field_type = read_u16(&payload[entry + 2..]);
        let count = read_u32(&payload[entry + 4..]);
        writeln!(
            out,
            "{indent}  tag 0x{tag:04x} | type {field_type:2} | count {count}"
        )?;
    }

    Ok(())
}

#[cfg(test)]
pub mod tests {
    #![allow(clippy::unwrap_used)]

    use std::io::Cursor;

    use super::*;

    // II, magic 42, IFD0 at offset 8 with zero entries
    const TIFF_LE: &[u8] = &[
        0x49, 0x49, 0x2a, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];

    const XMP_PACKET: &str = r#"<?xpacket begin="" id="W5M0MpCehiHzreSzNTczkc9d"?><x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"><rdf:Description rdf:about=""> </rdf:Description></rdf:RDF></x:xmpmeta><?xpacket end="w"?>"#;

    fn boxed(fourcc: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&(payload.len() as u32 + 8).to_be_bytes());
        b.extend_from_slice(fourcc);
        b.extend_from_slice(payload);
        b
    }

    fn uuid_boxed(uuid: &[u8; 16], payload: &[u8]) -> Vec<u8> {
        let mut inner = uuid.to_vec();
        inner.extend_from_slice(payload);
        boxed(b"uuid", &inner)
    }

    fn ftyp() -> Vec<u8> {
        boxed(b"ftyp", b"jp2 \x00\x00\x00\x00jp2 ")
    }

    fn ihdr(width: u32, height: u32) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&height.to_be_bytes());
        p.extend_from_slice(&width.to_be_bytes());
        p.extend_from_slice(&1u16.to_be_bytes()); // component count
        p.push(7); // bits per component
        p.push(7); // compression type
        p.push(0); // UnkC
        p.push(0); // IPR
        boxed(b"ihdr", &p)
    }

    fn colr_enumerated() -> Vec<u8> {
        boxed(b"colr", &[0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10])
    }

    fn colr_icc(icc: &[u8]) -> Vec<u8> {
        let mut p = vec![0x02, 0x00, 0x00];
        p.extend_from_slice(icc);
        boxed(b"colr", &p)
    }

    fn jp2h(sub_boxes: &[Vec<u8>]) -> Vec<u8> {
        boxed(b"jp2h", &sub_boxes.concat())
    }

    fn minimal_jp2(extra_boxes: &[Vec<u8>]) -> Vec<u8> {
        let mut f = JP2_SIGNATURE.to_vec();
        f.extend_from_slice(&ftyp());
        f.extend_from_slice(&jp2h(&[ihdr(640, 480), colr_enumerated()]));
        for b in extra_boxes {
            f.extend_from_slice(b);
        }
        f.extend_from_slice(&boxed(b"jp2c", &[0xff, 0x4f, 0xff, 0xd9]));
        f
    }

    fn box_types_of(data: &[u8]) -> Vec<String> {
        let mut types = Vec::new();
        let mut pos = 0usize;
        while pos + 8 <= data.len() {
            let header = BoxHeader::decode(&data[pos..]).unwrap();
            types.push(header.fourcc());
            if header.length == 0 {
                break;
            }
            pos += header.length as usize;
        }
        types
    }

    #[test]
    fn test_blank_template_layout() {
        assert_eq!(BLANK_JP2.len(), 249);
        assert_eq!(BLANK_JP2[..12], JP2_SIGNATURE);
        assert_eq!(
            box_types_of(&BLANK_JP2[12..]),
            vec!["ftyp", "jp2h", "jp2c"]
        );
    }

    #[test]
    fn test_create_writes_blank_template() {
        let mut stream = Cursor::new(Vec::new());
        Jp2Image::create(&mut stream).unwrap();

        assert_eq!(stream.get_ref().as_slice(), BLANK_JP2);

        stream.rewind().unwrap();
        let image = Jp2Image::from_stream(&mut stream).unwrap();
        assert_eq!(image.pixel_width(), 1);
        assert_eq!(image.pixel_height(), 1);
        assert!(image.exif().is_empty());
        assert!(image.iptc().is_empty());
        assert!(image.xmp().is_empty());
        assert!(image.icc_profile().is_none());
    }

    #[test]
    fn test_is_jp2_restores_position_without_advance() {
        let mut stream = Cursor::new(minimal_jp2(&[]));

        assert!(is_jp2(&mut stream, false));
        assert_eq!(stream.stream_position().unwrap(), 0);

        assert!(is_jp2(&mut stream, true));
        assert_eq!(stream.stream_position().unwrap(), 12);
    }

    #[test]
    fn test_is_jp2_rejects_other_data() {
        let mut stream = Cursor::new(b"GIF89a, definitely not a jp2".to_vec());
        assert!(!is_jp2(&mut stream, false));
        assert_eq!(stream.stream_position().unwrap(), 0);

        // too short to hold a signature
        let mut stream = Cursor::new(b"jP".to_vec());
        assert!(!is_jp2(&mut stream, false));
    }

    #[test]
    fn test_read_minimal_file() {
        let mut stream = Cursor::new(minimal_jp2(&[]));
        let image = Jp2Image::from_stream(&mut stream).unwrap();

        assert_eq!(image.pixel_width(), 640);
        assert_eq!(image.pixel_height(), 480);
        assert_eq!(image.mime_type(), "image/jp2");
    }

    #[test]
    fn test_read_rejects_non_jp2() {
        let mut stream = Cursor::new(b"not an image at all, sorry".to_vec());

        assert!(matches!(
            Jp2Image::from_stream(&mut stream),
            Err(Error::NotAnImage)
        ));
    }

    #[test]
    fn test_duplicate_signature_rejected() {
        let mut f = JP2_SIGNATURE.to_vec();
        f.extend_from_slice(&ftyp());
        f.extend_from_slice(&JP2_SIGNATURE); // second signature box
        f.extend_from_slice(&boxed(b"jp2c", &[0xff, 0x4f]));

        let mut stream = Cursor::new(f);
        assert!(matches!(
            Jp2Image::from_stream(&mut stream),
            Err(Error::CorruptedMetadata)
        ));
    }

    #[test]
    fn test_file_type_must_follow_signature() {
        let mut f = JP2_SIGNATURE.to_vec();
        f.extend_from_slice(&boxed(b"free", b"xx"));
        f.extend_from_slice(&ftyp());

        let mut stream = Cursor::new(f);
        assert!(matches!(
            Jp2Image::from_stream(&mut stream),
            Err(Error::CorruptedMetadata)
        ));
    }

    #[test]
    fn test_file_type_with_wrong_brand_rejected() {
        let mut f = JP2_SIGNATURE.to_vec();
        f.extend_from_slice(&boxed(b"ftyp", b"mif1\x00\x00\x00\x00mif1"));

        let mut stream = Cursor::new(f);
        assert!(matches!(
            Jp2Image::from_stream(&mut stream),
            Err(Error::CorruptedMetadata)
        ));
    }

    #[test]
    fn test_lying_box_length_rejected() {
        let mut f = JP2_SIGNATURE.to_vec();
        f.extend_from_slice(&ftyp());
        // jp2h claiming far more bytes than remain in the stream
        f.extend_from_slice(&0x1000u32.to_be_bytes());
        f.extend_from_slice(b"jp2h");
        f.extend_from_slice(&[0u8; 16]);

        let mut stream = Cursor::new(f);
        assert!(matches!(
            Jp2Image::from_stream(&mut stream),
            Err(Error::CorruptedMetadata)
        ));
    }

    #[test]
    fn test_xlbox_rejected() {
        let mut f = JP2_SIGNATURE.to_vec();
        f.extend_from_slice(&ftyp());
        // length 1 announces the 64-bit XLBox form
        f.extend_from_slice(&1u32.to_be_bytes());
        f.extend_from_slice(b"jp2c");
        f.extend_from_slice(&[0u8; 32]);

        let mut stream = Cursor::new(f);
        assert!(matches!(
            Jp2Image::from_stream(&mut stream),
            Err(Error::CorruptedMetadata)
        ));
    }

    #[test]
    fn test_bad_compression_type_rejected() {
        let mut bad_ihdr = ihdr(8, 8);
        bad_ihdr[8 + 11] = 8; // compression type must be 7

        let mut f = JP2_SIGNATURE.to_vec();
        f.extend_from_slice(&ftyp());
        f.extend_from_slice(&jp2h(&[bad_ihdr, colr_enumerated()]));
        f.extend_from_slice(&boxed(b"jp2c", &[0xff, 0x4f]));

        let mut stream = Cursor::new(f);
        assert!(matches!(
            Jp2Image::from_stream(&mut stream),
            Err(Error::CorruptedMetadata)
        ));
    }

    #[test]
    fn test_bad_enumerated_colorspace_rejected() {
        let bad_colr = boxed(b"colr", &[0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x63]);

        let mut f = JP2_SIGNATURE.to_vec();
        f.extend_from_slice(&ftyp());
        f.extend_from_slice(&jp2h(&[ihdr(8, 8), bad_colr]));
        f.extend_from_slice(&boxed(b"jp2c", &[0xff, 0x4f]));

        let mut stream = Cursor::new(f);
        assert!(matches!(
            Jp2Image::from_stream(&mut stream),
            Err(Error::CorruptedMetadata)
        ));
    }

    #[test]
    fn test_box_ceiling_bounds_walk() {
        let mut f = JP2_SIGNATURE.to_vec();
        f.extend_from_slice(&ftyp());
        for _ in 0..20 {
            f.extend_from_slice(&boxed(b"free", &[]));
        }
        f.extend_from_slice(&boxed(b"jp2c", &[0xff, 0x4f]));

        let mut stream = Cursor::new(f);
        let mut image = Jp2Image::new().with_box_limit(10);
        assert!(matches!(
            image.read_metadata(&mut stream),
            Err(Error::CorruptedMetadata)
        ));
    }

    #[test]
    fn test_exif_uuid_read() {
        let input = minimal_jp2(&[uuid_boxed(&EXIF_UUID, TIFF_LE)]);
        let image = Jp2Image::from_stream(&mut Cursor::new(input)).unwrap();

        assert!(!image.exif().is_empty());
        assert_eq!(image.byte_order(), Some(ByteOrder::LittleEndian));
        assert_eq!(image.exif().encode(), TIFF_LE.to_vec());
    }

    #[test]
    fn test_exif_uuid_with_nonstandard_preamble() {
        let mut payload = EXIF_PREAMBLE.to_vec();
        payload.extend_from_slice(TIFF_LE);

        let input = minimal_jp2(&[uuid_boxed(&EXIF_UUID, &payload)]);
        let image = Jp2Image::from_stream(&mut Cursor::new(input)).unwrap();

        // the preamble is skipped, not stored
        assert_eq!(image.exif().encode(), TIFF_LE.to_vec());
        assert_eq!(image.byte_order(), Some(ByteOrder::LittleEndian));
    }

    #[test]
    fn test_undecodable_exif_is_cleared() {
        let input = minimal_jp2(&[uuid_boxed(&EXIF_UUID, b"QQ not tiff data here")]);
        let image = Jp2Image::from_stream(&mut Cursor::new(input)).unwrap();

        assert!(image.exif().is_empty());
        assert_eq!(image.byte_order(), None);
    }

    #[test]
    fn test_iptc_uuid_read() {
        let mut iim = Vec::new();
        iim.extend_from_slice(&[0x1c, 0x02, 0x05, 0x00, 0x04]);
        iim.extend_from_slice(b"City");

        let input = minimal_jp2(&[uuid_boxed(&IPTC_UUID, &iim)]);
        let image = Jp2Image::from_stream(&mut Cursor::new(input)).unwrap();

        assert_eq!(image.iptc().datasets().len(), 1);
        assert_eq!(image.iptc().datasets()[0].data, b"City".to_vec());
    }

    #[test]
    fn test_undecodable_iptc_is_cleared() {
        let input = minimal_jp2(&[uuid_boxed(&IPTC_UUID, b"definitely not IIM data")]);
        let image = Jp2Image::from_stream(&mut Cursor::new(input)).unwrap();

        assert!(image.iptc().is_empty());
    }

    #[test]
    fn test_xmp_uuid_read_with_leading_junk() {
        let mut payload = b"   ".to_vec();
        payload.extend_from_slice(XMP_PACKET.as_bytes());

        let input = minimal_jp2(&[uuid_boxed(&XMP_UUID, &payload)]);
        let image = Jp2Image::from_stream(&mut Cursor::new(input)).unwrap();

        // the three junk bytes are stripped
        assert_eq!(image.xmp().packet(), XMP_PACKET);
    }

    #[test]
    fn test_malformed_xmp_packet_is_retained_raw() {
        let packet = "<?xpacket begin=\"\"?><x:xmpmeta><oops></x:xmpmeta>";
        let input = minimal_jp2(&[uuid_boxed(&XMP_UUID, packet.as_bytes())]);
        let image = Jp2Image::from_stream(&mut Cursor::new(input)).unwrap();

        assert_eq!(image.xmp().packet(), packet);
    }

    #[test]
    fn test_unknown_uuid_is_ignored_on_read() {
        let unknown = [0xabu8; 16];
        let input = minimal_jp2(&[uuid_boxed(&unknown, b"opaque payload")]);
        let image = Jp2Image::from_stream(&mut Cursor::new(input)).unwrap();

        assert!(image.exif().is_empty());
        assert!(image.iptc().is_empty());
        assert!(image.xmp().is_empty());
    }

    #[test]
    fn test_icc_profile_read_without_prefix() {
        let icc = b"fake icc profile bytes, long enough to matter";
        let mut f = JP2_SIGNATURE.to_vec();
        f.extend_from_slice(&ftyp());
        f.extend_from_slice(&jp2h(&[ihdr(8, 8), colr_icc(icc)]));
        f.extend_from_slice(&boxed(b"jp2c", &[0xff, 0x4f]));

        let image = Jp2Image::from_stream(&mut Cursor::new(f)).unwrap();

        // the method/precedence/approximation prefix must not leak
        assert_eq!(image.icc_profile(), Some(icc.as_slice()));
    }

    #[test]
    fn test_first_colr_wins() {
        let icc = b"profile from the second colr";
        let mut f = JP2_SIGNATURE.to_vec();
        f.extend_from_slice(&ftyp());
        f.extend_from_slice(&jp2h(&[ihdr(8, 8), colr_enumerated(), colr_icc(icc)]));
        f.extend_from_slice(&boxed(b"jp2c", &[0xff, 0x4f]));

        let image = Jp2Image::from_stream(&mut Cursor::new(f)).unwrap();

        assert!(image.icc_profile().is_none());
    }

    #[test]
    fn test_write_rejects_non_jp2_input() {
        let image = Jp2Image::new();
        let mut input = Cursor::new(b"plain text, not boxes".to_vec());
        let mut output = Cursor::new(Vec::new());

        assert!(matches!(
            image.write_metadata(&mut input, &mut output),
            Err(Error::NoImageInInputData)
        ));
    }

    #[test]
    fn test_round_trip_preserves_box_types() {
        let input = minimal_jp2(&[]);
        let image = Jp2Image::from_stream(&mut Cursor::new(input.clone())).unwrap();

        let mut output = Cursor::new(Vec::new());
        image
            .write_metadata(&mut Cursor::new(input.clone()), &mut output)
            .unwrap();

        assert_eq!(
            box_types_of(&output.get_ref()[12..]),
            box_types_of(&input[12..])
        );
    }

    #[test]
    fn test_write_strips_known_uuid_boxes_when_model_is_empty() {
        let mut iim = Vec::new();
        iim.extend_from_slice(&[0x1c, 0x02, 0x05, 0x00, 0x04]);
        iim.extend_from_slice(b"City");
        let input = minimal_jp2(&[
            uuid_boxed(&EXIF_UUID, TIFF_LE),
            uuid_boxed(&IPTC_UUID, &iim),
            uuid_boxed(&XMP_UUID, XMP_PACKET.as_bytes()),
        ]);

        let mut image = Jp2Image::from_stream(&mut Cursor::new(input.clone())).unwrap();
        image.exif_mut().clear();
        image.iptc_mut().clear();
        image.xmp_mut().clear();

        let mut output = Cursor::new(Vec::new());
        image
            .write_metadata(&mut Cursor::new(input), &mut output)
            .unwrap();

        output.rewind().unwrap();
        let reread = Jp2Image::from_stream(&mut output).unwrap();
        assert!(reread.exif().is_empty());
        assert!(reread.iptc().is_empty());
        assert!(reread.xmp().is_empty());

        // no recognized metadata UUID survives in the byte stream either
        let bytes = output.get_ref();
        for uuid in [EXIF_UUID, IPTC_UUID, XMP_UUID] {
            assert!(!bytes.windows(16).any(|w| w == uuid));
        }
    }

    #[test]
    fn test_metadata_replacement_round_trip() {
        let input = minimal_jp2(&[]);
        let mut image = Jp2Image::from_stream(&mut Cursor::new(input.clone())).unwrap();

        image.exif_mut().set_raw(TIFF_LE).unwrap();
        image.iptc_mut().push(2, 5, b"Dublin".to_vec());
        image.xmp_mut().set_packet(XMP_PACKET);

        let mut output = Cursor::new(Vec::new());
        image
            .write_metadata(&mut Cursor::new(input), &mut output)
            .unwrap();

        output.rewind().unwrap();
        let reread = Jp2Image::from_stream(&mut output).unwrap();

        assert_eq!(reread.exif().encode(), TIFF_LE.to_vec());
        assert_eq!(reread.iptc(), image.iptc());
        assert_eq!(reread.xmp().packet(), XMP_PACKET);
    }

    #[test]
    fn test_fresh_metadata_follows_header_in_order() {
        let input = minimal_jp2(&[]);
        let mut image = Jp2Image::from_stream(&mut Cursor::new(input.clone())).unwrap();

        image.exif_mut().set_raw(TIFF_LE).unwrap();
        image.iptc_mut().push(2, 5, b"Dublin".to_vec());
        image.xmp_mut().set_packet(XMP_PACKET);

        let mut output = Cursor::new(Vec::new());
        image
            .write_metadata(&mut Cursor::new(input), &mut output)
            .unwrap();

        let types = box_types_of(&output.get_ref()[12..]);
        assert_eq!(types, vec!["ftyp", "jp2h", "uuid", "uuid", "uuid", "jp2c"]);

        // Exif, then IPTC, then XMP
        let bytes = output.get_ref();
        let exif_at = bytes.windows(16).position(|w| w == EXIF_UUID).unwrap();
        let iptc_at = bytes.windows(16).position(|w| w == IPTC_UUID).unwrap();
        let xmp_at = bytes.windows(16).position(|w| w == XMP_UUID).unwrap();
        assert!(exif_at < iptc_at && iptc_at < xmp_at);
    }

    #[test]
    fn test_unknown_uuid_box_copied_verbatim() {
        let unknown = [0xabu8; 16];
        let unknown_box = uuid_boxed(&unknown, b"opaque payload");
        let input = minimal_jp2(&[unknown_box.clone()]);

        let image = Jp2Image::from_stream(&mut Cursor::new(input.clone())).unwrap();
        let mut output = Cursor::new(Vec::new());
        image
            .write_metadata(&mut Cursor::new(input), &mut output)
            .unwrap();

        let bytes = output.get_ref();
        assert!(bytes
            .windows(unknown_box.len())
            .any(|w| w == unknown_box.as_slice()));
    }

    #[test]
    fn test_icc_inject_grows_header_by_profile_size_minus_four() {
        // the template's colr is the 15-byte enumerated form
        let input = BLANK_JP2.to_vec();
        let mut image = Jp2Image::from_stream(&mut Cursor::new(input.clone())).unwrap();

        let icc = vec![0x5au8; 20];
        image.set_icc_profile(icc.clone());

        let mut output = Cursor::new(Vec::new());
        image
            .write_metadata(&mut Cursor::new(input), &mut output)
            .unwrap();

        // jp2h starts after signature (12) and ftyp (20)
        let bytes = output.get_ref();
        let old_len = u32::from_be_bytes([BLANK_JP2[32], BLANK_JP2[33], BLANK_JP2[34], BLANK_JP2[35]]);
        let new_len = u32::from_be_bytes([bytes[32], bytes[33], bytes[34], bytes[35]]);
        assert_eq!(new_len, old_len + icc.len() as u32 - 4);

        output.rewind().unwrap();
        let reread = Jp2Image::from_stream(&mut output).unwrap();
        assert_eq!(reread.icc_profile(), Some(icc.as_slice()));
    }

    #[test]
    fn test_write_without_icc_emits_placeholder_colr() {
        let input = BLANK_JP2.to_vec();
        let image = Jp2Image::from_stream(&mut Cursor::new(input.clone())).unwrap();

        let mut output = Cursor::new(Vec::new());
        image
            .write_metadata(&mut Cursor::new(input), &mut output)
            .unwrap();

        let bytes = output.get_ref();
        assert!(bytes
            .windows(COLR_PLACEHOLDER.len())
            .any(|w| w == COLR_PLACEHOLDER));
    }

    #[test]
    fn test_sub_boxes_after_colr_are_dropped() {
        let trailing = boxed(b"res ", &[0u8; 4]);
        let mut f = JP2_SIGNATURE.to_vec();
        f.extend_from_slice(&ftyp());
        f.extend_from_slice(&jp2h(&[ihdr(8, 8), colr_enumerated(), trailing]));
        f.extend_from_slice(&boxed(b"jp2c", &[0xff, 0x4f]));

        let image = Jp2Image::from_stream(&mut Cursor::new(f.clone())).unwrap();
        let mut output = Cursor::new(Vec::new());
        image.write_metadata(&mut Cursor::new(f), &mut output).unwrap();

        let bytes = output.get_ref();
        assert!(!bytes.windows(4).any(|w| w == b"res "));
    }

    #[test]
    fn test_set_comment_is_unsupported() {
        let mut image = Jp2Image::new();
        let err = image.set_comment("hello").unwrap_err();

        assert!(matches!(err, Error::InvalidSettingForImage(_)));
        assert_eq!(err.code(), 32);
    }

    #[test]
    fn test_print_structure_basic() {
        let mut stream = Cursor::new(minimal_jp2(&[]));
        let mut out = Vec::new();

        Jp2Image::print_structure(&mut stream, &mut out, PrintStructureOption::Basic, 0).unwrap();

        let report = String::from_utf8(out).unwrap();
        assert!(report.contains("STRUCTURE OF JPEG2000 FILE:"));
        assert!(report.contains("jP  "));
        assert!(report.contains("ftyp"));
        assert!(report.contains("jp2h"));
        assert!(report.contains("jp2c"));
    }

    #[test]
    fn test_print_structure_recursive_lists_sub_boxes() {
        let mut stream = Cursor::new(minimal_jp2(&[]));
        let mut out = Vec::new();

        Jp2Image::print_structure(&mut stream, &mut out, PrintStructureOption::Recursive, 0)
            .unwrap();

        let report = String::from_utf8(out).unwrap();
        assert!(report.contains("sub:ihdr"));
        assert!(report.contains("sub:colr"));
    }

    #[test]
    fn test_print_structure_extracts_xmp() {
        let mut stream = Cursor::new(minimal_jp2(&[uuid_boxed(
            &XMP_UUID,
            XMP_PACKET.as_bytes(),
        )]));
        let mut out = Vec::new();

        Jp2Image::print_structure(&mut stream, &mut out, PrintStructureOption::Xmp, 0).unwrap();

        assert_eq!(out, XMP_PACKET.as_bytes());
    }

    #[test]
    fn test_print_structure_extracts_icc() {
        let icc = b"icc payload for extraction";
        let mut f = JP2_SIGNATURE.to_vec();
        f.extend_from_slice(&ftyp());
        f.extend_from_slice(&jp2h(&[ihdr(8, 8), colr_icc(icc)]));
        f.extend_from_slice(&boxed(b"jp2c", &[0xff, 0x4f]));

        let mut out = Vec::new();
        Jp2Image::print_structure(
            &mut Cursor::new(f),
            &mut out,
            PrintStructureOption::IccProfile,
            0,
        )
        .unwrap();

        assert_eq!(out, icc.to_vec());
    }

    #[test]
    fn test_print_structure_accepts_short_icc_colr() {
        // 4-byte method-2 payload: prefix plus a single ICC byte; the read
        // path accepts it, so the printer must as well
        let short_colr = boxed(b"colr", &[0x02, 0x00, 0x00, 0x42]);
        let mut f = JP2_SIGNATURE.to_vec();
        f.extend_from_slice(&ftyp());
        f.extend_from_slice(&jp2h(&[ihdr(8, 8), short_colr]));
        f.extend_from_slice(&boxed(b"jp2c", &[0xff, 0x4f]));

        let image = Jp2Image::from_stream(&mut Cursor::new(f.clone())).unwrap();
        assert_eq!(image.icc_profile(), Some(&[0x42u8][..]));

        let mut out = Vec::new();
        Jp2Image::print_structure(
            &mut Cursor::new(f),
            &mut out,
            PrintStructureOption::Recursive,
            0,
        )
        .unwrap();
        assert!(String::from_utf8(out).unwrap().contains("iccLength:1"));
    }

    #[test]
    fn test_print_structure_rejects_non_jp2() {
        let mut stream = Cursor::new(b"<html>nope</html>".to_vec());
        let mut out = Vec::new();

        assert!(matches!(
            Jp2Image::print_structure(&mut stream, &mut out, PrintStructureOption::Basic, 0),
            Err(Error::NotAJpeg)
        ));
    }

    #[test]
    fn test_print_structure_iptc_erase_walks_silently() {
        let mut stream = Cursor::new(minimal_jp2(&[]));
        let mut out = Vec::new();

        Jp2Image::print_structure(&mut stream, &mut out, PrintStructureOption::IptcErase, 0)
            .unwrap();

        assert!(out.is_empty());
    }
}
