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

use quick_xml::{events::Event, name::QName, Reader};

use crate::error::{Error, Result};

const RDF_DESCRIPTION: &[u8] = b"rdf:Description";

/// Carrier for an XMP payload.
///
/// Holds the packet string and the identifiers extracted from it. The
/// packet is also the model's serialized form: the write path emits it
/// byte-for-byte, whether it was decoded from a file or installed with
/// [`XmpData::set_packet`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XmpData {
    packet: String,
    document_id: Option<String>,
    instance_id: Option<String>,
}

impl XmpData {
    /// Parse an XMP packet and extract the document/instance identifiers.
    ///
    /// The packet is stored even when parsing fails, so a malformed packet
    /// survives a read/write cycle untouched.
    pub fn decode(&mut self, packet: &str) -> Result<()> {
        self.packet = packet.to_string();
        self.document_id = None;
        self.instance_id = None;

        let mut reader = Reader::from_str(packet);
        reader.config_mut().trim_text(true);

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                    if e.name() == QName(RDF_DESCRIPTION) {
                        for attr in e.attributes().flatten() {
                            let value = match String::from_utf8(attr.value.to_vec()) {
                                Ok(s) => s,
                                Err(_) => continue,
                            };
                            if attr.key == QName(b"xmpMM:DocumentID") {
                                self.document_id = Some(value);
                            } else if attr.key == QName(b"xmpMM:InstanceID") {
                                self.instance_id = Some(value);
                            }
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(_) => return Err(Error::CorruptedMetadata),
            }
        }

        Ok(())
    }

    /// Install a packet to be written back byte-for-byte.
    ///
    /// The packet is not parsed; previously extracted identifiers are
    /// cleared.
    pub fn set_packet(&mut self, packet: impl Into<String>) {
        self.packet = packet.into();
        self.document_id = None;
        self.instance_id = None;
    }

    pub fn packet(&self) -> &str {
        &self.packet
    }

    pub fn document_id(&self) -> Option<&str> {
        self.document_id.as_deref()
    }

    pub fn instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.packet.is_empty()
    }

    pub fn clear(&mut self) {
        self.packet.clear();
        self.document_id = None;
        self.instance_id = None;
    }
}

#[cfg(test)]
pub mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    pub const XMP_PACKET: &str = r#"<?xpacket begin="" id="W5M0MpCehiHzreSzNTczkc9d"?><x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"><rdf:Description rdf:about="" xmlns:xmpMM="http://ns.adobe.com/xap/1.0/mm/" xmpMM:DocumentID="xmp.did:87f57f1a-ed9b-4478-bb22-67c17a6a462e" xmpMM:InstanceID="xmp.iid:87f57f1a-ed9b-4478-bb22-67c17a6a462e"> </rdf:Description></rdf:RDF></x:xmpmeta><?xpacket end="w"?>"#;

    #[test]
    fn test_decode_extracts_identifiers() {
        let mut xmp = XmpData::default();
        xmp.decode(XMP_PACKET).unwrap();

        assert_eq!(
            xmp.document_id(),
            Some("xmp.did:87f57f1a-ed9b-4478-bb22-67c17a6a462e")
        );
        assert_eq!(
            xmp.instance_id(),
            Some("xmp.iid:87f57f1a-ed9b-4478-bb22-67c17a6a462e")
        );
        assert_eq!(xmp.packet(), XMP_PACKET);
    }

    #[test]
    fn test_decode_malformed_keeps_packet() {
        let mut xmp = XmpData::default();
        let packet = "<?xpacket begin=\"\"?><x:xmpmeta><unclosed></x:xmpmeta>";

        assert!(xmp.decode(packet).is_err());
        assert_eq!(xmp.packet(), packet);
    }

    #[test]
    fn test_set_packet_is_stored_verbatim() {
        let mut xmp = XmpData::default();
        xmp.decode(XMP_PACKET).unwrap();
        xmp.set_packet("<x/>");

        assert_eq!(xmp.packet(), "<x/>");
        assert!(xmp.document_id().is_none());
    }

    #[test]
    fn test_clear() {
        let mut xmp = XmpData::default();
        xmp.decode(XMP_PACKET).unwrap();
        xmp.clear();

        assert!(xmp.is_empty());
        assert!(xmp.document_id().is_none());
    }
}
