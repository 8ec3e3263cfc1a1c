//! A single Ogg page: 27-byte header, segment table, payload, CRC.

use crate::crc;
use crate::error::{Error, Result};
use crate::segment;

const MAGIC: &[u8; 4] = b"OggS";
const HEADER_LEN: usize = 27;

/// `header_type` bit flags.
pub const FLAG_CONTINUATION: u8 = 0x01;
pub const FLAG_BOS: u8 = 0x02;
pub const FLAG_EOS: u8 = 0x04;

/// One Ogg page: header fields plus an owned segment table and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Page {
    pub version: u8,
    pub header_type: u8,
    pub granule_position: u64,
    pub serial_number: u32,
    pub page_sequence: u32,
    pub segments: Vec<u8>,
    pub payload: Vec<u8>,
}

/// Outcome of a page-decode attempt over a byte slice that may not yet hold
/// a whole page.
pub(crate) enum DecodeOutcome {
    Page(Page, usize),
    /// Not enough bytes in the slice yet; the caller should read more and
    /// retry. Not an error, a stream reader expects this constantly.
    Incomplete,
}

impl Page {
    pub fn is_bos(&self) -> bool {
        self.header_type & FLAG_BOS != 0
    }

    pub fn is_eos(&self) -> bool {
        self.header_type & FLAG_EOS != 0
    }

    pub fn is_continuation(&self) -> bool {
        self.header_type & FLAG_CONTINUATION != 0
    }

    /// Serialize header + segment table + payload, CRC-32 computed over the
    /// whole buffer with the CRC field treated as zero and then patched in.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.segments.len() + self.payload.len());
        buf.extend_from_slice(MAGIC);
        buf.push(self.version);
        buf.push(self.header_type);
        buf.extend_from_slice(&self.granule_position.to_le_bytes());
        buf.extend_from_slice(&self.serial_number.to_le_bytes());
        buf.extend_from_slice(&self.page_sequence.to_le_bytes());
        let crc_pos = buf.len();
        buf.extend_from_slice(&[0u8; 4]); // CRC placeholder, filled below
        buf.push(self.segments.len() as u8);
        buf.extend_from_slice(&self.segments);
        buf.extend_from_slice(&self.payload);

        let crc = crc::checksum(&buf);
        buf[crc_pos..crc_pos + 4].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Parse a single page from the front of `bytes`. Returns the page and
    /// the number of bytes it consumed so the caller can advance a stream
    /// cursor. Fails with `InvalidPage` on truncation, bad magic, or a
    /// malformed segment table; `BadCrc` on checksum mismatch.
    pub fn parse(bytes: &[u8]) -> Result<(Page, usize)> {
        match Self::try_decode(bytes)? {
            DecodeOutcome::Page(page, consumed) => Ok((page, consumed)),
            DecodeOutcome::Incomplete => Err(Error::InvalidPage {
                reason: "truncated page".into(),
            }),
        }
    }

    pub(crate) fn try_decode(bytes: &[u8]) -> Result<DecodeOutcome> {
        if bytes.len() < HEADER_LEN {
            return Ok(DecodeOutcome::Incomplete);
        }
        if &bytes[0..4] != MAGIC {
            log::warn!("rejecting page: bad capture pattern");
            return Err(Error::InvalidPage {
                reason: "bad capture pattern".into(),
            });
        }
        let version = bytes[4];
        let header_type = bytes[5];
        let granule_position = u64::from_le_bytes(bytes[6..14].try_into().unwrap());
        let serial_number = u32::from_le_bytes(bytes[14..18].try_into().unwrap());
        let page_sequence = u32::from_le_bytes(bytes[18..22].try_into().unwrap());
        let crc_expected = u32::from_le_bytes(bytes[22..26].try_into().unwrap());
        let segment_count = bytes[26] as usize;

        if bytes.len() < HEADER_LEN + segment_count {
            return Ok(DecodeOutcome::Incomplete);
        }
        let segments = bytes[HEADER_LEN..HEADER_LEN + segment_count].to_vec();
        let payload_size = segment::payload_len(&segments);
        let total = HEADER_LEN + segment_count + payload_size;

        if bytes.len() < total {
            return Ok(DecodeOutcome::Incomplete);
        }

        let mut crc_buf = bytes[0..total].to_vec();
        crc_buf[22..26].copy_from_slice(&[0, 0, 0, 0]);
        let actual = crc::checksum(&crc_buf);
        if actual != crc_expected {
            log::warn!("rejecting page at sequence {page_sequence}: CRC mismatch (expected {crc_expected:#010x}, got {actual:#010x})");
            return Err(Error::BadCrc {
                expected: crc_expected,
                actual,
            });
        }

        let payload = bytes[HEADER_LEN + segment_count..total].to_vec();
        Ok(DecodeOutcome::Page(
            Page {
                version,
                header_type,
                granule_position,
                serial_number,
                page_sequence,
                segments,
                payload,
            },
            total,
        ))
    }

    /// Split this page's payload into the packets its segment table
    /// completes, plus whether the last packet continues onto the next
    /// page. If the payload is shorter than the segment table implies
    /// (only reachable via a hand-built malformed `Page`, since `parse`
    /// always produces a consistent pair) the final slice is truncated
    /// rather than panicking.
    pub fn packets(&self) -> (Vec<Vec<u8>>, bool) {
        let (lengths, continuation) = segment::parse_segment_table(&self.segments);
        let mut out = Vec::with_capacity(lengths.len());
        let mut offset = 0usize;
        for len in lengths {
            let start = offset.min(self.payload.len());
            let end = (offset + len).min(self.payload.len());
            out.push(self.payload[start..end].to_vec());
            offset += len;
        }
        (out, continuation)
    }
}
