//! Streaming writer: turns opaque Opus packets into a well-formed Ogg-Opus
//! byte stream (BOS header page, tags page, one page per audio packet, EOS
//! page).

use std::io::Write;

use crate::error::{Error, Result};
use crate::header::{self, OpusHead, OpusTags};
use crate::page::{self, Page};
use crate::segment;

/// Writer configuration. `Default` gives mono-friendly, standard-lookahead
/// values; most callers only need to override `channels`/`sample_rate` and,
/// for multistream layouts, `mapping_family`/`stream_count`/
/// `coupled_count`/`channel_mapping`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WriterConfig {
    pub sample_rate: u32,
    pub channels: u8,
    pub pre_skip: u16,
    pub output_gain: i16,
    pub mapping_family: u8,
    pub stream_count: u8,
    pub coupled_count: u8,
    pub channel_mapping: Vec<u8>,
    pub demixing_matrix: Vec<u8>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            pre_skip: 312,
            output_gain: 0,
            mapping_family: 0,
            stream_count: 1,
            coupled_count: 1,
            channel_mapping: Vec::new(),
            demixing_matrix: Vec::new(),
        }
    }
}

fn validate(config: &WriterConfig) -> Result<()> {
    if config.channels == 0 {
        return Err(Error::InvalidHeader {
            what: "WriterConfig",
            reason: "channels must be nonzero".into(),
        });
    }
    match config.mapping_family {
        0 => {
            if config.channels > 2 {
                return Err(Error::InvalidHeader {
                    what: "WriterConfig",
                    reason: format!("mapping family 0 requires channels <= 2, got {}", config.channels),
                });
            }
        }
        1 | 2 | 255 => {
            if config.stream_count == 0 {
                return Err(Error::InvalidHeader {
                    what: "WriterConfig",
                    reason: "stream_count must be >= 1".into(),
                });
            }
            if config.coupled_count > config.stream_count {
                return Err(Error::InvalidHeader {
                    what: "WriterConfig",
                    reason: "coupled_count must be <= stream_count".into(),
                });
            }
            if config.channel_mapping.len() != config.channels as usize {
                return Err(Error::InvalidHeader {
                    what: "WriterConfig",
                    reason: format!(
                        "channel_mapping length {} must equal channels {}",
                        config.channel_mapping.len(),
                        config.channels
                    ),
                });
            }
            let decoded_count = config.stream_count as u16 + config.coupled_count as u16;
            for &entry in &config.channel_mapping {
                if entry != 255 && entry as u16 >= decoded_count {
                    return Err(Error::InvalidHeader {
                        what: "WriterConfig",
                        reason: format!("mapping entry {entry} out of range [0, {decoded_count})"),
                    });
                }
            }
        }
        3 => {
            if config.stream_count == 0 {
                return Err(Error::InvalidHeader {
                    what: "WriterConfig",
                    reason: "stream_count must be >= 1".into(),
                });
            }
            if config.coupled_count > config.stream_count {
                return Err(Error::InvalidHeader {
                    what: "WriterConfig",
                    reason: "coupled_count must be <= stream_count".into(),
                });
            }
            let expected =
                2 * config.channels as usize * (config.stream_count as usize + config.coupled_count as usize);
            if !config.demixing_matrix.is_empty() && config.demixing_matrix.len() != expected {
                return Err(Error::InvalidHeader {
                    what: "WriterConfig",
                    reason: format!(
                        "demixing_matrix must be {expected} bytes or empty, got {}",
                        config.demixing_matrix.len()
                    ),
                });
            }
        }
        other => {
            return Err(Error::InvalidHeader {
                what: "WriterConfig",
                reason: format!("unknown mapping family {other}"),
            });
        }
    }
    Ok(())
}

fn build_opus_head(config: &WriterConfig) -> OpusHead {
    OpusHead {
        version: 1,
        channels: config.channels,
        pre_skip: config.pre_skip,
        input_sample_rate: config.sample_rate,
        output_gain: config.output_gain,
        mapping_family: config.mapping_family,
        stream_count: config.stream_count,
        coupled_count: config.coupled_count,
        channel_mapping: config.channel_mapping.clone(),
        demixing_matrix: config.demixing_matrix.clone(),
    }
}

/// Emits a well-formed Ogg-Opus stream to a byte sink: BOS header page,
/// tags page, one page per `write_packet` call, then an EOS page on close.
pub struct Writer<W> {
    sink: W,
    serial: u32,
    sequence: u32,
    granule: u64,
    headers_done: bool,
    closed: bool,
    header_pages: Vec<u8>,
}

impl<W: Write> Writer<W> {
    /// Validate `config`, pick a random stream serial, and emit the BOS
    /// `OpusHead` page and the `OpusTags` page.
    pub fn open(sink: W, config: WriterConfig) -> Result<Self> {
        validate(&config)?;

        let serial = match rand::random::<u32>() {
            0 => 1,
            s => s,
        };

        let mut writer = Self {
            sink,
            serial,
            sequence: 0,
            granule: 0,
            headers_done: false,
            closed: false,
            header_pages: Vec::new(),
        };

        let head = build_opus_head(&config);
        let head_bytes = writer.emit_packet_page(page::FLAG_BOS, 0, &head.encode())?;

        let tags = header::default_opus_tags();
        let tags_bytes = writer.emit_packet_page(0, 0, &tags.encode())?;

        writer.header_pages.extend(head_bytes);
        writer.header_pages.extend(tags_bytes);
        writer.headers_done = true;

        Ok(writer)
    }

    /// A page carrying exactly one packet: segment table derived from
    /// `payload`'s length via §4.2's rule.
    fn emit_packet_page(&mut self, flags: u8, granule: u64, payload: &[u8]) -> Result<Vec<u8>> {
        self.emit_page(flags, granule, segment::build_segment_table(payload.len()), payload)
    }

    /// A page with an explicit segment table, used for the terminal EOS
    /// page, which carries no packet at all and so gets a zero-length
    /// segment table, not the single `[0]` segment a genuine zero-length
    /// *packet* would use.
    fn emit_page(&mut self, flags: u8, granule: u64, segments: Vec<u8>, payload: &[u8]) -> Result<Vec<u8>> {
        let granule = if self.headers_done { granule } else { 0 };
        let page = Page {
            version: 0,
            header_type: flags,
            granule_position: granule,
            serial_number: self.serial,
            page_sequence: self.sequence,
            segments,
            payload: payload.to_vec(),
        };
        let bytes = page.encode();
        self.sink.write_all(&bytes)?;
        self.sequence += 1;
        Ok(bytes)
    }

    /// Encode and emit one audio packet as a single Ogg page. The granule
    /// accumulates `sample_count` (48 kHz samples) before the page is
    /// stamped, even if `sample_count` is zero.
    pub fn write_packet(&mut self, packet: &[u8], sample_count: u64) -> Result<()> {
        if self.closed {
            return Err(Error::UnexpectedEos);
        }
        self.granule += sample_count;
        self.emit_packet_page(0, self.granule, packet)?;
        Ok(())
    }

    /// Emit the terminal EOS page: empty payload, empty segment table, the
    /// current cumulative granule. Idempotent: a second call is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.emit_page(page::FLAG_EOS, self.granule, Vec::new(), &[])?;
        self.closed = true;
        Ok(())
    }

    /// The BOS + tags pages exactly as emitted at `open`, for replaying to
    /// a newly-joined subscriber of a live broadcast without re-running
    /// `open` against a second sink.
    pub fn encode_header_pages(&self) -> &[u8] {
        &self.header_pages
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn granule(&self) -> u64 {
        self.granule
    }

    pub fn page_count(&self) -> u32 {
        self.sequence
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Reader;

    #[test]
    fn empty_stream_round_trips() {
        let mut buf = Vec::new();
        let mut writer = Writer::open(
            &mut buf,
            WriterConfig {
                channels: 1,
                ..Default::default()
            },
        )
        .unwrap();
        writer.close().unwrap();

        let mut reader = Reader::open(std::io::Cursor::new(buf)).unwrap();
        assert_eq!(reader.channels(), 1);
        assert_eq!(reader.sample_rate(), 48000);
        assert_eq!(reader.pre_skip(), 312);
        assert!(reader.read_packet().unwrap().is_none());
    }

    #[test]
    fn write_after_close_is_unexpected_eos() {
        let mut buf = Vec::new();
        let mut writer = Writer::open(&mut buf, WriterConfig::default()).unwrap();
        writer.close().unwrap();
        let err = writer.write_packet(&[1, 2, 3], 960).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEos));
    }

    #[test]
    fn close_is_idempotent() {
        let mut buf = Vec::new();
        let mut writer = Writer::open(&mut buf, WriterConfig::default()).unwrap();
        writer.close().unwrap();
        let pages_after_first_close = writer.page_count();
        writer.close().unwrap();
        assert_eq!(writer.page_count(), pages_after_first_close);
    }

    #[test]
    fn sequence_numbers_increase_and_flags_are_correct() {
        let mut buf = Vec::new();
        let mut writer = Writer::open(&mut buf, WriterConfig::default()).unwrap();
        writer.write_packet(&[0u8; 10], 480).unwrap();
        writer.close().unwrap();
        assert_eq!(writer.page_count(), 4); // BOS, tags, audio, EOS

        let mut cursor = &buf[..];
        let mut pages = Vec::new();
        loop {
            match Page::try_decode(cursor).unwrap() {
                page::DecodeOutcome::Page(p, consumed) => {
                    cursor = &cursor[consumed..];
                    pages.push(p);
                }
                page::DecodeOutcome::Incomplete => break,
            }
        }
        assert_eq!(pages.len(), 4);
        assert!(pages[0].is_bos());
        assert!(!pages[1].is_bos());
        assert!(!pages[2].is_bos());
        assert!(pages[3].is_eos());
        for (i, p) in pages.iter().enumerate() {
            assert_eq!(p.page_sequence, i as u32);
        }
    }

    #[test]
    fn granule_is_monotonic_sum_of_sample_counts() {
        let mut buf = Vec::new();
        let mut writer = Writer::open(
            &mut buf,
            WriterConfig {
                channels: 1,
                ..Default::default()
            },
        )
        .unwrap();
        for samples in [480u64, 960, 1920, 480, 960] {
            writer.write_packet(&[0xAB; 4], samples).unwrap();
        }
        writer.close().unwrap();

        let mut reader = Reader::open(std::io::Cursor::new(buf)).unwrap();
        let mut granules = Vec::new();
        while let Some((_, granule)) = reader.read_packet().unwrap() {
            granules.push(granule);
        }
        assert_eq!(granules, vec![480, 1440, 3360, 3840, 4800]);
        assert_eq!(reader.last_granule(), 4800);
    }
}
