//! Streaming reader: reassembles Opus packets out of an Ogg byte stream.

use std::collections::VecDeque;
use std::io::Read;

use crate::error::{Error, Result};
use crate::header::{OpusHead, OpusTags};
use crate::page::{DecodeOutcome, Page};

const INITIAL_BUF_LEN: usize = 8192;

/// Pulls a single page out of `buf[read_off..fill_len]`, refilling from
/// `source` (compacting and doubling the buffer as needed) until a whole
/// page is available or the source is exhausted. Returns `Ok(None)` only
/// when the source has ended and no further page can be assembled from
/// whatever bytes are left: one more attempt against the residual data,
/// then a clean end of stream.
fn next_page<R: Read>(
    source: &mut R,
    buf: &mut Vec<u8>,
    read_off: &mut usize,
    fill_len: &mut usize,
    source_eof: &mut bool,
) -> Result<Option<Page>> {
    loop {
        {
            let slice = &buf[*read_off..*fill_len];
            match Page::try_decode(slice)? {
                DecodeOutcome::Page(page, consumed) => {
                    *read_off += consumed;
                    return Ok(Some(page));
                }
                DecodeOutcome::Incomplete => {}
            }
        }
        if *source_eof {
            return Ok(None);
        }

        if *read_off > 0 {
            buf.copy_within(*read_off..*fill_len, 0);
            *fill_len -= *read_off;
            *read_off = 0;
        }
        if *fill_len == buf.len() {
            buf.resize(buf.len() * 2, 0);
        }
        let n = source.read(&mut buf[*fill_len..])?;
        if n == 0 {
            *source_eof = true;
        } else {
            *fill_len += n;
        }
    }
}

/// Reassembles Opus packets from an Ogg-Opus byte stream, tracking exactly
/// one logical bitstream (identified by its serial number). Pages from
/// other serials are skipped, not demultiplexed.
pub struct Reader<R> {
    source: R,
    buf: Vec<u8>,
    read_off: usize,
    fill_len: usize,
    source_eof: bool,

    head: OpusHead,
    tags: OpusTags,
    serial: u32,

    last_granule: u64,
    eos: bool,

    partial: Vec<u8>,
    ready: VecDeque<(Vec<u8>, u64)>,
}

impl<R: Read> Reader<R> {
    /// Open a reader: parses the BOS page's `OpusHead` and the following
    /// `OpusTags` (which may itself span several pages).
    pub fn open(mut source: R) -> Result<Self> {
        let mut buf = vec![0u8; INITIAL_BUF_LEN];
        let mut read_off = 0usize;
        let mut fill_len = 0usize;
        let mut source_eof = false;

        let bos = next_page(&mut source, &mut buf, &mut read_off, &mut fill_len, &mut source_eof)?
            .ok_or(Error::UnexpectedEos)?;
        if !bos.is_bos() {
            return Err(Error::InvalidPage {
                reason: "first page does not carry the BOS flag".into(),
            });
        }
        let serial = bos.serial_number;
        let (packets, _continuation) = bos.packets();
        let head_packet = packets.into_iter().next().ok_or_else(|| Error::InvalidPage {
            reason: "BOS page has no complete packet".into(),
        })?;
        let head = OpusHead::parse(&head_packet)?;

        let mut tags_buf = Vec::new();
        loop {
            let page =
                next_page(&mut source, &mut buf, &mut read_off, &mut fill_len, &mut source_eof)?
                    .ok_or(Error::UnexpectedEos)?;
            if page.serial_number != serial {
                log::trace!("skipping page with foreign serial {} while opening", page.serial_number);
                continue;
            }
            if page.segments.is_empty() {
                return Err(Error::InvalidPage {
                    reason: "empty page before OpusTags was parsed".into(),
                });
            }
            let mut offset = 0usize;
            let mut closed = false;
            for &seg in &page.segments {
                let end = (offset + seg as usize).min(page.payload.len());
                tags_buf.extend_from_slice(&page.payload[offset..end]);
                offset = end;
                if seg < 255 {
                    closed = true;
                    break;
                }
            }
            if closed {
                break;
            }
        }
        let tags = OpusTags::parse(&tags_buf)?;

        Ok(Self {
            source,
            buf,
            read_off,
            fill_len,
            source_eof,
            head,
            tags,
            serial,
            last_granule: 0,
            eos: false,
            partial: Vec::new(),
            ready: VecDeque::new(),
        })
    }

    /// Pull the next packet, paired with the granule position of the page
    /// that carried its terminating segment. Returns `Ok(None)` at the
    /// logical end of the stream (EOS observed and the queue drained, or
    /// the source ended without one).
    pub fn read_packet(&mut self) -> Result<Option<(Vec<u8>, u64)>> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Ok(Some(item));
            }
            if self.eos {
                return Ok(None);
            }

            let page = match next_page(
                &mut self.source,
                &mut self.buf,
                &mut self.read_off,
                &mut self.fill_len,
                &mut self.source_eof,
            )? {
                Some(page) => page,
                None => return Ok(None),
            };

            if page.serial_number != self.serial {
                log::trace!("skipping page with foreign serial {}", page.serial_number);
                continue;
            }

            if !page.is_continuation() && !self.partial.is_empty() {
                log::debug!(
                    "discarding {} orphaned partial-packet bytes: page lacks CONTINUATION",
                    self.partial.len()
                );
                self.partial.clear();
            }

            let mut offset = 0usize;
            for &seg in &page.segments {
                let end = (offset + seg as usize).min(page.payload.len());
                self.partial.extend_from_slice(&page.payload[offset..end]);
                offset = end;
                if seg < 255 {
                    let packet = std::mem::take(&mut self.partial);
                    self.ready.push_back((packet, page.granule_position));
                }
            }

            self.last_granule = page.granule_position;
            if page.is_eos() {
                log::trace!("EOS page observed for serial {}", self.serial);
                self.eos = true;
            }
        }
    }

    pub fn head(&self) -> &OpusHead {
        &self.head
    }

    pub fn tags(&self) -> &OpusTags {
        &self.tags
    }

    pub fn channels(&self) -> u8 {
        self.head.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.head.input_sample_rate
    }

    pub fn pre_skip(&self) -> u16 {
        self.head.pre_skip
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn last_granule(&self) -> u64 {
        self.last_granule
    }

    pub fn is_eos(&self) -> bool {
        self.eos
    }
}
