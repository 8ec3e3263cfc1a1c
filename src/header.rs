//! RFC 7845 `OpusHead` / `OpusTags` packets: the two packets that must open
//! every logical Opus bitstream, each carried in its own Ogg page.

use crate::error::{Error, Result};
use crate::projection;

const OPUS_HEAD_MAGIC: &[u8; 8] = b"OpusHead";
const OPUS_TAGS_MAGIC: &[u8; 8] = b"OpusTags";

/// `OpusHead` mapping-family 0 (mono/stereo), 1/2/255 (explicit mapping
/// table), or 3 (projection / demixing matrix), as defined by RFC 7845 §5.1
/// and RFC 8486.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OpusHead {
    pub version: u8,
    pub channels: u8,
    pub pre_skip: u16,
    pub input_sample_rate: u32,
    pub output_gain: i16,
    pub mapping_family: u8,
    pub stream_count: u8,
    pub coupled_count: u8,
    /// Per-channel stream index (family 1/2/255 only); empty for family 0.
    pub channel_mapping: Vec<u8>,
    /// Q15 LE demixing coefficients, column-major (family 3 only).
    pub demixing_matrix: Vec<u8>,
}

impl OpusHead {
    /// A plain mono or stereo header: mapping family 0, the standard 312
    /// sample lookahead, zero output gain.
    pub fn mono_or_stereo(channels: u8, input_sample_rate: u32) -> Result<Self> {
        if channels == 0 || channels > 2 {
            return Err(Error::InvalidHeader {
                what: "OpusHead",
                reason: format!("mapping family 0 requires 1 or 2 channels, got {channels}"),
            });
        }
        Ok(Self {
            version: 1,
            channels,
            pre_skip: 312,
            input_sample_rate,
            output_gain: 0,
            mapping_family: 0,
            stream_count: 1,
            coupled_count: channels - 1,
            channel_mapping: Vec::new(),
            demixing_matrix: Vec::new(),
        })
    }

    /// Serialize to the 19-byte (family 0) or 21+N-byte layout RFC 7845
    /// describes. For family 3 with an empty `demixing_matrix`, the
    /// projection default table (or an identity fallback) is consulted and
    /// copied into the output, and an unset (`0`) `output_gain` is replaced
    /// by that table entry's recommended gain. The stored header is never
    /// mutated.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(21 + self.channels as usize + self.demixing_matrix.len());
        buf.extend_from_slice(OPUS_HEAD_MAGIC);
        buf.push(1); // version is always 1
        buf.push(self.channels);
        buf.extend_from_slice(&self.pre_skip.to_le_bytes());
        buf.extend_from_slice(&self.input_sample_rate.to_le_bytes());

        // Family 3 with an unset gain and the default (table-matched) matrix
        // emits that table's recommended gain rather than a bare zero, so a
        // caller who didn't ask for a specific gain still gets a correctly
        // calibrated stream.
        let default_lookup = (self.mapping_family == 3 && self.demixing_matrix.is_empty())
            .then(|| projection::lookup(self.channels, self.stream_count, self.coupled_count))
            .flatten();
        let effective_gain = match (&default_lookup, self.output_gain) {
            (Some((_, gain)), 0) => *gain,
            _ => self.output_gain,
        };
        buf.extend_from_slice(&effective_gain.to_le_bytes());
        buf.push(self.mapping_family);

        match self.mapping_family {
            0 => {}
            3 => {
                buf.push(self.stream_count);
                buf.push(self.coupled_count);
                match default_lookup {
                    Some((matrix, _)) => buf.extend_from_slice(&matrix),
                    None if self.demixing_matrix.is_empty() => {
                        let matrix = projection::lookup_or_identity(
                            self.channels,
                            self.stream_count,
                            self.coupled_count,
                        );
                        buf.extend_from_slice(&matrix);
                    }
                    None => buf.extend_from_slice(&self.demixing_matrix),
                }
            }
            _ => {
                buf.push(self.stream_count);
                buf.push(self.coupled_count);
                buf.extend_from_slice(&self.channel_mapping);
            }
        }
        buf
    }

    /// Parse and validate an `OpusHead` packet per RFC 7845 §5.1.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 19 || &bytes[0..8] != OPUS_HEAD_MAGIC {
            return Err(Error::InvalidHeader {
                what: "OpusHead",
                reason: "missing magic signature or too short".into(),
            });
        }
        let version = bytes[8];
        if version != 1 {
            return Err(Error::InvalidHeader {
                what: "OpusHead",
                reason: format!("unsupported version {version}"),
            });
        }
        let channels = bytes[9];
        if channels == 0 {
            return Err(Error::InvalidHeader {
                what: "OpusHead",
                reason: "channel count must be nonzero".into(),
            });
        }
        let pre_skip = u16::from_le_bytes(bytes[10..12].try_into().unwrap());
        let input_sample_rate = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        let output_gain = i16::from_le_bytes(bytes[16..18].try_into().unwrap());
        let mapping_family = bytes[18];

        match mapping_family {
            0 => {
                if channels > 2 {
                    return Err(Error::InvalidHeader {
                        what: "OpusHead",
                        reason: format!("mapping family 0 requires channels <= 2, got {channels}"),
                    });
                }
                Ok(Self {
                    version,
                    channels,
                    pre_skip,
                    input_sample_rate,
                    output_gain,
                    mapping_family,
                    stream_count: 1,
                    coupled_count: channels - 1,
                    channel_mapping: Vec::new(),
                    demixing_matrix: Vec::new(),
                })
            }
            3 => {
                if bytes.len() < 21 {
                    return Err(Error::InvalidHeader {
                        what: "OpusHead",
                        reason: "truncated before stream/coupled counts".into(),
                    });
                }
                let stream_count = bytes[19];
                let coupled_count = bytes[20];
                if stream_count == 0 {
                    return Err(Error::InvalidHeader {
                        what: "OpusHead",
                        reason: "stream_count must be >= 1".into(),
                    });
                }
                if coupled_count > stream_count {
                    return Err(Error::InvalidHeader {
                        what: "OpusHead",
                        reason: "coupled_count must be <= stream_count".into(),
                    });
                }
                let matrix_len =
                    2 * channels as usize * (stream_count as usize + coupled_count as usize);
                if bytes.len() < 21 + matrix_len {
                    return Err(Error::InvalidHeader {
                        what: "OpusHead",
                        reason: "truncated demixing matrix".into(),
                    });
                }
                Ok(Self {
                    version,
                    channels,
                    pre_skip,
                    input_sample_rate,
                    output_gain,
                    mapping_family,
                    stream_count,
                    coupled_count,
                    channel_mapping: Vec::new(),
                    demixing_matrix: bytes[21..21 + matrix_len].to_vec(),
                })
            }
            1 | 2 | 255 => {
                if bytes.len() < 21 + channels as usize {
                    return Err(Error::InvalidHeader {
                        what: "OpusHead",
                        reason: "truncated before channel mapping table".into(),
                    });
                }
                let stream_count = bytes[19];
                let coupled_count = bytes[20];
                if stream_count == 0 {
                    return Err(Error::InvalidHeader {
                        what: "OpusHead",
                        reason: "stream_count must be >= 1".into(),
                    });
                }
                if coupled_count > stream_count {
                    return Err(Error::InvalidHeader {
                        what: "OpusHead",
                        reason: "coupled_count must be <= stream_count".into(),
                    });
                }
                let mapping = bytes[21..21 + channels as usize].to_vec();
                let decoded_count = stream_count as u16 + coupled_count as u16;
                for &entry in &mapping {
                    if entry != 255 && entry as u16 >= decoded_count {
                        return Err(Error::InvalidHeader {
                            what: "OpusHead",
                            reason: format!(
                                "channel mapping entry {entry} out of range [0, {decoded_count})"
                            ),
                        });
                    }
                }
                Ok(Self {
                    version,
                    channels,
                    pre_skip,
                    input_sample_rate,
                    output_gain,
                    mapping_family,
                    stream_count,
                    coupled_count,
                    channel_mapping: mapping,
                    demixing_matrix: Vec::new(),
                })
            }
            other => Err(Error::InvalidHeader {
                what: "OpusHead",
                reason: format!("unknown mapping family {other}"),
            }),
        }
    }
}

/// RFC 7845 §5.2 comment header: a vendor string plus `KEY=value` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OpusTags {
    pub vendor: String,
    pub comments: Vec<(String, String)>,
}

impl OpusTags {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(OPUS_TAGS_MAGIC);
        let vendor = self.vendor.as_bytes();
        buf.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        buf.extend_from_slice(vendor);
        buf.extend_from_slice(&(self.comments.len() as u32).to_le_bytes());
        for (key, value) in &self.comments {
            let entry = format!("{key}={value}");
            let entry = entry.as_bytes();
            buf.extend_from_slice(&(entry.len() as u32).to_le_bytes());
            buf.extend_from_slice(entry);
        }
        buf
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 16 || &bytes[0..8] != OPUS_TAGS_MAGIC {
            return Err(Error::InvalidHeader {
                what: "OpusTags",
                reason: "missing magic signature or too short".into(),
            });
        }
        let mut pos = 8usize;
        let vendor_len = read_u32(bytes, pos)? as usize;
        pos += 4;
        if bytes.len() < pos + vendor_len {
            return Err(Error::InvalidHeader {
                what: "OpusTags",
                reason: "truncated vendor string".into(),
            });
        }
        let vendor = String::from_utf8_lossy(&bytes[pos..pos + vendor_len]).into_owned();
        pos += vendor_len;

        let comment_count = read_u32(bytes, pos)? as usize;
        pos += 4;
        let mut comments = Vec::with_capacity(comment_count);
        for _ in 0..comment_count {
            let len = read_u32(bytes, pos)? as usize;
            pos += 4;
            if bytes.len() < pos + len {
                return Err(Error::InvalidHeader {
                    what: "OpusTags",
                    reason: "truncated comment".into(),
                });
            }
            let raw = String::from_utf8_lossy(&bytes[pos..pos + len]);
            pos += len;
            if let Some(eq) = raw.find('=') {
                comments.push((raw[..eq].to_string(), raw[eq + 1..].to_string()));
            }
            // A comment without '=' is silently skipped per RFC 7845.
        }
        Ok(Self { vendor, comments })
    }
}

fn read_u32(bytes: &[u8], pos: usize) -> Result<u32> {
    bytes
        .get(pos..pos + 4)
        .map(|s| u32::from_le_bytes(s.try_into().unwrap()))
        .ok_or_else(|| Error::InvalidHeader {
            what: "OpusTags",
            reason: "truncated length field".into(),
        })
}

/// The `OpusTags` a `Writer` emits by default: our own vendor string, no
/// user comments. RFC 7845 leaves the vendor identifier to the
/// implementation.
pub fn default_opus_tags() -> OpusTags {
    OpusTags {
        vendor: "oggopus".to_string(),
        comments: Vec::new(),
    }
}

/// Family, stream/coupled counts and mapping table for a default
/// (Vorbis-channel-order) layout of 1-8 channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLayout {
    pub mapping_family: u8,
    pub stream_count: u8,
    pub coupled_count: u8,
    pub mapping: Vec<u8>,
}

/// The standard Vorbis-channel-order default layout for 1-8 channels, as
/// shipped by the reference Opus encoding tools. Returns `None` outside
/// that range; callers with more channels must supply their own mapping.
pub fn default_channel_mapping(channels: u8) -> Option<ChannelLayout> {
    let (mapping_family, stream_count, coupled_count, mapping): (u8, u8, u8, &[u8]) =
        match channels {
            1 => (0, 1, 0, &[]),
            2 => (0, 1, 1, &[]),
            3 => (1, 2, 1, &[0, 2, 1]),
            4 => (1, 2, 2, &[0, 1, 2, 3]),
            5 => (1, 3, 2, &[0, 4, 1, 2, 3]),
            6 => (1, 4, 2, &[0, 4, 1, 2, 3, 5]),
            7 => (1, 4, 3, &[0, 4, 1, 2, 3, 5, 6]),
            8 => (1, 5, 3, &[0, 6, 1, 2, 3, 4, 5, 7]),
            _ => return None,
        };
    Some(ChannelLayout {
        mapping_family,
        stream_count,
        coupled_count,
        mapping: mapping.to_vec(),
    })
}
