//! A pure-Rust Ogg-Opus container: page framing and CRC, segment-table
//! packetisation, RFC 7845 `OpusHead`/`OpusTags` encode/parse, the default
//! channel-mapping and family-3 projection tables, and a streaming
//! reader/writer pair that bridges discrete Opus packets to an Ogg
//! bitstream.
//!
//! The Opus codec itself (SILK/CELT/Hybrid/multistream encode or decode) is
//! out of scope: every packet this crate touches is an opaque byte string
//! plus a 48 kHz sample count, exactly as a real Opus encoder/decoder would
//! hand it over.
//!
//! ```
//! use oggopus::{Writer, WriterConfig, Reader};
//!
//! let mut bytes = Vec::new();
//! let mut writer = Writer::open(&mut bytes, WriterConfig { channels: 1, ..Default::default() }).unwrap();
//! writer.write_packet(&[0xFCu8, 0xFF, 0xFE], 960).unwrap();
//! writer.close().unwrap();
//!
//! let mut reader = Reader::open(std::io::Cursor::new(bytes)).unwrap();
//! let (packet, granule) = reader.read_packet().unwrap().unwrap();
//! assert_eq!(packet, vec![0xFC, 0xFF, 0xFE]);
//! assert_eq!(granule, 960);
//! assert!(reader.read_packet().unwrap().is_none());
//! ```

pub mod crc;
pub mod error;
pub mod header;
pub mod page;
pub mod projection;
pub mod reader;
pub mod segment;
pub mod writer;

pub use error::{Error, Result};
pub use header::{default_channel_mapping, ChannelLayout, OpusHead, OpusTags};
pub use page::Page;
pub use reader::Reader;
pub use writer::{Writer, WriterConfig};
