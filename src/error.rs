//! Error types for the Ogg-Opus container.

use thiserror::Error;

/// Errors produced while framing, parsing, reading or writing an Ogg-Opus
/// stream.
#[derive(Debug, Error)]
pub enum Error {
    /// An Ogg page is malformed, truncated, or violates a container-level
    /// invariant (missing BOS on the first page, continuation from an empty
    /// partial buffer, and so on).
    #[error("invalid ogg page: {reason}")]
    InvalidPage { reason: String },

    /// An `OpusHead` / `OpusTags` packet failed magic/version/length/field
    /// validation, or a `Writer` was opened with an inconsistent
    /// configuration.
    #[error("invalid {what} header: {reason}")]
    InvalidHeader { what: &'static str, reason: String },

    /// CRC-32 of a parsed page did not match the value stored in the page.
    #[error("CRC-32 mismatch (expected {expected:#010x}, got {actual:#010x})")]
    BadCrc { expected: u32, actual: u32 },

    /// The stream ended before a complete header, tags block, or packet
    /// could be produced, or a write was attempted after `Writer::close`.
    #[error("unexpected end of stream")]
    UnexpectedEos,

    /// I/O failure from the underlying byte source or sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
