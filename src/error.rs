// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `error` module defines the error type used throughout the Bink decoder core.
//!
//! The kinds mirror the container's own failure modes rather than generic I/O failures: a short
//! read from the bit reader is a different thing than a frame offset table that doesn't agree
//! with itself, and callers (in particular `FrameDriver`) need to tell them apart.

use std::error::Error as StdError;
use std::fmt;

/// The kinds of errors the Bink decoder core can report.
#[derive(Debug)]
pub enum Error {
    /// The container header failed to parse or did not look like Bink1 at all.
    InvalidHeader(&'static str),
    /// A feature the bitstream requested is not implemented by this core (e.g. DCT or mono audio
    /// tracks, an out-of-range block type, signed 8-bit color bundles).
    Unsupported(&'static str),
    /// A read was attempted past the end of the bit stream or the frame buffer.
    EndOfStream,
    /// A bit reader `read`/`peek` was asked for a bit count outside `1..=32`.
    OutOfRange,
    /// The stream is internally inconsistent (duplicate audio track IDs, non-monotonic frame
    /// offsets, a length field that exceeds its containing buffer).
    CorruptStream(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::InvalidHeader(msg) => write!(f, "invalid header: {}", msg),
            Error::Unsupported(feature) => write!(f, "unsupported feature: {}", feature),
            Error::EndOfStream => write!(f, "unexpected end of stream"),
            Error::OutOfRange => write!(f, "bit count out of range"),
            Error::CorruptStream(msg) => write!(f, "corrupt stream: {}", msg),
        }
    }
}

impl StdError for Error {}

/// A specialized `Result` type for the Bink decoder core.
pub type Result<T> = std::result::Result<T, Error>;

/// Convenience function to create an invalid-header error.
pub fn invalid_header_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::InvalidHeader(msg))
}

/// Convenience function to create an unsupported-feature error.
pub fn unsupported_error<T>(feature: &'static str) -> Result<T> {
    Err(Error::Unsupported(feature))
}

/// Convenience function to create an end-of-stream error.
pub fn end_of_stream_error<T>() -> Result<T> {
    Err(Error::EndOfStream)
}

/// Convenience function to create an out-of-range error.
pub fn out_of_range_error<T>() -> Result<T> {
    Err(Error::OutOfRange)
}

/// Convenience function to create a corrupt-stream error.
pub fn corrupt_stream_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::CorruptStream(msg))
}

impl From<Error> for symphonia_core::errors::SymphoniaError {
    /// Bink errors are reported to Symphonia callers (e.g. `BinkAudioCodec`) as decode errors;
    /// the original kind is preserved in the formatted message since `SymphoniaError::DecodeError`
    /// only carries a `&'static str`.
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidHeader(msg) => symphonia_core::errors::SymphoniaError::DecodeError(msg),
            Error::Unsupported(feature) => {
                symphonia_core::errors::SymphoniaError::Unsupported(feature)
            }
            Error::EndOfStream => symphonia_core::errors::SymphoniaError::EndOfFile,
            Error::OutOfRange => {
                symphonia_core::errors::SymphoniaError::DecodeError("out of range")
            }
            Error::CorruptStream(msg) => symphonia_core::errors::SymphoniaError::DecodeError(msg),
        }
    }
}
