// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Container header parsing and validation.
//!
//! This is deliberately separate from the decode core: `read_header` never touches frame
//! payloads, only the 44-byte fixed header, the per-track sub-headers, and the frame offset
//! table. Grounded on `symphonia-bundle-mp3::header`'s sync-then-validate shape, adapted to a
//! single fixed-layout header rather than a per-frame sync search.

use bitflags::bitflags;

use crate::error::{corrupt_stream_error, invalid_header_error, unsupported_error, Result};

bitflags! {
    /// The flag bits carried in the header's `videoFlags` word. The 3-bit scaling mode living at
    /// bits 28..30 is not itself a flag and is exposed separately as [`Header::scaling_mode`].
    pub struct VideoFlags: u32 {
        const GRAYSCALE = 1 << 17;
        const ALPHA     = 1 << 20;
    }
}

const SCALING_MODE_SHIFT: u32 = 28;
const SCALING_MODE_MASK: u32 = 0x7;

/// How much of `spec.md` §6's checklist [`read_header`] enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// No semantic checks; bytes are still read positionally (a short buffer is always an error).
    Minimal,
    /// Header signature and revision, width/height bounds, scaling mode range.
    Supported,
    /// Everything `Supported` does, plus the stricter cross-field and table checks.
    Pedantic,
}

/// One audio track's sub-headers, flattened into a single struct.
#[derive(Debug, Clone, Copy)]
pub struct AudioTrack {
    pub sample_rate: u16,
    pub channels: u16,
    pub flags: u16,
    pub id: u32,
}

impl AudioTrack {
    /// Bit 13 of the track flags.
    pub fn is_stereo(&self) -> bool {
        self.flags & (1 << 13) != 0
    }

    /// Bit 12 of the track flags; `spec.md` §1 lists DCT-coded audio as a non-goal.
    pub fn is_dct(&self) -> bool {
        self.flags & (1 << 12) != 0
    }
}

/// The parsed, validated container header.
#[derive(Debug, Clone)]
pub struct Header {
    pub revision: u8,
    pub frame_count: u32,
    pub max_frame_size: u32,
    pub width: u32,
    pub height: u32,
    pub fps_dividend: u32,
    pub fps_divider: u32,
    pub flags: VideoFlags,
    pub scaling_mode: u8,
    pub audio_tracks: Vec<AudioTrack>,
    frame_offsets: Vec<u32>,
}

impl Header {
    pub fn is_grayscale(&self) -> bool {
        self.flags.contains(VideoFlags::GRAYSCALE)
    }

    pub fn has_alpha(&self) -> bool {
        self.flags.contains(VideoFlags::ALPHA)
    }

    /// Number of decodable frames (one less than `frame_offsets.len()`, the table's sentinel
    /// trailing entry).
    pub fn frame_count_decodable(&self) -> usize {
        self.frame_offsets.len() - 1
    }

    /// The byte offset (keyframe bit masked off) and length of frame `index`.
    pub fn frame_range(&self, index: usize) -> Result<(u32, u32)> {
        if index + 1 >= self.frame_offsets.len() {
            return corrupt_stream_error("bink header: frame index out of range");
        }
        let start = self.frame_offsets[index] & !1;
        let end = self.frame_offsets[index + 1] & !1;
        if end < start {
            return corrupt_stream_error("bink header: frame offsets are not monotonic");
        }
        Ok((start, end - start))
    }

    /// True when `frameOffsets[index]`'s low bit marks it as a keyframe.
    pub fn is_keyframe(&self, index: usize) -> bool {
        self.frame_offsets.get(index).copied().unwrap_or(0) & 1 != 0
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8> {
        let b = *self.buf.get(self.pos).ok_or(crate::error::Error::EndOfStream)?;
        self.pos += 1;
        Ok(b)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let end = self.pos + 2;
        let bytes = self.buf.get(self.pos..end).ok_or(crate::error::Error::EndOfStream)?;
        self.pos = end;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let end = self.pos + 4;
        let bytes = self.buf.get(self.pos..end).ok_or(crate::error::Error::EndOfStream)?;
        self.pos = end;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// Revision bytes this core's plane/audio decoders are written against, per `spec.md` §1.
const SUPPORTED_REVISIONS: [u8; 6] = [b'b', b'd', b'f', b'g', b'h', b'i'];

/// Parses and validates a Bink1 container header from `buf`, per `spec.md` §6.
pub fn read_header(buf: &[u8], validation: Validation) -> Result<Header> {
    let mut c = Cursor::new(buf);

    let sig = [c.read_u8()?, c.read_u8()?, c.read_u8()?];
    let revision = c.read_u8()?;

    if validation != Validation::Minimal && &sig != b"BIK" {
        return invalid_header_error("signature is not \"BIK\"");
    }
    if validation != Validation::Minimal && !SUPPORTED_REVISIONS.contains(&revision) {
        return unsupported_error("bink codec revision outside {b,d,f,g,h,i}");
    }

    let _file_size = c.read_u32()?;
    let frame_count = c.read_u32()?;
    let max_frame_size = c.read_u32()?;
    let frame_count2 = c.read_u32()?;
    let width = c.read_u32()?;
    let height = c.read_u32()?;
    let fps_dividend = c.read_u32()?;
    let fps_divider = c.read_u32()?;
    let raw_flags = c.read_u32()?;
    let audio_track_count = c.read_u32()?;

    if validation != Validation::Minimal && !(1..=65_535).contains(&width) {
        return invalid_header_error("width out of range 1..65535");
    }
    if validation != Validation::Minimal && !(1..=65_535).contains(&height) {
        return invalid_header_error("height out of range 1..65535");
    }

    let scaling_mode = ((raw_flags >> SCALING_MODE_SHIFT) & SCALING_MODE_MASK) as u8;
    if validation != Validation::Minimal && scaling_mode > 4 {
        return unsupported_error("scaling mode out of range");
    }

    let flags = VideoFlags::from_bits_truncate(raw_flags);

    if validation == Validation::Pedantic {
        if frame_count != frame_count2 {
            return corrupt_stream_error("frameCount fields disagree");
        }
        if fps_dividend == 0 || fps_divider == 0 {
            return invalid_header_error("fps dividend/divider must be nonzero");
        }
        if audio_track_count > 256 {
            return unsupported_error("audio track count exceeds implementation limit");
        }
        let known_mask = VideoFlags::all().bits() | (SCALING_MODE_MASK << SCALING_MODE_SHIFT);
        if raw_flags & !known_mask != 0 {
            return invalid_header_error("videoFlags sets reserved bits");
        }
    }

    let n = audio_track_count as usize;
    let mut channels = Vec::with_capacity(n);
    for _ in 0..n {
        let _unknown = c.read_u16()?;
        channels.push(c.read_u16()?);
    }
    let mut rates_flags = Vec::with_capacity(n);
    for _ in 0..n {
        let sample_rate = c.read_u16()?;
        let flags = c.read_u16()?;
        rates_flags.push((sample_rate, flags));
    }
    let mut ids = Vec::with_capacity(n);
    for _ in 0..n {
        ids.push(c.read_u32()?);
    }

    let mut audio_tracks = Vec::with_capacity(n);
    for i in 0..n {
        let (sample_rate, track_flags) = rates_flags[i];
        let track = AudioTrack { sample_rate, channels: channels[i], flags: track_flags, id: ids[i] };
        if validation == Validation::Pedantic {
            if track.is_dct() {
                return unsupported_error("DCT-coded audio tracks are not supported");
            }
            if !track.is_stereo() {
                return unsupported_error("mono audio tracks are not supported");
            }
        }
        audio_tracks.push(track);
    }

    if validation == Validation::Pedantic {
        let mut seen_ids = std::collections::HashSet::with_capacity(n);
        for track in &audio_tracks {
            if !seen_ids.insert(track.id) {
                return corrupt_stream_error("duplicate audio track id");
            }
        }
    }

    let mut frame_offsets = Vec::with_capacity(frame_count as usize + 1);
    for _ in 0..=frame_count {
        frame_offsets.push(c.read_u32()?);
    }

    if validation == Validation::Pedantic {
        for w in frame_offsets.windows(2) {
            let (a, b) = (w[0] & !1, w[1] & !1);
            if b < a {
                return corrupt_stream_error("frame offsets are not monotonically increasing");
            }
            if b - a > max_frame_size {
                return corrupt_stream_error("frame size exceeds maxFrameSize");
            }
        }
    }

    Ok(Header {
        revision,
        frame_count,
        max_frame_size,
        width,
        height,
        fps_dividend,
        fps_divider,
        flags,
        scaling_mode,
        audio_tracks,
        frame_offsets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    fn push_u16(buf: &mut Vec<u8>, v: u16) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn minimal_header(width: u32, height: u32, frame_count: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"BIKg");
        push_u32(&mut buf, 0); // file size
        push_u32(&mut buf, frame_count);
        push_u32(&mut buf, 0); // max frame size
        push_u32(&mut buf, frame_count);
        push_u32(&mut buf, width);
        push_u32(&mut buf, height);
        push_u32(&mut buf, 1); // fps dividend
        push_u32(&mut buf, 30); // fps divider
        push_u32(&mut buf, 0); // video flags
        push_u32(&mut buf, 1); // one audio track

        // track header1: unknown + channels
        push_u16(&mut buf, 0);
        push_u16(&mut buf, 2);
        // track header2: sample rate + flags (bit 13 = stereo)
        push_u16(&mut buf, 44_100);
        push_u16(&mut buf, 1 << 13);
        // track id
        push_u32(&mut buf, 1);

        for i in 0..=frame_count {
            push_u32(&mut buf, i * 100);
        }
        buf
    }

    #[test]
    fn parses_minimal_header() {
        let buf = minimal_header(640, 480, 3);
        let header = read_header(&buf, Validation::Pedantic).unwrap();
        assert_eq!(header.width, 640);
        assert_eq!(header.height, 480);
        assert_eq!(header.audio_tracks.len(), 1);
        assert_eq!(header.audio_tracks[0].sample_rate, 44_100);
        assert!(header.audio_tracks[0].is_stereo());
        assert_eq!(header.frame_count_decodable(), 3);
    }

    #[test]
    fn rejects_bad_signature_when_supported() {
        let mut buf = minimal_header(640, 480, 1);
        buf[0] = b'X';
        assert!(read_header(&buf, Validation::Supported).is_err());
        assert!(read_header(&buf, Validation::Minimal).is_ok());
    }

    #[test]
    fn frame_range_masks_keyframe_bit() {
        let mut buf = minimal_header(16, 16, 2);
        // Overwrite the offset table: 0(kf), 101, 250.
        let track_headers_len = 4 + 4 * 10 + (4 + 4 + 4);
        let offsets_off = track_headers_len;
        buf[offsets_off..offsets_off + 4].copy_from_slice(&1u32.to_le_bytes());
        buf[offsets_off + 4..offsets_off + 8].copy_from_slice(&101u32.to_le_bytes());
        buf[offsets_off + 8..offsets_off + 12].copy_from_slice(&250u32.to_le_bytes());

        let header = read_header(&buf, Validation::Minimal).unwrap();
        assert!(header.is_keyframe(0));
        let (start, len) = header.frame_range(0).unwrap();
        assert_eq!(start, 0);
        assert_eq!(len, 100);
    }

    #[test]
    fn pedantic_rejects_mono_track() {
        let mut buf = minimal_header(640, 480, 1);
        // Clear the stereo bit (flags at a fixed offset: 4 + 40 + 4 (unknown/channels) + 2 (rate)).
        let flags_off = 4 + 40 + 4 + 2;
        buf[flags_off..flags_off + 2].copy_from_slice(&0u16.to_le_bytes());
        assert!(read_header(&buf, Validation::Pedantic).is_err());
        assert!(read_header(&buf, Validation::Supported).is_ok());
    }
}
