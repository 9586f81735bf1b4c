// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The frame driver: splits one pre-read, size-prefixed frame buffer into its audio and plane
//! sub-packets and routes each to the matching decoder, per `spec.md` §4.7/§6.

use log::debug;

use crate::audio::AudioDecoder;
use crate::container::Header;
use crate::error::{corrupt_stream_error, Result};
use crate::plane::PlaneDecoder;

struct AudioSlot {
    decoder: AudioDecoder,
    enabled: bool,
}

/// Drives one Bink stream's frames: holds one [`AudioDecoder`] per audio track and one
/// [`PlaneDecoder`] per color plane, and knows how to slice an incoming frame buffer between
/// them.
pub struct FrameDriver {
    audio: Vec<AudioSlot>,
    alpha: Option<PlaneDecoder>,
    y: PlaneDecoder,
    u: Option<PlaneDecoder>,
    v: Option<PlaneDecoder>,
}

fn read_u32(buf: &[u8], pos: usize) -> Result<u32> {
    let bytes = buf.get(pos..pos + 4).ok_or(crate::error::Error::EndOfStream)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn slice(buf: &[u8], pos: usize, len: usize) -> Result<&[u8]> {
    buf.get(pos..pos + len).ok_or(crate::error::Error::EndOfStream)
}

impl FrameDriver {
    /// Builds one decoder per track/plane named in `header`. All audio tracks start enabled.
    pub fn new(header: &Header) -> Self {
        let audio = header
            .audio_tracks
            .iter()
            .map(|t| AudioSlot {
                decoder: AudioDecoder::new(t.sample_rate as u32, t.channels as usize),
                enabled: true,
            })
            .collect();

        let alpha = if header.has_alpha() {
            Some(PlaneDecoder::new(header.width as usize, header.height as usize))
        }
        else {
            None
        };

        let y = PlaneDecoder::new(header.width as usize, header.height as usize);

        let (u, v) = if header.is_grayscale() {
            (None, None)
        }
        else {
            let cw = (header.width as usize + 1) / 2;
            let ch = (header.height as usize + 1) / 2;
            (Some(PlaneDecoder::new(cw, ch)), Some(PlaneDecoder::new(cw, ch)))
        };

        FrameDriver { audio, alpha, y, u, v }
    }

    pub fn set_audio_enabled(&mut self, track_index: usize, enabled: bool) {
        if let Some(slot) = self.audio.get_mut(track_index) {
            slot.enabled = enabled;
        }
    }

    pub fn y(&self) -> &[u8] {
        self.y.current()
    }

    pub fn u(&self) -> Option<&[u8]> {
        self.u.as_ref().map(PlaneDecoder::current)
    }

    pub fn v(&self) -> Option<&[u8]> {
        self.v.as_ref().map(PlaneDecoder::current)
    }

    pub fn alpha(&self) -> Option<&[u8]> {
        self.alpha.as_ref().map(PlaneDecoder::current)
    }

    /// Decodes one frame's worth of sub-packets from `buf`. Returns one PCM vector per audio
    /// track, in track order (empty for a disabled track or a zero-length/zero-sample packet).
    /// Decoded plane data is retrievable afterward via [`Self::y`]/[`Self::u`]/[`Self::v`]/
    /// [`Self::alpha`].
    pub fn decode_frame(&mut self, buf: &[u8]) -> Result<Vec<Vec<i16>>> {
        let mut pos = 0usize;
        let mut audio_out = Vec::with_capacity(self.audio.len());

        for slot in &mut self.audio {
            let packet_size = read_u32(buf, pos)?;
            pos += 4;
            if packet_size == 0 {
                audio_out.push(Vec::new());
                continue;
            }
            if packet_size < 4 {
                return corrupt_stream_error("bink frame: audio packet size too small");
            }

            let sample_count = read_u32(buf, pos)?;
            pos += 4;
            let payload_len = packet_size as usize - 4;
            let payload = slice(buf, pos, payload_len)?;
            pos += payload_len;

            if sample_count == 0 || !slot.enabled {
                audio_out.push(Vec::new());
                continue;
            }
            audio_out.push(slot.decoder.decode_packet(payload, sample_count as usize)?);
        }

        if let Some(alpha) = &mut self.alpha {
            pos = Self::decode_plane(buf, pos, alpha)?;
        }

        pos = Self::decode_plane(buf, pos, &mut self.y)?;

        if let (Some(u), Some(v)) = (self.u.as_mut(), self.v.as_mut()) {
            pos = Self::decode_plane(buf, pos, u)?;
            let _ = Self::decode_plane(buf, pos, v)?;
        }

        debug!("bink frame decoded: {} bytes consumed of {}", pos, buf.len());
        Ok(audio_out)
    }

    fn decode_plane(buf: &[u8], pos: usize, plane: &mut PlaneDecoder) -> Result<usize> {
        let plane_size = read_u32(buf, pos)?;
        let pos = pos + 4;
        if plane_size < 4 {
            return corrupt_stream_error("bink frame: plane size too small");
        }
        let payload_len = plane_size as usize - 4;
        let payload = slice(buf, pos, payload_len)?;
        plane.decode(payload)?;
        Ok(pos + payload_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{AudioTrack, Validation};

    fn header(width: u32, height: u32, grayscale: bool, tracks: Vec<AudioTrack>) -> Header {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"BIKg");
        buf.extend_from_slice(&0u32.to_le_bytes()); // file size
        buf.extend_from_slice(&1u32.to_le_bytes()); // frame count
        buf.extend_from_slice(&0u32.to_le_bytes()); // max frame size
        buf.extend_from_slice(&1u32.to_le_bytes()); // frame count2
        buf.extend_from_slice(&width.to_le_bytes());
        buf.extend_from_slice(&height.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&30u32.to_le_bytes());
        let flags = if grayscale { 1u32 << 17 } else { 0 };
        buf.extend_from_slice(&flags.to_le_bytes());
        buf.extend_from_slice(&(tracks.len() as u32).to_le_bytes());

        for t in &tracks {
            buf.extend_from_slice(&0u16.to_le_bytes());
            buf.extend_from_slice(&t.channels.to_le_bytes());
        }
        for t in &tracks {
            buf.extend_from_slice(&t.sample_rate.to_le_bytes());
            buf.extend_from_slice(&t.flags.to_le_bytes());
        }
        for t in &tracks {
            buf.extend_from_slice(&t.id.to_le_bytes());
        }
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&100u32.to_le_bytes());

        crate::container::read_header(&buf, Validation::Minimal).unwrap()
    }

    #[test]
    fn builds_grayscale_driver_without_chroma_planes() {
        let h = header(16, 16, true, Vec::new());
        let driver = FrameDriver::new(&h);
        assert!(driver.u.is_none());
        assert!(driver.v.is_none());
        assert!(driver.alpha.is_none());
    }

    #[test]
    fn builds_color_driver_with_halved_chroma_planes() {
        let h = header(17, 17, false, Vec::new());
        let driver = FrameDriver::new(&h);
        assert_eq!(driver.u.as_ref().unwrap().width(), 16);
        assert_eq!(driver.v.as_ref().unwrap().height(), 16);
    }

    #[test]
    fn zero_audio_packet_size_yields_empty_pcm_without_advancing_sample_count_field() {
        let h = header(8, 8, true, vec![AudioTrack { sample_rate: 44_100, channels: 2, flags: 1 << 13, id: 1 }]);
        let mut driver = FrameDriver::new(&h);

        // audioPacketSize=0, then luma plane size-prefixed payload big enough for one all-done
        // (length=0 everywhere) block row.
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u32.to_le_bytes());
        let plane_payload = vec![0u8; 64];
        buf.extend_from_slice(&((plane_payload.len() + 4) as u32).to_le_bytes());
        buf.extend_from_slice(&plane_payload);

        let pcm = driver.decode_frame(&buf).unwrap();
        assert_eq!(pcm.len(), 1);
        assert!(pcm[0].is_empty());
    }
}
