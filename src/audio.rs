// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The audio path: per-packet quantized-coefficient unpacking, dequantization, inverse real FFT,
//! and overlap-add windowing into interleaved 16-bit PCM.

use log::trace;

use crate::bitreader::BitReader;
use crate::error::Result;
use crate::fft::RealFft;

/// The 25-entry critical-band edge table (Hz) used to partition coefficients into quantizer
/// bands. Values above `sample_rate / 2` are clipped when building the per-decoder band table.
const CRITICAL_FREQUENCIES: [u32; 25] = [
    100, 200, 300, 400, 510, 630, 770, 920, 1080, 1270, 1480, 1720, 2000, 2320, 2700, 3150, 3700,
    4400, 5300, 6400, 7700, 9500, 12000, 15500, 24500,
];

/// The run-length table selected by the 4-bit index read when a coefficient run is not the
/// default 8.
const RUN_LENGTHS: [usize; 16] =
    [2, 3, 4, 5, 6, 8, 9, 10, 11, 12, 13, 14, 15, 16, 32, 64];

/// Decodes one audio track's packets into interleaved 16-bit PCM.
///
/// One `AudioDecoder` is constructed per track and lives for the file's duration; `decode_packet`
/// is called once per demuxed audio sub-packet and may internally run several overlap-add blocks
/// to consume the full `sample_count` the packet declares.
pub struct AudioDecoder {
    samples_per_frame: usize,
    samples_per_window: usize,
    samples_per_block: usize,
    /// Upper-edge coefficient bin index for each quantizer band, ascending, last entry always
    /// `samples_per_frame / 2`.
    bands: Vec<usize>,
    fft: RealFft,
    /// Coefficient scratch buffer, reused across blocks.
    coeffs: Vec<f32>,
    /// Last `samples_per_window` PCM samples of the previous block, pending cross-fade.
    window: Vec<i32>,
    first_block: bool,
}

impl AudioDecoder {
    /// `sample_rate` is the track's own rate (e.g. 44100), not multiplied by `channels`.
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        let base_len = if sample_rate >= 44_100 {
            2048
        }
        else if sample_rate >= 22_050 {
            1024
        }
        else {
            512
        };
        let samples_per_frame = base_len * channels;
        let samples_per_window = samples_per_frame / 16;
        let samples_per_block = samples_per_frame - samples_per_window;

        // `spec.md` §3: the decoder's internal notion of "sample rate" for mapping critical-band
        // edges to coefficient bins is the combined channel rate.
        let combined_rate = sample_rate * channels as u32;
        let nyquist_bin = samples_per_frame / 2;
        let mut bands = Vec::with_capacity(CRITICAL_FREQUENCIES.len() + 1);
        for &freq in CRITICAL_FREQUENCIES.iter() {
            let clipped = freq.min(combined_rate / 2);
            let bin = (clipped as u64 * samples_per_frame as u64 / combined_rate as u64) as usize;
            let bin = bin.min(nyquist_bin);
            if bands.last().copied() != Some(bin) {
                bands.push(bin);
            }
        }
        if bands.last().copied() != Some(nyquist_bin) {
            bands.push(nyquist_bin);
        }

        AudioDecoder {
            samples_per_frame,
            samples_per_window,
            samples_per_block,
            bands,
            fft: RealFft::new(samples_per_frame),
            coeffs: vec![0.0; samples_per_frame],
            window: vec![0; samples_per_window],
            first_block: true,
        }
    }

    pub fn samples_per_block(&self) -> usize {
        self.samples_per_block
    }

    /// Decodes one packet's worth of bitstream (already sliced to `packetSize - 4` bytes),
    /// running as many overlap-add blocks as needed to produce `sample_count` samples, and
    /// returns the interleaved 16-bit PCM.
    pub fn decode_packet(&mut self, buf: &[u8], sample_count: usize) -> Result<Vec<i16>> {
        let mut reader = BitReader::new(buf);
        let mut remaining = sample_count;
        let mut out = Vec::with_capacity(sample_count);

        while remaining > 0 {
            let block = self.decode_block(&mut reader)?;
            out.extend_from_slice(&block);
            remaining -= remaining.min(self.samples_per_block);
        }
        Ok(out)
    }

    fn band_for_bin(&self, bin: usize) -> usize {
        for (i, &edge) in self.bands.iter().enumerate() {
            if bin < edge {
                return i;
            }
        }
        self.bands.len() - 1
    }

    fn decode_block(&mut self, reader: &mut BitReader<'_>) -> Result<Vec<i16>> {
        reader.align_to_word();

        self.coeffs[0] = reader.read_float29()?;
        self.coeffs[1] = reader.read_float29()?;

        let mut quantizers = Vec::with_capacity(self.bands.len());
        for _ in 0..self.bands.len() {
            let e = reader.read(8)? as f64;
            quantizers.push(10f64.powf(0.066_399_999 * e) as f32);
        }

        for slot in self.coeffs[2..].iter_mut() {
            *slot = 0.0;
        }

        let mut i = 2usize;
        while i < self.samples_per_frame {
            let run = if reader.read_bit()? == 0 {
                8
            }
            else {
                let idx = reader.read(4)? as usize;
                8 * RUN_LENGTHS[idx]
            };
            let run = run.min(self.samples_per_frame - i);

            let coeff_bits = reader.read(4)?;
            if coeff_bits == 0 {
                i += run;
                continue;
            }
            for _ in 0..run {
                self.coeffs[i] = reader.read_signed_magnitude(coeff_bits)? as f32;
                i += 1;
            }
        }

        for i in 2..self.samples_per_frame {
            let bin = i / 2;
            let band = self.band_for_bin(bin);
            self.coeffs[i] *= quantizers[band];
        }

        self.fft.inverse(&mut self.coeffs);

        let scale = 2.0 / (self.samples_per_frame as f32).sqrt();
        let mut samples = vec![0i32; self.samples_per_frame];
        for (dst, &src) in samples.iter_mut().zip(self.coeffs.iter()) {
            *dst = (src * scale).round().clamp(i16::MIN as f32, i16::MAX as f32) as i32;
        }

        let w = self.samples_per_window;
        let mut out = Vec::with_capacity(self.samples_per_block);

        if self.first_block {
            for &s in &samples[..self.samples_per_block] {
                out.push(s as i16);
            }
        }
        else {
            for i in 0..w {
                let blended = (samples[i] * i as i32 + self.window[i] * (w as i32 - i as i32)) / w as i32;
                out.push(blended.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
            }
            for &s in &samples[w..self.samples_per_block] {
                out.push(s as i16);
            }
        }

        self.window.copy_from_slice(&samples[self.samples_per_frame - w..]);
        self.first_block = false;

        trace!(
            "bink audio block: {} samples out, {} quantizer bands",
            out.len(),
            self.bands.len()
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_per_frame_thresholds() {
        assert_eq!(AudioDecoder::new(44_100, 2).samples_per_frame, 4096);
        assert_eq!(AudioDecoder::new(22_050, 2).samples_per_frame, 2048);
        assert_eq!(AudioDecoder::new(11_025, 2).samples_per_frame, 1024);
    }

    #[test]
    fn band_table_ends_at_nyquist_bin() {
        let dec = AudioDecoder::new(44_100, 2);
        assert_eq!(*dec.bands.last().unwrap(), dec.samples_per_frame / 2);
        assert!(dec.bands.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn all_zero_coefficient_packet_produces_silence_after_first_block() {
        // An all-zero bitstream: two zero floats, all-zero quantizer exponents, then every
        // coefficient run reads coeffBits=0 (no sign data needed), producing silence. The buffer
        // is sized generously large so the all-zero reads never hit end-of-stream.
        let mut dec = AudioDecoder::new(22_050, 2);
        let bytes = vec![0u8; dec.samples_per_frame * 4];
        let pcm = dec.decode_packet(&bytes, dec.samples_per_block()).unwrap();
        assert!(pcm.iter().all(|&s| s == 0));
    }
}
