// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The plane decoder: the block-row driver that refills bundles once per row and dispatches each
//! 8x8 (or 16x16, for scaled) block to its decoder.
//!
//! One `PlaneDecoder` is built per color plane (Y, U, V, or alpha) and reused for the stream's
//! lifetime; each call to [`PlaneDecoder::decode`] swaps the double buffer, decodes one frame's
//! worth of blocks from a freshly constructed [`BitReader`], and reports how many bytes of the
//! input it consumed (word-aligned, per `spec.md` §3).

use log::trace;

use crate::bitreader::BitReader;
use crate::bundle::{max_length_in_bits, Bundle16, Bundle4, Bundle8};
use crate::error::{unsupported_error, Result};
use crate::idct::{self, ALL_QUANTIZERS};
use crate::scan::{self, scan_table};
use crate::subdivision;

fn round_up_to_8(v: usize) -> usize {
    (v + 7) & !7
}

/// One color plane's double-buffered decode state.
pub struct PlaneDecoder {
    /// Padded to a multiple of 8 in each dimension, per `spec.md` §3.
    width: usize,
    height: usize,
    buffers: [Vec<u8>; 2],
    cur: usize,

    block_type: Bundle4,
    sub_block_type: Bundle4,
    colors: Bundle8,
    pattern: Bundle4,
    /// Owns a Huffman tree at `reset` like every other bundle (`spec.md` §3 lists it among the
    /// ten), but `spec.md` §4.4 step 1's per-block-row refill list never refills it and no block
    /// decoder ever calls `next()` on it — a vestigial data-model entry with no live consumer.
    pattern_colors: Bundle8,
    pattern_lengths: Bundle4,
    x_motion: Bundle4,
    y_motion: Bundle4,
    dc_intra: Bundle16,
    dc_inter: Bundle16,
}

impl PlaneDecoder {
    /// `width`/`height` are the plane's natural dimensions (already halved for chroma); they are
    /// rounded up to a multiple of 8 here for the backing buffers, matching `spec.md` §3.
    pub fn new(width: usize, height: usize) -> Self {
        let width = round_up_to_8(width.max(1));
        let height = round_up_to_8(height.max(1));
        let blocks_per_row = width / 8;
        let size = width * height;

        // `spec.md` §3 leaves `addLines` per-bundle unspecified beyond the shared formula; block
        // type/sub-block type/motion vectors/DC predictors need one symbol per block, while
        // colors/pattern/pattern-lengths/pattern-colors can be asked for up to 8 symbols per block
        // (one per row, e.g. Raw's 8-row copy or Pattern-Fill's 8 pattern bytes). See DESIGN.md.
        let one_per_block = max_length_in_bits(0, blocks_per_row);
        let eight_per_block = max_length_in_bits(8, blocks_per_row);

        PlaneDecoder {
            width,
            height,
            buffers: [vec![0u8; size], vec![0u8; size]],
            cur: 0,
            block_type: Bundle4::new(one_per_block, false),
            sub_block_type: Bundle4::new(one_per_block, false),
            colors: Bundle8::new(eight_per_block),
            pattern: Bundle4::new(eight_per_block, false),
            pattern_colors: Bundle8::new(eight_per_block),
            pattern_lengths: Bundle4::new(eight_per_block, false),
            x_motion: Bundle4::new(one_per_block, true),
            y_motion: Bundle4::new(one_per_block, true),
            dc_intra: Bundle16::new(one_per_block, 11, false),
            dc_inter: Bundle16::new(one_per_block, 11, true),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// The most recently decoded plane, in scanline order.
    pub fn current(&self) -> &[u8] {
        &self.buffers[self.cur]
    }

    /// Decodes one frame's plane from `buf`, returning the number of bytes consumed (word
    /// aligned). `buf` need not be exactly one word-multiple long; trailing bytes beyond what the
    /// bit reader consumes are the caller's to reclaim via the returned count.
    pub fn decode(&mut self, buf: &[u8]) -> Result<usize> {
        self.cur ^= 1;

        let aligned_len = buf.len() - (buf.len() % 4);
        let mut reader = BitReader::new(&buf[..aligned_len]);

        self.block_type.reset(&mut reader)?;
        self.sub_block_type.reset(&mut reader)?;
        self.colors.reset(&mut reader)?;
        self.pattern.reset(&mut reader)?;
        self.pattern_colors.reset(&mut reader)?;
        self.pattern_lengths.reset(&mut reader)?;
        self.x_motion.reset(&mut reader)?;
        self.y_motion.reset(&mut reader)?;
        self.dc_intra.reset();
        self.dc_inter.reset();

        let blocks_w = self.width / 8;
        let blocks_h = self.height / 8;

        for by in 0..blocks_h {
            let y = by * 8;

            self.block_type.fill_rle(&mut reader)?;
            self.sub_block_type.fill_rle(&mut reader)?;
            self.colors.fill(&mut reader)?;
            self.pattern.fill_pairs(&mut reader)?;
            self.x_motion.fill_simple(&mut reader)?;
            self.y_motion.fill_simple(&mut reader)?;
            self.dc_intra.fill(&mut reader)?;
            self.dc_inter.fill(&mut reader)?;
            self.pattern_lengths.fill_simple(&mut reader)?;

            let mut bx = 0usize;
            while bx < blocks_w {
                let x = bx * 8;
                let block_type = self.block_type.next() as u8;
                self.dispatch_block(&mut reader, x, y, by, block_type)?;
                // A Scaled block's 16x16 output spans this column and the next; the adjacent
                // column's block type is not separately coded, per `spec.md` §4.4 type 1's
                // "advance x by 8 after dispatch" (on top of the loop's own 8px step).
                bx += if block_type == 1 { 2 } else { 1 };
            }

            trace!("bink plane block row {}/{} decoded", by + 1, blocks_h);
        }

        reader.align_to_word();
        Ok(reader.words_consumed() * 4)
    }

    fn dispatch_block(
        &mut self,
        reader: &mut BitReader<'_>,
        x: usize,
        y: usize,
        by: usize,
        block_type: u8,
    ) -> Result<()> {
        match block_type {
            0 => self.decode_skip(x, y)?,
            1 => self.decode_scaled(reader, x, y, by)?,
            2 => self.decode_motion(reader, x, y)?,
            3 => {
                let block = self.decode_run_fill(reader)?;
                self.write_block(x, y, &block);
            }
            4 => self.decode_motion_residue(reader, x, y)?,
            5 => {
                let block = self.decode_intra(reader)?;
                self.write_block(x, y, &block);
            }
            6 => {
                let block = self.decode_fill_block();
                self.write_block(x, y, &block);
            }
            7 => self.decode_inter(reader, x, y)?,
            8 => {
                let block = self.decode_pattern_fill(reader)?;
                self.write_block(x, y, &block);
            }
            9 => {
                let block = self.decode_raw();
                self.write_block(x, y, &block);
            }
            _ => return unsupported_error("bink video: block type out of range"),
        }
        Ok(())
    }

    // -- source/target access -------------------------------------------------------------

    fn write_block(&mut self, x: usize, y: usize, block: &[u8; 64]) {
        let width = self.width;
        let target = &mut self.buffers[self.cur];
        for row in 0..8 {
            let dst = (y + row) * width + x;
            target[dst..dst + 8].copy_from_slice(&block[row * 8..row * 8 + 8]);
        }
    }

    fn write_block_16(&mut self, x: usize, y: usize, block: &[u8; 64]) {
        let width = self.width;
        let height = self.height;
        let target = &mut self.buffers[self.cur];
        for row in 0..16 {
            let dy = y + row;
            if dy >= height {
                break;
            }
            let src_row = row / 2;
            for col in 0..16 {
                let dx = x + col;
                if dx >= width {
                    break;
                }
                target[dy * width + dx] = block[src_row * 8 + col / 2];
            }
        }
    }

    fn read_source_block(&self, src_x: i32, src_y: i32) -> Result<[u8; 64]> {
        let width = self.width as i32;
        let height = self.height as i32;
        if src_x < 0 || src_y < 0 || src_x + 8 > width || src_y + 8 > height {
            return crate::error::corrupt_stream_error("bink video: motion vector out of range");
        }
        let (src_x, src_y) = (src_x as usize, src_y as usize);
        let w = self.width;
        let source = &self.buffers[1 - self.cur];
        let mut block = [0u8; 64];
        for row in 0..8 {
            let off = (src_y + row) * w + src_x;
            block[row * 8..row * 8 + 8].copy_from_slice(&source[off..off + 8]);
        }
        Ok(block)
    }

    // -- per-block-type decoders ------------------------------------------------------------

    fn decode_skip(&mut self, x: usize, y: usize) -> Result<()> {
        let block = self.read_source_block(x as i32, y as i32)?;
        self.write_block(x, y, &block);
        Ok(())
    }

    fn decode_motion(&mut self, reader: &mut BitReader<'_>, x: usize, y: usize) -> Result<()> {
        let dx = self.x_motion.next();
        let dy = self.y_motion.next();
        let _ = reader;
        let block = self.read_source_block(x as i32 + dx, y as i32 + dy)?;
        self.write_block(x, y, &block);
        Ok(())
    }

    fn decode_motion_residue(
        &mut self,
        reader: &mut BitReader<'_>,
        x: usize,
        y: usize,
    ) -> Result<()> {
        let dx = self.x_motion.next();
        let dy = self.y_motion.next();
        let base = self.read_source_block(x as i32 + dx, y as i32 + dy)?;

        let mask_count = reader.read(7)?;
        let bit_count = reader.read(3)?;
        let raw = subdivision::decode_residue(reader, mask_count, bit_count)?;
        let residue = scan::apply_i32(&raw);

        let mut block = [0u8; 64];
        for i in 0..64 {
            block[i] = (base[i] as i32 + residue[i]).clamp(0, 255) as u8;
        }
        self.write_block(x, y, &block);
        Ok(())
    }

    fn decode_inter(&mut self, reader: &mut BitReader<'_>, x: usize, y: usize) -> Result<()> {
        let dx = self.x_motion.next();
        let dy = self.y_motion.next();
        let base = self.read_source_block(x as i32 + dx, y as i32 + dy)?;

        let dc = self.dc_inter.next();
        let coeffs = self.decode_coeff_block(reader, dc)?;

        let mut block = [0u8; 64];
        for i in 0..64 {
            block[i] = (base[i] as i32 + coeffs[i]).clamp(0, 255) as u8;
        }
        Ok(self.write_block(x, y, &block))
    }

    fn decode_intra(&mut self, reader: &mut BitReader<'_>) -> Result<[u8; 64]> {
        let dc = self.dc_intra.next();
        let coeffs = self.decode_coeff_block(reader, dc)?;
        let mut block = [0u8; 64];
        for i in 0..64 {
            block[i] = idct::clamp_to_byte(coeffs[i]);
        }
        Ok(block)
    }

    /// Shared by Intra and Inter: decode the coefficient bit planes, reorder through the scan
    /// table, read the quantizer index, and run the IDCT. Returns rounded-but-unclamped samples
    /// (Intra clamps immediately; Inter must add a motion-compensated source first).
    fn decode_coeff_block(&mut self, reader: &mut BitReader<'_>, dc: i32) -> Result<[i32; 64]> {
        let raw = subdivision::decode_coefficients(reader, dc)?;
        let scanned = scan::apply_i32(&raw);
        let quantizer_i = reader.read(4)? as usize;
        Ok(idct::idct(&scanned, &ALL_QUANTIZERS[quantizer_i]))
    }

    fn decode_fill_block(&mut self) -> [u8; 64] {
        let color = self.colors.next();
        [color; 64]
    }

    fn decode_pattern_fill(&mut self, _reader: &mut BitReader<'_>) -> Result<[u8; 64]> {
        let c1 = self.colors.next();
        let c2 = self.colors.next();
        let mut block = [0u8; 64];
        for row in 0..8 {
            let byte = self.pattern.next() as u8;
            let low = byte & 0xF;
            let high = byte >> 4;
            for lane in 0..4 {
                block[row * 8 + lane] = if (low >> lane) & 1 != 0 { c1 } else { c2 };
            }
            for lane in 0..4 {
                block[row * 8 + 4 + lane] = if (high >> lane) & 1 != 0 { c1 } else { c2 };
            }
        }
        Ok(block)
    }

    fn decode_raw(&mut self) -> [u8; 64] {
        let mut block = [0u8; 64];
        for row in 0..8 {
            let span = self.colors.next_span(8);
            block[row * 8..row * 8 + 8].copy_from_slice(span);
        }
        block
    }

    fn decode_run_fill(&mut self, _reader: &mut BitReader<'_>) -> Result<[u8; 64]> {
        let table = scan_table();
        let mut raster = [0u8; 64];
        let mut i = 0usize;
        while i < 64 {
            let run = (self.pattern_lengths.next() as usize + 1).min(64 - i);
            let color = self.colors.next();
            for _ in 0..run {
                raster[table[i] as usize] = color;
                i += 1;
            }
        }
        Ok(raster)
    }

    fn decode_scaled(
        &mut self,
        reader: &mut BitReader<'_>,
        x: usize,
        y: usize,
        by: usize,
    ) -> Result<()> {
        let sub_type = self.sub_block_type.next() as u8;
        let block = match sub_type {
            3 => self.decode_run_fill(reader)?,
            5 => self.decode_intra(reader)?,
            6 => self.decode_fill_block(),
            8 => self.decode_pattern_fill(reader)?,
            9 => self.decode_raw(),
            _ => return unsupported_error("bink video: scaled sub-block type out of range"),
        };

        // Odd block-rows skip the write: the even row above already emitted the full 16x16
        // output that covers this row too (`spec.md` §3 invariant).
        if by % 2 == 0 {
            self.write_block_16(x, y, &block);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits_to_bytes(bits: &[u8]) -> Vec<u8> {
        let mut padded = bits.to_vec();
        padded.resize(((padded.len() + 31) / 32) * 32, 0);
        let mut bytes = vec![0u8; padded.len() / 8];
        for (i, &b) in padded.iter().enumerate() {
            if b != 0 {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }
        bytes
    }

    fn push_bits(out: &mut Vec<u8>, value: u32, n: u32) {
        for i in 0..n {
            out.push(((value >> i) & 1) as u8);
        }
    }

    fn identity_tree_id() -> Vec<u8> {
        let mut v = Vec::new();
        push_bits(&mut v, 0, 4);
        v
    }

    /// Builds a minimal one-block-row, one-block-column plane bitstream that decodes to a single
    /// Fill block of the given color, using tree id 0 (identity) for every Huffman tree the
    /// bundles read during `reset`.
    fn fill_stream(color: u8) -> Vec<u8> {
        let mut bits = Vec::new();

        // block_type tree, sub_block_type tree, colors (16 high trees + 1 low tree), pattern
        // tree, pattern_colors (17 trees), pattern_lengths tree, x_motion tree, y_motion tree.
        for _ in 0..(1 + 1 + 17 + 1 + 17 + 1 + 1 + 1) {
            bits.extend(identity_tree_id());
        }

        // block_type.fill_rle: length=1, memset bit=1, value=6 (Fill).
        push_bits(&mut bits, 1, 9);
        push_bits(&mut bits, 1, 1);
        push_bits(&mut bits, 6, 4);

        // sub_block_type.fill_rle: length=0 (done).
        push_bits(&mut bits, 0, 9);

        // colors.fill: length=1, memset=1, high nibble (identity tree -> raw 4 bits), low nibble.
        push_bits(&mut bits, 1, 9);
        push_bits(&mut bits, 1, 1);
        push_bits(&mut bits, (color >> 4) as u32, 4);
        push_bits(&mut bits, (color & 0xF) as u32, 4);

        // pattern.fill_pairs: length=0.
        push_bits(&mut bits, 0, 9);

        // x_motion.fill_simple: length=0.
        push_bits(&mut bits, 0, 9);
        // y_motion.fill_simple: length=0.
        push_bits(&mut bits, 0, 9);

        // dc_intra.fill: length=0.
        push_bits(&mut bits, 0, 9);
        // dc_inter.fill: length=0.
        push_bits(&mut bits, 0, 9);

        // pattern_lengths.fill_simple: length=0.
        push_bits(&mut bits, 0, 9);

        bits_to_bytes(&bits)
    }

    #[test]
    fn single_fill_block_plane() {
        let mut plane = PlaneDecoder::new(8, 8);
        let buf = fill_stream(0x42);
        let consumed = plane.decode(&buf).unwrap();
        assert!(consumed <= buf.len());
        assert!(plane.current().iter().all(|&b| b == 0x42));
    }

    #[test]
    fn decode_is_word_aligned() {
        let mut plane = PlaneDecoder::new(8, 8);
        let buf = fill_stream(0x11);
        let consumed = plane.decode(&buf).unwrap();
        assert_eq!(consumed % 4, 0);
    }

    #[test]
    fn dimensions_round_up_to_8() {
        let plane = PlaneDecoder::new(10, 3);
        assert_eq!(plane.width(), 16);
        assert_eq!(plane.height(), 8);
    }
}
