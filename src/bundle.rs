// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The bundle layer: typed symbol queues refilled once per block-row.
//!
//! A bundle is a small queue (`buffer`, `offset`, `length`) backing one field of the plane
//! decoder's per-block-row state. `offset == length` means empty (refillable); a refill that
//! reads a zero length advances `offset` to `length + 1`, which is a state `fill_*` also treats as
//! "not drained" and therefore leaves alone for the rest of the plane — the bundle's permanent
//! done flag described in `spec.md` §4.3.

use crate::bitreader::BitReader;
use crate::error::Result;
use crate::huffman::HuffmanTree;

/// `ceil(log2(minValueCount + addLines * blocks_per_row))`, the table-size rule shared by every
/// bundle kind (`minValueCount = 512`).
pub fn max_length_in_bits(add_lines: usize, blocks_per_row: usize) -> u32 {
    let values = 512 + add_lines * blocks_per_row;
    32 - (values.max(1) as u32 - 1).leading_zeros()
}

const RLE_RUN_LENGTHS: [usize; 4] = [4, 8, 12, 32];

/// A 4-bit-symbol bundle: block types, sub-block types, motion vectors, pattern bytes, pattern
/// run lengths.
pub struct Bundle4 {
    buffer: Vec<i32>,
    offset: usize,
    length: usize,
    max_length_in_bits: u32,
    signed: bool,
    tree: Option<HuffmanTree>,
}

impl Bundle4 {
    pub fn new(max_length_in_bits: u32, signed: bool) -> Self {
        Bundle4 {
            buffer: vec![0; 1usize << max_length_in_bits],
            offset: 0,
            length: 0,
            max_length_in_bits,
            signed,
            tree: None,
        }
    }

    /// Drains the bundle and reads a fresh Huffman tree, ready for the next plane decode.
    pub fn reset(&mut self, reader: &mut BitReader<'_>) -> Result<()> {
        self.offset = 0;
        self.length = 0;
        self.tree = Some(HuffmanTree::read(reader)?);
        Ok(())
    }

    #[inline]
    fn is_drained(&self) -> bool {
        self.offset == self.length
    }

    fn begin_fill(&mut self, reader: &mut BitReader<'_>) -> Result<Option<usize>> {
        if !self.is_drained() {
            return Ok(None);
        }
        let length = reader.read(self.max_length_in_bits)? as usize;
        if length == 0 {
            self.length = 0;
            self.offset = 1;
            return Ok(None);
        }
        self.length = length;
        self.offset = 0;
        Ok(Some(length))
    }

    /// RLE fill: nibble runs with escape codes 12..15 repeating the last emitted value.
    pub fn fill_rle(&mut self, reader: &mut BitReader<'_>) -> Result<()> {
        let length = match self.begin_fill(reader)? {
            Some(length) => length,
            None => return Ok(()),
        };

        if reader.read_bit()? != 0 {
            let value = reader.read(4)? as i32;
            for slot in self.buffer[..length].iter_mut() {
                *slot = value;
            }
            return Ok(());
        }

        let tree = self.tree.as_ref().expect("bundle not reset");
        let mut last_value = 0i32;
        let mut i = 0;
        while i < length {
            let v = tree.decode(reader)?;
            if v < 12 {
                self.buffer[i] = v as i32;
                last_value = v as i32;
                i += 1;
            }
            else {
                let run = RLE_RUN_LENGTHS[(v - 12) as usize].min(length - i);
                for slot in self.buffer[i..i + run].iter_mut() {
                    *slot = last_value;
                }
                i += run;
            }
        }
        Ok(())
    }

    /// Paired fill: each slot is two decoded nibbles packed `(high << 4) | low`.
    pub fn fill_pairs(&mut self, reader: &mut BitReader<'_>) -> Result<()> {
        let length = match self.begin_fill(reader)? {
            Some(length) => length,
            None => return Ok(()),
        };

        let tree = self.tree.as_ref().expect("bundle not reset");
        for slot in self.buffer[..length].iter_mut() {
            let low = tree.decode(reader)? as i32;
            let high = tree.decode(reader)? as i32;
            *slot = (high << 4) | low;
        }
        Ok(())
    }

    /// Simple fill: one decoded nibble per slot (or one nibble memset across every slot).
    pub fn fill_simple(&mut self, reader: &mut BitReader<'_>) -> Result<()> {
        let length = match self.begin_fill(reader)? {
            Some(length) => length,
            None => return Ok(()),
        };

        let tree = self.tree.as_ref().expect("bundle not reset");
        let is_memset = reader.read_bit()? != 0;
        let count = if is_memset { 1 } else { length };

        for slot in self.buffer[..count].iter_mut() {
            let mut v = tree.decode(reader)? as i32;
            if self.signed && v != 0 && reader.read_bit()? != 0 {
                v = -v;
            }
            *slot = v;
        }

        if is_memset {
            let v = self.buffer[0];
            for slot in self.buffer[..length].iter_mut() {
                *slot = v;
            }
        }
        Ok(())
    }

    #[inline]
    pub fn next(&mut self) -> i32 {
        let v = self.buffer[self.offset];
        self.offset += 1;
        v
    }
}

/// An 8-bit color bundle: 16 high-nibble trees switched by the previously decoded high nibble,
/// plus one shared low-nibble tree.
pub struct Bundle8 {
    buffer: Vec<u8>,
    offset: usize,
    length: usize,
    max_length_in_bits: u32,
    high_trees: Vec<HuffmanTree>,
    low_tree: Option<HuffmanTree>,
    last_tree_i: usize,
}

impl Bundle8 {
    pub fn new(max_length_in_bits: u32) -> Self {
        Bundle8 {
            buffer: vec![0; 1usize << max_length_in_bits],
            offset: 0,
            length: 0,
            max_length_in_bits,
            high_trees: Vec::new(),
            low_tree: None,
            last_tree_i: 0,
        }
    }

    pub fn reset(&mut self, reader: &mut BitReader<'_>) -> Result<()> {
        self.offset = 0;
        self.length = 0;
        self.last_tree_i = 0;
        let mut high_trees = Vec::with_capacity(16);
        for _ in 0..16 {
            high_trees.push(HuffmanTree::read(reader)?);
        }
        self.high_trees = high_trees;
        self.low_tree = Some(HuffmanTree::read(reader)?);
        Ok(())
    }

    #[inline]
    fn is_drained(&self) -> bool {
        self.offset == self.length
    }

    pub fn fill(&mut self, reader: &mut BitReader<'_>) -> Result<()> {
        if !self.is_drained() {
            return Ok(());
        }
        let length = reader.read(self.max_length_in_bits)? as usize;
        if length == 0 {
            self.length = 0;
            self.offset = 1;
            return Ok(());
        }
        self.length = length;
        self.offset = 0;

        let is_memset = reader.read_bit()? != 0;
        let count = if is_memset { 1 } else { length };
        let low_tree = self.low_tree.as_ref().expect("bundle not reset");

        for i in 0..count {
            let high = self.high_trees[self.last_tree_i].decode(reader)?;
            self.last_tree_i = high as usize;
            let low = low_tree.decode(reader)?;
            self.buffer[i] = (high << 4) | low;
        }

        if is_memset {
            let v = self.buffer[0];
            for slot in self.buffer[..length].iter_mut() {
                *slot = v;
            }
        }
        Ok(())
    }

    #[inline]
    pub fn next(&mut self) -> u8 {
        let v = self.buffer[self.offset];
        self.offset += 1;
        v
    }

    /// Returns the next `n` raw bytes without interpreting them (used by the Raw block type).
    pub fn next_span(&mut self, n: usize) -> &[u8] {
        let start = self.offset;
        self.offset += n;
        &self.buffer[start..start + n]
    }
}

/// A 16-bit DC-predictor bundle: the first value in each refill is absolute, the rest are
/// per-group (up to 8 samples) differential updates to a running accumulator.
pub struct Bundle16 {
    buffer: Vec<i32>,
    offset: usize,
    length: usize,
    max_length_in_bits: u32,
    start_bits: u32,
    signed: bool,
}

impl Bundle16 {
    pub fn new(max_length_in_bits: u32, start_bits: u32, signed: bool) -> Self {
        Bundle16 {
            buffer: vec![0; 1usize << max_length_in_bits],
            offset: 0,
            length: 0,
            max_length_in_bits,
            start_bits,
            signed,
        }
    }

    pub fn reset(&mut self) {
        self.offset = 0;
        self.length = 0;
    }

    #[inline]
    fn is_drained(&self) -> bool {
        self.offset == self.length
    }

    fn read_delta(&self, reader: &mut BitReader<'_>, bits: u32) -> Result<i32> {
        let magnitude = reader.read(bits)? as i32;
        if magnitude != 0 && reader.read_bit()? != 0 {
            Ok(-magnitude)
        }
        else {
            Ok(magnitude)
        }
    }

    pub fn fill(&mut self, reader: &mut BitReader<'_>) -> Result<()> {
        if !self.is_drained() {
            return Ok(());
        }
        let length = reader.read(self.max_length_in_bits)? as usize;
        if length == 0 {
            self.length = 0;
            self.offset = 1;
            return Ok(());
        }
        self.length = length;
        self.offset = 0;

        let mut acc = if self.signed {
            self.read_delta(reader, self.start_bits - 1)?
        }
        else {
            reader.read(self.start_bits)? as i32
        };
        self.buffer[0] = truncate16(acc);

        let mut i = 1;
        while i < length {
            let group_len = (length - i).min(8);
            let run_bits = reader.read(4)?;

            if run_bits == 0 {
                for slot in self.buffer[i..i + group_len].iter_mut() {
                    *slot = truncate16(acc);
                }
            }
            else {
                for slot in self.buffer[i..i + group_len].iter_mut() {
                    let delta = self.read_delta(reader, run_bits)?;
                    acc += delta;
                    *slot = truncate16(acc);
                }
            }
            i += group_len;
        }
        Ok(())
    }

    #[inline]
    pub fn next(&mut self) -> i32 {
        let v = self.buffer[self.offset];
        self.offset += 1;
        v
    }
}

#[inline]
fn truncate16(v: i32) -> i32 {
    v as i16 as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader_for(bits: &[(u32, u32)]) -> Vec<u8> {
        let mut flat = Vec::new();
        for &(value, n) in bits {
            for i in 0..n {
                flat.push(((value >> i) & 1) as u8);
            }
        }
        flat.resize(((flat.len() + 31) / 32) * 32, 0);
        let mut bytes = vec![0u8; flat.len() / 8];
        for (i, &b) in flat.iter().enumerate() {
            if b != 0 {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }
        bytes
    }

    #[test]
    fn fill_rle_memset_scenario() {
        // tree id 0, then length=5, memset bit=1, value=0xA.
        let mut stream = reader_for(&[(0, 4)]);
        stream.extend_from_slice(&reader_for(&[(5, 9), (1, 1), (0xA, 4)]));

        let mut r = BitReader::new(&stream);
        let mut bundle = Bundle4::new(9, false);
        bundle.reset(&mut r).unwrap();
        bundle.fill_rle(&mut r).unwrap();

        assert_eq!(&bundle.buffer[0..5], &[0xA, 0xA, 0xA, 0xA, 0xA]);
    }

    #[test]
    fn fill_rle_partial_stream_leaves_trailing_zeros() {
        // tree id 0 (identity, every code is 4 raw bits), length=8, memset=0, then symbols
        // {3, 12, 5} and nothing more: 3 stores directly, 12 repeats it 4x, 5 stores directly,
        // leaving the stream exhausted with two slots never written.
        let mut stream = reader_for(&[(0, 4)]);
        stream.extend_from_slice(&reader_for(&[(8, 9), (0, 1), (3, 4), (12, 4), (5, 4)]));

        let mut r = BitReader::new(&stream);
        let mut bundle = Bundle4::new(9, false);
        bundle.reset(&mut r).unwrap();

        let result = bundle.fill_rle(&mut r);
        assert!(result.is_err());
        assert_eq!(&bundle.buffer[0..6], &[3, 3, 3, 3, 3, 5]);
        assert_eq!(&bundle.buffer[6..8], &[0, 0]);
    }

    #[test]
    fn bundle16_unsigned_group_accumulates() {
        // start_bits=11, length=3: first=100, group run_bits=4 delta=5 (no sign) -> 105, then
        // run_bits=0 keeps the accumulator for the remaining slot.
        let stream = reader_for(&[(3, 9), (100, 11), (4, 4), (5, 4), (0, 1), (0, 4)]);
        let mut r = BitReader::new(&stream);

        let mut bundle = Bundle16::new(9, 11, false);
        bundle.fill(&mut r).unwrap();
        assert_eq!(bundle.next(), 100);
        assert_eq!(bundle.next(), 105);
        assert_eq!(bundle.next(), 105);
    }

    #[test]
    fn max_length_in_bits_matches_rule() {
        // minValueCount=512, addLines=0 => ceil(log2(512)) = 9.
        assert_eq!(max_length_in_bits(0, 100), 9);
    }
}
