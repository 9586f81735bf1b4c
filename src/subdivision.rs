// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The subdivision state machine shared by residue blocks and DCT coefficient blocks.
//!
//! Both walk the same quad-tree-shaped set of `(index, mode)` ops over an 8x8 (64-position)
//! block, one bit plane at a time, gated by one bitstream bit per op. Where they differ is what
//! happens at a leaf: a residue leaf adds or sets `±mask`; a coefficient leaf reads its full
//! remaining magnitude in one shot. That difference is captured by the `on_leaf` callback passed
//! to `walk`; the tree-walking itself lives here once.
//!
//! The op queue is a plain growable `Vec` rather than the two-cursor arena `spec.md` describes —
//! the queue only ever grows within a single bit-plane pass (bounded well under the `2 * 64` slots
//! that note reserves) and is rebuilt fresh for the next pass, so a `Vec` gives the same FIFO
//! expansion order without hand-rolled cursor arithmetic.

use crate::bitreader::BitReader;
use crate::error::Result;

const RESIDUE_INITIAL_OPS: [(u8, u8); 4] = [(4, 0), (24, 0), (44, 0), (0, 2)];
const COEFF_INITIAL_OPS: [(u8, u8); 6] = [(4, 0), (24, 0), (44, 0), (1, 3), (2, 3), (3, 3)];

/// Walks one bit-plane's worth of the subdivision tree. `on_leaf(reader, pos)` is invoked for
/// every position that becomes significant this pass; it returns `true` to stop the walk
/// immediately (leftover, not-yet-visited ops are dropped, matching `spec.md` §9's note that
/// `maskCount` exhaustion mid-expansion is an immediate return, not a resumable pause).
fn walk(
    reader: &mut BitReader<'_>,
    initial_ops: &[(u8, u8)],
    mut on_leaf: impl FnMut(&mut BitReader<'_>, u8) -> Result<bool>,
) -> Result<()> {
    let mut ops: Vec<(u8, u8)> = Vec::with_capacity(128);
    ops.extend_from_slice(initial_ops);

    let mut cursor = 0;
    while cursor < ops.len() {
        let (index, mode) = ops[cursor];
        cursor += 1;

        if reader.read_bit()? == 0 {
            continue;
        }

        match mode {
            // Root: one deeper mode-1 op, plus four directly-probed leaf positions.
            0 => {
                ops.push((index + 4, 1));
                for k in 0..4 {
                    let pos = index + k;
                    if reader.read_bit()? != 0 {
                        ops.push((pos, 3));
                    }
                    else if on_leaf(reader, pos)? {
                        return Ok(());
                    }
                }
            }
            // Three mode-2 children.
            1 => {
                ops.push((index + 4, 2));
                ops.push((index + 8, 2));
                ops.push((index + 12, 2));
            }
            // Same probe pattern as mode 0, without spawning a further mode-1 child.
            2 => {
                for k in 0..4 {
                    let pos = index + k;
                    if reader.read_bit()? != 0 {
                        ops.push((pos, 3));
                    }
                    else if on_leaf(reader, pos)? {
                        return Ok(());
                    }
                }
            }
            // A single stashed leaf.
            3 => {
                if on_leaf(reader, index)? {
                    return Ok(());
                }
            }
            _ => unreachable!("subdivision op mode out of range"),
        }
    }
    Ok(())
}

/// Decodes a residue block: up to `mask_count` non-zero positions refined/discovered across
/// `bit_count` bit planes. Returns the 64-position residue buffer in raw (unscanned) order.
pub fn decode_residue(
    reader: &mut BitReader<'_>,
    mask_count: u32,
    bit_count: u32,
) -> Result<[i32; 64]> {
    let mut out = [0i32; 64];
    let mut discovered: Vec<u8> = Vec::new();
    let mut remaining = mask_count;

    for plane in (0..bit_count).rev() {
        let mask = 1i32 << plane;

        for &pos in &discovered {
            if reader.read_bit()? != 0 {
                let sign = if out[pos as usize] < 0 { -1 } else { 1 };
                out[pos as usize] += sign * mask;
                remaining -= 1;
                if remaining == 0 {
                    return Ok(out);
                }
            }
        }

        let mut stop = false;
        walk(reader, &RESIDUE_INITIAL_OPS, |r, pos| {
            let sign = r.read_bit()?;
            out[pos as usize] = if sign != 0 { -mask } else { mask };
            discovered.push(pos);
            remaining -= 1;
            stop = remaining == 0;
            Ok(stop)
        })?;
        if stop {
            return Ok(out);
        }
    }
    Ok(out)
}

/// Decodes a DCT coefficient block. `dc` is the already-decoded DC value (`quantCoeffs[0]`);
/// position 0 is not touched by the subdivision walk. Returns the 64-position coefficient buffer
/// in raw (unscanned) order.
pub fn decode_coefficients(reader: &mut BitReader<'_>, dc: i32) -> Result<[i32; 64]> {
    let mut out = [0i32; 64];
    out[0] = dc;

    let max_bit_count = reader.read(4)?;
    for bit_count in (0..max_bit_count).rev() {
        let mask = 1u32 << bit_count;

        walk(reader, &COEFF_INITIAL_OPS, |r, pos| {
            let magnitude = if bit_count == 0 {
                1
            }
            else {
                mask | r.read(bit_count)?
            };
            let sign = r.read_bit()?;
            out[pos as usize] = if sign != 0 { -(magnitude as i32) } else { magnitude as i32 };
            Ok(false)
        })?;
    }
    Ok(out)
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
    fn residue_mask_count_exhaustion_stops_immediately() {
        // bit_count=1 (single plane, mask=1), mask_count=1: the first op (4,0)'s gate bit is 1,
        // its first leaf probe decodes directly (probe bit 0) with sign 0 (+mask), which exhausts
        // mask_count before any other op in the queue is visited.
        let stream = reader_for(&[(1, 1), (0, 1), (0, 1)]);
        let mut r = BitReader::new(&stream);
        let out = decode_residue(&mut r, 1, 1).unwrap();
        assert_eq!(out[4], 1);
        assert_eq!(out.iter().filter(|&&v| v != 0).count(), 1);
    }

    #[test]
    fn coefficients_preserve_dc() {
        // max_bit_count=0: no bit planes at all, so only the DC value survives.
        let stream = reader_for(&[(0, 4)]);
        let mut r = BitReader::new(&stream);
        let out = decode_coefficients(&mut r, 42).unwrap();
        assert_eq!(out[0], 42);
        assert_eq!(out[1..].iter().filter(|&&v| v != 0).count(), 0);
    }
}
