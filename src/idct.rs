// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed-point 8x8 inverse DCT with per-position dequantizers.
//!
//! Two passes (columns, then rows) of the same 1-D 8-point butterfly, built from four fixed-point
//! constants (`C1..C4`, Q11) rather than the eight distinct per-frequency multipliers a "slow"
//! integer IDCT would use. Both passes shift intermediate products right by 11; the row pass's
//! output additionally goes through the `(x + 127) >> 8` saturating rounding rule.

use lazy_static::lazy_static;

const C1: i32 = 2217;
const C2: i32 = 2896;
const C3: i32 = 3784;
const C4: i32 = -5352;

const QUANTIZER_LEVELS: usize = 16;

lazy_static! {
    /// `ALL_QUANTIZERS[level]` is the 64-entry, scan-order dequantizer table selected by the
    /// 4-bit `quantizerI` read before each coefficient block's IDCT call. Built from a single
    /// base matrix (the usual low-frequency-favoring JPEG-style luminance weights, in the same
    /// scan order the coefficient decoder already emits into) scaled per level.
    pub static ref ALL_QUANTIZERS: [[i32; 64]; QUANTIZER_LEVELS] = build_quantizers();
}

const BASE_QUANT: [i32; 64] = [
    16, 11, 10, 16, 24, 40, 51, 61, 12, 12, 14, 19, 26, 58, 60, 55, 14, 13, 16, 24, 40, 57, 69, 56,
    14, 17, 22, 29, 51, 87, 80, 62, 18, 22, 37, 56, 68, 109, 103, 77, 24, 35, 55, 64, 81, 104, 113,
    92, 49, 64, 78, 87, 113, 121, 120, 101, 72, 92, 95, 98, 112, 100, 103, 99,
];

fn build_quantizers() -> [[i32; 64]; QUANTIZER_LEVELS] {
    let mut levels = [[0i32; 64]; QUANTIZER_LEVELS];
    for (level, table) in levels.iter_mut().enumerate() {
        // Doubling every four levels spans a wide dynamic range across the 16 selectable levels
        // while level 0 reproduces the base matrix exactly.
        let scale_num = 1i64 << (level as i64 / 4);
        let scale_den = match level % 4 {
            0 => 4,
            1 => 3,
            2 => 2,
            _ => 1,
        };
        for (pos, &base) in BASE_QUANT.iter().enumerate() {
            table[pos] = ((base as i64 * scale_num) / scale_den).max(1) as i32;
        }
    }
    levels
}

fn idct_1d(s: [i32; 8]) -> [i32; 8] {
    let p0 = s[0] + s[4];
    let p1 = s[0] - s[4];
    let p2 = ((s[2] - s[6]) * C2) >> 11;
    let p3 = ((s[2] + s[6]) * C2) >> 11;

    let e0 = p0 + p3;
    let e3 = p0 - p3;
    let e1 = p1 + p2;
    let e2 = p1 - p2;

    let o0 = ((s[1] * C3) >> 11) + ((s[7] * C1) >> 11);
    let o3 = ((s[1] * C1) >> 11) - ((s[7] * C3) >> 11);
    let o1 = ((s[3] * C4) >> 11) + ((s[5] * C1) >> 11);
    let o2 = ((s[3] * C1) >> 11) - ((s[5] * C4) >> 11);

    let f0 = o0 + o1;
    let f1 = o0 - o1;
    let f2 = o3 + o2;
    let f3 = o3 - o2;

    [e0 + f0, e1 + f2, e2 + f3, e3 + f1, e3 - f1, e2 - f3, e1 - f2, e0 - f0]
}

/// Applies the `(x + 127) >> 8` rounding rule without clamping. Intra blocks clamp this straight
/// to a byte; inter/motion-residue blocks first add it to a motion-compensated source sample so
/// clamping has to wait until after that addition.
#[inline]
fn round_sample(v: i32) -> i32 {
    (v + 127) >> 8
}

/// Saturates a summed sample (IDCT output, optionally plus a source byte) to `0..=255`.
#[inline]
pub fn clamp_to_byte(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Runs the two-pass IDCT over `coeffs` (already in row-major block order, not scan order; the
/// caller applies `scan::apply_i32()` before calling this), dequantizing with `quantizers`, and
/// returns the 64 rounded (but unclamped) output samples in row-major order.
pub fn idct(coeffs: &[i32; 64], quantizers: &[i32; 64]) -> [i32; 64] {
    let mut dequantized = [0i32; 64];
    for i in 0..64 {
        dequantized[i] = (coeffs[i] * quantizers[i]) >> 11;
    }

    let mut columns = [0i32; 64];
    for c in 0..8 {
        let col = [
            dequantized[c],
            dequantized[8 + c],
            dequantized[16 + c],
            dequantized[24 + c],
            dequantized[32 + c],
            dequantized[40 + c],
            dequantized[48 + c],
            dequantized[56 + c],
        ];

        if col[1..].iter().all(|&v| v == 0) {
            for r in 0..8 {
                columns[r * 8 + c] = col[0];
            }
        }
        else {
            let out = idct_1d(col);
            for r in 0..8 {
                columns[r * 8 + c] = out[r];
            }
        }
    }

    let mut result = [0i32; 64];
    for r in 0..8 {
        let row = [
            columns[r * 8],
            columns[r * 8 + 1],
            columns[r * 8 + 2],
            columns[r * 8 + 3],
            columns[r * 8 + 4],
            columns[r * 8 + 5],
            columns[r * 8 + 6],
            columns[r * 8 + 7],
        ];
        let out = idct_1d(row);
        for c in 0..8 {
            result[r * 8 + c] = round_sample(out[c]);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dc_only_block_is_constant() {
        let mut coeffs = [0i32; 64];
        coeffs[0] = 8;
        let mut quantizers = [0i32; 64];
        quantizers[0] = 1024;

        let block = idct(&coeffs, &quantizers);
        let first = block[0];
        assert!(block.iter().all(|&v| v == first));
    }

    #[test]
    fn all_zero_input_is_all_zero_after_saturation() {
        let coeffs = [0i32; 64];
        let quantizers = ALL_QUANTIZERS[0];
        let block = idct(&coeffs, &quantizers);
        // (0 + 127) >> 8 == 0 for every position.
        assert!(block.iter().all(|&v| v == 0));
        assert_eq!(clamp_to_byte(block[0]), 0);
    }

    #[test]
    fn quantizer_levels_are_monotonic_and_nonzero() {
        for pos in 0..64 {
            let mut prev = 0;
            for level in ALL_QUANTIZERS.iter() {
                assert!(level[pos] >= 1);
                assert!(level[pos] >= prev);
                prev = level[pos];
            }
        }
    }
}
