// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Z-scan order shared by residue and DCT coefficient blocks.
//!
//! The 32-entry pair-index table below is the coded order over 4x4 sub-blocks; each pair index
//! `p` is a stand-in for the byte positions `2p` and `2p+1` in the 8x8 block, so the 32-entry
//! table expands pairwise into the full 64-entry permutation used to scatter decoded
//! coefficients/residues into row-major block order.

const SCAN32: [u8; 32] = [
    0, 2, 4, 6, 1, 3, 5, 7, 12, 22, 8, 10, 13, 23, 9, 11, 14, 16, 24, 26, 15, 17, 25, 27, 18, 20,
    28, 30, 19, 21, 29, 31,
];

/// The full 64-entry scan order: `SCAN[i]` is the row-major block position that the `i`-th
/// decoded coefficient/residue belongs at.
pub fn scan_table() -> [u8; 64] {
    let mut out = [0u8; 64];
    for (i, &p) in SCAN32.iter().enumerate() {
        out[2 * i] = 2 * p;
        out[2 * i + 1] = 2 * p + 1;
    }
    out
}

/// Scatters 64 raw (decode-order) values into row-major block order via [`scan_table`].
pub fn apply_i32(raw: &[i32; 64]) -> [i32; 64] {
    let table = scan_table();
    let mut out = [0i32; 64];
    for (i, &v) in raw.iter().enumerate() {
        out[table[i] as usize] = v;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_table_is_a_permutation() {
        let table = scan_table();
        let mut seen = [false; 64];
        for &pos in table.iter() {
            assert!(!seen[pos as usize], "scan table must be a bijection of 0..64");
            seen[pos as usize] = true;
        }
    }
}
