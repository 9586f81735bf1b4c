// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A real-input discrete Fourier transform used by the audio path.
//!
//! `spec.md` §4.6 describes a split-radix real DFT but explicitly allows "any numerically
//! equivalent real FFT" since the audio decoder quantizes its output anyway. This implements the
//! classic "pack two reals per complex bin, run a half-length complex FFT, then unscramble"
//! technique: an in-place radix-2 Cooley-Tukey complex transform (`complex_fft`) over `n/2`
//! points, wrapped by the combine step that recovers the real spectrum (`forward`) or undoes it
//! (`inverse`). The wire layout produced matches `spec.md` exactly: `a[0] = R[0] + R[N/2]`,
//! `a[1] = R[0] - R[N/2]`, then interleaved `(Re, Im)` pairs for bins `1..N/2`.

use std::f32::consts::PI;

/// A real DFT of a fixed, power-of-two length `n`.
///
/// `n` is the audio decoder's `samplesPerFrame`, fixed for the lifetime of the decoder, so there
/// is nothing to precompute here beyond what `complex_fft` derives from `data.len()` on each call.
pub struct RealFft {
    n: usize,
}

impl RealFft {
    /// `n` must be a power of two and at least 2; this is an internal construction invariant
    /// derived from `AudioDecoder::samples_per_frame`, never user input.
    pub fn new(n: usize) -> Self {
        debug_assert!(n >= 2 && n.is_power_of_two(), "real FFT length must be a power of two >= 2");
        RealFft { n }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    /// Forward real DFT, in place. `data.len() == n`. On return, `data` holds the packed layout
    /// described in the module documentation.
    pub fn forward(&self, data: &mut [f32]) {
        debug_assert_eq!(data.len(), self.n);
        if self.n == 2 {
            let (r0, r1) = (data[0], data[1]);
            data[0] = r0 + r1;
            data[1] = r0 - r1;
            return;
        }
        complex_fft(data, self.n / 2, false);
        combine_real(data, 1);
        let h1r = data[0];
        data[0] = h1r + data[1];
        data[1] = h1r - data[1];
    }

    /// Inverse of [`Self::forward`], up to the conventional unscaled factor of `2/n` (the caller,
    /// `AudioDecoder`, applies that scale itself per `spec.md` §4.5 step 7).
    pub fn inverse(&self, data: &mut [f32]) {
        debug_assert_eq!(data.len(), self.n);
        if self.n == 2 {
            let (a0, a1) = (data[0], data[1]);
            data[0] = 0.5 * (a0 + a1);
            data[1] = 0.5 * (a0 - a1);
            return;
        }
        let h1r = data[0];
        data[0] = 0.5 * (h1r + data[1]);
        data[1] = 0.5 * (h1r - data[1]);
        combine_real(data, -1);
        complex_fft(data, self.n / 2, true);
    }
}

/// The real/imaginary unscrambling shared by forward and inverse: walks bin pairs
/// `(i1, i2) = (2i, 2i+1)` against their mirror `(i3, i4)` from the far end of `data` and rotates
/// by the per-bin twiddle, exactly the NR `realft` combine loop translated to 0-based indices.
fn combine_real(data: &mut [f32], isign: i32) {
    let n = data.len();
    let c1 = 0.5f32;
    let c2 = if isign == 1 { -0.5f32 } else { 0.5f32 };

    let mut theta = PI / (n as f32 / 2.0);
    if isign != 1 {
        theta = -theta;
    }
    let wtemp = (0.5 * theta).sin();
    let wpr = -2.0 * wtemp * wtemp;
    let wpi = theta.sin();
    let mut wr = 1.0 + wpr;
    let mut wi = wpi;

    let np3 = n + 3;
    for i in 2..=(n / 4) {
        let i1 = 2 * i - 2;
        let i2 = 2 * i - 1;
        let i3 = np3 - 2 - i2;
        let i4 = i3 + 1;

        let h1r = c1 * (data[i1] + data[i3]);
        let h1i = c1 * (data[i2] - data[i4]);
        let h2r = -c2 * (data[i2] + data[i4]);
        let h2i = c2 * (data[i1] - data[i3]);

        data[i1] = h1r + wr * h2r - wi * h2i;
        data[i2] = h1i + wr * h2i + wi * h2r;
        data[i3] = h1r - wr * h2r + wi * h2i;
        data[i4] = -h1i + wr * h2i + wi * h2r;

        let wtemp = wr;
        wr = wtemp * wpr - wi * wpi + wr;
        wi = wi * wpr + wtemp * wpi + wi;
    }
}

/// In-place radix-2 Cooley-Tukey FFT over `nn` complex points stored as interleaved
/// `(re, im)` pairs in `data` (`data.len() == 2 * nn`). `inverse` selects the sign of the
/// exponent; neither direction applies the `1/nn` normalization (the real-FFT wrapper above
/// folds that into its own documented scale).
fn complex_fft(data: &mut [f32], nn: usize, inverse: bool) {
    let n = nn * 2;

    // Bit-reversal permutation.
    let mut j = 0usize;
    for i in (0..n).step_by(2) {
        if j > i {
            data.swap(i, j);
            data.swap(i + 1, j + 1);
        }
        let mut m = nn;
        while m >= 2 && j >= m {
            j -= m;
            m >>= 1;
        }
        j += m;
    }

    let sign: f32 = if inverse { 1.0 } else { -1.0 };
    let mut mmax = 2usize;
    while n > mmax {
        let istep = mmax * 2;
        let theta = sign * (2.0 * PI / mmax as f32);
        let wtemp = (0.5 * theta).sin();
        let wpr = -2.0 * wtemp * wtemp;
        let wpi = theta.sin();
        let mut wr = 1.0f32;
        let mut wi = 0.0f32;

        let mut m = 0;
        while m < mmax {
            let mut i = m;
            while i < n {
                let k = i + mmax;
                let tempr = wr * data[k] - wi * data[k + 1];
                let tempi = wr * data[k + 1] + wi * data[k];
                data[k] = data[i] - tempr;
                data[k + 1] = data[i + 1] - tempi;
                data[i] += tempr;
                data[i + 1] += tempi;
                i += istep;
            }
            let wtemp = wr;
            wr = wtemp * wpr - wi * wpi + wr;
            wi = wi * wpr + wtemp * wpi + wi;
            m += 2;
        }
        mmax = istep;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_then_inverse_round_trips() {
        for &n in &[512usize, 1024, 2048] {
            let fft = RealFft::new(n);
            let original: Vec<f32> = (0..n).map(|i| ((i * 37) % 97) as f32 - 48.0).collect();

            let mut data = original.clone();
            fft.forward(&mut data);
            fft.inverse(&mut data);

            for i in 0..n {
                let scaled = data[i] * (2.0 / n as f32);
                assert!(
                    (scaled - original[i]).abs() < 1e-1,
                    "index {i}: {scaled} vs {}",
                    original[i]
                );
            }
        }
    }

    #[test]
    fn dc_only_signal_has_energy_only_in_bin_zero() {
        let n = 64;
        let fft = RealFft::new(n);
        let mut data = vec![1.0f32; n];
        fft.forward(&mut data);

        // a[0] = R0 + R(N/2), a[1] = R0 - R(N/2); a constant signal has R(N/2) == 0.
        assert!((data[0] - n as f32).abs() < 1e-2);
        assert!(data[1].abs() < 1e-2);
        for &v in &data[2..] {
            assert!(v.abs() < 1e-2);
        }
    }

    #[test]
    fn minimal_length_two_transform() {
        let fft = RealFft::new(2);
        let mut data = vec![3.0f32, 1.0f32];
        fft.forward(&mut data);
        assert_eq!(data, vec![4.0, 2.0]);
    }
}
