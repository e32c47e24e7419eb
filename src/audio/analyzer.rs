use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use super::AudioSnapshot;

/// Samples per analysis block. At 44.1 kHz this yields ~43 blocks/s and a
/// ~43 Hz bin width for the 8-band mapping below.
pub const BLOCK_SIZE: usize = 1024;

// Fixed bin ranges over the lower half-spectrum, approximating perceptual
// bands at 44.1 kHz / 1024 samples:
//   0 sub-bass    20-60 Hz      1 bass        60-150 Hz
//   2 low-mid     150-400 Hz    3 mid         400-1 kHz
//   4 upper-mid   1-2.5 kHz     5 presence    2.5-5 kHz
//   6 brilliance  5-10 kHz      7 air         10-20 kHz
const BAND_START: [usize; 8] = [1, 2, 4, 10, 24, 58, 116, 232];
const BAND_END: [usize; 8] = [2, 4, 10, 24, 58, 116, 232, 465];

// Gain compensation per band; low frequencies carry most of the raw energy.
const BAND_GAIN: [f32; 8] = [0.3, 0.5, 0.8, 1.0, 1.5, 2.5, 4.0, 6.0];

// Beat detector constants: EMA weights for the low-band baseline, the
// attack threshold above baseline, and the per-block release factor.
const BASELINE_DECAY: f32 = 0.95;
const BEAT_THRESHOLD: f32 = 0.1;
const BEAT_RELEASE: f32 = 0.92;

/// Per-block spectral analysis: volume, 8-band spectrum and the beat pulse.
/// Owns the FFT plan and the beat detector's running state.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
    baseline: f32,
    beat: f32,
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(BLOCK_SIZE);
        Self {
            fft,
            scratch: vec![Complex::new(0.0, 0.0); BLOCK_SIZE],
            baseline: 0.0,
            beat: 0.0,
        }
    }

    /// Analyze one block of normalized mono samples. Blocks shorter than
    /// `BLOCK_SIZE` are zero-padded.
    pub fn analyze(&mut self, samples: &[f32], sensitivity: f32) -> AudioSnapshot {
        let n = samples.len().min(BLOCK_SIZE);

        let volume = if n > 0 {
            let mean_sq = samples[..n].iter().map(|s| s * s).sum::<f32>() / n as f32;
            mean_sq.sqrt() * sensitivity
        } else {
            0.0
        };

        for (i, slot) in self.scratch.iter_mut().enumerate() {
            *slot = if i < n {
                Complex::new(samples[i], 0.0)
            } else {
                Complex::new(0.0, 0.0)
            };
        }
        self.fft.process(&mut self.scratch);

        let mut spectrum = [0.0f32; 8];
        for b in 0..8 {
            let start = BAND_START[b];
            let end = BAND_END[b].min(BLOCK_SIZE / 2);
            let bins = (end - start).max(1);
            let energy: f32 = self.scratch[start..end].iter().map(|c| c.norm()).sum();
            spectrum[b] = (energy / bins as f32) * BAND_GAIN[b] * sensitivity;
        }

        let bass = (spectrum[0] + spectrum[1]) / 2.0;
        let mid = (spectrum[2] + spectrum[3] + spectrum[4]) / 3.0;
        let treble = (spectrum[5] + spectrum[6] + spectrum[7]) / 3.0;

        // Onset detector: a jump in summed low-band energy above the slow
        // moving average triggers an attack, otherwise the pulse decays.
        let low = spectrum[0] + spectrum[1] + spectrum[2];
        let diff = low - self.baseline;
        self.baseline = self.baseline * BASELINE_DECAY + low * (1.0 - BASELINE_DECAY);
        if diff > BEAT_THRESHOLD {
            self.beat = 1.0;
        } else {
            self.beat *= BEAT_RELEASE;
        }

        AudioSnapshot {
            volume,
            beat: self.beat,
            spectrum,
            bass,
            mid,
            treble,
        }
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_block(cycles_per_block: f32, amplitude: f32) -> Vec<f32> {
        (0..BLOCK_SIZE)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * cycles_per_block * i as f32
                    / BLOCK_SIZE as f32;
                amplitude * phase.sin()
            })
            .collect()
    }

    #[test]
    fn volume_scales_linearly_with_sensitivity() {
        let block = sine_block(10.0, 0.5);

        let v1 = SpectrumAnalyzer::new().analyze(&block, 1.0).volume;
        let v2 = SpectrumAnalyzer::new().analyze(&block, 2.0).volume;

        assert!(v1 > 0.0);
        assert!((v2 - 2.0 * v1).abs() < 1e-4);
    }

    #[test]
    fn low_tone_concentrates_in_band_zero() {
        // One cycle per block lands exactly in FFT bin 1, inside band 0.
        let block = sine_block(1.0, 0.8);
        let snap = SpectrumAnalyzer::new().analyze(&block, 1.0);

        for b in 4..8 {
            assert!(
                snap.spectrum[0] > snap.spectrum[b],
                "band 0 ({}) should exceed band {} ({})",
                snap.spectrum[0],
                b,
                snap.spectrum[b]
            );
        }
        assert!(snap.spectrum.iter().all(|&e| e >= 0.0));
    }

    #[test]
    fn beat_decays_by_release_factor() {
        let mut analyzer = SpectrumAnalyzer::new();

        // Loud low tone from silence: jump well above the 0.1 threshold.
        let loud = sine_block(1.0, 0.9);
        let snap = analyzer.analyze(&loud, 4.0);
        assert_eq!(snap.beat, 1.0);

        // Three silent blocks release the pulse by 0.92 each.
        let silence = vec![0.0f32; BLOCK_SIZE];
        let mut beat = 0.0;
        for _ in 0..3 {
            beat = analyzer.analyze(&silence, 4.0).beat;
        }
        assert!((beat - 0.92f32.powi(3)).abs() < 1e-4);
    }

    #[test]
    fn silence_produces_zero_snapshot() {
        let silence = vec![0.0f32; BLOCK_SIZE];
        let snap = SpectrumAnalyzer::new().analyze(&silence, 4.0);
        assert_eq!(snap.volume, 0.0);
        assert_eq!(snap.beat, 0.0);
        assert!(snap.spectrum.iter().all(|&e| e == 0.0));
    }
}
