pub mod analyzer;
pub mod capture;

pub use analyzer::{SpectrumAnalyzer, BLOCK_SIZE};
pub use capture::AudioPipeline;

/// Latest computed audio features, overwritten in place once per capture
/// block (~43 Hz at 1024 samples / 44.1 kHz). Consumers always read a copy;
/// no history is kept here.
#[derive(Debug, Clone, Copy)]
pub struct AudioSnapshot {
    /// Sensitivity-scaled RMS of the last block.
    pub volume: f32,
    /// Decaying beat pulse, 1.0 on attack, ×0.92 per block on release.
    pub beat: f32,
    /// 8 perceptual band energies, sub-bass through air.
    pub spectrum: [f32; 8],
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
}

impl Default for AudioSnapshot {
    fn default() -> Self {
        Self {
            volume: 0.0,
            beat: 0.0,
            spectrum: [0.0; 8],
            bass: 0.0,
            mid: 0.0,
            treble: 0.0,
        }
    }
}
