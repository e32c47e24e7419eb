use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

/// Process-wide configuration, written by the control surface and read by
/// every subsystem. Each field is independently atomic; a reader may see a
/// mix of old and new values across fields, which is acceptable because all
/// of them are cosmetic and settle within one frame.
pub struct SettingsStore {
    brightness: AtomicU32,
    sensitivity: AtomicU32,     // f32 bits
    noise_threshold: AtomicU32, // f32 bits
    effect: AtomicI32,          // -1 = auto
    auto_loop: AtomicBool,
    effect_duration: AtomicU32, // seconds per effect in auto mode
    mode_speed: AtomicU32,      // seconds between sub-mode changes
    ingest_enabled: AtomicBool,
}

/// Per-tick copy handed to effects.
#[derive(Debug, Clone, Copy)]
pub struct EffectSettings {
    pub brightness: u8,
    pub sensitivity: f32,
    pub noise_threshold: f32,
    pub mode_speed: u32,
}

/// Serde mirror of the store, for the optional JSON settings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsFile {
    pub brightness: u32,
    pub sensitivity: f32,
    pub noise_threshold: f32,
    pub effect: i32,
    pub auto_loop: bool,
    pub effect_duration: u32,
    pub mode_speed: u32,
    pub ingest_enabled: bool,
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self {
            brightness: 180,
            sensitivity: 4.0,
            noise_threshold: 0.1,
            effect: -1,
            auto_loop: true,
            effect_duration: 5,
            mode_speed: 4,
            ingest_enabled: false,
        }
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::from_file_values(&SettingsFile::default())
    }
}

impl SettingsStore {
    pub fn from_file_values(file: &SettingsFile) -> Self {
        Self {
            brightness: AtomicU32::new(file.brightness.min(255)),
            sensitivity: AtomicU32::new(file.sensitivity.to_bits()),
            noise_threshold: AtomicU32::new(file.noise_threshold.to_bits()),
            effect: AtomicI32::new(file.effect),
            auto_loop: AtomicBool::new(file.auto_loop),
            effect_duration: AtomicU32::new(file.effect_duration),
            mode_speed: AtomicU32::new(file.mode_speed),
            ingest_enabled: AtomicBool::new(file.ingest_enabled),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading settings file {:?}", path.as_ref()))?;
        let file: SettingsFile = serde_json::from_str(&data).context("parsing settings file")?;
        Ok(Self::from_file_values(&file))
    }

    pub fn brightness(&self) -> u8 {
        self.brightness.load(Ordering::Relaxed).min(255) as u8
    }

    pub fn set_brightness(&self, value: u32) {
        self.brightness.store(value.min(255), Ordering::Relaxed);
    }

    pub fn sensitivity(&self) -> f32 {
        f32::from_bits(self.sensitivity.load(Ordering::Relaxed))
    }

    pub fn set_sensitivity(&self, value: f32) {
        self.sensitivity
            .store(value.max(0.0).to_bits(), Ordering::Relaxed);
    }

    pub fn noise_threshold(&self) -> f32 {
        f32::from_bits(self.noise_threshold.load(Ordering::Relaxed))
    }

    pub fn set_noise_threshold(&self, value: f32) {
        self.noise_threshold
            .store(value.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Manual effect index, or -1 for automatic selection.
    pub fn effect(&self) -> i32 {
        self.effect.load(Ordering::Relaxed)
    }

    pub fn set_effect(&self, index: i32) {
        self.effect.store(index, Ordering::Relaxed);
    }

    pub fn auto_loop(&self) -> bool {
        self.auto_loop.load(Ordering::Relaxed)
    }

    pub fn set_auto_loop(&self, enabled: bool) {
        self.auto_loop.store(enabled, Ordering::Relaxed);
    }

    pub fn effect_duration(&self) -> u32 {
        self.effect_duration.load(Ordering::Relaxed)
    }

    pub fn set_effect_duration(&self, seconds: u32) {
        self.effect_duration.store(seconds, Ordering::Relaxed);
    }

    pub fn mode_speed(&self) -> u32 {
        self.mode_speed.load(Ordering::Relaxed)
    }

    pub fn set_mode_speed(&self, seconds: u32) {
        self.mode_speed.store(seconds, Ordering::Relaxed);
    }

    pub fn ingest_enabled(&self) -> bool {
        self.ingest_enabled.load(Ordering::Relaxed)
    }

    pub fn set_ingest_enabled(&self, enabled: bool) {
        self.ingest_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn effect_settings(&self) -> EffectSettings {
        EffectSettings {
            brightness: self.brightness(),
            sensitivity: self.sensitivity(),
            noise_threshold: self.noise_threshold(),
            mode_speed: self.mode_speed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let store = SettingsStore::default();
        assert_eq!(store.brightness(), 180);
        assert!((store.sensitivity() - 4.0).abs() < f32::EPSILON);
        assert!((store.noise_threshold() - 0.1).abs() < f32::EPSILON);
        assert_eq!(store.effect(), -1);
        assert!(store.auto_loop());
        assert_eq!(store.effect_duration(), 5);
        assert!(!store.ingest_enabled());
    }

    #[test]
    fn float_fields_round_trip_through_bits() {
        let store = SettingsStore::default();
        store.set_sensitivity(12.5);
        assert_eq!(store.sensitivity(), 12.5);
        store.set_noise_threshold(0.25);
        assert_eq!(store.noise_threshold(), 0.25);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let store = SettingsStore::default();
        store.set_brightness(900);
        assert_eq!(store.brightness(), 255);
        store.set_noise_threshold(7.0);
        assert_eq!(store.noise_threshold(), 1.0);
        store.set_sensitivity(-3.0);
        assert_eq!(store.sensitivity(), 0.0);
    }

    #[test]
    fn settings_file_parses_partial_json() {
        let file: SettingsFile = serde_json::from_str(r#"{"brightness": 64}"#).unwrap();
        assert_eq!(file.brightness, 64);
        assert_eq!(file.effect_duration, 5);
        let store = SettingsStore::from_file_values(&file);
        assert_eq!(store.brightness(), 64);
    }
}
