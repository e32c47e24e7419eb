use anyhow::Result;
use log::{info, warn};
use std::path::{Path, PathBuf};

use super::script::{ScriptEffect, SCRIPT_EXTENSION};
use super::Effect;
use crate::audio::AudioSnapshot;
use crate::framebuffer::Framebuffer;
use crate::settings::EffectSettings;

/// Ordered catalogue of effects: natives first, scripted effects appended
/// after them in sorted path order. A reload replaces the whole scripted
/// tail atomically from the caller's point of view.
pub struct EffectRegistry {
    effects: Vec<Box<dyn Effect>>,
    native_count: usize,
    scripts_dir: PathBuf,
    width: usize,
    height: usize,
}

impl EffectRegistry {
    pub fn new<P: Into<PathBuf>>(scripts_dir: P, width: usize, height: usize) -> Self {
        Self {
            effects: Vec::new(),
            native_count: 0,
            scripts_dir: scripts_dir.into(),
            width,
            height,
        }
    }

    /// Natives must all be registered before the first script reload; the
    /// native prefix is what reloads truncate back to.
    pub fn register_native(&mut self, mut effect: Box<dyn Effect>) {
        effect.init(self.width, self.height);
        info!("registered effect: {}", effect.name());
        self.effects.push(effect);
        self.native_count = self.effects.len();
    }

    /// Drop every scripted effect and rescan the scripts directory. A script
    /// that fails to load is skipped with a log line; the rest still load.
    /// A missing directory just leaves the native catalogue in place.
    pub fn reload_scripts(&mut self) -> Result<()> {
        self.effects.truncate(self.native_count);

        let mut paths = match script_paths(&self.scripts_dir) {
            Ok(paths) => paths,
            Err(e) => {
                warn!("scripts directory {:?} unavailable: {e}", self.scripts_dir);
                return Ok(());
            }
        };
        paths.sort();

        for path in paths {
            match ScriptEffect::load(&path, self.width, self.height) {
                Ok(mut effect) => {
                    effect.init(self.width, self.height);
                    self.effects.push(Box::new(effect));
                }
                Err(e) => warn!("skipping script {path:?}: {e:#}"),
            }
        }

        info!(
            "effect catalogue: {} native, {} scripted",
            self.native_count,
            self.effects.len() - self.native_count
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.effects.iter().map(|e| e.name()).collect()
    }

    /// Pick the effect index for this tick. A manual index wins when it is
    /// in range; a stale one (catalogue shrank under it) falls through to
    /// automatic cycling rather than pinning a missing effect.
    pub fn select(&self, manual: i32, auto_loop: bool, duration_secs: u32, elapsed: f32) -> usize {
        if manual >= 0 && (manual as usize) < self.effects.len() {
            return manual as usize;
        }
        if auto_loop && !self.effects.is_empty() {
            let duration = duration_secs.max(1) as f32;
            return (elapsed / duration) as usize % self.effects.len();
        }
        0
    }

    pub fn update(
        &mut self,
        index: usize,
        canvas: &mut Framebuffer,
        audio: &AudioSnapshot,
        settings: &EffectSettings,
        elapsed: f32,
    ) {
        if let Some(effect) = self.effects.get_mut(index) {
            effect.update(canvas, audio, settings, elapsed);
        }
    }

    pub fn reset(&mut self, index: usize) {
        if let Some(effect) = self.effects.get_mut(index) {
            effect.reset();
        }
    }

    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.effects.get(index).map(|e| e.name())
    }
}

fn script_paths(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some(SCRIPT_EXTENSION) {
            paths.push(path);
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::builtin;
    use std::io::Write;

    fn registry_with_natives(dir: &Path) -> EffectRegistry {
        let mut registry = EffectRegistry::new(dir, 16, 16);
        for effect in builtin::default_catalogue() {
            registry.register_native(effect);
        }
        registry
    }

    fn write_script(dir: &Path, name: &str, body: &str) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        file.write_all(body.as_bytes()).unwrap();
    }

    #[test]
    fn automatic_selection_cycles_by_duration() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = EffectRegistry::new(dir.path(), 16, 16);
        for effect in builtin::default_catalogue().into_iter().take(5) {
            registry.register_native(effect);
        }

        // 5 effects, 5 s each: at t=12 s we are on the third effect.
        assert_eq!(registry.select(-1, true, 5, 12.0), 2);
        assert_eq!(registry.select(-1, true, 5, 0.0), 0);
        // full cycle wraps
        assert_eq!(registry.select(-1, true, 5, 26.0), 0);
    }

    #[test]
    fn manual_selection_wins_when_in_range() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with_natives(dir.path());
        assert_eq!(registry.select(3, true, 5, 999.0), 3);
    }

    #[test]
    fn stale_manual_index_falls_back_to_auto() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with_natives(dir.path());
        let count = registry.len();
        assert_eq!(registry.select(count as i32 + 10, true, 5, 12.0), 2);
        // with auto off, a stale index pins the first effect
        assert_eq!(registry.select(count as i32 + 10, false, 5, 12.0), 0);
    }

    #[test]
    fn reload_appends_valid_scripts_and_skips_broken_ones() {
        let dir = tempfile::tempdir().unwrap();
        write_script(
            dir.path(),
            "aaa_good.rhai",
            r#"
                const EFFECT_NAME = "Good";
                fn update(audio, settings, t) { clear(); }
            "#,
        );
        write_script(dir.path(), "bbb_broken.rhai", "fn update( {");
        write_script(dir.path(), "notes.txt", "not a script");

        let mut registry = registry_with_natives(dir.path());
        let natives = registry.len();
        registry.reload_scripts().unwrap();
        assert_eq!(registry.len(), natives + 1);
        assert_eq!(registry.name_of(natives), Some("Good"));

        // reload is idempotent: the scripted tail is replaced, not appended
        registry.reload_scripts().unwrap();
        assert_eq!(registry.len(), natives + 1);
    }

    #[test]
    fn reload_with_missing_directory_keeps_natives() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let mut registry = registry_with_natives(&missing);
        let natives = registry.len();
        registry.reload_scripts().unwrap();
        assert_eq!(registry.len(), natives);
    }
}
