//! The render loop: one tick every 10 ms reads the latest audio snapshot
//! and settings, runs the selected effect (or blits the ingestion canvas),
//! and presents the frame.

use anyhow::Result;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::audio::AudioSnapshot;
use crate::display::Surface;
use crate::effects::EffectRegistry;
use crate::framebuffer::Framebuffer;
use crate::settings::SettingsStore;

const TICK: Duration = Duration::from_millis(10);
const STATS_EVERY: u64 = 500;

pub struct RenderLoop {
    settings: Arc<SettingsStore>,
    registry: EffectRegistry,
    audio: Arc<Mutex<AudioSnapshot>>,
    ingest_canvas: Arc<Mutex<Framebuffer>>,
    running: Arc<AtomicBool>,
    reload_requested: Arc<AtomicBool>,
    canvas: Framebuffer,
    current: Option<usize>,
    frames: u64,
    started: Instant,
}

impl RenderLoop {
    pub fn new(
        settings: Arc<SettingsStore>,
        registry: EffectRegistry,
        audio: Arc<Mutex<AudioSnapshot>>,
        ingest_canvas: Arc<Mutex<Framebuffer>>,
        width: usize,
        height: usize,
    ) -> Self {
        Self {
            settings,
            registry,
            audio,
            ingest_canvas,
            running: Arc::new(AtomicBool::new(true)),
            reload_requested: Arc::new(AtomicBool::new(false)),
            canvas: Framebuffer::new(width, height),
            current: None,
            frames: 0,
            started: Instant::now(),
        }
    }

    /// Cleared by signal handlers or a control surface to stop the loop.
    pub fn run_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Set by control threads to request a script rescan; the swap happens
    /// at the head of the next tick, never mid-frame.
    pub fn reload_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.reload_requested)
    }

    pub fn run(&mut self, surface: &mut dyn Surface) -> Result<()> {
        self.started = Instant::now();
        info!(
            "render loop started: {}x{}, {} effects",
            self.canvas.width(),
            self.canvas.height(),
            self.registry.len()
        );

        while self.running.load(Ordering::SeqCst) {
            let tick_start = Instant::now();
            self.tick(surface)?;
            if let Some(remaining) = TICK.checked_sub(tick_start.elapsed()) {
                std::thread::sleep(remaining);
            }
        }

        info!("render loop stopped after {} frames", self.frames);
        Ok(())
    }

    /// One frame: reload if requested, pick a source, draw, present.
    pub fn tick(&mut self, surface: &mut dyn Surface) -> Result<()> {
        if self.reload_requested.swap(false, Ordering::SeqCst) {
            self.registry.reload_scripts()?;
            // indices may now point at different effects
            self.current = None;
        }

        let settings = self.settings.effect_settings();
        let elapsed = self.started.elapsed().as_secs_f32();

        if self.settings.ingest_enabled() {
            let scale = settings.brightness as f32 / 255.0;
            if let Ok(remote) = self.ingest_canvas.lock() {
                self.canvas.copy_from_scaled(&remote, scale);
            }
        } else {
            let snapshot = self.audio.lock().map(|s| *s).unwrap_or_default();
            let index = self.registry.select(
                self.settings.effect(),
                self.settings.auto_loop(),
                self.settings.effect_duration(),
                elapsed,
            );

            if self.current != Some(index) {
                if let Some(name) = self.registry.name_of(index) {
                    info!("effect: {name}");
                }
                self.canvas.clear();
                self.registry.reset(index);
                self.current = Some(index);
            }

            self.registry
                .update(index, &mut self.canvas, &snapshot, &settings, elapsed);
        }

        surface.present(&self.canvas)?;
        self.frames += 1;
        if self.frames % STATS_EVERY == 0 {
            debug!(
                "rendered {} frames, effect {:?}",
                self.frames,
                self.current.and_then(|i| self.registry.name_of(i))
            );
        }
        Ok(())
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::MemorySurface;
    use crate::effects::builtin;

    fn test_loop(settings: Arc<SettingsStore>) -> RenderLoop {
        let mut registry = EffectRegistry::new("scripts", 16, 16);
        for effect in builtin::default_catalogue() {
            registry.register_native(effect);
        }
        RenderLoop::new(
            settings,
            registry,
            Arc::new(Mutex::new(AudioSnapshot::default())),
            Arc::new(Mutex::new(Framebuffer::new(16, 16))),
            16,
            16,
        )
    }

    #[test]
    fn tick_presents_a_frame() {
        let settings = Arc::new(SettingsStore::default());
        let mut render = test_loop(Arc::clone(&settings));
        let mut surface = MemorySurface::new(16, 16);

        render.tick(&mut surface).unwrap();
        assert_eq!(surface.frames_presented(), 1);
        assert_eq!(render.frames_rendered(), 1);
    }

    #[test]
    fn ingest_mode_blits_remote_canvas_with_brightness() {
        let settings = Arc::new(SettingsStore::default());
        settings.set_ingest_enabled(true);
        settings.set_brightness(128);

        let mut render = test_loop(Arc::clone(&settings));
        if let Ok(mut remote) = render.ingest_canvas.lock() {
            remote.fill(255, 255, 255);
        }

        let mut surface = MemorySurface::new(16, 16);
        render.tick(&mut surface).unwrap();
        assert_eq!(
            surface.last_frame().get_pixel(0, 0),
            Some((128, 128, 128))
        );
    }

    #[test]
    fn manual_effect_stays_selected() {
        let settings = Arc::new(SettingsStore::default());
        settings.set_effect(2);

        let mut render = test_loop(Arc::clone(&settings));
        let mut surface = MemorySurface::new(16, 16);
        render.tick(&mut surface).unwrap();
        assert_eq!(render.current, Some(2));
        render.tick(&mut surface).unwrap();
        assert_eq!(render.current, Some(2));
    }

    #[test]
    fn reload_flag_swaps_scripts_at_next_tick() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(SettingsStore::default());
        let mut registry = EffectRegistry::new(dir.path(), 16, 16);
        for effect in builtin::default_catalogue() {
            registry.register_native(effect);
        }
        let natives = registry.len();

        let mut render = RenderLoop::new(
            Arc::clone(&settings),
            registry,
            Arc::new(Mutex::new(AudioSnapshot::default())),
            Arc::new(Mutex::new(Framebuffer::new(16, 16))),
            16,
            16,
        );
        let mut surface = MemorySurface::new(16, 16);

        // Pin an index just past the catalogue: stale for now, so selection
        // falls through to automatic.
        settings.set_effect(natives as i32);
        render.tick(&mut surface).unwrap();
        assert_eq!(render.registry.len(), natives);
        assert_ne!(render.current, Some(natives));

        // A control thread only sets the flag; the swap happens at the head
        // of the next tick.
        std::fs::write(
            dir.path().join("glow.rhai"),
            "const EFFECT_NAME = \"Glow\";\nfn update(audio, settings, t) { clear(); }\n",
        )
        .unwrap();
        render.reload_flag().store(true, Ordering::SeqCst);

        render.tick(&mut surface).unwrap();
        assert!(!render.reload_requested.load(Ordering::SeqCst));
        assert_eq!(render.registry.len(), natives + 1);
        assert_eq!(render.registry.name_of(natives), Some("Glow"));
        // selection was re-derived after the swap, so the pinned index is
        // now valid and current
        assert_eq!(render.current, Some(natives));
    }

    #[test]
    fn run_honors_the_stop_flag() {
        let settings = Arc::new(SettingsStore::default());
        let mut render = test_loop(settings);
        let stop = render.run_flag();

        let handle = std::thread::spawn(move || {
            let mut surface = MemorySurface::new(16, 16);
            render.run(&mut surface).unwrap();
            render.frames_rendered()
        });

        std::thread::sleep(Duration::from_millis(100));
        stop.store(false, Ordering::SeqCst);
        let frames = handle.join().unwrap();
        assert!(frames > 0);
    }
}
