//! Scripted effects: one embedded rhai interpreter per script file, exposing
//! a restricted drawing API onto a private framebuffer. Scripts never touch
//! the hardware surface directly; their buffer is blitted out after each
//! `update`, scaled by the brightness setting.

use anyhow::{anyhow, Result};
use log::{info, warn};
use rhai::{Array, Dynamic, Engine, ImmutableString, Map, Scope, AST, FLOAT, INT};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::Effect;
use crate::audio::AudioSnapshot;
use crate::framebuffer::{hsv_to_rgb, Framebuffer};
use crate::settings::EffectSettings;

pub const SCRIPT_EXTENSION: &str = "rhai";

/// Hard ceiling on interpreter operations per call, so a runaway script
/// degrades to a logged error instead of stalling the render tick.
const MAX_SCRIPT_OPERATIONS: u64 = 2_000_000;

/// One scripted effect: its interpreter, compiled AST and private canvas.
/// Destroyed and fully recreated on reload; there is no incremental patch.
pub struct ScriptEffect {
    name: String,
    description: String,
    engine: Engine,
    ast: AST,
    scope: Scope<'static>,
    canvas: Arc<Mutex<Framebuffer>>,
    has_init: bool,
    has_update: bool,
    has_reset: bool,
}

impl ScriptEffect {
    /// Compile and run the script's top level. Identity defaults to the file
    /// stem unless the script declares `EFFECT_NAME` / `EFFECT_DESCRIPTION`.
    pub fn load(path: &Path, width: usize, height: usize) -> Result<Self> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());

        let canvas = Arc::new(Mutex::new(Framebuffer::new(width, height)));
        let mut engine = Engine::new();
        engine.set_max_operations(MAX_SCRIPT_OPERATIONS);
        register_draw_api(&mut engine, &canvas, width, height);

        let ast = engine
            .compile_file(path.to_path_buf())
            .map_err(|e| anyhow!("compiling {stem}: {e}"))?;

        let mut scope = Scope::new();
        engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|e| anyhow!("running top level of {stem}: {e}"))?;

        let name = scope
            .get_value::<ImmutableString>("EFFECT_NAME")
            .map(|s| s.to_string())
            .unwrap_or(stem);
        let description = scope
            .get_value::<ImmutableString>("EFFECT_DESCRIPTION")
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("Scripted effect: {name}"));

        let has_init = has_fn(&ast, "init");
        let has_update = has_fn(&ast, "update");
        let has_reset = has_fn(&ast, "reset");

        info!("loaded scripted effect: {name}");
        Ok(Self {
            name,
            description,
            engine,
            ast,
            scope,
            canvas,
            has_init,
            has_update,
            has_reset,
        })
    }

    /// Call a script function; errors are logged and become a no-op for this
    /// tick, they never invalidate the effect.
    fn call(&mut self, func: &str, args: impl rhai::FuncArgs) {
        let result: Result<Dynamic, _> =
            self.engine
                .call_fn(&mut self.scope, &self.ast, func, args);
        if let Err(e) = result {
            warn!("script '{}' {func} error: {e}", self.name);
        }
    }
}

impl Effect for ScriptEffect {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn init(&mut self, width: usize, height: usize) {
        if self.has_init {
            self.call("init", (width as INT, height as INT));
        }
    }

    fn update(
        &mut self,
        canvas: &mut Framebuffer,
        audio: &AudioSnapshot,
        settings: &EffectSettings,
        elapsed: f32,
    ) {
        if !self.has_update {
            return;
        }

        self.call(
            "update",
            (audio_map(audio), settings_map(settings), elapsed as FLOAT),
        );

        // Blit even after a runtime error: the prior buffer contents persist.
        let scale = settings.brightness as f32 / 255.0;
        if let Ok(private) = self.canvas.lock() {
            canvas.copy_from_scaled(&private, scale);
        }
    }

    fn reset(&mut self) {
        if self.has_reset {
            self.call("reset", ());
        }
        if let Ok(mut private) = self.canvas.lock() {
            private.clear();
        }
    }
}

fn has_fn(ast: &AST, name: &str) -> bool {
    ast.iter_functions().any(|f| f.name == name)
}

fn to_channel(v: FLOAT) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0) as u8
}

fn audio_map(audio: &AudioSnapshot) -> Map {
    let mut m = Map::new();
    m.insert("volume".into(), Dynamic::from(audio.volume as FLOAT));
    m.insert("beat".into(), Dynamic::from(audio.beat as FLOAT));
    m.insert("bass".into(), Dynamic::from(audio.bass as FLOAT));
    m.insert("mid".into(), Dynamic::from(audio.mid as FLOAT));
    m.insert("treble".into(), Dynamic::from(audio.treble as FLOAT));
    let spectrum: Array = audio
        .spectrum
        .iter()
        .map(|&v| Dynamic::from(v as FLOAT))
        .collect();
    m.insert("spectrum".into(), spectrum.into());
    m
}

fn settings_map(settings: &EffectSettings) -> Map {
    let mut m = Map::new();
    m.insert(
        "brightness".into(),
        Dynamic::from(settings.brightness as INT),
    );
    m.insert(
        "sensitivity".into(),
        Dynamic::from(settings.sensitivity as FLOAT),
    );
    m.insert(
        "noise_threshold".into(),
        Dynamic::from(settings.noise_threshold as FLOAT),
    );
    m
}

/// Drawing primitives closing over the script's private framebuffer.
/// Colors are floats in 0..1; coordinates are integers, clipped per pixel.
fn register_draw_api(
    engine: &mut Engine,
    canvas: &Arc<Mutex<Framebuffer>>,
    width: usize,
    height: usize,
) {
    let c = Arc::clone(canvas);
    engine.register_fn(
        "set_pixel",
        move |x: INT, y: INT, r: FLOAT, g: FLOAT, b: FLOAT| {
            if let Ok(mut fb) = c.lock() {
                fb.set_pixel(x as i32, y as i32, to_channel(r), to_channel(g), to_channel(b));
            }
        },
    );

    let c = Arc::clone(canvas);
    engine.register_fn(
        "set_pixel_hsv",
        move |x: INT, y: INT, h: FLOAT, s: FLOAT, v: FLOAT| {
            let (r, g, b) = hsv_to_rgb(
                h as f32,
                (s as f32).clamp(0.0, 1.0),
                (v as f32).clamp(0.0, 1.0),
            );
            if let Ok(mut fb) = c.lock() {
                fb.set_pixel(x as i32, y as i32, r, g, b);
            }
        },
    );

    let c = Arc::clone(canvas);
    engine.register_fn("clear", move || {
        if let Ok(mut fb) = c.lock() {
            fb.clear();
        }
    });

    let c = Arc::clone(canvas);
    engine.register_fn("clear", move |r: FLOAT, g: FLOAT, b: FLOAT| {
        if let Ok(mut fb) = c.lock() {
            fb.fill(to_channel(r), to_channel(g), to_channel(b));
        }
    });

    let c = Arc::clone(canvas);
    engine.register_fn(
        "draw_line",
        move |x1: INT, y1: INT, x2: INT, y2: INT, r: FLOAT, g: FLOAT, b: FLOAT| {
            if let Ok(mut fb) = c.lock() {
                fb.draw_line(
                    x1 as i32,
                    y1 as i32,
                    x2 as i32,
                    y2 as i32,
                    to_channel(r),
                    to_channel(g),
                    to_channel(b),
                );
            }
        },
    );

    let c = Arc::clone(canvas);
    engine.register_fn(
        "draw_rect",
        move |x: INT, y: INT, w: INT, h: INT, r: FLOAT, g: FLOAT, b: FLOAT| {
            if let Ok(mut fb) = c.lock() {
                fb.draw_rect(
                    x as i32,
                    y as i32,
                    w as i32,
                    h as i32,
                    to_channel(r),
                    to_channel(g),
                    to_channel(b),
                );
            }
        },
    );

    let c = Arc::clone(canvas);
    engine.register_fn(
        "fill_rect",
        move |x: INT, y: INT, w: INT, h: INT, r: FLOAT, g: FLOAT, b: FLOAT| {
            if let Ok(mut fb) = c.lock() {
                fb.fill_rect(
                    x as i32,
                    y as i32,
                    w as i32,
                    h as i32,
                    to_channel(r),
                    to_channel(g),
                    to_channel(b),
                );
            }
        },
    );

    let c = Arc::clone(canvas);
    engine.register_fn(
        "draw_circle",
        move |cx: INT, cy: INT, radius: INT, r: FLOAT, g: FLOAT, b: FLOAT| {
            if let Ok(mut fb) = c.lock() {
                fb.draw_circle(
                    cx as i32,
                    cy as i32,
                    radius as i32,
                    to_channel(r),
                    to_channel(g),
                    to_channel(b),
                );
            }
        },
    );

    let c = Arc::clone(canvas);
    engine.register_fn(
        "fill_circle",
        move |cx: INT, cy: INT, radius: INT, r: FLOAT, g: FLOAT, b: FLOAT| {
            if let Ok(mut fb) = c.lock() {
                fb.fill_circle(
                    cx as i32,
                    cy as i32,
                    radius as i32,
                    to_channel(r),
                    to_channel(g),
                    to_channel(b),
                );
            }
        },
    );

    engine.register_fn("width", move || width as INT);
    engine.register_fn("height", move || height as INT);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn script_draws_into_private_buffer_and_blits_scaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(
            dir.path(),
            "blob.rhai",
            r#"
                const EFFECT_NAME = "Test Blob";
                fn update(audio, settings, t) {
                    set_pixel(1, 2, 1.0, 0.5, 0.0);
                    fill_rect(4, 4, 2, 2, 0.0, 0.0, 1.0);
                }
            "#,
        );

        let mut effect = ScriptEffect::load(&path, 8, 8).unwrap();
        assert_eq!(effect.name(), "Test Blob");

        let mut out = Framebuffer::new(8, 8);
        let mut settings = crate::settings::SettingsStore::default().effect_settings();
        settings.brightness = 255;
        effect.init(8, 8);
        effect.update(&mut out, &AudioSnapshot::default(), &settings, 0.0);

        assert_eq!(out.get_pixel(1, 2), Some((255, 127, 0)));
        assert_eq!(out.get_pixel(4, 4), Some((0, 0, 255)));
        assert_eq!(out.get_pixel(5, 5), Some((0, 0, 255)));
        assert_eq!(out.get_pixel(0, 0), Some((0, 0, 0)));
    }

    #[test]
    fn brightness_scales_blit() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(
            dir.path(),
            "dim.rhai",
            r#"
                fn update(audio, settings, t) {
                    set_pixel(0, 0, 1.0, 1.0, 1.0);
                }
            "#,
        );

        let mut effect = ScriptEffect::load(&path, 4, 4).unwrap();
        let mut out = Framebuffer::new(4, 4);
        let mut settings = crate::settings::SettingsStore::default().effect_settings();
        settings.brightness = 128;
        effect.update(&mut out, &AudioSnapshot::default(), &settings, 0.0);
        assert_eq!(out.get_pixel(0, 0), Some((128, 128, 128)));
    }

    #[test]
    fn syntax_error_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "broken.rhai", "fn update( {");
        assert!(ScriptEffect::load(&path, 8, 8).is_err());
    }

    #[test]
    fn runtime_error_is_non_fatal_and_prior_frame_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(
            dir.path(),
            "flaky.rhai",
            r#"
                fn update(audio, settings, t) {
                    set_pixel(0, 0, 1.0, 0.0, 0.0);
                    if audio.volume > 0.5 {
                        this_function_does_not_exist();
                    }
                }
            "#,
        );

        let mut effect = ScriptEffect::load(&path, 4, 4).unwrap();
        let mut out = Framebuffer::new(4, 4);
        let mut settings = crate::settings::SettingsStore::default().effect_settings();
        settings.brightness = 255;

        let loud = AudioSnapshot {
            volume: 1.0,
            ..Default::default()
        };
        effect.update(&mut out, &loud, &settings, 0.0);
        // The draw call before the failure still landed, and the effect
        // stays usable afterwards.
        assert_eq!(out.get_pixel(0, 0), Some((255, 0, 0)));
        effect.update(&mut out, &AudioSnapshot::default(), &settings, 0.1);
        assert_eq!(out.get_pixel(0, 0), Some((255, 0, 0)));
    }

    #[test]
    fn identity_defaults_to_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(
            dir.path(),
            "nameless.rhai",
            "fn update(audio, settings, t) { }",
        );
        let effect = ScriptEffect::load(&path, 4, 4).unwrap();
        assert_eq!(effect.name(), "nameless");
    }
}
