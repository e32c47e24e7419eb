pub mod builtin;
pub mod registry;
pub mod script;

pub use registry::EffectRegistry;
pub use script::ScriptEffect;

use crate::audio::AudioSnapshot;
use crate::framebuffer::Framebuffer;
use crate::settings::EffectSettings;

/// One visual generator, native or scripted. Callers never special-case the
/// origin; the registry hands out `Box<dyn Effect>` either way.
pub trait Effect: Send {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Called once when the effect is registered.
    fn init(&mut self, _width: usize, _height: usize) {}

    /// Called once per tick. Effects may redraw fully or keep decaying state
    /// in the canvas between ticks (trailing effects intentionally skip
    /// clearing). Must tolerate an all-zero snapshot.
    fn update(
        &mut self,
        canvas: &mut Framebuffer,
        audio: &AudioSnapshot,
        settings: &EffectSettings,
        elapsed: f32,
    );

    /// Restore initial state without reallocation.
    fn reset(&mut self) {}
}
