//! Native effect catalogue. Each generator is self-contained, takes the
//! audio snapshot once per tick, and tolerates silence (all-zero snapshot).

use rand::Rng;

use super::Effect;
use crate::audio::AudioSnapshot;
use crate::framebuffer::{hsv_to_rgb, Framebuffer};
use crate::settings::EffectSettings;

/// Hue in degrees, full saturation, value in 0..1.
fn shade(hue: f32, value: f32) -> (u8, u8, u8) {
    hsv_to_rgb(hue, 1.0, value.clamp(0.0, 1.0))
}

fn gated(volume: f32, threshold: f32) -> f32 {
    if volume < threshold {
        0.0
    } else {
        volume
    }
}

pub fn default_catalogue() -> Vec<Box<dyn Effect>> {
    vec![
        Box::new(VolumeBars::new()),
        Box::new(BeatPulse::new()),
        Box::new(SpectrumBars::new()),
        Box::new(Plasma),
        Box::new(Fire::new()),
        Box::new(Rain::new()),
        Box::new(MatrixRain::new()),
        Box::new(Starfield::new()),
        Box::new(VuMeter::new()),
        Box::new(Waveform::new()),
        Box::new(ColorPulse::new()),
        Box::new(ColorWipe::new()),
        Box::new(Waterfall::new()),
    ]
}

// ---------------------- Volume Bars ------------------------------

/// Volume-driven shapes cycling through sub-modes on a timer or on a
/// strong beat.
pub struct VolumeBars {
    mode: usize,
    mode_timer: f32,
    hue: f32,
}

impl VolumeBars {
    pub fn new() -> Self {
        Self {
            mode: 0,
            mode_timer: 0.0,
            hue: 0.0,
        }
    }
}

impl Effect for VolumeBars {
    fn name(&self) -> &str {
        "Volume Bars"
    }

    fn description(&self) -> &str {
        "Volume-reactive shapes with rotating sub-modes"
    }

    fn update(
        &mut self,
        canvas: &mut Framebuffer,
        audio: &AudioSnapshot,
        settings: &EffectSettings,
        _elapsed: f32,
    ) {
        let vol = gated(audio.volume, settings.noise_threshold);
        let (w, h) = (canvas.width() as i32, canvas.height() as i32);

        self.mode_timer += 0.016;
        let mode_speed = settings.mode_speed.max(1) as f32;
        if self.mode_timer > mode_speed || (audio.beat > 0.8 && self.mode_timer > 1.0) {
            self.mode = (self.mode + 1) % 3;
            self.mode_timer = 0.0;
        }

        self.hue = (self.hue + 1.8).rem_euclid(360.0);
        let brightness = settings.brightness as f32 / 255.0;

        canvas.clear();

        match self.mode {
            0 => {
                // Centered expanding bars
                let bar_h = ((vol * h as f32 * 1.25) as i32).min(h);
                let half_w = (((vol * w as f32 * 0.5) as i32) + 4).min(w / 2);
                let cx = w / 2;
                for y in h - bar_h..h {
                    let yf = (y - (h - bar_h)) as f32 / bar_h.max(1) as f32;
                    let (r, g, b) = shade(self.hue + yf * 108.0, brightness);
                    for x in cx - half_w..cx + half_w {
                        canvas.set_pixel(x, y, r, g, b);
                    }
                }
            }
            1 => {
                // Diamond
                let size = ((vol * w as f32 * 0.4) as i32) + 5;
                let (cx, cy) = (w / 2, h / 2);
                for y in 0..h {
                    for x in 0..w {
                        let dist = (x - cx).abs() + (y - cy).abs();
                        if dist < size {
                            let f = 1.0 - dist as f32 / size as f32;
                            let (r, g, b) = shade(self.hue + f * 72.0, brightness * f);
                            canvas.set_pixel(x, y, r, g, b);
                        }
                    }
                }
            }
            _ => {
                // Concentric rings
                let (cx, cy) = (w / 2, h / 2);
                let max_rad = ((vol * h as f32 * 0.8) as i32) + 10;
                for y in 0..h {
                    for x in 0..w {
                        let dx = (x - cx) as f32;
                        let dy = (y - cy) as f32;
                        let dist = (dx * dx + dy * dy).sqrt();
                        if dist < max_rad as f32 {
                            let ring = (dist / 8.0) as i32;
                            if ring % 2 == 0 {
                                let f = 1.0 - dist / max_rad as f32;
                                let (r, g, b) =
                                    shade(self.hue + ring as f32 * 54.0, brightness * f);
                                canvas.set_pixel(x, y, r, g, b);
                            }
                        }
                    }
                }
            }
        }
    }

    fn reset(&mut self) {
        self.mode = 0;
        self.mode_timer = 0.0;
        self.hue = 0.0;
    }
}

// ---------------------- Beat Pulse -------------------------------

/// Expanding circle on the beat with a spectrum wave through the middle.
pub struct BeatPulse {
    hue: f32,
}

impl BeatPulse {
    pub fn new() -> Self {
        Self { hue: 0.0 }
    }
}

impl Effect for BeatPulse {
    fn name(&self) -> &str {
        "Beat Pulse"
    }

    fn description(&self) -> &str {
        "Beat-driven pulse with a spectrum wave overlay"
    }

    fn update(
        &mut self,
        canvas: &mut Framebuffer,
        audio: &AudioSnapshot,
        settings: &EffectSettings,
        _elapsed: f32,
    ) {
        let (w, h) = (canvas.width() as i32, canvas.height() as i32);
        self.hue = (self.hue + 1.1).rem_euclid(360.0);
        let brightness = settings.brightness as f32 / 255.0;
        let threshold = settings.noise_threshold;

        canvas.clear();
        if audio.volume < threshold && audio.beat < threshold {
            return;
        }

        let radius = (audio.beat * h as f32 * 0.8 + audio.volume * h as f32 * 0.5)
            .min(h as f32 * 1.1);
        let (cx, cy) = (w / 2, h / 2);

        if radius >= 5.0 {
            for y in 0..h {
                for x in 0..w {
                    let dx = (x - cx) as f32;
                    let dy = (y - cy) as f32;
                    let d = (dx * dx + dy * dy).sqrt();
                    if d < radius {
                        let f = 1.0 - d / radius;
                        let (r, g, b) = shade(self.hue + d * 1.8, brightness * f);
                        canvas.set_pixel(x, y, r, g, b);
                    }
                }
            }
        }

        // Mirrored spectrum wave in the complementary hue.
        let line_hue = (self.hue + 180.0).rem_euclid(360.0);
        for x in 0..w {
            let band_pos = x as f32 / w as f32 * 7.0;
            let b1 = band_pos as usize;
            let b2 = (b1 + 1).min(7);
            let frac = band_pos - b1 as f32;
            let mut val = audio.spectrum[b1] * (1.0 - frac) + audio.spectrum[b2] * frac;
            if val < threshold {
                val = 0.0;
            }
            let offset = ((val * 0.3) as i32).min(h / 3);
            let (r, g, b) = shade(line_hue + x as f32 / w as f32 * 72.0, brightness);
            for dy in -1..=1 {
                canvas.set_pixel(x, cy + offset + dy, r, g, b);
                canvas.set_pixel(x, cy - offset + dy, r, g, b);
            }
        }
    }

    fn reset(&mut self) {
        self.hue = 0.0;
    }
}

// ---------------------- Spectrum Bars ----------------------------

/// Classic 8-band bar display with fast attack and slow decay.
pub struct SpectrumBars {
    smooth: [f32; 8],
}

impl SpectrumBars {
    pub fn new() -> Self {
        Self { smooth: [0.0; 8] }
    }
}

const BAR_COLORS: [(u8, u8, u8); 8] = [
    (255, 0, 0),
    (255, 128, 0),
    (255, 255, 0),
    (0, 255, 0),
    (0, 255, 255),
    (0, 0, 255),
    (128, 0, 255),
    (255, 0, 255),
];

impl Effect for SpectrumBars {
    fn name(&self) -> &str {
        "Spectrum"
    }

    fn description(&self) -> &str {
        "8-band spectrum bars, fast attack / slow decay"
    }

    fn update(
        &mut self,
        canvas: &mut Framebuffer,
        audio: &AudioSnapshot,
        settings: &EffectSettings,
        _elapsed: f32,
    ) {
        for (smooth, &target) in self.smooth.iter_mut().zip(audio.spectrum.iter()) {
            if target > *smooth {
                *smooth = target;
            } else {
                *smooth = *smooth * 0.85 + target * 0.15;
            }
        }

        let (w, h) = (canvas.width() as i32, canvas.height() as i32);
        let bw = w / 8;
        let scale = settings.brightness as f32 / 255.0;

        canvas.clear();
        for band in 0..8 {
            let mut val = self.smooth[band];
            if val < settings.noise_threshold {
                val = 0.0;
            }
            let bar_h = ((val * h as f32 / 80.0) as i32).min(h);
            let (r, g, b) = BAR_COLORS[band];
            let (r, g, b) = (
                (r as f32 * scale) as u8,
                (g as f32 * scale) as u8,
                (b as f32 * scale) as u8,
            );
            let x0 = band as i32 * bw + 2;
            let x1 = (band as i32 + 1) * bw - 2;
            for y in h - bar_h..h {
                for x in x0..x1 {
                    canvas.set_pixel(x, y, r, g, b);
                }
            }
        }
    }

    fn reset(&mut self) {
        self.smooth = [0.0; 8];
    }
}

// ---------------------- Plasma ----------------------------------

/// Stateless plasma field modulated by volume.
pub struct Plasma;

impl Effect for Plasma {
    fn name(&self) -> &str {
        "Plasma"
    }

    fn description(&self) -> &str {
        "Volume-modulated plasma field"
    }

    fn update(
        &mut self,
        canvas: &mut Framebuffer,
        audio: &AudioSnapshot,
        settings: &EffectSettings,
        elapsed: f32,
    ) {
        let vol = gated(audio.volume, settings.noise_threshold) * 6.0;
        let t = elapsed;
        let br = settings.brightness as f32;

        for y in 0..canvas.height() as i32 {
            for x in 0..canvas.width() as i32 {
                let v = (x as f32 * 0.09 + t).sin()
                    + (y as f32 * 0.08 + t * 1.4).sin()
                    + ((x + y) as f32 * 0.04 + t * 0.8).sin();

                let r = ((v + t * 0.5 + vol).sin() * 0.5 + 0.5) * br;
                let g = ((v * 1.3 + t + vol * 0.5).sin() * 0.5 + 0.5) * 255.0;
                let b = ((v * 2.3 + t * 0.2).sin() * 0.5 + 0.5) * 255.0;

                canvas.set_pixel(x, y, r as u8, g as u8, b as u8);
            }
        }
    }
}

// ---------------------- Fire -------------------------------------

/// Heat-diffusion fire fed by audio volume. Keeps its grid between ticks.
pub struct Fire {
    heat: Vec<i32>,
    width: usize,
    height: usize,
}

impl Fire {
    pub fn new() -> Self {
        Self {
            heat: Vec::new(),
            width: 0,
            height: 0,
        }
    }
}

impl Effect for Fire {
    fn name(&self) -> &str {
        "Fire"
    }

    fn description(&self) -> &str {
        "Rising fire fed by audio volume"
    }

    fn init(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.heat = vec![0; width * height];
    }

    fn update(
        &mut self,
        canvas: &mut Framebuffer,
        audio: &AudioSnapshot,
        settings: &EffectSettings,
        _elapsed: f32,
    ) {
        let (w, h) = (self.width, self.height);
        if w == 0 || h == 0 {
            return;
        }
        let mut rng = rand::thread_rng();

        // shift upward
        for y in 0..h - 1 {
            for x in 0..w {
                self.heat[y * w + x] = self.heat[(y + 1) * w + x];
            }
        }

        let vol = gated(audio.volume, settings.noise_threshold);
        let base = ((vol * 300.0) as i32).min(255);
        for x in 0..w {
            let v = base + rng.gen_range(-15..15);
            self.heat[(h - 1) * w + x] = v.clamp(0, 255);
        }

        // blur and cool
        for y in 0..h - 1 {
            for x in 0..w {
                let mut sum = self.heat[y * w + x];
                if x > 0 {
                    sum += self.heat[y * w + x - 1];
                }
                if x < w - 1 {
                    sum += self.heat[y * w + x + 1];
                }
                sum += self.heat[(y + 1) * w + x];
                self.heat[y * w + x] = (sum / 4 - 2).max(0);
            }
        }

        for y in 0..h {
            for x in 0..w {
                let v = self.heat[y * w + x];
                canvas.set_pixel(x as i32, y as i32, v as u8, (v / 2) as u8, (v / 8) as u8);
            }
        }
    }

    fn reset(&mut self) {
        self.heat.fill(0);
    }
}

// ---------------------- Rain -------------------------------------

/// Falling colored droplets; spawn rate follows volume.
pub struct Rain {
    drops: Vec<(f32, f32, f32, f32)>, // x, y, speed, hue
    width: usize,
    height: usize,
}

impl Rain {
    pub fn new() -> Self {
        Self {
            drops: Vec::new(),
            width: 0,
            height: 0,
        }
    }
}

impl Effect for Rain {
    fn name(&self) -> &str {
        "Rain"
    }

    fn description(&self) -> &str {
        "Colored droplets, spawn rate follows volume"
    }

    fn init(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.drops.clear();
    }

    fn update(
        &mut self,
        canvas: &mut Framebuffer,
        audio: &AudioSnapshot,
        settings: &EffectSettings,
        _elapsed: f32,
    ) {
        let mut rng = rand::thread_rng();
        let vol = gated(audio.volume, settings.noise_threshold);
        let brightness = settings.brightness as f32 / 255.0;
        let h = self.height as f32;

        let spawn = 1 + (vol * 6.0) as usize;
        for _ in 0..spawn {
            if self.drops.len() < self.width * 2 {
                self.drops.push((
                    rng.gen_range(0.0..self.width.max(1) as f32),
                    0.0,
                    0.4 + rng.gen_range(0.0..0.6) + vol,
                    rng.gen_range(0.0..360.0),
                ));
            }
        }

        canvas.clear();
        for drop in self.drops.iter_mut() {
            drop.1 += drop.2;
            let (r, g, b) = shade(drop.3, brightness);
            canvas.set_pixel(drop.0 as i32, drop.1 as i32, r, g, b);
            let (r2, g2, b2) = shade(drop.3, brightness * 0.4);
            canvas.set_pixel(drop.0 as i32, drop.1 as i32 - 1, r2, g2, b2);
        }
        self.drops.retain(|d| d.1 < h + 2.0);
    }

    fn reset(&mut self) {
        self.drops.clear();
    }
}

// ---------------------- Matrix Rain ------------------------------

pub struct MatrixRain {
    columns: Vec<i32>,
    speeds: Vec<i32>,
    height: usize,
}

impl MatrixRain {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            speeds: Vec::new(),
            height: 0,
        }
    }
}

impl Effect for MatrixRain {
    fn name(&self) -> &str {
        "Matrix"
    }

    fn description(&self) -> &str {
        "Falling green trails, speed follows volume"
    }

    fn init(&mut self, width: usize, height: usize) {
        let mut rng = rand::thread_rng();
        self.height = height;
        self.columns = (0..width).map(|_| rng.gen_range(0..height as i32)).collect();
        self.speeds = (0..width).map(|_| rng.gen_range(1..4)).collect();
    }

    fn update(
        &mut self,
        canvas: &mut Framebuffer,
        audio: &AudioSnapshot,
        settings: &EffectSettings,
        _elapsed: f32,
    ) {
        let mut rng = rand::thread_rng();
        let vol = gated(audio.volume, settings.noise_threshold);
        let h = self.height as i32;
        let br = settings.brightness as i32;

        canvas.clear();
        let boost = (vol * 3.0) as i32;
        for x in (0..self.columns.len()).step_by(2) {
            self.columns[x] += self.speeds[x] + boost;
            if self.columns[x] >= h + 15 {
                self.columns[x] = 0;
                self.speeds[x] = rng.gen_range(1..4);
            }
            for i in 0..15 {
                let y = self.columns[x] - i;
                if y >= 0 && y < h {
                    let g = (br * (15 - i) / 15).clamp(0, 255) as u8;
                    canvas.set_pixel(x as i32, y, g / 4, g, g / 4);
                }
            }
        }
    }

    fn reset(&mut self) {
        let mut rng = rand::thread_rng();
        for c in self.columns.iter_mut() {
            *c = rng.gen_range(0..self.height.max(1) as i32);
        }
    }
}

// ---------------------- Starfield --------------------------------

/// Stars flying outward from the center; speed scales with volume.
pub struct Starfield {
    stars: Vec<(f32, f32, f32)>, // angle, distance, speed
    width: usize,
    height: usize,
}

impl Starfield {
    pub fn new() -> Self {
        Self {
            stars: Vec::new(),
            width: 0,
            height: 0,
        }
    }

    fn respawn(star: &mut (f32, f32, f32), rng: &mut impl Rng) {
        star.0 = rng.gen_range(0.0..std::f32::consts::TAU);
        star.1 = rng.gen_range(0.5..3.0);
        star.2 = rng.gen_range(0.2..1.0);
    }
}

impl Effect for Starfield {
    fn name(&self) -> &str {
        "Starfield"
    }

    fn description(&self) -> &str {
        "Stars streaming outward, speed follows volume"
    }

    fn init(&mut self, width: usize, height: usize) {
        let mut rng = rand::thread_rng();
        self.width = width;
        self.height = height;
        self.stars = (0..width.max(height) * 2)
            .map(|_| {
                let mut star = (0.0, 0.0, 0.0);
                Self::respawn(&mut star, &mut rng);
                star.1 = rng.gen_range(0.5..(height as f32 / 2.0).max(1.0));
                star
            })
            .collect();
    }

    fn update(
        &mut self,
        canvas: &mut Framebuffer,
        audio: &AudioSnapshot,
        settings: &EffectSettings,
        _elapsed: f32,
    ) {
        let mut rng = rand::thread_rng();
        let vol = gated(audio.volume, settings.noise_threshold);
        let (cx, cy) = (self.width as f32 / 2.0, self.height as f32 / 2.0);
        let max_dist = cx.max(cy) * 1.5;
        let br = settings.brightness as f32 / 255.0;

        canvas.clear();
        for star in self.stars.iter_mut() {
            star.1 += star.2 * (0.5 + vol * 3.0);
            if star.1 > max_dist {
                Self::respawn(star, &mut rng);
            }
            let x = cx + star.0.cos() * star.1;
            let y = cy + star.0.sin() * star.1;
            let f = (star.1 / max_dist).min(1.0);
            let v = (br * (0.3 + f * 0.7) * 255.0) as u8;
            canvas.set_pixel(x as i32, y as i32, v, v, v);
        }
    }

    fn reset(&mut self) {
        let (w, h) = (self.width, self.height);
        self.init(w, h);
    }
}

// ---------------------- VU Meter ---------------------------------

/// Horizontal level meter, green through red with a decaying peak marker.
pub struct VuMeter {
    peak: f32,
}

impl VuMeter {
    pub fn new() -> Self {
        Self { peak: 0.0 }
    }
}

impl Effect for VuMeter {
    fn name(&self) -> &str {
        "VU Meter"
    }

    fn description(&self) -> &str {
        "Level meter with peak hold"
    }

    fn update(
        &mut self,
        canvas: &mut Framebuffer,
        audio: &AudioSnapshot,
        settings: &EffectSettings,
        _elapsed: f32,
    ) {
        let vol = gated(audio.volume, settings.noise_threshold).min(1.0);
        self.peak = (self.peak - 0.005).max(vol);

        let (w, h) = (canvas.width() as i32, canvas.height() as i32);
        let level = (vol * w as f32) as i32;
        let scale = settings.brightness as f32 / 255.0;

        canvas.clear();
        for x in 0..level {
            let f = x as f32 / w as f32;
            // green to yellow to red across the bar
            let hue = 120.0 * (1.0 - f);
            let (r, g, b) = shade(hue, scale);
            for y in h / 3..2 * h / 3 {
                canvas.set_pixel(x, y, r, g, b);
            }
        }

        let px = ((self.peak * w as f32) as i32).min(w - 1);
        let (r, g, b) = shade(0.0, scale);
        for y in h / 4..3 * h / 4 {
            canvas.set_pixel(px, y, r, g, b);
        }
    }

    fn reset(&mut self) {
        self.peak = 0.0;
    }
}

// ---------------------- Waveform ---------------------------------

/// Scrolling volume history drawn as a symmetric waveform.
pub struct Waveform {
    history: Vec<f32>,
}

impl Waveform {
    pub fn new() -> Self {
        Self { history: Vec::new() }
    }
}

impl Effect for Waveform {
    fn name(&self) -> &str {
        "Waveform"
    }

    fn description(&self) -> &str {
        "Scrolling volume waveform"
    }

    fn init(&mut self, width: usize, _height: usize) {
        self.history = vec![0.0; width];
    }

    fn update(
        &mut self,
        canvas: &mut Framebuffer,
        audio: &AudioSnapshot,
        settings: &EffectSettings,
        _elapsed: f32,
    ) {
        let vol = gated(audio.volume, settings.noise_threshold);
        self.history.rotate_left(1);
        if let Some(last) = self.history.last_mut() {
            *last = vol;
        }

        let h = canvas.height() as i32;
        let cy = h / 2;
        let br = settings.brightness as f32;

        canvas.clear();
        for (x, &v) in self.history.iter().enumerate() {
            let amplitude = ((v * h as f32 * 0.4) as i32).min(cy);
            for dy in -amplitude..=amplitude {
                let dist = dy.abs() as f32 / (amplitude + 1) as f32;
                let r = (br * (1.0 - dist) * 0.5) as u8;
                let g = (br * (1.0 - dist)) as u8;
                let b = (255.0 * (1.0 - dist)) as u8;
                canvas.set_pixel(x as i32, cy + dy, r, g, b);
            }
        }
    }

    fn reset(&mut self) {
        self.history.fill(0.0);
    }
}

// ---------------------- Color Pulse ------------------------------

/// Whole-field color breathing with the volume.
pub struct ColorPulse {
    hue: f32,
}

impl ColorPulse {
    pub fn new() -> Self {
        Self { hue: 0.0 }
    }
}

impl Effect for ColorPulse {
    fn name(&self) -> &str {
        "Color Pulse"
    }

    fn description(&self) -> &str {
        "Full-field color pulse following volume"
    }

    fn update(
        &mut self,
        canvas: &mut Framebuffer,
        audio: &AudioSnapshot,
        settings: &EffectSettings,
        _elapsed: f32,
    ) {
        let vol = gated(audio.volume, settings.noise_threshold);
        self.hue = (self.hue + 0.72).rem_euclid(360.0);

        let intensity = (0.1 + vol * 0.9).min(1.0);
        let (r, g, b) = shade(self.hue, settings.brightness as f32 / 255.0 * intensity);
        canvas.fill(r, g, b);
    }

    fn reset(&mut self) {
        self.hue = 0.0;
    }
}

// ---------------------- Color Wipe -------------------------------

/// A hue front sweeping across the matrix; the beat advances it faster.
pub struct ColorWipe {
    front: f32,
    hue: f32,
}

impl ColorWipe {
    pub fn new() -> Self {
        Self {
            front: 0.0,
            hue: 0.0,
        }
    }
}

impl Effect for ColorWipe {
    fn name(&self) -> &str {
        "Color Wipe"
    }

    fn description(&self) -> &str {
        "Hue front sweeping the matrix, advanced by the beat"
    }

    fn update(
        &mut self,
        canvas: &mut Framebuffer,
        audio: &AudioSnapshot,
        settings: &EffectSettings,
        _elapsed: f32,
    ) {
        let w = canvas.width() as f32;
        self.front += 0.4 + audio.beat * 2.5;
        if self.front >= w {
            self.front -= w;
            self.hue = (self.hue + 60.0).rem_euclid(360.0);
        }

        let scale = settings.brightness as f32 / 255.0;
        let (r, g, b) = shade(self.hue, scale);
        let (pr, pg, pb) = shade(self.hue + 300.0, scale);
        for x in 0..canvas.width() as i32 {
            let (cr, cg, cb) = if (x as f32) < self.front {
                (r, g, b)
            } else {
                (pr, pg, pb)
            };
            for y in 0..canvas.height() as i32 {
                canvas.set_pixel(x, y, cr, cg, cb);
            }
        }
    }

    fn reset(&mut self) {
        self.front = 0.0;
        self.hue = 0.0;
    }
}

// ---------------------- Waterfall --------------------------------

/// Spectrum history scrolling downward, newest row on top.
pub struct Waterfall {
    rows: Vec<[f32; 8]>,
}

impl Waterfall {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }
}

impl Effect for Waterfall {
    fn name(&self) -> &str {
        "Waterfall"
    }

    fn description(&self) -> &str {
        "Scrolling spectrum history"
    }

    fn init(&mut self, _width: usize, height: usize) {
        self.rows = vec![[0.0; 8]; height];
    }

    fn update(
        &mut self,
        canvas: &mut Framebuffer,
        audio: &AudioSnapshot,
        settings: &EffectSettings,
        _elapsed: f32,
    ) {
        if self.rows.is_empty() {
            return;
        }
        self.rows.rotate_right(1);
        self.rows[0] = audio.spectrum;

        let w = canvas.width() as i32;
        let bw = (w / 8).max(1);
        let scale = settings.brightness as f32 / 255.0;
        let threshold = settings.noise_threshold;

        canvas.clear();
        for (y, row) in self.rows.iter().enumerate() {
            for band in 0..8 {
                let mut val = row[band];
                if val < threshold {
                    val = 0.0;
                }
                let v = (val / 50.0).min(1.0);
                let (r, g, b) = shade(band as f32 * 45.0, v * scale);
                for x in band as i32 * bw..(band as i32 + 1) * bw {
                    canvas.set_pixel(x, y as i32, r, g, b);
                }
            }
        }
    }

    fn reset(&mut self) {
        for row in self.rows.iter_mut() {
            *row = [0.0; 8];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsStore;

    fn run_all(audio: &AudioSnapshot) {
        let settings = SettingsStore::default().effect_settings();
        let mut canvas = Framebuffer::new(32, 16);
        for mut effect in default_catalogue() {
            effect.init(canvas.width(), canvas.height());
            effect.update(&mut canvas, audio, &settings, 1.5);
            effect.reset();
            effect.update(&mut canvas, audio, &settings, 3.0);
        }
    }

    #[test]
    fn catalogue_tolerates_silence() {
        run_all(&AudioSnapshot::default());
    }

    #[test]
    fn catalogue_tolerates_loud_input() {
        let audio = AudioSnapshot {
            volume: 5.0,
            beat: 1.0,
            spectrum: [200.0; 8],
            bass: 200.0,
            mid: 200.0,
            treble: 200.0,
        };
        run_all(&audio);
    }

    #[test]
    fn spectrum_bars_decay_slowly() {
        let mut bars = SpectrumBars::new();
        let settings = SettingsStore::default().effect_settings();
        let mut canvas = Framebuffer::new(32, 16);

        let loud = AudioSnapshot {
            spectrum: [100.0; 8],
            ..Default::default()
        };
        bars.update(&mut canvas, &loud, &settings, 0.0);
        let peak = bars.smooth[0];
        assert_eq!(peak, 100.0);

        bars.update(&mut canvas, &AudioSnapshot::default(), &settings, 0.1);
        assert!(bars.smooth[0] < peak);
        assert!(bars.smooth[0] > peak * 0.8);
    }
}
