/// RGB framebuffer with the drawing primitives shared by scripted effects
/// and the frame-ingestion compositor.
///
/// Pixels are stored row-major, 3 bytes per pixel (R, G, B). Coordinates
/// passed to the primitives are signed so callers can draw partially
/// off-screen shapes; every write is clipped per pixel.
#[derive(Clone)]
pub struct Framebuffer {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl Framebuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height * 3],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    pub fn fill(&mut self, r: u8, g: u8, b: u8) {
        for px in self.pixels.chunks_exact_mut(3) {
            px[0] = r;
            px[1] = g;
            px[2] = b;
        }
    }

    pub fn set_pixel(&mut self, x: i32, y: i32, r: u8, g: u8, b: u8) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let idx = (y as usize * self.width + x as usize) * 3;
        self.pixels[idx] = r;
        self.pixels[idx + 1] = g;
        self.pixels[idx + 2] = b;
    }

    pub fn get_pixel(&self, x: i32, y: i32) -> Option<(u8, u8, u8)> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        let idx = (y as usize * self.width + x as usize) * 3;
        Some((self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]))
    }

    /// Bresenham line.
    pub fn draw_line(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, r: u8, g: u8, b: u8) {
        let (mut x, mut y) = (x1, y1);
        let dx = (x2 - x1).abs();
        let dy = (y2 - y1).abs();
        let sx = if x1 < x2 { 1 } else { -1 };
        let sy = if y1 < y2 { 1 } else { -1 };
        let mut err = dx - dy;

        loop {
            self.set_pixel(x, y, r, g, b);
            if x == x2 && y == y2 {
                break;
            }
            let e2 = 2 * err;
            if e2 > -dy {
                err -= dy;
                x += sx;
            }
            if e2 < dx {
                err += dx;
                y += sy;
            }
        }
    }

    pub fn draw_rect(&mut self, x: i32, y: i32, w: i32, h: i32, r: u8, g: u8, b: u8) {
        if w <= 0 || h <= 0 {
            return;
        }
        for i in x..x + w {
            self.set_pixel(i, y, r, g, b);
            self.set_pixel(i, y + h - 1, r, g, b);
        }
        for j in y..y + h {
            self.set_pixel(x, j, r, g, b);
            self.set_pixel(x + w - 1, j, r, g, b);
        }
    }

    pub fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, r: u8, g: u8, b: u8) {
        for j in y..y + h {
            for i in x..x + w {
                self.set_pixel(i, j, r, g, b);
            }
        }
    }

    /// Midpoint circle outline.
    pub fn draw_circle(&mut self, cx: i32, cy: i32, radius: i32, r: u8, g: u8, b: u8) {
        let mut x = radius;
        let mut y = 0;
        let mut err = 0;

        while x >= y {
            self.set_pixel(cx + x, cy + y, r, g, b);
            self.set_pixel(cx + y, cy + x, r, g, b);
            self.set_pixel(cx - y, cy + x, r, g, b);
            self.set_pixel(cx - x, cy + y, r, g, b);
            self.set_pixel(cx - x, cy - y, r, g, b);
            self.set_pixel(cx - y, cy - x, r, g, b);
            self.set_pixel(cx + y, cy - x, r, g, b);
            self.set_pixel(cx + x, cy - y, r, g, b);

            y += 1;
            if err <= 0 {
                err += 2 * y + 1;
            }
            if err > 0 {
                x -= 1;
                err -= 2 * x + 1;
            }
        }
    }

    pub fn fill_circle(&mut self, cx: i32, cy: i32, radius: i32, r: u8, g: u8, b: u8) {
        let r2 = radius * radius;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= r2 {
                    self.set_pixel(cx + dx, cy + dy, r, g, b);
                }
            }
        }
    }

    /// Copy from another buffer of identical geometry.
    pub fn copy_from(&mut self, other: &Framebuffer) {
        debug_assert_eq!(self.pixels.len(), other.pixels.len());
        self.pixels.copy_from_slice(&other.pixels);
    }

    /// Copy from another buffer, scaling every channel by `scale` (0.0..=1.0).
    pub fn copy_from_scaled(&mut self, other: &Framebuffer, scale: f32) {
        debug_assert_eq!(self.pixels.len(), other.pixels.len());
        for (dst, &src) in self.pixels.iter_mut().zip(other.pixels.iter()) {
            *dst = (src as f32 * scale) as u8;
        }
    }
}

/// HSV to RGB, hue in degrees (0..360), saturation and value in 0..1.
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let h = h.rem_euclid(360.0);
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r1, g1, b1) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    (
        ((r1 + m) * 255.0) as u8,
        ((g1 + m) * 255.0) as u8,
        ((b1 + m) * 255.0) as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_pixel_clips_out_of_bounds() {
        let mut fb = Framebuffer::new(4, 4);
        fb.set_pixel(-1, 0, 255, 255, 255);
        fb.set_pixel(0, -1, 255, 255, 255);
        fb.set_pixel(4, 0, 255, 255, 255);
        fb.set_pixel(0, 4, 255, 255, 255);
        assert!(fb.pixels().iter().all(|&b| b == 0));

        fb.set_pixel(3, 3, 10, 20, 30);
        assert_eq!(fb.get_pixel(3, 3), Some((10, 20, 30)));
    }

    #[test]
    fn fill_rect_clips_partially_offscreen() {
        let mut fb = Framebuffer::new(4, 4);
        fb.fill_rect(-2, -2, 4, 4, 1, 2, 3);
        assert_eq!(fb.get_pixel(0, 0), Some((1, 2, 3)));
        assert_eq!(fb.get_pixel(1, 1), Some((1, 2, 3)));
        assert_eq!(fb.get_pixel(2, 2), Some((0, 0, 0)));
    }

    #[test]
    fn line_endpoints_are_drawn() {
        let mut fb = Framebuffer::new(8, 8);
        fb.draw_line(0, 0, 7, 7, 9, 9, 9);
        assert_eq!(fb.get_pixel(0, 0), Some((9, 9, 9)));
        assert_eq!(fb.get_pixel(7, 7), Some((9, 9, 9)));
        assert_eq!(fb.get_pixel(3, 3), Some((9, 9, 9)));
    }

    #[test]
    fn circle_outline_touches_cardinal_points() {
        let mut fb = Framebuffer::new(16, 16);
        fb.draw_circle(8, 8, 4, 5, 5, 5);
        assert_eq!(fb.get_pixel(12, 8), Some((5, 5, 5)));
        assert_eq!(fb.get_pixel(4, 8), Some((5, 5, 5)));
        assert_eq!(fb.get_pixel(8, 12), Some((5, 5, 5)));
        assert_eq!(fb.get_pixel(8, 4), Some((5, 5, 5)));
        // interior stays empty
        assert_eq!(fb.get_pixel(8, 8), Some((0, 0, 0)));
    }

    #[test]
    fn hsv_primaries() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), (255, 0, 0));
        assert_eq!(hsv_to_rgb(120.0, 1.0, 1.0), (0, 255, 0));
        assert_eq!(hsv_to_rgb(240.0, 1.0, 1.0), (0, 0, 255));
        assert_eq!(hsv_to_rgb(0.0, 0.0, 0.0), (0, 0, 0));
    }
}
