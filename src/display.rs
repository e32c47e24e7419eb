//! Output surfaces. The render loop draws into a [`Framebuffer`] and hands
//! the finished frame to whichever surface was selected at startup: an
//! in-memory sink, a terminal preview, or a UDP relay to a real matrix.

use anyhow::{Context, Result};
use log::info;
use std::io::Write;
use std::net::UdpSocket;

use crate::framebuffer::Framebuffer;
use crate::ingest::wire;

pub trait Surface {
    fn width(&self) -> usize;

    fn height(&self) -> usize;

    /// Push one finished frame out. Geometry must match the surface.
    fn present(&mut self, frame: &Framebuffer) -> Result<()>;
}

/// Keeps the last presented frame. Used headless and in tests.
pub struct MemorySurface {
    last: Framebuffer,
    frames: u64,
}

impl MemorySurface {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            last: Framebuffer::new(width, height),
            frames: 0,
        }
    }

    pub fn last_frame(&self) -> &Framebuffer {
        &self.last
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames
    }
}

impl Surface for MemorySurface {
    fn width(&self) -> usize {
        self.last.width()
    }

    fn height(&self) -> usize {
        self.last.height()
    }

    fn present(&mut self, frame: &Framebuffer) -> Result<()> {
        self.last.copy_from(frame);
        self.frames += 1;
        Ok(())
    }
}

/// Terminal preview: two matrix rows per text row using the upper-half-block
/// glyph with truecolor escapes. Rewrites in place via cursor home.
pub struct AnsiSurface {
    width: usize,
    height: usize,
    out: std::io::Stdout,
    buf: String,
}

impl AnsiSurface {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            out: std::io::stdout(),
            buf: String::with_capacity(width * height * 24),
        }
    }
}

impl Surface for AnsiSurface {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn present(&mut self, frame: &Framebuffer) -> Result<()> {
        use std::fmt::Write as _;

        self.buf.clear();
        self.buf.push_str("\x1b[H");
        for y in (0..self.height).step_by(2) {
            for x in 0..self.width {
                let (tr, tg, tb) = frame.get_pixel(x as i32, y as i32).unwrap_or((0, 0, 0));
                let (br, bg, bb) = frame
                    .get_pixel(x as i32, y as i32 + 1)
                    .unwrap_or((0, 0, 0));
                let _ = write!(
                    self.buf,
                    "\x1b[38;2;{tr};{tg};{tb}m\x1b[48;2;{br};{bg};{bb}m\u{2580}"
                );
            }
            self.buf.push_str("\x1b[0m\n");
        }

        let mut lock = self.out.lock();
        lock.write_all(self.buf.as_bytes())
            .context("writing terminal frame")?;
        lock.flush().context("flushing terminal frame")?;
        Ok(())
    }
}

/// Sends every frame to a remote matrix server as a UDP P6 packet.
pub struct RelaySurface {
    socket: UdpSocket,
    width: usize,
    height: usize,
    offset: (i32, i32),
    frames: u64,
}

impl RelaySurface {
    pub fn connect(addr: &str, width: usize, height: usize, offset: (i32, i32)) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").context("binding relay socket")?;
        socket
            .connect(addr)
            .with_context(|| format!("resolving relay target {addr}"))?;
        info!("relaying frames to {addr}");
        Ok(Self {
            socket,
            width,
            height,
            offset,
            frames: 0,
        })
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames
    }
}

impl Surface for RelaySurface {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn present(&mut self, frame: &Framebuffer) -> Result<()> {
        let packet = wire::encode(
            frame.pixels(),
            frame.width(),
            frame.height(),
            self.offset.0,
            self.offset.1,
        );
        // One frame dropped on a full send buffer is invisible at 100 fps.
        if self.socket.send(&packet).is_ok() {
            self.frames += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_surface_retains_last_frame() {
        let mut surface = MemorySurface::new(4, 4);
        let mut frame = Framebuffer::new(4, 4);
        frame.set_pixel(2, 1, 7, 8, 9);
        surface.present(&frame).unwrap();
        assert_eq!(surface.last_frame().get_pixel(2, 1), Some((7, 8, 9)));
        assert_eq!(surface.frames_presented(), 1);
    }

    #[test]
    fn relay_surface_emits_decodable_packets() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();
        let addr = receiver.local_addr().unwrap();

        let mut surface = RelaySurface::connect(&addr.to_string(), 2, 2, (5, 0)).unwrap();
        let mut frame = Framebuffer::new(2, 2);
        frame.fill(1, 2, 3);
        surface.present(&frame).unwrap();
        assert_eq!(surface.frames_sent(), 1);

        let mut buf = [0u8; 1024];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        let decoded = wire::decode(&buf[..len]).unwrap();
        assert_eq!((decoded.width, decoded.height), (2, 2));
        assert_eq!((decoded.offset_x, decoded.offset_y), (5, 0));
        assert_eq!(&decoded.pixels[..3], &[1, 2, 3]);
    }
}
