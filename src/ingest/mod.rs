//! UDP frame ingestion: remote senders push P6 frames that are composited
//! onto a shared canvas, optionally at an offset, so several senders can
//! each own a region of the matrix.

pub mod wire;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::framebuffer::Framebuffer;
use wire::WireFrame;

pub const DEFAULT_PORT: u16 = 1337;

const READ_TIMEOUT: Duration = Duration::from_millis(250);

// Largest UDP datagram we will accept.
const RECV_BUFFER: usize = 65536;

/// Listener thread plus the canvas remote frames land on. The render loop
/// reads the canvas under the same mutex the listener composites under, so
/// it never observes a half-written frame.
pub struct FrameIngestService {
    canvas: Arc<Mutex<Framebuffer>>,
    running: Arc<AtomicBool>,
    frames_received: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
    port: u16,
}

impl FrameIngestService {
    pub fn new(width: usize, height: usize, port: u16) -> Self {
        Self {
            canvas: Arc::new(Mutex::new(Framebuffer::new(width, height))),
            running: Arc::new(AtomicBool::new(false)),
            frames_received: Arc::new(AtomicU64::new(0)),
            handle: None,
            port,
        }
    }

    pub fn canvas_handle(&self) -> Arc<Mutex<Framebuffer>> {
        Arc::clone(&self.canvas)
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    /// Bound port; meaningful after `start` (port 0 resolves to a real one).
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }

        let socket = UdpSocket::bind(("0.0.0.0", self.port))
            .with_context(|| format!("binding ingest socket on port {}", self.port))?;
        socket
            .set_read_timeout(Some(READ_TIMEOUT))
            .context("setting ingest read timeout")?;
        // port 0 asks the OS for any free port; remember what we got
        self.port = socket.local_addr().context("ingest local addr")?.port();
        info!("frame ingestion listening on udp/{}", self.port);

        self.running.store(true, Ordering::SeqCst);
        let canvas = Arc::clone(&self.canvas);
        let running = Arc::clone(&self.running);
        let frames = Arc::clone(&self.frames_received);

        self.handle = Some(std::thread::spawn(move || {
            listen_loop(&socket, &canvas, &running, &frames);
        }));
        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FrameIngestService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn listen_loop(
    socket: &UdpSocket,
    canvas: &Arc<Mutex<Framebuffer>>,
    running: &Arc<AtomicBool>,
    frames: &Arc<AtomicU64>,
) {
    let mut buf = vec![0u8; RECV_BUFFER];

    while running.load(Ordering::SeqCst) {
        let len = match socket.recv_from(&mut buf) {
            Ok((len, _)) => len,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                warn!("ingest socket error: {e}");
                continue;
            }
        };

        // Malformed packets are dropped without a log line; a chatty sender
        // must not be able to flood the journal.
        let Some(frame) = wire::decode(&buf[..len]) else {
            continue;
        };

        if let Ok(mut dst) = canvas.lock() {
            composite(&mut dst, &frame);
        }
        let n = frames.fetch_add(1, Ordering::Relaxed) + 1;
        if n % 500 == 0 {
            debug!("ingested {n} frames");
        }
    }

    info!("frame ingestion stopped");
}

/// Paint a decoded frame onto the canvas at its offset, clipping per pixel.
/// Pixels outside the canvas are discarded; the rest of the canvas keeps
/// whatever a previous sender put there.
fn composite(dst: &mut Framebuffer, frame: &WireFrame) {
    for y in 0..frame.height {
        for x in 0..frame.width {
            let idx = (y * frame.width + x) * 3;
            dst.set_pixel(
                x as i32 + frame.offset_x,
                y as i32 + frame.offset_y,
                frame.pixels[idx],
                frame.pixels[idx + 1],
                frame.pixels[idx + 2],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: usize, height: usize, rgb: (u8, u8, u8), ox: i32, oy: i32) -> WireFrame {
        let mut pixels = Vec::with_capacity(width * height * 3);
        for _ in 0..width * height {
            pixels.extend_from_slice(&[rgb.0, rgb.1, rgb.2]);
        }
        WireFrame {
            width,
            height,
            offset_x: ox,
            offset_y: oy,
            pixels,
        }
    }

    #[test]
    fn composite_places_frame_at_offset() {
        let mut canvas = Framebuffer::new(8, 8);
        composite(&mut canvas, &solid_frame(2, 2, (10, 20, 30), 3, 4));
        assert_eq!(canvas.get_pixel(3, 4), Some((10, 20, 30)));
        assert_eq!(canvas.get_pixel(4, 5), Some((10, 20, 30)));
        assert_eq!(canvas.get_pixel(2, 4), Some((0, 0, 0)));
        assert_eq!(canvas.get_pixel(5, 4), Some((0, 0, 0)));
    }

    #[test]
    fn composite_clips_negative_offset() {
        let mut canvas = Framebuffer::new(4, 4);
        composite(&mut canvas, &solid_frame(4, 1, (9, 9, 9), -2, 0));
        // columns -2 and -1 fall off; columns 0 and 1 land
        assert_eq!(canvas.get_pixel(0, 0), Some((9, 9, 9)));
        assert_eq!(canvas.get_pixel(1, 0), Some((9, 9, 9)));
        assert_eq!(canvas.get_pixel(2, 0), Some((0, 0, 0)));
    }

    #[test]
    fn partial_frames_leave_rest_of_canvas_intact() {
        let mut canvas = Framebuffer::new(8, 8);
        composite(&mut canvas, &solid_frame(8, 8, (1, 1, 1), 0, 0));
        composite(&mut canvas, &solid_frame(2, 2, (200, 0, 0), 6, 6));
        assert_eq!(canvas.get_pixel(0, 0), Some((1, 1, 1)));
        assert_eq!(canvas.get_pixel(7, 7), Some((200, 0, 0)));
    }

    #[test]
    fn service_receives_and_composites_datagrams() {
        // Port 0 binds an ephemeral port; start() records the real one.
        let mut service = FrameIngestService::new(8, 8, 0);
        service.start().unwrap();
        let port = service.port();
        assert_ne!(port, 0);

        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let pixels = vec![50u8; 2 * 2 * 3];
        let packet = wire::encode(&pixels, 2, 2, 1, 1);
        socket.send_to(&packet, ("127.0.0.1", port)).unwrap();

        let canvas = service.canvas_handle();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            {
                let c = canvas.lock().unwrap();
                if c.get_pixel(1, 1) == Some((50, 50, 50)) {
                    break;
                }
            }
            assert!(
                std::time::Instant::now() < deadline,
                "frame never arrived"
            );
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(service.frames_received(), 1);
        service.stop();
    }
}
