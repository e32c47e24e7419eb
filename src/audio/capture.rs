use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, SampleRate, Stream, StreamConfig};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use super::{AudioSnapshot, SpectrumAnalyzer, BLOCK_SIZE};
use crate::settings::SettingsStore;

const PREFERRED_RATES: [u32; 2] = [44100, 48000];
const RECV_TIMEOUT: Duration = Duration::from_millis(250);
const REACQUIRE_DELAY: Duration = Duration::from_millis(100);

/// Owns the capture thread that turns microphone/line input into the shared
/// [`AudioSnapshot`]. Faults never cross the thread boundary: if no device
/// can be acquired the pipeline disables itself and the rest of the system
/// runs against an all-zero snapshot.
pub struct AudioPipeline {
    shared: Arc<Mutex<AudioSnapshot>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    settings: Arc<SettingsStore>,
    preferred_devices: Vec<String>,
}

impl AudioPipeline {
    /// `preferred_devices` is an ordered list of device-name substrings
    /// tried before the host default input.
    pub fn new(settings: Arc<SettingsStore>, preferred_devices: Vec<String>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(AudioSnapshot::default())),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
            settings,
            preferred_devices,
        }
    }

    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        self.running.store(true, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let running = Arc::clone(&self.running);
        let settings = Arc::clone(&self.settings);
        let preferred = self.preferred_devices.clone();

        self.handle = Some(std::thread::spawn(move || {
            capture_loop(&shared, &running, &settings, &preferred);
        }));
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn snapshot(&self) -> AudioSnapshot {
        self.shared.lock().map(|s| *s).unwrap_or_default()
    }

    pub fn snapshot_handle(&self) -> Arc<Mutex<AudioSnapshot>> {
        Arc::clone(&self.shared)
    }
}

impl Drop for AudioPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(
    shared: &Arc<Mutex<AudioSnapshot>>,
    running: &Arc<AtomicBool>,
    settings: &Arc<SettingsStore>,
    preferred: &[String],
) {
    let mut acquired_once = false;

    while running.load(Ordering::SeqCst) {
        let (stream, samples, fault) = match open_stream(preferred) {
            Ok(parts) => parts,
            Err(e) => {
                if !acquired_once {
                    // No device at startup: degrade to the silent snapshot
                    // and park until stop; the rest of the system carries on.
                    error!("audio capture disabled: {e:#}");
                    if let Ok(mut snap) = shared.lock() {
                        *snap = AudioSnapshot::default();
                    }
                    while running.load(Ordering::SeqCst) {
                        std::thread::sleep(RECV_TIMEOUT);
                    }
                    return;
                }
                warn!("audio device reacquisition failed: {e:#}");
                for _ in 0..10 {
                    if !running.load(Ordering::SeqCst) {
                        return;
                    }
                    std::thread::sleep(REACQUIRE_DELAY);
                }
                continue;
            }
        };
        acquired_once = true;
        info!("audio capture started");

        process_blocks(shared, running, settings, &samples, &fault);
        drop(stream);

        if running.load(Ordering::SeqCst) {
            warn!("audio stream fault, reacquiring device");
        }
    }

    info!("audio capture stopped");
}

/// Assemble fixed blocks from the callback channel and publish snapshots
/// until stop, stream fault, or channel teardown.
fn process_blocks(
    shared: &Arc<Mutex<AudioSnapshot>>,
    running: &Arc<AtomicBool>,
    settings: &Arc<SettingsStore>,
    samples: &Receiver<Vec<f32>>,
    fault: &Arc<AtomicBool>,
) {
    let mut analyzer = SpectrumAnalyzer::new();
    let mut pending: Vec<f32> = Vec::with_capacity(BLOCK_SIZE * 2);

    while running.load(Ordering::SeqCst) && !fault.load(Ordering::SeqCst) {
        match samples.recv_timeout(RECV_TIMEOUT) {
            Ok(chunk) => {
                pending.extend_from_slice(&chunk);
                while pending.len() >= BLOCK_SIZE {
                    let block: Vec<f32> = pending.drain(..BLOCK_SIZE).collect();
                    let snap = analyzer.analyze(&block, settings.sensitivity());
                    if let Ok(mut latest) = shared.lock() {
                        *latest = snap;
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn open_stream(preferred: &[String]) -> Result<(Stream, Receiver<Vec<f32>>, Arc<AtomicBool>)> {
    let host = cpal::default_host();
    let device = acquire_device(&host, preferred).ok_or_else(|| anyhow!("no input device"))?;
    info!(
        "using audio device: {}",
        device.name().unwrap_or_else(|_| "unknown".to_string())
    );

    let (tx, rx) = crossbeam_channel::unbounded();
    let fault = Arc::new(AtomicBool::new(false));
    let stream = build_stream(&device, tx, Arc::clone(&fault))?;
    stream.play().context("starting input stream")?;

    Ok((stream, rx, fault))
}

/// First device whose name contains a preferred substring, in preference
/// order, else the host default input.
fn acquire_device(host: &cpal::Host, preferred: &[String]) -> Option<Device> {
    if !preferred.is_empty() {
        if let Ok(devices) = host.input_devices() {
            let named: Vec<(String, Device)> = devices
                .filter_map(|d| d.name().ok().map(|n| (n, d)))
                .collect();
            for want in preferred {
                if let Some((name, device)) =
                    named.iter().find(|(n, _)| n.contains(want.as_str()))
                {
                    debug!("matched preferred device: {name}");
                    return Some(device.clone());
                }
            }
        }
    }
    host.default_input_device()
}

fn build_stream(
    device: &Device,
    tx: Sender<Vec<f32>>,
    fault: Arc<AtomicBool>,
) -> Result<Stream> {
    // Preferred: 16-bit signed mono at a canonical rate.
    for rate in PREFERRED_RATES {
        let config = StreamConfig {
            channels: 1,
            sample_rate: SampleRate(rate),
            buffer_size: BufferSize::Default,
        };
        match build_i16_stream(device, &config, tx.clone(), Arc::clone(&fault)) {
            Ok(stream) => {
                info!("audio format: {} Hz mono i16", rate);
                return Ok(stream);
            }
            Err(e) => debug!("i16 mono @ {} Hz rejected: {e}", rate),
        }
    }

    // Neither canonical rate worked; take whatever the device offers and
    // downmix in the callback.
    let supported = device
        .default_input_config()
        .context("querying default input config")?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();
    info!(
        "audio format fallback: {} Hz, {} ch, {:?}",
        config.sample_rate.0, config.channels, sample_format
    );

    match sample_format {
        SampleFormat::I16 => build_i16_stream(device, &config, tx, fault),
        SampleFormat::F32 => build_f32_stream(device, &config, tx, fault),
        other => Err(anyhow!("unsupported sample format {other:?}")),
    }
}

fn build_i16_stream(
    device: &Device,
    config: &StreamConfig,
    tx: Sender<Vec<f32>>,
    fault: Arc<AtomicBool>,
) -> Result<Stream> {
    let channels = config.channels as usize;
    let stream = device.build_input_stream(
        config,
        move |data: &[i16], _: &cpal::InputCallbackInfo| {
            let mono = downmix(data.iter().map(|&s| s as f32 / 32768.0), channels);
            if tx.send(mono).is_err() {
                warn!("failed to send audio data");
            }
        },
        move |err| {
            warn!("audio stream error: {err}");
            fault.store(true, Ordering::SeqCst);
        },
        None,
    )?;
    Ok(stream)
}

fn build_f32_stream(
    device: &Device,
    config: &StreamConfig,
    tx: Sender<Vec<f32>>,
    fault: Arc<AtomicBool>,
) -> Result<Stream> {
    let channels = config.channels as usize;
    let stream = device.build_input_stream(
        config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let mono = downmix(data.iter().copied(), channels);
            if tx.send(mono).is_err() {
                warn!("failed to send audio data");
            }
        },
        move |err| {
            warn!("audio stream error: {err}");
            fault.store(true, Ordering::SeqCst);
        },
        None,
    )?;
    Ok(stream)
}

fn downmix(samples: impl Iterator<Item = f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.collect();
    }
    let interleaved: Vec<f32> = samples.collect();
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_channels() {
        let stereo = vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        let mono = downmix(stereo.into_iter(), 2);
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn downmix_mono_is_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(downmix(samples.clone().into_iter(), 1), samples);
    }

    #[test]
    fn pipeline_without_device_serves_silent_snapshot() {
        // On hosts with no capture hardware the thread disables itself and
        // the snapshot stays all-zero.
        let settings = Arc::new(SettingsStore::default());
        let pipeline = AudioPipeline::new(settings, vec![]);
        let snap = pipeline.snapshot();
        assert_eq!(snap.volume, 0.0);
        assert_eq!(snap.beat, 0.0);
    }
}
