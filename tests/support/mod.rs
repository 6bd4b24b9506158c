#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use camflow::render::cpu::CpuBackend;
use camflow::render::{DrawPass, FrameRGBA};
use camflow::{
    BackendKind, CamflowError, CamflowResult, EngineOpts, Lut3d, MemoryAssets, RenderBackend,
    RenderSettings, ResourceLedger,
};

pub const LUT_PATH: &str = "luts/default.png";

pub fn encode_png(img: &image::RgbaImage) -> Vec<u8> {
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img.clone())
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

/// Red/blue swap: easy to tell apart from passthrough.
pub fn swap_lut() -> Lut3d {
    Lut3d::from_fn(9, |[r, g, b]| [b, g, r]).unwrap()
}

/// [`swap_lut`] as the engine sees it after the PNG round trip.
pub fn loaded_swap_lut() -> Lut3d {
    Lut3d::decode(&encode_png(&swap_lut().to_strip_image())).unwrap()
}

pub fn assets_with(lut: &Lut3d) -> MemoryAssets {
    MemoryAssets::new()
        .with(LUT_PATH, encode_png(&lut.to_strip_image()))
        .unwrap()
}

pub fn assets() -> MemoryAssets {
    assets_with(&swap_lut())
}

pub fn fast_opts() -> EngineOpts {
    EngineOpts {
        frame_interval_ms: 0,
        ..EngineOpts::default()
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

pub fn temp_dir(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "camflow_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

/// CPU backend that reports device loss after a fixed number of successful draws.
pub struct LosingBackend {
    inner: CpuBackend,
    draws_left: usize,
}

impl LosingBackend {
    pub fn new(ledger: &ResourceLedger, draws_before_loss: usize) -> Self {
        Self {
            inner: CpuBackend::new(&RenderSettings::default(), ledger.clone()).unwrap(),
            draws_left: draws_before_loss,
        }
    }
}

impl RenderBackend for LosingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }

    fn set_lut(&mut self, lut: Arc<Lut3d>) -> CamflowResult<()> {
        self.inner.set_lut(lut)
    }

    fn draw(&mut self, pass: &DrawPass<'_>, target: &mut FrameRGBA) -> CamflowResult<()> {
        if self.draws_left == 0 {
            return Err(CamflowError::device_lost("simulated device loss"));
        }
        self.draws_left -= 1;
        self.inner.draw(pass, target)
    }

    fn release(&mut self) {
        self.inner.release();
    }
}

/// CPU backend that takes at least `delay` per draw.
pub struct SlowBackend {
    inner: CpuBackend,
    delay: Duration,
}

impl SlowBackend {
    pub fn new(ledger: &ResourceLedger, delay: Duration) -> Self {
        Self {
            inner: CpuBackend::new(&RenderSettings::default(), ledger.clone()).unwrap(),
            delay,
        }
    }
}

impl RenderBackend for SlowBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }

    fn set_lut(&mut self, lut: Arc<Lut3d>) -> CamflowResult<()> {
        self.inner.set_lut(lut)
    }

    fn draw(&mut self, pass: &DrawPass<'_>, target: &mut FrameRGBA) -> CamflowResult<()> {
        std::thread::sleep(self.delay);
        self.inner.draw(pass, target)
    }

    fn release(&mut self) {
        self.inner.release();
    }
}
