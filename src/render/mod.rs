//! Drawing backends.
//!
//! A backend turns the current [`SourceFrame`] plus the active [`EngineMode`] into pixels of a
//! presentation image. The CPU backend is always built; the `gpu` feature adds a `wgpu` backend
//! that draws offscreen and reads back.

pub mod cpu;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod ledger;

use std::sync::Arc;

use crate::assets::lut::Lut3d;
use crate::foundation::core::Extent;
use crate::foundation::error::{CamflowError, CamflowResult};
use crate::frame::import::SourceFrame;
use crate::stage::EngineMode;

pub use ledger::{ResourceLedger, TrackedResource};

/// Straight-alpha RGBA8 image, rows tightly packed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl FrameRGBA {
    pub fn new(extent: Extent) -> Self {
        Self {
            width: extent.width,
            height: extent.height,
            data: vec![0; extent.pixel_count() * 4],
        }
    }

    pub fn extent(&self) -> Extent {
        Extent::new(self.width, self.height)
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    pub fn to_image(&self) -> CamflowResult<image::RgbaImage> {
        image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| CamflowError::render("frame buffer does not match its extent"))
    }
}

/// Everything a backend needs to draw one frame.
#[derive(Clone, Copy, Debug)]
pub struct DrawPass<'a> {
    pub mode: EngineMode,
    /// Latest submitted frame; `None` until the first submission.
    pub source: Option<&'a SourceFrame>,
    pub clear_rgba: [u8; 4],
}

pub trait RenderBackend: Send {
    fn kind(&self) -> BackendKind;

    /// Upload (or replace) the grading table.
    fn set_lut(&mut self, lut: Arc<Lut3d>) -> CamflowResult<()>;

    /// Draw one frame into `target`, which the caller sized to the presentation extent.
    fn draw(&mut self, pass: &DrawPass<'_>, target: &mut FrameRGBA) -> CamflowResult<()>;

    /// Free every device object. Later draws fail.
    fn release(&mut self);
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Cpu,
    Gpu,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RenderSettings {
    /// Worker threads for the CPU backend; `None` uses one per core.
    #[serde(default)]
    pub threads: Option<usize>,
}

pub fn create_backend(
    kind: BackendKind,
    settings: &RenderSettings,
    ledger: &ResourceLedger,
) -> CamflowResult<Box<dyn RenderBackend>> {
    match kind {
        BackendKind::Cpu => Ok(Box::new(cpu::CpuBackend::new(settings, ledger.clone())?)),
        #[cfg(feature = "gpu")]
        BackendKind::Gpu => Ok(Box::new(gpu::GpuBackend::new(ledger.clone())?)),
        #[allow(unreachable_patterns)]
        _ => Err(CamflowError::initialization(format!(
            "requested backend '{kind}' is not available in this build"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_fill_and_pixel() {
        let mut frame = FrameRGBA::new(Extent::new(3, 2));
        assert_eq!(frame.data.len(), 24);
        frame.fill([1, 2, 3, 4]);
        assert_eq!(frame.pixel(2, 1), [1, 2, 3, 4]);
        let img = frame.to_image().unwrap();
        assert_eq!(img.dimensions(), (3, 2));
    }

    #[test]
    fn backend_kind_parses_from_config_names() {
        let k: BackendKind = serde_json::from_str("\"gpu\"").unwrap();
        assert_eq!(k, BackendKind::Gpu);
        assert_eq!(BackendKind::default().to_string(), "cpu");
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn gpu_backend_is_an_initialization_error_without_the_feature() {
        let err = create_backend(
            BackendKind::Gpu,
            &RenderSettings::default(),
            &ResourceLedger::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, CamflowError::Initialization(_)));
    }
}
