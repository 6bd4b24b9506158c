use crate::foundation::core::Extent;
use crate::foundation::error::{CamflowError, CamflowResult};

/// Pixel layout of an incoming hardware buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BufferFormat {
    /// 8-bit RGBA, straight alpha.
    Rgba8,
    /// 8-bit RGB with an ignored fourth byte; imported as opaque.
    Rgbx8,
    /// Camera NV21: full-resolution Y plane followed by an interleaved V/U plane at half
    /// resolution. Both planes share `row_stride`.
    Nv21,
}

/// Layout description of a hardware buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    pub width: u32,
    pub height: u32,
    pub format: BufferFormat,
    /// Bytes between the starts of consecutive rows.
    pub row_stride: u32,
}

impl BufferDesc {
    /// Descriptor with the tightest legal stride for `format`.
    pub fn packed(width: u32, height: u32, format: BufferFormat) -> Self {
        let row_stride = match format {
            BufferFormat::Rgba8 | BufferFormat::Rgbx8 => width.saturating_mul(4),
            BufferFormat::Nv21 => width.div_ceil(2) * 2,
        };
        Self {
            width,
            height,
            format,
            row_stride,
        }
    }

    pub fn extent(&self) -> Extent {
        Extent::new(self.width, self.height)
    }

    /// Check dimensions and stride, returning the minimum byte length the buffer must expose.
    pub fn validate(&self) -> CamflowResult<usize> {
        if self.width == 0 || self.height == 0 {
            return Err(CamflowError::validation(format!(
                "hardware buffer must be non-empty, got {}x{}",
                self.width, self.height
            )));
        }
        let stride = self.row_stride as usize;
        let h = self.height as usize;
        match self.format {
            BufferFormat::Rgba8 | BufferFormat::Rgbx8 => {
                let row = (self.width as usize) * 4;
                if stride < row {
                    return Err(CamflowError::validation(format!(
                        "row stride {stride} is smaller than a {row}-byte rgba row"
                    )));
                }
                Ok(stride * (h - 1) + row)
            }
            BufferFormat::Nv21 => {
                let chroma_row = (self.width as usize).div_ceil(2) * 2;
                if stride < chroma_row {
                    return Err(CamflowError::validation(format!(
                        "row stride {stride} is smaller than a {chroma_row}-byte nv21 row"
                    )));
                }
                let chroma_rows = h.div_ceil(2);
                Ok(stride * h + stride * (chroma_rows - 1) + chroma_row)
            }
        }
    }
}

/// An externally owned image buffer, typically produced by a camera pipeline.
///
/// The engine only reads from the buffer while [`crate::Engine::submit_frame`] runs; it copies
/// what it needs and holds no reference afterwards.
pub trait HardwareBuffer {
    fn desc(&self) -> BufferDesc;

    /// Lock the buffer for CPU reads.
    fn lock(&self) -> CamflowResult<&[u8]>;
}

/// A heap-backed buffer, used by tests, tools and platforms without zero-copy buffers.
#[derive(Clone, Debug)]
pub struct CpuBuffer {
    desc: BufferDesc,
    data: Vec<u8>,
}

impl CpuBuffer {
    pub fn new(desc: BufferDesc, data: Vec<u8>) -> CamflowResult<Self> {
        let need = desc.validate()?;
        if data.len() < need {
            return Err(CamflowError::validation(format!(
                "buffer holds {} bytes but its layout needs {need}",
                data.len()
            )));
        }
        Ok(Self { desc, data })
    }

    pub fn rgba8(width: u32, height: u32, data: Vec<u8>) -> CamflowResult<Self> {
        Self::new(BufferDesc::packed(width, height, BufferFormat::Rgba8), data)
    }

    pub fn nv21(width: u32, height: u32, data: Vec<u8>) -> CamflowResult<Self> {
        Self::new(BufferDesc::packed(width, height, BufferFormat::Nv21), data)
    }

    pub fn solid_rgba8(width: u32, height: u32, rgba: [u8; 4]) -> CamflowResult<Self> {
        let px = (width as usize).saturating_mul(height as usize);
        Self::rgba8(width, height, rgba.repeat(px))
    }

    pub fn from_image(img: &image::RgbaImage) -> CamflowResult<Self> {
        let (w, h) = img.dimensions();
        Self::rgba8(w, h, img.as_raw().clone())
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl HardwareBuffer for CpuBuffer {
    fn desc(&self) -> BufferDesc {
        self.desc
    }

    fn lock(&self) -> CamflowResult<&[u8]> {
        Ok(&self.data)
    }
}
