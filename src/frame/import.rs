use crate::foundation::core::{Extent, Orientation};
use crate::foundation::error::{CamflowError, CamflowResult};
use crate::frame::buffer::{BufferFormat, HardwareBuffer};
use crate::frame::yuv::nv21_to_rgba;

/// A submitted frame after import: owned, tightly packed RGBA8 with straight alpha.
#[derive(Clone, Debug)]
pub struct SourceFrame {
    pub extent: Extent,
    pub rgba: Vec<u8>,
    pub orientation: Orientation,
    /// Monotonic submission counter, starting at 1.
    pub seq: u64,
}

impl SourceFrame {
    /// Extent after the orientation's rotation is applied.
    pub fn display_extent(&self) -> Extent {
        if self.orientation.rotation.swaps_axes() {
            self.extent.transposed()
        } else {
            self.extent
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.extent.width as usize + x as usize) * 4;
        [
            self.rgba[i],
            self.rgba[i + 1],
            self.rgba[i + 2],
            self.rgba[i + 3],
        ]
    }
}

/// Copy the content of `buffer` into an owned [`SourceFrame`].
///
/// The buffer is locked only for the duration of this call.
#[tracing::instrument(level = "trace", skip(buffer))]
pub fn import_buffer(
    buffer: &dyn HardwareBuffer,
    orientation: Orientation,
    seq: u64,
) -> CamflowResult<SourceFrame> {
    let desc = buffer.desc();
    let need = desc.validate()?;
    let data = buffer.lock()?;
    if data.len() < need {
        return Err(CamflowError::validation(format!(
            "hardware buffer exposes {} bytes but its layout needs {need}",
            data.len()
        )));
    }

    let extent = desc.extent();
    let stride = desc.row_stride as usize;
    let row = extent.width as usize * 4;
    let rgba = match desc.format {
        BufferFormat::Rgba8 => copy_rows(data, stride, row, extent.height as usize),
        BufferFormat::Rgbx8 => {
            let mut out = copy_rows(data, stride, row, extent.height as usize);
            for px in out.chunks_exact_mut(4) {
                px[3] = 255;
            }
            out
        }
        BufferFormat::Nv21 => nv21_to_rgba(extent, stride, data),
    };

    Ok(SourceFrame {
        extent,
        rgba,
        orientation,
        seq,
    })
}

fn copy_rows(data: &[u8], stride: usize, row: usize, rows: usize) -> Vec<u8> {
    if stride == row {
        return data[..row * rows].to_vec();
    }
    let mut out = Vec::with_capacity(row * rows);
    for y in 0..rows {
        out.extend_from_slice(&data[y * stride..y * stride + row]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::buffer::{BufferDesc, CpuBuffer};

    #[test]
    fn padded_rows_are_compacted() {
        let desc = BufferDesc {
            width: 1,
            height: 2,
            format: BufferFormat::Rgba8,
            row_stride: 8,
        };
        let data = vec![1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8];
        let buf = CpuBuffer::new(desc, data).unwrap();
        let frame = import_buffer(&buf, Orientation::IDENTITY, 1).unwrap();
        assert_eq!(frame.rgba, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn rgbx_is_imported_opaque() {
        let desc = BufferDesc::packed(1, 1, BufferFormat::Rgbx8);
        let buf = CpuBuffer::new(desc, vec![9, 8, 7, 0]).unwrap();
        let frame = import_buffer(&buf, Orientation::IDENTITY, 1).unwrap();
        assert_eq!(frame.pixel(0, 0), [9, 8, 7, 255]);
    }

    #[test]
    fn quarter_turn_swaps_display_extent() {
        let buf = CpuBuffer::solid_rgba8(4, 2, [0, 0, 0, 255]).unwrap();
        let frame = import_buffer(&buf, Orientation::ROTATE_90, 3).unwrap();
        assert_eq!(frame.extent, Extent::new(4, 2));
        assert_eq!(frame.display_extent(), Extent::new(2, 4));
        assert_eq!(frame.seq, 3);
    }

    struct ShortBuffer;

    impl HardwareBuffer for ShortBuffer {
        fn desc(&self) -> BufferDesc {
            BufferDesc::packed(2, 2, BufferFormat::Rgba8)
        }

        fn lock(&self) -> CamflowResult<&[u8]> {
            Ok(&[0u8; 4])
        }
    }

    #[test]
    fn short_buffers_are_rejected() {
        let err = import_buffer(&ShortBuffer, Orientation::IDENTITY, 1).unwrap_err();
        assert!(matches!(err, CamflowError::Validation(_)));
    }
}
