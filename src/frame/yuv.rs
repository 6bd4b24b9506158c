//! BT.601 limited-range conversions between RGBA8 and NV21.

use crate::foundation::core::Extent;

/// NV21 output of the planar conversion stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanarFrame {
    pub width: u32,
    pub height: u32,
    /// Full-resolution luma, `width * height` bytes.
    pub y: Vec<u8>,
    /// Interleaved V/U at half resolution (rounded up), V first.
    pub vu: Vec<u8>,
    /// Sequence number of the submitted frame this was converted from.
    pub source_seq: u64,
}

impl PlanarFrame {
    pub fn extent(&self) -> Extent {
        Extent::new(self.width, self.height)
    }

    /// Concatenated Y and VU planes, as NV21 consumers expect them.
    pub fn to_nv21_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.y.len() + self.vu.len());
        out.extend_from_slice(&self.y);
        out.extend_from_slice(&self.vu);
        out
    }
}

pub(crate) fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    (clamp_u8(y), clamp_u8(u), clamp_u8(v))
}

pub(crate) fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    [
        clamp_u8((298 * c + 409 * e + 128) >> 8),
        clamp_u8((298 * c - 100 * d - 208 * e + 128) >> 8),
        clamp_u8((298 * c + 516 * d + 128) >> 8),
    ]
}

fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Convert tightly packed RGBA8 into NV21. Chroma is taken from the average colour of each 2x2
/// block; blocks on odd edges reuse the last row/column.
pub fn rgba_to_nv21(extent: Extent, rgba: &[u8], source_seq: u64) -> PlanarFrame {
    let w = extent.width as usize;
    let h = extent.height as usize;
    debug_assert!(rgba.len() >= w * h * 4);

    let mut y_plane = Vec::with_capacity(w * h);
    for px in rgba.chunks_exact(4).take(w * h) {
        y_plane.push(rgb_to_yuv(px[0], px[1], px[2]).0);
    }

    let cw = w.div_ceil(2);
    let ch = h.div_ceil(2);
    let mut vu = Vec::with_capacity(cw * ch * 2);
    for cy in 0..ch {
        for cx in 0..cw {
            let mut sum = [0u32; 3];
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let x = (cx * 2 + dx).min(w - 1);
                let y = (cy * 2 + dy).min(h - 1);
                let i = (y * w + x) * 4;
                sum[0] += rgba[i] as u32;
                sum[1] += rgba[i + 1] as u32;
                sum[2] += rgba[i + 2] as u32;
            }
            let avg = sum.map(|s| ((s + 2) / 4) as u8);
            let (_, u, v) = rgb_to_yuv(avg[0], avg[1], avg[2]);
            vu.push(v);
            vu.push(u);
        }
    }

    PlanarFrame {
        width: extent.width,
        height: extent.height,
        y: y_plane,
        vu,
        source_seq,
    }
}

/// Expand NV21 planes (sharing `row_stride`) into tightly packed, opaque RGBA8.
pub fn nv21_to_rgba(extent: Extent, row_stride: usize, data: &[u8]) -> Vec<u8> {
    let w = extent.width as usize;
    let h = extent.height as usize;
    let chroma_base = row_stride * h;

    let mut out = Vec::with_capacity(w * h * 4);
    for y in 0..h {
        let luma_row = &data[y * row_stride..y * row_stride + w];
        let chroma_row = chroma_base + (y / 2) * row_stride;
        for (x, &luma) in luma_row.iter().enumerate() {
            let ci = chroma_row + (x / 2) * 2;
            let [r, g, b] = yuv_to_rgb(luma, data[ci + 1], data[ci]);
            out.extend_from_slice(&[r, g, b, 255]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_points_match_bt601_limited_range() {
        assert_eq!(rgb_to_yuv(0, 0, 0), (16, 128, 128));
        assert_eq!(rgb_to_yuv(255, 255, 255), (235, 128, 128));
        assert_eq!(yuv_to_rgb(16, 128, 128), [0, 0, 0]);
        assert_eq!(yuv_to_rgb(235, 128, 128), [255, 255, 255]);
    }

    #[test]
    fn neutral_gray_survives_a_roundtrip() {
        let (y, u, v) = rgb_to_yuv(128, 128, 128);
        assert_eq!(yuv_to_rgb(y, u, v), [128, 128, 128]);
    }

    #[test]
    fn nv21_planes_have_expected_sizes_for_odd_extent() {
        let extent = Extent::new(3, 3);
        let rgba = [200u8, 30, 30, 255].repeat(9);
        let planar = rgba_to_nv21(extent, &rgba, 7);
        assert_eq!(planar.y.len(), 9);
        assert_eq!(planar.vu.len(), 2 * 2 * 2);
        assert_eq!(planar.source_seq, 7);
        assert_eq!(planar.to_nv21_bytes().len(), 17);
    }

    #[test]
    fn saturated_colours_keep_their_dominant_channel() {
        let extent = Extent::new(2, 2);
        let red = [255u8, 0, 0, 255].repeat(4);
        let planar = rgba_to_nv21(extent, &red, 0);
        let rgba = nv21_to_rgba(extent, 2, &planar.to_nv21_bytes());
        assert_eq!(rgba.len(), 16);
        for px in rgba.chunks_exact(4) {
            assert!(px[0] > 240, "red channel {px:?}");
            assert!(px[1] < 16 && px[2] < 16, "other channels {px:?}");
            assert_eq!(px[3], 255);
        }
    }
}
