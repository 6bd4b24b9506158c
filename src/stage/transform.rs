use crate::foundation::core::{Affine, Extent, Orientation, Point};

/// Maps target pixels back onto the source frame.
///
/// The forward model works in normalized device coordinates (`-1..=1`, y down): the source quad
/// is mirrored, rotated clockwise by the orientation, then scaled so that the rotated image keeps
/// its aspect ratio inside the target (letterbox or pillarbox).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayTransform {
    model: Affine,
    inverse: Affine,
}

impl DisplayTransform {
    pub fn fit(source: Extent, orientation: Orientation, target: Extent) -> Self {
        let display = if orientation.rotation.swaps_axes() {
            source.transposed()
        } else {
            source
        };
        let win_ratio = target.aspect();
        let src_ratio = display.aspect();

        let scale = if src_ratio >= win_ratio {
            Affine::scale_non_uniform(1.0, win_ratio / src_ratio)
        } else {
            Affine::scale_non_uniform(src_ratio / win_ratio, 1.0)
        };
        let mirror = if orientation.mirrored {
            Affine::scale_non_uniform(-1.0, 1.0)
        } else {
            Affine::IDENTITY
        };
        let rotate = Affine::rotate((orientation.rotation.degrees() as f64).to_radians());

        let model = scale * rotate * mirror;
        Self {
            model,
            inverse: model.inverse(),
        }
    }

    pub fn model(&self) -> Affine {
        self.model
    }

    /// Coefficients of the target-to-source mapping, in `kurbo` order `[a, b, c, d, e, f]`.
    pub fn inverse_coeffs(&self) -> [f64; 6] {
        self.inverse.as_coeffs()
    }

    /// Source texture coordinate (`0..=1`) for a point in target NDC, or `None` outside the
    /// source quad.
    pub fn source_uv(&self, ndc: Point) -> Option<Point> {
        let q = self.inverse * ndc;
        if q.x.abs() > 1.0 || q.y.abs() > 1.0 {
            return None;
        }
        Some(Point::new((q.x + 1.0) * 0.5, (q.y + 1.0) * 0.5))
    }

    /// Source texel sampled (nearest) by the centre of target pixel `(x, y)`.
    pub fn source_texel(
        &self,
        x: u32,
        y: u32,
        target: Extent,
        source: Extent,
    ) -> Option<(u32, u32)> {
        let ndc = Point::new(
            (x as f64 + 0.5) / target.width as f64 * 2.0 - 1.0,
            (y as f64 + 0.5) / target.height as f64 * 2.0 - 1.0,
        );
        let uv = self.source_uv(ndc)?;
        let sx = ((uv.x * source.width as f64) as u32).min(source.width.saturating_sub(1));
        let sy = ((uv.y * source.height as f64) as u32).min(source.height.saturating_sub(1));
        Some((sx, sy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_aspect_fills_target() {
        let xf = DisplayTransform::fit(
            Extent::new(4, 2),
            Orientation::IDENTITY,
            Extent::new(8, 4),
        );
        let target = Extent::new(8, 4);
        let source = Extent::new(4, 2);
        assert_eq!(xf.source_texel(0, 0, target, source), Some((0, 0)));
        assert_eq!(xf.source_texel(7, 3, target, source), Some((3, 1)));
    }

    #[test]
    fn wide_source_is_letterboxed() {
        let target = Extent::new(4, 4);
        let source = Extent::new(4, 2);
        let xf = DisplayTransform::fit(source, Orientation::IDENTITY, target);
        // Rows 0 and 3 fall outside the scaled quad.
        assert_eq!(xf.source_texel(1, 0, target, source), None);
        assert_eq!(xf.source_texel(1, 3, target, source), None);
        assert!(xf.source_texel(1, 1, target, source).is_some());
    }

    #[test]
    fn quarter_turn_rotates_clockwise() {
        // Source is a 2x1 strip: texel (0, 0) on the left, (1, 0) on the right.
        let target = Extent::new(4, 4);
        let source = Extent::new(2, 1);
        let xf = DisplayTransform::fit(source, Orientation::ROTATE_90, target);
        // After a clockwise quarter turn the left texel ends up on top.
        assert_eq!(xf.source_texel(1, 0, target, source), Some((0, 0)));
        assert_eq!(xf.source_texel(1, 3, target, source), Some((1, 0)));
        // Pillarbox columns.
        assert_eq!(xf.source_texel(0, 1, target, source), None);
        assert_eq!(xf.source_texel(3, 1, target, source), None);
    }

    #[test]
    fn mirror_flips_horizontally() {
        let target = Extent::new(2, 1);
        let source = Extent::new(2, 1);
        let xf = DisplayTransform::fit(source, Orientation::IDENTITY.mirrored(), target);
        assert_eq!(xf.source_texel(0, 0, target, source), Some((1, 0)));
        assert_eq!(xf.source_texel(1, 0, target, source), Some((0, 0)));
    }
}
