//! Processing stage selection.
//!
//! The engine runs exactly one [`EngineMode`] per frame. Modes form a closed set and are
//! dispatched with `match`; the ordinals are part of the boundary contract.

pub mod transform;

use crate::assets::lut::Lut3d;
use crate::foundation::error::{CamflowError, CamflowResult};

/// Processing stage executed for every rendered frame.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    /// Present the camera buffer as-is (after orientation and fit).
    #[default]
    CameraBufferPassthrough,
    /// Convert the camera buffer to NV21 planes; the frame is presented unmodified.
    BufferToPlanarYuv,
    /// Colour-grade through the 3D lookup table loaded at creation.
    LookupTableGrade,
}

impl EngineMode {
    pub const ALL: [EngineMode; 3] = [
        EngineMode::CameraBufferPassthrough,
        EngineMode::BufferToPlanarYuv,
        EngineMode::LookupTableGrade,
    ];

    pub fn from_ordinal(ordinal: i32) -> CamflowResult<Self> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or_else(|| CamflowError::validation(format!("unknown engine mode {ordinal}")))
    }

    pub fn ordinal(self) -> i32 {
        match self {
            Self::CameraBufferPassthrough => 0,
            Self::BufferToPlanarYuv => 1,
            Self::LookupTableGrade => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::CameraBufferPassthrough => "camera_buffer_passthrough",
            Self::BufferToPlanarYuv => "buffer_to_planar_yuv",
            Self::LookupTableGrade => "lookup_table_grade",
        }
    }

    /// Whether the stage needs the lookup table bound.
    pub fn uses_lut(self) -> bool {
        matches!(self, Self::LookupTableGrade)
    }
}

impl std::fmt::Display for EngineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-pixel stage colour transform (straight-alpha RGBA8 in and out).
pub(crate) fn shade_pixel(mode: EngineMode, px: [u8; 4], lut: Option<&Lut3d>) -> [u8; 4] {
    match (mode, lut) {
        (EngineMode::LookupTableGrade, Some(lut)) => {
            let [r, g, b] = lut.apply([px[0], px[1], px[2]]);
            [r, g, b, px[3]]
        }
        _ => px,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_roundtrip_and_reject_unknown_values() {
        for mode in EngineMode::ALL {
            assert_eq!(EngineMode::from_ordinal(mode.ordinal()).unwrap(), mode);
        }
        assert!(EngineMode::from_ordinal(3).is_err());
        assert!(EngineMode::from_ordinal(-1).is_err());
    }

    #[test]
    fn serde_names_are_snake_case() {
        let s = serde_json::to_string(&EngineMode::LookupTableGrade).unwrap();
        assert_eq!(s, "\"lookup_table_grade\"");
        let m: EngineMode = serde_json::from_str("\"buffer_to_planar_yuv\"").unwrap();
        assert_eq!(m, EngineMode::BufferToPlanarYuv);
    }

    #[test]
    fn only_grading_touches_pixels() {
        let lut = Lut3d::from_fn(4, |[r, g, b]| [b, g, r]).unwrap();
        let px = [255, 0, 0, 200];
        assert_eq!(
            shade_pixel(EngineMode::CameraBufferPassthrough, px, Some(&lut)),
            px
        );
        assert_eq!(shade_pixel(EngineMode::BufferToPlanarYuv, px, Some(&lut)), px);
        assert_eq!(
            shade_pixel(EngineMode::LookupTableGrade, px, Some(&lut)),
            [0, 0, 255, 200]
        );
    }
}
