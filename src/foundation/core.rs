use crate::foundation::error::{CamflowError, CamflowResult};

pub use kurbo::{Affine, Point};

/// Width/height pair in pixels.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Build an extent from signed platform dimensions (window callbacks hand out `i32`).
    pub fn from_signed(width: i32, height: i32) -> CamflowResult<Self> {
        let w = u32::try_from(width)
            .map_err(|_| CamflowError::validation(format!("negative width {width}")))?;
        let h = u32::try_from(height)
            .map_err(|_| CamflowError::validation(format!("negative height {height}")))?;
        Ok(Self::new(w, h))
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_count(self) -> usize {
        (self.width as usize).saturating_mul(self.height as usize)
    }

    /// Width over height. Empty extents report `1.0` so callers never divide by zero.
    pub fn aspect(self) -> f64 {
        if self.is_empty() {
            return 1.0;
        }
        self.width as f64 / self.height as f64
    }

    pub fn transposed(self) -> Self {
        Self::new(self.height, self.width)
    }
}

impl std::fmt::Display for Extent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Clockwise rotation applied to a camera frame before display.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: i32) -> CamflowResult<Self> {
        match degrees.rem_euclid(360) {
            0 => Ok(Self::Deg0),
            90 => Ok(Self::Deg90),
            180 => Ok(Self::Deg180),
            270 => Ok(Self::Deg270),
            _ => Err(CamflowError::validation(format!(
                "orientation must be a multiple of 90 degrees, got {degrees}"
            ))),
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Quarter turns swap the displayed width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

/// Orientation metadata that travels with every submitted frame.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Orientation {
    pub rotation: Rotation,
    /// Mirror horizontally before rotating (front-facing sensors).
    pub mirrored: bool,
}

impl Orientation {
    pub const IDENTITY: Self = Self {
        rotation: Rotation::Deg0,
        mirrored: false,
    };
    pub const ROTATE_90: Self = Self {
        rotation: Rotation::Deg90,
        mirrored: false,
    };
    pub const ROTATE_180: Self = Self {
        rotation: Rotation::Deg180,
        mirrored: false,
    };
    pub const ROTATE_270: Self = Self {
        rotation: Rotation::Deg270,
        mirrored: false,
    };

    pub fn from_degrees(degrees: i32) -> CamflowResult<Self> {
        Ok(Self {
            rotation: Rotation::from_degrees(degrees)?,
            mirrored: false,
        })
    }

    pub fn mirrored(self) -> Self {
        Self {
            mirrored: true,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_accepts_quarter_turns_and_wraps() {
        assert_eq!(Rotation::from_degrees(0).unwrap(), Rotation::Deg0);
        assert_eq!(Rotation::from_degrees(270).unwrap(), Rotation::Deg270);
        assert_eq!(Rotation::from_degrees(450).unwrap(), Rotation::Deg90);
        assert_eq!(Rotation::from_degrees(-90).unwrap(), Rotation::Deg270);
        assert!(Rotation::from_degrees(45).is_err());
    }

    #[test]
    fn extent_rejects_negative_dimensions() {
        assert_eq!(Extent::from_signed(4, 2).unwrap(), Extent::new(4, 2));
        assert!(Extent::from_signed(-1, 2).is_err());
        assert!(Extent::from_signed(1, -2).is_err());
    }

    #[test]
    fn empty_extent_has_unit_aspect() {
        assert!(Extent::new(0, 10).is_empty());
        assert_eq!(Extent::new(0, 10).aspect(), 1.0);
        assert_eq!(Extent::new(20, 10).aspect(), 2.0);
    }
}
