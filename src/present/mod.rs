//! Presentation: the bound surface, its swapchain and the per-frame present step.

pub mod surface;
pub(crate) mod swapchain;
pub(crate) mod target;

pub use surface::{InMemorySurface, Surface, SurfaceError};
