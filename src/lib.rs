#![forbid(unsafe_code)]

pub mod assets;
pub mod boundary;
pub mod engine;
pub mod foundation;
pub mod frame;
pub mod present;
pub mod render;
pub mod stage;

pub use assets::lut::Lut3d;
pub use assets::source::{AssetSource, DirAssets, MemoryAssets};
pub use engine::{Engine, EngineOpts, EngineStats, FrameReport};
pub use foundation::core::{Extent, Orientation, Rotation};
pub use foundation::error::{CamflowError, CamflowResult};
pub use frame::buffer::{BufferDesc, BufferFormat, CpuBuffer, HardwareBuffer};
pub use frame::yuv::PlanarFrame;
pub use present::{InMemorySurface, Surface, SurfaceError};
pub use render::{BackendKind, FrameRGBA, RenderBackend, RenderSettings, ResourceLedger};
pub use stage::EngineMode;
