//! Frame source adapter: hardware-buffer seam, synchronous import and colourspace conversion.

pub mod buffer;
pub mod import;
pub mod yuv;
