//! Asset loading seam and decoded asset types.

pub mod lut;
pub mod source;
