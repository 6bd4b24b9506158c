use std::time::Duration;

use crate::foundation::error::{CamflowError, CamflowResult};
use crate::render::{BackendKind, RenderSettings};

pub const DEFAULT_LUT_ASSET: &str = "luts/default.png";

/// Engine creation options.
///
/// Every field has a default, so `{}` is a valid JSON configuration.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineOpts {
    pub backend: BackendKind,
    pub render: RenderSettings,
    /// Asset path of the grading table, loaded at creation.
    pub lut_asset: String,
    /// Colour of target pixels the source does not cover.
    pub clear_rgba: [u8; 4],
    pub swapchain_images: u32,
    /// Pause between loop iterations; `0` renders back-to-back.
    pub frame_interval_ms: u64,
    /// Commands the render worker may have queued before callers block.
    pub command_capacity: usize,
}

impl Default for EngineOpts {
    fn default() -> Self {
        Self {
            backend: BackendKind::Cpu,
            render: RenderSettings::default(),
            lut_asset: DEFAULT_LUT_ASSET.to_owned(),
            clear_rgba: [0, 0, 51, 255],
            swapchain_images: 3,
            frame_interval_ms: 16,
            command_capacity: 16,
        }
    }
}

impl EngineOpts {
    pub fn from_reader(reader: impl std::io::Read) -> CamflowResult<Self> {
        let opts: Self = serde_json::from_reader(reader)
            .map_err(|e| CamflowError::validation(format!("engine options: {e}")))?;
        opts.validate()?;
        Ok(opts)
    }

    pub fn from_json_str(s: &str) -> CamflowResult<Self> {
        Self::from_reader(s.as_bytes())
    }

    pub fn validate(&self) -> CamflowResult<()> {
        if self.lut_asset.trim().is_empty() {
            return Err(CamflowError::validation("lut_asset must not be empty"));
        }
        if !(1..=8).contains(&self.swapchain_images) {
            return Err(CamflowError::validation(format!(
                "swapchain_images must be in 1..=8, got {}",
                self.swapchain_images
            )));
        }
        if self.command_capacity == 0 {
            return Err(CamflowError::validation("command_capacity must be >= 1"));
        }
        if self.render.threads == Some(0) {
            return Err(CamflowError::validation(
                "render.threads must be >= 1 when set",
            ));
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let opts = EngineOpts::from_json_str("{}").unwrap();
        assert_eq!(opts, EngineOpts::default());
        assert_eq!(opts.clear_rgba, [0, 0, 51, 255]);
        assert_eq!(opts.frame_interval(), Duration::from_millis(16));
    }

    #[test]
    fn partial_json_overrides_fields() {
        let opts = EngineOpts::from_json_str(
            r#"{ "swapchain_images": 2, "frame_interval_ms": 0, "render": { "threads": 4 } }"#,
        )
        .unwrap();
        assert_eq!(opts.swapchain_images, 2);
        assert_eq!(opts.frame_interval_ms, 0);
        assert_eq!(opts.render.threads, Some(4));
        assert_eq!(opts.lut_asset, DEFAULT_LUT_ASSET);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(EngineOpts::from_json_str(r#"{ "swapchain_images": 0 }"#).is_err());
        assert!(EngineOpts::from_json_str(r#"{ "lut_asset": " " }"#).is_err());
        assert!(EngineOpts::from_json_str(r#"{ "render": { "threads": 0 } }"#).is_err());
        assert!(EngineOpts::from_json_str(r#"{ "command_capacity": 0 }"#).is_err());
        assert!(EngineOpts::from_json_str(r#"{ "unknown": 1 }"#).is_err());
    }
}
