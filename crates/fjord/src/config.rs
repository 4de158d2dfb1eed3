//! Renderer configuration.
//!
//! [`RendererConfig`] gathers the constants that shape a frame: projection,
//! sky and fog, display size, offscreen target sizes, and pacing. Every field
//! has a default, so a JSON file only needs the keys it overrides:
//!
//! ```json
//! { "fov": 60.0, "fps_cap": 144, "post_processing": true }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FjordError, Result};

/// Tunables for the compositor and its passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near_plane: f32,
    pub far_plane: f32,
    /// Clear colour and fog colour (linear RGB).
    pub sky_colour: [f32; 3],
    pub fog_density: f32,
    pub fog_gradient: f32,
    pub display_width: u32,
    pub display_height: u32,
    /// Frame-rate cap enforced by the runner. 0 hands pacing to vsync.
    pub fps_cap: u32,
    pub reflection_size: [u32; 2],
    pub refraction_size: [u32; 2],
    /// Water ripple phase advance per second.
    pub wave_speed: f32,
    /// Render the main pass offscreen and composite through the contrast program.
    pub post_processing: bool,
    pub contrast: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            fov: 70.0,
            near_plane: 0.1,
            far_plane: 1000.0,
            sky_colour: [0.0, 0.0, 0.2],
            fog_density: 0.0035,
            fog_gradient: 5.0,
            display_width: 1280,
            display_height: 720,
            fps_cap: 2000,
            reflection_size: [320, 180],
            refraction_size: [1280, 720],
            wave_speed: 0.03,
            post_processing: false,
            contrast: 0.3,
        }
    }
}

impl RendererConfig {
    /// Read a config from a JSON file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| FjordError::Asset {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| FjordError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        log::info!("Loaded renderer config from '{}'", path.display());
        Ok(config)
    }

    /// Reject values that would produce a broken frustum or zero-sized target.
    pub fn validate(&self) -> Result<()> {
        if !(self.fov > 0.0 && self.fov < 180.0) {
            return Err(FjordError::Config(format!("fov must be in (0, 180), got {}", self.fov)));
        }
        if !(self.near_plane > 0.0) || self.far_plane <= self.near_plane {
            return Err(FjordError::Config(format!(
                "need 0 < near < far, got near={} far={}",
                self.near_plane, self.far_plane
            )));
        }
        if self.display_width == 0 || self.display_height == 0 {
            return Err(FjordError::Config("display size must be non-zero".into()));
        }
        for (name, [w, h]) in [
            ("reflection_size", self.reflection_size),
            ("refraction_size", self.refraction_size),
        ] {
            if w == 0 || h == 0 {
                return Err(FjordError::Config(format!("{name} must be non-zero")));
            }
        }
        if self.fog_density < 0.0 {
            return Err(FjordError::Config("fog_density must not be negative".into()));
        }
        Ok(())
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.display_width as f32 / self.display_height as f32
    }

    /// Present with vsync. Only when there is no cap for the limiter to enforce.
    pub fn vsync(&self) -> bool {
        self.fps_cap == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::FrameLimiter;

    #[test]
    fn defaults_are_valid() {
        RendererConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: RendererConfig = serde_json::from_str(r#"{ "fov": 60.0 }"#).unwrap();
        assert_eq!(config.fov, 60.0);
        assert_eq!(config.reflection_size, [320, 180]);
        assert_eq!(config.far_plane, 1000.0);
    }

    #[test]
    fn far_before_near_is_rejected() {
        let config = RendererConfig {
            near_plane: 10.0,
            far_plane: 5.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FjordError::Config(_))));
    }

    #[test]
    fn only_an_uncapped_config_uses_vsync() {
        let uncapped = RendererConfig {
            fps_cap: 0,
            ..Default::default()
        };
        assert!(uncapped.vsync());
        assert!(FrameLimiter::new(uncapped.fps_cap).target_frame_time().is_none());

        let capped = RendererConfig::default();
        assert!(!capped.vsync());
        assert!(FrameLimiter::new(capped.fps_cap).target_frame_time().is_some());
    }

    #[test]
    fn zero_sized_target_is_rejected() {
        let config = RendererConfig {
            reflection_size: [0, 180],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
