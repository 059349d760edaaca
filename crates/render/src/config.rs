use crate::camera::{LOOK_SENSITIVITY, MOVE_SPEED, OrientationCamera, Projection};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Ground grid shading parameters, written once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    pub half_extent: f32,
    pub uv_repeat: f32,
    pub cell_size: f32,
    pub line_width: f32,
    pub fade_distance: f32,
    pub grid_color: [f32; 3],
    pub bg_color: [f32; 3],
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            half_extent: 5000.0,
            uv_repeat: 100.0,
            cell_size: 1.0,
            line_width: 0.01,
            fade_distance: 500.0,
            grid_color: [0.15; 3],
            bg_color: [0.8; 3],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightMarkerSettings {
    pub radius: f32,
    pub stacks: u32,
    pub sectors: u32,
    pub color: [f32; 3],
}

impl Default for LightMarkerSettings {
    fn default() -> Self {
        Self {
            radius: 0.5,
            stacks: 12,
            sectors: 12,
            color: [1.0, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Clear color of the offscreen target.
    pub clear_color: [f32; 4],
    pub grid: GridSettings,
    pub light_marker: LightMarkerSettings,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            fov_y_degrees: 45.0,
            near: 0.1,
            far: 20000.0,
            clear_color: [1.0; 4],
            grid: GridSettings::default(),
            light_marker: LightMarkerSettings::default(),
        }
    }
}

impl RenderConfig {
    pub fn projection(&self) -> Projection {
        Projection::new(self.fov_y_degrees, self.width, self.height, self.near, self.far)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub speed: f32,
    pub sensitivity: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [1.0, 1.0, 3.0],
            target: [0.0; 3],
            speed: MOVE_SPEED,
            sensitivity: LOOK_SENSITIVITY,
        }
    }
}

impl CameraConfig {
    pub fn build(&self) -> OrientationCamera {
        let mut camera =
            OrientationCamera::looking_at(Vec3::from(self.position), Vec3::from(self.target));
        camera.speed = self.speed;
        camera.sensitivity = self.sensitivity;
        camera
    }
}

/// Everything the viewer reads at startup. Every field has a default, so a
/// config file only needs the values it changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub render: RenderConfig,
    pub camera: CameraConfig,
}

impl ViewerConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.render;
        if r.width == 0 || r.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "viewport must be non-empty, got {}x{}",
                r.width, r.height
            )));
        }
        if !(r.fov_y_degrees > 0.0 && r.fov_y_degrees < 180.0) {
            return Err(ConfigError::Invalid(format!(
                "fov_y_degrees must be in (0, 180), got {}",
                r.fov_y_degrees
            )));
        }
        if !(r.near > 0.0 && r.far > r.near) {
            return Err(ConfigError::Invalid(format!(
                "clip planes need 0 < near < far, got near={} far={}",
                r.near, r.far
            )));
        }
        if self.camera.speed < 0.0 {
            return Err(ConfigError::Invalid("camera speed must not be negative".into()));
        }
        Ok(())
    }
}
