//! Phong light and ambient material state.
//!
//! Channels are stored as raw arrays; every getter hands back a freshly built
//! [`Vector3D`] so callers never alias the stored state.

use log::error;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::math::Vector3D;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct AmbientLight {
    color: [f32; 3],
    strength: f32,
}

/// Point light with an ambient term and the ambient reflectivity (`Ka`)
/// applied to every material.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Light {
    position: [f32; 3],
    color: [f32; 3],
    ambient: AmbientLight,
    ambient_reflectivity: [f32; 3],
}

impl Default for Light {
    fn default() -> Self {
        Self {
            position: [1.0, 1.0, 2.0],
            color: [1.0, 1.0, 1.0],
            ambient: AmbientLight {
                color: [1.0, 1.0, 1.0],
                strength: 0.1,
            },
            ambient_reflectivity: [0.1, 0.1, 0.1],
        }
    }
}

impl Light {
    pub fn position(&self) -> Vector3D {
        Vector3D::from(self.position)
    }

    pub fn color(&self) -> Vector3D {
        Vector3D::from(self.color)
    }

    pub fn ambient_color(&self) -> Vector3D {
        Vector3D::from(self.ambient.color)
    }

    pub fn ambient_strength(&self) -> f32 {
        self.ambient.strength
    }

    pub fn ambient_reflectivity(&self) -> Vector3D {
        Vector3D::from(self.ambient_reflectivity)
    }

    pub fn set_position(&mut self, position: Vector3D) -> Result<()> {
        if !position.is_finite() {
            return Err(reject("position", format!("{position} is not finite")));
        }
        self.position = position.to_array();
        Ok(())
    }

    pub fn set_color(&mut self, color: Vector3D) -> Result<()> {
        self.color = unit_channels("color", color)?;
        Ok(())
    }

    pub fn set_ambient_color(&mut self, color: Vector3D) -> Result<()> {
        self.ambient.color = unit_channels("ambient color", color)?;
        Ok(())
    }

    pub fn set_ambient_strength(&mut self, strength: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&strength) {
            return Err(reject(
                "ambient strength",
                format!("{strength} is outside [0, 1]"),
            ));
        }
        self.ambient.strength = strength;
        Ok(())
    }

    pub fn set_ambient_reflectivity(&mut self, ka: Vector3D) -> Result<()> {
        self.ambient_reflectivity = unit_channels("ambient reflectivity", ka)?;
        Ok(())
    }
}

fn unit_channels(name: &'static str, value: Vector3D) -> Result<[f32; 3]> {
    let channels = value.to_array();
    if channels.iter().all(|c| (0.0..=1.0).contains(c)) {
        Ok(channels)
    } else {
        Err(reject(name, format!("{value} has channels outside [0, 1]")))
    }
}

fn reject(name: &'static str, reason: String) -> EngineError {
    error!("rejected light {name}: {reason}");
    EngineError::InvalidLightParameter { name, reason }
}
