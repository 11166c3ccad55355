use std::fmt;

use anyhow::{anyhow, ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::math::Vector3D;

/// Identity assigned to a render object when it is added to the renderer.
///
/// Handles grow monotonically and are never reused, so ordering by handle is
/// insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectHandle(u64);

impl ObjectHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Largest texture edge accepted, the default wgpu 2D texture limit.
pub const MAX_TEXTURE_DIMENSION: u32 = 8192;

/// Decoded RGBA8 image data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TextureImage {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let image = Self {
            width,
            height,
            pixels,
        };
        image.validate()?;
        Ok(image)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major RGBA8 bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn validate(&self) -> Result<()> {
        let (width, height) = (self.width, self.height);
        ensure!(width > 0 && height > 0, "texture has zero area");
        ensure!(
            width <= MAX_TEXTURE_DIMENSION && height <= MAX_TEXTURE_DIMENSION,
            "texture is {width}x{height}, larger than {MAX_TEXTURE_DIMENSION} per side"
        );
        let expected = width as usize * height as usize * 4;
        ensure!(
            self.pixels.len() == expected,
            "texture expects {expected} RGBA bytes, got {}",
            self.pixels.len()
        );
        Ok(())
    }

    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: rgba.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    Diffuse,
    Specular,
    Normal,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; 3] = [Self::Diffuse, Self::Specular, Self::Normal];

    pub fn label(self) -> &'static str {
        match self {
            Self::Diffuse => "diffuse",
            Self::Specular => "specular",
            Self::Normal => "normal",
        }
    }
}

/// Textures bound to a render object, all optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Textures {
    pub diffuse: Option<TextureImage>,
    pub specular: Option<TextureImage>,
    pub normal: Option<TextureImage>,
}

impl Textures {
    pub fn get(&self, slot: TextureSlot) -> Option<&TextureImage> {
        match slot {
            TextureSlot::Diffuse => self.diffuse.as_ref(),
            TextureSlot::Specular => self.specular.as_ref(),
            TextureSlot::Normal => self.normal.as_ref(),
        }
    }

    fn slot_mut(&mut self, slot: TextureSlot) -> &mut Option<TextureImage> {
        match slot {
            TextureSlot::Diffuse => &mut self.diffuse,
            TextureSlot::Specular => &mut self.specular,
            TextureSlot::Normal => &mut self.normal,
        }
    }

    pub fn count(&self) -> usize {
        TextureSlot::ALL
            .iter()
            .filter(|slot| self.get(**slot).is_some())
            .count()
    }
}

/// Surface coefficients read from an MTL material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub ambient: [f32; 3],
    pub diffuse: [f32; 3],
    pub specular: [f32; 3],
    pub shininess: f32,
    pub opacity: f32,
    #[serde(default)]
    pub diffuse_map: Option<String>,
    #[serde(default)]
    pub specular_map: Option<String>,
    #[serde(default)]
    pub normal_map: Option<String>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            ambient: [1.0, 1.0, 1.0],
            diffuse: [1.0, 1.0, 1.0],
            specular: [0.5, 0.5, 0.5],
            shininess: 32.0,
            opacity: 1.0,
            diffuse_map: None,
            specular_map: None,
            normal_map: None,
        }
    }
}

/// Flat vertex streams ready for upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl Geometry {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Checks that every stream lines up with the positions and that all
    /// indices are in range.
    pub fn validate(&self) -> Result<()> {
        let count = self.positions.len();
        ensure!(count > 0, "geometry has no vertices");
        ensure!(
            self.normals.len() == count,
            "geometry has {count} positions but {} normals",
            self.normals.len()
        );
        ensure!(
            self.uvs.len() == count,
            "geometry has {count} positions but {} texture coordinates",
            self.uvs.len()
        );
        ensure!(
            self.indices.len() % 3 == 0,
            "index count {} is not a multiple of 3",
            self.indices.len()
        );
        if let Some(bad) = self.indices.iter().find(|i| **i as usize >= count) {
            return Err(anyhow!("index {bad} out of range for {count} vertices"));
        }
        Ok(())
    }
}

/// Geometry, material and textures drawn as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderObject {
    pub geometry: Geometry,
    pub material: Option<Material>,
    pub textures: Textures,
}

impl RenderObject {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            material: None,
            textures: Textures::default(),
        }
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = Some(material);
        self
    }

    /// Replaces the texture in `slot`. The renderer sees the change after the
    /// object is refreshed.
    pub fn set_texture(&mut self, slot: TextureSlot, image: Option<TextureImage>) {
        *self.textures.slot_mut(slot) = image;
    }

    /// Moves every vertex by `offset`. The renderer sees the change after the
    /// object is refreshed.
    pub fn translate(&mut self, offset: Vector3D) {
        for position in &mut self.geometry.positions {
            position[0] += offset.x;
            position[1] += offset.y;
            position[2] += offset.z;
        }
    }

    /// Mean of the vertex positions, or the origin for empty geometry.
    pub fn centroid(&self) -> Vector3D {
        let positions = &self.geometry.positions;
        if positions.is_empty() {
            return Vector3D::ZERO;
        }
        let sum = positions
            .iter()
            .fold(Vector3D::ZERO, |acc, p| acc.add(Vector3D::from(*p)));
        sum.scale(1.0 / positions.len() as f32)
    }

    /// Checks the geometry streams and every bound texture.
    pub fn validate(&self) -> Result<()> {
        self.geometry.validate()?;
        for slot in TextureSlot::ALL {
            if let Some(image) = self.textures.get(slot) {
                image
                    .validate()
                    .with_context(|| format!("invalid {} texture", slot.label()))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn triangle() -> RenderObject {
        RenderObject::new(Geometry {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            uvs: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
            indices: vec![0, 1, 2],
        })
    }

    #[test]
    fn translate_moves_all_vertices() {
        let mut object = triangle();
        object.translate(Vector3D::new(1.0, -1.0, 2.0));
        assert_eq!(object.geometry.positions[0], [1.0, -1.0, 2.0]);
        assert_eq!(object.geometry.positions[2], [1.0, 0.0, 2.0]);
    }

    #[test]
    fn validate_catches_out_of_range_indices() {
        let mut object = triangle();
        assert!(object.geometry.validate().is_ok());
        object.geometry.indices = vec![0, 1, 3];
        assert!(object.geometry.validate().is_err());
    }

    #[test]
    fn validate_catches_mismatched_streams() {
        let mut object = triangle();
        object.geometry.uvs.pop();
        assert!(object.geometry.validate().is_err());
    }

    /// Image whose pixel buffer does not match its dimensions.
    pub(crate) fn malformed_texture() -> TextureImage {
        TextureImage {
            width: 64,
            height: 64,
            pixels: vec![0; 4],
        }
    }

    #[test]
    fn texture_slots_are_independent() {
        let mut object = triangle();
        object.set_texture(TextureSlot::Normal, Some(TextureImage::solid([128, 128, 255, 255])));
        assert_eq!(object.textures.count(), 1);
        assert!(object.textures.diffuse.is_none());
        object.set_texture(TextureSlot::Diffuse, Some(TextureImage::solid([255; 4])));
        object.set_texture(TextureSlot::Normal, None);
        assert_eq!(object.textures.count(), 1);
        assert!(object.textures.diffuse.is_some());
    }

    #[test]
    fn texture_image_checks_pixel_count() {
        assert!(TextureImage::new(2, 2, vec![0; 16]).is_ok());
        assert!(TextureImage::new(2, 2, vec![0; 15]).is_err());
        assert!(TextureImage::new(0, 2, vec![]).is_err());
        let side = MAX_TEXTURE_DIMENSION + 1;
        assert!(TextureImage::new(side, 1, vec![0; side as usize * 4]).is_err());
    }

    #[test]
    fn object_validation_covers_textures() {
        let mut object = triangle();
        object.set_texture(TextureSlot::Specular, Some(TextureImage::solid([9; 4])));
        assert!(object.validate().is_ok());
        object.set_texture(TextureSlot::Diffuse, Some(malformed_texture()));
        let err = object.validate().unwrap_err();
        assert!(format!("{err:#}").contains("invalid diffuse texture"), "{err:#}");
    }

    #[test]
    fn centroid_averages_positions() {
        let object = triangle();
        let c = object.centroid();
        assert!(c.approx_eq(Vector3D::new(1.0 / 3.0, 1.0 / 3.0, 0.0), 1e-6));
    }
}
