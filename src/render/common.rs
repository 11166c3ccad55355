use bytemuck::{Pod, Zeroable};

use crate::light::Light;
use crate::math::{TransformationMatrix, Vector3D};
use crate::object::{Material, RenderObject};

/// Per-frame values handed from the engine to the renderer.
#[derive(Debug, Clone)]
pub struct RenderParams {
    pub projection_matrix: TransformationMatrix,
    pub view_matrix: TransformationMatrix,
    pub model_view_matrix: TransformationMatrix,
    pub normal_matrix: TransformationMatrix,
    pub camera_position: Vector3D,
    pub light: Light,
    pub background_color: [f32; 4],
    pub objects_color: [f32; 3],
}

/// Where an object's base colour comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSource {
    /// Material diffuse colour modulated by the diffuse texture.
    DiffuseMap,
    /// Material diffuse colour only.
    Material,
    /// The engine-wide objects colour.
    Flat,
}

impl ColorSource {
    pub fn of(object: &RenderObject) -> Self {
        if object.textures.diffuse.is_some() {
            Self::DiffuseMap
        } else if object.material.is_some() {
            Self::Material
        } else {
            Self::Flat
        }
    }
}

/// Frame uniform block. Lighting runs in view space, so the light position
/// is pre-multiplied by the view matrix and the eye sits at the origin.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GlobalUniform {
    pub projection: [[f32; 4]; 4],
    pub model_view: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    pub light_position: [f32; 4],
    pub light_color: [f32; 4],
    pub ambient: [f32; 4],
    pub ambient_reflectivity: [f32; 4],
    pub objects_color: [f32; 4],
}

impl GlobalUniform {
    pub fn from_params(params: &RenderParams) -> Self {
        let light = &params.light;
        let light_in_view = params.view_matrix.transform(light.position());
        Self {
            projection: params.projection_matrix.to_cols_array_2d(),
            model_view: params.model_view_matrix.to_cols_array_2d(),
            normal: params.normal_matrix.to_cols_array_2d(),
            camera_position: extend(params.camera_position, 1.0),
            light_position: extend(light_in_view, 1.0),
            light_color: extend(light.color(), 1.0),
            ambient: extend(light.ambient_color(), light.ambient_strength()),
            ambient_reflectivity: extend(light.ambient_reflectivity(), 0.0),
            objects_color: [
                params.objects_color[0],
                params.objects_color[1],
                params.objects_color[2],
                1.0,
            ],
        }
    }
}

/// Per-object material block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialUniform {
    /// rgb diffuse, a opacity
    pub diffuse: [f32; 4],
    /// rgb specular, w shininess
    pub specular: [f32; 4],
    /// diffuse map, specular map, normal map, flat colour
    pub flags: [u32; 4],
}

impl MaterialUniform {
    pub fn from_object(object: &RenderObject) -> Self {
        let fallback = Material::default();
        let material = object.material.as_ref().unwrap_or(&fallback);
        let textures = &object.textures;
        Self {
            diffuse: [
                material.diffuse[0],
                material.diffuse[1],
                material.diffuse[2],
                material.opacity.clamp(0.0, 1.0),
            ],
            specular: [
                material.specular[0],
                material.specular[1],
                material.specular[2],
                material.shininess,
            ],
            flags: [
                textures.diffuse.is_some() as u32,
                textures.specular.is_some() as u32,
                textures.normal.is_some() as u32,
                (ColorSource::of(object) == ColorSource::Flat) as u32,
            ],
        }
    }
}

fn extend(v: Vector3D, w: f32) -> [f32; 4] {
    [v.x, v.y, v.z, w]
}

/// Interleaves position, normal and uv into one vertex stream.
pub fn interleave_vertices(object: &RenderObject) -> Vec<f32> {
    let geometry = &object.geometry;
    let mut out = Vec::with_capacity(geometry.positions.len() * FLOATS_PER_VERTEX);
    for ((position, normal), uv) in geometry
        .positions
        .iter()
        .zip(&geometry.normals)
        .zip(&geometry.uvs)
    {
        out.extend_from_slice(position);
        out.extend_from_slice(normal);
        out.extend_from_slice(uv);
    }
    out
}

pub const FLOATS_PER_VERTEX: usize = 8;
