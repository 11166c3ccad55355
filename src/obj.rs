use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3};
use log::{debug, warn};

use crate::error::EngineError;
use crate::object::{Geometry, Material, RenderObject, TextureImage, TextureSlot};

/// Builds a [`RenderObject`] from OBJ text, optional MTL text and a set of
/// already decoded textures keyed by file name.
#[derive(Debug, Clone, Default)]
pub struct ObjectReader<'a> {
    obj: &'a str,
    mtl: Option<&'a str>,
    textures: HashMap<String, TextureImage>,
}

impl<'a> ObjectReader<'a> {
    pub fn new(obj: &'a str) -> Self {
        Self {
            obj,
            mtl: None,
            textures: HashMap::new(),
        }
    }

    pub fn with_materials(mut self, mtl: &'a str) -> Self {
        self.mtl = Some(mtl);
        self
    }

    pub fn with_textures(mut self, textures: HashMap<String, TextureImage>) -> Self {
        self.textures = textures;
        self
    }

    /// Parses the inputs. Any failure is reported as [`EngineError::Parse`].
    pub fn read(self) -> Result<RenderObject, EngineError> {
        self.read_inner()
            .map_err(|err| EngineError::Parse(format!("{err:#}")))
    }

    fn read_inner(self) -> Result<RenderObject> {
        let parsed = parse_obj(self.obj)?;
        let materials = match self.mtl {
            Some(mtl) => parse_mtl(mtl).context("invalid material file")?,
            None => Vec::new(),
        };

        let material = match parsed.material.as_deref() {
            Some(name) => {
                let found = materials.iter().find(|m| m.name == name).cloned();
                if found.is_none() {
                    warn!("material {name} is not defined by the material file");
                }
                found
            }
            None => materials.first().cloned(),
        };

        let mut object = RenderObject::new(parsed.geometry);
        if let Some(material) = material {
            let maps = [
                (TextureSlot::Diffuse, material.diffuse_map.clone()),
                (TextureSlot::Specular, material.specular_map.clone()),
                (TextureSlot::Normal, material.normal_map.clone()),
            ];
            for (slot, name) in maps {
                let Some(name) = name else {
                    continue;
                };
                match self.find_texture(&name) {
                    Some(image) => object.set_texture(slot, Some(image)),
                    None => warn!("{} texture {name} was not supplied", slot.label()),
                }
            }
            object.material = Some(material);
        }
        debug!(
            "read object with {} vertices, {} triangles, {} textures",
            object.geometry.vertex_count(),
            object.geometry.triangle_count(),
            object.textures.count()
        );
        Ok(object)
    }

    /// Texture references in MTL files are often paths; match on file name.
    fn find_texture(&self, reference: &str) -> Option<TextureImage> {
        if let Some(image) = self.textures.get(reference) {
            return Some(image.clone());
        }
        let file_name = Path::new(reference).file_name()?.to_str()?;
        self.textures.get(file_name).cloned()
    }
}

struct ParsedObj {
    geometry: Geometry,
    material: Option<String>,
}

fn parse_obj(data: &str) -> Result<ParsedObj> {
    let mut positions = Vec::new();
    let mut uvs = Vec::new();
    let mut normals = Vec::new();
    let mut faces: Vec<[Key; 3]> = Vec::new();
    let mut material = None;

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        match tag {
            "v" => positions.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid vertex on line {}", line_no + 1))?,
            ),
            "vt" => uvs.push(
                parse_vec2(parts).with_context(|| {
                    format!("invalid texture coordinate on line {}", line_no + 1)
                })?,
            ),
            "vn" => normals.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid normal on line {}", line_no + 1))?,
            ),
            "f" => {
                let polygon = parse_face(parts)
                    .and_then(|polygon| resolve_face(&polygon, &positions, &uvs, &normals))
                    .with_context(|| format!("invalid face on line {}", line_no + 1))?;
                triangulate_face(&polygon, &mut faces);
            }
            "usemtl" => {
                if material.is_none() {
                    material = parts.next().map(str::to_string);
                }
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(anyhow!("OBJ file does not define any vertices"));
    }
    if faces.is_empty() {
        return Err(anyhow!("OBJ file does not define any faces"));
    }

    let mut geometry = build_geometry(&positions, &uvs, &normals, &faces);
    if needs_normals(&geometry.normals) {
        compute_normals(&mut geometry);
    }
    Ok(ParsedObj { geometry, material })
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let x = next_float(&mut parts)?;
    let y = next_float(&mut parts)?;
    let z = next_float(&mut parts)?;
    Ok(Vec3::new(x, y, z))
}

fn parse_vec2<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec2> {
    let u = next_float(&mut parts)?;
    // A lone u coordinate is legal OBJ.
    let v = parts.next().map(str::parse::<f32>).transpose()?.unwrap_or(0.0);
    Ok(Vec2::new(u, v))
}

fn next_float<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<f32> {
    Ok(parts
        .next()
        .ok_or_else(|| anyhow!("missing vector component"))?
        .parse::<f32>()?)
}

fn parse_face<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<FaceIndex>> {
    let mut indices = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let v = segments
            .next()
            .ok_or_else(|| anyhow!("missing vertex index"))?
            .parse::<i32>()?;
        let vt = parse_optional_index(segments.next())?;
        let vn = parse_optional_index(segments.next())?;
        indices.push(FaceIndex { v, vt, vn });
    }
    if indices.len() < 3 {
        return Err(anyhow!("faces must reference at least 3 vertices"));
    }
    Ok(indices)
}

fn parse_optional_index(segment: Option<&str>) -> Result<i32> {
    match segment {
        Some(s) if !s.is_empty() => Ok(s.parse::<i32>()?),
        _ => Ok(0),
    }
}

/// Turns OBJ indices into zero-based ones. Negative indices count back from
/// the elements declared so far.
fn resolve_face(
    polygon: &[FaceIndex],
    positions: &[Vec3],
    uvs: &[Vec2],
    normals: &[Vec3],
) -> Result<Vec<Key>> {
    polygon
        .iter()
        .map(|idx| {
            let position = fix_index(idx.v, positions.len())
                .ok_or_else(|| anyhow!("vertex index {} out of range", idx.v))?;
            let uv = optional_index(idx.vt, uvs.len(), "texture coordinate")?;
            let normal = optional_index(idx.vn, normals.len(), "normal")?;
            Ok(Key {
                position,
                uv,
                normal,
            })
        })
        .collect()
}

fn optional_index(index: i32, len: usize, what: &str) -> Result<Option<usize>> {
    if index == 0 {
        return Ok(None);
    }
    fix_index(index, len)
        .map(Some)
        .ok_or_else(|| anyhow!("{what} index {index} out of range"))
}

fn triangulate_face(polygon: &[Key], faces: &mut Vec<[Key; 3]>) {
    for i in 1..polygon.len().saturating_sub(1) {
        faces.push([polygon[0], polygon[i], polygon[i + 1]]);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
    position: usize,
    uv: Option<usize>,
    normal: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct FaceIndex {
    v: i32,
    vt: i32,
    vn: i32,
}

fn build_geometry(
    positions: &[Vec3],
    uvs: &[Vec2],
    normals: &[Vec3],
    faces: &[[Key; 3]],
) -> Geometry {
    let mut lookup: HashMap<Key, u32> = HashMap::new();
    let mut geometry = Geometry::default();

    for key in faces.iter().flatten() {
        let next_index = geometry.positions.len() as u32;
        let entry = lookup.entry(*key).or_insert_with(|| {
            geometry.positions.push(positions[key.position].to_array());
            let uv = key.uv.map(|i| uvs[i]).unwrap_or(Vec2::ZERO);
            geometry.uvs.push(uv.to_array());
            let normal = key.normal.map(|i| normals[i]).unwrap_or(Vec3::ZERO);
            geometry.normals.push(normal.to_array());
            next_index
        });
        geometry.indices.push(*entry);
    }

    geometry
}

fn fix_index(index: i32, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let abs = index.unsigned_abs() as usize;
        (abs <= len).then_some(len - abs)
    } else {
        None
    }
}

fn needs_normals(normals: &[[f32; 3]]) -> bool {
    normals.iter().any(|n| *n == [0.0, 0.0, 0.0])
}

fn compute_normals(geometry: &mut Geometry) {
    let mut accum = vec![Vec3::ZERO; geometry.positions.len()];

    for triangle in geometry.indices.chunks_exact(3) {
        let [i0, i1, i2] = [
            triangle[0] as usize,
            triangle[1] as usize,
            triangle[2] as usize,
        ];
        let p0 = Vec3::from_array(geometry.positions[i0]);
        let p1 = Vec3::from_array(geometry.positions[i1]);
        let p2 = Vec3::from_array(geometry.positions[i2]);
        let normal = (p1 - p0).cross(p2 - p0);
        if normal.length_squared() > f32::EPSILON {
            let normal = normal.normalize();
            accum[i0] += normal;
            accum[i1] += normal;
            accum[i2] += normal;
        }
    }

    for (slot, normal) in geometry.normals.iter_mut().zip(accum) {
        if *slot == [0.0, 0.0, 0.0] {
            *slot = normal.normalize_or_zero().to_array();
        }
    }
}

/// Parses every material in an MTL file.
pub fn parse_mtl(data: &str) -> Result<Vec<Material>> {
    let mut materials: Vec<Material> = Vec::new();

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        if tag == "newmtl" {
            let name = parts
                .next()
                .ok_or_else(|| anyhow!("unnamed material on line {}", line_no + 1))?;
            materials.push(Material {
                name: name.to_string(),
                ..Material::default()
            });
            continue;
        }
        let Some(current) = materials.last_mut() else {
            continue;
        };
        let context = || format!("invalid {tag} on line {}", line_no + 1);
        match tag {
            "Ka" => current.ambient = parse_vec3(parts).with_context(context)?.to_array(),
            "Kd" => current.diffuse = parse_vec3(parts).with_context(context)?.to_array(),
            "Ks" => current.specular = parse_vec3(parts).with_context(context)?.to_array(),
            "Ns" => current.shininess = next_float(&mut parts).with_context(context)?,
            "d" => current.opacity = next_float(&mut parts).with_context(context)?,
            "Tr" => current.opacity = 1.0 - next_float(&mut parts).with_context(context)?,
            "map_Kd" => current.diffuse_map = map_name(parts),
            "map_Ks" => current.specular_map = map_name(parts),
            "map_Bump" | "map_bump" | "bump" | "norm" => current.normal_map = map_name(parts),
            _ => {}
        }
    }

    Ok(materials)
}

/// Map statements may carry options (`-bm 1.0 file.png`); the file is last.
fn map_name<'a>(parts: impl Iterator<Item = &'a str>) -> Option<String> {
    parts.last().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
usemtl brick
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    const MTL: &str = "
newmtl plain
Kd 0.1 0.1 0.1

newmtl brick
Ka 0.2 0.2 0.2
Kd 0.8 0.3 0.2
Ks 0.5 0.5 0.5
Ns 64
map_Kd textures/brick.png
map_Bump -bm 0.5 brick_normal.png
";

    #[test]
    fn parses_simple_triangle() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let object = ObjectReader::new(obj).read().unwrap();
        assert_eq!(object.geometry.indices, vec![0, 1, 2]);
        assert_eq!(object.geometry.vertex_count(), 3);
        assert!(object.material.is_none());
    }

    #[test]
    fn computes_missing_normals() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let object = ObjectReader::new(obj).read().unwrap();
        for normal in &object.geometry.normals {
            assert!((Vec3::from_array(*normal).length() - 1.0).abs() < 1e-5);
        }
        assert_eq!(object.geometry.normals[0], [0.0, 0.0, 1.0]);
    }

    #[test]
    fn triangulates_quads_and_keeps_uvs() {
        let object = ObjectReader::new(QUAD).read().unwrap();
        assert_eq!(object.geometry.triangle_count(), 2);
        assert_eq!(object.geometry.vertex_count(), 4);
        assert_eq!(object.geometry.uvs[2], [1.0, 1.0]);
        object.geometry.validate().unwrap();
    }

    #[test]
    fn negative_indices_count_from_the_end() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let object = ObjectReader::new(obj).read().unwrap();
        assert_eq!(object.geometry.positions[2], [0.0, 1.0, 0.0]);
    }

    #[test]
    fn negative_indices_are_relative_to_their_line() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\nv 5 5 5\n";
        let object = ObjectReader::new(obj).read().unwrap();
        assert_eq!(object.geometry.vertex_count(), 3);
        assert!(!object.geometry.positions.contains(&[5.0, 5.0, 5.0]));
    }

    #[test]
    fn out_of_range_face_names_its_line() {
        let err = ObjectReader::new("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 9\n")
            .read()
            .unwrap_err();
        assert!(err.to_string().contains("line 4"), "{err}");
        let err = ObjectReader::new("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1//2 2 3\n")
            .read()
            .unwrap_err();
        assert!(err.to_string().contains("normal index 2"), "{err}");
    }

    #[test]
    fn applies_used_material_and_textures() {
        let mut textures = HashMap::new();
        textures.insert("brick.png".to_string(), TextureImage::solid([200, 80, 60, 255]));
        textures.insert(
            "brick_normal.png".to_string(),
            TextureImage::solid([128, 128, 255, 255]),
        );
        let object = ObjectReader::new(QUAD)
            .with_materials(MTL)
            .with_textures(textures)
            .read()
            .unwrap();
        let material = object.material.as_ref().unwrap();
        assert_eq!(material.name, "brick");
        assert_eq!(material.diffuse, [0.8, 0.3, 0.2]);
        assert_eq!(material.shininess, 64.0);
        assert!(object.textures.diffuse.is_some());
        assert!(object.textures.normal.is_some());
        assert!(object.textures.specular.is_none());
    }

    #[test]
    fn missing_texture_is_not_fatal() {
        let object = ObjectReader::new(QUAD).with_materials(MTL).read().unwrap();
        assert!(object.material.is_some());
        assert_eq!(object.textures.count(), 0);
    }

    #[test]
    fn bad_input_reports_parse_error_with_line() {
        let err = ObjectReader::new("v 0 0\nf 1 2 3\n").read().unwrap_err();
        match err {
            EngineError::Parse(message) => assert!(message.contains("line 1"), "{message}"),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(
            ObjectReader::new("# nothing here\n").read(),
            Err(EngineError::Parse(_))
        ));
        assert!(matches!(
            ObjectReader::new("v 0 0 0\nf 1 2 9\n").read(),
            Err(EngineError::Parse(_))
        ));
    }
}
