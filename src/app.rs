//! Helpers shared by the command line viewer: loading files from disk and
//! reporting engine state.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::obj::{parse_mtl, ObjectReader};
use crate::object::{RenderObject, TextureImage};
use crate::render::{HeadlessBackend, RenderBackend, Renderer};

pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let xml = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    EngineConfig::from_xml(&xml).with_context(|| format!("invalid config {}", path.display()))
}

/// Reads an OBJ file and, when given, its MTL file.
///
/// Texture maps named by the materials are decoded from paths relative to
/// the MTL file. Maps that cannot be read are logged and skipped.
pub fn load_object(obj_path: &Path, mtl_path: Option<&Path>) -> Result<RenderObject> {
    let obj = fs::read_to_string(obj_path)
        .with_context(|| format!("failed to read model {}", obj_path.display()))?;
    let mtl = mtl_path
        .map(|path| {
            fs::read_to_string(path)
                .with_context(|| format!("failed to read materials {}", path.display()))
        })
        .transpose()?;

    let mut reader = ObjectReader::new(&obj);
    if let (Some(mtl), Some(mtl_path)) = (mtl.as_deref(), mtl_path) {
        let base = mtl_path.parent().unwrap_or_else(|| Path::new(""));
        let textures = load_textures(mtl, base)
            .with_context(|| format!("failed to parse {}", mtl_path.display()))?;
        reader = reader.with_materials(mtl).with_textures(textures);
    }
    let object = reader
        .read()
        .with_context(|| format!("failed to parse {}", obj_path.display()))?;
    Ok(object)
}

/// Decodes every texture map named in `mtl`, keyed by the name used there.
pub fn load_textures(mtl: &str, base: &Path) -> Result<HashMap<String, TextureImage>> {
    let materials = parse_mtl(mtl)?;
    let mut textures = HashMap::new();
    let names = materials
        .iter()
        .flat_map(|material| [&material.diffuse_map, &material.specular_map, &material.normal_map])
        .flatten();
    for name in names {
        if textures.contains_key(name) {
            continue;
        }
        match decode_texture(&base.join(name)) {
            Ok(image) => {
                debug!("decoded texture {name} ({}x{})", image.width(), image.height());
                textures.insert(name.clone(), image);
            }
            Err(err) => warn!("skipping texture {name}: {err:#}"),
        }
    }
    Ok(textures)
}

pub fn decode_texture(path: &Path) -> Result<TextureImage> {
    let image = image::open(path)
        .with_context(|| format!("failed to decode {}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    TextureImage::new(width, height, image.into_raw())
        .with_context(|| format!("unusable texture {}", path.display()))
}

/// Adds `objects` to a headless engine in order and renders a single frame.
pub fn render_headless(
    objects: Vec<RenderObject>,
    config: &EngineConfig,
) -> Result<Engine<HeadlessBackend>> {
    let mut engine = Engine::new(Renderer::new(HeadlessBackend::new()), 16.0 / 9.0, config)?;
    for object in objects {
        engine.add(object)?;
    }
    engine.render()?;
    Ok(engine)
}

pub fn write_summary<B: RenderBackend>(engine: &Engine<B>, out: &mut impl Write) -> Result<()> {
    for handle in engine.objects() {
        let Some(object) = engine.object(handle) else {
            continue;
        };
        let material = object
            .material
            .as_ref()
            .map(|material| material.name.as_str())
            .unwrap_or("none");
        writeln!(
            out,
            "Object {handle}: {} vertices, {} triangles, material {material}, {} texture(s)",
            object.geometry.vertex_count(),
            object.geometry.triangle_count(),
            object.textures.count()
        )?;
    }
    writeln!(
        out,
        "Camera {} looking at {}",
        engine.camera_position(),
        engine.look_at_position()
    )?;
    writeln!(out, "Light at {}", engine.light_position())?;
    Ok(())
}

pub fn print_summary(engine: &Engine<HeadlessBackend>) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_summary(engine, &mut out)?;
    let draws = engine
        .renderer()
        .backend()
        .last_frame()
        .map(|frame| frame.draws.len())
        .unwrap_or(0);
    writeln!(out, "Rendered {draws} draw call(s)")?;
    Ok(())
}
