use anyhow::{anyhow, Context, Result};
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::light::Light;
use crate::math::Vector3D;

/// Startup settings for an [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_fov")]
    pub field_of_view_degrees: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
    #[serde(default = "default_camera_position")]
    pub camera_position: Vector3D,
    #[serde(default)]
    pub look_at: Vector3D,
    #[serde(default = "default_background")]
    pub background_color: [f32; 4],
    #[serde(default = "default_objects_color")]
    pub objects_color: [f32; 3],
    #[serde(default)]
    pub light: LightConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            field_of_view_degrees: default_fov(),
            near: default_near(),
            far: default_far(),
            camera_position: default_camera_position(),
            look_at: Vector3D::ZERO,
            background_color: default_background(),
            objects_color: default_objects_color(),
            light: LightConfig::default(),
        }
    }
}

/// Light values applied through the validating [`Light`] setters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightConfig {
    pub position: Vector3D,
    pub color: Vector3D,
    pub ambient_color: Vector3D,
    pub ambient_strength: f32,
    pub ambient_reflectivity: Vector3D,
}

impl Default for LightConfig {
    fn default() -> Self {
        let light = Light::default();
        Self {
            position: light.position(),
            color: light.color(),
            ambient_color: light.ambient_color(),
            ambient_strength: light.ambient_strength(),
            ambient_reflectivity: light.ambient_reflectivity(),
        }
    }
}

impl LightConfig {
    pub fn build(&self) -> crate::Result<Light> {
        let mut light = Light::default();
        light.set_position(self.position)?;
        light.set_color(self.color)?;
        light.set_ambient_color(self.ambient_color)?;
        light.set_ambient_strength(self.ambient_strength)?;
        light.set_ambient_reflectivity(self.ambient_reflectivity)?;
        Ok(light)
    }
}

impl EngineConfig {
    /// Parses an `<engine>` settings document. Missing tags keep their
    /// defaults.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid engine XML")?;
        let root = document.root_element();
        if !root.has_tag_name("engine") {
            return Err(anyhow!(
                "expected <engine> root element, found <{}>",
                root.tag_name().name()
            ));
        }

        let mut config = Self::default();
        config.field_of_view_degrees =
            parse_f32(optional_text(&root, "fov"), config.field_of_view_degrees)?;
        config.near = parse_f32(optional_text(&root, "near"), config.near)?;
        config.far = parse_f32(optional_text(&root, "far"), config.far)?;
        config.camera_position = parse_vec3(optional_text(&root, "camera"), config.camera_position)
            .context("invalid <camera>")?;
        config.look_at =
            parse_vec3(optional_text(&root, "target"), config.look_at).context("invalid <target>")?;
        if let Some(text) = optional_text(&root, "background") {
            config.background_color = parse_floats::<4>(&text).context("invalid <background>")?;
        }
        if let Some(text) = optional_text(&root, "objects-color") {
            config.objects_color = parse_floats::<3>(&text).context("invalid <objects-color>")?;
        }

        if let Some(node) = root.children().find(|child| child.has_tag_name("light")) {
            let light = &mut config.light;
            light.position = parse_vec3(optional_text(&node, "position"), light.position)
                .context("invalid light <position>")?;
            light.color = parse_vec3(optional_text(&node, "color"), light.color)
                .context("invalid light <color>")?;
            light.ambient_color = parse_vec3(optional_text(&node, "ambient"), light.ambient_color)
                .context("invalid light <ambient>")?;
            light.ambient_strength =
                parse_f32(optional_text(&node, "strength"), light.ambient_strength)?;
            light.ambient_reflectivity =
                parse_vec3(optional_text(&node, "ka"), light.ambient_reflectivity)
                    .context("invalid light <ka>")?;
        }

        Ok(config)
    }
}

fn default_fov() -> f32 {
    45.0
}

fn default_near() -> f32 {
    0.1
}

fn default_far() -> f32 {
    500.0
}

fn default_camera_position() -> Vector3D {
    Vector3D::new(0.0, 2.0, 10.0)
}

fn default_background() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn default_objects_color() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_floats<const N: usize>(value: &str) -> Result<[f32; N]> {
    let mut out = [0.0; N];
    let mut numbers = value.split_whitespace();
    for slot in out.iter_mut() {
        *slot = numbers
            .next()
            .ok_or_else(|| anyhow!("expected {N} components"))?
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float: {err}"))?;
    }
    if numbers.next().is_some() {
        return Err(anyhow!("expected {N} components"));
    }
    Ok(out)
}

fn parse_vec3(value: Option<String>, default: Vector3D) -> Result<Vector3D> {
    match value {
        Some(value) => Ok(Vector3D::from(parse_floats::<3>(&value)?)),
        None => Ok(default),
    }
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float: {err}")),
        None => Ok(default),
    }
}
