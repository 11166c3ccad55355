use std::f32::consts::PI;

use log::{debug, error, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::light::Light;
use crate::math::{TransformationMatrix, Vector3D};
use crate::object::{ObjectHandle, RenderObject};
use crate::render::{RenderBackend, RenderParams, Renderer};

/// Distance covered by one [`Engine::translate_camera`] call.
pub const PAN_STEP: f32 = 0.2;

/// Angle used for one incremental orbit step, one degree.
pub const DEFAULT_ROTATION_STEP: f32 = PI / 180.0;

/// Owns the camera, the light and the renderer, and turns them into one draw
/// per tracked object each frame.
///
/// The camera always uses `+Y` as world up; roll is not supported.
pub struct Engine<B: RenderBackend> {
    renderer: Renderer<B>,
    camera_position: Vector3D,
    look_at_position: Vector3D,
    home_position: Vector3D,
    home_look_at: Vector3D,
    background_color: [f32; 4],
    objects_color: [f32; 3],
    field_of_view: f32,
    near: f32,
    far: f32,
    projection_matrix: TransformationMatrix,
    model_matrix: TransformationMatrix,
    light: Light,
}

impl<B: RenderBackend> Engine<B> {
    /// Builds an engine around `renderer` for a viewport with the given
    /// aspect ratio. The config is validated as a whole; nothing is built on
    /// failure.
    pub fn new(renderer: Renderer<B>, aspect: f32, config: &EngineConfig) -> Result<Self> {
        let field_of_view = config.field_of_view_degrees.to_radians();
        let projection_matrix =
            TransformationMatrix::create_perspective(field_of_view, aspect, config.near, config.far)?;
        TransformationMatrix::create_look_at(config.camera_position, config.look_at, Vector3D::UP)?;
        let light = config.light.build()?;
        validate_channels("background", &config.background_color)?;
        validate_channels("objects", &config.objects_color)?;

        Ok(Self {
            renderer,
            camera_position: config.camera_position,
            look_at_position: config.look_at,
            home_position: config.camera_position,
            home_look_at: config.look_at,
            background_color: config.background_color,
            objects_color: config.objects_color,
            field_of_view,
            near: config.near,
            far: config.far,
            projection_matrix,
            model_matrix: TransformationMatrix::identity(),
            light,
        })
    }

    pub fn with_defaults(renderer: Renderer<B>, aspect: f32) -> Result<Self> {
        Self::new(renderer, aspect, &EngineConfig::default())
    }

    /// Uploads `object` and starts drawing it after the objects added before.
    pub fn add(&mut self, object: RenderObject) -> Result<ObjectHandle> {
        self.renderer.init_buffers(object)
    }

    /// Stops drawing `handle` and releases its buffers. Unknown handles are a
    /// no-op and return `None`.
    pub fn remove(&mut self, handle: ObjectHandle) -> Option<RenderObject> {
        if !self.renderer.contains(handle) {
            debug!("ignoring removal of unknown render object {handle}");
            return None;
        }
        match self.renderer.remove_buffer(handle) {
            Ok(object) => Some(object),
            Err(err) => {
                error!("failed to release render object {handle}: {err}");
                None
            }
        }
    }

    /// Re-uploads an object after it was modified through
    /// [`object_mut`](Self::object_mut).
    pub fn refresh(&mut self, handle: ObjectHandle) -> Result<()> {
        self.renderer.refresh_buffers(handle)
    }

    pub fn object(&self, handle: ObjectHandle) -> Option<&RenderObject> {
        self.renderer.object(handle)
    }

    pub fn object_mut(&mut self, handle: ObjectHandle) -> Option<&mut RenderObject> {
        self.renderer.object_mut(handle)
    }

    /// Handles of the tracked objects in draw order.
    pub fn objects(&self) -> Vec<ObjectHandle> {
        self.renderer.handles()
    }

    /// Moves an object along the view plane by a screen-space direction and
    /// re-uploads it.
    pub fn translate_object(&mut self, handle: ObjectHandle, direction: Vector3D) -> Result<()> {
        let offset = self.get_direction_in_space(direction)?;
        let object = self
            .renderer
            .object_mut(handle)
            .ok_or(EngineError::UnknownObject(handle))?;
        object.translate(offset);
        self.renderer.refresh_buffers(handle)
    }

    pub fn renderer(&self) -> &Renderer<B> {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer<B> {
        &mut self.renderer
    }

    /// Draws one frame.
    ///
    /// When the model-view matrix cannot be inverted the frame is skipped:
    /// nothing is drawn and the error is returned.
    pub fn render(&mut self) -> Result<()> {
        let params = match self.frame_params() {
            Ok(params) => params,
            Err(err) => {
                warn!("skipping frame: {err}");
                return Err(err);
            }
        };
        self.renderer.render_all(&params)
    }

    /// Matrices, light and colours for the current camera state.
    pub fn frame_params(&self) -> Result<RenderParams> {
        let view_matrix = self.view_matrix()?;
        let model_view_matrix = view_matrix.multiply(&self.model_matrix);
        let normal_matrix = model_view_matrix.inverse()?.transpose();
        Ok(RenderParams {
            projection_matrix: self.projection_matrix,
            view_matrix,
            model_view_matrix,
            normal_matrix,
            camera_position: self.camera_position,
            light: self.light,
            background_color: self.background_color,
            objects_color: self.objects_color,
        })
    }

    pub fn view_matrix(&self) -> Result<TransformationMatrix> {
        Ok(TransformationMatrix::create_look_at(
            self.camera_position,
            self.look_at_position,
            Vector3D::UP,
        )?)
    }

    /// Moves the camera one unit along `direction`.
    pub fn move_camera(&mut self, direction: Vector3D) -> Result<()> {
        let step = direction.normalize()?;
        self.camera_position = self.camera_position.add(step);
        Ok(())
    }

    /// Pans camera and target together by [`PAN_STEP`] along `direction`,
    /// or against it when `invert` is set.
    pub fn translate_camera(&mut self, direction: Vector3D, invert: bool) -> Result<()> {
        let scale = if invert { -PAN_STEP } else { PAN_STEP };
        let step = direction.normalize()?.scale(scale);
        self.camera_position = self.camera_position.add(step);
        self.look_at_position = self.look_at_position.add(step);
        Ok(())
    }

    /// Rotation that orbits the camera around the look-at point for a drag
    /// in screen space.
    ///
    /// The axis is perpendicular to both the drag (in world space) and the
    /// view direction. Apply the result with [`rotate_camera`](Self::rotate_camera).
    pub fn get_rotation_around_camera(
        &self,
        direction: Vector3D,
        angle: f32,
    ) -> Result<TransformationMatrix> {
        let world_direction = self.get_direction_in_space(direction)?;
        let center_direction = self.look_at_position.subtract(self.camera_position);
        let axis = world_direction.cross(center_direction).normalize()?;
        Ok(TransformationMatrix::create_rotation_around_point(
            angle,
            axis,
            self.look_at_position,
        ))
    }

    /// Maps a screen-space direction into world space through the inverse
    /// view basis. Translation is ignored.
    pub fn get_direction_in_space(&self, direction: Vector3D) -> Result<Vector3D> {
        let inverse_view = self.view_matrix()?.inverse()?;
        Ok(inverse_view.transform_direction(direction))
    }

    /// Moves the eye by `rotation`. The look-at point stays where it is.
    pub fn rotate_camera(&mut self, rotation: &TransformationMatrix) {
        self.camera_position = rotation.transform(self.camera_position);
    }

    /// Mean of the tracked objects' centroids, `None` when nothing is tracked.
    pub fn objects_center(&self) -> Option<Vector3D> {
        let handles = self.renderer.handles();
        if handles.is_empty() {
            return None;
        }
        let sum = handles
            .iter()
            .filter_map(|handle| self.renderer.object(*handle))
            .fold(Vector3D::ZERO, |acc, object| acc.add(object.centroid()));
        Some(sum.scale(1.0 / handles.len() as f32))
    }

    /// Points the camera at the centre of the tracked objects without moving
    /// the eye. Returns `false` and changes nothing when there is no object or
    /// the centre would not give a usable view.
    pub fn focus_objects(&mut self) -> bool {
        let Some(center) = self.objects_center() else {
            return false;
        };
        if TransformationMatrix::create_look_at(self.camera_position, center, Vector3D::UP).is_err() {
            debug!("cannot focus on {center} from {}", self.camera_position);
            return false;
        }
        self.look_at_position = center;
        true
    }

    /// Restores the camera and target the engine was built with.
    pub fn reset_view(&mut self) {
        self.camera_position = self.home_position;
        self.look_at_position = self.home_look_at;
    }

    pub fn camera_position(&self) -> Vector3D {
        self.camera_position
    }

    pub fn look_at_position(&self) -> Vector3D {
        self.look_at_position
    }

    pub fn set_camera_center(&mut self, center: Vector3D) {
        self.look_at_position = center;
    }

    pub fn projection_matrix(&self) -> TransformationMatrix {
        self.projection_matrix
    }

    /// Rebuilds the projection for a new viewport aspect ratio.
    pub fn set_aspect_ratio(&mut self, aspect: f32) -> Result<()> {
        self.projection_matrix =
            TransformationMatrix::create_perspective(self.field_of_view, aspect, self.near, self.far)?;
        Ok(())
    }

    pub fn model_matrix(&self) -> TransformationMatrix {
        self.model_matrix
    }

    pub fn set_model_matrix(&mut self, model: TransformationMatrix) {
        self.model_matrix = model;
    }

    pub fn background_color(&self) -> [f32; 4] {
        self.background_color
    }

    pub fn set_background_color(&mut self, color: [f32; 4]) -> Result<()> {
        validate_channels("background", &color)?;
        self.background_color = color;
        Ok(())
    }

    pub fn objects_color(&self) -> [f32; 3] {
        self.objects_color
    }

    /// Colour used for objects without a material or diffuse texture.
    pub fn set_objects_color(&mut self, color: [f32; 3]) -> Result<()> {
        validate_channels("objects", &color)?;
        self.objects_color = color;
        Ok(())
    }

    pub fn set_light_position(&mut self, position: Vector3D) -> Result<()> {
        self.light.set_position(position)
    }

    pub fn set_light_color(&mut self, color: Vector3D) -> Result<()> {
        self.light.set_color(color)
    }

    pub fn set_ambient_light_color(&mut self, color: Vector3D) -> Result<()> {
        self.light.set_ambient_color(color)
    }

    pub fn set_ambient_light_strength(&mut self, strength: f32) -> Result<()> {
        self.light.set_ambient_strength(strength)
    }

    pub fn set_material_ambient_reflectivity(&mut self, ka: Vector3D) -> Result<()> {
        self.light.set_ambient_reflectivity(ka)
    }

    pub fn light_position(&self) -> Vector3D {
        self.light.position()
    }

    pub fn light_color(&self) -> Vector3D {
        self.light.color()
    }

    pub fn ambient_light_color(&self) -> Vector3D {
        self.light.ambient_color()
    }

    pub fn ambient_light_strength(&self) -> f32 {
        self.light.ambient_strength()
    }

    pub fn material_ambient_reflectivity(&self) -> Vector3D {
        self.light.ambient_reflectivity()
    }
}

fn validate_channels(name: &'static str, channels: &[f32]) -> Result<()> {
    if channels.iter().all(|c| (0.0..=1.0).contains(c)) {
        Ok(())
    } else {
        error!("rejected {name} color {channels:?}");
        Err(EngineError::InvalidColor {
            name,
            reason: format!("{channels:?} has channels outside [0, 1]"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MathError;
    use crate::object::tests::triangle;
    use crate::render::{ColorSource, HeadlessBackend};

    fn engine() -> Engine<HeadlessBackend> {
        Engine::with_defaults(Renderer::new(HeadlessBackend::new()), 16.0 / 9.0).unwrap()
    }

    #[test]
    fn starts_with_default_camera() {
        let engine = engine();
        assert_eq!(engine.camera_position(), Vector3D::new(0.0, 2.0, 10.0));
        assert_eq!(engine.look_at_position(), Vector3D::ZERO);
        assert_eq!(engine.background_color(), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(engine.objects_color(), [1.0, 1.0, 1.0]);
    }

    #[test]
    fn reset_view_restores_construction_values() {
        let mut engine = engine();
        engine.move_camera(Vector3D::new(1.0, 1.0, 0.0)).unwrap();
        engine.translate_camera(Vector3D::new(0.0, 0.0, 1.0), true).unwrap();
        engine.set_camera_center(Vector3D::new(4.0, 4.0, 4.0));
        engine.reset_view();
        assert_eq!(engine.camera_position(), Vector3D::new(0.0, 2.0, 10.0));
        assert_eq!(engine.look_at_position(), Vector3D::ZERO);
    }

    #[test]
    fn reset_view_uses_the_configured_home() {
        let config = EngineConfig {
            camera_position: Vector3D::new(3.0, 1.0, -6.0),
            look_at: Vector3D::new(0.0, 1.0, 0.0),
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(Renderer::new(HeadlessBackend::new()), 1.0, &config).unwrap();
        engine.set_camera_center(Vector3D::new(2.0, 2.0, 2.0));
        engine.move_camera(Vector3D::new(0.0, 0.0, 1.0)).unwrap();
        engine.reset_view();
        assert_eq!(engine.camera_position(), Vector3D::new(3.0, 1.0, -6.0));
        assert_eq!(engine.look_at_position(), Vector3D::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn pan_moves_camera_and_target_together() {
        let mut engine = engine();
        engine
            .translate_camera(Vector3D::new(1.0, 0.0, 0.0), false)
            .unwrap();
        assert!(engine
            .camera_position()
            .approx_eq(Vector3D::new(0.2, 2.0, 10.0), 1e-6));
        assert!(engine
            .look_at_position()
            .approx_eq(Vector3D::new(0.2, 0.0, 0.0), 1e-6));

        engine
            .translate_camera(Vector3D::new(5.0, 0.0, 0.0), true)
            .unwrap();
        assert!(engine
            .camera_position()
            .approx_eq(Vector3D::new(0.0, 2.0, 10.0), 1e-6));
    }

    #[test]
    fn move_camera_takes_unit_steps() {
        let mut engine = engine();
        engine.move_camera(Vector3D::new(0.0, 0.0, -42.0)).unwrap();
        assert!(engine
            .camera_position()
            .approx_eq(Vector3D::new(0.0, 2.0, 9.0), 1e-6));
        assert!(matches!(
            engine.move_camera(Vector3D::ZERO),
            Err(EngineError::Math(MathError::DegenerateVector))
        ));
        assert!(engine
            .camera_position()
            .approx_eq(Vector3D::new(0.0, 2.0, 9.0), 1e-6));
    }

    #[test]
    fn rotating_by_identity_keeps_camera() {
        let mut engine = engine();
        let before = engine.camera_position();
        engine.rotate_camera(&TransformationMatrix::identity());
        assert_eq!(engine.camera_position(), before);
    }

    #[test]
    fn orbit_keeps_distance_to_target() {
        let mut engine = engine();
        let target = engine.look_at_position();
        let distance = engine.camera_position().subtract(target).length();
        for _ in 0..90 {
            let rotation = engine
                .get_rotation_around_camera(Vector3D::new(1.0, 0.0, 0.0), DEFAULT_ROTATION_STEP)
                .unwrap();
            engine.rotate_camera(&rotation);
        }
        let moved = engine.camera_position();
        assert_eq!(engine.look_at_position(), target);
        assert!((moved.subtract(target).length() - distance).abs() < 1e-3);
        // a horizontal drag keeps the camera close to its height
        assert!((moved.y - 2.0).abs() < 0.05);
        assert!(moved.x.abs() > 5.0);
    }

    #[test]
    fn screen_directions_map_to_view_plane() {
        let mut engine = engine();
        engine.set_camera_center(Vector3D::new(0.0, 2.0, 0.0));
        let right = engine
            .get_direction_in_space(Vector3D::new(1.0, 0.0, 0.0))
            .unwrap();
        assert!(right.approx_eq(Vector3D::new(1.0, 0.0, 0.0), 1e-5));
        let up = engine
            .get_direction_in_space(Vector3D::new(0.0, 1.0, 0.0))
            .unwrap();
        assert!(up.approx_eq(Vector3D::UP, 1e-5));
    }

    #[test]
    fn rotation_requires_a_drag_direction() {
        let engine = engine();
        assert!(matches!(
            engine.get_rotation_around_camera(Vector3D::ZERO, DEFAULT_ROTATION_STEP),
            Err(EngineError::Math(MathError::DegenerateVector))
        ));
    }

    #[test]
    fn add_then_remove_leaves_no_buffers() {
        let mut engine = engine();
        let handle = engine.add(triangle()).unwrap();
        assert_eq!(engine.objects(), vec![handle]);
        assert!(engine.remove(handle).is_some());
        assert!(!engine.renderer().contains(handle));
        assert_eq!(engine.renderer().backend().live_buffers(), 0);
        // second removal is a no-op at engine level, the renderer rejects it
        assert!(engine.remove(handle).is_none());
        assert_eq!(engine.renderer().backend().releases(), 1);
        assert!(matches!(
            engine.renderer_mut().remove_buffer(handle),
            Err(EngineError::UnknownObject(_))
        ));
    }

    #[test]
    fn render_draws_in_insertion_order() {
        let mut engine = engine();
        let first = engine.add(triangle()).unwrap();
        let second = engine.add(triangle()).unwrap();
        let third = engine.add(triangle()).unwrap();
        engine.remove(second);
        engine.render().unwrap();
        let frame = engine.renderer().backend().last_frame().unwrap();
        let order: Vec<_> = frame.draws.iter().map(|d| d.handle).collect();
        assert_eq!(order, vec![first, third]);
        assert!(frame
            .draws
            .iter()
            .all(|d| d.color_source == ColorSource::Flat && d.index_count == 3));
    }

    #[test]
    fn render_passes_frame_parameters() {
        let mut engine = engine();
        engine.set_objects_color([0.2, 0.3, 0.4]).unwrap();
        engine.set_background_color([0.1, 0.1, 0.1, 1.0]).unwrap();
        engine.render().unwrap();
        let frame = engine.renderer().backend().last_frame().unwrap();
        assert_eq!(frame.clear_color, [0.1, 0.1, 0.1, 1.0]);
        assert_eq!(frame.globals.objects_color, [0.2, 0.3, 0.4, 1.0]);
        assert_eq!(frame.globals.camera_position, [0.0, 2.0, 10.0, 1.0]);
    }

    #[test]
    fn normal_matrix_is_inverse_transpose_of_model_view() {
        let mut engine = engine();
        engine.set_model_matrix(TransformationMatrix::from(glam::Mat4::from_scale(
            glam::Vec3::new(2.0, 1.0, 0.5),
        )));
        let params = engine.frame_params().unwrap();
        let expected = params.model_view_matrix.inverse().unwrap().transpose();
        assert!(params.normal_matrix.approx_eq(&expected, 1e-5));
        let round_trip = params
            .normal_matrix
            .transpose()
            .multiply(&params.model_view_matrix);
        assert!(round_trip.approx_eq(&TransformationMatrix::identity(), 1e-4));
    }

    #[test]
    fn singular_model_matrix_skips_the_frame() {
        let mut engine = engine();
        engine.add(triangle()).unwrap();
        engine.set_model_matrix(TransformationMatrix::from(glam::Mat4::from_scale(
            glam::Vec3::new(1.0, 0.0, 1.0),
        )));
        assert!(matches!(
            engine.render(),
            Err(EngineError::Math(MathError::SingularMatrix))
        ));
        assert!(engine.renderer().backend().frames().is_empty());
    }

    #[test]
    fn invalid_light_strength_keeps_previous_value() {
        let mut engine = engine();
        assert!(matches!(
            engine.set_ambient_light_strength(1.5),
            Err(EngineError::InvalidLightParameter { .. })
        ));
        assert_eq!(engine.ambient_light_strength(), 0.1);
        engine.set_ambient_light_strength(0.6).unwrap();
        assert_eq!(engine.ambient_light_strength(), 0.6);
    }

    #[test]
    fn light_getters_return_copies() {
        let mut engine = engine();
        let mut color = engine.light_color();
        color.x = 0.0;
        assert_eq!(engine.light_color(), Vector3D::new(1.0, 1.0, 1.0));
        engine
            .set_material_ambient_reflectivity(Vector3D::new(0.3, 0.2, 0.1))
            .unwrap();
        assert_eq!(
            engine.material_ambient_reflectivity(),
            Vector3D::new(0.3, 0.2, 0.1)
        );
    }

    #[test]
    fn invalid_colors_are_rejected() {
        let mut engine = engine();
        assert!(matches!(
            engine.set_objects_color([1.5, 0.0, 0.0]),
            Err(EngineError::InvalidColor { .. })
        ));
        assert_eq!(engine.objects_color(), [1.0, 1.0, 1.0]);
        assert!(engine.set_background_color([0.0, 0.0, -1.0, 1.0]).is_err());
        assert_eq!(engine.background_color(), [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn translate_object_moves_geometry_in_view_plane() {
        let mut engine = engine();
        engine.set_camera_center(Vector3D::new(0.0, 2.0, 0.0));
        let handle = engine.add(triangle()).unwrap();
        engine
            .translate_object(handle, Vector3D::new(1.0, 0.0, 0.0))
            .unwrap();
        let moved = engine.object(handle).unwrap();
        assert!(Vector3D::from(moved.geometry.positions[0])
            .approx_eq(Vector3D::new(1.0, 0.0, 0.0), 1e-5));
        assert_eq!(engine.renderer().backend().updates(), 1);

        engine.remove(handle);
        assert!(matches!(
            engine.translate_object(handle, Vector3D::new(1.0, 0.0, 0.0)),
            Err(EngineError::UnknownObject(_))
        ));
    }

    #[test]
    fn focus_targets_the_objects_center() {
        let mut engine = engine();
        assert_eq!(engine.objects_center(), None);
        assert!(!engine.focus_objects());

        let first = engine.add(triangle()).unwrap();
        let mut shifted = triangle();
        shifted.translate(Vector3D::new(2.0, 0.0, 0.0));
        engine.add(shifted).unwrap();
        assert!(engine.focus_objects());
        assert!(engine
            .look_at_position()
            .approx_eq(Vector3D::new(4.0 / 3.0, 1.0 / 3.0, 0.0), 1e-5));
        assert_eq!(engine.camera_position(), Vector3D::new(0.0, 2.0, 10.0));

        // a center straight below the eye leaves no view basis
        engine.remove(first);
        let handle = engine.objects()[0];
        let offset = engine.object(handle).unwrap().centroid();
        engine
            .object_mut(handle)
            .unwrap()
            .translate(Vector3D::new(-offset.x, 0.0, 10.0 - offset.z));
        let before = engine.look_at_position();
        assert!(!engine.focus_objects());
        assert_eq!(engine.look_at_position(), before);
    }

    #[test]
    fn construction_rejects_bad_configs() {
        let mut config = EngineConfig::default();
        config.near = 0.0;
        assert!(matches!(
            Engine::new(Renderer::new(HeadlessBackend::new()), 1.0, &config),
            Err(EngineError::Math(MathError::InvalidFrustum))
        ));

        let mut config = EngineConfig::default();
        config.camera_position = Vector3D::new(0.0, 5.0, 0.0);
        assert!(matches!(
            Engine::new(Renderer::new(HeadlessBackend::new()), 1.0, &config),
            Err(EngineError::Math(MathError::DegenerateBasis))
        ));

        let mut config = EngineConfig::default();
        config.light.ambient_strength = -1.0;
        assert!(Engine::new(Renderer::new(HeadlessBackend::new()), 1.0, &config).is_err());
    }

    #[test]
    fn aspect_change_rebuilds_projection() {
        let mut engine = engine();
        let before = engine.projection_matrix();
        engine.set_aspect_ratio(1.0).unwrap();
        assert_ne!(engine.projection_matrix(), before);
        assert!(engine.set_aspect_ratio(0.0).is_err());
        assert_eq!(
            engine.projection_matrix(),
            TransformationMatrix::create_perspective(45f32.to_radians(), 1.0, 0.1, 500.0).unwrap()
        );
    }
}
