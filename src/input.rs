//! Pointer and keyboard state for the interactive viewer.
//!
//! [`InputState`] is fed raw window events and turns them into
//! [`ViewAction`]s; [`apply`] runs an action against an [`Engine`]. Nothing
//! here depends on the windowing library so the mapping can be exercised
//! without a display.

use glam::Vec2;
use log::debug;

use crate::engine::{Engine, DEFAULT_ROTATION_STEP};
use crate::error::Result;
use crate::math::Vector3D;
use crate::render::RenderBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u16),
}

/// Keys the viewer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Left,
    Right,
    Up,
    Down,
    Escape,
    Character(char),
}

/// Camera change requested by the user. Directions are in screen space,
/// `+x` right and `+y` up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewAction {
    Orbit { direction: Vector3D, angle: f32 },
    Pan { direction: Vector3D },
    Zoom { toward: bool },
    Focus,
    Reset,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drag {
    Orbit,
    Pan,
}

#[derive(Debug, Default)]
pub struct InputState {
    drag: Option<Drag>,
    cursor: Option<Vec2>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mouse_down(&mut self, button: MouseButton) {
        self.drag = match button {
            MouseButton::Left => Some(Drag::Orbit),
            MouseButton::Right => Some(Drag::Pan),
            _ => return,
        };
    }

    pub fn mouse_up(&mut self, button: MouseButton) {
        let released = match button {
            MouseButton::Left => Drag::Orbit,
            MouseButton::Right => Drag::Pan,
            _ => return,
        };
        if self.drag == Some(released) {
            self.drag = None;
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Records the new cursor position (window pixels, `y` down) and returns
    /// the action for the active drag, if any.
    pub fn cursor_moved(&mut self, position: Vec2) -> Option<ViewAction> {
        let previous = self.cursor.replace(position);
        let drag = self.drag?;
        let delta = position - previous?;
        if delta.length_squared() < f32::EPSILON {
            return None;
        }
        let direction = Vector3D::new(delta.x, -delta.y, 0.0);
        Some(match drag {
            // negative so the model follows the cursor
            Drag::Orbit => ViewAction::Orbit {
                direction,
                angle: -DEFAULT_ROTATION_STEP * delta.length(),
            },
            Drag::Pan => ViewAction::Pan {
                direction: direction.scale(-1.0),
            },
        })
    }

    pub fn cursor_left(&mut self) {
        self.cursor = None;
    }

    /// Positive `lines` scroll away from the user and move toward the target.
    pub fn wheel(&self, lines: f32) -> Option<ViewAction> {
        if lines == 0.0 || !lines.is_finite() {
            return None;
        }
        Some(ViewAction::Zoom { toward: lines > 0.0 })
    }

    pub fn key_pressed(&self, key: KeyCode) -> Option<ViewAction> {
        let pan = |x: f32, y: f32| ViewAction::Pan {
            direction: Vector3D::new(x, y, 0.0),
        };
        Some(match key {
            KeyCode::Left => pan(-1.0, 0.0),
            KeyCode::Right => pan(1.0, 0.0),
            KeyCode::Up => pan(0.0, 1.0),
            KeyCode::Down => pan(0.0, -1.0),
            KeyCode::Escape => ViewAction::Exit,
            KeyCode::Character('r' | 'R') => ViewAction::Reset,
            KeyCode::Character('f' | 'F') => ViewAction::Focus,
            KeyCode::Character(_) => return None,
        })
    }
}

/// Runs `action` against the engine. [`ViewAction::Exit`] is left to the
/// event loop and does nothing here.
pub fn apply<B: RenderBackend>(engine: &mut Engine<B>, action: ViewAction) -> Result<()> {
    match action {
        ViewAction::Orbit { direction, angle } => {
            let rotation = engine.get_rotation_around_camera(direction, angle)?;
            engine.rotate_camera(&rotation);
        }
        ViewAction::Pan { direction } => {
            let world = engine.get_direction_in_space(direction)?;
            engine.translate_camera(world, false)?;
        }
        ViewAction::Zoom { toward } => {
            let forward = engine
                .look_at_position()
                .subtract(engine.camera_position());
            if toward && forward.length() <= 1.0 {
                debug!("camera is already at the target");
                return Ok(());
            }
            let direction = if toward { forward } else { forward.scale(-1.0) };
            engine.move_camera(direction)?;
        }
        ViewAction::Focus => {
            if !engine.focus_objects() {
                debug!("nothing to focus on");
            }
        }
        ViewAction::Reset => engine.reset_view(),
        ViewAction::Exit => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{HeadlessBackend, Renderer};

    fn engine() -> Engine<HeadlessBackend> {
        Engine::with_defaults(Renderer::new(HeadlessBackend::new()), 1.0).unwrap()
    }

    #[test]
    fn cursor_moves_without_drag_do_nothing() {
        let mut input = InputState::new();
        assert_eq!(input.cursor_moved(Vec2::new(10.0, 10.0)), None);
        assert_eq!(input.cursor_moved(Vec2::new(20.0, 10.0)), None);
    }

    #[test]
    fn left_drag_orbits() {
        let mut input = InputState::new();
        input.cursor_moved(Vec2::new(100.0, 100.0));
        input.mouse_down(MouseButton::Left);
        let action = input.cursor_moved(Vec2::new(103.0, 96.0)).unwrap();
        match action {
            ViewAction::Orbit { direction, angle } => {
                assert_eq!(direction, Vector3D::new(3.0, 4.0, 0.0));
                assert!((angle + 5.0 * DEFAULT_ROTATION_STEP).abs() < 1e-6);
            }
            other => panic!("unexpected action {other:?}"),
        }
        input.mouse_up(MouseButton::Left);
        assert!(!input.is_dragging());
        assert_eq!(input.cursor_moved(Vec2::new(110.0, 96.0)), None);
    }

    #[test]
    fn releasing_other_button_keeps_drag() {
        let mut input = InputState::new();
        input.mouse_down(MouseButton::Right);
        input.mouse_up(MouseButton::Left);
        input.mouse_up(MouseButton::Middle);
        assert!(input.is_dragging());
    }

    #[test]
    fn right_drag_pans_against_the_cursor() {
        let mut input = InputState::new();
        input.cursor_moved(Vec2::new(0.0, 0.0));
        input.mouse_down(MouseButton::Right);
        assert_eq!(
            input.cursor_moved(Vec2::new(5.0, 0.0)),
            Some(ViewAction::Pan {
                direction: Vector3D::new(-5.0, 0.0, 0.0)
            })
        );
    }

    #[test]
    fn keys_map_to_actions() {
        let input = InputState::new();
        assert_eq!(input.key_pressed(KeyCode::Character('r')), Some(ViewAction::Reset));
        assert_eq!(input.key_pressed(KeyCode::Escape), Some(ViewAction::Exit));
        assert_eq!(input.key_pressed(KeyCode::Character('q')), None);
        assert_eq!(input.wheel(0.0), None);
        assert_eq!(input.wheel(-2.0), Some(ViewAction::Zoom { toward: false }));
    }

    #[test]
    fn orbit_keeps_the_target() {
        let mut engine = engine();
        let action = ViewAction::Orbit {
            direction: Vector3D::new(1.0, 0.0, 0.0),
            angle: 0.3,
        };
        apply(&mut engine, action).unwrap();
        assert_eq!(engine.look_at_position(), Vector3D::ZERO);
        let distance = engine.camera_position().length();
        assert!((distance - Vector3D::new(0.0, 2.0, 10.0).length()).abs() < 1e-4);
    }

    #[test]
    fn arrow_pans_camera_and_target() {
        let mut engine = engine();
        let input = InputState::new();
        let action = input.key_pressed(KeyCode::Right).unwrap();
        apply(&mut engine, action).unwrap();
        assert!(engine
            .camera_position()
            .approx_eq(Vector3D::new(0.2, 2.0, 10.0), 1e-5));
        assert!(engine
            .look_at_position()
            .approx_eq(Vector3D::new(0.2, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn zoom_steps_along_view_direction() {
        let mut engine = engine();
        let before = engine.camera_position().length();
        apply(&mut engine, ViewAction::Zoom { toward: true }).unwrap();
        assert!((engine.camera_position().length() - (before - 1.0)).abs() < 1e-4);
        apply(&mut engine, ViewAction::Zoom { toward: false }).unwrap();
        assert!((engine.camera_position().length() - before).abs() < 1e-4);
    }

    #[test]
    fn zoom_stops_at_the_target() {
        let mut engine = engine();
        engine.set_camera_center(Vector3D::new(0.0, 2.0, 9.5));
        apply(&mut engine, ViewAction::Zoom { toward: true }).unwrap();
        assert_eq!(engine.camera_position(), Vector3D::new(0.0, 2.0, 10.0));
    }

    #[test]
    fn focus_key_centers_the_view_on_objects() {
        let mut engine = engine();
        let input = InputState::new();
        let action = input.key_pressed(KeyCode::Character('f')).unwrap();
        assert_eq!(action, ViewAction::Focus);
        apply(&mut engine, action).unwrap();
        assert_eq!(engine.look_at_position(), Vector3D::ZERO);

        let mut object = crate::object::tests::triangle();
        object.translate(Vector3D::new(-1.0 / 3.0, 5.0 / 3.0, 0.0));
        engine.add(object).unwrap();
        apply(&mut engine, action).unwrap();
        assert!(engine.look_at_position().approx_eq(Vector3D::new(0.0, 2.0, 0.0), 1e-5));
    }

    #[test]
    fn reset_restores_view() {
        let mut engine = engine();
        apply(&mut engine, ViewAction::Zoom { toward: true }).unwrap();
        apply(&mut engine, ViewAction::Reset).unwrap();
        assert_eq!(engine.camera_position(), Vector3D::new(0.0, 2.0, 10.0));
    }
}
