//! Camera controller system
//!
//! Maps per-frame input state onto the fly camera's move, rotate and zoom
//! operations.

use glam::Vec2;

use super::{Camera, CameraMovement};

/// Input state for camera controllers
#[derive(Debug, Clone, Default)]
pub struct CameraInput {
    /// Movement keys (WASD)
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,

    /// Mouse delta since last frame (in pixels), `+y` looks up
    pub mouse_delta: Vec2,

    /// Mouse scroll delta (positive = scroll up)
    pub scroll_delta: f32,

    /// Whether mouse look is active (e.g., right mouse button held)
    pub mouse_look_active: bool,
}

impl CameraInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset per-frame deltas (call after update)
    pub fn reset_deltas(&mut self) {
        self.mouse_delta = Vec2::ZERO;
        self.scroll_delta = 0.0;
    }
}

/// Abstract camera controller trait
pub trait CameraController {
    /// Update the camera based on input and delta time
    fn update(&mut self, camera: &mut Camera, input: &CameraInput, dt: f32);

    /// Get the controller name for debugging
    fn name(&self) -> &'static str;
}

/// Free-fly camera controller (FPS-style)
///
/// - WASD: Move forward/backward/left/right
/// - Mouse: Look around (when mouse_look_active)
/// - Scroll: Zoom
#[derive(Debug, Clone, Default)]
pub struct FreeFlyController {
    /// Invert vertical mouse look
    pub invert_y: bool,
}

impl FreeFlyController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inverted_y(mut self) -> Self {
        self.invert_y = true;
        self
    }
}

impl CameraController for FreeFlyController {
    fn update(&mut self, camera: &mut Camera, input: &CameraInput, dt: f32) {
        if input.scroll_delta != 0.0 {
            camera.zoom(input.scroll_delta);
        }

        if input.mouse_look_active && input.mouse_delta != Vec2::ZERO {
            let dy = if self.invert_y {
                -input.mouse_delta.y
            } else {
                input.mouse_delta.y
            };
            camera.rotate(input.mouse_delta.x, dy);
        }

        let moves = [
            (input.forward, CameraMovement::Forward),
            (input.backward, CameraMovement::Backward),
            (input.left, CameraMovement::Left),
            (input.right, CameraMovement::Right),
        ];
        for (pressed, direction) in moves {
            if pressed {
                camera.move_by(direction, dt);
            }
        }
    }

    fn name(&self) -> &'static str {
        "FreeFly"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_freefly_forward() {
        let mut camera = Camera::new(Vec3::ZERO);
        let mut controller = FreeFlyController::new();
        let input = CameraInput {
            forward: true,
            ..Default::default()
        };
        controller.update(&mut camera, &input, 1.0);
        assert!(camera.position.z < -1.9);
    }

    #[test]
    fn test_freefly_ignores_mouse_without_look() {
        let mut camera = Camera::default();
        let mut controller = FreeFlyController::new();
        let mut input = CameraInput {
            mouse_delta: Vec2::new(100.0, 40.0),
            ..Default::default()
        };
        controller.update(&mut camera, &input, 0.016);
        assert_eq!(camera.yaw, -90.0);

        input.mouse_look_active = true;
        controller.update(&mut camera, &input, 0.016);
        assert!((camera.yaw - -85.0).abs() < 1e-4);
        assert!((camera.pitch - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_scroll_zooms() {
        let mut camera = Camera::default();
        let mut input = CameraInput::new();
        input.scroll_delta = 5.0;
        FreeFlyController::new().update(&mut camera, &input, 0.0);
        assert_eq!(camera.fov, 40.0);
        input.reset_deltas();
        assert_eq!(input.scroll_delta, 0.0);
    }
}
