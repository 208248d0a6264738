//! Point lights fed to the PBR pass

use glam::Vec3;

/// Lights the PBR program has uniform slots for
pub const MAX_LIGHTS: usize = 4;

const LIGHT_UNIFORMS: [(&str, &str); MAX_LIGHTS] = [
    ("lights[0].position", "lights[0].color"),
    ("lights[1].position", "lights[1].color"),
    ("lights[2].position", "lights[2].color"),
    ("lights[3].position", "lights[3].color"),
];

/// Unattenuated colour at a position; falls off with the inverse square
/// distance in the shader.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
}

impl PointLight {
    pub fn new(position: Vec3, color: Vec3) -> Self {
        Self { position, color }
    }

    /// `(position, color)` uniform names of slot `index`
    pub fn uniform_names(index: usize) -> Option<(&'static str, &'static str)> {
        LIGHT_UNIFORMS.get(index).copied()
    }
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::splat(300.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ProgramKind;

    #[test]
    fn test_every_slot_is_a_pbr_uniform() {
        for index in 0..MAX_LIGHTS {
            let (position, color) = PointLight::uniform_names(index).unwrap();
            assert!(ProgramKind::Pbr.uniform(position).is_some());
            assert!(ProgramKind::Pbr.uniform(color).is_some());
        }
        assert!(PointLight::uniform_names(MAX_LIGHTS).is_none());
    }
}
