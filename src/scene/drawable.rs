//! The closed set of things a scene can draw

use crate::backend::traits::GraphicsBackend;
use crate::backend::types::Primitive;
use crate::error::RenderResult;
use crate::resources::{GpuMesh, MeshData};
use crate::scene::{MaterialId, Transform};

/// Segments and rings of the scene sphere
pub const SPHERE_SEGMENTS: u32 = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Drawable {
    /// Unit sphere shaded by the PBR pass
    Sphere {
        transform: Transform,
        material: Option<MaterialId>,
    },
    /// `[-1, 1]` square in the local XY plane, facing `+Z`, shaded by the PBR pass
    Quad {
        transform: Transform,
        material: Option<MaterialId>,
    },
    /// Environment background, drawn after the lit objects
    Skybox,
}

impl Drawable {
    pub fn sphere(material: Option<MaterialId>) -> Self {
        Drawable::Sphere {
            transform: Transform::default(),
            material,
        }
    }

    pub fn quad(material: Option<MaterialId>) -> Self {
        Drawable::Quad {
            transform: Transform::default(),
            material,
        }
    }

    pub fn with_transform(mut self, value: Transform) -> Self {
        if let Drawable::Sphere { transform, .. } | Drawable::Quad { transform, .. } = &mut self {
            *transform = value;
        }
        self
    }

    pub fn primitive(&self) -> Primitive {
        match self {
            Drawable::Sphere { .. } => Primitive::Sphere,
            Drawable::Quad { .. } => Primitive::Quad,
            Drawable::Skybox => Primitive::Cube,
        }
    }

    /// Whether the PBR pass shades this drawable
    pub fn is_lit(&self) -> bool {
        !matches!(self, Drawable::Skybox)
    }

    pub fn transform(&self) -> Transform {
        match self {
            Drawable::Sphere { transform, .. } | Drawable::Quad { transform, .. } => *transform,
            Drawable::Skybox => Transform::default(),
        }
    }

    pub fn transform_mut(&mut self) -> Option<&mut Transform> {
        match self {
            Drawable::Sphere { transform, .. } | Drawable::Quad { transform, .. } => Some(transform),
            Drawable::Skybox => None,
        }
    }

    pub fn material(&self) -> Option<MaterialId> {
        match self {
            Drawable::Sphere { material, .. } | Drawable::Quad { material, .. } => *material,
            Drawable::Skybox => None,
        }
    }

    pub fn set_material(&mut self, value: Option<MaterialId>) {
        if let Drawable::Sphere { material, .. } | Drawable::Quad { material, .. } = self {
            *material = value;
        }
    }

    /// Draw the shape with whatever program is current
    pub fn draw<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        meshes: &SceneMeshes,
    ) -> RenderResult<()> {
        meshes.mesh(self.primitive()).draw(backend)
    }
}

/// One uploaded mesh per primitive, shared by every drawable
#[derive(Debug)]
pub struct SceneMeshes {
    sphere: GpuMesh,
    quad: GpuMesh,
    cube: GpuMesh,
}

impl SceneMeshes {
    pub fn create<B: GraphicsBackend + ?Sized>(backend: &mut B) -> RenderResult<Self> {
        let sphere = GpuMesh::create(backend, &MeshData::sphere(SPHERE_SEGMENTS, SPHERE_SEGMENTS))?;
        let quad = match GpuMesh::create(backend, &MeshData::quad()) {
            Ok(quad) => quad,
            Err(e) => {
                sphere.release(backend);
                return Err(e);
            }
        };
        let cube = match GpuMesh::create(backend, &MeshData::cube()) {
            Ok(cube) => cube,
            Err(e) => {
                sphere.release(backend);
                quad.release(backend);
                return Err(e);
            }
        };
        Ok(Self { sphere, quad, cube })
    }

    pub fn mesh(&self, primitive: Primitive) -> &GpuMesh {
        match primitive {
            Primitive::Sphere => &self.sphere,
            Primitive::Quad => &self.quad,
            Primitive::Cube => &self.cube,
        }
    }

    pub fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        self.sphere.release(backend);
        self.quad.release(backend);
        self.cube.release(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_skybox_has_no_transform_or_material() {
        let mut sky = Drawable::Skybox.with_transform(Transform::from_position(Vec3::X));
        assert_eq!(sky.transform(), Transform::default());
        sky.set_material(None);
        assert!(sky.material().is_none());
        assert!(!sky.is_lit());
        assert_eq!(sky.primitive(), Primitive::Cube);
    }

    #[test]
    fn test_sphere_builder() {
        let sphere = Drawable::sphere(None).with_transform(Transform::from_position_scale(Vec3::Y, 0.5));
        assert!(sphere.is_lit());
        assert_eq!(sphere.transform().scale, Vec3::splat(0.5));
    }
}
