//! Mesh data structures and generation

use crate::backend::traits::*;
use crate::backend::types::{MeshDescriptor, Primitive, PrimitiveTopology, Vertex};
use crate::error::RenderResult;
use glam::{Vec2, Vec3};
use std::f32::consts::PI;

/// CPU-side mesh with the shape it was generated from
#[derive(Debug, Clone)]
pub struct MeshData {
    pub name: String,
    pub primitive: Primitive,
    pub topology: PrimitiveTopology,
    pub vertices: Vec<Vertex>,
    pub indices: Option<Vec<u32>>,
}

impl MeshData {
    /// Calculate vertex count
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of elements a draw consumes
    pub fn element_count(&self) -> usize {
        self.indices.as_ref().map_or(self.vertices.len(), Vec::len)
    }

    /// Get vertex data as bytes
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn descriptor(&self) -> MeshDescriptor<'_> {
        MeshDescriptor {
            label: Some(&self.name),
            primitive: self.primitive,
            topology: self.topology,
            vertices: &self.vertices,
            indices: self.indices.as_deref(),
        }
    }

    /// The `[-1, 1]` cube used for cubemap capture and the skybox, as 36 unindexed vertices
    pub fn cube() -> Self {
        // (normal, u axis, v axis) per face
        let faces = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        ];
        let corners = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(0.0, 0.0),
        ];

        let mut vertices = Vec::with_capacity(36);
        for (normal, u_axis, v_axis) in faces {
            for uv in corners {
                let st = uv * 2.0 - Vec2::ONE;
                let position = normal + u_axis * st.x + v_axis * st.y;
                vertices.push(Vertex::new(position, normal, uv));
            }
        }

        Self {
            name: "cube".to_string(),
            primitive: Primitive::Cube,
            topology: PrimitiveTopology::TriangleList,
            vertices,
            indices: None,
        }
    }

    /// Full-screen quad in normalized device coordinates, as a 4-vertex strip
    pub fn quad() -> Self {
        let vertices = [
            (Vec2::new(-1.0, 1.0), Vec2::new(0.0, 1.0)),
            (Vec2::new(-1.0, -1.0), Vec2::new(0.0, 0.0)),
            (Vec2::new(1.0, 1.0), Vec2::new(1.0, 1.0)),
            (Vec2::new(1.0, -1.0), Vec2::new(1.0, 0.0)),
        ]
        .into_iter()
        .map(|(p, uv)| Vertex::new(p.extend(0.0), Vec3::Z, uv))
        .collect();

        Self {
            name: "quad".to_string(),
            primitive: Primitive::Quad,
            topology: PrimitiveTopology::TriangleStrip,
            vertices,
            indices: None,
        }
    }

    /// Unit UV sphere as a single zig-zag triangle strip.
    ///
    /// `uv = (tx, ty)` with `tx` running around the Y axis and `ty` from the
    /// north pole (0) to the south pole (1).
    pub fn sphere(segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut vertices = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);
        for j in 0..=rings {
            for i in 0..=segments {
                let tx = i as f32 / segments as f32;
                let ty = j as f32 / rings as f32;
                let position = Vec3::new(
                    (tx * 2.0 * PI).cos() * (ty * PI).sin(),
                    (ty * PI).cos(),
                    (tx * 2.0 * PI).sin() * (ty * PI).sin(),
                );
                vertices.push(Vertex::new(position, position, Vec2::new(tx, ty)));
            }
        }

        let row = segments + 1;
        let mut indices = Vec::with_capacity((rings * row * 2) as usize);
        for j in 0..rings {
            if j % 2 == 0 {
                for i in 0..=segments {
                    indices.push(j * row + i);
                    indices.push((j + 1) * row + i);
                }
            } else {
                for i in (0..=segments).rev() {
                    indices.push((j + 1) * row + i);
                    indices.push(j * row + i);
                }
            }
        }

        Self {
            name: "sphere".to_string(),
            primitive: Primitive::Sphere,
            topology: PrimitiveTopology::TriangleStrip,
            vertices,
            indices: Some(indices),
        }
    }
}

/// A mesh uploaded to the backend
#[derive(Debug)]
pub struct GpuMesh {
    handle: MeshHandle,
    primitive: Primitive,
}

impl GpuMesh {
    pub fn create<B: GraphicsBackend + ?Sized>(backend: &mut B, data: &MeshData) -> RenderResult<Self> {
        let handle = backend.create_mesh(&data.descriptor())?;
        Ok(Self {
            handle,
            primitive: data.primitive,
        })
    }

    pub fn handle(&self) -> MeshHandle {
        self.handle
    }

    pub fn primitive(&self) -> Primitive {
        self.primitive
    }

    pub fn draw<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) -> RenderResult<()> {
        Ok(backend.draw_mesh(self.handle)?)
    }

    pub fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        backend.destroy_mesh(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_spans_unit_box() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertex_count(), 36);
        for v in &cube.vertices {
            assert!(v.position.abs().max_element() == 1.0);
            // Every vertex lies on the face its normal names
            assert_eq!(v.position.dot(v.normal), 1.0);
        }
    }

    #[test]
    fn test_quad_uv_matches_position() {
        for v in MeshData::quad().vertices {
            let expected = v.position.truncate() * 0.5 + Vec2::splat(0.5);
            assert_eq!(v.uv, expected);
        }
    }

    #[test]
    fn test_sphere_strip() {
        let sphere = MeshData::sphere(64, 64);
        assert_eq!(sphere.vertex_count(), 65 * 65);
        assert_eq!(sphere.element_count(), 64 * 65 * 2);
        let max_index = *sphere.indices.as_ref().unwrap().iter().max().unwrap();
        assert_eq!(max_index as usize, sphere.vertex_count() - 1);
        for v in &sphere.vertices {
            assert!((v.position.length() - 1.0).abs() < 1e-5);
        }
        // North pole first
        assert!(sphere.vertices[0].position.abs_diff_eq(Vec3::Y, 1e-6));
    }
}
