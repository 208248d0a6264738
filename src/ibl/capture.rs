//! Cube face capture geometry and the per-face render loop

use glam::{Mat4, Vec3};

use crate::backend::traits::GraphicsBackend;
use crate::backend::types::{ClearFlags, CubeFace};
use crate::error::RenderResult;
use crate::ibl::RenderTarget;
use crate::resources::GpuTexture;
use crate::shader::ShaderProgram;

/// Fixed projection and the six face views used by every cube pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureGeometry {
    projection: Mat4,
    views: [Mat4; 6],
}

impl CaptureGeometry {
    pub const FOV_DEGREES: f32 = 90.0;
    pub const NEAR: f32 = 0.1;
    pub const FAR: f32 = 10.0;

    pub fn new() -> Self {
        let projection =
            Mat4::perspective_rh_gl(Self::FOV_DEGREES.to_radians(), 1.0, Self::NEAR, Self::FAR);
        let views = CubeFace::ALL.map(|face| Mat4::look_at_rh(Vec3::ZERO, face.forward(), face.up()));
        Self { projection, views }
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    /// Views in `CubeFace::ALL` order
    pub fn views(&self) -> &[Mat4; 6] {
        &self.views
    }

    pub fn view(&self, face: CubeFace) -> Mat4 {
        self.views[face.index()]
    }
}

impl Default for CaptureGeometry {
    fn default() -> Self {
        Self::new()
    }
}

/// Render every face of `cube` at `mip`, in `CubeFace::ALL` order.
///
/// The program must already be in use with its inputs bound. For each face
/// the `view` uniform is set, the face is attached to `target`, colour and
/// depth are cleared and `draw` is invoked. A face that cannot be attached
/// is skipped. Returns the number of faces drawn.
pub fn render_to_cube<B, F>(
    backend: &mut B,
    target: &RenderTarget,
    program: &ShaderProgram,
    geometry: &CaptureGeometry,
    cube: &GpuTexture,
    mip: u32,
    mut draw: F,
) -> usize
where
    B: GraphicsBackend + ?Sized,
    F: FnMut(&mut B) -> RenderResult<()>,
{
    program.set_mat4(backend, "projection", geometry.projection());
    let mut drawn = 0;
    for face in CubeFace::ALL {
        program.set_mat4(backend, "view", geometry.view(face));
        if target.attach(backend, cube, Some(face), mip).is_err() {
            continue;
        }
        if let Err(e) = backend.clear(glam::Vec4::ZERO, ClearFlags::ALL) {
            log::warn!("Clearing face {} failed: {}", face.label(), e);
            continue;
        }
        match draw(backend) {
            Ok(()) => drawn += 1,
            Err(e) => log::error!("Drawing face {} of '{}' failed: {}", face.label(), cube.name(), e),
        }
    }
    log::trace!("Rendered {}/6 faces of '{}' mip {}", drawn, cube.name(), mip);
    drawn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::*;
    use crate::resources::{GpuMesh, MeshData};
    use crate::shader::ShaderLibrary;

    #[test]
    fn test_views_are_orthonormal_and_right_handed() {
        let geometry = CaptureGeometry::new();
        for face in CubeFace::ALL {
            let view = geometry.view(face);
            // Rows of the rotation part are the camera basis
            let right = view.row(0).truncate();
            let up = view.row(1).truncate();
            let back = view.row(2).truncate();
            assert!((right.length() - 1.0).abs() < 1e-6);
            assert!((up.length() - 1.0).abs() < 1e-6);
            assert!(back.abs_diff_eq(-face.forward(), 1e-6));
            assert!(right.cross(up).abs_diff_eq(back, 1e-6));
            assert!(face.up().cross(face.forward()).abs_diff_eq(face.right(), 1e-6));
        }
    }

    #[test]
    fn test_faces_drawn_in_fixed_order() {
        let mut backend = SoftwareBackend::new(SoftwareConfig::preview());
        let library = ShaderLibrary::builtin();
        let program = library.compile(&mut backend, ProgramKind::IrradianceConvolution);
        let cube_mesh = GpuMesh::create(&mut backend, &MeshData::cube()).unwrap();
        let target = RenderTarget::new(&mut backend, 4, 4).unwrap();
        let cube = GpuTexture::create(
            &mut backend,
            TextureDescriptor::cube("out", 4, 1, TextureFormat::Rgba16Float),
        )
        .unwrap();
        backend.take_events();

        target.begin(&mut backend);
        program.use_program(&mut backend);
        let drawn = render_to_cube(
            &mut backend,
            &target,
            &program,
            &CaptureGeometry::new(),
            &cube,
            0,
            |b| cube_mesh.draw(b),
        );
        target.end(&mut backend);
        assert_eq!(drawn, 6);

        let faces: Vec<CubeFace> = backend
            .take_events()
            .into_iter()
            .filter_map(|e| match e {
                BackendEvent::AttachColor { face, .. } => face,
                _ => None,
            })
            .collect();
        assert_eq!(faces, CubeFace::ALL.to_vec());

        // Mip 2 does not exist: every face is skipped without a draw
        let drawn = render_to_cube(
            &mut backend,
            &target,
            &program,
            &CaptureGeometry::new(),
            &cube,
            2,
            |b| cube_mesh.draw(b),
        );
        assert_eq!(drawn, 0);
        assert!(!backend
            .take_events()
            .iter()
            .any(|e| matches!(e, BackendEvent::Draw { .. })));
    }
}
