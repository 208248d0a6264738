//! Equirectangular HDR to cubemap capture

use crate::backend::traits::GraphicsBackend;
use crate::backend::types::{SamplerDescriptor, TextureDescriptor, TextureFormat};
use crate::error::{RenderError, RenderResult};
use crate::ibl::{
    render_to_cube, require_program, CaptureGeometry, RenderTarget, ENVIRONMENT_SIZE, SOURCE_UNIT,
};
use crate::resources::{GpuMesh, GpuTexture, HdrImage};
use crate::shader::ShaderProgram;

/// Project `hdr` onto a `ENVIRONMENT_SIZE` cubemap and build its mip chain.
///
/// The uploaded equirectangular texture only lives for the duration of the
/// pass and is released on every path.
pub fn capture<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    target: &mut RenderTarget,
    program: &ShaderProgram,
    geometry: &CaptureGeometry,
    cube_mesh: &GpuMesh,
    hdr: Option<&HdrImage>,
) -> RenderResult<GpuTexture> {
    let hdr = hdr
        .filter(|image| !image.is_empty())
        .ok_or_else(|| RenderError::resource_missing("HDR source image"))?;
    require_program(program)?;

    let source = GpuTexture::from_hdr(backend, hdr)?;
    let result = capture_from(backend, target, program, geometry, cube_mesh, &source);
    backend.bind_texture(SOURCE_UNIT, None);
    source.release(backend);
    result
}

fn capture_from<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    target: &mut RenderTarget,
    program: &ShaderProgram,
    geometry: &CaptureGeometry,
    cube_mesh: &GpuMesh,
    source: &GpuTexture,
) -> RenderResult<GpuTexture> {
    let desc = TextureDescriptor::cube(
        "environment",
        ENVIRONMENT_SIZE,
        TextureDescriptor::full_mip_count(ENVIRONMENT_SIZE, ENVIRONMENT_SIZE),
        TextureFormat::Rgba16Float,
    )
    .with_sampler(SamplerDescriptor::trilinear());
    let environment = GpuTexture::create(backend, desc)?;

    target.begin(backend);
    if let Err(e) = target.resize(backend, ENVIRONMENT_SIZE, ENVIRONMENT_SIZE) {
        target.end(backend);
        environment.release(backend);
        return Err(e);
    }
    program.use_program(backend);
    program.set_sampler(backend, "equirectangular_map", SOURCE_UNIT);
    backend.bind_texture(SOURCE_UNIT, Some(source.handle()));
    let drawn = render_to_cube(backend, target, program, geometry, &environment, 0, |b| {
        cube_mesh.draw(b)
    });
    target.end(backend);

    if drawn < 6 {
        log::warn!("Environment capture drew {}/6 faces", drawn);
    }
    if let Err(e) = backend.generate_mipmaps(environment.handle()) {
        environment.release(backend);
        return Err(e.into());
    }
    log::info!(
        "Captured environment cubemap {}x{} from '{}'",
        ENVIRONMENT_SIZE,
        ENVIRONMENT_SIZE,
        source.name()
    );
    Ok(environment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ProgramKind, SoftwareBackend, SoftwareConfig};
    use crate::resources::MeshData;
    use crate::shader::ShaderLibrary;

    #[test]
    fn test_missing_source_leaks_nothing() {
        let mut backend = SoftwareBackend::new(SoftwareConfig::preview());
        let program = ShaderLibrary::builtin().compile(&mut backend, ProgramKind::EquirectToCubemap);
        let mesh = GpuMesh::create(&mut backend, &MeshData::cube()).unwrap();
        let mut target = RenderTarget::new(&mut backend, 4, 4).unwrap();
        let before = backend.live_resources();

        let err = capture(
            &mut backend,
            &mut target,
            &program,
            &CaptureGeometry::new(),
            &mesh,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::ResourceMissing(_)));

        let empty = HdrImage::from_rgb(0, 0, Vec::new(), "empty");
        assert!(capture(
            &mut backend,
            &mut target,
            &program,
            &CaptureGeometry::new(),
            &mesh,
            Some(&empty),
        )
        .is_err());
        assert_eq!(backend.live_resources(), before);
    }
}
