//! Diffuse irradiance convolution

use crate::backend::traits::GraphicsBackend;
use crate::backend::types::{TextureDescriptor, TextureFormat};
use crate::error::{RenderError, RenderResult};
use crate::ibl::{
    render_to_cube, require_program, CaptureGeometry, RenderTarget, IRRADIANCE_SIZE, SOURCE_UNIT,
};
use crate::resources::{GpuMesh, GpuTexture};
use crate::shader::ShaderProgram;

/// Convolve the environment over the hemisphere into a small cubemap.
///
/// An absent environment is a missing resource: nothing is created.
pub fn convolve<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    target: &mut RenderTarget,
    program: &ShaderProgram,
    geometry: &CaptureGeometry,
    cube_mesh: &GpuMesh,
    environment: Option<&GpuTexture>,
) -> RenderResult<GpuTexture> {
    let environment = environment
        .filter(|env| env.is_cube())
        .ok_or_else(|| RenderError::resource_missing("environment cubemap for irradiance"))?;
    require_program(program)?;
    if !environment.has_full_mip_chain() {
        log::warn!(
            "{}",
            RenderError::configuration(format!(
                "environment '{}' has {} of {} mips, convolving from what is there",
                environment.name(),
                environment.mip_levels(),
                TextureDescriptor::full_mip_count(environment.width(), environment.height())
            ))
        );
    }

    let irradiance = GpuTexture::create(
        backend,
        TextureDescriptor::cube("irradiance", IRRADIANCE_SIZE, 1, TextureFormat::Rgba16Float),
    )?;

    target.begin(backend);
    if let Err(e) = target.resize(backend, IRRADIANCE_SIZE, IRRADIANCE_SIZE) {
        target.end(backend);
        irradiance.release(backend);
        return Err(e);
    }
    program.use_program(backend);
    program.set_sampler(backend, "environment_map", SOURCE_UNIT);
    backend.bind_texture(SOURCE_UNIT, Some(environment.handle()));
    let drawn = render_to_cube(backend, target, program, geometry, &irradiance, 0, |b| {
        cube_mesh.draw(b)
    });
    backend.bind_texture(SOURCE_UNIT, None);
    target.end(backend);

    log::info!(
        "Convolved irradiance cubemap {}x{} ({} faces)",
        IRRADIANCE_SIZE,
        IRRADIANCE_SIZE,
        drawn
    );
    Ok(irradiance)
}
