//! Split-sum BRDF integration lookup table

use glam::Vec4;

use crate::backend::traits::GraphicsBackend;
use crate::backend::types::{ClearFlags, TextureDescriptor, TextureFormat};
use crate::error::RenderResult;
use crate::ibl::{require_program, RenderTarget, BRDF_LUT_SIZE};
use crate::resources::{GpuMesh, GpuTexture};
use crate::shader::ShaderProgram;

/// Render the scale (R) and bias (G) terms into a 2D lookup table.
///
/// `u` is `n·v`, `v` is roughness. The result does not depend on the
/// environment.
pub fn integrate<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    target: &mut RenderTarget,
    program: &ShaderProgram,
    quad_mesh: &GpuMesh,
) -> RenderResult<GpuTexture> {
    require_program(program)?;
    let lut = GpuTexture::create(
        backend,
        TextureDescriptor::texture_2d("brdf_lut", BRDF_LUT_SIZE, BRDF_LUT_SIZE, TextureFormat::Rg16Float),
    )?;

    target.begin(backend);
    let drawn = draw_lut(backend, target, program, quad_mesh, &lut);
    target.end(backend);

    match drawn {
        Ok(()) => {
            log::info!("Integrated BRDF LUT {}x{}", BRDF_LUT_SIZE, BRDF_LUT_SIZE);
            Ok(lut)
        }
        Err(e) => {
            lut.release(backend);
            Err(e)
        }
    }
}

fn draw_lut<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    target: &mut RenderTarget,
    program: &ShaderProgram,
    quad_mesh: &GpuMesh,
    lut: &GpuTexture,
) -> RenderResult<()> {
    target.resize(backend, BRDF_LUT_SIZE, BRDF_LUT_SIZE)?;
    target.attach(backend, lut, None, 0)?;
    backend.clear(Vec4::ZERO, ClearFlags::ALL)?;
    program.use_program(backend);
    quad_mesh.draw(backend)
}
