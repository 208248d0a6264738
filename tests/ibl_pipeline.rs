//! Integration tests for the IBL precompute chain.
//!
//! Cases parameterised over backends run on the software backend always and
//! on wgpu when built with `wgpu-backend` and an adapter is present.
//!
//! ```bash
//! cargo test --test ibl_pipeline
//! cargo test --test ibl_pipeline --features wgpu-backend
//! ```

mod common;

use glam::{Vec3, Vec4};
use rstest::rstest;

use common::{gradient_source, max_relative_error, software, uniform_source, Backend};
use pbr_ibl::backend::{
    BackendEvent, CubeFace, GraphicsBackend, ProgramKind, TextureDescriptor, TextureFormat,
    UniformValue,
};
use pbr_ibl::ibl::{
    irradiance, CaptureGeometry, IblPipeline, IblState, RenderTarget, BRDF_LUT_SIZE,
    ENVIRONMENT_SIZE, IRRADIANCE_SIZE, PREFILTER_MIP_LEVELS, PREFILTER_SIZE,
};
use pbr_ibl::resources::{GpuMesh, GpuTexture, MeshData};
use pbr_ibl::shader::ShaderLibrary;
use pbr_ibl::RenderError;

fn pipeline(backend: &mut dyn GraphicsBackend) -> IblPipeline {
    IblPipeline::new(backend, &ShaderLibrary::builtin()).unwrap()
}

// ============================================================================
// Output correctness
// ============================================================================

/// A constant environment stays constant through every stage.
#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_uniform_environment_is_preserved(#[case] backend: Backend) {
    let Some(mut device) = backend.create() else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let radiance = Vec3::new(0.5, 1.0, 2.0);
    let tolerance = backend.tolerance();

    let mut ibl = pipeline(device.as_mut());
    ibl.set_source_image(device.as_mut(), uniform_source(radiance))
        .unwrap();
    assert_eq!(ibl.state(), IblState::Ready);
    assert!(!ibl.is_halted());

    let resources = ibl.resources();
    assert!(resources.is_complete());

    let environment = resources.environment.as_ref().unwrap();
    assert_eq!(environment.width(), ENVIRONMENT_SIZE);
    assert_eq!(environment.mip_levels(), 10);
    for face in CubeFace::ALL {
        let texels = environment.read(device.as_mut(), Some(face), 0).unwrap();
        let err = max_relative_error(&texels, radiance);
        assert!(err < tolerance, "environment {} off by {}", face.label(), err);
    }
    let last_mip = environment.read(device.as_mut(), Some(CubeFace::PositiveY), 9).unwrap();
    assert!(max_relative_error(&last_mip, radiance) < tolerance);

    let irradiance = resources.irradiance.as_ref().unwrap();
    assert_eq!(irradiance.width(), IRRADIANCE_SIZE);
    for face in CubeFace::ALL {
        let texels = irradiance.read(device.as_mut(), Some(face), 0).unwrap();
        let err = max_relative_error(&texels, radiance);
        assert!(err < tolerance, "irradiance {} off by {}", face.label(), err);
    }

    let prefilter = resources.prefilter.as_ref().unwrap();
    assert_eq!(prefilter.width(), PREFILTER_SIZE);
    assert_eq!(prefilter.mip_levels(), PREFILTER_MIP_LEVELS);
    for mip in [0, PREFILTER_MIP_LEVELS - 1] {
        let texels = prefilter.read(device.as_mut(), Some(CubeFace::NegativeZ), mip).unwrap();
        assert_eq!(texels.len() as u32, (PREFILTER_SIZE >> mip).pow(2));
        let err = max_relative_error(&texels, radiance);
        assert!(err < tolerance, "prefilter mip {} off by {}", mip, err);
    }

    ibl.release(device.as_mut());
    assert_eq!(device.live_resources().total(), 0);
}

/// Mean of the 1x1 tail mip of each environment face
fn face_means(device: &mut dyn GraphicsBackend, environment: &GpuTexture) -> Vec<f32> {
    let last = environment.mip_levels() - 1;
    CubeFace::ALL
        .iter()
        .map(|face| {
            let texels = environment.read(device, Some(*face), last).unwrap();
            texels[0].x
        })
        .collect()
}

fn luminance_range(texels: &[Vec4]) -> f32 {
    let (lo, hi) = texels
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), t| (lo.min(t.x), hi.max(t.x)));
    hi - lo
}

/// The ramp's bright end lands on +Z and its dark end on -Z.
#[test]
fn test_capture_orients_faces() {
    let mut backend = software();
    let mut ibl = pipeline(&mut backend);
    ibl.set_source_image(&mut backend, gradient_source(16, 8))
        .unwrap();

    let environment = ibl.resources().environment.as_ref().unwrap();
    let means = face_means(&mut backend, environment);
    let mean = |face: CubeFace| means[face.index()];

    for face in [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::NegativeZ,
    ] {
        assert!(
            mean(CubeFace::PositiveZ) > mean(face) + 0.5,
            "+Z not brightest: {:?}",
            means
        );
    }
    for face in [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
    ] {
        assert!(
            mean(CubeFace::NegativeZ) < mean(face) - 0.5,
            "-Z not darkest: {:?}",
            means
        );
        assert!((mean(face) - 2.1).abs() < 0.3, "side face {:?}: {:?}", face, means);
    }
    ibl.release(&mut backend);
}

/// Higher roughness mips spread the same light over a wider lobe.
#[test]
fn test_prefilter_blurs_with_roughness() {
    let mut backend = software();
    let mut ibl = pipeline(&mut backend);
    ibl.set_source_image(&mut backend, gradient_source(16, 8))
        .unwrap();

    let prefilter = ibl.resources().prefilter.as_ref().unwrap();
    let ranges: Vec<f32> = (0..PREFILTER_MIP_LEVELS)
        .map(|mip| {
            let texels = prefilter
                .read(&mut backend, Some(CubeFace::PositiveZ), mip)
                .unwrap();
            luminance_range(&texels)
        })
        .collect();

    assert!(ranges[0] > 0.5, "sharpest mip is flat: {:?}", ranges);
    assert!(
        ranges[PREFILTER_MIP_LEVELS as usize - 1] < ranges[0] - 0.3,
        "roughest mip not blurred: {:?}",
        ranges
    );
    for pair in ranges.windows(2) {
        assert!(pair[1] <= pair[0] + 0.1, "blur regressed: {:?}", ranges);
    }
    ibl.release(&mut backend);
}

/// The LUT depends on the BRDF only, never on the environment.
#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_brdf_lut_is_source_independent(#[case] backend: Backend) {
    let Some(mut device) = backend.create() else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let mut ibl = pipeline(device.as_mut());

    ibl.set_source_image(device.as_mut(), uniform_source(Vec3::ONE))
        .unwrap();
    let lut = ibl.resources().brdf_lut.as_ref().unwrap();
    assert_eq!((lut.width(), lut.height()), (BRDF_LUT_SIZE, BRDF_LUT_SIZE));
    let first = lut.read(device.as_mut(), None, 0).unwrap();

    ibl.set_source_image(device.as_mut(), gradient_source(16, 8))
        .unwrap();
    let second = ibl
        .resources()
        .brdf_lut
        .as_ref()
        .unwrap()
        .read(device.as_mut(), None, 0)
        .unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert!((*a - *b).abs().max_element() <= backend.tolerance());
    }
    for texel in &first {
        assert!(texel.x.is_finite() && texel.y.is_finite());
        assert!(texel.x >= -1e-3 && texel.y >= -1e-3);
        assert_eq!(texel.z, 0.0);
    }

    ibl.release(device.as_mut());
}

/// Rebuilding replaces every output without leaking the old ones.
#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_rebuild_releases_previous_outputs(#[case] backend: Backend) {
    let Some(mut device) = backend.create() else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let mut ibl = pipeline(device.as_mut());

    ibl.set_source_image(device.as_mut(), uniform_source(Vec3::ONE))
        .unwrap();
    let live = device.live_resources();
    let first = ibl.resources().environment.as_ref().unwrap().handle();

    ibl.set_source_image(device.as_mut(), uniform_source(Vec3::splat(2.0)))
        .unwrap();
    assert_eq!(device.live_resources(), live);
    let second = ibl.resources().environment.as_ref().unwrap().handle();
    assert_ne!(first, second);

    ibl.teardown(device.as_mut());
    assert_eq!(ibl.state(), IblState::Empty);
    assert_eq!(device.live_resources().textures, live.textures - 4);

    ibl.release(device.as_mut());
    assert_eq!(device.live_resources().total(), 0);
}

// ============================================================================
// Failure handling
// ============================================================================

/// An unreadable source halts in capture and leaves nothing behind.
#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_missing_source_halts_capture(#[case] backend: Backend) {
    let Some(mut device) = backend.create() else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let mut ibl = pipeline(device.as_mut());
    let live = device.live_resources();

    let err = ibl
        .set_source(device.as_mut(), "does/not/exist.hdr")
        .unwrap_err();
    assert!(matches!(err, RenderError::ResourceMissing(_)));
    assert_eq!(ibl.state(), IblState::Capturing);
    assert!(ibl.is_halted());
    assert!(matches!(
        ibl.halted_error(),
        Some(RenderError::ResourceMissing(_))
    ));
    assert_eq!(ibl.resources().count(), 0);
    assert_eq!(device.live_resources(), live);
    assert!(!ibl.step(device.as_mut()));

    // A good source afterwards recovers
    ibl.set_source_image(device.as_mut(), uniform_source(Vec3::ONE))
        .unwrap();
    assert_eq!(ibl.state(), IblState::Ready);
    ibl.release(device.as_mut());
}

#[test]
fn test_convolve_without_environment() {
    let mut backend = software();
    let library = ShaderLibrary::builtin();
    let program = library.compile(&mut backend, ProgramKind::IrradianceConvolution);
    let cube = GpuMesh::create(&mut backend, &MeshData::cube()).unwrap();
    let mut target = RenderTarget::new(&mut backend, 32, 32).unwrap();
    let live = backend.live_resources();

    let err = irradiance::convolve(
        &mut backend,
        &mut target,
        &program,
        &CaptureGeometry::new(),
        &cube,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, RenderError::ResourceMissing(_)));
    assert_eq!(backend.live_resources(), live);
    assert!(backend
        .take_events()
        .iter()
        .all(|e| !matches!(e, BackendEvent::Draw { .. })));

    target.release(&mut backend);
    cube.release(&mut backend);
    program.release(&mut backend);
}

#[test]
fn test_convolve_accepts_partial_mip_chain() {
    let mut backend = software();
    let library = ShaderLibrary::builtin();
    let program = library.compile(&mut backend, ProgramKind::IrradianceConvolution);
    let cube = GpuMesh::create(&mut backend, &MeshData::cube()).unwrap();
    let mut target = RenderTarget::new(&mut backend, 32, 32).unwrap();

    let radiance = Vec3::new(0.25, 0.5, 1.0);
    let environment = GpuTexture::create(
        &mut backend,
        TextureDescriptor::cube("single mip", 8, 1, TextureFormat::Rgba16Float),
    )
    .unwrap();
    assert!(!environment.has_full_mip_chain());
    for face in CubeFace::ALL {
        backend
            .write_texture(environment.handle(), Some(face), &[radiance.extend(1.0); 64])
            .unwrap();
    }

    let irradiance = irradiance::convolve(
        &mut backend,
        &mut target,
        &program,
        &CaptureGeometry::new(),
        &cube,
        Some(&environment),
    )
    .unwrap();
    let texels = irradiance.read(&mut backend, Some(CubeFace::PositiveY), 0).unwrap();
    assert!(max_relative_error(&texels, radiance) < 1e-3);

    irradiance.release(&mut backend);
    environment.release(&mut backend);
    target.release(&mut backend);
    cube.release(&mut backend);
    program.release(&mut backend);
    assert_eq!(backend.live_resources().total(), 0);
}

#[test]
fn test_invalid_program_halts_its_stage() {
    let mut backend = software();
    let library = ShaderLibrary::builtin().with_source(ProgramKind::SpecularPrefilter, "fn broken(");
    let mut ibl = IblPipeline::new(&mut backend, &library).unwrap();

    let err = ibl
        .set_source_image(&mut backend, uniform_source(Vec3::ONE))
        .unwrap_err();
    assert!(matches!(err, RenderError::Driver(_)));
    assert_eq!(ibl.state(), IblState::Prefiltering);
    let resources = ibl.resources();
    assert!(resources.environment.is_some());
    assert!(resources.irradiance.is_some());
    assert!(resources.prefilter.is_none());
    assert!(resources.brdf_lut.is_none());

    ibl.release(&mut backend);
    assert_eq!(backend.live_resources().total(), 0);
}

// ============================================================================
// Stage ordering
// ============================================================================

#[test]
fn test_steps_advance_one_stage_each() {
    let mut backend = software();
    let mut ibl = pipeline(&mut backend);
    assert!(!ibl.step(&mut backend));

    ibl.begin(
        &mut backend,
        pbr_ibl::ibl::IblSource::Image(uniform_source(Vec3::ONE)),
    );
    let mut states = vec![ibl.state()];
    while ibl.step(&mut backend) {
        states.push(ibl.state());
    }
    states.push(ibl.state());
    assert_eq!(
        states,
        vec![
            IblState::Capturing,
            IblState::Convolving,
            IblState::Prefiltering,
            IblState::Integrating,
            IblState::Ready,
        ]
    );
    assert_eq!(ibl.resources().count(), 4);

    // The surface state is restored once the chain finishes
    assert_eq!(backend.bound_framebuffer(), None);
    assert_eq!(backend.viewport(), (0, 0, 64, 48));
    assert_eq!(
        backend.depth_compare(),
        pbr_ibl::backend::CompareFunction::Less
    );
    ibl.release(&mut backend);
}

#[test]
fn test_capture_renders_faces_in_order() {
    let mut backend = software();
    let mut ibl = pipeline(&mut backend);
    ibl.set_source_image(&mut backend, uniform_source(Vec3::ONE))
        .unwrap();

    let environment = ibl.resources().environment.as_ref().unwrap().handle();
    let events = backend.take_events();
    let faces: Vec<CubeFace> = events
        .iter()
        .filter_map(|e| match e {
            BackendEvent::AttachColor {
                texture,
                face: Some(face),
                mip: 0,
            } if *texture == environment => Some(*face),
            _ => None,
        })
        .collect();
    assert_eq!(faces, CubeFace::ALL.to_vec());

    let capture_draws = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                BackendEvent::Draw {
                    program: ProgramKind::EquirectToCubemap,
                    ..
                }
            )
        })
        .count();
    assert_eq!(capture_draws, 6);
    assert!(events.contains(&BackendEvent::GenerateMipmaps(environment)));
    ibl.release(&mut backend);
}

#[test]
fn test_prefilter_walks_roughness_mips() {
    let mut backend = software();
    let mut ibl = pipeline(&mut backend);
    backend.take_events();
    ibl.set_source_image(&mut backend, uniform_source(Vec3::ONE))
        .unwrap();

    let prefilter = ibl.resources().prefilter.as_ref().unwrap().handle();
    let events = backend.take_events();

    let mut per_mip = [0usize; PREFILTER_MIP_LEVELS as usize];
    for event in &events {
        if let BackendEvent::AttachColor { texture, mip, .. } = event {
            if *texture == prefilter {
                per_mip[*mip as usize] += 1;
            }
        }
    }
    assert_eq!(per_mip, [6; PREFILTER_MIP_LEVELS as usize]);

    let roughness: Vec<f32> = events
        .iter()
        .filter_map(|e| match e {
            BackendEvent::SetUniform {
                name: "roughness",
                value: UniformValue::Float(r),
            } => Some(*r),
            _ => None,
        })
        .collect();
    assert_eq!(roughness, vec![0.0, 0.25, 0.5, 0.75, 1.0]);

    let sizes: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            BackendEvent::RenderbufferStorage { width, height } => {
                assert_eq!(width, height);
                Some(*width)
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        sizes,
        vec![ENVIRONMENT_SIZE, IRRADIANCE_SIZE, 128, 64, 32, 16, 8, BRDF_LUT_SIZE]
    );
    ibl.release(&mut backend);
}
