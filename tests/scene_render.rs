//! Integration tests for scene rendering on top of the IBL outputs.

mod common;

use glam::Vec3;
use rstest::rstest;

use common::{pixel, software, uniform_source, Backend, SURFACE_HEIGHT, SURFACE_WIDTH};
use pbr_ibl::backend::{BackendEvent, CompareFunction, GraphicsBackend, Primitive, ProgramKind};
use pbr_ibl::ibl::IblState;
use pbr_ibl::resources::PbrMaterial;
use pbr_ibl::scene::{Drawable, PointLight, Transform, MAX_LIGHTS};
use pbr_ibl::{RenderError, Scene, SceneConfig};

fn config() -> SceneConfig {
    SceneConfig {
        width: SURFACE_WIDTH,
        height: SURFACE_HEIGHT,
        ..Default::default()
    }
}

fn draws(events: &[BackendEvent], program: ProgramKind) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, BackendEvent::Draw { program: p, .. } if *p == program))
        .count()
}

// ============================================================================
// Frames
// ============================================================================

/// The skybox fills every pixel the lit objects leave uncovered.
#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_skybox_behind_sphere(#[case] backend: Backend) {
    let Some(mut device) = backend.create() else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let mut scene = Scene::new(device.as_mut(), config()).unwrap();
    scene
        .add_cubemap_image(device.as_mut(), uniform_source(Vec3::ONE))
        .unwrap();
    scene.add_object("ball", Drawable::sphere(None));
    scene
        .add_light("key", PointLight::new(Vec3::new(0.0, 0.0, 10.0), Vec3::splat(150.0)))
        .unwrap();

    scene.render(device.as_mut()).unwrap();
    let frame = device.read_surface().unwrap();
    assert_eq!(frame.len() as u32, SURFACE_WIDTH * SURFACE_HEIGHT);

    // Reinhard then gamma of radiance 1.0
    let sky = 0.5f32.powf(1.0 / 2.2);
    let corner = pixel(&frame, SURFACE_WIDTH, 0, 0);
    assert!(
        (corner.truncate() - Vec3::splat(sky)).abs().max_element() < 0.02,
        "corner {:?}",
        corner
    );

    let center = pixel(&frame, SURFACE_WIDTH, SURFACE_WIDTH / 2, SURFACE_HEIGHT / 2);
    assert!(
        (center - corner).abs().max_element() > 0.1,
        "sphere not visible at center: {:?}",
        center
    );

    scene.release(device.as_mut());
    assert_eq!(device.live_resources().total(), 0);
}

/// Without an environment the frame is the clear colour plus lit objects.
#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_frame_without_environment(#[case] backend: Backend) {
    let Some(mut device) = backend.create() else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let scene = Scene::new(device.as_mut(), config()).unwrap();
    assert_eq!(scene.ibl().state(), IblState::Empty);

    scene.render(device.as_mut()).unwrap();
    let frame = device.read_surface().unwrap();
    let clear = scene.config().clear_color;
    for texel in [frame[0], frame[frame.len() - 1]] {
        assert!((texel - clear).abs().max_element() < 0.01, "{:?}", texel);
    }
    scene.release(device.as_mut());
}

#[test]
fn test_render_pass_order() {
    let mut backend = software();
    let mut scene = Scene::new(&mut backend, config()).unwrap();
    scene
        .add_cubemap_image(&mut backend, uniform_source(Vec3::ONE))
        .unwrap();
    scene.add_object("ball", Drawable::sphere(None));
    scene.add_object(
        "floor",
        Drawable::quad(None).with_transform(Transform::from_position(Vec3::new(0.0, -1.0, 0.0))),
    );
    backend.take_events();

    scene.render(&mut backend).unwrap();
    let events = backend.take_events();
    assert_eq!(events[0], BackendEvent::BindFramebuffer(None));

    let draws: Vec<(ProgramKind, Primitive)> = events
        .iter()
        .filter_map(|e| match e {
            BackendEvent::Draw { program, primitive } => Some((*program, *primitive)),
            _ => None,
        })
        .collect();
    assert_eq!(
        draws,
        vec![
            (ProgramKind::Pbr, Primitive::Sphere),
            (ProgramKind::Pbr, Primitive::Quad),
            (ProgramKind::Background, Primitive::Cube),
        ]
    );
    assert_eq!(backend.depth_compare(), CompareFunction::Less);
    scene.release(&mut backend);
}

// ============================================================================
// Degraded operation
// ============================================================================

#[test]
fn test_missing_environment_keeps_rendering() {
    let mut backend = software();
    let mut scene = Scene::new(&mut backend, config()).unwrap();
    scene.add_object("ball", Drawable::sphere(None));

    let err = scene
        .add_cubemap(&mut backend, "does/not/exist.hdr")
        .unwrap_err();
    assert!(matches!(err, RenderError::ResourceMissing(_)));
    assert!(scene.ibl().is_halted());
    assert_eq!(scene.ibl().state(), IblState::Capturing);

    backend.take_events();
    scene.render(&mut backend).unwrap();
    let events = backend.take_events();
    assert_eq!(draws(&events, ProgramKind::Pbr), 1);
    assert_eq!(draws(&events, ProgramKind::Background), 0);
    scene.release(&mut backend);
    assert_eq!(backend.live_resources().total(), 0);
}

#[test]
fn test_broken_pbr_shader_skips_lit_pass() {
    let mut backend = software();
    let mut scene = Scene::new(&mut backend, config()).unwrap();
    scene.add_object("ball", Drawable::sphere(None));
    let programs = backend.live_resources().programs;
    let id = scene.shader_id("pbr").unwrap();

    let replaced = scene.add_shader(&mut backend, "pbr", ProgramKind::Pbr, Some("not wgsl"));
    assert_eq!(replaced, id);
    assert!(!scene.shader("pbr").unwrap().is_valid());
    assert_eq!(backend.live_resources().programs, programs - 1);

    backend.take_events();
    scene.render(&mut backend).unwrap();
    assert_eq!(draws(&backend.take_events(), ProgramKind::Pbr), 0);

    // Registering a working program again restores the pass
    scene.add_shader(&mut backend, "pbr", ProgramKind::Pbr, None);
    scene.render(&mut backend).unwrap();
    assert_eq!(draws(&backend.take_events(), ProgramKind::Pbr), 1);
    scene.release(&mut backend);
}

#[test]
fn test_light_limit() {
    let mut backend = software();
    let mut scene = Scene::new(&mut backend, config()).unwrap();
    for i in 0..MAX_LIGHTS {
        let position = Vec3::new(i as f32, 0.0, 0.0);
        scene
            .add_light(&format!("light{}", i), PointLight::new(position, Vec3::ONE))
            .unwrap();
    }
    let err = scene
        .add_light("extra", PointLight::new(Vec3::ZERO, Vec3::ONE))
        .unwrap_err();
    assert!(matches!(err, RenderError::Configuration(_)));
    assert!(scene.light("extra").is_none());

    // Replacing an existing light is not an addition
    scene
        .add_light("light0", PointLight::new(Vec3::Y, Vec3::splat(2.0)))
        .unwrap();
    assert_eq!(scene.light("light0").unwrap().position, Vec3::Y);
    scene.release(&mut backend);
}

#[test]
fn test_materials_bind_their_textures() {
    let mut backend = software();
    let mut scene = Scene::new(&mut backend, config()).unwrap();
    let red = scene
        .add_texture_data(
            &mut backend,
            "red",
            &pbr_ibl::resources::TextureData::solid_color([255, 0, 0, 255], "red"),
        )
        .unwrap();
    let material = scene.add_material(PbrMaterial::new("paint").with_albedo(red));
    scene.add_object("ball", Drawable::sphere(Some(material)));
    scene
        .add_light("key", PointLight::new(Vec3::new(0.0, 0.0, 10.0), Vec3::splat(300.0)))
        .unwrap();

    scene.render(&mut backend).unwrap();
    let frame = backend.read_surface().unwrap();
    let center = pixel(&frame, SURFACE_WIDTH, SURFACE_WIDTH / 2, SURFACE_HEIGHT / 2);
    assert!(center.x > center.y + 0.1, "expected a red sphere, got {:?}", center);
    assert!(center.x > center.z + 0.1);
    scene.release(&mut backend);
}

#[test]
fn test_resize_and_release() {
    let mut backend = software();
    let mut scene = Scene::new(&mut backend, config()).unwrap();
    scene.set_size(&mut backend, 32, 16).unwrap();
    assert_eq!(backend.surface_size(), (32, 16));
    scene.set_size(&mut backend, 0, 16).unwrap();
    assert_eq!(scene.size(), (32, 16));

    scene.render(&mut backend).unwrap();
    assert_eq!(backend.read_surface().unwrap().len(), 32 * 16);
    assert_eq!(backend.viewport(), (0, 0, 32, 16));

    scene.release(&mut backend);
    assert_eq!(backend.live_resources().total(), 0);
}

#[test]
fn test_zero_sized_scene_is_rejected() {
    let mut backend = software();
    let empty = SceneConfig {
        width: 0,
        ..config()
    };
    assert!(matches!(
        Scene::new(&mut backend, empty),
        Err(RenderError::Configuration(_))
    ));
    assert_eq!(backend.live_resources().total(), 0);
}
