//! Bake the image-based lighting of an HDR environment and render a preview.
//!
//! ```bash
//! # Software backend, preview quality
//! cargo run --example precompute -- --hdr newport_loft.hdr --preview
//!
//! # Headless GPU backend
//! cargo run --example precompute --features wgpu-backend -- --hdr newport_loft.hdr --backend wgpu
//! ```

use std::path::{Path, PathBuf};

use clap::Parser;
use glam::{Vec3, Vec4};
use log::info;

use pbr_ibl::backend::{CubeFace, GraphicsBackend};
use pbr_ibl::resources::HdrImage;
use pbr_ibl::scene::{Drawable, PointLight, Transform};
use pbr_ibl::{create_backend, BackendType, Scene, SceneConfig, SoftwareConfig};

/// Backend selection for the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum CliBackend {
    /// CPU reference backend
    #[default]
    Software,
    /// Headless GPU backend (needs the `wgpu-backend` feature)
    Wgpu,
}

impl From<CliBackend> for BackendType {
    fn from(cli: CliBackend) -> Self {
        match cli {
            CliBackend::Software => BackendType::Software,
            CliBackend::Wgpu => BackendType::Wgpu,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "precompute",
    about = "Bake irradiance, prefiltered specular and BRDF LUT from an HDR environment"
)]
struct Args {
    /// Equirectangular .hdr environment; a constant sky is used when omitted
    #[arg(long)]
    hdr: Option<PathBuf>,

    /// Directory the PNG outputs are written to
    #[arg(long, short, default_value = "ibl_out")]
    output: PathBuf,

    #[arg(long, value_enum, default_value_t = CliBackend::Software)]
    backend: CliBackend,

    /// Preview frame width
    #[arg(long, default_value_t = 320)]
    width: u32,

    /// Preview frame height
    #[arg(long, default_value_t = 240)]
    height: u32,

    /// Coarse sampling on the software backend
    #[arg(long)]
    preview: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let software = SoftwareConfig {
        surface_width: args.width,
        surface_height: args.height,
        ..if args.preview {
            SoftwareConfig::preview()
        } else {
            SoftwareConfig::default()
        }
    };
    let mut backend = create_backend(args.backend.into(), software)?;
    info!("Using {} backend", backend.name());

    let config = SceneConfig {
        width: args.width,
        height: args.height,
        ..Default::default()
    };
    let mut scene = Scene::new(backend.as_mut(), config)?;

    let baked = match &args.hdr {
        Some(path) => scene.add_cubemap(backend.as_mut(), path),
        None => scene.add_cubemap_image(backend.as_mut(), HdrImage::uniform(Vec3::splat(0.8))),
    };
    if let Err(e) = baked {
        log::error!("Environment unavailable, rendering without it: {}", e);
    }

    scene.add_object("sphere", Drawable::sphere(None));
    scene.add_object(
        "floor",
        Drawable::quad(None).with_transform(Transform::from_position(Vec3::new(0.0, -1.0, 0.0))),
    );
    scene.add_light(
        "key",
        PointLight::new(Vec3::new(-10.0, 10.0, 10.0), Vec3::splat(300.0)),
    )?;

    std::fs::create_dir_all(&args.output)?;

    let resources = scene.ibl().resources();
    if let Some(lut) = &resources.brdf_lut {
        let texels = lut.read(backend.as_mut(), None, 0)?;
        save_png(&args.output.join("brdf_lut.png"), lut.width(), lut.height(), &texels, false)?;
    }
    if let Some(irradiance) = &resources.irradiance {
        for face in CubeFace::ALL {
            let texels = irradiance.read(backend.as_mut(), Some(face), 0)?;
            let path = args.output.join(format!("irradiance_{}.png", face.index()));
            save_png(&path, irradiance.width(), irradiance.height(), &texels, true)?;
        }
    }
    if let Some(prefilter) = &resources.prefilter {
        for mip in 0..prefilter.mip_levels() {
            let (width, height) = prefilter.mip_size(mip);
            let texels = prefilter.read(backend.as_mut(), Some(CubeFace::PositiveZ), mip)?;
            let path = args.output.join(format!("prefilter_mip{}.png", mip));
            save_png(&path, width, height, &texels, true)?;
        }
    }

    scene.render(backend.as_mut())?;
    let frame = backend.read_surface()?;
    let (width, height) = scene.size();
    save_png(&args.output.join("frame.png"), width, height, &frame, false)?;
    info!("Wrote outputs to {}", args.output.display());

    scene.release(backend.as_mut());
    let live = backend.live_resources();
    if live.total() != 0 {
        log::warn!("Leaked backend resources: {:?}", live);
    }
    Ok(())
}

/// Write bottom-up linear texels as a top-down 8-bit PNG
fn save_png(
    path: &Path,
    width: u32,
    height: u32,
    texels: &[Vec4],
    tonemap: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let image = image::RgbaImage::from_fn(width, height, |x, y| {
        let texel = texels[((height - 1 - y) * width + x) as usize];
        let mut rgb = texel.truncate();
        if tonemap {
            rgb = (rgb / (rgb + Vec3::ONE)).powf(1.0 / 2.2);
        }
        let rgb = (rgb.clamp(Vec3::ZERO, Vec3::ONE) * 255.0).round();
        image::Rgba([rgb.x as u8, rgb.y as u8, rgb.z as u8, 255])
    });
    image.save(path)?;
    info!("Saved {}", path.display());
    Ok(())
}
