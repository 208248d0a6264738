//! Scene management
//!
//! A [`Scene`] owns everything a frame needs: programs, textures, materials,
//! lights and drawables in explicit registries, the fly camera and the IBL
//! precompute pipeline whose outputs light the PBR pass.

mod camera;
mod camera_controller;
mod drawable;
mod light;
mod registry;
mod transform;

pub use camera::*;
pub use camera_controller::*;
pub use drawable::*;
pub use light::*;
pub use registry::*;
pub use transform::*;

use std::path::Path;

use glam::{Vec3, Vec4};

use crate::backend::traits::GraphicsBackend;
use crate::backend::types::{ClearFlags, CompareFunction, ProgramKind};
use crate::error::{RenderError, RenderResult};
use crate::ibl::{IblPipeline, IblResources};
use crate::resources::{GpuTexture, HdrImage, MaterialSlot, PbrMaterial, TextureData, TextureId};
use crate::shader::{ShaderLibrary, ShaderProgram};

/// Texture units of the IBL inputs in the PBR pass
pub const IRRADIANCE_UNIT: u32 = 0;
pub const PREFILTER_UNIT: u32 = 1;
pub const BRDF_LUT_UNIT: u32 = 2;
/// Texture unit of the environment in the background pass
pub const ENVIRONMENT_UNIT: u32 = 0;

/// Program names the render pass looks up
pub const PBR_SHADER: &str = "pbr";
pub const BACKGROUND_SHADER: &str = "background";

/// Surface and camera setup of a scene
#[derive(Debug, Clone)]
pub struct SceneConfig {
    pub width: u32,
    pub height: u32,
    pub clear_color: Vec4,
    pub camera_position: Vec3,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            clear_color: Vec4::new(0.2, 0.3, 0.3, 1.0),
            camera_position: Vec3::new(0.0, 0.0, 3.0),
        }
    }
}

/// Maps bound in place of empty material slots
#[derive(Debug)]
struct FallbackTextures {
    textures: Vec<(MaterialSlot, GpuTexture)>,
}

impl FallbackTextures {
    fn create<B: GraphicsBackend + ?Sized>(backend: &mut B) -> RenderResult<Self> {
        let mut textures = Vec::with_capacity(MaterialSlot::ALL.len());
        for slot in MaterialSlot::ALL {
            let data = match slot {
                MaterialSlot::Albedo => TextureData::solid_color([0, 0, 0, 255], "fallback_albedo"),
                MaterialSlot::Normal => TextureData::flat_normal(),
                MaterialSlot::Metallic => TextureData::solid_color([0, 0, 0, 255], "fallback_metallic"),
                MaterialSlot::Roughness => {
                    TextureData::solid_color([128, 128, 128, 255], "fallback_roughness")
                }
                MaterialSlot::AmbientOcclusion => {
                    TextureData::solid_color([255, 255, 255, 255], "fallback_ao")
                }
            };
            match GpuTexture::from_data(backend, &data) {
                Ok(texture) => textures.push((slot, texture)),
                Err(e) => {
                    Self { textures }.release(backend);
                    return Err(e);
                }
            }
        }
        Ok(Self { textures })
    }

    fn get(&self, slot: MaterialSlot) -> Option<&GpuTexture> {
        self.textures
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, texture)| texture)
    }

    fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        for (_, texture) in self.textures {
            texture.release(backend);
        }
    }
}

/// The scene containing all renderable content
pub struct Scene {
    config: SceneConfig,
    width: u32,
    height: u32,
    camera: Camera,
    library: ShaderLibrary,
    shaders: Registry<ShaderId, ShaderProgram>,
    textures: Registry<TextureId, GpuTexture>,
    materials: Registry<MaterialId, PbrMaterial>,
    lights: Registry<LightId, PointLight>,
    objects: Registry<ObjectId, Drawable>,
    meshes: SceneMeshes,
    fallback: FallbackTextures,
    ibl: IblPipeline,
}

impl Scene {
    pub fn new<B: GraphicsBackend + ?Sized>(backend: &mut B, config: SceneConfig) -> RenderResult<Self> {
        Self::with_library(backend, config, ShaderLibrary::builtin())
    }

    /// Build a scene whose programs come from `library`
    pub fn with_library<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        config: SceneConfig,
        library: ShaderLibrary,
    ) -> RenderResult<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(RenderError::configuration(format!(
                "scene surface {}x{} is empty",
                config.width, config.height
            )));
        }
        backend.resize_surface(config.width, config.height)?;
        backend.set_viewport(0, 0, config.width, config.height);

        let meshes = SceneMeshes::create(backend)?;
        let fallback = match FallbackTextures::create(backend) {
            Ok(fallback) => fallback,
            Err(e) => {
                meshes.release(backend);
                return Err(e);
            }
        };
        let ibl = match IblPipeline::new(backend, &library) {
            Ok(ibl) => ibl,
            Err(e) => {
                meshes.release(backend);
                fallback.release(backend);
                return Err(e);
            }
        };

        let mut shaders = Registry::new();
        shaders.insert(PBR_SHADER, library.compile(backend, ProgramKind::Pbr));
        shaders.insert(BACKGROUND_SHADER, library.compile(backend, ProgramKind::Background));

        log::info!(
            "Scene created ({}x{}) on {} backend",
            config.width,
            config.height,
            backend.name()
        );
        Ok(Self {
            width: config.width,
            height: config.height,
            camera: Camera::new(config.camera_position),
            config,
            library,
            shaders,
            textures: Registry::new(),
            materials: Registry::new(),
            lights: Registry::new(),
            objects: Registry::new(),
            meshes,
            fallback,
            ibl,
        })
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    // Shaders

    /// Compile and register a program under `name`.
    ///
    /// `source` overrides the builtin WGSL for `kind`. A program that fails
    /// to compile is still registered, in its unusable state. Registering
    /// under `"pbr"` or `"background"` replaces the program the render pass
    /// uses.
    pub fn add_shader<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        name: &str,
        kind: ProgramKind,
        source: Option<&str>,
    ) -> ShaderId {
        let mut desc = self.library.descriptor(kind);
        desc.label = Some(name.to_string());
        if let Some(source) = source {
            desc.source = source.to_string();
        }
        let program = ShaderProgram::compile(backend, &desc);
        let (id, previous) = self.shaders.insert(name, program);
        if let Some(previous) = previous {
            previous.release(backend);
        }
        id
    }

    pub fn shader(&self, name: &str) -> Option<&ShaderProgram> {
        self.shaders.get_by_name(name)
    }

    pub fn shader_id(&self, name: &str) -> Option<ShaderId> {
        self.shaders.id(name)
    }

    // Textures

    /// Load an image file as a material texture
    pub fn add_texture<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        name: &str,
        path: impl AsRef<Path>,
    ) -> RenderResult<TextureId> {
        let data = TextureData::from_file(path).map_err(|e| {
            log::error!("Texture '{}': {}", name, e);
            e
        })?;
        self.add_texture_data(backend, name, &data)
    }

    pub fn add_texture_data<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        name: &str,
        data: &TextureData,
    ) -> RenderResult<TextureId> {
        let texture = GpuTexture::from_data(backend, data)?;
        let (id, previous) = self.textures.insert(name, texture);
        if let Some(previous) = previous {
            previous.release(backend);
        }
        Ok(id)
    }

    pub fn texture(&self, id: TextureId) -> Option<&GpuTexture> {
        self.textures.get(id)
    }

    pub fn texture_id(&self, name: &str) -> Option<TextureId> {
        self.textures.id(name)
    }

    // Materials

    pub fn add_material(&mut self, material: PbrMaterial) -> MaterialId {
        let name = material.name.clone();
        self.materials.insert(&name, material).0
    }

    pub fn material(&self, name: &str) -> Option<&PbrMaterial> {
        self.materials.get_by_name(name)
    }

    pub fn material_id(&self, name: &str) -> Option<MaterialId> {
        self.materials.id(name)
    }

    pub fn material_mut(&mut self, id: MaterialId) -> Option<&mut PbrMaterial> {
        self.materials.get_mut(id)
    }

    // Lights

    /// Register a point light; at most [`MAX_LIGHTS`] fit the PBR program
    pub fn add_light(&mut self, name: &str, light: PointLight) -> RenderResult<LightId> {
        if !self.lights.contains_name(name) && self.lights.len() >= MAX_LIGHTS {
            let err = RenderError::configuration(format!(
                "light '{}' exceeds the {} light slots",
                name, MAX_LIGHTS
            ));
            log::warn!("{}", err);
            return Err(err);
        }
        Ok(self.lights.insert(name, light).0)
    }

    pub fn light(&self, name: &str) -> Option<&PointLight> {
        self.lights.get_by_name(name)
    }

    pub fn light_mut(&mut self, id: LightId) -> Option<&mut PointLight> {
        self.lights.get_mut(id)
    }

    // Objects

    pub fn add_object(&mut self, name: &str, drawable: Drawable) -> ObjectId {
        self.objects.insert(name, drawable).0
    }

    pub fn object(&self, name: &str) -> Option<&Drawable> {
        self.objects.get_by_name(name)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut Drawable> {
        self.objects.get_mut(id)
    }

    pub fn object_id(&self, name: &str) -> Option<ObjectId> {
        self.objects.id(name)
    }

    pub fn remove_object(&mut self, id: ObjectId) -> Option<Drawable> {
        self.objects.remove(id)
    }

    // Environment

    /// Rebuild the image-based lighting from an equirectangular HDR file.
    ///
    /// On failure the scene keeps rendering without environment lighting.
    pub fn add_cubemap<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        path: impl AsRef<Path>,
    ) -> RenderResult<()> {
        self.ibl.set_source(backend, path.as_ref())
    }

    pub fn add_cubemap_image<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        image: HdrImage,
    ) -> RenderResult<()> {
        self.ibl.set_source_image(backend, image)
    }

    pub fn ibl(&self) -> &IblPipeline {
        &self.ibl
    }

    /// Access for driving the precompute one stage at a time
    pub fn ibl_mut(&mut self) -> &mut IblPipeline {
        &mut self.ibl
    }

    // Camera

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn move_camera(&mut self, direction: CameraMovement, dt: f32) {
        self.camera.move_by(direction, dt);
    }

    pub fn rotate_camera(&mut self, dx: f32, dy: f32) {
        self.camera.rotate(dx, dy);
    }

    pub fn zoom_camera(&mut self, scroll: f32) {
        self.camera.zoom(scroll);
    }

    /// Apply one frame of controller input to the camera
    pub fn update_camera(&mut self, controller: &mut dyn CameraController, input: &CameraInput, dt: f32) {
        controller.update(&mut self.camera, input, dt);
    }

    // Frame

    /// Resize the surface and viewport
    pub fn set_size<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        if width == 0 || height == 0 {
            log::debug!("Ignoring resize to {}x{}", width, height);
            return Ok(());
        }
        backend.resize_surface(width, height)?;
        backend.set_viewport(0, 0, width, height);
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Render one frame into the default surface.
    ///
    /// Missing IBL outputs are left unbound so the lit pass runs without
    /// environment lighting; the background is skipped without an
    /// environment cubemap.
    pub fn render<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) -> RenderResult<()> {
        backend.bind_framebuffer(None);
        backend.set_viewport(0, 0, self.width, self.height);
        backend.set_depth_compare(CompareFunction::Less);
        backend.clear(self.config.clear_color, ClearFlags::ALL)?;

        let aspect = self.width as f32 / self.height as f32;
        let view = self.camera.view_matrix();
        let projection = self.camera.projection_matrix(aspect);

        self.render_lit(backend, view, projection);
        self.render_background(backend, view, projection);
        Ok(())
    }

    fn render_lit<B: GraphicsBackend + ?Sized>(&self, backend: &mut B, view: glam::Mat4, projection: glam::Mat4) {
        let Some(program) = self.shader(PBR_SHADER).filter(|p| p.is_valid()) else {
            log::warn!("PBR program unavailable, skipping lit objects");
            return;
        };
        program.use_program(backend);
        program.set_mat4(backend, "view", view);
        program.set_mat4(backend, "projection", projection);
        program.set_vec3(backend, "camera", self.camera.position);
        program.set_sampler(backend, "irradiance_map", IRRADIANCE_UNIT);
        program.set_sampler(backend, "prefilter_map", PREFILTER_UNIT);
        program.set_sampler(backend, "brdf_lut", BRDF_LUT_UNIT);
        for slot in MaterialSlot::ALL {
            program.set_sampler(backend, slot.uniform(), slot.unit());
        }

        let mut lights = self.lights.values();
        for index in 0..MAX_LIGHTS {
            let Some((position_name, color_name)) = PointLight::uniform_names(index) else {
                break;
            };
            // Unused slots contribute nothing
            let light = lights
                .next()
                .copied()
                .unwrap_or(PointLight::new(Vec3::ZERO, Vec3::ZERO));
            program.set_vec3(backend, position_name, light.position);
            program.set_vec3(backend, color_name, light.color);
        }

        let ibl: &IblResources = self.ibl.resources();
        backend.bind_texture(IRRADIANCE_UNIT, ibl.irradiance.as_ref().map(|t| t.handle()));
        backend.bind_texture(PREFILTER_UNIT, ibl.prefilter.as_ref().map(|t| t.handle()));
        backend.bind_texture(BRDF_LUT_UNIT, ibl.brdf_lut.as_ref().map(|t| t.handle()));

        for (_, name, object) in self.objects.iter().filter(|(_, _, o)| o.is_lit()) {
            self.bind_material(backend, object.material());
            program.set_mat4(backend, "model", object.transform().matrix());
            if let Err(e) = object.draw(backend, &self.meshes) {
                log::warn!("Drawing '{}' failed: {}", name, e);
            }
        }
    }

    fn bind_material<B: GraphicsBackend + ?Sized>(&self, backend: &mut B, material: Option<MaterialId>) {
        let material = material.and_then(|id| self.materials.get(id));
        for slot in MaterialSlot::ALL {
            let texture = material
                .and_then(|m| m.slot(slot))
                .and_then(|id| self.textures.get(id))
                .or_else(|| self.fallback.get(slot));
            backend.bind_texture(slot.unit(), texture.map(|t| t.handle()));
        }
    }

    fn render_background<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        view: glam::Mat4,
        projection: glam::Mat4,
    ) {
        let Some(environment) = self.ibl.resources().environment.as_ref() else {
            return;
        };
        let Some(program) = self.shader(BACKGROUND_SHADER).filter(|p| p.is_valid()) else {
            log::warn!("Background program unavailable, skipping skybox");
            return;
        };
        program.use_program(backend);
        program.set_mat4(backend, "view", view);
        program.set_mat4(backend, "projection", projection);
        program.set_sampler(backend, "environment_map", ENVIRONMENT_UNIT);
        backend.bind_texture(ENVIRONMENT_UNIT, Some(environment.handle()));

        backend.set_depth_compare(CompareFunction::LessEqual);
        if let Err(e) = Drawable::Skybox.draw(backend, &self.meshes) {
            log::warn!("Drawing skybox failed: {}", e);
        }
        backend.set_depth_compare(CompareFunction::Less);
    }

    /// Release every backend object the scene owns
    pub fn release<B: GraphicsBackend + ?Sized>(mut self, backend: &mut B) {
        for program in self.shaders.drain() {
            program.release(backend);
        }
        for texture in self.textures.drain() {
            texture.release(backend);
        }
        self.ibl.release(backend);
        self.meshes.release(backend);
        self.fallback.release(backend);
        log::debug!("Scene released");
    }
}
