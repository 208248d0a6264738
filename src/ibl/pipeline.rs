//! IBL precompute orchestration
//!
//! The chain runs synchronously but is resumable: [`IblPipeline::begin`]
//! arms a run and every [`IblPipeline::step`] executes exactly one stage,
//! so a caller can spread the work across frames. [`IblPipeline::set_source`]
//! runs the whole chain before returning.

use std::path::PathBuf;

use crate::backend::traits::GraphicsBackend;
use crate::backend::types::CompareFunction;
use crate::error::{RenderError, RenderResult};
use crate::ibl::{
    brdf, environment, irradiance, prefilter, CaptureGeometry, IblPrograms, IblResources,
    RenderTarget, ENVIRONMENT_SIZE,
};
use crate::resources::{GpuMesh, HdrImage, MeshData};
use crate::shader::ShaderLibrary;

/// Progress of the precompute chain.
///
/// Each intermediate state names the stage that runs on the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IblState {
    Empty,
    Capturing,
    Convolving,
    Prefiltering,
    Integrating,
    Ready,
}

impl IblState {
    fn next(self) -> Self {
        match self {
            IblState::Empty => IblState::Empty,
            IblState::Capturing => IblState::Convolving,
            IblState::Convolving => IblState::Prefiltering,
            IblState::Prefiltering => IblState::Integrating,
            IblState::Integrating | IblState::Ready => IblState::Ready,
        }
    }
}

/// Where the environment comes from
#[derive(Debug, Clone)]
pub enum IblSource {
    Path(PathBuf),
    Image(HdrImage),
}

impl IblSource {
    fn describe(&self) -> String {
        match self {
            IblSource::Path(path) => path.display().to_string(),
            IblSource::Image(image) => image.name.clone(),
        }
    }
}

/// Owns the precompute programs, the shared render target and the four
/// outputs.
pub struct IblPipeline {
    programs: IblPrograms,
    cube: GpuMesh,
    quad: GpuMesh,
    target: RenderTarget,
    geometry: CaptureGeometry,
    state: IblState,
    source: Option<IblSource>,
    halted: Option<RenderError>,
    resources: IblResources,
}

impl IblPipeline {
    pub fn new<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        library: &ShaderLibrary,
    ) -> RenderResult<Self> {
        let cube = GpuMesh::create(backend, &MeshData::cube())?;
        let quad = match GpuMesh::create(backend, &MeshData::quad()) {
            Ok(quad) => quad,
            Err(e) => {
                cube.release(backend);
                return Err(e);
            }
        };
        let target = match RenderTarget::new(backend, ENVIRONMENT_SIZE, ENVIRONMENT_SIZE) {
            Ok(target) => target,
            Err(e) => {
                cube.release(backend);
                quad.release(backend);
                return Err(e);
            }
        };
        let programs = IblPrograms::compile(backend, library);

        Ok(Self {
            programs,
            cube,
            quad,
            target,
            geometry: CaptureGeometry::new(),
            state: IblState::Empty,
            source: None,
            halted: None,
            resources: IblResources::default(),
        })
    }

    pub fn state(&self) -> IblState {
        self.state
    }

    /// Whether the last run stopped on a failed stage
    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn halted_error(&self) -> Option<&RenderError> {
        self.halted.as_ref()
    }

    /// Outputs produced so far; incomplete unless the state is `Ready`
    pub fn resources(&self) -> &IblResources {
        &self.resources
    }

    pub fn geometry(&self) -> &CaptureGeometry {
        &self.geometry
    }

    /// Whether another call to [`IblPipeline::step`] has work to do
    pub fn is_pending(&self) -> bool {
        self.halted.is_none() && !matches!(self.state, IblState::Empty | IblState::Ready)
    }

    /// Release all outputs and arm a new run from `source`
    pub fn begin<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B, source: IblSource) {
        self.teardown(backend);
        log::info!("IBL precompute armed for '{}'", source.describe());
        self.source = Some(source);
        self.state = IblState::Capturing;
    }

    /// Run the next stage. Returns whether more stages remain.
    ///
    /// A failed stage halts the chain in its current state; outputs of the
    /// stages that completed stay available.
    pub fn step<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) -> bool {
        if !self.is_pending() {
            return false;
        }
        backend.set_depth_compare(CompareFunction::LessEqual);

        let outcome = match self.state {
            IblState::Capturing => self.run_capture(backend),
            IblState::Convolving => irradiance::convolve(
                backend,
                &mut self.target,
                &self.programs.irradiance,
                &self.geometry,
                &self.cube,
                self.resources.environment.as_ref(),
            )
            .map(|texture| self.resources.irradiance = Some(texture)),
            IblState::Prefiltering => prefilter::prefilter(
                backend,
                &mut self.target,
                &self.programs.prefilter,
                &self.geometry,
                &self.cube,
                self.resources.environment.as_ref(),
            )
            .map(|texture| self.resources.prefilter = Some(texture)),
            IblState::Integrating => brdf::integrate(
                backend,
                &mut self.target,
                &self.programs.brdf,
                &self.quad,
            )
            .map(|texture| self.resources.brdf_lut = Some(texture)),
            IblState::Empty | IblState::Ready => Ok(()),
        };

        match outcome {
            Ok(()) => {
                self.state = self.state.next();
                if self.state == IblState::Ready {
                    log::info!("IBL precompute ready");
                }
            }
            Err(e) => {
                log::error!("IBL precompute halted while {:?}: {}", self.state, e);
                self.halted = Some(e);
            }
        }

        let pending = self.is_pending();
        if !pending {
            self.restore_state(backend);
        }
        pending
    }

    /// Run every remaining stage
    pub fn run<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) -> RenderResult<()> {
        while self.step(backend) {}
        match &self.halted {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Rebuild all outputs from an HDR file, blocking until done or halted
    pub fn set_source<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        path: impl Into<PathBuf>,
    ) -> RenderResult<()> {
        self.begin(backend, IblSource::Path(path.into()));
        self.run(backend)
    }

    /// Rebuild all outputs from an already decoded image
    pub fn set_source_image<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        image: HdrImage,
    ) -> RenderResult<()> {
        self.begin(backend, IblSource::Image(image));
        self.run(backend)
    }

    /// Release all outputs and return to `Empty`
    pub fn teardown<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        if self.resources.count() > 0 {
            log::debug!("Releasing {} IBL resources", self.resources.count());
        }
        self.resources.release(backend);
        self.source = None;
        self.halted = None;
        self.state = IblState::Empty;
    }

    /// Release everything the pipeline owns
    pub fn release<B: GraphicsBackend + ?Sized>(mut self, backend: &mut B) {
        self.teardown(backend);
        self.programs.release(backend);
        self.cube.release(backend);
        self.quad.release(backend);
        self.target.release(backend);
    }

    fn run_capture<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) -> RenderResult<()> {
        // The decoded source is dropped once the cubemap exists
        let image = match self.source.take() {
            Some(IblSource::Path(path)) => Some(HdrImage::load(&path)?),
            Some(IblSource::Image(image)) => Some(image),
            None => None,
        };
        let texture = environment::capture(
            backend,
            &mut self.target,
            &self.programs.equirect,
            &self.geometry,
            &self.cube,
            image.as_ref(),
        )?;
        self.resources.environment = Some(texture);
        Ok(())
    }

    fn restore_state<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) {
        let (width, height) = backend.surface_size();
        backend.bind_framebuffer(None);
        backend.set_viewport(0, 0, width, height);
        backend.set_depth_compare(CompareFunction::Less);
    }
}
