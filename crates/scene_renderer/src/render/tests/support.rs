//! Host services backed by shared state the tests can inspect
//!
//! Each mock keeps its state behind an `Rc<RefCell<..>>` so a test can keep a
//! handle after the service moves into the orchestrator.

use std::cell::RefCell;
use std::rc::Rc;

use crate::core::config::RendererConfig;
use crate::foundation::collections::{EntityKey, MaterialHandle};
use crate::foundation::math::{Axes, Bounds, Frustum, Mat4, Vec3};
use crate::render::api::{
    DynamicLightManager, DynamicLightTextures, FogParameters, FogQuery, GpuCommandQueue, LightSample, ModelCache,
    ModelHandle, PortalCamera, RecordingQueue, ReflectionCamera, TextureHandle, VisibilityId, WorldService,
};
use crate::render::frame::FrameOrchestrator;
use crate::render::primitives::draw_call::DrawCall;
use crate::render::primitives::geometry::{BufferHandle, BufferLifetime, GeometryRef};
use crate::render::resources::materials::{Material, MaterialCache};
use crate::render::RenderResult;
use crate::scene::{AreaMask, DynamicLight, Entity, EntityArena};

/// Quad geometry living in static buffers
pub fn static_quad() -> GeometryRef {
    GeometryRef::indexed(
        BufferHandle::new(BufferLifetime::Static, 900),
        0,
        4,
        BufferHandle::new(BufferLifetime::Static, 901),
        0,
        6,
    )
}

fn surface(materials: &MaterialCache, handle: Option<MaterialHandle>, draw_calls: &mut Vec<DrawCall>) {
    if let Some(handle) = handle {
        draw_calls.push(DrawCall::new(static_quad(), materials.get(handle)));
    }
}

/// What the world returns and what it was asked
#[derive(Debug, Default)]
pub struct WorldState {
    pub loaded: bool,
    pub loads: Vec<String>,
    pub visibility_updates: Vec<(VisibilityId, Vec3)>,
    pub rendered: Vec<VisibilityId>,
    pub sky_rendered: Vec<VisibilityId>,
    pub surface: Option<MaterialHandle>,
    /// Sky material and the skybox face it is drawn as
    pub sky: Option<(MaterialHandle, usize)>,
    pub reflection: Option<(ReflectionCamera, MaterialHandle)>,
    pub portal: Option<(PortalCamera, MaterialHandle)>,
    pub light_grid: Option<LightSample>,
    pub lightmaps: Vec<TextureHandle>,
    /// Fog volumes; a box is fogged by the first volume holding its midpoint
    pub fog_volumes: Vec<Bounds>,
}

pub struct MockWorld(pub Rc<RefCell<WorldState>>);

impl WorldService for MockWorld {
    fn load(&mut self, name: &str) -> RenderResult<()> {
        let mut state = self.0.borrow_mut();
        state.loaded = true;
        state.loads.push(name.to_string());
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.0.borrow().loaded
    }

    fn update_visibility(&mut self, vis: VisibilityId, pvs_position: &Vec3, _area_mask: &AreaMask) {
        self.0.borrow_mut().visibility_updates.push((vis, *pvs_position));
    }

    fn visible_bounds(&self, _vis: VisibilityId) -> Bounds {
        Bounds::new(Vec3::new(-512.0, -512.0, -512.0), Vec3::new(512.0, 512.0, 512.0))
    }

    fn render_sky(
        &mut self,
        vis: VisibilityId,
        _position: &Vec3,
        _z_max: f32,
        materials: &MaterialCache,
        _queue: &mut dyn GpuCommandQueue,
        draw_calls: &mut Vec<DrawCall>,
    ) {
        let mut state = self.0.borrow_mut();
        state.sky_rendered.push(vis);

        if let Some((handle, side)) = state.sky {
            draw_calls.push(DrawCall::new(static_quad(), materials.get(handle)).as_skybox_face(side));
        }
    }

    fn render(
        &mut self,
        vis: VisibilityId,
        _scene_rotation: &Axes,
        materials: &MaterialCache,
        draw_calls: &mut Vec<DrawCall>,
    ) {
        let mut state = self.0.borrow_mut();
        state.rendered.push(vis);
        surface(materials, state.surface, draw_calls);
    }

    fn reflection_camera(
        &self,
        _vis: VisibilityId,
        _position: &Vec3,
        _rotation: &Axes,
        _view_projection: &Mat4,
    ) -> Option<ReflectionCamera> {
        self.0.borrow().reflection.map(|(camera, _)| camera)
    }

    fn render_reflective(&mut self, _vis: VisibilityId, materials: &MaterialCache, draw_calls: &mut Vec<DrawCall>) {
        let handle = self.0.borrow().reflection.map(|(_, handle)| handle);
        surface(materials, handle, draw_calls);
    }

    fn portal_camera(
        &self,
        _vis: VisibilityId,
        _position: &Vec3,
        _rotation: &Axes,
        _view_projection: &Mat4,
        _entities: &EntityArena,
    ) -> Option<PortalCamera> {
        self.0.borrow().portal.map(|(camera, _)| camera)
    }

    fn render_portal(&mut self, _vis: VisibilityId, materials: &MaterialCache, draw_calls: &mut Vec<DrawCall>) {
        let handle = self.0.borrow().portal.map(|(_, handle)| handle);
        surface(materials, handle, draw_calls);
    }

    fn fog(&self, _query: &FogQuery) -> FogParameters {
        FogParameters::default()
    }

    fn find_fog_index_for_sphere(&self, _position: &Vec3, _radius: f32) -> Option<usize> {
        None
    }

    fn find_fog_index_for_bounds(&self, bounds: &Bounds) -> Option<usize> {
        let center = bounds.midpoint();
        self.0.borrow().fog_volumes.iter().position(|volume| {
            (0..3).all(|axis| volume.min[axis] <= center[axis] && center[axis] <= volume.max[axis])
        })
    }

    fn has_light_grid(&self) -> bool {
        self.0.borrow().light_grid.is_some()
    }

    fn sample_light_grid(&self, _position: &Vec3) -> LightSample {
        self.0.borrow().light_grid.unwrap_or_default()
    }

    fn lightmaps(&self) -> Vec<TextureHandle> {
        self.0.borrow().lightmaps.clone()
    }
}

/// Entities the model cache drew, in order
#[derive(Debug, Default)]
pub struct ModelState {
    pub rendered: Vec<EntityKey>,
    pub material: Option<MaterialHandle>,
}

pub struct MockModels(pub Rc<RefCell<ModelState>>);

impl ModelCache for MockModels {
    fn is_culled(&self, _model: ModelHandle, _entity: &Entity, _frustum: &Frustum) -> bool {
        false
    }

    fn render(
        &mut self,
        _model: ModelHandle,
        key: EntityKey,
        _entity: &Entity,
        _scene_rotation: &Axes,
        materials: &MaterialCache,
        _queue: &mut dyn GpuCommandQueue,
        draw_calls: &mut Vec<DrawCall>,
    ) {
        let mut state = self.0.borrow_mut();
        state.rendered.push(key);

        if let Some(handle) = state.material {
            draw_calls.push(DrawCall::new(static_quad(), materials.get(handle)).with_entity(key));
        }
    }
}

/// Calls made on the light manager
#[derive(Debug, Default)]
pub struct LightState {
    pub added: Vec<(u32, Vec3)>,
    pub clears: usize,
    pub grid_initialized: bool,
    pub texture_updates: Vec<u32>,
}

pub struct MockLights(pub Rc<RefCell<LightState>>);

impl DynamicLightManager for MockLights {
    fn add(&mut self, frame_number: u32, light: &DynamicLight) {
        self.0.borrow_mut().added.push((frame_number, light.position));
    }

    fn clear(&mut self) {
        let mut state = self.0.borrow_mut();
        state.added.clear();
        state.clears += 1;
    }

    fn initialize_grid(&mut self) {
        self.0.borrow_mut().grid_initialized = true;
    }

    fn update_textures(&mut self, frame_number: u32, _queue: &mut dyn GpuCommandQueue) {
        self.0.borrow_mut().texture_updates.push(frame_number);
    }

    fn write_uniforms(&self, _queue: &mut dyn GpuCommandQueue) {}

    fn contribute(&self, _frame_number: u32, _position: &Vec3, _directed_light: &mut Vec3, _light_direction: &mut Vec3) {}

    fn textures(&self) -> DynamicLightTextures {
        DynamicLightTextures { cells: TextureHandle(700), indices: TextureHandle(701), lights: TextureHandle(702) }
    }

    fn light_count(&self) -> usize {
        self.0.borrow().added.len()
    }
}

/// An orchestrator over a recording queue and the mocks above
pub struct Harness {
    pub renderer: FrameOrchestrator,
    pub world: Rc<RefCell<WorldState>>,
    pub models: Rc<RefCell<ModelState>>,
    pub lights: Rc<RefCell<LightState>>,
}

impl Harness {
    pub fn new(config: RendererConfig) -> Self {
        Self::with_queue(config, RecordingQueue::new(1280, 720))
    }

    pub fn with_queue(config: RendererConfig, queue: RecordingQueue) -> Self {
        let world = Rc::new(RefCell::new(WorldState::default()));
        let models = Rc::new(RefCell::new(ModelState::default()));
        let lights = Rc::new(RefCell::new(LightState::default()));

        let renderer = FrameOrchestrator::new(
            config,
            Box::new(queue),
            Box::new(MockWorld(Rc::clone(&world))),
            Box::new(MockModels(Rc::clone(&models))),
            Box::new(MockLights(Rc::clone(&lights))),
        )
        .expect("orchestrator");

        Self { renderer, world, models, lights }
    }

    pub fn queue(&self) -> &RecordingQueue {
        self.renderer
            .queue()
            .as_any()
            .downcast_ref::<RecordingQueue>()
            .expect("recording queue")
    }

    pub fn queue_mut(&mut self) -> &mut RecordingQueue {
        self.renderer
            .queue_mut()
            .as_any_mut()
            .downcast_mut::<RecordingQueue>()
            .expect("recording queue")
    }

    pub fn material(&mut self, material: Material) -> MaterialHandle {
        self.renderer.materials_mut().insert(material)
    }
}
