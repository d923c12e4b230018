//! # Frame Orchestrator
//!
//! Owns every piece of per-frame state and sequences the rendering systems.
//! The host drives it once per frame:
//!
//! ```text
//! begin_frame(time)
//!   add_entity / add_dynamic_light / add_polygons / add_debug_*   (scene input)
//!   render_scene(definition)                                      (any number)
//!   draw_stretch_pic / draw_stretch_raw / debug_print             (2D, any time)
//! end_frame()
//! ```
//!
//! View ids, the frame counter, the warn-once flags, the debug-text cursor and
//! the pending gamma ramp all live here as plain fields.

pub mod debug_overlay;
pub mod fonts;
pub mod targets;
pub mod views;

use crate::core::config::{EffectsConfig, RendererConfig};
use crate::foundation::collections::{EntityKey, MaterialHandle};
use crate::foundation::logging::{debug, error, info, trace, WarnOnce};
use crate::foundation::math::{Bounds, Rect, Vec3, Vec4};
use crate::render::api::{
    DebugFlags, DynamicLightManager, GpuCommandQueue, LightSample, ModelCache, RenderTarget, TextureDesc,
    TextureFormat, TextureHandle, ViewDescriptor, VisibilityId, WorldService,
};
use crate::render::primitives::state::ClearFlags;
use crate::render::resources::materials::MaterialCache;
use crate::render::systems::camera::{CameraContext, CameraFlags, CameraInvocation, CameraRenderer};
use crate::render::systems::post_process::FramePostProcessor;
use crate::render::systems::stretch_pic::{Canvas, CinematicFrame, StretchPic, StretchPicBatcher};
use crate::render::{RenderError, RenderResult};
use crate::scene::{AreaMask, DynamicLight, Entity, PolygonVertex, SceneAggregator, SceneDefinition, SceneFlags};

use debug_overlay::{DebugOverlay, GammaTable, OverlaySources};
use fonts::{FontInfo, FontRegistry};
use targets::{RenderTargets, SmaaLookup};
use views::ViewAllocator;

/// Name the reflection texture is registered under
pub const REFLECTION_TEXTURE_NAME: &str = "*reflection";
/// Name the white texture is registered under
pub const WHITE_TEXTURE_NAME: &str = "*white";
/// Clear color of a frame in which nothing rendered
pub const EMPTY_FRAME_CLEAR_COLOR: u32 = 0x0000_00ff;
/// Debug text row height in pixels
pub const DEBUG_TEXT_ROW_HEIGHT: u32 = 16;
/// Debug text column width in characters
pub const DEBUG_TEXT_COLUMN_WIDTH: u16 = 32;

/// Borrow the 2D drawing state out of the orchestrator's fields
macro_rules! canvas {
    ($self:ident) => {
        Canvas {
            queue: &mut *$self.queue,
            views: &mut $self.views,
            warn_once: &mut $self.warn_once,
            materials: &$self.materials,
            white: $self.white,
            time: seconds($self.host_time),
        }
    };
}

/// Packed RGBA clear color of a hyperspace frame
pub const fn hyperspace_clear_color(time: u32) -> u32 {
    let c = time & 255;
    (c << 24) | (c << 16) | (c << 8) | 0xff
}

/// Sequences scene input, cameras, post-processing and 2D drawing for each frame
pub struct FrameOrchestrator {
    config: RendererConfig,
    queue: Box<dyn GpuCommandQueue>,
    world: Box<dyn WorldService>,
    models: Box<dyn ModelCache>,
    lights: Box<dyn DynamicLightManager>,
    materials: MaterialCache,
    scene: SceneAggregator,
    views: ViewAllocator,
    warn_once: WarnOnce,
    targets: Option<RenderTargets>,
    smaa_lookup: Option<SmaaLookup>,
    stretch_pics: StretchPicBatcher,
    fonts: FontRegistry,
    white: TextureHandle,
    debug_overlay: DebugOverlay,
    pending_debug_overlay: Option<DebugOverlay>,
    pending_gamma: Option<f32>,
    pending_skybox_portal: Option<SceneDefinition>,
    frame_number: u32,
    /// Host clock of the frame, drives 2D material time
    host_time: u32,
    /// Time of the scene being rendered
    time: u32,
    debug_text_row: u16,
}

impl FrameOrchestrator {
    /// Create an orchestrator over the host's services
    ///
    /// Creates the white texture and installs the configured gamma ramp.
    pub fn new(
        config: RendererConfig,
        mut queue: Box<dyn GpuCommandQueue>,
        world: Box<dyn WorldService>,
        models: Box<dyn ModelCache>,
        lights: Box<dyn DynamicLightManager>,
    ) -> RenderResult<Self> {
        config.validate().map_err(RenderError::InvalidConfiguration)?;

        let white = queue.create_texture(&TextureDesc::lookup(TextureFormat::BGRA8, 1, 1), Some(&[0xff; 4]))?;
        let mut materials = MaterialCache::new();
        materials.register_texture(WHITE_TEXTURE_NAME, white);

        let (width, height) = queue.backbuffer_size();
        info!("Initializing scene renderer at {width}x{height}");

        let mut orchestrator = Self {
            views: ViewAllocator::new(config.max_views),
            debug_overlay: DebugOverlay::from_name(&config.debug.debug_draw),
            config,
            queue,
            world,
            models,
            lights,
            materials,
            scene: SceneAggregator::new(),
            warn_once: WarnOnce::new(),
            targets: None,
            smaa_lookup: None,
            stretch_pics: StretchPicBatcher::new(),
            fonts: FontRegistry::new(),
            white,
            pending_debug_overlay: None,
            pending_gamma: None,
            pending_skybox_portal: None,
            frame_number: 0,
            host_time: 0,
            time: 0,
            debug_text_row: 0,
        };

        orchestrator.apply_gamma(orchestrator.config.postprocess.gamma);
        Ok(orchestrator)
    }

    /// Start a frame at host time `time` (milliseconds)
    pub fn begin_frame(&mut self, time: u32) {
        self.host_time = time;
        self.time = time;
        trace!("Begin frame {}", self.frame_number);
    }

    /// Frames completed so far
    pub const fn frame_number(&self) -> u32 {
        self.frame_number
    }

    /// Settings
    pub const fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Effect toggles, read by every camera
    pub fn effects_mut(&mut self) -> &mut EffectsConfig {
        &mut self.config.effects
    }

    /// Command queue
    pub fn queue(&self) -> &dyn GpuCommandQueue {
        &*self.queue
    }

    /// Mutable command queue
    pub fn queue_mut(&mut self) -> &mut dyn GpuCommandQueue {
        &mut *self.queue
    }

    /// Material cache
    pub const fn materials(&self) -> &MaterialCache {
        &self.materials
    }

    /// Mutable material cache, for registering materials
    pub fn materials_mut(&mut self) -> &mut MaterialCache {
        &mut self.materials
    }

    /// Offscreen targets of the loaded world
    pub const fn targets(&self) -> Option<&RenderTargets> {
        self.targets.as_ref()
    }

    /// Active debug overlay
    pub const fn debug_overlay(&self) -> DebugOverlay {
        self.debug_overlay
    }

    /// Registered fonts
    pub fn fonts(&self) -> &[FontInfo] {
        self.fonts.fonts()
    }

    /// Supply the SMAA area and search lookups used when a world loads
    pub fn set_smaa_lookup(&mut self, lookup: SmaaLookup) {
        self.smaa_lookup = Some(lookup);
    }

    /// Load a world and create the offscreen targets it renders into
    ///
    /// A session loads one world; a second call fails.
    pub fn load_world(&mut self, name: &str) -> RenderResult<()> {
        if self.world.is_loaded() {
            error!("Attempted to redundantly load world map {name}");
            return Err(RenderError::WorldAlreadyLoaded);
        }

        if let Some(mut stale) = self.targets.take() {
            stale.destroy(&mut *self.queue);
        }

        let targets = RenderTargets::create(
            &mut *self.queue,
            &self.config.postprocess,
            self.config.effects.water_reflections,
            self.smaa_lookup.as_ref(),
        )?;
        debug!("Created render targets (hdr: {})", targets.is_hdr());

        if let Some(reflection) = targets.reflection_texture {
            self.materials.register_texture(REFLECTION_TEXTURE_NAME, reflection);
        }

        self.targets = Some(targets);
        self.world.load(name)?;
        self.lights.initialize_grid();
        info!("Loaded world {name}");
        Ok(())
    }

    /// Whether a world is loaded
    pub fn is_world_loaded(&self) -> bool {
        self.world.is_loaded()
    }

    /// Light-grid estimate at `position`, if the world has a grid
    pub fn sample_light(&self, position: &Vec3) -> Option<LightSample> {
        (self.world.is_loaded() && self.world.has_light_grid()).then(|| self.world.sample_light_grid(position))
    }

    /// Add an entity to the next scene
    pub fn add_entity(&mut self, entity: Entity) -> EntityKey {
        self.scene.add_entity(entity)
    }

    /// Add a point light to the next scene
    pub fn add_dynamic_light(&mut self, light: &DynamicLight) {
        self.lights.add(self.frame_number, light);
    }

    /// Add `polygon_count` polygons of `vertices_per_polygon` vertices each
    pub fn add_polygons(
        &mut self,
        material: MaterialHandle,
        vertices: &[PolygonVertex],
        vertices_per_polygon: usize,
        polygon_count: usize,
    ) -> RenderResult<()> {
        let material = self.materials.get(material);
        self.scene
            .add_polygons(material, vertices, vertices_per_polygon, polygon_count, &*self.world)
    }

    /// Draw axis lines at `position` in the next scene
    pub fn add_debug_axis(&mut self, position: Vec3) {
        self.scene.add_debug_axis(position);
    }

    /// Draw a wireframe box in the next scene
    pub fn add_debug_bounds(&mut self, bounds: Bounds) {
        self.scene.add_debug_bounds(bounds);
    }

    /// Set the 2D draw color; `None` restores white
    pub fn set_color(&mut self, color: Option<Vec4>) {
        self.stretch_pics.set_color(color);
    }

    /// Queue a 2D quad in the current draw color
    pub fn draw_stretch_pic(&mut self, pic: &StretchPic) -> RenderResult<()> {
        let color = self.stretch_pics.color();
        self.draw_stretch_pic_gradient(pic, color)
    }

    /// Queue a 2D quad fading from the draw color at the top to `gradient` at the bottom
    pub fn draw_stretch_pic_gradient(&mut self, pic: &StretchPic, gradient: Vec4) -> RenderResult<()> {
        self.stretch_pics.draw(&mut canvas!(self), pic, gradient)
    }

    /// Draw a cinematic frame immediately
    pub fn draw_stretch_raw(&mut self, frame: &CinematicFrame<'_>) -> RenderResult<()> {
        self.stretch_pics.draw_raw(&mut canvas!(self), frame)
    }

    fn flush_stretch_pics(&mut self) -> RenderResult<()> {
        self.stretch_pics.flush(&mut canvas!(self))
    }

    /// Register the font for `point_size`; `load` parses the font file
    pub fn register_font<F>(&mut self, name: &str, point_size: i32, load: F) -> Option<FontInfo>
    where
        F: FnOnce(&str) -> Option<FontInfo>,
    {
        self.fonts.register(name, point_size, &self.materials, load)
    }

    /// Print a line of debug text, filling columns top to bottom
    pub fn debug_print(&mut self, text: &str) {
        if !self.config.debug.debug_text {
            return;
        }

        let (_, height) = self.queue.backbuffer_size();
        let rows = u16::try_from(height / DEBUG_TEXT_ROW_HEIGHT).unwrap_or(u16::MAX).max(1);
        let column = (self.debug_text_row / rows).saturating_mul(DEBUG_TEXT_COLUMN_WIDTH);
        let row = self.debug_text_row % rows;
        self.queue.debug_text(column, row, text);
        self.debug_text_row = self.debug_text_row.saturating_add(1);
    }

    /// Select a debug overlay by name from the next frame on
    pub fn set_debug_overlay(&mut self, name: &str) {
        self.pending_debug_overlay = Some(DebugOverlay::from_name(name));
    }

    /// Change the display gamma at the end of the frame
    pub fn set_gamma(&mut self, gamma: f32) {
        self.pending_gamma = Some(gamma);
    }

    fn apply_gamma(&mut self, gamma: f32) {
        if !self.queue.capabilities().hardware_gamma {
            debug!("Hardware gamma unavailable, ignoring gamma {gamma}");
            return;
        }

        let table = GammaTable::build(gamma);
        self.queue.set_gamma_ramp(table.entries());
    }

    /// Render one scene
    ///
    /// Hyperspace scenes only clear the viewport. Skybox-portal scenes are
    /// held back and rendered by the next regular scene. Scene input is
    /// consumed either way.
    pub fn render_scene(&mut self, scene: &SceneDefinition) -> RenderResult<()> {
        let flushed = self.flush_stretch_pics();
        self.stretch_pics.reset_view();
        self.time = scene.time;

        let result = flushed.and_then(|()| {
            let (width, height) = self.queue.backbuffer_size();
            let rect = scene
                .rect
                .with_clamped_origin()
                .or_full_size(clamp_dimension(width), clamp_dimension(height));

            if scene.flags.contains(SceneFlags::HYPERSPACE) {
                self.render_hyperspace(rect)
            } else if scene.flags.contains(SceneFlags::SKYBOX_PORTAL) {
                self.pending_skybox_portal = Some(scene.clone());
                Ok(())
            } else {
                self.render_cameras(scene, rect)
            }
        });

        self.lights.clear();
        self.scene.clear();
        result
    }

    fn render_hyperspace(&mut self, rect: Rect) -> RenderResult<()> {
        let descriptor = ViewDescriptor::new(RenderTarget::Backbuffer, rect)
            .with_clear(ClearFlags::COLOR | ClearFlags::DEPTH)
            .with_clear_color(hyperspace_clear_color(self.time));
        let view = self.views.push_view(&mut *self.queue, &descriptor)?;
        self.queue.touch(view);
        Ok(())
    }

    fn render_cameras(&mut self, scene: &SceneDefinition, rect: Rect) -> RenderResult<()> {
        let world_scene = scene.flags.contains(SceneFlags::WORLD) && self.world.is_loaded() && self.targets.is_some();
        trace!("Render scene (world: {world_scene}, entities: {})", self.scene.entity_keys().len());

        if world_scene {
            self.lights.update_textures(self.frame_number, &mut *self.queue);
        }

        if let Some(portal) = self.pending_skybox_portal.take() {
            let camera = CameraInvocation::new(VisibilityId::SkyboxPortal, portal.position, portal.rotation, rect, portal.fov)
                .with_flags(CameraFlags::IS_SKYBOX_PORTAL);
            self.render_camera(&camera, &portal.area_mask, scene, world_scene)?;
        }

        let mut flags = CameraFlags::empty();
        flags.set(CameraFlags::CONTAINS_SKYBOX_PORTAL, scene.flags.contains(SceneFlags::CONTAINS_SKYBOX_PORTAL));
        let camera = CameraInvocation::new(VisibilityId::Main, scene.position, scene.rotation, rect, scene.fov).with_flags(flags);
        self.render_camera(&camera, &scene.area_mask, scene, world_scene)?;

        match self.targets.as_ref().filter(|_| world_scene) {
            Some(targets) => FramePostProcessor {
                queue: &mut *self.queue,
                views: &mut self.views,
                warn_once: &mut self.warn_once,
                targets,
                config: &self.config.postprocess,
            }
            .run(rect),
            None => Ok(()),
        }
    }

    fn render_camera(
        &mut self,
        camera: &CameraInvocation,
        area_mask: &AreaMask,
        scene: &SceneDefinition,
        world_scene: bool,
    ) -> RenderResult<()> {
        let context = CameraContext {
            queue: &mut *self.queue,
            world: &mut *self.world,
            models: &mut *self.models,
            lights: &*self.lights,
            scene: &mut self.scene,
            materials: &self.materials,
            world_targets: self.targets.as_ref().filter(|_| world_scene),
            config: &self.config,
            views: &mut self.views,
            warn_once: &mut self.warn_once,
            area_mask,
            scene_rotation: scene.rotation,
            white: self.white,
            frame_number: self.frame_number,
            float_time: seconds(self.time),
        };

        CameraRenderer::new(context).render(camera)
    }

    /// Finish the frame and hand it to the command queue
    ///
    /// The frame executes and per-frame state resets even when a pass fails;
    /// the first error is returned afterwards.
    pub fn end_frame(&mut self) -> RenderResult<()> {
        let result = self
            .flush_stretch_pics()
            .and_then(|()| self.clear_empty_frame())
            .and_then(|()| self.render_debug_overlay());

        let mut debug = DebugFlags::empty();
        debug.set(DebugFlags::STATS, self.config.debug.show_stats);
        debug.set(DebugFlags::TEXT, self.config.debug.debug_text);
        self.queue.set_debug(debug);
        self.queue.frame();

        if let Some(overlay) = self.pending_debug_overlay.take() {
            self.debug_overlay = overlay;
        }

        if let Some(gamma) = self.pending_gamma.take() {
            self.apply_gamma(gamma);
        }

        if self.config.debug.debug_text {
            self.queue.debug_text_clear();
            self.debug_text_row = 0;
        }

        trace!("End frame {} ({} views)", self.frame_number, self.views.count());
        self.views.reset();
        self.frame_number = self.frame_number.wrapping_add(1);
        self.stretch_pics.reset_view();
        result
    }

    /// Clear the backbuffer when nothing else pushed a view this frame
    fn clear_empty_frame(&mut self) -> RenderResult<()> {
        if !self.views.is_empty() {
            return Ok(());
        }

        let (width, height) = self.queue.backbuffer_size();
        let rect = Rect::new(0, 0, clamp_dimension(width), clamp_dimension(height));
        let descriptor = ViewDescriptor::new(RenderTarget::Backbuffer, rect)
            .with_clear(ClearFlags::COLOR)
            .with_clear_color(EMPTY_FRAME_CLEAR_COLOR);
        let view = self.views.push_view(&mut *self.queue, &descriptor)?;
        self.queue.touch(view);
        Ok(())
    }

    fn render_debug_overlay(&mut self) -> RenderResult<()> {
        if self.debug_overlay == DebugOverlay::None {
            return Ok(());
        }

        let lightmaps = if self.debug_overlay == DebugOverlay::Lightmap && self.world.is_loaded() {
            self.world.lightmaps()
        } else {
            Vec::new()
        };

        let sources = OverlaySources {
            targets: self.targets.as_ref(),
            dynamic_lights: self.lights.textures(),
            lightmaps: &lightmaps,
        };

        self.debug_overlay.render(
            &mut *self.queue,
            &mut self.views,
            &mut self.warn_once,
            &sources,
            self.config.debug.debug_draw_size,
        )
    }
}

impl Drop for FrameOrchestrator {
    fn drop(&mut self) {
        if let Some(mut targets) = self.targets.take() {
            targets.destroy(&mut *self.queue);
        }

        self.stretch_pics.destroy(&mut *self.queue);
        self.queue.destroy_texture(self.white);
    }
}

#[allow(clippy::cast_precision_loss)]
fn seconds(time_ms: u32) -> f32 {
    time_ms as f32 * 0.001
}

fn clamp_dimension(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
