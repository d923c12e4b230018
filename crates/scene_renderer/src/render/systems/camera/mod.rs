//! # Recursive Camera Renderer
//!
//! Renders one camera into the scene frame buffer (world scenes) or the
//! backbuffer. For the main camera of a world scene it first renders, at most
//! once each, a reflection camera and a portal camera. Both write a stencil
//! mask of their surface and then recurse with stencil testing and a clip
//! plane. Nested cameras never recurse further.
//!
//! ## Passes of one camera
//!
//! ```text
//! [reflection: stencil view, nested camera, blit to reflection target]
//! [portal: stencil view, nested camera]
//! collect + sort draw calls
//! depth pre-pass view -> linear depth quad        (world scenes)
//! main view: stages, wireframe, fog pass, debug lines
//! ```

pub mod debug_geometry;
pub mod entities;

use bitflags::bitflags;

use crate::core::config::RendererConfig;
use crate::foundation::collections::EntityKey;
use crate::foundation::logging::WarnOnce;
use crate::foundation::math::{perspective_projection, view_matrix, Axes, Frustum, Mat4, Plane, Rect, Vec2, Vec3, Vec4};
use crate::render::api::{
    DynamicLightManager, FogQuery, GpuCommandQueue, ModelCache, RenderTarget, Sampler, TextureHandle, TextureSource,
    Uniform, ViewDescriptor, ViewId, VisibilityId, WorldService,
};
use crate::render::frame::targets::RenderTargets;
use crate::render::frame::views::{ScreenQuad, ViewAllocator};
use crate::render::primitives::draw_call::{sort_draw_calls, DrawCall, DrawCallFlags};
use crate::render::primitives::shader::{DepthVariant, GenericVariant, Program};
use crate::render::primitives::state::{ClearFlags, StateFlags, StencilState};
use crate::render::resources::materials::{FogPass, Material, MaterialCache, MaterialSort, StageUniformSet};
use crate::render::systems::stage_eval::{evaluate_depth, evaluate_stage, fog_variant, StageContext, StageInputs};
use crate::render::RenderResult;
use crate::scene::{AreaMask, SceneAggregator};

use entities::EntityPass;

/// Near plane distance
pub const Z_MIN: f32 = 4.0;
/// Far plane distance when the visible world bounds are unknown
pub const DEFAULT_Z_MAX: f32 = 2048.0;
/// Depth offset of polygon-offset materials
pub const POLYGON_DEPTH_OFFSET: f32 = -0.001;
/// Skybox face to outer-box texture
pub const SKY_TEXTURE_ORDER: [usize; 6] = [0, 2, 1, 3, 4, 5];

bitflags! {
    /// Per-invocation camera flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CameraFlags: u8 {
        /// Clip against the invocation's plane
        const USE_CLIPPING_PLANE = 1 << 0;
        /// Only draw where the stencil mask is set
        const USE_STENCIL_TEST = 1 << 1;
        /// Rendering a deferred skybox-portal scene
        const IS_SKYBOX_PORTAL = 1 << 2;
        /// The scene's sky is drawn by a skybox-portal camera
        const CONTAINS_SKYBOX_PORTAL = 1 << 3;
        /// Seen through a mirror; sprites flip
        const MIRRORED = 1 << 4;
    }
}

/// One camera to render
#[derive(Debug, Clone, PartialEq)]
pub struct CameraInvocation {
    /// Visibility cache to use
    pub vis: VisibilityId,
    /// Position the PVS is evaluated from
    pub pvs_position: Vec3,
    /// Eye position
    pub position: Vec3,
    /// Eye orientation
    pub rotation: Axes,
    /// Viewport
    pub rect: Rect,
    /// Horizontal and vertical field of view in degrees
    pub fov: Vec2,
    /// Clip plane for [`CameraFlags::USE_CLIPPING_PLANE`]
    pub clip_plane: Plane,
    /// Flags
    pub flags: CameraFlags,
}

impl CameraInvocation {
    /// A top-level camera whose PVS position is its eye position
    pub fn new(vis: VisibilityId, position: Vec3, rotation: Axes, rect: Rect, fov: Vec2) -> Self {
        Self {
            vis,
            pvs_position: position,
            position,
            rotation,
            rect,
            fov,
            clip_plane: Plane::default(),
            flags: CameraFlags::empty(),
        }
    }

    /// Add flags
    #[must_use]
    pub fn with_flags(mut self, flags: CameraFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// A stencil-tested, plane-clipped camera behind a surface of this one
    fn nested(
        &self,
        vis: VisibilityId,
        pvs_position: Vec3,
        position: Vec3,
        rotation: Axes,
        plane: Plane,
        mirrored: bool,
    ) -> Self {
        let mut flags = self.flags | CameraFlags::USE_CLIPPING_PLANE | CameraFlags::USE_STENCIL_TEST;
        flags.set(CameraFlags::MIRRORED, mirrored);

        Self { vis, pvs_position, position, rotation, rect: self.rect, fov: self.fov, clip_plane: plane, flags }
    }
}

#[derive(Debug, Clone, Copy)]
struct CameraMatrices {
    view: Mat4,
    projection: Mat4,
    view_projection: Mat4,
    frustum: Frustum,
    z_max: f32,
}

/// Borrowed frame state a camera renders with
pub struct CameraContext<'a> {
    /// Command queue
    pub queue: &'a mut dyn GpuCommandQueue,
    /// World service
    pub world: &'a mut dyn WorldService,
    /// Model cache
    pub models: &'a mut dyn ModelCache,
    /// Dynamic lights
    pub lights: &'a dyn DynamicLightManager,
    /// Entities, debug primitives and polygons of the scene
    pub scene: &'a mut SceneAggregator,
    /// Materials
    pub materials: &'a MaterialCache,
    /// Offscreen targets; set only for world scenes
    pub world_targets: Option<&'a RenderTargets>,
    /// Settings
    pub config: &'a RendererConfig,
    /// View ids of the frame
    pub views: &'a mut ViewAllocator,
    /// Allocation failure reporting
    pub warn_once: &'a mut WarnOnce,
    /// Visible areas of the scene
    pub area_mask: &'a AreaMask,
    /// Orientation of the scene camera
    pub scene_rotation: Axes,
    /// Texture bound where a stage has none
    pub white: TextureHandle,
    /// Current frame
    pub frame_number: u32,
    /// Scene time in seconds
    pub float_time: f32,
}

/// Renders cameras of one scene
pub struct CameraRenderer<'a> {
    cx: CameraContext<'a>,
}

impl<'a> CameraRenderer<'a> {
    /// Create a renderer over borrowed frame state
    pub const fn new(cx: CameraContext<'a>) -> Self {
        Self { cx }
    }

    fn stencil(&mut self, flags: CameraFlags) {
        if flags.contains(CameraFlags::USE_STENCIL_TEST) {
            self.cx.queue.set_stencil(StencilState::MASK_TEST);
        }
    }

    fn push_view(&mut self, descriptor: &ViewDescriptor) -> RenderResult<ViewId> {
        self.cx.views.push_view(self.cx.queue, descriptor)
    }

    /// Render `camera` and any cameras nested behind its surfaces
    pub fn render(&mut self, camera: &CameraInvocation) -> RenderResult<()> {
        let targets = self.cx.world_targets;
        let is_main = camera.vis == VisibilityId::Main;
        let mut z_max = DEFAULT_Z_MAX;

        if targets.is_some() {
            self.cx.world.update_visibility(camera.vis, &camera.pvs_position, self.cx.area_mask);
            let bounds = self.cx.world.visible_bounds(camera.vis);

            if !bounds.is_empty() {
                let farthest = bounds.farthest_corner_distance(&camera.position);

                if farthest > Z_MIN {
                    z_max = farthest;
                }
            }
        }

        let view = view_matrix(&camera.position, &camera.rotation);
        let projection = perspective_projection(camera.fov.x, camera.fov.y, Z_MIN, z_max);
        let view_projection = projection * view;
        let matrices = CameraMatrices {
            view,
            projection,
            view_projection,
            frustum: Frustum::from_view_projection(&view_projection),
            z_max,
        };

        if let Some(targets) = targets.filter(|_| is_main) {
            if self.cx.config.effects.water_reflections {
                self.render_reflection(camera, &matrices, targets)?;
            }

            self.render_portal(camera, &matrices, targets)?;
        }

        let mut debug_axes = Vec::new();
        let mut draw_calls = self.collect_draw_calls(camera, &matrices, &mut debug_axes);

        if draw_calls.is_empty() {
            return Ok(());
        }

        sort_draw_calls(&mut draw_calls);

        if camera.flags.contains(CameraFlags::USE_CLIPPING_PLANE) {
            self.cx.queue.set_uniform(Uniform::PortalClip, Vec4::new(1.0, 0.0, 0.0, 0.0));
            self.cx.queue.set_uniform(Uniform::PortalPlane, camera.clip_plane.to_vec4());
        } else {
            self.cx.queue.set_uniform(Uniform::PortalClip, Vec4::zeros());
        }

        if let Some(targets) = targets {
            self.render_depth_prepass(camera, &matrices, targets, &draw_calls)?;
        }

        let main_view = match targets {
            Some(targets) => ViewDescriptor::new(RenderTarget::FrameBuffer(targets.scene), camera.rect),
            None => ViewDescriptor::new(RenderTarget::Backbuffer, camera.rect).with_clear(ClearFlags::DEPTH),
        };
        let main_view = self.push_view(&main_view.with_transform(matrices.view, matrices.projection).sequential())?;

        for draw_call in &draw_calls {
            self.render_draw_call(camera, &matrices, main_view, draw_call);
        }

        debug_axes.extend_from_slice(self.cx.scene.debug_axes());
        debug_geometry::submit_axes(self.cx.queue, self.cx.warn_once, main_view, &debug_axes);
        debug_geometry::submit_bounds(self.cx.queue, self.cx.warn_once, main_view, self.cx.scene.debug_bounds());
        Ok(())
    }

    fn render_reflection(
        &mut self,
        camera: &CameraInvocation,
        matrices: &CameraMatrices,
        targets: &RenderTargets,
    ) -> RenderResult<()> {
        let Some(reflection_target) = targets.reflection else {
            return Ok(());
        };

        let Some(reflection) =
            self.cx
                .world
                .reflection_camera(camera.vis, &camera.position, &camera.rotation, &matrices.view_projection)
        else {
            return Ok(());
        };

        let mut surfaces = Vec::new();
        self.cx.world.render_reflective(camera.vis, self.cx.materials, &mut surfaces);
        self.render_stencil_mask(camera, matrices, targets, &surfaces)?;

        let nested = camera.nested(
            VisibilityId::Reflection,
            camera.pvs_position,
            reflection.camera.position,
            reflection.camera.rotation,
            reflection.plane,
            true,
        );
        self.render(&nested)?;

        self.cx.queue.set_texture(Sampler::Texture, TextureSource::frame_buffer(targets.scene));
        let blit = ScreenQuad::new(RenderTarget::FrameBuffer(reflection_target), Program::Texture);
        self.cx.views.render_screen_quad(self.cx.queue, self.cx.warn_once, &blit)
    }

    fn render_portal(
        &mut self,
        camera: &CameraInvocation,
        matrices: &CameraMatrices,
        targets: &RenderTargets,
    ) -> RenderResult<()> {
        let Some(portal) = self.cx.world.portal_camera(
            camera.vis,
            &camera.position,
            &camera.rotation,
            &matrices.view_projection,
            self.cx.scene.entities(),
        ) else {
            return Ok(());
        };

        let mut surfaces = Vec::new();
        self.cx.world.render_portal(camera.vis, self.cx.materials, &mut surfaces);
        self.render_stencil_mask(camera, matrices, targets, &surfaces)?;

        let nested = camera.nested(
            VisibilityId::Portal,
            portal.pvs_position,
            portal.camera.position,
            portal.camera.rotation,
            portal.plane,
            portal.mirrored,
        );
        self.render(&nested)
    }

    /// Write 1 into the stencil buffer wherever `surfaces` are visible
    fn render_stencil_mask(
        &mut self,
        camera: &CameraInvocation,
        matrices: &CameraMatrices,
        targets: &RenderTargets,
        surfaces: &[DrawCall],
    ) -> RenderResult<()> {
        let descriptor = ViewDescriptor::new(RenderTarget::FrameBuffer(targets.scene), camera.rect)
            .with_clear(ClearFlags::DEPTH | ClearFlags::STENCIL)
            .with_transform(matrices.view, matrices.projection);
        let view = self.push_view(&descriptor)?;
        let queue = &mut *self.cx.queue;

        for draw_call in surfaces {
            let material = self.cx.materials.resolve(draw_call.material);
            queue.set_uniform(Uniform::DepthRange, Vec4::zeros());
            queue.set_uniform(Uniform::Time, Vec4::new(material.time_at(self.cx.float_time), 0.0, 0.0, 0.0));
            material.write_deform_uniforms(queue);
            queue.set_uniform(Uniform::AlphaTest, Vec4::zeros());
            queue.set_geometry(&draw_call.geometry);
            queue.set_transform(&draw_call.model_matrix);
            queue.set_state(
                StateFlags::RGB_WRITE
                    | StateFlags::DEPTH_TEST_LESS
                    | StateFlags::DEPTH_WRITE
                    | StateFlags::MSAA
                    | material.cull_state(),
            );
            queue.set_stencil(StencilState::MASK_WRITE);
            queue.submit(view, Program::Depth(DepthVariant::empty()));
        }

        Ok(())
    }

    fn collect_draw_calls(
        &mut self,
        camera: &CameraInvocation,
        matrices: &CameraMatrices,
        debug_axes: &mut Vec<Vec3>,
    ) -> Vec<DrawCall> {
        let cx = &mut self.cx;
        let is_main = camera.vis == VisibilityId::Main;
        let mut draw_calls = Vec::new();

        if cx.world_targets.is_some() {
            if camera.flags.contains(CameraFlags::IS_SKYBOX_PORTAL)
                || !camera.flags.contains(CameraFlags::CONTAINS_SKYBOX_PORTAL)
            {
                cx.world.render_sky(camera.vis, &camera.position, matrices.z_max, cx.materials, cx.queue, &mut draw_calls);
            }

            cx.world.render(camera.vis, &cx.scene_rotation, cx.materials, &mut draw_calls);
        }

        let keys: Vec<EntityKey> = cx.scene.entity_keys().to_vec();
        let mut pass = EntityPass {
            queue: &mut *cx.queue,
            world: cx.world_targets.map(|_| &*cx.world),
            models: &mut *cx.models,
            lights: cx.lights,
            materials: cx.materials,
            effects: &cx.config.effects,
            warn_once: &mut *cx.warn_once,
            frame_number: cx.frame_number,
            mirrored: camera.flags.contains(CameraFlags::MIRRORED),
            view_position: camera.position,
            view_rotation: camera.rotation,
            scene_rotation: cx.scene_rotation,
            frustum: matrices.frustum,
        };

        for key in keys {
            let Some(entity) = cx.scene.entities_mut().get_mut(key) else {
                continue;
            };

            if entity.hidden_from(is_main) {
                continue;
            }

            pass.render(key, entity, &mut draw_calls, debug_axes);
        }

        cx.scene.render_polygons(pass.queue, cx.materials, pass.warn_once, &mut draw_calls);
        draw_calls
    }

    fn render_depth_prepass(
        &mut self,
        camera: &CameraInvocation,
        matrices: &CameraMatrices,
        targets: &RenderTargets,
        draw_calls: &[DrawCall],
    ) -> RenderResult<()> {
        let descriptor = ViewDescriptor::new(RenderTarget::FrameBuffer(targets.scene), camera.rect)
            .with_clear(ClearFlags::DEPTH)
            .with_transform(matrices.view, matrices.projection);
        let view = self.push_view(&descriptor)?;

        for draw_call in draw_calls {
            let material = self.cx.materials.resolve(draw_call.material);

            if material.sort != MaterialSort::Opaque || material.unfogged_passes == 0 {
                continue;
            }

            if camera.vis == VisibilityId::Reflection && material.reflective {
                continue;
            }

            let queue = &mut *self.cx.queue;
            queue.set_uniform(Uniform::Time, Vec4::new(material.time_at(self.cx.float_time), 0.0, 0.0, 0.0));
            queue.set_uniform(
                Uniform::DepthRange,
                Vec4::new(draw_call.z_offset, draw_call.z_scale, Z_MIN, matrices.z_max),
            );
            material.write_deform_uniforms(queue);

            let resolution = evaluate_depth(material, draw_call);

            if let Some(stage) = resolution.alpha_test_stage {
                stage.write_uniforms(queue, StageUniformSet::TexGen);
                let texture = stage.primary_texture().unwrap_or(self.cx.white);
                queue.set_texture(Sampler::Texture, TextureSource::Texture(texture));
            } else {
                queue.set_uniform(Uniform::AlphaTest, Vec4::zeros());
            }

            queue.set_geometry(&draw_call.geometry);
            queue.set_transform(&draw_call.model_matrix);
            queue.set_state(resolution.state);
            self.stencil(camera.flags);
            self.cx.queue.submit(view, Program::Depth(resolution.variant));
        }

        self.cx.queue.set_uniform(Uniform::DepthRange, Vec4::new(0.0, 0.0, Z_MIN, matrices.z_max));
        self.cx.queue.set_texture(
            Sampler::Texture,
            TextureSource::Attachment { frame_buffer: targets.scene, attachment: targets.scene_depth_attachment },
        );
        let linear_depth = ScreenQuad::new(RenderTarget::FrameBuffer(targets.linear_depth), Program::LinearDepth);
        self.cx.views.render_screen_quad(self.cx.queue, self.cx.warn_once, &linear_depth)
    }

    fn render_skybox_face(
        &mut self,
        camera: &CameraInvocation,
        matrices: &CameraMatrices,
        view: ViewId,
        draw_call: &DrawCall,
        material: &Material,
    ) {
        let queue = &mut *self.cx.queue;
        queue.set_uniform(Uniform::DepthRange, Vec4::new(draw_call.z_offset, draw_call.z_scale, Z_MIN, matrices.z_max));
        queue.set_uniform(Uniform::DynamicLightNumIntensity, Vec4::zeros());
        queue.set_uniform(Uniform::DeformCount, Vec4::zeros());
        queue.set_uniform(Uniform::AlphaTest, Vec4::zeros());
        queue.set_uniform(Uniform::BaseColor, Vec4::new(1.0, 1.0, 1.0, 1.0));
        queue.set_uniform(Uniform::Generators, Vec4::zeros());
        queue.set_uniform(Uniform::LightType, Vec4::zeros());
        queue.set_uniform(Uniform::VertexColor, Vec4::new(0.0, 0.0, 0.0, 1.0));

        let face = SKY_TEXTURE_ORDER.get(draw_call.skybox_side).copied().unwrap_or(0);
        let texture = material.sky.map_or(self.cx.white, |sky| sky.outer_box[face]);
        queue.set_texture(Sampler::Diffuse, TextureSource::Texture(texture));
        queue.set_geometry(&draw_call.geometry);
        queue.set_transform(&draw_call.model_matrix);
        queue.set_state(draw_call.state);
        self.stencil(camera.flags);

        let mut variant = GenericVariant::DEPTH_RANGE;

        if self.cx.config.postprocess.hdr {
            variant |= GenericVariant::HDR;
            self.cx.queue.set_uniform(Uniform::BloomEnabled, Vec4::zeros());
        }

        self.cx.queue.submit(view, Program::Generic(variant));
    }

    fn render_draw_call(&mut self, camera: &CameraInvocation, matrices: &CameraMatrices, view: ViewId, draw_call: &DrawCall) {
        let materials = self.cx.materials;
        let original = materials.get(draw_call.material);
        let material = materials.resolve(draw_call.material);

        if camera.vis == VisibilityId::Reflection && material.reflective {
            return;
        }

        if draw_call.flags.contains(DrawCallFlags::SKYBOX) {
            self.render_skybox_face(camera, matrices, view, draw_call, material);
            return;
        }

        let fogged = !original.no_fog && draw_call.fog_index.is_some();
        let fog_pass = fogged && material.fog_pass != FogPass::None;

        if material.unfogged_passes == 0 && !fog_pass {
            return;
        }

        let world_scene = self.cx.world_targets.is_some();
        let entity = draw_call.entity.and_then(|key| self.cx.scene.entities().get(key));
        let local_view_position = entity.map_or(camera.position, |entity| entity.local_view_position);
        let material_time = material.time_at(self.cx.float_time);

        {
            let queue = &mut *self.cx.queue;
            queue.set_uniform(Uniform::Time, Vec4::new(material_time, 0.0, 0.0, 0.0));

            if world_scene {
                self.cx.lights.write_uniforms(queue);
            } else {
                queue.set_uniform(Uniform::DynamicLightNumIntensity, Vec4::zeros());
            }

            let depth_range = if material.polygon_offset {
                Vec4::new(POLYGON_DEPTH_OFFSET, 1.0, Z_MIN, matrices.z_max)
            } else {
                Vec4::new(draw_call.z_offset, draw_call.z_scale, Z_MIN, matrices.z_max)
            };
            queue.set_uniform(Uniform::DepthRange, depth_range);
            queue.set_uniform(Uniform::ViewOrigin, camera.position.push(0.0));
            queue.set_uniform(Uniform::ViewUp, camera.rotation.up.push(0.0));
            material.write_deform_uniforms(queue);
            queue.set_uniform(Uniform::LocalViewOrigin, local_view_position.push(0.0));

            if let Some(entity) = entity {
                queue.set_uniform(Uniform::AmbientLight, (entity.lighting.ambient / 255.0).push(0.0));
                queue.set_uniform(Uniform::DirectedLight, (entity.lighting.directed / 255.0).push(0.0));
                queue.set_uniform(Uniform::LightDirection, entity.lighting.direction.push(0.0));
            }
        }

        let mut fog_color = Vec4::zeros();

        if let Some(fog_index) = draw_call.fog_index.filter(|_| fogged) {
            let fog = self.cx.world.fog(&FogQuery {
                fog_index,
                model_matrix: draw_call.model_matrix,
                model_view_matrix: matrices.view * draw_call.model_matrix,
                view_position: camera.position,
                local_view_position,
                view_rotation: camera.rotation,
            });
            self.cx.queue.set_uniform(Uniform::FogDistance, fog.distance);
            self.cx.queue.set_uniform(Uniform::FogDepth, fog.depth);
            self.cx.queue.set_uniform(Uniform::FogEyeT, Vec4::new(fog.eye_t, 0.0, 0.0, 0.0));
            fog_color = fog.color;
        }

        let context = StageContext {
            world_scene,
            hdr: self.cx.config.postprocess.hdr,
            soft_sprites: self.cx.config.effects.soft_sprites,
            fogged,
        };
        let inputs = StageInputs {
            white: self.cx.white,
            linear_depth: self.cx.world_targets.map(|targets| TextureSource::frame_buffer(targets.linear_depth)),
            dynamic_lights: world_scene.then(|| self.cx.lights.textures()),
        };

        for stage in material.stages.iter().filter(|stage| stage.active) {
            let resolution = evaluate_stage(stage, material, draw_call, &context);
            resolution.apply(stage, material_time, &inputs, self.cx.queue);
            self.cx.queue.set_geometry(&draw_call.geometry);
            self.cx.queue.set_transform(&draw_call.model_matrix);
            self.stencil(camera.flags);
            self.cx.queue.submit(view, Program::Generic(resolution.variant));
        }

        if self.cx.config.effects.wireframe {
            let queue = &mut *self.cx.queue;
            queue.set_uniform(Uniform::Color, Vec4::new(1.0, 1.0, 1.0, 1.0));
            queue.set_geometry(&draw_call.geometry);
            queue.set_state(draw_call.state | StateFlags::DEPTH_TEST_ALWAYS | StateFlags::PT_LINES);
            queue.set_texture(Sampler::Texture, TextureSource::Texture(self.cx.white));
            queue.set_transform(&draw_call.model_matrix);
            queue.submit(view, Program::TextureColor);
        }

        if fog_pass {
            let depth_test = if material.fog_pass == FogPass::Equal {
                StateFlags::DEPTH_TEST_EQUAL
            } else {
                StateFlags::DEPTH_TEST_LEQUAL
            };

            let queue = &mut *self.cx.queue;
            queue.set_uniform(Uniform::Color, fog_color);
            queue.set_geometry(&draw_call.geometry);
            queue.set_transform(&draw_call.model_matrix);
            queue.set_state(draw_call.state | StateFlags::BLEND_ALPHA | depth_test);
            self.stencil(camera.flags);
            self.cx.queue.submit(view, Program::Fog(fog_variant(draw_call, self.cx.config.postprocess.hdr)));
        }
    }
}
