//! Services the renderer consumes but does not implement
//!
//! World visibility, the model cache and the dynamic-light manager are owned by
//! the host. The renderer only needs the narrow contracts below; the draw calls
//! they emit are plain values and carry no references back into the service.

use crate::foundation::collections::EntityKey;
use crate::foundation::math::{Axes, Bounds, Frustum, Mat4, Plane, Vec3, Vec4};
use crate::render::primitives::draw_call::DrawCall;
use crate::render::resources::materials::MaterialCache;
use crate::render::RenderResult;
use crate::scene::{AreaMask, DynamicLight, Entity, EntityArena};

use super::command_queue::{GpuCommandQueue, TextureHandle};

/// Which camera a visibility query is for
///
/// The world keeps one visibility cache per id so nested cameras do not
/// clobber the main camera's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisibilityId {
    /// The scene camera
    Main,
    /// Camera mirrored in a reflective surface
    Reflection,
    /// Camera looking through a portal surface
    Portal,
    /// Camera of a deferred skybox-portal scene
    SkyboxPortal,
}

/// Opaque model cache handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelHandle(pub u32);

/// Position and orientation of a derived camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraTransform {
    /// Camera position
    pub position: Vec3,
    /// Camera orientation
    pub rotation: Axes,
}

/// Camera mirrored in a reflective surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReflectionCamera {
    /// Mirrored camera
    pub camera: CameraTransform,
    /// Surface plane, used as the clip plane
    pub plane: Plane,
}

/// Camera looking through a portal surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortalCamera {
    /// Visibility query position on the far side of the portal
    pub pvs_position: Vec3,
    /// Portal camera
    pub camera: CameraTransform,
    /// Whether the portal flips handedness
    pub mirrored: bool,
    /// Portal plane, used as the clip plane
    pub plane: Plane,
}

/// Inputs of a fog evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FogQuery {
    /// Fog volume
    pub fog_index: usize,
    /// Model transform of the fogged geometry
    pub model_matrix: Mat4,
    /// View matrix times model matrix
    pub model_view_matrix: Mat4,
    /// Camera position
    pub view_position: Vec3,
    /// Camera position in model space
    pub local_view_position: Vec3,
    /// Camera orientation
    pub view_rotation: Axes,
}

/// Fog shader parameters for one draw call
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FogParameters {
    /// Fog color
    pub color: Vec4,
    /// Distance vector
    pub distance: Vec4,
    /// Depth vector
    pub depth: Vec4,
    /// Eye-to-fog-plane parameter
    pub eye_t: f32,
}

/// Light estimate at a point
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LightSample {
    /// Ambient color, 0-255 range
    pub ambient: Vec3,
    /// Directed color, 0-255 range
    pub directed: Vec3,
    /// Direction towards the light
    pub direction: Vec3,
}

/// GPU textures holding the clustered dynamic lights
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicLightTextures {
    /// Cell grid
    pub cells: TextureHandle,
    /// Light indices per cell
    pub indices: TextureHandle,
    /// Light data
    pub lights: TextureHandle,
}

/// World geometry and visibility
pub trait WorldService {
    /// Load a world by name
    fn load(&mut self, name: &str) -> RenderResult<()>;

    /// Whether a world is loaded
    fn is_loaded(&self) -> bool;

    /// Rebuild the visibility cache of `vis` for a PVS position
    fn update_visibility(&mut self, vis: VisibilityId, pvs_position: &Vec3, area_mask: &AreaMask);

    /// Bounds of everything visible to `vis`
    fn visible_bounds(&self, vis: VisibilityId) -> Bounds;

    /// Emit draw calls for the visible sky surfaces
    fn render_sky(
        &mut self,
        vis: VisibilityId,
        position: &Vec3,
        z_max: f32,
        materials: &MaterialCache,
        queue: &mut dyn GpuCommandQueue,
        draw_calls: &mut Vec<DrawCall>,
    );

    /// Emit draw calls for the visible world surfaces
    fn render(
        &mut self,
        vis: VisibilityId,
        scene_rotation: &Axes,
        materials: &MaterialCache,
        draw_calls: &mut Vec<DrawCall>,
    );

    /// Find a visible reflective surface and mirror the camera in it
    fn reflection_camera(
        &self,
        vis: VisibilityId,
        position: &Vec3,
        rotation: &Axes,
        view_projection: &Mat4,
    ) -> Option<ReflectionCamera>;

    /// Emit draw calls for the reflective surface found by [`Self::reflection_camera`]
    fn render_reflective(&mut self, vis: VisibilityId, materials: &MaterialCache, draw_calls: &mut Vec<DrawCall>);

    /// Find a visible portal surface and compute the camera behind it
    fn portal_camera(
        &self,
        vis: VisibilityId,
        position: &Vec3,
        rotation: &Axes,
        view_projection: &Mat4,
        entities: &EntityArena,
    ) -> Option<PortalCamera>;

    /// Emit draw calls for the portal surface found by [`Self::portal_camera`]
    fn render_portal(&mut self, vis: VisibilityId, materials: &MaterialCache, draw_calls: &mut Vec<DrawCall>);

    /// Fog parameters for a fogged draw call
    fn fog(&self, query: &FogQuery) -> FogParameters;

    /// Fog volume containing a sphere
    fn find_fog_index_for_sphere(&self, position: &Vec3, radius: f32) -> Option<usize>;

    /// Fog volume containing a box
    fn find_fog_index_for_bounds(&self, bounds: &Bounds) -> Option<usize>;

    /// Whether the world has a baked light grid
    fn has_light_grid(&self) -> bool;

    /// Sample the light grid
    fn sample_light_grid(&self, position: &Vec3) -> LightSample;

    /// Lightmap textures, for the debug overlay
    fn lightmaps(&self) -> Vec<TextureHandle>;
}

/// Renderable models
pub trait ModelCache {
    /// Whether the entity's model lies entirely outside the frustum
    fn is_culled(&self, model: ModelHandle, entity: &Entity, frustum: &Frustum) -> bool;

    /// Emit draw calls for an entity
    #[allow(clippy::too_many_arguments)]
    fn render(
        &mut self,
        model: ModelHandle,
        key: EntityKey,
        entity: &Entity,
        scene_rotation: &Axes,
        materials: &MaterialCache,
        queue: &mut dyn GpuCommandQueue,
        draw_calls: &mut Vec<DrawCall>,
    );
}

/// Per-frame point lights
pub trait DynamicLightManager {
    /// Add a light for `frame_number`
    fn add(&mut self, frame_number: u32, light: &DynamicLight);

    /// Drop every light
    fn clear(&mut self);

    /// Build the cell grid for a freshly loaded world
    fn initialize_grid(&mut self);

    /// Upload the light, cell and index textures
    fn update_textures(&mut self, frame_number: u32, queue: &mut dyn GpuCommandQueue);

    /// Write the light count / intensity uniform
    fn write_uniforms(&self, queue: &mut dyn GpuCommandQueue);

    /// Add the lights' contribution at a point to a directed light estimate
    fn contribute(&self, frame_number: u32, position: &Vec3, directed_light: &mut Vec3, light_direction: &mut Vec3);

    /// GPU textures
    fn textures(&self) -> DynamicLightTextures;

    /// Number of lights added this frame
    fn light_count(&self) -> usize;
}
