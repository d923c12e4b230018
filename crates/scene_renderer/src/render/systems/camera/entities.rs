//! Entity draw call emission
//!
//! Models are handed to the model cache. Sprites, rail trails and lightning
//! are procedural: their geometry is built here into scratch buffers, one
//! draw call per primitive, with dynamic lighting off.

use crate::core::config::EffectsConfig;
use crate::foundation::collections::EntityKey;
use crate::foundation::logging::{WarnOnce, WarnOnceId};
use crate::foundation::math::{
    perpendicular_vectors, rotate_around_direction, to_linear, Axes, ClipResult, Frustum, Vec2, Vec3, Vec4,
};
use crate::render::api::{DynamicLightManager, GpuCommandQueue, ModelCache, WorldService};
use crate::render::primitives::draw_call::DrawCall;
use crate::render::primitives::geometry::Vertex;
use crate::render::resources::materials::MaterialCache;
use crate::scene::{Entity, EntityKind, EntityLighting};

/// Light value before overbright scaling used when no light grid exists
const DEFAULT_LIGHT: f32 = 150.0;
/// Minimum ambient add
const MINIMUM_AMBIENT: f32 = 32.0;
/// Ambient ceiling per channel
const MAXIMUM_AMBIENT: f32 = 255.0;
/// Rail core texture repeats every this many units
const RAIL_CORE_TEXTURE_LENGTH: f32 = 256.0;
/// Ring radius as a fraction of the rail width
const RAIL_RING_SCALE: f32 = 0.25;

/// Compute the lighting of a model entity
///
/// `world` is only passed for world scenes. Without a light grid the entity
/// gets a flat light from the sun direction; outside world scenes the dynamic
/// lights are folded in here instead of in the shader.
pub fn setup_entity_lighting(
    entity: &Entity,
    world: Option<&dyn WorldService>,
    lights: &dyn DynamicLightManager,
    effects: &EffectsConfig,
    frame_number: u32,
) -> EntityLighting {
    let identity_light = effects.identity_light();
    let light_position = entity.light_position();

    let mut lighting = match world {
        Some(world) if world.has_light_grid() => {
            let sample = world.sample_light_grid(&light_position);
            EntityLighting { ambient: sample.ambient, directed: sample.directed, direction: sample.direction }
        }
        _ => EntityLighting {
            ambient: Vec3::repeat(identity_light * DEFAULT_LIGHT),
            directed: Vec3::repeat(identity_light * DEFAULT_LIGHT),
            direction: effects.sun_direction(),
        },
    };

    lighting.ambient += Vec3::repeat(identity_light * MINIMUM_AMBIENT);
    lighting.ambient = lighting.ambient.map(|channel| channel.min(identity_light * MAXIMUM_AMBIENT));

    if world.is_none() {
        lights.contribute(frame_number, &light_position, &mut lighting.directed, &mut lighting.direction);
    }

    lighting.direction = lighting.direction.try_normalize(f32::EPSILON).unwrap_or(lighting.direction);
    lighting
}

fn normalize_or_zero(v: Vec3) -> Vec3 {
    v.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::zeros)
}

/// Everything the entity pass of one camera needs
pub struct EntityPass<'f> {
    /// Command queue, for scratch geometry
    pub queue: &'f mut dyn GpuCommandQueue,
    /// World, set for world scenes
    pub world: Option<&'f dyn WorldService>,
    /// Model cache
    pub models: &'f mut dyn ModelCache,
    /// Dynamic lights
    pub lights: &'f dyn DynamicLightManager,
    /// Materials
    pub materials: &'f MaterialCache,
    /// Rail and lighting constants
    pub effects: &'f EffectsConfig,
    /// Allocation failure reporting
    pub warn_once: &'f mut WarnOnce,
    /// Current frame
    pub frame_number: u32,
    /// Camera is seen through a mirror
    pub mirrored: bool,
    /// Camera position
    pub view_position: Vec3,
    /// Camera orientation
    pub view_rotation: Axes,
    /// Orientation of the scene camera
    pub scene_rotation: Axes,
    /// Camera frustum
    pub frustum: Frustum,
}

impl EntityPass<'_> {
    /// Emit the draw calls of one entity
    ///
    /// The entity's local view position and lighting are updated in place so
    /// the main pass can read them back. Model entities without a model add
    /// their position to `debug_axes`.
    pub fn render(
        &mut self,
        key: EntityKey,
        entity: &mut Entity,
        draw_calls: &mut Vec<DrawCall>,
        debug_axes: &mut Vec<Vec3>,
    ) {
        entity.local_view_position = entity.compute_local_view_position(&self.view_position);

        match entity.kind {
            EntityKind::Beam => {}
            EntityKind::Lightning => self.render_lightning(key, entity, draw_calls),
            EntityKind::RailCore => self.render_rail_core_entity(key, entity, draw_calls),
            EntityKind::RailRings => self.render_rail_rings(key, entity, draw_calls),
            EntityKind::Sprite => {
                if self.frustum.clip_sphere(&entity.position, entity.radius) != ClipResult::Outside {
                    self.render_sprite(key, entity, draw_calls);
                }
            }
            EntityKind::Model(None) => debug_axes.push(entity.position),
            EntityKind::Model(Some(model)) => {
                if self.models.is_culled(model, entity, &self.frustum) {
                    return;
                }

                entity.lighting =
                    setup_entity_lighting(entity, self.world, self.lights, self.effects, self.frame_number);
                self.models.render(
                    model,
                    key,
                    entity,
                    &self.scene_rotation,
                    self.materials,
                    self.queue,
                    draw_calls,
                );
            }
        }
    }

    fn procedural_draw_call(&self, key: EntityKey, entity: &Entity, draw_call: DrawCall) -> DrawCall {
        let fog_index = self
            .world
            .and_then(|world| world.find_fog_index_for_sphere(&entity.position, entity.radius));

        draw_call.with_entity(key).with_fog_index(fog_index).with_dynamic_lighting(false)
    }

    fn render_lightning(&mut self, key: EntityKey, entity: &Entity, draw_calls: &mut Vec<DrawCall>) {
        let start = entity.position;
        let end = entity.old_position;
        let delta = end - start;
        let length = delta.norm();
        let direction = normalize_or_zero(delta);

        let v1 = normalize_or_zero(start - self.view_position);
        let v2 = normalize_or_zero(end - self.view_position);
        let mut right = normalize_or_zero(v1.cross(&v2));

        for _ in 0..4 {
            self.render_rail_core(key, entity, start, end, right, length, draw_calls);
            right = rotate_around_direction(&right, &direction, 45.0);
        }
    }

    fn render_rail_core_entity(&mut self, key: EntityKey, entity: &Entity, draw_calls: &mut Vec<DrawCall>) {
        let start = entity.old_position;
        let end = entity.position;
        let length = (end - start).norm();

        let v1 = normalize_or_zero(start - self.view_position);
        let v2 = normalize_or_zero(end - self.view_position);
        let right = normalize_or_zero(v1.cross(&v2));

        self.render_rail_core(key, entity, start, end, right, length, draw_calls);
    }

    fn render_rail_core(
        &mut self,
        key: EntityKey,
        entity: &Entity,
        start: Vec3,
        end: Vec3,
        up: Vec3,
        length: f32,
        draw_calls: &mut Vec<DrawCall>,
    ) {
        let span = up * self.effects.rail_core_width;
        let t = length / RAIL_CORE_TEXTURE_LENGTH;
        let color = to_linear(&entity.material_color);
        let dim = entity.material_color.xyz() * 0.25;
        let start_color = to_linear(&Vec4::new(dim.x, dim.y, dim.z, 1.0));

        let vertices = [
            Vertex::new(start + span).with_tex_coord(Vec2::new(0.0, 0.0)).with_color(start_color),
            Vertex::new(start - span).with_tex_coord(Vec2::new(0.0, 1.0)).with_color(color),
            Vertex::new(end + span).with_tex_coord(Vec2::new(t, 0.0)).with_color(color),
            Vertex::new(end - span).with_tex_coord(Vec2::new(t, 1.0)).with_color(color),
        ];

        let Some(buffers) = self.queue.alloc_transient(&vertices, &[0, 1, 2, 2, 1, 3]) else {
            self.warn_once.transient_alloc_failed(WarnOnceId::RailCore);
            return;
        };

        let material = self.materials.get(entity.custom_material);
        let draw_call = self.procedural_draw_call(key, entity, DrawCall::new(buffers.whole(), material));
        draw_calls.push(draw_call);
    }

    fn render_rail_rings(&mut self, key: EntityKey, entity: &Entity, draw_calls: &mut Vec<DrawCall>) {
        let start = entity.old_position;
        let delta = entity.position - start;
        let length = delta.norm();
        let direction = normalize_or_zero(delta);
        let (right, up) = perpendicular_vectors(&direction);
        let segment_length = self.effects.rail_segment_length.max(f32::EPSILON);
        let step = direction * segment_length;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let mut segments = (length / segment_length).max(1.0) as usize;

        if segments > 1 {
            segments -= 1;
        }

        let Ok(vertex_count) = u16::try_from(segments * 4) else {
            self.warn_once.transient_alloc_failed(WarnOnceId::RailRings);
            return;
        };

        let radius = RAIL_RING_SCALE * self.effects.rail_width;
        let mut positions: [Vec3; 4] = std::array::from_fn(|i| {
            #[allow(clippy::cast_precision_loss)]
            let angle = (45.0 + i as f32 * 90.0).to_radians();
            // Long shots start one segment out.
            start + (right * angle.cos() + up * angle.sin()) * radius + step
        });

        let mut vertices = Vec::with_capacity(usize::from(vertex_count));
        let mut indices = Vec::with_capacity(segments * 6);

        for offset in (0..vertex_count).step_by(4) {
            for (j, position) in positions.iter_mut().enumerate() {
                let u = if j < 2 { 1.0 } else { 0.0 };
                let v = if j != 0 && j != 3 { 1.0 } else { 0.0 };
                vertices.push(
                    Vertex::new(*position)
                        .with_tex_coord(Vec2::new(u, v))
                        .with_color(entity.material_color),
                );
                *position += step;
            }

            indices.extend_from_slice(&[offset, offset + 1, offset + 3, offset + 3, offset + 1, offset + 2]);
        }

        let Some(buffers) = self.queue.alloc_transient(&vertices, &indices) else {
            self.warn_once.transient_alloc_failed(WarnOnceId::RailRings);
            return;
        };

        let material = self.materials.get(entity.custom_material);
        let draw_call = self.procedural_draw_call(key, entity, DrawCall::new(buffers.whole(), material));
        draw_calls.push(draw_call);
    }

    fn render_sprite(&mut self, key: EntityKey, entity: &Entity, draw_calls: &mut Vec<DrawCall>) {
        let (mut left, up) = sprite_extents(&self.view_rotation, entity.radius, entity.angle);

        if self.mirrored {
            left = -left;
        }

        let p = entity.position;
        let normal = -self.view_rotation.forward;
        let color = to_linear(&entity.material_color);
        let corners = [
            (p + left + up, Vec2::new(0.0, 0.0)),
            (p - left + up, Vec2::new(1.0, 0.0)),
            (p - left - up, Vec2::new(1.0, 1.0)),
            (p + left - up, Vec2::new(0.0, 1.0)),
        ];
        let vertices = corners.map(|(position, tex_coord)| {
            Vertex::new(position)
                .with_normal(normal)
                .with_tex_coords(tex_coord)
                .with_color(color)
        });

        let Some(buffers) = self.queue.alloc_transient(&vertices, &[0, 1, 3, 3, 1, 2]) else {
            self.warn_once.transient_alloc_failed(WarnOnceId::Sprite);
            return;
        };

        let material = self.materials.get(entity.custom_material);
        let draw_call = DrawCall::new(buffers.whole(), material).with_soft_sprite_depth(entity.radius / 2.0);
        draw_calls.push(self.procedural_draw_call(key, entity, draw_call));
    }
}

/// Left and up half-extents of a camera-facing sprite rotated by `angle` degrees
pub fn sprite_extents(view_rotation: &Axes, radius: f32, angle: f32) -> (Vec3, Vec3) {
    if angle == 0.0 {
        return (view_rotation.left * radius, view_rotation.up * radius);
    }

    let (s, c) = angle.to_radians().sin_cos();
    let left = view_rotation.left * (c * radius) + view_rotation.up * (-s * radius);
    let up = view_rotation.up * (c * radius) + view_rotation.left * (s * radius);
    (left, up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::MaterialHandle;
    use crate::foundation::math::{perspective_projection, view_matrix};
    use crate::render::api::{LightSample, RecordingQueue};
    use crate::render::tests::support::{LightState, MockLights, MockModels, MockWorld, ModelState, WorldState};
    use approx::assert_relative_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Services for a camera at the origin looking down +x
    struct Fixture {
        queue: RecordingQueue,
        models: MockModels,
        lights: MockLights,
        materials: MaterialCache,
        effects: EffectsConfig,
        warn_once: WarnOnce,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                queue: RecordingQueue::default(),
                models: MockModels(Rc::new(RefCell::new(ModelState::default()))),
                lights: MockLights(Rc::new(RefCell::new(LightState::default()))),
                materials: MaterialCache::new(),
                effects: EffectsConfig::default(),
                warn_once: WarnOnce::new(),
            }
        }

        fn pass(&mut self, mirrored: bool) -> EntityPass<'_> {
            let view = view_matrix(&Vec3::zeros(), &Axes::identity());
            let projection = perspective_projection(90.0, 73.74, 4.0, 2048.0);

            EntityPass {
                queue: &mut self.queue,
                world: None,
                models: &mut self.models,
                lights: &self.lights,
                materials: &self.materials,
                effects: &self.effects,
                warn_once: &mut self.warn_once,
                frame_number: 0,
                mirrored,
                view_position: Vec3::zeros(),
                view_rotation: Axes::identity(),
                scene_rotation: Axes::identity(),
                frustum: Frustum::from_view_projection(&(projection * view)),
            }
        }

        fn render(&mut self, entity: Entity, mirrored: bool) -> (Vec<DrawCall>, Vec<Vec3>) {
            let mut entity = entity;
            let mut draw_calls = Vec::new();
            let mut debug_axes = Vec::new();
            self.pass(mirrored)
                .render(EntityKey::default(), &mut entity, &mut draw_calls, &mut debug_axes);
            (draw_calls, debug_axes)
        }
    }

    fn sprite(position: Vec3) -> Entity {
        Entity::new(EntityKind::Sprite, position).with_radius(8.0)
    }

    fn trail(kind: EntityKind, from: Vec3, to: Vec3, color: Vec4) -> Entity {
        Entity::new(kind, to)
            .with_old_position(from)
            .with_material(MaterialHandle::default(), color)
    }

    #[test]
    fn test_sprite_extents_rotate_with_angle() {
        let axes = Axes::identity();
        let (left, up) = sprite_extents(&axes, 2.0, 0.0);
        assert_relative_eq!(left, Vec3::new(0.0, 2.0, 0.0));
        assert_relative_eq!(up, Vec3::new(0.0, 0.0, 2.0));

        let (left, up) = sprite_extents(&axes, 2.0, 90.0);
        assert_relative_eq!(left, Vec3::new(0.0, 0.0, -2.0), epsilon = 1e-5);
        assert_relative_eq!(up, Vec3::new(0.0, 2.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_sprite_fades_over_half_its_radius() {
        let mut fixture = Fixture::new();
        let (draw_calls, _) = fixture.render(sprite(Vec3::new(100.0, 0.0, 0.0)), false);

        let [draw_call] = draw_calls.as_slice() else {
            panic!("expected one sprite draw call");
        };
        assert_relative_eq!(draw_call.soft_sprite_depth, 4.0);
        assert!(!draw_call.dynamic_lighting);
        assert_eq!(draw_call.entity, Some(EntityKey::default()));
        assert_eq!(fixture.queue.transients()[0].indices, vec![0, 1, 3, 3, 1, 2]);
    }

    #[test]
    fn test_mirrored_camera_flips_sprite_left() {
        let mut fixture = Fixture::new();
        fixture.render(sprite(Vec3::new(100.0, 0.0, 0.0)), false);
        fixture.render(sprite(Vec3::new(100.0, 0.0, 0.0)), true);

        let [direct, mirrored] = fixture.queue.transients() else {
            panic!("expected two sprite quads");
        };
        assert_eq!(direct.vertices[0].position, [100.0, 8.0, 8.0]);
        assert_eq!(mirrored.vertices[0].position, [100.0, -8.0, 8.0]);
    }

    #[test]
    fn test_sprites_behind_the_camera_are_culled() {
        let mut fixture = Fixture::new();
        let (draw_calls, _) = fixture.render(sprite(Vec3::new(-100.0, 0.0, 0.0)), false);

        assert!(draw_calls.is_empty());
        assert!(fixture.queue.transients().is_empty());
    }

    #[test]
    fn test_rail_core_dims_its_start_and_repeats_texture() {
        let mut fixture = Fixture::new();
        let color = Vec4::new(0.8, 0.4, 0.2, 1.0);
        let rail = trail(EntityKind::RailCore, Vec3::new(100.0, 0.0, 0.0), Vec3::new(100.0, 512.0, 0.0), color);
        let (draw_calls, _) = fixture.render(rail, false);

        assert_eq!(draw_calls.len(), 1);
        let vertices = &fixture.queue.transients()[0].vertices;
        assert_relative_eq!(
            Vec4::from(vertices[0].color),
            to_linear(&Vec4::new(0.2, 0.1, 0.05, 1.0)),
            epsilon = 1e-6
        );
        assert_relative_eq!(Vec4::from(vertices[1].color), to_linear(&color), epsilon = 1e-6);
        assert_eq!(vertices[2].tex_coord, [2.0, 0.0]);
        assert_eq!(vertices[3].tex_coord, [2.0, 1.0]);

        let width = (Vec3::from(vertices[0].position) - Vec3::from(vertices[1].position)).norm();
        assert_relative_eq!(width, 2.0 * fixture.effects.rail_core_width, epsilon = 1e-4);
    }

    #[test]
    fn test_rail_rings_stop_one_segment_short() {
        let mut fixture = Fixture::new();
        let white = Vec4::new(1.0, 1.0, 1.0, 1.0);
        fixture.render(trail(EntityKind::RailRings, Vec3::zeros(), Vec3::new(128.0, 0.0, 0.0), white), false);
        fixture.render(trail(EntityKind::RailRings, Vec3::zeros(), Vec3::new(10.0, 0.0, 0.0), white), false);

        let [long, short] = fixture.queue.transients() else {
            panic!("expected two ring strips");
        };
        assert_eq!(long.vertices.len(), 12);
        assert_eq!(long.indices.len(), 18);
        assert_eq!(long.indices[..6], [0, 1, 3, 3, 1, 2]);
        assert_eq!(short.vertices.len(), 4);
        assert_relative_eq!(long.vertices[0].position[0], 32.0, epsilon = 1e-4);
    }

    #[test]
    fn test_rail_rings_beyond_index_range_are_dropped() {
        let mut fixture = Fixture::new();
        fixture.effects.rail_segment_length = 1.0;
        let rail = trail(EntityKind::RailRings, Vec3::zeros(), Vec3::new(70_000.0, 0.0, 0.0), Vec4::zeros());
        let (draw_calls, _) = fixture.render(rail, false);

        assert!(draw_calls.is_empty());
        assert!(fixture.queue.transients().is_empty());
        assert!(fixture.warn_once.has_warned(WarnOnceId::RailRings));
    }

    #[test]
    fn test_lightning_is_four_crossed_quads() {
        let mut fixture = Fixture::new();
        let bolt = trail(
            EntityKind::Lightning,
            Vec3::new(100.0, 100.0, 0.0),
            Vec3::new(100.0, 0.0, 0.0),
            Vec4::new(0.5, 0.5, 1.0, 1.0),
        );
        let (draw_calls, _) = fixture.render(bolt, false);

        assert_eq!(draw_calls.len(), 4);
        assert_eq!(fixture.queue.transients().len(), 4);
        assert!(fixture.queue.transients().iter().all(|quad| quad.vertices.len() == 4));
    }

    #[test]
    fn test_beam_draws_nothing() {
        let mut fixture = Fixture::new();
        let (draw_calls, debug_axes) = fixture.render(Entity::new(EntityKind::Beam, Vec3::new(100.0, 0.0, 0.0)), false);

        assert!(draw_calls.is_empty());
        assert!(debug_axes.is_empty());
        assert!(fixture.queue.transients().is_empty());
    }

    #[test]
    fn test_model_without_handle_becomes_debug_axis() {
        let mut fixture = Fixture::new();
        let position = Vec3::new(100.0, 0.0, 0.0);
        let (draw_calls, debug_axes) = fixture.render(Entity::new(EntityKind::Model(None), position), false);

        assert!(draw_calls.is_empty());
        assert_eq!(debug_axes, vec![position]);
    }

    #[test]
    fn test_lighting_without_world_uses_flat_light() {
        let fixture = Fixture::new();
        let entity = Entity::new(EntityKind::Model(None), Vec3::zeros());
        let lighting = setup_entity_lighting(&entity, None, &fixture.lights, &fixture.effects, 0);

        // One overbright bit halves every light value.
        assert_relative_eq!(lighting.ambient, Vec3::repeat(0.5 * (150.0 + 32.0)));
        assert_relative_eq!(lighting.directed, Vec3::repeat(0.5 * 150.0));
        assert_relative_eq!(lighting.direction, fixture.effects.sun_direction());
    }

    #[test]
    fn test_light_grid_ambient_is_floored_and_clamped() {
        let fixture = Fixture::new();
        let world = MockWorld(Rc::new(RefCell::new(WorldState {
            light_grid: Some(LightSample {
                ambient: Vec3::new(250.0, 0.0, 10.0),
                directed: Vec3::new(40.0, 40.0, 40.0),
                direction: Vec3::new(0.0, 0.0, 2.0),
            }),
            ..WorldState::default()
        })));
        let entity = Entity::new(EntityKind::Model(None), Vec3::zeros());
        let lighting = setup_entity_lighting(&entity, Some(&world as &dyn WorldService), &fixture.lights, &fixture.effects, 0);

        assert_relative_eq!(lighting.ambient, Vec3::new(127.5, 16.0, 26.0));
        assert_relative_eq!(lighting.directed, Vec3::new(40.0, 40.0, 40.0));
        assert_relative_eq!(lighting.direction, Vec3::z());
    }
}
