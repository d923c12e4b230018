//! # Scene Aggregator
//!
//! Accumulates everything submitted between two `render_scene` calls:
//! entities, debug primitives and ad-hoc polygons. Polygons are merged into
//! one transient draw call per (material, fog volume) run when a camera
//! collects its draw calls.
//!
//! Every container is cleared at the end of `render_scene`; entity keys handed
//! out before the clear resolve to nothing afterwards.

use crate::foundation::collections::{EntityKey, MaterialHandle};
use crate::foundation::logging::{WarnOnce, WarnOnceId};
use crate::foundation::math::{color_from_bytes, Bounds, Vec2, Vec3};
use crate::render::api::{GpuCommandQueue, WorldService};
use crate::render::primitives::draw_call::DrawCall;
use crate::render::primitives::geometry::Vertex;
use crate::render::resources::materials::{Material, MaterialCache};
use crate::render::{RenderError, RenderResult};

use super::entity::{Entity, EntityArena};

/// Vertex of an ad-hoc polygon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolygonVertex {
    /// Position
    pub position: Vec3,
    /// Texture coordinate
    pub tex_coord: Vec2,
    /// RGBA8 color
    pub modulate: [u8; 4],
}

impl PolygonVertex {
    /// Create a vertex
    pub const fn new(position: Vec3, tex_coord: Vec2, modulate: [u8; 4]) -> Self {
        Self { position, tex_coord, modulate }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Polygon {
    material: MaterialHandle,
    material_index: u32,
    first_vertex: usize,
    vertex_count: usize,
    fog_index: Option<usize>,
}

/// Polygons sharing a material and fog volume, merged into one draw call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolygonBatch {
    /// Shared material
    pub material: MaterialHandle,
    /// Shared fog volume
    pub fog_index: Option<usize>,
    /// Member polygons, as submission indices
    pub polygons: Vec<usize>,
    /// Total vertices
    pub vertex_count: usize,
    /// Total fan indices
    pub index_count: usize,
}

/// Per-frame scene containers
#[derive(Debug, Default, Clone)]
pub struct SceneAggregator {
    entities: EntityArena,
    entity_order: Vec<EntityKey>,
    debug_axes: Vec<Vec3>,
    debug_bounds: Vec<Bounds>,
    polygon_vertices: Vec<PolygonVertex>,
    polygons: Vec<Polygon>,
}

impl SceneAggregator {
    /// Create empty containers
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity for the current scene
    pub fn add_entity(&mut self, entity: Entity) -> EntityKey {
        let key = self.entities.insert(entity);
        self.entity_order.push(key);
        key
    }

    /// Entity storage
    pub const fn entities(&self) -> &EntityArena {
        &self.entities
    }

    /// Mutable entity storage
    pub fn entities_mut(&mut self) -> &mut EntityArena {
        &mut self.entities
    }

    /// Entity keys in submission order
    pub fn entity_keys(&self) -> &[EntityKey] {
        &self.entity_order
    }

    /// Add a debug axis at `position`
    pub fn add_debug_axis(&mut self, position: Vec3) {
        self.debug_axes.push(position);
    }

    /// Add a debug bounding box
    pub fn add_debug_bounds(&mut self, bounds: Bounds) {
        self.debug_bounds.push(bounds);
    }

    /// Debug axis positions
    pub fn debug_axes(&self) -> &[Vec3] {
        &self.debug_axes
    }

    /// Debug bounding boxes
    pub fn debug_bounds(&self) -> &[Bounds] {
        &self.debug_bounds
    }

    /// Add `polygon_count` fans of `vertices_per_polygon` vertices each
    ///
    /// Each polygon's fog volume is resolved from its bounds.
    pub fn add_polygons(
        &mut self,
        material: &Material,
        vertices: &[PolygonVertex],
        vertices_per_polygon: usize,
        polygon_count: usize,
        world: &dyn WorldService,
    ) -> RenderResult<()> {
        if vertices_per_polygon < 3 {
            return Err(RenderError::InvalidPolygons(format!(
                "{vertices_per_polygon} vertices per polygon, need at least 3"
            )));
        }

        if vertices_per_polygon > usize::from(u16::MAX) {
            return Err(RenderError::InvalidPolygons(format!(
                "{vertices_per_polygon} vertices per polygon exceeds the 16-bit index range"
            )));
        }

        let Some(needed) = vertices_per_polygon.checked_mul(polygon_count) else {
            return Err(RenderError::InvalidPolygons(format!(
                "{polygon_count} polygons of {vertices_per_polygon} vertices overflow the vertex count"
            )));
        };

        if vertices.len() < needed {
            return Err(RenderError::InvalidPolygons(format!(
                "{polygon_count} polygons need {needed} vertices, got {}",
                vertices.len()
            )));
        }

        let first_vertex = self.polygon_vertices.len();
        self.polygon_vertices.extend_from_slice(&vertices[..needed]);

        for i in 0..polygon_count {
            let start = first_vertex + i * vertices_per_polygon;
            let fan = &self.polygon_vertices[start..start + vertices_per_polygon];
            let bounds = Bounds::from_points(fan.iter().map(|v| &v.position));

            self.polygons.push(Polygon {
                material: material.handle,
                material_index: material.index,
                first_vertex: start,
                vertex_count: vertices_per_polygon,
                fog_index: world.find_fog_index_for_bounds(&bounds),
            });
        }

        Ok(())
    }

    /// Number of polygons submitted
    pub fn polygon_count(&self) -> usize {
        self.polygons.len()
    }

    /// Group polygons by (material index, fog index)
    ///
    /// Order follows material registration order, so it is deterministic
    /// within a frame but not across material reloads.
    pub fn polygon_batches(&self) -> Vec<PolygonBatch> {
        let mut sorted: Vec<usize> = (0..self.polygons.len()).collect();
        sorted.sort_by_key(|&i| (self.polygons[i].material_index, self.polygons[i].fog_index));

        let mut batches: Vec<PolygonBatch> = Vec::new();

        for i in sorted {
            let polygon = &self.polygons[i];

            match batches.last_mut() {
                Some(batch) if batch.material == polygon.material && batch.fog_index == polygon.fog_index => {
                    batch.polygons.push(i);
                    batch.vertex_count += polygon.vertex_count;
                    batch.index_count += (polygon.vertex_count - 2) * 3;
                }
                _ => batches.push(PolygonBatch {
                    material: polygon.material,
                    fog_index: polygon.fog_index,
                    polygons: vec![i],
                    vertex_count: polygon.vertex_count,
                    index_count: (polygon.vertex_count - 2) * 3,
                }),
            }
        }

        batches
    }

    /// Emit one transient draw call per polygon batch
    ///
    /// A failed scratch allocation abandons that batch and every batch after it.
    pub fn render_polygons(
        &self,
        queue: &mut dyn GpuCommandQueue,
        materials: &MaterialCache,
        warn_once: &mut WarnOnce,
        draw_calls: &mut Vec<DrawCall>,
    ) {
        for batch in self.polygon_batches() {
            let mut vertices = Vec::with_capacity(batch.vertex_count);
            let mut indices = Vec::with_capacity(batch.index_count);

            for &i in &batch.polygons {
                let polygon = &self.polygons[i];
                let Ok(first) = u16::try_from(vertices.len()) else {
                    break;
                };

                let fan = &self.polygon_vertices[polygon.first_vertex..polygon.first_vertex + polygon.vertex_count];
                vertices.extend(fan.iter().map(|v| {
                    Vertex::new(v.position)
                        .with_tex_coord(v.tex_coord)
                        .with_color(color_from_bytes(v.modulate))
                }));

                for j in 1..polygon.vertex_count - 1 {
                    #[allow(clippy::cast_possible_truncation)]
                    let j = j as u16;
                    indices.extend_from_slice(&[first, first.wrapping_add(j), first.wrapping_add(j + 1)]);
                }
            }

            let fits = vertices.len() == batch.vertex_count && u16::try_from(vertices.len()).is_ok();
            let buffers = if fits { queue.alloc_transient(&vertices, &indices) } else { None };

            let Some(buffers) = buffers else {
                warn_once.transient_alloc_failed(WarnOnceId::PolygonBatch);
                break;
            };

            draw_calls.push(
                DrawCall::new(buffers.whole(), materials.get(batch.material))
                    .with_fog_index(batch.fog_index)
                    .with_dynamic_lighting(false),
            );
        }
    }

    /// Drop every per-scene container
    pub fn clear(&mut self) {
        self.entities.clear();
        self.entity_order.clear();
        self.debug_axes.clear();
        self.debug_bounds.clear();
        self.polygon_vertices.clear();
        self.polygons.clear();
    }
}
