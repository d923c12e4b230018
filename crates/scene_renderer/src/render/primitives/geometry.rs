//! # Geometry Buffers
//!
//! Vertex and index storage comes in three lifetime classes:
//!
//! - **Static**: uploaded once and kept until destroyed (world geometry, models)
//! - **Dynamic**: persistent but updatable in place (animated meshes)
//! - **Transient**: per-frame scratch memory owned by the GPU command queue,
//!   invalid once the frame has been executed
//!
//! Draw calls never own buffers; they carry a [`GeometryRef`] naming a range
//! inside buffers owned by the command queue.

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{Vec2, Vec3, Vec4};

/// Interleaved vertex layout shared by every program
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position
    pub position: [f32; 3],
    /// Normal
    pub normal: [f32; 3],
    /// Primary texture coordinate
    pub tex_coord: [f32; 2],
    /// Secondary (lightmap) texture coordinate
    pub tex_coord2: [f32; 2],
    /// Linear RGBA color
    pub color: [f32; 4],
}

impl Vertex {
    /// A vertex at `position` with white color
    pub fn new(position: Vec3) -> Self {
        Self {
            position: position.into(),
            color: [1.0; 4],
            ..Self::zeroed()
        }
    }

    /// Set the primary texture coordinate
    #[must_use]
    pub fn with_tex_coord(mut self, tex_coord: Vec2) -> Self {
        self.tex_coord = tex_coord.into();
        self
    }

    /// Set both texture coordinates
    #[must_use]
    pub fn with_tex_coords(mut self, tex_coord: Vec2) -> Self {
        self.tex_coord = tex_coord.into();
        self.tex_coord2 = tex_coord.into();
        self
    }

    /// Set the normal
    #[must_use]
    pub fn with_normal(mut self, normal: Vec3) -> Self {
        self.normal = normal.into();
        self
    }

    /// Set the color
    #[must_use]
    pub fn with_color(mut self, color: Vec4) -> Self {
        self.color = color.into();
        self
    }

    /// Position as a vector
    pub fn position(&self) -> Vec3 {
        Vec3::from(self.position)
    }
}

/// Lifetime class of a geometry buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferLifetime {
    /// Immutable, persistent
    Static,
    /// Updatable, persistent
    Dynamic,
    /// Valid for the current frame only
    Transient,
}

/// Handle to a vertex or index buffer owned by the command queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    /// Lifetime class
    pub lifetime: BufferLifetime,
    /// Backend identifier
    pub id: u32,
}

impl BufferHandle {
    /// Create a handle
    pub const fn new(lifetime: BufferLifetime, id: u32) -> Self {
        Self { lifetime, id }
    }
}

/// Range of elements inside one buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferRange {
    /// Buffer holding the elements
    pub buffer: BufferHandle,
    /// First element
    pub first: u32,
    /// Number of elements
    pub count: u32,
}

/// Geometry bound by a draw call: a vertex range and an optional index range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryRef {
    /// Vertices
    pub vertices: BufferRange,
    /// Indices, `None` for non-indexed line lists
    pub indices: Option<BufferRange>,
}

impl GeometryRef {
    /// Reference ranges inside existing buffers
    pub const fn indexed(
        vertex_buffer: BufferHandle,
        first_vertex: u32,
        vertex_count: u32,
        index_buffer: BufferHandle,
        first_index: u32,
        index_count: u32,
    ) -> Self {
        Self {
            vertices: BufferRange { buffer: vertex_buffer, first: first_vertex, count: vertex_count },
            indices: Some(BufferRange { buffer: index_buffer, first: first_index, count: index_count }),
        }
    }

    /// Lifetime class of the vertex buffer
    pub const fn lifetime(&self) -> BufferLifetime {
        self.vertices.buffer.lifetime
    }

    /// Whether every range is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.count == 0 || self.indices.is_some_and(|indices| indices.count == 0)
    }
}

/// A vertex buffer and optional index buffer created together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryBuffers {
    /// Vertex buffer
    pub vertices: BufferHandle,
    /// Index buffer, absent when no indices were supplied
    pub indices: Option<BufferHandle>,
    /// Vertices stored
    pub vertex_count: u32,
    /// Indices stored
    pub index_count: u32,
}

impl GeometryBuffers {
    /// Reference the whole contents
    pub const fn whole(&self) -> GeometryRef {
        GeometryRef {
            vertices: BufferRange { buffer: self.vertices, first: 0, count: self.vertex_count },
            indices: match self.indices {
                Some(buffer) => Some(BufferRange { buffer, first: 0, count: self.index_count }),
                None => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 14 * std::mem::size_of::<f32>());
        let vertex = Vertex::new(Vec3::new(1.0, 2.0, 3.0));
        let bytes = bytemuck::bytes_of(&vertex);
        assert_eq!(bytes.len(), 56);
    }

    #[test]
    fn test_whole_buffer_reference() {
        let buffers = GeometryBuffers {
            vertices: BufferHandle::new(BufferLifetime::Transient, 3),
            indices: None,
            vertex_count: 6,
            index_count: 0,
        };

        let geometry = buffers.whole();
        assert_eq!(geometry.vertices.count, 6);
        assert!(geometry.indices.is_none());
        assert_eq!(geometry.lifetime(), BufferLifetime::Transient);
        assert!(!geometry.is_empty());
    }
}
