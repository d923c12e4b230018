//! Debug axes and bounding boxes, drawn as colored line lists

use crate::foundation::logging::{WarnOnce, WarnOnceId};
use crate::foundation::math::{Bounds, Mat4, Vec3, Vec4};
use crate::render::api::{GpuCommandQueue, ViewId};
use crate::render::primitives::geometry::Vertex;
use crate::render::primitives::shader::Program;
use crate::render::primitives::state::StateFlags;

/// Length of each debug axis line
pub const AXIS_LENGTH: f32 = 16.0;

const BOUNDS_COLORS: [[f32; 4]; 6] = [
    [1.0, 0.0, 0.0, 1.0],
    [0.0, 1.0, 0.0, 1.0],
    [0.0, 0.0, 1.0, 1.0],
    [1.0, 1.0, 0.0, 1.0],
    [0.0, 1.0, 1.0, 1.0],
    [1.0, 0.0, 1.0, 1.0],
];

// Top ring, bottom ring, then the four verticals.
#[rustfmt::skip]
const BOX_EDGES: [(usize, usize); 12] = [
    (0, 1), (1, 2), (2, 3), (3, 0),
    (4, 5), (5, 6), (6, 7), (7, 4),
    (0, 4), (1, 7), (2, 6), (3, 5),
];

/// Vertices per debug box
pub const BOX_VERTEX_COUNT: usize = BOX_EDGES.len() * 2;

fn line_state() -> StateFlags {
    StateFlags::DEPTH_TEST_LEQUAL | StateFlags::PT_LINES | StateFlags::RGB_WRITE
}

/// Red X, green Y and blue Z lines from the origin
pub fn axis_vertices() -> [Vertex; 6] {
    let red = Vec4::new(1.0, 0.0, 0.0, 1.0);
    let green = Vec4::new(0.0, 1.0, 0.0, 1.0);
    let blue = Vec4::new(0.0, 0.0, 1.0, 1.0);

    [
        Vertex::new(Vec3::zeros()).with_color(red),
        Vertex::new(Vec3::new(AXIS_LENGTH, 0.0, 0.0)).with_color(red),
        Vertex::new(Vec3::zeros()).with_color(green),
        Vertex::new(Vec3::new(0.0, AXIS_LENGTH, 0.0)).with_color(green),
        Vertex::new(Vec3::zeros()).with_color(blue),
        Vertex::new(Vec3::new(0.0, 0.0, AXIS_LENGTH)).with_color(blue),
    ]
}

/// Twelve edges per box, each box in the next color of a six-color cycle
pub fn bounds_vertices(bounds: &[Bounds]) -> Vec<Vertex> {
    let mut vertices = Vec::with_capacity(bounds.len() * BOX_VERTEX_COUNT);

    for (i, b) in bounds.iter().enumerate() {
        let color = Vec4::from(BOUNDS_COLORS[i % BOUNDS_COLORS.len()]);
        let corners = b.corners();

        for (from, to) in BOX_EDGES {
            vertices.push(Vertex::new(corners[from]).with_color(color));
            vertices.push(Vertex::new(corners[to]).with_color(color));
        }
    }

    vertices
}

/// One axis submission per position, all sharing one scratch buffer
pub fn submit_axes(queue: &mut dyn GpuCommandQueue, warn_once: &mut WarnOnce, view: ViewId, positions: &[Vec3]) {
    if positions.is_empty() {
        return;
    }

    let Some(buffers) = queue.alloc_transient(&axis_vertices(), &[]) else {
        warn_once.transient_alloc_failed(WarnOnceId::DebugAxis);
        return;
    };

    for position in positions {
        queue.set_state(line_state());
        queue.set_transform(&Mat4::new_translation(position));
        queue.set_geometry(&buffers.whole());
        queue.submit(view, Program::Color);
    }
}

/// Every box in a single submission
pub fn submit_bounds(queue: &mut dyn GpuCommandQueue, warn_once: &mut WarnOnce, view: ViewId, bounds: &[Bounds]) {
    if bounds.is_empty() {
        return;
    }

    let Some(buffers) = queue.alloc_transient(&bounds_vertices(bounds), &[]) else {
        warn_once.transient_alloc_failed(WarnOnceId::DebugBounds);
        return;
    };

    queue.set_state(line_state());
    queue.set_geometry(&buffers.whole());
    queue.submit(view, Program::Color);
}
