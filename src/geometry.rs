// Planar polyline helpers (degrees, no projection)
//
// Long lines are cut into equal-length pieces so the renderer repeats its
// direction arrow along the path instead of drawing a single one.

use serde::{Deserialize, Serialize};

/// Longest a piece may be before the line is split
pub const DEFAULT_STEP_DEG: f64 = 0.05;

/// Upper bound on pieces per line
pub const MAX_PIECES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub lon: f64,
    pub lat: f64,
}

impl Vertex {
    pub fn new(lon: f64, lat: f64) -> Self {
        Vertex { lon, lat }
    }

    fn distance(&self, other: &Vertex) -> f64 {
        (other.lon - self.lon).hypot(other.lat - self.lat)
    }

    fn lerp(&self, other: &Vertex, t: f64) -> Vertex {
        Vertex {
            lon: self.lon + (other.lon - self.lon) * t,
            lat: self.lat + (other.lat - self.lat) * t,
        }
    }
}

/// Length of the polyline in degrees
pub fn path_length(vertices: &[Vertex]) -> f64 {
    vertices.windows(2).map(|w| w[0].distance(&w[1])).sum()
}

fn cumulative_lengths(vertices: &[Vertex]) -> Vec<f64> {
    let mut acc = Vec::with_capacity(vertices.len());
    let mut total = 0.0;
    for (i, v) in vertices.iter().enumerate() {
        if i > 0 {
            total += vertices[i - 1].distance(v);
        }
        acc.push(total);
    }
    acc
}

fn point_at(vertices: &[Vertex], cumulative: &[f64], distance: f64) -> Vertex {
    // first segment whose end reaches `distance`
    let idx = cumulative
        .iter()
        .position(|&c| c >= distance)
        .unwrap_or(vertices.len() - 1);

    if idx == 0 {
        return vertices[0];
    }

    let seg_start = cumulative[idx - 1];
    let seg_len = cumulative[idx] - seg_start;
    if seg_len <= 0.0 {
        return vertices[idx];
    }
    vertices[idx - 1].lerp(&vertices[idx], (distance - seg_start) / seg_len)
}

/// Portion of the polyline between two distances from its start
fn substring(vertices: &[Vertex], cumulative: &[f64], from: f64, to: f64) -> Vec<Vertex> {
    let mut piece = vec![point_at(vertices, cumulative, from)];
    for (v, &c) in vertices.iter().zip(cumulative) {
        if c > from && c < to {
            piece.push(*v);
        }
    }
    piece.push(point_at(vertices, cumulative, to));
    piece
}

/// Split into `min(floor(len / step) + 1, MAX_PIECES)` equal-length pieces.
///
/// Lines no longer than `step` (and degenerate input) come back whole.
/// Piece order and vertex order follow the input, so an oriented line
/// stays oriented.
pub fn tessellate(vertices: &[Vertex], step: f64) -> Vec<Vec<Vertex>> {
    if vertices.len() < 2 || step <= 0.0 {
        return vec![vertices.to_vec()];
    }

    let total = path_length(vertices);
    if total <= step {
        return vec![vertices.to_vec()];
    }

    let cumulative = cumulative_lengths(vertices);

    let n = ((total / step) as usize + 1).min(MAX_PIECES);
    (0..n)
        .map(|i| {
            let from = total * i as f64 / n as f64;
            let to = total * (i + 1) as f64 / n as f64;
            substring(vertices, &cumulative, from, to)
        })
        .collect()
}
