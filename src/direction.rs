// Flow direction inference
//
// Arrows drawn along a line must point from generator toward grid. The
// stored vertex order is arbitrary, so each line is classified and, when
// needed, reversed before it is handed to the renderer.

use crate::lookups::Lookups;
use serde::{Deserialize, Serialize};

// ============================================================================
// LINE CLASS
// ============================================================================

/// Classification from the free-text `tipo` tag.
///
/// Only "dedicado" changes behaviour today; every other value is kept as an
/// open-ended tag (trimmed, lowercased) so new classes can be matched on
/// later without losing the original text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineClass {
    /// Dedicated generator-to-grid connection, stored generator first
    Dedicated,
    /// Any other tag, normalized
    Other(String),
    /// No tag, or the "—" placeholder
    Untagged,
}

impl LineClass {
    pub fn from_tipo(tipo: Option<&str>) -> Self {
        let Some(raw) = tipo else {
            return LineClass::Untagged;
        };

        let tag = raw.trim().to_lowercase();
        match tag.as_str() {
            "" | "—" | "-" => LineClass::Untagged,
            "dedicado" => LineClass::Dedicated,
            _ => LineClass::Other(tag),
        }
    }
}

// ============================================================================
// DIRECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Stored order already runs generator → grid
    Forward,
    /// Stored order must be reversed
    Reversed,
}

impl Direction {
    pub fn is_forward(&self) -> bool {
        matches!(self, Direction::Forward)
    }

    /// Apply to a vertex sequence in place
    pub fn orient<T>(&self, vertices: &mut [T]) {
        if !self.is_forward() {
            vertices.reverse();
        }
    }
}

/// Which rule decided the direction (logged and exposed for tooltips/debug)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionBasis {
    /// tipo = dedicado
    Dedicated,
    /// exactly one endpoint is a generation barra
    Generation,
    /// both or neither endpoint generate; stored order kept
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inference {
    pub direction: Direction,
    pub basis: DirectionBasis,
}

/// Decide whether a line's stored order runs generator → grid.
///
/// Rules in priority order:
/// 1. dedicated lines are forward by convention
/// 2. exactly one endpoint in the generation set: forward iff it is the start
/// 3. otherwise keep the stored order
pub fn infer(
    class: &LineClass,
    start_barra: &str,
    end_barra: &str,
    lookups: &Lookups,
) -> Inference {
    if *class == LineClass::Dedicated {
        return Inference {
            direction: Direction::Forward,
            basis: DirectionBasis::Dedicated,
        };
    }

    let start_generates = lookups.is_generation(start_barra);
    let end_generates = lookups.is_generation(end_barra);

    match (start_generates, end_generates) {
        (true, false) => Inference {
            direction: Direction::Forward,
            basis: DirectionBasis::Generation,
        },
        (false, true) => Inference {
            direction: Direction::Reversed,
            basis: DirectionBasis::Generation,
        },
        _ => Inference {
            direction: Direction::Forward,
            basis: DirectionBasis::Fallback,
        },
    }
}

/// Direction only, from the raw `tipo` tag
pub fn infer_direction(
    tipo: Option<&str>,
    start_barra: &str,
    end_barra: &str,
    lookups: &Lookups,
) -> Direction {
    infer(&LineClass::from_tipo(tipo), start_barra, end_barra, lookups).direction
}
