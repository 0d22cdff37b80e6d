// Color buckets for prices (USD/MWh) and voltages (kV)

use serde::{Deserialize, Serialize};

/// sRGB color with alpha in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: f32) -> Self {
        Rgba { r, g, b, a }
    }

    /// `#rrggbbaa`
    pub fn to_hex(&self) -> String {
        let alpha = (self.a.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, alpha)
    }
}

const LIME: Rgba = Rgba::new(0, 255, 0, 0.9);
const YELLOW: Rgba = Rgba::new(255, 255, 0, 0.9);
const ORANGE: Rgba = Rgba::new(255, 165, 0, 0.9);
const RED: Rgba = Rgba::new(255, 0, 0, 0.9);
const CYAN: Rgba = Rgba::new(0, 255, 255, 0.9);
const GRAY: Rgba = Rgba::new(128, 128, 128, 0.6);

// ============================================================================
// PRICE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceBucket {
    /// [0, 40), negatives included
    Cheap,
    /// [40, 60)
    MidLow,
    /// [60, 80)
    MidHigh,
    /// [80, ∞)
    Expensive,
}

impl PriceBucket {
    pub fn color(&self) -> Rgba {
        match self {
            PriceBucket::Cheap => LIME,
            PriceBucket::MidLow => YELLOW,
            PriceBucket::MidHigh => ORANGE,
            PriceBucket::Expensive => RED,
        }
    }
}

/// Bucket for a marginal price. Boundaries belong to the higher bucket.
/// NaN compares false everywhere and lands in `Expensive`.
pub fn color_for_price(price: f64) -> PriceBucket {
    if price < 40.0 {
        PriceBucket::Cheap
    } else if price < 60.0 {
        PriceBucket::MidLow
    } else if price < 80.0 {
        PriceBucket::MidHigh
    } else {
        PriceBucket::Expensive
    }
}

// ============================================================================
// VOLTAGE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoltageBucket {
    Unknown,
    /// below 100 kV
    Low,
    /// [100, 200)
    Medium,
    /// [200, 400)
    High,
    /// 400 kV and up
    Highest,
}

impl VoltageBucket {
    pub fn color(&self) -> Rgba {
        match self {
            VoltageBucket::Unknown => GRAY,
            VoltageBucket::Low => CYAN,
            VoltageBucket::Medium => YELLOW,
            VoltageBucket::High => ORANGE,
            VoltageBucket::Highest => RED,
        }
    }
}

pub fn color_for_voltage(kv: Option<f64>) -> VoltageBucket {
    match kv {
        None => VoltageBucket::Unknown,
        Some(kv) if kv >= 400.0 => VoltageBucket::Highest,
        Some(kv) if kv >= 200.0 => VoltageBucket::High,
        Some(kv) if kv >= 100.0 => VoltageBucket::Medium,
        Some(_) => VoltageBucket::Low,
    }
}
