// Gridflow - Core Library
// Barra name normalization, flow direction inference and color mapping
// for the transmission grid viewer. Used by the CLI, the API server, and tests.

pub mod color;
pub mod config;
pub mod direction;
pub mod error;
pub mod generation;
pub mod geometry;
mod lenient;
pub mod lines;
pub mod lookups;
pub mod normalize;
pub mod prices;
pub mod source;

// Re-export commonly used types
pub use color::{color_for_price, color_for_voltage, PriceBucket, Rgba, VoltageBucket};
pub use config::{Config, ConfigError};
pub use direction::{infer, infer_direction, Direction, DirectionBasis, Inference, LineClass};
pub use error::LoadError;
pub use generation::{extract_generation_list, split_connection_points, GenerationSet};
pub use geometry::{tessellate, Vertex};
pub use lines::{
    describe_line, enrich_line, enrich_lines, load_lines, load_lines_or_empty, parse_lines,
    split_line_name, ColorMode, ColorSource, EnrichOptions, LineProperties, LineRecord,
    RenderedLine,
};
pub use lookups::{lookups_channel, ready_lookups, spawn_lookups, Lookups, LookupsHandle};
pub use normalize::{clean_label, normalize, strip_accents, AliasTable};
pub use prices::{
    build_price_sample, price_points, spawn_refresh_loop, BarraLocations, MarginalCostRow,
    PriceIndex, PricePoint, PriceRecord, PriceSnapshot, PriceStore,
};
pub use source::Source;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
