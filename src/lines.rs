// ⚡ Transmission lines - GeoJSON in, oriented + colored lines out
//
// Each feature becomes one LineRecord per path. Enrichment decides the
// flow direction, reverses the vertices when needed, picks a color and
// width, and formats the tooltip handed to the globe renderer.

use crate::color::{color_for_price, color_for_voltage, PriceBucket, Rgba, VoltageBucket};
use crate::direction::{infer, Direction, DirectionBasis, LineClass};
use crate::error::{LoadError, Result};
use crate::geometry::{tessellate, Vertex};
use crate::lenient;
use crate::lookups::Lookups;
use crate::normalize::clean_label;
use crate::prices::PriceIndex;
use crate::source::Source;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Shown for any missing tooltip field
pub const PLACEHOLDER: &str = "—";

pub const DEFAULT_LINE_WIDTH: f32 = 10.0;

// ============================================================================
// GEOJSON INPUT
// ============================================================================

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
    #[serde(default)]
    properties: Option<LineProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    LineString { coordinates: Vec<Vec<f64>> },
    MultiLineString { coordinates: Vec<Vec<Vec<f64>>> },
    #[serde(other)]
    Unsupported,
}

/// Property bag attached to every line feature
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineProperties {
    #[serde(rename = "startBarra", default, deserialize_with = "lenient::opt_string")]
    pub start_barra: Option<String>,
    #[serde(rename = "endBarra", default, deserialize_with = "lenient::opt_string")]
    pub end_barra: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub tipo: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub volt: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub nombre: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub circuit: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub length_km: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub owner: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub estado: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub comuna: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineRecord {
    /// Index of the source feature (MultiLineString parts share it)
    pub feature: usize,
    pub properties: LineProperties,
    pub vertices: Vec<Vertex>,
}

impl LineRecord {
    /// Raw start label; derived from `nombre` when the property is absent
    pub fn start_barra(&self) -> String {
        match &self.properties.start_barra {
            Some(s) => s.clone(),
            None => self.name_endpoints().0,
        }
    }

    /// Raw end label; derived from `nombre` when the property is absent
    pub fn end_barra(&self) -> String {
        match &self.properties.end_barra {
            Some(s) => s.clone(),
            None => self.name_endpoints().1,
        }
    }

    fn name_endpoints(&self) -> (String, String) {
        self.properties
            .nombre
            .as_deref()
            .map(split_line_name)
            .unwrap_or_default()
    }

    pub fn class(&self) -> LineClass {
        LineClass::from_tipo(self.properties.tipo.as_deref())
    }
}

/// "Alto Jahuel - Chena 220kV" → ("alto jahuel", "chena").
/// Splits on the first `-` or `/`; a single name is used for both ends.
pub fn split_line_name(name: &str) -> (String, String) {
    match name.split_once(['-', '/']) {
        Some((a, b)) => (clean_label(a), clean_label(b)),
        None => {
            let only = clean_label(name);
            (only.clone(), only)
        }
    }
}

fn to_vertices(coords: Vec<Vec<f64>>) -> Vec<Vertex> {
    coords
        .into_iter()
        .filter(|c| c.len() >= 2)
        .map(|c| Vertex::new(c[0], c[1]))
        .collect()
}

/// Parse a GeoJSON FeatureCollection into line records
pub fn parse_lines(text: &str) -> Result<Vec<LineRecord>> {
    let collection: FeatureCollection = serde_json::from_str(text)?;
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (feature, f) in collection.features.into_iter().enumerate() {
        let properties = f.properties.unwrap_or_default();
        let paths = match f.geometry {
            Some(Geometry::LineString { coordinates }) => vec![coordinates],
            Some(Geometry::MultiLineString { coordinates }) => coordinates,
            Some(Geometry::Unsupported) | None => {
                skipped += 1;
                continue;
            }
        };

        for path in paths {
            let vertices = to_vertices(path);
            if vertices.len() < 2 {
                skipped += 1;
                continue;
            }
            records.push(LineRecord {
                feature,
                properties: properties.clone(),
                vertices,
            });
        }
    }

    if skipped > 0 {
        debug!(skipped, "skipped features without usable line geometry");
    }

    Ok(records)
}

/// Fetch and parse the line geometry
pub async fn load_lines(source: &Source) -> Result<Vec<LineRecord>> {
    let text = source.fetch_text().await?;
    let records = parse_lines(&text)?;
    if records.is_empty() {
        return Err(LoadError::Geometry(format!("no line features in {}", source)));
    }
    info!(%source, lines = records.len(), "line geometry loaded");
    Ok(records)
}

/// Fail-open variant: nothing to draw instead of an error
pub async fn load_lines_or_empty(source: &Source) -> Vec<LineRecord> {
    match load_lines(source).await {
        Ok(records) => records,
        Err(e) => {
            warn!(%source, error = %e, "line geometry unavailable");
            Vec::new()
        }
    }
}

// ============================================================================
// ENRICHMENT (render hand-off)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    #[default]
    Voltage,
    Price,
}

impl FromStr for ColorMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "voltage" | "volt" | "kv" => Ok(ColorMode::Voltage),
            "price" | "prices" | "cmg" => Ok(ColorMode::Price),
            other => Err(format!("unknown color mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "bucket", rename_all = "snake_case")]
pub enum ColorSource {
    Voltage(VoltageBucket),
    Price(PriceBucket),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnrichOptions {
    pub mode: ColorMode,
    pub width: f32,
    /// None disables tessellation
    pub tessellate_step_deg: Option<f64>,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        EnrichOptions {
            mode: ColorMode::Voltage,
            width: DEFAULT_LINE_WIDTH,
            tessellate_step_deg: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedLine {
    pub feature: usize,
    pub name: Option<String>,
    /// Canonical endpoint names
    pub start_barra: String,
    pub end_barra: String,
    pub direction: Direction,
    pub basis: DirectionBasis,
    /// Oriented generator → grid; more than one when tessellated
    pub pieces: Vec<Vec<Vertex>>,
    pub color: Rgba,
    pub color_source: ColorSource,
    pub price: Option<f64>,
    pub width: f32,
    pub description: String,
}

fn field(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(PLACEHOLDER)
}

/// HTML tooltip; missing fields render as "—", missing length as 0.00
pub fn describe_line(p: &LineProperties) -> String {
    let kv = p
        .volt
        .map(|v| v.to_string())
        .unwrap_or_else(|| PLACEHOLDER.to_string());

    format!(
        "<strong>{}</strong><br/>\n\
         <b>Voltaje:</b> {} kV<br/>\n\
         <b>Circuito:</b> {}<br/>\n\
         <b>Longitud:</b> {:.2} km<br/>\n\
         <b>Tipo:</b> {}<br/>\n\
         <b>Empresa:</b> {}<br/>\n\
         <b>Estado:</b> {}<br/>\n\
         <b>Comuna:</b> {}",
        field(&p.nombre),
        kv,
        field(&p.circuit),
        p.length_km.unwrap_or(0.0),
        field(&p.tipo),
        field(&p.owner),
        field(&p.estado),
        field(&p.comuna),
    )
}

/// Orient, color and describe one line
pub fn enrich_line(
    mut record: LineRecord,
    lookups: &Lookups,
    prices: Option<&PriceIndex>,
    options: &EnrichOptions,
) -> RenderedLine {
    let start = lookups.normalize(&record.start_barra());
    let end = lookups.normalize(&record.end_barra());

    let inference = infer(&record.class(), &start, &end, lookups);
    inference.direction.orient(&mut record.vertices);

    let price = match options.mode {
        ColorMode::Price => prices.and_then(|index| index.line_price(&start, &end)),
        ColorMode::Voltage => None,
    };

    let (color, color_source) = match price {
        Some(p) => {
            let bucket = color_for_price(p);
            (bucket.color(), ColorSource::Price(bucket))
        }
        None => {
            let bucket = color_for_voltage(record.properties.volt);
            (bucket.color(), ColorSource::Voltage(bucket))
        }
    };

    let pieces = match options.tessellate_step_deg {
        Some(step) => tessellate(&record.vertices, step),
        None => vec![record.vertices],
    };

    RenderedLine {
        feature: record.feature,
        description: describe_line(&record.properties),
        name: record.properties.nombre,
        start_barra: start,
        end_barra: end,
        direction: inference.direction,
        basis: inference.basis,
        pieces,
        color,
        color_source,
        price,
        width: options.width,
    }
}

pub fn enrich_lines(
    records: Vec<LineRecord>,
    lookups: &Lookups,
    prices: Option<&PriceIndex>,
    options: &EnrichOptions,
) -> Vec<RenderedLine> {
    let rendered: Vec<RenderedLine> = records
        .into_iter()
        .map(|record| enrich_line(record, lookups, prices, options))
        .collect();

    let reversed = rendered
        .iter()
        .filter(|l| !l.direction.is_forward())
        .count();
    let fallback = rendered
        .iter()
        .filter(|l| l.basis == DirectionBasis::Fallback)
        .count();
    info!(lines = rendered.len(), reversed, fallback, mode = ?options.mode, "lines enriched");

    rendered
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationSet;
    use crate::normalize::AliasTable;
    use crate::prices::PriceRecord;

    const SAMPLE: &str = r#"{
      "type": "FeatureCollection",
      "features": [
        {
          "type": "Feature",
          "geometry": {"type": "LineString", "coordinates": [[-70.0, -33.0], [-70.1, -33.1, 0.0]]},
          "properties": {"startBarra": "Central Norte 220kV", "endBarra": "Subestacion Sur",
                         "tipo": "AC", "volt": 220, "nombre": "Central Norte - Sur", "circuit": 1,
                         "length_km": "12.346", "owner": "Transelec", "estado": "—", "comuna": null}
        },
        {
          "type": "Feature",
          "geometry": {"type": "MultiLineString", "coordinates": [
            [[-71.0, -34.0], [-71.1, -34.1]],
            [[-71.2, -34.2], [-71.3, -34.3]]
          ]},
          "properties": {"nombre": "Subestacion Sur / Central Norte", "volt": "66"}
        },
        {
          "type": "Feature",
          "geometry": {"type": "Point", "coordinates": [-70.0, -33.0]},
          "properties": {}
        },
        {
          "type": "Feature",
          "geometry": null,
          "properties": {"nombre": "sin geometria"}
        }
      ]
    }"#;

    fn lookups() -> Lookups {
        let aliases = AliasTable::new();
        let generation = GenerationSet::from_names(["central norte"], &aliases);
        Lookups::new(aliases, generation)
    }

    #[test]
    fn test_parse_lines() {
        let records = parse_lines(SAMPLE).unwrap();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].feature, 0);
        assert_eq!(records[0].vertices.len(), 2);
        assert_eq!(records[0].properties.volt, Some(220.0));
        assert_eq!(records[0].properties.circuit, Some("1".to_string()));
        assert_eq!(records[0].properties.length_km, Some(12.346));
        assert_eq!(records[0].properties.estado, None);

        // MultiLineString parts share the feature index and properties
        assert_eq!(records[1].feature, 1);
        assert_eq!(records[2].feature, 1);
        assert_eq!(records[2].properties.volt, Some(66.0));
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(parse_lines("not json").is_err());
    }

    #[test]
    fn test_endpoints_fall_back_to_name() {
        let records = parse_lines(SAMPLE).unwrap();
        assert_eq!(records[0].start_barra(), "Central Norte 220kV");
        assert_eq!(records[1].start_barra(), "subestacion sur");
        assert_eq!(records[1].end_barra(), "central norte");
    }

    #[test]
    fn test_split_line_name() {
        assert_eq!(
            split_line_name("Alto Jahuel - Chena 220kV"),
            ("alto jahuel".to_string(), "chena".to_string())
        );
        assert_eq!(
            split_line_name("Ñuble/Charrúa"),
            ("nuble".to_string(), "charrua".to_string())
        );
        assert_eq!(
            split_line_name("Tap Off"),
            ("tap off".to_string(), "tap off".to_string())
        );
    }

    #[test]
    fn test_end_to_end_forward_line_unchanged() {
        let records = parse_lines(SAMPLE).unwrap();
        let original = records[0].vertices.clone();

        let line = enrich_line(records[0].clone(), &lookups(), None, &EnrichOptions::default());

        assert_eq!(line.start_barra, "central norte");
        assert_eq!(line.end_barra, "subestacion sur");
        assert_eq!(line.direction, Direction::Forward);
        assert_eq!(line.basis, DirectionBasis::Generation);
        assert_eq!(line.pieces, vec![original]);
        assert_eq!(line.color_source, ColorSource::Voltage(VoltageBucket::High));
        assert_eq!(line.width, DEFAULT_LINE_WIDTH);
    }

    #[test]
    fn test_generator_at_end_reverses_vertices() {
        let records = parse_lines(SAMPLE).unwrap();
        let mut original = records[1].vertices.clone();
        original.reverse();

        let line = enrich_line(records[1].clone(), &lookups(), None, &EnrichOptions::default());

        assert_eq!(line.direction, Direction::Reversed);
        assert_eq!(line.pieces, vec![original]);
        assert_eq!(line.color_source, ColorSource::Voltage(VoltageBucket::Low));
    }

    #[test]
    fn test_dedicated_keeps_order() {
        let mut records = parse_lines(SAMPLE).unwrap();
        let mut record = records.remove(1);
        record.properties.tipo = Some("Dedicado".to_string());
        let original = record.vertices.clone();

        let line = enrich_line(record, &lookups(), None, &EnrichOptions::default());
        assert_eq!(line.basis, DirectionBasis::Dedicated);
        assert_eq!(line.pieces, vec![original]);
    }

    #[test]
    fn test_price_mode_uses_endpoint_prices() {
        let l = lookups();
        let index = PriceIndex::build(
            &[PriceRecord {
                barra: "Central Norte".to_string(),
                timestamp: "2025-03-01 01:00-04:00".to_string(),
                price: 85.0,
                lat: -33.0,
                lon: -70.0,
            }],
            &l,
        );
        let options = EnrichOptions {
            mode: ColorMode::Price,
            ..EnrichOptions::default()
        };

        let records = parse_lines(SAMPLE).unwrap();
        let line = enrich_line(records[0].clone(), &l, Some(&index), &options);
        assert_eq!(line.price, Some(85.0));
        assert_eq!(line.color_source, ColorSource::Price(PriceBucket::Expensive));
    }

    #[test]
    fn test_price_mode_without_prices_falls_back_to_voltage() {
        let options = EnrichOptions {
            mode: ColorMode::Price,
            ..EnrichOptions::default()
        };
        let records = parse_lines(SAMPLE).unwrap();
        let line = enrich_line(records[0].clone(), &lookups(), Some(&PriceIndex::default()), &options);

        assert_eq!(line.price, None);
        assert_eq!(line.color_source, ColorSource::Voltage(VoltageBucket::High));
    }

    #[test]
    fn test_tessellation_after_orientation() {
        let record = LineRecord {
            feature: 0,
            properties: LineProperties {
                start_barra: Some("Sur".to_string()),
                end_barra: Some("Central Norte".to_string()),
                ..LineProperties::default()
            },
            vertices: vec![Vertex::new(0.0, 0.0), Vertex::new(0.22, 0.0)],
        };
        let options = EnrichOptions {
            tessellate_step_deg: Some(0.05),
            ..EnrichOptions::default()
        };

        let line = enrich_line(record, &lookups(), None, &options);
        assert_eq!(line.direction, Direction::Reversed);
        assert_eq!(line.pieces.len(), 5);
        // first piece starts at the generator end
        assert_eq!(line.pieces[0][0], Vertex::new(0.22, 0.0));
    }

    #[test]
    fn test_describe_line_placeholders() {
        let records = parse_lines(SAMPLE).unwrap();
        let text = describe_line(&records[0].properties);
        assert!(text.starts_with("<strong>Central Norte - Sur</strong>"));
        assert!(text.contains("<b>Voltaje:</b> 220 kV"));
        assert!(text.contains("<b>Longitud:</b> 12.35 km"));
        assert!(text.contains("<b>Estado:</b> —"));
        assert!(text.contains("<b>Comuna:</b> —"));

        let empty = describe_line(&LineProperties::default());
        assert!(empty.contains("<strong>—</strong>"));
        assert!(empty.contains("<b>Voltaje:</b> — kV"));
        assert!(empty.contains("<b>Longitud:</b> 0.00 km"));
    }

    #[test]
    fn test_color_mode_from_str() {
        assert_eq!("Price".parse::<ColorMode>().unwrap(), ColorMode::Price);
        assert_eq!("voltage".parse::<ColorMode>().unwrap(), ColorMode::Voltage);
        assert!("rainbow".parse::<ColorMode>().is_err());
    }

    #[tokio::test]
    async fn test_load_lines_or_empty_fails_open() {
        let lines = load_lines_or_empty(&Source::parse("/missing/lines.geojson").unwrap()).await;
        assert!(lines.is_empty());
    }
}
