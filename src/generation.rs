// Generation set - which barras inject energy into the grid
// Loaded once from a flat JSON list of substation names; every name is
// normalized through the alias table so membership queries join on the
// canonical key.

use crate::error::{LoadError, Result};
use crate::normalize::{clean_label, AliasTable};
use crate::source::Source;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;
use tracing::{info, warn};

/// Separators found in "connection point" cells: "A; B", "A / B", "A y B"
static CONNECTION_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[;,/\n-]| y | Y ").expect("valid separator pattern"));

#[derive(Debug, Clone, Default)]
pub struct GenerationSet {
    barras: HashSet<String>,
}

impl GenerationSet {
    pub fn new() -> Self {
        GenerationSet::default()
    }

    /// Normalize every name through `aliases` and collect the result.
    /// Names that clean down to nothing are dropped.
    pub fn from_names<I, S>(names: I, aliases: &AliasTable) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let barras = names
            .into_iter()
            .map(|name| aliases.normalize(name.as_ref()))
            .filter(|name| !name.is_empty())
            .collect();

        GenerationSet { barras }
    }

    /// Fetch the JSON list of generation barras
    pub async fn load(source: &Source, aliases: &AliasTable) -> Result<Self> {
        let names: Vec<String> = source.fetch_json().await?;
        let set = GenerationSet::from_names(&names, aliases);
        info!(%source, listed = names.len(), barras = set.len(), "generation set loaded");
        Ok(set)
    }

    /// Fail-open variant: any fetch/parse failure yields an empty set
    pub async fn load_or_empty(source: &Source, aliases: &AliasTable) -> Self {
        match GenerationSet::load(source, aliases).await {
            Ok(set) => set,
            Err(e) => {
                warn!(%source, error = %e, "generation set unavailable, every barra treated as non-generating");
                GenerationSet::new()
            }
        }
    }

    /// Membership test on an already-normalized identifier
    pub fn contains(&self, canonical: &str) -> bool {
        self.barras.contains(canonical)
    }

    /// Normalize a raw label, then test membership
    pub fn contains_raw(&self, raw: &str, aliases: &AliasTable) -> bool {
        self.contains(&aliases.normalize(raw))
    }

    pub fn len(&self) -> usize {
        self.barras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.barras.is_empty()
    }
}

// ============================================================================
// CONNECTION POINT EXTRACTION
// ============================================================================

/// Split a raw connection-point cell into individual barra names
pub fn split_connection_points(cell: &str) -> Vec<String> {
    CONNECTION_SEPARATORS
        .split(cell)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build the sorted, de-duplicated generation list from a CSV column of
/// connection-point cells. Names are cleaned but not alias-resolved; the
/// alias table is applied when the list is loaded.
pub fn extract_generation_list(csv_text: &str, column: &str) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers = reader.headers()?.clone();
    let index = headers
        .iter()
        .position(|h| h.trim() == column.trim())
        .ok_or_else(|| LoadError::MissingColumn(column.to_string()))?;

    let mut barras = BTreeSet::new();
    for result in reader.records() {
        let record = result?;
        let Some(cell) = record.get(index) else {
            continue;
        };
        for part in split_connection_points(cell) {
            let cleaned = clean_label(&part);
            if !cleaned.is_empty() {
                barras.insert(cleaned);
            }
        }
    }

    Ok(barras.into_iter().collect())
}
