// 🏷️ Barra name normalization + alias resolution
//
// "Alto Jahuel 220kV", "ALTO JAHUEL" and "Álto Jahuel" all name the same
// substation. Every join between price data, geometry and the generation
// list goes through normalize() so they agree on one canonical key.

use crate::error::Result;
use crate::source::Source;
use csv::{ReaderBuilder, Trim};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Voltage annotations embedded in names: "220kv", "154 kv", "66v"
static VOLTAGE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[0-9]+\s*k?v\b").expect("valid voltage pattern"));

// ============================================================================
// CLEANING (no alias table involved)
// ============================================================================

/// Decompose and drop combining marks: "Línea" → "Linea", "Ñuñoa" → "Nunoa"
pub fn strip_accents(raw: &str) -> String {
    raw.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Accent-free, lowercase, whitespace-collapsed label with voltage
/// annotations removed.
///
/// Removing a token can bring two fragments together into a new token
/// ("1 220kv v" → "1 v"), so stripping repeats until nothing matches.
pub fn clean_label(raw: &str) -> String {
    let mut cleaned = collapse_whitespace(&strip_accents(raw).to_lowercase());

    while VOLTAGE_SUFFIX.is_match(&cleaned) {
        let stripped = VOLTAGE_SUFFIX.replace_all(&cleaned, " ").into_owned();
        cleaned = collapse_whitespace(&stripped);
    }

    cleaned
}

/// Lighter fold used when joining against coordinate lookups: accents,
/// case and surrounding whitespace only. Voltage tokens are kept.
pub fn fold_name(raw: &str) -> String {
    strip_accents(raw).to_lowercase().trim().to_string()
}

// ============================================================================
// ALIAS TABLE
// ============================================================================

/// Alternate name → canonical name, immutable after construction.
///
/// Keys and values are stored in clean_label() form. Chains (a → b, b → c)
/// are collapsed at build time so every stored value is a fixed point of
/// the table, which keeps normalize() idempotent.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: HashMap<String, String>,
    skipped_rows: Vec<u64>,
}

impl AliasTable {
    /// Empty table: every name resolves to its cleaned form
    pub fn new() -> Self {
        AliasTable::default()
    }

    /// Build from (alias, canonical) pairs; later pairs overwrite earlier ones.
    pub fn from_pairs<I, A, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, C)>,
        A: AsRef<str>,
        C: AsRef<str>,
    {
        let mut raw = HashMap::new();
        for (alias, canonical) in pairs {
            let alias = clean_label(alias.as_ref());
            let canonical = clean_label(canonical.as_ref());
            if alias.is_empty() || canonical.is_empty() {
                continue;
            }
            raw.insert(alias, canonical);
        }

        AliasTable {
            entries: resolve_chains(&raw),
            skipped_rows: Vec::new(),
        }
    }

    /// Parse a two-column CSV (`alias,barra`), header row first.
    ///
    /// Rows without a usable second field are skipped and their line
    /// numbers are kept in `skipped_rows()` for diagnostics.
    pub fn from_csv_str(text: &str) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(text.as_bytes());

        let mut pairs = Vec::new();
        let mut skipped_rows = Vec::new();

        for result in reader.records() {
            let record = result?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let alias = record.get(0).unwrap_or("");
            let canonical = record.get(1).unwrap_or("");

            if record.len() == 1 && alias.is_empty() {
                // blank line
                continue;
            }

            if alias.is_empty() || canonical.is_empty() {
                warn!(line, row = ?record, "skipping malformed alias row");
                skipped_rows.push(line);
                continue;
            }

            pairs.push((alias.to_string(), canonical.to_string()));
        }

        let mut table = AliasTable::from_pairs(pairs);
        table.skipped_rows = skipped_rows;
        Ok(table)
    }

    /// Fetch and parse the alias CSV
    pub async fn load(source: &Source) -> Result<Self> {
        let text = source.fetch_text().await?;
        let table = AliasTable::from_csv_str(&text)?;
        info!(%source, aliases = table.len(), skipped = table.skipped_rows.len(), "alias table loaded");
        Ok(table)
    }

    /// Fail-open variant: a missing or broken alias source yields an empty
    /// table, names then resolve to their cleaned form.
    pub async fn load_or_empty(source: &Source) -> Self {
        match AliasTable::load(source).await {
            Ok(table) => table,
            Err(e) => {
                warn!(%source, error = %e, "alias table unavailable, continuing without aliases");
                AliasTable::new()
            }
        }
    }

    /// Canonical name for an already-cleaned key
    pub fn resolve(&self, cleaned: &str) -> Option<&str> {
        self.entries.get(cleaned).map(String::as_str)
    }

    /// Clean a raw label and resolve it through the table
    pub fn normalize(&self, raw: &str) -> String {
        let cleaned = clean_label(raw);
        match self.resolve(&cleaned) {
            Some(canonical) => canonical.to_string(),
            None => cleaned,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Line numbers of rows ignored while parsing
    pub fn skipped_rows(&self) -> &[u64] {
        &self.skipped_rows
    }
}

/// Normalize a raw barra label through an alias table
pub fn normalize(raw: &str, aliases: &AliasTable) -> String {
    aliases.normalize(raw)
}

/// Follow every alias to its final target. Members of a cycle all map to
/// the smallest member of that cycle.
fn resolve_chains(raw: &HashMap<String, String>) -> HashMap<String, String> {
    let mut resolved = HashMap::with_capacity(raw.len());

    for (key, first) in raw {
        let mut path: Vec<&str> = vec![key.as_str()];
        let mut current: &str = first.as_str();

        let target = loop {
            if let Some(pos) = path.iter().position(|p| *p == current) {
                break path[pos..].iter().copied().min().unwrap_or(current);
            }
            match raw.get(current) {
                Some(next) => {
                    path.push(current);
                    current = next.as_str();
                }
                None => break current,
            }
        };

        if target != first.as_str() {
            debug!(alias = %key, via = %first, canonical = %target, "collapsed alias chain");
        }
        resolved.insert(key.clone(), target.to_string());
    }

    resolved
}

// ============================================================================
// TESTS
// ============================================================================
