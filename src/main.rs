use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use gridflow::{
    build_price_sample, enrich_lines, extract_generation_list, load_lines_or_empty, price_points,
    spawn_lookups, BarraLocations, ColorMode, Config, MarginalCostRow, PriceIndex, PricePoint,
    PriceStore, RenderedLine,
};

const USAGE: &str = "\
gridflow - transmission grid data shaping

USAGE:
    gridflow normalize <name>...
    gridflow lines [--mode voltage|price]
    gridflow prices
    gridflow sample <marginal_costs.json> <barra_lookup.csv> [utc_offset]
    gridflow extract-generation <centrales.csv> <column>

Sources are configured through GRIDFLOW_* environment variables (.env is read).";

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // JSON goes to stdout, logs to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    match command.as_str() {
        "normalize" => run_normalize(&args[1..]).await,
        "lines" => run_lines(&args[1..]).await,
        "prices" => run_prices().await,
        "sample" => run_sample(&args[1..]),
        "extract-generation" => run_extract_generation(&args[1..]),
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("unknown command: {}\n\n{}", other, USAGE),
    }
}

async fn run_normalize(names: &[String]) -> Result<()> {
    if names.is_empty() {
        bail!("normalize needs at least one name");
    }

    let config = Config::from_env()?;
    let lookups = spawn_lookups(config.alias_source, config.generation_source)
        .ready()
        .await;

    for name in names {
        let canonical = lookups.normalize(name);
        let marker = if lookups.generation().contains(&canonical) {
            "  [generation]"
        } else {
            ""
        };
        println!("{} → {}{}", name, canonical, marker);
    }

    Ok(())
}

fn parse_mode(args: &[String]) -> Result<Option<ColorMode>> {
    match args {
        [] => Ok(None),
        [flag, value] if flag == "--mode" => value
            .parse()
            .map(Some)
            .map_err(|e: String| anyhow::anyhow!(e)),
        _ => bail!("expected: lines [--mode voltage|price]"),
    }
}

async fn run_lines(args: &[String]) -> Result<()> {
    let config = Config::from_env()?;
    let mode = parse_mode(args)?;

    let rendered = render_lines(&config, mode).await;
    println!("{}", serde_json::to_string_pretty(&rendered)?);

    Ok(())
}

/// Load, orient and color every line. Unreachable sources yield `[]`,
/// with the cause logged to stderr.
async fn render_lines(config: &Config, mode: Option<ColorMode>) -> Vec<RenderedLine> {
    let options = config.enrich_options(mode);

    // lookups load in the background while the geometry is fetched
    let lookups_handle = spawn_lookups(config.alias_source.clone(), config.generation_source.clone());
    let records = load_lines_or_empty(&config.lines_source).await;
    let lookups = lookups_handle.ready().await;

    let index = match options.mode {
        ColorMode::Price => {
            let store = PriceStore::new();
            store.refresh_or_keep(&config.prices_source).await;
            Some(PriceIndex::build(&store.current().records, &lookups))
        }
        ColorMode::Voltage => None,
    };

    enrich_lines(records, &lookups, index.as_ref(), &options)
}

async fn run_prices() -> Result<()> {
    let config = Config::from_env()?;

    let points = render_prices(&config).await;
    println!("{}", serde_json::to_string_pretty(&points)?);

    Ok(())
}

async fn render_prices(config: &Config) -> Vec<PricePoint> {
    let store = PriceStore::new();
    store.refresh_or_keep(&config.prices_source).await;
    price_points(&store.current().records)
}

fn run_sample(args: &[String]) -> Result<()> {
    let (raw_path, lookup_path, offset) = match args {
        [raw, lookup] => (raw, lookup, "-04:00"),
        [raw, lookup, offset] => (raw, lookup, offset.as_str()),
        _ => bail!("expected: sample <marginal_costs.json> <barra_lookup.csv> [utc_offset]"),
    };

    let raw_text = std::fs::read_to_string(Path::new(raw_path))
        .with_context(|| format!("Failed to read {}", raw_path))?;
    let rows: Vec<MarginalCostRow> =
        serde_json::from_str(&raw_text).context("Failed to parse marginal cost JSON")?;

    let lookup_text = std::fs::read_to_string(Path::new(lookup_path))
        .with_context(|| format!("Failed to read {}", lookup_path))?;
    let locations = BarraLocations::from_csv_str(&lookup_text).context("Failed to parse barra lookup")?;

    let sample = build_price_sample(&rows, &locations, offset)?;
    println!("{}", serde_json::to_string_pretty(&sample)?);

    Ok(())
}

fn run_extract_generation(args: &[String]) -> Result<()> {
    let [path, column] = args else {
        bail!("expected: extract-generation <centrales.csv> <column>");
    };

    let text = std::fs::read_to_string(Path::new(path))
        .with_context(|| format!("Failed to read {}", path))?;
    let barras = extract_generation_list(&text, column)?;

    eprintln!("✓ {} generation barras", barras.len());
    println!("{}", serde_json::to_string_pretty(&barras)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(lines: &str, prices: &str) -> Config {
        Config::from_lookup(|key| match key {
            "GRIDFLOW_ALIAS_SOURCE" => Some("/missing/alias.csv".to_string()),
            "GRIDFLOW_GENERATION_SOURCE" => Some("/missing/generation.json".to_string()),
            "GRIDFLOW_LINES_SOURCE" => Some(lines.to_string()),
            "GRIDFLOW_PRICES_SOURCE" => Some(prices.to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode(&[]).unwrap(), None);
        let args = vec!["--mode".to_string(), "price".to_string()];
        assert_eq!(parse_mode(&args).unwrap(), Some(ColorMode::Price));
        assert!(parse_mode(&["--mode".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_render_lines_with_missing_sources_is_empty() {
        let config = config_with("/missing/lines.geojson", "/missing/prices.json");
        assert!(render_lines(&config, None).await.is_empty());
        assert!(render_lines(&config, Some(ColorMode::Price)).await.is_empty());
    }

    #[tokio::test]
    async fn test_render_prices_with_missing_source_is_empty() {
        let config = config_with("/missing/lines.geojson", "/missing/prices.json");
        assert!(render_prices(&config).await.is_empty());
    }
}
