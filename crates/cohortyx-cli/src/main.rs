//! Cohortyx — cohort enrichment over assay datasets.
//! Entry point for the `cohortyx` binary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use cohortyx_common::entities::{AlterationTypeFilter, CaseSets, EnrichmentType, Projection};
use cohortyx_common::CohortyxConfig;
use cohortyx_enrichment::{
    CopyNumberEnrichmentService, EngineOptions, GenericAssayService, InMemoryGateway,
    RawAssayDataFilter, Shaped, TOTAL_COUNT_HEADER,
};

#[derive(Parser, Debug)]
#[clap(name = "cohortyx", version, about = "Alteration enrichment across sample groups")]
struct Cli {
    /// Configuration file (TOML, or YAML by extension).
    #[clap(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute copy-number enrichments for groups of cases.
    Enrich {
        /// JSON dataset read by the in-memory gateway.
        #[clap(long, value_name = "FILE")]
        dataset: PathBuf,

        /// JSON array of `{name, members}` case sets.
        #[clap(long, value_name = "FILE")]
        groups: PathBuf,

        /// Alteration-type code to count; repeatable. Defaults to the configured set.
        #[clap(long = "alteration-type", value_name = "N", allow_hyphen_values = true)]
        alteration_types: Vec<i32>,

        /// `sample` or `patient`.
        #[clap(long, value_name = "TYPE")]
        enrichment_type: Option<EnrichmentType>,

        /// SUMMARY, DETAILED or META.
        #[clap(long, value_name = "P")]
        projection: Option<Projection>,
    },

    /// Fetch generic assay data for a filter.
    AssayData {
        #[clap(long, value_name = "FILE")]
        dataset: PathBuf,

        /// JSON assay-data filter.
        #[clap(long, value_name = "FILE")]
        filter: PathBuf,

        #[clap(long, value_name = "P")]
        projection: Option<Projection>,
    },

    /// Look up generic assay metadata by stable id.
    Meta {
        #[clap(long, value_name = "FILE")]
        dataset: PathBuf,

        #[clap(required = true, value_name = "STABLE_ID")]
        stable_ids: Vec<String>,
    },
}

fn init_logging(config: &CohortyxConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

fn print_shaped<T: Serialize>(shaped: &Shaped<T>, pretty: bool) -> anyhow::Result<()> {
    match shaped {
        Shaped::Count(n) => print_json(&BTreeMap::from([(TOTAL_COUNT_HEADER, *n)]), pretty),
        Shaped::Body(items) => print_json(items, pretty),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // resolved before the subscriber exists; logged once it does
    let config_path = CohortyxConfig::resolve_path(cli.config.as_deref());
    let config = CohortyxConfig::load(config_path.as_deref()).context("loading configuration")?;
    init_logging(&config);

    info!("Cohortyx {}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }

    // Ctrl-C aborts the running computation at the next unit boundary.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let pretty = config.output.pretty;

    match cli.command {
        Command::Enrich { dataset, groups, alteration_types, enrichment_type, projection } => {
            let gateway = Arc::new(InMemoryGateway::from_json_file(&dataset)?);
            let case_sets: CaseSets = read_json(&groups)?;

            let alteration_types = if alteration_types.is_empty() {
                AlterationTypeFilter::from(config.enrichment.default_alteration_types.clone())
            } else {
                AlterationTypeFilter::from(alteration_types)
            };
            let enrichment_type = enrichment_type.unwrap_or(config.enrichment.default_enrichment_type);
            let projection = projection.unwrap_or(config.output.default_projection);

            let service = CopyNumberEnrichmentService::new(gateway, EngineOptions::from(&config.enrichment));
            let shaped = service
                .get_copy_number_enrichments_projected(
                    &case_sets,
                    &alteration_types,
                    enrichment_type,
                    projection,
                    &cancel,
                )
                .await?;
            print_shaped(&shaped, pretty)?;
        }

        Command::AssayData { dataset, filter, projection } => {
            let gateway = Arc::new(InMemoryGateway::from_json_file(&dataset)?);
            let filter: RawAssayDataFilter = read_json(&filter)?;
            let projection = projection.unwrap_or(config.output.default_projection);

            let shaped = GenericAssayService::new(gateway)
                .fetch_generic_assay_data(filter, projection)
                .await?;
            print_shaped(&shaped, pretty)?;
        }

        Command::Meta { dataset, stable_ids } => {
            let gateway = Arc::new(InMemoryGateway::from_json_file(&dataset)?);
            let metas = GenericAssayService::new(gateway)
                .get_generic_assay_meta_by_stable_ids(&stable_ids)
                .await?;
            print_json(&metas, pretty)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_enrich() {
        let cli = Cli::try_parse_from([
            "cohortyx",
            "enrich",
            "--dataset",
            "data.json",
            "--groups",
            "groups.json",
            "--alteration-type",
            "-2",
            "--alteration-type",
            "2",
            "--enrichment-type",
            "patient",
            "--projection",
            "detailed",
        ])
        .unwrap();
        match cli.command {
            Command::Enrich { alteration_types, enrichment_type, projection, .. } => {
                assert_eq!(alteration_types, vec![-2, 2]);
                assert_eq!(enrichment_type, Some(EnrichmentType::Patient));
                assert_eq!(projection, Some(Projection::Detailed));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_bad_projection_rejected() {
        let parsed = Cli::try_parse_from([
            "cohortyx", "assay-data", "--dataset", "d.json", "--filter", "f.json", "--projection", "FULL",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_meta_needs_ids() {
        assert!(Cli::try_parse_from(["cohortyx", "meta", "--dataset", "d.json"]).is_err());
    }
}
