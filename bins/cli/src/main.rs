//! Locus command-line front end.
//!
//! Runs catalog maintenance against the configured database: partition
//! bootstrap, CSV import and export, and the bulk recomputes.
//!
//! Configuration comes from `config/` and `LOCUS__*` variables, see
//! [`AppConfig::load`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use locus_core::location_type::ImportMode;
use locus_db::CatalogService;
use locus_shared::AppConfig;
use locus_shared::telemetry;
use locus_shared::types::{LocationId, PartitionKey};

#[derive(Parser)]
#[command(name = "locus")]
#[command(author, version, about = "Locus: hierarchical location catalog")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the root type and the org location of a partition.
    Bootstrap {
        #[arg(long, value_parser = parse_partition)]
        partition: PartitionKey,
        /// Display name of the org location
        #[arg(long)]
        org_name: String,
    },

    /// Import location types from a `name,display_name,parent_name` CSV.
    ImportTypes {
        #[arg(long, value_parser = parse_partition)]
        partition: PartitionKey,
        /// Input CSV file
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = Mode::BestEffort)]
        mode: Mode,
    },

    /// Import locations from a
    /// `partner_internal_id,name,location_type,partner_internal_parent_id` CSV.
    ImportLocations {
        #[arg(long, value_parser = parse_partition)]
        partition: PartitionKey,
        /// Input CSV file
        file: PathBuf,
    },

    /// Recompute access paths below the given locations.
    RecomputePaths {
        #[arg(long, value_parser = parse_partition)]
        partition: PartitionKey,
        /// Locations whose subtrees are rewritten
        #[arg(long = "id", required = true)]
        ids: Vec<Uuid>,
    },

    /// Recompute type levels across every partition.
    RecomputeLevels,

    /// Export visible locations as CSV.
    ExportLocations {
        #[arg(long, value_parser = parse_partition)]
        partition: PartitionKey,
        /// Output file; stdout when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Export location types as CSV.
    ExportTypes {
        #[arg(long, value_parser = parse_partition)]
        partition: PartitionKey,
        /// Output file; stdout when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Soft-delete a location, hiding its subtree.
    Delete {
        #[arg(long, value_parser = parse_partition)]
        partition: PartitionKey,
        #[arg(long)]
        id: Uuid,
    },

    /// Clear a location's tombstone.
    Restore {
        #[arg(long, value_parser = parse_partition)]
        partition: PartitionKey,
        #[arg(long)]
        id: Uuid,
    },

    /// Set or clear the archived flag of a location.
    Archive {
        #[arg(long, value_parser = parse_partition)]
        partition: PartitionKey,
        #[arg(long)]
        id: Uuid,
        /// Clear the flag instead of setting it
        #[arg(long)]
        unarchive: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    BestEffort,
    AllOrNothing,
}

impl From<Mode> for ImportMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::BestEffort => Self::BestEffort,
            Mode::AllOrNothing => Self::AllOrNothing,
        }
    }
}

#[derive(Serialize)]
struct PathSummary {
    visited: usize,
    rewritten: usize,
}

#[derive(Serialize)]
struct LevelSummary {
    leveled: usize,
    unreachable: Vec<String>,
}

fn parse_partition(raw: &str) -> Result<PartitionKey, String> {
    PartitionKey::new(raw).ok_or_else(|| "partition must not be blank".to_string())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn read_payload(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn write_payload(out: Option<&Path>, payload: &[u8]) -> Result<()> {
    match out {
        Some(path) => tokio::fs::write(path, payload)
            .await
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            use std::io::Write;
            std::io::stdout().write_all(payload)?;
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load().context("Failed to load configuration")?;
    telemetry::init(&config.logging);

    let db = locus_db::connect_with(&config.database).await?;
    info!("Connected to database");
    let service = CatalogService::new(db, &config.catalog);

    run(&service, cli.command).await
}

async fn run(service: &CatalogService, command: Commands) -> Result<()> {
    match command {
        Commands::Bootstrap {
            partition,
            org_name,
        } => {
            let root = service.bootstrap_partition(&partition, &org_name).await?;
            print_json(&root)
        }
        Commands::ImportTypes {
            partition,
            file,
            mode,
        } => {
            let payload = read_payload(&file).await?;
            let imported = service
                .import_location_types_csv(&partition, &payload, mode.into())
                .await?;
            print_json(&imported)
        }
        Commands::ImportLocations { partition, file } => {
            let payload = read_payload(&file).await?;
            let imported = service.import_locations_csv(&partition, &payload).await?;
            print_json(&imported)
        }
        Commands::RecomputePaths { partition, ids } => {
            let ids: Vec<LocationId> = ids.into_iter().map(LocationId::from_uuid).collect();
            let counts = service.recompute_access_paths(&partition, &ids).await?;
            print_json(&PathSummary {
                visited: counts.visited,
                rewritten: counts.rewritten,
            })
        }
        Commands::RecomputeLevels => {
            let plan = service.recompute_type_levels().await?;
            print_json(&LevelSummary {
                leveled: plan.levels.len(),
                unreachable: plan.unreachable.iter().map(ToString::to_string).collect(),
            })
        }
        Commands::ExportLocations { partition, out } => {
            let payload = service.export_locations_csv(&partition).await?;
            write_payload(out.as_deref(), &payload).await
        }
        Commands::ExportTypes { partition, out } => {
            let payload = service.export_location_types_csv(&partition).await?;
            write_payload(out.as_deref(), &payload).await
        }
        Commands::Delete { partition, id } => {
            service
                .soft_delete(&partition, LocationId::from_uuid(id))
                .await?;
            Ok(())
        }
        Commands::Restore { partition, id } => {
            service
                .restore(&partition, LocationId::from_uuid(id))
                .await?;
            Ok(())
        }
        Commands::Archive {
            partition,
            id,
            unarchive,
        } => {
            service
                .set_archived(&partition, LocationId::from_uuid(id), !unarchive)
                .await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_import_types_defaults_to_best_effort() {
        let cli = Cli::try_parse_from([
            "locus",
            "import-types",
            "--partition",
            "manabie",
            "types.csv",
        ])
        .unwrap();

        match cli.command {
            Commands::ImportTypes { partition, mode, .. } => {
                assert_eq!(partition.as_str(), "manabie");
                assert_eq!(ImportMode::from(mode), ImportMode::BestEffort);
            }
            _ => panic!("expected import-types"),
        }
    }

    #[test]
    fn test_blank_partition_is_rejected() {
        let parsed = Cli::try_parse_from([
            "locus",
            "bootstrap",
            "--partition",
            " ",
            "--org-name",
            "X",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_recompute_paths_requires_an_id() {
        let parsed = Cli::try_parse_from(["locus", "recompute-paths", "--partition", "manabie"]);
        assert!(parsed.is_err());
    }
}
