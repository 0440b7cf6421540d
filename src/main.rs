//! # Moussem Main Entry Point
//!
//! Wires configuration, the database pool, the search client, the pipeline
//! orchestrator, the scheduler, and the admin server together. External
//! clients are constructed here and injected explicitly; nothing in the
//! pipeline reaches for process-wide singletons.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use moussem::{
    config::ConfigLoader,
    db,
    editorial::EditorialHandler,
    pipeline::{NoopSitemapNotifier, PipelineOrchestrator},
    scheduler::IngestionScheduler,
    search::{ProjectionSynchronizer, TypesenseClient},
    seeds, server, telemetry,
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "moussem")]
#[command(about = "Event catalog ingestion and search projection service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Run one ingestion pass and exit
    Run,
    /// Drop and rebuild the search collection, then exit
    RebuildIndex,
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = ConfigLoader::new().load()?;
    telemetry::init_tracing(&config)?;

    let db = db::init_pool(&config).await?;

    if let Some(Commands::Migrate { action }) = &cli.command {
        return handle_migrate_command(&db, action).await;
    }

    // Migrations and seeds apply automatically outside production profiles.
    if config.profile == "local" || config.profile == "test" {
        Migrator::up(&db, None).await?;
        seeds::seed_reference_data(&db).await?;
    }

    let engine = Arc::new(TypesenseClient::new(&config.search)?);
    let search = Arc::new(ProjectionSynchronizer::new(db.clone(), engine));
    search.ensure_schema().await?;

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        db.clone(),
        search.clone(),
        Arc::new(NoopSitemapNotifier),
        config.pipeline.clone(),
    ));

    let shutdown = CancellationToken::new();

    match cli.command {
        Some(Commands::Run) => {
            let report = orchestrator.run(&shutdown).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }
        Some(Commands::RebuildIndex) => {
            let outcome = search.full_rebuild(&shutdown).await?;
            println!(
                "rebuild finished: indexed={} errors={}",
                outcome.indexed, outcome.errors
            );
            return Ok(());
        }
        Some(Commands::Migrate { .. }) => unreachable!("handled above"),
        None => {}
    }

    tracing::info!(profile = %config.profile, "starting moussem");
    if let Ok(redacted) = config.redacted_json() {
        tracing::debug!(config = %redacted, "loaded configuration");
    }

    let editorial = Arc::new(EditorialHandler::new(db.clone(), search.clone()));
    let state = server::AppState {
        db,
        config: Arc::new(config),
        orchestrator: orchestrator.clone(),
        editorial,
        search,
    };

    // Scheduler and server run side by side until ctrl-c.
    let scheduler = IngestionScheduler::new(orchestrator);
    let scheduler_shutdown = shutdown.clone();
    let scheduler_handle = tokio::spawn(scheduler.run(scheduler_shutdown));

    let server_result = tokio::select! {
        result = server::run_server(state) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    };

    shutdown.cancel();
    let _ = scheduler_handle.await;
    server_result
}

async fn handle_migrate_command(
    db: &DatabaseConnection,
    action: &MigrateAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        MigrateAction::Up => {
            println!("Applying migrations...");
            Migrator::up(db, None).await?;
            println!("All migrations applied successfully");
        }
        MigrateAction::Down => {
            println!("Rolling back last migration...");
            Migrator::down(db, Some(1)).await?;
            println!("Migration rolled back successfully");
        }
        MigrateAction::Status => {
            let applied = Migrator::get_applied_migrations(db).await?;
            let pending = Migrator::get_pending_migrations(db).await?;
            println!("Applied migrations: {}", applied.len());
            println!("Pending migrations: {}", pending.len());
        }
    }
    Ok(())
}
