use std::net::SocketAddr;
use std::path::Path;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use portal::auth::session;
use portal::config::{Cli, Command, Config};
use portal::db;
use portal::lecturers::repository::{self as lecturers, LecturerRecord};
use portal::routes;
use portal::state::{AppState, DbPool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Ensure uploads directory exists
    std::fs::create_dir_all(config.uploads_path())?;

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    if let Some(Command::ImportLecturers { file }) = &cli.command {
        return import_lecturers(&pool, file);
    }

    {
        let conn = pool.get()?;
        let purged = session::purge_expired(&conn)?;
        if purged > 0 {
            tracing::info!(purged, "expired sessions removed");
        }
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app = routes::app(AppState::new(pool, config));

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn import_lecturers(pool: &DbPool, file: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)?;
    let records: Vec<LecturerRecord> = serde_json::from_str(&content)?;
    let mut conn = pool.get()?;
    let imported = lecturers::import(&mut conn, &records)?;
    tracing::info!(imported, file = %file.display(), "lecturers imported");
    Ok(())
}
