use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

/// Initialize a PostgreSQL connection pool and bring the schema up to date.
pub async fn init_db(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    info!("Database connection established");

    // Also adds folder_name columns to databases created before folder ids
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("Database migrations applied");
    Ok(pool)
}
