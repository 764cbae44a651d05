use sqlx::PgPool;

/// Embedded schema, applied in order. The first entry creates the tracking
/// table and is safe to run on every start.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "000_migration_tracking.sql",
        include_str!("../../migrations/000_migration_tracking.sql"),
    ),
    (
        "001_create_alert_events.sql",
        include_str!("../../migrations/001_create_alert_events.sql"),
    ),
];

async fn applied(pool: &PgPool) -> Result<Vec<String>, sqlx::Error> {
    sqlx::raw_sql(MIGRATIONS[0].1).execute(pool).await?;
    sqlx::query_scalar("SELECT filename FROM _migrations")
        .fetch_all(pool)
        .await
}

/// Applies every migration not yet recorded and returns their names.
pub async fn run_migrations(pool: &PgPool) -> Result<Vec<&'static str>, sqlx::Error> {
    let done = applied(pool).await?;
    let mut newly_applied = Vec::new();

    for (filename, sql) in &MIGRATIONS[1..] {
        if done.iter().any(|a| a == filename) {
            continue;
        }
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO _migrations (filename) VALUES ($1)")
            .bind(filename)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::info!(%filename, "migration applied");
        newly_applied.push(*filename);
    }

    Ok(newly_applied)
}

pub async fn pending_migrations(pool: &PgPool) -> Result<Vec<&'static str>, sqlx::Error> {
    let done = applied(pool).await?;
    Ok(MIGRATIONS[1..]
        .iter()
        .map(|(name, _)| *name)
        .filter(|name| !done.iter().any(|a| a == name))
        .collect())
}
