use sqlx::Row;

fn database_url() -> String {
    // Integration tests don't use app config; read the same variables directly.
    dotenvy::dotenv().ok();

    if let Ok(url) = std::env::var("DATABASE_URL") {
        if !url.trim().is_empty() {
            return url;
        }
    }

    let server = std::env::var("POSTGRES_SERVER").unwrap_or_else(|_| "localhost".into());
    let port = std::env::var("POSTGRES_PORT").unwrap_or_else(|_| "5432".into());
    let user = std::env::var("POSTGRES_USER").unwrap_or_else(|_| "quizforge".into());
    let password = std::env::var("POSTGRES_PASSWORD").unwrap_or_default();
    let db = std::env::var("POSTGRES_DB").unwrap_or_else(|_| "quizforge".into());

    format!("postgresql://{user}:{password}@{server}:{port}/{db}")
}

async fn migrated_pool() -> anyhow::Result<sqlx::PgPool> {
    let pool =
        sqlx::postgres::PgPoolOptions::new().max_connections(1).connect(&database_url()).await?;

    let migrations_dir =
        std::env::var("QUIZFORGE_MIGRATIONS_DIR").unwrap_or_else(|_| "migrations".to_string());
    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(&migrations_dir)).await?;
    migrator.run(&pool).await?;
    Ok(pool)
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn migrations_apply_and_tables_exist() -> anyhow::Result<()> {
    let pool = migrated_pool().await?;

    let tables = [
        "tests",
        "questions",
        "question_options",
        "test_access",
        "attempts",
        "attempt_answers",
        "group_members",
    ];

    for table in tables {
        let row = sqlx::query("SELECT to_regclass($1)::text").bind(table).fetch_one(&pool).await?;
        let regclass: Option<String> = row.try_get(0)?;
        assert!(regclass.is_some(), "expected table {table} to exist after migrations");
    }

    Ok(())
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn second_in_progress_attempt_is_rejected() -> anyhow::Result<()> {
    let pool = migrated_pool().await?;
    let test_id = uuid::Uuid::new_v4().to_string();

    sqlx::query(
        "INSERT INTO tests (id, title, owner_user_id, created_at, updated_at)
         VALUES ($1, 'Smoke', 'owner', NOW(), NOW())",
    )
    .bind(&test_id)
    .execute(&pool)
    .await?;

    let insert_attempt = |id: String| {
        sqlx::query(
            "INSERT INTO attempts (id, test_id, user_id, status, started_at)
             VALUES ($1, $2, 'student', 'in_progress', NOW())",
        )
        .bind(id)
        .bind(test_id.clone())
    };

    insert_attempt(uuid::Uuid::new_v4().to_string()).execute(&pool).await?;
    let duplicate = insert_attempt(uuid::Uuid::new_v4().to_string()).execute(&pool).await;
    let err = duplicate.expect_err("partial unique index must reject a second active attempt");
    let code = err.as_database_error().and_then(|db| db.code()).map(|code| code.to_string());
    assert_eq!(code.as_deref(), Some("23505"));

    sqlx::query("DELETE FROM attempts WHERE test_id = $1").bind(&test_id).execute(&pool).await?;
    sqlx::query("DELETE FROM tests WHERE id = $1").bind(&test_id).execute(&pool).await?;
    Ok(())
}
