#![cfg(feature = "sqlite")]

use serde_json::json;
use tempfile::TempDir;
use tx_sequence::prelude::*;

fn db_path(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

const SCHEMA: &str = "CREATE TABLE accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner TEXT NOT NULL,
    balance INTEGER NOT NULL,
    frozen BOOLEAN NOT NULL DEFAULT 0,
    meta TEXT
);";

#[tokio::test]
async fn execute_reports_rows_and_insert_ids() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let cap = ConfigAndPool::sqlite_builder(db_path(&dir, "bank.db"))
        .build()
        .await?;
    let mut conn = cap.get_connection().await?;
    conn.execute_batch(SCHEMA).await?;

    let first = conn
        .execute(
            "INSERT INTO accounts (owner, balance) VALUES (?1, ?2)",
            &[RowValues::Text("ada".into()), RowValues::Int(500)],
        )
        .await?;
    assert_eq!(first.rows_affected, 1);
    assert_eq!(first.last_insert_id, Some(1));

    let second = conn
        .execute(
            "INSERT INTO accounts (owner, balance, meta) VALUES (?1, ?2, ?3)",
            &[
                RowValues::Text("brian".into()),
                RowValues::Int(75),
                RowValues::JSON(json!({"tier": "gold"})),
            ],
        )
        .await?;
    assert_eq!(second.last_insert_id, Some(2));

    let updated = conn
        .execute_dml("UPDATE accounts SET balance = balance + 1", &[])
        .await?;
    assert_eq!(updated, 2);

    let unchanged = conn
        .execute("DELETE FROM accounts WHERE id = ?1", &[RowValues::Int(99)])
        .await?;
    assert_eq!(unchanged.rows_affected, 0);
    assert_eq!(unchanged.last_insert_id, None);
    Ok(())
}

#[tokio::test]
async fn select_one_returns_first_row_or_none() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let cap = ConfigAndPool::sqlite_builder(db_path(&dir, "bank.db"))
        .build()
        .await?;
    let mut conn = cap.get_connection().await?;
    conn.execute_batch(SCHEMA).await?;
    conn.execute_batch(
        "INSERT INTO accounts (owner, balance, frozen) VALUES ('ada', 10, 1), ('brian', 20, 0);",
    )
    .await?;

    let row = conn
        .select_one(
            "SELECT owner, balance, frozen FROM accounts WHERE balance > ?1 ORDER BY id",
            &[RowValues::Int(5)],
        )
        .await?
        .expect("one row");
    assert_eq!(row.get("owner").and_then(RowValues::as_text), Some("ada"));
    assert_eq!(row.get("frozen").and_then(RowValues::as_bool), Some(&true));
    assert_eq!(row.get_by_index(1), Some(&RowValues::Int(10)));

    let none = conn
        .select_one(
            "SELECT owner FROM accounts WHERE owner = ?1",
            &[RowValues::Text("nobody".into())],
        )
        .await?;
    assert!(none.is_none());
    Ok(())
}

#[tokio::test]
async fn failed_batch_is_atomic() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let cap = ConfigAndPool::sqlite_builder(db_path(&dir, "bank.db"))
        .build()
        .await?;
    let mut conn = cap.get_connection().await?;
    conn.execute_batch(SCHEMA).await?;

    let result = conn
        .execute_batch(
            "INSERT INTO accounts (owner, balance) VALUES ('ada', 1);
             INSERT INTO accounts (owner, balance) VALUES (NULL, 2);",
        )
        .await;
    assert!(result.is_err());

    let rs = conn
        .execute_select("SELECT COUNT(*) AS n FROM accounts", &[])
        .await?;
    assert_eq!(rs.results[0].get("n"), Some(&RowValues::Int(0)));
    Ok(())
}

#[tokio::test]
async fn pool_translation_accepts_dollar_placeholders() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let cap = ConfigAndPool::sqlite_builder(db_path(&dir, "bank.db"))
        .translation(true)
        .build()
        .await?;
    let mut conn = cap.get_connection().await?;
    conn.execute_batch(SCHEMA).await?;

    conn.execute(
        "INSERT INTO accounts (owner, balance) VALUES ($1, $2)",
        &[RowValues::Text("ada".into()), RowValues::Int(3)],
    )
    .await?;

    let debit = UpdateStep::new(
        "UPDATE accounts SET balance = balance - $1 WHERE owner = $2 AND balance >= $1",
        vec![RowValues::Int(3), RowValues::Text("ada".into())],
        1,
    )?;
    let audit = UpdateStep::new(
        "UPDATE accounts SET meta = $1 WHERE owner = $2",
        vec![RowValues::Text("debited".into()), RowValues::Text("ada".into())],
        1,
    )?;
    run_update_sequence(&mut conn, &debit, &audit).await?;

    // a literal `$1` inside quotes is left alone
    let row = conn
        .select_one(
            "SELECT '$1' AS lit, balance FROM accounts WHERE owner = $1",
            &[RowValues::Text("ada".into())],
        )
        .await?
        .expect("row");
    assert_eq!(row.get("lit").and_then(RowValues::as_text), Some("$1"));
    assert_eq!(row.get("balance"), Some(&RowValues::Int(0)));
    Ok(())
}

#[tokio::test]
async fn executor_refuses_to_run_inside_a_transaction() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let cap = ConfigAndPool::sqlite_builder(db_path(&dir, "bank.db"))
        .build()
        .await?;
    let mut conn = cap.get_connection().await?;
    conn.execute_batch(SCHEMA).await?;

    Session::begin(&mut conn).await?;
    let err = conn.execute_select("SELECT 1", &[]).await.unwrap_err();
    assert!(matches!(err, SqlMiddlewareDbError::ExecutionError(_)));
    Session::rollback(&mut conn).await?;

    assert!(conn.execute_select("SELECT 1", &[]).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn generic_executor_trait_drives_the_connection() -> Result<(), Box<dyn std::error::Error>> {
    async fn seed<E>(db: &mut E) -> Result<usize, SqlMiddlewareDbError>
    where
        E: AsyncDatabaseExecutor + Send,
    {
        db.execute_batch(SCHEMA).await?;
        db.execute_dml(
            "INSERT INTO accounts (owner, balance) VALUES (?1, ?2), (?3, ?4)",
            &[
                RowValues::Text("ada".into()),
                RowValues::Int(1),
                RowValues::Text("brian".into()),
                RowValues::Int(2),
            ],
        )
        .await
    }

    let dir = tempfile::tempdir()?;
    let cap = ConfigAndPool::sqlite_builder(db_path(&dir, "bank.db"))
        .build()
        .await?;
    let mut conn = cap.get_connection().await?;
    assert_eq!(seed(&mut conn).await?, 2);

    let rs = AsyncDatabaseExecutor::execute_select(
        &mut conn,
        "SELECT owner FROM accounts ORDER BY id",
        &[],
    )
    .await?;
    let owners: Vec<_> = rs
        .results
        .iter()
        .filter_map(|r| r.get("owner").and_then(RowValues::as_text))
        .collect();
    assert_eq!(owners, ["ada", "brian"]);
    Ok(())
}

#[tokio::test]
async fn raw_connection_access_for_sqlite_specifics() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let cap = ConfigAndPool::sqlite_builder(db_path(&dir, "bank.db"))
        .build()
        .await?;
    let mut conn = cap.get_connection().await?;

    let mode = conn
        .with_sqlite_connection(|raw| {
            raw.query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
                .map_err(SqlMiddlewareDbError::from)
        })
        .await?;
    assert_eq!(mode.to_lowercase(), "wal");
    Ok(())
}

#[tokio::test]
async fn pool_from_json_config() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let config = DatabaseConfig::from_json_str(
        &json!({
            "db_type": "sqlite",
            "path": db_path(&dir, "from_config.db"),
            "max_connections": 2,
            "translate_placeholders": true
        })
        .to_string(),
    )?;

    let cap = ConfigAndPool::from_config(&config).await?;
    assert_eq!(cap.db_type, DatabaseType::Sqlite);
    assert!(cap.translate_placeholders);

    let mut conn = cap.get_connection().await?;
    conn.execute_batch(SCHEMA).await?;
    let res = conn
        .execute(
            "INSERT INTO accounts (owner, balance) VALUES ($1, $2)",
            &[RowValues::Text("ada".into()), RowValues::Int(1)],
        )
        .await?;
    assert_eq!(res.rows_affected, 1);
    Ok(())
}
