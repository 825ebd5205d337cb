#![cfg(feature = "sqlite")]

use tempfile::TempDir;
use tokio::runtime::Runtime;
use tx_sequence::prelude::*;

async fn people_db(dir: &TempDir) -> Result<ConfigAndPool, SqlMiddlewareDbError> {
    let path = dir.path().join("people.db").to_string_lossy().into_owned();
    let cap = ConfigAndPool::sqlite_builder(path).build().await?;
    let mut conn = cap.get_connection().await?;
    conn.execute_batch(
        "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER NOT NULL);
         INSERT INTO people (id, name, age)
         VALUES (1, 'ada', 36), (2, 'brian', 41), (3, 'chen', 29);",
    )
    .await?;
    Ok(cap)
}

async fn age_of(conn: &mut MiddlewarePoolConnection, id: i64) -> Result<i64, SqlMiddlewareDbError> {
    let row = conn
        .select_one("SELECT age FROM people WHERE id = ?1", &[RowValues::Int(id)])
        .await?
        .ok_or_else(|| SqlMiddlewareDbError::ExecutionError(format!("no person {id}")))?;
    row.get("age")
        .and_then(RowValues::as_int)
        .copied()
        .ok_or_else(|| SqlMiddlewareDbError::ExecutionError("age is not an integer".into()))
}

fn set_age(id: i64, age: i64, expected: u64) -> UpdateStep {
    UpdateStep::new(
        "UPDATE people SET age = ?1 WHERE id = ?2",
        vec![RowValues::Int(age), RowValues::Int(id)],
        expected,
    )
    .unwrap()
}

#[test]
fn both_steps_commit_together() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let dir = tempfile::tempdir()?;
        let cap = people_db(&dir).await?;
        let mut conn = cap.get_connection().await?;

        let outcome =
            run_update_sequence(&mut conn, &set_age(1, 200, 1), &set_age(2, 201, 1)).await?;
        assert_eq!(outcome.rows_affected, vec![1, 1]);

        // committed data is visible from a different pooled connection
        let mut other = cap.get_connection().await?;
        assert_eq!(age_of(&mut other, 1).await?, 200);
        assert_eq!(age_of(&mut other, 2).await?, 201);
        Ok::<(), Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}

#[test]
fn missing_second_row_rolls_back_the_first_update() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let dir = tempfile::tempdir()?;
        let cap = people_db(&dir).await?;
        let mut conn = cap.get_connection().await?;

        // id 30 does not exist, so step 2 touches no rows
        let err = run_update_sequence(&mut conn, &set_age(1, 200, 1), &set_age(30, 200, 1))
            .await
            .unwrap_err();
        assert_eq!(err.tag().to_string(), "step2-count-mismatch");
        assert!(matches!(
            err,
            SequenceError::StepCountMismatch {
                step: 2,
                expected: 1,
                actual: 0,
                rollback: None
            }
        ));

        assert_eq!(age_of(&mut conn, 1).await?, 36);
        Ok::<(), Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}

#[tokio::test]
async fn first_step_error_leaves_store_untouched() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let cap = people_db(&dir).await?;
    let mut conn = cap.get_connection().await?;

    let broken = UpdateStep::new("UPDATE no_such_table SET age = 1", vec![], 1)?;
    let err = run_update_sequence(&mut conn, &broken, &set_age(2, 99, 1))
        .await
        .unwrap_err();
    assert_eq!(err.tag(), FailureTag::StepExec(1));
    assert!(err.rollback_error().is_none());
    assert_eq!(age_of(&mut conn, 2).await?, 41);
    Ok(())
}

#[tokio::test]
async fn second_step_violation_undoes_the_first() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let cap = people_db(&dir).await?;
    let mut conn = cap.get_connection().await?;

    let null_name = UpdateStep::new(
        "UPDATE people SET name = NULL WHERE id = ?1",
        vec![RowValues::Int(3)],
        1,
    )?;
    let err = run_update_sequence(&mut conn, &set_age(3, 70, 1), &null_name)
        .await
        .unwrap_err();
    assert_eq!(err.tag().to_string(), "step2-exec-error");
    assert_eq!(age_of(&mut conn, 3).await?, 29);
    Ok(())
}

#[tokio::test]
async fn rerunning_after_rollback_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let cap = people_db(&dir).await?;
    let mut conn = cap.get_connection().await?;

    let snapshot = "SELECT id, name, age FROM people ORDER BY id";
    let before = conn.execute_select(snapshot, &[]).await?;

    for _ in 0..2 {
        let err = run_update_sequence(&mut conn, &set_age(1, 5, 1), &set_age(30, 5, 1))
            .await
            .unwrap_err();
        assert_eq!(err.tag(), FailureTag::StepCountMismatch(2));
        let after = conn.execute_select(snapshot, &[]).await?;
        let rows = |rs: &ResultSet| {
            rs.results
                .iter()
                .map(|r| r.rows.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(rows(&after), rows(&before));
    }
    Ok(())
}

#[tokio::test]
async fn longer_sequences_report_the_failing_step() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let cap = people_db(&dir).await?;
    let mut conn = cap.get_connection().await?;

    let steps = [set_age(1, 10, 1), set_age(2, 20, 1), set_age(3, 30, 2)];
    let err = run_update_steps(&mut conn, &steps).await.unwrap_err();
    assert_eq!(err.tag().to_string(), "step3-count-mismatch");
    assert_eq!(age_of(&mut conn, 1).await?, 36);

    let steps = [set_age(1, 10, 1), set_age(2, 20, 1), set_age(3, 30, 1)];
    let outcome = run_update_steps(&mut conn, &steps).await?;
    assert_eq!(outcome.rows_affected, vec![1, 1, 1]);
    assert_eq!(age_of(&mut conn, 3).await?, 30);
    Ok(())
}

#[tokio::test]
async fn dropped_guard_rolls_back_before_next_use() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let cap = people_db(&dir).await?;
    let mut conn = cap.get_connection().await?;

    {
        let mut tx = conn.transaction().await?;
        let res = tx
            .exec(
                "UPDATE people SET age = ?1 WHERE id = ?2",
                &[RowValues::Int(1), RowValues::Int(1)],
            )
            .await?;
        assert_eq!(res.rows_affected, 1);
    }

    assert!(!conn.in_transaction());
    assert_eq!(age_of(&mut conn, 1).await?, 36);

    // the connection is usable for a fresh sequence afterwards
    run_update_sequence(&mut conn, &set_age(1, 37, 1), &set_age(2, 42, 1)).await?;
    assert_eq!(age_of(&mut conn, 1).await?, 37);
    Ok(())
}

#[tokio::test]
async fn dropped_connection_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let cap = people_db(&dir).await?;

    {
        let mut conn = cap.get_connection().await?;
        Session::begin(&mut conn).await?;
        Session::exec(
            &mut conn,
            "DELETE FROM people WHERE id = ?1",
            &[RowValues::Int(2)],
        )
        .await?;
    }

    let mut conn = cap.get_connection().await?;
    assert_eq!(age_of(&mut conn, 2).await?, 41);
    Ok(())
}

#[tokio::test]
async fn nested_begin_is_a_begin_error() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let cap = people_db(&dir).await?;
    let mut conn = cap.get_connection().await?;

    Session::begin(&mut conn).await?;
    let err = run_update_sequence(&mut conn, &set_age(1, 1, 1), &set_age(2, 2, 1))
        .await
        .unwrap_err();
    assert_eq!(err.tag(), FailureTag::Begin);
    Session::rollback(&mut conn).await?;
    assert_eq!(age_of(&mut conn, 1).await?, 36);
    Ok(())
}

#[tokio::test]
async fn named_steps_bind_against_sqlite() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let cap = people_db(&dir).await?;
    let mut conn = cap.get_connection().await?;

    let birthday = bind_named(
        "UPDATE people SET age = age + :years WHERE id IN (:ids)",
        &NamedParams::new()
            .bind("years", 1_i64)
            .bind_list("ids", vec![RowValues::Int(1), RowValues::Int(3)]),
        conn.placeholder_style(),
    )?;
    let rename = bind_named(
        "UPDATE people SET name = :name WHERE id = :id",
        &NamedParams::new().bind("name", "brian k").bind("id", 2_i64),
        conn.placeholder_style(),
    )?;

    let outcome = run_update_sequence(
        &mut conn,
        &UpdateStep::from_query_and_params(birthday, 2)?,
        &UpdateStep::from_query_and_params(rename, 1)?,
    )
    .await?;
    assert_eq!(outcome.rows_affected, vec![2, 1]);
    assert_eq!(age_of(&mut conn, 1).await?, 37);
    assert_eq!(age_of(&mut conn, 3).await?, 30);

    let row = conn
        .select_one("SELECT name FROM people WHERE id = ?1", &[RowValues::Int(2)])
        .await?
        .unwrap();
    assert_eq!(row.get("name").and_then(RowValues::as_text), Some("brian k"));
    Ok(())
}

#[tokio::test]
async fn cancelled_begin_is_rolled_back_before_next_use() -> Result<(), Box<dyn std::error::Error>>
{
    let dir = tempfile::tempdir()?;
    let cap = people_db(&dir).await?;

    {
        let mut conn = cap.get_connection().await?;
        // the begin future yields on the blocking task and is dropped there
        tokio::select! {
            biased;
            _ = Session::begin(&mut conn) => {}
            () = async {} => {}
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!conn.in_transaction());

        let inserted = conn
            .execute_dml(
                "INSERT INTO people (id, name, age) VALUES (?1, ?2, ?3)",
                &[
                    RowValues::Int(4),
                    RowValues::Text("dana".into()),
                    RowValues::Int(52),
                ],
            )
            .await?;
        assert_eq!(inserted, 1);
    }

    let mut conn = cap.get_connection().await?;
    assert_eq!(age_of(&mut conn, 4).await?, 52);
    run_update_sequence(&mut conn, &set_age(4, 53, 1), &set_age(1, 37, 1)).await?;
    assert_eq!(age_of(&mut conn, 4).await?, 53);
    Ok(())
}
