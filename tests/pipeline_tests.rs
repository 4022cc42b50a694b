//! End-to-end pipeline tests against an in-memory DuckDB warehouse

#![cfg(feature = "duckdb-backend")]

use std::fs;
use std::path::Path;

use songplay_etl::catalog::{BulkLoad, Dialect, JsonFormat, Table};
use songplay_etl::pipeline::{Pipeline, RunOptions, Stage};
use songplay_etl::warehouse::{DuckDbWarehouse, EtlConfig, Warehouse, WarehouseError, connect};
use tempfile::TempDir;

const LOG_JSONPATHS: &str = r#"{
    "jsonpaths": [
        "$['artist']", "$['auth']", "$['firstName']", "$['gender']",
        "$['itemInSession']", "$['lastName']", "$['length']", "$['level']",
        "$['location']", "$['method']", "$['page']", "$['registration']",
        "$['sessionId']", "$['song']", "$['status']", "$['ts']",
        "$['userAgent']", "$['userId']"
    ]
}"#;

const EVENTS: &str = r#"{"artist":"Line Renaud","auth":"Logged In","firstName":"Walter","gender":"M","itemInSession":0,"lastName":"Frye","length":152.92036,"level":"free","location":"San Francisco-Oakland-Hayward, CA","method":"PUT","page":"NextSong","registration":1540919166796.0,"sessionId":38,"song":"Der Kleine Dompfaff","status":200,"ts":1541105830796,"userAgent":"Mozilla/5.0","userId":"39"}
{"artist":"Nobody Known","auth":"Logged In","firstName":"Walter","gender":"M","itemInSession":1,"lastName":"Frye","length":200.1,"level":"paid","location":"San Francisco-Oakland-Hayward, CA","method":"PUT","page":"NextSong","registration":1540919166796.0,"sessionId":38,"song":"Missing Song","status":200,"ts":1541106106796,"userAgent":"Mozilla/5.0","userId":"39"}
{"artist":null,"auth":"Logged In","firstName":"Kaylee","gender":"F","itemInSession":0,"lastName":"Summers","length":null,"level":"free","location":"Phoenix-Mesa-Scottsdale, AZ","method":"GET","page":"Home","registration":1540344794796.0,"sessionId":139,"song":null,"status":200,"ts":1541106352796,"userAgent":"Mozilla/5.0","userId":"8"}
{"artist":null,"auth":"Logged Out","firstName":null,"gender":null,"itemInSession":1,"lastName":null,"length":null,"level":"free","location":null,"method":"GET","page":"Login","registration":null,"sessionId":52,"song":null,"status":307,"ts":1541106496796,"userAgent":null,"userId":""}
"#;

const SONG_LINE_RENAUD: &str = r#"{"num_songs": 1, "artist_id": "ARJIE2Y1187B994AB7", "artist_latitude": null, "artist_longitude": null, "artist_location": "", "artist_name": "Line Renaud", "song_id": "SOUPIRU12A6D4FA1E1", "title": "Der Kleine Dompfaff", "duration": 152.92036, "year": 0}"#;

const SONG_CASUAL: &str = r#"{"num_songs": 1, "artist_id": "ARMJAGH1187FB546F3", "artist_latitude": 35.14968, "artist_longitude": -90.04892, "artist_location": "Memphis, TN", "artist_name": "The Box Tops", "song_id": "SOCIWDW12A8C13D406", "title": "Soul Deep", "duration": 148.03546, "year": 1969}"#;

struct Fixture {
    dir: TempDir,
    config: EtlConfig,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        write(&root.join("log_data/2018/11/2018-11-01-events.json"), EVENTS);
        write(&root.join("song_data/A/A/A/TRAAAAK128F9318786.json"), SONG_LINE_RENAUD);
        write(&root.join("song_data/A/A/B/TRAABJL12903CDCF1A.json"), SONG_CASUAL);
        write(&root.join("log_json_path.json"), LOG_JSONPATHS);

        let mut config = EtlConfig::duckdb(
            ":memory:",
            &root.join("log_data").to_string_lossy(),
            &root.join("song_data").to_string_lossy(),
        );
        config.s3.log_jsonpath = root.join("log_json_path.json").to_string_lossy().into_owned();

        Self { dir, config }
    }

    fn path(&self, relative: &str) -> String {
        self.dir.path().join(relative).to_string_lossy().into_owned()
    }
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

async fn count(warehouse: &dyn Warehouse, sql: &str) -> i64 {
    let result = warehouse.execute_query(sql).await.unwrap();
    result
        .scalar()
        .and_then(|v| v.as_i64())
        .unwrap_or_else(|| panic!("no integer result for {}", sql))
}

async fn text(warehouse: &dyn Warehouse, sql: &str) -> Option<String> {
    let result = warehouse.execute_query(sql).await.unwrap();
    result.scalar().and_then(|v| v.as_str().map(str::to_string))
}

#[tokio::test]
async fn test_schema_creation_is_idempotent() {
    let warehouse = DuckDbWarehouse::in_memory().unwrap();

    let setup = Pipeline::setup(Dialect::DuckDb, false).unwrap();
    setup.run(&warehouse, RunOptions::default()).await.unwrap();
    setup.run(&warehouse, RunOptions::default()).await.unwrap();

    for table in ["staging_events", "staging_songs", "users", "artists", "songs", "songplays"] {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        assert_eq!(count(&warehouse, &sql).await, 0);
    }
    assert_eq!(count(&warehouse, "SELECT COUNT(*) FROM \"time\"").await, 0);

    // Dropping and recreating works on a populated schema too
    let reset = Pipeline::setup(Dialect::DuckDb, true).unwrap();
    reset.run(&warehouse, RunOptions::default()).await.unwrap();
}

#[tokio::test]
async fn test_full_run_populates_star_schema() {
    let fixture = Fixture::new();
    let warehouse = DuckDbWarehouse::in_memory().unwrap();

    let report = Pipeline::etl(&fixture.config, true)
        .unwrap()
        .run(&warehouse, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(report.step("load_staging_events").unwrap().rows_affected, 4);
    assert_eq!(report.step("load_staging_songs").unwrap().rows_affected, 2);

    assert_eq!(count(&warehouse, "SELECT COUNT(*) FROM \"time\"").await, 4);
    assert_eq!(count(&warehouse, "SELECT COUNT(*) FROM users").await, 2);
    assert_eq!(count(&warehouse, "SELECT COUNT(*) FROM artists").await, 2);
    assert_eq!(count(&warehouse, "SELECT COUNT(*) FROM songs").await, 2);
    assert_eq!(count(&warehouse, "SELECT COUNT(*) FROM songplays").await, 2);

    // Empty coordinates come through as null
    assert_eq!(
        count(
            &warehouse,
            "SELECT COUNT(*) FROM artists WHERE artist_id = 'ARJIE2Y1187B994AB7' AND latitude IS NULL"
        )
        .await,
        1
    );
}

#[tokio::test]
async fn test_epoch_millis_become_timestamps() {
    let fixture = Fixture::new();
    let warehouse = DuckDbWarehouse::in_memory().unwrap();
    Pipeline::etl(&fixture.config, true)
        .unwrap()
        .run(&warehouse, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(
        text(&warehouse, "SELECT MIN(start_time) FROM \"time\"").await,
        Some("2018-11-01 20:57:10.796".to_string())
    );

    let parts = warehouse
        .execute_query(
            "SELECT CAST(hour AS INTEGER) AS hour, CAST(day AS INTEGER) AS day,
                    CAST(month AS INTEGER) AS month, CAST(year AS INTEGER) AS year, weekday
               FROM \"time\"
              WHERE start_time = (SELECT MIN(start_time) FROM \"time\")",
        )
        .await
        .unwrap();
    let row = &parts.rows[0];
    assert_eq!(row["hour"], 20);
    assert_eq!(row["day"], 1);
    assert_eq!(row["month"], 11);
    assert_eq!(row["year"], 2018);
    assert_eq!(row["weekday"], "4");
}

#[tokio::test]
async fn test_same_timestamp_in_one_batch_gives_one_time_row() {
    let mut fixture = Fixture::new();
    write(
        &fixture.dir.path().join("same_ts/events.json"),
        r#"{"artist":"Line Renaud","firstName":"Walter","lastName":"Frye","gender":"M","level":"free","page":"NextSong","sessionId":38,"song":"Der Kleine Dompfaff","ts":1541105830796,"userAgent":"Mozilla/5.0","userId":"39"}
{"artist":"Line Renaud","firstName":"Walter","lastName":"Frye","gender":"M","level":"paid","page":"NextSong","sessionId":38,"song":"Der Kleine Dompfaff","ts":1541105830796,"userAgent":"Mozilla/5.0","userId":"39"}
"#,
    );
    fixture.config.s3.log_data = fixture.path("same_ts");

    let warehouse = DuckDbWarehouse::in_memory().unwrap();
    Pipeline::etl(&fixture.config, true)
        .unwrap()
        .run(&warehouse, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(count(&warehouse, "SELECT COUNT(*) FROM \"time\"").await, 1);
    assert_eq!(
        count(
            &warehouse,
            "SELECT COUNT(*) FROM songplays p JOIN \"time\" t ON p.start_time = t.start_time WHERE p.song_key IS NOT NULL"
        )
        .await,
        2
    );
    assert_eq!(
        text(&warehouse, "SELECT level FROM users WHERE user_id = '39'").await,
        Some("paid".to_string())
    );
}

#[tokio::test]
async fn test_float_timestamp_matches_integer_form() {
    let mut fixture = Fixture::new();
    write(
        &fixture.dir.path().join("float_ts/events.json"),
        r#"{"artist":"Line Renaud","firstName":"Walter","lastName":"Frye","gender":"M","level":"free","page":"NextSong","sessionId":38,"song":"Der Kleine Dompfaff","ts":1541105830796.0,"userAgent":"Mozilla/5.0","userId":"39"}
{"artist":"Line Renaud","firstName":"Walter","lastName":"Frye","gender":"M","level":"free","page":"NextSong","sessionId":38,"song":"Der Kleine Dompfaff","ts":1541105830796,"userAgent":"Mozilla/5.0","userId":"39"}
"#,
    );
    fixture.config.s3.log_data = fixture.path("float_ts");

    let warehouse = DuckDbWarehouse::in_memory().unwrap();
    Pipeline::etl(&fixture.config, true)
        .unwrap()
        .run(&warehouse, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(count(&warehouse, "SELECT COUNT(*) FROM \"time\"").await, 1);
    assert_eq!(
        text(&warehouse, "SELECT MIN(start_time) FROM \"time\"").await,
        Some("2018-11-01 20:57:10.796".to_string())
    );
    assert_eq!(
        count(
            &warehouse,
            "SELECT COUNT(DISTINCT start_time) FROM songplays"
        )
        .await,
        1
    );
}

#[tokio::test]
async fn test_song_without_artist_id_is_skipped() {
    let fixture = Fixture::new();
    write(
        &fixture.dir.path().join("song_data/A/A/C/TRAACER128F4290F96.json"),
        r#"{"num_songs": 1, "artist_id": null, "artist_latitude": null, "artist_longitude": null, "artist_location": "", "artist_name": "Unknown", "song_id": "SOXVLOJ12AB0189215", "title": "Amor De Cabaret", "duration": 177.47546, "year": 0}"#,
    );

    let warehouse = DuckDbWarehouse::in_memory().unwrap();
    let report = Pipeline::etl(&fixture.config, true)
        .unwrap()
        .run(&warehouse, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(report.step("load_staging_songs").unwrap().rows_affected, 3);
    assert_eq!(count(&warehouse, "SELECT COUNT(*) FROM artists").await, 2);
    assert_eq!(count(&warehouse, "SELECT COUNT(*) FROM songs").await, 2);
    assert_eq!(
        count(&warehouse, "SELECT COUNT(*) FROM songs WHERE song_id = 'SOXVLOJ12AB0189215'").await,
        0
    );
}

#[tokio::test]
async fn test_rerun_does_not_duplicate_dimensions() {
    let fixture = Fixture::new();
    let warehouse = DuckDbWarehouse::in_memory().unwrap();
    Pipeline::etl(&fixture.config, true)
        .unwrap()
        .run(&warehouse, RunOptions::default())
        .await
        .unwrap();

    let transforms = Pipeline::etl(&fixture.config, false)
        .unwrap()
        .only(Stage::Transform);
    transforms.run(&warehouse, RunOptions::default()).await.unwrap();

    assert_eq!(count(&warehouse, "SELECT COUNT(*) FROM \"time\"").await, 4);
    assert_eq!(count(&warehouse, "SELECT COUNT(*) FROM users").await, 2);
    assert_eq!(count(&warehouse, "SELECT COUNT(*) FROM artists").await, 2);
    assert_eq!(count(&warehouse, "SELECT COUNT(*) FROM songs").await, 2);

    // The fact insert has no guard and appends again
    assert_eq!(count(&warehouse, "SELECT COUNT(*) FROM songplays").await, 4);
}

#[tokio::test]
async fn test_user_level_prefers_paid() {
    let fixture = Fixture::new();
    let warehouse = DuckDbWarehouse::in_memory().unwrap();
    Pipeline::etl(&fixture.config, true)
        .unwrap()
        .run(&warehouse, RunOptions::default())
        .await
        .unwrap();

    // User 39 appears as free then paid in one batch
    assert_eq!(
        text(&warehouse, "SELECT level FROM users WHERE user_id = '39'").await,
        Some("paid".to_string())
    );
    // Logged-out events carry no user
    assert_eq!(
        count(&warehouse, "SELECT COUNT(*) FROM users WHERE user_id = ''").await,
        0
    );
}

#[tokio::test]
async fn test_existing_user_is_upgraded() {
    let fixture = Fixture::new();
    write(
        &fixture.dir.path().join("batch1/events.json"),
        r#"{"firstName":"Lily","lastName":"Koch","gender":"F","level":"free","page":"NextSong","sessionId":5,"ts":1541107000000,"userAgent":"Mozilla/5.0","userId":"15"}"#,
    );
    write(
        &fixture.dir.path().join("batch2/events.json"),
        r#"{"firstName":"Lily","lastName":"Koch","gender":"F","level":"paid","page":"NextSong","sessionId":6,"ts":1541108000000,"userAgent":"Mozilla/5.0","userId":"15"}"#,
    );

    let warehouse = DuckDbWarehouse::in_memory().unwrap();
    Pipeline::setup(Dialect::DuckDb, false)
        .unwrap()
        .run(&warehouse, RunOptions::default())
        .await
        .unwrap();

    let transforms = Pipeline::etl(&fixture.config, false)
        .unwrap()
        .only(Stage::Transform);

    let load = |dir: &str| {
        BulkLoad::new(
            Table::StagingEvents,
            fixture.path(dir),
            JsonFormat::JsonPaths(fixture.config.s3.log_jsonpath.clone()),
            "",
            "us-west-2",
        )
    };

    warehouse.bulk_load(&load("batch1")).await.unwrap();
    transforms.run(&warehouse, RunOptions::default()).await.unwrap();
    assert_eq!(
        text(&warehouse, "SELECT level FROM users WHERE user_id = '15'").await,
        Some("free".to_string())
    );

    warehouse.bulk_load(&load("batch2")).await.unwrap();
    transforms.run(&warehouse, RunOptions::default()).await.unwrap();
    assert_eq!(
        text(&warehouse, "SELECT level FROM users WHERE user_id = '15'").await,
        Some("paid".to_string())
    );
    assert_eq!(count(&warehouse, "SELECT COUNT(*) FROM users").await, 1);
}

#[tokio::test]
async fn test_songplays_only_for_next_song_events() {
    let fixture = Fixture::new();
    let warehouse = DuckDbWarehouse::in_memory().unwrap();
    Pipeline::etl(&fixture.config, true)
        .unwrap()
        .run(&warehouse, RunOptions::default())
        .await
        .unwrap();

    // Home and Login events are not plays
    assert_eq!(
        count(
            &warehouse,
            "SELECT COUNT(*) FROM songplays WHERE session_id IN (139, 52)"
        )
        .await,
        0
    );
}

#[tokio::test]
async fn test_unmatched_plays_keep_null_keys() {
    let fixture = Fixture::new();
    let warehouse = DuckDbWarehouse::in_memory().unwrap();
    Pipeline::etl(&fixture.config, true)
        .unwrap()
        .run(&warehouse, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(
        count(
            &warehouse,
            "SELECT COUNT(*) FROM songplays WHERE song_key IS NOT NULL AND artist_key IS NOT NULL"
        )
        .await,
        1
    );
    assert_eq!(
        count(
            &warehouse,
            "SELECT COUNT(*) FROM songplays WHERE song_key IS NULL AND artist_key IS NULL AND user_key IS NOT NULL"
        )
        .await,
        1
    );

    let matched = warehouse
        .execute_query(
            "SELECT s.title FROM songplays p JOIN songs s ON p.song_key = s.song_key",
        )
        .await
        .unwrap();
    assert_eq!(matched.rows[0]["title"], "Der Kleine Dompfaff");
}

#[tokio::test]
async fn test_failed_step_without_transaction_keeps_earlier_work() {
    let mut fixture = Fixture::new();
    fixture.config.s3.song_data = fixture.path("no_such_dir");

    let warehouse = DuckDbWarehouse::in_memory().unwrap();
    Pipeline::setup(Dialect::DuckDb, false)
        .unwrap()
        .run(&warehouse, RunOptions::default())
        .await
        .unwrap();

    let err = Pipeline::etl(&fixture.config, false)
        .unwrap()
        .run(&warehouse, RunOptions::default())
        .await
        .unwrap_err();

    match err {
        WarehouseError::StepFailed { step, .. } => assert_eq!(step, "load_staging_songs"),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(count(&warehouse, "SELECT COUNT(*) FROM staging_events").await, 4);
}

#[tokio::test]
async fn test_transactional_run_rolls_back() {
    let mut fixture = Fixture::new();
    fixture.config.s3.song_data = fixture.path("no_such_dir");

    let warehouse = DuckDbWarehouse::in_memory().unwrap();
    Pipeline::setup(Dialect::DuckDb, false)
        .unwrap()
        .run(&warehouse, RunOptions::default())
        .await
        .unwrap();

    let result = Pipeline::etl(&fixture.config, false)
        .unwrap()
        .run(&warehouse, RunOptions { transactional: true })
        .await;

    assert!(matches!(result, Err(WarehouseError::StepFailed { .. })));
    assert_eq!(count(&warehouse, "SELECT COUNT(*) FROM staging_events").await, 0);

    // The connection is usable again after the rollback
    fixture.config.s3.song_data = fixture.path("song_data");
    Pipeline::etl(&fixture.config, false)
        .unwrap()
        .run(&warehouse, RunOptions { transactional: true })
        .await
        .unwrap();
    assert_eq!(count(&warehouse, "SELECT COUNT(*) FROM songplays").await, 2);
}

#[tokio::test]
async fn test_connect_from_config() {
    let fixture = Fixture::new();
    let warehouse = connect(&fixture.config).await.unwrap();
    assert_eq!(warehouse.backend_type(), "duckdb");
    assert!(warehouse.health_check().await.unwrap());

    Pipeline::etl(&fixture.config, true)
        .unwrap()
        .run(warehouse.as_ref(), RunOptions::default())
        .await
        .unwrap();
    assert_eq!(count(warehouse.as_ref(), "SELECT COUNT(*) FROM songplays").await, 2);
    warehouse.close().await.unwrap();
}
