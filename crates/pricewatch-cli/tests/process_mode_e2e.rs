use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::tempdir;

fn pricewatch_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pricewatch"))
}

fn run(args: &[&str], envs: &[(&str, &str)]) -> Output {
    let mut command = Command::new(pricewatch_bin());
    command.args(args).env_remove("PRICEWATCH_DB").env("RUST_LOG", "warn");
    for (key, value) in envs {
        command.env(key, value);
    }
    command.output().expect("run pricewatch")
}

fn run_ok(args: &[&str], envs: &[(&str, &str)]) -> String {
    let output = run(args, envs);
    assert!(
        output.status.success(),
        "pricewatch {:?} failed:\n{}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("utf-8 stdout")
}

fn run_json(args: &[&str], envs: &[(&str, &str)]) -> serde_json::Value {
    let stdout = run_ok(args, envs);
    serde_json::from_str(&stdout).expect("parse JSON report")
}

fn seeded_db(dir: &Path) -> String {
    let db = dir.join("pricewatch.sqlite3");
    let db = db.to_str().expect("utf-8 path").to_string();
    run_ok(&["seed", "--db", &db, "--seed", "5", "--products-per-store", "8"], &[]);
    db
}

fn keys(report: &serde_json::Value) -> Vec<(String, u64)> {
    report["rows"]
        .as_array()
        .expect("rows array")
        .iter()
        .map(|row| {
            (
                row["method"].as_str().unwrap().to_string(),
                row["num_workers"].as_u64().unwrap(),
            )
        })
        .collect()
}

#[test]
fn test_query_prints_records() {
    let dir = tempdir().unwrap();
    let db = seeded_db(dir.path());

    let records: serde_json::Value = serde_json::from_str(&run_ok(
        &["query", "top_expensive_products", "--db", &db, "--limit", "3"],
        &[],
    ))
    .unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 3);
    assert!(records[0].get("product_name").is_some());
    assert!(records[0].get("regular_price").is_some());
}

#[test]
fn test_unknown_query_exits_non_zero() {
    let dir = tempdir().unwrap();
    let db = seeded_db(dir.path());
    let output = run(&["query", "drop_everything", "--db", &db], &[]);
    assert!(!output.status.success());
}

#[test]
fn test_process_mode_batch_succeeds() {
    let dir = tempdir().unwrap();
    let db = seeded_db(dir.path());

    let report = run_json(
        &[
            "bench",
            "run",
            "--db",
            &db,
            "--mode",
            "processes",
            "--workers",
            "3",
            "--queries",
            "9",
            "--json",
        ],
        &[],
    );
    assert_eq!(report["row"]["method"], "processes");
    assert_eq!(report["row"]["num_workers"], 3);
    assert_eq!(report["row"]["num_queries"], 9);
    assert_eq!(report["row"]["success_count"], 9, "report: {report}");
}

#[test]
fn test_process_mode_missing_store_fails_softly() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.sqlite3");
    let missing = missing.to_str().unwrap();

    let report = run_json(
        &[
            "bench",
            "run",
            "--db",
            missing,
            "--mode",
            "processes",
            "--workers",
            "2",
            "--queries",
            "4",
            "--json",
        ],
        &[],
    );
    assert_eq!(report["row"]["num_queries"], 4);
    assert_eq!(report["row"]["success_count"], 0);
    assert_eq!(report["failures_by_kind"]["connection"], 4);
}

#[test]
fn test_process_mode_timeout_kills_and_respawns() {
    let dir = tempdir().unwrap();
    let db = seeded_db(dir.path());

    let started = std::time::Instant::now();
    let report = run_json(
        &[
            "bench",
            "run",
            "--db",
            &db,
            "--mode",
            "processes",
            "--workers",
            "1",
            "--queries",
            "3",
            "--timeout-secs",
            "0.2",
            "--json",
        ],
        &[("PRICEWATCH_WORKER_FAKE_DELAY_MS", "5000")],
    );
    assert_eq!(report["row"]["num_queries"], 3);
    assert_eq!(report["row"]["success_count"], 0);
    assert_eq!(report["failures_by_kind"]["timeout"], 3);
    // Each stalled worker is killed well before its 5s delay ends.
    assert!(started.elapsed() < std::time::Duration::from_secs(12));
}

#[test]
fn test_sweep_twelve_by_three_visits_every_pair() {
    let dir = tempdir().unwrap();
    let db = seeded_db(dir.path());
    let out = dir.path().join("sweep.json");

    let report = run_json(
        &[
            "bench",
            "sweep",
            "--db",
            &db,
            "--queries",
            "12",
            "--max-workers",
            "3",
            "--out-json",
            out.to_str().unwrap(),
            "--json",
        ],
        &[],
    );
    assert_eq!(
        keys(&report),
        vec![
            ("threads".to_string(), 1),
            ("threads".to_string(), 2),
            ("threads".to_string(), 3),
            ("processes".to_string(), 1),
            ("processes".to_string(), 2),
            ("processes".to_string(), 3),
        ]
    );
    for row in report["rows"].as_array().unwrap() {
        assert_eq!(row["num_queries"], 12);
        assert_eq!(row["success_count"], 12);
    }
    let threads = report["optimal"]["optimal_threads"]["num_workers"].as_u64().unwrap();
    let processes = report["optimal"]["optimal_processes"]["num_workers"].as_u64().unwrap();
    assert!((1..=3).contains(&threads));
    assert!((1..=3).contains(&processes));

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(keys(&written), keys(&report));
}

#[test]
fn test_sweep_single_worker_boundary() {
    let dir = tempdir().unwrap();
    let db = seeded_db(dir.path());

    let report = run_json(
        &["bench", "sweep", "--db", &db, "--queries", "6", "--max-workers", "1", "--json"],
        &[],
    );
    assert_eq!(
        keys(&report),
        vec![("threads".to_string(), 1), ("processes".to_string(), 1)]
    );
}

#[test]
fn test_sweep_rejects_zero_bounds() {
    let dir = tempdir().unwrap();
    let db = seeded_db(dir.path());
    let output = run(
        &["bench", "sweep", "--db", &db, "--queries", "0", "--max-workers", "3"],
        &[],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("sweep bounds"));
}

#[test]
fn test_out_of_range_timeout_is_rejected() {
    let dir = tempdir().unwrap();
    let db = seeded_db(dir.path());
    let output = run(
        &["bench", "run", "--db", &db, "--queries", "3", "--timeout-secs", "1e20"],
        &[],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("out of range"));
}

#[test]
fn test_config_file_supplies_database_and_defaults() {
    let dir = tempdir().unwrap();
    let db = seeded_db(dir.path());
    let config = dir.path().join("bench.json");
    std::fs::write(
        &config,
        serde_json::json!({ "database": db, "num_queries": 6, "max_pool_size": 2 }).to_string(),
    )
    .unwrap();

    let report = run_json(
        &["--config", config.to_str().unwrap(), "bench", "run", "--json"],
        &[],
    );
    assert_eq!(report["row"]["method"], "threads");
    assert_eq!(report["row"]["num_workers"], 2);
    assert_eq!(report["row"]["num_queries"], 6);
    assert_eq!(report["row"]["success_count"], 6);
}
