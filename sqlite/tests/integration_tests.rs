//! Integration tests for the ddsl-sqlite crate.

use std::fs;

use ddsl_core::{AuditEntry, CsvOptions, Database, DbError, ItemKind, Location, Registry};
use ddsl_sqlite::{LOG_TABLE, SqliteDatabase};

fn open_file_db(dir: &tempfile::TempDir) -> Box<dyn Database> {
    let mut registry = Registry::new();
    ddsl_sqlite::register(&mut registry);
    let location: Location = format!("sqlite://{}", dir.path().join("app.db").display())
        .parse()
        .unwrap();
    registry.open_database(&location).unwrap()
}

fn count(db: &dyn Database, table: &str) -> usize {
    let rows = db.query(&format!("SELECT count(*) FROM {table}")).unwrap();
    rows[0][0].as_deref().unwrap().parse().unwrap()
}

#[test]
fn test_full_run_is_durable() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("users.csv");
    fs::write(&csv, "id,name\n1,alice\n2,bob\n3,carol\n").unwrap();

    {
        let mut db = open_file_db(&dir);
        db.lock().unwrap();
        db.begin().unwrap();
        db.exec("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);")
            .unwrap();
        assert_eq!(
            db.import_csv(&csv, "main", "users", CsvOptions::default()).unwrap(),
            3
        );
        let db_user = db.current_user().unwrap();
        db.record_audit(&AuditEntry {
            ddsl: "seed table main.users".into(),
            executed_at: chrono::Utc::now().to_rfc3339(),
            db_user,
            os_user: None,
        })
        .unwrap();
        db.commit().unwrap();
        db.unlock().unwrap();
        db.close().unwrap();
    }

    let db = open_file_db(&dir);
    assert_eq!(count(db.as_ref(), "users"), 3);
    assert_eq!(count(db.as_ref(), LOG_TABLE), 1);
    let items = db.schema_items("main", Some(ItemKind::Table)).unwrap();
    let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["users"]);
}

#[test]
fn test_rollback_discards_ddl_and_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open_file_db(&dir);
    db.exec("CREATE TABLE kept (id INTEGER);").unwrap();

    db.begin().unwrap();
    db.exec("CREATE TABLE dropped (id INTEGER); INSERT INTO kept VALUES (1);")
        .unwrap();
    let err = db.exec("INSERT INTO missing VALUES (1);").unwrap_err();
    assert!(matches!(err, DbError::Statement { .. }));
    db.rollback().unwrap();

    let names: Vec<_> = db
        .schema_items("main", None)
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    assert_eq!(names, ["kept"]);
    assert_eq!(count(db.as_ref(), "kept"), 0);
}

#[test]
fn test_attached_schemas_and_foreign_keys() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = SqliteDatabase::open(dir.path().join("app.db")).unwrap();
    db.attach("sales", dir.path().join("sales.db")).unwrap();
    db.exec(
        "CREATE TABLE sales.customers (id INTEGER PRIMARY KEY);
         CREATE TABLE sales.orders (id INTEGER PRIMARY KEY, customer_id INTEGER REFERENCES customers(id));
         CREATE VIEW sales.big_orders AS SELECT id FROM orders;",
    )
    .unwrap();

    assert_eq!(db.schema_names().unwrap(), ["main", "sales"]);
    let views = db.schema_items("sales", Some(ItemKind::View)).unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].name, "big_orders");

    let keys = db.foreign_keys().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].child_schema, "sales");
    assert_eq!(keys[0].child_table, "orders");
    assert_eq!(keys[0].parent_table, "customers");
}

#[test]
fn test_csv_into_attached_schema() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("regions.csv");
    fs::write(&csv, "code|label\nEU|Europe\n").unwrap();

    let mut db = SqliteDatabase::open_in_memory().unwrap();
    db.attach("ref_data", ddsl_sqlite::MEMORY).unwrap();
    db.exec("CREATE TABLE ref_data.regions (code TEXT, label TEXT);")
        .unwrap();
    let options = CsvOptions {
        delimiter: b'|',
        has_header: true,
    };
    assert_eq!(db.import_csv(&csv, "ref_data", "regions", options).unwrap(), 1);
    let rows = db.query("SELECT label FROM ref_data.regions").unwrap();
    assert_eq!(rows, vec![vec![Some("Europe".to_string())]]);
}
