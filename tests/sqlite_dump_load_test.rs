// ABOUTME: Integration tests for dump/load against real SQLite files
// ABOUTME: Exercises referential closure, round-trip data, and recursive self-reference

use rusqlite::Connection;
use snapdump::request::{Cleanup, Compression, ConnParams, DumpRequest, LoadRequest};
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("snapdump_test_{name}_{}.db", std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

fn create_employees_groups_db(path: &PathBuf) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "
        CREATE TABLE groups (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
        CREATE TABLE employees (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            group_id INTEGER REFERENCES groups(id),
            manager_id INTEGER REFERENCES employees(id)
        );

        INSERT INTO groups VALUES (1, 'engineering'), (2, 'sales');
        INSERT INTO employees VALUES
            (1, 'alice', 1, NULL),
            (2, 'bob', 1, 1),
            (3, 'carol', 2, NULL),
            (4, 'dave', 1, 2);
        ",
    )
    .unwrap();
}

#[tokio::test]
async fn partial_employee_dump_pulls_in_its_group_and_manager_chain() {
    let src_path = temp_path("source");
    create_employees_groups_db(&src_path);

    let archive_path = {
        let mut p = std::env::temp_dir();
        p.push(format!("snapdump_test_archive_{}.zip", std::process::id()));
        p
    };
    let _ = std::fs::remove_file(&archive_path);

    let request = DumpRequest {
        conn_params: ConnParams::Sqlite { path: src_path.clone() },
        output_path: archive_path.clone(),
        full_tables: Vec::new(),
        partial_tables: {
            let mut m = indexmap::IndexMap::new();
            m.insert(
                "employees".to_string(),
                "SELECT * FROM employees WHERE name = 'dave'".to_string(),
            );
            m
        },
        compression: Compression::Stored,
        include_schema: true,
        include_data: true,
    };
    snapdump::dump::run(&request).await.unwrap();

    let mut reader = snapdump::archive::open_reader(&archive_path).unwrap();
    assert!(reader.has_schema());
    let tables = reader.data_tables();
    assert!(tables.contains(&"employees".to_string()));
    assert!(tables.contains(&"groups".to_string()));

    let employees_csv = String::from_utf8(reader.read_table_csv("employees").unwrap()).unwrap();
    // dave's manager chain is dave -> bob -> alice, all in the same group.
    assert!(employees_csv.contains("dave"));
    assert!(employees_csv.contains("bob"));
    assert!(employees_csv.contains("alice"));
    assert!(!employees_csv.contains("carol"));

    let groups_csv = String::from_utf8(reader.read_table_csv("groups").unwrap()).unwrap();
    assert!(groups_csv.contains("engineering"));
    assert!(!groups_csv.contains("sales"));

    let _ = std::fs::remove_file(&src_path);
    let _ = std::fs::remove_file(&archive_path);
}

#[tokio::test]
async fn full_round_trip_preserves_row_data() {
    let src_path = temp_path("roundtrip_src");
    create_employees_groups_db(&src_path);

    let archive_path = {
        let mut p = std::env::temp_dir();
        p.push(format!("snapdump_test_roundtrip_{}.zip", std::process::id()));
        p
    };
    let _ = std::fs::remove_file(&archive_path);

    let dump_request = DumpRequest {
        conn_params: ConnParams::Sqlite { path: src_path.clone() },
        output_path: archive_path.clone(),
        full_tables: vec!["groups".to_string(), "employees".to_string()],
        partial_tables: indexmap::IndexMap::new(),
        compression: Compression::Deflated,
        include_schema: true,
        include_data: true,
    };
    snapdump::dump::run(&dump_request).await.unwrap();

    let dst_path = temp_path("roundtrip_dst");
    // The target file must exist for SQLite to open; recreate() below
    // removes and reopens it so this just needs a valid extension.
    std::fs::File::create(&dst_path).unwrap();

    let load_request = LoadRequest {
        conn_params: ConnParams::Sqlite { path: dst_path.clone() },
        input_path: archive_path.clone(),
        cleanup: Cleanup::Recreate,
    };
    snapdump::load::run(&load_request).await.unwrap();

    let conn = Connection::open(&dst_path).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM employees", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 4);
    let name: String = conn
        .query_row("SELECT name FROM groups WHERE id = 1", [], |r| r.get(0))
        .unwrap();
    assert_eq!(name, "engineering");

    let _ = std::fs::remove_file(&src_path);
    let _ = std::fs::remove_file(&dst_path);
    let _ = std::fs::remove_file(&archive_path);
}

#[tokio::test]
async fn disjointness_violation_is_rejected_before_any_connection() {
    let mut partial = indexmap::IndexMap::new();
    partial.insert("employees".to_string(), "SELECT 1".to_string());
    let request = DumpRequest {
        conn_params: ConnParams::Sqlite { path: "/nonexistent/unreachable.db".into() },
        output_path: "/tmp/should_not_be_created.zip".into(),
        full_tables: vec!["employees".to_string()],
        partial_tables: partial,
        compression: Compression::default(),
        include_schema: true,
        include_data: true,
    };
    let result = snapdump::dump::run(&request).await;
    assert!(result.is_err());
}
