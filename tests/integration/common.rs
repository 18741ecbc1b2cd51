//! Shared fixtures: a throwaway workspace with a tiny TPC-H-shaped SQLite
//! schema, 22 trivial queries, and dbgen-style data files.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tpch_runner::config::{ConnectionConfig, Paths};
use tpch_runner::db::{self, Backend};
use tpch_runner::persistence::ResultStore;
use tpch_runner::tpch::TpchRunner;

pub const TABLE_SCHEMA: &str = "\
-- TPC-H tables, reduced to a few columns each
create table region (r_regionkey integer primary key, r_name text, r_comment text);
create table nation (n_nationkey integer primary key, n_name text,
                     n_regionkey integer, n_comment text);
create table customer (c_custkey integer primary key, c_name text);
create table part (p_partkey integer primary key, p_name text);
create table supplier (s_suppkey integer primary key, s_name text);
create table partsupp (ps_partkey integer, ps_suppkey integer);
create table orders (o_orderkey integer primary key, o_totalprice decimal(15,2));
create table lineitem (l_orderkey integer, l_quantity real);
";

const DATA: [(&str, &str); 8] = [
    ("region", "0|AFRICA|lar deposits|\n1|AMERICA|hs use ironic|\n"),
    (
        "nation",
        "0|ALGERIA|0|haggle|\n1|ARGENTINA|1|al foxes|\n2|BRAZIL|1|y alongside|\n3|CANADA|1|eas hang|\n4|EGYPT|0|y above|\n",
    ),
    ("customer", "1|Customer#000000001|\n"),
    ("part", "1|goldenrod lavender|\n"),
    ("supplier", "1|Supplier#000000001|\n"),
    ("partsupp", "1|1|\n"),
    ("orders", "1|173665.47|\n2|46929.18|\n"),
    ("lineitem", "1|17|\n1|36|\n2|38|\n"),
];

/// Temporary root holding resources, data, results and the result store.
pub struct Workspace {
    pub dir: TempDir,
    pub paths: Paths,
}

impl Workspace {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.paths.data_dir.clone()
    }

    /// Replaces the SQLite-specific text of query `index`.
    pub fn override_query(&self, index: usize, sql: &str) {
        let dir = self.paths.schema_dir(Backend::Sqlite).join("queries");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("q{index}.sql")), sql).unwrap();
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            backend: Backend::Sqlite,
            database: Some(self.root().join("tpch.db").to_string_lossy().into_owned()),
            ..Default::default()
        }
    }

    pub async fn store(&self) -> ResultStore {
        ResultStore::open(&self.paths.state_db, &self.paths.result_dir)
            .await
            .unwrap()
    }

    pub async fn runner(&self) -> TpchRunner {
        let conn = db::connect(&self.connection_config()).unwrap();
        TpchRunner::new(conn, self.paths.clone(), self.store().await, "small")
    }

    /// Runner with tables created and every table loaded.
    pub async fn loaded_runner(&self) -> TpchRunner {
        let mut runner = self.runner().await;
        runner.create_tables().await.unwrap();
        let report = runner.load_data(None, '|').await.unwrap();
        assert!(report.is_complete(), "load failed: {:?}", report.failed);
        runner
    }
}

/// Query `n` returns the first `n` nations (at most five rows); query 15
/// goes through a view the way the benchmark text does.
fn query_text(n: usize) -> String {
    if n == 15 {
        return "\
-- revenue view
create view revenue0 as select o_orderkey as supplier_no, o_totalprice as total_revenue from orders;
select supplier_no, total_revenue
from revenue0
order by supplier_no;
drop view revenue0;
"
        .to_string();
    }
    format!(
        "-- query {n}\nselect n_nationkey, n_name\nfrom nation\nwhere n_nationkey < {n}\norder by n_nationkey;\n"
    )
}

pub fn workspace() -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let paths = Paths::rooted_at(dir.path());

    let schema_dir = paths.schema_dir(Backend::Sqlite);
    std::fs::create_dir_all(&schema_dir).unwrap();
    std::fs::write(schema_dir.join("table_schema.sql"), TABLE_SCHEMA).unwrap();

    let query_dir = paths.query_dir();
    std::fs::create_dir_all(&query_dir).unwrap();
    for n in 1..=22 {
        std::fs::write(query_dir.join(format!("q{n}.sql")), query_text(n)).unwrap();
    }

    std::fs::create_dir_all(&paths.data_dir).unwrap();
    for (table, rows) in DATA {
        std::fs::write(paths.data_dir.join(format!("{table}.tbl")), rows).unwrap();
    }

    Workspace { dir, paths }
}
