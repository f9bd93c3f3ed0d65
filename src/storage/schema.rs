use rusqlite::Connection;

pub mod tables {
    pub const SCORES: &str = "scores";

    pub const ALL_TABLES: &[&str] = &[SCORES];
}

pub mod columns {
    pub const ID: &str = "id";
    pub const NUMBER: &str = "number";
    pub const TITLE: &str = "title";
    pub const COMPOSER: &str = "composer";
    pub const ARRANGER: &str = "arranger";
}

pub use columns::*;
pub use tables::*;

// AUTOINCREMENT keeps ids of deleted scores from being handed out again
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS scores (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    number VARCHAR(30),
    title VARCHAR(30) NOT NULL DEFAULT '',
    composer VARCHAR(30),
    arranger VARCHAR(30)
);
"#;

pub fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}
