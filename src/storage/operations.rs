use rusqlite::{OptionalExtension, Row, params};

use crate::{
    config,
    domain::score::{Score, ScoreId, ScoreInput},
    storage::{
        db,
        error::StorageError,
        schema::{columns, tables},
    },
};

use columns::*;
use tables::*;

/// Score store backed by a single SQLite connection.
///
/// Every mutating call is one auto-committed statement, so its effect is visible
/// to the next read as soon as it returns.
pub struct ScoreStore {
    pub(crate) db: rusqlite::Connection,
}

fn select_scores() -> String {
    format!("SELECT {ID}, {NUMBER}, {TITLE}, {COMPOSER}, {ARRANGER} FROM {SCORES}")
}

fn score_from_row(row: &Row<'_>) -> rusqlite::Result<Score> {
    Ok(Score {
        id: ScoreId(row.get(0)?),
        number: row.get(1)?,
        title: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        composer: row.get(3)?,
        arranger: row.get(4)?,
    })
}

impl ScoreStore {
    /// when called, opens a data base connection
    pub fn new(db_config: &config::Database) -> Result<Self, StorageError> {
        let db = db::open(db_config)?;
        Ok(Self::from_existing_conn(db))
    }

    pub fn from_existing_conn(db: rusqlite::Connection) -> Self {
        Self { db }
    }

    pub fn create(&self, input: &ScoreInput) -> Result<Score, StorageError> {
        self.db.execute(
            &format!(
                "INSERT INTO {SCORES} ({NUMBER}, {TITLE}, {COMPOSER}, {ARRANGER})
             VALUES (?1, ?2, ?3, ?4)"
            ),
            params![
                input.number(),
                input.title(),
                input.composer(),
                input.arranger()
            ],
        )?;
        let id = ScoreId(self.db.last_insert_rowid());
        log::debug!("created score {id}");

        Ok(Score {
            id,
            number: input.number().map(str::to_owned),
            title: input.title().to_owned(),
            composer: input.composer().map(str::to_owned),
            arranger: input.arranger().map(str::to_owned),
        })
    }

    /// All scores in insertion order
    pub fn list_all(&self) -> Result<Vec<Score>, StorageError> {
        let mut stmt = self
            .db
            .prepare(&format!("{} ORDER BY {ID}", select_scores()))?;

        let scores = stmt
            .query_map([], score_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(scores)
    }

    pub fn get_by_id(&self, id: ScoreId) -> Result<Score, StorageError> {
        self.db
            .query_row(
                &format!("{} WHERE {ID} = ?1", select_scores()),
                params![id.0],
                score_from_row,
            )
            .optional()?
            .ok_or(StorageError::NotFound(id))
    }

    /// Replaces all four descriptive fields of an existing score.
    pub fn update_by_id(&self, id: ScoreId, input: &ScoreInput) -> Result<Score, StorageError> {
        let updated = self
            .db
            .query_row(
                &format!(
                    "UPDATE {SCORES}
             SET {NUMBER} = ?2, {TITLE} = ?3, {COMPOSER} = ?4, {ARRANGER} = ?5
             WHERE {ID} = ?1
             RETURNING {ID}, {NUMBER}, {TITLE}, {COMPOSER}, {ARRANGER}"
                ),
                params![
                    id.0,
                    input.number(),
                    input.title(),
                    input.composer(),
                    input.arranger()
                ],
                score_from_row,
            )
            .optional()?
            .ok_or(StorageError::NotFound(id))?;

        log::debug!("updated score {id}");
        Ok(updated)
    }

    pub fn delete_by_id(&self, id: ScoreId) -> Result<(), StorageError> {
        let removed = self.db.execute(
            &format!("DELETE FROM {SCORES} WHERE {ID} = ?1"),
            params![id.0],
        )?;

        if removed == 0 {
            return Err(StorageError::NotFound(id));
        }
        log::debug!("deleted score {id}");
        Ok(())
    }

    /// Scores whose title contains `fragment`, case-sensitive.
    ///
    /// An empty fragment matches every score.
    pub fn search_by_title(&self, fragment: &str) -> Result<Vec<Score>, StorageError> {
        if fragment.is_empty() {
            return self.list_all();
        }

        // instr() is case-sensitive, unlike LIKE
        let mut stmt = self.db.prepare(&format!(
            "{} WHERE instr({TITLE}, ?1) > 0 ORDER BY {ID}",
            select_scores()
        ))?;

        let scores = stmt
            .query_map(params![fragment], score_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use tempfile::tempdir;

    use crate::{
        config::Database,
        domain::score::{Score, ScoreId, ScoreInput},
        storage::{error::StorageError, operations::ScoreStore, schema},
    };

    fn setup_storage() -> anyhow::Result<ScoreStore> {
        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;
        Ok(ScoreStore::from_existing_conn(conn))
    }

    fn input(number: &str, title: &str, composer: &str, arranger: &str) -> ScoreInput {
        ScoreInput::new(
            Some(number.into()),
            Some(title.into()),
            Some(composer.into()),
            Some(arranger.into()),
        )
        .unwrap()
    }

    fn count_rows(storage: &ScoreStore) -> i64 {
        storage
            .db
            .query_row("SELECT COUNT(*) FROM scores", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_create_then_get_returns_same_fields() -> anyhow::Result<()> {
        let storage = setup_storage()?;

        let created = storage.create(&input("12", "Prelude", "Bach", ""))?;
        let fetched = storage.get_by_id(created.id)?;

        assert_eq!(fetched, created);
        assert_eq!(fetched.number.as_deref(), Some("12"));
        assert_eq!(fetched.title, "Prelude");
        assert_eq!(fetched.composer.as_deref(), Some("Bach"));
        assert_eq!(fetched.arranger.as_deref(), Some(""));

        Ok(())
    }

    #[test]
    fn test_create_persists_missing_fields_as_null() -> anyhow::Result<()> {
        let storage = setup_storage()?;

        let created = storage.create(&ScoreInput::new(None, None, None, None)?)?;
        let fetched = storage.get_by_id(created.id)?;

        assert_eq!(fetched.number, None);
        assert_eq!(fetched.title, "");
        assert_eq!(fetched.composer, None);
        assert_eq!(fetched.arranger, None);

        Ok(())
    }

    #[test]
    fn test_list_all_single_record() -> anyhow::Result<()> {
        let storage = setup_storage()?;

        storage.create(&input("12", "Prelude", "Bach", ""))?;

        let scores = storage.list_all()?;
        assert_eq!(scores.len(), 1);
        assert_eq!(
            scores[0],
            Score {
                id: scores[0].id,
                number: Some("12".into()),
                title: "Prelude".into(),
                composer: Some("Bach".into()),
                arranger: Some("".into()),
            }
        );

        Ok(())
    }

    #[test]
    fn test_list_all_empty_and_insertion_order() -> anyhow::Result<()> {
        let storage = setup_storage()?;
        assert!(storage.list_all()?.is_empty());

        let a = storage.create(&input("1", "A", "", ""))?;
        let b = storage.create(&input("2", "B", "", ""))?;
        let c = storage.create(&input("3", "C", "", ""))?;

        let ids: Vec<ScoreId> = storage.list_all()?.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);

        Ok(())
    }

    #[test]
    fn test_duplicate_descriptive_fields_allowed() -> anyhow::Result<()> {
        let storage = setup_storage()?;

        let a = storage.create(&input("1", "Prelude", "Bach", ""))?;
        let b = storage.create(&input("1", "Prelude", "Bach", ""))?;

        assert_ne!(a.id, b.id);
        assert_eq!(storage.list_all()?.len(), 2);

        Ok(())
    }

    #[test]
    fn test_missing_id_is_not_found_everywhere() -> anyhow::Result<()> {
        let storage = setup_storage()?;
        let missing = ScoreId(42);

        assert!(matches!(
            storage.get_by_id(missing),
            Err(StorageError::NotFound(ScoreId(42)))
        ));
        assert!(matches!(
            storage.update_by_id(missing, &input("", "", "", "")),
            Err(StorageError::NotFound(ScoreId(42)))
        ));
        assert!(matches!(
            storage.delete_by_id(missing),
            Err(StorageError::NotFound(ScoreId(42)))
        ));

        Ok(())
    }

    #[test]
    fn test_delete_unknown_id_leaves_storage_unchanged() -> anyhow::Result<()> {
        let storage = setup_storage()?;
        storage.create(&input("12", "Prelude", "Bach", ""))?;
        let before = storage.list_all()?;

        let err = storage.delete_by_id(ScoreId(999)).unwrap_err();

        assert!(matches!(err, StorageError::NotFound(_)));
        assert_eq!(storage.list_all()?, before);

        Ok(())
    }

    #[test]
    fn test_delete_then_get_is_not_found() -> anyhow::Result<()> {
        let storage = setup_storage()?;
        let created = storage.create(&input("12", "Prelude", "Bach", ""))?;

        storage.delete_by_id(created.id)?;

        assert!(matches!(
            storage.get_by_id(created.id),
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            storage.delete_by_id(created.id),
            Err(StorageError::NotFound(_))
        ));
        assert_eq!(count_rows(&storage), 0);

        Ok(())
    }

    #[test]
    fn test_ids_are_not_reused_after_delete() -> anyhow::Result<()> {
        let storage = setup_storage()?;
        let first = storage.create(&input("1", "A", "", ""))?;
        storage.delete_by_id(first.id)?;

        let second = storage.create(&input("2", "B", "", ""))?;

        assert_ne!(first.id, second.id);

        Ok(())
    }

    #[test]
    fn test_update_replaces_all_fields() -> anyhow::Result<()> {
        let storage = setup_storage()?;
        let created = storage.create(&input("12", "Prelude", "Bach", "Busoni"))?;

        let replacement = ScoreInput::new(Some("13".into()), Some("Fugue".into()), None, None)?;
        let updated = storage.update_by_id(created.id, &replacement)?;

        let expected = Score {
            id: created.id,
            number: Some("13".into()),
            title: "Fugue".into(),
            composer: None,
            arranger: None,
        };
        assert_eq!(updated, expected);
        assert_eq!(storage.get_by_id(created.id)?, expected);

        Ok(())
    }

    #[test]
    fn test_search_by_title_substring() -> anyhow::Result<()> {
        let storage = setup_storage()?;
        let prelude = storage.create(&input("1", "Prelude in C", "Bach", ""))?;
        storage.create(&input("2", "Fugue in D", "Bach", ""))?;

        let results = storage.search_by_title("lude")?;

        assert_eq!(results, vec![prelude]);

        Ok(())
    }

    #[test]
    fn test_search_matches_filtered_list_all() -> anyhow::Result<()> {
        let storage = setup_storage()?;
        for title in ["Prelude in C", "Fugue in D", "Sinfonia", "Invention in C"] {
            storage.create(&input("", title, "", ""))?;
        }

        for fragment in ["in ", "C", "o", "Sinfonia", "zzz"] {
            let expected: Vec<Score> = storage
                .list_all()?
                .into_iter()
                .filter(|s| s.title.contains(fragment))
                .collect();
            assert_eq!(storage.search_by_title(fragment)?, expected, "{fragment}");
        }

        Ok(())
    }

    #[test]
    fn test_search_edge_cases() -> anyhow::Result<()> {
        let storage = setup_storage()?;
        storage.create(&input("1", "Prelude in C", "", ""))?;
        storage.create(&input("2", "Fugue in D", "", ""))?;

        assert_eq!(storage.search_by_title("")?.len(), 2);
        assert!(storage.search_by_title("Nocturne")?.is_empty());
        // case-sensitive
        assert!(storage.search_by_title("prelude")?.is_empty());

        Ok(())
    }

    #[test]
    fn test_writes_visible_after_reopen() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let config = Database {
            in_memory: false,
            path: Some(dir.path().join("scores.db")),
        };

        let id = {
            let storage = ScoreStore::new(&config)?;
            storage.create(&input("12", "Prelude", "Bach", ""))?.id
        };

        let reopened = ScoreStore::new(&config)?;
        assert_eq!(reopened.get_by_id(id)?.title, "Prelude");

        Ok(())
    }
}
