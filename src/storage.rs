//! Graph store adapter: quads in named graphs, pattern lookups and transactions.
//!
//! `GraphStore` is the seam the rest of the crate is written against.
//! `SqliteGraphStore` is the bundled implementation: one `quads` table in a
//! WAL-mode SQLite file, with terms kept in their canonical text encoding.

use crate::query::{Bindings, PatternQuery};
use crate::store::StoreError;
use crate::types::{Iri, ObjectKind, Quad, Triple, Value};
use eyre::Result;
use log::{debug, warn};
use rusqlite::{Connection, OpenFlags, params, params_from_iter};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long a writer waits for another connection's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA_VERSION: &str = "1";

/// CRUD over named graphs plus transaction demarcation.
pub trait GraphStore {
    /// Add one statement. Adding an existing statement is a no-op.
    fn add_quad(&self, quad: &Quad) -> Result<()>;

    /// Remove statements, from one named graph or from every graph when `context` is `None`.
    /// Returns the number of rows removed.
    fn remove_quads(&self, triples: &[Triple], context: Option<&Iri>) -> Result<usize>;

    /// Statements matching the bound positions, in insertion order.
    fn get_quads(
        &self,
        subject: Option<&Value>,
        predicate: Option<&Iri>,
        object: Option<&Value>,
        context: Option<&Iri>,
    ) -> Result<Vec<Quad>>;

    fn begin(&self) -> Result<()>;
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;
    fn has_open_transaction(&self) -> bool;

    fn add_quads(&self, quads: &[Quad]) -> Result<()> {
        for quad in quads {
            self.add_quad(quad)?;
        }
        Ok(())
    }

    /// All statements of a named graph; fails with `NotFound` when it is empty.
    fn named_graph(&self, id: &Iri) -> Result<Vec<Quad>> {
        let quads = self.get_quads(None, None, None, Some(id))?;
        if quads.is_empty() {
            return Err(eyre::eyre!(StoreError::NotFound {
                kind: ObjectKind::Object,
                id: id.to_string(),
            }));
        }
        Ok(quads)
    }

    fn contains(
        &self,
        subject: Option<&Value>,
        predicate: Option<&Iri>,
        object: Option<&Value>,
        context: Option<&Iri>,
    ) -> Result<bool> {
        Ok(!self.get_quads(subject, predicate, object, context)?.is_empty())
    }

    fn run_pattern_query(&self, query: &PatternQuery) -> Result<Vec<Bindings>> {
        query.execute(self)
    }
}

/// Whether a transactional span began its own transaction or joined the caller's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnScope {
    Owned,
    Joined,
}

/// Run `body` in a transaction, beginning one only if none is open.
///
/// An owned transaction is committed on success and rolled back on failure.
/// A joined one is left for its owner to finish. A failed rollback is
/// reported together with the error that caused it.
pub fn with_transaction<G, T>(graph: &G, body: impl FnOnce() -> Result<T>) -> Result<(T, TxnScope)>
where
    G: GraphStore + ?Sized,
{
    if graph.has_open_transaction() {
        return body().map(|value| (value, TxnScope::Joined));
    }

    graph.begin()?;
    let outcome = body().and_then(|value| graph.commit().map(|_| value));
    match outcome {
        Ok(value) => Ok((value, TxnScope::Owned)),
        Err(cause) => {
            if !graph.has_open_transaction() {
                return Err(cause);
            }
            match graph.rollback() {
                Ok(()) => {
                    warn!("Rolled back transaction: {}", cause);
                    Err(cause)
                }
                Err(rollback) => Err(eyre::eyre!(StoreError::RollbackFailed {
                    cause: cause.to_string(),
                    rollback: rollback.to_string(),
                })),
            }
        }
    }
}

fn failure(what: &'static str) -> impl FnOnce(rusqlite::Error) -> eyre::Report {
    move |e| eyre::eyre!(StoreError::StoreFailure(format!("Failed to {}: {}", what, e)))
}

/// SQLite-backed graph store.
pub struct SqliteGraphStore {
    db: Connection,
    path: Option<PathBuf>,
}

impl SqliteGraphStore {
    /// Open or create a store file.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(failure("open SQLite database"))?;
        db.busy_timeout(BUSY_TIMEOUT).map_err(failure("set busy timeout"))?;
        let mode: String = db
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(failure("enable WAL mode"))?;
        debug!("Opened {} in journal mode {}", path.display(), mode);
        db.pragma_update(None, "synchronous", "NORMAL")
            .map_err(failure("set synchronous mode"))?;

        let store = Self {
            db,
            path: Some(path.to_path_buf()),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Private in-memory store, used by tests and dry runs.
    pub fn in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().map_err(failure("open in-memory database"))?;
        let store = Self { db, path: None };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init_schema(&self) -> Result<()> {
        self.db
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS quads (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    subject TEXT NOT NULL,
                    predicate TEXT NOT NULL,
                    object TEXT NOT NULL,
                    context TEXT NOT NULL,
                    UNIQUE (subject, predicate, object, context)
                );
                CREATE INDEX IF NOT EXISTS idx_quads_subject ON quads(subject);
                CREATE INDEX IF NOT EXISTS idx_quads_predicate_object ON quads(predicate, object);
                CREATE INDEX IF NOT EXISTS idx_quads_context ON quads(context);

                CREATE TABLE IF NOT EXISTS meta (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );
            "#,
            )
            .map_err(failure("initialize schema"))?;

        self.db
            .execute(
                "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
                params![SCHEMA_VERSION],
            )
            .map_err(failure("record schema version"))?;
        Ok(())
    }

    /// Total number of stored statements.
    pub fn quad_count(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM quads", [], |row| row.get(0))
            .map_err(failure("count statements"))?;
        Ok(count as usize)
    }

    fn row_to_quad(row: &rusqlite::Row) -> rusqlite::Result<(String, String, String, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    }
}

impl GraphStore for SqliteGraphStore {
    fn add_quad(&self, quad: &Quad) -> Result<()> {
        self.db
            .execute(
                "INSERT OR IGNORE INTO quads (subject, predicate, object, context) VALUES (?1, ?2, ?3, ?4)",
                params![
                    quad.subject.to_term(),
                    quad.predicate.as_str(),
                    quad.object.to_term(),
                    quad.context.as_str()
                ],
            )
            .map_err(failure("insert statement"))?;
        Ok(())
    }

    fn remove_quads(&self, triples: &[Triple], context: Option<&Iri>) -> Result<usize> {
        let mut removed = 0;
        for t in triples {
            let subject = t.subject.to_term();
            let object = t.object.to_term();
            removed += match context {
                Some(ctx) => self.db.execute(
                    "DELETE FROM quads WHERE subject = ?1 AND predicate = ?2 AND object = ?3 AND context = ?4",
                    params![subject, t.predicate.as_str(), object, ctx.as_str()],
                ),
                None => self.db.execute(
                    "DELETE FROM quads WHERE subject = ?1 AND predicate = ?2 AND object = ?3",
                    params![subject, t.predicate.as_str(), object],
                ),
            }
            .map_err(failure("delete statement"))?;
        }
        debug!("Removed {} statement(s)", removed);
        Ok(removed)
    }

    fn get_quads(
        &self,
        subject: Option<&Value>,
        predicate: Option<&Iri>,
        object: Option<&Value>,
        context: Option<&Iri>,
    ) -> Result<Vec<Quad>> {
        let mut sql = String::from("SELECT subject, predicate, object, context FROM quads");
        let mut clauses = Vec::new();
        let mut bound: Vec<String> = Vec::new();

        if let Some(s) = subject {
            bound.push(s.to_term());
            clauses.push(format!("subject = ?{}", bound.len()));
        }
        if let Some(p) = predicate {
            bound.push(p.as_str().to_string());
            clauses.push(format!("predicate = ?{}", bound.len()));
        }
        if let Some(o) = object {
            bound.push(o.to_term());
            clauses.push(format!("object = ?{}", bound.len()));
        }
        if let Some(c) = context {
            bound.push(c.as_str().to_string());
            clauses.push(format!("context = ?{}", bound.len()));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY id");

        let mut stmt = self.db.prepare(&sql).map_err(failure("prepare statement query"))?;
        let rows = stmt
            .query_map(params_from_iter(bound.iter()), Self::row_to_quad)
            .map_err(failure("query statements"))?;

        let mut quads = Vec::new();
        for row in rows {
            let (s, p, o, c) = row.map_err(failure("read statement row"))?;
            quads.push(Quad {
                subject: Value::parse_term(&s)?,
                predicate: Iri::new(p),
                object: Value::parse_term(&o)?,
                context: Iri::new(c),
            });
        }
        Ok(quads)
    }

    fn begin(&self) -> Result<()> {
        self.db
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(failure("begin transaction"))
    }

    fn commit(&self) -> Result<()> {
        self.db.execute_batch("COMMIT").map_err(failure("commit transaction"))
    }

    fn rollback(&self) -> Result<()> {
        self.db
            .execute_batch("ROLLBACK")
            .map_err(failure("roll back transaction"))
    }

    fn has_open_transaction(&self) -> bool {
        !self.db.is_autocommit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_store() -> SqliteGraphStore {
        SqliteGraphStore::in_memory().unwrap()
    }

    fn q(s: &str, p: &str, o: Value, c: &str) -> Quad {
        Quad::new(Value::iri(s), p, o, c)
    }

    #[test]
    fn test_add_and_get_by_pattern() {
        let store = setup_test_store();
        store.add_quad(&q("http://a", "http://p", Value::literal("x"), "g1")).unwrap();
        store.add_quad(&q("http://a", "http://p", Value::iri("http://b"), "g1")).unwrap();
        store.add_quad(&q("http://b", "http://p", Value::iri("http://a"), "g2")).unwrap();

        let by_subject = store.get_quads(Some(&Value::iri("http://a")), None, None, None).unwrap();
        assert_eq!(by_subject.len(), 2);

        let by_object = store.get_quads(None, None, Some(&Value::iri("http://a")), None).unwrap();
        assert_eq!(by_object.len(), 1);
        assert_eq!(by_object[0].context, Iri::new("g2"));

        let literal = store.get_quads(None, None, Some(&Value::literal("x")), Some(&Iri::new("g1"))).unwrap();
        assert_eq!(literal.len(), 1);
    }

    #[test]
    fn test_duplicate_statement_is_ignored() {
        let store = setup_test_store();
        let quad = q("http://a", "http://p", Value::literal("x"), "g1");
        store.add_quad(&quad).unwrap();
        store.add_quad(&quad).unwrap();
        assert_eq!(store.quad_count().unwrap(), 1);
    }

    #[test]
    fn test_results_come_back_in_insertion_order() {
        let store = setup_test_store();
        for name in ["http://z", "http://a", "http://m"] {
            store.add_quad(&q("http://s", "http://p", Value::iri(name), "g")).unwrap();
        }
        let objects: Vec<String> = store
            .get_quads(None, None, None, Some(&Iri::new("g")))
            .unwrap()
            .into_iter()
            .map(|q| q.object.lexical().to_string())
            .collect();
        assert_eq!(objects, vec!["http://z", "http://a", "http://m"]);
    }

    #[test]
    fn test_named_graph_not_found_when_empty() {
        let store = setup_test_store();
        let err = store.named_graph(&Iri::new("missing")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_remove_scoped_to_context() {
        let store = setup_test_store();
        let quad = q("http://a", "http://p", Value::literal("x"), "g1");
        store.add_quad(&quad).unwrap();
        store.add_quad(&q("http://a", "http://p", Value::literal("x"), "g2")).unwrap();

        let removed = store.remove_quads(&[quad.triple()], Some(&Iri::new("g1"))).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.quad_count().unwrap(), 1);
        assert!(store.named_graph(&Iri::new("g1")).is_err());
    }

    #[test]
    fn test_with_transaction_commits() {
        let store = setup_test_store();
        let (_, scope) = with_transaction(&store, || {
            store.add_quad(&q("http://a", "http://p", Value::literal("x"), "g"))
        })
        .unwrap();
        assert_eq!(scope, TxnScope::Owned);
        assert!(!store.has_open_transaction());
        assert_eq!(store.quad_count().unwrap(), 1);
    }

    #[test]
    fn test_with_transaction_rolls_back_on_error() {
        let store = setup_test_store();
        let result: Result<((), TxnScope)> = with_transaction(&store, || {
            store.add_quad(&q("http://a", "http://p", Value::literal("x"), "g"))?;
            eyre::bail!("boom")
        });
        assert!(result.is_err());
        assert!(!store.has_open_transaction());
        assert_eq!(store.quad_count().unwrap(), 0);
    }

    #[test]
    fn test_with_transaction_joins_open_transaction() {
        let store = setup_test_store();
        store.begin().unwrap();
        let (_, scope) = with_transaction(&store, || {
            store.add_quad(&q("http://a", "http://p", Value::literal("x"), "g"))
        })
        .unwrap();
        assert_eq!(scope, TxnScope::Joined);
        assert!(store.has_open_transaction());
        store.rollback().unwrap();
        assert_eq!(store.quad_count().unwrap(), 0);
    }

    #[test]
    fn test_file_store_persists_across_handles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.db");
        {
            let store = SqliteGraphStore::open(&path).unwrap();
            store.add_quad(&q("http://a", "http://p", Value::literal("x"), "g")).unwrap();
        }
        let reopened = SqliteGraphStore::open(&path).unwrap();
        assert_eq!(reopened.quad_count().unwrap(), 1);
        assert_eq!(reopened.path(), Some(path.as_path()));
    }
}
