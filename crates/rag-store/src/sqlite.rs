//! SQLite-backed vector index.

use std::ffi::c_int;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use rusqlite::{ffi, params, Connection, OpenFlags, OptionalExtension};
use sqlite_vec::sqlite3_vec_init;
use tracing::{debug, info};
use ulid::Ulid;

use rag_core::{Metadata, RagError, Result, VectorHit, VectorIndex};

use crate::schema::{vec_schema, SCHEMA, SCHEMA_VERSION, VEC_TABLE};
use crate::similarity::check_aligned;

/// Largest `k` sqlite-vec accepts in a KNN query.
const MAX_KNN: usize = 4096;

/// Persistent vector index stored in a single SQLite file.
///
/// Chunk text and metadata live in `embeddings`; vectors live in a
/// sqlite-vec `vec0` table keyed by the same rowid and are searched by
/// cosine distance inside SQLite.
pub struct SqliteVectorStore {
    /// Connection wrapped in blocking Mutex.
    conn: Arc<Mutex<Connection>>,
}

/// Register sqlite-vec as an auto extension so every connection opened
/// afterwards has `vec0`.
fn register_vec_extension() -> Result<()> {
    static RC: OnceLock<c_int> = OnceLock::new();

    let rc = *RC.get_or_init(|| unsafe {
        ffi::sqlite3_auto_extension(Some(std::mem::transmute(sqlite3_vec_init as *const ())))
    });

    if rc != ffi::SQLITE_OK {
        return Err(RagError::vector_store(format!(
            "Failed to register sqlite-vec (code {})",
            rc
        )));
    }
    Ok(())
}

impl SqliteVectorStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        register_vec_extension()?;
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| RagError::vector_store(format!("Failed to open database: {}", e)))?;

        Self::init(conn, path)
    }

    /// Open an existing database read-only.
    ///
    /// Creates nothing: a missing file or directory is an error.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(RagError::vector_store(format!(
                "No vector database at {}",
                path.display()
            )));
        }

        register_vec_extension()?;
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| RagError::vector_store(format!("Failed to open database: {}", e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        register_vec_extension()?;
        let conn = Connection::open_in_memory().map_err(|e| {
            RagError::vector_store(format!("Failed to open in-memory database: {}", e))
        })?;

        Self::init(conn, Path::new(":memory:"))
    }

    fn init(conn: Connection, path: &Path) -> Result<Self> {
        Self::configure_connection(&conn)?;

        let vec_version: String = conn
            .query_row("SELECT vec_version()", [], |row| row.get(0))
            .map_err(|e| RagError::vector_store(format!("sqlite-vec not available: {}", e)))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| RagError::vector_store(format!("Failed to initialize schema: {}", e)))?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(|e| RagError::vector_store(format!("Failed to set schema version: {}", e)))?;

        info!("Vector store opened at {:?} (sqlite-vec {})", path, vec_version);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Configure SQLite connection for optimal performance.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA busy_timeout = 30000;
            PRAGMA temp_store = MEMORY;
            "#,
        )
        .map_err(|e| RagError::vector_store(format!("Failed to configure connection: {}", e)))?;

        Ok(())
    }

    /// Execute a blocking operation on the connection.
    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RagError::vector_store(e.to_string()))?;
        f(&conn)
    }

    /// Execute a mutable blocking operation on the connection.
    fn with_conn_mut<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| RagError::vector_store(e.to_string()))?;
        f(&mut conn)
    }

    /// Dimension of the stored vectors, `None` while the store is empty.
    fn stored_dimension(conn: &Connection) -> Result<Option<usize>> {
        let dimension: Option<i64> = conn
            .query_row(
                "SELECT dimension FROM embeddings ORDER BY seq LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RagError::vector_store(e.to_string()))?;
        Ok(dimension.map(|d| d as usize))
    }

    /// Convert f32 vector to bytes (little-endian), the format vec0 expects.
    fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
        v.iter().flat_map(|f| f.to_le_bytes()).collect()
    }
}

/// Common width of a batch of embeddings.
fn batch_dimension(embeddings: &[Vec<f32>]) -> Result<usize> {
    let dimension = embeddings.first().map(Vec::len).unwrap_or(0);
    if dimension == 0 {
        return Err(RagError::vector_store("Embeddings must not be empty"));
    }
    if let Some(position) = embeddings.iter().position(|e| e.len() != dimension) {
        return Err(RagError::vector_store(format!(
            "Embedding dimension mismatch: entry 0 has {}, entry {} has {}",
            dimension,
            position,
            embeddings[position].len()
        )));
    }
    Ok(dimension)
}

#[async_trait]
impl VectorIndex for SqliteVectorStore {
    async fn add(
        &self,
        texts: &[String],
        embeddings: &[Vec<f32>],
        metadatas: &[Metadata],
    ) -> Result<Vec<Ulid>> {
        check_aligned(texts.len(), embeddings.len(), metadatas.len())?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let dimension = batch_dimension(embeddings)?;

        let metadata_json = metadatas
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| RagError::internal(e.to_string()))?
            .as_millis() as i64;

        self.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| RagError::vector_store(e.to_string()))?;

            match Self::stored_dimension(&tx)? {
                Some(stored) if stored != dimension => {
                    return Err(RagError::vector_store(format!(
                        "Embedding dimension mismatch: store has {}, got {}",
                        stored, dimension
                    )));
                }
                Some(_) => {}
                None => tx
                    .execute_batch(&vec_schema(dimension))
                    .map_err(|e| {
                        RagError::vector_store(format!("Failed to create vec table: {}", e))
                    })?,
            }

            let mut ids = Vec::with_capacity(texts.len());
            {
                let mut insert_row = tx
                    .prepare(
                        r#"
                        INSERT INTO embeddings (id, document, metadata, dimension, created_at)
                        VALUES (?1, ?2, ?3, ?4, ?5)
                        "#,
                    )
                    .map_err(|e| RagError::vector_store(e.to_string()))?;
                let mut insert_vec = tx
                    .prepare(&format!(
                        "INSERT INTO {VEC_TABLE} (rowid, embedding) VALUES (?1, ?2)"
                    ))
                    .map_err(|e| RagError::vector_store(e.to_string()))?;

                for ((text, embedding), metadata) in
                    texts.iter().zip(embeddings).zip(&metadata_json)
                {
                    let id = Ulid::new();
                    insert_row
                        .execute(params![id.to_string(), text, metadata, dimension as i64, now])
                        .map_err(|e| {
                            RagError::vector_store(format!("Failed to insert chunk: {}", e))
                        })?;

                    let seq = tx.last_insert_rowid();
                    insert_vec
                        .execute(params![seq, Self::vec_to_bytes(embedding)])
                        .map_err(|e| {
                            RagError::vector_store(format!("Failed to insert embedding: {}", e))
                        })?;
                    ids.push(id);
                }
            }

            tx.commit()
                .map_err(|e| RagError::vector_store(e.to_string()))?;

            debug!("Inserted {} embeddings", ids.len());
            Ok(ids)
        })
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_bytes = Self::vec_to_bytes(embedding);
        let limit = k.min(MAX_KNN);

        self.with_conn(|conn| {
            let Some(dimension) = Self::stored_dimension(conn)? else {
                return Ok(Vec::new());
            };
            if dimension != embedding.len() {
                return Err(RagError::vector_store(format!(
                    "Embedding dimension mismatch: query has {}, store has {}",
                    embedding.len(),
                    dimension
                )));
            }

            let mut stmt = conn
                .prepare(&format!(
                    r#"
                    WITH knn AS (
                        SELECT rowid, distance
                        FROM {VEC_TABLE}
                        WHERE embedding MATCH ?1 AND k = ?2
                    )
                    SELECT e.id, e.document, e.metadata, knn.distance
                    FROM knn
                    JOIN embeddings e ON e.seq = knn.rowid
                    ORDER BY knn.distance, e.seq
                    "#
                ))
                .map_err(|e| RagError::vector_store(e.to_string()))?;

            let rows = stmt
                .query_map(params![query_bytes, limit as i64], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<f64>>(3)?,
                    ))
                })
                .map_err(|e| RagError::vector_store(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| RagError::vector_store(e.to_string()))?;

            let mut hits = Vec::with_capacity(rows.len());
            for (id, document, metadata, distance) in rows {
                hits.push(VectorHit {
                    id: Ulid::from_string(&id)
                        .map_err(|e| RagError::vector_store(format!("Corrupt id {}: {}", id, e)))?,
                    text: document,
                    metadata: serde_json::from_str(&metadata)?,
                    // Zero vectors have no cosine distance; SQLite reports NULL.
                    distance: distance.map_or(1.0, |d| d as f32),
                });
            }

            debug!("Vector query returned {} hits (k={})", hits.len(), limit);
            Ok(hits)
        })
    }

    async fn count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))
                .map_err(|e| RagError::vector_store(e.to_string()))?;
            Ok(count as usize)
        })
    }

    async fn documents(&self) -> Result<Vec<(String, Metadata)>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT document, metadata FROM embeddings ORDER BY seq")
                .map_err(|e| RagError::vector_store(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
                .map_err(|e| RagError::vector_store(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| RagError::vector_store(e.to_string()))?;

            rows.into_iter()
                .map(|(document, metadata)| Ok((document, serde_json::from_str(&metadata)?)))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(filename: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert("filename".to_string(), json!(filename));
        m
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_open_memory() {
        let store = SqliteVectorStore::open_memory().unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.query(&[1.0, 0.0], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_and_query() {
        let store = SqliteVectorStore::open_memory().unwrap();
        store
            .add(
                &texts(&["far away", "very close", "medium"]),
                &[vec![0.0, 1.0], vec![1.0, 0.0], vec![0.6, 0.4]],
                &[meta("a.txt"), meta("b.txt"), meta("c.txt")],
            )
            .await
            .unwrap();

        let hits = store.query(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "very close");
        assert_eq!(hits[0].metadata.get("filename"), Some(&json!("b.txt")));
        assert_eq!(hits[1].text, "medium");
        assert!(hits[0].distance.abs() < 1e-6);
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[tokio::test]
    async fn test_equal_distances_keep_insertion_order() {
        let store = SqliteVectorStore::open_memory().unwrap();
        store
            .add(
                &texts(&["first", "second", "third"]),
                &[vec![0.5, 0.5], vec![0.5, 0.5], vec![0.5, 0.5]],
                &[meta("a.txt"), meta("b.txt"), meta("c.txt")],
            )
            .await
            .unwrap();

        let hits = store.query(&[1.0, 1.0], 3).await.unwrap();
        let order: Vec<_> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_query_underfill_returns_all() {
        let store = SqliteVectorStore::open_memory().unwrap();
        store
            .add(&texts(&["one"]), &[vec![1.0, 0.0]], &[meta("a.txt")])
            .await
            .unwrap();

        let hits = store.query(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(store.query(&[1.0, 0.0], 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_rejects_misaligned_input() {
        let store = SqliteVectorStore::open_memory().unwrap();
        let err = store
            .add(&texts(&["one"]), &[], &[meta("a.txt")])
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VECTOR_STORE_ERROR");
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_error() {
        let store = SqliteVectorStore::open_memory().unwrap();
        store
            .add(&texts(&["one"]), &[vec![1.0, 0.0, 0.0]], &[meta("a.txt")])
            .await
            .unwrap();

        let err = store.query(&[1.0, 0.0], 1).await.unwrap_err();
        assert_eq!(err.error_code(), "VECTOR_STORE_ERROR");

        let err = store
            .add(&texts(&["two"]), &[vec![1.0, 0.0]], &[meta("b.txt")])
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VECTOR_STORE_ERROR");
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("vectors.db");

        {
            let store = SqliteVectorStore::open(&path).unwrap();
            store
                .add(
                    &texts(&["kept", "also kept"]),
                    &[vec![1.0, 0.0], vec![0.0, 1.0]],
                    &[meta("a.txt"), meta("b.txt")],
                )
                .await
                .unwrap();
        }

        let store = SqliteVectorStore::open(&path).unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        let docs = store.documents().await.unwrap();
        assert_eq!(docs[0].0, "kept");
        assert_eq!(docs[1].1.get("filename"), Some(&json!("b.txt")));

        let hits = store.query(&[0.0, 1.0], 1).await.unwrap();
        assert_eq!(hits[0].text, "also kept");
    }

    #[tokio::test]
    async fn test_open_read_only_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("vectors.db");

        let err = SqliteVectorStore::open_read_only(&path).err().unwrap();
        assert_eq!(err.error_code(), "VECTOR_STORE_ERROR");
        assert!(!dir.path().join("missing").exists());

        SqliteVectorStore::open(&path).unwrap();
        let store = SqliteVectorStore::open_read_only(&path).unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
