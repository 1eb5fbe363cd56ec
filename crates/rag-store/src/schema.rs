//! Database schema definitions.

/// Main schema SQL for initializing the database.
pub const SCHEMA: &str = r#"
-- One row per embedded chunk; seq preserves insertion order and is the
-- rowid of the chunk's vector in the vec0 table
CREATE TABLE IF NOT EXISTS embeddings (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    document TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    dimension INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);
"#;

/// Name of the sqlite-vec table holding one vector per `embeddings` row,
/// keyed by `embeddings.seq`.
pub const VEC_TABLE: &str = "vec_embeddings";

/// sqlite-vec schema for vectors of `dimension` floats.
///
/// vec0 columns have a fixed width, so this is created with the first
/// batch of embeddings rather than with [`SCHEMA`].
pub fn vec_schema(dimension: usize) -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {VEC_TABLE} USING vec0(\n    \
         embedding float[{dimension}] distance_metric=cosine\n);"
    )
}

/// Schema version for migrations.
pub const SCHEMA_VERSION: u32 = 1;
