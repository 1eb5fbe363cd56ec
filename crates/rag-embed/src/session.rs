//! Shared ONNX Runtime and tokenizer loading.

use std::path::Path;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::info;

use rag_core::{RagError, Result};

/// Maps a loader failure into the caller's error variant.
pub(crate) type ErrorFn = fn(String) -> RagError;

/// Build an inference session for the model at `model_path`.
pub(crate) fn load_session(model_path: &Path, num_threads: usize, err: ErrorFn) -> Result<Session> {
    if !model_path.exists() {
        return Err(err(format!("Model file not found: {}", model_path.display())));
    }

    info!("Loading ONNX model from {:?}", model_path);

    Session::builder()
        .map_err(|e| err(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| err(format!("Failed to set optimization level: {}", e)))?
        .with_intra_threads(num_threads.max(1))
        .map_err(|e| err(format!("Failed to set thread count: {}", e)))?
        .commit_from_file(model_path)
        .map_err(|e| err(format!("Failed to load model: {}", e)))
}

/// Load a `tokenizer.json`, truncating every encoding to `max_tokens`.
pub(crate) fn load_tokenizer(tokenizer_path: &Path, max_tokens: usize, err: ErrorFn) -> Result<Tokenizer> {
    info!("Loading tokenizer from {:?}", tokenizer_path);

    let mut tokenizer = Tokenizer::from_file(tokenizer_path)
        .map_err(|e| err(format!("Failed to load tokenizer: {}", e)))?;

    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: max_tokens,
            ..Default::default()
        }))
        .map_err(|e| err(format!("Failed to configure truncation: {}", e)))?;

    Ok(tokenizer)
}

/// Right-pad token rows into one row-major `[batch, max_len]` buffer.
pub(crate) fn pad_rows<'a, I>(rows: I, batch_size: usize, max_len: usize) -> Vec<i64>
where
    I: IntoIterator<Item = &'a [u32]>,
{
    let mut out = vec![0i64; batch_size * max_len];
    for (i, row) in rows.into_iter().enumerate() {
        for (j, value) in row.iter().take(max_len).enumerate() {
            out[i * max_len + j] = *value as i64;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_rows() {
        let a: &[u32] = &[1, 2, 3];
        let b: &[u32] = &[4];
        let padded = pad_rows([a, b], 2, 3);
        assert_eq!(padded, vec![1, 2, 3, 4, 0, 0]);
    }

    #[test]
    fn test_pad_rows_truncates() {
        let a: &[u32] = &[1, 2, 3, 4];
        assert_eq!(pad_rows([a], 1, 2), vec![1, 2]);
    }

    #[test]
    fn test_missing_model_file() {
        let err = load_session(
            Path::new("/nonexistent/model.onnx"),
            1,
            |m| RagError::embedding(m),
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "EMBEDDING_ERROR");
    }
}
