//! ONNX cross-encoder relevance model.

use std::collections::HashMap;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Encoding, Tokenizer};
use tracing::{debug, info};

use rag_core::{RagError, RelevanceModel, RerankerConfig, Result};

use crate::session::{load_session, load_tokenizer, pad_rows};

/// Scores (query, document) pairs jointly, e.g. ms-marco-MiniLM-L-6-v2.
///
/// The model is expected to emit one logit per pair, shaped `[batch]` or
/// `[batch, 1]`.
pub struct OnnxCrossEncoder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    max_tokens: usize,
}

impl OnnxCrossEncoder {
    pub fn new(config: &RerankerConfig) -> Result<Self> {
        let session = load_session(&config.model_path, config.num_threads, |m| {
            RagError::reranking(m)
        })?;
        let tokenizer = load_tokenizer(&config.tokenizer_path, config.max_tokens, |m| {
            RagError::reranking(m)
        })?;

        info!("Cross-encoder {} initialized", config.model_name);

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            max_tokens: config.max_tokens.max(1),
        })
    }
}

impl RelevanceModel for OnnxCrossEncoder {
    fn score_pairs(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let pairs: Vec<(&str, &str)> = documents.iter().map(|d| (query, *d)).collect();
        let encodings = self
            .tokenizer
            .encode_batch(pairs, true)
            .map_err(|e| RagError::reranking(format!("Tokenization failed: {}", e)))?;

        let batch_size = encodings.len();
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .clamp(1, self.max_tokens);

        debug!("Scoring {} pairs, max_len={}", batch_size, max_len);

        let shape = vec![batch_size, max_len];
        let input_ids = Tensor::from_array((
            shape.clone(),
            pad_rows(encodings.iter().map(Encoding::get_ids), batch_size, max_len),
        ))
        .map_err(|e| RagError::reranking(format!("Failed to create input tensor: {}", e)))?;
        let attention_mask = Tensor::from_array((
            shape.clone(),
            pad_rows(
                encodings.iter().map(Encoding::get_attention_mask),
                batch_size,
                max_len,
            ),
        ))
        .map_err(|e| RagError::reranking(format!("Failed to create mask tensor: {}", e)))?;
        let token_type_ids = Tensor::from_array((
            shape,
            pad_rows(encodings.iter().map(Encoding::get_type_ids), batch_size, max_len),
        ))
        .map_err(|e| RagError::reranking(format!("Failed to create token type tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| RagError::reranking(format!("Failed to lock session: {}", e)))?;

        let mut model_inputs = HashMap::new();
        for input in session.inputs() {
            let name = input.name().to_string();
            let value = match name.as_str() {
                "input_ids" => input_ids.clone().upcast(),
                "attention_mask" => attention_mask.clone().upcast(),
                "token_type_ids" => token_type_ids.clone().upcast(),
                other => {
                    return Err(RagError::reranking(format!(
                        "Unsupported model input: {}",
                        other
                    )))
                }
            };
            model_inputs.insert(name, value);
        }

        let outputs = session
            .run(model_inputs)
            .map_err(|e| RagError::reranking(format!("Inference failed: {}", e)))?;

        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| RagError::reranking("No output tensor found"))?;

        let view = output
            .try_extract_array::<f32>()
            .map_err(|e| RagError::reranking(format!("Failed to extract tensor: {}", e)))?;

        logits_per_pair(view.iter().copied().collect(), view.shape(), batch_size)
    }
}

/// Flatten `[batch]` or `[batch, 1]` logits into one score per pair.
fn logits_per_pair(values: Vec<f32>, shape: &[usize], batch_size: usize) -> Result<Vec<f32>> {
    let per_pair = match shape {
        [n] if *n == batch_size => true,
        [n, 1] if *n == batch_size => true,
        _ => false,
    };

    if !per_pair {
        return Err(RagError::reranking(format!(
            "Unexpected logits shape {:?} for {} pairs",
            shape, batch_size
        )));
    }

    Ok(values)
}
