//! ONNX-based sentence embedding model.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::{Array2, ArrayViewD, Axis, Ix2, Ix3};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Encoding, Tokenizer};
use tracing::{debug, info};

use rag_core::{Embedder, EmbeddingConfig, RagError, Result};

use crate::session::{load_session, load_tokenizer, pad_rows};

/// ONNX-based embedder for all-MiniLM-L6-v2 or a compatible model.
pub struct OnnxEmbedder {
    /// ONNX inference session (wrapped in Mutex for interior mutability).
    session: Mutex<Session>,

    /// Tokenizer for the model.
    tokenizer: Arc<Tokenizer>,

    dimension: usize,
    max_tokens: usize,
    batch_size: usize,
    query_prefix: String,
    document_prefix: String,
}

impl OnnxEmbedder {
    /// Create a new embedder from the configured model and tokenizer files.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let session = load_session(&config.model_path, config.num_threads, |m| {
            RagError::embedding(m)
        })?;
        let tokenizer = load_tokenizer(&config.tokenizer_path, config.max_tokens, |m| {
            RagError::embedding(m)
        })?;

        info!(
            "Embedder {} initialized: dim={}, max_tokens={}",
            config.model_name, config.dimension, config.max_tokens
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer: Arc::new(tokenizer),
            dimension: config.dimension,
            max_tokens: config.max_tokens,
            batch_size: config.batch_size.max(1),
            query_prefix: config.query_prefix.clone(),
            document_prefix: config.document_prefix.clone(),
        })
    }

    /// Embed texts with a given prefix, `batch_size` at a time.
    fn embed_all(&self, texts: &[&str], prefix: &str) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            embeddings.extend(self.embed_batch(batch, prefix)?);
        }
        Ok(embeddings)
    }

    fn embed_batch(&self, texts: &[&str], prefix: &str) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prefixed: Vec<String> = texts.iter().map(|t| format!("{}{}", prefix, t)).collect();

        let encodings = self
            .tokenizer
            .encode_batch(prefixed, true)
            .map_err(|e| RagError::embedding(format!("Tokenization failed: {}", e)))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .clamp(1, self.max_tokens.max(1));
        let batch_size = encodings.len();

        debug!("Embedding batch: size={}, max_len={}", batch_size, max_len);

        let input_ids = pad_rows(encodings.iter().map(Encoding::get_ids), batch_size, max_len);
        let attention_mask = pad_rows(
            encodings.iter().map(Encoding::get_attention_mask),
            batch_size,
            max_len,
        );

        let mask = Array2::from_shape_fn((batch_size, max_len), |(i, j)| {
            attention_mask[i * max_len + j] as f32
        });

        let input_ids_tensor = Tensor::from_array((vec![batch_size, max_len], input_ids))
            .map_err(|e| RagError::embedding(format!("Failed to create input tensor: {}", e)))?;
        let attention_mask_tensor =
            Tensor::from_array((vec![batch_size, max_len], attention_mask.clone()))
                .map_err(|e| RagError::embedding(format!("Failed to create mask tensor: {}", e)))?;
        let token_type_tensor =
            Tensor::from_array((vec![batch_size, max_len], vec![0i64; batch_size * max_len]))
                .map_err(|e| {
                    RagError::embedding(format!("Failed to create token type tensor: {}", e))
                })?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| RagError::embedding(format!("Failed to lock session: {}", e)))?;

        // BERT exports differ on whether token_type_ids is an input.
        let wants_token_types = session
            .inputs()
            .iter()
            .any(|input| input.name() == "token_type_ids");

        let outputs = if wants_token_types {
            session.run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_tensor
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor
            ])
        }
        .map_err(|e| RagError::embedding(format!("Inference failed: {}", e)))?;

        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| RagError::embedding("No output tensor found"))?;

        let view = output
            .try_extract_array::<f32>()
            .map_err(|e| RagError::embedding(format!("Failed to extract tensor: {}", e)))?;

        debug!("Output shape: {:?}", view.shape());

        let pooled = pool(view, &mask)?;
        if pooled.ncols() != self.dimension {
            return Err(RagError::embedding(format!(
                "Model produced {}-dimensional embeddings, configured dimension is {}",
                pooled.ncols(),
                self.dimension
            )));
        }

        Ok(pooled
            .outer_iter()
            .map(|row| l2_normalize(row.to_vec()))
            .collect())
    }
}

/// Reduce model output to one row per input.
///
/// `[batch, seq, hidden]` outputs are mean-pooled over unmasked tokens;
/// `[batch, hidden]` outputs are already pooled.
fn pool(view: ArrayViewD<'_, f32>, mask: &Array2<f32>) -> Result<Array2<f32>> {
    match view.ndim() {
        3 => {
            let hidden = view
                .into_dimensionality::<Ix3>()
                .map_err(|e| RagError::embedding(e.to_string()))?;
            if hidden.shape()[..2] != mask.shape()[..] {
                return Err(RagError::embedding(format!(
                    "Output shape {:?} does not match input shape {:?}",
                    hidden.shape(),
                    mask.shape()
                )));
            }

            let weighted = &hidden * &mask.view().insert_axis(Axis(2));
            let sums = weighted.sum_axis(Axis(1));
            let counts = mask.sum_axis(Axis(1)).mapv(|c| c.max(1.0));
            Ok(sums / &counts.insert_axis(Axis(1)))
        }
        2 => Ok(view
            .into_dimensionality::<Ix2>()
            .map_err(|e| RagError::embedding(e.to_string()))?
            .to_owned()),
        _ => Err(RagError::embedding(format!(
            "Unexpected output shape: {:?}",
            view.shape()
        ))),
    }
}

/// L2 normalize a vector.
pub(crate) fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        // Session is not Send; inference runs inline on the calling task.
        self.embed_all(texts, &self.document_prefix)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text], &self.query_prefix)?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding("No embedding returned"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
