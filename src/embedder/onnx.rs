/// Local sentence-transformers embedder running `all-MiniLM-L6-v2` through
/// ONNX Runtime.
///
/// Output is mean-pooled over real tokens and L2-normalized, so cosine
/// similarity reduces to an inner product.
use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{PaddingParams, Tokenizer, TruncationParams};
use tracing::info;

use super::{Embedder, EmbedderError, ensure_not_empty, l2_normalize};

pub const MODEL_NAME: &str = "all-MiniLM-L6-v2";
const HIDDEN_SIZE: usize = 384;
/// sentence-transformers truncates MiniLM inputs at 256 word pieces.
const MAX_TOKENS: usize = 256;

pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

struct Encoded {
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
}

impl OnnxEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    pub fn new(model_dir: &Path) -> Result<Self, EmbedderError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        for required in [&model_path, &tokenizer_path] {
            if !required.exists() {
                return Err(EmbedderError::ModelLoadFailed(format!(
                    "{} not found (run `hwrag download-model`)",
                    required.display()
                )));
            }
        }

        info!("Loading {MODEL_NAME} from {}", model_dir.display());

        let session = Session::builder()
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("session builder error: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("thread config error: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("model load error: {e}")))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbedderError::TokenizerError(format!("failed to load tokenizer: {e}")))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| EmbedderError::TokenizerError(format!("truncation config: {e}")))?;
        tokenizer.with_padding(Some(PaddingParams::default()));

        info!(
            "{MODEL_NAME} ready (vocab size: {})",
            tokenizer.get_vocab_size(false)
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    fn encode(&self, text: &str) -> Result<Encoded, EmbedderError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbedderError::TokenizerError(format!("failed to encode text: {e}")))?;
        Ok(Encoded {
            input_ids: encoding.get_ids().iter().map(|&id| i64::from(id)).collect(),
            attention_mask: encoding
                .get_attention_mask()
                .iter()
                .map(|&m| i64::from(m))
                .collect(),
        })
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        ensure_not_empty(text)?;
        let encoded = self.encode(text)?;
        let seq_len = encoded.input_ids.len();

        let input_ids = Tensor::from_array(([1usize, seq_len], encoded.input_ids))
            .map_err(|e| EmbedderError::InferenceFailed(format!("input_ids error: {e}")))?;
        let attention_mask =
            Tensor::from_array(([1usize, seq_len], encoded.attention_mask.clone()))
                .map_err(|e| EmbedderError::InferenceFailed(format!("attention_mask error: {e}")))?;
        let token_type_ids = Tensor::from_array(([1usize, seq_len], vec![0i64; seq_len]))
            .map_err(|e| EmbedderError::InferenceFailed(format!("token_type_ids error: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedderError::InferenceFailed(format!("lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids,
            ])
            .map_err(|e| EmbedderError::InferenceFailed(format!("inference failed: {e}")))?;

        // last_hidden_state: [1, seq_len, hidden]
        let (_shape, hidden) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("output extraction: {e}")))?;

        let mut pooled = mean_pool(hidden, &encoded.attention_mask, HIDDEN_SIZE);
        l2_normalize(&mut pooled);
        Ok(pooled)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        HIDDEN_SIZE
    }

    fn model_name(&self) -> &str {
        MODEL_NAME
    }
}

/// Average token vectors whose attention mask is set.
fn mean_pool(hidden: &[f32], mask: &[i64], hidden_size: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden_size];
    let mut tokens = 0.0f32;

    for (t, &m) in mask.iter().enumerate() {
        if m == 0 {
            continue;
        }
        tokens += 1.0;
        let row = &hidden[t * hidden_size..(t + 1) * hidden_size];
        for (acc, v) in sum.iter_mut().zip(row) {
            *acc += v;
        }
    }

    if tokens > 0.0 {
        for v in &mut sum {
            *v /= tokens;
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_pool_skips_padding() {
        let hidden = vec![1.0, 2.0, 3.0, 5.0, 100.0, 100.0];
        let mask = vec![1, 1, 0];
        assert_eq!(mean_pool(&hidden, &mask, 2), vec![2.0, 3.5]);
    }

    #[test]
    fn test_mean_pool_all_masked() {
        let hidden = vec![1.0, 2.0];
        assert_eq!(mean_pool(&hidden, &[0], 2), vec![0.0, 0.0]);
    }

    #[test]
    fn test_missing_model_dir() {
        let err = OnnxEmbedder::new(Path::new("/nonexistent/minilm")).err().unwrap();
        assert!(matches!(err, EmbedderError::ModelLoadFailed(_)));
    }

    /// Requires downloaded model files and a loadable onnxruntime.
    #[test]
    #[ignore]
    fn test_onnx_embed() {
        let model_dir = Path::new("models/all-MiniLM-L6-v2");
        if !model_dir.join("model.onnx").exists() {
            eprintln!("Skipping: model files not downloaded");
            return;
        }

        let embedder = OnnxEmbedder::new(model_dir).unwrap();
        let a = embedder.embed("Which CPU has the best thread_mark per dollar?").unwrap();
        let b = embedder.embed("Which CPU has the best thread_mark per dollar?").unwrap();
        assert_eq!(a.len(), 384);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01, "expected unit vector, got norm={norm}");
    }
}
