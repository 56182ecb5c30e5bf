//! Sentence embeddings with a BERT model via Candle
//!
//! Weights come from the HuggingFace Hub into the download cache. Repos that
//! only ship `vocab.txt` and `pytorch_model.bin` (legal-bert does) are
//! handled by building a WordPiece tokenizer and loading the pickle weights.

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use hf_hub::api::sync::{ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokenizers::models::wordpiece::WordPiece;
use tokenizers::normalizers::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::processors::bert::BertProcessing;
use tokenizers::{Model, Tokenizer, TruncationParams};

use crate::cli::config::EmbeddingConfig;

/// BERT position limit
const MAX_TOKENS: usize = 512;

/// Anything that turns text into vectors
pub trait Embedder: Send + Sync {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .pop()
            .context("Embedder returned no vector")
    }

    fn dimension(&self) -> usize;
}

/// Embedding engine over a BERT checkpoint
pub struct EmbeddingEngine {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
}

impl EmbeddingEngine {
    /// Download (if needed) and load the configured model
    pub fn load(config: &EmbeddingConfig, cache_dir: &Path) -> Result<Self> {
        let device = Device::Cpu;

        let api = ApiBuilder::new()
            .with_cache_dir(cache_dir.to_path_buf())
            .build()
            .context("Failed to create HuggingFace API client")?;
        let repo = api.repo(Repo::with_revision(
            config.model_id.clone(),
            RepoType::Model,
            config.revision.clone(),
        ));

        let config_path = repo
            .get("config.json")
            .context("Failed to download model config")?;
        let config_contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;
        let bert_config: BertConfig =
            serde_json::from_str(&config_contents).context("Failed to parse model config")?;
        let dimension = hidden_size(&config_contents).unwrap_or(768);

        let tokenizer = load_tokenizer(&repo)?;

        let vb = match repo.get("model.safetensors") {
            Ok(weights) => unsafe {
                VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)
                    .context("Failed to load safetensors weights")?
            },
            Err(_) => {
                let weights = repo
                    .get("pytorch_model.bin")
                    .context("Failed to download model weights")?;
                VarBuilder::from_pth(weights, DType::F32, &device)
                    .context("Failed to load pytorch weights")?
            }
        };

        let model = BertModel::load(vb, &bert_config).context("Failed to create BERT model")?;

        tracing::info!(model = %config.model_id, dimension, "embedding model loaded");

        Ok(Self {
            model,
            tokenizer,
            device,
            dimension,
        })
    }

    /// Mean pooling with attention mask
    fn mean_pool(embeddings: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let mask_expanded = attention_mask
            .unsqueeze(2)?
            .expand(embeddings.shape())?
            .to_dtype(embeddings.dtype())?;

        let sum_embeddings = (embeddings * &mask_expanded)?.sum(1)?;
        let sum_mask = mask_expanded.sum(1)?.clamp(1e-9, f64::MAX)?;

        Ok(sum_embeddings.broadcast_div(&sum_mask)?)
    }
}

impl Embedder for EmbeddingEngine {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        let rows: Vec<(Vec<u32>, Vec<u32>)> = encodings
            .iter()
            .map(|encoding| (encoding.get_ids().to_vec(), encoding.get_attention_mask().to_vec()))
            .collect();

        let (flat_ids, flat_mask, max_len) = pad_batch(&rows);
        let batch_size = rows.len();

        let token_ids = Tensor::from_vec(flat_ids, (batch_size, max_len), &self.device)?;
        let attention_mask = Tensor::from_vec(flat_mask, (batch_size, max_len), &self.device)?;
        let token_type_ids = token_ids.zeros_like()?;

        let hidden = self
            .model
            .forward(&token_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = Self::mean_pool(&hidden, &attention_mask)?;

        Ok(pooled.to_vec2::<f32>()?)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Loads the engine on first use and shares it afterwards
pub struct LazyEmbedder {
    config: EmbeddingConfig,
    cache_dir: PathBuf,
    engine: Mutex<Option<Arc<EmbeddingEngine>>>,
}

impl LazyEmbedder {
    pub fn new(config: EmbeddingConfig, cache_dir: PathBuf) -> Self {
        Self {
            config,
            cache_dir,
            engine: Mutex::new(None),
        }
    }

    fn engine(&self) -> Result<Arc<EmbeddingEngine>> {
        let mut slot = self
            .engine
            .lock()
            .map_err(|_| anyhow::anyhow!("embedding engine lock poisoned"))?;
        if let Some(engine) = slot.as_ref() {
            return Ok(engine.clone());
        }
        let engine = Arc::new(EmbeddingEngine::load(&self.config, &self.cache_dir)?);
        *slot = Some(engine.clone());
        Ok(engine)
    }

    /// Whether the model has been loaded yet
    pub fn is_loaded(&self) -> bool {
        self.engine.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

impl Embedder for LazyEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.engine()?.embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        match self.engine.lock() {
            Ok(slot) => slot.as_ref().map(|e| e.dimension).unwrap_or(768),
            Err(_) => 768,
        }
    }
}

fn load_tokenizer(repo: &ApiRepo) -> Result<Tokenizer> {
    let mut tokenizer = match repo.get("tokenizer.json") {
        Ok(path) => Tokenizer::from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?,
        Err(_) => {
            let vocab = repo
                .get("vocab.txt")
                .context("Model has neither tokenizer.json nor vocab.txt")?;
            wordpiece_tokenizer(&vocab)?
        }
    };
    limit_length(&mut tokenizer)?;
    Ok(tokenizer)
}

/// Truncate to the position limit before special tokens are added, so long
/// inputs still end in `[SEP]`
fn limit_length(tokenizer: &mut Tokenizer) -> Result<()> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: MAX_TOKENS,
            ..Default::default()
        }))
        .map_err(|e| anyhow::anyhow!("Failed to configure truncation: {}", e))?;
    Ok(())
}

/// Uncased BERT WordPiece tokenizer from a `vocab.txt`
fn wordpiece_tokenizer(vocab: &Path) -> Result<Tokenizer> {
    let vocab = vocab
        .to_str()
        .context("vocab path is not valid UTF-8")?;
    let wordpiece = WordPiece::from_file(vocab)
        .unk_token("[UNK]".to_string())
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build WordPiece model: {}", e))?;

    let cls = wordpiece.token_to_id("[CLS]").context("vocab lacks [CLS]")?;
    let sep = wordpiece.token_to_id("[SEP]").context("vocab lacks [SEP]")?;

    let mut tokenizer = Tokenizer::new(wordpiece);
    tokenizer.with_normalizer(BertNormalizer::new(true, true, None, true));
    tokenizer.with_pre_tokenizer(BertPreTokenizer);
    tokenizer.with_post_processor(BertProcessing::new(
        ("[SEP]".to_string(), sep),
        ("[CLS]".to_string(), cls),
    ));
    Ok(tokenizer)
}

/// Right-pad token rows with zeros; returns flattened ids, mask and width
fn pad_batch(rows: &[(Vec<u32>, Vec<u32>)]) -> (Vec<u32>, Vec<u32>, usize) {
    let max_len = rows.iter().map(|(ids, _)| ids.len()).max().unwrap_or(0);
    let mut flat_ids = Vec::with_capacity(rows.len() * max_len);
    let mut flat_mask = Vec::with_capacity(rows.len() * max_len);

    for (ids, mask) in rows {
        flat_ids.extend_from_slice(ids);
        flat_ids.extend(std::iter::repeat(0).take(max_len - ids.len()));
        flat_mask.extend_from_slice(mask);
        flat_mask.extend(std::iter::repeat(0).take(max_len - mask.len()));
    }

    (flat_ids, flat_mask, max_len)
}

fn hidden_size(config_json: &str) -> Option<usize> {
    serde_json::from_str::<serde_json::Value>(config_json)
        .ok()?
        .get("hidden_size")?
        .as_u64()
        .map(|n| n as usize)
}

/// Cosine similarity; 0.0 when either vector has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_batch() {
        let rows = vec![(vec![101, 7, 102], vec![1, 1, 1]), (vec![101, 102], vec![1, 1])];
        let (ids, mask, width) = pad_batch(&rows);
        assert_eq!(width, 3);
        assert_eq!(ids, vec![101, 7, 102, 101, 102, 0]);
        assert_eq!(mask, vec![1, 1, 1, 1, 1, 0]);
    }

    #[test]
    fn test_hidden_size() {
        assert_eq!(hidden_size(r#"{"hidden_size": 384}"#), Some(384));
        assert_eq!(hidden_size("{}"), None);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_wordpiece_tokenizer_from_vocab() {
        let dir = tempfile::tempdir().unwrap();
        let vocab = dir.path().join("vocab.txt");
        std::fs::write(&vocab, "[PAD]\n[UNK]\n[CLS]\n[SEP]\nbail\nact\n").unwrap();

        let tokenizer = wordpiece_tokenizer(&vocab).unwrap();
        let encoding = tokenizer.encode("Bail Act", true).unwrap();
        assert_eq!(encoding.get_ids(), &[2, 4, 5, 3]);
    }

    #[test]
    fn test_long_input_keeps_sep() {
        let dir = tempfile::tempdir().unwrap();
        let vocab = dir.path().join("vocab.txt");
        std::fs::write(&vocab, "[PAD]\n[UNK]\n[CLS]\n[SEP]\nbail\n").unwrap();

        let mut tokenizer = wordpiece_tokenizer(&vocab).unwrap();
        limit_length(&mut tokenizer).unwrap();
        let encoding = tokenizer.encode("bail ".repeat(2 * MAX_TOKENS), true).unwrap();
        let ids = encoding.get_ids();
        assert_eq!(ids.len(), MAX_TOKENS);
        assert_eq!(ids.first(), Some(&2));
        assert_eq!(ids.last(), Some(&3));
    }

    #[test]
    #[ignore] // Requires model download
    fn test_embed_legal_bert() {
        let dir = tempfile::tempdir().unwrap();
        let engine = EmbeddingEngine::load(&EmbeddingConfig::default(), dir.path()).unwrap();
        let vectors = engine.embed_batch(&["bail application", "appeal"]).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), engine.dimension());
    }
}
