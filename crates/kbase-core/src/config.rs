//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`, e.g. `APP_RETRIEVAL__FINAL_K=5`).
//! Typed sections fall back to their defaults when a key is absent.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    /// Build from an inline TOML document, without files or environment.
    pub fn from_toml_str(toml: &str) -> Self {
        Self { figment: Figment::new().merge(Toml::string(toml)) }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extract every typed section and validate it.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub retrieval: RetrievalSettings,
    pub ingest: IngestSettings,
    pub data: DataSettings,
    pub models: ModelSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.retrieval.validate()?;
        self.ingest.validate()
    }
}

/// RRF smoothing constant.
pub const DEFAULT_RRF_K: u32 = 60;
/// Head of the fused ranking handed to the reranker.
pub const DEFAULT_RERANK_CUTOFF: usize = 20;

/// Cutoffs of the coarse → fine funnel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Candidates requested from each of the vector and lexical indexes.
    pub coarse_n: usize,
    /// Head of the fused ranking handed to the reranker.
    pub rerank_cutoff: usize,
    /// Default number of final results.
    pub final_k: usize,
    /// Largest `final_k` a caller may ask for.
    pub max_final_k: usize,
    /// RRF smoothing constant.
    pub rrf_k: u32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { coarse_n: 20, rerank_cutoff: DEFAULT_RERANK_CUTOFF, final_k: 3, max_final_k: 20, rrf_k: DEFAULT_RRF_K }
    }
}

impl RetrievalSettings {
    /// Zero cutoffs are rejected. Breaking `final_k <= rerank_cutoff <= coarse_n`
    /// only yields fewer results, so it is logged rather than refused.
    pub fn validate(&self) -> Result<()> {
        if self.coarse_n == 0 || self.rerank_cutoff == 0 || self.max_final_k == 0 {
            return Err(Error::InvalidConfig(format!(
                "retrieval cutoffs must be positive (coarse_n={}, rerank_cutoff={}, max_final_k={})",
                self.coarse_n, self.rerank_cutoff, self.max_final_k
            )));
        }
        if self.final_k == 0 || self.final_k > self.max_final_k {
            return Err(Error::InvalidConfig(format!(
                "retrieval.final_k must be within 1..={} (got {})",
                self.max_final_k, self.final_k
            )));
        }
        if self.final_k > self.rerank_cutoff || self.rerank_cutoff > self.coarse_n {
            warn!(
                final_k = self.final_k,
                rerank_cutoff = self.rerank_cutoff,
                coarse_n = self.coarse_n,
                "retrieval cutoffs are not ordered final_k <= rerank_cutoff <= coarse_n; fewer results may come back"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embed_batch_size: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self { chunk_size: 500, chunk_overlap: 50, embed_batch_size: 32 }
    }
}

impl IngestSettings {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "ingest.chunk_overlap ({}) must be smaller than a positive ingest.chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub db_dir: String,
    /// Defaults to `<db_dir>/lexical.json`.
    pub lexical_snapshot: Option<String>,
    pub vector_table: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { db_dir: "./data/kbase".to_string(), lexical_snapshot: None, vector_table: "knowledge".to_string() }
    }
}

impl DataSettings {
    pub fn db_path(&self) -> PathBuf {
        expand_path(&self.db_dir)
    }

    pub fn lexical_snapshot_path(&self) -> PathBuf {
        let db = self.db_path();
        match &self.lexical_snapshot {
            Some(p) => resolve_with_base(&db, p),
            None => db.join("lexical.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub embedding_dir: Option<String>,
    pub reranker_dir: Option<String>,
    /// Token budget per sequence (or per query/passage pair for the reranker).
    pub max_len: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self { embedding_dir: None, reranker_dir: None, max_len: 512 }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
