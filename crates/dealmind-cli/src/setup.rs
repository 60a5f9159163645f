use anyhow::{Context, Result, bail};
use dealmind_ai::embedding::{CachedEmbedding, EmbeddingProvider, HashingEmbedding, OpenAIEmbedding};
use dealmind_ai::memory::RedbPreferenceStore;
use dealmind_ai::{LlmClient, LongTermMemory, MemoryConfig, MemoryManager, OpenAIClient};
use dealmind_storage::Storage;
use std::path::Path;
use std::sync::Arc;

use crate::config::{CliConfig, EmbeddingBackend, ProvidersConfig};

const EMBEDDING_CACHE_ENTRIES: usize = 1024;

/// Everything a command needs, opened once per invocation.
pub struct Runtime {
    pub manager: Arc<MemoryManager>,
    pub llm: Option<Arc<dyn LlmClient>>,
}

pub fn prepare(db_path: &Path, config: &CliConfig, memory: MemoryConfig) -> Result<Runtime> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let embedder = build_embedder(&config.providers)?;
    let storage = Storage::new(db_path, embedder.dimension())
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    tracing::debug!(
        db_path = %db_path.display(),
        embedding = embedder.model_name(),
        "Storage opened"
    );

    let long_term = LongTermMemory::new(embedder, Arc::new(storage.knowledge.clone()))
        .with_timeout(memory.embedding_timeout());
    let preferences = RedbPreferenceStore::new(storage.preferences.clone());
    let llm = build_llm(&config.providers);

    let manager = MemoryManager::new(
        memory,
        Arc::new(long_term),
        Arc::new(preferences),
        llm.clone(),
    )?;

    Ok(Runtime {
        manager: Arc::new(manager),
        llm,
    })
}

fn build_embedder(providers: &ProvidersConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match providers.embedding {
        EmbeddingBackend::Hashing => {
            let embedder = match providers.embedding_dimension {
                Some(dimension) => HashingEmbedding::new(dimension),
                None => HashingEmbedding::default(),
            };
            Ok(Arc::new(embedder))
        }
        EmbeddingBackend::OpenAI => {
            let Some(api_key) = providers.openai_api_key() else {
                bail!("OpenAI embeddings need an API key (providers.openai_api_key or OPENAI_API_KEY)");
            };
            let mut embedder = OpenAIEmbedding::new(api_key, providers.embedding_model.clone());
            if let Some(url) = &providers.base_url {
                embedder = embedder.with_base_url(url);
            }
            if let Some(dimension) = providers.embedding_dimension {
                embedder = embedder.with_dimension(dimension);
            }
            Ok(Arc::new(CachedEmbedding::new(
                Arc::new(embedder),
                EMBEDDING_CACHE_ENTRIES,
            )))
        }
    }
}

/// Chat client when a key is available; LLM condensers are skipped otherwise.
fn build_llm(providers: &ProvidersConfig) -> Option<Arc<dyn LlmClient>> {
    let api_key = providers.openai_api_key()?;
    let mut client = OpenAIClient::new(api_key);
    if let Some(model) = &providers.llm_model {
        client = client.with_model(model);
    }
    if let Some(url) = &providers.base_url {
        client = client.with_base_url(url);
    }
    Some(Arc::new(client))
}
