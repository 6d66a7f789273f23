//! Retrieval-augmented generation plugin.
//!
//! Maintains a document store and injects retrieved context into the
//! conversation. Retrieval is keyword-overlap scored against the in-memory
//! store; when an Azure Cognitive Search backend is configured
//! (`vector_store_type: azure_search`), the query is delegated to the search
//! service over REST and the in-memory store serves as fallback.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Plugin, PluginError, PluginMessage, PluginResponse, PluginResult};

/// A document in the knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata
            .insert("source".to_string(), serde_json::json!(source.into()));
        self
    }

    fn source(&self) -> &str {
        self.metadata
            .get("source")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
    }
}

/// A retrieval hit.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: usize,
}

/// Azure Cognitive Search backend settings.
struct AzureSearchBackend {
    endpoint: String,
    api_key: String,
    index: String,
    client: reqwest::Client,
}

impl AzureSearchBackend {
    fn search_url(&self) -> String {
        format!(
            "{}/indexes/{}/docs/search?api-version=2023-11-01",
            self.endpoint.trim_end_matches('/'),
            self.index
        )
    }

    async fn search(&self, query: &str, top_k: usize) -> PluginResult<Vec<ScoredDocument>> {
        let body = serde_json::json!({
            "search": query,
            "top": top_k,
        });

        let response = self
            .client
            .post(self.search_url())
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PluginError::Processing(format!("Azure Search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PluginError::Processing(format!(
                "Azure Search returned {status}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PluginError::Processing(format!("Invalid Azure Search response: {e}")))?;

        let hits = payload
            .get("value")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| {
                let id = hit
                    .get("id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("hit_{i}"));
                let content = hit
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let mut document = Document::new(id, content);
                if let Some(source) = hit.get("source").and_then(|v| v.as_str()) {
                    document = document.with_source(source);
                }
                ScoredDocument {
                    document,
                    // Search-service ranking order stands in for a score
                    score: top_k.saturating_sub(i),
                }
            })
            .collect())
    }
}

/// RAG plugin for knowledge base integration.
pub struct RagPlugin {
    config: serde_json::Value,
    enabled: bool,
    vector_store_type: String,
    embedding_model: String,
    chunk_size: usize,
    top_k: usize,
    knowledge_base_path: Option<PathBuf>,
    documents: RwLock<Vec<Document>>,
    backend: Option<AzureSearchBackend>,
}

impl Default for RagPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl RagPlugin {
    pub fn new() -> Self {
        Self {
            config: serde_json::Value::Null,
            enabled: true,
            vector_store_type: "in_memory".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            chunk_size: 1000,
            top_k: 5,
            knowledge_base_path: None,
            documents: RwLock::new(Vec::new()),
            backend: None,
        }
    }

    /// Add a document to the in-memory store.
    pub fn add_document(&self, mut document: Document) {
        document.metadata.insert(
            "added_at".to_string(),
            serde_json::json!(chrono::Utc::now().to_rfc3339()),
        );
        let mut documents = self.documents.write().expect("document store poisoned");
        if document.id.is_empty() {
            document.id = format!("doc_{}", documents.len());
        }
        debug!("Document added: {}", document.id);
        documents.push(document);
    }

    /// Search the knowledge base.
    pub async fn search(&self, query: &str, top_k: Option<usize>) -> PluginResult<Vec<ScoredDocument>> {
        let top_k = top_k.unwrap_or(self.top_k);

        if let Some(backend) = &self.backend {
            match backend.search(query, top_k).await {
                Ok(hits) => return Ok(hits),
                Err(e) => {
                    warn!("Azure Search query failed, falling back to in-memory store: {e}");
                }
            }
        }

        Ok(self.retrieve_in_memory(query, top_k))
    }

    /// Keyword-overlap retrieval against the in-memory store.
    fn retrieve_in_memory(&self, query: &str, top_k: usize) -> Vec<ScoredDocument> {
        let query_words: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if query_words.is_empty() {
            return Vec::new();
        }

        let documents = self.documents.read().expect("document store poisoned");
        let mut scored: Vec<ScoredDocument> = documents
            .iter()
            .filter_map(|doc| {
                let content = doc.content.to_lowercase();
                let score = query_words.iter().filter(|w| content.contains(*w)).count();
                (score > 0).then(|| ScoredDocument {
                    document: doc.clone(),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.cmp(&a.score));
        scored.truncate(top_k);
        scored
    }

    /// Format retrieved documents into a context block.
    fn format_context(&self, hits: &[ScoredDocument]) -> String {
        hits.iter()
            .enumerate()
            .map(|(i, hit)| {
                let mut content = hit.document.content.clone();
                if content.len() > self.chunk_size {
                    let mut cut = self.chunk_size;
                    while !content.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    content.truncate(cut);
                    content.push_str("...");
                }
                format!("[Source {}: {}]\n{}\n", i + 1, hit.document.source(), content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Load .txt/.md/.json documents from a directory tree.
    fn load_knowledge_base(&self, root: &Path) -> usize {
        let mut loaded = 0;
        let mut stack = vec![root.to_path_buf()];

        while let Some(dir) = stack.pop() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Failed to read knowledge base directory {dir:?}: {e}");
                    continue;
                }
            };

            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                let supported = matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("txt") | Some("md") | Some("json")
                );
                if !supported {
                    continue;
                }
                match std::fs::read_to_string(&path) {
                    Ok(content) => {
                        let id = path
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_else(|| format!("doc_{loaded}"));
                        self.add_document(
                            Document::new(id, content).with_source(path.display().to_string()),
                        );
                        loaded += 1;
                    }
                    Err(e) => warn!("Failed to load document {path:?}: {e}"),
                }
            }
        }

        loaded
    }

    /// Store statistics for status endpoints.
    pub fn statistics(&self) -> serde_json::Value {
        serde_json::json!({
            "total_documents": self.documents.read().expect("document store poisoned").len(),
            "vector_store_type": self.vector_store_type,
            "embedding_model": self.embedding_model,
            "chunk_size": self.chunk_size,
            "top_k": self.top_k,
        })
    }
}

#[async_trait]
impl Plugin for RagPlugin {
    fn name(&self) -> &str {
        "rag_plugin"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn config(&self) -> &serde_json::Value {
        &self.config
    }

    fn initialize(&mut self, config: &serde_json::Value) -> PluginResult<()> {
        self.config = config.clone();

        if let Some(kind) = config.get("vector_store_type").and_then(|v| v.as_str()) {
            self.vector_store_type = kind.to_string();
        }
        if let Some(model) = config.get("embedding_model").and_then(|v| v.as_str()) {
            self.embedding_model = model.to_string();
        }
        if let Some(size) = config.get("chunk_size").and_then(|v| v.as_u64()) {
            self.chunk_size = size as usize;
        }
        if let Some(top_k) = config.get("top_k").and_then(|v| v.as_u64()) {
            self.top_k = top_k as usize;
        }
        self.knowledge_base_path = config
            .get("knowledge_base_path")
            .and_then(|v| v.as_str())
            .map(PathBuf::from);

        if self.vector_store_type == "azure_search" {
            let endpoint = config.get("endpoint").and_then(|v| v.as_str());
            let api_key = config.get("api_key").and_then(|v| v.as_str());
            let index = config.get("index").and_then(|v| v.as_str());

            match (endpoint, api_key, index) {
                (Some(endpoint), Some(api_key), Some(index)) => {
                    let client = reqwest::Client::builder()
                        .timeout(std::time::Duration::from_secs(10))
                        .build()
                        .map_err(|e| PluginError::Initialization(e.to_string()))?;
                    self.backend = Some(AzureSearchBackend {
                        endpoint: endpoint.to_string(),
                        api_key: api_key.to_string(),
                        index: index.to_string(),
                        client,
                    });
                }
                _ => {
                    warn!(
                        "azure_search vector store requested but endpoint/api_key/index \
                         incomplete, using in-memory store"
                    );
                    self.vector_store_type = "in_memory".to_string();
                }
            }
        }

        if let Some(path) = self.knowledge_base_path.clone() {
            if path.exists() {
                let loaded = self.load_knowledge_base(&path);
                info!("Loaded {loaded} documents from knowledge base");
            } else {
                warn!("Knowledge base path not found: {path:?}");
            }
        }

        info!(
            "RAG plugin initialized with {} vector store",
            self.vector_store_type
        );
        Ok(())
    }

    async fn process(&self, message: &PluginMessage) -> PluginResult<Option<PluginResponse>> {
        if !self.enabled || message.kind != "text" || message.content.is_empty() {
            return Ok(None);
        }

        let hits = self.search(&message.content, None).await?;
        if hits.is_empty() {
            return Ok(None);
        }

        let context = self.format_context(&hits);
        let sources: Vec<&str> = hits.iter().map(|h| h.document.source()).collect();

        let mut metadata = serde_json::Map::new();
        metadata.insert("plugin".to_string(), serde_json::json!(self.name()));
        metadata.insert("retrieved_docs".to_string(), serde_json::json!(hits.len()));
        metadata.insert("sources".to_string(), serde_json::json!(sources));

        Ok(Some(PluginResponse {
            content: context,
            metadata,
            is_final: false,
        }))
    }

    async fn cleanup(&mut self) -> PluginResult<()> {
        self.documents
            .write()
            .expect("document store poisoned")
            .clear();
        info!("RAG plugin cleaned up");
        Ok(())
    }
}
