/// MCP tool handlers.
///
/// 1. answer           – retrieve context and generate a grounded answer
/// 2. retrieve         – ranked chunks for a query, without generation
/// 3. list_collections – collections in the store with their embedders
use crate::db::MetadataFilter;
use crate::error::RagError;
use crate::mcp::server::McpContext;
use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, handler::server::tool::ToolRouter, model::*, tool, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

// ── Parameter structs ────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct AnswerParams {
    /// Question in natural language
    question: String,
    /// Optional metadata filter, e.g. {"gte": {"key": "cores", "value": 8}}
    filter: Option<serde_json::Value>,
}

#[derive(Deserialize, JsonSchema)]
struct RetrieveParams {
    /// Search query (natural language)
    query: String,
    /// Max results (default: retrieval.top_k from the configuration)
    top_k: Option<usize>,
    /// Optional metadata filter, e.g. {"eq": {"key": "brand_name", "value": "AMD"}}
    filter: Option<serde_json::Value>,
}

// ── Response helpers ─────────────────────────────────────────────────

fn json_result(value: serde_json::Value) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&value).unwrap_or_default(),
    )]))
}

fn error_result(msg: &str) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg.to_string())]))
}

/// Caller mistakes become tool errors the model can read; everything else
/// is an internal error.
fn rag_error(context: &str, err: RagError) -> Result<CallToolResult, McpError> {
    match err {
        RagError::InvalidConfig(_)
        | RagError::EmptyInput(_)
        | RagError::CollectionNotFound(_) => error_result(&err.to_string()),
        other => Err(McpError::internal_error(format!("{context}: {other}"), None)),
    }
}

fn parse_filter(raw: Option<serde_json::Value>) -> Result<Option<MetadataFilter>, RagError> {
    raw.map(|v| {
        serde_json::from_value(v)
            .map_err(|e| RagError::InvalidConfig(format!("invalid metadata filter: {e}")))
    })
    .transpose()
}

// ── Tool implementations ─────────────────────────────────────────────

#[derive(Clone)]
pub struct AppTools {
    pub ctx: McpContext,
    pub tool_router: ToolRouter<Self>,
}

impl ServerHandler for AppTools {}

#[tool_router]
impl AppTools {
    pub fn new(ctx: McpContext) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Answer a question about hardware components from the indexed documents. Returns the answer, the exact sources used and whether any context was found."
    )]
    async fn answer(&self, params: Parameters<AnswerParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        match answer_json(&self.ctx, &p.question, p.filter).await {
            Ok(v) => json_result(v),
            Err(e) => rag_error("answer failed", e),
        }
    }

    #[tool(description = "Natural language vector search over the indexed documents, with optional metadata filter")]
    async fn retrieve(
        &self,
        params: Parameters<RetrieveParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        match retrieve_json(&self.ctx, &p.query, p.top_k, p.filter).await {
            Ok(v) => json_result(v),
            Err(e) => rag_error("retrieval failed", e),
        }
    }

    #[tool(description = "List the collections in the vector store with dimensions, embedding model and entry count")]
    async fn list_collections(&self) -> Result<CallToolResult, McpError> {
        match collections_json(&self.ctx).await {
            Ok(v) => json_result(v),
            Err(e) => rag_error("listing collections failed", e),
        }
    }
}

// ── Helper functions ─────────────────────────────────────────────────

async fn answer_json(
    ctx: &McpContext,
    question: &str,
    filter: Option<serde_json::Value>,
) -> Result<serde_json::Value, RagError> {
    let filter = parse_filter(filter)?;
    let answer = ctx
        .composer
        .answer_with(question, filter.as_ref(), &CancellationToken::new())
        .await?;
    Ok(serde_json::to_value(answer)?)
}

async fn retrieve_json(
    ctx: &McpContext,
    query: &str,
    top_k: Option<usize>,
    filter: Option<serde_json::Value>,
) -> Result<serde_json::Value, RagError> {
    let filter = parse_filter(filter)?;
    let k = top_k.unwrap_or(ctx.config.retrieval.top_k);
    let result = ctx
        .composer
        .retriever()
        .retrieve(query, k, filter.as_ref(), &CancellationToken::new())
        .await?;
    Ok(serde_json::json!({ "results": result.hits }))
}

async fn collections_json(ctx: &McpContext) -> Result<serde_json::Value, RagError> {
    let index = ctx.composer.retriever().index().lock().await;
    let collections = index.db().list_collections()?;
    Ok(serde_json::json!({ "collections": collections }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RetryPolicy;
    use crate::composer::AnswerComposer;
    use crate::config::Config;
    use crate::db::{Db, IndexEntry, OpenMode, VectorIndex};
    use crate::document::{Metadata, MetadataValue};
    use crate::embedder::Embedder;
    use crate::embedder::mock::MockEmbedder;
    use crate::generator::mock::MockGenerator;
    use crate::retriever::Retriever;
    use std::sync::Arc;
    use tokio::sync::Mutex as TokioMutex;

    fn ctx() -> McpContext {
        let embedder = MockEmbedder::new(8);
        let db = Db::open_in_memory().unwrap();
        let mut index = VectorIndex::open(db, "cpu_docs", OpenMode::Ingest, 8, "mock").unwrap();
        let mut metadata = Metadata::new();
        metadata.insert("cores".into(), MetadataValue::Integer(16));
        index
            .add(&[IndexEntry {
                chunk_id: "cpus.csv:row0#00000".into(),
                source_id: "cpus.csv:row0".into(),
                text: "The cores is 16.".into(),
                metadata,
                embedding: embedder.embed("The cores is 16.").unwrap(),
            }])
            .unwrap();

        let policy = RetryPolicy::default();
        let index = Arc::new(TokioMutex::new(index));
        let retriever = Retriever::new(index, Arc::new(embedder), policy);
        let composer =
            AnswerComposer::new(retriever, Arc::new(MockGenerator), 3, 4000, policy).unwrap();
        McpContext {
            composer: Arc::new(composer),
            config: Arc::new(Config::default()),
        }
    }

    #[tokio::test]
    async fn test_answer_json_shape() {
        let ctx = ctx();
        let v = answer_json(&ctx, "How many cores?", None).await.unwrap();
        assert_eq!(v["grounded"], true);
        assert_eq!(v["sources"][0]["chunk_id"], "cpus.csv:row0#00000");
        assert_eq!(v["sources"][0]["metadata"]["cores"], 16);
        assert_eq!(v["result"], "Answer composed from 1 context section(s).");
    }

    #[tokio::test]
    async fn test_retrieve_json_with_filter() {
        let ctx = ctx();
        let filter = serde_json::json!({"gte": {"key": "cores", "value": 32}});
        let v = retrieve_json(&ctx, "cores", Some(5), Some(filter)).await.unwrap();
        assert_eq!(v["results"].as_array().unwrap().len(), 0);

        let bad = serde_json::json!({"like": "x"});
        let err = retrieve_json(&ctx, "cores", None, Some(bad)).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_collections_json() {
        let ctx = ctx();
        let v = collections_json(&ctx).await.unwrap();
        assert_eq!(v["collections"][0]["name"], "cpu_docs");
        assert_eq!(v["collections"][0]["entries"], 1);
        assert_eq!(v["collections"][0]["embedding_model"], "mock");
    }
}
