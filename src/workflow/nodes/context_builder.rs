use super::{NodeContext, WorkflowNode};
use crate::cache::{make_cache_key, CacheClient, DEFAULT_MAX_KEY_LENGTH};
use crate::memory::{MemoryManager, MessageRole, TranscriptMessage};
use crate::retrieval::HybridRetriever;
use crate::workflow::graph::NodeType;
use serde_json::{json, Map, Value};

const RETRIEVED_CONTEXT_SNIPPET_CHARS: usize = 240;
const RETRIEVED_CONTEXT_MAX_ITEMS: usize = 3;

/// Loads the recent transcript into the node context, optionally through
/// the context cache, and splices in one retrieved-context system
/// message when a retriever is wired. Every failure path leaves the
/// context unchanged; this node cannot fail the task.
pub struct ContextBuilderNode<'a> {
    memory: &'a MemoryManager,
    cache: Option<&'a CacheClient>,
    retriever: Option<&'a HybridRetriever>,
    window: usize,
    cache_ttl_seconds: u64,
}

impl<'a> ContextBuilderNode<'a> {
    pub fn new(memory: &'a MemoryManager, window: usize, cache_ttl_seconds: u64) -> Self {
        Self {
            memory,
            cache: None,
            retriever: None,
            window,
            cache_ttl_seconds,
        }
    }

    pub fn with_cache(mut self, cache: Option<&'a CacheClient>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_retriever(mut self, retriever: Option<&'a HybridRetriever>) -> Self {
        self.retriever = retriever;
        self
    }

    fn cache_key(&self, context: &NodeContext) -> Option<String> {
        let parts = Map::from_iter([
            (
                "task_id".to_string(),
                Value::String(context.task_id.clone()),
            ),
            ("turn".to_string(), json!(context.turn)),
        ]);
        make_cache_key("context", &parts, "v1", DEFAULT_MAX_KEY_LENGTH).ok()
    }

    fn load_from_cache(&self, key: &str) -> Option<Vec<TranscriptMessage>> {
        let cache = self.cache?;
        let entry = cache.get_json_categorized(key, "context")?;
        let messages = entry.get("messages")?.as_array()?;
        let mut out = Vec::new();
        for item in messages {
            let role = match item.get("role").and_then(Value::as_str) {
                Some("user") => MessageRole::User,
                Some("assistant") => MessageRole::Assistant,
                Some("system") => MessageRole::System,
                _ => return None,
            };
            let content = item.get("content").and_then(Value::as_str)?;
            out.push(TranscriptMessage {
                role,
                content: content.to_string(),
            });
        }
        Some(out)
    }

    fn store_in_cache(&self, key: &str, messages: &[TranscriptMessage]) {
        let Some(cache) = self.cache else {
            return;
        };
        let encoded = messages
            .iter()
            .map(|message| {
                json!({
                    "role": message.role.as_str(),
                    "content": message.content,
                })
            })
            .collect::<Vec<_>>();
        let _ = cache.set_json(
            key,
            &json!({ "messages": encoded }),
            Some(self.cache_ttl_seconds),
        );
    }

    fn retrieved_context_message(&self, context: &NodeContext) -> Option<TranscriptMessage> {
        let retriever = self.retriever?;
        let query = context.user_input.trim();
        if query.is_empty() {
            return None;
        }
        let results = retriever.retrieve(query, Some(&context.task_id)).ok()?;
        if results.is_empty() {
            return None;
        }

        let mut lines = vec!["Retrieved Context:".to_string()];
        for result in results.iter().take(RETRIEVED_CONTEXT_MAX_ITEMS) {
            let snippet = truncate_chars(&result.content, RETRIEVED_CONTEXT_SNIPPET_CHARS);
            lines.push(format!(
                "[{}] score={:.3}\n{snippet}",
                result.source.as_str(),
                result.final_score
            ));
        }
        Some(TranscriptMessage {
            role: MessageRole::System,
            content: lines.join("\n"),
        })
    }
}

impl WorkflowNode for ContextBuilderNode<'_> {
    fn node_type(&self) -> NodeType {
        NodeType::ContextBuilder
    }

    fn execute(&self, mut context: NodeContext) -> NodeContext {
        let cache_key = self.cache_key(&context);

        let messages = cache_key
            .as_deref()
            .and_then(|key| self.load_from_cache(key))
            .or_else(|| {
                let loaded = self
                    .memory
                    .working
                    .list_recent_messages(&context.task_id, self.window)
                    .ok()?;
                if let Some(key) = cache_key.as_deref() {
                    self.store_in_cache(key, &loaded);
                }
                Some(loaded)
            });

        if let Some(messages) = messages {
            context.messages = messages;
        }

        if let Some(retrieved) = self.retrieved_context_message(&context) {
            let insert_at = context
                .messages
                .iter()
                .position(|message| message.role == MessageRole::System)
                .map(|index| index + 1)
                .unwrap_or(0);
            context.messages.insert(insert_at, retrieved);
        }

        context
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let truncated = text.chars().take(limit).collect::<String>();
    format!("{truncated} ...")
}
