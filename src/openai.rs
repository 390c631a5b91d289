//! OpenAI-compatible wire types and conversation shaping.
//!
//! Only the non-streaming subset is served: `stream` is accepted and
//! ignored, and token usage is always reported as zero.

use serde::{Deserialize, Serialize};

/// Start of the citation block appended to RAG answers. Stripped from
/// assistant turns before they are replayed as context.
pub const CITATION_MARKER: &str = "\n\n---\n📚 **Fonti:**";

/// Number of earlier conversation lines carried into the query.
pub const HISTORY_WINDOW: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Echoed in the response; defaults to the configured RAG model id.
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl ChatCompletionResponse {
    pub fn new(model: String, content: String) -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!("chatcmpl-{}", &uuid[..8]),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model,
            choices: vec![ChatChoice {
                index: 0,
                message: ChatMessage::new("assistant", content),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

impl ModelsResponse {
    pub fn new(models: &[(&str, &str)]) -> Self {
        let created = chrono::Utc::now().timestamp();
        Self {
            object: "list".to_string(),
            data: models
                .iter()
                .map(|(id, owned_by)| ModelInfo {
                    id: id.to_string(),
                    object: "model".to_string(),
                    created,
                    owned_by: owned_by.to_string(),
                })
                .collect(),
        }
    }
}

/// The question and the earlier conversation it should be read against.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub question: String,
    /// Up to [`HISTORY_WINDOW`] `Utente: …` / `Assistente: …` lines.
    pub history: Vec<String>,
}

impl Conversation {
    /// Reads the conversation out of `messages`. `None` when there is no
    /// non-empty user message.
    pub fn from_messages(messages: &[ChatMessage]) -> Option<Self> {
        let mut question: Option<&str> = None;
        let mut lines = Vec::new();

        for msg in messages {
            match msg.role.as_str() {
                "user" => {
                    question = Some(&msg.content);
                    lines.push(format!("Utente: {}", msg.content));
                }
                "assistant" => lines.push(format!("Assistente: {}", strip_citations(&msg.content))),
                _ => {}
            }
        }

        let question = question.filter(|q| !q.is_empty())?;

        // The final line is the question itself
        lines.pop();
        let start = lines.len().saturating_sub(HISTORY_WINDOW);
        let history = lines.split_off(start);

        Some(Self {
            question: question.to_string(),
            history,
        })
    }

    /// Text sent to the retrieval engine.
    pub fn query_text(&self) -> String {
        if self.history.is_empty() {
            return self.question.clone();
        }
        format!(
            "Contesto della conversazione precedente:\n{}\n\nNuova domanda dell'utente: {}\n\nRispondi alla nuova domanda tenendo conto del contesto precedente.",
            self.history.join("\n"),
            self.question
        )
    }
}

pub fn strip_citations(content: &str) -> &str {
    match content.find(CITATION_MARKER) {
        Some(pos) => &content[..pos],
        None => content,
    }
}
