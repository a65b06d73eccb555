//! Wire format of the cross-context rendering protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ACTION_RENDER: &str = "RENDER";
pub const ACTION_RENDER_RESULT: &str = "RENDER_RESULT";
pub const ACTION_SEARCH: &str = "SEARCH";
pub const ACTION_SEARCH_RESULT: &str = "SEARCH_RESULT";

/// The `reqId` of a raw message, `null` when absent.
pub fn req_id_of(data: &Value) -> Value {
    data.get("reqId").cloned().unwrap_or(Value::Null)
}

/// Raw text to render. `reqId` is caller-assigned and echoed verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(rename = "reqId", default)]
    pub req_id: Value,
}

impl RenderRequest {
    pub fn new(text: impl Into<String>, req_id: impl Into<Value>) -> Self {
        Self {
            text: Some(text.into()),
            req_id: req_id.into(),
        }
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderReply {
    pub html: String,
    #[serde(rename = "reqId", default)]
    pub req_id: Value,
}

impl RenderReply {
    /// Reply carrying the request's text untouched.
    pub fn passthrough(request: &RenderRequest) -> Self {
        Self {
            html: request.text().to_string(),
            req_id: request.req_id.clone(),
        }
    }

    /// Reply to a RENDER message whose fields did not decode: its `text`
    /// echoed as a string, or empty.
    pub fn echo_raw(data: &Value) -> Self {
        let html = match data.get("text") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
        };
        Self {
            html,
            req_id: req_id_of(data),
        }
    }
}

/// Fuzzy query over the documents rendered so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(rename = "reqId", default)]
    pub req_id: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Position of the document among those currently indexed.
    pub index: usize,
    pub score: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchReply {
    pub hits: Vec<SearchHit>,
    #[serde(rename = "reqId", default)]
    pub req_id: Value,
}

/// Messages exchanged over the channel, tagged by their `action` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum ChannelMessage {
    #[serde(rename = "RENDER")]
    Render(RenderRequest),
    #[serde(rename = "RENDER_RESULT")]
    RenderResult(RenderReply),
    #[serde(rename = "SEARCH")]
    Search(SearchRequest),
    #[serde(rename = "SEARCH_RESULT")]
    SearchResult(SearchReply),
}

impl ChannelMessage {
    pub fn action(&self) -> &'static str {
        match self {
            ChannelMessage::Render(_) => ACTION_RENDER,
            ChannelMessage::RenderResult(_) => ACTION_RENDER_RESULT,
            ChannelMessage::Search(_) => ACTION_SEARCH,
            ChannelMessage::SearchResult(_) => ACTION_SEARCH_RESULT,
        }
    }
}
