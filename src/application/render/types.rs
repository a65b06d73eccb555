use thiserror::Error;

/// Structured errors surfaced by the rendering stages. The channel boundary
/// turns every one of them into a passthrough reply.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("markdown rendering failed: {message}")]
    Markdown { message: String },
    #[error("syntax highlighting failed: {language}: {message}")]
    Highlighting { language: String, message: String },
    #[error("required engine `{engine}` is not ready")]
    EngineUnavailable { engine: &'static str },
    #[error("document processing failed: {message}")]
    Document { message: String },
}

impl RenderError {
    pub fn markdown(message: impl Into<String>) -> Self {
        Self::Markdown {
            message: message.into(),
        }
    }

    pub fn document(message: impl Into<String>) -> Self {
        Self::Document {
            message: message.into(),
        }
    }
}

/// Trait exposed by the rendering pipelines. Implementations are pure given
/// the engines they were handed: the same text yields the same HTML.
pub trait RenderService: Send + Sync {
    fn render(&self, text: &str) -> Result<String, RenderError>;
}
