use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task;

use crate::{
    application::{
        render::{KatexTypesetter, MarkdownGrammar, SyntaxHighlighter, Typesetter},
        search::FuzzySearch,
    },
    domain::types::EngineKind,
};

use super::state::Engine;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("failed to load `{engine}` engine: {message}")]
    Load {
        engine: &'static str,
        message: String,
    },
    #[error("`{engine}` loader task aborted: {message}")]
    Aborted {
        engine: &'static str,
        message: String,
    },
}

impl BootstrapError {
    pub fn load(kind: EngineKind, message: impl Into<String>) -> Self {
        Self::Load {
            engine: kind.as_str(),
            message: message.into(),
        }
    }

    fn aborted(kind: EngineKind, err: task::JoinError) -> Self {
        Self::Aborted {
            engine: kind.as_str(),
            message: err.to_string(),
        }
    }
}

/// Where engines come from. Each call loads one engine; failures stay local
/// to that engine.
#[async_trait]
pub trait EngineSource: Send + Sync {
    async fn load(&self, kind: EngineKind) -> Result<Engine, BootstrapError>;
}

/// Engines compiled into the binary. CPU-bound initialisation runs on the
/// blocking pool.
#[derive(Debug, Clone)]
pub struct BundledEngines {
    highlight_theme: String,
}

impl BundledEngines {
    pub fn new(highlight_theme: impl Into<String>) -> Self {
        Self {
            highlight_theme: highlight_theme.into(),
        }
    }
}

#[async_trait]
impl EngineSource for BundledEngines {
    async fn load(&self, kind: EngineKind) -> Result<Engine, BootstrapError> {
        match kind {
            EngineKind::Grammar => Ok(Engine::Grammar(MarkdownGrammar::configure())),
            EngineKind::Typesetting => {
                // A trial render proves the embedded JavaScript engine starts.
                task::spawn_blocking(|| KatexTypesetter.typeset("x", false))
                    .await
                    .map_err(|err| BootstrapError::aborted(kind, err))?
                    .map_err(|err| BootstrapError::load(kind, err.to_string()))?;
                Ok(Engine::Typesetting(Arc::new(KatexTypesetter)))
            }
            EngineKind::Highlighter => {
                let theme = self.highlight_theme.clone();
                let highlighter = task::spawn_blocking(move || SyntaxHighlighter::load(&theme))
                    .await
                    .map_err(|err| BootstrapError::aborted(kind, err))?
                    .map_err(|err| BootstrapError::load(kind, err.to_string()))?;
                Ok(Engine::Highlighter(highlighter))
            }
            EngineKind::Search => Ok(Engine::Search(FuzzySearch::new())),
        }
    }
}
