//! Asynchronous loading of the optional engines. The grammar loads first;
//! typesetting, highlighting and search follow in parallel. Nothing here
//! ever fails outward: an engine that cannot load simply stays unavailable.

mod manifest;
mod source;
mod state;

use std::sync::{Arc, Mutex, PoisonError};

use metrics::counter;
use tracing::{info, warn};

use crate::{
    application::render::MarkdownGrammar,
    domain::types::{EngineKind, EngineStatus},
};

pub use manifest::{EngineResource, MANIFEST, resources_for};
pub use source::{BootstrapError, BundledEngines, EngineSource};
pub use state::{DependencyState, Engine};

pub const METRIC_ENGINE_LOAD_FAILURES: &str = "sandmark_engine_load_failures_total";

type CompletionHook = Box<dyn FnOnce(&DependencyState) + Send>;

enum Completion {
    Pending(Vec<CompletionHook>),
    Done,
}

pub struct DependencyBootstrap {
    state: Arc<DependencyState>,
    source: Arc<dyn EngineSource>,
    loaded: tokio::sync::OnceCell<()>,
    completion: Mutex<Completion>,
}

impl DependencyBootstrap {
    pub fn new(state: Arc<DependencyState>, source: Arc<dyn EngineSource>) -> Self {
        Self {
            state,
            source,
            loaded: tokio::sync::OnceCell::new(),
            completion: Mutex::new(Completion::Pending(Vec::new())),
        }
    }

    pub fn state(&self) -> &Arc<DependencyState> {
        &self.state
    }

    /// Load every engine once. Concurrent and repeated calls wait for the
    /// same single pass.
    pub async fn load(&self) {
        self.loaded.get_or_init(|| self.load_all()).await;
    }

    pub fn is_complete(&self) -> bool {
        self.loaded.initialized()
    }

    /// Register a hook to run once every load has settled. A hook registered
    /// after that point runs immediately.
    pub fn on_complete(&self, hook: impl FnOnce(&DependencyState) + Send + 'static) {
        let mut completion = self
            .completion
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Completion::Pending(hooks) = &mut *completion {
            hooks.push(Box::new(hook));
            return;
        }
        drop(completion);
        hook(&self.state);
    }

    /// Stylesheets for the engines that are ready: the pinned typesetting
    /// stylesheet URL and the generated highlight theme CSS.
    pub fn stylesheets(&self) -> Vec<String> {
        let mut sheets = Vec::new();
        if self.state.is_ready(EngineKind::Typesetting) {
            sheets.extend(
                resources_for(EngineKind::Typesetting)
                    .filter_map(|resource| resource.stylesheet)
                    .map(str::to_owned),
            );
        }
        if let Some(highlighter) = self.state.highlighter() {
            sheets.push(highlighter.stylesheet().to_owned());
        }
        sheets
    }

    async fn load_all(&self) {
        if self.load_engine(EngineKind::Grammar).await {
            // The grammar handle is write-once, so re-applying configuration
            // leaves the installed one in place.
            self.state.install(Engine::Grammar(MarkdownGrammar::configure()));
            info!(target = "application::bootstrap", "markdown grammar configured");
        }

        let (typesetting, highlighter, search) = tokio::join!(
            self.load_engine(EngineKind::Typesetting),
            self.load_engine(EngineKind::Highlighter),
            self.load_engine(EngineKind::Search),
        );
        info!(
            target = "application::bootstrap",
            typesetting,
            highlighter,
            search,
            "lazy dependencies settled"
        );

        self.complete();
    }

    async fn load_engine(&self, kind: EngineKind) -> bool {
        self.state.advance(kind, EngineStatus::Loading);
        match self.source.load(kind).await {
            Ok(engine) if engine.kind() == kind => {
                self.state.install(engine);
                true
            }
            Ok(engine) => {
                self.fail(kind, &format!("source returned a `{}` engine", engine.kind().as_str()));
                false
            }
            Err(err) => {
                self.fail(kind, &err.to_string());
                false
            }
        }
    }

    fn fail(&self, kind: EngineKind, reason: &str) {
        self.state.advance(kind, EngineStatus::Failed);
        counter!(METRIC_ENGINE_LOAD_FAILURES, "engine" => kind.as_str()).increment(1);
        warn!(
            target = "application::bootstrap",
            engine = kind.as_str(),
            error = reason,
            "deferred engine load failed"
        );
    }

    fn complete(&self) {
        let hooks = {
            let mut completion = self
                .completion
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match std::mem::replace(&mut *completion, Completion::Done) {
                Completion::Pending(hooks) => hooks,
                Completion::Done => Vec::new(),
            }
        };
        for hook in hooks {
            hook(&self.state);
        }
    }
}
