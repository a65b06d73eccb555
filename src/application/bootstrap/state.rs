use std::sync::Arc;

use once_cell::sync::OnceCell;
use tokio::sync::watch;

use crate::{
    application::{
        render::{MarkdownGrammar, SyntaxHighlighter, Typesetter},
        search::FuzzySearch,
    },
    domain::types::{EngineKind, EngineStatus},
};

/// A loaded engine, ready to be installed into [`DependencyState`].
pub enum Engine {
    Grammar(MarkdownGrammar),
    Typesetting(Arc<dyn Typesetter>),
    Highlighter(SyntaxHighlighter),
    Search(FuzzySearch),
}

impl Engine {
    pub fn kind(&self) -> EngineKind {
        match self {
            Engine::Grammar(_) => EngineKind::Grammar,
            Engine::Typesetting(_) => EngineKind::Typesetting,
            Engine::Highlighter(_) => EngineKind::Highlighter,
            Engine::Search(_) => EngineKind::Search,
        }
    }
}

/// Which optional engines are usable right now. Statuses only move forward
/// and are published through a watch channel per engine; engine handles are
/// write-once and only handed out once their status reads `Ready`.
pub struct DependencyState {
    statuses: [watch::Sender<EngineStatus>; 4],
    grammar: OnceCell<MarkdownGrammar>,
    typesetter: OnceCell<Arc<dyn Typesetter>>,
    highlighter: OnceCell<SyntaxHighlighter>,
    search: OnceCell<FuzzySearch>,
}

impl Default for DependencyState {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyState {
    pub fn new() -> Self {
        Self {
            statuses: std::array::from_fn(|_| watch::channel(EngineStatus::NotLoaded).0),
            grammar: OnceCell::new(),
            typesetter: OnceCell::new(),
            highlighter: OnceCell::new(),
            search: OnceCell::new(),
        }
    }

    /// State with the given engines already installed.
    pub fn preloaded(engines: impl IntoIterator<Item = Engine>) -> Self {
        let state = Self::new();
        for engine in engines {
            state.install(engine);
        }
        state
    }

    pub fn status(&self, kind: EngineKind) -> EngineStatus {
        *self.statuses[kind.index()].borrow()
    }

    pub fn is_ready(&self, kind: EngineKind) -> bool {
        self.status(kind) == EngineStatus::Ready
    }

    pub fn subscribe(&self, kind: EngineKind) -> watch::Receiver<EngineStatus> {
        self.statuses[kind.index()].subscribe()
    }

    /// Wait until `kind` reaches `Ready` or `Failed`, returning that status.
    pub async fn wait_settled(&self, kind: EngineKind) -> EngineStatus {
        let mut receiver = self.subscribe(kind);
        match receiver.wait_for(|status| status.is_settled()).await {
            Ok(status) => *status,
            Err(_) => self.status(kind),
        }
    }

    /// Move `kind` to `next` if that is a forward transition. Returns whether
    /// the status changed.
    pub(crate) fn advance(&self, kind: EngineKind, next: EngineStatus) -> bool {
        self.statuses[kind.index()].send_if_modified(|status| {
            if status.can_advance_to(next) {
                *status = next;
                true
            } else {
                false
            }
        })
    }

    /// Install a loaded engine and mark it `Ready`. Installing the same kind
    /// twice keeps the first engine.
    pub(crate) fn install(&self, engine: Engine) -> bool {
        let kind = engine.kind();
        let stored = match engine {
            Engine::Grammar(grammar) => self.grammar.set(grammar).is_ok(),
            Engine::Typesetting(typesetter) => self.typesetter.set(typesetter).is_ok(),
            Engine::Highlighter(highlighter) => self.highlighter.set(highlighter).is_ok(),
            Engine::Search(search) => self.search.set(search).is_ok(),
        };
        self.advance(kind, EngineStatus::Ready);
        stored
    }

    pub fn grammar(&self) -> Option<&MarkdownGrammar> {
        self.ready_then(EngineKind::Grammar, &self.grammar)
    }

    pub fn typesetter(&self) -> Option<&dyn Typesetter> {
        self.ready_then(EngineKind::Typesetting, &self.typesetter)
            .map(|typesetter| typesetter.as_ref())
    }

    pub fn highlighter(&self) -> Option<&SyntaxHighlighter> {
        self.ready_then(EngineKind::Highlighter, &self.highlighter)
    }

    pub fn search(&self) -> Option<&FuzzySearch> {
        self.ready_then(EngineKind::Search, &self.search)
    }

    fn ready_then<'a, T>(&self, kind: EngineKind, cell: &'a OnceCell<T>) -> Option<&'a T> {
        if self.is_ready(kind) { cell.get() } else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_has_nothing_loaded() {
        let state = DependencyState::new();
        for kind in EngineKind::ALL {
            assert_eq!(state.status(kind), EngineStatus::NotLoaded);
        }
        assert!(state.grammar().is_none());
    }

    #[test]
    fn statuses_never_move_backwards() {
        let state = DependencyState::new();
        assert!(state.advance(EngineKind::Search, EngineStatus::Loading));
        assert!(state.advance(EngineKind::Search, EngineStatus::Failed));
        assert!(!state.advance(EngineKind::Search, EngineStatus::Ready));
        assert!(!state.advance(EngineKind::Search, EngineStatus::Loading));
        assert_eq!(state.status(EngineKind::Search), EngineStatus::Failed);
        assert!(state.search().is_none());
    }

    #[test]
    fn installed_engine_is_ready_and_first_install_wins() {
        let state = DependencyState::new();
        assert!(state.install(Engine::Search(FuzzySearch::with_documents(["first"]))));
        assert!(!state.install(Engine::Search(FuzzySearch::with_documents(["second"]))));

        assert!(state.is_ready(EngineKind::Search));
        let search = state.search().expect("search is ready");
        assert_eq!(search.documents(), ["first".to_string()]);
    }

    #[tokio::test]
    async fn wait_settled_observes_later_transition() {
        let state = Arc::new(DependencyState::new());
        state.advance(EngineKind::Grammar, EngineStatus::Loading);

        let waiter = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.wait_settled(EngineKind::Grammar).await })
        };
        state.install(Engine::Grammar(MarkdownGrammar::configure()));

        let settled = waiter.await.expect("waiter joins");
        assert_eq!(settled, EngineStatus::Ready);
    }
}
