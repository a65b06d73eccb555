//! Shared domain enumerations for protected regions and optional engines.

use serde::{Deserialize, Serialize};

/// Whether a math region renders on its own block or within running text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MathKind {
    Display,
    Inline,
}

impl MathKind {
    /// Delimiter understood by the typesetting engine's auto-render convention.
    pub fn delimiter(self) -> &'static str {
        match self {
            MathKind::Display => "$$",
            MathKind::Inline => "$",
        }
    }
}

/// Optional third-party engines that load after the context starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Grammar,
    Typesetting,
    Highlighter,
    Search,
}

impl EngineKind {
    pub const ALL: [EngineKind; 4] = [
        EngineKind::Grammar,
        EngineKind::Typesetting,
        EngineKind::Highlighter,
        EngineKind::Search,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EngineKind::Grammar => "grammar",
            EngineKind::Typesetting => "typesetting",
            EngineKind::Highlighter => "highlighter",
            EngineKind::Search => "search",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            EngineKind::Grammar => 0,
            EngineKind::Typesetting => 1,
            EngineKind::Highlighter => 2,
            EngineKind::Search => 3,
        }
    }
}

/// Loading status of a single engine. Transitions only move forward:
/// `NotLoaded → Loading → Ready | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    NotLoaded,
    Loading,
    Ready,
    Failed,
}

impl EngineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineStatus::NotLoaded => "NotLoaded",
            EngineStatus::Loading => "Loading",
            EngineStatus::Ready => "Ready",
            EngineStatus::Failed => "Failed",
        }
    }

    /// Settled statuses never change again.
    pub fn is_settled(self) -> bool {
        matches!(self, EngineStatus::Ready | EngineStatus::Failed)
    }

    pub(crate) fn can_advance_to(self, next: EngineStatus) -> bool {
        matches!(
            (self, next),
            (EngineStatus::NotLoaded, EngineStatus::Loading)
                | (EngineStatus::NotLoaded, EngineStatus::Ready)
                | (EngineStatus::NotLoaded, EngineStatus::Failed)
                | (EngineStatus::Loading, EngineStatus::Ready)
                | (EngineStatus::Loading, EngineStatus::Failed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_status_only_moves_forward() {
        assert!(EngineStatus::NotLoaded.can_advance_to(EngineStatus::Loading));
        assert!(EngineStatus::Loading.can_advance_to(EngineStatus::Ready));
        assert!(EngineStatus::Loading.can_advance_to(EngineStatus::Failed));
        assert!(!EngineStatus::Ready.can_advance_to(EngineStatus::Loading));
        assert!(!EngineStatus::Failed.can_advance_to(EngineStatus::Ready));
        assert!(!EngineStatus::Ready.can_advance_to(EngineStatus::Ready));
    }

    #[test]
    fn engine_indices_are_distinct() {
        let mut seen = [false; 4];
        for kind in EngineKind::ALL {
            assert!(!seen[kind.index()]);
            seen[kind.index()] = true;
        }
    }
}
