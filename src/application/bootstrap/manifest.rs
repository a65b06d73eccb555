use serde::Serialize;

use crate::domain::types::EngineKind;

/// One pinned third-party resource an engine stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineResource {
    pub engine: EngineKind,
    pub name: &'static str,
    pub version: &'static str,
    pub script: Option<&'static str>,
    pub stylesheet: Option<&'static str>,
}

/// Fixed, versioned resource list. Not configurable at runtime.
pub const MANIFEST: &[EngineResource] = &[
    EngineResource {
        engine: EngineKind::Grammar,
        name: "marked",
        version: "latest",
        script: Some("https://cdn.jsdelivr.net/npm/marked/marked.min.js"),
        stylesheet: None,
    },
    EngineResource {
        engine: EngineKind::Typesetting,
        name: "katex",
        version: "0.16.9",
        script: Some("https://cdn.jsdelivr.net/npm/katex@0.16.9/dist/katex.min.js"),
        stylesheet: Some("https://cdn.jsdelivr.net/npm/katex@0.16.9/dist/katex.min.css"),
    },
    EngineResource {
        engine: EngineKind::Typesetting,
        name: "katex-auto-render",
        version: "0.16.9",
        script: Some("https://cdn.jsdelivr.net/npm/katex@0.16.9/dist/contrib/auto-render.min.js"),
        stylesheet: None,
    },
    EngineResource {
        engine: EngineKind::Highlighter,
        name: "highlight.js",
        version: "11.9.0",
        script: Some(
            "https://cdn.jsdelivr.net/gh/highlightjs/cdn-release@11.9.0/build/highlight.min.js",
        ),
        stylesheet: Some(
            "https://cdn.jsdelivr.net/gh/highlightjs/cdn-release@11.9.0/build/styles/atom-one-dark.min.css",
        ),
    },
    EngineResource {
        engine: EngineKind::Search,
        name: "fuse.js",
        version: "7.0.0",
        script: Some("https://cdn.jsdelivr.net/npm/fuse.js@7.0.0/dist/fuse.basic.min.js"),
        stylesheet: None,
    },
];

pub fn resources_for(engine: EngineKind) -> impl Iterator<Item = &'static EngineResource> {
    MANIFEST.iter().filter(move |resource| resource.engine == engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_engine_has_a_resource() {
        for kind in EngineKind::ALL {
            assert!(resources_for(kind).next().is_some(), "{kind:?}");
        }
    }

    #[test]
    fn typesetting_stylesheet_is_pinned() {
        let sheets: Vec<_> = resources_for(EngineKind::Typesetting)
            .filter_map(|resource| resource.stylesheet)
            .collect();
        assert_eq!(
            sheets,
            vec!["https://cdn.jsdelivr.net/npm/katex@0.16.9/dist/katex.min.css"]
        );
    }
}
