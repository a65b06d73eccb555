use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use metrics::counter;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    application::{
        bootstrap::DependencyState,
        render::{RenderService, SandboxRenderer},
    },
    domain::{
        messages::{
            ACTION_RENDER, ACTION_SEARCH, ChannelMessage, RenderReply, RenderRequest,
            SearchReply, SearchRequest, req_id_of,
        },
        types::EngineKind,
    },
};

use super::ChannelError;

pub const METRIC_FALLBACK_REPLIES: &str = "sandmark_fallback_replies_total";

/// Readiness of the channel, derived from the grammar engine. Once `Ready`
/// it never goes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    AwaitingDependencies,
    Ready,
}

/// Where replies to one sender go.
#[derive(Debug, Clone)]
pub struct ReplyPort {
    tx: mpsc::UnboundedSender<Value>,
}

impl ReplyPort {
    pub fn new(tx: mpsc::UnboundedSender<Value>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn post(&self, message: &ChannelMessage) -> Result<(), ChannelError> {
        let value = serde_json::to_value(message).map_err(ChannelError::encode)?;
        self.tx.send(value).map_err(|_| ChannelError::ReplyClosed)
    }
}

/// One inbound message together with its sender's origin and reply port.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub origin: Option<String>,
    pub data: Value,
    pub reply: ReplyPort,
}

impl Envelope {
    pub fn new(data: Value, reply: ReplyPort) -> Self {
        Self {
            origin: None,
            data,
            reply,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

type Handler = fn(&SandboxChannel, Value) -> Result<Option<ChannelMessage>, ChannelError>;

/// Receiver side of the cross-context rendering protocol. Every RENDER
/// request gets exactly one RENDER_RESULT reply and every SEARCH request
/// one SEARCH_RESULT, whatever happens while handling it.
pub struct SandboxChannel {
    deps: Arc<DependencyState>,
    renderer: Arc<dyn RenderService>,
    allowed_origins: Option<HashSet<String>>,
    handlers: HashMap<&'static str, Handler>,
}

impl SandboxChannel {
    pub fn new(deps: Arc<DependencyState>) -> Self {
        let renderer = Arc::new(SandboxRenderer::new(Arc::clone(&deps)));
        Self::with_renderer(deps, renderer)
    }

    pub fn with_renderer(deps: Arc<DependencyState>, renderer: Arc<dyn RenderService>) -> Self {
        let mut handlers: HashMap<&'static str, Handler> = HashMap::new();
        handlers.insert(ACTION_RENDER, handle_render);
        handlers.insert(ACTION_SEARCH, handle_search);

        Self {
            deps,
            renderer,
            allowed_origins: None,
            handlers,
        }
    }

    /// Only accept messages from these origins. An empty list keeps the
    /// channel open to every sender.
    pub fn with_allowed_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let origins: HashSet<String> = origins.into_iter().map(Into::into).collect();
        self.allowed_origins = (!origins.is_empty()).then_some(origins);
        self
    }

    pub fn state(&self) -> ChannelState {
        if self.deps.is_ready(EngineKind::Grammar) {
            ChannelState::Ready
        } else {
            ChannelState::AwaitingDependencies
        }
    }

    /// Dispatch one message and post its reply, if any.
    pub fn handle(&self, envelope: Envelope) -> Result<(), ChannelError> {
        self.check_origin(envelope.origin.as_deref())?;

        let action = envelope
            .data
            .get("action")
            .and_then(Value::as_str)
            .ok_or(ChannelError::MissingAction)?;
        let handler = self
            .handlers
            .get(action)
            .ok_or_else(|| ChannelError::UnknownAction {
                action: action.to_string(),
            })?;

        if let Some(reply) = handler(self, envelope.data)? {
            envelope.reply.post(&reply)?;
        }
        Ok(())
    }

    /// Handle envelopes one at a time, in arrival order, until every sender
    /// is gone.
    pub async fn run(&self, mut inbox: mpsc::Receiver<Envelope>) {
        info!(target = "application::sandbox", "sandbox channel listening");
        while let Some(envelope) = inbox.recv().await {
            if let Err(err) = self.handle(envelope) {
                match err {
                    ChannelError::UnknownAction { .. } | ChannelError::MissingAction => {
                        debug!(target = "application::sandbox", error = %err, "message ignored");
                    }
                    _ => warn!(target = "application::sandbox", error = %err, "message dropped"),
                }
            }
        }
        info!(target = "application::sandbox", "sandbox channel closed");
    }

    fn check_origin(&self, origin: Option<&str>) -> Result<(), ChannelError> {
        let Some(allowed) = &self.allowed_origins else {
            return Ok(());
        };
        match origin {
            Some(origin) if allowed.contains(origin) => Ok(()),
            other => Err(ChannelError::OriginRejected {
                origin: other.unwrap_or("<none>").to_string(),
            }),
        }
    }

    /// Index the text for SEARCH once the search engine is ready.
    fn record(&self, request: &RenderRequest) {
        let Some(search) = self.deps.search() else {
            return;
        };
        if !request.text().is_empty() {
            search.index(request.text());
        }
    }

    fn search_reply(&self, request: &SearchRequest) -> SearchReply {
        let hits = match self.deps.search() {
            Some(search) => search.search(&request.query),
            None => {
                debug!(
                    target = "application::sandbox",
                    "search engine not ready; no hits"
                );
                Vec::new()
            }
        };
        SearchReply {
            hits,
            req_id: request.req_id.clone(),
        }
    }

    fn render_reply(&self, request: &RenderRequest) -> RenderReply {
        if self.state() == ChannelState::AwaitingDependencies {
            counter!(METRIC_FALLBACK_REPLIES, "reason" => "not_ready").increment(1);
            debug!(
                target = "application::sandbox",
                "grammar not ready; echoing text"
            );
            return RenderReply::passthrough(request);
        }

        match self.renderer.render(request.text()) {
            Ok(html) => RenderReply {
                html,
                req_id: request.req_id.clone(),
            },
            Err(err) => {
                counter!(METRIC_FALLBACK_REPLIES, "reason" => "render_error").increment(1);
                error!(
                    target = "application::sandbox",
                    error = %err,
                    "render failed; echoing text"
                );
                RenderReply::passthrough(request)
            }
        }
    }
}

fn handle_render(
    channel: &SandboxChannel,
    data: Value,
) -> Result<Option<ChannelMessage>, ChannelError> {
    let request = match RenderRequest::deserialize(&data) {
        Ok(request) => request,
        Err(err) => {
            counter!(METRIC_FALLBACK_REPLIES, "reason" => "malformed").increment(1);
            warn!(
                target = "application::sandbox",
                error = %err,
                "malformed render request; echoing text"
            );
            return Ok(Some(ChannelMessage::RenderResult(RenderReply::echo_raw(
                &data,
            ))));
        }
    };
    channel.record(&request);
    let reply = channel.render_reply(&request);
    Ok(Some(ChannelMessage::RenderResult(reply)))
}

fn handle_search(
    channel: &SandboxChannel,
    data: Value,
) -> Result<Option<ChannelMessage>, ChannelError> {
    let reply = match SearchRequest::deserialize(&data) {
        Ok(request) => channel.search_reply(&request),
        Err(err) => {
            warn!(
                target = "application::sandbox",
                error = %err,
                "malformed search request; no hits"
            );
            SearchReply {
                hits: Vec::new(),
                req_id: req_id_of(&data),
            }
        }
    };
    Ok(Some(ChannelMessage::SearchResult(reply)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::{
        bootstrap::Engine,
        render::{MarkdownGrammar, RenderError},
        search::FuzzySearch,
    };

    struct Failing;

    impl RenderService for Failing {
        fn render(&self, _text: &str) -> Result<String, RenderError> {
            Err(RenderError::markdown("exploded"))
        }
    }

    #[test]
    fn origin_allow_list_is_opt_in() {
        let deps = Arc::new(DependencyState::new());
        let open = SandboxChannel::new(Arc::clone(&deps)).with_allowed_origins(Vec::<String>::new());
        assert!(open.check_origin(None).is_ok());

        let closed = SandboxChannel::new(deps).with_allowed_origins(["https://chat.example"]);
        assert!(closed.check_origin(Some("https://chat.example")).is_ok());
        assert!(matches!(
            closed.check_origin(Some("https://evil.example")),
            Err(ChannelError::OriginRejected { .. })
        ));
        assert!(closed.check_origin(None).is_err());
    }

    #[test]
    fn render_errors_are_answered_with_original_text() {
        let deps = Arc::new(DependencyState::preloaded([Engine::Grammar(
            MarkdownGrammar::configure(),
        )]));
        let channel = SandboxChannel::with_renderer(deps, Arc::new(Failing));
        let (port, mut replies) = ReplyPort::channel();

        channel
            .handle(Envelope::new(
                json!({"action": "RENDER", "text": "**x**", "reqId": 9}),
                port,
            ))
            .expect("handled");

        let reply = replies.try_recv().expect("one reply");
        assert_eq!(
            reply,
            json!({"action": "RENDER_RESULT", "html": "**x**", "reqId": 9})
        );
    }

    #[test]
    fn messages_without_known_action_get_no_reply() {
        let channel = SandboxChannel::new(Arc::new(DependencyState::new()));
        let (port, mut replies) = ReplyPort::channel();

        let err = channel
            .handle(Envelope::new(json!({"action": "PING"}), port.clone()))
            .expect_err("unknown action");
        assert!(matches!(err, ChannelError::UnknownAction { .. }));

        let err = channel
            .handle(Envelope::new(json!({"text": "x"}), port))
            .expect_err("missing action");
        assert!(matches!(err, ChannelError::MissingAction));
        assert!(replies.try_recv().is_err());
    }

    #[test]
    fn malformed_render_requests_still_get_a_reply() {
        let channel = SandboxChannel::new(Arc::new(DependencyState::preloaded([
            Engine::Grammar(MarkdownGrammar::configure()),
        ])));
        let (port, mut replies) = ReplyPort::channel();

        channel
            .handle(Envelope::new(
                json!({"action": "RENDER", "text": 5, "reqId": 1}),
                port,
            ))
            .expect("handled");

        assert_eq!(
            replies.try_recv().expect("one reply"),
            json!({"action": "RENDER_RESULT", "html": "5", "reqId": 1})
        );
    }

    #[test]
    fn rendered_text_becomes_searchable() {
        let channel = SandboxChannel::new(Arc::new(DependencyState::preloaded([
            Engine::Grammar(MarkdownGrammar::configure()),
            Engine::Search(FuzzySearch::new()),
        ])));
        let (port, mut replies) = ReplyPort::channel();

        for (text, id) in [("alpha beta", 1), ("gamma", 2), ("", 3)] {
            channel
                .handle(Envelope::new(
                    json!({"action": "RENDER", "text": text, "reqId": id}),
                    port.clone(),
                ))
                .expect("rendered");
            replies.try_recv().expect("render reply");
        }

        channel
            .handle(Envelope::new(
                json!({"action": "SEARCH", "query": "gm", "reqId": "s"}),
                port,
            ))
            .expect("searched");

        assert_eq!(
            replies.try_recv().expect("search reply"),
            json!({
                "action": "SEARCH_RESULT",
                "hits": [{"index": 1, "score": 5, "text": "gamma"}],
                "reqId": "s"
            })
        );
    }

    #[test]
    fn search_without_engine_or_query_answers_with_no_hits() {
        let channel = SandboxChannel::new(Arc::new(DependencyState::new()));
        let (port, mut replies) = ReplyPort::channel();

        channel
            .handle(Envelope::new(
                json!({"action": "SEARCH", "query": "x", "reqId": 4}),
                port.clone(),
            ))
            .expect("searched");
        channel
            .handle(Envelope::new(
                json!({"action": "SEARCH", "query": [1], "reqId": 5}),
                port,
            ))
            .expect("searched");

        assert_eq!(
            replies.try_recv().expect("first reply"),
            json!({"action": "SEARCH_RESULT", "hits": [], "reqId": 4})
        );
        assert_eq!(
            replies.try_recv().expect("second reply"),
            json!({"action": "SEARCH_RESULT", "hits": [], "reqId": 5})
        );
    }
}
