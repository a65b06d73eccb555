use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use serde_json::Value;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::messages::{ChannelMessage, RenderReply, RenderRequest};

use super::{ChannelError, Envelope, ReplyPort};

/// Pending requests keyed by `reqId`. Each reply is handed to exactly one
/// waiting caller.
#[derive(Default, Clone)]
pub struct ReplyMailbox {
    inner: Arc<DashMap<String, oneshot::Sender<RenderReply>>>,
}

impl ReplyMailbox {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    pub fn register(&self, req_id: String) -> oneshot::Receiver<RenderReply> {
        let (tx, rx) = oneshot::channel();
        self.inner.insert(req_id, tx);
        rx
    }

    pub fn deliver(&self, reply: RenderReply) -> Result<(), ChannelError> {
        let req_id = reply_key(&reply.req_id);
        match self.inner.remove(&req_id) {
            Some((_id, sender)) => sender.send(reply).map_err(|_| ChannelError::ReplyClosed),
            None => Err(ChannelError::UnknownRequest { req_id }),
        }
    }

    /// Forget a request whose caller stopped waiting.
    pub fn cancel(&self, req_id: &str) {
        self.inner.remove(req_id);
    }

    pub fn pending(&self) -> usize {
        self.inner.len()
    }
}

fn reply_key(req_id: &Value) -> String {
    match req_id {
        Value::String(id) => id.clone(),
        other => other.to_string(),
    }
}

/// Caller side of the protocol: assigns request ids, waits for the matching
/// reply and gives up after a timeout.
pub struct SandboxClient {
    outbox: mpsc::Sender<Envelope>,
    reply: ReplyPort,
    mailbox: ReplyMailbox,
    origin: Option<String>,
    timeout: Duration,
    pump: JoinHandle<()>,
}

impl SandboxClient {
    /// Connect to a channel's inbox. Must be called within a tokio runtime.
    pub fn connect(outbox: mpsc::Sender<Envelope>, timeout: Duration) -> Self {
        let (reply, mut replies) = ReplyPort::channel();
        let mailbox = ReplyMailbox::new();

        let pump = {
            let mailbox = mailbox.clone();
            tokio::spawn(async move {
                while let Some(value) = replies.recv().await {
                    match serde_json::from_value::<ChannelMessage>(value) {
                        Ok(ChannelMessage::RenderResult(reply)) => {
                            if let Err(err) = mailbox.deliver(reply) {
                                debug!(
                                    target = "application::sandbox::client",
                                    error = %err,
                                    "reply discarded"
                                );
                            }
                        }
                        Ok(other) => debug!(
                            target = "application::sandbox::client",
                            action = other.action(),
                            "unexpected message on reply port"
                        ),
                        Err(err) => warn!(
                            target = "application::sandbox::client",
                            error = %err,
                            "malformed reply"
                        ),
                    }
                }
            })
        };

        Self {
            outbox,
            reply,
            mailbox,
            origin: None,
            timeout,
            pump,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn mailbox(&self) -> &ReplyMailbox {
        &self.mailbox
    }

    /// Send one RENDER request and wait for its HTML.
    pub async fn render(&self, text: &str) -> Result<String, ChannelError> {
        let req_id = Uuid::new_v4().to_string();
        let receiver = self.mailbox.register(req_id.clone());

        let request = ChannelMessage::Render(RenderRequest::new(text, req_id.clone()));
        let data = serde_json::to_value(&request).map_err(ChannelError::encode)?;
        let mut envelope = Envelope::new(data, self.reply.clone());
        envelope.origin = self.origin.clone();

        if self.outbox.send(envelope).await.is_err() {
            self.mailbox.cancel(&req_id);
            return Err(ChannelError::ChannelClosed);
        }

        match tokio::time::timeout(self.timeout, receiver).await {
            Ok(Ok(reply)) => Ok(reply.html),
            Ok(Err(_)) => Err(ChannelError::ReplyClosed),
            Err(_) => {
                self.mailbox.cancel(&req_id);
                Err(ChannelError::Timeout {
                    req_id,
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }
}

impl Drop for SandboxClient {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn mailbox_delivers_once_then_forgets() {
        let mailbox = ReplyMailbox::new();
        let mut receiver = mailbox.register("a".into());

        let reply = RenderReply {
            html: "<p>x</p>".into(),
            req_id: json!("a"),
        };
        mailbox.deliver(reply.clone()).expect("first delivery");
        assert_eq!(receiver.try_recv().expect("reply arrived"), reply);

        assert!(matches!(
            mailbox.deliver(reply),
            Err(ChannelError::UnknownRequest { .. })
        ));
        assert_eq!(mailbox.pending(), 0);
    }

    #[test]
    fn non_string_ids_key_by_their_json_text() {
        assert_eq!(reply_key(&json!(7)), "7");
        assert_eq!(reply_key(&json!("7")), "7");
    }

    #[tokio::test]
    async fn unanswered_request_times_out_and_is_cancelled() {
        let (outbox, _inbox) = mpsc::channel(4);
        let client = SandboxClient::connect(outbox, Duration::from_millis(20));

        let err = client.render("hello").await.expect_err("no one answers");
        assert!(matches!(err, ChannelError::Timeout { timeout_ms: 20, .. }));
        assert_eq!(client.mailbox().pending(), 0);
    }
}
