//! JSON-lines transport for the sandbox channel: one message per input line,
//! one reply per output line.

use std::sync::Arc;

use serde_json::Value;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tracing::{info, warn};

use crate::application::sandbox::{Envelope, ReplyPort, SandboxChannel};

use super::error::InfraError;

const INBOX_CAPACITY: usize = 64;

/// Split an input line into its sender origin and message. A line may carry
/// the message directly or wrapped as `{"origin": …, "data": …}`.
pub fn decode_line(line: &str) -> Result<(Option<String>, Value), serde_json::Error> {
    let value: Value = serde_json::from_str(line)?;
    match value {
        Value::Object(mut object) if !object.contains_key("action") && object.contains_key("data") => {
            let origin = object
                .remove("origin")
                .and_then(|origin| origin.as_str().map(str::to_owned));
            let data = object.remove("data").unwrap_or(Value::Null);
            Ok((origin, data))
        }
        other => Ok((None, other)),
    }
}

/// Feed every line of `input` through `channel` and write replies to
/// `output` until input ends and every reply is flushed.
pub async fn serve<R, W>(channel: Arc<SandboxChannel>, input: R, output: W) -> Result<(), InfraError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (inbox, inbox_rx) = mpsc::channel::<Envelope>(INBOX_CAPACITY);
    let (port, replies) = ReplyPort::channel();

    let runner = tokio::spawn(async move { channel.run(inbox_rx).await });
    let writer = tokio::spawn(write_replies(replies, output));

    let mut lines = input.lines();
    let mut received = 0_usize;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let (origin, data) = match decode_line(&line) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(target = "infra::stdio", error = %err, "skipping malformed line");
                continue;
            }
        };

        let mut envelope = Envelope::new(data, port.clone());
        envelope.origin = origin;
        if inbox.send(envelope).await.is_err() {
            break;
        }
        received += 1;
    }

    drop(inbox);
    drop(port);
    runner.await.map_err(|err| InfraError::Io(std::io::Error::other(err)))?;
    writer
        .await
        .map_err(|err| InfraError::Io(std::io::Error::other(err)))??;

    info!(target = "infra::stdio", received, "input closed");
    Ok(())
}

async fn write_replies<W>(
    mut replies: mpsc::UnboundedReceiver<Value>,
    mut output: W,
) -> Result<(), InfraError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(reply) = replies.recv().await {
        let mut line = serde_json::to_vec(&reply)
            .map_err(|err| InfraError::Io(std::io::Error::other(err)))?;
        line.push(b'\n');
        output.write_all(&line).await?;
        output.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn bare_messages_have_no_origin() {
        let (origin, data) = decode_line(r#"{"action":"RENDER","text":"x","reqId":1}"#)
            .expect("valid json");
        assert!(origin.is_none());
        assert_eq!(data["action"], "RENDER");
    }

    #[test]
    fn wrapped_messages_carry_origin() {
        let (origin, data) = decode_line(
            r#"{"origin":"https://chat.example","data":{"action":"RENDER","reqId":2}}"#,
        )
        .expect("valid json");
        assert_eq!(origin.as_deref(), Some("https://chat.example"));
        assert_eq!(data, json!({"action": "RENDER", "reqId": 2}));
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(decode_line("{not json").is_err());
    }
}
