//! Dispatcher <-> worker wire protocol.
//!
//! Two message families travel as newline-delimited JSON:
//!
//! - [`WorkerCommand`]: the one-time handoff written to a worker's stdin,
//!   `{"action":"run","threadID":0,"options":{..},"files":[..]}`.
//! - [`LifecycleMessage`]: progress and outcome notifications written to
//!   the worker's stdout, tagged by `action` (`rendering`, `complete`,
//!   `finished`) and optionally carrying an `error`.
//!
//! A per-file failure is a message with an `error` and no `action`; it
//! takes the place of the `complete` message for that file.

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::engine::{RenderStats, TransformError};
use crate::error::CoreError;
use crate::options::RunOptions;
use crate::types::WorkerId;

/// Upper bound on a single protocol line, in bytes.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// Dispatcher -> worker
// ---------------------------------------------------------------------------

/// Command sent by the dispatcher to a freshly spawned worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum WorkerCommand {
    Run {
        #[serde(rename = "threadID")]
        thread_id: WorkerId,
        options: RunOptions,
        files: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Worker -> dispatcher
// ---------------------------------------------------------------------------

/// Lifecycle stage announced by a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// A file is about to be handed to the engine.
    Rendering,
    /// A file was compiled and its artifacts written.
    Complete,
    /// The worker has no files left. Always its last message.
    Finished,
}

/// Notification sent from a worker to the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(rename = "threadID", default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<WorkerId>,
    #[serde(rename = "inFile", default, skip_serializing_if = "Option::is_none")]
    pub in_file: Option<PathBuf>,
    #[serde(rename = "outFile", default, skip_serializing_if = "Option::is_none")]
    pub out_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<RenderStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TransformError>,
}

impl LifecycleMessage {
    fn bare(action: Option<Action>, thread_id: WorkerId) -> Self {
        Self {
            action,
            thread_id: Some(thread_id),
            in_file: None,
            out_file: None,
            stats: None,
            error: None,
        }
    }

    pub fn rendering(thread_id: WorkerId, in_file: PathBuf, out_file: PathBuf) -> Self {
        Self {
            in_file: Some(in_file),
            out_file: Some(out_file),
            ..Self::bare(Some(Action::Rendering), thread_id)
        }
    }

    pub fn complete(
        thread_id: WorkerId,
        in_file: PathBuf,
        out_file: PathBuf,
        stats: Option<RenderStats>,
    ) -> Self {
        Self {
            in_file: Some(in_file),
            out_file: Some(out_file),
            stats,
            ..Self::bare(Some(Action::Complete), thread_id)
        }
    }

    /// Error-bearing message for a file that produced no output.
    pub fn failed(
        thread_id: WorkerId,
        in_file: PathBuf,
        out_file: PathBuf,
        error: TransformError,
    ) -> Self {
        Self {
            in_file: Some(in_file),
            out_file: Some(out_file),
            error: Some(error),
            ..Self::bare(None, thread_id)
        }
    }

    pub fn finished(thread_id: WorkerId) -> Self {
        Self::bare(Some(Action::Finished), thread_id)
    }

    pub fn is_finished(&self) -> bool {
        self.action == Some(Action::Finished)
    }
}

// ---------------------------------------------------------------------------
// Line codec
// ---------------------------------------------------------------------------

/// Serialize `value` as a single JSON line, including the trailing `\n`.
pub fn encode_line<T: Serialize>(value: &T) -> Result<String, CoreError> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}

/// Parse one protocol line. Surrounding whitespace is ignored.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, CoreError> {
    Ok(serde_json::from_str(line.trim())?)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn handoff_uses_wire_field_names() {
        let cmd = WorkerCommand::Run {
            thread_id: 2,
            options: RunOptions::new("in", "out"),
            files: vec!["a.scss".into(), "b.scss".into()],
        };
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value["action"], "run");
        assert_eq!(value["threadID"], 2);
        assert_eq!(value["files"], json!(["a.scss", "b.scss"]));
        assert_eq!(value["options"]["inputDir"], "in");
    }

    #[test]
    fn rendering_message_shape() {
        let msg = LifecycleMessage::rendering(1, "in/a.scss".into(), "out/a.css".into());
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"action":"rendering","threadID":1,"inFile":"in/a.scss","outFile":"out/a.css"})
        );
    }

    #[test]
    fn finished_message_carries_only_thread_id() {
        let value = serde_json::to_value(LifecycleMessage::finished(3)).unwrap();
        assert_eq!(value, json!({"action":"finished","threadID":3}));
    }

    #[test]
    fn failed_message_has_error_and_no_action() {
        let msg = LifecycleMessage::failed(
            0,
            "in/bad.scss".into(),
            "out/bad.css".into(),
            TransformError::new("expected \"{\""),
        );
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value.get("action").is_none());
        assert_eq!(value["error"]["message"], "expected \"{\"");
        assert_eq!(value["threadID"], 0);
    }

    #[test]
    fn error_only_message_decodes() {
        let msg: LifecycleMessage = decode_line(r#"{"error":{"message":"boom"}}"#).unwrap();
        assert_eq!(msg.action, None);
        assert_eq!(msg.thread_id, None);
        assert_eq!(msg.error.unwrap().message, "boom");
    }

    #[test]
    fn encoded_line_is_newline_terminated_and_decodes() {
        let line = encode_line(&LifecycleMessage::finished(7)).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        let back: LifecycleMessage = decode_line(&line).unwrap();
        assert!(back.is_finished());
        assert_eq!(back.thread_id, Some(7));
    }

    #[test]
    fn unknown_action_is_a_protocol_error() {
        let result = decode_line::<LifecycleMessage>(r#"{"action":"exploded","threadID":1}"#);
        assert_matches!(result, Err(CoreError::Protocol(_)));
    }
}
