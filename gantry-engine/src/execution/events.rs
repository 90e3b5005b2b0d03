// Execution Events
// Progress reporting for task execution. The engine never prints; it emits
// events on this channel and the consumer decides how to render them.

use serde::{Serialize, Serializer};
use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for execution progress events
pub type ProgressSender = mpsc::UnboundedSender<RunEvent>;

/// Receiver for execution progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<RunEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted during task execution
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum RunEvent {
    /// A task invocation started
    TaskStarted { tool: String, task: String },

    /// A task invocation finished
    TaskCompleted {
        tool: String,
        task: String,
        success: bool,
        #[serde(serialize_with = "millis")]
        duration: Duration,
    },

    /// A hook stage with configured actions started
    HookStarted { label: String, stage: &'static str },

    /// A matrix entry was admitted and started executing
    EntryStarted {
        label: String,
        entry: String,
        index: usize,
        total: usize,
    },

    /// A matrix entry finished
    EntryCompleted {
        label: String,
        entry: String,
        success: bool,
        #[serde(serialize_with = "millis")]
        duration: Duration,
    },

    /// A matrix entry was canceled before it was admitted
    EntrySkipped {
        label: String,
        entry: String,
        reason: String,
    },

    /// A step started
    StepStarted { label: String, name: String },

    /// One line of step output
    StepOutput {
        label: String,
        line: String,
        is_error: bool,
    },

    /// A step finished
    StepCompleted {
        label: String,
        name: String,
        success: bool,
        exit_code: Option<i32>,
        #[serde(serialize_with = "millis")]
        duration: Duration,
    },

    /// Log message
    Log {
        level: LogLevel,
        label: String,
        message: String,
    },
}

/// Log level for log events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

fn millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u128(duration.as_millis())
}

impl RunEvent {
    /// Create an info log event
    pub fn info(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Log {
            level: LogLevel::Info,
            label: label.into(),
            message: message.into(),
        }
    }

    /// Create a warning log event
    pub fn warning(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Log {
            level: LogLevel::Warning,
            label: label.into(),
            message: message.into(),
        }
    }

    /// Create an error log event
    pub fn error(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Log {
            level: LogLevel::Error,
            label: label.into(),
            message: message.into(),
        }
    }

    /// Serialize to a single JSON line for machine-readable log streams
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: RunEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: RunEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: RunEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_channel() {
        let (tx, mut rx) = progress_channel();

        tx.send_event(RunEvent::TaskStarted {
            tool: "go".to_string(),
            task: "build".to_string(),
        });
        tx.send_event(RunEvent::info("go:build", "starting"));

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, RunEvent::TaskStarted { .. }));

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            RunEvent::Log {
                level: LogLevel::Info,
                ..
            }
        ));
    }

    #[test]
    fn test_optional_sender_is_noop() {
        let sender: Option<ProgressSender> = None;
        sender.send_event(RunEvent::info("x", "dropped"));
    }

    #[test]
    fn test_json_line_shape() {
        let event = RunEvent::StepCompleted {
            label: "go:build".to_string(),
            name: "compile".to_string(),
            success: true,
            exit_code: Some(0),
            duration: Duration::from_millis(1500),
        };

        let line = event.to_json_line();
        assert!(line.contains("\"event\":\"step-completed\""));
        assert!(line.contains("\"duration\":1500"));
    }
}
