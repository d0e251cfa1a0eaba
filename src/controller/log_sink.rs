use chrono::{DateTime, Utc};
use log::{log, Level};
use std::fmt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// One caller-visible progress line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {:<5} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.message
        )
    }
}

/// Forwards progress lines to the caller while also writing them to the
/// process log.
///
/// Sending never blocks, so the sink can be used from the blocking control
/// threads. Lines sent after the receiver is gone are only logged.
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    sender: Option<UnboundedSender<LogLine>>,
}

impl LogSink {
    pub fn channel() -> (LogSink, UnboundedReceiver<LogLine>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            LogSink {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// A sink that only writes to the process log.
    pub fn detached() -> LogSink {
        LogSink { sender: None }
    }

    pub fn emit(&self, level: Level, message: impl Into<String>) {
        let message = message.into();
        log!(level, "{}", message);
        if let Some(sender) = &self.sender {
            let _ = sender.send(LogLine {
                timestamp: Utc::now(),
                level,
                message,
            });
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(Level::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(Level::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(Level::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_arrive_in_order() {
        let (sink, mut rx) = LogSink::channel();
        sink.info("granting");
        sink.warn("already granted");
        sink.error("compile failed");

        let levels: Vec<Level> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|l| l.level)
            .collect();
        assert_eq!(levels, vec![Level::Info, Level::Warn, Level::Error]);
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (sink, rx) = LogSink::channel();
        drop(rx);
        sink.info("nobody listening");
    }

    #[test]
    fn test_display_has_timestamp_and_level() {
        let line = LogLine {
            timestamp: DateTime::parse_from_rfc3339("2024-03-01T12:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
            level: Level::Warn,
            message: "retrying".to_string(),
        };
        assert_eq!(line.to_string(), "[2024-03-01 12:30:00] WARN  retrying");
    }
}
