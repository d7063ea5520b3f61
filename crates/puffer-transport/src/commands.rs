//! Daemon commands.
//!
//! Each command knows its outbound frame, the frame type that answers it,
//! and how to decode that answer. Responses are matched by type only.

use std::{
    mem,
    sync::{Arc, Mutex, PoisonError},
};

use futures::{Stream, StreamExt, future};
use puffer_core::{FileEntry, RawFileEntry, UsageStats, types::files_only};
use serde::Deserialize as _;
use serde_json::Value;

use crate::{
    channel::Channel,
    error::{ChannelError, Result},
    protocol::{InboundFrame, OutboundFrame, kinds},
};

/// A request the daemon may answer with one typed frame.
pub trait Command {
    type Output;

    /// Frame written to the socket.
    fn frame(&self) -> OutboundFrame;

    /// Frame type that completes this command, if any.
    fn response_kind(&self) -> Option<&'static str>;

    /// Build the result from the response frame.
    ///
    /// `response` is `None` only for commands without a response kind.
    ///
    /// # Errors
    /// Returns error if the response payload is malformed.
    fn decode(self, response: Option<InboundFrame>) -> Result<Self::Output>;
}

/// Raw `status` payload acknowledging a lifecycle command.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusAck(pub Value);

/// Result of a graceful stop.
#[derive(Debug, Clone, PartialEq)]
pub struct StopOutcome {
    pub status: StatusAck,
    /// `log` event texts seen between the request and the acknowledgment.
    pub logs: Vec<String>,
}

fn required(response: Option<InboundFrame>) -> Result<InboundFrame> {
    response.ok_or_else(|| ChannelError::Transport("missing response frame".to_string()))
}

macro_rules! lifecycle_command {
    ($(#[$doc:meta])* $name:ident => $frame:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl Command for $name {
            type Output = StatusAck;

            fn frame(&self) -> OutboundFrame {
                OutboundFrame::$frame
            }

            fn response_kind(&self) -> Option<&'static str> {
                Some(kinds::STATUS)
            }

            fn decode(self, response: Option<InboundFrame>) -> Result<StatusAck> {
                Ok(StatusAck(required(response)?.data))
            }
        }
    };
}

lifecycle_command!(
    /// Start the server process.
    Start => Start
);
lifecycle_command!(
    /// Ask the server process to stop.
    Stop => Stop
);
lifecycle_command!(
    /// Kill the server process.
    Kill => Kill
);

/// Request one usage sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat;

impl Command for Stat {
    type Output = UsageStats;

    fn frame(&self) -> OutboundFrame {
        OutboundFrame::Stat
    }

    fn response_kind(&self) -> Option<&'static str> {
        Some(kinds::STAT)
    }

    fn decode(self, response: Option<InboundFrame>) -> Result<UsageStats> {
        Ok(required(response)?.decode()?)
    }
}

/// Replay console history buffered by the daemon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Replay;

impl Command for Replay {
    type Output = Vec<String>;

    fn frame(&self) -> OutboundFrame {
        OutboundFrame::Replay
    }

    fn response_kind(&self) -> Option<&'static str> {
        Some(kinds::CONSOLE)
    }

    fn decode(self, response: Option<InboundFrame>) -> Result<Vec<String>> {
        Ok(required(response)?.logs())
    }
}

/// Write a line to the server console. Not acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleSend(pub String);

impl Command for ConsoleSend {
    type Output = ();

    fn frame(&self) -> OutboundFrame {
        OutboundFrame::console(self.0.clone())
    }

    fn response_kind(&self) -> Option<&'static str> {
        None
    }

    fn decode(self, _response: Option<InboundFrame>) -> Result<()> {
        Ok(())
    }
}

/// List regular files in a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFiles(pub String);

impl Command for ListFiles {
    type Output = Vec<FileEntry>;

    fn frame(&self) -> OutboundFrame {
        OutboundFrame::list_files(self.0.clone())
    }

    fn response_kind(&self) -> Option<&'static str> {
        Some(kinds::FILE)
    }

    fn decode(self, response: Option<InboundFrame>) -> Result<Vec<FileEntry>> {
        let frame = required(response)?;
        let Some(files) = frame.data.get("files").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };

        let raw = files
            .iter()
            .filter_map(|entry| match RawFileEntry::deserialize(entry) {
                Ok(raw) => Some(raw),
                Err(e) => {
                    tracing::warn!(dir = %self.0, "Skipping invalid file entry: {e}");
                    None
                }
            })
            .collect();
        Ok(files_only(raw))
    }
}

/// Delete a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFile(pub String);

impl Command for DeleteFile {
    type Output = ();

    fn frame(&self) -> OutboundFrame {
        OutboundFrame::delete_file(self.0.clone())
    }

    fn response_kind(&self) -> Option<&'static str> {
        Some(kinds::FILE)
    }

    fn decode(self, response: Option<InboundFrame>) -> Result<()> {
        required(response)?;
        Ok(())
    }
}

#[derive(Default)]
struct StopLog {
    lines: Vec<String>,
    acknowledged: bool,
}

impl Channel {
    /// Send a command and wait for its response frame.
    ///
    /// The wait is registered before the frame is written. There is no
    /// built-in timeout; wrap the call in `tokio::time::timeout` if the
    /// daemon may never answer.
    ///
    /// # Errors
    /// Returns `ChannelError::Closed` if the channel closes first, or a
    /// decode error for a malformed response.
    pub async fn send_command<C: Command>(&self, command: C) -> Result<C::Output> {
        let wait = command.response_kind().map(|kind| self.wait_for(kind));
        self.send(&command.frame())?;
        let response = match wait {
            Some(wait) => Some(wait.await?),
            None => None,
        };
        command.decode(response)
    }

    /// Start the server; resolves on the next `status` frame.
    ///
    /// # Errors
    /// Returns `ChannelError::Closed` if the channel closes first.
    pub async fn start(&self) -> Result<StatusAck> {
        self.send_command(Start).await
    }

    /// Stop the server, collecting console output until it acknowledges.
    ///
    /// # Errors
    /// Returns `ChannelError::Closed` if the channel closes first.
    pub async fn stop(&self) -> Result<StopOutcome> {
        let collected = Arc::new(Mutex::new(StopLog::default()));

        let log_sink = Arc::clone(&collected);
        let log_sub = self.on(kinds::LOG, move |frame| {
            let mut log = log_sink.lock().unwrap_or_else(PoisonError::into_inner);
            if !log.acknowledged {
                log.lines.push(frame.log_text());
            }
        });
        let ack_sink = Arc::clone(&collected);
        let ack_sub = self.on(kinds::STATUS, move |_| {
            ack_sink
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .acknowledged = true;
        });

        let status = self.send_command(Stop).await;
        self.off(log_sub);
        self.off(ack_sub);

        let logs = mem::take(
            &mut collected
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .lines,
        );
        Ok(StopOutcome {
            status: status?,
            logs,
        })
    }

    /// Kill the server; resolves on the next `status` frame.
    ///
    /// # Errors
    /// Returns `ChannelError::Closed` if the channel closes first.
    pub async fn kill(&self) -> Result<StatusAck> {
        self.send_command(Kill).await
    }

    /// Request one CPU and memory sample.
    ///
    /// # Errors
    /// Returns `ChannelError::Closed` if the channel closes first, or
    /// `ChannelError::Json` for a malformed sample.
    pub async fn stats(&self) -> Result<UsageStats> {
        self.send_command(Stat).await
    }

    /// Console history from before the channel was opened.
    ///
    /// # Errors
    /// Returns `ChannelError::Closed` if the channel closes first.
    pub async fn replay_logs(&self) -> Result<Vec<String>> {
        self.send_command(Replay).await
    }

    /// Write a line to the server console.
    ///
    /// # Errors
    /// Returns `ChannelError::Closed` if the channel is closed.
    pub async fn send_console(&self, command: impl Into<String>) -> Result<()> {
        self.send_command(ConsoleSend(command.into())).await
    }

    /// Regular files in `dir`; directories are left out.
    ///
    /// # Errors
    /// Returns `ChannelError::Closed` if the channel closes first.
    pub async fn list_files(&self, dir: impl Into<String>) -> Result<Vec<FileEntry>> {
        self.send_command(ListFiles(dir.into())).await
    }

    /// Delete the file at `path`.
    ///
    /// # Errors
    /// Returns `ChannelError::Closed` if the channel closes first.
    pub async fn delete_file(&self, path: impl Into<String>) -> Result<()> {
        self.send_command(DeleteFile(path.into())).await
    }

    /// Every usage sample the daemon pushes, solicited or not.
    pub fn usage_stream(&self) -> impl Stream<Item = UsageStats> + Send + 'static {
        self.events(kinds::STAT)
            .filter_map(|frame| future::ready(frame.decode::<UsageStats>().ok()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio_test::{assert_pending, assert_ready_ok, task};

    use super::*;
    use crate::channel::testing::pair;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_start_acknowledges_on_any_status() {
        let (channel, mut daemon) = pair();
        let (ack, ()) = tokio::join!(channel.start(), async {
            assert_eq!(daemon.next_frame().await, json!({"type": "start"}));
            daemon.push("status", json!({"running": false}));
        });
        assert_eq!(ack.unwrap(), StatusAck(json!({"running": false})));
    }

    #[tokio::test]
    async fn test_kill_acknowledges_on_status() {
        let (channel, mut daemon) = pair();
        let (ack, ()) = tokio::join!(channel.kill(), async {
            assert_eq!(daemon.next_frame().await, json!({"type": "kill"}));
            daemon.push("console", json!({"logs": ["killed"]}));
            daemon.push("status", json!({}));
        });
        assert_eq!(ack.unwrap(), StatusAck(json!({})));
    }

    #[tokio::test]
    async fn test_stop_collects_logs_until_ack() {
        let (channel, mut daemon) = pair();
        let (outcome, ()) = tokio::join!(channel.stop(), async {
            assert_eq!(daemon.next_frame().await, json!({"type": "stop"}));
            daemon.push("console", json!({"logs": ["a"]}));
            daemon.push("log", json!({"logs": [" b\n"]}));
            daemon.push("status", json!({"running": false}));
            daemon.push("console", json!({"logs": ["c"]}));
        });

        let outcome = outcome.unwrap();
        assert_eq!(outcome.logs, vec!["a", "b"]);
        assert_eq!(outcome.status, StatusAck(json!({"running": false})));
        assert_eq!(channel.demux().subscriber_count(kinds::LOG), 0);
        assert_eq!(channel.demux().subscriber_count(kinds::STATUS), 0);
    }

    #[tokio::test]
    async fn test_replay_returns_buffered_logs() {
        let (channel, mut daemon) = pair();
        let (logs, ()) = tokio::join!(channel.replay_logs(), async {
            assert_eq!(daemon.next_frame().await, json!({"type": "replay"}));
            daemon.push("log", json!({"logs": ["not a replay"]}));
            daemon.push("console", json!({"logs": ["x", "y"]}));
        });
        assert_eq!(logs.unwrap(), vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_stats_decodes_usage() {
        let (channel, mut daemon) = pair();
        let (stats, ()) = tokio::join!(channel.stats(), async {
            assert_eq!(daemon.next_frame().await, json!({"type": "stat"}));
            daemon.push("stat", json!({"memory": 1_048_576, "cpu": 50.0}));
        });
        let stats = stats.unwrap();
        assert!((stats.memory - 1_048_576.0).abs() < f64::EPSILON);
        assert!((stats.cpu - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_malformed_stat_is_a_decode_error() {
        let (channel, mut daemon) = pair();
        let (stats, ()) = tokio::join!(channel.stats(), async {
            daemon.next_frame().await;
            daemon.push("stat", json!({"memory": "lots"}));
        });
        assert!(matches!(stats, Err(ChannelError::Json(_))));
    }

    #[tokio::test]
    async fn test_list_files_filters_directories() {
        let (channel, mut daemon) = pair();
        let (files, ()) = tokio::join!(channel.list_files("/"), async {
            assert_eq!(
                daemon.next_frame().await,
                json!({"type": "file", "action": "get", "path": "/", "edit": false})
            );
            daemon.push(
                "file",
                json!({"files": [
                    {"name": "index.html", "size": 120, "modifyTime": 1_700_000_000, "extension": ".html", "isFile": true},
                    {"name": "plugins", "size": 0, "modifyTime": 1_700_000_000, "extension": "", "isFile": false},
                    {"name": "server.jar", "size": 4096, "modifyTime": 1_600_000_000, "extension": ".jar", "isFile": true},
                ]}),
            );
        });

        let files = files.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "index.html");
        assert_eq!(files[0].size, 120);
        assert_eq!(files[0].extension, ".html");
        assert_eq!(files[0].modify_time.timestamp(), 1_700_000_000);
        assert_eq!(files[1].name, "server.jar");
    }

    #[tokio::test]
    async fn test_list_files_without_array_is_empty() {
        let (channel, mut daemon) = pair();
        let (files, ()) = tokio::join!(channel.list_files("/missing/"), async {
            daemon.next_frame().await;
            daemon.push("file", json!({"files": null}));
        });
        assert!(files.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_file_waits_for_file_frame() {
        let (channel, mut daemon) = pair();
        let (result, ()) = tokio::join!(channel.delete_file("/index.html"), async {
            assert_eq!(
                daemon.next_frame().await,
                json!({"type": "file", "action": "delete", "path": "/index.html"})
            );
            daemon.push("file", json!({}));
        });
        result.unwrap();
    }

    #[tokio::test]
    async fn test_console_send_is_fire_and_forget() {
        let (channel, mut daemon) = pair();
        channel.send_console("say hello").await.unwrap();
        assert_eq!(
            daemon.next_frame().await,
            json!({"type": "console", "command": "say hello"})
        );
        assert_eq!(channel.demux().pending_waits(kinds::CONSOLE), 0);
    }

    #[tokio::test]
    async fn test_missing_response_stays_pending() {
        let (channel, daemon) = pair();
        let mut start = task::spawn(channel.start());
        assert_pending!(start.poll());

        daemon.push("stat", json!({"cpu": 1}));
        daemon.push("console", json!({"logs": ["still booting"]}));
        settle().await;
        assert_pending!(start.poll());

        daemon.push("status", json!({"running": true}));
        settle().await;
        assert!(start.is_woken());
        assert_ready_ok!(start.poll());
    }

    #[tokio::test]
    async fn test_timeout_leaves_no_stale_wait() {
        let (channel, daemon) = pair();
        let timed_out = tokio::time::timeout(Duration::from_millis(20), channel.stats()).await;
        assert!(timed_out.is_err());
        assert_eq!(channel.demux().pending_waits(kinds::STAT), 0);

        let next = channel.wait_for(kinds::STAT);
        daemon.push("stat", json!({"memory": 1, "cpu": 2}));
        assert_eq!(next.await.unwrap().data["cpu"], 2);
    }

    #[tokio::test]
    async fn test_commands_fail_after_disconnect() {
        let (channel, mut daemon) = pair();
        let (result, ()) = tokio::join!(channel.disconnect(), daemon.acknowledge_close());
        result.unwrap();
        assert!(matches!(channel.start().await, Err(ChannelError::Closed)));
        assert!(matches!(channel.send_console("x").await, Err(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn test_pending_command_rejected_on_unsolicited_close() {
        let (channel, mut daemon) = pair();
        let (result, ()) = tokio::join!(channel.stop(), async {
            daemon.next_frame().await;
            daemon.hang_up();
        });
        assert!(matches!(result, Err(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn test_usage_stream_sees_unsolicited_samples() {
        let (channel, daemon) = pair();
        let mut samples = Box::pin(channel.usage_stream());
        daemon.push("stat", json!({"memory": 1, "cpu": 0.5}));
        daemon.push("stat", json!({"cpu": "high"}));
        daemon.push("stat", json!({"memory": 2, "cpu": 1.5}));

        let first = samples.next().await.unwrap();
        let second = samples.next().await.unwrap();
        assert!((first.memory - 1.0).abs() < f64::EPSILON);
        assert!((second.cpu - 1.5).abs() < f64::EPSILON);
    }
}
