//! Server facade: REST status plus the server's daemon channel.

use futures::stream::BoxStream;
use puffer_core::{ServerInfo, ServerStatus, UsageStats};
use puffer_transport::{Channel, InboundFrame, StatusAck, StopOutcome, SubscriptionId};
use serde_json::Value;

use crate::{
    client::Context,
    error::{ClientError, Result},
    files::FileManager,
};

/// One managed server.
///
/// Protocol operations need [`Server::connect`] first; the channel is owned
/// by this value and closed by [`Server::disconnect`].
#[derive(Debug)]
pub struct Server {
    info: ServerInfo,
    ctx: Context,
    channel: Option<Channel>,
}

impl Server {
    pub(crate) const fn new(info: ServerInfo, ctx: Context) -> Self {
        Self {
            info,
            ctx,
            channel: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.info.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Node the server is hosted on, as reported by the panel.
    #[must_use]
    pub const fn node(&self) -> &Value {
        &self.info.node
    }

    #[must_use]
    pub const fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub(crate) const fn context(&self) -> &Context {
        &self.ctx
    }

    /// Whether the server process is running.
    ///
    /// # Errors
    /// Returns the REST error if the panel rejects the request.
    pub async fn status(&self) -> Result<ServerStatus> {
        self.ctx
            .get_json(&format!("/proxy/daemon/server/{}/status", self.info.id))
            .await
    }

    /// Open the daemon channel for this server.
    ///
    /// Does nothing if an open channel already exists.
    ///
    /// # Errors
    /// Returns `ClientError::NotLoggedIn` without a session, or
    /// `ChannelError::Connect` if the handshake fails.
    #[cfg(feature = "websocket")]
    pub async fn connect(&mut self) -> Result<()> {
        use puffer_transport::{ChannelOptions, socket_url};

        if self.is_connected() {
            tracing::debug!(server = %self.info.id, "Already connected");
            return Ok(());
        }
        let token = self.ctx.session.token().ok_or(ClientError::NotLoggedIn)?;
        let url = socket_url(&self.ctx.panel_url, &self.info.id)?;
        let options = ChannelOptions {
            log_retention: self.ctx.log_retention,
        };
        let channel = Channel::connect(&url, &token, options).await?;
        self.channel = Some(channel);
        Ok(())
    }

    /// Use an already-open channel, returning the one it replaces.
    pub fn attach(&mut self, channel: Channel) -> Option<Channel> {
        self.channel.replace(channel)
    }

    /// Close the daemon channel. Does nothing if not connected.
    ///
    /// # Errors
    /// Returns the channel error if closing fails.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(channel) = self.channel.take() {
            channel.disconnect().await?;
            tracing::info!(server = %self.info.id, "Disconnected");
        }
        Ok(())
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.channel.as_ref().is_some_and(Channel::is_open)
    }

    /// The server's channel.
    ///
    /// # Errors
    /// Returns `ClientError::NotConnected` before [`Server::connect`].
    pub fn channel(&self) -> Result<&Channel> {
        self.channel
            .as_ref()
            .ok_or_else(|| ClientError::NotConnected(self.info.id.clone()))
    }

    /// Start the server. Resolves once the daemon reports a status.
    ///
    /// # Errors
    /// Returns `ClientError::NotConnected`, or `ChannelError::Closed` if the
    /// channel closes first.
    pub async fn start(&self) -> Result<StatusAck> {
        Ok(self.channel()?.start().await?)
    }

    /// Stop the server, returning the console output seen while stopping.
    ///
    /// # Errors
    /// Returns `ClientError::NotConnected`, or `ChannelError::Closed` if the
    /// channel closes first.
    pub async fn stop(&self) -> Result<StopOutcome> {
        Ok(self.channel()?.stop().await?)
    }

    /// Kill the server process.
    ///
    /// # Errors
    /// Returns `ClientError::NotConnected`, or `ChannelError::Closed` if the
    /// channel closes first.
    pub async fn kill(&self) -> Result<StatusAck> {
        Ok(self.channel()?.kill().await?)
    }

    /// Current CPU and memory usage.
    ///
    /// # Errors
    /// Returns `ClientError::NotConnected`, or `ChannelError::Closed` if the
    /// channel closes first.
    pub async fn stats(&self) -> Result<UsageStats> {
        Ok(self.channel()?.stats().await?)
    }

    /// Console output from before the channel was opened.
    ///
    /// # Errors
    /// Returns `ClientError::NotConnected`, or `ChannelError::Closed` if the
    /// channel closes first.
    pub async fn replay_logs(&self) -> Result<Vec<String>> {
        Ok(self.channel()?.replay_logs().await?)
    }

    /// Console lines received since connecting, oldest first.
    #[must_use]
    pub fn logs(&self) -> Vec<String> {
        self.channel
            .as_ref()
            .map(Channel::log_history)
            .unwrap_or_default()
    }

    /// Retained console lines followed by live ones.
    ///
    /// # Errors
    /// Returns `ClientError::NotConnected` before [`Server::connect`].
    pub fn log_stream(&self) -> Result<BoxStream<'static, String>> {
        Ok(self.channel()?.log_stream())
    }

    /// Register a handler for `event` (`log`, `stat`, `status`, ...).
    ///
    /// # Errors
    /// Returns `ClientError::NotConnected` before [`Server::connect`].
    pub fn on<F>(&self, event: &str, handler: F) -> Result<SubscriptionId>
    where
        F: Fn(&InboundFrame) + Send + Sync + 'static,
    {
        Ok(self.channel()?.on(event, handler))
    }

    /// Remove a handler registered with [`Server::on`].
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.channel.as_ref().is_some_and(|channel| channel.off(id))
    }

    #[must_use]
    pub const fn console(&self) -> Console<'_> {
        Console { server: self }
    }

    #[must_use]
    pub const fn files(&self) -> FileManager<'_> {
        FileManager::new(self)
    }
}

/// Console input for one server.
#[derive(Debug, Clone, Copy)]
pub struct Console<'a> {
    server: &'a Server,
}

impl Console<'_> {
    /// Write a command line to the server console.
    ///
    /// # Errors
    /// Returns `ClientError::NotConnected`, or `ChannelError::Closed`.
    pub async fn send(&self, command: &str) -> Result<()> {
        Ok(self.server.channel()?.send_console(command).await?)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use futures::{StreamExt, channel::mpsc};
    use puffer_transport::{ChannelOptions, WireMessage};

    use super::*;

    /// In-memory daemon end of an attached channel.
    pub(crate) struct Daemon {
        pub(crate) inbound: mpsc::UnboundedSender<std::result::Result<WireMessage, String>>,
        pub(crate) outbound: mpsc::UnboundedReceiver<WireMessage>,
    }

    impl Daemon {
        pub(crate) fn push(&self, value: &Value) {
            self.inbound
                .unbounded_send(Ok(WireMessage::Text(value.to_string())))
                .unwrap();
        }

        pub(crate) async fn next_frame(&mut self) -> Value {
            match self.outbound.next().await {
                Some(WireMessage::Text(text)) => serde_json::from_str(&text).unwrap(),
                other => panic!("unexpected outbound message: {other:?}"),
            }
        }
    }

    pub(crate) fn connected(ctx: Context, id: &str) -> (Server, Daemon) {
        let (out_tx, out_rx) = mpsc::unbounded();
        let (in_tx, in_rx) = mpsc::unbounded();
        let mut server = Server::new(
            ServerInfo {
                id: id.to_string(),
                name: "Test".to_string(),
                node: Value::Null,
            },
            ctx,
        );
        server.attach(Channel::from_transport(out_tx, in_rx, ChannelOptions::default()));
        (
            server,
            Daemon {
                inbound: in_tx,
                outbound: out_rx,
            },
        )
    }
}
