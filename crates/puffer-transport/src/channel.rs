//! Persistent duplex channel to one server's daemon.

use std::{
    fmt,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::{Sink, SinkExt, Stream, StreamExt, stream::BoxStream};
use puffer_core::{DEFAULT_LOG_RETENTION, LogBuffer};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    demux::{Delivery, Demultiplexer, SubscriptionId, Wait},
    error::{ChannelError, Result},
    protocol::{InboundFrame, OutboundFrame, WireMessage, kinds},
};

/// Per-channel settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Console lines kept in the channel's log buffer.
    pub log_retention: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            log_retention: DEFAULT_LOG_RETENTION,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Open,
    /// `disconnect` was called; waiting for the transport to confirm.
    Closing,
    Closed,
}

struct Shared {
    demux: Demultiplexer,
    logs: LogBuffer,
    state: watch::Sender<ChannelState>,
}

impl Shared {
    fn handle_text(&self, text: &str) {
        let frame: InboundFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Invalid daemon frame: {e}");
                return;
            }
        };

        if frame.is_console_output() {
            self.logs.extend(frame.logs());
        }

        let Delivery {
            resolved_wait,
            handlers,
        } = self.demux.dispatch(&frame);

        // Console output is also published under the `log` event.
        let aliased = if frame.kind == kinds::CONSOLE {
            self.demux.publish(kinds::LOG, &frame)
        } else {
            0
        };

        tracing::trace!(
            kind = %frame.kind,
            resolved_wait,
            handlers = handlers + aliased,
            "Dispatched frame"
        );
    }

    fn finish(&self) {
        let rejected = self.demux.close();
        let previous = self.state.send_replace(ChannelState::Closed);
        if previous != ChannelState::Closed {
            if previous == ChannelState::Open {
                tracing::warn!(rejected, "Daemon socket closed unexpectedly");
            } else {
                tracing::info!(rejected, "Daemon socket closed");
            }
        }
    }
}

/// Duplex channel to a daemon.
///
/// Inbound frames are read by a background task and routed through the
/// channel's [`Demultiplexer`]; console output is also appended to the
/// channel's [`LogBuffer`]. Outbound frames are queued to a writer task.
pub struct Channel {
    shared: Arc<Shared>,
    outgoing: mpsc::UnboundedSender<WireMessage>,
    reader: JoinHandle<()>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("state", &self.state())
            .field("demux", &self.shared.demux)
            .finish_non_exhaustive()
    }
}

impl Channel {
    /// Run a channel over an already-open frame transport.
    ///
    /// The stream ending, yielding an error, or yielding
    /// [`WireMessage::Close`] closes the channel.
    #[must_use]
    pub fn from_transport<S, R, E>(sink: S, stream: R, options: ChannelOptions) -> Self
    where
        S: Sink<WireMessage> + Send + Unpin + 'static,
        S::Error: fmt::Display,
        R: Stream<Item = std::result::Result<WireMessage, E>> + Send + Unpin + 'static,
        E: fmt::Display + Send + 'static,
    {
        let (state, _) = watch::channel(ChannelState::Open);
        let shared = Arc::new(Shared {
            demux: Demultiplexer::new(),
            logs: LogBuffer::new(options.log_retention),
            state,
        });

        let (outgoing, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(sink, rx));
        let reader = tokio::spawn(read_loop(stream, Arc::clone(&shared)));

        Self {
            shared,
            outgoing,
            reader,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    /// Whether commands can still be sent.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Serialize and enqueue one frame. No acknowledgment is awaited.
    ///
    /// # Errors
    /// Returns `ChannelError::Closed` if the channel is not open.
    pub fn send(&self, frame: &OutboundFrame) -> Result<()> {
        if !self.is_open() {
            return Err(ChannelError::Closed);
        }
        let json = serde_json::to_string(frame)?;
        tracing::debug!(frame = %json, "Sending frame");
        self.outgoing
            .send(WireMessage::Text(json))
            .map_err(|_| ChannelError::Closed)
    }

    /// Register a one-shot wait for the next frame of type `kind`.
    #[must_use]
    pub fn wait_for(&self, kind: impl Into<String>) -> Wait {
        self.shared.demux.wait_for(kind)
    }

    /// Register a durable handler for `event`.
    ///
    /// Events are named after frame types; console output is additionally
    /// published as `log`.
    pub fn on<F>(&self, event: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&InboundFrame) + Send + Sync + 'static,
    {
        self.shared.demux.subscribe(event, handler)
    }

    /// Remove a handler registered with [`Channel::on`].
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.shared.demux.unsubscribe(id)
    }

    /// Stream of every frame published under `event`.
    ///
    /// The subscription is removed when the stream is dropped.
    #[must_use]
    pub fn events(&self, event: impl Into<String>) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.on(event, move |frame| {
            let _ = tx.send(frame.clone());
        });
        EventStream {
            inner: UnboundedReceiverStream::new(rx),
            id,
            demux: self.shared.demux.clone(),
        }
    }

    /// The channel's demultiplexer.
    #[must_use]
    pub fn demux(&self) -> &Demultiplexer {
        &self.shared.demux
    }

    /// Console lines received on this channel.
    #[must_use]
    pub fn log_buffer(&self) -> &LogBuffer {
        &self.shared.logs
    }

    /// Snapshot of retained console lines, oldest first.
    #[must_use]
    pub fn log_history(&self) -> Vec<String> {
        self.shared.logs.history()
    }

    /// Retained console lines followed by live ones.
    #[must_use]
    pub fn log_stream(&self) -> BoxStream<'static, String> {
        self.shared.logs.history_plus_stream()
    }

    /// Close the connection and wait until the transport confirms.
    ///
    /// Every pending wait is rejected with `ChannelError::Closed`. Calling
    /// this on a closed channel returns immediately; calling it while another
    /// disconnect is in flight waits for the same confirmation.
    ///
    /// # Errors
    /// Currently infallible; reserved for transports that report close
    /// failures.
    pub async fn disconnect(&self) -> Result<()> {
        let mut state = self.shared.state.subscribe();
        if *state.borrow_and_update() == ChannelState::Closed {
            return Ok(());
        }

        let initiated = self.shared.state.send_if_modified(|s| {
            let open = *s == ChannelState::Open;
            if open {
                *s = ChannelState::Closing;
            }
            open
        });

        if initiated {
            tracing::info!("Disconnecting from daemon");
            if self.outgoing.send(WireMessage::Close).is_err() {
                // Writer is gone; nothing will confirm the close.
                self.reader.abort();
                self.shared.finish();
            }
        }

        let _ = state.wait_for(|s| *s == ChannelState::Closed).await;
        Ok(())
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.reader.abort();
        self.shared.demux.close();
        if self.shared.state.send_replace(ChannelState::Closed) != ChannelState::Closed {
            tracing::debug!("Channel dropped while open");
        }
    }
}

async fn write_loop<S>(mut sink: S, mut rx: mpsc::UnboundedReceiver<WireMessage>)
where
    S: Sink<WireMessage> + Unpin,
    S::Error: fmt::Display,
{
    while let Some(msg) = rx.recv().await {
        let closing = msg == WireMessage::Close;
        if let Err(e) = sink.send(msg).await {
            tracing::error!("Failed to write to daemon socket: {e}");
            break;
        }
        if closing {
            if let Err(e) = sink.close().await {
                tracing::debug!("Error closing daemon socket: {e}");
            }
            break;
        }
    }
}

async fn read_loop<R, E>(mut stream: R, shared: Arc<Shared>)
where
    R: Stream<Item = std::result::Result<WireMessage, E>> + Unpin,
    E: fmt::Display,
{
    while let Some(next) = stream.next().await {
        match next {
            Ok(WireMessage::Text(text)) => shared.handle_text(&text),
            Ok(WireMessage::Close) => break,
            Err(e) => {
                if *shared.state.borrow() == ChannelState::Closing {
                    tracing::debug!("Daemon socket error while closing: {e}");
                } else {
                    tracing::error!("Daemon socket error: {e}");
                }
                break;
            }
        }
    }
    shared.finish();
}

/// Frames published under one event name.
pub struct EventStream {
    inner: UnboundedReceiverStream<InboundFrame>,
    id: SubscriptionId,
    demux: Demultiplexer,
}

impl EventStream {
    /// Subscription backing this stream.
    #[must_use]
    pub const fn subscription(&self) -> SubscriptionId {
        self.id
    }
}

impl Stream for EventStream {
    type Item = InboundFrame;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.demux.unsubscribe(self.id);
    }
}
