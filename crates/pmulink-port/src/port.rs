use bytes::BytesMut;
use pmulink_frame::command::DATA;
use pmulink_frame::telemetry::MAX_PACKET_SIZE;
use pmulink_frame::{Delivery, Frame, TelemetryLayout};
use pmulink_transport::SerialLink;
use tracing::{debug, info, warn};

use crate::arbiter::Arbiter;
use crate::board::{Board, ChannelExecutor};
use crate::config::PortConfig;
use crate::dispatch::UploadState;
use crate::engine::{BasicEngine, FrameEngine};
use crate::error::Result;
use crate::flash::Flash;
use crate::store::ConfigStore;
use crate::telemetry::{build_snapshot, StreamState};

/// The command/telemetry port.
///
/// Owns everything the protocol touches: the wire (through the
/// [`Arbiter`]), the frame engine, the configuration store, the stream
/// state, and the board and executor capabilities. The host drives it from
/// a single context through two entry points: received bytes
/// ([`feed_byte`](Port::feed_byte) or [`poll_link`](Port::poll_link)) and
/// the periodic [`update`](Port::update) tick.
pub struct Port<L, F, B, X, E = BasicEngine> {
    pub(crate) arbiter: Arbiter<L>,
    pub(crate) engine: E,
    pub(crate) store: ConfigStore<F>,
    pub(crate) board: B,
    pub(crate) executor: X,
    pub(crate) stream: StreamState,
    pub(crate) upload: UploadState,
    pub(crate) config: PortConfig,
    layout: TelemetryLayout,
    snapshot: BytesMut,
}

/// Capabilities handed back by [`Port::into_parts`].
#[derive(Debug)]
pub struct PortParts<L, F, B, X> {
    pub link: L,
    pub flash: F,
    pub board: B,
    pub executor: X,
}

impl<L, F, B, X> Port<L, F, B, X, BasicEngine>
where
    L: SerialLink,
    F: Flash,
    B: Board,
    X: ChannelExecutor,
{
    pub fn new(link: L, flash: F, board: B, executor: X, config: PortConfig) -> Self {
        Self::with_engine(link, flash, board, executor, BasicEngine::new(), config)
    }
}

impl<L, F, B, X, E> Port<L, F, B, X, E>
where
    L: SerialLink,
    F: Flash,
    B: Board,
    X: ChannelExecutor,
    E: FrameEngine,
{
    pub fn with_engine(
        link: L,
        flash: F,
        board: B,
        executor: X,
        engine: E,
        mut config: PortConfig,
    ) -> Self {
        let requested = config.device;
        if config.device.fit_telemetry() {
            warn!(
                outputs = requested.output_count,
                analog_inputs = requested.analog_in_count,
                fitted_outputs = config.device.output_count,
                fitted_analog_inputs = config.device.analog_in_count,
                "I/O counts exceed one telemetry packet, reduced"
            );
        }
        let layout = config.device.telemetry_layout();
        Self {
            arbiter: Arbiter::new(link, config.tx_capacity, config.rx_capacity),
            engine,
            store: ConfigStore::new(flash, config.config_capacity),
            board,
            executor,
            stream: StreamState::new(),
            upload: UploadState::default(),
            config,
            layout,
            snapshot: BytesMut::with_capacity(MAX_PACKET_SIZE),
        }
    }

    /// Load the persisted configuration and hand it to the executor.
    ///
    /// Returns the number of channels loaded, or `None` when flash holds no
    /// valid record.
    pub fn boot(&mut self) -> Option<u16> {
        match self.store.load() {
            Some(blob) => {
                let channels = self.executor.load(blob);
                info!(size = blob.len(), channels, "configuration restored");
                Some(channels)
            }
            None => {
                self.executor.clear();
                info!("booting without configuration");
                None
            }
        }
    }

    /// Handle one received byte.
    ///
    /// While earlier bytes are still buffered (or being drained) the byte
    /// joins the ring so ordering is preserved.
    pub fn feed_byte(&mut self, byte: u8) {
        if self.arbiter.is_draining() || self.arbiter.buffered() > 0 {
            self.arbiter.capture(byte);
            self.drain_buffered();
            return;
        }
        self.receive(byte);
    }

    /// Pass one byte to the engine and dispatch every frame it completes.
    fn receive(&mut self, byte: u8) {
        let mut next = self.engine.poll(byte);
        while let Some(frame) = next {
            self.dispatch(frame);
            next = self.engine.next_frame();
        }
    }

    /// Read and handle every byte currently available on the link.
    pub fn poll_link(&mut self) -> Result<usize> {
        let mut count = 0;
        while let Some(byte) = self.arbiter.link_mut().read()? {
            self.feed_byte(byte);
            count += 1;
        }
        Ok(count)
    }

    /// Periodic tick: engine housekeeping, then telemetry if due.
    pub fn update(&mut self) {
        let now = self.board.now_ms();

        if let Some(frame) = self.engine.housekeeping(now) {
            self.send_reply(frame);
        }

        if let Some(counter) = self.stream.poll_due(now) {
            let mut buf = std::mem::take(&mut self.snapshot);
            buf.clear();
            build_snapshot(
                &self.layout,
                counter,
                now,
                &self.board,
                &self.executor,
                &mut buf,
            );
            if let Err(err) = self.send_frame(DATA, Delivery::Unreliable, &buf) {
                warn!(error = %err, counter, "telemetry snapshot dropped");
            }
            self.snapshot = buf;
        }
    }

    /// Encode and transmit one frame, then replay bytes that arrived while
    /// the wire was busy.
    pub fn send_frame(&mut self, id: u8, delivery: Delivery, payload: &[u8]) -> Result<()> {
        let mut batch = self.arbiter.begin_send()?;
        if let Err(err) = self.engine.encode(id, delivery, payload, &mut batch) {
            batch.abort();
            return Err(err);
        }
        let sent = batch.end_send();
        self.drain_buffered();
        let len = sent?;
        debug!(id, len, "frame sent");
        Ok(())
    }

    pub(crate) fn send_reply(&mut self, frame: Frame) {
        if let Err(err) = self.send_frame(frame.id, frame.delivery, &frame.payload) {
            warn!(id = frame.id, error = %err, "reply dropped");
        }
    }

    /// Replay buffered bytes through the engine. A drain started from inside
    /// a drain returns immediately; the outer loop keeps going until the
    /// ring is empty.
    fn drain_buffered(&mut self) {
        if !self.arbiter.begin_drain() {
            return;
        }
        while let Some(byte) = self.arbiter.next_buffered() {
            self.receive(byte);
        }
        self.arbiter.end_drain();
    }

    pub fn link(&self) -> &L {
        self.arbiter.link()
    }

    pub fn link_mut(&mut self) -> &mut L {
        self.arbiter.link_mut()
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn executor(&self) -> &X {
        &self.executor
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn store(&self) -> &ConfigStore<F> {
        &self.store
    }

    pub fn stream(&self) -> &StreamState {
        &self.stream
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    /// Inbound bytes lost to ring overflow.
    pub fn rx_dropped(&self) -> u64 {
        self.arbiter.dropped()
    }

    pub fn into_parts(self) -> PortParts<L, F, B, X> {
        PortParts {
            link: self.arbiter.into_link(),
            flash: self.store.into_flash(),
            board: self.board,
            executor: self.executor,
        }
    }
}
