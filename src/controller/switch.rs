//! One OpenFlow switch connection.
//!
//! Each connection runs the HELLO / FEATURES handshake, answers keepalives,
//! and feeds packet-ins to the shared [`LoadBalancer`] under its lock. The
//! effects that come back are encoded and written in order.

use super::error::{ControllerError, ControllerResult};
use crate::modules::load_balancer::{Effect, LoadBalancer, SwitchEvent};
use crate::openflow::{
    OfpHeader, OfpMessage, OpenFlowError, OpenFlowResult, OFP_HEADER_LEN, OFP_VERSION,
};
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// `OFPET_HELLO_FAILED` / `OFPHFC_INCOMPATIBLE`.
const HELLO_FAILED: u16 = 0;
const HELLO_INCOMPATIBLE: u16 = 0;

/// Missed echo intervals tolerated before the switch is declared dead.
const ECHO_MISS_LIMIT: u32 = 3;

/// Bounds applied to [`SwitchSettings::echo_interval`].
const MIN_ECHO_INTERVAL: Duration = Duration::from_millis(100);
/// Longest accepted keepalive interval.
pub const MAX_ECHO_INTERVAL: Duration = Duration::from_secs(3600);

/// Per-connection settings.
#[derive(Debug, Clone, Copy)]
pub struct SwitchSettings {
    /// Interval between ECHO_REQUESTs.
    pub echo_interval: Duration,
}

impl Default for SwitchSettings {
    fn default() -> Self {
        Self {
            echo_interval: Duration::from_secs(15),
        }
    }
}

/// Read one framed OpenFlow message.
///
/// Returns `Ok(None)` on a clean EOF between messages.
///
/// # Errors
///
/// Returns an error on socket failure, EOF inside a message, or a message
/// that does not decode.
pub async fn read_message<R>(reader: &mut R) -> OpenFlowResult<Option<(OfpHeader, OfpMessage)>>
where
    R: AsyncRead + Unpin,
{
    let mut raw_header = [0u8; OFP_HEADER_LEN];
    match reader.read_exact(&mut raw_header).await {
        Ok(_) => {},
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(OpenFlowError::Io(e)),
    }

    let header = OfpHeader::parse(&raw_header)?;
    let mut body = BytesMut::zeroed(header.body_len());
    reader.read_exact(&mut body).await?;

    let message = OfpMessage::decode(&header, body.freeze())?;
    Ok(Some((header, message)))
}

async fn reader_task<S>(
    mut reader: ReadHalf<S>,
    tx: mpsc::Sender<OpenFlowResult<(OfpHeader, OfpMessage)>>,
) where
    S: AsyncRead + Send + 'static,
{
    loop {
        let item = match read_message(&mut reader).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => break,
            Err(e) => Err(e),
        };
        let failed = item.is_err();
        if tx.send(item).await.is_err() || failed {
            break;
        }
    }
}

/// State of one switch connection.
pub struct SwitchConnection<S> {
    peer: String,
    writer: WriteHalf<S>,
    balancer: Arc<Mutex<LoadBalancer>>,
    settings: SwitchSettings,
    datapath_id: Option<u64>,
    next_xid: u32,
}

impl<S> std::fmt::Debug for SwitchConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchConnection")
            .field("peer", &self.peer)
            .field("datapath_id", &self.datapath_id)
            .finish()
    }
}

impl<S> SwitchConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Drive a switch connection until it closes.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the connection. A clean EOF is `Ok`.
    pub async fn run(
        stream: S,
        peer: impl Into<String>,
        balancer: Arc<Mutex<LoadBalancer>>,
        settings: SwitchSettings,
    ) -> ControllerResult<()> {
        let (reader, writer) = tokio::io::split(stream);
        let (tx, rx) = mpsc::channel(64);
        let reader = tokio::spawn(reader_task(reader, tx));

        let mut conn = Self {
            peer: peer.into(),
            writer,
            balancer,
            settings,
            datapath_id: None,
            next_xid: 1,
        };

        let result = conn.event_loop(rx).await;
        reader.abort();

        if let Some(datapath_id) = conn.datapath_id {
            conn.balancer
                .lock()
                .await
                .handle_event(SwitchEvent::SwitchDisconnected { datapath_id });
        }

        result
    }

    async fn event_loop(
        &mut self,
        mut rx: mpsc::Receiver<OpenFlowResult<(OfpHeader, OfpMessage)>>,
    ) -> ControllerResult<()> {
        debug!(peer = %self.peer, "Switch connected, sending HELLO");
        self.send(&OfpMessage::Hello).await?;

        let period = self
            .settings
            .echo_interval
            .clamp(MIN_ECHO_INTERVAL, MAX_ECHO_INTERVAL);
        let mut echo = tokio::time::interval_at(Instant::now() + period, period);
        echo.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_heard = Instant::now();

        loop {
            tokio::select! {
                item = rx.recv() => {
                    let Some(item) = item else {
                        info!(peer = %self.peer, datapath_id = ?self.datapath_id, "Switch disconnected");
                        return Ok(());
                    };
                    let (header, message) = item?;
                    last_heard = Instant::now();
                    self.handle_message(header, message).await?;
                }
                _ = echo.tick() => {
                    let silent = last_heard.elapsed();
                    if silent > period * ECHO_MISS_LIMIT {
                        return Err(ControllerError::EchoTimeout(silent));
                    }
                    self.send(&OfpMessage::EchoRequest(Bytes::new())).await?;
                }
            }
        }
    }

    async fn handle_message(&mut self, header: OfpHeader, message: OfpMessage) -> ControllerResult<()> {
        match message {
            OfpMessage::Hello => {
                if header.version < OFP_VERSION {
                    let error = OfpMessage::Error {
                        error_type: HELLO_FAILED,
                        code: HELLO_INCOMPATIBLE,
                        data: Bytes::from_static(b"OpenFlow 1.3 required"),
                    };
                    self.send_reply(&error, header.xid).await?;
                    return Err(ControllerError::IncompatibleVersion(header.version));
                }
                self.send(&OfpMessage::FeaturesRequest).await?;
            },
            OfpMessage::EchoRequest(data) => {
                self.send_reply(&OfpMessage::EchoReply(data), header.xid)
                    .await?;
            },
            OfpMessage::FeaturesReply(features) => {
                info!(
                    peer = %self.peer,
                    datapath_id = features.datapath_id,
                    n_tables = features.n_tables,
                    "Switch handshake complete"
                );
                self.datapath_id = Some(features.datapath_id);
                self.dispatch(SwitchEvent::SwitchConnected {
                    datapath_id: features.datapath_id,
                })
                .await?;
            },
            OfpMessage::PacketIn(packet_in) => {
                let Some(datapath_id) = self.datapath_id else {
                    debug!(peer = %self.peer, "Ignoring packet-in before handshake");
                    return Ok(());
                };
                let Some(in_port) = packet_in.in_port() else {
                    debug!(peer = %self.peer, "Ignoring packet-in without IN_PORT");
                    return Ok(());
                };
                self.dispatch(SwitchEvent::PacketIn {
                    datapath_id,
                    in_port,
                    data: packet_in.data,
                })
                .await?;
            },
            OfpMessage::Error {
                error_type, code, ..
            } => {
                warn!(peer = %self.peer, xid = header.xid, error_type, code, "Switch reported error");
            },
            OfpMessage::FlowRemoved {
                cookie,
                priority,
                reason,
            } => {
                debug!(peer = %self.peer, cookie, priority, reason, "Flow removed");
            },
            OfpMessage::PortStatus { reason, port_no } => {
                debug!(peer = %self.peer, port_no, reason, "Port status changed");
            },
            OfpMessage::BarrierReply | OfpMessage::EchoReply(_) => {},
            other => {
                debug!(peer = %self.peer, msg_type = other.msg_type(), "Ignoring message");
            },
        }
        Ok(())
    }

    async fn dispatch(&mut self, event: SwitchEvent) -> ControllerResult<()> {
        let effects = self.balancer.lock().await.handle_event(event);
        self.apply(effects).await
    }

    async fn apply(&mut self, effects: Vec<Effect>) -> ControllerResult<()> {
        if effects.is_empty() {
            return Ok(());
        }

        let mut buf = BytesMut::new();
        for effect in effects {
            let message = match effect {
                Effect::FlowMod(flow_mod) => OfpMessage::FlowMod(flow_mod),
                Effect::PacketOut(packet_out) => OfpMessage::PacketOut(packet_out),
            };
            let xid = self.xid();
            match message.encode(xid) {
                Ok(raw) => buf.extend_from_slice(&raw),
                Err(e) => {
                    warn!(peer = %self.peer, xid, error = %e, "Dropping effect that cannot be encoded");
                },
            }
        }

        if buf.is_empty() {
            return Ok(());
        }
        self.writer.write_all(&buf).await?;
        self.writer.flush().await?;
        Ok(())
    }

    fn xid(&mut self) -> u32 {
        let xid = self.next_xid;
        self.next_xid = self.next_xid.wrapping_add(1);
        xid
    }

    async fn send(&mut self, message: &OfpMessage) -> ControllerResult<()> {
        let xid = self.xid();
        self.send_reply(message, xid).await
    }

    async fn send_reply(&mut self, message: &OfpMessage, xid: u32) -> ControllerResult<()> {
        let raw = message.encode(xid)?;
        self.writer.write_all(&raw).await?;
        self.writer.flush().await?;
        Ok(())
    }
}
