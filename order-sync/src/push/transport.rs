//! Message bus transports
//!
//! Frame layout: 1 byte event type, 16 bytes request id, 16 bytes
//! correlation id (nil = none), u32 LE payload length, JSON payload.

use async_trait::async_trait;
use rustls::ClientConfig;
use rustls_pki_types::ServerName;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, broadcast};
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use uuid::Uuid;

use crate::error::PushError;
use shared::message::{BusMessage, EventType};

/// Largest accepted payload (16 MiB)
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Read one frame
pub async fn read_frame<R>(reader: &mut R) -> Result<BusMessage, PushError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    // Event type (1 byte)
    let mut type_buf = [0u8; 1];
    reader.read_exact(&mut type_buf).await?;
    let event_type = EventType::try_from(type_buf[0]).map_err(|_| {
        PushError::InvalidMessage(format!("Invalid event type: {}", type_buf[0]))
    })?;

    // Request ID (16 bytes)
    let mut uuid_buf = [0u8; 16];
    reader.read_exact(&mut uuid_buf).await?;
    let request_id = Uuid::from_bytes(uuid_buf);

    // Correlation ID (16 bytes)
    let mut correlation_buf = [0u8; 16];
    reader.read_exact(&mut correlation_buf).await?;
    let correlation_id = Some(Uuid::from_bytes(correlation_buf)).filter(|id| !id.is_nil());

    // Payload length (4 bytes)
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_PAYLOAD_LEN {
        return Err(PushError::InvalidMessage(format!(
            "Payload too large: {} bytes",
            len
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(BusMessage {
        request_id,
        event_type,
        source: None,
        correlation_id,
        target: None,
        payload,
    })
}

/// Write one frame
pub async fn write_frame<W>(writer: &mut W, msg: &BusMessage) -> Result<(), PushError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if msg.payload.len() > MAX_PAYLOAD_LEN {
        return Err(PushError::InvalidMessage(format!(
            "Payload too large: {} bytes",
            msg.payload.len()
        )));
    }

    let mut data = Vec::with_capacity(37 + msg.payload.len());
    data.push(msg.event_type as u8);
    data.extend_from_slice(msg.request_id.as_bytes());
    data.extend_from_slice(&msg.correlation_id.unwrap_or(Uuid::nil()).into_bytes());
    data.extend_from_slice(&(msg.payload.len() as u32).to_le_bytes());
    data.extend_from_slice(&msg.payload);

    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

/// Transport abstraction for message bus communication
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn read_message(&self) -> Result<BusMessage, PushError>;
    async fn write_message(&self, msg: &BusMessage) -> Result<(), PushError>;
}

/// TCP transport
#[derive(Debug, Clone)]
pub struct TcpTransport {
    reader: Arc<Mutex<OwnedReadHalf>>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
}

impl TcpTransport {
    pub async fn connect(addr: &str) -> Result<Self, PushError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| PushError::Connection(format!("{}: {}", addr, e)))?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: Arc::new(Mutex::new(reader)),
            writer: Arc::new(Mutex::new(writer)),
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn read_message(&self) -> Result<BusMessage, PushError> {
        let mut reader = self.reader.lock().await;
        read_frame(&mut *reader).await
    }

    async fn write_message(&self, msg: &BusMessage) -> Result<(), PushError> {
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, msg).await
    }
}

/// TLS transport (rustls)
#[derive(Debug, Clone)]
pub struct TlsTransport {
    reader: Arc<Mutex<tokio::io::ReadHalf<TlsStream<TcpStream>>>>,
    writer: Arc<Mutex<tokio::io::WriteHalf<TlsStream<TcpStream>>>>,
}

impl TlsTransport {
    pub async fn connect(
        addr: &str,
        domain: &str,
        config: Arc<ClientConfig>,
    ) -> Result<Self, PushError> {
        let connector = TlsConnector::from(config);
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| PushError::Connection(format!("{}: {}", addr, e)))?;

        let domain = ServerName::try_from(domain)
            .map_err(|e| PushError::Tls(format!("Invalid domain: {}", e)))?
            .to_owned();

        let stream = connector
            .connect(domain, stream)
            .await
            .map_err(|e| PushError::Tls(format!("TLS handshake failed: {}", e)))?;

        let (reader, writer) = tokio::io::split(stream);

        Ok(Self {
            reader: Arc::new(Mutex::new(reader)),
            writer: Arc::new(Mutex::new(writer)),
        })
    }
}

#[async_trait]
impl Transport for TlsTransport {
    async fn read_message(&self) -> Result<BusMessage, PushError> {
        let mut reader = self.reader.lock().await;
        read_frame(&mut *reader).await
    }

    async fn write_message(&self, msg: &BusMessage) -> Result<(), PushError> {
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, msg).await
    }
}

/// In-process transport over broadcast channels
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    /// Messages from the server
    rx: Arc<Mutex<broadcast::Receiver<BusMessage>>>,
    /// Messages to the server
    tx: broadcast::Sender<BusMessage>,
}

impl MemoryTransport {
    /// * `server_broadcast_tx` - the server's broadcast sender (subscribed to)
    /// * `client_to_server_tx` - channel for messages to the server
    pub fn new(
        server_broadcast_tx: &broadcast::Sender<BusMessage>,
        client_to_server_tx: &broadcast::Sender<BusMessage>,
    ) -> Self {
        Self {
            rx: Arc::new(Mutex::new(server_broadcast_tx.subscribe())),
            tx: client_to_server_tx.clone(),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn read_message(&self) -> Result<BusMessage, PushError> {
        let mut rx = self.rx.lock().await;
        loop {
            match rx.recv().await {
                Ok(msg) => return Ok(msg),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Memory transport lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(PushError::Connection("Memory channel closed".to_string()));
                }
            }
        }
    }

    async fn write_message(&self, msg: &BusMessage) -> Result<(), PushError> {
        self.tx
            .send(msg.clone())
            .map_err(|e| PushError::Connection(format!("Failed to send to server: {}", e)))?;
        Ok(())
    }
}
