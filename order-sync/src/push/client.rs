use async_trait::async_trait;
use rustls::ClientConfig;
use shared::message::{
    BusMessage, EventType, HandshakePayload, PROTOCOL_VERSION, ResponsePayload,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::PushChannel;
use super::transport::{MemoryTransport, TcpTransport, TlsTransport, Transport};
use crate::config::PushConfig;
use crate::error::PushError;
use crate::task::Backoff;

/// How to reach the message bus
#[derive(Debug, Clone)]
pub enum Connector {
    Tcp {
        addr: String,
    },
    Tls {
        addr: String,
        domain: String,
        config: Arc<ClientConfig>,
    },
    /// In-process bus; no handshake
    Memory {
        server_tx: broadcast::Sender<BusMessage>,
        client_tx: broadcast::Sender<BusMessage>,
    },
}

impl Connector {
    pub fn tcp(addr: impl Into<String>) -> Self {
        Connector::Tcp { addr: addr.into() }
    }

    pub fn tls(addr: impl Into<String>, domain: impl Into<String>, config: Arc<ClientConfig>) -> Self {
        Connector::Tls {
            addr: addr.into(),
            domain: domain.into(),
            config,
        }
    }

    pub fn memory(
        server_tx: &broadcast::Sender<BusMessage>,
        client_tx: &broadcast::Sender<BusMessage>,
    ) -> Self {
        Connector::Memory {
            server_tx: server_tx.clone(),
            client_tx: client_tx.clone(),
        }
    }

    /// Connector described by `config`; `None` when no address is set
    pub fn from_config(config: &PushConfig) -> Result<Option<Self>, PushError> {
        let Some(addr) = config.addr.clone() else {
            return Ok(None);
        };

        let Some(domain) = config.tls_domain.clone() else {
            return Ok(Some(Connector::tcp(addr)));
        };

        let ca_pem = match &config.ca_cert_path {
            Some(path) => Some(std::fs::read(path).map_err(|e| {
                PushError::Tls(format!("Failed to read CA certificate {}: {}", path, e))
            })?),
            None => None,
        };
        let tls_config = tls_client_config(ca_pem.as_deref())?;
        Ok(Some(Connector::tls(addr, domain, Arc::new(tls_config))))
    }

    fn needs_handshake(&self) -> bool {
        !matches!(self, Connector::Memory { .. })
    }

    async fn open(&self) -> Result<ClientTransport, PushError> {
        match self {
            Connector::Tcp { addr } => Ok(ClientTransport::Tcp(TcpTransport::connect(addr).await?)),
            Connector::Tls {
                addr,
                domain,
                config,
            } => Ok(ClientTransport::Tls(
                TlsTransport::connect(addr, domain, config.clone()).await?,
            )),
            Connector::Memory {
                server_tx,
                client_tx,
            } => Ok(ClientTransport::Memory(MemoryTransport::new(
                server_tx, client_tx,
            ))),
        }
    }
}

/// rustls client config trusting `ca_pem`, or the webpki roots when `None`
pub fn tls_client_config(ca_pem: Option<&[u8]>) -> Result<ClientConfig, PushError> {
    let mut root_store = rustls::RootCertStore::empty();
    match ca_pem {
        Some(pem) => {
            let mut reader = std::io::Cursor::new(pem);
            let certs = rustls_pemfile::certs(&mut reader)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| PushError::Tls(format!("Failed to parse CA certificates: {}", e)))?;
            for cert in certs {
                root_store
                    .add(cert)
                    .map_err(|e| PushError::Tls(format!("Failed to add CA certificate: {}", e)))?;
            }
            if root_store.is_empty() {
                return Err(PushError::Tls("No valid CA certificates found".to_string()));
            }
        }
        None => root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    Ok(ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| PushError::Tls(e.to_string()))?
        .with_root_certificates(root_store)
        .with_no_client_auth())
}

#[derive(Debug, Clone)]
enum ClientTransport {
    Tcp(TcpTransport),
    Tls(TlsTransport),
    Memory(MemoryTransport),
}

impl ClientTransport {
    async fn read_message(&self) -> Result<BusMessage, PushError> {
        match self {
            ClientTransport::Tcp(t) => t.read_message().await,
            ClientTransport::Tls(t) => t.read_message().await,
            ClientTransport::Memory(t) => t.read_message().await,
        }
    }

    async fn write_message(&self, msg: &BusMessage) -> Result<(), PushError> {
        match self {
            ClientTransport::Tcp(t) => t.write_message(msg).await,
            ClientTransport::Tls(t) => t.write_message(msg).await,
            ClientTransport::Memory(t) => t.write_message(msg).await,
        }
    }
}

/// Message bus push channel
///
/// After `connect` a reader task broadcasts every received frame to
/// subscribers. A read failure marks the channel disconnected; with
/// `auto_reconnect` the task then reconnects with exponential backoff.
pub struct MessagePushChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    connector: Option<Connector>,
    config: PushConfig,
    client_id: String,
    events: broadcast::Sender<BusMessage>,
    connected: AtomicBool,
    reader: Mutex<Option<CancellationToken>>,
}

impl MessagePushChannel {
    pub fn new(connector: Connector, config: PushConfig) -> Self {
        Self::with_connector(Some(connector), config)
    }

    /// Channel from configuration; without an address every connect fails
    pub fn from_config(config: &PushConfig) -> Result<Self, PushError> {
        Ok(Self::with_connector(
            Connector::from_config(config)?,
            config.clone(),
        ))
    }

    fn with_connector(connector: Option<Connector>, config: PushConfig) -> Self {
        let (events, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            inner: Arc::new(ChannelInner {
                connector,
                config,
                client_id: Uuid::new_v4().to_string(),
                events,
                connected: AtomicBool::new(false),
                reader: Mutex::new(None),
            }),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }
}

#[async_trait]
impl PushChannel for MessagePushChannel {
    async fn connect(&self, tenant_id: &str) -> Result<(), PushError> {
        if self.inner.connector.is_none() {
            return Err(PushError::Connection(
                "No push address configured".to_string(),
            ));
        }

        self.disconnect();
        let transport = self.inner.open_session(tenant_id).await?;

        let token = CancellationToken::new();
        let previous = self
            .inner
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        self.inner.connected.store(true, Ordering::SeqCst);

        tokio::spawn(run_reader(
            self.inner.clone(),
            transport,
            tenant_id.to_string(),
            token,
        ));
        tracing::info!(tenant_id = %tenant_id, "Push channel connected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.inner.events.subscribe()
    }

    fn disconnect(&self) {
        let token = self
            .inner
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = token {
            token.cancel();
            tracing::info!("Push channel disconnected");
        }
        self.inner.connected.store(false, Ordering::SeqCst);
    }
}

impl Drop for MessagePushChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl ChannelInner {
    /// Open a transport and complete the handshake
    async fn open_session(&self, tenant_id: &str) -> Result<ClientTransport, PushError> {
        let connector = self
            .connector
            .as_ref()
            .ok_or_else(|| PushError::Connection("No push address configured".to_string()))?;
        let transport = connector.open().await?;

        if connector.needs_handshake() {
            let handshake = BusMessage::handshake(&HandshakePayload {
                version: PROTOCOL_VERSION,
                client_name: Some(self.config.client_name.clone()),
                client_version: Some(env!("CARGO_PKG_VERSION").to_string()),
                client_id: Some(self.client_id.clone()),
                tenant_id: Some(tenant_id.to_string()),
            });
            transport.write_message(&handshake).await?;

            tokio::time::timeout(
                self.config.handshake_timeout,
                self.await_handshake(&transport, handshake.request_id),
            )
            .await
            .map_err(|_| PushError::Timeout("No handshake response".to_string()))??;
        }

        Ok(transport)
    }

    async fn await_handshake(
        &self,
        transport: &ClientTransport,
        request_id: Uuid,
    ) -> Result<(), PushError> {
        loop {
            let msg = transport.read_message().await?;
            if msg.event_type == EventType::Response && msg.correlation_id == Some(request_id) {
                let response: ResponsePayload = msg
                    .parse_payload()
                    .map_err(|e| PushError::InvalidMessage(e.to_string()))?;
                if response.success {
                    return Ok(());
                }
                return Err(PushError::Handshake(response.message));
            }
            // Frames ahead of the handshake response are delivered as usual
            let _ = self.events.send(msg);
        }
    }

    /// Reconnect with exponential backoff; `None` when cancelled or out of attempts
    async fn reconnect(&self, tenant_id: &str, token: &CancellationToken) -> Option<ClientTransport> {
        let backoff = Backoff::exponential(self.config.max_reconnect_delay);
        let max_attempts = self.config.max_reconnect_attempts;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            if max_attempts > 0 && attempt > max_attempts {
                tracing::error!(attempts = max_attempts, "Push channel reconnect gave up");
                return None;
            }

            let delay = backoff.delay(self.config.reconnect_delay, attempt - 1);
            tokio::select! {
                _ = token.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            let result = tokio::select! {
                _ = token.cancelled() => return None,
                result = self.open_session(tenant_id) => result,
            };
            match result {
                Ok(transport) => return Some(transport),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Push channel reconnect failed");
                }
            }
        }
    }
}

async fn run_reader(
    inner: Arc<ChannelInner>,
    mut transport: ClientTransport,
    tenant_id: String,
    token: CancellationToken,
) {
    loop {
        let result = tokio::select! {
            _ = token.cancelled() => break,
            result = transport.read_message() => result,
        };

        match result {
            Ok(msg) => {
                if inner.events.send(msg).is_err() {
                    tracing::trace!("No subscribers for push frame");
                }
            }
            Err(e) => {
                inner.connected.store(false, Ordering::SeqCst);
                tracing::warn!(tenant_id = %tenant_id, error = %e, "Push channel read failed");
                if !inner.config.auto_reconnect {
                    break;
                }

                match inner.reconnect(&tenant_id, &token).await {
                    Some(next) => {
                        transport = next;
                        // a disconnect() may have raced the reconnect
                        if token.is_cancelled() {
                            break;
                        }
                        inner.connected.store(true, Ordering::SeqCst);
                        tracing::info!(tenant_id = %tenant_id, "Push channel reconnected");
                    }
                    None => break,
                }
            }
        }
    }
}
