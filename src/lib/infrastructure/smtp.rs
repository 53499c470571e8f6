//! SMTP server
//!
//! Accepts mail from local clients and hands every completed message to a
//! [`DeliveryService`].

use std::{fmt, future::Future, net::SocketAddr, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    signal,
    task::JoinSet,
};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::domain::communication::{delivery::DeliveryService, mime::normalize};

use self::session::{Session, Step};

pub use self::response::Reply;

mod response;
mod session;

/// Largest message accepted when none is configured
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 10 * 1024 * 1024;

/// Longest chunk read from the wire at once
const MAX_LINE_BYTES: u64 = 8 * 1024;

/// How long open sessions may run after shutdown was requested
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Configuration for the SMTP server.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
pub struct SmtpServerConfig {
    /// The address to listen on
    #[clap(long, env = "SMTP_LISTEN_ADDR", default_value = "0.0.0.0:2525")]
    pub listen_addr: String,

    /// Listen on all interfaces on this port instead of `listen_addr`
    #[clap(long, env = "PORT")]
    pub port: Option<u16>,

    /// The hostname announced to clients
    #[clap(long, env = "SMTP_HOSTNAME", default_value = "localhost")]
    pub hostname: String,

    /// The largest accepted message, in bytes
    #[clap(long, env = "SMTP_MAX_MESSAGE_BYTES", default_value_t = DEFAULT_MAX_MESSAGE_BYTES)]
    pub max_message_bytes: usize,
}

impl SmtpServerConfig {
    /// The address to bind, taking the `PORT` override into account
    pub fn bind_addr(&self) -> String {
        match self.port {
            Some(port) => format!("0.0.0.0:{port}"),
            None => self.listen_addr.clone(),
        }
    }
}

/// A server that runs until it is told to stop
#[async_trait]
pub trait Server {
    /// Runs the server until a shutdown signal is received
    async fn run(self) -> Result<()>;
}

/// The application's SMTP server
pub struct SmtpServer<D: DeliveryService> {
    delivery: D,
    listener: TcpListener,
    hostname: String,
    max_message_bytes: usize,
}

impl<D: DeliveryService> fmt::Debug for SmtpServer<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpServer")
            .field("delivery", &"DeliveryService")
            .field("listener", &self.listener)
            .field("hostname", &self.hostname)
            .field("max_message_bytes", &self.max_message_bytes)
            .finish()
    }
}

impl<D: DeliveryService> SmtpServer<D> {
    /// Returns a new SMTP server bound to the address in `config`.
    pub async fn new(delivery: D, config: SmtpServerConfig) -> Result<Self> {
        let address = config.bind_addr();
        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("failed to listen on {address}"))?;

        Ok(Self {
            delivery,
            listener,
            hostname: config.hostname,
            max_message_bytes: config.max_message_bytes,
        })
    }

    /// The address the server is listening on
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("failed to get local address")
    }

    /// Accepts connections until `shutdown` completes, then gives open
    /// sessions a grace period to finish.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send) -> Result<()> {
        info!(address = %self.local_addr()?, "smtp_listen");

        tokio::pin!(shutdown);
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(connection) => connection,
                        Err(error) => {
                            warn!(%error, "failed to accept connection");
                            continue;
                        }
                    };

                    let connection = Connection {
                        delivery: self.delivery.clone(),
                        session: Session::new(&self.hostname, self.max_message_bytes),
                    };
                    let span = info_span!("smtp_session", session_id = %Uuid::now_v7(), %peer);

                    sessions.spawn(
                        async move {
                            if let Err(error) = connection.run(stream).await {
                                warn!(error = %format!("{error:#}"), "session ended with an error");
                            }
                        }
                        .instrument(span),
                    );
                }
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
                _ = &mut shutdown => {
                    info!("shutdown_signal_received");
                    break;
                }
            }
        }

        drop(self.listener);

        let drain = async { while sessions.join_next().await.is_some() {} };
        if tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, drain).await.is_err() {
            warn!(open = sessions.len(), "closing sessions still open after the grace period");
        }

        Ok(())
    }
}

#[async_trait]
impl<D: DeliveryService> Server for SmtpServer<D> {
    #[mutants::skip]
    async fn run(self) -> Result<()> {
        self.serve(shutdown_signal()).await
    }
}

struct Connection<D: DeliveryService> {
    delivery: D,
    session: Session,
}

impl<D: DeliveryService> Connection<D> {
    async fn run(mut self, stream: TcpStream) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();

        write_reply(&mut writer, &self.session.greeting()).await?;

        loop {
            line.clear();

            let read = (&mut reader)
                .take(MAX_LINE_BYTES)
                .read_until(b'\n', &mut line)
                .await
                .context("failed to read from client")?;

            if read == 0 {
                debug!("client disconnected");
                return Ok(());
            }

            match self.session.handle_line(&line) {
                Step::Continue => {}
                Step::Reply(reply) => write_reply(&mut writer, &reply).await?,
                Step::Close(reply) => {
                    write_reply(&mut writer, &reply).await?;
                    return Ok(());
                }
                Step::Deliver(envelope) => {
                    let email = normalize(&envelope.from, &envelope.recipients, &envelope.data);
                    let result = self.delivery.handle(email).await;

                    if let Err(error) = &result {
                        warn!(%error, "message not delivered");
                    }

                    write_reply(&mut writer, &Reply::delivery(&result)).await?;
                }
            }
        }
    }
}

async fn write_reply(writer: &mut (impl AsyncWrite + Unpin), reply: &Reply) -> Result<()> {
    writer
        .write_all(reply.to_string().as_bytes())
        .await
        .context("failed to write to client")
}

/// Completes when the process receives Ctrl+C or SIGTERM.
#[mutants::skip]
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            warn!(%error, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(error) => {
                warn!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
