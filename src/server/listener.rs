//! TCP listener for the admission line protocol.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::protocol::Reply;
use super::service::CommandService;
use crate::error::Result;
use crate::ratelimit::AdmissionBackend;

/// Default upper bound on one command line, in bytes.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// Server for the admission line protocol.
pub struct Server<R: AdmissionBackend + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// Shared command handler
    service: Arc<CommandService<R>>,
    /// Longest accepted command line
    max_line_bytes: usize,
}

impl<R: AdmissionBackend + 'static> Server<R> {
    /// Create a new server backed by `backend`.
    pub fn new(addr: SocketAddr, backend: Arc<R>) -> Self {
        Self {
            addr,
            service: Arc::new(CommandService::new(backend)),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    /// Set the longest command line a client may send.
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Start the server.
    ///
    /// This method will block until the listener fails.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server stops accepting connections when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind");
            e
        })?;

        self.run(listener, signal).await
    }

    /// Accept connections from an already bound listener until `signal`
    /// resolves.
    pub async fn run<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        info!(
            addr = %listener.local_addr()?,
            max_line_bytes = self.max_line_bytes,
            "Accepting admission commands"
        );

        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => {
                    info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let service = self.service.clone();
                        let max_line_bytes = self.max_line_bytes;
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, service, max_line_bytes).await {
                                warn!(peer = %peer, error = %e, "Connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }

        Ok(())
    }
}

#[instrument(skip(stream, service, max_line_bytes), fields(conn = %Uuid::new_v4()))]
async fn handle_connection<R: AdmissionBackend + 'static>(
    stream: TcpStream,
    peer: SocketAddr,
    service: Arc<CommandService<R>>,
    max_line_bytes: usize,
) -> std::io::Result<()> {
    debug!("Connection opened");

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    // Room for the command plus a CRLF terminator
    let limit = u64::try_from(max_line_bytes).unwrap_or(u64::MAX).saturating_add(2);

    loop {
        line.clear();
        let read = (&mut reader).take(limit).read_until(b'\n', &mut line).await?;
        if read == 0 {
            break;
        }

        let terminated = line.ends_with(b"\n");
        let command = strip_terminator(&line);

        let reply = if command.len() > max_line_bytes {
            warn!(max_line_bytes = max_line_bytes, "Command line too long");
            if !terminated {
                skip_line(&mut reader).await?;
            }
            Reply::Error(format!("line exceeds {} bytes", max_line_bytes))
        } else {
            match std::str::from_utf8(command) {
                Ok(text) => service.handle(text).await,
                Err(_) => Reply::Error("command is not valid UTF-8".to_string()),
            }
        };

        writer.write_all(format!("{}\n", reply).as_bytes()).await?;

        if reply.closes_connection() {
            break;
        }
    }

    debug!("Connection closed");
    Ok(())
}

/// The line without its trailing `\n` or `\r\n`.
fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Discard input up to and including the next newline.
async fn skip_line<B: AsyncBufRead + Unpin>(reader: &mut B) -> std::io::Result<()> {
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Ok(());
        }
        match buf.iter().position(|b| *b == b'\n') {
            Some(end) => {
                reader.consume(end + 1);
                return Ok(());
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ratelimit::AdmissionEngine;
    use crate::store::MemoryStore;
    use tokio::sync::oneshot;

    async fn start(max_line_bytes: usize) -> (SocketAddr, oneshot::Sender<()>) {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let engine = Arc::new(AdmissionEngine::with_clock(store, clock));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        let server = Server::new(addr, engine).with_max_line_bytes(max_line_bytes);
        tokio::spawn(async move {
            server
                .run(listener, async move {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        (addr, tx)
    }

    async fn roundtrip(
        reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
        writer: &mut tokio::net::tcp::OwnedWriteHalf,
        command: &str,
    ) -> String {
        writer.write_all(format!("{}\n", command).as_bytes()).await.unwrap();
        let mut reply = String::new();
        reader.read_line(&mut reply).await.unwrap();
        reply.trim_end().to_string()
    }

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:7480".parse().unwrap();
        let engine = Arc::new(AdmissionEngine::new(Arc::new(MemoryStore::new())));
        let server = Server::new(addr, engine).with_max_line_bytes(128);
        assert_eq!(server.max_line_bytes, 128);
    }

    #[tokio::test]
    async fn test_admit_over_tcp() {
        let (addr, _shutdown) = start(DEFAULT_MAX_LINE_BYTES).await;
        let (reader, mut writer) = TcpStream::connect(addr).await.unwrap().into_split();
        let mut reader = BufReader::new(reader);

        assert_eq!(roundtrip(&mut reader, &mut writer, "PING").await, "PONG");
        assert_eq!(
            roundtrip(&mut reader, &mut writer, "ADMIT user 10 100 0").await,
            "1 9 0 10"
        );
        assert_eq!(
            roundtrip(&mut reader, &mut writer, "ADMIT user 100 100 0").await,
            "0 0 10 10"
        );
        assert_eq!(
            roundtrip(&mut reader, &mut writer, "ADMIT user -1 100").await,
            "ERR invalid arguments: negative cost for limiter user"
        );
        assert_eq!(roundtrip(&mut reader, &mut writer, "QUIT").await, "BYE");

        let mut rest = String::new();
        assert_eq!(reader.read_line(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_long_line_is_rejected() {
        let (addr, _shutdown) = start(16).await;
        let (reader, mut writer) = TcpStream::connect(addr).await.unwrap().into_split();
        let mut reader = BufReader::new(reader);

        let reply = roundtrip(
            &mut reader,
            &mut writer,
            "ADMIT some/very/long/key 1 10 0",
        )
        .await;
        assert_eq!(reply, "ERR line exceeds 16 bytes");

        // The rest of the long line is discarded and the connection stays usable
        assert_eq!(roundtrip(&mut reader, &mut writer, "PING").await, "PONG");
    }

    #[tokio::test]
    async fn test_line_at_limit_is_accepted() {
        let (addr, _shutdown) = start(4).await;
        let (reader, mut writer) = TcpStream::connect(addr).await.unwrap().into_split();
        let mut reader = BufReader::new(reader);

        assert_eq!(roundtrip(&mut reader, &mut writer, "PING").await, "PONG");

        writer.write_all(b"PING\r\n").await.unwrap();
        let mut reply = String::new();
        reader.read_line(&mut reply).await.unwrap();
        assert_eq!(reply, "PONG\n");

        assert_eq!(
            roundtrip(&mut reader, &mut writer, "PINGS").await,
            "ERR line exceeds 4 bytes"
        );
        assert_eq!(roundtrip(&mut reader, &mut writer, "PING").await, "PONG");
    }

    #[test]
    fn test_strip_terminator() {
        assert_eq!(strip_terminator(b"PING\n"), b"PING");
        assert_eq!(strip_terminator(b"PING\r\n"), b"PING");
        assert_eq!(strip_terminator(b"PING"), b"PING");
        assert_eq!(strip_terminator(b"\n"), b"");
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting() {
        let (addr, shutdown) = start(DEFAULT_MAX_LINE_BYTES).await;
        shutdown.send(()).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        assert!(TcpStream::connect(addr).await.is_err());
    }
}
