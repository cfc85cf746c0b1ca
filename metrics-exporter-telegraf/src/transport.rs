use std::{
    io::{self, Read as _, Write as _},
    net::{Shutdown, SocketAddr},
    time::Duration,
};

use mio::net::TcpStream;
use quanta::{Clock, Instant};
use tracing::trace;

// Outbound bytes that have not reached the socket yet. Lines that would grow the backlog past this are dropped.
const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Progress reported by a [`Transport`] when polled.
#[derive(Debug)]
pub enum TransportEvent {
    /// The pending connect completed.
    Connected,

    /// The connection failed, or was lost. The transport has already released it.
    Failed(io::Error),
}

/// What became of a payload handed to [`Transport::send`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The payload was written, or queued behind earlier writes.
    Queued,

    /// The outbound backlog was full and the payload was discarded. The connection is kept.
    Dropped,
}

/// An outbound stream connection.
///
/// Connecting is non-blocking: [`connect`](Transport::connect) only starts the attempt, and completion (or failure) is
/// observed later through [`poll`](Transport::poll). A transport holds at most one connection at a time.
pub trait Transport {
    /// Starts connecting to `addr`, dropping any existing connection.
    ///
    /// # Errors
    ///
    /// If the attempt cannot even be started, an error is returned and no connection is held.
    fn connect(&mut self, addr: SocketAddr) -> io::Result<()>;

    /// Drives pending I/O, returning any change in the connection's status.
    fn poll(&mut self) -> Option<TransportEvent>;

    /// Queues `payload` for sending and tries to flush it.
    ///
    /// Returns [`SendOutcome::Dropped`] if the payload was discarded without touching the connection.
    ///
    /// # Errors
    ///
    /// If the connection is not established, or writing fails, an error is returned. A write failure releases the
    /// connection.
    fn send(&mut self, payload: &[u8]) -> io::Result<SendOutcome>;

    /// Releases the connection, if any.
    fn close(&mut self);
}

struct Connection {
    stream: TcpStream,
    established: bool,
    started: Instant,
    pending: Vec<u8>,
}

impl Connection {
    fn check_connect(&mut self, now: Instant, timeout: Duration) -> io::Result<bool> {
        if let Some(e) = self.stream.take_error()? {
            return Err(e);
        }

        match self.stream.peer_addr() {
            Ok(_) => {
                self.established = true;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotConnected => {
                if now.saturating_duration_since(self.started) >= timeout {
                    Err(io::Error::new(io::ErrorKind::TimedOut, "connection timed out"))
                } else {
                    Ok(false)
                }
            }
            Err(e) => Err(e),
        }
    }

    // Anything the collector sends back is read and thrown away.
    fn discard_inbound(&mut self) -> io::Result<()> {
        let mut buf = [0u8; 512];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed by remote host",
                    ))
                }
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        while !self.pending.is_empty() {
            match self.stream.write(&self.pending) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.pending.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// A [`Transport`] over a non-blocking TCP stream.
pub struct TcpTransport {
    clock: Clock,
    connect_timeout: Duration,
    connection: Option<Connection>,
}

impl TcpTransport {
    /// Creates a new `TcpTransport`.
    ///
    /// A connect that has not completed within `connect_timeout` fails with a timeout error.
    pub fn new(clock: Clock, connect_timeout: Duration) -> Self {
        Self { clock, connect_timeout, connection: None }
    }

    fn fail(&mut self, e: io::Error) -> TransportEvent {
        self.close();
        TransportEvent::Failed(e)
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, addr: SocketAddr) -> io::Result<()> {
        self.close();

        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        self.connection = Some(Connection {
            stream,
            established: false,
            started: self.clock.now(),
            pending: Vec::new(),
        });
        Ok(())
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        let now = self.clock.now();
        let connection = self.connection.as_mut()?;

        if !connection.established {
            return match connection.check_connect(now, self.connect_timeout) {
                Ok(true) => Some(TransportEvent::Connected),
                Ok(false) => None,
                Err(e) => Some(self.fail(e)),
            };
        }

        match connection.discard_inbound().and_then(|()| connection.flush()) {
            Ok(()) => None,
            Err(e) => Some(self.fail(e)),
        }
    }

    fn send(&mut self, payload: &[u8]) -> io::Result<SendOutcome> {
        let connection = match self.connection.as_mut() {
            Some(connection) if connection.established => connection,
            _ => return Err(io::ErrorKind::NotConnected.into()),
        };

        if connection.pending.len() + payload.len() > MAX_PENDING_BYTES {
            trace!(pending = connection.pending.len(), "Outbound backlog full, dropping payload.");
            return Ok(SendOutcome::Dropped);
        }

        connection.pending.extend_from_slice(payload);
        if let Err(e) = connection.flush() {
            self.close();
            return Err(e);
        }
        Ok(SendOutcome::Queued)
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            let _ = connection.stream.shutdown(Shutdown::Both);
        }
    }
}
