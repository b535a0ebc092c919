//! TCP server terminal.
//!
//! Listens on a socket, serves one client at a time and forwards bytes in both directions. Bytes
//! sent while no client is connected are dropped.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;

use crate::ByteStreamEndpoint;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);
const READ_POLL_INTERVAL: Duration = Duration::from_millis(50);

const IAC: u8 = 255;
const WILL: u8 = 251;
const WONT: u8 = 252;
const DO: u8 = 253;
const OPT_BINARY: u8 = 0;
const OPT_ECHO: u8 = 1;
const OPT_SUPPRESS_GO_AHEAD: u8 = 3;
const OPT_LINEMODE: u8 = 34;

/// Telnet negotiation sent to each new client when [`TerminalOptions::emit_config_bytes`] is set.
///
/// Puts an interactive telnet client into raw character mode.
pub const TELNET_CONFIG_BYTES: [u8; 12] = [
    IAC,
    DO,
    OPT_BINARY,
    IAC,
    WILL,
    OPT_ECHO,
    IAC,
    WILL,
    OPT_SUPPRESS_GO_AHEAD,
    IAC,
    WONT,
    OPT_LINEMODE,
];

#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("failed to bind terminal socket {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("terminal socket I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalOptions {
    /// Send [`TELNET_CONFIG_BYTES`] to every new client.
    pub emit_config_bytes: bool,
    /// Disable Nagle's algorithm on client connections.
    pub tcp_nodelay: bool,
}

impl Default for TerminalOptions {
    fn default() -> Self {
        Self {
            emit_config_bytes: true,
            tcp_nodelay: false,
        }
    }
}

type ClientSlot = Arc<Mutex<Option<TcpStream>>>;

fn lock_slot(slot: &ClientSlot) -> std::sync::MutexGuard<'_, Option<TcpStream>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Cloneable outbound handle to a [`SocketTerminal`]'s current client.
#[derive(Debug, Clone)]
pub struct TerminalSender {
    client: ClientSlot,
}

impl TerminalSender {
    /// Whether a client is currently connected.
    pub fn is_connected(&self) -> bool {
        lock_slot(&self.client).is_some()
    }
}

impl ByteStreamEndpoint for TerminalSender {
    fn send_byte(&mut self, byte: u8) {
        let mut slot = lock_slot(&self.client);
        let Some(stream) = slot.as_mut() else {
            return;
        };
        if let Err(err) = stream.write_all(&[byte]) {
            tracing::warn!("terminal client write failed, dropping client: {err}");
            let _ = stream.shutdown(Shutdown::Both);
            *slot = None;
        }
    }
}

/// TCP server backend for a byte-stream peripheral.
///
/// Received bytes are delivered to the `on_byte` callback from the terminal's own I/O thread.
#[derive(Debug)]
pub struct SocketTerminal {
    local_addr: SocketAddr,
    client: ClientSlot,
    stop: Arc<AtomicBool>,
    io_thread: Option<JoinHandle<()>>,
}

impl SocketTerminal {
    pub fn start<A, F>(addr: A, options: TerminalOptions, on_byte: F) -> Result<Self, TerminalError>
    where
        A: ToSocketAddrs + std::fmt::Debug,
        F: FnMut(u8) + Send + 'static,
    {
        let listener = TcpListener::bind(&addr).map_err(|source| TerminalError::Bind {
            addr: format!("{addr:?}"),
            source,
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let client: ClientSlot = Arc::new(Mutex::new(None));
        let stop = Arc::new(AtomicBool::new(false));

        let io_thread = std::thread::Builder::new()
            .name(format!("socket-terminal-{}", local_addr.port()))
            .spawn({
                let client = client.clone();
                let stop = stop.clone();
                move || serve(listener, options, client, stop, on_byte)
            })?;

        tracing::info!("socket terminal listening on {local_addr}");
        Ok(Self {
            local_addr,
            client,
            stop,
            io_thread: Some(io_thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn sender(&self) -> TerminalSender {
        TerminalSender {
            client: self.client.clone(),
        }
    }

    /// Stop accepting clients, disconnect the current one and join the I/O thread.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(stream) = lock_slot(&self.client).take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        if let Some(thread) = self.io_thread.take() {
            if thread.join().is_err() {
                tracing::error!("socket terminal I/O thread panicked");
            }
        }
    }
}

impl ByteStreamEndpoint for SocketTerminal {
    fn send_byte(&mut self, byte: u8) {
        self.sender().send_byte(byte);
    }
}

impl Drop for SocketTerminal {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn serve<F: FnMut(u8)>(
    listener: TcpListener,
    options: TerminalOptions,
    client: ClientSlot,
    stop: Arc<AtomicBool>,
    mut on_byte: F,
) {
    while !stop.load(Ordering::SeqCst) {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
            Err(err) => {
                tracing::warn!("socket terminal accept failed: {err}");
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
        };

        tracing::info!("socket terminal client connected: {peer}");
        if let Err(err) = serve_client(stream, options, &client, &stop, &mut on_byte) {
            tracing::warn!("socket terminal client {peer} failed: {err}");
        }
        lock_slot(&client).take();
        tracing::info!("socket terminal client disconnected: {peer}");
    }
}

fn serve_client<F: FnMut(u8)>(
    mut stream: TcpStream,
    options: TerminalOptions,
    client: &ClientSlot,
    stop: &AtomicBool,
    on_byte: &mut F,
) -> io::Result<()> {
    // Accepted sockets may inherit the listener's non-blocking flag on some platforms.
    stream.set_nonblocking(false)?;
    stream.set_nodelay(options.tcp_nodelay)?;
    stream.set_read_timeout(Some(READ_POLL_INTERVAL))?;

    {
        let mut slot = lock_slot(client);
        let mut writer = stream.try_clone()?;
        if options.emit_config_bytes {
            writer.write_all(&TELNET_CONFIG_BYTES)?;
        }
        *slot = Some(writer);
    }

    let mut buf = [0u8; 256];
    while !stop.load(Ordering::SeqCst) {
        match stream.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => {
                for &byte in &buf[..n] {
                    tracing::trace!(byte, "socket terminal rx");
                    on_byte(byte);
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
