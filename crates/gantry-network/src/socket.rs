use std::{
    io,
    ops::{Deref, DerefMut},
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use gantry::Result;
use mio::Registry;

/// Stable identity of a socket. Unique for the life of the process and
/// doubles as the poll token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SocketId(pub u64);

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

impl SocketId {
    pub fn allocate() -> SocketId {
        SocketId(NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn token(self) -> mio::Token {
        mio::Token(self.0 as usize)
    }
}

/// Upper-layer dispatch for inbound bytes. The handler may acquire, fill
/// and send response buffers on the socket it is handed.
pub type DataHandler = Rc<dyn Fn(&mut dyn Socket, &[u8]) -> Result<()>>;

/// Writable window leased from a socket's send path. Every lease is either
/// sent or handed back through `release_send_buffer`.
#[derive(Debug)]
pub struct SendBuffer {
    data: Vec<u8>,
}

impl SendBuffer {
    pub fn from_vec(data: Vec<u8>) -> Self {
        SendBuffer { data }
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl Deref for SendBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for SendBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Collects sockets created during an activity step (listener accepts);
/// the manager adopts them once the iteration is over.
#[derive(Default)]
pub struct ActivityContext {
    adopted: Vec<Box<dyn Socket>>,
}

impl ActivityContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn adopt(&mut self, sock: Box<dyn Socket>) {
        self.adopted.push(sock);
    }

    pub fn into_adopted(self) -> Vec<Box<dyn Socket>> {
        self.adopted
    }
}

/// Polymorphic endpoint driven by the network manager.
///
/// The manager owns the socket from registration until it drops it; a
/// socket that has no further work reports `may_delete` and is freed by
/// the manager, after at most one `close`. Implementations are
/// single-threaded and perform bounded work per call.
pub trait Socket {
    fn id(&self) -> SocketId;

    fn is_listener(&self) -> bool {
        false
    }

    /// Non-empty exactly for listeners; immutable once set.
    fn discovery_url(&self) -> Option<&str> {
        None
    }

    /// Attaches the socket's event source to the poll registry under its
    /// id token. Called once, by the manager, at registration.
    fn register(&mut self, registry: &Registry) -> io::Result<()>;

    /// One bounded I/O step, invoked when the socket is readable, writable
    /// or errored. Non-success tells the manager to close this socket.
    fn activity(&mut self, ctx: &mut ActivityContext) -> Result<()>;

    /// Monotonic: once true, stays true.
    fn may_delete(&self) -> bool;

    /// Idempotent shutdown; `may_delete` reports true afterwards. Safe to
    /// call from error paths.
    fn close(&mut self);

    /// Leases a writable window of at least `len` bytes. Fails with a
    /// communication error when `len` exceeds the configured send buffer
    /// size.
    fn acquire_send_buffer(&mut self, len: usize) -> Result<SendBuffer>;

    /// Returns a lease unsent, e.g. after an aborted encode.
    fn release_send_buffer(&mut self, buf: SendBuffer);

    /// Hands a filled lease to the socket for transmission. On success the
    /// socket owns the transmit lifecycle; the lease contents are zeroed
    /// before the window is reused.
    fn send(&mut self, buf: SendBuffer) -> Result<()>;
}
