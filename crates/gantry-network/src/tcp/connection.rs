use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    net::SocketAddr,
    rc::Rc,
};

use gantry::{Error, Result};
use mio::{Interest, Registry, net::TcpStream};
use tracing::{debug, trace, warn};

use crate::socket::{ActivityContext, DataHandler, SendBuffer, Socket, SocketId};

/// Receive/send buffer sizing for one endpoint.
#[derive(Clone, Copy, Debug)]
pub struct ConnectionConfig {
    pub recv_buffer_size: usize,
    pub send_buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig { recv_buffer_size: 65535, send_buffer_size: 65535 }
    }
}

/// Established TCP endpoint.
///
/// Inbound: reads are drained until the kernel would block, each filled
/// stretch dispatched to the upper-layer handler, which may answer through
/// the send-buffer lease on the same socket.
///
/// Outbound: `send` writes straight to the kernel; any unwritten remainder
/// is queued and flushed on writable events. WRITABLE interest is armed
/// exactly while the backlog is non-empty.
pub struct TcpConnectionSocket {
    id: SocketId,
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: ConnectionConfig,
    registry: Option<Registry>,
    recv_buf: Vec<u8>,
    /// Send window parked here between leases; zeroed after every send.
    send_stash: Option<Vec<u8>>,
    send_backlog: VecDeque<Vec<u8>>,
    /// Invariant: `writable_armed == !send_backlog.is_empty()`
    writable_armed: bool,
    on_data: DataHandler,
    dying: bool,
}

impl TcpConnectionSocket {
    pub fn new(
        stream: TcpStream,
        peer_addr: SocketAddr,
        config: ConnectionConfig,
        on_data: DataHandler,
    ) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        Ok(TcpConnectionSocket {
            id: SocketId::allocate(),
            stream,
            peer_addr,
            config,
            registry: None,
            recv_buf: vec![0; config.recv_buffer_size],
            send_stash: Some(Vec::with_capacity(config.send_buffer_size)),
            send_backlog: VecDeque::new(),
            writable_armed: false,
            on_data,
            dying: false,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Arm WRITABLE notifications when the backlog goes non-empty.
    fn arm_writable(&mut self) -> Result<()> {
        if self.writable_armed {
            return Ok(());
        }
        let registry = self.registry.as_ref().ok_or(Error::Internal)?;
        if let Err(err) = registry.reregister(
            &mut self.stream,
            self.id.token(),
            Interest::READABLE | Interest::WRITABLE,
        ) {
            debug!(?err, "reregister for writable failed");
            return Err(Error::Communication);
        }
        self.writable_armed = true;
        Ok(())
    }

    /// Flush queued data until the kernel blocks or the queue drains.
    fn drain_backlog(&mut self) -> Result<()> {
        while let Some(front) = self.send_backlog.front_mut() {
            match self.stream.write(front) {
                Ok(0) => return Err(Error::Communication),
                Ok(n) => {
                    if n == front.len() {
                        self.send_backlog.pop_front();
                    } else {
                        front.drain(..n);
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    debug!(?err, "write from backlog failed");
                    return Err(Error::Communication);
                }
            }
        }

        // drop WRITABLE interest only when fully drained
        if self.send_backlog.is_empty() && self.writable_armed {
            let registry = self.registry.as_ref().ok_or(Error::Internal)?;
            if let Err(err) =
                registry.reregister(&mut self.stream, self.id.token(), Interest::READABLE)
            {
                debug!(?err, "reregister to drop writable failed");
                return Err(Error::Communication);
            }
            self.writable_armed = false;
        }
        Ok(())
    }

    fn transmit(&mut self, mut data: &[u8]) -> Result<()> {
        if !self.send_backlog.is_empty() {
            self.send_backlog.push_back(data.to_vec());
            return self.arm_writable();
        }
        loop {
            match self.stream.write(data) {
                Ok(0) => {
                    warn!(id = self.id.0, "stream refused to take bytes");
                    return Err(Error::Communication);
                }
                Ok(n) if n == data.len() => return Ok(()),
                Ok(n) => data = &data[n..],
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.send_backlog.push_back(data.to_vec());
                    return self.arm_writable();
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    warn!(id = self.id.0, ?err, "stream write failed");
                    return Err(Error::Communication);
                }
            }
        }
    }

    fn shut_down(&mut self) {
        if self.dying {
            return;
        }
        trace!(id = self.id.0, peer = %self.peer_addr, "terminating connection");
        if let Some(registry) = &self.registry {
            let _ = registry.deregister(&mut self.stream);
        }
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        self.dying = true;
    }
}

impl Socket for TcpConnectionSocket {
    fn id(&self) -> SocketId {
        self.id
    }

    fn register(&mut self, registry: &Registry) -> io::Result<()> {
        self.registry = Some(registry.try_clone()?);
        registry.register(&mut self.stream, self.id.token(), Interest::READABLE)
    }

    fn activity(&mut self, _ctx: &mut ActivityContext) -> Result<()> {
        if self.dying {
            return Ok(());
        }

        let handler = Rc::clone(&self.on_data);
        let mut buf = std::mem::take(&mut self.recv_buf);
        let mut outcome = Ok(());
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    // peer closed; nothing further to read
                    self.shut_down();
                    break;
                }
                Ok(n) => {
                    if let Err(err) = handler(self, &buf[..n]) {
                        outcome = Err(err);
                        break;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    warn!(id = self.id.0, ?err, "receive failed");
                    outcome = Err(Error::Communication);
                    break;
                }
            }
        }
        self.recv_buf = buf;
        outcome?;

        if self.dying {
            return Ok(());
        }
        self.drain_backlog()
    }

    fn may_delete(&self) -> bool {
        self.dying
    }

    fn close(&mut self) {
        self.shut_down();
    }

    fn acquire_send_buffer(&mut self, len: usize) -> Result<SendBuffer> {
        if len > self.config.send_buffer_size {
            return Err(Error::Communication);
        }
        let mut data = self.send_stash.take().ok_or(Error::Internal)?;
        data.clear();
        data.resize(len, 0);
        Ok(SendBuffer::from_vec(data))
    }

    fn release_send_buffer(&mut self, buf: SendBuffer) {
        self.send_stash = Some(buf.into_vec());
    }

    fn send(&mut self, buf: SendBuffer) -> Result<()> {
        let mut data = buf.into_vec();
        let result = self.transmit(&data);
        data.fill(0);
        self.send_stash = Some(data);
        result
    }
}
