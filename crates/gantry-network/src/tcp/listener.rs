use std::{io, net::SocketAddr, rc::Rc};

use gantry::{Error, Result};
use mio::{Interest, Registry, net::TcpListener};
use tracing::{info, trace, warn};

use crate::{
    socket::{ActivityContext, DataHandler, SendBuffer, Socket, SocketId},
    tcp::{ConnectionConfig, TcpConnectionSocket, set_socket_buf_size},
};

/// Accepting endpoint. Each accepted stream becomes a
/// [`TcpConnectionSocket`] inheriting this listener's configuration and
/// data handler, adopted into the manager through the activity context.
pub struct TcpListenerSocket {
    id: SocketId,
    listener: TcpListener,
    discovery_url: String,
    config: ConnectionConfig,
    registry: Option<Registry>,
    on_data: DataHandler,
    dying: bool,
}

impl TcpListenerSocket {
    pub fn bind(
        addr: SocketAddr,
        discovery_url: String,
        config: ConnectionConfig,
        on_data: DataHandler,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(TcpListenerSocket {
            id: SocketId::allocate(),
            listener,
            discovery_url,
            config,
            registry: None,
            on_data,
            dying: false,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Socket for TcpListenerSocket {
    fn id(&self) -> SocketId {
        self.id
    }

    fn is_listener(&self) -> bool {
        true
    }

    fn discovery_url(&self) -> Option<&str> {
        Some(&self.discovery_url)
    }

    fn register(&mut self, registry: &Registry) -> io::Result<()> {
        self.registry = Some(registry.try_clone()?);
        registry.register(&mut self.listener, self.id.token(), Interest::READABLE)
    }

    fn activity(&mut self, ctx: &mut ActivityContext) -> Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer_addr)) => {
                    info!(%peer_addr, "client connected");
                    set_socket_buf_size(
                        &stream,
                        self.config.recv_buffer_size,
                        self.config.send_buffer_size,
                    );
                    match TcpConnectionSocket::new(
                        stream,
                        peer_addr,
                        self.config,
                        Rc::clone(&self.on_data),
                    ) {
                        Ok(conn) => ctx.adopt(Box::new(conn)),
                        Err(err) => warn!(?err, "could not set up accepted connection"),
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    warn!(?err, "accept failed");
                    return Err(Error::Communication);
                }
            }
        }
    }

    fn may_delete(&self) -> bool {
        self.dying
    }

    fn close(&mut self) {
        if self.dying {
            return;
        }
        trace!(id = self.id.0, url = %self.discovery_url, "closing listener");
        if let Some(registry) = &self.registry {
            let _ = registry.deregister(&mut self.listener);
        }
        self.dying = true;
    }

    // listeners carry no send path
    fn acquire_send_buffer(&mut self, _len: usize) -> Result<SendBuffer> {
        Err(Error::Communication)
    }

    fn release_send_buffer(&mut self, _buf: SendBuffer) {}

    fn send(&mut self, _buf: SendBuffer) -> Result<()> {
        Err(Error::Communication)
    }
}
