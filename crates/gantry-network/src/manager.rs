use std::{io, time::Duration};

use gantry::{Error, Result};
use mio::{Events, Poll, Registry, Token};
use tracing::{debug, error, trace, warn};

use crate::socket::{ActivityContext, Socket, SocketId};

/// Readiness-multiplexing dispatcher owning a dynamic set of sockets.
///
/// Single-threaded: the server's main loop calls [`process`] repeatedly
/// with a timeout budget. Sockets are visited in registration order; the
/// iteration tolerates removals, so a socket that flags itself for
/// deletion is reaped within the same step.
///
/// [`process`]: NetworkManager::process
pub struct NetworkManager {
    poll: Poll,
    events: Events,
    sockets: Vec<Box<dyn Socket>>,
    num_listener_sockets: usize,
}

impl NetworkManager {
    pub fn new() -> io::Result<Self> {
        Ok(NetworkManager {
            poll: Poll::new()?,
            events: Events::with_capacity(128),
            sockets: Vec::new(),
            num_listener_sockets: 0,
        })
    }

    pub fn registry(&self) -> &Registry {
        self.poll.registry()
    }

    pub fn socket_count(&self) -> usize {
        self.sockets.len()
    }

    pub fn num_listener_sockets(&self) -> usize {
        self.num_listener_sockets
    }

    /// Takes ownership of `sock` and attaches its event source. Each
    /// socket may be registered at most once.
    pub fn register_socket(&mut self, mut sock: Box<dyn Socket>) -> Result<()> {
        debug_assert!(
            self.sockets.iter().all(|s| s.id() != sock.id()),
            "socket {:?} registered twice",
            sock.id()
        );
        if let Err(err) = sock.register(self.poll.registry()) {
            warn!(id = sock.id().0, ?err, "could not attach socket event source");
            return Err(Error::Communication);
        }
        if sock.is_listener() {
            self.num_listener_sockets += 1;
        }
        trace!(id = sock.id().0, "registered socket");
        self.sockets.push(sock);
        Ok(())
    }

    /// Removes a registration and hands the socket back without closing or
    /// freeing it; that is the caller's responsibility when bypassing the
    /// normal reap path. Unknown ids are not an error.
    pub fn unregister_socket(&mut self, id: SocketId) -> Option<Box<dyn Socket>> {
        let pos = self.sockets.iter().position(|s| s.id() == id)?;
        let sock = self.sockets.remove(pos);
        if sock.is_listener() {
            self.num_listener_sockets -= 1;
        }
        trace!(id = id.0, "unregistered socket");
        Some(sock)
    }

    /// One multiplex step bounded by `timeout`.
    ///
    /// Waits for readiness, runs `activity` on every ready socket (closing
    /// it on failure), and reaps sockets whose `may_delete` reports true.
    /// The deletion check runs after the activity dispatch as well, so a
    /// socket flagged during its final activity still has that last read
    /// drained before it is freed.
    pub fn process(&mut self, timeout: Duration) -> Result<()> {
        if let Err(err) = self.poll.poll(&mut self.events, Some(timeout)) {
            // transient; the caller just retries on the next iteration
            warn!(?err, "readiness wait failed");
            return Ok(());
        }

        let mut ready: Vec<Token> = Vec::new();
        for event in &self.events {
            if !ready.contains(&event.token()) {
                ready.push(event.token());
            }
        }

        let mut ctx = ActivityContext::new();
        let mut result = Ok(());
        let mut i = 0;
        while i < self.sockets.len() {
            let id = self.sockets[i].id();
            if !ready.contains(&id.token()) {
                // quiescent sockets still get their deletion check
                if self.sockets[i].may_delete() {
                    self.reap(i);
                } else {
                    i += 1;
                }
                continue;
            }

            trace!(id = id.0, "activity on socket");
            if let Err(err) = self.sockets[i].activity(&mut ctx) {
                debug!(id = id.0, %err, "socket activity failed, closing");
                self.sockets[i].close();
                result = Err(err);
            }

            // flagged during its final activity: the last read has been
            // drained, the socket can go now
            if self.sockets[i].may_delete() {
                self.reap(i);
            } else {
                i += 1;
            }
        }

        for sock in ctx.into_adopted() {
            // failures are logged inside; accepting the rest still makes
            // progress
            let _ = self.register_socket(sock);
        }

        result
    }

    /// Discovery URLs of all listeners, in registration order.
    pub fn discovery_urls(&self) -> Result<Vec<String>> {
        let mut urls = Vec::with_capacity(self.num_listener_sockets);
        for sock in &self.sockets {
            if !sock.is_listener() {
                continue;
            }
            if urls.len() == self.num_listener_sockets {
                error!("listener count diverged from the registration set");
                return Err(Error::Internal);
            }
            let url = sock.discovery_url().ok_or(Error::Internal)?;
            urls.push(url.to_owned());
        }
        if urls.len() != self.num_listener_sockets {
            error!("listener count diverged from the registration set");
            return Err(Error::Internal);
        }
        Ok(urls)
    }

    /// Closes and frees every remaining socket, best-effort.
    pub fn shutdown(&mut self) {
        trace!("shutting down network manager");
        for mut sock in self.sockets.drain(..) {
            trace!(id = sock.id().0, "removing remaining socket");
            sock.close();
        }
        self.num_listener_sockets = 0;
    }

    fn reap(&mut self, index: usize) {
        let sock = self.sockets.remove(index);
        if sock.is_listener() {
            self.num_listener_sockets -= 1;
        }
        trace!(id = sock.id().0, "freeing socket");
    }
}

impl Drop for NetworkManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
