use std::{
    io,
    net::SocketAddr,
    rc::Rc,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use gantry::{
    Decoder, Result, StatusCode, TypeId, TypeTable, Value, Variant, calc_size, encode_into,
};
use gantry_network::{DataHandler, NetworkManager, TcpListenerSocket};
use tracing::{debug, info, trace, warn};

use crate::{CallbackId, CallbackScheduler, ServerConfig};

/// Server runtime: owns the network manager and the repeated-callback
/// scheduler and drives both from a cooperative main loop.
pub struct Server {
    config: ServerConfig,
    network: NetworkManager,
    scheduler: CallbackScheduler,
}

impl Server {
    pub fn new(config: ServerConfig) -> io::Result<Self> {
        Self::with_clock(config, quanta::Clock::new())
    }

    /// Tests hand in a mocked clock for the scheduler.
    pub fn with_clock(config: ServerConfig, clock: quanta::Clock) -> io::Result<Self> {
        Ok(Server {
            config,
            network: NetworkManager::new()?,
            scheduler: CallbackScheduler::with_clock(clock),
        })
    }

    /// Binds the configured listener and installs the request dispatcher.
    pub fn bind(&mut self) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = TcpListenerSocket::bind(
            addr,
            self.config.discovery_url(),
            self.config.connection(),
            dispatch_handler(),
        )
        .map_err(|err| {
            warn!(?err, port = self.config.port, "could not bind listener");
            gantry::Error::Communication
        })?;
        info!(url = %self.config.discovery_url(), "listening");
        self.network.register_socket(Box::new(listener))
    }

    pub fn network(&mut self) -> &mut NetworkManager {
        &mut self.network
    }

    pub fn discovery_urls(&self) -> Result<Vec<String>> {
        self.network.discovery_urls()
    }

    pub fn add_repeated_callback(
        &mut self,
        interval: Duration,
        callback: Box<dyn FnMut()>,
    ) -> CallbackId {
        self.scheduler.add_repeated_callback(interval, callback)
    }

    pub fn remove_repeated_callback(&mut self, id: CallbackId) -> bool {
        self.scheduler.remove_repeated_callback(id)
    }

    /// One main-loop iteration: due callbacks, then a process step.
    pub fn iterate(&mut self) -> Result<()> {
        self.scheduler.run_due();
        self.network.process(self.config.process_timeout())
    }

    /// Cooperative main loop. Polls `stop` between iterations; an
    /// iteration in progress completes within its timeout budget. Tears
    /// the network manager down on the way out.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        info!("server started");
        while !stop.load(Ordering::Relaxed) {
            if let Err(err) = self.iterate() {
                // the offending socket is already closed; keep serving
                debug!(%err, "activity failure during process step");
            }
        }
        info!("server stopping");
        self.network.shutdown();
        Ok(())
    }
}

/// Decodes each inbound frame as a variant and answers with a Good status
/// acknowledgement; an undecodable frame closes the connection.
fn dispatch_handler() -> DataHandler {
    Rc::new(|sock, data| -> Result<()> {
        let table = TypeTable::builtin();
        let mut dec = Decoder::new(data);
        let request = dec.decode(table, TypeId::VARIANT)?;
        trace!(?request, "request variant");

        let ack = Value::from(Variant::scalar(
            TypeId::STATUS_CODE,
            Value::Status(StatusCode::GOOD),
        ));
        let size = calc_size(table, &ack, TypeId::VARIANT)?;
        let mut buf = sock.acquire_send_buffer(size)?;
        match encode_into(table, &ack, TypeId::VARIANT, &mut buf) {
            Ok(_) => sock.send(buf),
            Err(err) => {
                sock.release_send_buffer(buf);
                Err(err)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use gantry_testing::VirtualClock;

    use super::*;

    fn test_config() -> ServerConfig {
        // port 0 keeps parallel test runs from colliding
        ServerConfig { port: 0, ..ServerConfig::default() }
    }

    #[test]
    fn bind_registers_one_listener() {
        let mut server = Server::new(test_config()).unwrap();
        server.bind().unwrap();
        assert_eq!(server.network().num_listener_sockets(), 1);
        assert_eq!(server.discovery_urls().unwrap(), vec!["opc.tcp://localhost:0/".to_owned()]);
    }

    #[test]
    fn iterate_runs_due_callbacks() {
        let clock = VirtualClock::new();
        let mut server = Server::with_clock(
            ServerConfig { process_timeout_ms: 1, ..test_config() },
            clock.clock(),
        )
        .unwrap();

        let fired = Rc::new(Cell::new(0u32));
        let count = Rc::clone(&fired);
        server.add_repeated_callback(
            Duration::from_secs(2),
            Box::new(move || count.set(count.get() + 1)),
        );

        server.iterate().unwrap();
        assert_eq!(fired.get(), 0);

        clock.advance(Duration::from_secs(2));
        server.iterate().unwrap();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn removed_callback_does_not_fire() {
        let clock = VirtualClock::new();
        let mut server = Server::with_clock(
            ServerConfig { process_timeout_ms: 1, ..test_config() },
            clock.clock(),
        )
        .unwrap();

        let fired = Rc::new(Cell::new(0u32));
        let count = Rc::clone(&fired);
        let id = server.add_repeated_callback(
            Duration::from_secs(1),
            Box::new(move || count.set(count.get() + 1)),
        );
        assert!(server.remove_repeated_callback(id));

        clock.advance(Duration::from_secs(3));
        server.iterate().unwrap();
        assert_eq!(fired.get(), 0);
    }
}
