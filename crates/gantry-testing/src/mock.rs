use std::{
    cell::RefCell,
    collections::VecDeque,
    io::{self, Read, Write},
    os::fd::AsRawFd,
    os::unix::net::UnixStream,
    rc::Rc,
};

use gantry::{Error, Result};
use gantry_network::{ActivityContext, DataHandler, SendBuffer, Socket, SocketId};
use mio::{Interest, Registry, unix::SourceFd};
use tracing::trace;

use crate::{FaultPlan, VirtualClock};

const SEND_BUFFER_SIZE: usize = 65536;

#[derive(Default)]
struct MockState {
    activity_calls: usize,
    close_calls: usize,
    free_count: usize,
    may_delete: bool,
    flag_delete_after_activity: bool,
    scripted_activity: VecDeque<Error>,
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    delivered: Vec<Vec<u8>>,
}

/// Scriptable socket for manager tests.
///
/// Backed by a real socket pair so the manager's readiness wait can select
/// it: the test end makes the manager end readable through
/// [`MockHandle::trigger`]. Sent buffers land in a verification log and the
/// send window is zeroed afterwards; queued inbound frames are delivered
/// through the regular dispatch path on the next activity.
pub struct MockSocket {
    id: SocketId,
    state: Rc<RefCell<MockState>>,
    listener_url: Option<String>,
    on_data: Option<DataHandler>,
    conn: UnixStream,
    registry: Option<Registry>,
    send_stash: Option<Vec<u8>>,
    send_buffer_size: usize,
    faults: Option<(Rc<FaultPlan>, VirtualClock)>,
}

/// Test-side controls and observations for one [`MockSocket`]. Stays with
/// the test while the manager owns the socket itself.
pub struct MockHandle {
    id: SocketId,
    state: Rc<RefCell<MockState>>,
    peer: UnixStream,
}

impl MockSocket {
    pub fn pair() -> io::Result<(MockSocket, MockHandle)> {
        Self::build(None, None, None)
    }

    /// A mock that reports itself as a listener with the given URL.
    pub fn listener(url: &str) -> io::Result<(MockSocket, MockHandle)> {
        Self::build(Some(url.to_owned()), None, None)
    }

    /// Queued inbound frames go to `on_data` instead of the delivery log.
    pub fn with_handler(on_data: DataHandler) -> io::Result<(MockSocket, MockHandle)> {
        Self::build(None, Some(on_data), None)
    }

    /// Receive faults from `plan` apply before any frame delivery, with
    /// the scripted sleep charged to `clock`.
    pub fn with_faults(
        plan: Rc<FaultPlan>,
        clock: VirtualClock,
    ) -> io::Result<(MockSocket, MockHandle)> {
        Self::build(None, None, Some((plan, clock)))
    }

    fn build(
        listener_url: Option<String>,
        on_data: Option<DataHandler>,
        faults: Option<(Rc<FaultPlan>, VirtualClock)>,
    ) -> io::Result<(MockSocket, MockHandle)> {
        let (conn, peer) = UnixStream::pair()?;
        conn.set_nonblocking(true)?;
        let id = SocketId::allocate();
        let state = Rc::new(RefCell::new(MockState::default()));
        let sock = MockSocket {
            id,
            state: Rc::clone(&state),
            listener_url,
            on_data,
            conn,
            registry: None,
            send_stash: Some(Vec::with_capacity(SEND_BUFFER_SIZE)),
            send_buffer_size: SEND_BUFFER_SIZE,
            faults,
        };
        Ok((sock, MockHandle { id, state, peer }))
    }

    fn drain_trigger(&mut self) {
        let mut scratch = [0u8; 64];
        loop {
            match self.conn.read(&mut scratch) {
                Ok(0) => break,
                Ok(_) => {}
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
    }
}

impl Socket for MockSocket {
    fn id(&self) -> SocketId {
        self.id
    }

    fn is_listener(&self) -> bool {
        self.listener_url.is_some()
    }

    fn discovery_url(&self) -> Option<&str> {
        self.listener_url.as_deref()
    }

    fn register(&mut self, registry: &Registry) -> io::Result<()> {
        self.registry = Some(registry.try_clone()?);
        registry.register(
            &mut SourceFd(&self.conn.as_raw_fd()),
            self.id.token(),
            Interest::READABLE,
        )
    }

    fn activity(&mut self, _ctx: &mut ActivityContext) -> Result<()> {
        self.state.borrow_mut().activity_calls += 1;
        self.drain_trigger();

        if let Some((plan, clock)) = &self.faults {
            if let Some(err) = plan.take_recv() {
                clock.advance(plan.take_recv_sleep());
                return Err(err);
            }
        }

        if let Some(err) = self.state.borrow_mut().scripted_activity.pop_front() {
            return Err(err);
        }

        let (frames, flag_after) = {
            let mut state = self.state.borrow_mut();
            (
                state.inbound.drain(..).collect::<Vec<_>>(),
                state.flag_delete_after_activity,
            )
        };

        let handler = self.on_data.clone();
        for frame in frames {
            match &handler {
                Some(handler) => handler(self, &frame)?,
                None => self.state.borrow_mut().delivered.push(frame),
            }
        }

        if flag_after {
            self.state.borrow_mut().may_delete = true;
        }
        Ok(())
    }

    fn may_delete(&self) -> bool {
        self.state.borrow().may_delete
    }

    fn close(&mut self) {
        trace!(id = self.id.0, "closing mock socket");
        {
            let mut state = self.state.borrow_mut();
            state.close_calls += 1;
            state.may_delete = true;
        }
        if let Some(registry) = &self.registry {
            let _ = registry.deregister(&mut SourceFd(&self.conn.as_raw_fd()));
        }
    }

    fn acquire_send_buffer(&mut self, len: usize) -> Result<SendBuffer> {
        if len > self.send_buffer_size {
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
        self.state.borrow_mut().sent.push(data.clone());
        data.fill(0);
        self.send_stash = Some(data);
        Ok(())
    }
}

impl Drop for MockSocket {
    fn drop(&mut self) {
        self.state.borrow_mut().free_count += 1;
    }
}

impl MockHandle {
    pub fn id(&self) -> SocketId {
        self.id
    }

    /// Makes the socket readable so the next `process` selects it.
    pub fn trigger(&mut self) {
        let _ = self.peer.write(&[1]);
    }

    pub fn queue_inbound(&self, frame: &[u8]) {
        self.state.borrow_mut().inbound.push_back(frame.to_vec());
    }

    pub fn fail_next_activity(&self, err: Error) {
        self.state.borrow_mut().scripted_activity.push_back(err);
    }

    /// The next activity call flips `may_delete` after delivering its
    /// queued frames.
    pub fn flag_delete_after_activity(&self) {
        self.state.borrow_mut().flag_delete_after_activity = true;
    }

    pub fn set_may_delete(&self) {
        self.state.borrow_mut().may_delete = true;
    }

    pub fn may_delete(&self) -> bool {
        self.state.borrow().may_delete
    }

    pub fn activity_calls(&self) -> usize {
        self.state.borrow().activity_calls
    }

    pub fn close_count(&self) -> usize {
        self.state.borrow().close_calls
    }

    pub fn free_count(&self) -> usize {
        self.state.borrow().free_count
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.borrow().sent.clone()
    }

    pub fn delivered(&self) -> Vec<Vec<u8>> {
        self.state.borrow().delivered.clone()
    }
}
