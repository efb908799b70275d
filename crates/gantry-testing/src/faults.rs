use std::{cell::Cell, io, rc::Rc, time::Duration};

use gantry::{Error, Result};
use gantry_network::{ActivityContext, NetworkManager, SendBuffer, Socket, SocketId};
use mio::Registry;

use crate::VirtualClock;

/// One-shot fault slots consulted by the harness wrappers.
///
/// A scripted result is consumed by the first call that observes it, after
/// which the slot auto-resets to success; sleep durations likewise apply
/// once and reset to zero.
#[derive(Default)]
pub struct FaultPlan {
    activity_result: Cell<Option<Error>>,
    recv_result: Cell<Option<Error>>,
    process_result: Cell<Option<Error>>,
    activity_sleep: Cell<Duration>,
    recv_sleep: Cell<Duration>,
}

impl FaultPlan {
    pub fn new() -> Rc<FaultPlan> {
        Rc::new(FaultPlan::default())
    }

    pub fn fail_next_activity(&self, err: Error) {
        self.activity_result.set(Some(err));
    }

    pub fn fail_next_recv(&self, err: Error) {
        self.recv_result.set(Some(err));
    }

    pub fn fail_next_process(&self, err: Error) {
        self.process_result.set(Some(err));
    }

    pub fn set_activity_sleep(&self, d: Duration) {
        self.activity_sleep.set(d);
    }

    pub fn set_recv_sleep(&self, d: Duration) {
        self.recv_sleep.set(d);
    }

    pub(crate) fn take_activity(&self) -> Option<Error> {
        self.activity_result.take()
    }

    pub(crate) fn take_recv(&self) -> Option<Error> {
        self.recv_result.take()
    }

    pub(crate) fn take_process(&self) -> Option<Error> {
        self.process_result.take()
    }

    pub(crate) fn take_activity_sleep(&self) -> Duration {
        self.activity_sleep.take()
    }

    pub(crate) fn take_recv_sleep(&self) -> Duration {
        self.recv_sleep.take()
    }
}

/// Decorates a socket so tests can script its next activity result and
/// advance the virtual clock, without touching the wrapped implementation.
pub struct FaultySocket<S> {
    inner: S,
    plan: Rc<FaultPlan>,
    clock: VirtualClock,
}

impl<S: Socket> FaultySocket<S> {
    pub fn new(inner: S, plan: Rc<FaultPlan>, clock: VirtualClock) -> Self {
        FaultySocket { inner, plan, clock }
    }
}

impl<S: Socket> Socket for FaultySocket<S> {
    fn id(&self) -> SocketId {
        self.inner.id()
    }

    fn is_listener(&self) -> bool {
        self.inner.is_listener()
    }

    fn discovery_url(&self) -> Option<&str> {
        self.inner.discovery_url()
    }

    fn register(&mut self, registry: &Registry) -> io::Result<()> {
        self.inner.register(registry)
    }

    fn activity(&mut self, ctx: &mut ActivityContext) -> Result<()> {
        self.clock.advance(self.plan.take_activity_sleep());
        if let Some(err) = self.plan.take_activity() {
            return Err(err);
        }
        self.inner.activity(ctx)
    }

    fn may_delete(&self) -> bool {
        self.inner.may_delete()
    }

    fn close(&mut self) {
        self.inner.close();
    }

    fn acquire_send_buffer(&mut self, len: usize) -> Result<SendBuffer> {
        self.inner.acquire_send_buffer(len)
    }

    fn release_send_buffer(&mut self, buf: SendBuffer) {
        self.inner.release_send_buffer(buf);
    }

    fn send(&mut self, buf: SendBuffer) -> Result<()> {
        self.inner.send(buf)
    }
}

/// Runs one manager step through the fault plan, charging the timeout
/// budget (minimum one millisecond) to the virtual clock either way.
pub fn process_with_faults(
    nm: &mut NetworkManager,
    timeout: Duration,
    plan: &FaultPlan,
    clock: &VirtualClock,
) -> Result<()> {
    let charged = if timeout.is_zero() { Duration::from_millis(1) } else { timeout };
    if let Some(err) = plan.take_process() {
        clock.advance(charged);
        return Err(err);
    }
    let result = nm.process(timeout);
    clock.advance(charged);
    result
}
