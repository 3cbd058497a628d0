//! Single-threaded, cooperative event loop.
//!
//! An [`IoLoop`] owns a list of [`Handler`]s. Each [`IoLoop::wait`] polls
//! every descriptor the handlers are interested in through a [`mio::Poll`],
//! then dispatches each ready handler once, in registration order. Nothing
//! runs between calls to `wait`, and there is no global loop: create as many
//! as you need.

use std::cell::Cell;
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use mio::event::Event;
use mio::unix::SourceFd;
use mio::{Events, Poll, Token};
use routio_transport::TransportError;
use tracing::trace;

use crate::error::{PeerError, Result};

static NEXT_LOOP_ID: AtomicU64 = AtomicU64::new(1);

const MIN_EVENTS: usize = 64;

/// What a handler wants to hear about for a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest {
    pub readable: bool,
    pub writable: bool,
}

impl Interest {
    pub const READABLE: Self = Self {
        readable: true,
        writable: false,
    };
    pub const READ_WRITE: Self = Self {
        readable: true,
        writable: true,
    };

    fn to_mio(self) -> mio::Interest {
        match (self.readable, self.writable) {
            (true, true) => mio::Interest::READABLE | mio::Interest::WRITABLE,
            (false, true) => mio::Interest::WRITABLE,
            _ => mio::Interest::READABLE,
        }
    }
}

/// What the poller reported for a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    /// Peer hung up or the descriptor is in an error state.
    pub hangup: bool,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.readable || self.writable || self.hangup
    }

    fn merge(&mut self, event: &Event) {
        self.readable |= event.is_readable();
        self.writable |= event.is_writable();
        self.hangup |= event.is_read_closed() || event.is_write_closed() || event.is_error();
    }
}

/// Handle returned by [`IoLoop::add_handler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId {
    loop_id: u64,
    slot: u64,
}

/// Records which loop, if any, a handler is registered with.
#[derive(Debug, Default)]
pub struct Attachment(Cell<Option<u64>>);

impl Attachment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the loop the handler belongs to.
    pub fn loop_id(&self) -> Option<u64> {
        self.0.get()
    }

    fn attach(&self, loop_id: u64) -> Result<()> {
        match self.0.get() {
            Some(current) => Err(PeerError::AlreadyAttached(current)),
            None => {
                self.0.set(Some(loop_id));
                Ok(())
            }
        }
    }

    fn detach(&self) {
        self.0.set(None);
    }
}

/// A descriptor that turned ready during [`IoLoop::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready {
    pub fd: RawFd,
    pub readiness: Readiness,
}

/// Anything an [`IoLoop`] can drive.
///
/// Handlers are shared handles (`Rc` inside) so user code can keep using
/// them while the loop owns a clone; all methods therefore take `&self`.
pub trait Handler {
    /// Loop membership bookkeeping; a handler joins at most one loop.
    fn attachment(&self) -> &Attachment;

    /// Append the descriptors to poll and what to poll them for.
    fn interests(&self, out: &mut Vec<(RawFd, Interest)>);

    /// In-process work is queued (e.g. loopback frames); forces a
    /// zero-timeout poll.
    fn has_pending(&self) -> bool {
        false
    }

    /// Handle readiness. `ready` may be empty when only pending work
    /// triggered the dispatch. Returns `false` to ask the caller of
    /// [`IoLoop::wait`] to stop.
    fn dispatch(&self, ready: &[Ready]) -> bool;
}

struct Slot {
    id: HandlerId,
    handler: Box<dyn Handler>,
}

struct Entry {
    fd: RawFd,
    interest: Interest,
    readiness: Readiness,
}

/// Descriptor registrations carried across calls to [`IoLoop::wait`].
///
/// mio reports edges; every wait re-registers each descriptor so a socket
/// that is still readable or writable is reported again.
struct Poller {
    poll: Poll,
    events: Events,
    registered: HashSet<RawFd>,
}

impl Poller {
    fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(MIN_EVENTS),
            registered: HashSet::new(),
        })
    }

    fn sync(&mut self, entries: &[Entry]) -> io::Result<()> {
        let registry = self.poll.registry();
        let mut current = HashSet::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            if !current.insert(entry.fd) {
                continue;
            }
            let token = Token(index);
            let interest = entry.interest.to_mio();
            let mut source = SourceFd(&entry.fd);
            let outcome = if self.registered.contains(&entry.fd) {
                registry.reregister(&mut source, token, interest)
            } else {
                registry.register(&mut source, token, interest)
            };
            match outcome {
                Ok(()) => {}
                // Closed descriptors leave the poller on their own; the number
                // may since have been reused for a fresh socket.
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    registry.register(&mut source, token, interest)?;
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    registry.reregister(&mut source, token, interest)?;
                }
                Err(err) => return Err(err),
            }
        }
        for fd in self.registered.difference(&current) {
            // Already gone if the descriptor was closed.
            let _ = registry.deregister(&mut SourceFd(fd));
        }
        self.registered = current;
        Ok(())
    }

    fn poll(&mut self, entries: &mut [Entry], timeout: Duration) -> io::Result<()> {
        if self.events.capacity() < entries.len() {
            self.events = Events::with_capacity(entries.len());
        }
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(err) => return Err(err),
        }
        for event in self.events.iter() {
            if let Some(entry) = entries.get_mut(event.token().0) {
                entry.readiness.merge(event);
            }
        }
        Ok(())
    }
}

/// A cooperative event loop over a set of handlers.
pub struct IoLoop {
    id: u64,
    next_slot: u64,
    handlers: Vec<Slot>,
    poller: Option<Poller>,
}

impl IoLoop {
    pub fn new() -> Self {
        Self {
            id: NEXT_LOOP_ID.fetch_add(1, Ordering::Relaxed),
            next_slot: 1,
            handlers: Vec::new(),
            poller: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Register a handler. Fails if it already belongs to a loop.
    pub fn add_handler<H: Handler + 'static>(&mut self, handler: H) -> Result<HandlerId> {
        handler.attachment().attach(self.id)?;
        let id = HandlerId {
            loop_id: self.id,
            slot: self.next_slot,
        };
        self.next_slot += 1;
        self.handlers.push(Slot {
            id,
            handler: Box::new(handler),
        });
        trace!(ioloop = self.id, handler = id.slot, "handler added");
        Ok(id)
    }

    /// Detach a handler. Returns `false` if it is not registered here.
    pub fn remove_handler(&mut self, id: HandlerId) -> bool {
        let Some(position) = self.handlers.iter().position(|slot| slot.id == id) else {
            return false;
        };
        let slot = self.handlers.remove(position);
        slot.handler.attachment().detach();
        trace!(ioloop = self.id, handler = id.slot, "handler removed");
        true
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Wait up to `timeout_ms` for readiness, then dispatch every ready
    /// handler once.
    ///
    /// Returns `Ok(false)` if any dispatched handler asked to stop. With no
    /// handlers this sleeps for the timeout and returns `Ok(true)`. An
    /// interrupted wait counts as a timeout.
    pub fn wait(&mut self, timeout_ms: u64) -> Result<bool> {
        let mut entries = Vec::new();
        let mut spans = Vec::with_capacity(self.handlers.len());
        let mut interests = Vec::new();
        let mut pending = false;

        for slot in &self.handlers {
            interests.clear();
            slot.handler.interests(&mut interests);
            let start = entries.len();
            entries.extend(interests.iter().map(|&(fd, interest)| Entry {
                fd,
                interest,
                readiness: Readiness::default(),
            }));
            let has_pending = slot.handler.has_pending();
            pending |= has_pending;
            spans.push((start..entries.len(), has_pending));
        }

        let timeout = if pending {
            Duration::ZERO
        } else {
            Duration::from_millis(timeout_ms)
        };

        let poller = match self.poller.take() {
            Some(poller) => poller,
            None => Poller::new().map_err(poll_error)?,
        };
        let poller = self.poller.insert(poller);
        poller.sync(&entries).map_err(poll_error)?;
        poller.poll(&mut entries, timeout).map_err(poll_error)?;

        let mut keep_going = true;
        let mut ready = Vec::new();
        for (slot, (span, has_pending)) in self.handlers.iter().zip(spans) {
            ready.clear();
            ready.extend(
                entries[span]
                    .iter()
                    .filter(|entry| entry.readiness.is_ready())
                    .map(|entry| Ready {
                        fd: entry.fd,
                        readiness: entry.readiness,
                    }),
            );
            if ready.is_empty() && !has_pending {
                continue;
            }
            if !slot.handler.dispatch(&ready) {
                keep_going = false;
            }
        }
        Ok(keep_going)
    }

    /// Call [`IoLoop::wait`] until a handler asks to stop or `until` holds.
    pub fn run_until(&mut self, timeout_ms: u64, mut until: impl FnMut() -> bool) -> Result<()> {
        while !until() {
            if !self.wait(timeout_ms)? {
                break;
            }
        }
        Ok(())
    }
}

fn poll_error(err: io::Error) -> PeerError {
    PeerError::Transport(TransportError::Poll(err))
}

impl Default for IoLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IoLoop {
    fn drop(&mut self) {
        for slot in &self.handlers {
            slot.handler.attachment().detach();
        }
    }
}

impl fmt::Debug for IoLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoLoop")
            .field("id", &self.id)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::os::fd::AsRawFd;
    use std::rc::Rc;
    use std::time::Instant;

    use routio_transport::IpcStream;

    use super::*;

    /// Counts dispatches; optionally watches one descriptor.
    #[derive(Clone)]
    struct Watcher {
        inner: Rc<WatcherInner>,
    }

    struct WatcherInner {
        attachment: Attachment,
        fd: Option<RawFd>,
        pending: Cell<bool>,
        stop: Cell<bool>,
        dispatched: Cell<usize>,
        log: Option<Rc<std::cell::RefCell<Vec<&'static str>>>>,
        label: &'static str,
    }

    impl Watcher {
        fn new(fd: Option<RawFd>) -> Self {
            Self::labelled(fd, "", None)
        }

        fn labelled(
            fd: Option<RawFd>,
            label: &'static str,
            log: Option<Rc<std::cell::RefCell<Vec<&'static str>>>>,
        ) -> Self {
            Self {
                inner: Rc::new(WatcherInner {
                    attachment: Attachment::new(),
                    fd,
                    pending: Cell::new(false),
                    stop: Cell::new(false),
                    dispatched: Cell::new(0),
                    log,
                    label,
                }),
            }
        }

        fn dispatched(&self) -> usize {
            self.inner.dispatched.get()
        }
    }

    impl Handler for Watcher {
        fn attachment(&self) -> &Attachment {
            &self.inner.attachment
        }

        fn interests(&self, out: &mut Vec<(RawFd, Interest)>) {
            if let Some(fd) = self.inner.fd {
                out.push((fd, Interest::READABLE));
            }
        }

        fn has_pending(&self) -> bool {
            self.inner.pending.get()
        }

        fn dispatch(&self, _ready: &[Ready]) -> bool {
            self.inner.dispatched.set(self.inner.dispatched.get() + 1);
            self.inner.pending.set(false);
            if let Some(log) = &self.inner.log {
                log.borrow_mut().push(self.inner.label);
            }
            !self.inner.stop.get()
        }
    }

    #[test]
    fn wait_zero_without_handlers_returns_true_promptly() {
        let mut ioloop = IoLoop::new();
        let started = Instant::now();
        assert!(ioloop.wait(0).unwrap());
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn wait_zero_with_idle_handler_does_not_dispatch() {
        let (left, _right) = IpcStream::pair().unwrap();
        let watcher = Watcher::new(Some(left.as_raw_fd()));
        let mut ioloop = IoLoop::new();
        ioloop.add_handler(watcher.clone()).unwrap();

        assert!(ioloop.wait(0).unwrap());
        assert_eq!(watcher.dispatched(), 0);
    }

    #[test]
    fn wait_times_out() {
        let mut ioloop = IoLoop::new();
        let started = Instant::now();
        assert!(ioloop.wait(30).unwrap());
        assert!(started.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn readable_descriptor_dispatches() {
        let (left, mut right) = IpcStream::pair().unwrap();
        let watcher = Watcher::new(Some(left.as_raw_fd()));
        let mut ioloop = IoLoop::new();
        ioloop.add_handler(watcher.clone()).unwrap();

        right.write_all(b"x").unwrap();
        assert!(ioloop.wait(1000).unwrap());
        assert_eq!(watcher.dispatched(), 1);
    }

    #[test]
    fn unread_data_is_reported_on_every_wait() {
        let (left, mut right) = IpcStream::pair().unwrap();
        let watcher = Watcher::new(Some(left.as_raw_fd()));
        let mut ioloop = IoLoop::new();
        ioloop.add_handler(watcher.clone()).unwrap();

        right.write_all(b"x").unwrap();
        for turn in 1..=3 {
            assert!(ioloop.wait(1000).unwrap());
            assert_eq!(watcher.dispatched(), turn);
        }
    }

    #[test]
    fn closed_descriptor_is_dropped_from_the_poller() {
        let (left, right) = IpcStream::pair().unwrap();
        let watched = Watcher::new(Some(left.as_raw_fd()));
        let mut ioloop = IoLoop::new();
        let id = ioloop.add_handler(watched).unwrap();
        assert!(ioloop.wait(0).unwrap());

        assert!(ioloop.remove_handler(id));
        drop(left);
        drop(right);

        let (reused, mut writer) = IpcStream::pair().unwrap();
        let watcher = Watcher::new(Some(reused.as_raw_fd()));
        ioloop.add_handler(watcher.clone()).unwrap();
        writer.write_all(b"y").unwrap();
        assert!(ioloop.wait(1000).unwrap());
        assert_eq!(watcher.dispatched(), 1);
    }

    #[test]
    fn interest_maps_to_mio() {
        assert_eq!(Interest::READABLE.to_mio(), mio::Interest::READABLE);
        assert_eq!(
            Interest::READ_WRITE.to_mio(),
            mio::Interest::READABLE | mio::Interest::WRITABLE
        );
        assert_eq!(Interest::default().to_mio(), mio::Interest::READABLE);
    }

    #[test]
    fn pending_work_forces_zero_timeout() {
        let watcher = Watcher::new(None);
        watcher.inner.pending.set(true);
        let mut ioloop = IoLoop::new();
        ioloop.add_handler(watcher.clone()).unwrap();

        let started = Instant::now();
        assert!(ioloop.wait(5_000).unwrap());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(watcher.dispatched(), 1);
    }

    #[test]
    fn dispatch_follows_registration_order() {
        let log = Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut ioloop = IoLoop::new();
        for label in ["first", "second", "third"] {
            let watcher = Watcher::labelled(None, label, Some(log.clone()));
            watcher.inner.pending.set(true);
            ioloop.add_handler(watcher).unwrap();
        }

        ioloop.wait(0).unwrap();
        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn stop_request_still_dispatches_the_rest() {
        let stopper = Watcher::new(None);
        stopper.inner.pending.set(true);
        stopper.inner.stop.set(true);
        let other = Watcher::new(None);
        other.inner.pending.set(true);

        let mut ioloop = IoLoop::new();
        ioloop.add_handler(stopper.clone()).unwrap();
        ioloop.add_handler(other.clone()).unwrap();

        assert!(!ioloop.wait(0).unwrap());
        assert_eq!(other.dispatched(), 1);
    }

    #[test]
    fn handler_belongs_to_one_loop() {
        let watcher = Watcher::new(None);
        let mut first = IoLoop::new();
        let mut second = IoLoop::new();

        let id = first.add_handler(watcher.clone()).unwrap();
        assert!(matches!(
            second.add_handler(watcher.clone()),
            Err(PeerError::AlreadyAttached(loop_id)) if loop_id == first.id()
        ));

        assert!(first.remove_handler(id));
        assert!(!first.remove_handler(id));
        second.add_handler(watcher.clone()).unwrap();
        drop(second);
        first.add_handler(watcher).unwrap();
    }

    #[test]
    fn add_remove_cycles() {
        let watcher = Watcher::new(None);
        let mut ioloop = IoLoop::new();
        for _ in 0..10 {
            let id = ioloop.add_handler(watcher.clone()).unwrap();
            assert!(ioloop.wait(0).unwrap());
            assert!(ioloop.remove_handler(id));
            assert!(ioloop.wait(0).unwrap());
            assert!(ioloop.is_empty());
        }
        assert!(watcher.attachment().loop_id().is_none());
    }

    #[test]
    fn run_until_stops_on_condition() {
        let watcher = Watcher::new(None);
        let mut ioloop = IoLoop::new();
        ioloop.add_handler(watcher.clone()).unwrap();

        let mut turns = 0;
        ioloop
            .run_until(0, || {
                turns += 1;
                watcher.inner.pending.set(true);
                turns > 3
            })
            .unwrap();
        assert_eq!(watcher.dispatched(), 3);
    }
}
