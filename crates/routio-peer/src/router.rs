use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;

use routio_frame::{Frame, FrameKind};
use routio_transport::{Endpoint, IpcListener};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelRegistry, SubscriptionId};
use crate::connection::{Connection, ConnectionConfig, ConnectionId};
use crate::error::{PeerError, Result};
use crate::hello::Hello;
use crate::ioloop::{Attachment, Handler, Interest, Readiness, Ready};

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Name announced in the session hello.
    pub name: String,
    /// Sessions beyond this are refused at accept time.
    pub max_sessions: usize,
    pub connection: ConnectionConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            name: "routio-router".to_string(),
            max_sessions: 1024,
            connection: ConnectionConfig::default(),
        }
    }
}

/// Lifecycle of one router session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Accepted, waiting for the client's HELLO.
    Connected,
    /// HELLO validated and answered.
    Advertised,
    /// The client has subscribed, advertised or published.
    Routing,
}

/// Counters since the router was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouterStatistics {
    pub sessions_accepted: u64,
    pub sessions_rejected: u64,
    pub sessions_active: usize,
    pub frames_received: u64,
    pub frames_forwarded: u64,
    pub bytes_forwarded: u64,
    pub frames_dropped: u64,
    pub protocol_errors: u64,
}

/// Snapshot of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: u64,
    pub peer_id: String,
    pub name: Option<String>,
    pub state: SessionState,
    pub subscriptions: Vec<String>,
    pub advertised: Vec<String>,
    pub pending_bytes: usize,
}

struct Session {
    connection: Connection,
    state: SessionState,
    subscriptions: HashMap<Channel, SubscriptionId>,
    advertised: HashSet<Channel>,
}

impl Session {
    fn info(&self) -> SessionInfo {
        let mut subscriptions: Vec<String> =
            self.subscriptions.keys().map(Channel::to_string).collect();
        subscriptions.sort();
        let mut advertised: Vec<String> = self.advertised.iter().map(Channel::to_string).collect();
        advertised.sort();

        let id = self.connection.id();
        SessionInfo {
            id: id.get(),
            peer_id: id.peer_label(),
            name: self.connection.remote().map(|hello| hello.name.clone()),
            state: self.state,
            subscriptions,
            advertised,
            pending_bytes: self.connection.pending_len(),
        }
    }
}

struct RouterState {
    closed: bool,
    next_session: u64,
    listeners: Vec<IpcListener>,
    sessions: BTreeMap<ConnectionId, Session>,
    routes: ChannelRegistry<ConnectionId>,
    stats: RouterStatistics,
}

impl RouterState {
    fn accept_ready(&mut self, config: &RouterConfig, ready: &[Ready]) {
        let mut accepted = Vec::new();
        for listener in &self.listeners {
            if readiness_of(ready, listener.as_raw_fd()).is_none() {
                continue;
            }
            loop {
                match listener.try_accept() {
                    Ok(Some(stream)) => accepted.push(stream),
                    Ok(None) => break,
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        break;
                    }
                }
            }
        }

        for stream in accepted {
            if self.sessions.len() >= config.max_sessions {
                warn!(max = config.max_sessions, "session limit reached, refusing connection");
                self.stats.sessions_rejected += 1;
                stream.shutdown();
                continue;
            }

            let id = ConnectionId::new(self.next_session);
            self.next_session += 1;
            let local = Hello::new(&config.connection.hello, &config.name);
            match Connection::accept(id, stream, &config.connection, local) {
                Ok(connection) => {
                    debug!(session = %id, "session accepted");
                    self.stats.sessions_accepted += 1;
                    self.sessions.insert(
                        id,
                        Session {
                            connection,
                            state: SessionState::Connected,
                            subscriptions: HashMap::new(),
                            advertised: HashSet::new(),
                        },
                    );
                }
                Err(err) => warn!(session = %id, error = %err, "failed to set up session"),
            }
        }
    }

    fn service(&mut self, id: ConnectionId, readiness: Readiness) {
        let Self {
            sessions,
            routes,
            stats,
            ..
        } = self;
        let Some(session) = sessions.get_mut(&id) else {
            return;
        };

        if readiness.writable {
            if let Err(err) = session.connection.on_writable() {
                note_failure(stats, &err);
                return;
            }
        }
        if !(readiness.readable || readiness.hangup) || session.connection.is_closed() {
            return;
        }

        let inbound = match session.connection.on_readable() {
            Ok(inbound) => inbound,
            Err(err) => {
                note_failure(stats, &err);
                return;
            }
        };
        if inbound.established {
            session.state = SessionState::Advertised;
            if let Some(remote) = session.connection.remote() {
                info!(
                    session = %id,
                    peer_id = %id.peer_label(),
                    name = %remote.name,
                    "session established"
                );
            }
        }

        let mut forwards = Vec::new();
        for frame in inbound.frames {
            match route_frame(id, session, routes, frame) {
                Ok(Some(forward)) => {
                    stats.frames_received += 1;
                    forwards.push(forward);
                }
                Ok(None) => {}
                Err(err) => {
                    session.connection.close();
                    note_failure(stats, &err);
                    break;
                }
            }
        }

        for (channel, frame) in forwards {
            for target in routes.lookup(&channel) {
                if target == id {
                    continue;
                }
                let Some(dest) = sessions.get_mut(&target) else {
                    continue;
                };
                if dest.connection.is_closed() {
                    continue;
                }
                match dest.connection.write(&frame) {
                    Ok(()) => {
                        stats.frames_forwarded += 1;
                        stats.bytes_forwarded += frame.payload.len() as u64;
                    }
                    Err(err @ PeerError::Backpressure { .. }) => {
                        stats.frames_dropped += 1;
                        warn!(session = %target, %channel, error = %err, "dropping frame under backpressure");
                    }
                    Err(err) => debug!(session = %target, error = %err, "forward failed"),
                }
            }
        }
    }

    /// Drop closed sessions and their routing entries.
    fn reap(&mut self) {
        let closed: Vec<ConnectionId> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.connection.is_closed())
            .map(|(id, _)| *id)
            .collect();

        for id in closed {
            if let Some(session) = self.sessions.remove(&id) {
                for subscription in session.subscriptions.into_values() {
                    self.routes.unregister(subscription);
                }
                info!(session = %id, "session closed");
            }
        }
    }
}

/// Apply one frame to a session. DATA frames come back for forwarding.
fn route_frame(
    id: ConnectionId,
    session: &mut Session,
    routes: &mut ChannelRegistry<ConnectionId>,
    frame: Frame,
) -> Result<Option<(Channel, Frame)>> {
    let channel = Channel::from_frame(&frame)?;
    session.state = SessionState::Routing;

    match frame.kind {
        FrameKind::Data => return Ok(Some((channel, frame))),
        FrameKind::Subscribe => {
            if !session.subscriptions.contains_key(&channel) {
                let subscription = routes.register(channel.clone(), id);
                debug!(session = %id, %channel, "route added");
                session.subscriptions.insert(channel, subscription);
            }
        }
        FrameKind::Unsubscribe => {
            if let Some(subscription) = session.subscriptions.remove(&channel) {
                routes.unregister(subscription);
                debug!(session = %id, %channel, "route removed");
            }
        }
        FrameKind::Advertise => {
            session.advertised.insert(channel);
        }
        FrameKind::Hello => {
            return Err(PeerError::Protocol("unexpected HELLO".to_string()));
        }
    }
    Ok(None)
}

fn note_failure(stats: &mut RouterStatistics, err: &PeerError) {
    if err.is_protocol() {
        stats.protocol_errors += 1;
    }
}

fn readiness_of(ready: &[Ready], fd: RawFd) -> Option<Readiness> {
    ready
        .iter()
        .find(|entry| entry.fd == fd)
        .map(|entry| entry.readiness)
}

struct RouterInner {
    attachment: Attachment,
    config: RouterConfig,
    state: RefCell<RouterState>,
}

/// Broker that forwards DATA frames to every session subscribed to the
/// same channel, never back to the sender.
///
/// Like [`Client`](crate::Client), a clonable `!Send` handle; add a clone
/// to an [`IoLoop`](crate::IoLoop).
#[derive(Clone)]
pub struct Router {
    inner: Rc<RouterInner>,
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            inner: Rc::new(RouterInner {
                attachment: Attachment::new(),
                config,
                state: RefCell::new(RouterState {
                    closed: false,
                    next_session: 1,
                    listeners: Vec::new(),
                    sessions: BTreeMap::new(),
                    routes: ChannelRegistry::new(),
                    stats: RouterStatistics::default(),
                }),
            }),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    /// Accept clients on `endpoint`. Returns the bound endpoint.
    pub fn bind(&self, endpoint: &Endpoint) -> Result<Endpoint> {
        let mut state = self.inner.state.borrow_mut();
        if state.closed {
            return Err(PeerError::Closed);
        }
        let listener = IpcListener::bind(endpoint)?;
        listener.set_nonblocking(true)?;
        let local = listener.local_endpoint();
        info!(endpoint = %local, "router listening");
        state.listeners.push(listener);
        Ok(local)
    }

    pub fn statistics(&self) -> RouterStatistics {
        let state = self.inner.state.borrow();
        RouterStatistics {
            sessions_active: state.sessions.len(),
            ..state.stats
        }
    }

    /// Open sessions, ordered by id.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.inner
            .state
            .borrow()
            .sessions
            .values()
            .map(Session::info)
            .collect()
    }

    /// Sessions subscribed to `channel`.
    pub fn subscriber_count(&self, channel: &Channel) -> usize {
        self.inner.state.borrow().routes.subscriber_count(channel)
    }

    /// Close every session and stop listening. Idempotent.
    pub fn close(&self) {
        let mut state = self.inner.state.borrow_mut();
        if state.closed {
            return;
        }
        state.closed = true;
        for session in state.sessions.values_mut() {
            session.connection.close_gracefully();
        }
        state.sessions.clear();
        state.listeners.clear();
        state.routes.drain();
        info!("router closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.borrow().closed
    }
}

impl Handler for Router {
    fn attachment(&self) -> &Attachment {
        &self.inner.attachment
    }

    fn interests(&self, out: &mut Vec<(RawFd, Interest)>) {
        let state = self.inner.state.borrow();
        if state.closed {
            return;
        }
        for listener in &state.listeners {
            out.push((listener.as_raw_fd(), Interest::READABLE));
        }
        for session in state.sessions.values() {
            if let Some(interest) = session.connection.interest() {
                out.push((session.connection.as_raw_fd(), interest));
            }
        }
    }

    fn dispatch(&self, ready: &[Ready]) -> bool {
        let mut state = self.inner.state.borrow_mut();
        if state.closed {
            return false;
        }

        state.accept_ready(&self.inner.config, ready);

        let due: Vec<(ConnectionId, Readiness)> = state
            .sessions
            .iter()
            .filter_map(|(id, session)| {
                readiness_of(ready, session.connection.as_raw_fd()).map(|r| (*id, r))
            })
            .collect();
        for (id, readiness) in due {
            state.service(id, readiness);
        }

        state.reap();
        true
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("name", &self.inner.config.name)
            .field("statistics", &self.statistics())
            .finish()
    }
}
