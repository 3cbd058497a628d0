use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::os::fd::{AsRawFd, RawFd};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use bytes::Bytes;
use routio_frame::{Frame, FrameKind};
use routio_message::{Decode, DecodeError, MessageReader, Typed};
use routio_transport::{Endpoint, IpcListener};
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelRegistry, SubscriptionId};
use crate::connection::{Connection, ConnectionConfig, ConnectionId};
use crate::error::{BoxError, PeerError, Result};
use crate::hello::Hello;
use crate::ioloop::{Attachment, Handler, Interest, Readiness, Ready};
use crate::pubsub::{
    BackpressurePolicy, Publisher, SendReport, Subscriber, TypedPublisher, TypedSubscriber,
};

/// Client behavior configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Name announced in the session hello.
    pub name: String,
    /// Deliver published frames to subscribers in the same client.
    pub loopback: bool,
    /// Errors kept for [`Client::take_errors`]; the oldest are dropped.
    pub max_queued_errors: usize,
    /// Ask the event loop to stop when a router connection is lost.
    pub exit_on_disconnect: bool,
    pub connection: ConnectionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "routio-client".to_string(),
            loopback: true,
            max_queued_errors: 256,
            exit_on_disconnect: false,
            connection: ConnectionConfig::default(),
        }
    }
}

/// What a connection of a client leads to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// A router; every publication is sent and the router filters.
    Router,
    /// Another client; only channels it subscribed to are sent.
    Peer,
}

type Callback = Box<dyn FnMut(MessageReader) -> std::result::Result<(), BoxError>>;

/// A payload a typed subscriber could not decode into its value type.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct TypedDecodeError(DecodeError);

pub(crate) struct SubscriberEntry {
    active: Cell<bool>,
    callback: RefCell<Callback>,
}

impl SubscriberEntry {
    pub(crate) fn is_active(&self) -> bool {
        self.active.get()
    }

    pub(crate) fn deactivate(&self) {
        self.active.set(false);
    }
}

struct Link {
    kind: LinkKind,
    connection: Connection,
    remote_subscriptions: HashSet<Channel>,
    remote_advertised: HashSet<Channel>,
}

impl Link {
    fn new(kind: LinkKind, connection: Connection) -> Self {
        Self {
            kind,
            connection,
            remote_subscriptions: HashSet::new(),
            remote_advertised: HashSet::new(),
        }
    }

    /// Apply one inbound frame; DATA frames are handed back for delivery.
    fn absorb(&mut self, frame: Frame) -> Result<Option<(Channel, Bytes)>> {
        let channel = Channel::from_frame(&frame)?;
        match frame.kind {
            FrameKind::Data => return Ok(Some((channel, frame.payload))),
            FrameKind::Subscribe => {
                debug!(connection = %self.connection.id(), %channel, "remote subscribed");
                self.remote_subscriptions.insert(channel);
            }
            FrameKind::Unsubscribe => {
                debug!(connection = %self.connection.id(), %channel, "remote unsubscribed");
                self.remote_subscriptions.remove(&channel);
            }
            FrameKind::Advertise => {
                self.remote_advertised.insert(channel);
            }
            FrameKind::Hello => {
                return Err(PeerError::Protocol("unexpected HELLO".to_string()));
            }
        }
        Ok(None)
    }
}

struct ClientState {
    closed: bool,
    next_connection: u64,
    listeners: Vec<IpcListener>,
    links: Vec<Link>,
    subscribers: ChannelRegistry<Rc<SubscriberEntry>>,
    advertised: HashSet<Channel>,
    loopback: VecDeque<(Channel, Bytes)>,
    loopback_bytes: usize,
    errors: VecDeque<PeerError>,
    max_queued_errors: usize,
}

impl ClientState {
    fn next_id(&mut self) -> ConnectionId {
        let id = ConnectionId::new(self.next_connection);
        self.next_connection += 1;
        id
    }

    fn push_error(&mut self, err: PeerError) {
        if self.max_queued_errors == 0 {
            return;
        }
        while self.errors.len() >= self.max_queued_errors {
            self.errors.pop_front();
        }
        self.errors.push_back(err);
    }

    /// Send a control frame on every open connection.
    fn broadcast(&mut self, frame: &Frame) {
        let mut failures = Vec::new();
        for link in self.links.iter_mut() {
            if link.connection.is_closed() {
                continue;
            }
            if let Err(err) = link.connection.write(frame) {
                warn!(
                    connection = %link.connection.id(),
                    kind = %frame.kind,
                    channel = %frame.channel,
                    error = %err,
                    "control frame not queued"
                );
                failures.push(err);
            }
        }
        for err in failures {
            self.push_error(err);
        }
    }

    /// Tell a new connection what this client publishes and subscribes to.
    fn replay(&self, connection: &mut Connection) -> Result<()> {
        for channel in self.subscribers.channels() {
            connection.write(&control(FrameKind::Subscribe, channel))?;
        }
        for channel in &self.advertised {
            connection.write(&control(FrameKind::Advertise, channel))?;
        }
        Ok(())
    }
}

fn control(kind: FrameKind, channel: &Channel) -> Frame {
    Frame::control(kind, channel.name(), channel.signature_text())
}

fn readiness_of(ready: &[Ready], fd: RawFd) -> Option<Readiness> {
    ready
        .iter()
        .find(|entry| entry.fd == fd)
        .map(|entry| entry.readiness)
}

pub(crate) struct ClientInner {
    attachment: Attachment,
    config: ClientConfig,
    state: RefCell<ClientState>,
    /// Subscriptions dropped while the state was borrowed.
    released: RefCell<Vec<SubscriptionId>>,
    #[cfg(feature = "schema")]
    schemas: RefCell<Option<std::sync::Arc<routio_schema::SchemaRegistry>>>,
}

impl ClientInner {
    fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    pub(crate) fn publish(
        &self,
        channel: &Channel,
        payload: Bytes,
        policy: BackpressurePolicy,
    ) -> Result<SendReport> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return Err(PeerError::Closed);
        }

        let frame = Frame::data(channel.name(), channel.signature_text(), payload);
        self.config.connection.frame.check(&frame)?;

        let mut report = SendReport::default();
        let mut backpressure = None;
        if self.config.loopback && state.subscribers.contains(channel) {
            let limit = self.config.connection.frame.high_water_mark;
            let size = frame.payload.len();
            if !state.loopback.is_empty() && state.loopback_bytes + size > limit {
                warn!(
                    %channel,
                    queued = state.loopback_bytes,
                    limit,
                    "dropping loopback frame under backpressure"
                );
                report.dropped += 1;
                backpressure = Some(PeerError::Backpressure {
                    buffered: state.loopback_bytes,
                    limit,
                });
            } else {
                state
                    .loopback
                    .push_back((channel.clone(), frame.payload.clone()));
                state.loopback_bytes += size;
                report.loopback = true;
            }
        }

        for link in state.links.iter_mut() {
            if link.connection.is_closed() {
                continue;
            }
            if link.kind == LinkKind::Peer && !link.remote_subscriptions.contains(channel) {
                continue;
            }
            match link.connection.write(&frame) {
                Ok(()) => report.queued += 1,
                Err(err @ PeerError::Backpressure { .. }) => {
                    warn!(
                        connection = %link.connection.id(),
                        %channel,
                        error = %err,
                        "dropping frame under backpressure"
                    );
                    report.dropped += 1;
                    backpressure.get_or_insert(err);
                }
                Err(err) => {
                    debug!(connection = %link.connection.id(), error = %err, "write failed");
                }
            }
        }

        match (policy, backpressure) {
            (BackpressurePolicy::Fail, Some(err)) => Err(err),
            _ => Ok(report),
        }
    }

    pub(crate) fn advertise(&self, channel: &Channel) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return Err(PeerError::Closed);
        }
        if state.advertised.insert(channel.clone()) {
            state.broadcast(&control(FrameKind::Advertise, channel));
        }
        Ok(())
    }

    fn subscribe(
        &self,
        channel: Channel,
        callback: Callback,
    ) -> Result<(SubscriptionId, Rc<SubscriberEntry>)> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return Err(PeerError::Closed);
        }

        let first = !state.subscribers.contains(&channel);
        let entry = Rc::new(SubscriberEntry {
            active: Cell::new(true),
            callback: RefCell::new(callback),
        });
        let id = state.subscribers.register(channel.clone(), entry.clone());
        if first {
            state.broadcast(&control(FrameKind::Subscribe, &channel));
        }
        debug!(%channel, subscription = id.get(), "subscribed");
        Ok((id, entry))
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let removed = {
            let mut state = self.state.borrow_mut();
            if state.closed {
                return Err(PeerError::Closed);
            }
            let removed = state.subscribers.unregister(id);
            if let Some((channel, _)) = &removed {
                if !state.subscribers.contains(channel) {
                    state.broadcast(&control(FrameKind::Unsubscribe, channel));
                }
                debug!(%channel, subscription = id.get(), "unsubscribed");
            }
            removed
        };
        if let Some((_, entry)) = removed {
            entry.deactivate();
        }
        Ok(())
    }

    /// Unsubscribe from a handle's destructor, which may run while the
    /// state is borrowed.
    pub(crate) fn release(&self, id: SubscriptionId) {
        if self.state.try_borrow_mut().is_ok() {
            let _ = self.unsubscribe(id);
        } else {
            self.released.borrow_mut().push(id);
        }
    }

    /// Read, write and accept on ready descriptors. Returns the frames to
    /// deliver and whether a router connection was lost.
    fn service(&self, ready: &[Ready]) -> (Vec<(Channel, Bytes)>, bool) {
        let released = std::mem::take(&mut *self.released.borrow_mut());
        for id in released {
            let _ = self.unsubscribe(id);
        }

        let mut state = self.state.borrow_mut();
        let mut deliveries: Vec<(Channel, Bytes)> = state.loopback.drain(..).collect();
        state.loopback_bytes = 0;

        self.accept_ready(&mut state, ready);

        let mut errors = Vec::new();
        for link in state.links.iter_mut() {
            let Some(readiness) = readiness_of(ready, link.connection.as_raw_fd()) else {
                continue;
            };

            if readiness.writable {
                if let Err(err) = link.connection.on_writable() {
                    errors.push(err);
                    continue;
                }
            }
            if !(readiness.readable || readiness.hangup) || link.connection.is_closed() {
                continue;
            }

            match link.connection.on_readable() {
                Ok(inbound) => {
                    if inbound.established {
                        if let Some(remote) = link.connection.remote() {
                            info!(
                                connection = %link.connection.id(),
                                kind = ?link.kind,
                                remote = %remote.name,
                                peer_id = remote.peer_id.as_deref().unwrap_or("-"),
                                "session established"
                            );
                        }
                    }
                    for frame in inbound.frames {
                        match link.absorb(frame) {
                            Ok(Some(delivery)) => deliveries.push(delivery),
                            Ok(None) => {}
                            Err(err) => {
                                warn!(connection = %link.connection.id(), error = %err, "closing connection");
                                link.connection.close();
                                errors.push(err);
                                break;
                            }
                        }
                    }
                }
                Err(err) => errors.push(err),
            }
        }
        for err in errors {
            state.push_error(err);
        }

        let mut lost_router = false;
        state.links.retain(|link| {
            if link.connection.is_closed() {
                info!(connection = %link.connection.id(), kind = ?link.kind, "connection lost");
                lost_router |= link.kind == LinkKind::Router;
                false
            } else {
                true
            }
        });

        (deliveries, lost_router)
    }

    fn accept_ready(&self, state: &mut ClientState, ready: &[Ready]) {
        let mut accepted = Vec::new();
        for listener in &state.listeners {
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
            let id = state.next_id();
            let local = Hello::new(&self.config.connection.hello, &self.config.name);
            let opened = Connection::accept(id, stream, &self.config.connection, local)
                .and_then(|mut connection| {
                    state.replay(&mut connection)?;
                    Ok(connection)
                });
            match opened {
                Ok(connection) => {
                    debug!(connection = %id, "peer connection accepted");
                    state.links.push(Link::new(LinkKind::Peer, connection));
                }
                Err(err) => {
                    warn!(connection = %id, error = %err, "failed to set up accepted connection");
                    state.push_error(err);
                }
            }
        }
    }

    fn deliver(&self, channel: &Channel, payload: Bytes) {
        #[cfg(feature = "schema")]
        if !self.validate_schema(channel, &payload) {
            return;
        }

        let entries = self.state.borrow().subscribers.lookup(channel);
        if entries.is_empty() {
            debug!(%channel, "no subscriber for frame");
        }

        for entry in entries {
            if !entry.is_active() || self.is_closed() {
                continue;
            }
            let Ok(mut callback) = entry.callback.try_borrow_mut() else {
                continue;
            };
            let reader = MessageReader::new(payload.clone());
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (&mut *callback)(reader)));
            drop(callback);

            let err = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => match err.downcast::<TypedDecodeError>() {
                    Ok(decode) => PeerError::Decode(decode.0),
                    Err(err) => PeerError::Application {
                        channel: channel.to_string(),
                        message: err.to_string(),
                    },
                },
                Err(panic) => PeerError::Application {
                    channel: channel.to_string(),
                    message: format!("callback panicked: {}", panic_message(&*panic)),
                },
            };
            warn!(%channel, error = %err, "subscriber callback failed");
            self.state.borrow_mut().push_error(err);
        }
    }

    #[cfg(feature = "schema")]
    fn validate_schema(&self, channel: &Channel, payload: &[u8]) -> bool {
        if channel.signature().schema_id().is_none() {
            return true;
        }
        let registry = self.schemas.borrow().clone();
        let Some(registry) = registry else {
            return true;
        };
        match registry.validate(channel.signature(), payload) {
            Ok(()) => true,
            Err(err) => {
                warn!(%channel, error = %err, "dropping payload that fails schema validation");
                self.state.borrow_mut().push_error(err.into());
                false
            }
        }
    }

    fn close(&self) {
        let drained = {
            let mut state = self.state.borrow_mut();
            if state.closed {
                return;
            }
            state.closed = true;
            for link in state.links.iter_mut() {
                link.connection.close_gracefully();
            }
            state.links.clear();
            state.listeners.clear();
            state.loopback.clear();
            state.loopback_bytes = 0;
            state.advertised.clear();
            state.subscribers.drain()
        };
        for (_, entry) in &drained {
            entry.deactivate();
        }
        drop(drained);
        info!(name = %self.config.name, "client closed");
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.closed {
            for link in state.links.iter_mut() {
                link.connection.close_gracefully();
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A pub/sub participant: owns its connections and subscriber registry.
///
/// `Client` is a cheap, clonable handle (`Rc` inside) and is `!Send`; add a
/// clone to an [`IoLoop`](crate::IoLoop) and keep using the original.
#[derive(Clone)]
pub struct Client {
    inner: Rc<ClientInner>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        let max_queued_errors = config.max_queued_errors;
        Self {
            inner: Rc::new(ClientInner {
                attachment: Attachment::new(),
                config,
                state: RefCell::new(ClientState {
                    closed: false,
                    next_connection: 1,
                    listeners: Vec::new(),
                    links: Vec::new(),
                    subscribers: ChannelRegistry::new(),
                    advertised: HashSet::new(),
                    loopback: VecDeque::new(),
                    loopback_bytes: 0,
                    errors: VecDeque::new(),
                    max_queued_errors,
                }),
                released: RefCell::new(Vec::new()),
                #[cfg(feature = "schema")]
                schemas: RefCell::new(None),
            }),
        }
    }

    /// A client with default configuration and the given hello name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self::new(ClientConfig {
            name: name.into(),
            ..ClientConfig::default()
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Connect to a router.
    pub fn connect(&self, endpoint: &Endpoint) -> Result<ConnectionId> {
        self.open_link(endpoint, LinkKind::Router)
    }

    /// Connect directly to another client that is listening.
    pub fn connect_peer(&self, endpoint: &Endpoint) -> Result<ConnectionId> {
        self.open_link(endpoint, LinkKind::Peer)
    }

    fn open_link(&self, endpoint: &Endpoint, kind: LinkKind) -> Result<ConnectionId> {
        let inner = &self.inner;
        let mut state = inner.state.borrow_mut();
        if state.closed {
            return Err(PeerError::Closed);
        }

        let stream = routio_transport::connect(endpoint)?;
        let id = state.next_id();
        let local = Hello::new(&inner.config.connection.hello, &inner.config.name);
        let mut connection = Connection::initiate(id, stream, &inner.config.connection, local)?;
        state.replay(&mut connection)?;

        info!(connection = %id, %endpoint, ?kind, "connected");
        state.links.push(Link::new(kind, connection));
        Ok(id)
    }

    /// Accept direct connections from other clients. Returns the bound
    /// endpoint (with the resolved port for `tcp://host:0`).
    pub fn listen(&self, endpoint: &Endpoint) -> Result<Endpoint> {
        let mut state = self.inner.state.borrow_mut();
        if state.closed {
            return Err(PeerError::Closed);
        }

        let listener = IpcListener::bind(endpoint)?;
        listener.set_nonblocking(true)?;
        let local = listener.local_endpoint();
        info!(endpoint = %local, "listening for peers");
        state.listeners.push(listener);
        Ok(local)
    }

    /// A publisher on `channel`. Announces the channel to every connection.
    pub fn publisher(&self, channel: Channel) -> Result<Publisher> {
        let inner = &self.inner;
        inner.advertise(&channel)?;
        Ok(Publisher::new(Rc::downgrade(&self.inner), channel))
    }

    /// A publisher whose channel type follows `T`.
    pub fn typed_publisher<T: Typed>(&self, name: impl Into<String>) -> Result<TypedPublisher<T>> {
        let channel = Channel::new(name, T::signature())?;
        Ok(TypedPublisher::new(self.publisher(channel)?))
    }

    /// Register `callback` for frames on `channel`.
    ///
    /// Callbacks run during [`IoLoop::wait`](crate::IoLoop::wait), in
    /// registration order, with a reader positioned at the payload. Errors
    /// and panics are reported through [`Client::take_errors`] as
    /// [`PeerError::Application`], a failed read on `reader` included.
    pub fn subscriber<F>(&self, channel: Channel, callback: F) -> Result<Subscriber>
    where
        F: FnMut(MessageReader) -> std::result::Result<(), BoxError> + 'static,
    {
        let (id, entry) = self.inner.subscribe(channel.clone(), Box::new(callback))?;
        Ok(Subscriber::new(Rc::downgrade(&self.inner), id, channel, entry))
    }

    /// Register a callback that receives decoded values of type `T`.
    ///
    /// Payloads that fail to decode are reported as [`PeerError::Decode`].
    pub fn typed_subscriber<T, F>(
        &self,
        name: impl Into<String>,
        mut callback: F,
    ) -> Result<TypedSubscriber<T>>
    where
        T: Typed + 'static,
        F: FnMut(T) -> std::result::Result<(), BoxError> + 'static,
    {
        let channel = Channel::new(name, T::signature())?;
        let subscriber = self.subscriber(channel, move |mut reader| {
            let value = <T as Decode>::decode(&mut reader).map_err(TypedDecodeError)?;
            callback(value)
        })?;
        Ok(TypedSubscriber::new(subscriber))
    }

    /// Validate inbound schema-typed payloads against `registry`.
    #[cfg(feature = "schema")]
    pub fn set_schema_registry(&self, registry: std::sync::Arc<routio_schema::SchemaRegistry>) {
        *self.inner.schemas.borrow_mut() = Some(registry);
    }

    /// Errors collected during dispatch, oldest first.
    pub fn take_errors(&self) -> Vec<PeerError> {
        self.inner.state.borrow_mut().errors.drain(..).collect()
    }

    /// Close every connection and invalidate all handles. Idempotent and
    /// safe to call from a callback.
    pub fn close(&self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Open connections, including ones still exchanging hellos.
    pub fn connection_count(&self) -> usize {
        self.inner.state.borrow().links.len()
    }

    /// Number of established connections.
    pub fn established_count(&self) -> usize {
        self.inner
            .state
            .borrow()
            .links
            .iter()
            .filter(|link| link.connection.is_established())
            .count()
    }

    /// Encoded bytes still queued for the network across all connections.
    pub fn pending_bytes(&self) -> usize {
        self.inner
            .state
            .borrow()
            .links
            .iter()
            .map(|link| link.connection.pending_len())
            .sum()
    }

    /// The peer id the router assigned to this client.
    pub fn peer_id(&self) -> Option<String> {
        let state = self.inner.state.borrow();
        state
            .links
            .iter()
            .filter(|link| link.kind == LinkKind::Router)
            .find_map(|link| link.connection.remote()?.peer_id.clone())
    }

    /// Number of peer connections whose remote side subscribed to `channel`.
    pub fn peer_subscriptions(&self, channel: &Channel) -> usize {
        self.inner
            .state
            .borrow()
            .links
            .iter()
            .filter(|link| link.remote_subscriptions.contains(channel))
            .count()
    }

    /// Number of peer connections whose remote side publishes `channel`.
    pub fn peer_publishers(&self, channel: &Channel) -> usize {
        self.inner
            .state
            .borrow()
            .links
            .iter()
            .filter(|link| link.remote_advertised.contains(channel))
            .count()
    }

    /// Local subscribers on `channel`.
    pub fn subscriber_count(&self, channel: &Channel) -> usize {
        self.inner.state.borrow().subscribers.subscriber_count(channel)
    }
}

impl Handler for Client {
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
        for link in &state.links {
            if let Some(interest) = link.connection.interest() {
                out.push((link.connection.as_raw_fd(), interest));
            }
        }
    }

    fn has_pending(&self) -> bool {
        let state = self.inner.state.borrow();
        !state.closed && (!state.loopback.is_empty() || !self.inner.released.borrow().is_empty())
    }

    fn dispatch(&self, ready: &[Ready]) -> bool {
        let inner = &self.inner;
        if inner.is_closed() {
            return false;
        }

        let (deliveries, lost_router) = inner.service(ready);
        for (channel, payload) in deliveries {
            if inner.is_closed() {
                break;
            }
            inner.deliver(&channel, payload);
        }

        if inner.is_closed() {
            return false;
        }
        !(lost_router && inner.config.exit_on_disconnect)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Client")
            .field("name", &self.inner.config.name)
            .field("closed", &state.closed)
            .field("connections", &state.links.len())
            .field("channels", &state.subscribers.len())
            .finish()
    }
}
