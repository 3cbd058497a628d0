use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use bytes::Bytes;
use routio_message::{encode_message, Encode, MessageWriter, Typed};

use crate::channel::{Channel, SubscriptionId};
use crate::client::{ClientInner, SubscriberEntry};
use crate::error::{PeerError, Result};

/// What a publisher does when a connection is over its high-water mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackpressurePolicy {
    /// Skip the congested connection and count it in [`SendReport::dropped`].
    #[default]
    Drop,
    /// Return [`PeerError::Backpressure`]. Connections that had room still
    /// received the frame.
    Fail,
}

/// Outcome of one [`Publisher::send`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Queued for subscribers in the same client.
    pub loopback: bool,
    /// Connections the frame was queued on.
    pub queued: usize,
    /// Connections skipped because of backpressure.
    pub dropped: usize,
}

impl SendReport {
    /// Nothing was dropped.
    pub fn is_complete(&self) -> bool {
        self.dropped == 0
    }
}

/// A channel-bound sending handle.
///
/// Holds only a weak reference to its client; once the client is closed or
/// dropped, [`Publisher::send`] fails with [`PeerError::Closed`].
#[derive(Clone)]
pub struct Publisher {
    client: Weak<ClientInner>,
    channel: Channel,
    policy: BackpressurePolicy,
}

impl Publisher {
    pub(crate) fn new(client: Weak<ClientInner>, channel: Channel) -> Self {
        Self {
            client,
            channel,
            policy: BackpressurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: BackpressurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Encode `message` and publish it.
    ///
    /// Local subscribers get it on the next dispatch, never during this
    /// call.
    pub fn send<T: Encode + ?Sized>(&self, message: &T) -> Result<SendReport> {
        self.send_payload(encode_message(message))
    }

    /// Publish everything written to `writer`.
    pub fn send_writer(&self, writer: MessageWriter) -> Result<SendReport> {
        self.send_payload(writer.finish())
    }

    /// Publish an already encoded payload.
    pub fn send_payload(&self, payload: impl Into<Bytes>) -> Result<SendReport> {
        let client = self.client.upgrade().ok_or(PeerError::Closed)?;
        client.publish(&self.channel, payload.into(), self.policy)
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("channel", &self.channel)
            .field("policy", &self.policy)
            .finish()
    }
}

/// A registered callback on one channel.
///
/// Dropping the handle unsubscribes. [`Subscriber::unsubscribe`] does the
/// same explicitly and may be called from inside the callback itself.
pub struct Subscriber {
    client: Weak<ClientInner>,
    id: SubscriptionId,
    channel: Channel,
    entry: Rc<SubscriberEntry>,
    released: Cell<bool>,
}

impl Subscriber {
    pub(crate) fn new(
        client: Weak<ClientInner>,
        id: SubscriptionId,
        channel: Channel,
        entry: Rc<SubscriberEntry>,
    ) -> Self {
        Self {
            client,
            id,
            channel,
            entry,
            released: Cell::new(false),
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Still receiving frames.
    pub fn is_active(&self) -> bool {
        !self.released.get() && self.entry.is_active()
    }

    /// Stop receiving frames. Repeated calls succeed; calls after the
    /// client closed fail with [`PeerError::Closed`].
    pub fn unsubscribe(&self) -> Result<()> {
        if self.released.get() {
            return Ok(());
        }
        let client = self.client.upgrade().ok_or(PeerError::Closed)?;
        client.unsubscribe(self.id)?;
        self.released.set(true);
        Ok(())
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        if self.released.get() || !self.entry.is_active() {
            return;
        }
        self.entry.deactivate();
        if let Some(client) = self.client.upgrade() {
            client.release(self.id);
        }
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// A publisher whose channel type is fixed by `T`.
pub struct TypedPublisher<T> {
    inner: Publisher,
    _marker: PhantomData<fn(&T)>,
}

impl<T: Typed> TypedPublisher<T> {
    pub(crate) fn new(inner: Publisher) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    pub fn send(&self, value: &T) -> Result<SendReport> {
        self.inner.send(value)
    }

    pub fn channel(&self) -> &Channel {
        self.inner.channel()
    }

    pub fn with_policy(self, policy: BackpressurePolicy) -> Self {
        Self::new(self.inner.with_policy(policy))
    }

    pub fn into_inner(self) -> Publisher {
        self.inner
    }
}

impl<T> Clone for TypedPublisher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for TypedPublisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypedPublisher").field(&self.inner).finish()
    }
}

/// A subscriber whose callback receives decoded `T` values.
pub struct TypedSubscriber<T> {
    inner: Subscriber,
    _marker: PhantomData<fn(T)>,
}

impl<T> TypedSubscriber<T> {
    pub(crate) fn new(inner: Subscriber) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    pub fn channel(&self) -> &Channel {
        self.inner.channel()
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    pub fn unsubscribe(&self) -> Result<()> {
        self.inner.unsubscribe()
    }

    pub fn into_inner(self) -> Subscriber {
        self.inner
    }
}

impl<T> fmt::Debug for TypedSubscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypedSubscriber").field(&self.inner).finish()
    }
}
