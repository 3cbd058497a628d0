use std::collections::HashMap;
use std::fmt;

use routio_frame::{Frame, DEFAULT_MAX_NAME};
use routio_message::TypeSignature;

use crate::error::{PeerError, Result};

/// A named, typed publish/subscribe address.
///
/// Two channels with the same name but different signatures are disjoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Channel {
    name: String,
    signature: TypeSignature,
}

impl Channel {
    /// Build a channel, rejecting empty or oversized names.
    pub fn new(name: impl Into<String>, signature: TypeSignature) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(PeerError::InvalidChannel(
                "channel name must not be empty".to_string(),
            ));
        }
        if name.len() > DEFAULT_MAX_NAME {
            return Err(PeerError::InvalidChannel(format!(
                "channel name too long: {} bytes (max {})",
                name.len(),
                DEFAULT_MAX_NAME
            )));
        }
        Ok(Self { name, signature })
    }

    /// Build a channel from its name and signature text.
    pub fn parse(name: impl Into<String>, signature: &str) -> Result<Self> {
        let signature = TypeSignature::parse(signature)
            .map_err(|err| PeerError::InvalidChannel(err.to_string()))?;
        Self::new(name, signature)
    }

    /// The channel a received frame is addressed to.
    ///
    /// An unparseable address is a protocol violation by the sender.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        Self::parse(frame.channel.as_str(), &frame.signature).map_err(|err| {
            PeerError::Protocol(format!(
                "bad channel address in {} frame: {err}",
                frame.kind
            ))
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &TypeSignature {
        &self.signature
    }

    /// Signature text as carried on the wire.
    pub fn signature_text(&self) -> String {
        self.signature.as_text().into_owned()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.signature)
    }
}

/// Handle returned by [`ChannelRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Maps channels to the ordered set of their subscribers.
///
/// Generic over the subscriber payload: clients store callbacks, the router
/// stores connection ids.
#[derive(Debug)]
pub struct ChannelRegistry<S> {
    channels: HashMap<Channel, Vec<(SubscriptionId, S)>>,
    index: HashMap<SubscriptionId, Channel>,
    next_id: u64,
}

impl<S> Default for ChannelRegistry<S> {
    fn default() -> Self {
        Self {
            channels: HashMap::new(),
            index: HashMap::new(),
            next_id: 1,
        }
    }
}

impl<S> ChannelRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber; it is ordered after every existing subscriber of
    /// the same channel.
    pub fn register(&mut self, channel: Channel, subscriber: S) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.channels
            .entry(channel.clone())
            .or_default()
            .push((id, subscriber));
        self.index.insert(id, channel);
        id
    }

    /// Remove a subscriber. Unknown or already removed handles return `None`.
    pub fn unregister(&mut self, id: SubscriptionId) -> Option<(Channel, S)> {
        let channel = self.index.remove(&id)?;
        let entries = self.channels.get_mut(&channel)?;
        let position = entries.iter().position(|(entry, _)| *entry == id)?;
        let (_, subscriber) = entries.remove(position);
        if entries.is_empty() {
            self.channels.remove(&channel);
        }
        Some((channel, subscriber))
    }

    /// Whether the channel has at least one subscriber.
    pub fn contains(&self, channel: &Channel) -> bool {
        self.channels.contains_key(channel)
    }

    /// The channel a subscription belongs to.
    pub fn channel_of(&self, id: SubscriptionId) -> Option<&Channel> {
        self.index.get(&id)
    }

    /// Number of subscribers on one channel.
    pub fn subscriber_count(&self, channel: &Channel) -> usize {
        self.channels.get(channel).map_or(0, Vec::len)
    }

    /// Channels with at least one subscriber.
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.keys()
    }

    /// Number of distinct channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Remove every subscriber and return them.
    pub fn drain(&mut self) -> Vec<(Channel, S)> {
        self.index.clear();
        self.channels
            .drain()
            .flat_map(|(channel, entries)| {
                entries
                    .into_iter()
                    .map(move |(_, subscriber)| (channel.clone(), subscriber))
            })
            .collect()
    }
}

impl<S: Clone> ChannelRegistry<S> {
    /// Snapshot of a channel's subscribers in registration order.
    ///
    /// The snapshot is detached from the registry, so subscribers may be
    /// added or removed while it is being walked.
    pub fn lookup(&self, channel: &Channel) -> Vec<S> {
        self.channels
            .get(channel)
            .map(|entries| entries.iter().map(|(_, s)| s.clone()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use routio_frame::FrameKind;

    use super::*;

    fn temp(sig: &str) -> Channel {
        Channel::parse("temp", sig).unwrap()
    }

    #[test]
    fn signatures_separate_channels() {
        let mut registry = ChannelRegistry::new();
        registry.register(temp("f"), "float");
        registry.register(temp("i"), "int");

        assert_eq!(registry.lookup(&temp("f")), vec!["float"]);
        assert_eq!(registry.lookup(&temp("i")), vec!["int"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn lookup_preserves_registration_order() {
        let mut registry = ChannelRegistry::new();
        for n in 0..5 {
            registry.register(temp("f"), n);
        }
        assert_eq!(registry.lookup(&temp("f")), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn unregister_is_idempotent_and_drops_empty_channels() {
        let mut registry = ChannelRegistry::new();
        let first = registry.register(temp("f"), 1);
        let second = registry.register(temp("f"), 2);

        assert_eq!(registry.unregister(first), Some((temp("f"), 1)));
        assert_eq!(registry.unregister(first), None);
        assert_eq!(registry.lookup(&temp("f")), vec![2]);

        registry.unregister(second);
        assert!(!registry.contains(&temp("f")));
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshot_survives_mutation() {
        let mut registry = ChannelRegistry::new();
        let first = registry.register(temp("f"), 'a');
        registry.register(temp("f"), 'b');

        let snapshot = registry.lookup(&temp("f"));
        registry.unregister(first);
        registry.register(temp("f"), 'c');

        assert_eq!(snapshot, vec!['a', 'b']);
        assert_eq!(registry.lookup(&temp("f")), vec!['b', 'c']);
    }

    #[test]
    fn drain_empties_registry() {
        let mut registry = ChannelRegistry::new();
        let id = registry.register(temp("f"), 1);
        registry.register(temp("i"), 2);

        let mut drained: Vec<_> = registry.drain().into_iter().map(|(_, s)| s).collect();
        drained.sort();
        assert_eq!(drained, vec![1, 2]);
        assert!(registry.is_empty());
        assert!(registry.channel_of(id).is_none());
    }

    #[test]
    fn channel_validation() {
        assert!(Channel::parse("", "f").is_err());
        assert!(Channel::parse("x".repeat(DEFAULT_MAX_NAME + 1), "f").is_err());
        assert!(matches!(
            Channel::parse("temp", "float128"),
            Err(PeerError::InvalidChannel(_))
        ));
        assert_eq!(temp("f").to_string(), "temp[f]");
    }

    #[test]
    fn bad_frame_address_is_protocol_error() {
        let frame = Frame::control(FrameKind::Subscribe, "temp", "nope");
        assert!(Channel::from_frame(&frame).unwrap_err().is_protocol());

        let frame = Frame::control(FrameKind::Subscribe, "temp", "i32");
        assert_eq!(Channel::from_frame(&frame).unwrap(), temp("i"));
    }
}
