use dashmap::DashMap;

use herald_core::protocol::channel::Channels;

/// Namespace registration table: `data-tx channel -> namespace`.
///
/// Written only by the relay's listening task; readable from anywhere.
/// Entries are never removed while the relay runs.
pub struct NamespaceRegistry {
    channels: Channels,
    by_channel: DashMap<String, String>,
}

impl NamespaceRegistry {
    pub fn new(channels: Channels) -> Self {
        Self {
            channels,
            by_channel: DashMap::new(),
        }
    }

    /// Record a namespace. Returns `false` if it was already present.
    pub(crate) fn insert(&self, namespace: &str) -> bool {
        let channel = self.channels.data_tx(namespace);
        if self.by_channel.contains_key(&channel) {
            return false;
        }
        self.by_channel.insert(channel, namespace.to_owned());
        true
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.by_channel.contains_key(&self.channels.data_tx(namespace))
    }

    pub fn contains_channel(&self, channel: &str) -> bool {
        self.by_channel.contains_key(channel)
    }

    pub fn namespace_for_channel(&self, channel: &str) -> Option<String> {
        self.by_channel.get(channel).map(|r| r.value().clone())
    }

    /// Registered namespaces, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let mut out: Vec<String> = self.by_channel.iter().map(|r| r.value().clone()).collect();
        out.sort();
        out
    }

    pub fn len(&self) -> usize {
        self.by_channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_channel.is_empty()
    }
}
