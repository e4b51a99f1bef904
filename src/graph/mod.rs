//! In-memory node graph of one treedb.
//!
//! Nodes live in per-topic arenas; hooks and fkeys are mutated only by [`link`].

pub mod filter;
pub mod index;
pub mod link;
pub mod node;

pub use filter::node_matches;
pub use index::{Slot, TopicIndex};
pub use link::LinkSpec;
pub use node::{Node, NodeMeta};

use crate::schema::SchemaRegistry;
use std::collections::HashMap;

/// Address of one node instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeSlot {
    pub topic_name: String,
    pub slot: Slot,
}

impl NodeSlot {
    pub fn new(topic_name: &str, slot: Slot) -> Self {
        Self {
            topic_name: topic_name.to_string(),
            slot,
        }
    }
}

/// All topics of a treedb
#[derive(Debug, Default)]
pub struct Graph {
    topics: HashMap<String, TopicIndex>,
}

impl Graph {
    /// Empty graph with one index per registered topic
    pub fn new(registry: &SchemaRegistry) -> Self {
        let topics = registry
            .topics()
            .iter()
            .map(|t| (t.topic_name.clone(), TopicIndex::new(&t.pkey2s)))
            .collect();
        Self { topics }
    }

    pub fn topic(&self, topic_name: &str) -> Option<&TopicIndex> {
        self.topics.get(topic_name)
    }

    pub(crate) fn topic_mut(&mut self, topic_name: &str) -> Option<&mut TopicIndex> {
        self.topics.get_mut(topic_name)
    }

    /// Replace the nodes of a topic, hooks of other topics are left as they are.
    pub(crate) fn set_topic(&mut self, topic_name: &str, index: TopicIndex) {
        self.topics.insert(topic_name.to_string(), index);
    }

    /// Main instance of `id`
    pub fn node(&self, topic_name: &str, id: &str) -> Option<&Node> {
        self.topic(topic_name).and_then(|t| t.primary(id))
    }

    pub(crate) fn node_mut(&mut self, topic_name: &str, id: &str) -> Option<&mut Node> {
        let topic = self.topics.get_mut(topic_name)?;
        let slot = topic.primary_slot(id)?;
        topic.get_mut(slot)
    }

    pub fn instance(&self, at: &NodeSlot) -> Option<&Node> {
        self.topic(&at.topic_name).and_then(|t| t.get(at.slot))
    }

    pub(crate) fn instance_mut(&mut self, at: &NodeSlot) -> Option<&mut Node> {
        self.topics
            .get_mut(&at.topic_name)
            .and_then(|t| t.get_mut(at.slot))
    }

    /// Every instance slot of `id` in a topic, main instance first
    pub fn instance_slots(&self, topic_name: &str, id: &str) -> Vec<NodeSlot> {
        self.topic(topic_name)
            .map(|t| {
                t.instance_slots(id)
                    .into_iter()
                    .map(|slot| NodeSlot::new(topic_name, slot))
                    .collect()
            })
            .unwrap_or_default()
    }
}
