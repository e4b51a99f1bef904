//! Per-topic node arena with the primary and secondary-key indexes.

use super::node::Node;
use std::collections::{BTreeMap, BTreeSet};

/// Index of a node inside its topic arena
pub type Slot = usize;

/// id -> key2 -> slot
type Key2Index = BTreeMap<String, BTreeMap<String, Slot>>;

/// Nodes of one topic. The primary index is ordered by id.
#[derive(Debug, Default)]
pub struct TopicIndex {
    pkey2s: Vec<String>,
    slots: Vec<Option<Node>>,
    free: Vec<Slot>,
    primary: BTreeMap<String, Slot>,
    secondary: BTreeMap<String, Key2Index>,
}

impl TopicIndex {
    pub fn new(pkey2s: &[String]) -> Self {
        Self {
            pkey2s: pkey2s.to_vec(),
            secondary: pkey2s
                .iter()
                .map(|p| (p.clone(), BTreeMap::new()))
                .collect(),
            ..Default::default()
        }
    }

    /// Number of primary nodes
    pub fn len(&self) -> usize {
        self.primary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    pub fn pkey2s(&self) -> &[String] {
        &self.pkey2s
    }

    pub fn get(&self, slot: Slot) -> Option<&Node> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, slot: Slot) -> Option<&mut Node> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    pub fn primary_slot(&self, id: &str) -> Option<Slot> {
        self.primary.get(id).copied()
    }

    pub fn primary(&self, id: &str) -> Option<&Node> {
        self.primary_slot(id).and_then(|slot| self.get(slot))
    }

    /// Instance of `id` registered under `pkey2 = key2`
    pub fn instance_slot(&self, pkey2: &str, id: &str, key2: &str) -> Option<Slot> {
        self.secondary
            .get(pkey2)
            .and_then(|ids| ids.get(id))
            .and_then(|keys| keys.get(key2))
            .copied()
    }

    /// Every instance of `id`, main instance first
    pub fn instance_slots(&self, id: &str) -> Vec<Slot> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        if let Some(slot) = self.primary_slot(id) {
            seen.insert(slot);
            out.push(slot);
        }
        for ids in self.secondary.values() {
            for slot in ids.get(id).into_iter().flat_map(|keys| keys.values()) {
                if seen.insert(*slot) {
                    out.push(*slot);
                }
            }
        }
        out
    }

    /// Primary nodes in id order
    pub fn primaries(&self) -> impl Iterator<Item = &Node> {
        self.primary.values().filter_map(move |slot| self.get(*slot))
    }

    /// Instances registered in one pkey2 index, or in all of them, without repeats.
    pub fn instances(&self, pkey2: Option<&str>) -> Vec<&Node> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for (name, ids) in &self.secondary {
            if pkey2.map_or(false, |p| p != name) {
                continue;
            }
            for slot in ids.values().flat_map(|keys| keys.values()) {
                if seen.insert(*slot) {
                    if let Some(node) = self.get(*slot) {
                        out.push(node);
                    }
                }
            }
        }
        out
    }

    /// Every live slot
    pub fn slots(&self) -> Vec<Slot> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, node)| node.as_ref().map(|_| slot))
            .collect()
    }

    /// Place a node in the arena and register it in the indexes.
    pub(crate) fn insert(&mut self, node: Node) -> Slot {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        if node.is_primary() {
            self.primary.insert(node.id().to_string(), slot);
        }
        for pkey2 in &self.pkey2s {
            if let Some(key2) = node.key2(pkey2) {
                self.secondary
                    .entry(pkey2.clone())
                    .or_default()
                    .entry(node.id().to_string())
                    .or_default()
                    .insert(key2.to_string(), slot);
            }
        }
        self.slots[slot] = Some(node);
        slot
    }

    /// Drop a node from the arena and from every index entry pointing at it.
    pub(crate) fn remove(&mut self, slot: Slot) -> Option<Node> {
        let node = self.slots.get_mut(slot)?.take()?;
        if self.primary.get(node.id()) == Some(&slot) {
            self.primary.remove(node.id());
        }
        for ids in self.secondary.values_mut() {
            if let Some(keys) = ids.get_mut(node.id()) {
                keys.retain(|_, s| *s != slot);
                if keys.is_empty() {
                    ids.remove(node.id());
                }
            }
        }
        self.free.push(slot);
        Some(node)
    }
}
