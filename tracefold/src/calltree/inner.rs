use indexmap::IndexMap;
use indextree::{Arena, NodeId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MergeError;
use crate::stats::{CollopStats, FunctionStats, MessageStats, MetricStats, NodeData};
use crate::{FunctionId, LocationId, MetricId};

use super::traits::Mergeable;

/// Per-node payload: one distinct call path plus everything every
/// location recorded for it. Locations are only ever appended to
/// `node_data`, so indexmap slots stay valid for the lifetime of the
/// frame.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CallPathFrame {
    pub function_id: FunctionId,
    node_data: IndexMap<LocationId, NodeData>,
    pub has_p2p: bool,
    pub has_collop: bool,
    /// Last touched (location, slot). Trace readers feed one location's
    /// event stream contiguously, so most writes hit this and skip the
    /// map probe.
    #[serde(skip)]
    last: Option<(LocationId, usize)>,
}

impl PartialEq for CallPathFrame {
    fn eq(&self, other: &Self) -> bool {
        // the cache is not part of the frame's value
        self.function_id == other.function_id
            && self.has_p2p == other.has_p2p
            && self.has_collop == other.has_collop
            && self.node_data == other.node_data
    }
}

impl CallPathFrame {
    pub fn new(function_id: FunctionId) -> Self {
        Self {
            function_id,
            ..Default::default()
        }
    }

    pub fn node_data(&self) -> &IndexMap<LocationId, NodeData> {
        &self.node_data
    }

    pub fn location_data(&self, location: LocationId) -> Option<&NodeData> {
        self.node_data.get(&location)
    }

    pub fn locations(&self) -> impl Iterator<Item = LocationId> + '_ {
        self.node_data.keys().copied()
    }

    fn data_mut(&mut self, location: LocationId) -> &mut NodeData {
        let slot = match self.last {
            Some((loc, slot)) if loc == location => slot,
            _ => {
                let entry = self.node_data.entry(location);
                let slot = entry.index();
                entry.or_default();
                self.last = Some((location, slot));
                slot
            }
        };
        self.node_data.get_index_mut(slot).unwrap().1
    }

    /// Accumulate call statistics for `location`, creating its record on
    /// first sight.
    pub fn add_function_data(&mut self, location: LocationId, stats: FunctionStats) {
        self.data_mut(location).function += stats;
    }

    pub fn add_message_data(&mut self, location: LocationId, stats: MessageStats) {
        self.has_p2p = true;
        self.data_mut(location).message += stats;
    }

    pub fn add_collop_data(&mut self, location: LocationId, stats: CollopStats) {
        self.has_collop = true;
        self.data_mut(location).collop += stats;
    }

    /// Last writer wins, unlike the additive `add_*` operations. Callers
    /// holding cumulative metric samples pre-aggregate before writing.
    pub fn set_metric(&mut self, location: LocationId, metric: MetricId, value: MetricStats) {
        self.data_mut(location).metrics.insert(metric, value);
    }

    /// Fold every location's record into one.
    pub fn aggregate(&self) -> NodeData {
        let mut acc = NodeData::default();
        for data in self.node_data.values() {
            acc += data;
        }
        acc
    }
}

/// Call-path forest. A synthetic root node (skipped by traversal, never
/// serialized) owns one subtree per distinct top-level function.
/// Siblings are kept ordered by function id, which makes traversal and
/// serialization reproducible regardless of insertion order.
#[derive(Serialize, Deserialize, Debug)]
pub struct CallPathTree {
    pub arena: Arena<CallPathFrame>,
    pub root: NodeId,
}

impl Default for CallPathTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CallPathTree {
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(CallPathFrame::default());
        Self { arena, root }
    }

    pub fn frame(&self, node: NodeId) -> &CallPathFrame {
        self.arena[node].get()
    }

    pub fn frame_mut(&mut self, node: NodeId) -> &mut CallPathFrame {
        self.arena[node].get_mut()
    }

    /// Number of call-path nodes, excluding the synthetic root.
    pub fn node_count(&self) -> usize {
        self.arena.len() - 1
    }

    /// Child of `parent` (root level for `None`) keyed by `function_id`,
    /// created on first sight. Idempotent: repeated and recursive calls
    /// along the same path land on the same node.
    pub fn insert_node(&mut self, parent: Option<NodeId>, function_id: FunctionId) -> NodeId {
        let parent = parent.unwrap_or(self.root);
        if let Some(existing) = self.find_child(parent, function_id) {
            return existing;
        }
        self.insert_sorted(parent, CallPathFrame::new(function_id))
    }

    fn find_child(&self, parent: NodeId, function_id: FunctionId) -> Option<NodeId> {
        parent
            .children(&self.arena)
            .find(|&c| self.arena[c].get().function_id == function_id)
    }

    /// Attach `frame` under `parent`, keeping siblings ordered by
    /// function id.
    fn insert_sorted(&mut self, parent: NodeId, frame: CallPathFrame) -> NodeId {
        let mut next_sibling = None;
        for child in parent.children(&self.arena) {
            if self.arena[child].get().function_id > frame.function_id {
                next_sibling = Some(child);
                break;
            }
        }
        let node = self.arena.new_node(frame);
        match next_sibling {
            Some(sibling) => sibling.insert_before(node, &mut self.arena),
            None => parent.append(node, &mut self.arena),
        }
        node
    }

    /// Forest roots in ascending function-id order.
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.root.children(&self.arena)
    }

    /// Pre-order over the whole forest: a node, then its children in
    /// ascending function-id order. This is the order statistics get
    /// serialized in.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.root.descendants(&self.arena).skip(1) // skip synthetic root
    }

    /// Function ids from the forest root down to `node`.
    pub fn path(&self, node: NodeId) -> Vec<FunctionId> {
        let mut path: Vec<_> = node
            .ancestors(&self.arena)
            .filter(|&n| n != self.root)
            .map(|n| self.arena[n].get().function_id)
            .collect();
        path.reverse();
        path
    }

    /// Union `theirs` into the frame at `node`; every location must be
    /// new to this frame.
    fn merge_frame(&mut self, node: NodeId, theirs: &CallPathFrame) -> Result<(), MergeError> {
        let frame = self.arena[node].get_mut();
        frame.has_p2p |= theirs.has_p2p;
        frame.has_collop |= theirs.has_collop;
        for (&location, data) in theirs.node_data.iter() {
            if frame.node_data.contains_key(&location) {
                return Err(MergeError::DuplicateLocation {
                    location,
                    function_id: frame.function_id,
                });
            }
            frame.node_data.insert(location, data.clone());
        }
        Ok(())
    }

    /// Deep-copy an unmatched subtree of `other` under `parent`.
    fn adopt_subtree(&mut self, parent: NodeId, other: &Self, other_node: NodeId) {
        let mut stack = vec![(parent, other_node)];
        while let Some((my_parent, theirs)) = stack.pop() {
            let node = self.insert_sorted(my_parent, other.arena[theirs].get().clone());
            for child in theirs.children(&other.arena) {
                stack.push((node, child));
            }
        }
    }
}

impl Mergeable for CallPathTree {
    type Error = MergeError;

    /// Fold `other` into `self`, matching nodes by call path: matched
    /// nodes union their per-location data, unmatched subtrees are
    /// adopted wholesale. Location sets must be disjoint at every
    /// matched node; on collision the merge stops and `self` may hold a
    /// partial union, so the caller discards it.
    fn merge(&mut self, other: &Self) -> Result<(), MergeError> {
        debug!(nodes = other.node_count(), "merging call path tree");
        let mut stack = vec![(self.root, other.root)];
        while let Some((my_curr, other_curr)) = stack.pop() {
            self.merge_frame(my_curr, other.arena[other_curr].get())?;
            for other_child in other_curr.children(&other.arena) {
                let fid = other.arena[other_child].get().function_id;
                match self.find_child(my_curr, fid) {
                    Some(my_child) => stack.push((my_child, other_child)),
                    None => self.adopt_subtree(my_curr, other, other_child),
                }
            }
        }
        Ok(())
    }
}
