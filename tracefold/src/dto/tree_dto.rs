use fxhash::FxHashMap;
use indextree::NodeId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calltree::CallPathTree;
use crate::error::DtoError;
use crate::stats::{CollopStats, FunctionStats, MessageStats, MetricStats, NodeData};
use crate::{FunctionId, LocationId, MetricId};

/// Parent sentinel for forest roots.
pub const NO_PARENT: u32 = u32::MAX;

/// One call-path node in serial order. The row's position in
/// `TreeDto::nodes` is its serial id; a parent's serial id is always
/// strictly lower than its children's.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeDto {
    pub parent: u32,
    pub function_id: FunctionId,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionRow {
    pub node: u32,
    pub location: LocationId,
    pub stats: FunctionStats,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRow {
    pub node: u32,
    pub location: LocationId,
    pub stats: MessageStats,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollopRow {
    pub node: u32,
    pub location: LocationId,
    pub stats: CollopStats,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct MetricRow {
    pub node: u32,
    pub location: LocationId,
    pub metric: MetricId,
    pub value: MetricStats,
}

/// Flat form of a call-path tree, the only place the tree's shape is
/// externalized. Node rows alone reproduce the shape; the statistic
/// rows replay into the rebuilt nodes. Rows are emitted in pre-order,
/// locations sorted within a node, so the same forest always flattens
/// to the same byte-identical DTO.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TreeDto {
    pub nodes: Vec<NodeDto>,
    pub functions: Vec<FunctionRow>,
    pub messages: Vec<MessageRow>,
    pub collops: Vec<CollopRow>,
    pub metrics: Vec<MetricRow>,
}

impl TreeDto {
    /// Flatten `tree`, assigning dense zero-based serial ids in
    /// pre-order visitation order.
    pub fn from_tree(tree: &CallPathTree) -> Self {
        let mut dto = TreeDto::default();
        let mut serial: FxHashMap<NodeId, u32> = FxHashMap::default();

        for node in tree.iter() {
            let id = dto.nodes.len() as u32;
            serial.insert(node, id);

            let frame = tree.frame(node);
            let parent = tree.arena[node]
                .parent()
                .filter(|&p| p != tree.root)
                .map(|p| serial[&p])
                .unwrap_or(NO_PARENT);
            dto.nodes.push(NodeDto {
                parent,
                function_id: frame.function_id,
            });

            let mut entries: Vec<(&LocationId, &NodeData)> = frame.node_data().iter().collect();
            entries.sort_unstable_by_key(|&(&location, _)| location);
            for (&location, data) in entries {
                if !data.function.is_empty() {
                    dto.functions.push(FunctionRow {
                        node: id,
                        location,
                        stats: data.function,
                    });
                }
                if frame.has_p2p && !data.message.is_empty() {
                    dto.messages.push(MessageRow {
                        node: id,
                        location,
                        stats: data.message,
                    });
                }
                if frame.has_collop && !data.collop.is_empty() {
                    dto.collops.push(CollopRow {
                        node: id,
                        location,
                        stats: data.collop,
                    });
                }
                for (&metric, &value) in data.metrics.iter() {
                    dto.metrics.push(MetricRow {
                        node: id,
                        location,
                        metric,
                        value,
                    });
                }
            }
        }

        debug!(nodes = dto.nodes.len(), "flattened call path tree");
        dto
    }

    /// Rebuild a tree isomorphic to the one this DTO was flattened
    /// from. Parent rows must precede their children.
    pub fn to_tree(&self) -> Result<CallPathTree, DtoError> {
        let mut tree = CallPathTree::new();
        let mut by_serial = Vec::with_capacity(self.nodes.len());

        for (id, node) in self.nodes.iter().enumerate() {
            let parent = if node.parent == NO_PARENT {
                None
            } else {
                if node.parent as usize >= id {
                    return Err(DtoError::BadParent {
                        node: id as u32,
                        parent: node.parent,
                    });
                }
                Some(by_serial[node.parent as usize])
            };
            by_serial.push(tree.insert_node(parent, node.function_id));
        }

        let lookup = |node: u32| -> Result<NodeId, DtoError> {
            by_serial
                .get(node as usize)
                .copied()
                .ok_or(DtoError::BadNode { node })
        };

        for row in &self.functions {
            tree.frame_mut(lookup(row.node)?).add_function_data(row.location, row.stats);
        }
        for row in &self.messages {
            tree.frame_mut(lookup(row.node)?).add_message_data(row.location, row.stats);
        }
        for row in &self.collops {
            tree.frame_mut(lookup(row.node)?).add_collop_data(row.location, row.stats);
        }
        for row in &self.metrics {
            tree.frame_mut(lookup(row.node)?).set_metric(row.location, row.metric, row.value);
        }

        Ok(tree)
    }

    /// Byte-level codec for handing a tree to another analysis process.
    pub fn to_bytes(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> bincode::Result<Self> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::MinMaxSum;

    fn example_tree() -> CallPathTree {
        let mut tree = CallPathTree::new();
        let main = tree.insert_node(None, 1);
        let foo = tree.insert_node(Some(main), 2);
        tree.frame_mut(foo).add_function_data(0, FunctionStats::invocation(100, 40));
        tree.frame_mut(main).add_function_data(0, FunctionStats::invocation(60, 60));
        tree
    }

    #[test]
    fn test_example_serialization() {
        let dto = TreeDto::from_tree(&example_tree());
        assert_eq!(
            dto.nodes,
            vec![
                NodeDto { parent: NO_PARENT, function_id: 1 },
                NodeDto { parent: 0, function_id: 2 },
            ]
        );
        assert_eq!(dto.functions.len(), 2);
        assert_eq!(dto.functions[0].node, 0);
        assert_eq!(dto.functions[0].stats.incl, MinMaxSum::sample(60));
        assert_eq!(dto.functions[1].node, 1);
        assert_eq!(dto.functions[1].stats.excl, MinMaxSum::sample(40));
        assert!(dto.messages.is_empty());
        assert!(dto.collops.is_empty());
    }

    #[test]
    fn test_round_trip() {
        let mut tree = example_tree();
        let main = tree.roots().next().unwrap();
        let bar = tree.insert_node(Some(main), 9);
        tree.frame_mut(bar).add_message_data(3, MessageStats::send(128));
        tree.frame_mut(bar).add_collop_data(1, CollopStats::op(16, 16));
        tree.frame_mut(bar).set_metric(1, 7, MetricStats::Float { incl: 2.5, excl: 1.0 });
        tree.insert_node(None, 4);

        let dto = TreeDto::from_tree(&tree);
        let rebuilt = dto.to_tree().unwrap();
        assert_eq!(rebuilt.node_count(), tree.node_count());
        assert_eq!(TreeDto::from_tree(&rebuilt), dto);
    }

    #[test]
    fn test_round_trip_through_bytes() {
        let dto = TreeDto::from_tree(&example_tree());
        let bytes = dto.to_bytes().unwrap();
        let back = TreeDto::from_bytes(&bytes).unwrap();
        assert_eq!(back, dto);
    }

    #[test]
    fn test_parent_precedes_child() {
        let mut tree = example_tree();
        let main = tree.roots().next().unwrap();
        let foo = tree.insert_node(Some(main), 2);
        tree.insert_node(Some(foo), 3);
        tree.insert_node(None, 0);

        let dto = TreeDto::from_tree(&tree);
        for (id, node) in dto.nodes.iter().enumerate() {
            assert!(node.parent == NO_PARENT || (node.parent as usize) < id);
        }
    }

    #[test]
    fn test_bad_parent() {
        let dto = TreeDto {
            nodes: vec![
                NodeDto { parent: 1, function_id: 1 },
                NodeDto { parent: NO_PARENT, function_id: 2 },
            ],
            ..Default::default()
        };
        assert_eq!(dto.to_tree().unwrap_err(), DtoError::BadParent { node: 0, parent: 1 });
    }

    #[test]
    fn test_bad_node_row() {
        let dto = TreeDto {
            nodes: vec![NodeDto { parent: NO_PARENT, function_id: 1 }],
            functions: vec![FunctionRow {
                node: 5,
                location: 0,
                stats: FunctionStats::invocation(1, 1),
            }],
            ..Default::default()
        };
        assert_eq!(dto.to_tree().unwrap_err(), DtoError::BadNode { node: 5 });
    }
}
