use thiserror::Error;

use crate::{FunctionId, LocationId};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeError {
    /// Both operands carry data for the same location at the same call
    /// path; merging would double-count that location's statistics.
    #[error("location {location} present in both trees at function {function_id}")]
    DuplicateLocation {
        location: LocationId,
        function_id: FunctionId,
    },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtoError {
    /// A node row points at a parent that does not precede it.
    #[error("node {node}: parent {parent} does not precede it")]
    BadParent { node: u32, parent: u32 },

    /// A statistic row points at a node row that does not exist.
    #[error("statistic row references unknown node {node}")]
    BadNode { node: u32 },
}
