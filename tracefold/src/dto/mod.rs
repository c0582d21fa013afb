pub mod tree_dto;

pub use tree_dto::{CollopRow, FunctionRow, MessageRow, MetricRow, NodeDto, TreeDto, NO_PARENT};
