//! 决策树引擎
//!
//! 由可插拔的条件操作符和固定的门操作符（and/nand/or/nor/xor/xnor）
//! 动态组合出布尔决策树。树从 JSON 模型加载，经注册表校验后构建，
//! 再对运行时值做短路遍历，产出是/否结论及附带的结果负载。

pub mod builder;
pub mod error;
pub mod gates;
pub mod model;
pub mod node;
pub mod operand;
pub mod operator;
pub mod registry;
pub mod tree;

pub use builder::{GateBuilder, NodeBuilder, TreeBuilder};
pub use error::{Result, TreeError};
pub use model::{NodeModel, TreeModel};
pub use node::{ChildCursor, Node, NodeKind};
pub use operand::FromOperand;
pub use operator::Operator;
pub use registry::{OperatorSpec, Registry, register};
pub use tree::Tree;
