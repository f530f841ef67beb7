pub mod ancestor;
pub mod attributes;
pub mod comment;
pub mod error;
pub mod mutation;
pub mod node;
pub mod quasi;
pub mod render;
pub mod structure;
pub mod visitor;

pub use ancestor::AncestorChain;
pub use attributes::{AttributeKey, AttributeValue};
pub use error::TreeError;
pub use node::{KindTag, Node, NodeKind, NodeRef, NodeValue, NodeVector, Operator, Position, SourceId, SourceRange};
pub use visitor::{Visitor, visitor_fn};
