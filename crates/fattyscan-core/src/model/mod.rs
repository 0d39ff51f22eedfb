/// Data model for the FattyScan compressed tree and its projected views.
///
/// Re-exports the arena-allocated compressed tree, the projected view node,
/// and size formatting helpers.
pub mod compressed_node;
pub mod compressed_tree;
pub mod projected;
pub mod size;

pub use compressed_node::{CompressedNode, NodeIndex};
pub use compressed_tree::CompressedTree;
pub use projected::{ProjectedNode, OTHERS_NAME};
