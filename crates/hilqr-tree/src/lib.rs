//! Arena-backed rooted tree.
//!
//! Nodes live in a single `Vec` and are addressed by [`NodeId`] handles.
//! Children are owned by the arena; parent links are plain indices, so the
//! bidirectional structure never forms reference cycles.
//!
//! ```
//! use hilqr_tree::Tree;
//!
//! let mut tree = Tree::new();
//! let root = tree.add_root("root");
//! let a = tree.add_child(root, "a").unwrap();
//! let b = tree.add_child(root, "b").unwrap();
//! assert_eq!(tree.parent(a), Some(root));
//! assert_eq!(tree.leaves(), vec![a, b]);
//! ```

pub mod arena;

pub use arena::{NodeId, Tree, TreeError};
