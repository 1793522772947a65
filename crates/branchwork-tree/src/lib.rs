//! Forking tree of simulation states for branchwork.
//!
//! The tree is an append-mostly arena of nodes. Every node holds an
//! immutable state (except nodes forked for editing, until finalized),
//! a non-owning link to its parent and an ordered list of children.
//!
//! # Architecture
//!
//! ```text
//! TreeLock (Arc<RwLock<Tree>>, writer-preferring)
//! └── Tree
//!     ├── nodes: Vec<Node>   (arena, NodeId = index)
//!     └── roots: Vec<NodeId>
//!         Node { state, parent: Option<NodeId>, children: Vec<NodeId>,
//!                step_profile, end, touched, still_in_editing }
//! ```
//!
//! A [`Path`] is a derived, disposable walk from a root through a chosen
//! node; recompute it whenever the branch beyond its endpoint may have
//! changed.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod lock;
pub mod node;
pub mod path;
pub mod tree;

pub use lock::TreeLock;
pub use node::Node;
pub use path::Path;
pub use tree::Tree;
