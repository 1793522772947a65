//! Saving and restoring projects.
//!
//! A saved project holds the tree verbatim, the simpack name, the default
//! step function and the [`ProjectConfig`] (so the cruncher kind survives).
//! Jobs and crunchers are not saved; a restored project starts idle and
//! its scheduling machinery is rebuilt from the simpack.
//!
//! ```text
//! [MAGIC "BRWP"] [VERSION u8] [len u32][bincode SavedHeader]
//!                             [len u32][bincode Node] * header.nodes
//! ```
//!
//! Nodes go one per frame, so the frame limit bounds a single state and
//! never the size of the tree.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use branchwork_core::Simpack;
use branchwork_tree::{Node, Tree};

use crate::codec::{read_frame_limited, read_header, write_frame_limited, write_header, MAX_FRAME_LEN, PERSIST_MAGIC};
use crate::config::ProjectConfig;
use crate::error::{PersistError, ProjectError};
use crate::project::Project;

#[derive(Serialize)]
struct SavedHeaderRef<'a> {
    simpack: &'a str,
    default_step_function: &'a str,
    config: &'a ProjectConfig,
    nodes: u64,
}

#[derive(Deserialize)]
struct SavedHeader {
    simpack: String,
    default_step_function: String,
    config: ProjectConfig,
    nodes: u64,
}

impl<P: Simpack> Project<P> {
    /// Write the project to `w`.
    ///
    /// Holds the read lock while the tree is encoded.
    pub fn save(&self, w: &mut dyn Write) -> Result<(), ProjectError> {
        Ok(self.save_framed(w, MAX_FRAME_LEN)?)
    }

    /// Restore a project saved by [`save`](Project::save), running on
    /// `pack`.
    ///
    /// Fails if the project was saved by a different simpack, or if its
    /// tree or config does not validate.
    pub fn load(pack: P, r: &mut dyn Read) -> Result<Self, ProjectError> {
        Ok(Self::restore(pack, r, MAX_FRAME_LEN)?)
    }

    fn save_framed(&self, w: &mut dyn Write, max_frame: u32) -> Result<(), PersistError> {
        let tree = self.tree.read();
        let header = SavedHeaderRef {
            simpack: self.pack.name(),
            default_step_function: &self.default_step_function,
            config: self.config(),
            nodes: tree.len() as u64,
        };
        write_header(w, PERSIST_MAGIC)?;
        write_frame_limited(w, &header, max_frame)?;
        for node in tree.iter() {
            write_frame_limited(w, node, max_frame)?;
        }
        w.flush().map_err(|e| PersistError::Wire(e.into()))?;
        Ok(())
    }

    fn restore(pack: P, r: &mut dyn Read, max_frame: u32) -> Result<Self, PersistError> {
        read_header(r, PERSIST_MAGIC)?;
        let header: SavedHeader = read_frame_limited(r, max_frame)?.ok_or(PersistError::Empty)?;
        if header.simpack != pack.name() {
            return Err(PersistError::SimpackMismatch {
                expected: pack.name().to_owned(),
                found: header.simpack,
            });
        }
        if !pack.has_step_function(&header.default_step_function) {
            return Err(PersistError::UnknownStepFunction(header.default_step_function));
        }
        header.config.validate()?;

        let mut nodes = Vec::new();
        while (nodes.len() as u64) < header.nodes {
            let node: Node<P::State> =
                read_frame_limited(r, max_frame)?.ok_or(PersistError::MissingNodes {
                    expected: header.nodes,
                    found: nodes.len() as u64,
                })?;
            nodes.push(node);
        }
        let tree = Tree::from_nodes(nodes)?;
        Ok(Self::assemble(
            pack,
            tree,
            header.config,
            Some(header.default_step_function),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::WireError;
    use branchwork_test_utils::{CounterPack, HistorySumPack};

    #[test]
    fn empty_project_round_trips() {
        let project = Project::new(CounterPack);
        let mut buf = Vec::new();
        project.save(&mut buf).unwrap();
        let restored = Project::load(CounterPack, &mut buf.as_slice()).unwrap();
        assert!(restored.tree().read().is_empty());
        assert_eq!(restored.default_step_function(), "step");
    }

    #[test]
    fn wrong_simpack_is_rejected() {
        let project = Project::new(CounterPack);
        let mut buf = Vec::new();
        project.save(&mut buf).unwrap();
        let err = Project::load(HistorySumPack, &mut buf.as_slice()).unwrap_err();
        assert!(matches!(
            err,
            ProjectError::Persist(PersistError::SimpackMismatch { .. })
        ));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let err = Project::load(CounterPack, &mut &b"NOPE\x01"[..]).unwrap_err();
        assert!(matches!(
            err,
            ProjectError::Persist(PersistError::Wire(WireError::InvalidMagic { .. }))
        ));
    }

    #[test]
    fn trees_larger_than_one_frame_still_save() {
        let project = Project::new(CounterPack);
        let root = project.create_root();
        project.simulate(root, 200, ()).unwrap();
        let max_frame = 512;
        let whole_tree = bincode::serialize(&*project.tree().read()).unwrap();
        assert!(whole_tree.len() > max_frame as usize);

        let mut buf = Vec::new();
        project.save_framed(&mut buf, max_frame).unwrap();
        let restored = Project::restore(CounterPack, &mut buf.as_slice(), max_frame).unwrap();
        let tree = restored.tree().read();
        assert_eq!(tree.len(), 201);
        assert_eq!(tree.roots(), &[root]);
        assert_eq!(branchwork_test_utils::branch_clocks(&tree, root).last(), Some(&200.0));
    }

    #[test]
    fn missing_nodes_are_reported() {
        let project = Project::new(CounterPack);
        let root = project.create_root();
        project.simulate(root, 3, ()).unwrap();
        let mut buf = Vec::new();
        project.save(&mut buf).unwrap();

        let mut cut = buf.as_slice();
        let header: SavedHeader = {
            read_header(&mut cut, PERSIST_MAGIC).unwrap();
            read_frame_limited(&mut cut, MAX_FRAME_LEN).unwrap().unwrap()
        };
        assert_eq!(header.nodes, 4);
        let first_node = buf.len() - cut.len();
        let err = Project::load(CounterPack, &mut &buf[..first_node]).unwrap_err();
        assert!(matches!(
            err,
            ProjectError::Persist(PersistError::MissingNodes { expected: 4, found: 0 })
        ));
    }

    #[test]
    fn header_without_record_is_empty() {
        let mut buf = Vec::new();
        write_header(&mut buf, PERSIST_MAGIC).unwrap();
        let err = Project::load(CounterPack, &mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, ProjectError::Persist(PersistError::Empty)));
    }
}
