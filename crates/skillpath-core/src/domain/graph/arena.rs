//! In-memory adjacency snapshot of a repository's nesting DAG
//!
//! Nodes are stored in a map keyed by skill id with forward edge lists only.
//! Parents are computed from the forward edges when asked for, so the two
//! directions can never disagree.

use std::collections::{HashMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

use super::entity::ReferenceProblem;
use crate::error::Error;

/// Edge validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("skill {0} is not part of the graph")]
    UnknownSkill(Uuid),

    #[error("skills {parent_id} and {child_id} belong to different repositories")]
    ForeignRepository { parent_id: Uuid, child_id: Uuid },

    #[error("nesting {child_id} under {parent_id} would create a cycle")]
    Cycle { parent_id: Uuid, child_id: Uuid },
}

impl From<GraphError> for Error {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::UnknownSkill(id) => Error::InvalidReference {
                skill_ids: vec![id],
                problem: ReferenceProblem::Missing,
            },
            GraphError::ForeignRepository {
                parent_id,
                child_id,
            } => Error::InvalidReference {
                skill_ids: vec![parent_id, child_id],
                problem: ReferenceProblem::ForeignRepository,
            },
            GraphError::Cycle {
                parent_id,
                child_id,
            } => Error::NestingCycle {
                parent_id,
                child_id,
            },
        }
    }
}

#[derive(Debug, Clone)]
struct SkillNode {
    repository_id: Uuid,
    children: Vec<Uuid>,
}

/// Nesting graph of one or more repositories
#[derive(Debug, Clone, Default)]
pub struct SkillGraph {
    nodes: HashMap<Uuid, SkillNode>,
}

impl SkillGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node without edges; re-adding an existing id is a no-op
    pub fn insert_skill(&mut self, skill_id: Uuid, repository_id: Uuid) {
        self.nodes.entry(skill_id).or_insert(SkillNode {
            repository_id,
            children: Vec::new(),
        });
    }

    pub fn contains(&self, skill_id: &Uuid) -> bool {
        self.nodes.contains_key(skill_id)
    }

    pub fn repository_of(&self, skill_id: &Uuid) -> Option<Uuid> {
        self.nodes.get(skill_id).map(|n| n.repository_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn skill_ids(&self) -> impl Iterator<Item = &Uuid> {
        self.nodes.keys()
    }

    pub fn children(&self, skill_id: &Uuid) -> &[Uuid] {
        self.nodes
            .get(skill_id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Skills nesting `skill_id`, sorted
    pub fn parents(&self, skill_id: &Uuid) -> Vec<Uuid> {
        let mut parents: Vec<Uuid> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.children.contains(skill_id))
            .map(|(id, _)| *id)
            .collect();
        parents.sort();
        parents
    }

    pub fn has_edge(&self, parent_id: &Uuid, child_id: &Uuid) -> bool {
        self.children(parent_id).contains(child_id)
    }

    /// All edges as (parent, child) pairs
    pub fn edges(&self) -> Vec<(Uuid, Uuid)> {
        let mut edges: Vec<(Uuid, Uuid)> = self
            .nodes
            .iter()
            .flat_map(|(parent, node)| node.children.iter().map(move |child| (*parent, *child)))
            .collect();
        edges.sort();
        edges
    }

    /// Nest `child_id` under `parent_id` after validating the edge
    ///
    /// Both skills must be known and share a repository, and the edge must
    /// not close a cycle. Adding an existing edge is a no-op.
    pub fn add_edge(&mut self, parent_id: Uuid, child_id: Uuid) -> Result<(), GraphError> {
        let parent_repo = self
            .repository_of(&parent_id)
            .ok_or(GraphError::UnknownSkill(parent_id))?;
        let child_repo = self
            .repository_of(&child_id)
            .ok_or(GraphError::UnknownSkill(child_id))?;

        if parent_repo != child_repo {
            return Err(GraphError::ForeignRepository {
                parent_id,
                child_id,
            });
        }
        if self.has_edge(&parent_id, &child_id) {
            return Ok(());
        }
        if self.would_create_cycle(parent_id, child_id) {
            return Err(GraphError::Cycle {
                parent_id,
                child_id,
            });
        }

        self.insert_edge_unchecked(parent_id, child_id);
        Ok(())
    }

    /// Record an edge loaded from storage, where it was validated on write
    pub(crate) fn insert_edge_unchecked(&mut self, parent_id: Uuid, child_id: Uuid) {
        if let Some(node) = self.nodes.get_mut(&parent_id) {
            if !node.children.contains(&child_id) {
                node.children.push(child_id);
            }
        }
    }

    pub fn remove_edge(&mut self, parent_id: &Uuid, child_id: &Uuid) -> bool {
        match self.nodes.get_mut(parent_id) {
            Some(node) => {
                let before = node.children.len();
                node.children.retain(|c| c != child_id);
                node.children.len() != before
            }
            None => false,
        }
    }

    /// Drop every edge leaving `skill_id`
    pub fn clear_children(&mut self, skill_id: &Uuid) -> Vec<Uuid> {
        self.nodes
            .get_mut(skill_id)
            .map(|n| std::mem::take(&mut n.children))
            .unwrap_or_default()
    }

    /// Drop every edge entering `skill_id`
    pub fn clear_parents(&mut self, skill_id: &Uuid) -> Vec<Uuid> {
        let parents = self.parents(skill_id);
        for parent in &parents {
            self.remove_edge(parent, skill_id);
        }
        parents
    }

    /// Remove a node together with all its edges
    pub fn remove_skill(&mut self, skill_id: &Uuid) {
        self.clear_parents(skill_id);
        self.nodes.remove(skill_id);
    }

    /// Whether `to` is reachable from `from` by following nesting edges
    pub fn reaches(&self, from: Uuid, to: Uuid) -> bool {
        let mut stack = vec![from];
        let mut visited = HashSet::new();

        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            stack.extend(self.children(&current).iter().copied());
        }

        false
    }

    /// Whether nesting `child_id` under `parent_id` would close a cycle
    pub fn would_create_cycle(&self, parent_id: Uuid, child_id: Uuid) -> bool {
        parent_id == child_id || self.reaches(child_id, parent_id)
    }

    /// Every skill reachable from `root`, excluding `root`, in visit order
    pub fn descendants(&self, root: &Uuid) -> Vec<Uuid> {
        let mut result = Vec::new();
        let mut visited = HashSet::from([*root]);
        let mut stack: Vec<Uuid> = self.children(root).iter().rev().copied().collect();

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            result.push(current);
            stack.extend(self.children(&current).iter().rev().copied());
        }

        result
    }

    /// Find a cycle if one exists, returned as the skills along it
    ///
    /// `load_graph` runs this over every stored snapshot; graphs built only
    /// through [`SkillGraph::add_edge`] never contain one.
    pub fn find_cycle(&self) -> Option<Vec<Uuid>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            OnStack,
            Done,
        }

        let mut marks: HashMap<Uuid, Mark> = HashMap::new();
        let mut roots: Vec<Uuid> = self.nodes.keys().copied().collect();
        roots.sort();

        for root in roots {
            if marks.contains_key(&root) {
                continue;
            }

            // (node, index of next child to visit)
            let mut stack: Vec<(Uuid, usize)> = vec![(root, 0)];
            marks.insert(root, Mark::OnStack);

            while let Some((node, next)) = stack.last().copied() {
                let children = self.children(&node);
                if next < children.len() {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    let child = children[next];
                    match marks.get(&child) {
                        Some(Mark::OnStack) => {
                            let start = stack.iter().position(|(id, _)| *id == child).unwrap_or(0);
                            return Some(stack[start..].iter().map(|(id, _)| *id).collect());
                        }
                        Some(Mark::Done) => {}
                        None => {
                            marks.insert(child, Mark::OnStack);
                            stack.push((child, 0));
                        }
                    }
                } else {
                    marks.insert(node, Mark::Done);
                    stack.pop();
                }
            }
        }

        None
    }
}
