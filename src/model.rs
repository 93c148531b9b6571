//! Node hierarchy of an imported model.
//!
//! Nodes live in a flat arena owned by the [`Model`]; parents and children are stored as
//! [`NodeId`]s, so there are no ownership cycles. A dirty node always has dirty descendants, and
//! [`Model::update_transforms`] recomputes global transforms only where the flag is set.

use crate::mesh::Mesh;
use glam::Mat4;
use slotmap::{new_key_type, SlotMap};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

new_key_type! {
    pub struct NodeId;
}

#[derive(Clone, Debug)]
pub struct ModelNode {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    meshes: Vec<Arc<Mesh>>,
    local: Mat4,
    global: Mat4,
    dirty: bool,
}

impl ModelNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn meshes(&self) -> &[Arc<Mesh>] {
        &self.meshes
    }

    pub fn local_transform(&self) -> Mat4 {
        self.local
    }

    /// Last computed global transform; stale while the node is dirty.
    pub fn global_transform(&self) -> Mat4 {
        self.global
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

#[derive(Clone, Debug)]
pub struct Model {
    nodes: SlotMap<NodeId, ModelNode>,
    order: Vec<NodeId>,
    roots: Vec<NodeId>,
    names: HashMap<String, NodeId>,
    global_transform: Mat4,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            order: Vec::new(),
            roots: Vec::new(),
            names: HashMap::new(),
            global_transform: Mat4::IDENTITY,
        }
    }
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node under `parent`, or as a new root when `parent` is `None`.
    ///
    /// Panics if `parent` does not belong to this model.
    pub fn add_node(&mut self, name: impl Into<String>, parent: Option<NodeId>, local: Mat4) -> NodeId {
        let name = name.into();
        if let Some(parent) = parent {
            assert!(self.nodes.contains_key(parent), "parent node does not belong to this model");
        }
        let id = self.nodes.insert(ModelNode {
            name: name.clone(),
            parent,
            children: Vec::new(),
            meshes: Vec::new(),
            local,
            global: local,
            dirty: true,
        });
        match parent {
            Some(parent) => self.nodes[parent].children.push(id),
            None => self.roots.push(id),
        }
        self.order.push(id);
        if self.names.contains_key(&name) {
            log::warn!(target: "model", "duplicate node name '{name}'; lookups keep the first node");
        } else {
            self.names.insert(name, id);
        }
        id
    }

    /// Removes the node together with its whole subtree.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.nodes.get(id).map(|node| node.parent) else {
            return false;
        };
        match parent {
            Some(parent) => self.nodes[parent].children.retain(|&child| child != id),
            None => self.roots.retain(|&root| root != id),
        }
        let mut stack = vec![id];
        let mut orphaned_names = Vec::new();
        while let Some(current) = stack.pop() {
            if let Some(removed) = self.nodes.remove(current) {
                stack.extend(removed.children);
                if self.names.get(&removed.name) == Some(&current) {
                    self.names.remove(&removed.name);
                    orphaned_names.push(removed.name);
                }
            }
        }
        self.order.retain(|node| self.nodes.contains_key(*node));
        // A surviving node with the same name takes over the lookup, first created first.
        for name in orphaned_names {
            if let Some(&next) = self.order.iter().find(|&&node| self.nodes[node].name == name) {
                self.names.insert(name, next);
            }
        }
        true
    }

    pub fn add_mesh(&mut self, node: NodeId, mesh: Arc<Mesh>) {
        self.nodes[node].meshes.push(mesh);
    }

    pub fn node(&self, id: NodeId) -> Option<&ModelNode> {
        self.nodes.get(id)
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Every node in creation order.
    pub fn node_ids(&self) -> &[NodeId] {
        &self.order
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &ModelNode)> + '_ {
        self.order.iter().map(move |&id| (id, &self.nodes[id]))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes that reference `mesh` (by identity).
    pub fn mesh_nodes(&self, mesh: &Arc<Mesh>) -> Vec<NodeId> {
        self.nodes()
            .filter(|(_, node)| node.meshes.iter().any(|m| Arc::ptr_eq(m, mesh)))
            .map(|(id, _)| id)
            .collect()
    }

    /// Distinct mesh instances in depth-first pre-order of first use.
    pub fn unique_meshes(&self) -> Vec<Arc<Mesh>> {
        let mut seen: HashSet<*const Mesh> = HashSet::new();
        let mut unique = Vec::new();
        for id in self.depth_first() {
            for mesh in &self.nodes[id].meshes {
                if seen.insert(Arc::as_ptr(mesh)) {
                    unique.push(Arc::clone(mesh));
                }
            }
        }
        unique
    }

    /// Pre-order traversal over all roots.
    pub fn depth_first(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.nodes[id].children.iter().rev().copied());
        }
        out
    }

    pub fn global_transform(&self) -> Mat4 {
        self.global_transform
    }

    pub fn set_global_transform(&mut self, transform: Mat4) {
        self.global_transform = transform;
        for root in self.roots.clone() {
            self.mark_dirty(root);
        }
    }

    pub fn update_node_transform(&mut self, id: NodeId, local: Mat4) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        node.local = local;
        self.mark_dirty(id);
    }

    fn mark_dirty(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &mut self.nodes[current];
            node.dirty = true;
            stack.extend(node.children.iter().copied());
        }
    }

    /// Recomputes `global = parent.global * local` for every dirty node, roots first.
    pub fn update_transforms(&mut self) {
        let mut stack: Vec<(NodeId, Mat4)> =
            self.roots.iter().rev().map(|&root| (root, self.global_transform)).collect();
        while let Some((id, parent_global)) = stack.pop() {
            let node = &mut self.nodes[id];
            if node.dirty {
                node.global = parent_global * node.local;
                node.dirty = false;
            }
            let global = node.global;
            stack.extend(node.children.iter().rev().map(|&child| (child, global)));
        }
    }
}
