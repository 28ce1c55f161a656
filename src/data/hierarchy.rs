use std::collections::HashMap;

use crate::error::{Result, RobustnessError};

/// A rooted tree of criteria, stored as an index arena.
///
/// Leaves are factor names, inner nodes are named categories. The root
/// carries weight 1 by convention and sibling weights sum to their parent's
/// weight; the model builders turn those conventions into equality
/// constraints.
#[derive(Clone, Debug)]
pub struct Hierarchy {
    names: Vec<String>,
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    index: HashMap<String, usize>,
}

impl Hierarchy {
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        let mut index = HashMap::new();
        index.insert(root.clone(), 0);
        Hierarchy {
            names: vec![root],
            parent: vec![None],
            children: vec![Vec::new()],
            index,
        }
    }

    /// Add `child` under the named `parent` node.
    pub fn add_child(&mut self, parent: &str, child: impl Into<String>) -> Result<usize> {
        let child = child.into();
        let parent_index = self.node(parent).ok_or_else(|| {
            RobustnessError::config(format!("hierarchy node `{parent}` does not exist"))
        })?;
        if self.index.contains_key(&child) {
            return Err(RobustnessError::config(format!(
                "hierarchy node `{child}` is defined twice"
            )));
        }
        let child_index = self.names.len();
        self.names.push(child.clone());
        self.parent.push(Some(parent_index));
        self.children.push(Vec::new());
        self.children[parent_index].push(child_index);
        self.index.insert(child, child_index);
        Ok(child_index)
    }

    pub fn root(&self) -> usize {
        0
    }

    pub fn node(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn name(&self, node: usize) -> &str {
        &self.names[node]
    }

    pub fn children(&self, node: usize) -> &[usize] {
        &self.children[node]
    }

    pub fn is_leaf(&self, node: usize) -> bool {
        self.children[node].is_empty()
    }

    /// Preorder walk of the subtree rooted at `node`, including `node`.
    pub fn subtree(&self, node: usize) -> Vec<usize> {
        let mut order = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            order.push(current);
            for &child in self.children[current].iter().rev() {
                stack.push(child);
            }
        }
        order
    }

    /// Leaves of the subtree rooted at `node`, in preorder.
    pub fn leaves_under(&self, node: usize) -> Vec<usize> {
        self.subtree(node)
            .into_iter()
            .filter(|&n| self.is_leaf(n))
            .collect()
    }

    pub fn leaf_names(&self) -> impl Iterator<Item = &str> {
        (0..self.names.len())
            .filter(|&n| self.is_leaf(n))
            .map(|n| self.names[n].as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthcare() -> Hierarchy {
        let mut tree = Hierarchy::new("comprehensive");
        tree.add_child("comprehensive", "health").unwrap();
        tree.add_child("health", "h1").unwrap();
        tree.add_child("health", "h2").unwrap();
        tree.add_child("comprehensive", "finances").unwrap();
        tree.add_child("finances", "f1").unwrap();
        tree
    }

    #[test]
    fn subtree_walks_in_preorder() {
        let tree = healthcare();
        let health = tree.node("health").unwrap();
        let names: Vec<&str> = tree.subtree(health).iter().map(|&n| tree.name(n)).collect();
        assert_eq!(names, vec!["health", "h1", "h2"]);
    }

    #[test]
    fn leaves_are_the_factors() {
        let tree = healthcare();
        let mut leaves: Vec<&str> = tree.leaf_names().collect();
        leaves.sort_unstable();
        assert_eq!(leaves, vec!["f1", "h1", "h2"]);
    }

    #[test]
    fn duplicate_nodes_are_rejected() {
        let mut tree = healthcare();
        assert!(tree.add_child("finances", "h1").is_err());
        assert!(tree.add_child("missing", "x").is_err());
    }
}
