//! Nested category tree assembly from materialized paths.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::catalog::Category;
use crate::path::CategoryPath;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryNode {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub children: Vec<CategoryNode>,
}

/// Rebuilds the category hierarchy from a flat list.
///
/// Categories are grouped by parent path (roots under `None`), each group is
/// ordered by path then name, and the tree is expanded from the roots down.
/// Soft-deleted categories are skipped. A category whose parent path matches
/// no category is unreachable and is dropped together with its subtree; the
/// number of dropped groups is logged.
#[must_use]
pub fn build_tree(categories: &[Category]) -> Vec<CategoryNode> {
    let live: Vec<&Category> = categories.iter().filter(|c| !c.is_deleted).collect();

    let mut groups: HashMap<Option<CategoryPath>, Vec<&Category>> = HashMap::new();
    for category in &live {
        groups
            .entry(category.path.parent())
            .or_default()
            .push(category);
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.name.cmp(&b.name)));
    }

    let mut expanded: HashSet<CategoryPath> = HashSet::new();
    let roots = expand(&groups, None, &mut expanded);

    for (parent, members) in &groups {
        if let Some(parent) = parent {
            if !expanded.contains(parent) {
                tracing::warn!(
                    parent_path = %parent,
                    orphans = members.len(),
                    "dropping categories whose parent path does not exist"
                );
            }
        }
    }

    roots
}

fn expand(
    groups: &HashMap<Option<CategoryPath>, Vec<&Category>>,
    parent: Option<&CategoryPath>,
    expanded: &mut HashSet<CategoryPath>,
) -> Vec<CategoryNode> {
    let Some(members) = groups.get(&parent.cloned()) else {
        return Vec::new();
    };

    members
        .iter()
        .map(|category| {
            // Two categories sharing one path would otherwise both claim the
            // same children.
            let children = if expanded.insert(category.path.clone()) {
                expand(groups, Some(&category.path), expanded)
            } else {
                tracing::warn!(
                    path = %category.path,
                    id = category.id,
                    "duplicate category path; children attached to the first occurrence"
                );
                Vec::new()
            };
            CategoryNode {
                id: category.id,
                name: category.name.clone(),
                slug: category.slug.clone(),
                children,
            }
        })
        .collect()
}

/// Pre-order list of every id in the forest.
#[must_use]
pub fn flatten(nodes: &[CategoryNode]) -> Vec<i64> {
    let mut ids = Vec::new();
    let mut stack: Vec<&CategoryNode> = nodes.iter().rev().collect();
    while let Some(node) = stack.pop() {
        ids.push(node.id);
        stack.extend(node.children.iter().rev());
    }
    ids
}

/// Finds the node with `id` anywhere in the forest.
#[must_use]
pub fn find_subtree(nodes: &[CategoryNode], id: i64) -> Option<&CategoryNode> {
    nodes.iter().find_map(|node| {
        if node.id == id {
            Some(node)
        } else {
            find_subtree(&node.children, id)
        }
    })
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tests;
