use chrono::Utc;
use proptest::prelude::*;

use super::*;
use crate::catalog::ProductTypeId;

fn category(id: i64, path: &str, name: &str) -> Category {
    Category {
        id,
        external_id: format!("ext-{id}"),
        name: name.to_string(),
        slug: name.to_lowercase(),
        path: path.parse().expect("valid path"),
        product_type: ProductTypeId::new(1).unwrap(),
        is_deleted: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[test]
fn empty_input_builds_empty_forest() {
    assert!(build_tree(&[]).is_empty());
}

#[test]
fn nests_children_under_parents() {
    let categories = vec![
        category(3, "root.1.2", "Handles"),
        category(1, "root", "Doors"),
        category(2, "root.1", "Interior"),
    ];
    let tree = build_tree(&categories);

    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].id, 1);
    assert_eq!(tree[0].children.len(), 1);
    assert_eq!(tree[0].children[0].id, 2);
    assert_eq!(tree[0].children[0].children[0].id, 3);
    assert!(tree[0].children[0].children[0].children.is_empty());
}

#[test]
fn siblings_ordered_by_path_then_name() {
    let categories = vec![
        category(1, "r", "Root"),
        category(2, "r.b", "Alpha"),
        category(3, "r.a", "Zulu"),
        category(4, "s", "Second root"),
    ];
    let tree = build_tree(&categories);

    let roots: Vec<i64> = tree.iter().map(|n| n.id).collect();
    assert_eq!(roots, vec![1, 4]);
    let children: Vec<i64> = tree[0].children.iter().map(|n| n.id).collect();
    assert_eq!(children, vec![3, 2]);
}

#[test]
fn orphans_are_dropped_with_their_subtree() {
    let categories = vec![
        category(1, "root", "Doors"),
        category(2, "missing.child", "Orphan"),
        category(3, "missing.child.leaf", "Orphan leaf"),
    ];
    let tree = build_tree(&categories);

    assert_eq!(flatten(&tree), vec![1]);
}

#[test]
fn soft_deleted_categories_are_skipped() {
    let mut deleted = category(2, "root.1", "Gone");
    deleted.is_deleted = true;
    let categories = vec![category(1, "root", "Doors"), deleted, category(3, "root.1.2", "Leaf")];
    let tree = build_tree(&categories);

    assert_eq!(flatten(&tree), vec![1]);
}

#[test]
fn duplicate_paths_do_not_duplicate_children() {
    let categories = vec![
        category(1, "root", "A"),
        category(2, "root", "B"),
        category(3, "root.x", "Child"),
    ];
    let ids = flatten(&build_tree(&categories));

    assert_eq!(ids, vec![1, 3, 2]);
}

#[test]
fn find_subtree_locates_nested_node() {
    let categories = vec![
        category(1, "root", "Doors"),
        category(2, "root.1", "Interior"),
        category(3, "root.1.2", "Oak"),
    ];
    let tree = build_tree(&categories);

    let node = find_subtree(&tree, 2).expect("node 2 present");
    assert_eq!(flatten(std::slice::from_ref(node)), vec![2, 3]);
    assert!(find_subtree(&tree, 99).is_none());
}

/// Generates a valid forest: every node's parent precedes it in the list.
fn arb_forest() -> impl Strategy<Value = Vec<Category>> {
    proptest::collection::vec(proptest::option::of(any::<prop::sample::Index>()), 0..40).prop_map(
        |parents| {
            let mut paths: Vec<CategoryPath> = Vec::new();
            let mut out = Vec::new();
            for (idx, parent) in parents.into_iter().enumerate() {
                let segment = idx.to_string();
                let path = match parent {
                    Some(pick) if !paths.is_empty() => {
                        paths[pick.index(paths.len())].child(segment).unwrap()
                    }
                    _ => CategoryPath::root(segment).unwrap(),
                };
                paths.push(path.clone());
                let id = i64::try_from(idx).unwrap() + 1;
                out.push(category(id, &path.to_string(), &format!("c{idx}")));
            }
            out
        },
    )
}

proptest! {
    #[test]
    fn flatten_recovers_every_id_exactly_once(categories in arb_forest()) {
        let tree = build_tree(&categories);
        let mut ids = flatten(&tree);
        ids.sort_unstable();
        let mut expected: Vec<i64> = categories.iter().map(|c| c.id).collect();
        expected.sort_unstable();
        prop_assert_eq!(ids, expected);
    }
}
