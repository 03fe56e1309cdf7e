use bmc_core::{Parameter, SimulationState, TreeGraph, TreeNode, TreeStructure};

// ((a:0, b:0):1, c:0):2 with node ids a=0, b=1, c=2, ab=3, root=4
fn sample_tree() -> TreeGraph {
    TreeGraph::new(
        "tree",
        vec![
            TreeNode::leaf(0.0, "a"),
            TreeNode::leaf(0.0, "b"),
            TreeNode::leaf(0.0, "c"),
            TreeNode::internal(1.0),
            TreeNode::internal(2.0),
        ],
        vec![Some(3), Some(3), Some(4), Some(4), None],
    )
    .unwrap()
}

#[test]
fn topology_queries() {
    let tree = sample_tree();
    assert_eq!(tree.root(), 4);
    assert_eq!(tree.children(3), vec![0, 1]);
    assert!(tree.is_external(2));
    assert!(!tree.is_external(3));
    let edges: Vec<_> = tree.edges().collect();
    assert_eq!(edges, vec![(0, 3), (1, 3), (2, 4), (3, 4)]);
}

#[test]
fn construction_rejects_two_roots_and_cycles() {
    let two_roots = TreeGraph::new(
        "bad",
        vec![TreeNode::leaf(0.0, "a"), TreeNode::internal(1.0)],
        vec![None, None],
    );
    assert_eq!(two_roots.unwrap_err().code(), "tree-structure");

    let cycle = TreeGraph::new(
        "bad",
        vec![
            TreeNode::internal(1.0),
            TreeNode::internal(1.0),
            TreeNode::internal(2.0),
        ],
        vec![Some(1), Some(0), None],
    );
    assert_eq!(cycle.unwrap_err().code(), "tree-structure");
}

#[test]
fn set_height_keeps_ordering() {
    let mut tree = sample_tree();
    let before = tree.version();
    tree.set_height(3, 1.5).unwrap();
    assert_eq!(tree.height(3).unwrap(), 1.5);
    assert!(tree.version() > before);

    assert!(tree.set_height(3, 2.5).is_err());
    assert!(tree.set_height(4, 1.0).is_err());
    assert!(tree.set_height(0, -0.1).is_err());
    assert_eq!(tree.height(3).unwrap(), 1.5);
}

#[test]
fn invalid_adoption_rolls_back() {
    let mut tree = sample_tree();
    let original = tree.clone();
    tree.begin_edit().unwrap();
    tree.adopt_structure(TreeStructure {
        nodes: vec![
            TreeNode::leaf(0.0, "a"),
            TreeNode::leaf(3.0, "b"),
            TreeNode::leaf(0.0, "c"),
            TreeNode::internal(1.0),
            TreeNode::internal(2.0),
        ],
        parents: vec![Some(3), Some(3), Some(4), Some(4), None],
        traits: vec![Vec::new(); 5],
    })
    .unwrap();
    assert!(tree.end_edit().is_err());
    assert_eq!(tree, original);
    assert!(!tree.is_editing());
}

#[test]
fn scoped_edit_applies_new_topology() {
    let mut tree = sample_tree();
    let version = tree.version();
    tree.edit(|t| {
        t.adopt_structure(TreeStructure {
            nodes: vec![
                TreeNode::leaf(0.0, "a"),
                TreeNode::leaf(0.0, "b"),
                TreeNode::leaf(0.0, "c"),
                TreeNode::internal(0.5),
                TreeNode::internal(3.0),
            ],
            parents: vec![Some(4), Some(3), Some(3), Some(4), None],
            traits: vec![Vec::new(); 5],
        })
    })
    .unwrap();
    assert_eq!(tree.children(3), vec![1, 2]);
    assert_eq!(tree.version(), version + 1);
}

#[test]
fn names_that_would_split_a_record_are_refused() {
    let mut state = SimulationState::new();
    for name in ["kappa\trate", "kappa\n", ""] {
        let err = state.add_parameter(Parameter::scalar(name, 1.0)).unwrap_err();
        assert_eq!(err.code(), "invalid-name");
    }
    assert_eq!(state.parameter_count(), 0);

    let tab_tree = TreeGraph::new(
        "species\t2",
        vec![TreeNode::leaf(0.0, "a"), TreeNode::leaf(0.0, "b"), TreeNode::internal(1.0)],
        vec![Some(2), Some(2), None],
    )
    .unwrap();
    assert_eq!(state.add_tree(tab_tree).unwrap_err().code(), "invalid-name");

    let bad_taxon = TreeGraph::new(
        "species",
        vec![TreeNode::leaf(0.0, "a\nb"), TreeNode::leaf(0.0, "c"), TreeNode::internal(1.0)],
        vec![Some(2), Some(2), None],
    )
    .unwrap();
    let err = state.add_tree(bad_taxon).unwrap_err();
    assert_eq!(err.code(), "invalid-name");
    assert_eq!(err.info().context.get("tree").map(String::as_str), Some("species"));

    state.add_parameter(Parameter::scalar("kappa", 1.0)).unwrap();
    state.add_tree(sample_tree()).unwrap();
}
