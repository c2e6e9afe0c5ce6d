use ndla_editor_core::plugins::{TEXT_BLOCKS, aside, details, embed, grid, related, table, text};
use ndla_editor_core::{
    Data, Document, Editor, ElementNode, Node, PluginRegistry, deserialize, fix_budget,
    is_normalized, next_fix, normalize_document,
};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ndla_editor=debug")),
        )
        .with_test_writer()
        .try_init();
}

fn normalized(children: Vec<Node>) -> Document {
    let registry = PluginRegistry::learning_resource();
    let mut doc = Document::new(vec![Node::section(children)]);
    normalize_document(&mut doc, &mut None, &registry, 10_000).unwrap();
    doc
}

fn grid_with(columns: Option<&str>, cells: usize) -> Node {
    let mut el = ElementNode::new("grid");
    if let Some(columns) = columns {
        el = el.with_data("columns", columns);
    }
    el.with_children(
        (0..cells)
            .map(|n| Node::element("grid-cell", vec![Node::paragraph(n.to_string())]))
            .collect(),
    )
    .into_node()
}

#[test]
fn grids_end_up_with_one_cell_per_column() {
    init_tracing();
    for columns in [Some("2"), Some("4"), Some("2x2"), None] {
        for cells in 0..=10 {
            let doc = normalized(vec![
                Node::paragraph(""),
                grid_with(columns, cells),
                Node::paragraph(""),
            ]);
            let grid = doc.element(&[0, 1]).unwrap();
            assert_eq!(grid.kind, "grid");
            assert_eq!(
                grid.children.len(),
                grid::column_count(columns),
                "columns {columns:?} with {cells} cells"
            );
            assert!(grid.children.iter().all(|cell| cell.is_kind("grid-cell")));
        }
    }
}

#[test]
fn surplus_grid_cells_are_dropped_from_the_end() {
    let doc = normalized(vec![Node::paragraph(""), grid_with(Some("2"), 5), Node::paragraph("")]);
    let grid = doc.element(&[0, 1]).unwrap();
    let texts: Vec<String> = grid.children.iter().map(Node::text_content).collect();
    assert_eq!(texts, ["0", "1"]);
}

#[test]
fn unknown_grid_columns_fall_back_to_two() {
    let doc = normalized(vec![Node::paragraph(""), grid_with(Some("7"), 3), Node::paragraph("")]);
    let grid = doc.element(&[0, 1]).unwrap();
    assert_eq!(grid.data_str("columns"), Some(grid::DEFAULT_GRID_COLUMNS));
    assert_eq!(grid.children.len(), 2);
}

fn structural_blocks() -> Vec<Node> {
    vec![
        text::divider_node(),
        embed::embed_node("image", Data::from([("resource_id".to_string(), "1".into())])),
        embed::code_block_node(),
        table::table_node(2, 2, true),
        details::details_node(),
        aside::aside_node("factAside"),
        aside::bodybox_node(),
        grid::grid_node("2x2"),
        related::related_node(),
    ]
}

#[test]
fn structural_blocks_always_sit_between_text_blocks() {
    for block in structural_blocks() {
        let kind = block.kind().unwrap_or_default().to_string();
        let doc = normalized(vec![block.clone(), block]);
        let section = doc.element(&[0]).unwrap();
        for (ix, child) in section.children.iter().enumerate() {
            if !child.is_kind(&kind) {
                continue;
            }
            let before = ix.checked_sub(1).and_then(|i| section.children.get(i));
            let after = section.children.get(ix + 1);
            for neighbour in [before, after] {
                let neighbour_kind = neighbour.and_then(Node::kind).unwrap_or_default();
                assert!(
                    TEXT_BLOCKS.contains(&neighbour_kind),
                    "{kind} at {ix} has neighbour {neighbour_kind:?}"
                );
            }
        }
        assert_eq!(section.children.iter().filter(|c| c.is_kind(&kind)).count(), 2);
    }
}

#[test]
fn normalization_is_idempotent() {
    init_tracing();
    let registry = PluginRegistry::learning_resource();
    let mut children = structural_blocks();
    children.push(Node::text("stray"));
    children.push(Node::element("table", vec![table::row_node("table-cell", 1)]));
    children.push(Node::element("details", Vec::new()));
    let mut doc = Document::new(children);

    normalize_document(&mut doc, &mut None, &registry, 10_000).unwrap();
    assert!(next_fix(&doc, &registry).is_none());
    assert!(is_normalized(&doc, &registry));

    let settled = doc.clone();
    assert_eq!(normalize_document(&mut doc, &mut None, &registry, 10_000).unwrap(), 0);
    assert_eq!(doc, settled);
}

#[test]
fn empty_document_gets_a_section_and_paragraph() {
    let registry = PluginRegistry::core();
    let mut doc = Document::default();
    normalize_document(&mut doc, &mut None, &registry, 100).unwrap();
    let section = doc.element(&[0]).unwrap();
    assert_eq!(section.kind, "section");
    assert!(section.children[0].is_kind("paragraph"));
}

#[test]
fn large_documents_open_and_settle() {
    init_tracing();
    let html = format!("<section>{}</section>", "<hr/>".repeat(1100));
    let registry = PluginRegistry::learning_resource();
    let doc = deserialize(&html, &registry).unwrap();
    let section = doc.element(&[0]).unwrap();
    assert_eq!(section.children.iter().filter(|c| c.is_kind("divider")).count(), 1100);
    assert_eq!(section.children.len(), 2201);
    assert!(is_normalized(&doc, &registry));

    let editor = Editor::from_html(&html, PluginRegistry::learning_resource()).unwrap();
    assert_eq!(editor.doc(), &doc);
}

#[test]
fn fix_budget_grows_with_the_tree() {
    let small = Document::new(vec![Node::section(vec![Node::paragraph("a")])]);
    let large = Document::new(vec![Node::section(
        (0..500).map(|n| Node::paragraph(n.to_string())).collect(),
    )]);
    assert_eq!(small.node_count(), 3);
    assert_eq!(large.node_count(), 1001);
    assert!(fix_budget(&small, 1000) < fix_budget(&large, 1000));
    assert!(fix_budget(&large, 1000) > 1000 + 1001);
}
