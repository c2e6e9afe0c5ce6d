use ndla_editor_core::{Data, Editor, PluginRegistry, RenderNode};
use serde_json::json;

const CODE_BLOCK: &str = r#"<section><p>a</p><embed data-resource="code-block" data-code-content="print(1)" data-code-format="python" data-title="tittel"/><p>b</p></section>"#;

fn form_data() -> Data {
    Data::from([
        ("code-content".to_string(), "print(1)".into()),
        ("code-format".to_string(), "python".into()),
        ("title".to_string(), "tittel".into()),
    ])
}

#[test]
fn code_block_markup_is_kept_exactly() {
    let editor = Editor::from_html(CODE_BLOCK, PluginRegistry::learning_resource()).unwrap();
    let block = editor.doc().element(&[0, 1]).unwrap();
    assert_eq!(block.kind, "code-block");
    assert!(!block.is_first_edit);
    assert_eq!(block.data_str("code-content"), Some("print(1)"));
    assert_eq!(block.data_str("resource"), None);
    assert_eq!(editor.to_html(), CODE_BLOCK);
}

#[test]
fn inserted_code_block_serializes_after_its_form_is_submitted() {
    let mut editor =
        Editor::from_html("<section><p>a</p><p>b</p></section>", PluginRegistry::learning_resource())
            .unwrap();
    editor.focus();
    editor.run_command("code_block.insert", None).unwrap();
    assert!(editor.doc().node(&[0, 1]).unwrap().is_first_edit());

    editor.submit_element_form(&[0, 1], form_data()).unwrap();
    assert_eq!(editor.to_html(), CODE_BLOCK);
}

#[test]
fn code_block_insert_takes_initial_data() {
    let mut editor =
        Editor::from_html("<section><p>a</p></section>", PluginRegistry::learning_resource()).unwrap();
    editor.focus();
    editor
        .run_command(
            "code_block.insert",
            Some(json!({ "data": { "code-format": "rust", "code-content": "fn main() {}" } })),
        )
        .unwrap();
    let block = editor.doc().element(&[0, 1]).unwrap();
    assert_eq!(block.data_str("code-format"), Some("rust"));
    assert_eq!(block.data_str("code-content"), Some("fn main() {}"));
}

#[test]
fn code_block_renders_as_pre_with_its_fields() {
    let editor = Editor::from_html(CODE_BLOCK, PluginRegistry::learning_resource()).unwrap();
    let rendered = editor.render().unwrap();
    let section = &rendered[0];
    let block = &section.children()[1];
    assert_eq!(block.tag(), Some("pre"));
    assert_eq!(block.prop("code-format"), Some("python"));
    assert!(matches!(block, RenderNode::Element { attributes, .. } if attributes.is_void));
}

#[test]
fn code_block_without_format_is_stripped_on_save() {
    let html = r#"<section><p>a</p><embed data-resource="code-block" data-code-content="x"/><p>b</p></section>"#;
    let editor = Editor::from_html(html, PluginRegistry::learning_resource()).unwrap();
    let saved = editor.save_output();
    assert_eq!(saved.html, "<section><p>a</p><p>b</p></section>");
    assert_eq!(saved.stripped.len(), 1);
    assert_eq!(saved.stripped[0].kind, "code-block");
    assert_eq!(saved.stripped[0].path, vec![0, 1]);
}
