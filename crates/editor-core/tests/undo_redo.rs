use std::sync::{Arc, Mutex};

use ndla_editor_core::{
    ApplyError, Editor, Node, Op, PluginRegistry, Point, RenderError, RenderNode, Selection,
    Transaction,
};

fn editor(html: &str) -> Editor {
    let mut editor = Editor::from_html(html, PluginRegistry::learning_resource()).unwrap();
    editor.focus();
    editor
}

fn insert_text(path: Vec<usize>, offset: usize, text: &str) -> Transaction {
    Transaction::new(vec![Op::InsertText {
        path,
        offset,
        text: text.to_string(),
    }])
    .source("typing")
}

#[test]
fn undo_and_redo_replay_text_edits() {
    let mut editor = editor("<section><p>ab</p></section>");
    editor.apply(insert_text(vec![0, 0, 0], 1, "X")).unwrap();
    assert_eq!(editor.to_html(), "<section><p>aXb</p></section>");

    assert!(editor.undo());
    assert_eq!(editor.to_html(), "<section><p>ab</p></section>");
    assert!(!editor.undo());

    assert!(editor.redo());
    assert_eq!(editor.to_html(), "<section><p>aXb</p></section>");
    assert!(!editor.redo());
}

#[test]
fn a_new_edit_clears_redo() {
    let mut editor = editor("<section><p>ab</p></section>");
    editor.apply(insert_text(vec![0, 0, 0], 0, "1")).unwrap();
    assert!(editor.undo());
    assert!(editor.can_redo());
    editor.apply(insert_text(vec![0, 0, 0], 0, "2")).unwrap();
    assert!(!editor.can_redo());
}

#[test]
fn commands_undo_together_with_their_normalization() {
    let mut editor = editor("<section><p>a</p></section>");
    let before = editor.doc().clone();
    editor.run_command("divider.insert", None).unwrap();
    assert_eq!(editor.to_html(), "<section><p>a</p><hr/><p></p></section>");

    assert!(editor.undo());
    assert_eq!(editor.doc(), &before);
    assert!(editor.redo());
    assert_eq!(editor.to_html(), "<section><p>a</p><hr/><p></p></section>");
}

#[test]
fn failed_batches_leave_no_trace() {
    let mut editor = editor("<section><p>ab</p></section>");
    let before = editor.doc().clone();
    let tx = Transaction::new(vec![
        Op::InsertText {
            path: vec![0, 0, 0],
            offset: 0,
            text: "z".to_string(),
        },
        Op::RemoveNode { path: vec![0, 9] },
    ]);
    let err = editor.apply(tx).unwrap_err();
    assert!(matches!(err, ApplyError::InvalidPath(_)), "{err}");
    assert_eq!(editor.doc(), &before);
    assert!(!editor.can_undo());
}

#[test]
fn change_listeners_see_each_batch() {
    let mut editor = editor("<section><p>ab</p></section>");
    let sources = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&sources);
    editor.on_change(move |event| seen.lock().unwrap().push(event.source.clone()));

    editor.apply(insert_text(vec![0, 0, 0], 2, "c")).unwrap();
    editor.run_command("divider.insert", None).unwrap();

    let sources = sources.lock().unwrap();
    assert_eq!(
        *sources,
        vec![Some("typing".to_string()), Some("divider.insert".to_string())]
    );
}

#[test]
fn paused_normalization_batches_into_one_undo_step() {
    let mut editor = editor("<section><p>a</p></section>");
    {
        let mut guard = editor.pause_normalizing();
        guard
            .apply(Transaction::new(vec![Op::InsertNode {
                path: vec![0, 1],
                node: Node::void("divider", Default::default()),
            }]))
            .unwrap();
        assert!(matches!(guard.render(), Err(RenderError::NotNormalized)));
        assert!(!guard.undo());
        guard
            .apply(insert_text(vec![0, 0, 0], 1, "b"))
            .unwrap();
        guard.finish().unwrap();
    }

    assert!(editor.render().is_ok());
    assert_eq!(editor.to_html(), "<section><p>ab</p><hr/><p></p></section>");
    assert!(editor.undo());
    assert_eq!(editor.to_html(), "<section><p>a</p></section>");
}

#[test]
fn path_refs_follow_structural_edits() {
    let mut editor = editor("<section><p>a</p><p>b</p></section>");
    let tracked = editor.path_ref(vec![0, 1]);
    editor
        .apply(Transaction::new(vec![Op::InsertNode {
            path: vec![0, 0],
            node: Node::paragraph("new"),
        }]))
        .unwrap();
    assert_eq!(editor.path_ref_current(tracked), Some(&[0, 2][..]));

    editor
        .apply(Transaction::new(vec![Op::RemoveNode { path: vec![0, 2] }]))
        .unwrap();
    assert_eq!(editor.unref(tracked), None);
}

#[test]
fn selection_follows_text_edits() {
    let mut editor = editor("<section><p>abc</p></section>");
    editor.set_selection(Selection::collapsed(Point::new(vec![0, 0, 0], 2)));
    editor.apply(insert_text(vec![0, 0, 0], 0, "__")).unwrap();
    assert_eq!(editor.focus_point().unwrap().offset, 4);

    editor
        .apply(Transaction::new(vec![Op::RemoveText {
            path: vec![0, 0, 0],
            range: 0..3,
        }]))
        .unwrap();
    assert_eq!(editor.focus_point().unwrap().offset, 1);
}

#[test]
fn invalid_elements_render_as_placeholders_and_are_stripped_on_save() {
    let html = r#"<section><p>a</p><embed data-resource="image" data-alt="x"/><p>b <a href="">lenke</a></p></section>"#;
    let editor = editor(html);

    let rendered = editor.render().unwrap();
    let placeholder = &rendered[0].children()[1];
    assert!(matches!(
        placeholder,
        RenderNode::Placeholder { kind, will_be_deleted: true, .. } if kind == "embed"
    ));

    let saved = editor.save_output();
    assert_eq!(saved.html, "<section><p>a</p><p>b lenke</p></section>");
    let kinds: Vec<&str> = saved.stripped.iter().map(|s| s.kind.as_str()).collect();
    assert_eq!(kinds, ["embed", "link"]);
    // the editor itself still holds both
    assert_eq!(editor.to_html(), html);
}

#[test]
fn preview_does_not_touch_the_editor() {
    let editor = editor("<section><p>a</p></section>");
    let preview = editor
        .preview_transaction(&Transaction::new(vec![Op::InsertNode {
            path: vec![0, 1],
            node: Node::void("divider", Default::default()),
        }]))
        .unwrap();
    assert_eq!(preview.doc.element(&[0]).unwrap().children.len(), 3);
    assert_eq!(editor.to_html(), "<section><p>a</p></section>");
}
