use ndla_editor_core::plugins::text;
use ndla_editor_core::{
    BlockAction, BlockPicker, BlockPickerConfig, Data, Editor, ElementRects, MediaKind, MediaResult,
    PickerError, PickerOutcome, PickerState, PluginRegistry, Point, Rect, Selection, UserPermissions,
};

struct FixedRects;

impl ElementRects for FixedRects {
    fn rect(&self, _path: &[usize]) -> Option<Rect> {
        Some(Rect {
            x: 100.0,
            y: 20.0,
            ..Rect::default()
        })
    }
}

fn editor_at(html: &str, path: Vec<usize>) -> Editor {
    let mut editor = Editor::from_html(html, PluginRegistry::learning_resource()).unwrap();
    editor.set_selection(Selection::collapsed(Point::new(path, 0)));
    editor
}

fn picker(config: BlockPickerConfig) -> BlockPicker {
    BlockPicker::new(config, UserPermissions::default())
}

fn offered(picker: &BlockPicker) -> Vec<String> {
    match picker.state() {
        PickerState::Open { actions, .. } => actions.clone(),
        other => panic!("picker not open: {other:?}"),
    }
}

#[test]
fn opens_on_an_empty_paragraph_in_a_section() {
    let editor = editor_at("<section><p>a</p><p></p></section>", vec![0, 1, 0]);
    let mut picker = picker(BlockPickerConfig::default());
    picker.refresh(&editor, &FixedRects);

    let PickerState::Open { at, anchor, actions } = picker.state() else {
        panic!("picker should be open");
    };
    assert_eq!(at, &vec![0, 1]);
    assert_eq!(anchor.left, 22.0);
    assert_eq!(anchor.top, 20.0);
    assert_eq!(actions.len(), BlockPickerConfig::default().actions.len());
}

#[test]
fn stays_closed_on_text_or_a_range() {
    let mut editor = editor_at("<section><p>a</p><p></p></section>", vec![0, 0, 0]);
    let mut picker = picker(BlockPickerConfig::default());
    picker.refresh(&editor, &FixedRects);
    assert!(!picker.is_open());

    editor.set_selection(Selection {
        anchor: Point::new(vec![0, 0, 0], 0),
        focus: Point::new(vec![0, 1, 0], 0),
    });
    picker.refresh(&editor, &FixedRects);
    assert!(!picker.is_open());
}

#[test]
fn context_actions_restrict_what_a_grid_cell_offers() {
    let html = r#"<section><p>a</p><div data-type="grid" data-columns="2"><div data-type="grid-cell"><p></p></div><div data-type="grid-cell"><p>x</p></div></div><p>b</p></section>"#;
    let editor = editor_at(html, vec![0, 1, 0, 0, 0]);
    let mut config = BlockPickerConfig::default();
    config.context_actions.insert(
        "grid-cell".to_string(),
        vec!["image".to_string(), "text".to_string()],
    );
    let mut picker = picker(config);
    picker.refresh(&editor, &FixedRects);

    assert_eq!(offered(&picker), ["image", "text"]);
    let PickerState::Open { anchor, .. } = picker.state() else {
        panic!("picker should be open");
    };
    assert_eq!(anchor.left, 60.0);
}

#[test]
fn text_action_adds_a_paragraph_in_the_cell() {
    let html = r#"<section><p>a</p><div data-type="grid" data-columns="2"><div data-type="grid-cell"><p></p></div><div data-type="grid-cell"><p>x</p></div></div><p>b</p></section>"#;
    let mut editor = editor_at(html, vec![0, 1, 0, 0, 0]);
    let mut config = BlockPickerConfig::default();
    config
        .context_actions
        .insert("grid-cell".to_string(), vec!["text".to_string()]);
    let mut picker = picker(config);
    picker.refresh(&editor, &FixedRects);
    assert_eq!(offered(&picker), ["text"]);

    let outcome = picker.choose(&mut editor, "text").unwrap();
    assert_eq!(outcome, PickerOutcome::Inserted(vec![0, 1, 0, 0]));
    let cell = editor.doc().element(&[0, 1, 0]).unwrap();
    assert_eq!(cell.children.len(), 2);
    assert!(cell.children.iter().all(|child| child.is_kind("paragraph")));
}

#[test]
fn context_entries_still_respect_permissions() {
    let config = BlockPickerConfig {
        actions: vec![
            BlockAction::media("image", "Image", MediaKind::Image),
            BlockAction::structural("divider", "Divider", text::divider_node)
                .requires_permission("drafts:admin"),
        ],
        context_actions: [(
            "section".to_string(),
            ["divider", "text", "unknown"].map(String::from).to_vec(),
        )]
        .into(),
        ..BlockPickerConfig::default()
    };
    let editor = editor_at("<section><p></p></section>", vec![0, 0, 0]);

    let mut plain = BlockPicker::new(config.clone(), UserPermissions::default());
    plain.refresh(&editor, &FixedRects);
    assert_eq!(offered(&plain), ["text"]);

    let mut admin = BlockPicker::new(config, UserPermissions::new(["drafts:admin"]));
    admin.refresh(&editor, &FixedRects);
    assert_eq!(offered(&admin), ["divider", "text"]);
}

#[test]
fn illegal_areas_win_over_allowed_ones() {
    let html = "<section><p>a</p><table><thead><tr><th><p></p></th></tr></thead><tbody><tr><td><p></p></td></tr></tbody></table><p>b</p></section>";
    let mut config = BlockPickerConfig::default();
    config
        .allowed_pick_areas
        .extend(["table-cell-header".to_string(), "table-cell".to_string()]);
    let mut picker = picker(config);

    let mut editor = editor_at(html, vec![0, 1, 0, 0, 0, 0, 0]);
    picker.refresh(&editor, &FixedRects);
    assert!(!picker.is_open());
    assert_eq!(picker.eligible_target(&editor), None);

    editor.set_selection(Selection::collapsed(Point::new(vec![0, 1, 1, 0, 0, 0, 0], 0)));
    picker.refresh(&editor, &FixedRects);
    let PickerState::Open { at, anchor, .. } = picker.state() else {
        panic!("picker should be open in a body cell");
    };
    assert_eq!(at, &vec![0, 1, 1, 0, 0, 0]);
    assert_eq!(anchor.left, 75.0);
}

#[test]
fn permissions_hide_actions() {
    let config = BlockPickerConfig {
        actions: vec![
            BlockAction::media("image", "Image", MediaKind::Image),
            BlockAction::structural("divider", "Divider", text::divider_node)
                .requires_permission("drafts:admin"),
        ],
        ..BlockPickerConfig::default()
    };
    let editor = editor_at("<section><p></p></section>", vec![0, 0, 0]);

    let mut plain = BlockPicker::new(config.clone(), UserPermissions::default());
    plain.refresh(&editor, &FixedRects);
    assert_eq!(offered(&plain), ["image"]);

    let mut admin = BlockPicker::new(config, UserPermissions::new(["drafts:admin"]));
    admin.refresh(&editor, &FixedRects);
    assert_eq!(offered(&admin), ["image", "divider"]);
}

#[test]
fn structural_choice_inserts_at_the_paragraph() {
    let mut editor = editor_at("<section><p>a</p><p></p></section>", vec![0, 1, 0]);
    let mut picker = picker(BlockPickerConfig::default());
    picker.refresh(&editor, &FixedRects);

    let outcome = picker.choose(&mut editor, "table").unwrap();
    assert_eq!(outcome, PickerOutcome::Inserted(vec![0, 1]));
    assert!(!picker.is_open());
    assert!(editor.doc().node(&[0, 1]).unwrap().is_kind("table"));
    assert!(editor.doc().node(&[0, 2]).unwrap().is_kind("paragraph"));
    let focus = editor.focus_point().unwrap();
    assert!(focus.path.starts_with(&[0, 1]));
}

#[test]
fn unoffered_actions_are_refused() {
    let mut editor = editor_at("<section><p></p></section>", vec![0, 0, 0]);
    let mut picker = picker(BlockPickerConfig::default());
    assert!(matches!(picker.choose(&mut editor, "table"), Err(PickerError::NotOpen)));

    picker.refresh(&editor, &FixedRects);
    assert!(matches!(
        picker.choose(&mut editor, "hologram"),
        Err(PickerError::ActionNotOffered(_))
    ));
}

#[test]
fn media_choice_waits_for_the_current_request() {
    let mut editor = editor_at("<section><p>a</p><p></p></section>", vec![0, 1, 0]);
    let mut picker = picker(BlockPickerConfig::default());
    picker.refresh(&editor, &FixedRects);

    let PickerOutcome::MediaRequested(first) = picker.choose(&mut editor, "image").unwrap() else {
        panic!("image should request media");
    };
    assert_eq!(first.media, MediaKind::Image);
    let second = picker.search("katt").unwrap();
    assert_ne!(first.id, second.id);

    let cat = MediaResult {
        resource: "image".to_string(),
        data: Data::from([("resource_id".to_string(), "55".into())]),
    };
    assert_eq!(picker.deliver_media(&mut editor, first.id, cat.clone()).unwrap(), None);
    assert_eq!(editor.to_html(), "<section><p>a</p><p></p></section>");

    assert!(picker.deliver_search_results(second.id, vec![cat]));
    let path = picker.confirm_media(&mut editor, 0).unwrap();
    assert_eq!(path, vec![0, 1]);
    assert_eq!(
        editor.to_html(),
        r#"<section><p>a</p><embed data-resource="image" data-resource_id="55"/><p></p></section>"#
    );
    assert_eq!(picker.state(), &PickerState::Closed);
}

#[test]
fn failed_lookups_keep_the_selection_open() {
    let mut editor = editor_at("<section><p></p></section>", vec![0, 0, 0]);
    let mut picker = picker(BlockPickerConfig::default());
    picker.refresh(&editor, &FixedRects);
    let PickerOutcome::MediaRequested(request) = picker.choose(&mut editor, "video").unwrap() else {
        panic!("video should request media");
    };

    assert!(picker.media_failed(request.id, "timeout"));
    let PickerState::SelectingVisualElement { error, media, .. } = picker.state() else {
        panic!("picker should still be selecting");
    };
    assert_eq!(error.as_deref(), Some("timeout"));
    assert_eq!(*media, MediaKind::Video);
    assert!(!picker.media_failed(request.id + 10, "late"));
}

#[test]
fn closing_sticks_until_the_cursor_moves_away() {
    let mut editor = editor_at("<section><p>a</p><p></p></section>", vec![0, 1, 0]);
    let mut picker = picker(BlockPickerConfig::default());
    picker.refresh(&editor, &FixedRects);
    picker.close();

    picker.refresh(&editor, &FixedRects);
    assert!(!picker.is_open());
    assert_eq!(editor.to_html(), "<section><p>a</p><p></p></section>");

    editor.set_selection(Selection::collapsed(Point::new(vec![0, 0, 0], 1)));
    picker.refresh(&editor, &FixedRects);
    editor.set_selection(Selection::collapsed(Point::new(vec![0, 1, 0], 0)));
    picker.refresh(&editor, &FixedRects);
    assert!(picker.is_open());
}
