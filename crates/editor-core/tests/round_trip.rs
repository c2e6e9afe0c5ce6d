use ndla_editor_core::{
    Data, DataValue, Document, Editor, ElementNode, Node, PluginRegistry, deserialize,
    normalize_document, serialize,
};

const CANONICAL: &[&str] = &[
    "<section><h2>Tittel</h2><p>tekst</p></section>",
    "<section><h3>Under</h3><p></p></section>",
    "<section><p>a <strong>b</strong> <em>c</em> <u>d</u> <code>e</code> x<sup>2</sup> H<sub>2</sub>O</p></section>",
    r#"<section><p>si <span lang="en">hello</span> igjen</p></section>"#,
    r#"<section><p><span lang="nn"><strong>fet nynorsk</strong></span></p></section>"#,
    "<section><ul><li><p>en</p></li><li><p>to</p></li></ul></section>",
    "<section><ol><li><p>en</p></li></ol></section>",
    r#"<section><ol data-type="letters"><li><p>a</p></li></ol></section>"#,
    "<section><blockquote><p>sitat</p></blockquote></section>",
    "<section><p>a</p><hr/><p>b</p></section>",
    "<section><p>a</p><table><caption>Tabell</caption><thead><tr><th><p>h1</p></th><th><p>h2</p></th></tr></thead><tbody><tr><td><p>1</p></td><td><p>2</p></td></tr></tbody></table><p>b</p></section>",
    "<section><p>a</p><details><summary>Mer</summary><p>innhold</p></details><p>b</p></section>",
    r#"<section><p>a</p><aside data-type="factAside"><p>fakta</p></aside><p>b</p></section>"#,
    r#"<section><p>a</p><div data-type="bodybox"><p>boks</p></div><p>b</p></section>"#,
    r#"<section><p>a</p><div data-type="grid" data-columns="2"><div data-type="grid-cell"><p>1</p></div><div data-type="grid-cell"><p>2</p></div></div><p>b</p></section>"#,
    r#"<section><p>a</p><embed data-resource="image" data-resource_id="123" data-size="full" data-align="" data-alt="Katt" data-caption=""/><p>b</p></section>"#,
    r#"<section><p>a</p><embed data-resource="brightcove" data-videoid="6232" data-caption="Film"/><p>b</p></section>"#,
    r#"<section><p>a</p><embed data-resource="code-block" data-code-content="print(1)" data-code-format="python" data-title="tittel"/><p>b</p></section>"#,
    r#"<section><p>a</p><div data-type="related-content"><embed data-resource="related-content" data-article-id="7"/></div><p>b</p></section>"#,
    r#"<section><p>tekst<embed data-resource="footnote" data-title="Bok" data-year="2020" data-authors="Ola;Kari"/></p></section>"#,
    r#"<section><p>se <a href="https://ndla.no" rel="noopener" target="_blank">ndla</a></p></section>"#,
    r#"<section><p>se <embed data-resource="content-link" data-content-id="42">artikkel</embed></p></section>"#,
    "<section><p>a</p></section><section><p>b</p></section>",
];

#[test]
fn canonical_markup_survives_a_round_trip() {
    for html in CANONICAL {
        let editor = Editor::from_html(html, PluginRegistry::learning_resource()).unwrap();
        assert_eq!(&editor.to_html(), html);
    }
}

#[test]
fn deserializing_serialized_output_gives_the_same_tree() {
    let registry = PluginRegistry::learning_resource();
    for html in CANONICAL {
        let doc = deserialize(html, &registry).unwrap();
        let again = deserialize(&serialize(&doc, &registry), &registry).unwrap();
        assert_eq!(again, doc, "{html}");
    }
}

fn data(fields: &[(&str, DataValue)]) -> Data {
    fields
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

fn list(items: &[&str]) -> DataValue {
    DataValue::List(items.iter().map(|s| s.to_string()).collect())
}

fn settled(children: Vec<Node>, registry: &PluginRegistry) -> Document {
    let mut doc = Document::new(vec![Node::section(children)]);
    normalize_document(&mut doc, &mut None, registry, 1000).unwrap();
    doc
}

#[test]
fn constructed_trees_survive_a_round_trip() {
    let registry = PluginRegistry::learning_resource();
    let inline = |node: Node| Node::element("paragraph", vec![Node::text("a"), node, Node::text("b")]);
    let trees = vec![
        Node::void(
            "embed",
            data(&[
                ("resource", "image".into()),
                ("resource_id", "1".into()),
                ("tags", list(&["x", "y"])),
                ("caption", r#"["ikke en liste"]"#.into()),
            ]),
        ),
        Node::void("embed", Data::new()),
        Node::void("embed", data(&[("resource_id", "9".into())])),
        Node::void(
            "code-block",
            data(&[("code-format", "rust".into()), ("code-content", "\"x\"".into())]),
        ),
        inline(Node::void(
            "footnote",
            data(&[("title", "Bok".into()), ("authors", list(&["Ola; Nordmann", "Kari"]))]),
        )),
        inline(Node::void("footnote", data(&[("title", "Bok".into()), ("authors", "Ola".into())]))),
        inline(
            ElementNode::new("link")
                .with_data("rel", list(&["noopener", "noreferrer"]))
                .with_children(vec![Node::text("lenke")])
                .into_node(),
        ),
        inline(
            ElementNode::new("content-link")
                .with_data("content-id", "42")
                .with_data("tags", list(&[]))
                .with_children(vec![Node::text("artikkel")])
                .into_node(),
        ),
    ];

    for tree in trees {
        let doc = settled(vec![Node::paragraph("før"), tree, Node::paragraph("etter")], &registry);
        let html = serialize(&doc, &registry);
        assert_eq!(deserialize(&html, &registry).unwrap(), doc, "{html}");
    }
}

#[test]
fn embeds_without_data_write_a_bare_tag() {
    let registry = PluginRegistry::learning_resource();
    let doc = settled(
        vec![Node::paragraph("a"), Node::void("embed", Data::new()), Node::paragraph("b")],
        &registry,
    );
    let html = serialize(&doc, &registry);
    assert_eq!(html, "<section><p>a</p><embed/><p>b</p></section>");
    assert_eq!(deserialize(&html, &registry).unwrap().element(&[0, 1]).unwrap().data, Data::new());
}

#[test]
fn whitespace_between_blocks_is_dropped() {
    let editor = Editor::from_html(
        "<section>\n  <p>a</p>\n  <hr/>\n  <p>b</p>\n</section>\n",
        PluginRegistry::learning_resource(),
    )
    .unwrap();
    assert_eq!(editor.to_html(), "<section><p>a</p><hr/><p>b</p></section>");
}

#[test]
fn unknown_tags_are_unwrapped_or_dropped() {
    let editor = Editor::from_html(
        "<section><p><span>x</span>y</p><marquee>z</marquee></section>",
        PluginRegistry::learning_resource(),
    )
    .unwrap();
    assert_eq!(editor.to_html(), "<section><p>xy</p></section>");
}

#[test]
fn legacy_ndlaembed_reads_as_embed() {
    let editor = Editor::from_html(
        r#"<section><p>a</p><ndlaembed data-resource="image" data-resource_id="1"></ndlaembed><p>b</p></section>"#,
        PluginRegistry::learning_resource(),
    )
    .unwrap();
    assert_eq!(
        editor.to_html(),
        r#"<section><p>a</p><embed data-resource="image" data-resource_id="1"/><p>b</p></section>"#
    );
}

#[test]
fn bare_text_is_wrapped_into_a_section_and_paragraph() {
    let editor = Editor::from_html("hei", PluginRegistry::learning_resource()).unwrap();
    assert_eq!(editor.to_html(), "<section><p>hei</p></section>");
}

#[test]
fn empty_input_gives_an_empty_section() {
    let editor = Editor::from_html("", PluginRegistry::learning_resource()).unwrap();
    assert_eq!(editor.to_html(), "<section><p></p></section>");
}

#[test]
fn topic_articles_have_no_grids() {
    let editor = Editor::from_html(
        r#"<section><p>a</p><div data-type="grid" data-columns="2"><div data-type="grid-cell"><p>1</p></div><div data-type="grid-cell"><p>2</p></div></div><p>b</p></section>"#,
        PluginRegistry::topic_article(),
    )
    .unwrap();
    assert_eq!(editor.to_html(), "<section><p>a</p><p>1</p><p>2</p><p>b</p></section>");
}
