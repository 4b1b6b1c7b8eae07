//! Format-specific markup builders
//!
//! Generated content is built as detached nodes in the part's arena and then
//! inserted by the caller.

use crate::error::{Result, TemplateError};
use crate::format::{odf, DocumentFormat, FormatProfile};
use crate::model::{LineBreakMode, TabMode, TextValue};
use crate::xml::{NodeId, XmlTree};

const NS_STYLE: &str = "urn:oasis:names:tc:opendocument:xmlns:style:1.0";
const NS_FO: &str = "urn:oasis:names:tc:opendocument:xmlns:xsl-fo-compatible:1.0";

/// Piece of rendered text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Character data
    Text(String),
    /// Structural line break
    Break,
    /// Structural tab
    Tab,
}

/// Split a text value into segments according to its whitespace modes
///
/// Carriage returns are dropped; line feeds and tabs become structure or
/// spaces.
///
/// # Errors
///
/// Returns `UnknownFormattingCharacter` for any other control character.
pub fn segments(key: &str, value: &TextValue) -> Result<Vec<Segment>> {
    let mut out = Vec::new();
    let mut text = String::new();
    let flush = |text: &mut String, out: &mut Vec<Segment>| {
        if !text.is_empty() {
            out.push(Segment::Text(std::mem::take(text)));
        }
    };
    for c in value.text.chars() {
        match c {
            '\r' => {}
            '\n' => match value.line_breaks {
                LineBreakMode::Space => text.push(' '),
                LineBreakMode::Break => {
                    flush(&mut text, &mut out);
                    out.push(Segment::Break);
                }
            },
            '\t' => match value.tabs {
                TabMode::Spaces(n) => text.extend(std::iter::repeat(' ').take(usize::from(n))),
                TabMode::Tab => {
                    flush(&mut text, &mut out);
                    out.push(Segment::Tab);
                }
            },
            c if c.is_control() => {
                return Err(TemplateError::UnknownFormattingCharacter {
                    key: key.to_string(),
                    code: u32::from(c),
                });
            }
            c => text.push(c),
        }
    }
    flush(&mut text, &mut out);
    Ok(out)
}

/// Build the inline nodes rendering `segments`, detached and in order
pub fn text_nodes(
    profile: &FormatProfile,
    tree: &mut XmlTree,
    segments: &[Segment],
    run_props: Option<NodeId>,
) -> Vec<NodeId> {
    if segments.is_empty() {
        return Vec::new();
    }
    match profile.format {
        DocumentFormat::Docx => {
            let run = tree.new_element(profile.run);
            if let Some(props) = run_props {
                let copy = tree.deep_clone(props);
                tree.append_child(run, copy);
            }
            for segment in segments {
                let node = match segment {
                    Segment::Text(s) => {
                        let t = tree.new_element_with("w:t", &[("xml:space", "preserve")]);
                        let text = tree.new_text(s);
                        tree.append_child(t, text);
                        t
                    }
                    Segment::Break => tree.new_element("w:br"),
                    Segment::Tab => tree.new_element("w:tab"),
                };
                tree.append_child(run, node);
            }
            vec![run]
        }
        DocumentFormat::Odt => {
            let mut nodes = Vec::new();
            for segment in segments {
                match segment {
                    Segment::Text(s) => nodes.extend(odt_text(tree, s)),
                    Segment::Break => nodes.push(tree.new_element("text:line-break")),
                    Segment::Tab => nodes.push(tree.new_element("text:tab")),
                }
            }
            nodes
        }
    }
}

/// A DOCX run carrying `segments` as instruction text, detached
///
/// Used for values spliced into an enclosing field's instruction, where
/// breaks and tabs have no meaning and become spaces.
pub fn instruction_run(
    tree: &mut XmlTree,
    segments: &[Segment],
    run_props: Option<NodeId>,
) -> NodeId {
    let code: String = segments
        .iter()
        .map(|s| match s {
            Segment::Text(t) => t.as_str(),
            Segment::Break | Segment::Tab => " ",
        })
        .collect();
    let run = tree.new_element("w:r");
    if let Some(props) = run_props {
        let copy = tree.deep_clone(props);
        tree.append_child(run, copy);
    }
    let instr = tree.new_element_with("w:instrText", &[("xml:space", "preserve")]);
    let text = tree.new_text(&code);
    tree.append_child(instr, text);
    tree.append_child(run, instr);
    run
}

// ODT collapses consecutive spaces unless they are written as <text:s>
fn odt_text(tree: &mut XmlTree, s: &str) -> Vec<NodeId> {
    let mut nodes = Vec::new();
    let mut pending = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        pending.push(c);
        if c != ' ' {
            continue;
        }
        let mut extra = 0usize;
        while chars.peek() == Some(&' ') {
            chars.next();
            extra += 1;
        }
        if extra > 0 {
            nodes.push(tree.new_text(&std::mem::take(&mut pending)));
            let count = extra.to_string();
            let space = if extra == 1 {
                tree.new_element("text:s")
            } else {
                tree.new_element_with("text:s", &[("text:c", count.as_str())])
            };
            nodes.push(space);
        }
    }
    if !pending.is_empty() {
        nodes.push(tree.new_text(&pending));
    }
    nodes
}

/// A paragraph forcing a page break, detached
///
/// For ODT the automatic style it references is added to the part on first
/// use.
///
/// # Errors
///
/// Returns `TemplateFormatInvalid` if the part has no root element.
pub fn page_break(profile: &FormatProfile, tree: &mut XmlTree) -> Result<NodeId> {
    match profile.format {
        DocumentFormat::Docx => {
            let p = tree.new_element("w:p");
            let r = tree.new_element("w:r");
            let br = tree.new_element_with("w:br", &[("w:type", "page")]);
            tree.append_child(r, br);
            tree.append_child(p, r);
            Ok(p)
        }
        DocumentFormat::Odt => {
            ensure_page_break_style(tree)?;
            Ok(tree.new_element_with("text:p", &[("text:style-name", odf::PAGE_BREAK_STYLE)]))
        }
    }
}

fn ensure_page_break_style(tree: &mut XmlTree) -> Result<()> {
    let root = tree.root_element().ok_or_else(|| {
        TemplateError::TemplateFormatInvalid("content part has no root element".to_string())
    })?;
    ensure_namespace(tree, root, "style", NS_STYLE);
    ensure_namespace(tree, root, "fo", NS_FO);

    let styles = match tree.first_child_named(root, "office:automatic-styles") {
        Some(s) => s,
        None => {
            let s = tree.new_element("office:automatic-styles");
            match tree.first_child_named(root, "office:body") {
                Some(body) => tree.insert_before(body, s),
                None => tree.prepend_child(root, s),
            }
            s
        }
    };
    let exists = tree
        .child_elements(styles)
        .any(|s| tree.attr(s, "style:name") == Some(odf::PAGE_BREAK_STYLE));
    if !exists {
        let style = tree.new_element_with(
            "style:style",
            &[
                ("style:name", odf::PAGE_BREAK_STYLE),
                ("style:family", "paragraph"),
            ],
        );
        let props =
            tree.new_element_with("style:paragraph-properties", &[("fo:break-before", "page")]);
        tree.append_child(style, props);
        tree.append_child(styles, style);
    }
    Ok(())
}

/// Declare `xmlns:prefix` on `element` unless already declared there
pub fn ensure_namespace(tree: &mut XmlTree, element: NodeId, prefix: &str, uri: &str) {
    let attr = format!("xmlns:{prefix}");
    if tree.attr(element, &attr).is_none() {
        tree.set_attr(element, &attr, uri);
    }
}

/// Mark a paragraph and all its runs as hidden text
pub fn hide_paragraph(profile: &FormatProfile, tree: &mut XmlTree, paragraph: NodeId) {
    match profile.format {
        DocumentFormat::Docx => {
            let ppr = ensure_first_child(tree, paragraph, "w:pPr");
            let mark_props = match tree.first_child_named(ppr, "w:rPr") {
                Some(r) => r,
                None => {
                    let r = tree.new_element("w:rPr");
                    // w:rPr precedes w:sectPr and w:pPrChange in w:pPr
                    let successor = tree
                        .child_elements(ppr)
                        .find(|&c| tree.is_any_of(c, &["w:sectPr", "w:pPrChange"]));
                    match successor {
                        Some(next) => tree.insert_before(next, r),
                        None => tree.append_child(ppr, r),
                    }
                    r
                }
            };
            ensure_vanish(tree, mark_props);
            for run in tree.descendants_named(paragraph, profile.run) {
                let props = ensure_first_child(tree, run, "w:rPr");
                ensure_vanish(tree, props);
            }
        }
        DocumentFormat::Odt => {
            let already = tree
                .child_elements(paragraph)
                .any(|c| tree.is_named(c, "text:hidden-paragraph"));
            if !already {
                let hidden = tree.new_element_with(
                    "text:hidden-paragraph",
                    &[("text:condition", "ooow:TRUE"), ("text:is-hidden", "true")],
                );
                tree.prepend_child(paragraph, hidden);
            }
        }
    }
}

fn ensure_first_child(tree: &mut XmlTree, parent: NodeId, name: &str) -> NodeId {
    if let Some(existing) = tree.first_child_named(parent, name) {
        return existing;
    }
    let node = tree.new_element(name);
    tree.prepend_child(parent, node);
    node
}

fn ensure_vanish(tree: &mut XmlTree, run_props: NodeId) {
    if tree.first_child_named(run_props, "w:vanish").is_none() {
        let vanish = tree.new_element("w:vanish");
        tree.append_child(run_props, vanish);
    }
}

/// Give a table cell left without paragraphs one empty paragraph
pub fn ensure_cell_paragraph(profile: &FormatProfile, tree: &mut XmlTree, cell: NodeId) {
    if !tree.is_named(cell, profile.cell) {
        return;
    }
    let has_paragraph = tree
        .child_elements(cell)
        .any(|c| profile.is_paragraph(tree, c) || tree.is_named(c, profile.table));
    if !has_paragraph {
        let p = profile.new_empty_paragraph(tree);
        tree.append_child(cell, p);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{DOCX, ODT};

    #[test]
    fn test_segments_modes() {
        let value = TextValue::new("a\r\nb\tc").with_line_breaks(LineBreakMode::Break);
        assert_eq!(
            segments("K", &value).unwrap(),
            vec![
                Segment::Text("a".into()),
                Segment::Break,
                Segment::Text("b".into()),
                Segment::Tab,
                Segment::Text("c".into()),
            ]
        );
        let flat = TextValue::new("a\nb\tc").with_tabs(TabMode::Spaces(2));
        assert_eq!(
            segments("K", &flat).unwrap(),
            vec![Segment::Text("a b  c".into())]
        );
    }

    #[test]
    fn test_control_character_is_rejected() {
        let err = segments("NAME", &TextValue::new("a\u{7}b")).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::UnknownFormattingCharacter { code: 7, .. }
        ));
    }

    #[test]
    fn test_docx_run_copies_properties() {
        let mut tree = XmlTree::parse("<w:p><w:r><w:rPr><w:b/></w:rPr></w:r></w:p>").unwrap();
        let p = tree.root_element().unwrap();
        let run = tree.first_child_named(p, "w:r").unwrap();
        let props = tree.first_child_named(run, "w:rPr");
        let nodes = text_nodes(
            &DOCX,
            &mut tree,
            &[Segment::Text("Ada".into()), Segment::Break],
            props,
        );
        assert_eq!(nodes.len(), 1);
        assert_eq!(
            tree.node_to_xml(nodes[0]),
            r#"<w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">Ada</w:t><w:br/></w:r>"#
        );
    }

    #[test]
    fn test_odt_spaces_are_preserved() {
        let mut tree = XmlTree::new();
        let nodes = text_nodes(&ODT, &mut tree, &[Segment::Text("a   b".into())], None);
        let xml: String = nodes.iter().map(|&n| tree.node_to_xml(n)).collect();
        assert_eq!(xml, r#"a <text:s text:c="2"/>b"#);
    }

    #[test]
    fn test_odt_page_break_style_added_once() {
        let mut tree = XmlTree::parse(
            "<office:document-content><office:body><office:text/></office:body></office:document-content>",
        )
        .unwrap();
        page_break(&ODT, &mut tree).unwrap();
        page_break(&ODT, &mut tree).unwrap();
        let xml = tree.to_xml();
        assert_eq!(xml.matches("fo:break-before=\"page\"").count(), 1);
        assert!(xml.find("office:automatic-styles").unwrap() < xml.find("office:body").unwrap());
    }

    #[test]
    fn test_hide_docx_paragraph() {
        let mut tree = XmlTree::parse("<w:p><w:r><w:t>x</w:t></w:r></w:p>").unwrap();
        let p = tree.root_element().unwrap();
        hide_paragraph(&DOCX, &mut tree, p);
        hide_paragraph(&DOCX, &mut tree, p);
        assert_eq!(
            tree.to_xml(),
            "<w:p><w:pPr><w:rPr><w:vanish/></w:rPr></w:pPr><w:r><w:rPr><w:vanish/></w:rPr><w:t>x</w:t></w:r></w:p>"
        );
    }

    #[test]
    fn test_hidden_mark_precedes_section_properties() {
        let mut tree = XmlTree::parse(concat!(
            r#"<w:p><w:pPr><w:jc w:val="center"/><w:sectPr/><w:pPrChange w:id="1"/></w:pPr>"#,
            r#"<w:r><w:t>x</w:t></w:r></w:p>"#
        ))
        .unwrap();
        let p = tree.root_element().unwrap();
        hide_paragraph(&DOCX, &mut tree, p);
        let ppr = tree.first_child_named(p, "w:pPr").unwrap();
        let order: Vec<&str> = tree
            .child_elements(ppr)
            .filter_map(|c| tree.name(c))
            .collect();
        assert_eq!(order, vec!["w:jc", "w:rPr", "w:sectPr", "w:pPrChange"]);
    }

    #[test]
    fn test_empty_cell_gets_paragraph() {
        let mut tree = XmlTree::parse("<w:tc><w:tcPr/></w:tc>").unwrap();
        let cell = tree.root_element().unwrap();
        ensure_cell_paragraph(&DOCX, &mut tree, cell);
        assert_eq!(tree.to_xml(), "<w:tc><w:tcPr/><w:p/></w:tc>");
    }
}
