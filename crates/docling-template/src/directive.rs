//! Structural directives
//!
//! A placeholder bound to a directive edits the structure around it instead
//! of inserting text. A directive that does not apply where it appears
//! (a table directive outside any table) declines, and the caller renders
//! empty text instead.

use crate::format::FormatProfile;
use crate::markup;
use crate::model::{Directive, ParagraphDirective, TableDirective};
use crate::placeholder::Placeholder;
use crate::xml::XmlTree;
use log::trace;

/// Apply `directive` at `ph`; returns `false` when it does not apply
pub fn apply(
    profile: &FormatProfile,
    tree: &mut XmlTree,
    ph: &Placeholder,
    directive: Directive,
) -> bool {
    match directive {
        Directive::Paragraph(ParagraphDirective::Keep) | Directive::Table(TableDirective::Keep) => {
            ph.remove(tree);
            true
        }
        Directive::Paragraph(ParagraphDirective::Remove) => {
            let Some(paragraph) = tree.closest(ph.anchor, profile.paragraphs) else {
                return false;
            };
            let parent = tree.parent(paragraph);
            tree.detach(paragraph);
            if let Some(parent) = parent {
                markup::ensure_cell_paragraph(profile, tree, parent);
            }
            trace!("removed paragraph holding {}", ph.key);
            true
        }
        Directive::Paragraph(ParagraphDirective::Hidden) => {
            let Some(paragraph) = tree.closest(ph.anchor, profile.paragraphs) else {
                return false;
            };
            ph.remove(tree);
            markup::hide_paragraph(profile, tree, paragraph);
            true
        }
        Directive::Table(TableDirective::Remove) => remove_enclosing_table(profile, tree, ph),
    }
}

fn remove_enclosing_table(profile: &FormatProfile, tree: &mut XmlTree, ph: &Placeholder) -> bool {
    let table = std::iter::once(ph.anchor)
        .chain(tree.ancestors(ph.anchor))
        .take_while(|&n| !tree.is_named(n, profile.body))
        .find(|&n| tree.is_named(n, profile.table));
    let Some(table) = table else {
        return false;
    };
    let parent = tree.parent(table);
    tree.detach(table);
    if let Some(parent) = parent {
        markup::ensure_cell_paragraph(profile, tree, parent);
    }
    trace!("removed table holding {}", ph.key);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{DOCX, ODT};
    use crate::xml::NodeId;

    fn placeholder(tree: &XmlTree, name: &str) -> Placeholder {
        let root = tree.root_element().unwrap();
        let anchor = tree.descendants_named(root, name)[0];
        Placeholder {
            instruction: "X".into(),
            key: "X".into(),
            anchor,
            markers: Vec::new(),
            run_props: None,
            in_field_code: false,
        }
    }

    fn body(tree: &XmlTree) -> NodeId {
        tree.root_element().unwrap()
    }

    #[test]
    fn test_remove_paragraph_keeps_cell_valid() {
        let mut tree =
            XmlTree::parse("<w:body><w:tbl><w:tr><w:tc><w:p><w:fldSimple/></w:p></w:tc></w:tr></w:tbl></w:body>")
                .unwrap();
        let ph = placeholder(&tree, "w:fldSimple");
        let directive = Directive::Paragraph(ParagraphDirective::Remove);
        assert!(apply(&DOCX, &mut tree, &ph, directive));
        assert_eq!(
            tree.to_xml(),
            "<w:body><w:tbl><w:tr><w:tc><w:p/></w:tc></w:tr></w:tbl></w:body>"
        );
    }

    #[test]
    fn test_remove_table() {
        let mut tree = XmlTree::parse(
            "<w:body><w:p/><w:tbl><w:tr><w:tc><w:p><w:fldSimple/></w:p></w:tc></w:tr></w:tbl></w:body>",
        )
        .unwrap();
        let ph = placeholder(&tree, "w:fldSimple");
        assert!(apply(&DOCX, &mut tree, &ph, Directive::Table(TableDirective::Remove)));
        assert_eq!(tree.to_xml(), "<w:body><w:p/></w:body>");
        assert_eq!(tree.children(body(&tree)).len(), 1);
    }

    #[test]
    fn test_table_directive_declines_outside_table() {
        let mut tree = XmlTree::parse("<w:body><w:p><w:fldSimple/></w:p></w:body>").unwrap();
        let ph = placeholder(&tree, "w:fldSimple");
        assert!(!apply(&DOCX, &mut tree, &ph, Directive::Table(TableDirective::Remove)));
        assert!(tree.is_attached(ph.anchor));
    }

    #[test]
    fn test_hide_odt_paragraph() {
        let mut tree = XmlTree::parse(
            r#"<office:text><text:p>a<text:user-field-get text:name="X"/></text:p></office:text>"#,
        )
        .unwrap();
        let ph = placeholder(&tree, "text:user-field-get");
        assert!(apply(&ODT, &mut tree, &ph, Directive::Paragraph(ParagraphDirective::Hidden)));
        assert_eq!(
            tree.to_xml(),
            r#"<office:text><text:p><text:hidden-paragraph text:condition="ooow:TRUE" text:is-hidden="true"/>a</text:p></office:text>"#
        );
    }
}
