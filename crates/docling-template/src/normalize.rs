//! Field normalization
//!
//! Editors split a complex field's instruction across several runs
//! (`<w:instrText> MERGE</w:instrText>` ... `<w:instrText>FIELD NAME</w:instrText>`),
//! interleaved with proofing runs, separators and stale result runs.
//! Normalization collapses every span between a begin marker and its
//! matching end marker into `begin, instruction, end`, so placeholder
//! detection only ever sees one instruction run per field. Fields nested in
//! an instruction (`IF { MERGEFIELD X } = ...`) stay in place; the outer
//! instruction is merged on either side of them and each nested field is
//! collapsed on its own.
//!
//! Only DOCX has split fields; ODT fields are single elements and are left
//! untouched.

use crate::error::{Result, TemplateError};
use crate::format::{DocumentFormat, FormatProfile};
use crate::xml::{NodeId, XmlTree};
use log::trace;

const FLD_CHAR: &str = "w:fldChar";
const FLD_CHAR_TYPE: &str = "w:fldCharType";
const INSTR_TEXT: &str = "w:instrText";

/// Field marker carried by a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldMarker {
    Begin,
    Separate,
    End,
}

/// The field marker of a run, if it has one
pub(crate) fn field_marker(tree: &XmlTree, run: NodeId) -> Option<FieldMarker> {
    tree.child_elements(run)
        .filter(|&c| tree.is_named(c, FLD_CHAR))
        .find_map(|c| match tree.attr(c, FLD_CHAR_TYPE) {
            Some("begin") => Some(FieldMarker::Begin),
            Some("separate") => Some(FieldMarker::Separate),
            Some("end") => Some(FieldMarker::End),
            _ => None,
        })
}

/// Whether a run carries instruction text
pub(crate) fn has_instruction(tree: &XmlTree, run: NodeId) -> bool {
    tree.first_child_named(run, INSTR_TEXT).is_some()
}

/// Instruction text of a run
pub(crate) fn instruction_text(tree: &XmlTree, run: NodeId) -> String {
    tree.child_elements(run)
        .filter(|&c| tree.is_named(c, INSTR_TEXT))
        .map(|c| tree.text_content(c))
        .collect()
}

/// Collapse every split complex field under `root`
///
/// # Errors
///
/// Returns `TemplateFormatInvalid` if a begin marker has no end marker
/// among its following siblings.
pub fn normalize(profile: &FormatProfile, tree: &mut XmlTree, root: NodeId) -> Result<usize> {
    if profile.format != DocumentFormat::Docx {
        return Ok(0);
    }
    let begins: Vec<NodeId> = tree
        .descendants(root)
        .into_iter()
        .filter(|&n| tree.is_named(n, profile.run))
        .filter(|&n| field_marker(tree, n) == Some(FieldMarker::Begin))
        .collect();

    let mut collapsed = 0;
    for begin in begins {
        if !tree.is_attached(begin) {
            continue;
        }
        if collapse_field(profile, tree, begin)? {
            collapsed += 1;
        }
    }
    if collapsed > 0 {
        trace!("normalized {collapsed} split fields");
    }
    Ok(collapsed)
}

/// Runs of one field between its begin marker and its matching end marker
#[derive(Debug, Default)]
struct FieldSpan {
    /// Own instruction runs, grouped between nested fields
    groups: Vec<Vec<NodeId>>,
    /// Own runs without instruction text, the separator and every result run
    dropped: Vec<NodeId>,
}

fn field_span(profile: &FormatProfile, tree: &XmlTree, begin: NodeId) -> Result<FieldSpan> {
    let mut span = FieldSpan::default();
    let mut group = Vec::new();
    let mut depth = 0usize;
    let mut in_result = false;
    let mut cursor = tree.next_sibling(begin);
    while let Some(node) = cursor {
        cursor = tree.next_sibling(node);
        if !tree.is_named(node, profile.run) {
            continue;
        }
        let marker = field_marker(tree, node);
        let own = depth == 0 && marker != Some(FieldMarker::Begin);
        match marker {
            Some(FieldMarker::Begin) => depth += 1,
            Some(FieldMarker::End) if depth == 0 => {
                if !group.is_empty() {
                    span.groups.push(group);
                }
                return Ok(span);
            }
            Some(FieldMarker::End) => depth -= 1,
            _ => {}
        }
        if in_result {
            span.dropped.push(node);
        } else if !own {
            // nested fields stay in place and split the instruction
            if !group.is_empty() {
                span.groups.push(std::mem::take(&mut group));
            }
        } else if marker == Some(FieldMarker::Separate) {
            in_result = true;
            span.dropped.push(node);
        } else if has_instruction(tree, node) {
            group.push(node);
        } else {
            span.dropped.push(node);
        }
    }
    Err(TemplateError::TemplateFormatInvalid(
        "field begin marker without matching end marker".to_string(),
    ))
}

fn collapse_field(profile: &FormatProfile, tree: &mut XmlTree, begin: NodeId) -> Result<bool> {
    let span = field_span(profile, tree, begin)?;
    if span.groups.is_empty() {
        return Ok(false);
    }
    let mut changed = false;
    for group in &span.groups {
        changed |= merge_instruction_runs(tree, group);
    }
    for &node in &span.dropped {
        tree.detach(node);
        changed = true;
    }
    Ok(changed)
}

// Moves the instruction text of `runs` into the first fragment of the first run
fn merge_instruction_runs(tree: &mut XmlTree, runs: &[NodeId]) -> bool {
    let Some(&first) = runs.first() else {
        return false;
    };
    let fragments: Vec<NodeId> = tree
        .child_elements(first)
        .filter(|&c| tree.is_named(c, INSTR_TEXT))
        .collect();
    if runs.len() == 1 && fragments.len() == 1 {
        return false;
    }
    let instruction: String = runs.iter().map(|&r| instruction_text(tree, r)).collect();
    if let Some((&keep, rest)) = fragments.split_first() {
        tree.set_text(keep, &instruction);
        tree.set_attr(keep, "xml:space", "preserve");
        for &extra in rest {
            tree.detach(extra);
        }
    }
    for &run in &runs[1..] {
        tree.detach(run);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{DOCX, ODT};
    use proptest::prelude::*;

    fn begin() -> &'static str {
        r#"<w:r><w:fldChar w:fldCharType="begin"/></w:r>"#
    }

    fn end() -> &'static str {
        r#"<w:r><w:fldChar w:fldCharType="end"/></w:r>"#
    }

    fn instr(text: &str) -> String {
        format!(r#"<w:r><w:instrText xml:space="preserve">{text}</w:instrText></w:r>"#)
    }

    fn paragraph(inner: &str) -> XmlTree {
        XmlTree::parse(&format!(r#"<w:p xmlns:w="urn:w">{inner}</w:p>"#)).unwrap()
    }

    fn run_and_dump(tree: &mut XmlTree) -> String {
        let root = tree.root_element().unwrap();
        normalize(&DOCX, tree, root).unwrap();
        tree.to_xml()
    }

    #[test]
    fn test_split_instruction_is_collapsed() {
        let inner = format!(
            r#"{}{}<w:r><w:rPr><w:b/></w:rPr></w:r>{}<w:r><w:fldChar w:fldCharType="separate"/></w:r><w:r><w:t>«NAME»</w:t></w:r>{}"#,
            begin(),
            instr(" MERGE"),
            instr("FIELD NAME "),
            end()
        );
        let mut tree = paragraph(&inner);
        let out = run_and_dump(&mut tree);
        let expected = format!(
            r#"<w:p xmlns:w="urn:w">{}{}{}</w:p>"#,
            begin(),
            instr(" MERGEFIELD NAME "),
            end()
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn test_normalized_field_is_untouched() {
        let inner = format!("{}{}{}", begin(), instr(" DOCVARIABLE X "), end());
        let mut tree = paragraph(&inner);
        let before = tree.to_xml();
        let root = tree.root_element().unwrap();
        assert_eq!(normalize(&DOCX, &mut tree, root).unwrap(), 0);
        assert_eq!(tree.to_xml(), before);
    }

    #[test]
    fn test_non_run_siblings_survive() {
        let inner = format!(
            r#"{}{}<w:proofErr w:type="spellStart"/>{}{}"#,
            begin(),
            instr(" MERGEFIELD "),
            instr("NAME"),
            end()
        );
        let mut tree = paragraph(&inner);
        let out = run_and_dump(&mut tree);
        assert!(out.contains("w:proofErr"));
        assert!(out.contains(" MERGEFIELD NAME"));
        assert_eq!(out.matches("w:instrText").count(), 2);
    }

    #[test]
    fn test_begin_without_end_is_invalid() {
        let inner = format!("{}{}", begin(), instr("NAME"));
        let mut tree = paragraph(&inner);
        let root = tree.root_element().unwrap();
        assert!(matches!(
            normalize(&DOCX, &mut tree, root),
            Err(TemplateError::TemplateFormatInvalid(_))
        ));
    }

    #[test]
    fn test_nested_field_keeps_its_markers() {
        let inner = format!(
            r#"{}{}{}{}<w:r><w:fldChar w:fldCharType="separate"/></w:r><w:r><w:t>1</w:t></w:r>{}{}{}<w:r><w:fldChar w:fldCharType="separate"/></w:r><w:r><w:t>yes</w:t></w:r>{}"#,
            begin(),
            instr(" IF "),
            begin(),
            instr(" MERGEFIELD FLAG "),
            end(),
            instr(r#" = "1" "#),
            instr(r#""yes" "no" "#),
            end()
        );
        let mut tree = paragraph(&inner);
        let out = run_and_dump(&mut tree);
        let expected = format!(
            r#"<w:p xmlns:w="urn:w">{}{}{}{}{}{}{}</w:p>"#,
            begin(),
            instr(" IF "),
            begin(),
            instr(" MERGEFIELD FLAG "),
            end(),
            instr(r#" = "1" "yes" "no" "#),
            end()
        );
        assert_eq!(out, expected);
        assert_eq!(run_and_dump(&mut tree), expected);
    }

    #[test]
    fn test_unterminated_nested_field_is_invalid() {
        let inner = format!("{}{}{}{}{}", begin(), instr(" IF "), begin(), instr("X"), end());
        let mut tree = paragraph(&inner);
        let root = tree.root_element().unwrap();
        assert!(normalize(&DOCX, &mut tree, root).is_err());
    }

    #[test]
    fn test_odt_is_noop() {
        let mut tree = XmlTree::parse("<text:p><text:user-field-get text:name=\"X\"/></text:p>")
            .unwrap();
        let root = tree.root_element().unwrap();
        assert_eq!(normalize(&ODT, &mut tree, root).unwrap(), 0);
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(
            pieces in prop::collection::vec("[A-Z ]{1,6}", 1..6),
            noise in prop::collection::vec(any::<bool>(), 1..6),
            nested in any::<bool>(),
        ) {
            let mut inner = String::from(begin());
            for (i, piece) in pieces.iter().enumerate() {
                inner.push_str(&instr(piece));
                if i == 0 && nested {
                    inner.push_str(begin());
                    inner.push_str(&instr(" MERGE"));
                    inner.push_str(&instr("FIELD FLAG "));
                    inner.push_str(r#"<w:r><w:fldChar w:fldCharType="separate"/></w:r><w:r><w:t>1</w:t></w:r>"#);
                    inner.push_str(end());
                }
                if noise.get(i).copied().unwrap_or(false) {
                    inner.push_str("<w:r><w:t>x</w:t></w:r>");
                }
            }
            inner.push_str(end());
            let mut tree = paragraph(&inner);
            let once = run_and_dump(&mut tree);
            let twice = run_and_dump(&mut tree);
            prop_assert_eq!(&once, &twice);

            let fields = if nested { 2 } else { 1 };
            prop_assert_eq!(once.matches(r#"w:fldCharType="begin""#).count(), fields);
            prop_assert_eq!(once.matches(r#"w:fldCharType="end""#).count(), fields);
            prop_assert!(!once.contains("separate"));
            if nested {
                prop_assert!(once.contains(" MERGEFIELD FLAG "));
                prop_assert!(once.contains(pieces[0].as_str()));
                prop_assert!(once.contains(&pieces[1..].concat()));
            } else {
                prop_assert!(once.contains(&pieces.concat()));
            }
        }
    }
}
