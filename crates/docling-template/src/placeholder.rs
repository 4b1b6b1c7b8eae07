//! Placeholder discovery and key extraction
//!
//! DOCX placeholders are complex fields (after normalization: a begin run,
//! one instruction run, an end run) or simple fields (`w:fldSimple`). A field
//! holding nested fields is computed by the editor and is never a
//! placeholder itself; the fields nested in it are. ODT
//! placeholders are user/variable field references, database fields and
//! `text:placeholder` elements.

use crate::format::{DocumentFormat, FormatProfile};
use crate::normalize::{field_marker, has_instruction, instruction_text, FieldMarker};
use crate::xml::{NodeId, XmlTree};

/// Keywords of the "variable" family; the rest of the instruction is the key
pub const VARIABLE_KEYWORDS: &[&str] = &["DOCVARIABLE", "DOCPROPERTY"];

/// Keywords of the "merge" family; the key ends at the first switch
pub const MERGE_KEYWORDS: &[&str] = &["MERGEFIELD"];

/// ODT field elements and the attribute naming their key
const ODT_NAMED_FIELDS: &[(&str, &str)] = &[
    ("text:user-field-get", "text:name"),
    ("text:variable-get", "text:name"),
    ("text:user-defined", "text:name"),
    ("text:database-display", "text:column-name"),
];

const ODT_PLACEHOLDER: &str = "text:placeholder";

/// A placeholder found in a part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Raw instruction text
    pub instruction: String,
    /// Upper-cased key
    pub key: String,
    /// Node replaced by the generated content
    pub anchor: NodeId,
    /// Field marker nodes removed together with the anchor
    pub markers: Vec<NodeId>,
    /// Run properties copied onto generated runs
    pub run_props: Option<NodeId>,
    /// Whether the field is nested in another field's instruction; text
    /// generated there becomes instruction text
    pub in_field_code: bool,
}

impl Placeholder {
    /// Anchor followed by the markers
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::once(self.anchor).chain(self.markers.iter().copied())
    }

    /// Detach the anchor and every marker
    pub fn remove(&self, tree: &mut XmlTree) {
        for node in self.nodes() {
            tree.detach(node);
        }
    }
}

/// Extract the lookup key from an instruction
///
/// The instruction is upper-cased and trimmed. A leading variable keyword
/// is stripped; a leading merge keyword is stripped and the remainder is
/// cut at the first `\` switch. Surrounding quotes are removed.
#[must_use]
pub fn extract_key(instruction: &str) -> String {
    let upper = instruction.trim().to_uppercase();
    let (keyword, rest) = match upper.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail),
        None => (upper.as_str(), ""),
    };
    let key = if MERGE_KEYWORDS.contains(&keyword) {
        rest.split('\\').next().unwrap_or_default()
    } else if VARIABLE_KEYWORDS.contains(&keyword) {
        rest
    } else {
        upper.as_str()
    };
    key.trim().trim_matches('"').trim().to_string()
}

/// Placeholder rooted at `node`, if any
#[must_use]
pub fn detect(profile: &FormatProfile, tree: &XmlTree, node: NodeId) -> Option<Placeholder> {
    match profile.format {
        DocumentFormat::Docx => detect_docx(profile, tree, node),
        DocumentFormat::Odt => detect_odt(tree, node),
    }
}

fn detect_docx(profile: &FormatProfile, tree: &XmlTree, node: NodeId) -> Option<Placeholder> {
    if tree.is_named(node, "w:fldSimple") {
        let instruction = tree.attr(node, "w:instr")?.to_string();
        let run_props = tree
            .first_child_named(node, profile.run)
            .and_then(|r| tree.first_child_named(r, "w:rPr"));
        return Some(Placeholder {
            key: extract_key(&instruction),
            instruction,
            anchor: node,
            markers: Vec::new(),
            run_props,
            in_field_code: false,
        });
    }
    if !tree.is_named(node, profile.run) || !has_instruction(tree, node) {
        return None;
    }

    // Instruction text outside a field is not a placeholder
    let (begin, _) = enclosing_begin(profile, tree, node)?;
    // A field with nested fields or a spliced instruction is a computed
    // field; only the fields inside it are placeholders
    let (instruction_runs, nested) = field_contents(profile, tree, begin);
    if nested || instruction_runs != 1 {
        return None;
    }

    let mut trailing = Vec::new();
    let mut closed = false;
    let mut cursor = tree.next_sibling(node);
    while let Some(next) = cursor {
        if tree.is_named(next, profile.run) {
            trailing.push(next);
            if field_marker(tree, next) == Some(FieldMarker::End) {
                closed = true;
                break;
            }
        }
        cursor = tree.next_sibling(next);
    }
    let mut markers = vec![begin];
    if closed {
        markers.extend(trailing);
    }

    let instruction = instruction_text(tree, node);
    Some(Placeholder {
        key: extract_key(&instruction),
        instruction,
        anchor: node,
        markers,
        run_props: tree.first_child_named(node, "w:rPr"),
        in_field_code: enclosing_begin(profile, tree, begin).is_some_and(|(_, code)| code),
    })
}

// Begin marker of the field enclosing `node`, and whether `node` sits in
// that field's instruction (no separator of the field precedes it)
fn enclosing_begin(
    profile: &FormatProfile,
    tree: &XmlTree,
    node: NodeId,
) -> Option<(NodeId, bool)> {
    let mut depth = 0usize;
    let mut in_code = true;
    let mut cursor = tree.prev_sibling(node);
    while let Some(prev) = cursor {
        if tree.is_named(prev, profile.run) {
            match field_marker(tree, prev) {
                Some(FieldMarker::End) => depth += 1,
                Some(FieldMarker::Begin) if depth == 0 => return Some((prev, in_code)),
                Some(FieldMarker::Begin) => depth -= 1,
                Some(FieldMarker::Separate) if depth == 0 => in_code = false,
                _ => {}
            }
        }
        cursor = tree.prev_sibling(prev);
    }
    None
}

// Own instruction runs of the field opened by `begin`, and whether it
// contains nested fields
fn field_contents(profile: &FormatProfile, tree: &XmlTree, begin: NodeId) -> (usize, bool) {
    let mut depth = 0usize;
    let mut instruction_runs = 0;
    let mut nested = false;
    let mut cursor = tree.next_sibling(begin);
    while let Some(next) = cursor {
        if tree.is_named(next, profile.run) {
            match field_marker(tree, next) {
                Some(FieldMarker::Begin) => {
                    depth += 1;
                    nested = true;
                }
                Some(FieldMarker::End) if depth == 0 => break,
                Some(FieldMarker::End) => depth -= 1,
                _ if depth == 0 && has_instruction(tree, next) => instruction_runs += 1,
                _ => {}
            }
        }
        cursor = tree.next_sibling(next);
    }
    (instruction_runs, nested)
}

fn detect_odt(tree: &XmlTree, node: NodeId) -> Option<Placeholder> {
    let name = tree.name(node)?;
    let instruction = if name == ODT_PLACEHOLDER {
        tree.text_content(node)
            .trim()
            .trim_start_matches('<')
            .trim_end_matches('>')
            .to_string()
    } else {
        let (_, attr) = ODT_NAMED_FIELDS.iter().find(|(el, _)| *el == name)?;
        tree.attr(node, attr)?.to_string()
    };
    Some(Placeholder {
        key: extract_key(&instruction),
        instruction,
        anchor: node,
        markers: Vec::new(),
        run_props: None,
        in_field_code: false,
    })
}

/// Keys of every placeholder under `root`, in document order
#[must_use]
pub fn collect_keys(profile: &FormatProfile, tree: &XmlTree, root: NodeId) -> Vec<String> {
    tree.descendants(root)
        .into_iter()
        .filter_map(|n| detect(profile, tree, n))
        .map(|p| p.key)
        .filter(|k| !k.is_empty())
        .collect()
}
