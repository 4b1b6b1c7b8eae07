//! Foreign document insertion
//!
//! A whole document can only be spliced where the format allows block
//! content: directly inside a body, comment, note, header, footer or table
//! cell. The splice point is found by walking up from the placeholder.
//! DOCX references the stored document with an `w:altChunk`; ODT with a
//! linked `text:section`.

use crate::error::{Result, TemplateError};
use crate::format::{ooxml, DocumentFormat, FormatProfile};
use crate::manifest::relative_target;
use crate::markup;
use crate::model::DocumentRef;
use crate::session::{PartTree, Session};
use crate::xml::{NodeId, XmlTree};
use log::debug;

/// Directory of stored ODT subdocuments
pub const ODT_DOCUMENT_DIR: &str = "Documents";

const NS_XLINK: &str = "http://www.w3.org/1999/xlink";

/// Where the reference element goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplicePoint {
    /// Replace this child of a legal container
    Replace(NodeId),
    /// Append to this legal container found among preceding siblings
    AppendTo(NodeId),
}

/// Find the splice point for `anchor`
///
/// At each level upward, the current node is the splice point when its
/// parent is a legal container; otherwise the nearest preceding sibling
/// that is a legal container receives the reference.
#[must_use]
pub fn find_splice_point(
    profile: &FormatProfile,
    tree: &XmlTree,
    anchor: NodeId,
) -> Option<SplicePoint> {
    let mut current = anchor;
    while let Some(parent) = tree.parent(current) {
        if profile.is_legal_anchor_container(tree, parent) {
            return Some(SplicePoint::Replace(current));
        }
        let mut sibling = tree.prev_sibling(current);
        while let Some(s) = sibling {
            if profile.is_legal_anchor_container(tree, s) {
                return Some(SplicePoint::AppendTo(s));
            }
            sibling = tree.prev_sibling(s);
        }
        current = parent;
    }
    None
}

/// Splice `document` in at the nearest legal point above `anchor`
///
/// # Errors
///
/// Returns `NoLegalAnchor` if no legal container encloses the anchor, or an
/// error if the manifests cannot be updated.
pub fn insert(
    session: &mut Session<'_>,
    part: &mut PartTree,
    anchor: NodeId,
    document: &DocumentRef,
    key: &str,
) -> Result<()> {
    let profile = session.profile();
    let point = find_splice_point(profile, &part.tree, anchor)
        .ok_or_else(|| TemplateError::NoLegalAnchor(key.to_string()))?;

    if document.content.is_none() {
        if let SplicePoint::Replace(node) = point {
            let parent = part.tree.parent(node);
            part.tree.detach(node);
            if let Some(parent) = parent {
                markup::ensure_cell_paragraph(profile, &mut part.tree, parent);
            }
        }
        debug!("removed splice point of {key} (no document)");
        return Ok(());
    }

    let reference = register(session, &part.name, document)?;
    let element = match profile.format {
        DocumentFormat::Docx => part.tree.new_element_with(
            "w:altChunk",
            &[("xmlns:r", ooxml::NS_R), ("r:id", reference.as_str())],
        ),
        DocumentFormat::Odt => {
            let name = format!("DoclingSection{}", session.next_section());
            let section =
                part.tree
                    .new_element_with("text:section", &[("text:name", name.as_str())]);
            let source = part.tree.new_element_with(
                "text:section-source",
                &[
                    ("xmlns:xlink", NS_XLINK),
                    ("xlink:href", reference.as_str()),
                    ("xlink:type", "simple"),
                ],
            );
            part.tree.append_child(section, source);
            section
        }
    };
    match point {
        SplicePoint::Replace(node) => {
            let parent = part.tree.parent(node);
            part.tree.replace(node, element);
            if let Some(parent) = parent {
                markup::ensure_cell_paragraph(profile, &mut part.tree, parent);
            }
        }
        SplicePoint::AppendTo(container) => {
            part.tree.append_child(container, element);
            markup::ensure_cell_paragraph(profile, &mut part.tree, container);
        }
    }
    Ok(())
}

/// Store the document once per generation and return its reference
fn register(session: &mut Session<'_>, owner: &str, document: &DocumentRef) -> Result<String> {
    let profile = session.profile();
    let cache_owner = match profile.format {
        DocumentFormat::Docx => owner.to_string(),
        DocumentFormat::Odt => String::new(),
    };
    let cache_key = (cache_owner, document.id());
    if let Some(hit) = session.document_cache.get(&cache_key) {
        return Ok(hit.clone());
    }
    let Some((bytes, kind)) = &document.content else {
        return Err(TemplateError::InvalidData(
            "cannot register an empty document reference".to_string(),
        ));
    };

    let part = match session.document_parts.get(&document.id()) {
        Some(existing) => existing.clone(),
        None => {
            let dir = match profile.format {
                DocumentFormat::Docx => "word",
                DocumentFormat::Odt => ODT_DOCUMENT_DIR,
            };
            let name = session.unique_part_name(dir, "docling_chunk", &kind.extension);
            session.package.create_part(&name, bytes.to_vec());
            session
                .content_types
                .register_part(&name, &kind.extension, &kind.mime)?;
            session.document_parts.insert(document.id(), name.clone());
            debug!("stored foreign document {name} ({} bytes)", bytes.len());
            name
        }
    };
    let reference = match profile.format {
        DocumentFormat::Docx => {
            let target = relative_target(owner, &part);
            session
                .relationships(owner)?
                .ensure(ooxml::REL_AF_CHUNK, &target, false)
        }
        DocumentFormat::Odt => part,
    };
    session.document_cache.insert(cache_key, reference.clone());
    Ok(reference)
}
