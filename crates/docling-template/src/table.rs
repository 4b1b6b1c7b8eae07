//! Table expansion
//!
//! A table whose name matches a table in the active scope chain is a repeat
//! region. Header rows are resolved once against the enclosing scope, the
//! template row is cloned once per data row and each clone is resolved
//! against that row's scope. A table left without rows is removed.

use crate::error::Result;
use crate::format::{DocumentFormat, FormatProfile, TableNameSource};
use crate::markup;
use crate::model::ScopeChain;
use crate::resolve::{resolve_children, resolve_node};
use crate::session::{PartTree, Session};
use crate::xml::{NodeId, XmlTree};
use log::debug;

/// ODT elements grouping rows inside a table
const ODT_ROW_GROUPS: &[&str] = &[
    "table:table-header-rows",
    "table:table-rows",
    "table:table-row-group",
];

/// A row of a table with its header flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowInfo {
    /// Row element
    pub node: NodeId,
    /// Repeated as a header on every page
    pub header: bool,
}

/// Rows of `table` in document order, descending into ODT row groups but
/// not into nested tables
#[must_use]
pub fn table_rows(profile: &FormatProfile, tree: &XmlTree, table: NodeId) -> Vec<RowInfo> {
    let mut rows = Vec::new();
    for child in tree.child_elements(table) {
        if tree.is_named(child, profile.row) {
            rows.push(RowInfo {
                node: child,
                header: profile.format == DocumentFormat::Docx && is_docx_header_row(tree, child),
            });
        } else if profile.format == DocumentFormat::Odt && tree.is_any_of(child, ODT_ROW_GROUPS) {
            let in_header = tree.is_named(child, "table:table-header-rows");
            rows.extend(
                tree.child_elements(child)
                    .filter(|&r| tree.is_named(r, profile.row))
                    .map(|r| RowInfo {
                        node: r,
                        header: in_header,
                    }),
            );
        }
    }
    rows
}

fn is_docx_header_row(tree: &XmlTree, row: NodeId) -> bool {
    tree.first_child_named(row, "w:trPr")
        .and_then(|p| tree.first_child_named(p, "w:tblHeader"))
        .is_some_and(|h| !matches!(tree.attr(h, "w:val"), Some("0" | "false" | "off")))
}

/// Index of the row repeated per data row
///
/// The first non-header row; without header rows, the second row of a
/// multi-row table (the first being a caption row) or the only row.
#[must_use]
pub fn template_row_index(rows: &[RowInfo]) -> usize {
    if rows.iter().any(|r| r.header) {
        return rows.iter().position(|r| !r.header).unwrap_or(0);
    }
    usize::from(rows.len() > 1)
}

/// Binding name of a table and the hidden marker run carrying it, if any
#[must_use]
pub fn table_name(
    profile: &FormatProfile,
    tree: &XmlTree,
    table: NodeId,
    template_row: Option<NodeId>,
) -> Option<(String, Option<NodeId>)> {
    match profile.table_name {
        TableNameSource::Attribute(attr) => tree
            .attr(table, attr)
            .map(|name| (name.trim().to_string(), None)),
        TableNameSource::CaptionOrHiddenMarker => {
            let caption = tree
                .first_child_named(table, "w:tblPr")
                .and_then(|p| tree.first_child_named(p, "w:tblCaption"))
                .and_then(|c| tree.attr(c, "w:val"))
                .map(str::trim)
                .filter(|c| !c.is_empty());
            if let Some(caption) = caption {
                return Some((caption.to_string(), None));
            }
            let cell = tree.first_child_named(template_row?, profile.cell)?;
            hidden_marker(tree, cell).map(|(name, run)| (name, Some(run)))
        }
    }
}

fn hidden_marker(tree: &XmlTree, cell: NodeId) -> Option<(String, NodeId)> {
    tree.descendants_named(cell, "w:r").into_iter().find_map(|run| {
        let hidden = tree
            .first_child_named(run, "w:rPr")
            .and_then(|p| tree.first_child_named(p, "w:vanish"))
            .is_some();
        let text = tree.text_content(run);
        let text = text.trim();
        (hidden && !text.is_empty()).then(|| (text.to_string(), run))
    })
}

/// Expand `table` against `scopes`
///
/// # Errors
///
/// Propagates errors from resolving rows.
pub fn expand(
    session: &mut Session<'_>,
    part: &mut PartTree,
    table: NodeId,
    scopes: &ScopeChain<'_>,
) -> Result<()> {
    let profile = session.profile();
    let rows = table_rows(profile, &part.tree, table);
    if rows.is_empty() {
        return resolve_children(session, part, table, scopes);
    }
    let template_idx = template_row_index(&rows);
    let binding = table_name(profile, &part.tree, table, Some(rows[template_idx].node));
    let data = binding
        .as_ref()
        .and_then(|(name, _)| scopes.table_by_name(name));

    let Some(data) = data else {
        return resolve_children(session, part, table, scopes);
    };
    if let Some((_, Some(marker))) = binding {
        part.tree.detach(marker);
    }

    if rows.iter().all(|r| r.header) {
        for row in &rows {
            resolve_node(session, part, row.node, scopes)?;
        }
        return Ok(());
    }

    debug!(
        "expanding table {} with {} rows",
        data.name(),
        data.rows().len()
    );
    let template = rows[template_idx].node;
    for (i, row) in rows.iter().enumerate() {
        if i != template_idx && part.tree.is_attached(row.node) {
            resolve_node(session, part, row.node, scopes)?;
        }
    }
    // Resolve the non-template part of the table (properties, grid) too
    for child in part.tree.children(table).to_vec() {
        let is_row_like = rows.iter().any(|r| r.node == child)
            || part.tree.is_any_of(child, ODT_ROW_GROUPS);
        if !is_row_like && part.tree.element(child).is_some() {
            resolve_node(session, part, child, scopes)?;
        }
    }

    for data_row in data.rows() {
        let clone = part.tree.deep_clone(template);
        part.tree.insert_before(template, clone);
        let inner = scopes.push(data_row);
        resolve_node(session, part, clone, &inner)?;
    }
    part.tree.detach(template);

    if table_rows(profile, &part.tree, table).is_empty() {
        let parent = part.tree.parent(table);
        part.tree.detach(table);
        if let Some(cell) = parent {
            markup::ensure_cell_paragraph(profile, &mut part.tree, cell);
        }
    }
    Ok(())
}
