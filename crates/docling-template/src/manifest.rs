//! Package manifests: relationship maps and the content-type map
//!
//! Both manifests are kept as parsed XML so entries the engine does not touch
//! round-trip unchanged. Every insertion is insert-if-absent, which keeps the
//! maps duplicate-free however often a resource is registered.

use crate::error::{Result, TemplateError};
use crate::format::{odf, ooxml, DocumentFormat};
use crate::xml::{NodeId, XmlTree};

const RELATIONSHIPS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
const MANIFEST_NS: &str = "urn:oasis:names:tc:opendocument:xmlns:manifest:1.0";

/// Relationship part describing the outgoing links of `part`
/// (`word/document.xml` → `word/_rels/document.xml.rels`)
#[must_use]
pub fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target relative to the owning part's directory
#[must_use]
pub fn resolve_target(owner_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = owner_part
        .rsplit_once('/')
        .map(|(dir, _)| dir.split('/').collect())
        .unwrap_or_default();
    for seg in target.split('/') {
        match seg {
            ".." => {
                segments.pop();
            }
            "." | "" => {}
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Path of `part` relative to the directory of `owner_part`
#[must_use]
pub fn relative_target(owner_part: &str, part: &str) -> String {
    match owner_part.rsplit_once('/') {
        Some((dir, _)) => part
            .strip_prefix(dir)
            .and_then(|p| p.strip_prefix('/'))
            .map_or_else(|| format!("/{part}"), str::to_string),
        None => part.to_string(),
    }
}

/// One relationship entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Relationship id (`rId7`)
    pub id: String,
    /// Relationship type URI
    pub rel_type: String,
    /// Target (relative part path or external URI)
    pub target: String,
    /// `TargetMode="External"`
    pub external: bool,
}

/// Relationship map of one owning part
#[derive(Debug, Clone)]
pub struct RelationshipMap {
    tree: XmlTree,
}

impl Default for RelationshipMap {
    fn default() -> Self {
        Self::empty()
    }
}

impl RelationshipMap {
    /// A map with no entries
    #[must_use]
    pub fn empty() -> Self {
        let mut tree = XmlTree::new();
        let root = tree.new_element_with("Relationships", &[("xmlns", RELATIONSHIPS_NS)]);
        let document = tree.document();
        tree.append_child(document, root);
        Self { tree }
    }

    /// Parse a `.rels` part
    ///
    /// # Errors
    ///
    /// Returns an error if the XML is malformed.
    pub fn parse(xml: &str) -> Result<Self> {
        Ok(Self {
            tree: XmlTree::parse(xml)?,
        })
    }

    /// Serialize back to XML
    #[must_use]
    pub fn to_xml(&self) -> String {
        let xml = self.tree.to_xml();
        if xml.starts_with("<?xml") {
            xml
        } else {
            format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>{xml}"#)
        }
    }

    fn entry_nodes(&self) -> Vec<NodeId> {
        self.tree
            .root_element()
            .map(|root| {
                self.tree
                    .child_elements(root)
                    .filter(|&n| self.tree.is_named(n, "Relationship"))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All entries in document order
    #[must_use]
    pub fn entries(&self) -> Vec<Relationship> {
        self.entry_nodes()
            .into_iter()
            .map(|n| Relationship {
                id: self.tree.attr(n, "Id").unwrap_or_default().to_string(),
                rel_type: self.tree.attr(n, "Type").unwrap_or_default().to_string(),
                target: self.tree.attr(n, "Target").unwrap_or_default().to_string(),
                external: self
                    .tree
                    .attr(n, "TargetMode")
                    .is_some_and(|m| m.eq_ignore_ascii_case("External")),
            })
            .collect()
    }

    /// Entry with the given id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Relationship> {
        self.entries().into_iter().find(|r| r.id == id)
    }

    /// Entry with the same type, target and mode
    #[must_use]
    pub fn find(&self, rel_type: &str, target: &str, external: bool) -> Option<Relationship> {
        self.entries()
            .into_iter()
            .find(|r| r.rel_type == rel_type && r.target == target && r.external == external)
    }

    /// Next free `rIdN`
    #[must_use]
    pub fn next_id(&self) -> String {
        let max = self
            .entries()
            .iter()
            .filter_map(|r| r.id.strip_prefix("rId").and_then(|n| n.parse::<u32>().ok()))
            .max()
            .unwrap_or(0);
        format!("rId{}", max + 1)
    }

    /// Insert `rel` unless an entry with its id exists; returns whether it was added
    pub fn insert_if_absent(&mut self, rel: &Relationship) -> bool {
        if self.get(&rel.id).is_some() {
            return false;
        }
        let Some(root) = self.tree.root_element() else {
            return false;
        };
        let node = self.tree.new_element_with(
            "Relationship",
            &[
                ("Id", rel.id.as_str()),
                ("Type", rel.rel_type.as_str()),
                ("Target", rel.target.as_str()),
            ],
        );
        if rel.external {
            self.tree.set_attr(node, "TargetMode", "External");
        }
        self.tree.append_child(root, node);
        true
    }

    /// Id of an equivalent entry, adding one under a fresh id if needed
    pub fn ensure(&mut self, rel_type: &str, target: &str, external: bool) -> String {
        if let Some(existing) = self.find(rel_type, target, external) {
            return existing.id;
        }
        let rel = Relationship {
            id: self.next_id(),
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            external,
        };
        self.insert_if_absent(&rel);
        rel.id
    }
}

/// Content-type map of a package
///
/// DOCX keeps it in `[Content_Types].xml` as extension defaults and part
/// overrides; ODT keeps one `manifest:file-entry` per part in
/// `META-INF/manifest.xml`.
#[derive(Debug, Clone)]
pub struct ContentTypeMap {
    format: DocumentFormat,
    tree: XmlTree,
}

impl ContentTypeMap {
    /// Parse the manifest part of `format`
    ///
    /// # Errors
    ///
    /// Returns an error if the XML is malformed.
    pub fn parse(format: DocumentFormat, xml: &str) -> Result<Self> {
        Ok(Self {
            format,
            tree: XmlTree::parse(xml)?,
        })
    }

    /// An empty map for `format`
    #[must_use]
    pub fn empty(format: DocumentFormat) -> Self {
        let mut tree = XmlTree::new();
        let root = match format {
            DocumentFormat::Docx => tree.new_element_with("Types", &[("xmlns", CONTENT_TYPES_NS)]),
            DocumentFormat::Odt => tree.new_element_with(
                "manifest:manifest",
                &[("xmlns:manifest", MANIFEST_NS), ("manifest:version", "1.2")],
            ),
        };
        let document = tree.document();
        tree.append_child(document, root);
        Self { format, tree }
    }

    /// Part this map is stored in
    #[must_use]
    pub const fn part_name(&self) -> &'static str {
        match self.format {
            DocumentFormat::Docx => ooxml::CONTENT_TYPES_PART,
            DocumentFormat::Odt => odf::MANIFEST_PART,
        }
    }

    /// Serialize back to XML
    #[must_use]
    pub fn to_xml(&self) -> String {
        let xml = self.tree.to_xml();
        if xml.starts_with("<?xml") {
            xml
        } else {
            format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>{xml}"#)
        }
    }

    fn root(&self) -> Result<NodeId> {
        self.tree.root_element().ok_or_else(|| {
            TemplateError::TemplateFormatInvalid(format!("{} has no root", self.part_name()))
        })
    }

    fn entries_named(&self, name: &str) -> Vec<NodeId> {
        self.tree
            .root_element()
            .map(|root| {
                self.tree
                    .child_elements(root)
                    .filter(|&n| self.tree.is_named(n, name))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Content type registered for an extension (DOCX defaults only)
    #[must_use]
    pub fn default_for(&self, extension: &str) -> Option<String> {
        self.entries_named("Default").into_iter().find_map(|n| {
            self.tree
                .attr(n, "Extension")
                .filter(|e| e.eq_ignore_ascii_case(extension))
                .and(self.tree.attr(n, "ContentType"))
                .map(str::to_string)
        })
    }

    /// Content type registered for a specific part
    #[must_use]
    pub fn override_for(&self, part: &str) -> Option<String> {
        let part = part.trim_start_matches('/');
        match self.format {
            DocumentFormat::Docx => self.entries_named("Override").into_iter().find_map(|n| {
                self.tree
                    .attr(n, "PartName")
                    .filter(|p| p.trim_start_matches('/') == part)
                    .and(self.tree.attr(n, "ContentType"))
                    .map(str::to_string)
            }),
            DocumentFormat::Odt => self
                .entries_named("manifest:file-entry")
                .into_iter()
                .find_map(|n| {
                    self.tree
                        .attr(n, "manifest:full-path")
                        .filter(|p| *p == part)
                        .and(self.tree.attr(n, "manifest:media-type"))
                        .map(str::to_string)
                }),
        }
    }

    /// Register an extension default; returns whether an entry was added
    ///
    /// ODT manifests have no extension defaults, so this is a no-op there.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest has no root element.
    pub fn add_default(&mut self, extension: &str, mime: &str) -> Result<bool> {
        if self.format == DocumentFormat::Odt || self.default_for(extension).is_some() {
            return Ok(false);
        }
        let root = self.root()?;
        let extension = extension.to_lowercase();
        let node = self.tree.new_element_with(
            "Default",
            &[("Extension", extension.as_str()), ("ContentType", mime)],
        );
        // Defaults precede overrides by convention
        match self.entries_named("Override").first() {
            Some(&first) => self.tree.insert_before(first, node),
            None => self.tree.append_child(root, node),
        }
        Ok(true)
    }

    /// Register a part-specific content type; returns whether an entry was added
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest has no root element.
    pub fn add_override(&mut self, part: &str, mime: &str) -> Result<bool> {
        let part = part.trim_start_matches('/');
        if self.override_for(part).is_some() {
            return Ok(false);
        }
        let root = self.root()?;
        let part_name = format!("/{part}");
        let node = match self.format {
            DocumentFormat::Docx => self.tree.new_element_with(
                "Override",
                &[("PartName", part_name.as_str()), ("ContentType", mime)],
            ),
            DocumentFormat::Odt => self.tree.new_element_with(
                "manifest:file-entry",
                &[("manifest:full-path", part), ("manifest:media-type", mime)],
            ),
        };
        self.tree.append_child(root, node);
        Ok(true)
    }

    /// Register the content type of a newly written part: an extension
    /// default for DOCX, a file entry for ODT
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest has no root element.
    pub fn register_part(&mut self, part: &str, extension: &str, mime: &str) -> Result<()> {
        match self.format {
            DocumentFormat::Docx => match self.default_for(extension) {
                None => {
                    self.add_default(extension, mime)?;
                }
                // Extension already mapped elsewhere; pin this part explicitly
                Some(existing) if !existing.eq_ignore_ascii_case(mime) => {
                    self.add_override(part, mime)?;
                }
                Some(_) => {}
            },
            DocumentFormat::Odt => {
                self.add_override(part, mime)?;
            }
        }
        Ok(())
    }

    /// (extension-or-part, content type) pairs, for inspection
    #[must_use]
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for n in self.entries_named("Default") {
            out.push((
                self.tree.attr(n, "Extension").unwrap_or_default().to_lowercase(),
                self.tree.attr(n, "ContentType").unwrap_or_default().to_string(),
            ));
        }
        for n in self.entries_named("Override") {
            out.push((
                self.tree.attr(n, "PartName").unwrap_or_default().to_string(),
                self.tree.attr(n, "ContentType").unwrap_or_default().to_string(),
            ));
        }
        for n in self.entries_named("manifest:file-entry") {
            out.push((
                self.tree
                    .attr(n, "manifest:full-path")
                    .unwrap_or_default()
                    .to_string(),
                self.tree
                    .attr(n, "manifest:media-type")
                    .unwrap_or_default()
                    .to_string(),
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/header" Target="header1.xml"/></Relationships>"#;

    #[test]
    fn test_rels_part_for() {
        assert_eq!(rels_part_for("word/document.xml"), "word/_rels/document.xml.rels");
        assert_eq!(rels_part_for("content.xml"), "_rels/content.xml.rels");
    }

    #[test]
    fn test_target_resolution() {
        assert_eq!(resolve_target("word/document.xml", "media/a.png"), "word/media/a.png");
        assert_eq!(resolve_target("word/document.xml", "../customXml/x.xml"), "customXml/x.xml");
        assert_eq!(resolve_target("word/document.xml", "/word/x.xml"), "word/x.xml");
        assert_eq!(relative_target("word/header1.xml", "word/media/a.png"), "media/a.png");
        assert_eq!(relative_target("word/document.xml", "other/a.png"), "/other/a.png");
    }

    #[test]
    fn test_relationship_ensure_is_idempotent() {
        let mut rels = RelationshipMap::parse(RELS).unwrap();
        assert_eq!(rels.next_id(), "rId4");
        let a = rels.ensure(ooxml::REL_IMAGE, "media/image1.png", false);
        let b = rels.ensure(ooxml::REL_IMAGE, "media/image1.png", false);
        assert_eq!(a, "rId4");
        assert_eq!(a, b);
        assert_eq!(rels.entries().len(), 3);
        let linked = rels.ensure(ooxml::REL_IMAGE, "media/image1.png", true);
        assert_ne!(linked, a);
        assert!(rels.get(&linked).unwrap().external);
    }

    #[test]
    fn test_insert_if_absent_by_id() {
        let mut rels = RelationshipMap::empty();
        let rel = Relationship {
            id: "rId9".to_string(),
            rel_type: ooxml::REL_IMAGE.to_string(),
            target: "media/x.png".to_string(),
            external: false,
        };
        assert!(rels.insert_if_absent(&rel));
        assert!(!rels.insert_if_absent(&rel));
        assert!(rels.to_xml().contains(r#"Id="rId9""#));
    }

    #[test]
    fn test_content_types_docx() {
        let xml = r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="x"/></Types>"#;
        let mut ct = ContentTypeMap::parse(DocumentFormat::Docx, xml).unwrap();
        assert!(ct.add_default("PNG", "image/png").unwrap());
        assert!(!ct.add_default("png", "image/png").unwrap());
        assert_eq!(ct.default_for("png").as_deref(), Some("image/png"));
        assert_eq!(ct.override_for("word/document.xml").as_deref(), Some("x"));
        let out = ct.to_xml();
        assert!(out.find("Extension=\"png\"").unwrap() < out.find("Override").unwrap());
    }

    #[test]
    fn test_content_types_odt() {
        let mut ct = ContentTypeMap::empty(DocumentFormat::Odt);
        ct.register_part("Pictures/a.png", "png", "image/png").unwrap();
        ct.register_part("Pictures/a.png", "png", "image/png").unwrap();
        assert_eq!(ct.entries().len(), 1);
        assert!(!ct.add_default("png", "image/png").unwrap());
    }

    #[test]
    fn test_register_part_pins_conflicting_extension() {
        let mut ct = ContentTypeMap::empty(DocumentFormat::Docx);
        ct.add_default("bin", "application/octet-stream").unwrap();
        ct.register_part("word/afchunk1.bin", "bin", "text/html").unwrap();
        assert_eq!(ct.override_for("/word/afchunk1.bin").as_deref(), Some("text/html"));
    }
}
