//! Per-format capabilities
//!
//! The engine is format-agnostic; everything that differs between the two
//! package families (element names, legal splice containers, where a table
//! keeps its name, which image types the consumer understands) lives in a
//! [`FormatProfile`] constant selected once per template.

use crate::xml::{NodeId, XmlTree};

/// Package family of a template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    /// Office Open XML word-processing package (.docx)
    Docx,
    /// `OpenDocument` Text package (.odt)
    Odt,
}

impl DocumentFormat {
    /// Detect format from file extension
    #[inline]
    #[must_use = "detects format from file extension"]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "docx" | "dotx" | "docm" => Some(Self::Docx),
            "odt" | "ott" => Some(Self::Odt),
            _ => None,
        }
    }

    /// Get canonical file extension for this format
    #[inline]
    #[must_use = "returns file extension for format"]
    pub const fn extension(&self) -> &str {
        match self {
            Self::Docx => "docx",
            Self::Odt => "odt",
        }
    }

    /// Capability profile for this format
    #[inline]
    #[must_use]
    pub fn profile(&self) -> &'static FormatProfile {
        match self {
            Self::Docx => &DOCX,
            Self::Odt => &ODT,
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Docx => "docx",
            Self::Odt => "odt",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for DocumentFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.strip_prefix('.').unwrap_or(s);
        Self::from_extension(s)
            .ok_or_else(|| format!("unknown template format: '{s}' (expected: docx, odt)"))
    }
}

/// Where a table region carries its data-binding name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableNameSource {
    /// Native attribute on the table element
    Attribute(&'static str),
    /// `w:tblPr/w:tblCaption`, falling back to a hidden run in the first
    /// cell of the template row
    CaptionOrHiddenMarker,
}

/// Image type a consumer of the format renders natively
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageType {
    /// MIME type
    pub mime: &'static str,
    /// File extension without dot
    pub extension: &'static str,
}

const fn image(mime: &'static str, extension: &'static str) -> ImageType {
    ImageType { mime, extension }
}

/// Capability object describing one package family
#[derive(Debug)]
pub struct FormatProfile {
    /// Format this profile describes
    pub format: DocumentFormat,
    /// Main content part
    pub main_part: &'static str,
    /// Element holding the page body
    pub body: &'static str,
    /// Paragraph and paragraph-like elements
    pub paragraphs: &'static [&'static str],
    /// Run (inline formatting span) element
    pub run: &'static str,
    /// Table element
    pub table: &'static str,
    /// Table row element
    pub row: &'static str,
    /// Table cell element
    pub cell: &'static str,
    /// Containers whose direct children may be replaced by a foreign document
    pub legal_anchor_containers: &'static [&'static str],
    /// Body children kept once ahead of the repeated page content
    pub body_prelude: &'static [&'static str],
    /// Body children kept once after the repeated page content
    pub body_trailer: &'static [&'static str],
    /// Table naming strategy
    pub table_name: TableNameSource,
    /// Directory new media parts are written to
    pub media_dir: &'static str,
    /// Image types rendered natively
    pub images: &'static [ImageType],
}

/// Office Open XML relationship and content-type constants
pub mod ooxml {
    /// Content-type manifest part
    pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
    /// Relationship type of images
    pub const REL_IMAGE: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
    /// Relationship type of alternative-format chunks (foreign documents)
    pub const REL_AF_CHUNK: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/aFChunk";
    /// Relationship type of header parts
    pub const REL_HEADER: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header";
    /// Relationship type of footer parts
    pub const REL_FOOTER: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer";
    /// Relationship namespace
    pub const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
    /// Main document content type of a plain `.docx`
    pub const MAIN_CONTENT_TYPE: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";
}

/// `OpenDocument` constants
pub mod odf {
    /// File manifest part
    pub const MANIFEST_PART: &str = "META-INF/manifest.xml";
    /// Styles part holding master-page headers and footers
    pub const STYLES_PART: &str = "styles.xml";
    /// Declared package versions this engine understands
    pub const SUPPORTED_VERSIONS: &[&str] = &["1.0", "1.1", "1.2", "1.3"];
    /// Name of the automatic paragraph style carrying a page break
    pub const PAGE_BREAK_STYLE: &str = "docling_page_break";
}

/// DOCX profile
pub static DOCX: FormatProfile = FormatProfile {
    format: DocumentFormat::Docx,
    main_part: "word/document.xml",
    body: "w:body",
    paragraphs: &["w:p"],
    run: "w:r",
    table: "w:tbl",
    row: "w:tr",
    cell: "w:tc",
    legal_anchor_containers: &[
        "w:body",
        "w:comment",
        "w:footnote",
        "w:endnote",
        "w:hdr",
        "w:ftr",
        "w:tc",
    ],
    body_prelude: &[],
    body_trailer: &["w:sectPr"],
    table_name: TableNameSource::CaptionOrHiddenMarker,
    media_dir: "word/media",
    images: &[
        image("image/png", "png"),
        image("image/jpeg", "jpeg"),
        image("image/jpeg", "jpg"),
        image("image/gif", "gif"),
        image("image/bmp", "bmp"),
        image("image/tiff", "tiff"),
        image("image/x-emf", "emf"),
        image("image/x-wmf", "wmf"),
        image("image/svg+xml", "svg"),
    ],
};

/// ODT profile
pub static ODT: FormatProfile = FormatProfile {
    format: DocumentFormat::Odt,
    main_part: "content.xml",
    body: "office:text",
    paragraphs: &["text:p", "text:h"],
    run: "text:span",
    table: "table:table",
    row: "table:table-row",
    cell: "table:table-cell",
    legal_anchor_containers: &[
        "office:text",
        "office:annotation",
        "text:note-body",
        "style:header",
        "style:footer",
        "style:header-left",
        "style:footer-left",
        "style:header-first",
        "style:footer-first",
        "table:table-cell",
        "text:section",
    ],
    body_prelude: &[
        "office:forms",
        "text:tracked-changes",
        "text:variable-decls",
        "text:sequence-decls",
        "text:user-field-decls",
        "text:dde-connection-decls",
    ],
    body_trailer: &[],
    table_name: TableNameSource::Attribute("table:name"),
    media_dir: "Pictures",
    images: &[
        image("image/png", "png"),
        image("image/jpeg", "jpg"),
        image("image/jpeg", "jpeg"),
        image("image/gif", "gif"),
        image("image/bmp", "bmp"),
        image("image/svg+xml", "svg"),
        image("image/tiff", "tiff"),
    ],
};

impl FormatProfile {
    /// Whether `id` is a paragraph-like element
    #[inline]
    #[must_use]
    pub fn is_paragraph(&self, tree: &XmlTree, id: NodeId) -> bool {
        tree.is_any_of(id, self.paragraphs)
    }

    /// Whether `id` may directly hold a foreign-document reference
    #[inline]
    #[must_use]
    pub fn is_legal_anchor_container(&self, tree: &XmlTree, id: NodeId) -> bool {
        tree.is_any_of(id, self.legal_anchor_containers)
    }

    /// The body element of the main part
    #[must_use]
    pub fn find_body(&self, tree: &XmlTree) -> Option<NodeId> {
        let root = tree.root_element()?;
        tree.descendants(root)
            .into_iter()
            .find(|&n| tree.is_named(n, self.body))
    }

    /// Negotiate the image type to store for a resource: exact MIME match,
    /// then shared extension, else `None` (pass through unchanged)
    #[must_use]
    pub fn negotiate_image(&self, mime: &str, extension: &str) -> Option<ImageType> {
        self.images
            .iter()
            .find(|t| t.mime.eq_ignore_ascii_case(mime))
            .or_else(|| {
                self.images
                    .iter()
                    .find(|t| t.extension.eq_ignore_ascii_case(extension))
            })
            .copied()
    }

    /// An empty paragraph, detached
    pub fn new_empty_paragraph(&self, tree: &mut XmlTree) -> NodeId {
        tree.new_element(self.paragraphs[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(DocumentFormat::from_extension("DOCX"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_extension("odt"), Some(DocumentFormat::Odt));
        assert_eq!(DocumentFormat::from_extension("pdf"), None);
    }

    #[test]
    fn test_format_from_str() {
        use std::str::FromStr;
        assert_eq!(DocumentFormat::from_str(".odt").unwrap(), DocumentFormat::Odt);
        assert!(DocumentFormat::from_str("xlsx").is_err());
    }

    #[test]
    fn test_negotiate_image() {
        let exact = DOCX.negotiate_image("image/png", "bin").unwrap();
        assert_eq!(exact.extension, "png");

        let by_ext = ODT.negotiate_image("application/octet-stream", "JPG").unwrap();
        assert_eq!(by_ext.mime, "image/jpeg");

        assert!(ODT.negotiate_image("image/x-emf", "emf").is_none());
    }

    #[test]
    fn test_find_body() {
        let tree = XmlTree::parse(
            "<office:document-content><office:body><office:text/></office:body></office:document-content>",
        )
        .unwrap();
        assert!(ODT.find_body(&tree).is_some());
        assert!(DOCX.find_body(&tree).is_none());
    }
}
