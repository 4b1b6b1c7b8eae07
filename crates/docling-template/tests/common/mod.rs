//! Shared template builders for integration tests

#![allow(dead_code)]

use docling_template::xml::{NodeId, XmlTree};
use docling_template::Package;

const W_NAMESPACES: &str = concat!(
    r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
    r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" "#,
    r#"xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" "#,
    r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" "#,
    r#"xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture""#
);

const ODF_NAMESPACES: &str = concat!(
    r#"xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" "#,
    r#"xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0" "#,
    r#"xmlns:table="urn:oasis:names:tc:opendocument:xmlns:table:1.0" "#,
    r#"xmlns:style="urn:oasis:names:tc:opendocument:xmlns:style:1.0" "#,
    r#"xmlns:draw="urn:oasis:names:tc:opendocument:xmlns:drawing:1.0" "#,
    r#"xmlns:svg="urn:oasis:names:tc:opendocument:xmlns:svg-compatible:1.0" "#,
    r#"xmlns:xlink="http://www.w3.org/1999/xlink""#
);

pub const MAIN_CT: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// DOCX package whose body holds `body` followed by the section properties
pub fn docx(body: &str) -> Vec<u8> {
    docx_package(body, MAIN_CT, &[]).to_bytes().unwrap()
}

/// DOCX package with extra parts and a custom main content type
pub fn docx_package(body: &str, main_ct: &str, extra: &[(&str, &str)]) -> Package {
    let mut pkg = Package::new();
    pkg.create_part(
        "[Content_Types].xml",
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
                r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
                r#"<Default Extension="xml" ContentType="application/xml"/>"#,
                r#"<Override PartName="/word/document.xml" ContentType="{}"/>"#,
                r#"</Types>"#
            ),
            main_ct
        )
        .into_bytes(),
    );
    pkg.create_part(
        "_rels/.rels",
        concat!(
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
            r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
            r#"</Relationships>"#
        )
        .as_bytes()
        .to_vec(),
    );
    pkg.create_part(
        "word/document.xml",
        format!(
            r#"<w:document {W_NAMESPACES}><w:body>{body}<w:sectPr><w:pgSz w:w="11906" w:h="16838"/></w:sectPr></w:body></w:document>"#
        )
        .into_bytes(),
    );
    for (name, content) in extra {
        pkg.create_part(name, content.as_bytes().to_vec());
    }
    pkg
}

/// Header part wrapping `content`
pub fn docx_header(content: &str) -> String {
    format!(r#"<w:hdr {W_NAMESPACES}>{content}</w:hdr>"#)
}

/// ODT package with `body` inside `office:text`
pub fn odt(body: &str) -> Vec<u8> {
    odt_package(Some("1.2"), body, None).to_bytes().unwrap()
}

pub fn odt_package(version: Option<&str>, body: &str, styles: Option<&str>) -> Package {
    let version_attr = version
        .map(|v| format!(r#" office:version="{v}""#))
        .unwrap_or_default();
    let mut pkg = Package::new();
    pkg.create_part(
        "mimetype",
        b"application/vnd.oasis.opendocument.text".to_vec(),
    );
    pkg.create_part(
        "META-INF/manifest.xml",
        concat!(
            r#"<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0" manifest:version="1.2">"#,
            r#"<manifest:file-entry manifest:full-path="/" manifest:media-type="application/vnd.oasis.opendocument.text"/>"#,
            r#"<manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml"/>"#,
            r#"<manifest:file-entry manifest:full-path="styles.xml" manifest:media-type="text/xml"/>"#,
            r#"</manifest:manifest>"#
        )
        .as_bytes()
        .to_vec(),
    );
    pkg.create_part(
        "content.xml",
        format!(
            r#"<office:document-content {ODF_NAMESPACES}{version_attr}><office:automatic-styles/><office:body><office:text><text:sequence-decls/>{body}</office:text></office:body></office:document-content>"#
        )
        .into_bytes(),
    );
    if let Some(styles) = styles {
        pkg.create_part(
            "styles.xml",
            format!(
                r#"<office:document-styles {ODF_NAMESPACES}{version_attr}><office:master-styles><style:master-page style:name="Standard">{styles}</style:master-page></office:master-styles></office:document-styles>"#
            )
            .into_bytes(),
        );
    }
    pkg
}

/// Complex field whose instruction is split over two runs
pub fn field(key: &str) -> String {
    let (head, tail) = (" MERGEFIELD ", format!("{key} "));
    format!(
        concat!(
            r#"<w:r><w:fldChar w:fldCharType="begin"/></w:r>"#,
            r#"<w:r><w:instrText xml:space="preserve">{}</w:instrText></w:r>"#,
            r#"<w:r><w:instrText xml:space="preserve">{}</w:instrText></w:r>"#,
            r#"<w:r><w:fldChar w:fldCharType="separate"/></w:r>"#,
            r#"<w:r><w:t>«{}»</w:t></w:r>"#,
            r#"<w:r><w:fldChar w:fldCharType="end"/></w:r>"#
        ),
        head, tail, key
    )
}

/// Simple field with the given instruction
pub fn simple_field(instr: &str) -> String {
    format!(r#"<w:fldSimple w:instr="{instr}"><w:r><w:t>x</w:t></w:r></w:fldSimple>"#)
}

pub fn paragraph(content: &str) -> String {
    format!("<w:p>{content}</w:p>")
}

pub fn text_run(text: &str) -> String {
    format!(r#"<w:r><w:t xml:space="preserve">{text}</w:t></w:r>"#)
}

/// ODT user field
pub fn user_field(key: &str) -> String {
    format!(r#"<text:user-field-get text:name="{key}">{key}</text:user-field-get>"#)
}

pub fn read_part(bytes: &[u8], name: &str) -> String {
    Package::from_bytes(bytes)
        .unwrap()
        .read_part_string(name)
        .unwrap()
}

pub fn part_names(bytes: &[u8]) -> Vec<String> {
    Package::from_bytes(bytes)
        .unwrap()
        .part_names()
        .map(str::to_string)
        .collect()
}

/// Parsed part plus its elements named `name`, in document order
pub fn elements(bytes: &[u8], part: &str, name: &str) -> (XmlTree, Vec<NodeId>) {
    let tree = XmlTree::parse(&read_part(bytes, part)).unwrap();
    let root = tree.root_element().unwrap();
    let nodes = tree.descendants_named(root, name);
    (tree, nodes)
}

/// Text of every element named `name` in `part`
pub fn texts(bytes: &[u8], part: &str, name: &str) -> Vec<String> {
    let (tree, nodes) = elements(bytes, part, name);
    nodes.into_iter().map(|n| tree.text_content(n)).collect()
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::new();
    image::RgbImage::new(width, height)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}
