//! Template loading and generation
//!
//! A [`Template`] holds the pristine package. Every `generate` call works on
//! its own copy: the main part's body content is cloned once per page,
//! resolved against that page's scope and concatenated (separated by hard
//! page breaks), headers and footers are resolved against the first page,
//! and the manifests are written back before the package is serialized.

use crate::error::{Result, TemplateError};
use crate::foreign;
use crate::format::{odf, ooxml, DocumentFormat};
use crate::intercept::{Interceptor, InterceptorChain};
use crate::markup;
use crate::model::{DocumentRef, Scope, ScopeChain};
use crate::normalize::normalize;
use crate::options::TemplateOptions;
use crate::package::Package;
use crate::placeholder::collect_keys;
use crate::resolve::{resolve_children, resolve_node};
use crate::session::{PartTree, Session};
use crate::xml::{NodeId, XmlTree};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::path::Path;

/// ODT elements holding master-page headers and footers
const ODT_HEADER_FOOTER: &[&str] = &[
    "style:header",
    "style:footer",
    "style:header-left",
    "style:footer-left",
    "style:header-first",
    "style:footer-first",
];

/// A loaded document template
#[derive(Debug)]
pub struct Template {
    format: DocumentFormat,
    package: Package,
    options: TemplateOptions,
    interceptors: InterceptorChain,
}

impl Template {
    /// Load a template from package bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a ZIP package or the package is
    /// neither a DOCX nor an ODT document.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_package(Package::from_bytes(bytes)?)
    }

    /// Load a template from a file
    ///
    /// # Errors
    ///
    /// See [`Template::from_bytes`]; also fails if the file cannot be read.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        debug!("loaded template {}", path.as_ref().display());
        Self::from_bytes(&bytes)
    }

    /// Wrap an already-read package
    ///
    /// # Errors
    ///
    /// Returns `TemplateFormatInvalid` if no main part is present.
    pub fn from_package(package: Package) -> Result<Self> {
        let format = detect_format(&package)?;
        Ok(Self {
            format,
            package,
            options: TemplateOptions::default(),
            interceptors: InterceptorChain::new(),
        })
    }

    /// Replace the generation options
    #[must_use]
    pub fn with_options(mut self, options: TemplateOptions) -> Self {
        self.options = options;
        self
    }

    /// Generation options
    #[inline]
    #[must_use]
    pub const fn options(&self) -> &TemplateOptions {
        &self.options
    }

    /// Mutable generation options
    #[inline]
    pub fn options_mut(&mut self) -> &mut TemplateOptions {
        &mut self.options
    }

    /// Append a value interceptor
    pub fn add_interceptor(&mut self, interceptor: impl Interceptor + Send + Sync + 'static) {
        self.interceptors.push(interceptor);
    }

    /// Package family of the template
    #[inline]
    #[must_use]
    pub const fn format(&self) -> DocumentFormat {
        self.format
    }

    /// The pristine template package
    #[inline]
    #[must_use]
    pub const fn package(&self) -> &Package {
        &self.package
    }

    /// Distinct placeholder keys of the main part, in document order
    ///
    /// # Errors
    ///
    /// Returns an error if the main part is missing or malformed.
    pub fn placeholder_keys(&self) -> Result<Vec<String>> {
        let profile = self.format.profile();
        let mut main = PartTree::load(&self.package, profile.main_part)?;
        let root = root_of(&main)?;
        normalize(profile, &mut main.tree, root)?;
        let mut seen = HashSet::new();
        let mut keys = collect_keys(profile, &main.tree, root);
        keys.retain(|k| seen.insert(k.clone()));
        Ok(keys)
    }

    /// Generate a document with one page per scope
    ///
    /// # Errors
    ///
    /// Any [`TemplateError`]; no partial output is produced.
    pub fn generate(&self, pages: &[Scope]) -> Result<Vec<u8>> {
        self.generate_with(pages, |_| Ok(()))
    }

    /// Generate and write the document to `path`
    ///
    /// # Errors
    ///
    /// See [`Template::generate`]; also fails if the file cannot be written.
    pub fn generate_to_file<P: AsRef<Path>>(&self, pages: &[Scope], path: P) -> Result<()> {
        let bytes = self.generate(pages)?;
        std::fs::write(path.as_ref(), bytes)?;
        info!("wrote {}", path.as_ref().display());
        Ok(())
    }

    /// Generate, giving `hook` access to the output after resolution and
    /// before serialization
    ///
    /// # Errors
    ///
    /// See [`Template::generate`]; errors returned by `hook` abort the call.
    pub fn generate_with<F>(&self, pages: &[Scope], hook: F) -> Result<Vec<u8>>
    where
        F: FnOnce(&mut GenerationContext<'_, '_>) -> Result<()>,
    {
        let mut session = Session::new(
            self.format,
            &self.options,
            &self.interceptors,
            self.package.clone(),
        )?;
        let profile = session.profile();
        let mut main = PartTree::load(session.package(), profile.main_part)?;
        self.check_version(&session, &main.tree)?;

        let root = root_of(&main)?;
        normalize(profile, &mut main.tree, root)?;
        session.reserve_drawing_ids(max_drawing_id(&main.tree));

        fill_template(&mut session, &mut main, pages)?;
        if let Some(first) = pages.first() {
            fill_headers_footers(&mut session, &main.name, first)?;
        }

        hook(&mut GenerationContext {
            session: &mut session,
            main: &mut main,
        })?;

        main.store(session.package_mut())?;
        let package = session.finish()?;
        package.to_bytes()
    }

    fn check_version(&self, session: &Session<'_>, main: &XmlTree) -> Result<()> {
        let mismatch = match self.format {
            DocumentFormat::Docx => (!session.has_plain_main_content_type()).then(|| {
                format!(
                    "main part content type is {:?}, expected {}",
                    session.content_types().override_for(session.profile().main_part),
                    ooxml::MAIN_CONTENT_TYPE
                )
            }),
            DocumentFormat::Odt => main
                .root_element()
                .and_then(|root| main.attr(root, "office:version"))
                .filter(|v| !odf::SUPPORTED_VERSIONS.contains(v))
                .map(|v| format!("unsupported document version {v}")),
        };
        match mismatch {
            Some(reason) if self.options.ignore_version_mismatch => {
                warn!("{reason}; continuing");
                Ok(())
            }
            Some(reason) => Err(TemplateError::TemplateFormatInvalid(reason)),
            None => Ok(()),
        }
    }
}

fn detect_format(package: &Package) -> Result<DocumentFormat> {
    if package.contains(crate::format::DOCX.main_part) {
        Ok(DocumentFormat::Docx)
    } else if package.contains(crate::format::ODT.main_part) {
        Ok(DocumentFormat::Odt)
    } else {
        Err(TemplateError::TemplateFormatInvalid(
            "package has neither word/document.xml nor content.xml".to_string(),
        ))
    }
}

fn root_of(part: &PartTree) -> Result<NodeId> {
    part.tree.root_element().ok_or_else(|| {
        TemplateError::TemplateFormatInvalid(format!("{} has no root element", part.name))
    })
}

fn max_drawing_id(tree: &XmlTree) -> u32 {
    tree.descendants(tree.document())
        .into_iter()
        .filter(|&n| tree.is_named(n, "wp:docPr"))
        .filter_map(|n| tree.attr(n, "id").and_then(|id| id.parse().ok()))
        .max()
        .unwrap_or(0)
}

/// Fill the main part: one copy of the body content per page
///
/// Body children that are page-independent (ODT declarations, the DOCX
/// final section properties) are kept once. With no pages the body is left
/// as that empty shell when `ignore_missing_data_pages` is set.
///
/// # Errors
///
/// `NoDataForGeneration` for zero pages under the strict policy, or any
/// resolution error.
pub fn fill_template(session: &mut Session<'_>, main: &mut PartTree, pages: &[Scope]) -> Result<()> {
    let profile = session.profile();
    let body = profile.find_body(&main.tree).ok_or_else(|| {
        TemplateError::TemplateFormatInvalid(format!("{} has no {}", main.name, profile.body))
    })?;
    let children = main.tree.children(body).to_vec();
    let trailer = children
        .iter()
        .copied()
        .find(|&c| main.tree.is_any_of(c, profile.body_trailer));
    let content: Vec<NodeId> = children
        .into_iter()
        .filter(|&c| {
            !main.tree.is_any_of(c, profile.body_prelude)
                && !main.tree.is_any_of(c, profile.body_trailer)
        })
        .collect();
    for &node in &content {
        main.tree.detach(node);
    }

    if pages.is_empty() {
        if session.options.ignore_missing_data_pages {
            debug!("no pages; returning the template shell");
            return Ok(());
        }
        return Err(TemplateError::NoDataForGeneration);
    }

    let place = |tree: &mut XmlTree, node: NodeId| match trailer {
        Some(t) => tree.insert_before(t, node),
        None => tree.append_child(body, node),
    };
    for (index, page) in pages.iter().enumerate() {
        debug!("generating page {}/{}", index + 1, pages.len());
        if index > 0 && session.options.insert_hard_page_breaks {
            let page_break = markup::page_break(profile, &mut main.tree)?;
            place(&mut main.tree, page_break);
        }
        let scopes = ScopeChain::root(page);
        for &node in &content {
            let copy = main.tree.deep_clone(node);
            place(&mut main.tree, copy);
            if main.tree.element(copy).is_some() {
                resolve_node(session, main, copy, &scopes)?;
            }
        }
    }
    Ok(())
}

/// Resolve header and footer parts against the first page's scope
fn fill_headers_footers(session: &mut Session<'_>, main_part: &str, page: &Scope) -> Result<()> {
    let profile = session.profile();
    let parts = match profile.format {
        DocumentFormat::Docx => {
            let mut parts = session.related_parts(main_part, ooxml::REL_HEADER)?;
            parts.extend(session.related_parts(main_part, ooxml::REL_FOOTER)?);
            parts
        }
        DocumentFormat::Odt => vec![odf::STYLES_PART.to_string()],
    };
    let scopes = ScopeChain::root(page);
    for name in parts {
        if !session.package().contains(&name) {
            if profile.format == DocumentFormat::Docx {
                warn!("header/footer part {name} is referenced but missing");
            }
            continue;
        }
        let mut part = PartTree::load(session.package(), &name)?;
        let root = root_of(&part)?;
        normalize(profile, &mut part.tree, root)?;
        session.reserve_drawing_ids(max_drawing_id(&part.tree));
        match profile.format {
            DocumentFormat::Docx => resolve_node(session, &mut part, root, &scopes)?,
            DocumentFormat::Odt => {
                let regions: Vec<NodeId> = part
                    .tree
                    .descendants(root)
                    .into_iter()
                    .filter(|&n| part.tree.is_any_of(n, ODT_HEADER_FOOTER))
                    .collect();
                for region in regions {
                    resolve_children(session, &mut part, region, &scopes)?;
                }
            }
        }
        part.store(session.package_mut())?;
        debug!("resolved {name}");
    }
    Ok(())
}

/// Access to a generation in progress, handed to [`Template::generate_with`]
/// hooks
pub struct GenerationContext<'g, 't> {
    session: &'g mut Session<'t>,
    main: &'g mut PartTree,
}

impl std::fmt::Debug for GenerationContext<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationContext")
            .field("main", &self.main.name)
            .finish_non_exhaustive()
    }
}

impl GenerationContext<'_, '_> {
    /// Package family of the output
    #[inline]
    #[must_use]
    pub fn format(&self) -> DocumentFormat {
        self.session.profile().format
    }

    /// Name of the main content part
    #[inline]
    #[must_use]
    pub fn main_part_name(&self) -> &str {
        &self.main.name
    }

    /// Current bytes of a part; the main part is serialized on demand
    ///
    /// # Errors
    ///
    /// Returns `PartNotFound` if the part does not exist.
    pub fn read_part(&self, name: &str) -> Result<Vec<u8>> {
        if name == self.main.name {
            return Ok(self.main.tree.to_xml().into_bytes());
        }
        self.session.package().read_part(name).map(<[u8]>::to_vec)
    }

    /// Replace the content of an existing part
    ///
    /// # Errors
    ///
    /// Returns `PartNotFound` if the part does not exist, or a parse error
    /// when replacing the main part with malformed XML.
    pub fn overwrite_part(&mut self, name: &str, bytes: Vec<u8>) -> Result<()> {
        if name == self.main.name {
            let xml = String::from_utf8(bytes)?;
            self.main.tree = XmlTree::parse(&xml)?;
            return Ok(());
        }
        self.session.package_mut().overwrite_part(name, bytes)
    }

    /// The main part's tree
    #[inline]
    #[must_use]
    pub fn main_tree(&self) -> &XmlTree {
        &self.main.tree
    }

    /// The main part's tree, mutable
    #[inline]
    pub fn main_tree_mut(&mut self) -> &mut XmlTree {
        &mut self.main.tree
    }

    /// First paragraph of the main part whose text contains `needle`
    #[must_use]
    pub fn find_paragraph(&self, needle: &str) -> Option<NodeId> {
        let profile = self.session.profile();
        let tree = &self.main.tree;
        tree.descendants(tree.document())
            .into_iter()
            .filter(|&n| profile.is_paragraph(tree, n))
            .find(|&n| tree.text_content(n).contains(needle))
    }

    /// Splice a foreign document in at `anchor` of the main part
    ///
    /// # Errors
    ///
    /// Returns `NoLegalAnchor` if `anchor` is not inside a legal container.
    pub fn insert_document(&mut self, anchor: NodeId, document: &DocumentRef) -> Result<()> {
        let label = format!("node {}", self.main.tree.name(anchor).unwrap_or("#text"));
        foreign::insert(self.session, self.main, anchor, document, &label)
    }
}
