//! Per-generation state
//!
//! A [`Session`] is created for every `generate` call and threaded through
//! the resolver, table expander, image registrar and document inserter. It
//! owns the output package, its manifests and the identity caches, so two
//! generations never share mutable state.

use crate::error::{Result, TemplateError};
use crate::format::{ooxml, DocumentFormat, FormatProfile};
use crate::intercept::InterceptorChain;
use crate::manifest::{rels_part_for, ContentTypeMap, RelationshipMap};
use crate::model::ResourceId;
use crate::options::TemplateOptions;
use crate::package::Package;
use crate::xml::XmlTree;
use log::debug;
use std::collections::{BTreeMap, HashMap};

/// A parsed part together with its name
#[derive(Debug, Clone)]
pub struct PartTree {
    /// Part name inside the package
    pub name: String,
    /// Parsed content
    pub tree: XmlTree,
}

impl PartTree {
    /// Load and parse a required part
    ///
    /// # Errors
    ///
    /// Returns `TemplateFormatInvalid` if the part is missing or unparseable.
    pub fn load(package: &Package, name: &str) -> Result<Self> {
        let xml = package.read_part_string(name).map_err(|e| match e {
            TemplateError::PartNotFound(p) => {
                TemplateError::TemplateFormatInvalid(format!("missing required part {p}"))
            }
            other => other,
        })?;
        let tree = XmlTree::parse(&xml).map_err(|e| {
            TemplateError::TemplateFormatInvalid(format!("cannot parse {name}: {e}"))
        })?;
        Ok(Self {
            name: name.to_string(),
            tree,
        })
    }

    /// Serialize back into the package
    ///
    /// # Errors
    ///
    /// Returns `PartNotFound` if the part was removed from the package.
    pub fn store(&self, package: &mut Package) -> Result<()> {
        package.overwrite_part(&self.name, self.tree.to_xml().into_bytes())
    }
}

/// Result of registering an image for one owning part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRegistration {
    /// Relationship id (DOCX) or package path / URL (ODT)
    pub reference: String,
    /// Linked rather than embedded
    pub external: bool,
    /// Content type stored for the image
    pub mime: String,
}

/// Mutable state of one generation
pub struct Session<'t> {
    pub(crate) profile: &'static FormatProfile,
    pub(crate) options: &'t TemplateOptions,
    pub(crate) interceptors: &'t InterceptorChain,
    pub(crate) package: Package,
    pub(crate) content_types: ContentTypeMap,
    relationships: BTreeMap<String, RelationshipMap>,
    pub(crate) image_cache: HashMap<(String, ResourceId), ImageRegistration>,
    pub(crate) media_parts: HashMap<ResourceId, String>,
    pub(crate) document_cache: HashMap<(String, ResourceId), String>,
    pub(crate) document_parts: HashMap<ResourceId, String>,
    next_drawing_id: u32,
    next_section: usize,
}

impl std::fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("format", &self.profile.format)
            .field("images", &self.image_cache.len())
            .field("documents", &self.document_cache.len())
            .finish_non_exhaustive()
    }
}

impl<'t> Session<'t> {
    /// Start a generation on a fresh copy of the template package
    ///
    /// # Errors
    ///
    /// Returns `TemplateFormatInvalid` if the content-type manifest is
    /// missing or unparseable.
    pub fn new(
        format: DocumentFormat,
        options: &'t TemplateOptions,
        interceptors: &'t InterceptorChain,
        package: Package,
    ) -> Result<Self> {
        let profile = format.profile();
        let ct_part = ContentTypeMap::empty(format).part_name();
        let ct_xml = package.read_part_string(ct_part).map_err(|_| {
            TemplateError::TemplateFormatInvalid(format!("missing required part {ct_part}"))
        })?;
        let content_types = ContentTypeMap::parse(format, &ct_xml).map_err(|e| {
            TemplateError::TemplateFormatInvalid(format!("cannot parse {ct_part}: {e}"))
        })?;
        Ok(Self {
            profile,
            options,
            interceptors,
            package,
            content_types,
            relationships: BTreeMap::new(),
            image_cache: HashMap::new(),
            media_parts: HashMap::new(),
            document_cache: HashMap::new(),
            document_parts: HashMap::new(),
            next_drawing_id: 1,
            next_section: 1,
        })
    }

    /// Format profile of the template
    #[inline]
    #[must_use]
    pub const fn profile(&self) -> &'static FormatProfile {
        self.profile
    }

    /// Options of this generation
    #[inline]
    #[must_use]
    pub const fn options(&self) -> &TemplateOptions {
        self.options
    }

    /// Output package being assembled
    #[inline]
    #[must_use]
    pub const fn package(&self) -> &Package {
        &self.package
    }

    /// Mutable output package
    #[inline]
    pub fn package_mut(&mut self) -> &mut Package {
        &mut self.package
    }

    /// Content-type map
    #[inline]
    #[must_use]
    pub const fn content_types(&self) -> &ContentTypeMap {
        &self.content_types
    }

    /// Relationship map owned by `part`, loaded on first use
    ///
    /// # Errors
    ///
    /// Returns an error if an existing `.rels` part is malformed.
    pub fn relationships(&mut self, part: &str) -> Result<&mut RelationshipMap> {
        if !self.relationships.contains_key(part) {
            let rels_part = rels_part_for(part);
            let map = if self.package.contains(&rels_part) {
                RelationshipMap::parse(&self.package.read_part_string(&rels_part)?)?
            } else {
                RelationshipMap::empty()
            };
            self.relationships.insert(part.to_string(), map);
        }
        self.relationships
            .get_mut(part)
            .ok_or_else(|| TemplateError::PartNotFound(rels_part_for(part)))
    }

    /// Part targets of `owner` with the given relationship type
    ///
    /// # Errors
    ///
    /// Returns an error if the `.rels` part is malformed.
    pub fn related_parts(&mut self, owner: &str, rel_type: &str) -> Result<Vec<String>> {
        let rels = self.relationships(owner)?;
        Ok(rels
            .entries()
            .into_iter()
            .filter(|r| r.rel_type == rel_type && !r.external)
            .map(|r| crate::manifest::resolve_target(owner, &r.target))
            .collect())
    }

    /// A part name under `dir` that does not exist yet
    #[must_use]
    pub fn unique_part_name(&self, dir: &str, stem: &str, extension: &str) -> String {
        (1..)
            .map(|n| format!("{dir}/{stem}{n}.{extension}"))
            .find(|name| !self.package.contains(name))
            .unwrap_or_else(|| format!("{dir}/{stem}.{extension}"))
    }

    /// Seed drawing ids above every id already used by the template
    pub fn reserve_drawing_ids(&mut self, max_used: u32) {
        self.next_drawing_id = self.next_drawing_id.max(max_used.saturating_add(1));
    }

    /// Unique id for a new drawing object
    pub fn next_drawing_id(&mut self) -> u32 {
        let id = self.next_drawing_id;
        self.next_drawing_id += 1;
        id
    }

    /// Sequence number for generated section names
    pub fn next_section(&mut self) -> usize {
        let n = self.next_section;
        self.next_section += 1;
        n
    }

    /// Write the manifests into the package and hand it over
    ///
    /// # Errors
    ///
    /// Returns an error if a manifest part cannot be written.
    pub fn finish(mut self) -> Result<Package> {
        let ct_part = self.content_types.part_name();
        self.package
            .create_part(ct_part, self.content_types.to_xml().into_bytes());
        if self.profile.format == DocumentFormat::Docx {
            for (owner, rels) in &self.relationships {
                let rels_part = rels_part_for(owner);
                if rels.entries().is_empty() && !self.package.contains(&rels_part) {
                    continue;
                }
                self.package
                    .create_part(&rels_part, rels.to_xml().into_bytes());
            }
        }
        debug!(
            "generation finished: {} image registrations, {} document insertions",
            self.image_cache.len(),
            self.document_cache.len()
        );
        Ok(self.package)
    }

    /// Whether the main part declares the plain document content type
    #[must_use]
    pub fn has_plain_main_content_type(&self) -> bool {
        self.content_types
            .override_for(self.profile.main_part)
            .is_some_and(|ct| ct == ooxml::MAIN_CONTENT_TYPE)
    }
}
