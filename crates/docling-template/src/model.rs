//! Hierarchical data model bound to a template
//!
//! A generation receives one [`Scope`] per output page. A scope maps
//! case-insensitive keys to [`Value`]s and names to [`Table`]s; each table row
//! is itself a scope. Keys are stored upper-cased.

use crate::error::{Result, TemplateError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of an image or foreign-document resource
///
/// Clones of a resource share its id, so binding the same resource to several
/// placeholders registers it once per generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    fn fresh() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// How line breaks in a text value are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineBreakMode {
    /// Replace each line break with a single space
    #[default]
    Space,
    /// Emit a structural line break
    Break,
}

/// How tabs in a text value are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TabMode {
    /// Replace each tab with this many spaces
    Spaces(u8),
    /// Emit a structural tab
    #[default]
    Tab,
}

/// Plain text with whitespace rendering options
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextValue {
    /// Raw text
    pub text: String,
    /// Line break rendering
    pub line_breaks: LineBreakMode,
    /// Tab rendering
    pub tabs: TabMode,
}

impl TextValue {
    /// Text with default whitespace handling
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Render line breaks structurally
    #[must_use]
    pub const fn with_line_breaks(mut self, mode: LineBreakMode) -> Self {
        self.line_breaks = mode;
        self
    }

    /// Set tab rendering
    #[must_use]
    pub const fn with_tabs(mut self, mode: TabMode) -> Self {
        self.tabs = mode;
        self
    }

    /// Whether any whitespace is rendered as structure
    #[inline]
    #[must_use]
    pub fn has_structure(&self) -> bool {
        self.line_breaks == LineBreakMode::Break || self.tabs == TabMode::Tab
    }
}

/// Image bytes or location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Bytes to embed
    Embedded(Arc<[u8]>),
    /// External location (URL or local path) to link to
    Linked(String),
}

/// Image format descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFormat {
    /// MIME type
    pub mime: String,
    /// File extension without dot
    pub extension: String,
}

impl ImageFormat {
    /// Descriptor from MIME type and extension
    pub fn new(mime: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            mime: mime.into(),
            extension: extension.into().trim_start_matches('.').to_lowercase(),
        }
    }

    /// Guess the descriptor from magic bytes
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        let format = image::guess_format(bytes).ok()?;
        let extension = format.extensions_str().first()?;
        Some(Self::new(format.to_mime_type(), *extension))
    }

    /// Guess the descriptor from a path or URL suffix
    #[must_use]
    pub fn from_location(location: &str) -> Option<Self> {
        let path = location.split(['?', '#']).next().unwrap_or(location);
        let ext = path.rsplit_once('.')?.1;
        let format = image::ImageFormat::from_extension(ext)?;
        Some(Self::new(format.to_mime_type(), ext))
    }
}

/// Image bound to a placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResource {
    id: ResourceId,
    /// Bytes or external location
    pub source: ImageSource,
    /// Format descriptor
    pub format: ImageFormat,
    /// Pixel size (width, height), used for newly placed pictures
    pub size_px: Option<(u32, u32)>,
    /// Title stored in the resource metadata
    pub title: Option<String>,
    /// Description stored in the resource metadata
    pub description: Option<String>,
    /// Caller-supplied title, wins over template and metadata
    pub caller_title: Option<String>,
    /// Caller-supplied description, wins over template and metadata
    pub caller_description: Option<String>,
    /// Replace the size of an existing template picture
    pub overwrite_size: bool,
}

impl ImageResource {
    /// Image from raw bytes; format and size are sniffed from the data
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a recognisable image.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<Self> {
        let bytes: Arc<[u8]> = bytes.into();
        let format = ImageFormat::sniff(&bytes).ok_or_else(|| {
            TemplateError::InvalidData("image bytes have no recognisable format".to_string())
        })?;
        let size_px = image::ImageReader::new(std::io::Cursor::new(&bytes[..]))
            .with_guessed_format()?
            .into_dimensions()
            .ok();
        Ok(Self::with_format(ImageSource::Embedded(bytes), format).with_size(size_px))
    }

    /// Image with an explicit format descriptor
    #[must_use]
    pub fn with_format(source: ImageSource, format: ImageFormat) -> Self {
        Self {
            id: ResourceId::fresh(),
            source,
            format,
            size_px: None,
            title: None,
            description: None,
            caller_title: None,
            caller_description: None,
            overwrite_size: false,
        }
    }

    /// Image linked to an external location
    #[must_use]
    pub fn linked(location: impl Into<String>) -> Self {
        let location = location.into();
        let format = ImageFormat::from_location(&location)
            .unwrap_or_else(|| ImageFormat::new("application/octet-stream", "bin"));
        Self::with_format(ImageSource::Linked(location), format)
    }

    /// Identity used for deduplication
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ResourceId {
        self.id
    }

    /// Set pixel size
    #[must_use]
    pub const fn with_size(mut self, size_px: Option<(u32, u32)>) -> Self {
        self.size_px = size_px;
        self
    }

    /// Set caller title and description
    #[must_use]
    pub fn with_caption(mut self, title: Option<String>, description: Option<String>) -> Self {
        self.caller_title = title;
        self.caller_description = description;
        self
    }

    /// Set metadata title and description
    #[must_use]
    pub fn with_metadata(mut self, title: Option<String>, description: Option<String>) -> Self {
        self.title = title;
        self.description = description;
        self
    }

    /// Replace the size of template pictures
    #[must_use]
    pub const fn with_overwrite_size(mut self, overwrite: bool) -> Self {
        self.overwrite_size = overwrite;
        self
    }
}

/// Foreign-document format descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentKind {
    /// Content type of the stored part
    pub mime: String,
    /// File extension without dot
    pub extension: String,
}

impl DocumentKind {
    /// Descriptor from content type and extension
    pub fn new(mime: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            mime: mime.into(),
            extension: extension.into().trim_start_matches('.').to_lowercase(),
        }
    }

    /// Descriptor for a well-known file extension
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        let mime = match ext.to_lowercase().as_str() {
            "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml",
            "odt" => "application/vnd.oasis.opendocument.text",
            "html" | "htm" => "text/html",
            "xhtml" => "application/xhtml+xml",
            "rtf" => "application/rtf",
            "txt" => "text/plain",
            _ => return None,
        };
        Some(Self::new(mime, ext))
    }
}

/// Foreign document spliced into the output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    id: ResourceId,
    /// Content and kind; `None` removes the splice point
    pub content: Option<(Arc<[u8]>, DocumentKind)>,
}

impl DocumentRef {
    /// Reference to a document
    pub fn new(bytes: impl Into<Arc<[u8]>>, kind: DocumentKind) -> Self {
        Self {
            id: ResourceId::fresh(),
            content: Some((bytes.into(), kind)),
        }
    }

    /// The "no document" reference
    #[must_use]
    pub fn none() -> Self {
        Self {
            id: ResourceId::fresh(),
            content: None,
        }
    }

    /// Identity used for deduplication
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ResourceId {
        self.id
    }
}

/// Paragraph-level directive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParagraphDirective {
    /// Keep the paragraph, drop the placeholder
    Keep,
    /// Delete the enclosing paragraph
    Remove,
    /// Hide the enclosing paragraph
    Hidden,
}

/// Table-level directive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableDirective {
    /// Keep the table, drop the placeholder
    Keep,
    /// Delete the enclosing table
    Remove,
}

/// Structural instruction carried by a placeholder value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Applies to the enclosing paragraph
    Paragraph(ParagraphDirective),
    /// Applies to the enclosing table
    Table(TableDirective),
}

impl std::str::FromStr for Directive {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "keep-paragraph" => Ok(Self::Paragraph(ParagraphDirective::Keep)),
            "remove-paragraph" => Ok(Self::Paragraph(ParagraphDirective::Remove)),
            "hide-paragraph" | "hidden-paragraph" => Ok(Self::Paragraph(ParagraphDirective::Hidden)),
            "keep-table" => Ok(Self::Table(TableDirective::Keep)),
            "remove-table" => Ok(Self::Table(TableDirective::Remove)),
            _ => Err(format!("unknown directive: '{s}'")),
        }
    }
}

/// Value bound to a placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Plain text
    Text(TextValue),
    /// Inline image
    Image(ImageResource),
    /// Foreign document
    Document(DocumentRef),
    /// Structural directive
    Directive(Directive),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(TextValue::new(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(TextValue::new(s))
    }
}

impl From<TextValue> for Value {
    fn from(t: TextValue) -> Self {
        Self::Text(t)
    }
}

impl From<ImageResource> for Value {
    fn from(i: ImageResource) -> Self {
        Self::Image(i)
    }
}

impl From<DocumentRef> for Value {
    fn from(d: DocumentRef) -> Self {
        Self::Document(d)
    }
}

impl From<Directive> for Value {
    fn from(d: Directive) -> Self {
        Self::Directive(d)
    }
}

/// Named, ordered row sequence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    name: String,
    rows: Vec<Scope>,
}

impl Table {
    /// Table name as given at build time
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rows in insertion order
    #[inline]
    #[must_use]
    pub fn rows(&self) -> &[Scope] {
        &self.rows
    }

    /// Append a row
    pub fn push_row(&mut self, row: Scope) {
        self.rows.push(row);
    }
}

/// One nesting level of the data model (page or row)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    values: HashMap<String, Value>,
    tables: HashMap<String, Table>,
}

fn normalize_key(key: &str, what: &str) -> Result<String> {
    if key.chars().count() < 2 {
        return Err(TemplateError::InvalidData(format!(
            "{what} '{key}' must have at least 2 characters"
        )));
    }
    if key.chars().any(char::is_whitespace) {
        return Err(TemplateError::InvalidData(format!(
            "{what} '{key}' must not contain whitespace"
        )));
    }
    Ok(key.to_uppercase())
}

impl Scope {
    /// Create an empty scope
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value to a key
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if the key is shorter than 2 characters, contains
    /// whitespace, or is already bound (case-insensitively).
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        let key = normalize_key(key, "key")?;
        if self.values.contains_key(&key) {
            return Err(TemplateError::InvalidData(format!("duplicate key '{key}'")));
        }
        self.values.insert(key, value.into());
        Ok(())
    }

    /// Builder form of [`Scope::insert`]
    ///
    /// # Errors
    ///
    /// See [`Scope::insert`].
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Result<Self> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Add a named table and return it for row insertion
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` for invalid or duplicate table names.
    pub fn add_table(&mut self, name: &str) -> Result<&mut Table> {
        let key = normalize_key(name, "table name")?;
        if self.tables.contains_key(&key) {
            return Err(TemplateError::InvalidData(format!(
                "duplicate table '{key}'"
            )));
        }
        Ok(self.tables.entry(key).or_insert_with(|| Table {
            name: name.to_string(),
            rows: Vec::new(),
        }))
    }

    /// Builder form adding a table with its rows
    ///
    /// # Errors
    ///
    /// See [`Scope::add_table`].
    pub fn with_table(mut self, name: &str, rows: Vec<Scope>) -> Result<Self> {
        let table = self.add_table(name)?;
        table.rows = rows;
        Ok(self)
    }

    /// Value bound to `key` in this scope only
    #[must_use]
    pub fn value_by_key(&self, key: &str) -> Option<&Value> {
        self.values.get(&key.to_uppercase())
    }

    /// Table named `name` in this scope only
    #[must_use]
    pub fn table_by_name(&self, name: &str) -> Option<&Table> {
        self.tables.get(&name.to_uppercase())
    }

    /// Whether the scope holds neither values nor tables
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.tables.is_empty()
    }
}

/// Active scope plus its enclosing scopes
///
/// Lookups try the innermost scope first, so a row can use values of its
/// page.
#[derive(Debug, Clone, Copy)]
pub struct ScopeChain<'a> {
    scope: &'a Scope,
    parent: Option<&'a ScopeChain<'a>>,
}

impl<'a> ScopeChain<'a> {
    /// Chain with a single (page) scope
    #[must_use]
    pub const fn root(scope: &'a Scope) -> Self {
        Self {
            scope,
            parent: None,
        }
    }

    /// Chain with `scope` nested inside `self`
    #[must_use]
    pub const fn push<'b>(&'b self, scope: &'b Scope) -> ScopeChain<'b>
    where
        'a: 'b,
    {
        ScopeChain {
            scope,
            parent: Some(self),
        }
    }

    /// Innermost scope
    #[inline]
    #[must_use]
    pub const fn current(&self) -> &'a Scope {
        self.scope
    }

    /// Resolve a key through the chain
    #[must_use]
    pub fn value_by_key(&self, key: &str) -> Option<&'a Value> {
        let key = key.to_uppercase();
        let mut chain = Some(self);
        while let Some(link) = chain {
            if let Some(v) = link.scope.values.get(&key) {
                return Some(v);
            }
            chain = link.parent;
        }
        None
    }

    /// Resolve a table name through the chain
    #[must_use]
    pub fn table_by_name(&self, name: &str) -> Option<&'a Table> {
        let name = name.to_uppercase();
        let mut chain = Some(self);
        while let Some(link) = chain {
            if let Some(t) = link.scope.tables.get(&name) {
                return Some(t);
            }
            chain = link.parent;
        }
        None
    }
}
