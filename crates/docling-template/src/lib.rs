//! Template filling for DOCX and ODT documents
//!
//! `docling-template` fills word-processing templates with hierarchical data.
//! A template is an ordinary document whose field codes (DOCX `MERGEFIELD` /
//! `DOCVARIABLE` fields, ODT user fields and placeholders) name keys of the
//! data model. Generation produces one page per data scope and concatenates
//! them into a single document.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                           Template                            │
//! │  (package copy, version check, page loop, headers/footers)    │
//! └───────────────────────────────────────────────────────────────┘
//!                                 │
//!                                 ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │  Field Normalizer ──▶ Placeholder Resolver ──▶ interceptors   │
//! └───────────────────────────────────────────────────────────────┘
//!        │                 │                │               │
//!        ▼                 ▼                ▼               ▼
//! ┌─────────────┐  ┌──────────────┐  ┌────────────┐  ┌────────────┐
//! │ Table       │  │ Image        │  │ Foreign    │  │ Directive  │
//! │ Expander    │  │ Registrar    │  │ Documents  │  │ Handler    │
//! └─────────────┘  └──────────────┘  └────────────┘  └────────────┘
//!                          │                │
//!                          ▼                ▼
//!               relationship / content-type manifests
//! ```
//!
//! # Supported Formats
//!
//! | Format | Main part | Manifest | Placeholders |
//! |--------|-----------|----------|--------------|
//! | DOCX | `word/document.xml` | `[Content_Types].xml` + `*.rels` | `MERGEFIELD`, `DOCVARIABLE`, `DOCPROPERTY` |
//! | ODT | `content.xml` | `META-INF/manifest.xml` | user fields, variables, database fields, placeholders |
//!
//! # Usage
//!
//! ```ignore
//! use docling_template::{Scope, Template};
//!
//! let template = Template::from_file("letter.docx")?;
//! let page = Scope::new()
//!     .with("NAME", "Ada")?
//!     .with_table("ITEMS", vec![Scope::new().with("QTY", "1")?])?;
//! let bytes = template.generate(&[page])?;
//! std::fs::write("letter-out.docx", bytes)?;
//! # Ok::<(), docling_template::TemplateError>(())
//! ```
//!
//! Values can be rewritten per placeholder by interceptors, and
//! [`Template::generate_with`] exposes the output parts to a final hook
//! before the package is written.

pub mod directive;
pub mod engine;
pub mod error;
pub mod foreign;
pub mod format;
pub mod images;
pub mod intercept;
pub mod json;
pub mod manifest;
pub mod markup;
pub mod model;
pub mod normalize;
pub mod options;
pub mod package;
pub mod placeholder;
pub mod resolve;
pub mod session;
pub mod table;
pub mod xml;

pub use engine::{fill_template, GenerationContext, Template};
pub use error::{Result, TemplateError};
pub use format::DocumentFormat;
pub use intercept::{InterceptContext, Interception, Interceptor, InterceptorChain};
pub use json::{pages_from_json, pages_from_str};
pub use model::{
    Directive, DocumentKind, DocumentRef, ImageFormat, ImageResource, ImageSource, LineBreakMode,
    ParagraphDirective, ResourceId, Scope, ScopeChain, TabMode, Table, TableDirective, TextValue,
    Value,
};
pub use options::TemplateOptions;
pub use package::Package;
