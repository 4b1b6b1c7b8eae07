//! Data pages from JSON
//!
//! The top level is either one page object or an array of page objects.
//! Within an object:
//!
//! - strings, numbers and booleans bind text
//! - `null` binds the "no document" reference (removes a document slot)
//! - an array of objects binds a table, one row scope per object
//! - `{"text": "...", "line_breaks": true, "tabs": 4}` binds formatted text
//! - `{"image": "logo.png", "title": ..., "description": ..., "width": 120,
//!   "height": 40, "link": false, "overwrite_size": false}` binds an image
//! - `{"document": "appendix.docx"}` binds a foreign document
//! - `{"directive": "remove-paragraph"}` binds a structural directive
//!
//! Relative paths are resolved against the data file's directory.

use crate::error::{Result, TemplateError};
use crate::model::{
    Directive, DocumentKind, DocumentRef, ImageResource, LineBreakMode, Scope, TabMode, TextValue,
    Value,
};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Parse JSON text into pages
///
/// # Errors
///
/// Returns `InvalidData` for malformed JSON or an unsupported shape, and I/O
/// errors for unreadable image or document files.
pub fn pages_from_str(json: &str, base_dir: Option<&Path>) -> Result<Vec<Scope>> {
    let value: JsonValue = serde_json::from_str(json)
        .map_err(|e| TemplateError::InvalidData(format!("malformed JSON: {e}")))?;
    pages_from_json(&value, base_dir)
}

/// Build pages from a JSON value
///
/// Every image or document file named more than once is loaded once and
/// shares one resource identity, so the package stores it once.
///
/// # Errors
///
/// See [`pages_from_str`].
pub fn pages_from_json(value: &JsonValue, base_dir: Option<&Path>) -> Result<Vec<Scope>> {
    let mut loader = Loader::new(base_dir);
    match value {
        JsonValue::Object(page) => Ok(vec![loader.scope(page)?]),
        JsonValue::Array(pages) => pages
            .iter()
            .enumerate()
            .map(|(i, page)| match page {
                JsonValue::Object(page) => loader.scope(page),
                _ => Err(TemplateError::InvalidData(format!(
                    "page {} is not an object",
                    i + 1
                ))),
            })
            .collect(),
        _ => Err(TemplateError::InvalidData(
            "data must be an object or an array of objects".to_string(),
        )),
    }
}

/// Build one scope from a JSON object
///
/// # Errors
///
/// See [`pages_from_str`].
pub fn scope_from_json(object: &Map<String, JsonValue>, base_dir: Option<&Path>) -> Result<Scope> {
    Loader::new(base_dir).scope(object)
}

/// Resolved location of an image file or link
#[derive(Debug, Hash, PartialEq, Eq)]
enum Location {
    Linked(String),
    File(PathBuf),
}

struct Loader<'a> {
    base_dir: Option<&'a Path>,
    images: HashMap<Location, ImageResource>,
    documents: HashMap<PathBuf, DocumentRef>,
}

impl<'a> Loader<'a> {
    fn new(base_dir: Option<&'a Path>) -> Self {
        Self {
            base_dir,
            images: HashMap::new(),
            documents: HashMap::new(),
        }
    }

    fn scope(&mut self, object: &Map<String, JsonValue>) -> Result<Scope> {
        let mut scope = Scope::new();
        for (key, value) in object {
            self.bind(&mut scope, key, value)?;
        }
        Ok(scope)
    }

    fn bind(&mut self, scope: &mut Scope, key: &str, value: &JsonValue) -> Result<()> {
        match value {
            JsonValue::String(s) => scope.insert(key, s.as_str()),
            JsonValue::Number(n) => scope.insert(key, n.to_string()),
            JsonValue::Bool(b) => scope.insert(key, b.to_string()),
            JsonValue::Null => scope.insert(key, DocumentRef::none()),
            JsonValue::Array(items) => {
                let rows = items
                    .iter()
                    .map(|item| match item {
                        JsonValue::Object(row) => self.scope(row),
                        _ => Err(TemplateError::InvalidData(format!(
                            "rows of table '{key}' must be objects"
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                let table = scope.add_table(key)?;
                for row in rows {
                    table.push_row(row);
                }
                Ok(())
            }
            JsonValue::Object(typed) => {
                let value = self.typed_value(key, typed)?;
                scope.insert(key, value)
            }
        }
    }

    fn typed_value(&mut self, key: &str, typed: &Map<String, JsonValue>) -> Result<Value> {
        if let Some(location) = typed.get("image") {
            return self.image_value(key, location, typed).map(Value::from);
        }
        if let Some(location) = typed.get("document") {
            return self.document_value(key, location).map(Value::from);
        }
        if let Some(name) = typed.get("directive") {
            let name = name.as_str().ok_or_else(|| {
                TemplateError::InvalidData(format!("directive of '{key}' must be a string"))
            })?;
            return name
                .parse::<Directive>()
                .map(Value::from)
                .map_err(TemplateError::InvalidData);
        }
        if let Some(text) = typed.get("text") {
            return text_value(key, text, typed).map(Value::from);
        }
        Err(TemplateError::InvalidData(format!(
            "object bound to '{key}' needs one of: image, document, directive, text"
        )))
    }

    fn image_value(
        &mut self,
        key: &str,
        location: &JsonValue,
        typed: &Map<String, JsonValue>,
    ) -> Result<ImageResource> {
        let location = location.as_str().ok_or_else(|| {
            TemplateError::InvalidData(format!("image of '{key}' must be a path or URL"))
        })?;
        let is_url = location.contains("://");
        let link = typed
            .get("link")
            .and_then(JsonValue::as_bool)
            .unwrap_or(is_url);

        let source = if link && is_url {
            Location::Linked(location.to_string())
        } else if link {
            Location::Linked(resolve_path(self.base_dir, location).to_string_lossy().into_owned())
        } else {
            Location::File(resolve_path(self.base_dir, location))
        };
        let image = match self.images.get(&source) {
            Some(cached) => cached.clone(),
            None => {
                let loaded = match &source {
                    Location::File(path) => ImageResource::from_bytes(std::fs::read(path)?)?,
                    Location::Linked(target) => ImageResource::linked(target.clone()),
                };
                self.images.insert(source, loaded.clone());
                loaded
            }
        };

        let dimension = |name: &str| {
            typed
                .get(name)
                .and_then(JsonValue::as_u64)
                .and_then(|v| u32::try_from(v).ok())
        };
        let image = match (dimension("width"), dimension("height")) {
            (Some(w), Some(h)) => image.with_size(Some((w, h))),
            _ => image,
        };
        let caption = |name: &str| typed.get(name).and_then(JsonValue::as_str).map(str::to_string);
        Ok(image
            .with_caption(caption("title"), caption("description"))
            .with_overwrite_size(
                typed
                    .get("overwrite_size")
                    .and_then(JsonValue::as_bool)
                    .unwrap_or(false),
            ))
    }

    fn document_value(&mut self, key: &str, location: &JsonValue) -> Result<DocumentRef> {
        let location = match location {
            JsonValue::Null => return Ok(DocumentRef::none()),
            JsonValue::String(s) => s,
            _ => {
                return Err(TemplateError::InvalidData(format!(
                    "document of '{key}' must be a path or null"
                )))
            }
        };
        let path = resolve_path(self.base_dir, location);
        if let Some(cached) = self.documents.get(&path) {
            return Ok(cached.clone());
        }
        let kind = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(DocumentKind::from_extension)
            .ok_or_else(|| {
                TemplateError::InvalidData(format!("unsupported document type: {location}"))
            })?;
        let document = DocumentRef::new(std::fs::read(&path)?, kind);
        self.documents.insert(path, document.clone());
        Ok(document)
    }
}

fn text_value(key: &str, text: &JsonValue, typed: &Map<String, JsonValue>) -> Result<TextValue> {
    let text = match text {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    };
    let line_breaks = match typed.get("line_breaks").and_then(JsonValue::as_bool) {
        Some(true) => LineBreakMode::Break,
        _ => LineBreakMode::Space,
    };
    let tabs = match typed.get("tabs") {
        None | Some(JsonValue::Bool(true)) => TabMode::Tab,
        Some(JsonValue::Number(n)) => n
            .as_u64()
            .and_then(|n| u8::try_from(n).ok())
            .map(TabMode::Spaces)
            .ok_or_else(|| {
                TemplateError::InvalidData(format!("tab width of '{key}' must be 0-255"))
            })?,
        Some(JsonValue::Bool(false)) => TabMode::Spaces(1),
        Some(_) => {
            return Err(TemplateError::InvalidData(format!(
                "tabs of '{key}' must be a boolean or a width"
            )))
        }
    };
    Ok(TextValue::new(text).with_line_breaks(line_breaks).with_tabs(tabs))
}

fn resolve_path(base_dir: Option<&Path>, location: &str) -> PathBuf {
    let path = Path::new(location);
    match base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    }
}
