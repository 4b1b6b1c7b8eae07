//! Placeholder resolution
//!
//! The walk visits a subtree in document order. Tables go to the table
//! expander, placeholders are looked up in the scope chain, passed through
//! the interception chain and dispatched by value kind; everything else is
//! descended into. Children removed while an earlier sibling was processed
//! are skipped.

use crate::directive;
use crate::error::{Result, TemplateError};
use crate::foreign;
use crate::format::FormatProfile;
use crate::images;
use crate::intercept::InterceptContext;
use crate::markup;
use crate::model::{ScopeChain, TextValue, Value};
use crate::placeholder::{self, Placeholder};
use crate::session::{PartTree, Session};
use crate::table;
use crate::xml::{NodeId, XmlTree};
use log::{debug, trace};

/// Resolve `node` and its subtree against `scopes`
///
/// # Errors
///
/// Propagates the first placeholder, interception, image or document error.
pub fn resolve_node(
    session: &mut Session<'_>,
    part: &mut PartTree,
    node: NodeId,
    scopes: &ScopeChain<'_>,
) -> Result<()> {
    let profile = session.profile();
    if part.tree.is_named(node, profile.table) {
        return table::expand(session, part, node, scopes);
    }
    if let Some(ph) = placeholder::detect(profile, &part.tree, node) {
        return resolve_placeholder(session, part, &ph, scopes);
    }
    if images::swap_template_picture(session, part, node, scopes)? {
        return Ok(());
    }
    resolve_children(session, part, node, scopes)
}

/// Resolve every child of `node` that is still attached when reached
///
/// # Errors
///
/// See [`resolve_node`].
pub fn resolve_children(
    session: &mut Session<'_>,
    part: &mut PartTree,
    node: NodeId,
    scopes: &ScopeChain<'_>,
) -> Result<()> {
    let children = part.tree.children(node).to_vec();
    for child in children {
        if part.tree.element(child).is_none() || !part.tree.is_attached(child) {
            continue;
        }
        resolve_node(session, part, child, scopes)?;
    }
    Ok(())
}

/// Look up, intercept and apply the value of one placeholder
///
/// # Errors
///
/// `PlaceholderMissing` when the key is unbound, the missing-value policy
/// is strict and the instruction has no field syntax; otherwise whatever
/// applying the value raises.
pub fn resolve_placeholder(
    session: &mut Session<'_>,
    part: &mut PartTree,
    ph: &Placeholder,
    scopes: &ScopeChain<'_>,
) -> Result<()> {
    let options = session.options;
    let Some(value) = scopes.value_by_key(&ph.key) else {
        if options.has_field_syntax(&ph.instruction) {
            trace!("leaving unrelated field {:?}", ph.instruction);
            return Ok(());
        }
        if options.ignore_missing_value {
            debug!("no value for {}; placeholder removed", ph.key);
            ph.remove(&mut part.tree);
            return Ok(());
        }
        return Err(TemplateError::PlaceholderMissing {
            key: ph.key.clone(),
            instruction: ph.instruction.clone(),
        });
    };

    let ctx = InterceptContext {
        key: &ph.key,
        instruction: &ph.instruction,
        format: session.profile.format,
        part: &part.name,
        round: 0,
    };
    let value = session.interceptors.apply(value, ctx, options)?;
    apply_value(session, part, ph, &value)
}

/// Apply a settled value at a placeholder
///
/// # Errors
///
/// See [`resolve_placeholder`].
pub fn apply_value(
    session: &mut Session<'_>,
    part: &mut PartTree,
    ph: &Placeholder,
    value: &Value,
) -> Result<()> {
    match value {
        Value::Text(text) => emit_text(session.profile, &mut part.tree, ph, text),
        Value::Image(image) => images::place(session, part, ph, image),
        Value::Document(document) => {
            foreign::insert(session, part, ph.anchor, document, &ph.key)?;
            ph.remove(&mut part.tree);
            Ok(())
        }
        Value::Directive(d) => {
            if directive::apply(session.profile, &mut part.tree, ph, *d) {
                Ok(())
            } else {
                trace!("directive {d:?} not applicable at {}; emitting empty text", ph.key);
                emit_text(session.profile, &mut part.tree, ph, &TextValue::default())
            }
        }
    }
}

/// Replace a placeholder with rendered text
///
/// # Errors
///
/// Returns `UnknownFormattingCharacter` for unrenderable control characters.
pub fn emit_text(
    profile: &FormatProfile,
    tree: &mut XmlTree,
    ph: &Placeholder,
    text: &TextValue,
) -> Result<()> {
    let segments = markup::segments(&ph.key, text)?;
    let nodes = if ph.in_field_code {
        vec![markup::instruction_run(tree, &segments, ph.run_props)]
    } else {
        markup::text_nodes(profile, tree, &segments, ph.run_props)
    };
    for node in nodes {
        tree.insert_before(ph.anchor, node);
    }
    ph.remove(tree);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::DocumentFormat;
    use crate::intercept::{Interception, InterceptorChain};
    use crate::model::Scope;
    use crate::options::TemplateOptions;
    use crate::package::Package;

    fn package() -> Package {
        let mut pkg = Package::new();
        pkg.create_part(
            "[Content_Types].xml",
            br#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#
                .to_vec(),
        );
        pkg
    }

    fn part(body: &str) -> PartTree {
        PartTree {
            name: "word/document.xml".to_string(),
            tree: XmlTree::parse(&format!(
                r#"<w:document xmlns:w="urn:w"><w:body>{body}</w:body></w:document>"#
            ))
            .unwrap(),
        }
    }

    fn field(instr: &str) -> String {
        format!(
            r#"<w:r><w:fldChar w:fldCharType="begin"/></w:r><w:r><w:instrText>{instr}</w:instrText></w:r><w:r><w:fldChar w:fldCharType="end"/></w:r>"#
        )
    }

    fn run(
        options: &TemplateOptions,
        chain: &InterceptorChain,
        body: &str,
        page: &Scope,
    ) -> Result<String> {
        let mut session = Session::new(DocumentFormat::Docx, options, chain, package())?;
        let mut part = part(body);
        let root = part.tree.root_element().unwrap();
        resolve_node(&mut session, &mut part, root, &ScopeChain::root(page))?;
        Ok(part.tree.to_xml())
    }

    #[test]
    fn test_text_replaces_field() {
        let body = format!("<w:p><w:r><w:t>Hello </w:t></w:r>{}</w:p>", field(" MERGEFIELD NAME "));
        let page = Scope::new().with("name", "Ada").unwrap();
        let out = run(&TemplateOptions::default(), &InterceptorChain::new(), &body, &page).unwrap();
        assert!(out.contains(r#"<w:t>Hello </w:t></w:r><w:r><w:t xml:space="preserve">Ada</w:t></w:r></w:p>"#));
        assert!(!out.contains("fldChar"));
    }

    #[test]
    fn test_missing_value_policies() {
        let body = format!("<w:p>{}</w:p>", field(" MERGEFIELD NAME "));
        let strict = run(&TemplateOptions::default(), &InterceptorChain::new(), &body, &Scope::new());
        assert!(matches!(
            strict,
            Err(TemplateError::PlaceholderMissing { ref key, .. }) if key == "NAME"
        ));

        let lenient = TemplateOptions::default().with_ignore_missing_value(true);
        let out = run(&lenient, &InterceptorChain::new(), &body, &Scope::new()).unwrap();
        assert!(out.contains("<w:p/>"));
    }

    #[test]
    fn test_unrelated_field_is_left_alone() {
        let body = format!("<w:p>{}</w:p>", field(" PAGE \\* MERGEFORMAT "));
        let out = run(&TemplateOptions::default(), &InterceptorChain::new(), &body, &Scope::new())
            .unwrap();
        assert!(out.contains("PAGE \\* MERGEFORMAT"));
    }

    #[test]
    fn test_interceptor_sees_key_and_part() {
        let mut chain = InterceptorChain::new();
        chain.push(|v: &Value, c: &InterceptContext<'_>| match v {
            Value::Text(t) if c.part == "word/document.xml" && t.text == "ada" => {
                Interception::Replace(Value::from(format!("{}={}", c.key, "Ada")))
            }
            _ => Interception::Unchanged,
        });
        let body = format!("<w:p>{}</w:p>", field(" MERGEFIELD NAME "));
        let page = Scope::new().with("NAME", "ada").unwrap();
        let out = run(&TemplateOptions::default(), &chain, &body, &page).unwrap();
        assert!(out.contains(">NAME=Ada<"));
    }

    #[test]
    fn test_directive_outside_table_falls_back_to_empty_text() {
        let body = format!("<w:p><w:r><w:t>x</w:t></w:r>{}</w:p>", field(" MERGEFIELD DROP "));
        let page = Scope::new()
            .with("DROP", crate::model::Directive::Table(crate::model::TableDirective::Remove))
            .unwrap();
        let out = run(&TemplateOptions::default(), &InterceptorChain::new(), &body, &page).unwrap();
        assert!(out.contains("<w:p><w:r><w:t>x</w:t></w:r></w:p>"));
    }
}
