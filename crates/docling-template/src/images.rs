//! Image registration and picture markup
//!
//! Registration is idempotent per resource identity: the first call for a
//! resource writes the media part (or decides to link), records the
//! relationship and content type, and caches the outcome; later calls return
//! the cached registration without touching the package again.

use crate::error::Result;
use crate::format::{ooxml, DocumentFormat};
use crate::intercept::InterceptContext;
use crate::manifest::relative_target;
use crate::model::{ImageResource, ImageSource, ScopeChain, Value};
use crate::placeholder::Placeholder;
use crate::session::{ImageRegistration, PartTree, Session};
use crate::xml::NodeId;
use log::{debug, warn};
use quick_xml::escape::escape;

/// Size used for new pictures when the resource has none (pixels)
pub const DEFAULT_SIZE_PX: (u32, u32) = (96, 96);

/// English Metric Units per pixel at 96 DPI
pub const EMU_PER_PX: u64 = 9525;

const NS_WP: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_PIC: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";
const NS_V: &str = "urn:schemas-microsoft-com:vml";
const NS_O: &str = "urn:schemas-microsoft-com:office:office";
const NS_DRAW: &str = "urn:oasis:names:tc:opendocument:xmlns:drawing:1.0";
const NS_SVG: &str = "urn:oasis:names:tc:opendocument:xmlns:svg-compatible:1.0";
const NS_XLINK: &str = "http://www.w3.org/1999/xlink";
const NS_TEXT: &str = "urn:oasis:names:tc:opendocument:xmlns:text:1.0";

/// Register `image` for use from `owner`
///
/// # Errors
///
/// Returns an error if a manifest cannot be updated.
pub fn register(
    session: &mut Session<'_>,
    owner: &str,
    image: &ImageResource,
) -> Result<ImageRegistration> {
    let profile = session.profile();
    // ODT references are package paths, valid from every part
    let cache_owner = match profile.format {
        DocumentFormat::Docx => owner.to_string(),
        DocumentFormat::Odt => String::new(),
    };
    let cache_key = (cache_owner, image.id());
    if let Some(hit) = session.image_cache.get(&cache_key) {
        return Ok(hit.clone());
    }

    let (mime, extension) =
        match profile.negotiate_image(&image.format.mime, &image.format.extension) {
            Some(t) => (t.mime.to_string(), t.extension.to_string()),
            None => (image.format.mime.clone(), image.format.extension.clone()),
        };
    let registration = match &image.source {
        ImageSource::Embedded(bytes) => embed(session, owner, image, bytes, &mime, &extension)?,
        ImageSource::Linked(location) => {
            let local = if session.options.embed_external_images {
                read_local(location)
            } else {
                None
            };
            match local {
                Some(bytes) => embed(session, owner, image, &bytes, &mime, &extension)?,
                None => link(session, owner, location, &mime, &extension)?,
            }
        }
    };
    session.image_cache.insert(cache_key, registration.clone());
    Ok(registration)
}

fn read_local(location: &str) -> Option<Vec<u8>> {
    if ["http://", "https://", "ftp://"]
        .iter()
        .any(|scheme| location.starts_with(scheme))
    {
        warn!("cannot embed remote image {location}; linking instead");
        return None;
    }
    let path = location.strip_prefix("file://").unwrap_or(location);
    match std::fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!("cannot read image {path}: {e}; linking instead");
            None
        }
    }
}

fn embed(
    session: &mut Session<'_>,
    owner: &str,
    image: &ImageResource,
    bytes: &[u8],
    mime: &str,
    extension: &str,
) -> Result<ImageRegistration> {
    let profile = session.profile();
    let part = match session.media_parts.get(&image.id()) {
        Some(existing) => existing.clone(),
        None => {
            let name = session.unique_part_name(profile.media_dir, "docling_image", extension);
            session.package.create_part(&name, bytes.to_vec());
            session.content_types.register_part(&name, extension, mime)?;
            session.media_parts.insert(image.id(), name.clone());
            debug!("embedded image {name} ({} bytes)", bytes.len());
            name
        }
    };
    let reference = match profile.format {
        DocumentFormat::Docx => {
            let target = relative_target(owner, &part);
            session
                .relationships(owner)?
                .ensure(ooxml::REL_IMAGE, &target, false)
        }
        DocumentFormat::Odt => part,
    };
    Ok(ImageRegistration {
        reference,
        external: false,
        mime: mime.to_string(),
    })
}

fn link(
    session: &mut Session<'_>,
    owner: &str,
    location: &str,
    mime: &str,
    extension: &str,
) -> Result<ImageRegistration> {
    let reference = match session.profile().format {
        DocumentFormat::Docx => {
            session.content_types.add_default(extension, mime)?;
            session
                .relationships(owner)?
                .ensure(ooxml::REL_IMAGE, location, true)
        }
        DocumentFormat::Odt => location.to_string(),
    };
    debug!("linked image {location}");
    Ok(ImageRegistration {
        reference,
        external: true,
        mime: mime.to_string(),
    })
}

fn emu(px: u32) -> u64 {
    u64::from(px) * EMU_PER_PX
}

fn centimetres(px: u32) -> String {
    format!("{:.3}cm", f64::from(px) * 2.54 / 96.0)
}

/// Replace a placeholder with a new picture
///
/// # Errors
///
/// Returns an error if registration or markup construction fails.
pub fn place(
    session: &mut Session<'_>,
    part: &mut PartTree,
    ph: &Placeholder,
    image: &ImageResource,
) -> Result<()> {
    let registration = register(session, &part.name, image)?;
    let (width, height) = image.size_px.unwrap_or(DEFAULT_SIZE_PX);
    let title = image
        .caller_title
        .clone()
        .or_else(|| image.title.clone())
        .unwrap_or_default();
    let description = image
        .caller_description
        .clone()
        .or_else(|| image.description.clone())
        .unwrap_or_default();
    let id = session.next_drawing_id();

    let picture = match session.profile().format {
        DocumentFormat::Docx => {
            let attr = if registration.external { "r:link" } else { "r:embed" };
            let xml = if session.options.prefer_modern_picture_element {
                drawing_xml(id, &registration.reference, attr, (width, height), &title, &description)
            } else {
                vml_xml(id, &registration.reference, (width, height), &title, &description)
            };
            let drawing = part.tree.parse_fragment(&xml)?;
            let run = part.tree.new_element(session.profile().run);
            if let Some(props) = ph.run_props {
                let copy = part.tree.deep_clone(props);
                part.tree.append_child(run, copy);
            }
            part.tree.append_child(run, drawing);
            run
        }
        DocumentFormat::Odt => {
            let xml = frame_xml(id, &registration.reference, (width, height), &title, &description);
            part.tree.parse_fragment(&xml)?
        }
    };
    part.tree.insert_before(ph.anchor, picture);
    ph.remove(&mut part.tree);
    Ok(())
}

fn drawing_xml(
    id: u32,
    reference: &str,
    attr: &str,
    (width, height): (u32, u32),
    title: &str,
    description: &str,
) -> String {
    let (cx, cy) = (emu(width), emu(height));
    let reference = escape(reference);
    let title = escape(title);
    let description = escape(description);
    let ns_r = ooxml::NS_R;
    format!(
        concat!(
            r#"<w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0" xmlns:wp="{NS_WP}">"#,
            r#"<wp:extent cx="{cx}" cy="{cy}"/>"#,
            r#"<wp:docPr id="{id}" name="Picture {id}" descr="{description}" title="{title}"/>"#,
            r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a="{NS_A}" noChangeAspect="1"/></wp:cNvGraphicFramePr>"#,
            r#"<a:graphic xmlns:a="{NS_A}"><a:graphicData uri="{NS_PIC}">"#,
            r#"<pic:pic xmlns:pic="{NS_PIC}"><pic:nvPicPr><pic:cNvPr id="{id}" name="Picture {id}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip {attr}="{reference}" xmlns:r="{ns_r}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
            r#"</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing>"#
        ),
        NS_WP = NS_WP,
        NS_A = NS_A,
        NS_PIC = NS_PIC,
        cx = cx,
        cy = cy,
        id = id,
        description = description,
        title = title,
        attr = attr,
        reference = reference,
        ns_r = ns_r,
    )
}

fn vml_xml(
    id: u32,
    reference: &str,
    (width, height): (u32, u32),
    title: &str,
    description: &str,
) -> String {
    let width_pt = f64::from(width) * 0.75;
    let height_pt = f64::from(height) * 0.75;
    format!(
        concat!(
            r##"<w:pict><v:shape xmlns:v="{NS_V}" id="docling_image{id}" type="#_x0000_t75" "##,
            r#"style="width:{w}pt;height:{h}pt" alt="{description}">"#,
            r#"<v:imagedata xmlns:r="{ns_r}" xmlns:o="{NS_O}" r:id="{reference}" o:title="{title}"/>"#,
            r#"</v:shape></w:pict>"#
        ),
        NS_V = NS_V,
        NS_O = NS_O,
        ns_r = ooxml::NS_R,
        id = id,
        w = width_pt,
        h = height_pt,
        description = escape(description),
        reference = escape(reference),
        title = escape(title),
    )
}

fn frame_xml(
    id: u32,
    reference: &str,
    (width, height): (u32, u32),
    title: &str,
    description: &str,
) -> String {
    let mut xml = format!(
        concat!(
            r#"<draw:frame xmlns:draw="{NS_DRAW}" xmlns:svg="{NS_SVG}" xmlns:xlink="{NS_XLINK}" xmlns:text="{NS_TEXT}" "#,
            r#"draw:name="docling_image{id}" text:anchor-type="as-char" svg:width="{w}" svg:height="{h}">"#,
            r#"<draw:image xlink:href="{reference}" xlink:type="simple" xlink:show="embed" xlink:actuate="onLoad"/>"#
        ),
        NS_DRAW = NS_DRAW,
        NS_SVG = NS_SVG,
        NS_XLINK = NS_XLINK,
        NS_TEXT = NS_TEXT,
        id = id,
        w = centimetres(width),
        h = centimetres(height),
        reference = escape(reference),
    );
    if !title.is_empty() {
        xml.push_str(&format!("<svg:title>{}</svg:title>", escape(title)));
    }
    if !description.is_empty() {
        xml.push_str(&format!("<svg:desc>{}</svg:desc>", escape(description)));
    }
    xml.push_str("</draw:frame>");
    xml
}

/// Swap the image of a template picture whose description names an image key
///
/// Returns `false` when `node` is not such a picture, leaving it for the
/// regular walk.
///
/// # Errors
///
/// Returns an error if interception or registration fails.
pub fn swap_template_picture(
    session: &mut Session<'_>,
    part: &mut PartTree,
    node: NodeId,
    scopes: &ScopeChain<'_>,
) -> Result<bool> {
    let format = session.profile().format;
    let holder = match format {
        DocumentFormat::Docx if part.tree.is_named(node, "w:drawing") => part
            .tree
            .descendants_named(node, "wp:docPr")
            .into_iter()
            .next(),
        DocumentFormat::Odt if part.tree.is_named(node, "draw:frame") => {
            part.tree.first_child_named(node, "svg:desc")
        }
        _ => None,
    };
    let Some(holder) = holder else {
        return Ok(false);
    };
    let description = match format {
        DocumentFormat::Docx => part.tree.attr(holder, "descr").unwrap_or_default().to_string(),
        DocumentFormat::Odt => part.tree.text_content(holder),
    };
    let key = description.trim().to_uppercase();
    if key.is_empty() {
        return Ok(false);
    }
    let Some(value) = scopes.value_by_key(&key) else {
        return Ok(false);
    };
    let ctx = InterceptContext {
        key: &key,
        instruction: &description,
        format,
        part: &part.name,
        round: 0,
    };
    let Value::Image(image) = session.interceptors.apply(value, ctx, session.options)? else {
        return Ok(false);
    };

    let registration = register(session, &part.name, &image)?;
    match format {
        DocumentFormat::Docx => swap_docx(part, node, holder, &image, &registration),
        DocumentFormat::Odt => swap_odt(part, node, holder, &image, &registration),
    }
    debug!("swapped template picture {key}");
    Ok(true)
}

fn swap_docx(
    part: &mut PartTree,
    drawing: NodeId,
    doc_pr: NodeId,
    image: &ImageResource,
    registration: &ImageRegistration,
) {
    let tree = &mut part.tree;
    for blip in tree.descendants_named(drawing, "a:blip") {
        tree.remove_attr(blip, "r:embed");
        tree.remove_attr(blip, "r:link");
        let attr = if registration.external { "r:link" } else { "r:embed" };
        tree.set_attr(blip, attr, &registration.reference);
    }
    if image.overwrite_size {
        if let Some((width, height)) = image.size_px {
            let (cx, cy) = (emu(width).to_string(), emu(height).to_string());
            let extents = tree
                .descendants_named(drawing, "wp:extent")
                .into_iter()
                .chain(tree.descendants_named(drawing, "a:ext"));
            for extent in extents.collect::<Vec<_>>() {
                tree.set_attr(extent, "cx", &cx);
                tree.set_attr(extent, "cy", &cy);
            }
        }
    }
    // The template description held the key, so only the template title counts
    let title = image
        .caller_title
        .clone()
        .or_else(|| tree.attr(doc_pr, "title").map(str::to_string).filter(|t| !t.is_empty()))
        .or_else(|| image.title.clone());
    let description = image
        .caller_description
        .clone()
        .or_else(|| image.description.clone())
        .unwrap_or_default();
    tree.set_attr(doc_pr, "descr", &description);
    if let Some(title) = title {
        tree.set_attr(doc_pr, "title", &title);
    }
}

fn swap_odt(
    part: &mut PartTree,
    frame: NodeId,
    desc: NodeId,
    image: &ImageResource,
    registration: &ImageRegistration,
) {
    let tree = &mut part.tree;
    if let Some(target) = tree.first_child_named(frame, "draw:image") {
        tree.set_attr(target, "xlink:href", &registration.reference);
    }
    if image.overwrite_size {
        if let Some((width, height)) = image.size_px {
            tree.set_attr(frame, "svg:width", &centimetres(width));
            tree.set_attr(frame, "svg:height", &centimetres(height));
        }
    }
    let existing_title = tree
        .first_child_named(frame, "svg:title")
        .map(|t| tree.text_content(t))
        .filter(|t| !t.is_empty());
    let title = image
        .caller_title
        .clone()
        .or(existing_title)
        .or_else(|| image.title.clone());
    if let Some(title) = title {
        let node = match tree.first_child_named(frame, "svg:title") {
            Some(n) => n,
            None => {
                let n = tree.new_element("svg:title");
                tree.insert_before(desc, n);
                n
            }
        };
        tree.set_text(node, &title);
    }
    match image
        .caller_description
        .clone()
        .or_else(|| image.description.clone())
    {
        Some(description) => tree.set_text(desc, &description),
        None => tree.detach(desc),
    }
}
