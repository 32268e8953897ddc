// ABOUTME: Hardened XML reader that turns untrusted feed text into an owned element tree.
// ABOUTME: Rejects DTDs, oversized input, undefined entities and structurally broken documents.

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

use crate::error::FeedError;

/// Maximum number of characters accepted by [`parse_document`].
pub const MAX_DOCUMENT_CHARS: usize = 5_000_000;

/// An attribute with its namespace resolved against the element's scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub prefix: Option<String>,
    pub local_name: String,
    pub namespace: Option<String>,
    pub value: String,
}

/// A child of an element. CDATA sections are folded into `Text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element with its resolved namespace, attributes and children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub prefix: Option<String>,
    pub local_name: String,
    pub namespace: Option<String>,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

impl Element {
    /// Iterates over child elements, skipping text nodes.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// First child element with the given local name, regardless of namespace.
    pub fn child(&self, local_name: &str) -> Option<&Element> {
        self.elements().find(|el| el.local_name == local_name)
    }

    /// Trimmed text of the first child element with the given local name.
    /// Returns `None` when the child is missing or its text is blank.
    pub fn child_text(&self, local_name: &str) -> Option<String> {
        self.child(local_name)
            .map(|el| el.text().trim().to_string())
            .filter(|text| !text.is_empty())
    }

    /// Value of the first attribute with the given local name.
    pub fn attr(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.local_name == local_name)
            .map(|a| a.value.as_str())
    }

    /// Concatenated text of this element and all of its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Elements with the given local name, in document order.
    /// Matches are not searched for inside other matches.
    pub fn descendants_named<'a>(&'a self, local_name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        collect_named(self, local_name, &mut found);
        found
    }
}

fn collect_text(el: &Element, out: &mut String) {
    for node in &el.children {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(child) => collect_text(child, out),
        }
    }
}

fn collect_named<'a>(el: &'a Element, local_name: &str, found: &mut Vec<&'a Element>) {
    for child in el.elements() {
        if child.local_name == local_name {
            found.push(child);
        } else {
            collect_named(child, local_name, found);
        }
    }
}

/// A parsed, well-formed XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    root: Element,
}

impl Document {
    pub fn root(&self) -> &Element {
        &self.root
    }
}

/// Parses raw bytes, replacing invalid UTF-8 sequences before parsing.
pub fn parse_document_bytes(data: &[u8]) -> Result<Document, FeedError> {
    parse_document(&String::from_utf8_lossy(data))
}

/// Parses XML text into a [`Document`].
///
/// DTDs are refused outright, so no entity declaration is ever read and nothing
/// outside the input is consulted. Only the predefined XML entities and numeric
/// character references are expanded.
pub fn parse_document(xml: &str) -> Result<Document, FeedError> {
    // Byte length bounds the char count, so the count only runs for large inputs.
    if xml.len() > MAX_DOCUMENT_CHARS {
        let chars = xml.chars().count();
        if chars > MAX_DOCUMENT_CHARS {
            return Err(FeedError::TooLarge {
                chars,
                limit: MAX_DOCUMENT_CHARS,
            });
        }
    }

    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let (ns, event) = reader.read_resolved_event().map_err(FeedError::malformed)?;
        let namespace = namespace_of(ns);

        match event {
            Event::DocType(_) => return Err(FeedError::DtdProhibited),
            Event::Start(ref start) => {
                let el = build_element(&reader, start, namespace)?;
                if stack.is_empty() && root.is_some() {
                    return Err(FeedError::malformed("multiple root elements"));
                }
                stack.push(el);
            }
            Event::Empty(ref start) => {
                let el = build_element(&reader, start, namespace)?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::End(_) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| FeedError::malformed("unexpected closing tag"))?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::Text(ref text) => {
                let decoded = text.decode().map_err(FeedError::malformed)?;
                push_text(&mut stack, &decoded)?;
            }
            Event::CData(cdata) => {
                let raw = cdata.into_inner();
                push_text(&mut stack, &String::from_utf8_lossy(&raw))?;
            }
            Event::GeneralRef(ref entity) => {
                let resolved = match entity.resolve_char_ref().map_err(FeedError::malformed)? {
                    Some(ch) => ch.to_string(),
                    None => {
                        let name = entity.decode().map_err(FeedError::malformed)?;
                        resolve_predefined_entity(&name)
                            .ok_or_else(|| {
                                FeedError::malformed(format!("undefined entity reference &{};", name))
                            })?
                            .to_string()
                    }
                };
                push_text(&mut stack, &resolved)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(FeedError::malformed(format!(
            "unexpected end of document inside <{}>",
            open.local_name
        )));
    }

    root.map(|root| Document { root })
        .ok_or_else(|| FeedError::malformed("document has no root element"))
}

fn namespace_of(ns: ResolveResult<'_>) -> Option<String> {
    match ns {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        _ => None,
    }
}

fn build_element(
    reader: &NsReader<&[u8]>,
    start: &BytesStart<'_>,
    namespace: Option<String>,
) -> Result<Element, FeedError> {
    let name = start.name();
    let mut el = Element {
        prefix: name
            .prefix()
            .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned()),
        local_name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        namespace,
        ..Default::default()
    };

    for attr in start.attributes() {
        let attr = attr.map_err(FeedError::malformed)?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(FeedError::malformed)?
            .into_owned();
        let (attr_ns, local) = reader.resolve_attribute(attr.key);
        el.attributes.push(Attribute {
            prefix: attr
                .key
                .prefix()
                .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned()),
            local_name: String::from_utf8_lossy(local.as_ref()).into_owned(),
            namespace: namespace_of(attr_ns),
            value,
        });
    }

    Ok(el)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    el: Element,
) -> Result<(), FeedError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(el)),
        None if root.is_none() => *root = Some(el),
        None => return Err(FeedError::malformed("multiple root elements")),
    }
    Ok(())
}

fn push_text(stack: &mut [Element], text: &str) -> Result<(), FeedError> {
    let Some(parent) = stack.last_mut() else {
        if text.trim().is_empty() {
            return Ok(());
        }
        return Err(FeedError::malformed("text outside of the root element"));
    };
    if let Some(Node::Text(existing)) = parent.children.last_mut() {
        existing.push_str(text);
    } else {
        parent.children.push(Node::Text(text.to_string()));
    }
    Ok(())
}
