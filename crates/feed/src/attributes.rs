// ABOUTME: Attribute schemas recognized on Torznab/Newznab items.
// ABOUTME: Each schema is data (namespace, prefix, element) tried in order against an item's children.

use crate::xml::Element;

pub const TORZNAB_NAMESPACE: &str = "http://torznab.com/schemas/2015/feed";
pub const NEWZNAB_NAMESPACE: &str = "http://www.newznab.com/DTD/2010/feeds/attributes/";

/// One way an indexer may express `name`/`value` attribute elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSchema {
    pub namespace: &'static str,
    /// Conventional prefix, used when the feed never declares the namespace.
    pub prefix: &'static str,
    pub element: &'static str,
}

impl AttributeSchema {
    pub const TORZNAB: AttributeSchema = AttributeSchema {
        namespace: TORZNAB_NAMESPACE,
        prefix: "torznab",
        element: "attr",
    };

    pub const NEWZNAB: AttributeSchema = AttributeSchema {
        namespace: NEWZNAB_NAMESPACE,
        prefix: "newznab",
        element: "attr",
    };

    pub fn matches(&self, el: &Element) -> bool {
        if el.local_name != self.element {
            return false;
        }
        match el.namespace.as_deref() {
            Some(ns) => ns.trim_end_matches('/') == self.namespace.trim_end_matches('/'),
            None => el.prefix.as_deref() == Some(self.prefix),
        }
    }

    /// Reads the `(name, value)` pair if the element belongs to this schema.
    pub fn extract<'a>(&self, el: &'a Element) -> Option<(&'a str, &'a str)> {
        if !self.matches(el) {
            return None;
        }
        let name = el.attr("name")?.trim();
        if name.is_empty() {
            return None;
        }
        Some((name, el.attr("value").unwrap_or_default()))
    }
}

/// Schemas tried in order on every child of an item.
pub fn default_schemas() -> Vec<AttributeSchema> {
    vec![AttributeSchema::TORZNAB, AttributeSchema::NEWZNAB]
}
