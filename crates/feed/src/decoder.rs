// ABOUTME: Torznab/Newznab feed decoder producing NormalizedItem values from a parsed document.
// ABOUTME: Handles attribute schemas, category resolution, size/peer fallbacks and guid selection.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::attributes::{default_schemas, AttributeSchema};
use crate::categories::classify;
use crate::error::IndexerError;
use crate::models::{AttributeMap, NormalizedItem};
use crate::time_parse::parse_feed_timestamp;
use crate::xml::{Document, Element};

static SEEDERS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)seeders?\s*[:=]\s*(\d+)").expect("valid seeders pattern"));
static LEECHERS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)leechers?\s*[:=]\s*(\d+)").expect("valid leechers pattern"));

/// Decodes Torznab items. Holds the ordered list of attribute schemas to recognize.
#[derive(Debug, Clone)]
pub struct TorznabDecoder {
    schemas: Vec<AttributeSchema>,
}

impl Default for TorznabDecoder {
    fn default() -> Self {
        Self {
            schemas: default_schemas(),
        }
    }
}

impl TorznabDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a custom, ordered set of attribute schemas.
    pub fn with_schemas(schemas: Vec<AttributeSchema>) -> Self {
        Self { schemas }
    }

    /// Decodes every `<item>` of the document, in document order.
    ///
    /// Missing or malformed optional fields leave the matching output field empty;
    /// they never fail the item or the feed.
    pub fn decode(&self, doc: &Document) -> Vec<NormalizedItem> {
        doc.root()
            .descendants_named("item")
            .into_iter()
            .enumerate()
            .map(|(idx, item)| self.decode_item(item, idx + 1))
            .collect()
    }

    fn decode_item(&self, item: &Element, position: usize) -> NormalizedItem {
        let mut attributes = AttributeMap::new();
        let mut category_ids: Vec<i64> = Vec::new();
        let mut enclosure: Option<&Element> = None;
        let mut size_element: Option<u64> = None;

        for child in item.elements() {
            if let Some((name, value)) = self.schemas.iter().find_map(|s| s.extract(child)) {
                if name.eq_ignore_ascii_case("category") {
                    push_category(&mut category_ids, value);
                }
                attributes.insert(name, value);
                continue;
            }

            if child.local_name == "category" {
                push_category(&mut category_ids, &child.text());
            } else if child.local_name == "enclosure" {
                enclosure = enclosure.or(Some(child));
            } else if child.local_name.eq_ignore_ascii_case("size") && size_element.is_none() {
                size_element = parse_u64(&child.text());
            }
        }

        let title = item.child_text("title").unwrap_or_default();
        let link = item.child_text("link").or_else(|| {
            item.child("link")
                .and_then(|l| l.attr("href"))
                .and_then(non_empty)
        });
        let enclosure_url = enclosure.and_then(|e| e.attr("url")).and_then(non_empty);
        let info_hash = ["infohash", "info_hash", "hash"]
            .iter()
            .find_map(|name| attributes.get(name).and_then(non_empty));

        let guid = [item.child_text("guid"), link.clone(), non_empty(&title)]
            .into_iter()
            .flatten()
            .next()
            .or_else(|| enclosure_url.clone())
            .or_else(|| info_hash.clone())
            .unwrap_or_else(|| format!("item-{}", position));

        let published_at_unix = ["pubDate", "published"]
            .iter()
            .filter_map(|name| item.child_text(name))
            .find_map(|raw| parse_feed_timestamp(&raw));

        let size_bytes = attributes
            .get("size")
            .and_then(parse_u64)
            .or(size_element)
            .or_else(|| enclosure.and_then(|e| e.attr("length")).and_then(parse_u64));

        let mut seeders = first_u32(&attributes, &["seeders"]);
        let mut leechers = first_u32(&attributes, &["leechers", "peers"]);
        if seeders.is_none() || leechers.is_none() {
            let text = summary_text(item);
            seeders = seeders.or_else(|| capture_u32(&SEEDERS_RE, &text));
            leechers = leechers.or_else(|| capture_u32(&LEECHERS_RE, &text));
        }

        let selection = classify(&category_ids);

        NormalizedItem {
            guid,
            title,
            download_url: enclosure_url.or_else(|| link.clone()),
            link,
            published_at_unix,
            size_bytes,
            seeders,
            leechers,
            grabs: first_u32(&attributes, &["grabs"]),
            info_hash,
            primary_standard_category_id: selection.primary_standard,
            primary_specific_category_id: selection.primary_specific,
            category_id: selection.display,
            category_ids,
            attributes,
        }
    }
}

/// Decodes a document with the default torznab and newznab schemas.
pub fn decode(doc: &Document) -> Vec<NormalizedItem> {
    TorznabDecoder::default().decode(doc)
}

/// Recognizes a Torznab `<error code=".." description=".."/>` document.
pub fn indexer_error(doc: &Document) -> Option<IndexerError> {
    let root = doc.root();
    if !root.local_name.eq_ignore_ascii_case("error") {
        return None;
    }
    let description = root
        .attr("description")
        .and_then(non_empty)
        .or_else(|| non_empty(&root.text()))
        .unwrap_or_else(|| "unspecified indexer error".to_string());
    Some(IndexerError {
        code: root.attr("code").and_then(|c| c.trim().parse().ok()),
        description,
    })
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn push_category(ids: &mut Vec<i64>, raw: &str) {
    if let Ok(id) = raw.trim().parse::<i64>() {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
}

fn parse_u64(raw: &str) -> Option<u64> {
    raw.trim().parse().ok()
}

fn first_u32(attributes: &AttributeMap, names: &[&str]) -> Option<u32> {
    names
        .iter()
        .find_map(|name| attributes.get(name).and_then(|v| v.trim().parse().ok()))
}

fn capture_u32(re: &Regex, text: &str) -> Option<u32> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Description and summary text with markup removed, for the peer-count fallback.
fn summary_text(item: &Element) -> String {
    let mut text = String::new();
    for name in ["description", "summary"] {
        if let Some(raw) = item.child_text(name) {
            text.push_str(&strip_tags(&raw));
            text.push('\n');
        }
    }
    text
}

fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;

    fn decode_one(item_xml: &str) -> NormalizedItem {
        let xml = format!(
            r#"<rss version="2.0" xmlns:torznab="http://torznab.com/schemas/2015/feed" xmlns:newznab="http://www.newznab.com/DTD/2010/feeds/attributes/"><channel>{}</channel></rss>"#,
            item_xml
        );
        let mut items = decode(&parse_document(&xml).unwrap());
        assert_eq!(items.len(), 1);
        items.remove(0)
    }

    #[test]
    fn guid_falls_back_to_link_then_title() {
        let item = decode_one("<item><link>https://x/y</link><title>Foo</title></item>");
        assert_eq!(item.guid, "https://x/y");

        let item = decode_one("<item><title> Foo </title></item>");
        assert_eq!(item.guid, "Foo");
    }

    #[test]
    fn guid_is_never_empty() {
        let item = decode_one("<item><guid>  </guid><title></title></item>");
        assert_eq!(item.guid, "item-1");

        let item = decode_one(r#"<item><enclosure url="https://dl/1.torrent"/></item>"#);
        assert_eq!(item.guid, "https://dl/1.torrent");
    }

    #[test]
    fn download_url_prefers_enclosure() {
        let item = decode_one(
            r#"<item><link>https://site/details</link><enclosure url="https://site/dl" length="5"/></item>"#,
        );
        assert_eq!(item.link.as_deref(), Some("https://site/details"));
        assert_eq!(item.download_url.as_deref(), Some("https://site/dl"));
        assert_eq!(item.size_bytes, Some(5));
    }

    #[test]
    fn size_priority_attribute_then_element_then_enclosure() {
        let item = decode_one(
            r#"<item><torznab:attr name="size" value="100"/><size>200</size><enclosure url="u" length="300"/></item>"#,
        );
        assert_eq!(item.size_bytes, Some(100));

        let item = decode_one(r#"<item><Size>200</Size><enclosure url="u" length="300"/></item>"#);
        assert_eq!(item.size_bytes, Some(200));

        let item = decode_one(
            r#"<item><torznab:attr name="size" value="n/a"/><enclosure url="u" length="300"/></item>"#,
        );
        assert_eq!(item.size_bytes, Some(300));
    }

    #[test]
    fn peers_from_attributes_with_text_fallback() {
        let item = decode_one(
            r#"<item><torznab:attr name="seeders" value="12"/><description>Seeders: 99 Leechers: 3</description></item>"#,
        );
        assert_eq!(item.seeders, Some(12));
        assert_eq!(item.leechers, Some(3));

        let item = decode_one(r#"<item><newznab:attr name="peers" value="8"/></item>"#);
        assert_eq!(item.leechers, Some(8));
        assert_eq!(item.seeders, None);
    }

    #[test]
    fn text_fallback_sees_through_markup() {
        let item = decode_one(
            "<item><description><![CDATA[<b>Seeders:</b> 5<br/><b>Leechers</b>= 2]]></description></item>",
        );
        assert_eq!(item.seeders, Some(5));
        assert_eq!(item.leechers, Some(2));
    }

    #[test]
    fn categories_merge_both_schemas_and_elements() {
        let item = decode_one(
            r#"<item><category>5000</category><torznab:attr name="category" value="5040"/><newznab:attr name="category" value="5000"/><newznab:attr name="category" value="105040"/><category>TV/HD</category></item>"#,
        );
        assert_eq!(item.category_ids, vec![5000, 5040, 105040]);
        assert_eq!(item.primary_standard_category_id, Some(5040));
        assert_eq!(item.primary_specific_category_id, Some(105040));
        assert_eq!(item.category_id, Some(105040));
    }

    #[test]
    fn info_hash_and_grabs() {
        let item = decode_one(
            r#"<item><torznab:attr name="InfoHash" value="ABC123"/><torznab:attr name="grabs" value="40"/></item>"#,
        );
        assert_eq!(item.info_hash.as_deref(), Some("ABC123"));
        assert_eq!(item.grabs, Some(40));
        assert_eq!(item.attributes.get("infohash"), Some("ABC123"));
    }

    #[test]
    fn published_falls_back_to_published_element() {
        let item = decode_one(
            "<item><pubDate>garbage</pubDate><published>1970-01-01T00:00:10Z</published></item>",
        );
        assert_eq!(item.published_at_unix, Some(10));

        let item = decode_one("<item><pubDate>garbage</pubDate></item>");
        assert_eq!(item.published_at_unix, None);
    }

    #[test]
    fn malformed_numbers_are_absent_not_zero() {
        let item = decode_one(
            r#"<item><torznab:attr name="seeders" value="-"/><torznab:attr name="grabs" value=""/></item>"#,
        );
        assert_eq!(item.seeders, None);
        assert_eq!(item.grabs, None);
    }

    #[test]
    fn recognizes_error_document() {
        let doc =
            parse_document(r#"<error code="100" description="Incorrect user credentials"/>"#).unwrap();
        let err = indexer_error(&doc).unwrap();
        assert_eq!(err.code, Some(100));
        assert_eq!(err.description, "Incorrect user credentials");

        let doc = parse_document("<rss><channel/></rss>").unwrap();
        assert!(indexer_error(&doc).is_none());
    }
}
