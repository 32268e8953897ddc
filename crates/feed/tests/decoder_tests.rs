// ABOUTME: Integration tests for Torznab feed decoding.
// ABOUTME: Exercises realistic Jackett/Newznab documents end to end through parse and decode.

use pretty_assertions::assert_eq;
use trawler_feed::{decode, decode_feed, parse_document, FeedError, NormalizedItem};

const JACKETT_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom" xmlns:torznab="http://torznab.com/schemas/2015/feed">
  <channel>
    <title>AnimeTracker</title>
    <description>AnimeTracker is a private tracker</description>
    <item>
      <title>Show.S01E01.1080p.WEB.x264</title>
      <guid>https://tracker.example/details/1</guid>
      <link>https://tracker.example/dl/1.torrent</link>
      <comments>https://tracker.example/details/1</comments>
      <pubDate>Tue, 16 Jan 2024 11:00:00 +0000</pubDate>
      <size>1500000000</size>
      <category>5040</category>
      <enclosure url="https://tracker.example/dl/1.torrent" length="1500000000" type="application/x-bittorrent" />
      <torznab:attr name="category" value="5040" />
      <torznab:attr name="category" value="105040" />
      <torznab:attr name="seeders" value="42" />
      <torznab:attr name="peers" value="50" />
      <torznab:attr name="grabs" value="311" />
      <torznab:attr name="infohash" value="0123456789abcdef0123456789abcdef01234567" />
    </item>
    <item>
      <title>Show.S01E02.720p.HDTV</title>
      <guid>https://tracker.example/details/2</guid>
      <link>https://tracker.example/dl/2.torrent</link>
      <pubDate>Wed, 17 Jan 2024 11:00:00 +0000</pubDate>
      <torznab:attr name="category" value="5040" />
      <torznab:attr name="size" value="700000000" />
    </item>
    <item>
      <title>Show.S01E03.720p.HDTV</title>
      <link>https://tracker.example/dl/3.torrent</link>
      <torznab:attr name="category" value="5040" />
    </item>
  </channel>
</rss>"#;

/// Three items tagged 5040 decode to three items displayed as 5040,
/// except where a specific child id takes priority.
#[test]
fn test_three_items_with_tv_hd_category() {
    let xml = r#"<rss version="2.0" xmlns:torznab="http://torznab.com/schemas/2015/feed"><channel>
        <item><title>a</title><torznab:attr name="category" value="5040"/></item>
        <item><title>b</title><torznab:attr name="category" value="5040"/></item>
        <item><title>c</title><torznab:attr name="category" value="5040"/></item>
    </channel></rss>"#;

    let items = decode_feed(xml).unwrap();
    assert_eq!(items.len(), 3);
    for item in &items {
        assert_eq!(item.category_id, Some(5040));
        assert_eq!(item.primary_standard_category_id, Some(5040));
    }
    let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["a", "b", "c"]);
}

#[test]
fn test_jackett_feed_full_item() {
    let items = decode_feed(JACKETT_FEED).unwrap();
    assert_eq!(items.len(), 3);

    let first = &items[0];
    assert_eq!(first.guid, "https://tracker.example/details/1");
    assert_eq!(first.title, "Show.S01E01.1080p.WEB.x264");
    assert_eq!(first.download_url.as_deref(), Some("https://tracker.example/dl/1.torrent"));
    assert_eq!(first.published_at_unix, Some(1705402800));
    assert_eq!(first.size_bytes, Some(1_500_000_000));
    assert_eq!(first.seeders, Some(42));
    assert_eq!(first.leechers, Some(50));
    assert_eq!(first.grabs, Some(311));
    assert_eq!(
        first.info_hash.as_deref(),
        Some("0123456789abcdef0123456789abcdef01234567")
    );
    assert_eq!(first.category_ids, vec![5040, 105040]);
    assert_eq!(first.primary_standard_category_id, Some(5040));
    assert_eq!(first.primary_specific_category_id, Some(105040));
    assert_eq!(first.category_id, Some(105040));

    let third = &items[2];
    assert_eq!(third.guid, "https://tracker.example/dl/3.torrent");
    assert_eq!(third.size_bytes, None);
    assert_eq!(third.seeders, None);
}

#[test]
fn test_newznab_namespace_is_equivalent() {
    let xml = r#"<rss version="2.0" xmlns:newznab="http://www.newznab.com/DTD/2010/feeds/attributes/"><channel>
        <item>
          <title>Movie.2023.2160p</title>
          <guid isPermaLink="false">abc</guid>
          <newznab:attr name="category" value="2000"/>
          <newznab:attr name="category" value="2045"/>
          <newznab:attr name="size" value="42"/>
        </item>
    </channel></rss>"#;

    let items = decode_feed(xml).unwrap();
    let expected = NormalizedItem {
        guid: "abc".into(),
        title: "Movie.2023.2160p".into(),
        size_bytes: Some(42),
        category_ids: vec![2000, 2045],
        primary_standard_category_id: Some(2045),
        category_id: Some(2045),
        ..Default::default()
    };
    assert_eq!(items[0].guid, expected.guid);
    assert_eq!(items[0].category_ids, expected.category_ids);
    assert_eq!(items[0].primary_standard_category_id, expected.primary_standard_category_id);
    assert_eq!(items[0].category_id, expected.category_id);
    assert_eq!(items[0].size_bytes, expected.size_bytes);
    assert_eq!(items[0].attributes.get("SIZE"), Some("42"));
}

#[test]
fn test_specific_parent_and_child() {
    let xml = r#"<rss xmlns:torznab="http://torznab.com/schemas/2015/feed"><channel><item>
        <title>x</title>
        <torznab:attr name="category" value="100000"/>
        <torznab:attr name="category" value="100314"/>
    </item></channel></rss>"#;
    let items = decode_feed(xml).unwrap();
    assert_eq!(items[0].primary_specific_category_id, Some(100314));
    assert_eq!(items[0].primary_standard_category_id, None);
    assert_eq!(items[0].category_id, Some(100314));
}

#[test]
fn test_decode_is_repeatable_on_same_tree() {
    let doc = parse_document(JACKETT_FEED).unwrap();
    assert_eq!(decode(&doc), decode(&doc));
}

#[test]
fn test_empty_channel_yields_no_items() {
    let items = decode_feed("<rss><channel><title>t</title></channel></rss>").unwrap();
    assert!(items.is_empty());
}

#[test]
fn test_dtd_feed_is_rejected() {
    let xml = r#"<?xml version="1.0"?><!DOCTYPE rss SYSTEM "http://evil.example/rss.dtd"><rss><channel/></rss>"#;
    let err = decode_feed(xml).unwrap_err();
    assert!(matches!(err, FeedError::DtdProhibited));
}

#[test]
fn test_items_serialize_to_json() {
    let items = decode_feed(JACKETT_FEED).unwrap();
    let json = serde_json::to_value(&items[1]).unwrap();
    assert_eq!(json["guid"], "https://tracker.example/details/2");
    assert_eq!(json["size_bytes"], 700000000u64);
    assert_eq!(json["attributes"]["category"], "5040");
}
