use feed_rs::parser;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use serde::Deserialize;
use thiserror::Error;

/// Maximum element nesting accepted from a feed document.
/// Prevents stack and memory blowups from maliciously nested input.
const MAX_XML_DEPTH: usize = 128;

/// Errors produced when a body is not a usable feed.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Nothing but whitespace was received
    #[error("Empty feed body")]
    Empty,
    /// The document is not well-formed XML (mismatched or unclosed tags, etc.)
    #[error("Malformed XML: {0}")]
    Xml(String),
    /// Well-formed XML whose root is not RSS, RDF or Atom
    #[error("Not a feed: unexpected root element <{0}>")]
    NotAFeed(String),
    /// The feed structure was recognized but entries could not be extracted
    #[error("Feed parse error: {0}")]
    Feed(String),
}

/// A candidate item as announced by the feed.
///
/// Only title and link are carried; everything else about a news item is
/// filled in by the ingestion scheduler or the enrichment worker. The link
/// is the feed's own text, untouched apart from surrounding whitespace, since
/// it is the dedup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
}

/// Decode raw feed bytes into entries, in the order the feed declares them.
///
/// A recognizable but empty feed (e.g. `<rss></rss>`) yields an empty list.
/// Bodies that are not well-formed, or whose root is not a feed element,
/// yield a [`DecodeError`].
pub fn decode(bytes: &[u8]) -> Result<Vec<FeedEntry>, DecodeError> {
    let trimmed = trim_start(bytes);
    if trimmed.is_empty() {
        return Err(DecodeError::Empty);
    }

    if trimmed[0] == b'{' {
        decode_json(trimmed)
    } else {
        decode_xml(trimmed)
    }
}

/// Items of a JSON Feed document, as written.
#[derive(Debug, Deserialize)]
struct JsonFeedDoc {
    items: Vec<JsonFeedItem>,
}

#[derive(Debug, Deserialize)]
struct JsonFeedItem {
    title: Option<String>,
    url: Option<String>,
    external_url: Option<String>,
}

/// feed-rs checks the JSON Feed shape; titles and links are then read from
/// the document itself, since feed-rs rewrites URLs.
fn decode_json(bytes: &[u8]) -> Result<Vec<FeedEntry>, DecodeError> {
    parser::parse(bytes).map_err(|e| DecodeError::Feed(e.to_string()))?;
    let doc: JsonFeedDoc =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::Feed(e.to_string()))?;

    let entries = doc
        .items
        .into_iter()
        .map(|item| FeedEntry {
            title: item.title.unwrap_or_default().trim().to_string(),
            link: item
                .url
                .or(item.external_url)
                .unwrap_or_default()
                .trim()
                .to_string(),
        })
        .collect();

    Ok(entries)
}

/// Skip a UTF-8 byte order mark and leading whitespace.
fn trim_start(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
}

/// Text being collected for one child element of an entry.
#[derive(Debug)]
struct Capture {
    field: Field,
    /// Open-element count once the captured element is open
    depth: usize,
    text: String,
}

/// An `<item>` or `<entry>` still being read.
#[derive(Debug)]
struct EntryDraft {
    /// Open-element count once the entry element is open
    depth: usize,
    title: Option<String>,
    text_link: Option<String>,
    /// `(rel, href)` of every link carrying an `href` attribute
    href_links: Vec<(Option<String>, String)>,
}

impl EntryDraft {
    fn new(depth: usize) -> Self {
        Self {
            depth,
            title: None,
            text_link: None,
            href_links: Vec::new(),
        }
    }

    fn record_href(&mut self, element: &BytesStart<'_>) {
        let mut href = None;
        let mut rel = None;
        for attr in element.attributes().flatten() {
            match attr.key.local_name().as_ref() {
                b"href" => href = Some(attribute_text(&attr)),
                b"rel" => rel = Some(attribute_text(&attr)),
                _ => {}
            }
        }
        if let Some(href) = href {
            self.href_links.push((rel, href.trim().to_string()));
        }
    }

    fn fill(&mut self, capture: Capture) {
        let text = capture.text.trim().to_string();
        match capture.field {
            Field::Title => self.title = Some(text),
            Field::Link if self.text_link.is_none() && !text.is_empty() => {
                self.text_link = Some(text)
            }
            Field::Link => {}
        }
    }

    /// Text links (RSS, RDF) win over `href` links; among `href` links
    /// (Atom) an `alternate` or rel-less one wins over the rest.
    fn finish(self) -> FeedEntry {
        let link = self.text_link.unwrap_or_else(|| {
            self.href_links
                .iter()
                .find(|(rel, _)| rel.as_deref().map_or(true, |r| r == "alternate"))
                .or(self.href_links.first())
                .map(|(_, href)| href.clone())
                .unwrap_or_default()
        });
        FeedEntry {
            title: self.title.unwrap_or_default(),
            link,
        }
    }
}

/// Walk the whole document once, checking well-formedness and collecting
/// the title and link of every entry.
///
/// SEC-002: quick-xml (0.37) never expands `<!ENTITY>` declarations, so this
/// pass cannot be used for entity expansion attacks.
fn decode_xml(bytes: &[u8]) -> Result<Vec<FeedEntry>, DecodeError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().check_end_names = true;

    let mut buf = Vec::new();
    let mut depth: usize = 0;
    let mut root: Option<String> = None;
    let mut entry: Option<EntryDraft> = None;
    let mut capture: Option<Capture> = None;
    let mut entries = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(&e);
                if depth == 0 {
                    set_root(&mut root, name)?;
                } else if let Some(draft) = entry.as_mut() {
                    if depth == draft.depth && capture.is_none() {
                        match name.as_str() {
                            "title" if draft.title.is_none() => {
                                capture = Some(Capture {
                                    field: Field::Title,
                                    depth: depth + 1,
                                    text: String::new(),
                                });
                            }
                            "link" => {
                                draft.record_href(&e);
                                capture = Some(Capture {
                                    field: Field::Link,
                                    depth: depth + 1,
                                    text: String::new(),
                                });
                            }
                            _ => {}
                        }
                    }
                } else if name == entry_element(root.as_deref()) {
                    entry = Some(EntryDraft::new(depth + 1));
                }

                depth += 1;
                if depth > MAX_XML_DEPTH {
                    return Err(DecodeError::Xml(format!(
                        "nesting deeper than {MAX_XML_DEPTH} levels"
                    )));
                }
            }
            Ok(Event::Empty(e)) => {
                let name = local_name(&e);
                if depth == 0 {
                    set_root(&mut root, name)?;
                } else if let Some(draft) = entry.as_mut() {
                    if depth == draft.depth && name == "link" {
                        draft.record_href(&e);
                    }
                } else if name == entry_element(root.as_deref()) {
                    entries.push(EntryDraft::new(depth + 1).finish());
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(capture) = capture.as_mut() {
                    capture.text.push_str(&unescape_text(&e));
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(capture) = capture.as_mut() {
                    capture.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::End(_)) => {
                if depth == 0 {
                    return Err(DecodeError::Xml("unexpected closing tag".into()));
                }
                if capture.as_ref().is_some_and(|c| c.depth == depth) {
                    if let (Some(done), Some(draft)) = (capture.take(), entry.as_mut()) {
                        draft.fill(done);
                    }
                }
                if entry.as_ref().is_some_and(|d| d.depth == depth) {
                    if let Some(draft) = entry.take() {
                        entries.push(draft.finish());
                    }
                }
                depth -= 1;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(DecodeError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if depth != 0 {
        return Err(DecodeError::Xml(format!("{depth} unclosed element(s)")));
    }

    let root = root.ok_or_else(|| DecodeError::Xml("no root element".into()))?;
    if !matches!(root.as_str(), "rss" | "RDF" | "feed") {
        return Err(DecodeError::NotAFeed(root));
    }

    if entries.is_empty() {
        tracing::debug!(root = %root, "Feed has no entries");
    }
    Ok(entries)
}

fn set_root(root: &mut Option<String>, name: String) -> Result<(), DecodeError> {
    if root.is_some() {
        return Err(DecodeError::Xml("multiple root elements".into()));
    }
    *root = Some(name);
    Ok(())
}

/// Atom calls its items `entry`; RSS and RDF call them `item`.
fn entry_element(root: Option<&str>) -> &'static str {
    match root {
        Some("feed") => "entry",
        _ => "item",
    }
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

/// Unknown entities (`&nbsp;` and friends) are kept as written.
fn unescape_text(text: &BytesText<'_>) -> String {
    match text.unescape() {
        Ok(s) => s.into_owned(),
        Err(_) => String::from_utf8_lossy(text).into_owned(),
    }
}

fn attribute_text(attr: &Attribute<'_>) -> String {
    match attr.unescape_value() {
        Ok(s) => s.into_owned(),
        Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
    }
}
