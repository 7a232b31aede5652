use crate::types::{FeedFormat, ParseError, ParsedFeed, RawRecord};
use quick_xml::events::{BytesStart, Event};
use quick_xml::encoding::Decoder;
use quick_xml::Reader;
use tracing::debug;

/// Minimal element tree. Names keep their raw prefix (`atom:link`), text is
/// the element's own character data with children excluded.
#[derive(Debug, Default)]
struct Node {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// First direct child with exactly this (unprefixed) name.
    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First direct child whose lower-cased name ends with `suffix`.
    fn child_with_suffix(&self, suffix: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name.to_lowercase().ends_with(suffix))
    }

    /// Text of the named child, `None` when missing or empty.
    fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).and_then(|c| non_empty(&c.text))
    }

    fn suffix_text(&self, suffix: &str) -> Option<String> {
        self.child_with_suffix(suffix).and_then(|c| non_empty(&c.text))
    }

    /// Depth-first pre-order walk including `self`.
    fn walk<'a>(&'a self, out: &mut Vec<&'a Node>) {
        out.push(self);
        for child in &self.children {
            child.walk(out);
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Best-effort RSS / Atom decoder.
pub struct FeedParser {
    max_records: usize,
}

impl FeedParser {
    pub fn new(max_records: usize) -> Self {
        Self { max_records }
    }

    /// Decode `raw` into at most `max_records` records. RSS is recognised by a
    /// `channel` element under the root; otherwise every element whose name
    /// ends in `entry` is read as an Atom entry. Not well-formed XML is an
    /// error, never a partial result.
    pub fn parse_feed(&self, raw: &[u8]) -> Result<ParsedFeed, ParseError> {
        debug!("Parsing feed content ({} bytes)", raw.len());
        let root = parse_tree(raw)?;

        if let Some(channel) = root.child("channel") {
            let records: Vec<RawRecord> = channel
                .children_named("item")
                .take(self.max_records)
                .map(rss_record)
                .collect();
            debug!("Parsed RSS channel with {} items", records.len());
            return Ok(ParsedFeed {
                format: FeedFormat::Rss,
                records,
            });
        }

        let mut nodes = Vec::new();
        root.walk(&mut nodes);
        let records: Vec<RawRecord> = nodes
            .into_iter()
            .filter(|n| n.name.to_lowercase().ends_with("entry"))
            .take(self.max_records)
            .map(atom_record)
            .collect();
        debug!("Parsed Atom feed with {} entries", records.len());

        Ok(ParsedFeed {
            format: FeedFormat::Atom,
            records,
        })
    }
}

fn rss_record(item: &Node) -> RawRecord {
    RawRecord {
        format: FeedFormat::Rss,
        title: item.child_text("title"),
        url: item.child_text("link"),
        summary: item
            .child_text("description")
            .or_else(|| item.child_text("summary")),
        date: item.child_text("pubDate"),
    }
}

fn atom_record(entry: &Node) -> RawRecord {
    let link = entry
        .children
        .iter()
        .filter(|c| c.name.to_lowercase().ends_with("link"))
        .find_map(|c| {
            let href = c.attr("href").unwrap_or("").trim();
            let rel = c.attr("rel").unwrap_or("").trim().to_lowercase();
            if !href.is_empty() && (rel.is_empty() || rel == "alternate") {
                Some(href.to_string())
            } else {
                None
            }
        });

    RawRecord {
        format: FeedFormat::Atom,
        title: entry.suffix_text("title"),
        url: link,
        summary: entry
            .suffix_text("summary")
            .or_else(|| entry.suffix_text("content")),
        date: entry
            .suffix_text("updated")
            .or_else(|| entry.suffix_text("published")),
    }
}

fn malformed<E: std::fmt::Display>(err: E) -> ParseError {
    ParseError::Malformed(err.to_string())
}

fn open_node(start: &BytesStart<'_>, decoder: Decoder) -> Result<Node, ParseError> {
    let name = decoder.decode(start.name().as_ref()).map_err(malformed)?.into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(malformed)?;
        let key = decoder.decode(attr.key.as_ref()).map_err(malformed)?.into_owned();
        let value = attr.decode_and_unescape_value(decoder).map_err(malformed)?.into_owned();
        attrs.push((key, value));
    }
    Ok(Node {
        name,
        attrs,
        ..Node::default()
    })
}

/// Build the element tree, rejecting anything that is not a single
/// well-formed document. Text is decoded with the encoding named in the
/// XML declaration, UTF-8 when there is none.
fn parse_tree(raw: &[u8]) -> Result<Node, ParseError> {
    let raw = raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw);
    let mut reader = Reader::from_reader(raw);
    reader.config_mut().check_end_names = true;

    let mut buf = Vec::new();
    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Node> = None;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            ParseError::Malformed(format!("{} at byte {}", e, reader.buffer_position()))
        })?;
        let decoder = reader.decoder();

        match event {
            Event::Start(start) => {
                if root.is_some() {
                    return Err(ParseError::Malformed("content after document element".to_string()));
                }
                stack.push(open_node(&start, decoder)?);
            }
            Event::Empty(start) => {
                if root.is_some() {
                    return Err(ParseError::Malformed("content after document element".to_string()));
                }
                let node = open_node(&start, decoder)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| ParseError::Malformed("unexpected closing tag".to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Event::Text(text) => {
                let decoded = text.unescape().map_err(malformed)?;
                match stack.last_mut() {
                    Some(node) => node.text.push_str(&decoded),
                    None if decoded.trim().is_empty() => {}
                    None => {
                        return Err(ParseError::Malformed("text outside document element".to_string()))
                    }
                }
            }
            Event::CData(data) => {
                let node = stack
                    .last_mut()
                    .ok_or_else(|| ParseError::Malformed("CDATA outside document element".to_string()))?;
                node.text.push_str(&decoder.decode(&data).map_err(malformed)?);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::Malformed(format!("unclosed element <{}>", open.name)));
    }

    root.ok_or(ParseError::NoRoot)
}
