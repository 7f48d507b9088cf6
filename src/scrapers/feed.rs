//! News feed indexing.
//!
//! Reads RSS 2.0 `<item>` and Atom `<entry>` elements with quick-xml and
//! keeps the first `max_entries` of them, in feed order (newest first as
//! published by the source).

use crate::error::FeedFetchError;
use crate::models::{ArticleCandidate, UNKNOWN_AUTHOR};
use async_trait::async_trait;
use itertools::Itertools;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{escape, Reader};
use reqwest::Client;
use std::borrow::Cow;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<ArticleCandidate>, FeedFetchError>;
}

pub struct FeedFetcher {
    client: Client,
    feed_url: String,
    max_entries: usize,
    timeout: Duration,
}

impl FeedFetcher {
    pub fn new(client: Client, feed_url: &str, max_entries: usize, timeout: Duration) -> Self {
        Self {
            client,
            feed_url: feed_url.to_string(),
            max_entries,
            timeout,
        }
    }
}

#[async_trait]
impl FeedSource for FeedFetcher {
    /// Fetch and parse the feed. No retries here; a failed fetch skips the cycle.
    #[instrument(level = "info", skip_all, fields(feed_url = %self.feed_url))]
    async fn fetch(&self) -> Result<Vec<ArticleCandidate>, FeedFetchError> {
        let res = self
            .client
            .get(&self.feed_url)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = res.status();
        let ctype = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("<none>")
            .to_string();
        info!(%status, %ctype, "Feed response");

        if !status.is_success() {
            return Err(FeedFetchError::UnexpectedStatus {
                status: status.as_u16(),
                url: self.feed_url.clone(),
            });
        }

        let bytes = res.bytes().await?;
        let candidates = parse_feed(&bytes, self.max_entries)?;
        info!(count = candidates.len(), "Indexed feed candidates");
        Ok(candidates)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Summary,
    Published,
    Author,
}

/// Which vocabulary the entry's children are read with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Rss,
    Atom,
}

/// What a direct child of an entry maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Child {
    Field(Field),
    /// Atom `<author>`: only its `<name>` child carries text we keep.
    AtomAuthor,
}

/// RSS items only take unprefixed RSS elements plus Dublin Core, so an
/// `<atom:link>` or `<media:title>` never shadows the real value.
fn rss_child(qname: &str) -> Option<Child> {
    let field = match qname {
        "title" => Field::Title,
        "link" => Field::Link,
        "description" => Field::Summary,
        "pubdate" | "dc:date" => Field::Published,
        "author" | "dc:creator" => Field::Author,
        _ => return None,
    };
    Some(Child::Field(field))
}

fn atom_child(qname: &str) -> Option<Child> {
    let local = qname.strip_prefix("atom:").unwrap_or(qname);
    let field = match local {
        "title" => Field::Title,
        "summary" => Field::Summary,
        "published" | "updated" => Field::Published,
        "author" => return Some(Child::AtomAuthor),
        _ => return None,
    };
    Some(Child::Field(field))
}

fn is_atom_link(qname: &str) -> bool {
    qname.strip_prefix("atom:").unwrap_or(qname) == "link"
}

#[derive(Debug)]
struct EntryBuilder {
    kind: EntryKind,
    title: String,
    link: String,
    summary: String,
    published: String,
    author: String,
}

impl EntryBuilder {
    fn new(kind: EntryKind) -> Self {
        Self {
            kind,
            title: String::new(),
            link: String::new(),
            summary: String::new(),
            published: String::new(),
            author: String::new(),
        }
    }

    fn child(&self, qname: &str) -> Option<Child> {
        match self.kind {
            EntryKind::Rss => rss_child(qname),
            EntryKind::Atom => atom_child(qname),
        }
    }

    fn slot(&mut self, field: Field) -> &mut String {
        match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Summary => &mut self.summary,
            Field::Published => &mut self.published,
            Field::Author => &mut self.author,
        }
    }

    /// First non-empty value wins (e.g. `published` over a later `updated`).
    fn commit(&mut self, field: Field, text: &str) {
        let text = text.trim();
        let slot = self.slot(field);
        if slot.is_empty() && !text.is_empty() {
            *slot = text.to_string();
        }
    }

    fn finish(self) -> Option<ArticleCandidate> {
        if self.link.is_empty() {
            return None;
        }
        Some(ArticleCandidate {
            url: self.link,
            title: self.title,
            raw_summary_html: self.summary,
            published_at: self.published,
            author: if self.author.is_empty() {
                UNKNOWN_AUTHOR.to_string()
            } else {
                self.author
            },
        })
    }
}

/// Parser position inside one `<item>`/`<entry>`.
struct EntryState {
    builder: EntryBuilder,
    /// Element depth below the entry element itself.
    depth: usize,
    /// Field being collected and the depth of the element that opened it.
    field: Option<(Field, usize)>,
    in_atom_author: bool,
    text: String,
}

impl EntryState {
    fn new(kind: EntryKind) -> Self {
        Self {
            builder: EntryBuilder::new(kind),
            depth: 0,
            field: None,
            in_atom_author: false,
            text: String::new(),
        }
    }

    fn open(&mut self, qname: &str, e: &BytesStart<'_>) {
        self.depth += 1;
        if self.field.is_some() {
            // Markup nested inside a text field; keep collecting its text.
            return;
        }
        match self.depth {
            1 => {
                if self.builder.kind == EntryKind::Atom && is_atom_link(qname) {
                    self.link_href(e);
                    return;
                }
                match self.builder.child(qname) {
                    Some(Child::Field(f)) => self.start_field(f),
                    Some(Child::AtomAuthor) => self.in_atom_author = true,
                    None => {}
                }
            }
            2 if self.in_atom_author && qname.strip_prefix("atom:").unwrap_or(qname) == "name" => {
                self.start_field(Field::Author)
            }
            _ => {}
        }
    }

    fn close(&mut self) {
        if let Some((f, opened_at)) = self.field {
            if opened_at == self.depth {
                self.builder.commit(f, &self.text);
                self.field = None;
                self.text.clear();
            }
        }
        if self.depth == 1 {
            self.in_atom_author = false;
        }
        self.depth = self.depth.saturating_sub(1);
    }

    fn empty(&mut self, qname: &str, e: &BytesStart<'_>) {
        if self.depth == 0 && self.builder.kind == EntryKind::Atom && is_atom_link(qname) {
            self.link_href(e);
        }
    }

    fn start_field(&mut self, field: Field) {
        self.field = Some((field, self.depth));
        self.text.clear();
    }

    fn link_href(&mut self, e: &BytesStart<'_>) {
        if let Some(href) = atom_href(e) {
            self.builder.commit(Field::Link, &href);
        }
    }

    fn push_text(&mut self, s: &str) {
        if self.field.is_some() {
            self.text.push_str(s);
        }
    }
}

fn lower_qname(name: &[u8]) -> String {
    String::from_utf8_lossy(name).to_ascii_lowercase()
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.local_name().as_ref() != key {
            return None;
        }
        let raw = String::from_utf8_lossy(&a.value).into_owned();
        Some(match escape::unescape(&raw) {
            Ok(cow) => cow.into_owned(),
            Err(_) => raw,
        })
    })
}

/// Atom `<link href="..."/>`: take the `alternate` link (or one without `rel`).
fn atom_href(e: &BytesStart<'_>) -> Option<String> {
    let rel = attr_value(e, b"rel");
    match rel.as_deref() {
        None | Some("alternate") => attr_value(e, b"href"),
        Some(_) => None,
    }
}

fn resolve_entity(name: &str) -> Option<String> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    let s = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        _ => return None,
    };
    Some(s.to_string())
}

/// Parse a feed body into at most `max_entries` candidates.
pub(crate) fn parse_feed(
    xml: &[u8],
    max_entries: usize,
) -> Result<Vec<ArticleCandidate>, FeedFetchError> {
    let mut reader = Reader::from_reader(xml);

    let mut buf = Vec::<u8>::new();
    let mut saw_feed_root = false;
    let mut entries = Vec::<ArticleCandidate>::new();
    let mut current: Option<EntryState> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let qname = lower_qname(e.name().as_ref());
                match current.as_mut() {
                    Some(state) => state.open(&qname, &e),
                    None => match lower_qname(e.local_name().as_ref()).as_str() {
                        "rss" | "feed" | "rdf" => saw_feed_root = true,
                        "item" => current = Some(EntryState::new(EntryKind::Rss)),
                        "entry" => current = Some(EntryState::new(EntryKind::Atom)),
                        _ => {}
                    },
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(state) = current.as_mut() {
                    state.empty(&lower_qname(e.name().as_ref()), &e);
                }
            }
            Ok(Event::End(_)) => {
                let entry_closed = match current.as_mut() {
                    Some(state) if state.depth > 0 => {
                        state.close();
                        false
                    }
                    Some(_) => true,
                    None => false,
                };
                if entry_closed {
                    if let Some(state) = current.take() {
                        match state.builder.finish() {
                            Some(candidate) => {
                                debug!(url = %candidate.url, "Feed entry");
                                entries.push(candidate);
                            }
                            None => warn!("Feed entry without a link; skipping"),
                        }
                    }
                    if entries.len() >= max_entries {
                        break;
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(state) = current.as_mut() {
                    let raw = String::from_utf8_lossy(t.as_ref());
                    let unescaped: Cow<'_, str> = match escape::unescape(&raw) {
                        Ok(cow) => cow,
                        Err(_) => Cow::Borrowed(raw.as_ref()),
                    };
                    state.push_text(&unescaped);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(state) = current.as_mut() {
                    state.push_text(&String::from_utf8_lossy(c.as_ref()));
                }
            }
            Ok(Event::GeneralRef(r)) => {
                if let Some(state) = current.as_mut() {
                    let name = String::from_utf8_lossy(r.as_ref()).into_owned();
                    match resolve_entity(&name) {
                        Some(s) => state.push_text(&s),
                        None => state.push_text(&format!("&{name};")),
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(source) => {
                return Err(FeedFetchError::Xml {
                    position: reader.buffer_position() as u64,
                    source,
                });
            }
        }
        buf.clear();
    }

    if !saw_feed_root {
        return Err(FeedFetchError::NotAFeed);
    }

    Ok(entries
        .into_iter()
        .unique_by(|c| c.url.clone())
        .take(max_entries)
        .collect())
}
