use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::Reader;
use thiserror::Error;

/// A feed dialect: where its entry elements live and which child element
/// carries the entry identifier. Paths are anchored at the document root and
/// matched on local names (namespace prefixes ignored).
struct Dialect {
    entry_path: &'static [&'static str],
    id_tag: &'static str,
}

/// Dialects are tried in this order; the first one whose entry selector
/// yields a non-empty match wins, and results are never merged across
/// dialects.
const DIALECTS: &[Dialect] = &[
    // RSS 2.0
    Dialect {
        entry_path: &["rss", "channel", "item"],
        id_tag: "guid",
    },
    // Atom
    Dialect {
        entry_path: &["feed", "entry"],
        id_tag: "id",
    },
];

/// Errors that can occur while parsing a feed document.
///
/// Distinct from "zero entries found" (an empty channel parses fine and
/// yields an empty vec) and from "zero identifiable entries" (a per-entry
/// condition reported by [`entry_id`]).
#[derive(Debug, Error)]
pub enum ParseError {
    /// Document is not valid UTF-8
    #[error("Feed is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    /// Document is not well-formed XML
    #[error("XML parse error: {0}")]
    Malformed(String),
}

/// One entry element, preserved verbatim.
///
/// `xml` is the untouched byte slice of the element — CDATA sections,
/// escaped markup and whitespace all round-trip exactly, because the stored
/// representation is handed as-is to downstream consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub xml: String,
}

/// Extract the entry elements from a raw feed document.
///
/// Tries each dialect's entry selector in turn and returns the first
/// non-empty match. An empty vec means the document parsed but no dialect
/// found entries (empty channel).
pub fn parse_entries(bytes: &[u8]) -> Result<Vec<RawEntry>, ParseError> {
    let content = std::str::from_utf8(bytes)?;

    for dialect in DIALECTS {
        let entries = collect_entries(content, dialect)?;
        if !entries.is_empty() {
            return Ok(entries);
        }
    }

    Ok(Vec::new())
}

/// Extract the identifier of one entry.
///
/// Tries each dialect's identifier tag in turn; the first child element
/// that yields non-empty text wins. `None` when no dialect's identifier
/// field is present or all are empty — such an entry can never be
/// deduplicated and is dropped by the ingest step.
pub fn entry_id(entry: &RawEntry) -> Option<String> {
    for dialect in DIALECTS {
        if let Some(id) = first_child_text(&entry.xml, dialect.id_tag) {
            if !id.is_empty() {
                return Some(id);
            }
        }
    }
    None
}

fn local_name(name: QName<'_>) -> &[u8] {
    name.local_name().into_inner()
}

/// Scan the whole document for entry elements at the dialect's root-anchored
/// path, slicing each element verbatim out of the source text.
fn collect_entries(content: &str, dialect: &Dialect) -> Result<Vec<RawEntry>, ParseError> {
    let mut reader = Reader::from_str(content);
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut entries = Vec::new();

    loop {
        // Offset of the next unparsed byte, i.e. the '<' of the upcoming
        // event; needed to slice the element including its start tag.
        let pos_before = reader.buffer_position() as usize;

        match reader.read_event() {
            Err(e) => return Err(ParseError::Malformed(e.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let local = local_name(e.name()).to_vec();
                if path_matches(&stack, &local, dialect.entry_path) {
                    // Consume to the matching end tag; the raw element is
                    // everything from the start tag through the end tag.
                    reader
                        .read_to_end(e.name())
                        .map_err(|e| ParseError::Malformed(e.to_string()))?;
                    let end = reader.buffer_position() as usize;
                    entries.push(RawEntry {
                        xml: content[pos_before..end].to_string(),
                    });
                } else {
                    stack.push(local);
                }
            }
            Ok(Event::Empty(e)) => {
                let local = local_name(e.name()).to_vec();
                if path_matches(&stack, &local, dialect.entry_path) {
                    let end = reader.buffer_position() as usize;
                    entries.push(RawEntry {
                        xml: content[pos_before..end].to_string(),
                    });
                }
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(_) => {}
        }
    }

    Ok(entries)
}

/// Whether `stack` + `local` is exactly the dialect's entry path from the
/// document root.
fn path_matches(stack: &[Vec<u8>], local: &[u8], entry_path: &[&str]) -> bool {
    let (last, parents) = match entry_path.split_last() {
        Some(split) => split,
        None => return false,
    };
    local == last.as_bytes()
        && stack.len() == parents.len()
        && stack
            .iter()
            .zip(parents.iter())
            .all(|(open, want)| open.as_slice() == want.as_bytes())
}

/// Text content of the first direct child of the entry element whose local
/// name matches `tag`. Entity references are unescaped, CDATA is taken
/// literally. Any parse problem inside the snippet yields `None`.
fn first_child_text(entry_xml: &str, tag: &str) -> Option<String> {
    let mut reader = Reader::from_str(entry_xml);
    let mut depth = 0usize;

    loop {
        match reader.read_event() {
            Err(_) => return None,
            Ok(Event::Eof) => return None,
            Ok(Event::Start(e)) => {
                if depth == 1 && local_name(e.name()) == tag.as_bytes() {
                    return element_text(&mut reader);
                }
                depth += 1;
            }
            Ok(Event::End(_)) => {
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Empty(e)) => {
                // A self-closing identifier element carries no text.
                if depth == 1 && local_name(e.name()) == tag.as_bytes() {
                    return Some(String::new());
                }
            }
            Ok(_) => {}
        }
    }
}

/// Collect the immediate text of the element the reader is positioned in,
/// up to its end tag.
fn element_text(reader: &mut Reader<&[u8]>) -> Option<String> {
    let mut text = String::new();
    let mut inner_depth = 0usize;

    loop {
        match reader.read_event() {
            Err(_) | Ok(Event::Eof) => return None,
            Ok(Event::Text(t)) if inner_depth == 0 => {
                text.push_str(&t.unescape().ok()?);
            }
            Ok(Event::CData(c)) if inner_depth == 0 => {
                text.push_str(std::str::from_utf8(&c).ok()?);
            }
            Ok(Event::Start(_)) => inner_depth += 1,
            Ok(Event::End(_)) => {
                if inner_depth == 0 {
                    return Some(text);
                }
                inner_depth -= 1;
            }
            Ok(_) => {}
        }
    }
}
