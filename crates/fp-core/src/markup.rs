//! Tolerant scanning over the site's markup contract.
//!
//! The payloads this crate consumes embed small, predictable markup
//! fragments inside JSON records and full pages. This module does local
//! scanning within known class-marked blocks instead of full-document
//! parsing: case-insensitive tag detection, attribute extraction,
//! balanced inner-block slicing, entity decoding. Absent structure
//! yields `None`; malformed input never panics.

/// A parsed opening/closing tag.
#[derive(Clone, Debug)]
pub struct Tag {
    /// Lowercased element name.
    pub name: String,
    attrs: Vec<(String, String)>,
    /// Byte offset of the leading `<`.
    pub start: usize,
    /// Byte offset just past the trailing `>`.
    pub end: usize,
    pub closing: bool,
    pub self_closing: bool,
}

impl Tag {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whitespace-separated membership test on the `class` attribute.
    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|c| c.split_whitespace().any(|w| w == class))
            .unwrap_or(false)
    }
}

/// Elements that never carry content and are not closed by the site.
fn is_void(name: &str) -> bool {
    matches!(name, "br" | "img" | "input" | "hr" | "meta" | "link" | "source")
}

/// Parses the tag starting at the `<` at `lt`. Returns `None` when the
/// bytes do not form a tag (stray `<` in text).
fn parse_tag(html: &str, lt: usize) -> Option<Tag> {
    let bytes = html.as_bytes();
    let mut i = lt + 1;
    let closing = bytes.get(i) == Some(&b'/');
    if closing {
        i += 1;
    }

    let name_start = i;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-') {
        i += 1;
    }
    if i == name_start {
        return None;
    }
    let name = html[name_start..i].to_ascii_lowercase();

    let mut attrs = Vec::new();
    let mut self_closing = false;
    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        match bytes.get(i) {
            None => return None,
            Some(b'>') => {
                i += 1;
                break;
            }
            Some(b'/') => {
                self_closing = true;
                i += 1;
                continue;
            }
            _ => {}
        }

        let key_start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() && !matches!(bytes[i], b'=' | b'>' | b'/') {
            i += 1;
        }
        if i == key_start {
            // Unparseable byte inside the tag; skip it rather than bail.
            i += 1;
            continue;
        }
        let key = html[key_start..i].to_ascii_lowercase();

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes.get(i) != Some(&b'=') {
            attrs.push((key, String::new()));
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let value = match bytes.get(i) {
            Some(&q @ (b'"' | b'\'')) => {
                i += 1;
                let v_start = i;
                while i < bytes.len() && bytes[i] != q {
                    i += 1;
                }
                let v = &html[v_start..i];
                if i < bytes.len() {
                    i += 1;
                }
                v
            }
            _ => {
                let v_start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                    i += 1;
                }
                &html[v_start..i]
            }
        };
        attrs.push((key, value.to_string()));
    }

    Some(Tag {
        name,
        attrs,
        start: lt,
        end: i,
        closing,
        self_closing,
    })
}

/// Iterator over every tag in a fragment, in document order.
pub struct TagIter<'a> {
    html: &'a str,
    pos: usize,
}

pub fn tags(html: &str) -> TagIter<'_> {
    TagIter { html, pos: 0 }
}

impl<'a> Iterator for TagIter<'a> {
    type Item = Tag;

    fn next(&mut self) -> Option<Tag> {
        while self.pos < self.html.len() {
            let rel = self.html[self.pos..].find('<')?;
            let lt = self.pos + rel;
            match parse_tag(self.html, lt) {
                Some(tag) => {
                    self.pos = tag.end;
                    return Some(tag);
                }
                None => self.pos = lt + 1,
            }
        }
        None
    }
}

/// An element together with its inner fragment.
#[derive(Clone, Debug)]
pub struct Block<'a> {
    pub tag: Tag,
    pub inner: &'a str,
    /// Byte offset just past the closing tag, for resuming a scan.
    pub end: usize,
}

/// Slices the inner content of `open`, honoring nesting of the same
/// element name. An unclosed element swallows the rest of the fragment.
fn close_block<'a>(html: &'a str, open: &Tag) -> (&'a str, usize) {
    if open.self_closing || is_void(&open.name) {
        return ("", open.end);
    }
    let mut depth = 1usize;
    let iter = TagIter {
        html,
        pos: open.end,
    };
    for tag in iter {
        if tag.name != open.name {
            continue;
        }
        if tag.closing {
            depth -= 1;
            if depth == 0 {
                return (&html[open.end..tag.start], tag.end);
            }
        } else if !tag.self_closing && !is_void(&tag.name) {
            depth += 1;
        }
    }
    (&html[open.end..], html.len())
}

/// First element named `name` (any, when `name` is empty) matching `pred`.
pub fn find_block<'a>(
    html: &'a str,
    name: &str,
    pred: impl Fn(&Tag) -> bool,
) -> Option<Block<'a>> {
    for tag in tags(html) {
        if tag.closing || (!name.is_empty() && tag.name != name) || !pred(&tag) {
            continue;
        }
        let (inner, end) = close_block(html, &tag);
        return Some(Block { tag, inner, end });
    }
    None
}

pub fn find_by_class<'a>(html: &'a str, name: &str, class: &str) -> Option<Block<'a>> {
    find_block(html, name, |t| t.has_class(class))
}

/// All non-overlapping elements of `name` carrying `class`, in document
/// order. The scan resumes past each matched block.
pub fn find_all_by_class<'a>(html: &'a str, name: &str, class: &str) -> Vec<Block<'a>> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < html.len() {
        let Some(block) = find_by_class(&html[pos..], name, class) else {
            break;
        };
        let end = pos + block.end;
        out.push(Block {
            tag: Tag {
                start: pos + block.tag.start,
                end: pos + block.tag.end,
                ..block.tag
            },
            inner: block.inner,
            end,
        });
        pos = end;
    }
    out
}

pub fn find_by_attr<'a>(html: &'a str, name: &str, attr: &str, value: &str) -> Option<Block<'a>> {
    find_block(html, name, |t| t.attr(attr) == Some(value))
}

/// Replaces tags with nothing (`<br>` with a newline) and decodes
/// entities. Ends are trimmed; inner whitespace is preserved.
pub fn text(fragment: &str) -> String {
    decode_entities(&strip_tags(fragment)).trim().to_string()
}

pub fn strip_tags(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut pos = 0usize;
    while pos < fragment.len() {
        let Some(rel) = fragment[pos..].find('<') else {
            out.push_str(&fragment[pos..]);
            break;
        };
        let lt = pos + rel;
        out.push_str(&fragment[pos..lt]);
        match parse_tag(fragment, lt) {
            Some(tag) => {
                if tag.name == "br" {
                    out.push('\n');
                }
                pos = tag.end;
            }
            None => {
                out.push('<');
                pos = lt + 1;
            }
        }
    }
    out
}

pub fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pos = 0usize;
    while pos < s.len() {
        let Some(rel) = s[pos..].find('&') else {
            out.push_str(&s[pos..]);
            break;
        };
        let amp = pos + rel;
        out.push_str(&s[pos..amp]);

        let rest = &s[amp..];
        let Some(semi) = rest.find(';').filter(|&n| n <= 12) else {
            out.push('&');
            pos = amp + 1;
            continue;
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => entity
                .strip_prefix('#')
                .and_then(|num| {
                    if let Some(hex) = num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        num.parse::<u32>().ok()
                    }
                })
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                pos = amp + semi + 1;
            }
            None => {
                out.push('&');
                pos = amp + 1;
            }
        }
    }
    out
}

/// All anchors whose `href` contains `needle`, as `(href, text)` pairs.
pub fn links_containing(html: &str, needle: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < html.len() {
        let Some(block) = find_block(&html[pos..], "a", |t| {
            t.attr("href").map(|h| h.contains(needle)).unwrap_or(false)
        }) else {
            break;
        };
        let href = block.tag.attr("href").unwrap_or_default().to_string();
        out.push((href, text(block.inner)));
        pos += block.end;
    }
    out
}

/// Numeric id embedded in a link like `/users/42/`, `lots/210/` or
/// `lots/offer?id=33`: the last path/query segment that parses as an
/// integer.
pub fn trailing_id(link: &str) -> Option<i64> {
    link.split(['/', '?', '=', '&'])
        .rev()
        .filter(|s| !s.is_empty())
        .find_map(|s| s.parse::<i64>().ok())
}
