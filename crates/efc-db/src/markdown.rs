//! Comment bodies are stored alongside a rendered HTML copy. The copy is
//! produced here and nowhere else: markdown is parsed, everything outside the
//! tag allow-list is stripped (keeping its text), raw HTML is dropped, link
//! targets are limited to safe schemes and bare URLs become links.

use pulldown_cmark::{
    CodeBlockKind, CowStr, Event, HeadingLevel, LinkType, Options, Parser, Tag, TagEnd,
    TextMergeStream, html,
};

/// Tags that may appear in rendered comment HTML.
pub const ALLOWED_TAGS: [&str; 17] = [
    "a", "abbr", "acronym", "b", "blockquote", "code", "em", "i", "li", "ol", "pre", "strong",
    "ul", "h1", "h2", "h3", "p",
];

const SAFE_SCHEMES: [&str; 3] = ["http:", "https:", "mailto:"];

struct Frame {
    keep: bool,
    /// No autolinking inside links and code blocks.
    verbatim: bool,
}

/// Markdown to sanitized HTML. Pure: the same body always renders the same.
pub fn render_comment(body: &str) -> String {
    let parser = TextMergeStream::new(Parser::new_ext(body, Options::empty()));

    let mut frames: Vec<Frame> = Vec::new();
    let mut events: Vec<Event<'_>> = Vec::new();

    for event in parser {
        match event {
            Event::Start(tag) => {
                let (kept, verbatim) = filter_tag(tag);
                frames.push(Frame {
                    keep: kept.is_some(),
                    verbatim,
                });
                if let Some(tag) = kept {
                    events.push(Event::Start(tag));
                }
            }
            Event::End(end) => {
                if frames.pop().is_some_and(|f| f.keep) {
                    events.push(Event::End(end));
                }
            }
            Event::Text(text) => {
                if frames.iter().any(|f| f.verbatim) {
                    events.push(Event::Text(text));
                } else {
                    linkify(&text, &mut events);
                }
            }
            Event::Code(code) => events.push(Event::Code(code)),
            Event::SoftBreak | Event::HardBreak => events.push(Event::SoftBreak),
            // raw HTML, rules and anything else outside the allow-list
            _ => {}
        }
    }

    let mut out = String::new();
    html::push_html(&mut out, events.into_iter());
    out
}

/// Returns the tag to emit (if any) and whether its contents are verbatim.
fn filter_tag(tag: Tag<'_>) -> (Option<Tag<'_>>, bool) {
    match tag {
        Tag::Paragraph | Tag::BlockQuote(_) | Tag::Item | Tag::Emphasis | Tag::Strong => {
            (Some(tag), false)
        }
        Tag::Heading { level, .. } => {
            let keep = matches!(level, HeadingLevel::H1 | HeadingLevel::H2 | HeadingLevel::H3);
            (keep.then_some(tag), false)
        }
        // `start` and `class` attributes are not allowed
        Tag::List(start) => (Some(Tag::List(start.map(|_| 1))), false),
        Tag::CodeBlock(_) => (Some(Tag::CodeBlock(CodeBlockKind::Indented)), true),
        Tag::Link {
            link_type,
            ref dest_url,
            ..
        } => {
            let keep = link_type == LinkType::Email || is_safe_url(dest_url);
            (keep.then_some(tag), true)
        }
        _ => (None, false),
    }
}

fn is_safe_url(url: &str) -> bool {
    let url = url.trim().to_ascii_lowercase();
    if SAFE_SCHEMES.iter().any(|s| url.starts_with(s)) {
        return true;
    }
    // Relative references carry no scheme: no ':' before the first '/', '?' or '#'.
    let head = url.split(['/', '?', '#']).next().unwrap_or("");
    !head.contains(':')
}

/// Pushes `text`, turning bare http(s) URLs into links.
fn linkify(text: &str, events: &mut Vec<Event<'_>>) {
    let mut rest = text;
    while let Some(start) = find_url_start(rest) {
        let candidate = &rest[start..];
        let end = candidate
            .find(|c: char| c.is_whitespace() || matches!(c, '<' | '>' | '"'))
            .unwrap_or(candidate.len());
        let url = candidate[..end].trim_end_matches(['.', ',', ';', ':', '!', '?', ')', '\'']);

        if url.len() <= "https://".len() {
            events.push(Event::Text(CowStr::from(rest[..start + end].to_string())));
            rest = &rest[start + end..];
            continue;
        }

        if start > 0 {
            events.push(Event::Text(CowStr::from(rest[..start].to_string())));
        }
        events.push(Event::Start(Tag::Link {
            link_type: LinkType::Autolink,
            dest_url: CowStr::from(url.to_string()),
            title: CowStr::from(""),
            id: CowStr::from(""),
        }));
        events.push(Event::Text(CowStr::from(url.to_string())));
        events.push(Event::End(TagEnd::Link));
        rest = &rest[start + url.len()..];
    }
    if !rest.is_empty() {
        events.push(Event::Text(CowStr::from(rest.to_string())));
    }
}

fn find_url_start(text: &str) -> Option<usize> {
    match (text.find("http://"), text.find("https://")) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
