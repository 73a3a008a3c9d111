//! HTML cleaning: strip boilerplate subtrees and noisy attributes.
//!
//! The document is parsed once and serialized back while walking the tree,
//! skipping removed elements instead of mutating the DOM. Output is the inner
//! HTML of `<body>` with every whitespace run collapsed to a single space.

use ego_tree::NodeRef;
use rustc_hash::FxHashSet;
use scraper::node::Element;
use scraper::{Html, Node};

use crate::config::Selectors;

/// Attribute name prefixes always stripped (case-insensitive)
const STRIPPED_ATTR_PREFIXES: [&str; 4] = ["data-", "area-", "on", "item"];

/// Elements serialized without an end tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Elements whose text children are written verbatim
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext", "noscript",
];

/// Tags whose text never counts as visible
const INVISIBLE_TAGS: &[&str] = &["script", "style", "noscript", "template"];

#[derive(Debug)]
pub enum FilterError {
    /// No blank line separates HTTP headers from the body
    MissingBody,
}

impl std::fmt::Display for FilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingBody => write!(f, "no header/body separator in HTTP response"),
        }
    }
}

impl std::error::Error for FilterError {}

/// One class keyword rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassPattern {
    Prefix(String),
    Suffix(String),
    Contains(String),
}

impl ClassPattern {
    /// `^foo` → prefix, `foo$` → suffix, otherwise substring. Empty → `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        let pattern = if let Some(p) = raw.strip_prefix('^') {
            Self::Prefix(p.to_string())
        } else if let Some(s) = raw.strip_suffix('$') {
            Self::Suffix(s.to_string())
        } else {
            Self::Contains(raw)
        };
        match &pattern {
            Self::Prefix(s) | Self::Suffix(s) | Self::Contains(s) if s.is_empty() => None,
            _ => Some(pattern),
        }
    }

    /// `class` must already be lowercase
    pub fn matches(&self, class: &str) -> bool {
        match self {
            Self::Prefix(p) => class.starts_with(p.as_str()),
            Self::Suffix(s) => class.ends_with(s.as_str()),
            Self::Contains(s) => class.contains(s.as_str()),
        }
    }
}

/// Compiled removal rules
#[derive(Debug, Clone)]
pub struct ContentFilter {
    tags: FxHashSet<String>,
    classes: FxHashSet<String>,
    class_patterns: Vec<ClassPattern>,
    attributes: FxHashSet<String>,
}

impl ContentFilter {
    pub fn new(selectors: &Selectors) -> Self {
        let lower = |xs: &[String]| -> FxHashSet<String> {
            xs.iter()
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };
        Self {
            tags: lower(&selectors.tags),
            classes: lower(&selectors.classes),
            class_patterns: selectors
                .class_keywords
                .iter()
                .filter_map(|k| ClassPattern::parse(k))
                .collect(),
            attributes: lower(&selectors.attributes),
        }
    }

    /// Clean the body of a raw HTTP response (status line + headers + body).
    pub fn clean_response(&self, raw: &[u8]) -> Result<String, FilterError> {
        let body = split_http_body(raw)?;
        Ok(self.clean_html(&String::from_utf8_lossy(body)))
    }

    /// Clean an HTML document, returning the filtered inner HTML of `<body>`.
    ///
    /// Malformed markup is handled by the HTML5 parser's recovery rules, so
    /// this never fails. Removing `html` or `body` yields an empty string.
    pub fn clean_html(&self, html: &str) -> String {
        if self.tags.contains("html") || self.tags.contains("body") {
            return String::new();
        }
        let document = Html::parse_document(html);
        let Some(body) = document
            .root_element()
            .children()
            .find(|n| n.value().as_element().is_some_and(|e| e.name() == "body"))
        else {
            // Frameset documents have no body
            return String::new();
        };

        let mut out = String::with_capacity(html.len() / 2);
        self.write_children(body, &mut out);
        collapse_whitespace(&out)
    }

    /// Tag rule first, then class rules. `body` is exempt from class rules.
    fn removes(&self, element: &Element) -> bool {
        let name = element.name();
        if self.tags.contains(name) {
            return true;
        }
        if name == "body" || (self.classes.is_empty() && self.class_patterns.is_empty()) {
            return false;
        }
        element.classes().any(|class| {
            let class = class.to_ascii_lowercase();
            self.classes.contains(&class) || self.class_patterns.iter().any(|p| p.matches(&class))
        })
    }

    fn strips_attribute(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        STRIPPED_ATTR_PREFIXES.iter().any(|p| name.starts_with(p))
            || self.attributes.contains(&name)
    }

    /// Serialize the children of `parent`.
    ///
    /// Walks with an explicit stack so nesting depth is bounded by the heap,
    /// not the worker's thread stack.
    fn write_children(&self, parent: NodeRef<'_, Node>, out: &mut String) {
        let mut stack: Vec<Step<'_>> = parent
            .children()
            .rev()
            .map(|child| Step::Visit(child, false))
            .collect();

        while let Some(step) = stack.pop() {
            let (node, raw_text) = match step {
                Step::Visit(node, raw_text) => (node, raw_text),
                Step::Close(name) => {
                    out.push_str("</");
                    out.push_str(name);
                    out.push('>');
                    continue;
                }
            };
            match node.value() {
                Node::Text(text) => {
                    if raw_text {
                        out.push_str(text);
                    } else {
                        escape_text(text, out);
                    }
                }
                Node::Element(element) => {
                    if self.removes(element) {
                        continue;
                    }
                    let name = element.name();
                    out.push('<');
                    out.push_str(name);
                    for (attr, value) in element.attrs() {
                        if self.strips_attribute(attr) {
                            continue;
                        }
                        out.push(' ');
                        out.push_str(attr);
                        out.push_str("=\"");
                        escape_attr(value, out);
                        out.push('"');
                    }
                    out.push('>');
                    if VOID_ELEMENTS.contains(&name) {
                        continue;
                    }
                    let raw = RAW_TEXT_ELEMENTS.contains(&name);
                    stack.push(Step::Close(name));
                    stack.extend(node.children().rev().map(|child| Step::Visit(child, raw)));
                }
                // Comments, doctypes, processing instructions
                _ => {}
            }
        }
    }
}

/// Pending work of the serializer: a node to write (with its raw-text flag)
/// or the end tag of an element whose children are already queued
enum Step<'a> {
    Visit(NodeRef<'a, Node>, bool),
    Close(&'a str),
}

/// Body of an HTTP response: everything after the first blank line.
///
/// Accepts both CRLF and bare LF separators.
pub fn split_http_body(raw: &[u8]) -> Result<&[u8], FilterError> {
    if let Some(i) = find(raw, b"\r\n\r\n") {
        return Ok(&raw[i + 4..]);
    }
    if let Some(i) = find(raw, b"\n\n") {
        return Ok(&raw[i + 2..]);
    }
    Err(FilterError::MissingBody)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Visible text of an HTML document, whitespace collapsed, at most
/// `max_chars` characters.
pub fn text_preview(html: &str, max_chars: usize) -> String {
    let document = Html::parse_document(html);
    let mut text = String::new();
    collect_text(*document.root_element(), &mut text);
    let collapsed = collapse_whitespace(&text);
    match collapsed.char_indices().nth(max_chars) {
        Some((cut, _)) => collapsed[..cut].to_string(),
        None => collapsed,
    }
}

fn collect_text(root: NodeRef<'_, Node>, out: &mut String) {
    let mut stack: Vec<NodeRef<'_, Node>> = root.children().rev().collect();
    while let Some(node) = stack.pop() {
        match node.value() {
            Node::Text(t) => {
                out.push_str(t);
                out.push(' ');
            }
            Node::Element(e) if !INVISIBLE_TAGS.contains(&e.name()) => {
                stack.extend(node.children().rev());
            }
            _ => {}
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_ascii_whitespace().collect::<Vec<_>>().join(" ")
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selectors(tags: &[&str], classes: &[&str], keywords: &[&str], attrs: &[&str]) -> Selectors {
        let owned = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect();
        Selectors {
            tags: owned(tags),
            classes: owned(classes),
            class_keywords: owned(keywords),
            attributes: owned(attrs),
        }
    }

    fn filter(tags: &[&str], classes: &[&str], keywords: &[&str], attrs: &[&str]) -> ContentFilter {
        ContentFilter::new(&selectors(tags, classes, keywords, attrs))
    }

    #[test]
    fn minimal_response_yields_body_text() {
        let f = ContentFilter::new(&Selectors::empty());
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n<html><body>Hi</body></html>";
        assert_eq!(f.clean_response(raw).unwrap(), "Hi");
    }

    #[test]
    fn bare_lf_separator() {
        let f = ContentFilter::new(&Selectors::empty());
        let raw = b"HTTP/1.1 200 OK\nContent-Type: text/html\n\n<p>x</p>";
        assert_eq!(f.clean_response(raw).unwrap(), "<p>x</p>");
    }

    #[test]
    fn missing_separator_is_error() {
        let f = ContentFilter::new(&Selectors::empty());
        let err = f.clean_response(b"HTTP/1.1 200 OK\r\nContent-Type: text/html").unwrap_err();
        assert!(matches!(err, FilterError::MissingBody));
    }

    #[test]
    fn removes_tagged_subtrees() {
        let f = filter(&["nav", "script"], &[], &[], &[]);
        let html = "<nav><a href=\"/\">home</a><p>menu</p></nav><p>z</p><script>var x = 1;</script>";
        assert_eq!(f.clean_html(html), "<p>z</p>");
    }

    #[test]
    fn removes_exact_classes_case_insensitively() {
        let f = filter(&[], &["sidebar"], &[], &[]);
        let html = "<div class=\"main SideBar\">x</div><div class=\"sidebar2\">y</div>";
        assert_eq!(f.clean_html(html), "<div class=\"sidebar2\">y</div>");
    }

    #[test]
    fn class_keyword_patterns() {
        let f = filter(&[], &[], &["^ad-", "-box$", "promo"], &[]);
        let html = concat!(
            "<div class=\"ad-top\">1</div>",
            "<div class=\"top-ad\">2</div>",
            "<div class=\"share-box\">3</div>",
            "<div class=\"box-share\">4</div>",
            "<div class=\"big-PROMO-unit\">5</div>",
        );
        assert_eq!(
            f.clean_html(html),
            "<div class=\"top-ad\">2</div><div class=\"box-share\">4</div>"
        );
    }

    #[test]
    fn body_is_exempt_from_class_rules() {
        let f = filter(&[], &["page"], &["^ad-"], &[]);
        let html = "<html><body class=\"page ad-layout\"><p>kept</p></body></html>";
        assert_eq!(f.clean_html(html), "<p>kept</p>");
    }

    #[test]
    fn removing_body_or_html_empties_output() {
        assert_eq!(filter(&["body"], &[], &[], &[]).clean_html("<p>x</p>"), "");
        assert_eq!(filter(&["html"], &[], &[], &[]).clean_html("<p>x</p>"), "");
    }

    #[test]
    fn strips_prefixed_and_configured_attributes() {
        let f = filter(&[], &[], &[], &["Style"]);
        let html = "<p data-id=\"1\" area-x=\"2\" onClick=\"go()\" itemprop=\"name\" style=\"color:red\" aria-label=\"x\" title=\"t\">a</p>";
        assert_eq!(f.clean_html(html), "<p aria-label=\"x\" title=\"t\">a</p>");
    }

    #[test]
    fn collapses_whitespace_and_drops_comments() {
        let f = ContentFilter::new(&Selectors::empty());
        let html = "<p>Hello \n\n\t  <b>world</b></p>\n<!-- tracking -->\n<p>again</p>";
        assert_eq!(f.clean_html(html), "<p>Hello <b>world</b></p> <p>again</p>");
    }

    #[test]
    fn escapes_text_and_attributes() {
        let f = ContentFilter::new(&Selectors::empty());
        let html = "<p title=\"a &quot;b&quot; &amp; c\">1 &lt; 2 &amp;&amp; 3 &gt; 2</p>";
        assert_eq!(
            f.clean_html(html),
            "<p title=\"a &quot;b&quot; &amp; c\">1 &lt; 2 &amp;&amp; 3 &gt; 2</p>"
        );
    }

    #[test]
    fn void_elements_have_no_end_tag() {
        let f = ContentFilter::new(&Selectors::empty());
        assert_eq!(
            f.clean_html("<p>a<br>b<img src=\"x.png\"></p>"),
            "<p>a<br>b<img src=\"x.png\"></p>"
        );
    }

    #[test]
    fn cleaning_is_idempotent() {
        let f = filter(&["script", "style", "nav"], &["ad"], &["^promo-"], &["style"]);
        let html = concat!(
            "<html><head><title>T</title></head><body>",
            "<nav>menu</nav>",
            "<div class=\"ad\">buy</div>",
            "<article data-track=\"1\" id=\"main\">",
            "<h1 style=\"x\">Title</h1>",
            "<p>Some   text &amp; more</p>",
            "<div class=\"promo-box\">promo</div>",
            "<script>track()</script>",
            "</article></body></html>",
        );
        let once = f.clean_html(html);
        assert_eq!(
            once,
            "<article id=\"main\"><h1>Title</h1><p>Some text &amp; more</p></article>"
        );
        assert_eq!(f.clean_html(&once), once);
    }

    #[test]
    fn class_pattern_parsing() {
        assert_eq!(ClassPattern::parse("^Ad-"), Some(ClassPattern::Prefix("ad-".into())));
        assert_eq!(ClassPattern::parse("-ad$"), Some(ClassPattern::Suffix("-ad".into())));
        assert_eq!(ClassPattern::parse("promo"), Some(ClassPattern::Contains("promo".into())));
        assert_eq!(ClassPattern::parse("^"), None);
        assert_eq!(ClassPattern::parse("  "), None);
    }

    #[test]
    fn text_preview_drops_scripts_and_truncates() {
        let html = "<html><head><style>p{}</style><title>News</title></head><body><p>Hello</p><script>x()</script><p>wörld  again</p></body></html>";
        assert_eq!(text_preview(html, 100), "News Hello wörld again");
        assert_eq!(text_preview(html, 12), "News Hello w");
    }

    fn nested_spans(depth: usize) -> String {
        let mut html = String::with_capacity(depth * 13 + 32);
        html.push_str("<html><body>");
        for _ in 0..depth {
            html.push_str("<span>");
        }
        html.push('x');
        for _ in 0..depth {
            html.push_str("</span>");
        }
        html.push_str("</body></html>");
        html
    }

    #[test]
    fn deep_nesting_fits_a_small_stack() {
        const DEPTH: usize = 100_000;
        let html = nested_spans(DEPTH);

        let (cleaned, preview) = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || {
                let f = ContentFilter::new(&Selectors::default());
                (f.clean_html(&html), text_preview(&html, 10))
            })
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(cleaned.matches("<span>").count(), DEPTH);
        assert_eq!(cleaned.matches("</span>").count(), DEPTH);
        assert!(cleaned.starts_with("<span><span>"));
        assert!(cleaned.contains("<span>x</span>"));
        assert!(cleaned.ends_with("</span></span>"));
        assert_eq!(preview, "x");
    }

    #[test]
    fn end_tags_follow_children_in_order() {
        let f = ContentFilter::new(&Selectors::empty());
        let html = "<div><p>a<b>b</b>c</p><ul><li>1</li><li>2</li></ul></div><p>z</p>";
        assert_eq!(f.clean_html(html), html);
    }
}
