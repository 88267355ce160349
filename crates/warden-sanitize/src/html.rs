//! Allow-list HTML sanitizer
//!
//! # Overview
//!
//! Markup is tokenized, built into a small tree, pruned against an
//! [`HtmlPolicy`] and serialized back out:
//!
//! - Elements in `drop_content_tags` are removed together with their content
//! - Other elements outside `allowed_tags` are unwrapped (children kept)
//! - Attributes outside the allow-list and every `on*` handler are dropped
//! - URL attributes must use an allowed scheme or be relative
//! - Character references are decoded once while tokenizing and every text
//!   node and attribute value is escaped on output, so entity-encoded markup
//!   such as `&lt;script&gt;` comes back out as inert text

use crate::entities::{decode_entities, escape_attribute, escape_text};
use crate::lexer::{Tag, Token, parse_tag};
use logos::Logos;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use warden_core::{Error, Result};

/// Elements that never have children
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose body is raw text up to the matching end tag
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "textarea", "title", "xmp", "iframe", "noembed", "noframes", "noscript",
    "plaintext",
];

/// Attributes whose values are navigated to or fetched
const URL_ATTRIBUTES: &[&str] = &[
    "href",
    "src",
    "cite",
    "action",
    "formaction",
    "poster",
    "background",
    "longdesc",
    "xlink:href",
];

/// Schemes that can never be allowed by configuration
const FORBIDDEN_SCHEMES: &[&str] = &["javascript", "vbscript", "livescript", "data"];

const SCRIPT_SCHEMES: &[&str] = &["javascript", "vbscript", "livescript"];

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// What the HTML sanitizer keeps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmlPolicy {
    /// Elements kept in the output
    pub allowed_tags: BTreeSet<String>,
    /// Per-element attribute allow-list
    pub tag_attributes: BTreeMap<String, BTreeSet<String>>,
    /// Attributes allowed on every kept element
    pub global_attributes: BTreeSet<String>,
    /// URL schemes accepted in URL attributes
    pub allowed_schemes: BTreeSet<String>,
    /// Allow `data:image/*` (except SVG) in `<img src>`
    pub allow_data_images: bool,
    /// Elements removed together with everything inside them
    pub drop_content_tags: BTreeSet<String>,
    /// Input longer than this many characters is truncated before parsing
    pub max_length: Option<usize>,
    /// Deeper nesting is flattened into the deepest allowed parent
    pub max_depth: usize,
}

impl Default for HtmlPolicy {
    fn default() -> Self {
        let mut tag_attributes = BTreeMap::new();
        tag_attributes.insert("a".to_string(), set(&["href", "title", "target", "rel"]));
        tag_attributes.insert(
            "img".to_string(),
            set(&["src", "alt", "title", "width", "height"]),
        );
        tag_attributes.insert("td".to_string(), set(&["colspan", "rowspan"]));
        tag_attributes.insert("th".to_string(), set(&["colspan", "rowspan", "scope"]));
        tag_attributes.insert("ol".to_string(), set(&["start"]));
        tag_attributes.insert("blockquote".to_string(), set(&["cite"]));

        Self {
            allowed_tags: set(&[
                "p", "br", "b", "i", "u", "s", "em", "strong", "a", "ul", "ol", "li", "blockquote",
                "code", "pre", "h1", "h2", "h3", "h4", "h5", "h6", "span", "div", "img", "hr",
                "sub", "sup", "table", "thead", "tbody", "tr", "th", "td",
            ]),
            tag_attributes,
            global_attributes: set(&["class", "title", "lang", "dir"]),
            allowed_schemes: set(&["http", "https", "mailto", "tel"]),
            allow_data_images: true,
            drop_content_tags: set(&[
                "script", "style", "iframe", "object", "embed", "applet", "template", "noscript",
                "svg", "math", "textarea", "title", "xmp", "noembed", "noframes", "frameset",
                "frame", "base", "link", "meta", "plaintext", "head",
            ]),
            max_length: None,
            max_depth: 128,
        }
    }
}

impl HtmlPolicy {
    /// Inline formatting only: no links, images or block structure
    pub fn basic() -> Self {
        Self {
            allowed_tags: set(&["b", "i", "u", "em", "strong", "br", "p", "code"]),
            tag_attributes: BTreeMap::new(),
            global_attributes: BTreeSet::new(),
            allow_data_images: false,
            ..Self::default()
        }
    }

    /// Strip every element, keep only text
    pub fn text_only() -> Self {
        Self {
            allowed_tags: BTreeSet::new(),
            tag_attributes: BTreeMap::new(),
            global_attributes: BTreeSet::new(),
            allow_data_images: false,
            ..Self::default()
        }
    }

    /// Allow an element
    pub fn allow_tag(mut self, tag: impl Into<String>) -> Self {
        self.allowed_tags.insert(tag.into().to_ascii_lowercase());
        self
    }

    /// Allow an attribute on one element
    pub fn allow_attribute(mut self, tag: impl Into<String>, attr: impl Into<String>) -> Self {
        self.tag_attributes
            .entry(tag.into().to_ascii_lowercase())
            .or_default()
            .insert(attr.into().to_ascii_lowercase());
        self
    }

    /// Reject contradictory or unsafe policies
    pub fn validate(&self) -> Result<()> {
        if let Some(tag) = self.allowed_tags.intersection(&self.drop_content_tags).next() {
            return Err(Error::Configuration(format!(
                "tag '{}' is both allowed and dropped",
                tag
            )));
        }

        for scheme in &self.allowed_schemes {
            if FORBIDDEN_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) {
                return Err(Error::Configuration(format!(
                    "scheme '{}' cannot be allowed",
                    scheme
                )));
            }
        }

        let attrs = self
            .global_attributes
            .iter()
            .chain(self.tag_attributes.values().flatten());
        for attr in attrs {
            if attr.starts_with("on") || attr == "style" {
                return Err(Error::Configuration(format!(
                    "attribute '{}' cannot be allowed",
                    attr
                )));
            }
        }

        if self.max_depth == 0 {
            return Err(Error::Configuration("max_depth must be positive".into()));
        }

        Ok(())
    }

    fn allows_attribute(&self, tag: &str, attr: &str) -> bool {
        self.global_attributes.contains(attr)
            || self
                .tag_attributes
                .get(tag)
                .is_some_and(|attrs| attrs.contains(attr))
    }

    fn is_safe_url(&self, tag: &str, attr: &str, value: &str) -> bool {
        let compact: String = value
            .chars()
            .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
            .collect::<String>()
            .to_ascii_lowercase();

        match url_scheme(&compact) {
            None => true,
            Some("data") => {
                self.allow_data_images
                    && tag == "img"
                    && attr == "src"
                    && compact.starts_with("data:image/")
                    && !compact.starts_with("data:image/svg")
            }
            Some(scheme) => self.allowed_schemes.contains(scheme),
        }
    }
}

/// Scheme of an absolute URL, `None` for relative references
fn url_scheme(url: &str) -> Option<&str> {
    let colon = url.find(':')?;
    let candidate = &url[..colon];
    if candidate.is_empty() || candidate.contains(['/', '?', '#']) {
        return None;
    }
    candidate
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        .then_some(candidate)
}

/// Remove `javascript:`-style scheme prefixes (and non-image `data:`) from
/// free text. Removal happens against the output as it is built, so text on
/// either side of a removed prefix cannot splice a new one together.
pub fn strip_dangerous_schemes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());

    for (i, c) in input.char_indices() {
        if c == ':' {
            match trailing_scheme(&out) {
                Some((_, true)) if is_inline_image(&input[i + 1..]) => {}
                Some((start, _)) => {
                    out.truncate(start);
                    continue;
                }
                None => {}
            }
        }
        out.push(c);
    }
    out
}

/// Offset of a dangerous scheme name ending `out` (whitespace before the
/// colon allowed), and whether it is `data`
fn trailing_scheme(out: &str) -> Option<(usize, bool)> {
    let name = out.trim_end_matches(char::is_whitespace);
    let ends_with = |suffix: &str| {
        name.len() >= suffix.len()
            && name.as_bytes()[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix.as_bytes())
    };

    if let Some(scheme) = SCRIPT_SCHEMES.iter().find(|scheme| ends_with(scheme)) {
        return Some((name.len() - scheme.len(), false));
    }
    if ends_with("data") {
        let start = name.len() - 4;
        let bounded = name[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '_'));
        if bounded {
            return Some((start, true));
        }
    }
    None
}

fn is_inline_image(rest: &str) -> bool {
    let starts_with = |prefix: &[u8]| {
        rest.len() >= prefix.len() && rest.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix)
    };
    starts_with(b"image/") && !starts_with(b"image/svg")
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    fn from_tag(tag: Tag) -> Self {
        Self {
            name: tag.name,
            attributes: tag
                .attributes
                .into_iter()
                .map(|(k, v)| (k, decode_entities(&v)))
                .collect(),
            children: Vec::new(),
        }
    }
}

fn push_text(nodes: &mut Vec<Node>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Node::Text(existing)) = nodes.last_mut() {
        existing.push_str(text);
    } else {
        nodes.push(Node::Text(text.to_string()));
    }
}

/// Builds a forgiving element tree: unmatched end tags are ignored and
/// unclosed elements are closed at end of input.
struct TreeBuilder {
    root: Vec<Node>,
    stack: Vec<Element>,
    max_depth: usize,
}

impl TreeBuilder {
    fn new(max_depth: usize) -> Self {
        Self {
            root: Vec::new(),
            stack: Vec::new(),
            max_depth,
        }
    }

    fn children_mut(&mut self) -> &mut Vec<Node> {
        match self.stack.last_mut() {
            Some(el) => &mut el.children,
            None => &mut self.root,
        }
    }

    fn text(&mut self, text: &str) {
        push_text(self.children_mut(), text);
    }

    fn open(&mut self, tag: Tag) {
        self.close_implied(&tag.name);

        let is_void = VOID_ELEMENTS.contains(&tag.name.as_str());
        let self_closing = tag.self_closing;
        let element = Element::from_tag(tag);

        if is_void || self_closing {
            self.children_mut().push(Node::Element(element));
        } else if self.stack.len() < self.max_depth {
            self.stack.push(element);
        }
    }

    /// Paragraphs and list items close an open sibling of the same kind
    fn close_implied(&mut self, name: &str) {
        let implied = match name {
            "p" | "div" | "ul" | "ol" | "table" | "blockquote" | "pre" | "h1" | "h2" | "h3"
            | "h4" | "h5" | "h6" | "hr" => "p",
            "li" => "li",
            "tr" => "tr",
            "td" | "th" => {
                if self.stack.last().is_some_and(|el| el.name == "th") {
                    "th"
                } else {
                    "td"
                }
            }
            _ => return,
        };
        if self.stack.last().is_some_and(|el| el.name == implied) {
            self.pop();
        }
    }

    fn close(&mut self, name: &str) {
        if let Some(pos) = self.stack.iter().rposition(|el| el.name == name) {
            while self.stack.len() > pos {
                self.pop();
            }
        }
    }

    fn pop(&mut self) {
        if let Some(el) = self.stack.pop() {
            self.children_mut().push(Node::Element(el));
        }
    }

    fn finish(mut self) -> Vec<Node> {
        while !self.stack.is_empty() {
            self.pop();
        }
        self.root
    }
}

/// Offset of the first `</name` in `haystack`, ignoring ASCII case
fn find_closing_tag(haystack: &str, name: &str) -> Option<usize> {
    let name = name.as_bytes();
    let mut from = 0;

    while let Some(found) = haystack[from..].find("</") {
        let start = from + found;
        let after = &haystack.as_bytes()[start + 2..];
        if after.len() >= name.len() && after[..name.len()].eq_ignore_ascii_case(name) {
            return Some(start);
        }
        from = start + 2;
    }
    None
}

fn parse(input: &str, max_depth: usize) -> Vec<Node> {
    let mut builder = TreeBuilder::new(max_depth);
    let mut lex = Token::lexer(input);

    while let Some(token) = lex.next() {
        match token {
            Ok(Token::StartTag) => {
                let tag = parse_tag(lex.slice());
                if RAW_TEXT_ELEMENTS.contains(&tag.name.as_str()) && !tag.self_closing {
                    let rest = lex.remainder();
                    let end = find_closing_tag(rest, &tag.name).unwrap_or(rest.len());
                    let body = decode_entities(&rest[..end]);
                    lex.bump(end);

                    let mut element = Element::from_tag(tag);
                    push_text(&mut element.children, &body);
                    builder.children_mut().push(Node::Element(element));
                } else {
                    builder.open(tag);
                }
            }
            Ok(Token::EndTag) => {
                let tag = parse_tag(lex.slice());
                builder.close(&tag.name);
            }
            Ok(Token::Comment | Token::Declaration | Token::ProcessingInstruction) => {}
            Ok(Token::Text | Token::Lt) | Err(_) => builder.text(&decode_entities(lex.slice())),
        }
    }

    builder.finish()
}

fn clean_nodes(nodes: Vec<Node>, policy: &HtmlPolicy, out: &mut Vec<Node>) {
    for node in nodes {
        match node {
            Node::Text(text) => push_text(out, &text),
            Node::Element(el) => {
                if policy.drop_content_tags.contains(&el.name) {
                    debug!(tag = %el.name, "Dropped element with content");
                    continue;
                }
                if !policy.allowed_tags.contains(&el.name) {
                    clean_nodes(el.children, policy, out);
                    continue;
                }

                let attributes = clean_attributes(&el.name, el.attributes, policy);
                let mut children = Vec::new();
                clean_nodes(el.children, policy, &mut children);
                out.push(Node::Element(Element {
                    name: el.name,
                    attributes,
                    children,
                }));
            }
        }
    }
}

fn clean_attributes(
    tag: &str,
    attributes: Vec<(String, String)>,
    policy: &HtmlPolicy,
) -> Vec<(String, String)> {
    let mut kept: Vec<(String, String)> = Vec::new();

    for (name, value) in attributes {
        if name.starts_with("on") || !policy.allows_attribute(tag, &name) {
            continue;
        }
        if URL_ATTRIBUTES.contains(&name.as_str()) && !policy.is_safe_url(tag, &name, &value) {
            debug!(tag, attribute = %name, "Dropped unsafe URL attribute");
            continue;
        }
        kept.push((name, strip_dangerous_schemes(&value)));
    }

    let opens_window = kept
        .iter()
        .any(|(k, v)| k == "target" && v.eq_ignore_ascii_case("_blank"));
    if tag == "a" && opens_window {
        kept.retain(|(k, _)| k != "rel");
        kept.push(("rel".to_string(), "noopener noreferrer".to_string()));
    }

    kept
}

fn serialize(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(&escape_text(&strip_dangerous_schemes(text))),
            Node::Element(el) => {
                out.push('<');
                out.push_str(&el.name);
                for (name, value) in &el.attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_attribute(value));
                    out.push('"');
                }
                out.push('>');

                if VOID_ELEMENTS.contains(&el.name.as_str()) {
                    continue;
                }
                serialize(&el.children, out);
                out.push_str("</");
                out.push_str(&el.name);
                out.push('>');
            }
        }
    }
}

/// Sanitize untrusted markup against a policy
pub fn sanitize_html(input: &str, policy: &HtmlPolicy) -> String {
    let input = match policy.max_length {
        Some(max) if input.chars().count() > max => {
            let cut = input
                .char_indices()
                .nth(max)
                .map(|(i, _)| i)
                .unwrap_or(input.len());
            &input[..cut]
        }
        _ => input,
    };

    let tree = parse(input, policy.max_depth);
    let mut cleaned = Vec::new();
    clean_nodes(tree, policy, &mut cleaned);

    let mut out = String::with_capacity(input.len());
    serialize(&cleaned, &mut out);
    out
}
