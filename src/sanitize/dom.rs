//! Owned HTML tree used by the sanitizers.
//!
//! html5ever (through `scraper`) does the parsing; the result is copied into a tree
//! where each element owns its children. Every walk over it (build, prune, search,
//! serialize, drop) uses an explicit stack, so nesting depth never turns into call
//! depth.

use scraper::Html;

/// Elements that never have content or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Elements whose content the parser keeps as one unparsed text node. `noscript`
/// belongs here because the parser runs with scripting enabled.
pub const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "noscript", "plaintext",
];

const DOCUMENT_NAME: &str = "#document";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

impl Node {
    fn is_element_named(&self, name: &str) -> bool {
        matches!(self, Node::Element(el) if el.name == name)
    }

    /// An element whose content is raw text: `<script>`, `<noscript>`, `<style>`, ...
    pub fn is_raw_text_element(&self) -> bool {
        matches!(self, Node::Element(el) if RAW_TEXT_ELEMENTS.contains(&el.name.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// Sorted by name so serialization does not depend on parser attribute order.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    fn from_parsed(el: &scraper::node::Element) -> Self {
        let mut attrs: Vec<(String, String)> = el
            .attrs()
            .filter(|(k, _)| is_xml_name(k))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        attrs.sort();
        // `xml:lang` and `lang` share a local name; an XML element may carry it once.
        attrs.dedup_by(|a, b| a.0 == b.0);
        Self {
            name: el.name().to_string(),
            attrs,
            children: Vec::new(),
        }
    }

    /// Element with a single text child, e.g. a heading.
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut el = Self::new(name);
        el.children.push(Node::Text(text.into()));
        el
    }

    /// Remove every child element named `tag` together with the sibling node right after it.
    /// Applies at every depth.
    pub fn remove_with_trailing_sibling(&mut self, tag: &str) -> usize {
        let mut removed = 0;
        let mut stack: Vec<&mut Element> = vec![self];
        while let Some(el) = stack.pop() {
            let mut i = 0;
            while i < el.children.len() {
                if el.children[i].is_element_named(tag) {
                    el.children.remove(i);
                    removed += 1;
                    if i < el.children.len() {
                        el.children.remove(i);
                    }
                } else {
                    i += 1;
                }
            }
            for child in el.children.iter_mut() {
                if let Node::Element(child) = child {
                    stack.push(child);
                }
            }
        }
        removed
    }

    /// Remove every descendant node matching `pred`, subtree included. Returns how many were removed.
    pub fn remove_where(&mut self, pred: impl Fn(&Node) -> bool) -> usize {
        let mut removed = 0;
        let mut stack: Vec<&mut Element> = vec![self];
        while let Some(el) = stack.pop() {
            let before = el.children.len();
            el.children.retain(|child| !pred(child));
            removed += before - el.children.len();
            for child in el.children.iter_mut() {
                if let Node::Element(child) = child {
                    stack.push(child);
                }
            }
        }
        removed
    }

    /// First element named `tag` in document order, including `self`.
    pub fn find_first(&self, tag: &str) -> Option<&Element> {
        let mut stack: Vec<&Element> = vec![self];
        while let Some(el) = stack.pop() {
            if el.name == tag {
                return Some(el);
            }
            for child in el.children.iter().rev() {
                if let Node::Element(child) = child {
                    stack.push(child);
                }
            }
        }
        None
    }

    /// Mutable variant of [`Element::find_first`].
    pub fn find_first_mut(&mut self, tag: &str) -> Option<&mut Element> {
        let mut stack: Vec<&mut Element> = vec![self];
        while let Some(el) = stack.pop() {
            if el.name == tag {
                return Some(el);
            }
            for child in el.children.iter_mut().rev() {
                if let Node::Element(child) = child {
                    stack.push(child);
                }
            }
        }
        None
    }

    /// Serialize this element and its subtree.
    pub fn to_html(&self) -> String {
        enum Step<'a> {
            Visit(&'a Node),
            Close(&'a str),
        }

        let mut out = String::new();
        let mut stack: Vec<Step<'_>> = Vec::new();
        // The root is an element; walk it the same way as its descendants.
        let mut raw_text = Vec::<bool>::new();
        open_tag(&mut out, self);
        if VOID_ELEMENTS.contains(&self.name.as_str()) {
            return out;
        }
        stack.push(Step::Close(&self.name));
        raw_text.push(RAW_TEXT_ELEMENTS.contains(&self.name.as_str()));
        for child in self.children.iter().rev() {
            stack.push(Step::Visit(child));
        }

        while let Some(step) = stack.pop() {
            match step {
                Step::Close(name) => {
                    out.push_str("</");
                    out.push_str(name);
                    out.push('>');
                    raw_text.pop();
                }
                Step::Visit(Node::Text(text)) => {
                    if raw_text.last().copied().unwrap_or(false) {
                        push_cdata(&mut out, text);
                    } else {
                        escape_text(&mut out, text);
                    }
                }
                Step::Visit(Node::Comment(text)) => {
                    out.push_str("<!--");
                    push_comment(&mut out, text);
                    out.push_str("-->");
                }
                Step::Visit(Node::Element(el)) => {
                    open_tag(&mut out, el);
                    if VOID_ELEMENTS.contains(&el.name.as_str()) {
                        continue;
                    }
                    stack.push(Step::Close(&el.name));
                    raw_text.push(RAW_TEXT_ELEMENTS.contains(&el.name.as_str()));
                    for child in el.children.iter().rev() {
                        stack.push(Step::Visit(child));
                    }
                }
            }
        }
        out
    }
}

impl Drop for Element {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(node) = pending.pop() {
            if let Node::Element(mut el) = node {
                pending.append(&mut el.children);
            }
        }
    }
}

fn open_tag(out: &mut String, el: &Element) {
    out.push('<');
    out.push_str(&el.name);
    for (name, value) in &el.attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_attr(out, value);
        out.push('"');
    }
    if VOID_ELEMENTS.contains(&el.name.as_str()) {
        out.push('/');
    }
    out.push('>');
}

/// Characters XML 1.0 does not allow anywhere in a document.
fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && !matches!(c, '\u{FFFE}' | '\u{FFFF}'))
}

/// Attribute names that survive as XML names without a namespace prefix.
fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Raw text goes out as CDATA so `<` and `&` in it stay legal XML.
fn push_cdata(out: &mut String, s: &str) {
    if s.is_empty() {
        return;
    }
    let text: String = s.chars().filter(|c| is_xml_char(*c)).collect();
    out.push_str("<![CDATA[");
    out.push_str(&text.replace("]]>", "]]]]><![CDATA[>"));
    out.push_str("]]>");
}

/// Comment text with `--` broken up and no trailing `-`, as XML requires.
fn push_comment(out: &mut String, s: &str) {
    let mut prev_dash = false;
    for c in s.chars().filter(|c| is_xml_char(*c)) {
        if c == '-' && prev_dash {
            out.push(' ');
        }
        out.push(c);
        prev_dash = c == '-';
    }
    if prev_dash {
        out.push(' ');
    }
}

fn escape_text(out: &mut String, s: &str) {
    for c in s.chars().filter(|c| is_xml_char(*c)) {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(out: &mut String, s: &str) {
    for c in s.chars().filter(|c| is_xml_char(*c)) {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

/// Parse markup as a full HTML document and return the owned tree rooted at a
/// synthetic `#document` element. The parser adds `html`, `head` and `body` when
/// they are missing.
pub fn parse_document(markup: &str) -> Element {
    let parsed = Html::parse_document(markup);
    let mut stack = vec![(parsed.tree.root().children(), Element::new(DOCUMENT_NAME))];
    loop {
        let next = match stack.last_mut() {
            Some((children, _)) => children.next(),
            None => return Element::new(DOCUMENT_NAME),
        };
        match next {
            Some(child) => {
                let leaf = match child.value() {
                    scraper::Node::Element(el) => {
                        stack.push((child.children(), Element::from_parsed(el)));
                        None
                    }
                    scraper::Node::Text(text) => Some(Node::Text((**text).to_owned())),
                    scraper::Node::Comment(comment) => Some(Node::Comment((**comment).to_owned())),
                    _ => None,
                };
                if let (Some(leaf), Some((_, parent))) = (leaf, stack.last_mut()) {
                    parent.children.push(leaf);
                }
            }
            None => {
                let Some((_, done)) = stack.pop() else {
                    return Element::new(DOCUMENT_NAME);
                };
                match stack.last_mut() {
                    Some((_, parent)) => parent.children.push(Node::Element(done)),
                    None => return done,
                }
            }
        }
    }
}
