//! Owned, mutable copy of a parsed fragment.
//!
//! `scraper` trees are read-only and not `Send`, so extraction copies the
//! content element into this tree, edits it, and serializes it back.

use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::ElementRef;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentNode {
    Element(FragmentElement),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FragmentElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<FragmentNode>,
}

impl FragmentElement {
    pub fn from_element_ref(element: ElementRef<'_>) -> Self {
        let value = element.value();
        let mut out = FragmentElement {
            name: value.name().to_ascii_lowercase(),
            attrs: value
                .attrs()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            children: Vec::new(),
        };
        for child in element.children() {
            if let Some(node) = copy_node(child) {
                out.children.push(node);
            }
        }
        out
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self.attrs.iter().position(|(key, _)| key == name)?;
        Some(self.attrs.remove(pos).1)
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// Visit this element and every descendant element, parents first.
    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut FragmentElement)) {
        f(self);
        for child in &mut self.children {
            if let FragmentNode::Element(element) = child {
                element.walk_mut(f);
            }
        }
    }

    pub fn walk(&self, f: &mut impl FnMut(&FragmentElement)) {
        f(self);
        for child in &self.children {
            if let FragmentNode::Element(element) = child {
                element.walk(f);
            }
        }
    }

    pub fn open_tag(&self) -> String {
        let mut out = String::new();
        write_open_tag(self, &mut out);
        out
    }

    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        let raw = RAW_TEXT_ELEMENTS.contains(&self.name.as_str());
        for child in &self.children {
            write_node(child, raw, &mut out);
        }
        out
    }

    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        write_element(self, &mut out);
        out
    }
}

fn copy_node(node: NodeRef<'_, Node>) -> Option<FragmentNode> {
    match node.value() {
        Node::Text(text) => Some(FragmentNode::Text(text.to_string())),
        Node::Comment(comment) => Some(FragmentNode::Comment(comment.to_string())),
        Node::Element(_) => ElementRef::wrap(node)
            .map(|element| FragmentNode::Element(FragmentElement::from_element_ref(element))),
        _ => None,
    }
}

fn collect_text(nodes: &[FragmentNode], out: &mut String) {
    for node in nodes {
        match node {
            FragmentNode::Text(text) => out.push_str(text),
            FragmentNode::Element(element) => collect_text(&element.children, out),
            FragmentNode::Comment(_) => {}
        }
    }
}

fn write_open_tag(element: &FragmentElement, out: &mut String) {
    out.push('<');
    out.push_str(&element.name);
    for (name, value) in &element.attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_attr(value, out);
        out.push('"');
    }
    out.push('>');
}

fn write_element(element: &FragmentElement, out: &mut String) {
    write_open_tag(element, out);
    if VOID_ELEMENTS.contains(&element.name.as_str()) {
        return;
    }
    let raw = RAW_TEXT_ELEMENTS.contains(&element.name.as_str());
    for child in &element.children {
        write_node(child, raw, out);
    }
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

fn write_node(node: &FragmentNode, raw: bool, out: &mut String) {
    match node {
        FragmentNode::Element(element) => write_element(element, out),
        FragmentNode::Text(text) if raw => out.push_str(text),
        FragmentNode::Text(text) => escape_text(text, out),
        FragmentNode::Comment(comment) => {
            out.push_str("<!--");
            out.push_str(comment);
            out.push_str("-->");
        }
    }
}

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use scraper::Html;

    use super::*;

    fn first_element(html: &str) -> FragmentElement {
        let fragment = Html::parse_fragment(html);
        let element = fragment
            .root_element()
            .children()
            .find_map(ElementRef::wrap)
            .unwrap();
        FragmentElement::from_element_ref(element)
    }

    #[test]
    fn serializes_back_with_escaping() {
        let element = first_element(r#"<p title="a &quot;b&quot;">x &lt; y<br>z<!--c--></p>"#);
        assert_eq!(
            element.outer_html(),
            r#"<p title="a &quot;b&quot;">x &lt; y<br>z<!--c--></p>"#
        );
        assert_eq!(element.text_content(), "x < yz");
    }

    #[test]
    fn style_contents_stay_raw() {
        let element = first_element("<div><style>a > b { color: red }</style></div>");
        assert_eq!(
            element.inner_html(),
            "<style>a > b { color: red }</style>"
        );
    }

    #[test]
    fn attribute_edits() {
        let mut element = first_element(r#"<img src="a.png">"#);
        element.set_attr("src", "b.png");
        element.set_attr("alt", "pic");
        assert_eq!(element.attr("src"), Some("b.png"));
        assert_eq!(element.remove_attr("alt"), Some("pic".to_string()));
        assert_eq!(element.remove_attr("alt"), None);
        assert_eq!(element.outer_html(), r#"<img src="b.png">"#);
    }
}
