//! Minimal XML element tree and writer for sidecar documents.
//!
//! Output is tab-indented with one element per line. Elements holding text
//! are written inline, and elements with neither text nor children are
//! self-closed.

/// Declaration written at the top of every document.
pub const DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8" standalone="yes"?>"#;

/// An XML element with ordered attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Append a child holding only text.
    pub fn push_text_child(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.children.push(Element::new(name).with_text(text));
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(child);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// First direct child with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn write(&self, out: &mut String, depth: usize) {
        let indent = "\t".repeat(depth);
        out.push_str(&indent);
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value, true));
            out.push('"');
        }

        if self.children.is_empty() {
            match &self.text {
                Some(text) => {
                    out.push('>');
                    out.push_str(&escape(text, false));
                }
                None => {
                    out.push_str(" />\n");
                    return;
                }
            }
        } else {
            out.push('>');
            if let Some(text) = &self.text {
                out.push_str(&escape(text, false));
            }
            out.push('\n');
            for child in &self.children {
                child.write(out, depth + 1);
            }
            out.push_str(&indent);
        }

        out.push_str("</");
        out.push_str(&self.name);
        out.push_str(">\n");
    }
}

/// Serialize `root` as a complete document, declaration included.
pub fn to_document(root: &Element) -> String {
    let mut out = String::from(DECLARATION);
    out.push('\n');
    root.write(&mut out, 0);
    out
}

fn escape(value: &str, attribute: bool) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' if attribute => escaped.push_str("&quot;"),
            '\n' if attribute => escaped.push_str("&#10;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
