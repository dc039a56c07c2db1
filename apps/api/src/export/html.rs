//! HTML fragment → closed node tree.
//!
//! Editor output is parsed with `scraper` (html5ever) and folded into [`HtmlNode`], a
//! small sum type covering the element kinds the exporters understand. Tag names are
//! mapped once in [`classify`]; everything downstream matches exhaustively on the
//! enums, so a new kind of node cannot be silently ignored by a translator.

use scraper::{ElementRef, Html, Node};
use thiserror::Error;

/// Nesting deeper than this is treated as a malformed tree.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HtmlError {
    #[error("markup nested deeper than {MAX_DEPTH} levels")]
    TooDeep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Bullet,
    Numbered,
}

/// Formatting contributed by an inline element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineStyle {
    Bold,
    Italic,
    Underline,
    /// Hyperlink; the target is not kept.
    Link,
    /// Any other inline tag (`span`, `s`, `code`, ...).
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtmlNode {
    /// `h1`..`h6`; carries the element's full text content.
    Heading { level: u8, text: String },
    Paragraph(Vec<HtmlNode>),
    List { kind: ListKind, items: Vec<ListItem> },
    Break,
    /// Structural wrapper (`div`, `section`, ...) with no output of its own.
    Container(Vec<HtmlNode>),
    Inline { style: InlineStyle, children: Vec<HtmlNode> },
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    /// Inline content, possibly followed by nested [`HtmlNode::List`]s.
    pub children: Vec<HtmlNode>,
}

/// What a tag name means to the exporters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementKind {
    Heading(u8),
    Paragraph,
    List(ListKind),
    ListItem,
    Break,
    Container,
    Inline(InlineStyle),
    Ignored,
}

fn classify(tag: &str) -> ElementKind {
    match tag {
        "h1" => ElementKind::Heading(1),
        "h2" => ElementKind::Heading(2),
        "h3" => ElementKind::Heading(3),
        "h4" => ElementKind::Heading(4),
        "h5" => ElementKind::Heading(5),
        "h6" => ElementKind::Heading(6),
        "p" => ElementKind::Paragraph,
        "ul" => ElementKind::List(ListKind::Bullet),
        "ol" => ElementKind::List(ListKind::Numbered),
        "li" => ElementKind::ListItem,
        "br" => ElementKind::Break,
        "div" | "section" | "article" | "header" | "footer" | "main" | "nav" | "aside"
        | "blockquote" | "body" | "html" => ElementKind::Container,
        "b" | "strong" => ElementKind::Inline(InlineStyle::Bold),
        "i" | "em" => ElementKind::Inline(InlineStyle::Italic),
        "u" | "ins" => ElementKind::Inline(InlineStyle::Underline),
        "a" => ElementKind::Inline(InlineStyle::Link),
        "script" | "style" | "head" | "title" | "template" | "noscript" => ElementKind::Ignored,
        _ => ElementKind::Inline(InlineStyle::Plain),
    }
}

/// Parses an editor HTML fragment into top-level nodes.
pub fn parse_fragment(html: &str) -> Result<Vec<HtmlNode>, HtmlError> {
    let fragment = Html::parse_fragment(html);
    convert_children(fragment.root_element(), 0)
}

fn convert_children(element: ElementRef<'_>, depth: usize) -> Result<Vec<HtmlNode>, HtmlError> {
    if depth > MAX_DEPTH {
        return Err(HtmlError::TooDeep);
    }

    let mut nodes = Vec::new();
    for child in element.children() {
        match child.value() {
            Node::Text(text) => nodes.push(HtmlNode::Text(String::from(&**text))),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    if let Some(node) = convert_element(child, depth + 1)? {
                        nodes.push(node);
                    }
                }
            }
            // comments, doctypes, processing instructions
            _ => {}
        }
    }
    Ok(nodes)
}

fn convert_element(element: ElementRef<'_>, depth: usize) -> Result<Option<HtmlNode>, HtmlError> {
    let node = match classify(element.value().name()) {
        ElementKind::Heading(level) => HtmlNode::Heading {
            level,
            text: element.text().collect(),
        },
        ElementKind::Paragraph => HtmlNode::Paragraph(convert_children(element, depth)?),
        ElementKind::List(kind) => HtmlNode::List {
            kind,
            items: convert_list_items(element, depth)?,
        },
        // A stray item outside of a list is just a wrapper.
        ElementKind::ListItem | ElementKind::Container => {
            HtmlNode::Container(convert_children(element, depth)?)
        }
        ElementKind::Break => HtmlNode::Break,
        ElementKind::Inline(style) => HtmlNode::Inline {
            style,
            children: convert_children(element, depth)?,
        },
        ElementKind::Ignored => return Ok(None),
    };
    Ok(Some(node))
}

fn convert_list_items(list: ElementRef<'_>, depth: usize) -> Result<Vec<ListItem>, HtmlError> {
    let mut items = Vec::new();
    for node in convert_children(list, depth)? {
        match node {
            // whitespace between <li> tags
            HtmlNode::Text(text) if text.trim().is_empty() => {}
            HtmlNode::Container(children) => items.push(ListItem { children }),
            other => items.push(ListItem {
                children: vec![other],
            }),
        }
    }
    Ok(items)
}

/// Concatenated text of a node list, like the DOM's `textContent`.
pub fn text_content(nodes: &[HtmlNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        push_text(node, &mut out);
    }
    out
}

fn push_text(node: &HtmlNode, out: &mut String) {
    match node {
        HtmlNode::Text(text) => out.push_str(text),
        HtmlNode::Heading { text, .. } => out.push_str(text),
        HtmlNode::Paragraph(children)
        | HtmlNode::Container(children)
        | HtmlNode::Inline { children, .. } => {
            for child in children {
                push_text(child, out);
            }
        }
        HtmlNode::List { items, .. } => {
            for item in items {
                for child in &item.children {
                    push_text(child, out);
                }
            }
        }
        HtmlNode::Break => {}
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> HtmlNode {
        HtmlNode::Text(s.to_string())
    }

    #[test]
    fn test_heading_and_paragraph() {
        let nodes = parse_fragment("<h1>A</h1><p>B</p>").unwrap();
        assert_eq!(
            nodes,
            vec![
                HtmlNode::Heading {
                    level: 1,
                    text: "A".to_string()
                },
                HtmlNode::Paragraph(vec![text("B")]),
            ]
        );
    }

    #[test]
    fn test_list_items_skip_whitespace() {
        let nodes = parse_fragment("<ul>\n<li>X</li>\n<li>Y</li>\n</ul>").unwrap();
        let HtmlNode::List { kind, items } = &nodes[0] else {
            panic!("expected a list, got {nodes:?}");
        };
        assert_eq!(*kind, ListKind::Bullet);
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].children, vec![text("Y")]);
    }

    #[test]
    fn test_inline_styles_are_classified() {
        let nodes = parse_fragment("<p><strong>b</strong><em>i</em><u>u</u><a href=\"x\">l</a><span>s</span></p>")
            .unwrap();
        let HtmlNode::Paragraph(children) = &nodes[0] else {
            panic!("expected a paragraph");
        };
        let styles: Vec<InlineStyle> = children
            .iter()
            .map(|c| match c {
                HtmlNode::Inline { style, .. } => *style,
                other => panic!("unexpected node {other:?}"),
            })
            .collect();
        assert_eq!(
            styles,
            vec![
                InlineStyle::Bold,
                InlineStyle::Italic,
                InlineStyle::Underline,
                InlineStyle::Link,
                InlineStyle::Plain
            ]
        );
    }

    #[test]
    fn test_script_and_comments_are_dropped() {
        let nodes = parse_fragment("<!-- note --><script>alert(1)</script><p>ok</p>").unwrap();
        assert_eq!(nodes, vec![HtmlNode::Paragraph(vec![text("ok")])]);
    }

    #[test]
    fn test_heading_text_flattens_inline_markup() {
        let nodes = parse_fragment("<h4>Sub <em>title</em></h4>").unwrap();
        assert_eq!(
            nodes,
            vec![HtmlNode::Heading {
                level: 4,
                text: "Sub title".to_string()
            }]
        );
    }

    #[test]
    fn test_excessive_nesting_is_rejected() {
        let html = format!("{}x{}", "<div>".repeat(MAX_DEPTH + 10), "</div>".repeat(MAX_DEPTH + 10));
        assert_eq!(parse_fragment(&html), Err(HtmlError::TooDeep));
    }

    #[test]
    fn test_text_content_concatenates() {
        let nodes = parse_fragment("<div><p>a<b>b</b></p><ul><li>c</li></ul></div>").unwrap();
        assert_eq!(text_content(&nodes), "abc");
    }
}
