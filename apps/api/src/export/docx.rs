//! HTML → DOCX translator.
//!
//! Translation is two pure steps: [`translate_pages`] walks each page's node tree and
//! produces a flat list of [`Block`]s, and [`render_docx`] packages those blocks with
//! `docx-rs`. Pages are separated by a forced page break, so N pages always yield
//! N − 1 breaks. Any error aborts the whole export; there is no partial output.

use std::io::Cursor;

use docx_rs::{
    AbstractNumbering, BreakType, Docx, IndentLevel, Level, LevelJc, LevelText, LineSpacing,
    NumberFormat, Numbering, NumberingId, PageMargin, Paragraph, Run, Start, Style, StyleType,
};

use crate::document::Page;
use crate::export::html::{self, HtmlNode, InlineStyle, ListItem, ListKind};
use crate::export::ExportError;
use crate::layout::DocxLayout;

// ────────────────────────────────────────────────────────────────────────────
// Block model
// ────────────────────────────────────────────────────────────────────────────

/// Heading styles. `h4`..`h6` share one sub-heading style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingLevel {
    One,
    Two,
    Three,
    Sub,
}

impl HeadingLevel {
    fn from_tag_level(level: u8) -> Self {
        match level {
            1 => HeadingLevel::One,
            2 => HeadingLevel::Two,
            3 => HeadingLevel::Three,
            _ => HeadingLevel::Sub,
        }
    }

    /// Spacing before/after, in twips.
    fn spacing(self) -> (u32, u32) {
        match self {
            HeadingLevel::One => (240, 120),
            HeadingLevel::Two => (200, 100),
            HeadingLevel::Three => (160, 80),
            HeadingLevel::Sub => (120, 60),
        }
    }

    fn style_id(self) -> &'static str {
        match self {
            HeadingLevel::One => "Heading1",
            HeadingLevel::Two => "Heading2",
            HeadingLevel::Three => "Heading3",
            HeadingLevel::Sub => "Heading4",
        }
    }

    /// Font size in half-points.
    fn size(self) -> usize {
        match self {
            HeadingLevel::One => 32,
            HeadingLevel::Two => 28,
            HeadingLevel::Three => 26,
            HeadingLevel::Sub => 24,
        }
    }

    const ALL: [HeadingLevel; 4] = [
        HeadingLevel::One,
        HeadingLevel::Two,
        HeadingLevel::Three,
        HeadingLevel::Sub,
    ];
}

/// A formatted span of text inside a paragraph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextRun {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    /// Hex RGB, e.g. `0000FF` for links.
    pub color: Option<&'static str>,
    /// A forced line break instead of text.
    pub line_break: bool,
}

impl TextRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    fn styled(text: &str, style: RunStyle) -> Self {
        Self {
            text: text.to_string(),
            bold: style.bold,
            italic: style.italic,
            underline: style.underline,
            color: style.color,
            line_break: false,
        }
    }

    fn line_break() -> Self {
        Self {
            line_break: true,
            ..Default::default()
        }
    }
}

/// One paragraph-equivalent unit of the output document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: HeadingLevel, text: String },
    Paragraph { runs: Vec<TextRun> },
    ListItem { kind: ListKind, level: usize, runs: Vec<TextRun> },
    /// An empty paragraph (block-level `<br>` or an empty page).
    Empty,
    /// Forced page break between document pages.
    PageBreak,
}

/// Formatting inherited down the inline tree.
#[derive(Debug, Clone, Copy, Default)]
struct RunStyle {
    bold: bool,
    italic: bool,
    underline: bool,
    color: Option<&'static str>,
}

const LINK_COLOR: &str = "0000FF";

impl RunStyle {
    fn with(mut self, style: InlineStyle) -> Self {
        match style {
            InlineStyle::Bold => self.bold = true,
            InlineStyle::Italic => self.italic = true,
            InlineStyle::Underline => self.underline = true,
            InlineStyle::Link => {
                self.underline = true;
                self.color = Some(LINK_COLOR);
            }
            InlineStyle::Plain => {}
        }
        self
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Translation
// ────────────────────────────────────────────────────────────────────────────

/// Translates every page, inserting a page break between consecutive pages.
pub fn translate_pages(pages: &[Page]) -> Result<Vec<Block>, ExportError> {
    let mut blocks = Vec::new();
    for (index, page) in pages.iter().enumerate() {
        if index > 0 {
            blocks.push(Block::PageBreak);
        }
        let page_blocks = translate_page(&page.content).map_err(|e| ExportError::Malformed {
            page: index,
            reason: e.to_string(),
        })?;
        blocks.extend(page_blocks);
    }
    Ok(blocks)
}

/// Translates one page. Never returns an empty list.
pub fn translate_page(content: &str) -> Result<Vec<Block>, html::HtmlError> {
    let nodes = html::parse_fragment(content)?;

    let mut writer = BlockWriter::default();
    for node in &nodes {
        writer.block(node);
    }
    writer.flush_inline();

    if writer.blocks.is_empty() {
        writer.blocks.push(Block::Empty);
    }
    Ok(writer.blocks)
}

#[derive(Default)]
struct BlockWriter {
    blocks: Vec<Block>,
    /// Inline content met directly inside a container, gathered into one paragraph.
    pending: Vec<TextRun>,
}

impl BlockWriter {
    fn block(&mut self, node: &HtmlNode) {
        match node {
            HtmlNode::Heading { level, text } => {
                self.flush_inline();
                self.blocks.push(Block::Heading {
                    level: HeadingLevel::from_tag_level(*level),
                    text: text.clone(),
                });
            }
            HtmlNode::Paragraph(children) => {
                self.flush_inline();
                let mut runs = inline_runs(children, RunStyle::default());
                if runs.is_empty() {
                    let text = html::text_content(children);
                    if text.trim().is_empty() {
                        return;
                    }
                    runs.push(TextRun::plain(text));
                }
                self.blocks.push(Block::Paragraph { runs });
            }
            HtmlNode::List { kind, items } => {
                self.flush_inline();
                self.list(*kind, items, 0);
            }
            HtmlNode::Break => {
                self.flush_inline();
                self.blocks.push(Block::Empty);
            }
            HtmlNode::Container(children) => {
                for child in children {
                    self.block(child);
                }
            }
            HtmlNode::Inline { .. } | HtmlNode::Text(_) => {
                self.pending
                    .extend(inline_runs(std::slice::from_ref(node), RunStyle::default()));
            }
        }
    }

    fn list(&mut self, kind: ListKind, items: &[ListItem], level: usize) {
        for item in items {
            let (nested, inline): (Vec<&HtmlNode>, Vec<&HtmlNode>) = item
                .children
                .iter()
                .partition(|n| matches!(n, HtmlNode::List { .. }));

            let mut runs = Vec::new();
            for node in &inline {
                runs.extend(inline_runs(std::slice::from_ref(*node), RunStyle::default()));
            }
            if runs.is_empty() {
                let text: String = inline
                    .iter()
                    .map(|n| html::text_content(std::slice::from_ref(*n)))
                    .collect();
                if !text.trim().is_empty() {
                    runs.push(TextRun::plain(text));
                }
            }
            self.blocks.push(Block::ListItem { kind, level, runs });

            for node in nested {
                if let HtmlNode::List { kind, items } = node {
                    self.list(*kind, items, level + 1);
                }
            }
        }
    }

    fn flush_inline(&mut self) {
        if !self.pending.is_empty() {
            let runs = std::mem::take(&mut self.pending);
            self.blocks.push(Block::Paragraph { runs });
        }
    }
}

/// Maps inline content to runs. Formatting accumulates down the tree, so nested
/// elements add their formatting to what their ancestors set: `<b><i>x</i></b>`
/// is one bold italic run, not italic only (innermost wins) or bold only
/// (outermost wins).
fn inline_runs(nodes: &[HtmlNode], style: RunStyle) -> Vec<TextRun> {
    let mut runs = Vec::new();
    for node in nodes {
        match node {
            HtmlNode::Text(text) => {
                if !text.trim().is_empty() {
                    runs.push(TextRun::styled(text, style));
                }
            }
            HtmlNode::Inline {
                style: inline,
                children,
            } => {
                let nested = inline_runs(children, style.with(*inline));
                if nested.is_empty() {
                    // Unknown tag whose content produced nothing: flatten its text.
                    let text = html::text_content(children);
                    if !text.trim().is_empty() {
                        runs.push(TextRun::styled(&text, style.with(*inline)));
                    }
                } else {
                    runs.extend(nested);
                }
            }
            HtmlNode::Break => runs.push(TextRun::line_break()),
            HtmlNode::Heading { text, .. } => {
                if !text.trim().is_empty() {
                    runs.push(TextRun::styled(text, style));
                }
            }
            HtmlNode::Paragraph(children) | HtmlNode::Container(children) => {
                runs.extend(inline_runs(children, style));
            }
            HtmlNode::List { items, .. } => {
                for item in items {
                    runs.extend(inline_runs(&item.children, style));
                }
            }
        }
    }
    runs
}

// ────────────────────────────────────────────────────────────────────────────
// Packaging
// ────────────────────────────────────────────────────────────────────────────

const BULLET_NUMBERING_ID: usize = 1;
const DECIMAL_NUMBERING_ID: usize = 2;
const MAX_LIST_LEVEL: usize = 8;

const BODY_SPACING_AFTER: u32 = 120;
const LIST_SPACING_AFTER: u32 = 60;

/// Packages blocks into a single-section DOCX with uniform margins.
pub fn render_docx(blocks: &[Block], layout: &DocxLayout) -> Result<Vec<u8>, ExportError> {
    let m = layout.margin_twips;
    let mut docx = Docx::new()
        .page_margin(PageMargin::new().top(m).bottom(m).left(m).right(m))
        .add_abstract_numbering(list_numbering(BULLET_NUMBERING_ID, ListKind::Bullet))
        .add_numbering(Numbering::new(BULLET_NUMBERING_ID, BULLET_NUMBERING_ID))
        .add_abstract_numbering(list_numbering(DECIMAL_NUMBERING_ID, ListKind::Numbered))
        .add_numbering(Numbering::new(DECIMAL_NUMBERING_ID, DECIMAL_NUMBERING_ID));

    for level in HeadingLevel::ALL {
        docx = docx.add_style(
            Style::new(level.style_id(), StyleType::Paragraph)
                .name(format!("Heading {}", level.style_id().trim_start_matches("Heading")))
                .size(level.size())
                .bold(),
        );
    }

    for block in blocks {
        docx = docx.add_paragraph(paragraph_for(block));
    }

    let mut buffer = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut buffer)
        .map_err(|e| ExportError::Docx(e.to_string()))?;
    Ok(buffer.into_inner())
}

fn list_numbering(id: usize, kind: ListKind) -> AbstractNumbering {
    let mut numbering = AbstractNumbering::new(id);
    for level in 0..=MAX_LIST_LEVEL {
        let (format, text) = match kind {
            ListKind::Bullet => ("bullet", "•".to_string()),
            ListKind::Numbered => ("decimal", format!("%{}.", level + 1)),
        };
        numbering = numbering.add_level(Level::new(
            level,
            Start::new(1),
            NumberFormat::new(format),
            LevelText::new(text),
            LevelJc::new("left"),
        ));
    }
    numbering
}

fn paragraph_for(block: &Block) -> Paragraph {
    match block {
        Block::Heading { level, text } => {
            let (before, after) = level.spacing();
            Paragraph::new()
                .add_run(Run::new().add_text(text.as_str()))
                .style(level.style_id())
                .line_spacing(LineSpacing::new().before(before).after(after))
        }
        Block::Paragraph { runs } => runs
            .iter()
            .fold(Paragraph::new(), |p, r| p.add_run(run_for(r)))
            .line_spacing(LineSpacing::new().after(BODY_SPACING_AFTER)),
        Block::ListItem { kind, level, runs } => {
            let numbering_id = match kind {
                ListKind::Bullet => BULLET_NUMBERING_ID,
                ListKind::Numbered => DECIMAL_NUMBERING_ID,
            };
            runs.iter()
                .fold(Paragraph::new(), |p, r| p.add_run(run_for(r)))
                .numbering(
                    NumberingId::new(numbering_id),
                    IndentLevel::new((*level).min(MAX_LIST_LEVEL)),
                )
                .line_spacing(LineSpacing::new().after(LIST_SPACING_AFTER))
        }
        Block::Empty => Paragraph::new(),
        Block::PageBreak => Paragraph::new().add_run(Run::new().add_break(BreakType::Page)),
    }
}

fn run_for(run: &TextRun) -> Run {
    if run.line_break {
        return Run::new().add_break(BreakType::TextWrapping);
    }
    let mut out = Run::new().add_text(run.text.as_str());
    if run.bold {
        out = out.bold();
    }
    if run.italic {
        out = out.italic();
    }
    if run.underline {
        out = out.underline("single");
    }
    if let Some(color) = run.color {
        out = out.color(color);
    }
    out
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::default_docx_layout;

    fn pages(contents: &[&str]) -> Vec<Page> {
        contents
            .iter()
            .enumerate()
            .map(|(i, c)| Page {
                id: (i as i64).into(),
                content: c.to_string(),
            })
            .collect()
    }

    fn page_breaks(blocks: &[Block]) -> usize {
        blocks.iter().filter(|b| **b == Block::PageBreak).count()
    }

    #[test]
    fn test_heading_then_paragraph() {
        let blocks = translate_page("<h1>A</h1><p>B</p>").unwrap();
        assert_eq!(
            blocks,
            vec![
                Block::Heading {
                    level: HeadingLevel::One,
                    text: "A".to_string()
                },
                Block::Paragraph {
                    runs: vec![TextRun::plain("B")]
                },
            ]
        );
    }

    #[test]
    fn test_unordered_list_items_in_order() {
        let blocks = translate_page("<ul><li>X</li><li>Y</li></ul>").unwrap();
        assert_eq!(
            blocks,
            vec![
                Block::ListItem {
                    kind: ListKind::Bullet,
                    level: 0,
                    runs: vec![TextRun::plain("X")]
                },
                Block::ListItem {
                    kind: ListKind::Bullet,
                    level: 0,
                    runs: vec![TextRun::plain("Y")]
                },
            ]
        );
    }

    #[test]
    fn test_ordered_list_is_numbered() {
        let blocks = translate_page("<ol><li>first</li></ol>").unwrap();
        assert!(matches!(
            blocks[0],
            Block::ListItem {
                kind: ListKind::Numbered,
                ..
            }
        ));
    }

    #[test]
    fn test_nested_list_follows_parent_item_one_level_deeper() {
        let blocks = translate_page("<ul><li>Parent<ul><li>Child</li></ul></li><li>Next</li></ul>").unwrap();
        let summary: Vec<(usize, String)> = blocks
            .iter()
            .map(|b| match b {
                Block::ListItem { level, runs, .. } => (*level, runs[0].text.clone()),
                other => panic!("unexpected block {other:?}"),
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, "Parent".to_string()),
                (1, "Child".to_string()),
                (0, "Next".to_string())
            ]
        );
    }

    #[test]
    fn test_h4_to_h6_collapse_to_sub_heading() {
        let blocks = translate_page("<h4>a</h4><h5>b</h5><h6>c</h6>").unwrap();
        assert!(blocks.iter().all(|b| matches!(
            b,
            Block::Heading {
                level: HeadingLevel::Sub,
                ..
            }
        )));
    }

    #[test]
    fn test_inline_formatting_runs() {
        let blocks =
            translate_page("<p><strong>Email:</strong> me@x.io <em>now</em> <u>u</u> <a href=\"https://x\">site</a></p>")
                .unwrap();
        let Block::Paragraph { runs } = &blocks[0] else {
            panic!("expected paragraph");
        };
        assert_eq!(runs.len(), 5);
        assert!(runs[0].bold && runs[0].text == "Email:");
        assert_eq!(runs[1], TextRun::plain(" me@x.io "));
        assert!(runs[2].italic);
        assert!(runs[3].underline && runs[3].color.is_none());
        assert!(runs[4].underline);
        assert_eq!(runs[4].color, Some("0000FF"));
        assert_eq!(runs[4].text, "site");
    }

    #[test]
    fn test_nested_formatting_accumulates() {
        let blocks = translate_page("<p><em>a <strong>b</strong></em></p>").unwrap();
        let Block::Paragraph { runs } = &blocks[0] else {
            panic!("expected paragraph");
        };
        assert!(runs[0].italic && !runs[0].bold);
        assert!(runs[1].italic && runs[1].bold);
    }

    #[test]
    fn test_inline_break_forces_line_break_run() {
        let blocks = translate_page("<p>line one<br>line two</p>").unwrap();
        let Block::Paragraph { runs } = &blocks[0] else {
            panic!("expected paragraph");
        };
        assert_eq!(runs.len(), 3);
        assert!(runs[1].line_break);
    }

    #[test]
    fn test_block_break_is_empty_paragraph() {
        let blocks = translate_page("<p>a</p><br><p>b</p>").unwrap();
        assert_eq!(blocks[1], Block::Empty);
    }

    #[test]
    fn test_containers_emit_no_wrapper() {
        let blocks = translate_page("<div><h2>T</h2><div><p>x</p></div></div>").unwrap();
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn test_whitespace_only_text_is_dropped() {
        let blocks = translate_page("<h1>A</h1>\n   \n<p>B</p>\n").unwrap();
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn test_loose_inline_content_becomes_one_paragraph() {
        let blocks = translate_page("Hello <b>there</b><h2>Next</h2>").unwrap();
        assert_eq!(blocks.len(), 2);
        let Block::Paragraph { runs } = &blocks[0] else {
            panic!("expected paragraph");
        };
        assert_eq!(runs.len(), 2);
        assert!(runs[1].bold);
    }

    #[test]
    fn test_empty_page_yields_single_empty_paragraph() {
        assert_eq!(translate_page("").unwrap(), vec![Block::Empty]);
        assert_eq!(translate_page("<p>   </p>").unwrap(), vec![Block::Empty]);
    }

    #[test]
    fn test_page_breaks_between_pages() {
        for n in 1..=5 {
            let contents: Vec<String> = (0..n).map(|i| format!("<p>page {i}</p>")).collect();
            let refs: Vec<&str> = contents.iter().map(String::as_str).collect();
            let blocks = translate_pages(&pages(&refs)).unwrap();
            assert_eq!(page_breaks(&blocks), n - 1, "for {n} pages");
            assert_ne!(blocks.first(), Some(&Block::PageBreak));
            assert_ne!(blocks.last(), Some(&Block::PageBreak));
        }
    }

    #[test]
    fn test_empty_pages_still_separated() {
        let blocks = translate_pages(&pages(&["", ""])).unwrap();
        assert_eq!(blocks, vec![Block::Empty, Block::PageBreak, Block::Empty]);
    }

    #[test]
    fn test_malformed_page_aborts_translation() {
        let deep = "<div>".repeat(html::MAX_DEPTH + 5);
        let err = translate_pages(&pages(&["<p>ok</p>", &deep])).unwrap_err();
        assert!(matches!(err, ExportError::Malformed { page: 1, .. }));
    }

    #[test]
    fn test_render_docx_produces_zip_package() {
        let blocks = translate_pages(&pages(&[
            crate::templates::find(1).unwrap().content,
            "<p>second</p>",
        ]))
        .unwrap();
        let bytes = render_docx(&blocks, &default_docx_layout()).unwrap();
        assert!(bytes.starts_with(b"PK"), "DOCX must be a zip archive");
    }
}
