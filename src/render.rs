use std::ops::Range;

use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};
use unicode_width::UnicodeWidthChar;

use tdoc::{InlineStyle, Span as DocSpan};

use crate::dom::{Dom, NodeData, NodeId};
use crate::inline::{self, is_block, is_icon};

const HIDDEN_TAGS: [&str; 10] = [
    "head", "script", "style", "title", "template", "noscript", "button", "nav", "svg", "input",
];
const CODE_BLOCK_CLASS: &str = "code-block";

/// How the page is being looked at.
#[derive(Clone, Copy, Debug, Default)]
pub struct RenderOptions<'a> {
    /// Blocks the user can select; in view mode every text block is.
    pub editable: Option<&'a [NodeId]>,
    pub focused: Option<NodeId>,
    /// Show the focused block as its markup.
    pub reveal_codes: bool,
    /// Lay out the bodies of closed `details` elements too.
    pub expand_details: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedBlock {
    pub node: NodeId,
    pub lines: Range<usize>,
}

#[derive(Debug)]
pub struct RenderResult {
    pub lines: Vec<Line<'static>>,
    pub total_lines: usize,
    /// Selectable blocks in reading order.
    pub blocks: Vec<RenderedBlock>,
}

impl RenderResult {
    pub fn block_at_line(&self, line: usize) -> Option<NodeId> {
        self.blocks
            .iter()
            .find(|block| block.lines.contains(&line))
            .map(|block| block.node)
    }

    pub fn lines_of(&self, node: NodeId) -> Option<Range<usize>> {
        self.blocks
            .iter()
            .find(|block| block.node == node)
            .map(|block| block.lines.clone())
    }
}

pub fn render_page(dom: &Dom, root: NodeId, width: usize, options: RenderOptions<'_>) -> RenderResult {
    let mut renderer = Renderer::new(dom, width.max(1), options);
    renderer.render_children(root, "");
    renderer.finish()
}

struct Renderer<'a> {
    dom: &'a Dom,
    wrap_width: usize,
    options: RenderOptions<'a>,
    lines: Vec<Line<'static>>,
    blocks: Vec<RenderedBlock>,
}

#[derive(Copy, Clone)]
enum HeaderLevel {
    One,
    Two,
    Three,
    Minor,
}

impl<'a> Renderer<'a> {
    fn new(dom: &'a Dom, wrap_width: usize, options: RenderOptions<'a>) -> Self {
        Self {
            dom,
            wrap_width,
            options,
            lines: Vec::new(),
            blocks: Vec::new(),
        }
    }

    fn is_hidden(&self, node: NodeId) -> bool {
        match self.dom.data(node) {
            NodeData::Element(element) => {
                HIDDEN_TAGS.contains(&element.tag.as_str()) || is_icon(self.dom, node)
            }
            NodeData::Comment(_) => true,
            NodeData::Text(_) | NodeData::Root => false,
        }
    }

    fn is_selectable(&self, node: NodeId) -> bool {
        match self.options.editable {
            Some(editable) => editable.contains(&node),
            None => true,
        }
    }

    /// Lays out children, gathering loose inline content into anonymous
    /// paragraphs between blocks.
    fn render_children(&mut self, node: NodeId, prefix: &str) {
        let mut run: Vec<NodeId> = Vec::new();
        for child in self.dom.children(node).to_vec() {
            if self.is_hidden(child) {
                continue;
            }
            if is_block(self.dom, child) {
                self.flush_run(&mut run, prefix);
                self.render_block(child, prefix);
            } else {
                run.push(child);
            }
        }
        self.flush_run(&mut run, prefix);
    }

    fn flush_run(&mut self, run: &mut Vec<NodeId>, prefix: &str) {
        if run.is_empty() {
            return;
        }
        let spans = inline::spans_for(self.dom, run);
        run.clear();
        let fragments = collect_all(&spans, Style::default());
        if fragments
            .iter()
            .all(|item| matches!(item, FragmentItem::Token(token) if token.kind == FragmentKind::Whitespace))
        {
            return;
        }
        self.separate();
        let lines = wrap_fragments(&trim_fragments(fragments), prefix, prefix, self.wrap_width);
        self.consume_lines(lines);
    }

    fn render_block(&mut self, node: NodeId, prefix: &str) {
        let Some(tag) = self.dom.tag(node).map(str::to_string) else {
            return;
        };
        match tag.as_str() {
            "h1" => self.render_header(node, prefix, HeaderLevel::One),
            "h2" => self.render_header(node, prefix, HeaderLevel::Two),
            "h3" => self.render_header(node, prefix, HeaderLevel::Three),
            "h4" | "h5" | "h6" => self.render_header(node, prefix, HeaderLevel::Minor),
            "p" | "dt" | "dd" | "figcaption" | "caption" | "address" => {
                self.separate();
                self.render_text_block(node, prefix, prefix, Style::default());
            }
            "ul" => self.render_list(node, prefix, false),
            "ol" => self.render_list(node, prefix, true),
            "li" => self.render_list_item(node, &format!("{prefix}• "), &format!("{prefix}  ")),
            "table" => self.render_table(node, prefix),
            "details" => self.render_details(node, prefix),
            "summary" => {
                self.render_text_block(node, prefix, prefix, bold());
            }
            "pre" => self.render_code_block(node, prefix),
            "blockquote" => self.render_children(node, &format!("{prefix}| ")),
            "hr" => {
                self.separate();
                let rule = "─".repeat(self.wrap_width.saturating_sub(visible_width(prefix)).max(4));
                self.push_plain_line(&format!("{prefix}{rule}"));
            }
            _ if self.dom.has_class(node, CODE_BLOCK_CLASS) => self.render_code_block(node, prefix),
            _ => self.render_children(node, prefix),
        }
    }

    /// Inline content of `node` as one wrapped block, then its nested
    /// blocks. Records the block's lines when it is selectable.
    fn render_text_block(
        &mut self,
        node: NodeId,
        first_prefix: &str,
        continuation_prefix: &str,
        base_style: Style,
    ) -> Range<usize> {
        let focused = self.options.focused == Some(node);
        let mut style = base_style;
        if focused {
            style = style.bg(Color::DarkGray);
        }

        let revealed = focused && self.options.reveal_codes;
        let fragments = if revealed {
            let mut fragments = Vec::new();
            tokenize_text(&self.dom.inner_html(node), style.fg(Color::Yellow), &mut fragments);
            fragments
        } else {
            trim_fragments(collect_all(&inline::inline_spans(self.dom, node), style))
        };

        let start = self.lines.len();
        let lines = wrap_fragments(&fragments, first_prefix, continuation_prefix, self.wrap_width);
        self.consume_lines(lines);
        let end = self.lines.len();
        if self.is_selectable(node) {
            self.blocks.push(RenderedBlock {
                node,
                lines: start..end,
            });
        }

        // Revealed markup already shows the nested blocks.
        if !revealed {
            for child in self.dom.children(node).to_vec() {
                if is_block(self.dom, child) && !self.is_hidden(child) {
                    self.render_block(child, continuation_prefix);
                }
            }
        }
        start..end
    }

    fn render_header(&mut self, node: NodeId, prefix: &str, level: HeaderLevel) {
        self.separate();
        let range = self.render_text_block(node, prefix, prefix, bold());

        let underline_char = match level {
            HeaderLevel::Two => '=',
            HeaderLevel::Three => '-',
            HeaderLevel::One | HeaderLevel::Minor => return,
        };
        let width = self.lines[range]
            .iter()
            .map(line_width)
            .max()
            .unwrap_or(0)
            .saturating_sub(visible_width(prefix));
        let underline = format!("{prefix}{}", underline_string(width, underline_char));
        self.push_plain_line(&underline);
    }

    fn render_list(&mut self, node: NodeId, prefix: &str, ordered: bool) {
        self.separate();
        let items: Vec<NodeId> = self
            .dom
            .element_children(node)
            .into_iter()
            .filter(|child| self.dom.is_tag(*child, "li"))
            .collect();
        for (idx, item) in items.into_iter().enumerate() {
            let marker = if ordered {
                format!("{}. ", idx + 1)
            } else {
                "• ".to_string()
            };
            let first_prefix = format!("{prefix}{marker}");
            let continuation_prefix = format!("{prefix}{}", " ".repeat(marker.chars().count()));
            self.render_list_item(item, &first_prefix, &continuation_prefix);
        }
    }

    fn render_list_item(&mut self, node: NodeId, first_prefix: &str, continuation_prefix: &str) {
        self.render_text_block(node, first_prefix, continuation_prefix, Style::default());
    }

    fn render_table(&mut self, node: NodeId, prefix: &str) {
        self.separate();
        let rows: Vec<NodeId> = self
            .dom
            .descendants(node)
            .into_iter()
            .filter(|row| {
                self.dom.is_tag(*row, "tr") && self.dom.closest_tag(*row, "table") == Some(node)
            })
            .collect();
        let rule_width = self.wrap_width.saturating_sub(visible_width(prefix)).max(4);
        for (idx, row) in rows.into_iter().enumerate() {
            if idx > 0 {
                self.push_plain_line(&format!("{prefix}├{}", "─".repeat(rule_width - 1)));
            }
            for cell in self.dom.element_children(row) {
                let style = if self.dom.is_tag(cell, "th") {
                    bold()
                } else if self.dom.is_tag(cell, "td") {
                    Style::default()
                } else {
                    continue;
                };
                let cell_prefix = format!("{prefix}│ ");
                self.render_text_block(cell, &cell_prefix, &cell_prefix, style);
            }
        }
    }

    fn render_details(&mut self, node: NodeId, prefix: &str) {
        self.separate();
        let open = self.options.expand_details || self.dom.attr(node, "open").is_some();
        let marker = if open { "▾ " } else { "▸ " };
        let summary = self
            .dom
            .element_children(node)
            .into_iter()
            .find(|child| self.dom.is_tag(*child, "summary"));
        if let Some(summary) = summary {
            let continuation = format!("{prefix}{}", " ".repeat(marker.chars().count()));
            self.render_text_block(summary, &format!("{prefix}{marker}"), &continuation, bold());
        }
        if !open {
            return;
        }
        let body_prefix = format!("{prefix}  ");
        let mut run = Vec::new();
        for child in self.dom.children(node).to_vec() {
            if Some(child) == summary || self.is_hidden(child) {
                continue;
            }
            if is_block(self.dom, child) {
                self.flush_run(&mut run, &body_prefix);
                self.render_block(child, &body_prefix);
            } else {
                run.push(child);
            }
        }
        self.flush_run(&mut run, &body_prefix);
    }

    fn render_code_block(&mut self, node: NodeId, prefix: &str) {
        self.separate();
        let fence = self.code_block_fence(prefix);
        self.push_plain_line(&fence);
        let text = self.dom.text_content(node);
        for line in text.trim_matches('\n').lines() {
            let span = Span::styled(
                format!("{prefix}{}", line.replace('\t', "    ")),
                Style::default().add_modifier(Modifier::DIM),
            );
            self.lines.push(Line::from(vec![span]));
        }
        self.push_plain_line(&fence);
    }

    /// One blank line between blocks, never two.
    fn separate(&mut self) {
        let last_blank = self
            .lines
            .last()
            .is_none_or(|line| line_width(line) == 0);
        if !last_blank {
            self.lines.push(Line::from(""));
        }
    }

    fn push_plain_line(&mut self, content: &str) {
        let span = Span::raw(content.to_string());
        self.lines.push(Line::from(vec![span]));
    }

    fn code_block_fence(&self, prefix: &str) -> String {
        const MIN_FENCE_WIDTH: usize = 4;
        let available_width = self.wrap_width.saturating_sub(prefix.chars().count());
        let dash_count = available_width.max(MIN_FENCE_WIDTH);
        format!("{}{}", prefix, "-".repeat(dash_count))
    }

    fn consume_lines(&mut self, outputs: Vec<LineOutput>) {
        for output in outputs {
            let spans: Vec<Span<'static>> = output
                .spans
                .into_iter()
                .map(|segment| Span::styled(segment.text, segment.style))
                .collect();
            self.lines.push(Line::from(spans));
        }
    }

    fn finish(mut self) -> RenderResult {
        while self.lines.last().is_some_and(|line| line_width(line) == 0) && self.lines.len() > 1 {
            self.lines.pop();
        }
        if self.lines.is_empty() {
            self.lines.push(Line::from(""));
        }
        let total_lines = self.lines.len();
        RenderResult {
            lines: self.lines,
            total_lines,
            blocks: self.blocks,
        }
    }
}

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

#[derive(Clone)]
struct LineSegment {
    text: String,
    style: Style,
}

#[derive(Clone)]
struct LineOutput {
    spans: Vec<LineSegment>,
}

#[derive(Clone)]
struct Fragment {
    text: String,
    style: Style,
    kind: FragmentKind,
    width: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FragmentKind {
    Word,
    Whitespace,
}

#[derive(Clone)]
enum FragmentItem {
    Token(Fragment),
    LineBreak,
}

fn collect_all(spans: &[DocSpan], base_style: Style) -> Vec<FragmentItem> {
    let mut fragments = Vec::new();
    for span in spans {
        collect_fragments(span, base_style, &mut fragments);
    }
    fragments
}

fn collect_fragments(span: &DocSpan, base_style: Style, fragments: &mut Vec<FragmentItem>) {
    let style = merge_style(base_style, span.style, span.link_target.as_deref());
    if !span.text.is_empty() {
        tokenize_text(&span.text, style, fragments);
    }
    for child in &span.children {
        collect_fragments(child, style, fragments);
    }
}

fn merge_style(base: Style, inline: InlineStyle, _link_target: Option<&str>) -> Style {
    match inline {
        InlineStyle::None => base,
        InlineStyle::Bold => base.add_modifier(Modifier::BOLD),
        InlineStyle::Italic => base.add_modifier(Modifier::ITALIC),
        InlineStyle::Highlight => base.add_modifier(Modifier::REVERSED),
        InlineStyle::Underline => base.add_modifier(Modifier::UNDERLINED),
        InlineStyle::Strike => base.add_modifier(Modifier::CROSSED_OUT),
        InlineStyle::Link => base.add_modifier(Modifier::UNDERLINED).fg(Color::Blue),
        InlineStyle::Code => base.add_modifier(Modifier::DIM),
    }
}

/// Drops whitespace at the edges of a block and around hard breaks.
fn trim_fragments(fragments: Vec<FragmentItem>) -> Vec<FragmentItem> {
    let is_space =
        |item: &FragmentItem| matches!(item, FragmentItem::Token(token) if token.kind == FragmentKind::Whitespace);
    let mut out: Vec<FragmentItem> = Vec::with_capacity(fragments.len());
    for item in fragments {
        match item {
            FragmentItem::LineBreak => {
                while out.last().is_some_and(is_space) {
                    out.pop();
                }
                out.push(FragmentItem::LineBreak);
            }
            token if is_space(&token) => {
                if out.last().is_some_and(|last| !matches!(last, FragmentItem::LineBreak)) {
                    out.push(token);
                }
            }
            token => out.push(token),
        }
    }
    while out.last().is_some_and(is_space) {
        out.pop();
    }
    out
}

fn tokenize_text(text: &str, style: Style, fragments: &mut Vec<FragmentItem>) {
    let mut builder: Option<TokenBuilder> = None;
    for ch in text.chars() {
        if ch == '\r' {
            continue;
        }
        if ch == '\n' {
            if let Some(token) = builder.take() {
                fragments.push(FragmentItem::Token(token.finish()));
            }
            fragments.push(FragmentItem::LineBreak);
            continue;
        }
        let expanded: &[char] = if ch == '\t' { &[' '; 4] } else { &[ch] };
        for actual in expanded {
            let is_whitespace = actual.is_whitespace() && *actual != '\u{a0}';
            match builder.as_mut() {
                Some(current) if current.kind_matches(is_whitespace) => current.push_char(*actual),
                _ => {
                    if let Some(existing) = builder.take() {
                        fragments.push(FragmentItem::Token(existing.finish()));
                    }
                    let mut new_builder = TokenBuilder::new(style, is_whitespace);
                    new_builder.push_char(*actual);
                    builder = Some(new_builder);
                }
            }
        }
    }
    if let Some(token) = builder {
        fragments.push(FragmentItem::Token(token.finish()));
    }
}

struct TokenBuilder {
    text: String,
    style: Style,
    kind: FragmentKind,
    width: usize,
}

impl TokenBuilder {
    fn new(style: Style, is_whitespace: bool) -> Self {
        Self {
            text: String::new(),
            style,
            kind: if is_whitespace {
                FragmentKind::Whitespace
            } else {
                FragmentKind::Word
            },
            width: 0,
        }
    }

    fn kind_matches(&self, is_whitespace: bool) -> bool {
        matches!(
            (self.kind, is_whitespace),
            (FragmentKind::Whitespace, true) | (FragmentKind::Word, false)
        )
    }

    fn push_char(&mut self, ch: char) {
        self.text.push(ch);
        self.width += UnicodeWidthChar::width(ch).unwrap_or(0);
    }

    fn finish(self) -> Fragment {
        Fragment {
            text: self.text,
            style: self.style,
            kind: self.kind,
            width: self.width,
        }
    }
}

fn wrap_fragments(
    fragments: &[FragmentItem],
    first_prefix: &str,
    continuation_prefix: &str,
    width: usize,
) -> Vec<LineOutput> {
    let mut outputs = Vec::new();
    let mut builder = LineBuilder::new(first_prefix);
    let mut pending_whitespace: Vec<Fragment> = Vec::new();

    for fragment in fragments {
        match fragment {
            FragmentItem::LineBreak => {
                builder.consume_pending(&mut pending_whitespace);
                outputs.push(builder.build_line());
                builder = LineBuilder::new(continuation_prefix);
            }
            FragmentItem::Token(token) => match token.kind {
                FragmentKind::Whitespace => {
                    pending_whitespace.push(token.clone());
                }
                FragmentKind::Word => {
                    let whitespace_width: usize =
                        pending_whitespace.iter().map(|item| item.width).sum();
                    if builder.current_width() > builder.prefix_width
                        && builder.current_width() + whitespace_width + token.width > width
                    {
                        pending_whitespace.clear();
                        outputs.push(builder.build_line());
                        builder = LineBuilder::new(continuation_prefix);
                    }

                    builder.append_with_pending(token.clone(), &mut pending_whitespace);
                }
            },
        }
    }

    builder.consume_pending(&mut pending_whitespace);
    outputs.push(builder.build_line());
    outputs
}

struct LineBuilder {
    segments: Vec<LineSegment>,
    width: usize,
    prefix_width: usize,
}

impl LineBuilder {
    fn new(prefix: &str) -> Self {
        let prefix_width = visible_width(prefix);
        let mut segments = Vec::new();
        if !prefix.is_empty() {
            segments.push(LineSegment {
                text: prefix.to_string(),
                style: Style::default(),
            });
        }
        Self {
            segments,
            width: prefix_width,
            prefix_width,
        }
    }

    fn current_width(&self) -> usize {
        self.width
    }

    fn append_with_pending(&mut self, token: Fragment, pending_whitespace: &mut Vec<Fragment>) {
        self.consume_pending(pending_whitespace);
        self.append_token(token);
    }

    fn consume_pending(&mut self, pending_whitespace: &mut Vec<Fragment>) {
        for fragment in pending_whitespace.drain(..) {
            self.append_token(fragment);
        }
    }

    fn append_token(&mut self, fragment: Fragment) {
        if !fragment.text.is_empty() {
            self.width += fragment.width;
            self.segments.push(LineSegment {
                text: fragment.text,
                style: fragment.style,
            });
        }
    }

    fn build_line(mut self) -> LineOutput {
        if self.segments.is_empty() {
            self.segments.push(LineSegment {
                text: String::new(),
                style: Style::default(),
            });
        }
        LineOutput {
            spans: self.segments,
        }
    }
}

fn visible_width(text: &str) -> usize {
    text.chars()
        .map(|ch| UnicodeWidthChar::width(ch).unwrap_or(0))
        .sum()
}

fn line_width(line: &Line<'_>) -> usize {
    line.spans
        .iter()
        .map(|span| visible_width(span.content.as_ref()))
        .sum()
}

fn underline_string(width: usize, ch: char) -> String {
    std::iter::repeat_n(ch, width.max(1)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(line: &Line<'_>) -> String {
        line.spans.iter().map(|span| span.content.as_ref()).collect()
    }

    fn render(html: &str, width: usize) -> (Dom, RenderResult) {
        let dom = Dom::parse_fragment(html);
        let result = render_page(&dom, dom.root(), width, RenderOptions::default());
        (dom, result)
    }

    #[test]
    fn paragraphs_wrap_at_word_boundaries() {
        let (_, result) = render("<p>Road centerline segments carry address ranges</p>", 20);
        let lines: Vec<String> = result.lines.iter().map(text_of).collect();
        assert_eq!(lines, ["Road centerline", "segments carry", "address ranges"]);
        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.blocks[0].lines, 0..3);
    }

    #[test]
    fn headings_lists_and_tables_are_laid_out() {
        let (_, result) = render(
            "<h2>Domains</h2><ul><li>One</li><li>Two</li></ul><table><tr><td>A</td><td>B</td></tr><tr><td>C</td></tr></table>",
            20,
        );
        let lines: Vec<String> = result.lines.iter().map(text_of).collect();
        assert_eq!(
            lines,
            [
                "Domains",
                "=======",
                "",
                "• One",
                "• Two",
                "",
                "│ A",
                "│ B",
                "├───────────────────",
                "│ C",
            ]
        );
        assert_eq!(result.blocks.len(), 6);
    }

    #[test]
    fn only_editable_blocks_are_selectable() {
        let dom = Dom::parse_fragment("<p>one</p><p>two</p>");
        let blocks = dom.element_children(dom.root());
        let editable = [blocks[1]];
        let options = RenderOptions {
            editable: Some(&editable),
            ..RenderOptions::default()
        };
        let result = render_page(&dom, dom.root(), 40, options);
        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.block_at_line(2), Some(blocks[1]));
        assert_eq!(result.lines_of(blocks[1]), Some(2..3));
    }

    #[test]
    fn focused_block_can_reveal_its_markup() {
        let dom = Dom::parse_fragment("<p>Use <b>bold</b></p>");
        let paragraph = dom.element_children(dom.root())[0];
        let options = RenderOptions {
            focused: Some(paragraph),
            reveal_codes: true,
            ..RenderOptions::default()
        };
        let result = render_page(&dom, dom.root(), 40, options);
        assert_eq!(text_of(&result.lines[0]), "Use <b>bold</b>");
    }

    #[test]
    fn closed_details_hide_their_body() {
        let html = "<details><summary>Steps</summary><p>Hidden body</p></details>";
        let (_, result) = render(html, 40);
        let lines: Vec<String> = result.lines.iter().map(text_of).collect();
        assert_eq!(lines, ["▸ Steps"]);

        let dom = Dom::parse_fragment(html);
        let options = RenderOptions {
            expand_details: true,
            ..RenderOptions::default()
        };
        let result = render_page(&dom, dom.root(), 40, options);
        let lines: Vec<String> = result.lines.iter().map(text_of).collect();
        assert_eq!(lines, ["▾ Steps", "", "  Hidden body"]);
    }

    #[test]
    fn code_blocks_keep_their_lines() {
        let (_, result) = render("<div class=\"code-block\"><pre>a = 1\nb = 2</pre></div>", 8);
        let lines: Vec<String> = result.lines.iter().map(text_of).collect();
        assert_eq!(lines, ["--------", "a = 1", "b = 2", "--------"]);
        assert!(result.blocks.is_empty());
    }
}
