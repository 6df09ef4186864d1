//! Markdown to terminal text.
//!
//! Block structure (headings, lists, quotes, code fences) is always laid out;
//! ANSI styling is added only when color is enabled.

use crossterm::style::{Attribute, Color, ContentStyle, Stylize};
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

const QUOTE_PREFIX: &str = "│ ";
const CODE_INDENT: &str = "    ";

#[derive(Clone, Copy)]
enum ListKind {
    Ordered(u64),
    Unordered,
}

/// Render `content` for the terminal.
pub fn render_markdown(content: &str, color: bool) -> String {
    MarkdownRenderer::new(color).render(content)
}

struct MarkdownRenderer {
    color: bool,
    out: String,
    line: String,
    style_stack: Vec<ContentStyle>,
    list_stack: Vec<ListKind>,
    quote_depth: usize,
    in_code_block: bool,
    code_lines: Vec<String>,
    pending_links: Vec<String>,
}

impl MarkdownRenderer {
    fn new(color: bool) -> Self {
        Self {
            color,
            out: String::new(),
            line: String::new(),
            style_stack: Vec::new(),
            list_stack: Vec::new(),
            quote_depth: 0,
            in_code_block: false,
            code_lines: Vec::new(),
            pending_links: Vec::new(),
        }
    }

    fn current_style(&self) -> ContentStyle {
        self.style_stack.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, apply: impl FnOnce(ContentStyle) -> ContentStyle) {
        let style = apply(self.current_style());
        self.style_stack.push(style);
    }

    fn styled(&self, text: &str, style: ContentStyle) -> String {
        if self.color && style != ContentStyle::default() {
            style.apply(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn push_text(&mut self, text: &str) {
        let styled = self.styled(text, self.current_style());
        self.line.push_str(&styled);
    }

    fn line_prefix(&self) -> String {
        QUOTE_PREFIX.repeat(self.quote_depth)
    }

    fn flush_line(&mut self) {
        if self.line.is_empty() {
            return;
        }
        let prefix = self.line_prefix();
        self.out.push_str(&prefix);
        self.out.push_str(self.line.trim_end());
        self.out.push('\n');
        self.line.clear();
    }

    fn blank_line(&mut self) {
        self.flush_line();
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    fn list_indent(&self) -> String {
        "  ".repeat(self.list_stack.len().saturating_sub(1))
    }

    fn finish_code_block(&mut self) {
        let code_style = ContentStyle::new().with(Color::Cyan);
        let prefix = self.line_prefix();
        for line in std::mem::take(&mut self.code_lines) {
            let styled = self.styled(&line, code_style);
            self.out.push_str(&prefix);
            self.out.push_str(CODE_INDENT);
            self.out.push_str(&styled);
            self.out.push('\n');
        }
        self.in_code_block = false;
        self.blank_line();
    }

    fn render(mut self, content: &str) -> String {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);

        for event in Parser::new_ext(content, options) {
            match event {
                Event::Start(tag) => match tag {
                    Tag::Heading { level, .. } => {
                        self.flush_line();
                        self.push_style(|style| match level {
                            HeadingLevel::H1 => style.with(Color::Magenta).bold().underlined(),
                            HeadingLevel::H2 => style.with(Color::Magenta).bold(),
                            _ => style.bold(),
                        });
                    }
                    Tag::BlockQuote(_) => {
                        self.flush_line();
                        self.quote_depth += 1;
                        self.push_style(|style| style.with(Color::DarkGrey));
                    }
                    Tag::List(start) => {
                        self.flush_line();
                        self.list_stack.push(match start {
                            Some(n) => ListKind::Ordered(n),
                            None => ListKind::Unordered,
                        });
                    }
                    Tag::Item => {
                        self.flush_line();
                        let marker = match self.list_stack.last_mut() {
                            Some(ListKind::Ordered(n)) => {
                                let marker = format!("{n}. ");
                                *n += 1;
                                marker
                            }
                            _ => "• ".to_string(),
                        };
                        let indent = self.list_indent();
                        self.line.push_str(&indent);
                        let styled = self.styled(&marker, ContentStyle::new().with(Color::Yellow));
                        self.line.push_str(&styled);
                    }
                    Tag::CodeBlock(kind) => {
                        self.flush_line();
                        self.in_code_block = true;
                        self.code_lines.clear();
                        if let CodeBlockKind::Fenced(lang) = kind {
                            let lang = lang.trim();
                            if !lang.is_empty() {
                                let label = self
                                    .styled(lang, ContentStyle::new().attribute(Attribute::Dim));
                                let prefix = self.line_prefix();
                                self.out.push_str(&format!("{prefix}{CODE_INDENT}{label}\n"));
                            }
                        }
                    }
                    Tag::Emphasis => self.push_style(|style| style.italic()),
                    Tag::Strong => self.push_style(|style| style.bold()),
                    Tag::Strikethrough => self.push_style(|style| style.crossed_out()),
                    Tag::Link { dest_url, .. } | Tag::Image { dest_url, .. } => {
                        self.pending_links.push(dest_url.to_string());
                        self.push_style(|style| style.with(Color::Blue).underlined());
                    }
                    _ => {}
                },
                Event::End(tag_end) => match tag_end {
                    TagEnd::Paragraph => {
                        if self.list_stack.is_empty() {
                            self.blank_line();
                        } else {
                            self.flush_line();
                        }
                    }
                    TagEnd::Heading(_) => {
                        self.style_stack.pop();
                        self.blank_line();
                    }
                    TagEnd::BlockQuote(_) => {
                        self.flush_line();
                        self.style_stack.pop();
                        self.quote_depth = self.quote_depth.saturating_sub(1);
                        if self.quote_depth == 0 {
                            self.blank_line();
                        }
                    }
                    TagEnd::List(_) => {
                        self.flush_line();
                        self.list_stack.pop();
                        if self.list_stack.is_empty() {
                            self.blank_line();
                        }
                    }
                    TagEnd::Item => self.flush_line(),
                    TagEnd::CodeBlock => self.finish_code_block(),
                    TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => {
                        self.style_stack.pop();
                    }
                    TagEnd::Link | TagEnd::Image => {
                        self.style_stack.pop();
                        if let Some(url) = self.pending_links.pop() {
                            let label = format!(" ({url})");
                            let styled =
                                self.styled(&label, ContentStyle::new().attribute(Attribute::Dim));
                            self.line.push_str(&styled);
                        }
                    }
                    _ => {}
                },
                Event::Text(text) => {
                    if self.in_code_block {
                        let lines = text.lines().map(|line| line.replace('\t', "    "));
                        self.code_lines.extend(lines);
                    } else {
                        self.push_text(&text);
                    }
                }
                Event::Code(code) => {
                    let styled = self.styled(&code, self.current_style().with(Color::Cyan));
                    let text = if self.color {
                        styled
                    } else {
                        format!("`{code}`")
                    };
                    self.line.push_str(&text);
                }
                Event::SoftBreak => self.line.push(' '),
                Event::HardBreak => {
                    self.flush_line();
                    if !self.list_stack.is_empty() {
                        let indent = format!("{}  ", self.list_indent());
                        self.line.push_str(&indent);
                    }
                }
                Event::Rule => {
                    self.flush_line();
                    let rule = "─".repeat(40);
                    let rule = self.styled(&rule, ContentStyle::new().with(Color::DarkGrey));
                    self.out.push_str(&rule);
                    self.out.push('\n');
                    self.blank_line();
                }
                Event::TaskListMarker(checked) => {
                    self.line.push_str(if checked { "[x] " } else { "[ ] " });
                }
                Event::Html(html) | Event::InlineHtml(html) => self.push_text(&html),
                _ => {}
            }
        }

        if self.in_code_block {
            self.finish_code_block();
        }
        self.flush_line();
        let trimmed_len = self.out.trim_end_matches('\n').len();
        self.out.truncate(trimmed_len);
        self.out
    }
}
