use anyhow::{Context, Result};
use comrak::nodes::{AstNode, NodeValue};
use comrak::plugins::syntect::SyntectAdapter;
use comrak::{format_html_with_plugins, parse_document, Anchorizer, Arena, Options, Plugins};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Serialize;

// Private-use code points bracket the index of an abbreviation in text nodes
// until the HTML is written.
const MARK_OPEN: char = '\u{E000}';
const MARK_CLOSE: char = '\u{E001}';

lazy_static! {
    // Loading syntaxes and themes is slow, build the adapter once
    static ref HIGHLIGHTER: SyntectAdapter = SyntectAdapter::new(Some("base16-ocean.dark"));
    static ref ABBR_DEFINITION: Regex = Regex::new(r"^\*\[([^\]]+)\]:\s*(.*\S)\s*$").unwrap();
    static ref ABBR_MARKER: Regex = Regex::new("\u{E000}(\\d+)\u{E001}").unwrap();
}

/// An article body rendered for display.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Rendered {
    pub html: String,
    pub toc: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Heading {
    level: u8,
    text: String,
    anchor: String,
}

/// `*[HTML]: Hyper Text Markup Language`
#[derive(Debug, Clone, PartialEq)]
struct Abbreviation {
    abbr: String,
    title: String,
}

/// Converts stored Markdown bodies to HTML. Output depends only on the input.
pub struct MarkupRenderer;

impl MarkupRenderer {
    pub fn render(body: &str) -> Result<Rendered> {
        let mut options = Options::default();
        options.extension.table = true;
        options.extension.strikethrough = true;
        options.extension.autolink = true;
        options.extension.tasklist = true;
        options.extension.footnotes = true;
        options.extension.description_lists = true;
        options.extension.header_ids = Some(String::new());
        options.render.escape = true;

        let mut plugins = Plugins::default();
        plugins.render.codefence_syntax_highlighter = Some(&*HIGHLIGHTER);

        let body = body.replace(&[MARK_OPEN, MARK_CLOSE][..], "");
        let arena = Arena::new();
        let root = parse_document(&arena, &body, &options);

        let headings = collect_headings(root);
        let abbreviations = take_abbreviations(root);
        mark_abbreviations(root, &abbreviations)?;

        let mut html = Vec::new();
        format_html_with_plugins(root, &options, &mut html, &plugins)
            .context("Cannot render markdown")?;
        let html = String::from_utf8(html).context("Rendered markdown is not valid utf-8")?;

        Ok(Rendered {
            html: expand_abbreviations(&html, &abbreviations)?,
            toc: build_toc(&headings)?,
        })
    }
}

// Anchors are generated in document order with the same anchorizer the HTML
// renderer uses, so repeated titles get the same `-1`, `-2` suffixes.
fn collect_headings<'a>(root: &'a AstNode<'a>) -> Vec<Heading> {
    let mut anchorizer = Anchorizer::new();
    let mut headings = Vec::new();

    for node in root.descendants() {
        if let NodeValue::Heading(ref heading) = node.data.borrow().value {
            let mut text = String::new();
            collect_text(node, &mut text);
            let anchor = anchorizer.anchorize(text.clone());
            headings.push(Heading {
                level: heading.level,
                text,
                anchor,
            });
        }
    }

    headings
}

fn collect_text<'a>(node: &'a AstNode<'a>, output: &mut String) {
    match node.data.borrow().value {
        NodeValue::Text(ref literal) => output.push_str(literal),
        NodeValue::Code(ref code) => output.push_str(&code.literal),
        NodeValue::LineBreak | NodeValue::SoftBreak => output.push(' '),
        _ => {
            for child in node.children() {
                collect_text(child, output);
            }
        }
    }
}

/// Removes paragraphs made only of `*[ABBR]: title` lines and returns the
/// definitions. A later definition of the same abbreviation wins.
fn take_abbreviations<'a>(root: &'a AstNode<'a>) -> Vec<Abbreviation> {
    let paragraphs: Vec<_> = root
        .descendants()
        .filter(|node| matches!(node.data.borrow().value, NodeValue::Paragraph))
        .collect();

    let mut abbreviations: Vec<Abbreviation> = Vec::new();
    for paragraph in paragraphs {
        let Some(source) = plain_lines(paragraph) else {
            continue;
        };
        let parsed: Option<Vec<Abbreviation>> = source
            .lines()
            .map(|line| {
                ABBR_DEFINITION.captures(line.trim()).map(|caps| Abbreviation {
                    abbr: caps[1].trim().to_string(),
                    title: caps[2].to_string(),
                })
            })
            .collect();

        if let Some(parsed) = parsed.filter(|parsed| !parsed.is_empty()) {
            paragraph.detach();
            for definition in parsed {
                abbreviations.retain(|known| known.abbr != definition.abbr);
                abbreviations.push(definition);
            }
        }
    }

    abbreviations
}

// Paragraph text with line breaks kept, or None when it has any inline markup.
fn plain_lines<'a>(paragraph: &'a AstNode<'a>) -> Option<String> {
    let mut source = String::new();
    for child in paragraph.children() {
        match child.data.borrow().value {
            NodeValue::Text(ref literal) => source.push_str(literal),
            NodeValue::LineBreak | NodeValue::SoftBreak => source.push('\n'),
            _ => return None,
        }
    }
    Some(source)
}

/// Replaces whole-word abbreviations in text outside headings, links and
/// images with index markers.
fn mark_abbreviations<'a>(root: &'a AstNode<'a>, abbreviations: &[Abbreviation]) -> Result<()> {
    if abbreviations.is_empty() {
        return Ok(());
    }

    let mut names: Vec<&str> = abbreviations.iter().map(|a| a.abbr.as_str()).collect();
    names.sort_by_key(|name| std::cmp::Reverse(name.len()));
    let alternatives: Vec<String> = names.iter().map(|name| regex::escape(name)).collect();
    let matcher = Regex::new(&format!(r"\b(?:{})\b", alternatives.join("|")))
        .context("Cannot build abbreviation pattern")?;

    for node in root.descendants() {
        let skipped = node.ancestors().any(|ancestor| {
            matches!(
                ancestor.data.borrow().value,
                NodeValue::Heading(_) | NodeValue::Link(_) | NodeValue::Image(_)
            )
        });
        if skipped {
            continue;
        }

        let mut data = node.data.borrow_mut();
        if let NodeValue::Text(ref mut text) = data.value {
            if matcher.is_match(text) {
                *text = matcher
                    .replace_all(text, |caps: &Captures| {
                        match abbreviations.iter().position(|a| a.abbr == caps[0]) {
                            Some(index) => format!("{MARK_OPEN}{index}{MARK_CLOSE}"),
                            None => caps[0].to_string(),
                        }
                    })
                    .into_owned();
            }
        }
    }

    Ok(())
}

fn expand_abbreviations(html: &str, abbreviations: &[Abbreviation]) -> Result<String> {
    if abbreviations.is_empty() {
        return Ok(html.to_string());
    }

    let tags = abbreviations
        .iter()
        .map(|a| {
            Ok(format!(
                r#"<abbr title="{}">{}</abbr>"#,
                escape_html(&a.title)?,
                escape_html(&a.abbr)?
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    let expanded = ABBR_MARKER.replace_all(html, |caps: &Captures| {
        caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|index| tags.get(index))
            .cloned()
            .unwrap_or_default()
    });
    Ok(expanded.into_owned())
}

/// Nested `<ul>` of heading links. A deeper heading opens a sub-list under the
/// previous item; skipped levels collapse into one step.
fn build_toc(headings: &[Heading]) -> Result<String> {
    let mut toc = String::from(r#"<div class="toc">"#);
    let mut stack: Vec<u8> = Vec::new();

    for heading in headings {
        match stack.last().copied() {
            None => {
                toc.push_str("<ul>");
                stack.push(heading.level);
            }
            Some(level) if heading.level > level => {
                toc.push_str("<ul>");
                stack.push(heading.level);
            }
            Some(_) => {
                while stack.len() > 1 && stack.last().is_some_and(|&level| heading.level < level) {
                    toc.push_str("</li></ul>");
                    stack.pop();
                }
                toc.push_str("</li>");
                if let Some(top) = stack.last_mut() {
                    if heading.level < *top {
                        *top = heading.level;
                    }
                }
            }
        }

        toc.push_str(&format!(
            r##"<li><a href="#{}">{}</a>"##,
            escape_html(&heading.anchor)?,
            escape_html(&heading.text)?
        ));
    }

    for _ in 0..stack.len() {
        toc.push_str("</li></ul>");
    }

    toc.push_str("</div>");
    Ok(toc)
}

fn escape_html(text: &str) -> Result<String> {
    let mut escaped = Vec::with_capacity(text.len());
    comrak::html::escape(&mut escaped, text.as_bytes())?;
    Ok(String::from_utf8(escaped)?)
}
