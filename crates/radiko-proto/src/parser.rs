//! Builds areas, channels and programs from directory and schedule documents.

use chrono::NaiveDateTime;
use scraper::{ElementRef, Html};

use crate::error::{Error, Result};
use crate::markup::{normalize_whitespace, Document, Element};
use crate::model::{Area, BroadcasterType, Channel, Program, ProgramFields};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Longest subtitle kept, ellipsis included.
pub const SUBTITLE_MAX_CHARS: usize = 256;
const ELLIPSIS: &str = "...";

/// Titles radiko publishes for slots where nothing is broadcast.
pub const SUSPENDED_TITLES: &[&str] = &["番組休止中", "放送休止中"];

/// `<stations region_id=".." region_name="..">`
pub fn area(el: &Element) -> Area {
    Area::new(
        el.attr("region_id"),
        el.attr("region_name"),
        BroadcasterType::Radiko,
    )
}

/// `<station><id>..</id><name>..</name></station>` under an area.
pub fn channel(el: &Element, area: &Area) -> Channel {
    Channel::new(&el.text_of("id"), &el.text_of("name"), area.id())
}

/// `<prog id=".." ft=".." to="..">` under a channel's `<progs>`.
pub fn program(el: &Element, channel: &Channel) -> Result<Program> {
    let ft = el.attr("ft");
    let to = el.attr("to");
    let start = parse_timestamp(ft)?;
    let finish = parse_timestamp(to)?;

    Ok(Program::new(
        channel,
        ProgramFields {
            code: format!("{}-{}-{}", el.attr("id"), ft, to),
            title: el.text_of("title"),
            subtitle: subtitle(&el.text_of("desc")),
            cast: el.text_of("pfm"),
            website: el.text_of("url"),
            thumbnail_url: el.text_of("img"),
            description: strip_html(&el.text_of("info")),
            start,
            finish,
            manifest_url: None,
        },
    ))
}

/// Every non-suspended program in a schedule document.
pub fn programs(doc: &Document, channel: &Channel) -> Result<Vec<Program>> {
    let mut list = Vec::new();
    for progs in doc.elements_by_tag("progs") {
        for el in progs.elements_by_tag("prog") {
            let program = program(el, channel)?;
            if is_suspended(program.title()) {
                continue;
            }
            list.push(program);
        }
    }
    Ok(list)
}

pub fn is_suspended(title: &str) -> bool {
    title.is_empty() || SUSPENDED_TITLES.contains(&title)
}

pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map_err(|e| Error::parse(format!("invalid timestamp '{}': {}", s, e)))
}

pub fn format_timestamp(t: NaiveDateTime) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

/// Elements whose boundaries separate words in rendered text.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "footer",
    "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "ol", "p", "pre", "section",
    "table", "td", "th", "tr", "ul",
];

/// Markup removed, entities decoded, whitespace collapsed.
///
/// Inline elements join their text with the neighbours (`Tokyo<b>FM</b>`
/// reads `TokyoFM`); block elements and `<br>` separate it.
pub fn strip_html(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    let fragment = Html::parse_fragment(s);
    let mut text = String::with_capacity(s.len());
    collect_text(fragment.root_element(), &mut text);
    normalize_whitespace(&text)
}

fn collect_text(el: ElementRef, out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(child) {
            let block = BLOCK_ELEMENTS.contains(&child.value().name());
            if block {
                out.push(' ');
            }
            collect_text(child, out);
            if block {
                out.push(' ');
            }
        }
    }
}

/// Stripped text, cut to [`SUBTITLE_MAX_CHARS`] with a trailing ellipsis.
pub fn subtitle(raw: &str) -> String {
    let text = strip_html(raw);
    if text.chars().count() <= SUBTITLE_MAX_CHARS {
        return text;
    }
    let mut cut: String = text
        .chars()
        .take(SUBTITLE_MAX_CHARS - ELLIPSIS.len())
        .collect();
    cut.push_str(ELLIPSIS);
    cut
}
