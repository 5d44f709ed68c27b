//! Advanced SubStation Alpha / SubStation Alpha reader.
//!
//! Only the plain timed-cue content is kept. Override blocks are stripped from
//! the text, with alignment and primary color turned into style hints.

use super::time::parse_timestamp;
use crate::cue::{Cue, CueStyle, Position};
use crate::error::{CodecError, CodecResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static OVERRIDE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([^}]*)\}").unwrap());
static NUMPAD_ALIGN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\an([1-9])").unwrap());
static LEGACY_ALIGN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\a(\d+)").unwrap());
static PRIMARY_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\1?c&H([0-9A-Fa-f]{1,8})&?").unwrap());

const DEFAULT_EVENT_FORMAT: &[&str] = &[
    "layer", "start", "end", "style", "name", "marginl", "marginr", "marginv", "effect", "text",
];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Other,
    Styles { legacy: bool },
    Events,
}

pub fn parse(text: &str) -> CodecResult<Vec<Cue>> {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut section = Section::Other;
    let mut style_format: Vec<String> = Vec::new();
    let mut style_positions: HashMap<String, Position> = HashMap::new();
    let mut event_format: Vec<String> = DEFAULT_EVENT_FORMAT.iter().map(|s| s.to_string()).collect();
    let mut cues = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim().trim_start_matches('\u{feff}');
        if line.is_empty() || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            section = match line.to_ascii_lowercase().as_str() {
                "[v4+ styles]" => Section::Styles { legacy: false },
                "[v4 styles]" => Section::Styles { legacy: true },
                "[events]" => Section::Events,
                _ => Section::Other,
            };
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();

        match (section, key.as_str()) {
            (Section::Styles { .. }, "format") => style_format = split_format(value),
            (Section::Styles { legacy }, "style") => {
                if let Some((name, position)) = style_position(&style_format, value, legacy) {
                    style_positions.insert(name, position);
                }
            }
            (Section::Events, "format") => event_format = split_format(value),
            (Section::Events, "dialogue") => {
                cues.push(parse_dialogue(&event_format, value, &style_positions, line_no)?);
            }
            _ => {}
        }
    }

    Ok(cues)
}

fn split_format(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|field| field.trim().to_ascii_lowercase())
        .collect()
}

fn style_position(format: &[String], value: &str, legacy: bool) -> Option<(String, Position)> {
    let fields: Vec<&str> = value.split(',').map(str::trim).collect();
    let field = |name: &str| {
        format
            .iter()
            .position(|f| f == name)
            .and_then(|i| fields.get(i).copied())
    };

    let name = field("name")?.to_string();
    let alignment: u32 = field("alignment")?.parse().ok()?;
    Some((name, alignment_position(alignment, legacy)))
}

/// Numpad alignment (7-9 on top), or the SSA layout (5-7 on top)
fn alignment_position(alignment: u32, legacy: bool) -> Position {
    let top = if legacy {
        (5..=7).contains(&alignment)
    } else {
        (7..=9).contains(&alignment)
    };
    if top {
        Position::Top
    } else {
        Position::Bottom
    }
}

fn parse_dialogue(
    format: &[String],
    value: &str,
    style_positions: &HashMap<String, Position>,
    line_no: usize,
) -> CodecResult<Cue> {
    let fields: Vec<&str> = value.trim_start().splitn(format.len(), ',').collect();
    if fields.len() < format.len() {
        return Err(CodecError::parse(
            line_no,
            format!("expected {} dialogue fields, found {}", format.len(), fields.len()),
        ));
    }

    let field = |name: &str| format.iter().position(|f| f == name).map(|i| fields[i]);
    let (Some(start), Some(end), Some(raw_text)) = (field("start"), field("end"), field("text")) else {
        return Err(CodecError::parse(line_no, "event format lacks Start, End or Text"));
    };

    let start_ms = parse_timestamp(start).map_err(|message| CodecError::parse(line_no, message))?;
    let end_ms = parse_timestamp(end).map_err(|message| CodecError::parse(line_no, message))?;
    if end_ms <= start_ms {
        return Err(CodecError::InvalidRange {
            line: line_no,
            start_ms,
            end_ms,
        });
    }

    let (text, mut style) = convert_text(raw_text);
    if style.position.is_none() {
        style.position = field("style")
            .and_then(|name| style_positions.get(name.trim()))
            .copied();
    }

    Ok(Cue::new(start_ms, end_ms, text).with_style(style))
}

fn convert_text(raw: &str) -> (String, CueStyle) {
    let mut style = CueStyle::default();

    for caps in OVERRIDE_BLOCK.captures_iter(raw) {
        let block = &caps[1];
        if let Some(an) = NUMPAD_ALIGN.captures(block) {
            if let Ok(alignment) = an[1].parse() {
                style.position = Some(alignment_position(alignment, false));
            }
        } else if let Some(a) = LEGACY_ALIGN.captures(block) {
            if let Ok(alignment) = a[1].parse() {
                style.position = Some(alignment_position(alignment, true));
            }
        }
        if let Some(c) = PRIMARY_COLOR.captures(block) {
            style.color = bgr_to_hex(&c[1]);
        }
    }

    let text = OVERRIDE_BLOCK
        .replace_all(raw, "")
        .replace("\\N", "\n")
        .replace("\\n", "\n")
        .replace("\\h", " ");
    // Leading or doubled `\N` would otherwise end a SubRip block early
    let text = text
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    (text, style)
}

/// `&HBBGGRR&` to `#RRGGBB`
fn bgr_to_hex(hex: &str) -> Option<String> {
    let value = u32::from_str_radix(hex, 16).ok()?;
    let r = value & 0xFF;
    let g = (value >> 8) & 0xFF;
    let b = (value >> 16) & 0xFF;
    Some(format!("#{r:02X}{g:02X}{b:02X}"))
}
