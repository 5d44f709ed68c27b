//! WebVTT reader.

use super::time::parse_arrow_range;
use crate::cue::{Cue, CueStyle, Position};
use crate::error::{CodecError, CodecResult};
use once_cell::sync::Lazy;
use regex::Regex;

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

pub fn parse(text: &str) -> CodecResult<Vec<Cue>> {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = text.lines().collect();

    let header = lines
        .first()
        .map(|l| l.trim_start_matches('\u{feff}').trim_start())
        .unwrap_or_default();
    if !header.starts_with("WEBVTT") {
        return Err(CodecError::parse(1, "missing WEBVTT header"));
    }

    let mut cues = Vec::new();
    // The header block runs until the first blank line
    let mut i = lines
        .iter()
        .position(|l| l.trim().is_empty())
        .unwrap_or(lines.len());

    while i < lines.len() {
        if lines[i].trim().is_empty() {
            i += 1;
            continue;
        }

        let block_start = i;
        let mut end = i;
        while end < lines.len() && !lines[end].trim().is_empty() {
            end += 1;
        }
        let block = &lines[block_start..end];
        i = end;

        let first = block[0].trim();
        if first.starts_with("NOTE") || first == "STYLE" || first == "REGION" {
            continue;
        }

        // Optional cue identifier before the timing line
        let timing_offset = match block.iter().position(|l| l.contains("-->")) {
            Some(offset) if offset <= 1 => offset,
            _ => {
                return Err(CodecError::parse(
                    block_start + 1,
                    format!("expected a cue timing line, found '{first}'"),
                ))
            }
        };

        let line_no = block_start + timing_offset + 1;
        let (start_ms, end_ms, settings) = parse_arrow_range(block[timing_offset])
            .map_err(|message| CodecError::parse(line_no, message))?;
        if end_ms <= start_ms {
            return Err(CodecError::InvalidRange {
                line: line_no,
                start_ms,
                end_ms,
            });
        }

        let body = block[timing_offset + 1..]
            .iter()
            .map(|l| clean_line(l))
            .filter(|l| !l.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        let style = CueStyle {
            position: position_from_settings(settings),
            color: None,
        };
        cues.push(Cue::new(start_ms, end_ms, body).with_style(style));
    }

    Ok(cues)
}

fn clean_line(line: &str) -> String {
    let unescaped = TAG
        .replace_all(line.trim_end(), "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&");
    // Escaped markup must not turn into SubRip style tags
    TAG.replace_all(&unescaped, "").into_owned()
}

/// Map a `line:` cue setting to a position
fn position_from_settings(settings: &str) -> Option<Position> {
    let value = settings
        .split_whitespace()
        .find_map(|s| s.strip_prefix("line:"))?;
    let value = value.split(',').next().unwrap_or(value);

    if let Some(percent) = value.strip_suffix('%') {
        let percent: f64 = percent.parse().ok()?;
        return Some(if percent < 50.0 {
            Position::Top
        } else {
            Position::Bottom
        });
    }

    let line: i64 = value.parse().ok()?;
    Some(if line >= 0 {
        Position::Top
    } else {
        Position::Bottom
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_header_notes_and_identifiers() {
        let input = "WEBVTT - episode 1\nKind: captions\n\nNOTE this is ignored\nacross lines\n\nintro\n00:01.000 --> 00:02.000\n<v Narrator>Hello</v> &amp; welcome\n\n00:00:03.000 --> 00:00:04.000 line:0\n<c.yellow>Top</c>\n";
        let cues = parse(input).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].text, "Hello & welcome");
        assert_eq!(cues[0].style.position, None);
        assert_eq!(cues[1].text, "Top");
        assert_eq!(cues[1].style.position, Some(Position::Top));
    }

    #[test]
    fn test_missing_header() {
        assert!(matches!(
            parse("00:01.000 --> 00:02.000\nx\n"),
            Err(CodecError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_zero_length_rejected() {
        let input = "WEBVTT\n\n00:01.000 --> 00:01.000\nx\n";
        assert!(matches!(
            parse(input),
            Err(CodecError::InvalidRange { line: 3, .. })
        ));
    }

    #[test]
    fn test_escaped_markup_stays_text() {
        let input = "WEBVTT\n\n00:01.000 --> 00:02.000\n&lt;font color=#ff0000&gt;x&lt;/font&gt; &lt;3\n";
        let cues = parse(input).unwrap();
        assert_eq!(cues[0].text, "x <3");
        assert_eq!(cues[0].style.color, None);
    }

    #[test]
    fn test_line_settings() {
        assert_eq!(position_from_settings("line:10%"), Some(Position::Top));
        assert_eq!(position_from_settings("line:90%,end"), Some(Position::Bottom));
        assert_eq!(position_from_settings("line:-1"), Some(Position::Bottom));
        assert_eq!(position_from_settings("align:start"), None);
    }
}
