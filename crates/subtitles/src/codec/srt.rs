//! SubRip reader and writer.
//!
//! Position and color survive a round trip: the writer emits a leading
//! `{\anN}` override and a wrapping `<font color>` tag, and the reader turns
//! both back into [`CueStyle`] hints.

use super::time::{format_srt_timestamp, parse_arrow_range};
use crate::cue::{Cue, CueStyle, Position};
use crate::error::{CodecError, CodecResult};
use once_cell::sync::Lazy;
use regex::Regex;

static POSITION_OVERRIDE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\{\\an([1-9])\}").unwrap());

static FONT_COLOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)^<font\s+color\s*=\s*"?#?([0-9a-f]{6})"?\s*>(.*)</font>$"#).unwrap()
});

pub fn parse(text: &str) -> CodecResult<Vec<Cue>> {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = text.lines().collect();
    let mut cues = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i].trim().trim_start_matches('\u{feff}');
        if line.is_empty() {
            i += 1;
            continue;
        }

        // A block starts with an optional counter, then the timing line
        let timing_idx = if line.contains("-->") {
            i
        } else if lines.get(i + 1).is_some_and(|next| next.contains("-->")) {
            i + 1
        } else {
            return Err(CodecError::parse(
                i + 1,
                format!("expected a cue timing line, found '{line}'"),
            ));
        };

        let line_no = timing_idx + 1;
        let (start_ms, end_ms, _) =
            parse_arrow_range(lines[timing_idx]).map_err(|message| CodecError::parse(line_no, message))?;
        if end_ms <= start_ms {
            return Err(CodecError::InvalidRange {
                line: line_no,
                start_ms,
                end_ms,
            });
        }

        let mut end = timing_idx + 1;
        while end < lines.len() && !lines[end].trim().is_empty() {
            end += 1;
        }
        let body = lines[timing_idx + 1..end]
            .iter()
            .map(|l| l.trim_end())
            .collect::<Vec<_>>()
            .join("\n");

        let (text, style) = split_style(&body);
        cues.push(Cue::new(start_ms, end_ms, text).with_style(style));
        i = end;
    }

    Ok(cues)
}

pub fn write(cues: &[Cue]) -> String {
    let mut out = String::new();

    for (i, cue) in cues.iter().enumerate() {
        out.push_str(&(i + 1).to_string());
        out.push('\n');
        out.push_str(&format!(
            "{} --> {}\n",
            format_srt_timestamp(cue.start_ms),
            format_srt_timestamp(cue.end_ms)
        ));
        out.push_str(&styled_text(cue));
        out.push_str("\n\n");
    }

    out
}

fn styled_text(cue: &Cue) -> String {
    // A blank line inside the body would terminate the block
    let mut text = cue
        .text
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if let Some(color) = &cue.style.color {
        text = format!("<font color=\"{}\">{}</font>", color, text);
    }
    match cue.style.position {
        Some(Position::Top) => format!("{{\\an8}}{text}"),
        Some(Position::Bottom) => format!("{{\\an2}}{text}"),
        None => text,
    }
}

/// Strip the writer's style markup from a cue body
fn split_style(body: &str) -> (String, CueStyle) {
    let mut style = CueStyle::default();
    let mut text = body;

    if let Some(caps) = POSITION_OVERRIDE.captures(text) {
        let alignment: u8 = caps[1].parse().unwrap_or(2);
        style.position = Some(if (7..=9).contains(&alignment) {
            Position::Top
        } else {
            Position::Bottom
        });
        text = &text[caps[0].len()..];
    }

    if let Some(caps) = FONT_COLOR.captures(text) {
        style.color = Some(format!("#{}", caps[1].to_ascii_uppercase()));
        return (caps[2].to_string(), style);
    }

    (text.to_string(), style)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_blocks() {
        let input = "1\r\n00:00:01,000 --> 00:00:02,000\r\nHello  \r\nthere\r\n\r\n2\r\n00:00:03,000 --> 00:00:04,000\r\nBye\r\n";
        let cues = parse(input).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].text, "Hello\nthere");
        assert_eq!((cues[1].start_ms, cues[1].end_ms), (3_000, 4_000));
    }

    #[test]
    fn test_parse_without_counters_and_extra_blank_lines() {
        let input = "\n\n00:00:01,000 --> 00:00:02,000\nA\n\n\n\n00:00:03,000 --> 00:00:04,000\nB";
        let cues = parse(input).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[1].text, "B");
    }

    #[test]
    fn test_reversed_range_is_rejected_with_line() {
        let input = "1\n00:00:01,000 --> 00:00:02,000\nok\n\n2\n00:00:05,000 --> 00:00:05,000\nzero\n";
        match parse(input) {
            Err(CodecError::InvalidRange { line, .. }) => assert_eq!(line, 6),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_garbage_reports_line() {
        let input = "1\n00:00:01,000 --> 00:00:02,000\nok\n\nnot a cue\nstill not\n";
        match parse(input) {
            Err(CodecError::Parse { line, .. }) => assert_eq!(line, 5),
            other => panic!("unexpected: {other:?}"),
        }

        let input = "1\n00:00:xx,000 --> 00:00:02,000\nbad\n";
        assert!(matches!(parse(input), Err(CodecError::Parse { line: 2, .. })));
    }

    #[test]
    fn test_style_markup_round_trip() {
        let cue = Cue::new(1_000, 2_000, "[EN] Hello\nworld").with_style(CueStyle {
            position: Some(Position::Top),
            color: Some("#FFFF00".to_string()),
        });
        let written = write(std::slice::from_ref(&cue));
        assert!(written.contains("{\\an8}<font color=\"#FFFF00\">[EN] Hello\nworld</font>"));

        let parsed = parse(&written).unwrap();
        assert_eq!(parsed, vec![cue]);
    }

    #[test]
    fn test_blank_lines_in_text_do_not_split_blocks() {
        let cues = vec![
            Cue::new(1_000, 2_000, "\nfoo"),
            Cue::new(3_000, 4_000, "a\n\nb\n"),
        ];
        let parsed = parse(&write(&cues)).unwrap();
        let texts: Vec<&str> = parsed.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["foo", "a\nb"]);
    }

    #[test]
    fn test_plain_tags_are_kept() {
        let cues = parse("1\n00:00:01,000 --> 00:00:02,000\n<i>Whisper</i>\n").unwrap();
        assert_eq!(cues[0].text, "<i>Whisper</i>");
        assert_eq!(cues[0].style, CueStyle::default());
    }

    #[test]
    fn test_bottom_override_and_lowercase_color() {
        let cues = parse("1\n00:00:01,000 --> 00:00:02,000\n{\\an2}<font color=\"#ffffff\">x</font>\n").unwrap();
        assert_eq!(cues[0].style.position, Some(Position::Bottom));
        assert_eq!(cues[0].style.color.as_deref(), Some("#FFFFFF"));
        assert_eq!(cues[0].text, "x");
    }
}
