//! Timestamp parsing and formatting.

/// Format milliseconds as a SubRip timestamp, `HH:MM:SS,mmm`
pub fn format_srt_timestamp(ms: i64) -> String {
    let ms = ms.max(0);
    let milli = ms % 1000;
    let total_seconds = ms / 1000;
    let sec = total_seconds % 60;
    let total_minutes = total_seconds / 60;
    let min = total_minutes % 60;
    let hour = total_minutes / 60;

    format!("{hour:02}:{min:02}:{sec:02},{milli:03}")
}

/// Parse a timestamp into milliseconds.
///
/// Accepts `H:MM:SS,mmm` (SubRip), `[HH:]MM:SS.mmm` (WebVTT) and `H:MM:SS.cc`
/// (SubStation); fractional digits are read as a decimal fraction of a second.
pub fn parse_timestamp(s: &str) -> Result<i64, String> {
    let t = s.trim();

    let (hms, frac) = match t.rsplit_once(|c| c == ',' || c == '.') {
        Some((a, b)) => (a, Some(b)),
        None => (t, None),
    };

    let parts: Vec<&str> = hms.split(':').collect();
    let (h, m, sec) = match parts.as_slice() {
        [h, m, sec] => (parse_field(h, t)?, parse_field(m, t)?, parse_field(sec, t)?),
        [m, sec] => (0, parse_field(m, t)?, parse_field(sec, t)?),
        _ => return Err(format!("unrecognized timestamp: '{t}'")),
    };
    if m >= 60 || sec >= 60 {
        return Err(format!("timestamp field out of range: '{t}'"));
    }

    let out_of_range = || format!("timestamp out of range: '{t}'");
    let mut ms = h
        .checked_mul(3_600_000)
        .and_then(|ms| ms.checked_add(m * 60_000 + sec * 1000))
        .ok_or_else(out_of_range)?;

    if let Some(frac) = frac {
        let frac = frac.trim();
        if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("bad fraction: '{t}'"));
        }
        let mut digits: String = frac.chars().take(3).collect();
        while digits.len() < 3 {
            digits.push('0');
        }
        let fraction = digits
            .parse::<i64>()
            .map_err(|_| format!("bad fraction: '{t}'"))?;
        ms = ms.checked_add(fraction).ok_or_else(out_of_range)?;
    }

    Ok(ms)
}

fn parse_field(field: &str, whole: &str) -> Result<i64, String> {
    let field = field.trim();
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("bad timestamp field '{field}' in '{whole}'"));
    }
    field
        .parse()
        .map_err(|_| format!("bad timestamp field '{field}' in '{whole}'"))
}

/// Parse a `start --> end` line; anything after the end timestamp is returned as settings
pub fn parse_arrow_range(line: &str) -> Result<(i64, i64, &str), String> {
    let (a, b) = line
        .split_once("-->")
        .ok_or_else(|| format!("missing '-->' in time range: '{line}'"))?;
    let b = b.trim_start();
    let (end, settings) = match b.find(char::is_whitespace) {
        Some(idx) => (&b[..idx], b[idx..].trim()),
        None => (b, ""),
    };
    Ok((parse_timestamp(a)?, parse_timestamp(end)?, settings))
}
