//! Language identification for subtitle sources.
//!
//! Filename hints win over content. Without a hint the text is classified by
//! script first (kana, Hangul, Han, Cyrillic) and then by `whatlang`. Generic
//! Chinese is refined to Traditional or Simplified only when the sample is
//! large enough to trust.

use crate::cue::Track;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// Known codes and aliases, mapped to their normalized code
static ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let groups: &[(&str, &[&str])] = &[
        ("en", &["en", "eng", "english"]),
        ("ja", &["ja", "jp", "jpn", "japanese"]),
        ("zh", &["zh", "zho", "chi", "chinese"]),
        ("es", &["es", "spa", "spanish", "espanol"]),
        ("fr", &["fr", "fre", "fra", "french", "francais"]),
        ("de", &["de", "ger", "deu", "german", "deutsch"]),
        ("it", &["it", "ita", "italian"]),
        ("pt", &["pt", "por", "portuguese"]),
        ("pt-BR", &["pt-br", "ptbr", "brazilian"]),
        ("ru", &["ru", "rus", "russian"]),
        ("ko", &["ko", "kr", "kor", "korean"]),
        ("ar", &["ar", "ara", "arb", "arabic"]),
        ("nl", &["nl", "dut", "nld", "dutch"]),
        ("sv", &["sv", "swe", "swedish"]),
        ("no", &["no", "nor", "nob", "norwegian"]),
        ("da", &["da", "dan", "danish"]),
        ("fi", &["fi", "fin", "finnish"]),
        ("pl", &["pl", "pol", "polish"]),
        ("tr", &["tr", "tur", "turkish"]),
        ("th", &["th", "tha", "thai"]),
        ("vi", &["vi", "vie", "vietnamese"]),
        ("zh-TW", &["zh-tw", "zht", "cht", "zh-hant", "tc", "traditional"]),
        ("zh-HK", &["zh-hk"]),
        ("zh-CN", &["zh-cn", "zhs", "chs", "zh-hans", "sc", "simplified"]),
        ("zh-SG", &["zh-sg"]),
    ];
    groups
        .iter()
        .flat_map(|(code, aliases)| aliases.iter().map(move |alias| (*alias, *code)))
        .collect()
});

/// whatlang's ISO 639-3 codes that differ from the alias table
static WHATLANG_CODES: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| HashMap::from([("cmn", "zh"), ("nob", "no"), ("arb", "ar")]));

/// Segments that describe a subtitle variant, never a language
const VARIANT_MARKERS: &[&str] = &["hi", "cc", "sdh", "forced", "commentary", "dual"];

const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "vtt", "sub"];

const CHINESE_REGIONS: &[&str] = &["tw", "hk", "cn", "sg"];

static TRADITIONAL_CHARS: Lazy<HashSet<char>> = Lazy::new(|| {
    "這個們來時說對會過還後裡麼國學發東車長開問頭見實點經電話語體機無樣當從與關書讓聽覺愛歡氣錢變幫歲應該夠誰邊處號門際腦網絡簡為嗎讀寫買賣請謝認識員"
        .chars()
        .collect()
});

static SIMPLIFIED_CHARS: Lazy<HashSet<char>> = Lazy::new(|| {
    "这个们来时说对会过还后里么国学发东车长开问头见实点经电话语体机无样当从与关书让听觉爱欢气钱变帮岁应该够谁边处号门际脑网络简为吗读写买卖请谢认识员"
        .chars()
        .collect()
});

/// How much a result can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Low,
}

/// Which signal produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Filename,
    Script,
    Statistical,
    None,
}

/// Outcome of language identification; `language == None` means unknown
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identification {
    pub language: Option<String>,
    pub method: DetectionMethod,
    pub confidence: Confidence,
}

impl Identification {
    pub fn unknown() -> Self {
        Self {
            language: None,
            method: DetectionMethod::None,
            confidence: Confidence::Low,
        }
    }

    fn found(language: impl Into<String>, method: DetectionMethod, confidence: Confidence) -> Self {
        Self {
            language: Some(language.into()),
            method,
            confidence,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.language.is_none()
    }
}

/// Language identifier with its sampling thresholds
#[derive(Debug, Clone)]
pub struct LanguageIdentifier {
    /// Minimum number of text lines before Traditional/Simplified refinement is trusted
    min_refinement_lines: usize,
    /// Lines taken from a track for text detection
    sample_lines: usize,
}

impl Default for LanguageIdentifier {
    fn default() -> Self {
        Self::new(50, 200)
    }
}

impl LanguageIdentifier {
    pub fn new(min_refinement_lines: usize, sample_lines: usize) -> Self {
        Self {
            min_refinement_lines,
            sample_lines: sample_lines.max(min_refinement_lines),
        }
    }

    /// Identify from a filename hint, then from a text sample
    pub fn identify(&self, filename: &str, sample: Option<&str>) -> Identification {
        if let Some(code) = language_from_filename(filename) {
            debug!(filename, language = %code, "Language from filename");
            return Identification::found(code, DetectionMethod::Filename, Confidence::High);
        }

        match sample {
            Some(text) if !text.trim().is_empty() => self.detect_text(text),
            _ => Identification::unknown(),
        }
    }

    /// Identify a parsed track, sampling its cue text when the filename gives no hint
    pub fn identify_track(&self, filename: &str, track: &Track) -> Identification {
        let sample = track.sample_text(self.sample_lines);
        self.identify(filename, Some(&sample))
    }

    /// Classify text content alone
    pub fn detect_text(&self, text: &str) -> Identification {
        let counts = ScriptCounts::of(text);
        if counts.letters == 0 {
            return Identification::unknown();
        }

        if counts.kana > 0 && counts.kana * 10 >= counts.kana + counts.han {
            return Identification::found("ja", DetectionMethod::Script, Confidence::High);
        }
        if counts.hangul * 2 >= counts.letters {
            return Identification::found("ko", DetectionMethod::Script, Confidence::High);
        }
        if counts.han * 2 >= counts.letters {
            return self.refine_chinese(text, DetectionMethod::Script);
        }
        if counts.cyrillic * 2 >= counts.letters {
            return Identification::found("ru", DetectionMethod::Script, Confidence::High);
        }

        let Some(info) = whatlang::detect(text) else {
            return Identification::unknown();
        };
        let code3 = info.lang().code();
        let code = WHATLANG_CODES
            .get(code3)
            .copied()
            .or_else(|| ALIASES.get(code3).copied())
            .unwrap_or(code3);
        let confidence = if info.is_reliable() {
            Confidence::High
        } else {
            Confidence::Low
        };

        debug!(language = code, reliable = info.is_reliable(), "Statistical language detection");

        if code == "zh" {
            return self.refine_chinese(text, DetectionMethod::Statistical);
        }
        Identification::found(code, DetectionMethod::Statistical, confidence)
    }

    /// Tell Traditional from Simplified Chinese by character-set membership.
    ///
    /// Below the line floor the generic code is returned with low confidence.
    fn refine_chinese(&self, text: &str, method: DetectionMethod) -> Identification {
        let lines = text.lines().filter(|l| !l.trim().is_empty()).count();
        if lines < self.min_refinement_lines {
            debug!(lines, floor = self.min_refinement_lines, "Sample too small for Chinese refinement");
            return Identification::found("zh", method, Confidence::Low);
        }

        let traditional = text.chars().filter(|c| TRADITIONAL_CHARS.contains(c)).count();
        let simplified = text.chars().filter(|c| SIMPLIFIED_CHARS.contains(c)).count();

        match traditional.cmp(&simplified) {
            std::cmp::Ordering::Greater => Identification::found("zh-TW", method, Confidence::High),
            std::cmp::Ordering::Less => Identification::found("zh-CN", method, Confidence::High),
            std::cmp::Ordering::Equal => Identification::found("zh", method, Confidence::Low),
        }
    }
}

#[derive(Debug, Default)]
struct ScriptCounts {
    letters: usize,
    kana: usize,
    hangul: usize,
    han: usize,
    cyrillic: usize,
}

impl ScriptCounts {
    fn of(text: &str) -> Self {
        let mut counts = Self::default();
        for c in text.chars().filter(|c| c.is_alphabetic()) {
            counts.letters += 1;
            match c as u32 {
                0x3040..=0x30FF | 0x31F0..=0x31FF => counts.kana += 1,
                0xAC00..=0xD7AF | 0x1100..=0x11FF | 0x3130..=0x318F => counts.hangul += 1,
                0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF => counts.han += 1,
                0x0400..=0x04FF => counts.cyrillic += 1,
                _ => {}
            }
        }
        counts
    }
}

/// Extract a language code from a subtitle filename.
///
/// Handles `Show.S01E01.en.srt`, `Show.S01E01.eng.forced.srt`,
/// `Show.S01E01.zh-TW.srt` and `Show.S01E01.zh.TW.srt`.
pub fn language_from_filename(filename: &str) -> Option<String> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);

    let mut parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 1
        && parts
            .last()
            .is_some_and(|ext| SUBTITLE_EXTENSIONS.iter().any(|s| s.eq_ignore_ascii_case(ext)))
    {
        parts.pop();
    }
    if parts.len() <= 1 {
        return None;
    }
    let segments: Vec<String> = parts[1..].iter().map(|p| p.to_ascii_lowercase()).collect();

    // Chinese variants are more specific than any plain code
    for (i, segment) in segments.iter().enumerate() {
        if segment == "zh" {
            if let Some(region) = segments.get(i + 1).filter(|r| CHINESE_REGIONS.contains(&r.as_str())) {
                return Some(format!("zh-{}", region.to_ascii_uppercase()));
            }
        }
        if let Some(code) = ALIASES.get(segment.as_str()).filter(|c| c.starts_with("zh-")) {
            return Some(code.to_string());
        }
    }

    let candidates = segments
        .iter()
        .rev()
        .filter(|s| !VARIANT_MARKERS.contains(&s.as_str()));

    for segment in candidates.clone() {
        if let Some(code) = ALIASES.get(segment.as_str()) {
            return Some(code.to_string());
        }
    }

    // Unlisted two-letter codes, e.g. "hu"
    candidates
        .take(1)
        .find(|s| s.len() == 2 && s.chars().all(|c| c.is_ascii_alphabetic()))
        .cloned()
}

/// Normalize a code or alias (`eng`, `Japanese`, `zh-hant`) to its canonical form
pub fn normalize_language_code(code: &str) -> Option<String> {
    let key = code.trim().to_ascii_lowercase().replace('_', "-");
    if key.is_empty() {
        return None;
    }
    ALIASES.get(key.as_str()).map(|c| c.to_string())
}

/// Two codes name the same language after normalization
pub fn same_language(a: &str, b: &str) -> bool {
    let a = normalize_language_code(a).unwrap_or_else(|| a.to_ascii_lowercase());
    let b = normalize_language_code(b).unwrap_or_else(|| b.to_ascii_lowercase());
    a.eq_ignore_ascii_case(&b)
}

/// Chinese, Japanese or Korean (any variant)
pub fn is_cjk_language(code: &str) -> bool {
    let normalized = normalize_language_code(code).unwrap_or_else(|| code.to_ascii_lowercase());
    matches!(normalized.as_str(), "zh" | "ja" | "ko") || normalized.starts_with("zh-")
}
