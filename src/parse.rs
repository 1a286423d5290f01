//! Backend output decoding.
//!
//! Model output arrives as JSON in the good case and as almost-JSON the
//! rest of the time: fenced in markdown, written with smart quotes, or cut
//! off mid-array. Decoding is an ordered chain of parsers; each declares an
//! applicability test and an extractor, and the first success wins. The
//! terminal parser is a regex salvage pass. Kept isolated from assembly and
//! retrieval logic.

use regex::Regex;
use serde_json::Value;

/// One decoding strategy.
pub trait ResponseParser: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap test for whether this strategy is worth attempting.
    fn applies(&self, raw: &str) -> bool;

    fn parse(&self, raw: &str) -> Option<Value>;
}

/// Ordered chain of parsers, strictest first.
pub struct ParserChain {
    parsers: Vec<Box<dyn ResponseParser>>,
}

impl ParserChain {
    /// The standard chain: strict JSON → fenced JSON → quote/comma
    /// normalization → truncated-array repair → regex salvage.
    pub fn standard() -> Self {
        Self {
            parsers: vec![
                Box::new(StrictJson),
                Box::new(FencedJson),
                Box::new(NormalizingJson),
                Box::new(TruncatedArray),
                Box::new(SalvageRegex::new()),
            ],
        }
    }

    /// Try each applicable parser in order. Returns the decoded value and
    /// the name of the parser that produced it.
    pub fn parse(&self, raw: &str) -> Option<(Value, &'static str)> {
        for parser in &self.parsers {
            if !parser.applies(raw) {
                continue;
            }
            if let Some(value) = parser.parse(raw) {
                tracing::debug!(parser = parser.name(), "Decoded backend response");
                return Some((value, parser.name()));
            }
        }
        tracing::warn!("No parser decoded backend response");
        None
    }
}

/// The payload between the first and last JSON delimiter, if any.
fn json_candidate(raw: &str) -> Option<&str> {
    let start = raw.find(['{', '['])?;
    let end = raw.rfind(['}', ']'])?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

struct StrictJson;

impl ResponseParser for StrictJson {
    fn name(&self) -> &'static str {
        "strict_json"
    }

    fn applies(&self, raw: &str) -> bool {
        let trimmed = raw.trim_start();
        trimmed.starts_with('{') || trimmed.starts_with('[')
    }

    fn parse(&self, raw: &str) -> Option<Value> {
        serde_json::from_str(raw.trim()).ok()
    }
}

struct FencedJson;

impl ResponseParser for FencedJson {
    fn name(&self) -> &'static str {
        "fenced_json"
    }

    fn applies(&self, raw: &str) -> bool {
        raw.contains("```")
    }

    fn parse(&self, raw: &str) -> Option<Value> {
        let after_open = raw.split_once("```")?.1;
        // Tolerate a language tag on the fence line.
        let body = after_open.split_once('\n')?.1;
        let inner = match body.split_once("```") {
            Some((inner, _)) => inner,
            None => body,
        };
        serde_json::from_str(inner.trim()).ok()
    }
}

struct NormalizingJson;

impl ResponseParser for NormalizingJson {
    fn name(&self) -> &'static str {
        "normalizing_json"
    }

    fn applies(&self, raw: &str) -> bool {
        json_candidate(raw).is_some()
    }

    fn parse(&self, raw: &str) -> Option<Value> {
        let candidate = json_candidate(raw)?;
        let mut normalized = candidate
            .replace(['\u{2018}', '\u{2019}'], "'")
            .replace(['\u{201C}', '\u{201D}'], "\"");
        // Trailing commas before a closing delimiter.
        loop {
            let stripped = strip_trailing_commas(&normalized);
            if stripped == normalized {
                break;
            }
            normalized = stripped;
        }
        serde_json::from_str(&normalized).ok()
    }
}

fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut in_string = false;
    let mut escaped = false;
    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
            out.push(c);
            continue;
        }
        if c == ',' {
            let next_meaningful = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if matches!(next_meaningful, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

struct TruncatedArray;

impl ResponseParser for TruncatedArray {
    fn name(&self) -> &'static str {
        "truncated_array"
    }

    fn applies(&self, raw: &str) -> bool {
        raw.trim_start().starts_with('[') || raw.contains(": [")
    }

    fn parse(&self, raw: &str) -> Option<Value> {
        let start = raw.find('[')?;
        let body = &raw[start..];

        // Walk the array tracking string/escape state and nesting depth;
        // remember the end of the last element that completed at depth 1.
        let mut in_string = false;
        let mut escaped = false;
        let mut depth = 0usize;
        let mut last_complete = None;

        for (i, c) in body.char_indices() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    in_string = false;
                    if depth == 1 {
                        last_complete = Some(i);
                    }
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '[' | '{' => depth += 1,
                ']' | '}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 1 {
                        last_complete = Some(i);
                    }
                    if depth == 0 {
                        // The array closed by itself; strict parsing
                        // already had its chance, so reparse just in case
                        // surrounding text was the problem.
                        return serde_json::from_str(&body[..=i]).ok();
                    }
                }
                c if depth == 1 && (c.is_ascii_digit() || c == 'e' || c == 'l') => {
                    // Completing character of a number / true / false / null.
                    last_complete = Some(i);
                }
                _ => {}
            }
        }

        let end = last_complete?;
        let repaired = format!("{}]", &body[..=end]);
        serde_json::from_str(&repaired).ok()
    }
}

/// Terminal salvage: pull `"key": "value"` pairs into an object, or bare
/// quoted strings into an array when no pairs exist.
struct SalvageRegex {
    pair: Regex,
    quoted: Regex,
}

impl SalvageRegex {
    fn new() -> Self {
        Self {
            pair: Regex::new(r#""(\w+)"\s*:\s*"((?:[^"\\]|\\.)*)""#)
                .expect("salvage pair pattern compiles"),
            quoted: Regex::new(r#""((?:[^"\\]|\\.)+)""#).expect("salvage quote pattern compiles"),
        }
    }
}

impl ResponseParser for SalvageRegex {
    fn name(&self) -> &'static str {
        "salvage_regex"
    }

    fn applies(&self, _raw: &str) -> bool {
        true
    }

    fn parse(&self, raw: &str) -> Option<Value> {
        let mut object = serde_json::Map::new();
        for capture in self.pair.captures_iter(raw) {
            object.insert(capture[1].to_string(), Value::String(capture[2].to_string()));
        }
        if !object.is_empty() {
            return Some(Value::Object(object));
        }

        let strings: Vec<Value> = self
            .quoted
            .captures_iter(raw)
            .map(|c| Value::String(c[1].to_string()))
            .collect();
        if strings.is_empty() {
            None
        } else {
            Some(Value::Array(strings))
        }
    }
}
