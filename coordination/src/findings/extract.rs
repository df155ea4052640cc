//! Finding extraction from free-form model output.
//!
//! Three passes, first hit wins:
//!
//! 1. A JSON object (fenced or inline) with a `findings` array and/or a
//!    `scores` map.
//! 2. Line markers: `[critical] ...`, `Warning: ...`, `[high][security] ...`,
//!    category headers (`## Security`), score lines (`Security: 7/10`).
//! 3. Fallback: one `other`/`info` finding wrapping the whole response.
//!
//! Extraction never fails. A failed invocation simply yields no findings.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::{Finding, FindingCategory, Location, ModelAssessment, Severity};
use crate::invocation::InvocationResult;

static BULLET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*+•]|\d+[.)])\s+").expect("BULLET_PATTERN regex should compile")
});

static BRACKET_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[([A-Za-z ]+)\]\s*(?:\[([A-Za-z ]+)\]\s*)?[:\-]?\s*(.+)$")
        .expect("BRACKET_MARKER regex should compile")
});

static PREFIX_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z]+)(?:\s*\(([A-Za-z ]+)\))?\s*[:\-–]\s+(.+)$")
        .expect("PREFIX_MARKER regex should compile")
});

static SCORE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([a-z][a-z ]*?)(?:\s+score)?\s*[:=]\s*(\d+(?:\.\d+)?)\s*/\s*10\b")
        .expect("SCORE_LINE regex should compile")
});

static HEADER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#{1,6}\s+(.+?)\s*#*$").expect("HEADER_LINE regex should compile")
});

static LOCATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\w./\-]+\.[A-Za-z][A-Za-z0-9]*):(\d+)(?:[-–](\d+))?")
        .expect("LOCATION_PATTERN regex should compile")
});

static NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("NUMBER_PATTERN regex should compile"));

#[derive(Debug, Default)]
struct Parsed {
    findings: Vec<Finding>,
    scores: BTreeMap<FindingCategory, f64>,
}

impl Parsed {
    fn is_empty(&self) -> bool {
        self.findings.is_empty() && self.scores.is_empty()
    }
}

/// Findings from one invocation result. Failed results yield none.
pub fn extract(result: &InvocationResult) -> Vec<Finding> {
    result.text().map(extract_text).unwrap_or_default()
}

/// Findings from raw response text.
pub fn extract_text(text: &str) -> Vec<Finding> {
    parse(text).findings
}

/// Findings plus explicit scores for a successful result.
pub fn assess(result: &InvocationResult) -> Option<ModelAssessment> {
    let text = result.text()?;
    let parsed = parse(text);
    debug!(
        model_id = %result.model_id,
        findings = parsed.findings.len(),
        scores = parsed.scores.len(),
        "extracted assessment"
    );
    Some(ModelAssessment {
        model_id: result.model_id.clone(),
        findings: parsed.findings,
        category_scores: parsed.scores,
    })
}

/// Assessments for every successful result, in input order.
pub fn assess_all(results: &[InvocationResult]) -> Vec<ModelAssessment> {
    results.iter().filter_map(assess).collect()
}

fn parse(text: &str) -> Parsed {
    if let Some(parsed) = parse_json(text).filter(|p| !p.is_empty()) {
        return parsed;
    }
    let mut parsed = parse_lines(text);
    if parsed.findings.is_empty() && parsed.scores.is_empty() {
        parsed.findings.push(Finding::new(
            FindingCategory::Other,
            Severity::Info,
            text.trim(),
        ));
    }
    parsed
}

// ── JSON pass ────────────────────────────────────────────────────────

fn parse_json(text: &str) -> Option<Parsed> {
    let trimmed = text.trim();
    let value: Value = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).ok()?
    } else {
        serde_json::from_str(&extract_json(text)?).ok()?
    };

    let mut parsed = Parsed::default();
    let items = match &value {
        Value::Array(items) => Some(items),
        Value::Object(map) => map
            .get("findings")
            .or_else(|| map.get("issues"))
            .and_then(Value::as_array),
        _ => None,
    };
    if let Some(items) = items {
        parsed.findings = items.iter().filter_map(finding_from_value).collect();
    }
    if let Some(scores) = value.get("scores").and_then(Value::as_object) {
        for (key, raw) in scores {
            if let (Some(category), Some(score)) = (FindingCategory::parse(key), score_value(raw)) {
                parsed.scores.insert(category, score);
            }
        }
    }
    Some(parsed)
}

/// Find a JSON object in output that may contain markdown or other text.
fn extract_json(output: &str) -> Option<String> {
    if let Some(start) = output.find("```json") {
        let after_marker = &output[start + 7..];
        if let Some(end) = after_marker.find("```") {
            return Some(after_marker[..end].trim().to_string());
        }
    }

    if let Some(start) = output.find("```") {
        let after_marker = &output[start + 3..];
        if let Some(end) = after_marker.find("```") {
            if let Some(json_start) = after_marker[..end].find('{') {
                let content = after_marker[json_start..end].trim();
                if !content.is_empty() {
                    return Some(content.to_string());
                }
            }
        }
    }

    let start = output.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in output[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(output[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn finding_from_value(value: &Value) -> Option<Finding> {
    let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::trim);
    let description = ["description", "message", "title", "issue", "summary"]
        .iter()
        .find_map(|&k| text(k).filter(|s| !s.is_empty()))?
        .to_string();

    let severity = text("severity")
        .or_else(|| text("level"))
        .and_then(Severity::parse)
        .unwrap_or(Severity::Info);
    let category = text("category")
        .and_then(FindingCategory::parse)
        .unwrap_or_else(|| FindingCategory::infer(&description));

    let mut finding = Finding::new(category, severity, description);
    finding.location = location_from_value(value);
    Some(finding)
}

fn location_from_value(value: &Value) -> Option<Location> {
    let line = |v: &Value, key: &str| v.get(key).and_then(Value::as_u64).map(|n| n as u32);
    match value.get("location") {
        Some(Value::String(s)) => return parse_location(s).or_else(|| Some(Location::file(s.trim()))),
        Some(obj) if obj.is_object() => {
            let file = obj.get("file").and_then(Value::as_str)?;
            let start = line(obj, "start_line").or_else(|| line(obj, "line"));
            return Some(Location {
                file: file.to_string(),
                start_line: start,
                end_line: line(obj, "end_line").or(start),
            });
        }
        _ => {}
    }
    let file = value.get("file").and_then(Value::as_str)?;
    let start = line(value, "start_line").or_else(|| line(value, "line"));
    Some(Location {
        file: file.to_string(),
        start_line: start,
        end_line: line(value, "end_line").or(start),
    })
}

fn score_value(raw: &Value) -> Option<f64> {
    let score = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => NUMBER_PATTERN.find(s)?.as_str().parse().ok()?,
        _ => return None,
    };
    Some(score.clamp(0.0, 10.0))
}

// ── Line pass ────────────────────────────────────────────────────────

fn parse_lines(text: &str) -> Parsed {
    let mut parsed = Parsed::default();
    let mut section: Option<FindingCategory> = None;

    for raw in text.lines() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(caps) = HEADER_LINE.captures(trimmed) {
            section = FindingCategory::parse(&caps[1].replace("**", ""));
            continue;
        }

        let line = BULLET_PATTERN.replace(trimmed, "").replace("**", "");
        let line = line.trim();

        if let Some((category, score)) = parse_score_line(line) {
            parsed.scores.insert(category, score);
            continue;
        }

        if let Some(finding) = parse_marker_line(line, section) {
            parsed.findings.push(finding);
            continue;
        }

        // Bold or colon-terminated short labels act as headers too.
        let label = line.trim_end_matches(':');
        if label.split_whitespace().count() <= 3 {
            if let Some(category) = FindingCategory::parse(label) {
                section = Some(category);
            }
        }
    }
    parsed
}

fn parse_score_line(line: &str) -> Option<(FindingCategory, f64)> {
    let caps = SCORE_LINE.captures(line)?;
    let category = FindingCategory::parse(&caps[1])?;
    let score: f64 = caps[2].parse().ok()?;
    Some((category, score.clamp(0.0, 10.0)))
}

fn parse_marker_line(line: &str, section: Option<FindingCategory>) -> Option<Finding> {
    let (severity, tag, description) = if let Some(caps) = BRACKET_MARKER.captures(line) {
        let first = caps.get(1).map_or("", |m| m.as_str());
        let second = caps.get(2).map(|m| m.as_str());
        let description = caps.get(3).map_or("", |m| m.as_str());
        match (Severity::parse(first), second.and_then(Severity::parse)) {
            (Some(sev), _) => (sev, second.and_then(FindingCategory::parse), description),
            // [security][critical] ordering
            (None, Some(sev)) => (sev, FindingCategory::parse(first), description),
            (None, None) => return None,
        }
    } else if let Some(caps) = PREFIX_MARKER.captures(line) {
        let severity = Severity::parse(&caps[1])?;
        let tag = caps.get(2).and_then(|m| FindingCategory::parse(m.as_str()));
        (severity, tag, caps.get(3).map_or("", |m| m.as_str()))
    } else {
        return None;
    };

    let description = description.trim();
    if description.is_empty() {
        return None;
    }
    let category = tag
        .or(section)
        .unwrap_or_else(|| FindingCategory::infer(description));
    let mut finding = Finding::new(category, severity, description);
    finding.location = parse_location(description);
    Some(finding)
}

fn parse_location(text: &str) -> Option<Location> {
    let caps = LOCATION_PATTERN.captures(text)?;
    let file = caps[1].to_string();
    let start: u32 = caps[2].parse().ok()?;
    let end = caps
        .get(3)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(start);
    Some(Location::lines(file, start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::errors::{FailureKind, InvocationFailure};

    #[test]
    fn test_bracket_markers_with_category_headers() {
        let text = "\
## Security
- [critical] SQL injection in query builder (src/db.rs:42)
- [warning] Token logged at debug level

## Performance
1. [info] Vec reallocates in hot loop
";
        let findings = extract_text(text);
        assert_eq!(findings.len(), 3);
        assert_eq!(findings[0].category, FindingCategory::Security);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(
            findings[0].location,
            Some(Location::lines("src/db.rs", 42, 42))
        );
        assert_eq!(findings[1].severity, Severity::Warning);
        assert_eq!(findings[2].category, FindingCategory::Performance);
        assert_eq!(findings[2].severity, Severity::Info);
    }

    #[test]
    fn test_prefix_markers_and_bold() {
        let text = "**Critical**: unchecked unwrap on user input in parser.rs:10-14\n\
                    High (security): secrets committed in config.toml:3\n\
                    Nothing else stood out.";
        let findings = extract_text(text);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(findings[0].category, FindingCategory::Quality);
        assert_eq!(
            findings[0].location,
            Some(Location::lines("parser.rs", 10, 14))
        );
        assert_eq!(findings[1].category, FindingCategory::Security);
    }

    #[test]
    fn test_category_then_severity_brackets() {
        let findings = extract_text("[performance][high] N+1 queries in list endpoint");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, FindingCategory::Performance);
        assert_eq!(findings[0].severity, Severity::Critical);
    }

    #[test]
    fn test_json_findings_and_scores() {
        let text = r#"Here is my review:
```json
{
  "findings": [
    {"category": "security", "severity": "critical", "description": "SQL injection", "file": "src/db.rs", "line": 42},
    {"severity": "low", "message": "Consider a cache for the compiled regex"},
    {"severity": "high"}
  ],
  "scores": {"security": 3, "quality": "8/10", "nonsense": 4}
}
```"#;
        let result = InvocationResult::completed("m", text, Duration::ZERO, 0);
        let assessment = assess(&result).unwrap();
        assert_eq!(assessment.findings.len(), 2);
        assert_eq!(
            assessment.findings[0].location,
            Some(Location::lines("src/db.rs", 42, 42))
        );
        assert_eq!(assessment.findings[1].category, FindingCategory::Performance);
        assert_eq!(assessment.category_scores[&FindingCategory::Security], 3.0);
        assert_eq!(assessment.category_scores[&FindingCategory::Quality], 8.0);
        assert_eq!(assessment.category_scores.len(), 2);
    }

    #[test]
    fn test_inline_json_with_braces_in_strings() {
        let text = r#"Result: {"findings": [{"description": "format string uses {} without args", "severity": "warning"}]} done"#;
        let findings = extract_text(text);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warning);
    }

    #[test]
    fn test_score_lines() {
        let text = "Security: 7/10\nPerformance score: 9.5 / 10\n- [info] minor naming nit";
        let result = InvocationResult::completed("m", text, Duration::ZERO, 0);
        let assessment = assess(&result).unwrap();
        assert_eq!(assessment.category_scores[&FindingCategory::Security], 7.0);
        assert_eq!(assessment.category_scores[&FindingCategory::Performance], 9.5);
        assert_eq!(assessment.findings.len(), 1);
    }

    #[test]
    fn test_unstructured_text_falls_back_to_single_finding() {
        let text = "  I think the approach is reasonable overall.  ";
        let findings = extract_text(text);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, FindingCategory::Other);
        assert_eq!(findings[0].severity, Severity::Info);
        assert_eq!(findings[0].description, text.trim());
    }

    #[test]
    fn test_unrelated_json_falls_through() {
        let text = "The config should be {\"retries\": 3}.\nWarning: retries are unbounded elsewhere";
        let findings = extract_text(text);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warning);
    }

    #[test]
    fn test_non_category_header_resets_section() {
        let text = "## Security\n- [warning] weak hash\n## Summary\n- [info] rename helper function";
        let findings = extract_text(text);
        assert_eq!(findings[0].category, FindingCategory::Security);
        assert_eq!(findings[1].category, FindingCategory::Other);
    }

    #[test]
    fn test_failed_result_yields_nothing() {
        let failure = InvocationFailure::new(FailureKind::AuthError, "m", "401");
        let result = InvocationResult::failed(failure, Duration::ZERO, 0);
        assert!(extract(&result).is_empty());
        assert!(assess(&result).is_none());
    }
}
