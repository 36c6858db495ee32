//! Turning recognised text into a candidate field map.
//!
//! Structurers never fail: empty or garbled text yields a map with the
//! fields it could not find left out.

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::openrouter::{Message, OpenRouterClient};
use crate::schema::{fields, RawFieldMap};

/// Characters of recognised text sent to the LLM.
const MAX_LLM_CHARS: usize = 20_000;

/// Longest line still considered as a title or institution.
const MAX_FIELD_LINE: usize = 120;

#[async_trait::async_trait]
pub trait FieldStructurer: Send + Sync {
    /// Extract candidate fields. `hints` come from the type classifier.
    async fn structure_text(&self, raw_text: &str, hints: &[String]) -> RawFieldMap;
}

// ============================================================================
// Regex structurer
// ============================================================================

const DATE_EXPR: &str = r"(\d{1,2}/\d{1,2}/\d{4}|\d{4}-\d{1,2}-\d{1,2}|\d{1,2}-\d{1,2}-\d{4}|(?i:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-zA-Z]*\.?\s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{4})";

/// Heuristic line and phrase matching, biased by classifier hints.
pub struct RegexStructurer {
    recipient: Option<Regex>,
    labelled_date: Option<Regex>,
    any_date: Option<Regex>,
    identifier: Option<Regex>,
    gpa: Option<Regex>,
    institution_line: Option<Regex>,
    degree_title: Option<Regex>,
    event_title: Option<Regex>,
    generic_title: Option<Regex>,
}

impl Default for RegexStructurer {
    fn default() -> Self {
        Self::new()
    }
}

impl RegexStructurer {
    pub fn new() -> Self {
        Self {
            recipient: compile(
                r"(?i:this is to certify that|certifies that|awarded to|presented to|conferred upon|granted to|issued to|student name\s*:|name\s*:)\s*(?:(?i:mr|ms|mrs|dr)\.?\s+)?([A-Z][A-Za-z.'\-]*(?:[ \t]+[A-Z][A-Za-z.'\-]*){0,4})",
            ),
            labelled_date: compile(&format!(
                r"(?i:date(?:\s+of\s+issue)?|issued(?:\s+on)?|dated|awarded\s+on)\s*[:\-]?\s*{}",
                DATE_EXPR
            )),
            any_date: compile(DATE_EXPR),
            identifier: compile(
                r"(?:\b(?i:id|no|number)\b\.?|#)\s*[:#]?\s*([A-Za-z0-9][A-Za-z0-9\-/]{3,})",
            ),
            gpa: compile(r"(?i)\bc?gpa\s*[:\-]?\s*(\d+(?:\.\d+)?)"),
            institution_line: compile(
                r"(?i)\b(?:university|college|institute|academy|school|polytechnic|organi[sz]ation|company|corporation|foundation|society|council|ltd|inc)\b",
            ),
            degree_title: compile(r"(?i)\b(?:bachelor|master|doctor|diploma|associate)\b"),
            event_title: compile(r"(?i)\b(?:workshop|conference|symposium|internship|award|licen[cs]e)\b"),
            generic_title: compile(r"(?i)\b(?:certificate|diploma|transcript|award|licen[cs]e)\b"),
        }
    }

    /// Synchronous core, usable without a runtime.
    pub fn extract(&self, raw_text: &str, hints: &[String]) -> RawFieldMap {
        let mut out = RawFieldMap::new();
        let lines: Vec<&str> = raw_text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        if let Some(name) = first_capture(self.recipient.as_ref(), raw_text) {
            out.insert(fields::RECIPIENT.to_string(), name);
        }

        let title = self
            .title_patterns(hints)
            .into_iter()
            .find_map(|re| find_line(&lines, re, None));
        if let Some(title) = title {
            out.insert(fields::TITLE.to_string(), title.to_string());
        }

        let title_line = out.get(fields::TITLE).map(String::as_str);
        if let Some(line) = self
            .institution_line
            .as_ref()
            .and_then(|re| find_line(&lines, re, title_line))
        {
            out.insert(fields::INSTITUTION.to_string(), line.to_string());
        }

        let date = first_capture(self.labelled_date.as_ref(), raw_text)
            .or_else(|| first_capture(self.any_date.as_ref(), raw_text));
        if let Some(date) = date {
            out.insert(fields::DATE_ISSUED.to_string(), date);
        }

        if let Some(id) = self.identifier.as_ref().and_then(|re| {
            re.captures_iter(raw_text)
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str())
                .find(|v| v.chars().any(|c| c.is_ascii_digit()))
        }) {
            out.insert(fields::CERTIFICATE_ID.to_string(), id.to_string());
        }

        if let Some(gpa) = first_capture(self.gpa.as_ref(), raw_text) {
            out.insert(fields::GPA.to_string(), gpa);
        }

        debug!("RegexStructurer: found {} fields in {} lines", out.len(), lines.len());
        out
    }

    /// Title vocabularies in the order the hints suggest.
    fn title_patterns(&self, hints: &[String]) -> Vec<&Regex> {
        let mentions = |word: &str| hints.iter().any(|h| h.to_lowercase().contains(word));
        let ordered = if mentions("degree") {
            [&self.degree_title, &self.generic_title, &self.event_title]
        } else if mentions("workshop")
            || mentions("conference")
            || mentions("internship")
            || mentions("award")
            || mentions("licence")
        {
            [&self.event_title, &self.generic_title, &self.degree_title]
        } else {
            [&self.generic_title, &self.degree_title, &self.event_title]
        };
        ordered.into_iter().filter_map(Option::as_ref).collect()
    }
}

#[async_trait::async_trait]
impl FieldStructurer for RegexStructurer {
    async fn structure_text(&self, raw_text: &str, hints: &[String]) -> RawFieldMap {
        self.extract(raw_text, hints)
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Skipping invalid structurer pattern '{}': {}", pattern, e);
            None
        }
    }
}

fn first_capture(regex: Option<&Regex>, text: &str) -> Option<String> {
    regex?
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|v| !v.is_empty())
}

fn find_line<'a>(lines: &[&'a str], regex: &Regex, skip: Option<&str>) -> Option<&'a str> {
    lines
        .iter()
        .copied()
        .filter(|l| l.len() <= MAX_FIELD_LINE && Some(*l) != skip)
        .find(|l| regex.is_match(l))
}

// ============================================================================
// LLM structurer
// ============================================================================

/// Structures text with an LLM, falling back to [`RegexStructurer`] on any failure.
pub struct LlmStructurer {
    client: OpenRouterClient,
    fallback: RegexStructurer,
}

#[derive(Debug, Deserialize)]
struct LlmFields {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    institution: Option<String>,
    #[serde(default)]
    recipient: Option<String>,
    #[serde(default)]
    date_issued: Option<String>,
    #[serde(default)]
    certificate_id: Option<String>,
    #[serde(default)]
    gpa: Option<String>,
}

impl LlmFields {
    fn into_map(self) -> RawFieldMap {
        [
            (fields::TITLE, self.title),
            (fields::INSTITUTION, self.institution),
            (fields::RECIPIENT, self.recipient),
            (fields::DATE_ISSUED, self.date_issued),
            (fields::CERTIFICATE_ID, self.certificate_id),
            (fields::GPA, self.gpa),
        ]
        .into_iter()
        .filter_map(|(k, v)| {
            v.map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(|v| (k.to_string(), v))
        })
        .collect()
    }
}

impl LlmStructurer {
    pub fn new(client: OpenRouterClient) -> Self {
        Self {
            client,
            fallback: RegexStructurer::new(),
        }
    }

    fn schema() -> serde_json::Value {
        let field = serde_json::json!({ "type": ["string", "null"] });
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": field,
                "institution": field,
                "recipient": field,
                "date_issued": field,
                "certificate_id": field,
                "gpa": field,
            },
            "required": ["title", "institution", "recipient", "date_issued", "certificate_id", "gpa"],
            "additionalProperties": false
        })
    }
}

#[async_trait::async_trait]
impl FieldStructurer for LlmStructurer {
    async fn structure_text(&self, raw_text: &str, hints: &[String]) -> RawFieldMap {
        if raw_text.trim().is_empty() {
            return RawFieldMap::new();
        }

        let system = format!(
            "You extract fields from OCR text of credentials (certificates, diplomas, transcripts, \
             licences). Copy values exactly as written; use null for anything not present. \
             Never invent values.\n\nGuidance for this document:\n- {}",
            hints.join("\n- ")
        );
        let messages = vec![
            Message::system(system),
            Message::user(truncate_for_context(raw_text, MAX_LLM_CHARS)),
        ];

        match self
            .client
            .chat_json::<LlmFields>(messages, "credential_fields", Self::schema())
            .await
        {
            Ok(extracted) => {
                let map = extracted.into_map();
                debug!("LlmStructurer: extracted {} fields", map.len());
                map
            }
            Err(e) => {
                warn!("LLM structuring failed, using regex structurer: {:#}", e);
                self.fallback.extract(raw_text, hints)
            }
        }
    }
}

fn truncate_for_context(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        text
    } else {
        let mut end = max_chars;
        while !text.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        &text[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIPLOMA: &str = "STATE UNIVERSITY\n\
        Bachelor of Science in Computer Science\n\
        This is to certify that\n\
        Jane Doe\n\
        has fulfilled all requirements.\n\
        Date of issue: May 20, 2023\n\
        Certificate No: SU-2023-0042";

    #[tokio::test]
    async fn test_structures_diploma() {
        let structurer = RegexStructurer::new();
        let hints = vec!["Use the full degree name as the title".to_string()];
        let map = structurer.structure_text(DIPLOMA, &hints).await;

        assert_eq!(map.get("recipient").map(String::as_str), Some("Jane Doe"));
        assert_eq!(
            map.get("title").map(String::as_str),
            Some("Bachelor of Science in Computer Science")
        );
        assert_eq!(map.get("institution").map(String::as_str), Some("STATE UNIVERSITY"));
        assert_eq!(map.get("date_issued").map(String::as_str), Some("May 20, 2023"));
        assert_eq!(map.get("certificate_id").map(String::as_str), Some("SU-2023-0042"));
    }

    #[test]
    fn test_empty_text_gives_empty_map() {
        let map = RegexStructurer::new().extract("", &[]);
        assert!(map.is_empty());
    }

    #[test]
    fn test_garbled_text_does_not_panic() {
        let map = RegexStructurer::new().extract("@@## ~~ 0x00 ÿÿÿ \n\n\t  ", &[]);
        assert!(!map.contains_key("recipient"));
    }

    #[test]
    fn test_recipient_stops_at_lowercase() {
        let map = RegexStructurer::new()
            .extract("Certificate of Completion\nawarded to John Smith for completing", &[]);
        assert_eq!(map.get("recipient").map(String::as_str), Some("John Smith"));
        assert_eq!(map.get("title").map(String::as_str), Some("Certificate of Completion"));
    }

    #[test]
    fn test_gpa_and_numeric_date() {
        let map = RegexStructurer::new().extract("Official Transcript\nCGPA: 3.72\n06/30/2022", &[]);
        assert_eq!(map.get("gpa").map(String::as_str), Some("3.72"));
        assert_eq!(map.get("date_issued").map(String::as_str), Some("06/30/2022"));
    }

    #[test]
    fn test_llm_fields_into_map_drops_blanks() {
        let fields = LlmFields {
            title: Some(" Diploma ".to_string()),
            institution: Some("  ".to_string()),
            recipient: None,
            date_issued: None,
            certificate_id: None,
            gpa: None,
        };
        let map = fields.into_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("title").map(String::as_str), Some("Diploma"));
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        assert_eq!(truncate_for_context("héllo", 2), "h");
        assert_eq!(truncate_for_context("abc", 10), "abc");
    }
}
