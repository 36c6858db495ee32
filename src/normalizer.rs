//! Field normalization with multiplicative confidence.
//!
//! Each logical field is looked up under several input aliases, canonicalised
//! by its own rule, and given a local confidence. Fields missing from the
//! input contribute nothing, so an empty map scores 1.0.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use crate::config::{Alias, NormalizerConfig};
use crate::schema::{NormalizedFields, RawFieldMap};

/// Confidence given to values returned verbatim because they did not parse.
const UNPARSED_CONFIDENCE: f64 = 0.3;

const NAME_KEYS: &[&str] = &["name", "studentName", "student_name", "recipient", "recipientName"];
const INSTITUTION_KEYS: &[&str] = &["institution", "university", "school", "issuer", "organization"];
const DEGREE_KEYS: &[&str] = &["degree", "program", "programme", "title", "course"];
const DATE_KEYS: &[&str] = &[
    "date",
    "dateIssued",
    "date_issued",
    "issueDate",
    "issue_date",
    "graduationDate",
];
const GPA_KEYS: &[&str] = &["gpa", "cgpa", "GPA", "grade"];
const ID_KEYS: &[&str] = &[
    "idNumber",
    "id_number",
    "id",
    "studentId",
    "student_id",
    "certificateId",
    "certificate_id",
];

const MONTHS: [&str; 12] = [
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

/// A canonical value and the confidence its rule assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    pub value: String,
    pub confidence: f64,
}

impl FieldValue {
    fn new(value: impl Into<String>, confidence: f64) -> Self {
        Self {
            value: value.into(),
            confidence,
        }
    }
}

/// Stateless normalizer over configurable alias tables.
#[derive(Debug, Clone, Default)]
pub struct FieldNormalizer {
    config: NormalizerConfig,
}

impl FieldNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn normalize(&self, fields: &RawFieldMap) -> NormalizedFields {
        let mut out = NormalizedFields {
            name: None,
            institution: None,
            degree: None,
            date: None,
            gpa: None,
            id_number: None,
            confidence: 1.0,
            original_values: fields.clone(),
            normalized_values: Default::default(),
        };

        let mut confidence = 1.0;
        let mut apply = |key: &str, value: Option<FieldValue>| -> Option<String> {
            let v = value?;
            confidence *= v.confidence;
            out.normalized_values.insert(key.to_string(), v.value.clone());
            Some(v.value)
        };

        let name = apply("name", lookup(fields, NAME_KEYS).map(normalize_name));
        let institution = apply(
            "institution",
            lookup(fields, INSTITUTION_KEYS).map(|v| self.normalize_institution(v)),
        );
        let degree = apply(
            "degree",
            lookup(fields, DEGREE_KEYS).map(|v| self.normalize_degree(v)),
        );
        let date = apply("date", lookup(fields, DATE_KEYS).map(normalize_date));
        let gpa = apply("gpa", lookup(fields, GPA_KEYS).map(normalize_gpa));
        let id_number = apply("idNumber", lookup(fields, ID_KEYS).map(normalize_id));

        out.name = name;
        out.institution = institution;
        out.degree = degree;
        out.date = date;
        out.gpa = gpa;
        out.id_number = id_number;
        out.confidence = round2(confidence);

        debug!(
            "Normalized {} of {} input fields (confidence {:.2})",
            out.normalized_values.len(),
            fields.len(),
            out.confidence
        );
        out
    }

    pub fn normalize_institution(&self, raw: &str) -> FieldValue {
        let cleaned = collapse_whitespace(raw);
        match match_alias(&self.config.institution_aliases, &cleaned) {
            Some(canonical) => FieldValue::new(canonical, 0.9),
            None => FieldValue::new(title_case(&cleaned), 0.7),
        }
    }

    pub fn normalize_degree(&self, raw: &str) -> FieldValue {
        let cleaned = collapse_whitespace(raw);
        match match_alias(&self.config.degree_aliases, &cleaned) {
            Some(canonical) => FieldValue::new(canonical, 0.9),
            None => FieldValue::new(title_case(&cleaned), 0.6),
        }
    }
}

/// First non-blank value under any of the aliases, in alias order.
fn lookup<'a>(fields: &'a RawFieldMap, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| fields.get(*k))
        .map(String::as_str)
        .find(|v| !v.trim().is_empty())
}

fn match_alias<'a>(aliases: &'a [Alias], value: &str) -> Option<&'a str> {
    let lowered = value.to_lowercase();
    aliases
        .iter()
        .find(|a| lowered.contains(&a.alias.to_lowercase()))
        .map(|a| a.canonical.as_str())
}

pub fn normalize_name(raw: &str) -> FieldValue {
    let cleaned = collapse_whitespace(raw);
    if let Some((last, first)) = cleaned.split_once(',') {
        let inverted = format!("{} {}", first.trim(), last.trim());
        return FieldValue::new(inverted.trim(), 0.9);
    }
    if cleaned.split(' ').count() >= 2 {
        return FieldValue::new(title_case(&cleaned), 0.8);
    }
    FieldValue::new(cleaned, 0.6)
}

pub fn normalize_date(raw: &str) -> FieldValue {
    let trimmed = raw.trim();
    for pattern in date_patterns() {
        for caps in pattern.regex.captures_iter(trimmed) {
            let parsed = match pattern.order {
                DateOrder::MonthDayYear => ymd(&caps[3], &caps[1], &caps[2]),
                DateOrder::YearMonthDay => ymd(&caps[1], &caps[2], &caps[3]),
                DateOrder::MonthNameDayYear => month_number(&caps[1])
                    .and_then(|m| ymd(&caps[3], &m.to_string(), &caps[2])),
            };
            if let Some(date) = parsed {
                return FieldValue::new(date.format("%Y-%m-%d").to_string(), 0.9);
            }
        }
    }
    FieldValue::new(trimmed, UNPARSED_CONFIDENCE)
}

pub fn normalize_gpa(raw: &str) -> FieldValue {
    let trimmed = raw.trim();
    let value = number_regex()
        .and_then(|re| re.find(trimmed))
        .and_then(|m| m.as_str().parse::<f64>().ok());

    match value {
        Some(v) if (0.0..=4.0).contains(&v) => FieldValue::new(format!("{:.2}", v), 0.9),
        Some(v) if (0.0..=100.0).contains(&v) => {
            FieldValue::new(format!("{:.2}", v / 100.0 * 4.0), 0.8)
        }
        _ => FieldValue::new(trimmed, UNPARSED_CONFIDENCE),
    }
}

pub fn normalize_id(raw: &str) -> FieldValue {
    let mut value = raw.trim().to_uppercase();
    if let Some((leading, trailing)) = id_label_patterns() {
        loop {
            let head = leading.replace(&value, "");
            let tail = trailing.replace(&head, "");
            let stripped = tail.trim().to_string();
            if stripped == value {
                break;
            }
            value = stripped;
        }
    }

    let value: String = value
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '-')
        .collect();
    FieldValue::new(value, 0.8)
}

/// Label prefix and suffix matchers. Word-bounded, so `STU2024-001` keeps its prefix.
fn id_label_patterns() -> Option<&'static (Regex, Regex)> {
    static LABELS: OnceLock<Option<(Regex, Regex)>> = OnceLock::new();
    LABELS
        .get_or_init(|| {
            let leading = Regex::new(r"^(?:(?:STUDENT|STU|ID|NUMBER|NO)\b\.?|#)[\s:#.]*").ok()?;
            let trailing =
                Regex::new(r"[\s:#.]*(?:\b(?:STUDENT|STU|ID|NUMBER|NO)\.?|#)$").ok()?;
            Some((leading, trailing))
        })
        .as_ref()
}

#[derive(Debug, Clone, Copy)]
enum DateOrder {
    /// Slash or dash separated, month assumed first.
    MonthDayYear,
    YearMonthDay,
    MonthNameDayYear,
}

struct DatePattern {
    regex: Regex,
    order: DateOrder,
}

fn date_patterns() -> &'static [DatePattern] {
    static PATTERNS: OnceLock<Vec<DatePattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b", DateOrder::MonthDayYear),
            (r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b", DateOrder::YearMonthDay),
            (r"\b(\d{1,2})-(\d{1,2})-(\d{4})\b", DateOrder::MonthDayYear),
            (r"\b([A-Za-z]+)\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b", DateOrder::MonthNameDayYear),
        ]
        .into_iter()
        .filter_map(|(p, order)| Regex::new(p).ok().map(|regex| DatePattern { regex, order }))
        .collect()
    })
}

fn number_regex() -> Option<&'static Regex> {
    static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();
    NUMBER
        .get_or_init(|| Regex::new(r"\d*\.?\d+").ok())
        .as_ref()
}

/// Full English month names, or their three-letter prefix.
fn month_number(token: &str) -> Option<u32> {
    let lowered = token.to_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == lowered || (lowered.len() == 3 && m.starts_with(&lowered)))
        .map(|i| i as u32 + 1)
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> RawFieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn normalizer() -> FieldNormalizer {
        FieldNormalizer::default()
    }

    #[test]
    fn test_empty_input_is_neutral() {
        let result = normalizer().normalize(&RawFieldMap::new());
        assert_eq!(result.confidence, 1.0);
        assert!(result.normalized_values.is_empty());
        assert!(result.original_values.is_empty());
    }

    #[test]
    fn test_date_month_first() {
        let result = normalizer().normalize(&fields(&[("date", "03/15/2024")]));
        assert_eq!(result.normalized_values.get("date").unwrap(), "2024-03-15");
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn test_date_formats() {
        assert_eq!(normalize_date("2024-03-15").value, "2024-03-15");
        assert_eq!(normalize_date("12-25-2023").value, "2023-12-25");
        assert_eq!(normalize_date("March 5, 2021").value, "2021-03-05");
        assert_eq!(normalize_date("DECEMBER 31 2020").value, "2020-12-31");
        assert_eq!(normalize_date("Issued on Sep 1, 2022").value, "2022-09-01");
    }

    #[test]
    fn test_date_skips_unparseable_match_of_same_pattern() {
        let value = normalize_date("Semester 2 2023, awarded June 5, 2023");
        assert_eq!(value.value, "2023-06-05");
        assert_eq!(value.confidence, 0.9);

        let value = normalize_date("13/45/2020 then 02/29/2024");
        assert_eq!(value.value, "2024-02-29");
    }

    #[test]
    fn test_unparseable_date_kept_verbatim() {
        let value = normalize_date("  sometime in spring  ");
        assert_eq!(value.value, "sometime in spring");
        assert_eq!(value.confidence, UNPARSED_CONFIDENCE);

        // Month-first assumption makes 13 an invalid month.
        let value = normalize_date("13/05/2024");
        assert_eq!(value.value, "13/05/2024");
        assert_eq!(value.confidence, UNPARSED_CONFIDENCE);

        assert_eq!(normalize_date("February 30, 2023").confidence, UNPARSED_CONFIDENCE);
    }

    #[test]
    fn test_gpa_scales() {
        let result = normalizer().normalize(&fields(&[("gpa", "85")]));
        assert_eq!(result.normalized_values.get("gpa").unwrap(), "3.40");
        assert_eq!(result.confidence, 0.8);

        let result = normalizer().normalize(&fields(&[("gpa", "3.7")]));
        assert_eq!(result.normalized_values.get("gpa").unwrap(), "3.70");
        assert_eq!(result.confidence, 0.9);

        assert_eq!(normalize_gpa("GPA: 3.25 / 4.0").value, "3.25");
        let value = normalize_gpa(".5");
        assert_eq!(value.value, "0.50");
        assert_eq!(value.confidence, 0.9);
        let value = normalize_gpa("450");
        assert_eq!(value.value, "450");
        assert_eq!(value.confidence, UNPARSED_CONFIDENCE);
        assert_eq!(normalize_gpa("excellent").confidence, UNPARSED_CONFIDENCE);
    }

    #[test]
    fn test_name_rules() {
        let result = normalizer().normalize(&fields(&[("name", "Doe, Jane")]));
        assert_eq!(result.normalized_values.get("name").unwrap(), "Jane Doe");
        assert_eq!(result.confidence, 0.9);

        let value = normalize_name("  jOHN   smith ");
        assert_eq!(value.value, "John Smith");
        assert_eq!(value.confidence, 0.8);

        let value = normalize_name("Cher");
        assert_eq!(value.value, "Cher");
        assert_eq!(value.confidence, 0.6);
    }

    #[test]
    fn test_name_aliases() {
        let result = normalizer().normalize(&fields(&[("studentName", "ada lovelace")]));
        assert_eq!(result.name.as_deref(), Some("Ada Lovelace"));

        let result = normalizer().normalize(&fields(&[("recipient", "Alan Turing")]));
        assert_eq!(result.name.as_deref(), Some("Alan Turing"));
    }

    #[test]
    fn test_institution_and_degree() {
        let n = normalizer();
        let value = n.normalize_institution("STANFORD univ.");
        assert_eq!(value.value, "Stanford University");
        assert_eq!(value.confidence, 0.9);

        let value = n.normalize_institution("riverside  community college");
        assert_eq!(value.value, "Riverside Community College");
        assert_eq!(value.confidence, 0.7);

        let value = n.normalize_degree("BSc Computer Science");
        assert_eq!(value.value, "Bachelor of Science");
        assert_eq!(value.confidence, 0.9);

        let value = n.normalize_degree("certificate in welding");
        assert_eq!(value.value, "Certificate In Welding");
        assert_eq!(value.confidence, 0.6);
    }

    #[test]
    fn test_id_number() {
        assert_eq!(normalize_id("Student ID No. 12345").value, "12345");
        assert_eq!(normalize_id("id: ab-12 cd").value, "AB-12CD");
        assert_eq!(normalize_id("# A-77/x").value, "A-77X");
        assert_eq!(normalize_id("STU2024-001").value, "STU2024-001");
        assert_eq!(normalize_id("X99 NUMBER").value, "X99");
        assert_eq!(normalize_id("x").confidence, 0.8);
    }

    #[test]
    fn test_id_labels_glued_to_value() {
        assert_eq!(normalize_id("ID#12345").value, "12345");
        assert_eq!(normalize_id("Student No.12345").value, "12345");
        assert_eq!(normalize_id("no:A-9 #").value, "A-9");
        assert_eq!(normalize_id("STU2024-001 ID").value, "STU2024-001");
    }

    #[test]
    fn test_confidence_is_product() {
        // 0.9 (inverted name) * 0.8 (rescaled gpa)
        let result = normalizer().normalize(&fields(&[("name", "Doe, Jane"), ("gpa", "85")]));
        assert_eq!(result.confidence, 0.72);
        assert_eq!(result.normalized_values.len(), 2);
    }

    #[test]
    fn test_originals_kept_and_unknown_keys_ignored() {
        let input = fields(&[("name", " Doe, Jane "), ("favouriteColour", "blue")]);
        let result = normalizer().normalize(&input);
        assert_eq!(result.original_values, input);
        assert_eq!(result.normalized_values.len(), 1);
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn test_blank_values_are_absent() {
        let result = normalizer().normalize(&fields(&[("gpa", "   "), ("date", "")]));
        assert!(result.normalized_values.is_empty());
        assert_eq!(result.confidence, 1.0);
        assert!(result.gpa.is_none());
    }
}
