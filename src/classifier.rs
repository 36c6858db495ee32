//! Credential type classification from recognised text.
//!
//! Pure functions, no async. Scores a fixed table of candidate types by
//! keyword and pattern evidence; when nothing scores well enough, falls back
//! to a coarse inference from institution vocabulary.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::schema::{DocumentType, DocumentTypeInfo};

const KEYWORD_WEIGHT: f64 = 0.1;
const PATTERN_WEIGHT: f64 = 0.15;
/// Winning scores below this are discarded in favour of inference.
const MIN_TABLE_CONFIDENCE: f64 = 0.3;
const UNKNOWN_CONFIDENCE: f64 = 0.1;

struct CandidateSpec {
    doc_type: DocumentType,
    keywords: &'static [&'static str],
    patterns: &'static [&'static str],
    boost: f64,
    hints: &'static [&'static str],
}

struct Candidate {
    doc_type: DocumentType,
    keywords: &'static [&'static str],
    patterns: Vec<(&'static str, Regex)>,
    boost: f64,
    hints: &'static [&'static str],
}

// Declaration order breaks ties: earlier entries win.
const CANDIDATES: &[CandidateSpec] = &[
    CandidateSpec {
        doc_type: DocumentType::Transcript,
        keywords: &[
            "transcript", "academic record", "grade", "gpa", "semester", "credit", "course code",
            "marks",
        ],
        patterns: &[
            r"\bc?gpa\s*[:\-]?\s*\d(?:\.\d+)?",
            r"\bsemester\s+(?:[ivx]+|\d+)\b",
            r"\bcredits?\s*(?:hours?|earned)?\s*[:\-]?\s*\d+",
            r"\b(?:official|academic)\s+transcript\b",
        ],
        boost: 0.1,
        hints: &[
            "Extract the student's full name as the recipient",
            "Extract the cumulative GPA or CGPA if present",
            "Use the issuing university or college as the institution",
            "Use the programme or degree name as the title",
            "Use the date of issue as the date",
        ],
    },
    CandidateSpec {
        doc_type: DocumentType::Diploma,
        keywords: &["diploma", "degree", "bachelor", "master", "doctor", "conferred", "graduate"],
        patterns: &[
            r"\b(?:bachelor|master|doctor)\s+of\s+\w+",
            r"\b(?:b\.?sc|m\.?sc|b\.?tech|m\.?tech|mba|ph\.?d)\b",
            r"\bconferred\s+(?:upon|on)\b",
            r"\bdegree\s+of\b",
        ],
        boost: 0.1,
        hints: &[
            "Use the full degree name (e.g. Bachelor of Science in ...) as the title",
            "Extract the graduate's full name as the recipient",
            "Use the conferring university as the institution",
            "Use the conferral or graduation date as the date",
        ],
    },
    CandidateSpec {
        doc_type: DocumentType::WorkshopCertificate,
        keywords: &["workshop", "certificate", "hands-on", "training", "session", "participated"],
        patterns: &[
            r"\bcertificate\s+of\s+participation\b",
            r"\b(?:attended|participated\s+in)\s+(?:a|the)?\s*\w*\s*workshop\b",
            r"\bworkshop\s+on\b",
        ],
        boost: 0.05,
        hints: &[
            "Use the workshop name or topic as the title",
            "Use the organising body as the institution",
            "Use the workshop date or end date as the date",
        ],
    },
    CandidateSpec {
        doc_type: DocumentType::InternshipCertificate,
        keywords: &["internship", "certificate", "interned", "company", "supervisor", "duration"],
        patterns: &[
            r"\binternship\s+(?:program|programme|period)\b",
            r"\bworked\s+as\s+an?\s+\w*\s*intern\b",
            r"\bfrom\s+\S+.{0,30}\s+to\s+\S+",
        ],
        boost: 0.05,
        hints: &[
            "Use the internship role or programme as the title",
            "Use the host company or organisation as the institution",
            "Use the internship end date or date of issue as the date",
        ],
    },
    CandidateSpec {
        doc_type: DocumentType::ConferenceCertificate,
        keywords: &["conference", "certificate", "symposium", "presented", "proceedings", "summit"],
        patterns: &[
            r"\b(?:international|national)\s+conference\b",
            r"\bpresented\s+(?:a\s+)?paper\b",
            r"\bsymposium\s+on\b",
        ],
        boost: 0.05,
        hints: &[
            "Use the conference name as the title",
            "Use the organising society or university as the institution",
            "Use the conference date as the date",
        ],
    },
    CandidateSpec {
        doc_type: DocumentType::ResearchCertificate,
        keywords: &["research", "certificate", "publication", "journal", "investigator", "laboratory"],
        patterns: &[
            r"\bresearch\s+(?:project|work|fellowship|internship)\b",
            r"\bpublished\s+in\b",
            r"\bprincipal\s+investigator\b",
        ],
        boost: 0.05,
        hints: &[
            "Use the research project or fellowship name as the title",
            "Use the host laboratory or university as the institution",
        ],
    },
    CandidateSpec {
        doc_type: DocumentType::VolunteerCertificate,
        keywords: &["volunteer", "certificate", "community", "service", "ngo", "social"],
        patterns: &[
            r"\bvolunteer(?:ed|ing)?\s+(?:service|work|hours)\b",
            r"\b\d+\s+hours\s+of\s+(?:community\s+)?service\b",
            r"\bcommunity\s+service\b",
        ],
        boost: 0.05,
        hints: &[
            "Use the volunteering programme or cause as the title",
            "Use the NGO or organising body as the institution",
        ],
    },
    CandidateSpec {
        doc_type: DocumentType::Award,
        keywords: &["award", "honor", "honour", "excellence", "winner", "merit", "prize"],
        patterns: &[
            r"\b(?:award|certificate)\s+of\s+(?:excellence|merit|achievement|recognition)\b",
            r"\b(?:first|second|third|1st|2nd|3rd)\s+(?:place|prize|position)\b",
            r"\bin\s+recognition\s+of\b",
        ],
        boost: 0.05,
        hints: &[
            "Use the award name as the title",
            "Use the awarding body as the institution",
            "Use the date the award was presented as the date",
        ],
    },
    CandidateSpec {
        doc_type: DocumentType::License,
        keywords: &["license", "licence", "licensed", "registration", "authorized", "expires"],
        patterns: &[
            r"\blicen[cs]e\s+(?:no|number|#)",
            r"\b(?:valid\s+until|expir(?:es|y)\s+date)\b",
            r"\bis\s+hereby\s+licen[cs]ed\b",
        ],
        boost: 0.05,
        hints: &[
            "Use the licence class or profession as the title",
            "Use the licensing authority as the institution",
            "Use the licence number as the certificate ID",
            "Use the date of issue, not the expiry date, as the date",
        ],
    },
    CandidateSpec {
        doc_type: DocumentType::Certificate,
        keywords: &["certificate", "certify", "certified", "completion", "course"],
        patterns: &[
            r"\bthis\s+is\s+to\s+certify\b",
            r"\bcertificate\s+of\s+(?:completion|achievement)\b",
            r"\bhas\s+successfully\s+completed\b",
        ],
        boost: 0.0,
        hints: &[
            "Use the course or programme name as the title",
            "Extract the recipient's full name",
            "Use the issuing organisation as the institution",
        ],
    },
];

const ACADEMIC_TERMS: &[&str] = &["university", "college", "institute"];
const GRADE_TERMS: &[&str] = &["grade", "gpa", "semester", "credit", "marks", "course"];
const DEGREE_TERMS: &[&str] = &["degree", "bachelor", "master", "doctor", "diploma"];
const ORGANIZATION_TERMS: &[&str] = &["company", "organization", "organisation"];

fn candidates() -> &'static [Candidate] {
    static TABLE: OnceLock<Vec<Candidate>> = OnceLock::new();
    TABLE.get_or_init(|| {
        CANDIDATES
            .iter()
            .map(|spec| Candidate {
                doc_type: spec.doc_type,
                keywords: spec.keywords,
                patterns: spec
                    .patterns
                    .iter()
                    .filter_map(|p| match Regex::new(&format!("(?i){}", p)) {
                        Ok(re) => Some((*p, re)),
                        Err(e) => {
                            warn!("Skipping invalid {} pattern '{}': {}", spec.doc_type, p, e);
                            None
                        }
                    })
                    .collect(),
                boost: spec.boost,
                hints: spec.hints,
            })
            .collect()
    })
}

/// Classify recognised text into exactly one credential type.
pub fn classify(text: &str) -> DocumentTypeInfo {
    let lowered = text.to_lowercase();

    let mut best: Option<DocumentTypeInfo> = None;
    for candidate in candidates() {
        let scored = score_candidate(candidate, &lowered);
        // Strict comparison keeps the first-declared candidate on ties.
        if best.as_ref().map_or(true, |b| scored.confidence > b.confidence) {
            best = Some(scored);
        }
    }

    match best {
        Some(mut info) if info.confidence >= MIN_TABLE_CONFIDENCE => {
            info.confidence = info.confidence.min(1.0);
            debug!(
                "Classified as {} (confidence {:.2}, {} signals)",
                info.doc_type,
                info.confidence,
                info.characteristics.len()
            );
            info
        }
        _ => {
            let info = infer_type(&lowered);
            debug!(
                "Low table confidence, inferred {} (confidence {:.2})",
                info.doc_type, info.confidence
            );
            info
        }
    }
}

fn score_candidate(candidate: &Candidate, lowered: &str) -> DocumentTypeInfo {
    let mut characteristics = Vec::new();

    let mut keyword_hits = 0usize;
    for keyword in candidate.keywords {
        if lowered.contains(keyword) {
            keyword_hits += 1;
            characteristics.push(format!("keyword: {}", keyword));
        }
    }

    let mut pattern_hits = 0usize;
    for (source, regex) in &candidate.patterns {
        if regex.is_match(lowered) {
            pattern_hits += 1;
            characteristics.push(format!("pattern: {}", source));
        }
    }

    let confidence = KEYWORD_WEIGHT * keyword_hits as f64
        + PATTERN_WEIGHT * pattern_hits as f64
        + candidate.boost;

    DocumentTypeInfo {
        doc_type: candidate.doc_type,
        confidence,
        characteristics,
        extraction_hints: to_owned_hints(candidate.hints),
    }
}

/// Best-effort label from coarse domain signals.
fn infer_type(lowered: &str) -> DocumentTypeInfo {
    let any = |terms: &[&str]| terms.iter().any(|t| lowered.contains(t));
    let academic = any(ACADEMIC_TERMS);

    let (doc_type, confidence, reason) = if academic && any(GRADE_TERMS) {
        (DocumentType::Transcript, 0.4, "academic institution with grade vocabulary")
    } else if academic && any(DEGREE_TERMS) {
        (DocumentType::Diploma, 0.35, "academic institution with degree vocabulary")
    } else if any(ORGANIZATION_TERMS) {
        (DocumentType::InternshipCertificate, 0.3, "company or organisation issuer")
    } else if academic {
        (DocumentType::Certificate, 0.2, "academic institution issuer")
    } else {
        return DocumentTypeInfo {
            doc_type: DocumentType::Unknown,
            confidence: UNKNOWN_CONFIDENCE,
            characteristics: Vec::new(),
            extraction_hints: vec![
                "Extract any title, issuing body, recipient name, date and identifier present"
                    .to_string(),
            ],
        };
    };

    let hints = candidates()
        .iter()
        .find(|c| c.doc_type == doc_type)
        .map(|c| to_owned_hints(c.hints))
        .unwrap_or_default();

    DocumentTypeInfo {
        doc_type,
        confidence,
        characteristics: vec![format!("inferred: {}", reason)],
        extraction_hints: hints,
    }
}

fn to_owned_hints(hints: &[&str]) -> Vec<String> {
    hints.iter().map(|h| h.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIPLOMA_TEXT: &str = "STATE UNIVERSITY\nThe Board of Trustees has conferred upon\n\
        Jane Doe\nthe degree of Bachelor of Science\nwith all the rights and privileges";

    const TRANSCRIPT_TEXT: &str = "Official Transcript\nSemester 1  Credits: 18\n\
        Course Code CS101 Grade A\nCumulative GPA: 3.72";

    #[test]
    fn test_empty_text_is_unknown() {
        let info = classify("");
        assert_eq!(info.doc_type, DocumentType::Unknown);
        assert!(info.confidence <= 0.2);
    }

    #[test]
    fn test_diploma() {
        let info = classify(DIPLOMA_TEXT);
        assert_eq!(info.doc_type, DocumentType::Diploma);
        assert!(info.confidence >= 0.3 && info.confidence <= 1.0);
        assert!(info.characteristics.iter().any(|c| c == "keyword: bachelor"));
        assert!(!info.extraction_hints.is_empty());
    }

    #[test]
    fn test_transcript_confidence_clipped() {
        let info = classify(TRANSCRIPT_TEXT);
        assert_eq!(info.doc_type, DocumentType::Transcript);
        assert_eq!(info.confidence, 1.0);
    }

    #[test]
    fn test_workshop_beats_generic_certificate() {
        let info = classify(
            "Certificate of Participation\nThis is to certify that John Smith \
             participated in the hands-on workshop on Rust programming",
        );
        assert_eq!(info.doc_type, DocumentType::WorkshopCertificate);
    }

    #[test]
    fn test_inference_fallback() {
        let info = classify("Riverside College\nfinal marks");
        assert_eq!(info.doc_type, DocumentType::Transcript);
        assert!(info.confidence >= 0.2 && info.confidence <= 0.4);
        assert_eq!(info.characteristics.len(), 1);

        let info = classify("Acme Company");
        assert_eq!(info.doc_type, DocumentType::InternshipCertificate);
        assert!(info.confidence <= 0.4);
    }

    #[test]
    fn test_gibberish_is_unknown() {
        let info = classify("zzqx 1234 lorem");
        assert_eq!(info.doc_type, DocumentType::Unknown);
        assert_eq!(info.confidence, UNKNOWN_CONFIDENCE);
    }

    #[test]
    fn test_classify_is_deterministic() {
        for text in ["", DIPLOMA_TEXT, TRANSCRIPT_TEXT, "Award of Excellence, first place"] {
            let a = classify(text);
            let b = classify(text);
            assert_eq!(a, b);
            assert!(a.confidence >= 0.0 && a.confidence <= 1.0);
        }
    }

    #[test]
    fn test_all_patterns_compile() {
        let compiled: usize = candidates().iter().map(|c| c.patterns.len()).sum();
        let declared: usize = CANDIDATES.iter().map(|c| c.patterns.len()).sum();
        assert_eq!(compiled, declared);
    }
}
