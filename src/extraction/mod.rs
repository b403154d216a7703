//! Field extraction from raw OCR text
//!
//! Pulls the student number, the holder's name and the informational course
//! and year level out of the text read from one ID-card layout. Every field is
//! optional: a single OCR pass often catches only part of the card.

pub mod clean;
pub mod patterns;
pub mod rules;

use serde::Serialize;
use tracing::debug;

pub use clean::clean_special_characters;
pub use rules::{NameValidator, DEFAULT_EXCLUDED_LABELS};

use patterns::{COURSE_CODE, COURSE_LINE, STUDENT_NO, YEAR_LEVEL};

/// Partially accumulated card fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldRecord {
    student_no: Option<String>,
    name: Option<String>,
    course: Option<String>,
    year_level: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl FieldRecord {
    pub fn new(
        student_no: Option<String>,
        name: Option<String>,
        course: Option<String>,
        year_level: Option<String>,
    ) -> Self {
        Self {
            student_no: non_empty(student_no),
            name: non_empty(name),
            course: non_empty(course),
            year_level: non_empty(year_level),
        }
    }

    pub fn student_no(&self) -> Option<&str> {
        self.student_no.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn course(&self) -> Option<&str> {
        self.course.as_deref()
    }

    pub fn year_level(&self) -> Option<&str> {
        self.year_level.as_deref()
    }

    /// Copy every present field of `other` over this record.
    /// Returns whether anything changed.
    pub fn merge(&mut self, other: &FieldRecord) -> bool {
        let mut changed = false;
        for (slot, value) in [
            (&mut self.student_no, &other.student_no),
            (&mut self.name, &other.name),
            (&mut self.course, &other.course),
            (&mut self.year_level, &other.year_level),
        ] {
            if let Some(value) = value {
                if slot.as_ref() != Some(value) {
                    *slot = Some(value.clone());
                    changed = true;
                }
            }
        }
        changed
    }

    /// Both required fields present
    pub fn is_complete(&self) -> bool {
        self.student_no.is_some() && self.name.is_some()
    }

    /// At least one required field present
    pub fn has_identifier(&self) -> bool {
        self.student_no.is_some() || self.name.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_identifier() && self.course.is_none() && self.year_level.is_none()
    }

    pub fn clear(&mut self) {
        *self = FieldRecord::default();
    }
}

/// Extraction settings
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    /// Labels that disqualify a name candidate
    pub excluded_labels: Vec<String>,
    /// Lines inspected after a bare `NAME` label
    pub name_lookahead: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            excluded_labels: DEFAULT_EXCLUDED_LABELS.iter().map(|s| s.to_string()).collect(),
            name_lookahead: 3,
        }
    }
}

/// Raw OCR text to [`FieldRecord`]
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    validator: NameValidator,
    name_lookahead: usize,
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self::new(ExtractionConfig::default())
    }
}

impl FieldExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        let validator = NameValidator::new(config.excluded_labels);
        debug!(
            "Name validator excludes {} labels",
            validator.excluded_labels().len()
        );
        Self {
            validator,
            name_lookahead: config.name_lookahead,
        }
    }

    /// Extract whatever fields `raw_text` contains
    pub fn extract(&self, raw_text: &str) -> FieldRecord {
        let lines: Vec<&str> = raw_text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        debug!("Extracting fields from {} OCR lines", lines.len());

        let record = FieldRecord::new(
            extract_student_no(raw_text),
            self.extract_name(&lines),
            extract_course(&lines),
            extract_year_level(&lines),
        );

        debug!(
            "Extracted student_no={:?} name={:?} course={:?} year={:?}",
            record.student_no(),
            record.name(),
            record.course(),
            record.year_level()
        );
        record
    }

    fn extract_name(&self, lines: &[&str]) -> Option<String> {
        let mut number_seen = false;

        for (i, line) in lines.iter().enumerate() {
            if STUDENT_NO.is_match(line) {
                number_seen = true;
            }

            if line.to_uppercase().contains("NAME") {
                let inline = line
                    .split_once(':')
                    .and_then(|(_, rest)| self.accept(rest));
                if inline.is_some() {
                    return inline;
                }

                let end = (i + 1 + self.name_lookahead).min(lines.len());
                if let Some(found) = lines[i + 1..end].iter().find_map(|next| self.accept(next)) {
                    return Some(found);
                }
            } else if number_seen {
                if let Some(found) = self.accept(line) {
                    return Some(found);
                }
            }
        }

        None
    }

    /// Cleaned candidate if it validates as a name
    fn accept(&self, candidate: &str) -> Option<String> {
        let cleaned = clean_special_characters(candidate);
        if self.validator.is_valid_name(&cleaned) {
            Some(cleaned)
        } else {
            None
        }
    }
}

/// First `dddd-dd` token anywhere in the text
pub fn extract_student_no(text: &str) -> Option<String> {
    STUDENT_NO.find(text).map(|m| m.as_str().to_string())
}

/// Course code after a `COURSE` label, else the first code anywhere
pub fn extract_course(lines: &[&str]) -> Option<String> {
    let upper: Vec<String> = lines.iter().map(|line| line.to_uppercase()).collect();

    for (i, line) in upper.iter().enumerate() {
        if line.contains("COURSE") {
            if let Some(next) = upper.get(i + 1) {
                if COURSE_LINE.is_match(next) {
                    return Some(next.clone());
                }
            }
        }
    }

    upper
        .iter()
        .find_map(|line| COURSE_CODE.find(line).map(|m| m.as_str().to_string()))
}

/// First year level such as `THIRD YEAR`, matched within a single line
pub fn extract_year_level(lines: &[&str]) -> Option<String> {
    lines.iter().find_map(|line| {
        YEAR_LEVEL
            .find(&line.to_uppercase())
            .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
    })
}
