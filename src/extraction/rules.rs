//! Name validation rules
//!
//! A candidate is a name only if it passes every [`NameRule`] in order. The
//! first failing rule is reported so each heuristic can be tested on its own.

use super::patterns::DIGIT_RUN;

/// Labels printed on the card that OCR tends to return as free lines
pub const DEFAULT_EXCLUDED_LABELS: &[&str] = &[
    "STUDENT NO",
    "STUDENT NO.",
    "NAME",
    "COURSE",
    "YEAR",
    "LYCEUM",
    "REPUBLIC",
    "PHILIPPINES",
    "ALABANG",
    "CERTIFIED",
    "SEMESTER",
    "SCHOOL",
    "COLLEGE",
    "ENGINEERING",
    "BSCPE",
    "THIRD YEAR",
    "2ND SEMESTER",
    "2023-2024",
];

/// Characters that never occur in a printed name
pub const UNWANTED_CHARACTERS: &str = "@#$%^&*()+={}[]|\\/<>?`~";

/// One name heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameRule {
    /// At least three characters after trimming
    MinLength,
    /// No card label as a case-insensitive substring
    ExcludedLabel,
    /// No two consecutive digits
    DigitRun,
    /// None of [`UNWANTED_CHARACTERS`]
    Punctuation,
    /// Mostly alphabetic
    AlphaDensity,
    /// Two or more words with a capital, or one long word
    NameShape,
}

impl NameRule {
    /// Evaluation order
    pub const ALL: [NameRule; 6] = [
        NameRule::MinLength,
        NameRule::ExcludedLabel,
        NameRule::DigitRun,
        NameRule::Punctuation,
        NameRule::AlphaDensity,
        NameRule::NameShape,
    ];

    /// Whether `text` passes this rule
    pub fn check(self, text: &str, validator: &NameValidator) -> bool {
        match self {
            NameRule::MinLength => text.trim().chars().count() >= validator.min_length,
            NameRule::ExcludedLabel => {
                let upper = text.to_uppercase();
                !validator
                    .excluded_labels
                    .iter()
                    .any(|label| upper.contains(label.as_str()))
            }
            NameRule::DigitRun => !DIGIT_RUN.is_match(text),
            NameRule::Punctuation => !text.chars().any(|c| UNWANTED_CHARACTERS.contains(c)),
            NameRule::AlphaDensity => {
                let total = text.chars().count();
                let alpha = text.chars().filter(|c| c.is_alphabetic()).count();
                total > 0 && alpha as f64 / total as f64 >= validator.min_alpha_ratio
            }
            NameRule::NameShape => {
                let words: Vec<&str> = text.split_whitespace().collect();
                match words.len() {
                    0 => false,
                    1 => text.chars().count() >= validator.min_single_word_length,
                    _ => words.iter().any(|word| {
                        word.chars().next().map(char::is_uppercase).unwrap_or(false)
                    }),
                }
            }
        }
    }
}

/// Ordered, short-circuit name validator
#[derive(Debug, Clone, PartialEq)]
pub struct NameValidator {
    /// Upper-cased labels that disqualify a candidate
    excluded_labels: Vec<String>,
    min_length: usize,
    min_alpha_ratio: f64,
    min_single_word_length: usize,
}

impl Default for NameValidator {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDED_LABELS.iter().map(|s| s.to_string()))
    }
}

impl NameValidator {
    /// Validator with a custom excluded-label list and default thresholds
    pub fn new(labels: impl IntoIterator<Item = String>) -> Self {
        Self {
            excluded_labels: labels
                .into_iter()
                .map(|label| label.trim().to_uppercase())
                .filter(|label| !label.is_empty())
                .collect(),
            min_length: 3,
            min_alpha_ratio: 0.6,
            min_single_word_length: 4,
        }
    }

    pub fn excluded_labels(&self) -> &[String] {
        &self.excluded_labels
    }

    /// First rule `text` fails, if any
    pub fn first_failure(&self, text: &str) -> Option<NameRule> {
        NameRule::ALL
            .into_iter()
            .find(|rule| !rule.check(text, self))
    }

    pub fn is_valid_name(&self, text: &str) -> bool {
        self.first_failure(text).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(text: &str) -> Option<NameRule> {
        NameValidator::default().first_failure(text)
    }

    #[test]
    fn test_accepts_typical_names() {
        let validator = NameValidator::default();
        assert!(validator.is_valid_name("JUAN DELA CRUZ"));
        assert!(validator.is_valid_name("Maria Santos"));
        assert!(validator.is_valid_name("REYES"));
        assert!(validator.is_valid_name("ANA O'NEIL-CRUZ"));
    }

    #[test]
    fn test_min_length() {
        assert_eq!(failure("AB"), Some(NameRule::MinLength));
        assert_eq!(failure("  A  "), Some(NameRule::MinLength));
    }

    #[test]
    fn test_excluded_labels_are_case_insensitive_substrings() {
        assert_eq!(failure("LYCEUM OF THE PHILIPPINES"), Some(NameRule::ExcludedLabel));
        assert_eq!(failure("Student No"), Some(NameRule::ExcludedLabel));
        assert_eq!(failure("college of engineering"), Some(NameRule::ExcludedLabel));
    }

    #[test]
    fn test_digit_run() {
        assert_eq!(failure("ROOM 204B"), Some(NameRule::DigitRun));
        // A lone digit is left to the density rule
        assert!(NameRule::DigitRun.check("JUAN 2 CRUZ", &NameValidator::default()));
    }

    #[test]
    fn test_punctuation() {
        assert_eq!(failure("JUAN @ CRUZ"), Some(NameRule::Punctuation));
        assert_eq!(failure("JUAN/CRUZ"), Some(NameRule::Punctuation));
    }

    #[test]
    fn test_alpha_density() {
        // 3 letters of 7 characters
        assert_eq!(failure("A.B.C.."), Some(NameRule::AlphaDensity));
        assert!(NameRule::AlphaDensity.check("JUAN CRUZ", &NameValidator::default()));
    }

    #[test]
    fn test_name_shape() {
        // Single short word
        assert_eq!(failure("ANA"), Some(NameRule::NameShape));
        // Two words, none capitalized
        assert_eq!(failure("juan cruz"), Some(NameRule::NameShape));
        assert_eq!(failure("juan Cruz"), None);
    }

    #[test]
    fn test_custom_labels_replace_defaults() {
        let validator = NameValidator::new(vec!["university".to_string()]);
        assert_eq!(validator.excluded_labels(), ["UNIVERSITY".to_string()]);
        assert!(!validator.is_valid_name("STATE UNIVERSITY"));
        assert!(validator.is_valid_name("LYCEUM HALL"));
    }
}
