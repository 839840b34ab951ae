//! Sanity checks on a single translated line.
//!
//! Errors mean the line is not a usable translation (the entry stays pending).
//! Warnings flag game control codes or line breaks that did not survive the
//! round trip; the translation is still accepted.

use regex::Regex;
use std::sync::OnceLock;

/// A translation longer than this many times its source is assumed to carry
/// commentary rather than just the translated text.
const MAX_LENGTH_RATIO: usize = 5;

/// Phrases models use when they fail or refuse instead of translating.
const FAILURE_PHRASES: &[&str] = &[
    "translation failed",
    "i cannot",
    "i can't",
    "unable to",
    "sorry",
    "error occurred",
    "something went wrong",
    "翻译失败",
    "无法翻译",
    "无法处理",
    "出现错误",
];

/// Validation report containing errors and warnings about a translation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    /// Problems that make the translation unusable
    pub errors: Vec<String>,

    /// Suspicious differences worth a log line
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        !self.has_errors() && !self.has_warnings()
    }
}

/// Validator for translated game text.
pub struct TranslationValidator;

// RPG Maker style escape codes (\C[2], \V[10], \N[1]) and printf-style placeholders
static CONTROL_CODE_REGEX: OnceLock<Regex> = OnceLock::new();
static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

impl TranslationValidator {
    /// Validate one translated entry against its source text.
    pub fn validate(original: &str, translated: &str) -> ValidationReport {
        let mut report = ValidationReport::default();

        let translated_clean = translated.trim();
        if translated_clean.is_empty() {
            report.errors.push("Translation is empty".to_string());
            return report;
        }

        let lowered = translated_clean.to_lowercase();
        let original_lowered = original.to_lowercase();
        if let Some(phrase) = FAILURE_PHRASES
            .iter()
            .find(|p| lowered.contains(*p) && !original_lowered.contains(*p))
        {
            report
                .errors
                .push(format!("Translation contains failure phrase {:?}", phrase));
        }

        let original_len = original.trim().chars().count();
        let translated_len = translated_clean.chars().count();
        if original_len > 0 && translated_len > original_len * MAX_LENGTH_RATIO {
            report.errors.push(format!(
                "Translation is {} chars for a {} char source",
                translated_len, original_len
            ));
        }

        let orig_breaks = original.matches('\n').count();
        let trans_breaks = translated.matches('\n').count();
        if orig_breaks != trans_breaks {
            report.warnings.push(format!(
                "Line break mismatch: original has {}, translation has {}",
                orig_breaks, trans_breaks
            ));
        }

        let orig_codes = Self::extract_control_codes(original);
        let trans_codes = Self::extract_control_codes(translated);
        if orig_codes != trans_codes {
            report.warnings.push(format!(
                "Control code mismatch: original has {:?}, translation has {:?}",
                orig_codes, trans_codes
            ));
        }

        let orig_placeholders = Self::extract_placeholders(original);
        let trans_placeholders = Self::extract_placeholders(translated);
        if orig_placeholders != trans_placeholders {
            report.warnings.push(format!(
                "Placeholder mismatch: original has {:?}, translation has {:?}",
                orig_placeholders, trans_placeholders
            ));
        }

        report
    }

    /// Extract control codes, sorted so reordering within a line is not flagged
    fn extract_control_codes(text: &str) -> Vec<String> {
        let regex = CONTROL_CODE_REGEX
            .get_or_init(|| Regex::new(r"\\[A-Za-z]+\[[^\]]*\]").expect("valid regex"));

        let mut codes: Vec<String> = regex
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect();
        codes.sort();
        codes
    }

    /// Extract printf-style and numbered placeholders (%s, %d, %1)
    fn extract_placeholders(text: &str) -> Vec<String> {
        let regex =
            PLACEHOLDER_REGEX.get_or_init(|| Regex::new(r"%(?:\d+|[sd])").expect("valid regex"));

        let mut placeholders: Vec<String> = regex
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect();
        placeholders.sort();
        placeholders
    }
}
