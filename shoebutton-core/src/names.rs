//! Display-name derivation for bucket object keys.
//!
//! Product files land in the bucket as keys like
//! `cults_files/freshie_mold_ocean_wave.3mf`; listings on the storefront
//! want `ocean wave`. The cleanup rule strips the known directory prefix,
//! the `freshie_mold` product-line marker, the `.3mf` extension and any
//! trailing qualifier after it, turns underscores into spaces and drops the
//! ` freshie mold` marketing phrase. Parsing is pure: the same key always
//! yields the same name.

use regex::Regex;

/// Directory prefix the upload tooling adds in front of storefront files.
const DIRECTORY_PREFIX: &str = "cults_files/";
/// Product-line marker embedded at the start of many file names.
const PRODUCT_MARKER: &str = "freshie_mold";
/// Marketing phrase stripped out of the cleaned segment.
const MARKETING_PHRASE: &str = " freshie mold";

/// Outcome of parsing one object key.
///
/// Both variants carry a usable display string, so a batch never has to
/// stop on a key that does not fit the expected shape; callers can still
/// log or count the unmatched ones.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ParsedName {
    /// The key matched the expected shape and cleaned up to a display name.
    Matched { parsed: String },
    /// The key did not match; the original is the best available name.
    Unmatched { original: String },
}

impl ParsedName {
    /// The display string for this key, whichever way parsing went.
    pub fn display_name(&self) -> &str {
        match self {
            ParsedName::Matched { parsed } => parsed,
            ParsedName::Unmatched { original } => original,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, ParsedName::Matched { .. })
    }
}

/// Parser for the fixed key-cleanup rule.
///
/// Holds the compiled pattern; build one and pass it by reference into the
/// components that need it.
#[derive(Debug, Clone)]
pub struct NameParser {
    pattern: Regex,
}

impl NameParser {
    pub fn new() -> Self {
        let pattern = format!(
            "^(?:{prefix})?(?:{marker})?([^.]*)\\.3mf.*$",
            prefix = regex::escape(DIRECTORY_PREFIX),
            marker = regex::escape(PRODUCT_MARKER),
        );
        NameParser {
            // The pattern is a compile-time constant; a build failure here
            // would be caught by every test in this module.
            pattern: Regex::new(&pattern).expect("name pattern must compile"),
        }
    }

    /// Derive the display name for one object key.
    ///
    /// Never fails: keys outside the expected shape come back as
    /// [`ParsedName::Unmatched`] with the original key preserved.
    pub fn parse(&self, key: &str) -> ParsedName {
        let Some(captures) = self.pattern.captures(key) else {
            return ParsedName::Unmatched {
                original: key.to_string(),
            };
        };

        let segment = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let cleaned = segment
            .replace('_', " ")
            .replace(MARKETING_PHRASE, "")
            .trim()
            .to_string();

        if cleaned.is_empty() {
            // Matched the shape but nothing meaningful survived the
            // cleanup; the original key is the only usable name.
            ParsedName::Unmatched {
                original: key.to_string(),
            }
        } else {
            ParsedName::Matched { parsed: cleaned }
        }
    }
}

impl Default for NameParser {
    fn default() -> Self {
        NameParser::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_prefix_marker_and_extension() {
        let parser = NameParser::new();
        assert_eq!(
            parser.parse("cults_files/freshie_mold_ocean_wave.3mf"),
            ParsedName::Matched {
                parsed: "ocean wave".to_string()
            }
        );
    }

    #[test]
    fn strips_trailing_qualifier_after_extension() {
        let parser = NameParser::new();
        assert_eq!(
            parser.parse("random_name.3mf.part1"),
            ParsedName::Matched {
                parsed: "random name".to_string()
            }
        );
    }

    #[test]
    fn strips_marketing_phrase_inside_segment() {
        let parser = NameParser::new();
        assert_eq!(
            parser.parse("ocean_wave_freshie_mold.3mf"),
            ParsedName::Matched {
                parsed: "ocean wave".to_string()
            }
        );
    }

    #[test]
    fn unmatched_keys_keep_their_original() {
        let parser = NameParser::new();
        for key in ["photo.png", "notes.txt", "archive.zip", ""] {
            assert_eq!(
                parser.parse(key),
                ParsedName::Unmatched {
                    original: key.to_string()
                },
                "{key:?} should not match the mold-file shape"
            );
        }
    }

    #[test]
    fn empty_cleanup_result_counts_as_unmatched() {
        let parser = NameParser::new();
        assert_eq!(
            parser.parse("cults_files/freshie_mold.3mf"),
            ParsedName::Unmatched {
                original: "cults_files/freshie_mold.3mf".to_string()
            }
        );
    }

    #[test]
    fn reparsing_a_display_name_is_idempotent() {
        let parser = NameParser::new();
        let keys = [
            "cults_files/freshie_mold_ocean_wave.3mf",
            "random_name.3mf.part1",
            "ocean_wave_freshie_mold.3mf",
            "photo.png",
        ];
        for key in keys {
            let once = parser.parse(key);
            let twice = parser.parse(once.display_name());
            assert_eq!(
                once.display_name(),
                twice.display_name(),
                "reapplying the parser to {key:?}'s display name must not change it"
            );
        }
    }

    #[test]
    fn parsing_is_deterministic() {
        let parser = NameParser::new();
        let key = "cults_files/freshie_mold_lavender_field.3mf";
        assert_eq!(parser.parse(key), parser.parse(key));
    }
}
