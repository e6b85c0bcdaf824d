//! Sensitive-data redaction for captured headers and bodies.
//!
//! Text leaving the process through span attributes or logs goes through a
//! [`Redactor`] first. The built-in rule masks payment card numbers:
//!
//! ```text
//! 4532-1234-5678-9012  →  4532-XXXX-XXXX-9012
//! 4532123456789012     →  4532-XXXX-XXXX-9012
//! 4532 1234-56789012   →  4532-XXXX-XXXX-9012
//! ```
//!
//! A card number only matches when it is not adjacent to another digit:
//! `card4532123456789012` is masked, a 20-digit run is not.
//!
//! Scanning repeats until nothing changes, so the digits kept by one mask can
//! never combine with the groups after them into an unmasked card number and
//! `scan(scan(x)) == scan(x)`.
//!
//! # Failure policy
//!
//! Redaction fails open. A rule whose pattern does not compile is dropped and
//! an error is logged; a match the mask cannot transform is kept verbatim and
//! an error is logged. Matching itself is linear time (`regex` crate), so there
//! is no timeout path to handle.

use std::borrow::Cow;
use std::sync::OnceLock;

use http::HeaderMap;
use regex::Regex;
use tracing::error;

/// Card number: four groups of four ASCII digits, each gap an optional space or hyphen.
///
/// The "no adjacent digit" boundary is checked outside the pattern (see
/// [`RedactionRule::digit_bounded`]); `\b` would also reject letters and `_`.
pub const CARD_NUMBER_PATTERN: &str = r"[0-9]{4}[ -]?[0-9]{4}[ -]?[0-9]{4}[ -]?[0-9]{4}";

/// Upper bound on scan passes over one text.
const MAX_PASSES: usize = 16;

/// Masked middle of a card number.
const CARD_MASK: &str = "XXXX-XXXX";

/// Compiled card pattern (compiled once, `None` if compilation failed).
static CARD_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

fn card_regex() -> Option<&'static Regex> {
    CARD_REGEX
        .get_or_init(|| match Regex::new(CARD_NUMBER_PATTERN) {
            Ok(re) => Some(re),
            Err(e) => {
                error!(error = %e, "card number pattern failed to compile, redaction disabled");
                None
            }
        })
        .as_ref()
}

/// Mask transform: receives the matched text, returns the replacement.
///
/// `None` means the match could not be transformed; it is then left unchanged.
pub type MaskFn = fn(&str) -> Option<String>;

/// A pattern plus the transform applied to each of its matches.
#[derive(Clone, Debug)]
pub struct RedactionRule {
    name: &'static str,
    pattern: Regex,
    mask: MaskFn,
    digit_bounded: bool,
}

impl RedactionRule {
    /// Build a rule from a pattern string.
    pub fn new(name: &'static str, pattern: &str, mask: MaskFn) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            pattern: Regex::new(pattern)?,
            mask,
            digit_bounded: false,
        })
    }

    /// Only accept matches with no ASCII digit right before or after them.
    pub fn digit_bounded(mut self) -> Self {
        self.digit_bounded = true;
        self
    }

    /// The built-in card number rule.
    pub fn card_number() -> Option<Self> {
        card_regex().map(|re| Self {
            name: "card_number",
            pattern: re.clone(),
            mask: mask_card_number,
            digit_bounded: true,
        })
    }

    /// Rule name (used in logs).
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// One pass over `text`. `None` when nothing was replaced.
    fn apply(&self, text: &str) -> Option<String> {
        let mut out = String::new();
        let mut copied = 0;
        let mut from = 0;
        let mut changed = false;

        while let Some(m) = self.pattern.find_at(text, from) {
            let rejected =
                m.is_empty() || (self.digit_bounded && touches_digit(text, m.start(), m.end()));
            if rejected {
                // Retry one character further: a shorter overlapping match may still qualify.
                match text[m.start()..].chars().next() {
                    Some(c) => {
                        from = m.start() + c.len_utf8();
                        continue;
                    }
                    None => break,
                }
            }

            let matched = m.as_str();
            match (self.mask)(matched) {
                Some(masked) if masked != matched => {
                    out.push_str(&text[copied..m.start()]);
                    out.push_str(&masked);
                    copied = m.end();
                    changed = true;
                }
                Some(_) => {}
                None => error!(
                    rule = self.name,
                    len = matched.len(),
                    "mask rejected match, leaving it unredacted"
                ),
            }
            from = m.end();
        }

        if !changed {
            return None;
        }
        out.push_str(&text[copied..]);
        Some(out)
    }
}

/// Whether the byte before `start` or at `end` is an ASCII digit.
fn touches_digit(text: &str, start: usize, end: usize) -> bool {
    let bytes = text.as_bytes();
    let before = start > 0 && bytes[start - 1].is_ascii_digit();
    let after = bytes.get(end).map_or(false, u8::is_ascii_digit);
    before || after
}

/// Keep the first and last four digits, mask the middle eight.
pub fn mask_card_number(matched: &str) -> Option<String> {
    let digits: String = matched.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 16 {
        return None;
    }
    Some(format!("{}-{}-{}", &digits[..4], CARD_MASK, &digits[12..]))
}

/// Applies an ordered set of redaction rules to text.
///
/// Shared read-only across requests; scanning never mutates the input.
#[derive(Clone, Debug)]
pub struct Redactor {
    rules: Vec<RedactionRule>,
}

impl Redactor {
    /// Create a redactor from explicit rules.
    pub fn new(rules: Vec<RedactionRule>) -> Self {
        Self { rules }
    }

    /// Redactor with the built-in card number rule.
    ///
    /// Fails open to a pass-through redactor if the rule cannot be built.
    pub fn card_numbers() -> Self {
        Self {
            rules: RedactionRule::card_number().into_iter().collect(),
        }
    }

    /// Redactor that leaves every input unchanged.
    pub fn passthrough() -> Self {
        Self { rules: Vec::new() }
    }

    /// Build from the `REDACT_ENABLED` switch.
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            Self::card_numbers()
        } else {
            Self::passthrough()
        }
    }

    /// Whether any rule is active.
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.rules.is_empty()
    }

    /// Names of the active rules, in application order.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(RedactionRule::name).collect()
    }

    /// Redact all matches of every rule, repeating until the text settles.
    ///
    /// Borrows the input when nothing matched.
    pub fn scan<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut out = Cow::Borrowed(text);
        for _ in 0..MAX_PASSES {
            let mut changed = false;
            for rule in &self.rules {
                if let Some(replaced) = rule.apply(&out) {
                    out = Cow::Owned(replaced);
                    changed = true;
                }
            }
            if !changed {
                return out;
            }
        }
        error!(passes = MAX_PASSES, "redaction did not settle, returning last pass");
        out
    }

    /// Render headers as `name: v1, v2, name2: v` and redact the result.
    pub fn scan_headers(&self, headers: &HeaderMap) -> String {
        self.scan(&render_headers(headers)).into_owned()
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::card_numbers()
    }
}

/// Render headers in the order the map yields its names.
///
/// Multi-valued headers are joined with `", "` under a single name.
/// Non-UTF-8 values are decoded lossily.
pub fn render_headers(headers: &HeaderMap) -> String {
    let mut out = String::new();
    for name in headers.keys() {
        if !out.is_empty() {
            out.push_str(", ");
        }
        out.push_str(name.as_str());
        out.push_str(": ");
        for (i, value) in headers.get_all(name).iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&String::from_utf8_lossy(value.as_bytes()));
        }
    }
    out
}
