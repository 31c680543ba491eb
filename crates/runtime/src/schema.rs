//! Schema-Driven Scalar Classification
//!
//! A schema decides what untyped scalar text means: whether `yes` is a
//! boolean, whether `0x10` is sixteen, whether an empty scalar is null.
//! The decoder classifies plain scalars through the active schema, and
//! the emitter consults the same rules in reverse so a string that
//! *looks* like a number keeps its quotes.

/// Scalar classification rule sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Schema {
    /// YAML 1.1 failsafe: every scalar is a string.
    Yaml1_1Failsafe,
    /// YAML 1.1 resolved tags, `yes`/`no`/`on`/`off` booleans included.
    Yaml1_1,
    /// YAML 1.1 as PyYAML resolves it (`y`/`n` are plain strings).
    Yaml1_1Pyyaml,
    /// YAML 1.2 failsafe: every scalar is a string.
    Yaml1_2Failsafe,
    /// YAML 1.2 core schema.
    Yaml1_2Core,
    /// YAML 1.2 JSON schema: JSON spellings only.
    Yaml1_2Json,
    /// Plain JSON.
    Json,
    /// Python literal spellings (`None`, `True`, `False`).
    Python,
    /// Defer to the surrounding context; resolves to YAML 1.2 core.
    Auto,
}

impl Schema {
    pub fn name(self) -> &'static str {
        match self {
            Schema::Yaml1_1Failsafe => "yaml-1.1-failsafe",
            Schema::Yaml1_1 => "yaml-1.1",
            Schema::Yaml1_1Pyyaml => "yaml-1.1-pyyaml",
            Schema::Yaml1_2Failsafe => "yaml-1.2-failsafe",
            Schema::Yaml1_2Core => "yaml-1.2-core",
            Schema::Yaml1_2Json => "yaml-1.2-json",
            Schema::Json => "json",
            Schema::Python => "python",
            Schema::Auto => "auto",
        }
    }

    pub fn by_name(name: &str) -> Option<Schema> {
        [
            Schema::Yaml1_1Failsafe,
            Schema::Yaml1_1,
            Schema::Yaml1_1Pyyaml,
            Schema::Yaml1_2Failsafe,
            Schema::Yaml1_2Core,
            Schema::Yaml1_2Json,
            Schema::Json,
            Schema::Python,
            Schema::Auto,
        ]
        .into_iter()
        .find(|s| s.name() == name)
    }

    /// The schema actually applied after `Auto` defers.
    pub fn resolved(self) -> Schema {
        match self {
            Schema::Auto => Schema::Yaml1_2Core,
            other => other,
        }
    }

    fn is_failsafe(self) -> bool {
        matches!(self, Schema::Yaml1_1Failsafe | Schema::Yaml1_2Failsafe)
    }
}

/// What a piece of plain scalar text resolved to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int(i64),
    /// Positive integer beyond the signed 64-bit range.
    UInt(u64),
    Float(f64),
    Str,
}

impl Schema {
    /// Classify plain scalar text. Quoted scalars never come here; the
    /// decoder maps them straight to strings.
    pub fn classify(self, text: &str) -> ScalarValue {
        let schema = self.resolved();
        if schema.is_failsafe() {
            return ScalarValue::Str;
        }
        if schema.null_spelling(text) {
            return ScalarValue::Null;
        }
        if let Some(b) = schema.bool_spelling(text) {
            return ScalarValue::Bool(b);
        }
        if let Some(v) = schema.int_spelling(text) {
            return v;
        }
        if let Some(f) = schema.float_spelling(text) {
            return ScalarValue::Float(f);
        }
        ScalarValue::Str
    }

    fn null_spelling(self, text: &str) -> bool {
        match self {
            Schema::Json | Schema::Yaml1_2Json => text == "null",
            Schema::Python => text == "None",
            _ => matches!(text, "" | "~" | "null" | "Null" | "NULL"),
        }
    }

    fn bool_spelling(self, text: &str) -> Option<bool> {
        match self {
            Schema::Json | Schema::Yaml1_2Json => match text {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            Schema::Python => match text {
                "True" => Some(true),
                "False" => Some(false),
                _ => None,
            },
            Schema::Yaml1_1 => match text {
                "y" | "Y" | "yes" | "Yes" | "YES" | "true" | "True" | "TRUE" | "on" | "On"
                | "ON" => Some(true),
                "n" | "N" | "no" | "No" | "NO" | "false" | "False" | "FALSE" | "off" | "Off"
                | "OFF" => Some(false),
                _ => None,
            },
            // PyYAML resolves the long 1.1 spellings but leaves bare
            // `y`/`n` as strings.
            Schema::Yaml1_1Pyyaml => match text {
                "yes" | "Yes" | "YES" | "true" | "True" | "TRUE" | "on" | "On" | "ON" => {
                    Some(true)
                }
                "no" | "No" | "NO" | "false" | "False" | "FALSE" | "off" | "Off" | "OFF" => {
                    Some(false)
                }
                _ => None,
            },
            _ => match text {
                "true" | "True" | "TRUE" => Some(true),
                "false" | "False" | "FALSE" => Some(false),
                _ => None,
            },
        }
    }

    fn int_spelling(self, text: &str) -> Option<ScalarValue> {
        let underscores = matches!(
            self,
            Schema::Yaml1_1 | Schema::Yaml1_1Pyyaml | Schema::Python
        );
        let (negative, digits) = split_sign(text, self.sign_allowed())?;
        let (radix, body) = match self {
            Schema::Json | Schema::Yaml1_2Json => (10, digits),
            Schema::Yaml1_1 | Schema::Yaml1_1Pyyaml => {
                if let Some(rest) = digits.strip_prefix("0b") {
                    (2, rest)
                } else if let Some(rest) = digits.strip_prefix("0x") {
                    (16, rest)
                } else if digits.len() > 1 && digits.starts_with('0') {
                    (8, &digits[1..])
                } else {
                    (10, digits)
                }
            }
            _ => {
                if let Some(rest) = digits.strip_prefix("0o") {
                    (8, rest)
                } else if let Some(rest) = digits.strip_prefix("0x") {
                    (16, rest)
                } else {
                    (10, digits)
                }
            }
        };
        if matches!(self, Schema::Json | Schema::Yaml1_2Json) && !json_int_shape(digits) {
            return None;
        }
        let magnitude = parse_digits(body, radix, underscores)?;
        if negative {
            // -2^63 is representable even though 2^63 is not.
            if magnitude == (i64::MAX as u64) + 1 {
                return Some(ScalarValue::Int(i64::MIN));
            }
            let signed = i64::try_from(magnitude).ok()?;
            Some(ScalarValue::Int(-signed))
        } else if magnitude <= i64::MAX as u64 {
            Some(ScalarValue::Int(magnitude as i64))
        } else {
            Some(ScalarValue::UInt(magnitude))
        }
    }

    fn float_spelling(self, text: &str) -> Option<f64> {
        let json = matches!(self, Schema::Json | Schema::Yaml1_2Json);
        if !json {
            let (negative, body) = match text.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, text.strip_prefix('+').unwrap_or(text)),
            };
            match body {
                ".inf" | ".Inf" | ".INF" => {
                    return Some(if negative {
                        f64::NEG_INFINITY
                    } else {
                        f64::INFINITY
                    });
                }
                ".nan" | ".NaN" | ".NAN" => return Some(f64::NAN),
                _ => {}
            }
        }
        let underscores = matches!(
            self,
            Schema::Yaml1_1 | Schema::Yaml1_1Pyyaml | Schema::Python
        );
        let cleaned: String = if underscores && text.contains('_') {
            text.chars().filter(|c| *c != '_').collect()
        } else {
            text.to_string()
        };
        if !float_shape(&cleaned, json) {
            return None;
        }
        cleaned.parse::<f64>().ok()
    }

    fn sign_allowed(self) -> SignRule {
        match self {
            Schema::Json | Schema::Yaml1_2Json => SignRule::MinusOnly,
            _ => SignRule::Both,
        }
    }

    /// The canonical spelling of null under this schema.
    pub fn null_literal(self) -> &'static str {
        match self.resolved() {
            Schema::Python => "None",
            _ => "null",
        }
    }

    /// The canonical spelling of a boolean under this schema.
    pub fn bool_literal(self, value: bool) -> &'static str {
        match self.resolved() {
            Schema::Python => {
                if value {
                    "True"
                } else {
                    "False"
                }
            }
            _ => {
                if value {
                    "true"
                } else {
                    "false"
                }
            }
        }
    }

    /// Whether emitting `text` as a plain scalar would change its kind
    /// on the way back in.
    pub fn string_needs_quoting(self, text: &str) -> bool {
        if text.is_empty() {
            return true;
        }
        if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
            return true;
        }
        self.classify(text) != ScalarValue::Str
    }
}

enum SignRule {
    MinusOnly,
    Both,
}

fn split_sign(text: &str, rule: SignRule) -> Option<(bool, &str)> {
    if let Some(rest) = text.strip_prefix('-') {
        return Some((true, rest));
    }
    if let Some(rest) = text.strip_prefix('+') {
        return match rule {
            SignRule::Both => Some((false, rest)),
            SignRule::MinusOnly => None,
        };
    }
    Some((false, text))
}

/// Accumulate digits in `radix`, optionally skipping `_` separators.
fn parse_digits(body: &str, radix: u32, underscores: bool) -> Option<u64> {
    if body.is_empty() {
        return None;
    }
    let mut value: u64 = 0;
    let mut seen = false;
    for c in body.chars() {
        if c == '_' {
            if !underscores {
                return None;
            }
            continue;
        }
        let digit = c.to_digit(radix)?;
        value = value
            .checked_mul(u64::from(radix))?
            .checked_add(u64::from(digit))?;
        seen = true;
    }
    seen.then_some(value)
}

/// JSON forbids leading zeros on multi-digit integers.
fn json_int_shape(digits: &str) -> bool {
    !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && (digits.len() == 1 || !digits.starts_with('0'))
}

/// Decimal float shape check, stricter than `f64::from_str`, which also
/// accepts `inf` and `NaN` spellings the schemas reject.
fn float_shape(text: &str, json: bool) -> bool {
    let body = match text.strip_prefix('-') {
        Some(rest) => rest,
        None => {
            if json {
                text
            } else {
                text.strip_prefix('+').unwrap_or(text)
            }
        }
    };
    let (mantissa, exponent) = match body.split_once(['e', 'E']) {
        Some((m, e)) => (m, Some(e)),
        None => (body, None),
    };
    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (mantissa, None),
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    let mantissa_ok = if json {
        // JSON requires digits on both sides of the point.
        digits(int_part) && frac_part.is_none_or(digits)
    } else {
        match frac_part {
            Some(f) => {
                (digits(int_part) && (f.is_empty() || digits(f)))
                    || (int_part.is_empty() && digits(f))
            }
            None => digits(int_part),
        }
    };
    if !mantissa_ok {
        return false;
    }
    // A bare integer mantissa with no exponent is an int, not a float.
    if frac_part.is_none() && exponent.is_none() {
        return false;
    }
    match exponent {
        Some(e) => {
            let e = e.strip_prefix(['-', '+']).unwrap_or(e);
            digits(e)
        }
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failsafe_is_all_strings() {
        for text in ["null", "true", "42", "3.14", "yes"] {
            assert_eq!(Schema::Yaml1_2Failsafe.classify(text), ScalarValue::Str);
            assert_eq!(Schema::Yaml1_1Failsafe.classify(text), ScalarValue::Str);
        }
    }

    #[test]
    fn test_core_null_and_bool() {
        for text in ["", "~", "null", "Null", "NULL"] {
            assert_eq!(Schema::Yaml1_2Core.classify(text), ScalarValue::Null);
        }
        assert_eq!(Schema::Yaml1_2Core.classify("true"), ScalarValue::Bool(true));
        assert_eq!(
            Schema::Yaml1_2Core.classify("FALSE"),
            ScalarValue::Bool(false)
        );
        // 1.1 spellings are strings in 1.2 core.
        assert_eq!(Schema::Yaml1_2Core.classify("yes"), ScalarValue::Str);
        assert_eq!(Schema::Yaml1_2Core.classify("off"), ScalarValue::Str);
    }

    #[test]
    fn test_yaml11_bools() {
        assert_eq!(Schema::Yaml1_1.classify("yes"), ScalarValue::Bool(true));
        assert_eq!(Schema::Yaml1_1.classify("Off"), ScalarValue::Bool(false));
        assert_eq!(Schema::Yaml1_1.classify("y"), ScalarValue::Bool(true));
        // PyYAML leaves single letters alone.
        assert_eq!(Schema::Yaml1_1Pyyaml.classify("y"), ScalarValue::Str);
        assert_eq!(
            Schema::Yaml1_1Pyyaml.classify("yes"),
            ScalarValue::Bool(true)
        );
    }

    #[test]
    fn test_int_forms() {
        assert_eq!(Schema::Yaml1_2Core.classify("42"), ScalarValue::Int(42));
        assert_eq!(Schema::Yaml1_2Core.classify("-7"), ScalarValue::Int(-7));
        assert_eq!(Schema::Yaml1_2Core.classify("0x10"), ScalarValue::Int(16));
        assert_eq!(Schema::Yaml1_2Core.classify("0o17"), ScalarValue::Int(15));
        assert_eq!(Schema::Yaml1_1.classify("0b101"), ScalarValue::Int(5));
        assert_eq!(Schema::Yaml1_1.classify("010"), ScalarValue::Int(8));
        assert_eq!(Schema::Yaml1_1.classify("1_000"), ScalarValue::Int(1000));
        // Underscores are a 1.1 affordance.
        assert_eq!(Schema::Yaml1_2Core.classify("1_000"), ScalarValue::Str);
    }

    #[test]
    fn test_int_range_extension() {
        assert_eq!(
            Schema::Yaml1_2Core.classify("9223372036854775807"),
            ScalarValue::Int(i64::MAX)
        );
        assert_eq!(
            Schema::Yaml1_2Core.classify("-9223372036854775808"),
            ScalarValue::Int(i64::MIN)
        );
        assert_eq!(
            Schema::Yaml1_2Core.classify("9223372036854775808"),
            ScalarValue::UInt(9223372036854775808)
        );
        assert_eq!(
            Schema::Yaml1_2Core.classify("18446744073709551615"),
            ScalarValue::UInt(u64::MAX)
        );
        // Beyond u64 nothing fits; the text stays a string.
        assert_eq!(
            Schema::Yaml1_2Core.classify("18446744073709551616"),
            ScalarValue::Str
        );
    }

    #[test]
    fn test_float_forms() {
        assert_eq!(
            Schema::Yaml1_2Core.classify("3.25"),
            ScalarValue::Float(3.25)
        );
        assert_eq!(
            Schema::Yaml1_2Core.classify("-1e3"),
            ScalarValue::Float(-1000.0)
        );
        assert_eq!(
            Schema::Yaml1_2Core.classify(".5"),
            ScalarValue::Float(0.5)
        );
        match Schema::Yaml1_2Core.classify(".nan") {
            ScalarValue::Float(f) => assert!(f.is_nan()),
            other => panic!("expected NaN, got {other:?}"),
        }
        assert_eq!(
            Schema::Yaml1_2Core.classify("-.inf"),
            ScalarValue::Float(f64::NEG_INFINITY)
        );
        // Rust-isms the schemas reject.
        assert_eq!(Schema::Yaml1_2Core.classify("inf"), ScalarValue::Str);
        assert_eq!(Schema::Yaml1_2Core.classify("NaN"), ScalarValue::Str);
    }

    #[test]
    fn test_json_strictness() {
        assert_eq!(Schema::Json.classify("42"), ScalarValue::Int(42));
        assert_eq!(Schema::Json.classify("-1.5"), ScalarValue::Float(-1.5));
        assert_eq!(Schema::Json.classify("+1"), ScalarValue::Str);
        assert_eq!(Schema::Json.classify("01"), ScalarValue::Str);
        assert_eq!(Schema::Json.classify(".5"), ScalarValue::Str);
        assert_eq!(Schema::Json.classify("1."), ScalarValue::Str);
        assert_eq!(Schema::Json.classify(".inf"), ScalarValue::Str);
        assert_eq!(Schema::Json.classify("yes"), ScalarValue::Str);
        assert_eq!(Schema::Json.classify(""), ScalarValue::Str);
    }

    #[test]
    fn test_python_spellings() {
        assert_eq!(Schema::Python.classify("None"), ScalarValue::Null);
        assert_eq!(Schema::Python.classify("True"), ScalarValue::Bool(true));
        assert_eq!(Schema::Python.classify("true"), ScalarValue::Str);
        assert_eq!(Schema::Python.classify("1_000"), ScalarValue::Int(1000));
    }

    #[test]
    fn test_quoting_rules() {
        let schema = Schema::Yaml1_2Core;
        assert!(schema.string_needs_quoting("42"));
        assert!(schema.string_needs_quoting("true"));
        assert!(schema.string_needs_quoting("null"));
        assert!(schema.string_needs_quoting(""));
        assert!(schema.string_needs_quoting(" padded"));
        assert!(!schema.string_needs_quoting("plain text"));
        assert!(!schema.string_needs_quoting("hello"));
    }

    #[test]
    fn test_auto_resolves_to_core() {
        assert_eq!(Schema::Auto.classify("42"), ScalarValue::Int(42));
        assert_eq!(Schema::Auto.resolved(), Schema::Yaml1_2Core);
    }

    #[test]
    fn test_name_roundtrip() {
        for schema in [
            Schema::Yaml1_1,
            Schema::Yaml1_2Core,
            Schema::Json,
            Schema::Python,
        ] {
            assert_eq!(Schema::by_name(schema.name()), Some(schema));
        }
    }
}
