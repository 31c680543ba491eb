//! Scalar Coercion
//!
//! `Convert` moves values between scalar kinds. Numeric and string
//! conversions obey the builder's schema in both directions: rendering
//! uses the schema's literal forms, parsing uses its classification.
//! Structural kinds never coerce to scalars.

use crate::builder::Builder;
use crate::error::ErrorKind;
use crate::schema::ScalarValue;
use strata_core::generic::{Generic, Kind};

pub(crate) fn convert(b: &Builder, input: Generic, target: Kind) -> Generic {
    let kind = input.kind();
    if kind == target {
        return input;
    }
    if matches!(
        kind,
        Kind::Sequence | Kind::Mapping | Kind::Indirect | Kind::Alias
    ) || matches!(
        target,
        Kind::Sequence | Kind::Mapping | Kind::Indirect | Kind::Alias | Kind::Invalid
    ) {
        return b.fail(ErrorKind::KindMismatch, "structural kinds do not coerce");
    }

    match target {
        Kind::String => b.string(&render(b, input)),
        Kind::Null => match parse_as(b, input) {
            Some(ScalarValue::Null) => Generic::NULL,
            _ => b.fail(ErrorKind::SchemaViolation, "not a null spelling"),
        },
        Kind::Bool => match parse_as(b, input) {
            Some(ScalarValue::Bool(v)) => Generic::from_bool(v),
            _ => b.fail(ErrorKind::SchemaViolation, "not a boolean spelling"),
        },
        Kind::Int => match kind {
            Kind::Bool => b.int(i64::from(input.get_bool().unwrap())),
            Kind::Float => {
                let f = input.get_float().unwrap();
                if !f.is_finite() || f < i64::MIN as f64 || f > i64::MAX as f64 {
                    return b.fail(ErrorKind::Overflow, "float outside integer range");
                }
                b.int(f.trunc() as i64)
            }
            Kind::String => match parse_as(b, input) {
                Some(ScalarValue::Int(v)) => b.int(v),
                Some(ScalarValue::UInt(v)) => b.uint(v),
                _ => b.fail(ErrorKind::SchemaViolation, "not an integer spelling"),
            },
            _ => b.fail(ErrorKind::KindMismatch, "no integer view"),
        },
        Kind::Float => match kind {
            Kind::Int => {
                if input.int_is_unsigned_extended() {
                    b.float(input.get_uint().unwrap() as f64)
                } else {
                    b.float(input.get_int().unwrap() as f64)
                }
            }
            Kind::String => match parse_as(b, input) {
                Some(ScalarValue::Float(v)) => b.float(v),
                Some(ScalarValue::Int(v)) => b.float(v as f64),
                Some(ScalarValue::UInt(v)) => b.float(v as f64),
                _ => b.fail(ErrorKind::SchemaViolation, "not a float spelling"),
            },
            _ => b.fail(ErrorKind::KindMismatch, "no float view"),
        },
        _ => b.fail(ErrorKind::KindMismatch, "unsupported conversion"),
    }
}

/// Render a scalar the way the emitter would under this schema.
fn render(b: &Builder, v: Generic) -> String {
    let schema = b.schema();
    match v.kind() {
        Kind::Null => schema.null_literal().to_string(),
        Kind::Bool => schema.bool_literal(v.get_bool().unwrap()).to_string(),
        Kind::Int => {
            if v.int_is_unsigned_extended() {
                v.get_uint().unwrap().to_string()
            } else {
                v.get_int().unwrap().to_string()
            }
        }
        Kind::Float => crate::iter::render_float(v.get_float().unwrap()),
        _ => v.as_str().unwrap_or_default().to_string(),
    }
}

/// Classify the scalar's text under the schema; strings classify their
/// content, everything else goes through its rendering.
fn parse_as(b: &Builder, v: Generic) -> Option<ScalarValue> {
    let text = match v.kind() {
        Kind::String => v.as_str()?.to_string(),
        _ => render(b, v),
    };
    Some(b.schema().classify(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    fn builder() -> Builder {
        Builder::with_schema(Schema::Yaml1_2Core)
    }

    #[test]
    fn test_to_string() {
        let b = builder();
        assert_eq!(convert(&b, b.int(42), Kind::String).as_str(), Some("42"));
        assert_eq!(
            convert(&b, b.float(2.5), Kind::String).as_str(),
            Some("2.5")
        );
        assert_eq!(
            convert(&b, b.bool(true), Kind::String).as_str(),
            Some("true")
        );
        assert_eq!(
            convert(&b, Generic::NULL, Kind::String).as_str(),
            Some("null")
        );
        assert_eq!(
            convert(&b, b.uint(u64::MAX), Kind::String).as_str(),
            Some("18446744073709551615")
        );
    }

    #[test]
    fn test_string_to_numbers() {
        let b = builder();
        assert_eq!(convert(&b, b.string("42"), Kind::Int).get_int(), Some(42));
        assert_eq!(convert(&b, b.string("0x10"), Kind::Int).get_int(), Some(16));
        assert_eq!(
            convert(&b, b.string("2.5"), Kind::Float).get_float(),
            Some(2.5)
        );
        // Integer text widens to float on request.
        assert_eq!(
            convert(&b, b.string("3"), Kind::Float).get_float(),
            Some(3.0)
        );
        assert!(convert(&b, b.string("nope"), Kind::Int).is_invalid());
    }

    #[test]
    fn test_numeric_cross_conversion() {
        let b = builder();
        assert_eq!(convert(&b, b.int(3), Kind::Float).get_float(), Some(3.0));
        assert_eq!(convert(&b, b.float(3.9), Kind::Int).get_int(), Some(3));
        assert!(convert(&b, b.float(f64::NAN), Kind::Int).is_invalid());
        assert!(convert(&b, b.float(1e300), Kind::Int).is_invalid());
    }

    #[test]
    fn test_schema_governs_spellings() {
        let b11 = Builder::with_schema(Schema::Yaml1_1);
        assert_eq!(
            convert(&b11, b11.string("yes"), Kind::Bool).get_bool(),
            Some(true)
        );
        let b12 = builder();
        assert!(convert(&b12, b12.string("yes"), Kind::Bool).is_invalid());
    }

    #[test]
    fn test_structural_kinds_refuse() {
        let b = builder();
        let s = b.sequence(&[b.int(1)]);
        assert!(convert(&b, s, Kind::String).is_invalid());
        let m = b.mapping(&[b.string("k"), b.int(1)]);
        assert!(convert(&b, m, Kind::Int).is_invalid());
        assert!(convert(&b, b.int(1), Kind::Sequence).is_invalid());
    }

    #[test]
    fn test_identity() {
        let b = builder();
        let v = b.int(7);
        assert_eq!(convert(&b, v, Kind::Int).to_bits(), v.to_bits());
    }
}
