//! Value normalization shared by index time and query time.
//!
//! Every semantic type maps a [`Value`] to zero or more search tokens. The same
//! function runs on both sides so a stored value and a queried value compare
//! equal exactly when the type's matching rule says they should.

use std::sync::OnceLock;

use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, TextAnalyzer, TokenStream};
use time::OffsetDateTime;

use crate::error::{GraphError, Result};
use crate::record::Value;

use super::SemanticType;

/// Separator between the field name and the token in an engine term.
pub const TERM_SEPARATOR: char = '\0';

const SIGN_BIT: u64 = 1 << 63;

/// Produces the tokens `value` contributes to `field` under `ty`.
pub fn encode_terms(field: &str, ty: SemanticType, value: &Value) -> Result<Vec<String>> {
    let mismatch = || GraphError::TypeMismatch {
        field: field.to_owned(),
        expected: ty,
    };
    let tokens = match ty {
        SemanticType::String => match value {
            Value::Str(s) => vec![s.clone()],
            Value::Bool(b) => vec![b.to_string()],
            _ => return Err(mismatch()),
        },
        SemanticType::StringLowercase => match value {
            Value::Str(s) => vec![s.to_lowercase()],
            _ => return Err(mismatch()),
        },
        SemanticType::Text => match value {
            Value::Str(s) => tokenize(s),
            _ => return Err(mismatch()),
        },
        SemanticType::Long => match value {
            Value::Long(v) => vec![sortable_long(*v)],
            _ => return Err(mismatch()),
        },
        SemanticType::Double => match value {
            Value::Double(v) if v.is_nan() => return Err(mismatch()),
            Value::Double(v) => vec![sortable_double(*v)],
            Value::Long(v) => vec![sortable_double(*v as f64)],
            _ => return Err(mismatch()),
        },
        SemanticType::Date => match value {
            Value::Date(ms) | Value::Long(ms) => vec![minute_stamp(*ms).ok_or_else(mismatch)?],
            _ => return Err(mismatch()),
        },
    };
    Ok(tokens)
}

/// Joins a field name and a token into the text stored in the engine.
pub fn term_text(field: &str, token: &str) -> String {
    let mut out = String::with_capacity(field.len() + 1 + token.len());
    out.push_str(field);
    out.push(TERM_SEPARATOR);
    out.push_str(token);
    out
}

/// Splits an engine term back into `(field, token)`.
pub fn split_term(text: &str) -> Option<(&str, &str)> {
    text.split_once(TERM_SEPARATOR)
}

static ANALYZER: OnceLock<TextAnalyzer> = OnceLock::new();

/// Analyzes free text into lower-cased word tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    // token streams borrow the analyzer mutably, so each call works on a clone
    let mut analyzer = ANALYZER
        .get_or_init(|| {
            TextAnalyzer::builder(SimpleTokenizer::default())
                .filter(LowerCaser)
                .build()
        })
        .clone();
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while stream.advance() {
        tokens.push(stream.token().text.clone());
    }
    tokens
}

/// Fixed-width hex encoding of an `i64` whose byte order matches numeric order.
pub fn sortable_long(value: i64) -> String {
    format!("{:016x}", (value as u64) ^ SIGN_BIT)
}

/// Fixed-width hex encoding of an `f64` whose byte order matches numeric order.
///
/// `-0.0` and `0.0` encode identically.
pub fn sortable_double(value: f64) -> String {
    let value = if value == 0.0 { 0.0 } else { value };
    let bits = value.to_bits();
    let ordered = if bits & SIGN_BIT != 0 {
        !bits
    } else {
        bits | SIGN_BIT
    };
    format!("{ordered:016x}")
}

/// `yyyyMMddHHmm` rendering of an epoch-millisecond instant in UTC.
///
/// Returns `None` outside years 0..=9999 where the fixed width breaks ordering.
pub fn minute_stamp(millis: i64) -> Option<String> {
    let minutes = millis.div_euclid(60_000);
    let dt = OffsetDateTime::from_unix_timestamp(minutes.checked_mul(60)?).ok()?;
    if !(0..=9999).contains(&dt.year()) {
        return None;
    }
    Some(format!(
        "{:04}{:02}{:02}{:02}{:02}",
        dt.year(),
        u8::from(dt.month()),
        dt.day(),
        dt.hour(),
        dt.minute()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercase_strings_fold_case() {
        let stored = encode_terms("name", SemanticType::StringLowercase, &"Peter".into()).unwrap();
        let queried =
            encode_terms("name", SemanticType::StringLowercase, &"PETER".into()).unwrap();
        assert_eq!(stored, queried);
        assert_eq!(stored, vec!["peter".to_string()]);
    }

    #[test]
    fn exact_strings_keep_case() {
        let stored = encode_terms("name", SemanticType::String, &"Peter".into()).unwrap();
        assert_eq!(stored, vec!["Peter".to_string()]);
    }

    #[test]
    fn text_is_tokenized() {
        let tokens = encode_terms("bio", SemanticType::Text, &"Peter Something".into()).unwrap();
        assert_eq!(tokens, vec!["peter".to_string(), "something".to_string()]);
    }

    #[test]
    fn shared_analyzer_is_reusable_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| tokenize(&format!("Graph-Databases {i}")))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            for tokens in handle.join().unwrap() {
                assert_eq!(tokens, vec!["graph".to_string(), "databases".into(), i.to_string()]);
            }
        }
        assert!(tokenize("  ").is_empty());
    }

    #[test]
    fn long_encoding_orders_negatives_first() {
        assert!(sortable_long(-5) < sortable_long(-1));
        assert!(sortable_long(-1) < sortable_long(0));
        assert!(sortable_long(0) < sortable_long(i64::MAX));
        assert_eq!(sortable_long(i64::MIN), "0000000000000000");
    }

    #[test]
    fn double_encoding_orders_across_sign() {
        assert!(sortable_double(-2.5) < sortable_double(-0.5));
        assert!(sortable_double(-0.5) < sortable_double(0.0));
        assert!(sortable_double(0.0) < sortable_double(1e-9));
        assert_eq!(sortable_double(-0.0), sortable_double(0.0));
    }

    #[test]
    fn date_truncates_to_minute() {
        // 2021-03-04T05:06:59.999Z
        let a = minute_stamp(1_614_834_419_999).unwrap();
        let b = minute_stamp(1_614_834_360_000).unwrap();
        assert_eq!(a, "202103040506");
        assert_eq!(a, b);
    }

    #[test]
    fn mismatched_value_is_rejected() {
        let err = encode_terms("age", SemanticType::Long, &"ten".into()).unwrap_err();
        assert!(matches!(err, GraphError::TypeMismatch { .. }));
        let err = encode_terms("score", SemanticType::Double, &Value::Double(f64::NAN)).unwrap_err();
        assert!(matches!(err, GraphError::TypeMismatch { .. }));
    }

    #[test]
    fn terms_split_back() {
        let text = term_text("name", "peter");
        assert_eq!(split_term(&text), Some(("name", "peter")));
    }
}
