// Identifier columns rendered as digit strings.
//
// Upstream dumps often carry ids through a float column, so `123` arrives as
// `123.0`. Downstream keys compare text, so ids are pinned to one spelling.

use whiteshorts_core::{Batch, Scalar};

/// Render one identifier value.
///
/// Integral numbers become their integer digits, `"123.0"` style text
/// collapses to `"123"`, other text is trimmed. Blank text and non-finite
/// floats become null.
pub fn identifier_text(value: &Scalar) -> Scalar {
    match value {
        Scalar::Null => Scalar::Null,
        Scalar::Bool(b) => Scalar::Bool(*b),
        Scalar::Int(i) => Scalar::Text(i.to_string()),
        Scalar::Float(f) if !f.is_finite() => Scalar::Null,
        Scalar::Float(f) => Scalar::Text(float_id(*f)),
        Scalar::Text(s) => {
            let t = s.trim();
            if t.is_empty() {
                Scalar::Null
            } else {
                Scalar::Text(collapse_zero_fraction(t).to_string())
            }
        }
    }
}

fn float_id(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        format!("{}", f as i64)
    } else {
        format!("{f}")
    }
}

/// `"123.000"` -> `"123"`; anything else is returned unchanged.
fn collapse_zero_fraction(text: &str) -> &str {
    let Some((int, frac)) = text.split_once('.') else {
        return text;
    };
    let digits = int.strip_prefix('-').unwrap_or(int);
    let integral = !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit());
    if integral && frac.bytes().all(|b| b == b'0') {
        int
    } else {
        text
    }
}

/// Apply [`identifier_text`] to every listed column present in a row.
pub fn normalize_identifiers(batch: Batch, id_cols: &[String]) -> Batch {
    if id_cols.is_empty() {
        return batch;
    }
    batch
        .into_iter()
        .map(|mut row| {
            for column in id_cols {
                if let Some(slot) = row.get_mut(column) {
                    *slot = identifier_text(slot);
                }
            }
            row
        })
        .collect()
}
