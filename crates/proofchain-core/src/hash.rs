//! Digest selection and canonical encoding of structured data.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Digest;

use crate::error::LedgerError;

/// Digest functions a chain can be sealed with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[default]
    #[serde(rename = "sha256")]
    Sha256,
    #[serde(rename = "sha512")]
    Sha512,
    #[serde(rename = "sha3-256")]
    Sha3_256,
    #[serde(rename = "sha3-512")]
    Sha3_512,
    #[serde(rename = "blake3")]
    Blake3,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 5] = [
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha512,
        HashAlgorithm::Sha3_256,
        HashAlgorithm::Sha3_512,
        HashAlgorithm::Blake3,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Sha3_256 => "sha3-256",
            HashAlgorithm::Sha3_512 => "sha3-512",
            HashAlgorithm::Blake3 => "blake3",
        }
    }

    /// Digest length in bytes.
    pub fn output_len(self) -> usize {
        match self {
            HashAlgorithm::Sha256 | HashAlgorithm::Sha3_256 | HashAlgorithm::Blake3 => 32,
            HashAlgorithm::Sha512 | HashAlgorithm::Sha3_512 => 64,
        }
    }

    pub fn hex_len(self) -> usize {
        self.output_len() * 2
    }

    pub fn digest(self, bytes: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => sha2::Sha256::digest(bytes).to_vec(),
            HashAlgorithm::Sha512 => sha2::Sha512::digest(bytes).to_vec(),
            HashAlgorithm::Sha3_256 => sha3::Sha3_256::digest(bytes).to_vec(),
            HashAlgorithm::Sha3_512 => sha3::Sha3_512::digest(bytes).to_vec(),
            HashAlgorithm::Blake3 => blake3::hash(bytes).as_bytes().to_vec(),
        }
    }

    /// Lowercase hex form of [`HashAlgorithm::digest`]. Blocks and Merkle nodes
    /// store digests in this form.
    pub fn hex_digest(self, bytes: &[u8]) -> String {
        hex::encode(self.digest(bytes))
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        HashAlgorithm::ALL
            .into_iter()
            .find(|alg| alg.name() == wanted || alg.name().replace('-', "_") == wanted)
            .ok_or_else(|| LedgerError::UnknownHashAlgorithm(s.to_string()))
    }
}

/// Render `value` as sorted-key JSON, byte-for-byte the text Python's
/// `json.dumps(value, sort_keys=True)` produces: `", "` and `": "` separators,
/// ASCII-only strings with `\uXXXX` escapes (surrogate pairs above the BMP),
/// and floats in `repr` form.
///
/// Two values that differ only in key insertion order encode to the same
/// string, whatever map representation serde_json was built with.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(flag) => out.push_str(if *flag { "true" } else { "false" }),
        Value::Number(number) if number.is_f64() => write_float(&number.to_string(), out),
        Value::Number(number) => out.push_str(&number.to_string()),
        Value::String(text) => write_string(text, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_string(key, out);
                out.push_str(": ");
                write_canonical(item, out);
            }
            out.push('}');
        }
    }
}

fn write_string(text: &str, out: &mut String) {
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            ' '..='~' => out.push(c),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units).iter() {
                    out.push_str(&format!("\\u{unit:04x}"));
                }
            }
        }
    }
    out.push('"');
}

/// Re-render serde_json's shortest float text (`1e100`, `0.00001`) in `repr`
/// layout: positional for exponents in `-4..16`, otherwise `d.ddde+XX`.
fn write_float(rendered: &str, out: &mut String) {
    let (negative, unsigned) = match rendered.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, rendered),
    };
    let (mantissa, exponent) = match unsigned.split_once('e') {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i32>().unwrap_or(0)),
        None => (unsigned, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let all = format!("{int_part}{frac_part}");
    let significant = all.trim_start_matches('0');
    let leading = all.len() - significant.len();
    let digits = significant.trim_end_matches('0');

    if negative {
        out.push('-');
    }
    if digits.is_empty() {
        out.push_str("0.0");
        return;
    }
    // decimal exponent of the first significant digit
    let point = int_part.len() as i32 + exponent - leading as i32 - 1;
    if (-4..16).contains(&point) {
        if point >= 0 {
            let whole = point as usize + 1;
            if digits.len() > whole {
                out.push_str(&digits[..whole]);
                out.push('.');
                out.push_str(&digits[whole..]);
            } else {
                out.push_str(digits);
                out.push_str(&"0".repeat(whole - digits.len()));
                out.push_str(".0");
            }
        } else {
            out.push_str("0.");
            out.push_str(&"0".repeat((-point - 1) as usize));
            out.push_str(digits);
        }
    } else {
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        let sign = if point < 0 { '-' } else { '+' };
        out.push_str(&format!("e{sign}{:02}", point.abs()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sha256_known_vectors() {
        assert_eq!(
            HashAlgorithm::Sha256.hex_digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            HashAlgorithm::Sha256.hex_digest(b"a"),
            "ca978112ca1bbdcafac231b39a23dc4da786eff8147c4e72b9807785afee48bb"
        );
    }

    #[test]
    fn wide_and_sponge_vectors() {
        assert_eq!(
            HashAlgorithm::Sha512.hex_digest(b"abc"),
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
             2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
        );
        assert_eq!(
            HashAlgorithm::Sha3_256.hex_digest(b"abc"),
            "3a985da74fe225b2045c172d6bd390bd855f086e3e9d525b46bfe24511431532"
        );
        assert_eq!(
            HashAlgorithm::Sha3_512.hex_digest(b"abc"),
            "b751850b1a57168a5693cd924b6b096e08f621827444f70d884f5d0240d2712e\
             10e116e9192af3c91a7ec57647e3934057340b4cf408d5a56592f8274eec53f0"
        );
    }

    #[test]
    fn output_lengths_match_selector() {
        for alg in HashAlgorithm::ALL {
            let digest = alg.digest(b"ledger");
            assert_eq!(digest.len(), alg.output_len(), "{alg}");
            assert_eq!(alg.hex_digest(b"ledger").len(), alg.hex_len(), "{alg}");
        }
    }

    #[test]
    fn digest_is_deterministic() {
        for alg in HashAlgorithm::ALL {
            assert_eq!(alg.digest(b"same input"), alg.digest(b"same input"));
            assert_ne!(alg.digest(b"same input"), alg.digest(b"same Input"));
        }
    }

    #[test]
    fn parse_selectors() {
        let cases = [
            ("sha256", HashAlgorithm::Sha256),
            ("SHA3-512", HashAlgorithm::Sha3_512),
            ("sha3_256", HashAlgorithm::Sha3_256),
            (" blake3 ", HashAlgorithm::Blake3),
        ];
        for (text, alg) in cases {
            assert_eq!(text.parse::<HashAlgorithm>().unwrap(), alg);
        }
        let err = "md5".parse::<HashAlgorithm>().unwrap_err();
        assert!(matches!(err, LedgerError::UnknownHashAlgorithm(ref s) if s == "md5"));
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for alg in HashAlgorithm::ALL {
            assert_eq!(alg.to_string().parse::<HashAlgorithm>().unwrap(), alg);
        }
    }

    #[test]
    fn serde_uses_selector_names() {
        let json = serde_json::to_string(&HashAlgorithm::Sha3_256).unwrap();
        assert_eq!(json, r#""sha3-256""#);
        let back: HashAlgorithm = serde_json::from_str(r#""blake3""#).unwrap();
        assert_eq!(back, HashAlgorithm::Blake3);
    }

    #[test]
    fn canonical_json_sorts_keys_recursively() {
        let a = json!({"to": "bob", "from": "alice", "meta": {"z": 1, "a": [true, null]}});
        let mut reordered = serde_json::Map::new();
        reordered.insert("meta".into(), json!({"a": [true, null], "z": 1}));
        reordered.insert("from".into(), json!("alice"));
        reordered.insert("to".into(), json!("bob"));
        let b = Value::Object(reordered);

        let expected = r#"{"from": "alice", "meta": {"a": [true, null], "z": 1}, "to": "bob"}"#;
        assert_eq!(canonical_json(&a), expected);
        assert_eq!(canonical_json(&b), expected);
    }

    #[test]
    fn canonical_json_escapes_keys_and_strings() {
        let v = json!({"quote\"key": "line\nbreak"});
        assert_eq!(canonical_json(&v), r#"{"quote\"key": "line\nbreak"}"#);
    }

    #[test]
    fn canonical_json_escapes_non_ascii() {
        let v = json!({"memo": "caf\u{e9} \u{1F600}\u{7f}\u{1}", "tags": [], "m": {}});
        assert_eq!(
            canonical_json(&v),
            r#"{"m": {}, "memo": "caf\u00e9 \ud83d\ude00\u007f\u0001", "tags": []}"#
        );
    }

    #[test]
    fn canonical_json_floats_use_repr_layout() {
        let text = "[1.5, -0.25, 1e100, 2.5e-7, 1e-5, 0.0001, 1e16, 123.0, 1e15, -0.0, 0.1]";
        let v: Value = serde_json::from_str(text).unwrap();
        assert_eq!(
            canonical_json(&v),
            "[1.5, -0.25, 1e+100, 2.5e-07, 1e-05, 0.0001, 1e+16, 123.0, \
             1000000000000000.0, -0.0, 0.1]"
        );
        assert_eq!(canonical_json(&json!([10, -3, 0])), "[10, -3, 0]");
    }
}
