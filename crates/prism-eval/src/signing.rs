//! SHA-256 signatures for JSON result files
//!
//! The digest is taken over a canonical serialization that matches Python's
//! `json.dumps(obj, sort_keys=True)` byte for byte: sorted keys, `", "` and
//! `": "` separators, non-ASCII escaped as `\uXXXX`, and `repr`-style floats.
//! Result files signed by the older Python tooling therefore verify here.

use crate::error::{EvalError, Result};
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Formatter emitting Python `json.dumps` defaults
struct PythonFormatter;

impl Formatter for PythonFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_f64<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: f64) -> io::Result<()> {
        writer.write_all(python_float_repr(value).as_bytes())
    }

    fn write_f32<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: f32) -> io::Result<()> {
        writer.write_all(python_float_repr(value as f64).as_bytes())
    }

    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        // ensure_ascii: everything outside ' '..='~' is escaped
        for c in fragment.chars() {
            if (' '..='~').contains(&c) {
                writer.write_all(&[c as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Format a float the way Python's `repr` does.
///
/// Shortest round-trip digits; scientific notation when the decimal exponent
/// is below -4 or at least 16; positional values always carry a `.0`.
pub fn python_float_repr(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    // Rust's LowerExp yields the shortest round-trip mantissa, e.g. "1.25e-7"
    let sci = format!("{:e}", value.abs());
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let sign = if value.is_sign_negative() { "-" } else { "" };

    if !(-4..16).contains(&exp) {
        let mut m = digits[..1].to_string();
        if digits.len() > 1 {
            m.push('.');
            m.push_str(&digits[1..]);
        }
        let exp_sign = if exp < 0 { '-' } else { '+' };
        return format!("{}{}e{}{:02}", sign, m, exp_sign, exp.abs());
    }

    let body = if exp >= 0 {
        let int_len = exp as usize + 1;
        if digits.len() <= int_len {
            format!("{}{}.0", digits, "0".repeat(int_len - digits.len()))
        } else {
            format!("{}.{}", &digits[..int_len], &digits[int_len..])
        }
    } else {
        format!("0.{}{}", "0".repeat((-exp - 1) as usize), digits)
    };
    format!("{}{}", sign, body)
}

/// Canonical bytes used for signing
pub fn canonical_json(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PythonFormatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

/// Lowercase hex SHA-256 of the canonical form
pub fn sign_value(value: &Value) -> Result<String> {
    let bytes = canonical_json(value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Hex SHA-256 of a file's raw bytes
pub fn sha256_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// `results.json` -> `results.json.sig`
pub fn signature_path(path: &Path) -> PathBuf {
    let mut os: OsString = path.as_os_str().to_owned();
    os.push(".sig");
    PathBuf::from(os)
}

/// Write pretty JSON and, when `sign` is set, its `.sig` companion.
///
/// Returns the digest when a signature was written.
pub fn write_signed_json<T: Serialize>(path: &Path, data: &T, sign: bool) -> Result<Option<String>> {
    let value = serde_json::to_value(data)?;
    let pretty = serde_json::to_string_pretty(data)?;
    fs::write(path, pretty)?;

    let sig_path = signature_path(path);
    if !sign {
        // A .sig left by an earlier signed run would no longer match
        if sig_path.is_file() {
            fs::remove_file(&sig_path)?;
        }
        return Ok(None);
    }
    let digest = sign_value(&value)?;
    fs::write(&sig_path, &digest)?;
    Ok(Some(digest))
}

/// Outcome of checking a result file against its `.sig`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SignatureStatus {
    Verified { digest: String },
    Mismatch { expected: String, actual: String },
    Unsigned,
}

impl SignatureStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SignatureStatus::Verified { .. } => "verified",
            SignatureStatus::Mismatch { .. } => "mismatch",
            SignatureStatus::Unsigned => "unsigned",
        }
    }

    /// Turn a mismatch into an error, pass everything else through
    pub fn into_result(self, path: &Path) -> Result<Self> {
        match self {
            SignatureStatus::Mismatch { expected, actual } => Err(EvalError::SignatureMismatch {
                path: path.to_path_buf(),
                expected,
                actual,
            }),
            other => Ok(other),
        }
    }
}

/// Recompute the digest of a JSON file and compare with its `.sig`
pub fn verify_signed_json(path: &Path) -> Result<SignatureStatus> {
    let sig_path = signature_path(path);
    if !sig_path.exists() {
        return Ok(SignatureStatus::Unsigned);
    }

    let expected = fs::read_to_string(&sig_path)?.trim().to_ascii_lowercase();
    let content = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)?;
    let actual = sign_value(&value)?;

    if actual == expected {
        Ok(SignatureStatus::Verified { digest: actual })
    } else {
        Ok(SignatureStatus::Mismatch { expected, actual })
    }
}
