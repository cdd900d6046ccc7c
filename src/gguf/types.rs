use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A single metadata value decoded from a GGUF file.
///
/// All integer widths collapse into `Int`; 32 and 64 bit floats collapse
/// into `Float`. Arrays are not materialized, only their element type and
/// length are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GgufValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Summary of an array entry that was skipped without decoding.
    ArraySummary { element_type: u32, len: u64 },
}

impl GgufValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            GgufValue::Int(i) => Some(*i),
            GgufValue::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            GgufValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for GgufValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GgufValue::String(s) => write!(f, "{}", s),
            GgufValue::Int(i) => write!(f, "{}", i),
            GgufValue::Float(fl) => write!(f, "{}", fl),
            GgufValue::Bool(b) => write!(f, "{}", b),
            GgufValue::ArraySummary { element_type, len } => {
                write!(f, "[array: {} elements, type {}]", len, element_type)
            }
        }
    }
}

/// Errors raised while walking the GGUF container.
#[derive(Debug)]
pub enum GgufError {
    Io(std::io::Error),
    /// The magic number did not match the GGUF constant.
    InvalidMagic,
    /// Version below the supported floor (2).
    UnsupportedVersion(u32),
    /// A value type tag whose byte width cannot be determined. Skipping it
    /// blind would desynchronize every subsequent read, so this is fatal.
    UnknownValueType(u32),
    InvalidFormat(String),
}

impl fmt::Display for GgufError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GgufError::Io(e) => write!(f, "I/O error: {}", e),
            GgufError::InvalidMagic => write!(f, "not a GGUF file: bad magic number"),
            GgufError::UnsupportedVersion(v) => {
                write!(f, "unsupported GGUF version {} (need 2 or newer)", v)
            }
            GgufError::UnknownValueType(t) => {
                write!(f, "unknown metadata value type {}: cannot skip safely", t)
            }
            GgufError::InvalidFormat(msg) => write!(f, "invalid GGUF format: {}", msg),
        }
    }
}

impl Error for GgufError {}

impl From<std::io::Error> for GgufError {
    fn from(err: std::io::Error) -> Self {
        GgufError::Io(err)
    }
}

/// Derived description of a GGUF model file.
///
/// Built once per parse and never mutated afterwards. Parsing failures are
/// folded into this record (see `error`) rather than surfaced as a Result,
/// so callers always receive a well-formed value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFileInfo {
    pub path: PathBuf,
    pub architecture: String,
    pub name: String,
    pub quantization: String,
    pub context_length: Option<u64>,
    /// Architecture-scoped integer parameters (block count, embedding
    /// width, feed-forward width, attention head counts).
    pub parameters: BTreeMap<String, i64>,
    pub file_size_gb: f64,
    pub tensor_count: u64,
    /// Full metadata map in key order. Empty when parsing failed.
    pub metadata: BTreeMap<String, GgufValue>,
    pub error: Option<String>,
}

impl ModelFileInfo {
    /// Minimal record for a file that could not be parsed.
    pub fn from_error(path: &std::path::Path, message: String) -> Self {
        Self {
            path: path.to_path_buf(),
            architecture: "unknown".to_string(),
            name: "unknown".to_string(),
            quantization: "unknown".to_string(),
            context_length: None,
            parameters: BTreeMap::new(),
            file_size_gb: file_size_gb(path),
            tensor_count: 0,
            metadata: BTreeMap::new(),
            error: Some(message),
        }
    }
}

pub(crate) fn file_size_gb(path: &std::path::Path) -> f64 {
    std::fs::metadata(path)
        .map(|m| m.len() as f64 / (1024.0 * 1024.0 * 1024.0))
        .unwrap_or(0.0)
}

/// Maps the `general.file_type` code to a quantization label.
pub fn quantization_label(code: i64) -> String {
    match code {
        0 => "F32",
        1 => "F16",
        2 => "Q4_0",
        3 => "Q4_1",
        7 => "Q8_0",
        8 => "Q5_0",
        9 => "Q5_1",
        10 => "Q2_K",
        11 => "Q3_K_S",
        12 => "Q3_K_M",
        13 => "Q3_K_L",
        14 => "Q4_K_S",
        15 => "Q4_K_M",
        16 => "Q5_K_S",
        17 => "Q5_K_M",
        18 => "Q6_K",
        other => return format!("Unknown({})", other),
    }
    .to_string()
}
