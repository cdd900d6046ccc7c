use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use tracing::{debug, warn};

use super::types::{file_size_gb, quantization_label, GgufError, GgufValue, ModelFileInfo};

/// The magic number that identifies GGUF files ("GGUF" in ASCII).
pub const GGUF_MAGIC: u32 = 0x46554747;

/// Oldest container version this parser accepts. Version 1 used 32-bit
/// lengths and is long obsolete.
const MIN_GGUF_VERSION: u32 = 2;

/// Architectures whose metadata keys we know how to interrogate for
/// context length and layer geometry.
const KNOWN_ARCHITECTURES: &[&str] = &[
    "llama", "mistral", "mixtral", "qwen2", "gemma", "gemma2", "phi3", "falcon", "stablelm",
];

/// Checks whether the file at `path` starts with the GGUF magic number.
pub fn is_gguf_file<P: AsRef<Path>>(path: P) -> bool {
    if let Ok(mut file) = File::open(path) {
        if let Ok(magic) = file.read_u32::<LittleEndian>() {
            return magic == GGUF_MAGIC;
        }
    }
    false
}

/// Parsed header and metadata section of a GGUF file.
pub struct GgufReader {
    pub path: PathBuf,
    pub version: u32,
    pub tensor_count: u64,
    /// Metadata key-value pairs in key order.
    pub metadata: BTreeMap<String, GgufValue>,
}

impl GgufReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GgufError> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;

        let magic = file.read_u32::<LittleEndian>()?;
        if magic != GGUF_MAGIC {
            return Err(GgufError::InvalidMagic);
        }

        let version = file.read_u32::<LittleEndian>()?;
        if version < MIN_GGUF_VERSION {
            return Err(GgufError::UnsupportedVersion(version));
        }

        let tensor_count = file.read_u64::<LittleEndian>()?;
        let metadata_count = file.read_u64::<LittleEndian>()?;
        debug!(
            "GGUF v{}: {} tensors, {} metadata entries",
            version, tensor_count, metadata_count
        );

        let mut metadata = BTreeMap::new();
        for _ in 0..metadata_count {
            let key = read_string(&mut file)?;
            let type_tag = file.read_u32::<LittleEndian>()?;
            let value = read_value(&mut file, type_tag)?;
            metadata.insert(key, value);
        }

        Ok(Self {
            path,
            version,
            tensor_count,
            metadata,
        })
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(GgufValue::as_str)
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        self.metadata.get(key).and_then(GgufValue::as_int)
    }
}

/// Reads a length-prefixed UTF-8 string. Invalid byte sequences are
/// replaced rather than rejected; a corrupt name should not kill the parse.
fn read_string(file: &mut File) -> Result<String, GgufError> {
    let len = file.read_u64::<LittleEndian>()?;
    let len = usize::try_from(len)
        .map_err(|_| GgufError::InvalidFormat(format!("string length {} out of range", len)))?;
    let mut buffer = vec![0u8; len];
    file.read_exact(&mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Byte width of a fixed-size scalar type tag, or None for variable-width
/// and unknown tags.
fn scalar_width(type_tag: u32) -> Option<u64> {
    match type_tag {
        0 | 1 | 7 => Some(1),  // u8, i8, bool
        2 | 3 => Some(2),      // u16, i16
        4 | 5 | 6 => Some(4),  // u32, i32, f32
        10 | 11 | 12 => Some(8), // u64, i64, f64
        _ => None,
    }
}

fn read_value(file: &mut File, type_tag: u32) -> Result<GgufValue, GgufError> {
    match type_tag {
        0 => Ok(GgufValue::Int(file.read_u8()? as i64)),
        1 => Ok(GgufValue::Int(file.read_i8()? as i64)),
        2 => Ok(GgufValue::Int(file.read_u16::<LittleEndian>()? as i64)),
        3 => Ok(GgufValue::Int(file.read_i16::<LittleEndian>()? as i64)),
        4 => Ok(GgufValue::Int(file.read_u32::<LittleEndian>()? as i64)),
        5 => Ok(GgufValue::Int(file.read_i32::<LittleEndian>()? as i64)),
        6 => Ok(GgufValue::Float(file.read_f32::<LittleEndian>()? as f64)),
        7 => Ok(GgufValue::Bool(file.read_u8()? != 0)),
        8 => Ok(GgufValue::String(read_string(file)?)),
        9 => skip_array(file, 0),
        10 => {
            // u64 values beyond the i64 range saturate rather than wrap.
            let v = file.read_u64::<LittleEndian>()?;
            Ok(GgufValue::Int(i64::try_from(v).unwrap_or(i64::MAX)))
        }
        11 => Ok(GgufValue::Int(file.read_i64::<LittleEndian>()?)),
        12 => Ok(GgufValue::Float(file.read_f64::<LittleEndian>()?)),
        other => Err(GgufError::UnknownValueType(other)),
    }
}

/// Guard against pathological files: real metadata never nests arrays
/// anywhere near this deep.
const MAX_ARRAY_NESTING: u8 = 8;

/// Skips past an array value without materializing it. No current consumer
/// needs array contents, so only the element type and count are recorded.
fn skip_array(file: &mut File, depth: u8) -> Result<GgufValue, GgufError> {
    let element_type = file.read_u32::<LittleEndian>()?;
    let len = file.read_u64::<LittleEndian>()?;

    if let Some(width) = scalar_width(element_type) {
        let total = len.checked_mul(width).ok_or_else(|| {
            GgufError::InvalidFormat(format!("array of {} elements overflows file offset", len))
        })?;
        let offset = i64::try_from(total).map_err(|_| {
            GgufError::InvalidFormat(format!("array span {} bytes out of range", total))
        })?;
        file.seek(SeekFrom::Current(offset))?;
    } else if element_type == 8 {
        // Strings are length-prefixed, so each one must be walked.
        for _ in 0..len {
            let str_len = file.read_u64::<LittleEndian>()?;
            let offset = i64::try_from(str_len).map_err(|_| {
                GgufError::InvalidFormat(format!("string length {} out of range", str_len))
            })?;
            file.seek(SeekFrom::Current(offset))?;
        }
    } else if element_type == 9 {
        // Nested arrays carry their own headers, so each one is walkable.
        if depth >= MAX_ARRAY_NESTING {
            return Err(GgufError::InvalidFormat(format!(
                "array nesting deeper than {} levels",
                MAX_ARRAY_NESTING
            )));
        }
        for _ in 0..len {
            skip_array(file, depth + 1)?;
        }
    } else {
        // Unknown element types have no knowable width.
        return Err(GgufError::UnknownValueType(element_type));
    }

    Ok(GgufValue::ArraySummary { element_type, len })
}

/// Reads structural metadata from a GGUF model file.
///
/// Never fails: any parse error (bad magic, unsupported version, truncated
/// read) is recorded in the returned `ModelFileInfo.error` field with
/// `architecture == "unknown"`.
pub fn read_model_info<P: AsRef<Path>>(path: P) -> ModelFileInfo {
    let path = path.as_ref();
    let reader = match GgufReader::open(path) {
        Ok(reader) => reader,
        Err(e) => {
            warn!("failed to parse {}: {}", path.display(), e);
            return ModelFileInfo::from_error(path, e.to_string());
        }
    };

    let architecture = reader
        .get_str("general.architecture")
        .unwrap_or("unknown")
        .to_string();
    let name = reader
        .get_str("general.name")
        .unwrap_or("unknown")
        .to_string();
    let quantization = reader
        .get_int("general.file_type")
        .map(quantization_label)
        .unwrap_or_else(|| "unknown".to_string());

    let mut context_length = None;
    let mut parameters = BTreeMap::new();
    if KNOWN_ARCHITECTURES.contains(&architecture.as_str()) {
        context_length = reader
            .get_int(&format!("{}.context_length", architecture))
            .and_then(|v| u64::try_from(v).ok());
        for key in [
            "block_count",
            "embedding_length",
            "feed_forward_length",
            "attention.head_count",
            "attention.head_count_kv",
        ] {
            if let Some(value) = reader.get_int(&format!("{}.{}", architecture, key)) {
                parameters.insert(key.to_string(), value);
            }
        }
    }

    ModelFileInfo {
        path: path.to_path_buf(),
        architecture,
        name,
        quantization,
        context_length,
        parameters,
        file_size_gb: file_size_gb(path),
        tensor_count: reader.tensor_count,
        metadata: reader.metadata,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Write;

    fn write_string(buf: &mut Vec<u8>, s: &str) {
        buf.write_u64::<LittleEndian>(s.len() as u64).unwrap();
        buf.extend_from_slice(s.as_bytes());
    }

    /// Builds a minimal valid GGUF v3 body with the given metadata entries.
    fn build_gguf(entries: &[(&str, u32, Vec<u8>)]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(GGUF_MAGIC).unwrap();
        buf.write_u32::<LittleEndian>(3).unwrap();
        buf.write_u64::<LittleEndian>(0).unwrap(); // tensor count
        buf.write_u64::<LittleEndian>(entries.len() as u64).unwrap();
        for (key, type_tag, payload) in entries {
            write_string(&mut buf, key);
            buf.write_u32::<LittleEndian>(*type_tag).unwrap();
            buf.extend_from_slice(payload);
        }
        buf
    }

    fn string_payload(s: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        write_string(&mut buf, s);
        buf
    }

    fn u32_payload(v: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(v).unwrap();
        buf
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn parses_minimal_container_with_architecture() {
        let bytes = build_gguf(&[("general.architecture", 8, string_payload("llama"))]);
        let file = write_temp(&bytes);

        let info = read_model_info(file.path());
        assert!(info.error.is_none());
        assert_eq!(info.architecture, "llama");
        assert_eq!(info.name, "unknown");
    }

    #[test]
    fn wrong_magic_yields_error_record() {
        let file = write_temp(b"not a gguf file");

        let info = read_model_info(file.path());
        assert_eq!(info.architecture, "unknown");
        assert!(info.error.is_some());
    }

    #[test]
    fn version_below_two_is_rejected() {
        let mut bytes = Vec::new();
        bytes.write_u32::<LittleEndian>(GGUF_MAGIC).unwrap();
        bytes.write_u32::<LittleEndian>(1).unwrap();
        bytes.write_u64::<LittleEndian>(0).unwrap();
        bytes.write_u64::<LittleEndian>(0).unwrap();
        let file = write_temp(&bytes);

        let info = read_model_info(file.path());
        assert!(info.error.as_deref().unwrap_or("").contains("version"));
    }

    #[test]
    fn truncated_entry_yields_error_record() {
        let mut bytes = build_gguf(&[("general.architecture", 8, string_payload("llama"))]);
        bytes.truncate(bytes.len() - 3);
        let file = write_temp(&bytes);

        let info = read_model_info(file.path());
        assert_eq!(info.architecture, "unknown");
        assert!(info.error.is_some());
    }

    #[test]
    fn arrays_are_skipped_with_summary() {
        let mut array = Vec::new();
        array.write_u32::<LittleEndian>(4).unwrap(); // u32 elements
        array.write_u64::<LittleEndian>(3).unwrap();
        for v in [1u32, 2, 3] {
            array.write_u32::<LittleEndian>(v).unwrap();
        }
        let bytes = build_gguf(&[
            ("tokenizer.ggml.token_type", 9, array),
            ("general.architecture", 8, string_payload("llama")),
        ]);
        let file = write_temp(&bytes);

        let info = read_model_info(file.path());
        assert!(info.error.is_none());
        assert_eq!(info.architecture, "llama");
        assert_eq!(
            info.metadata.get("tokenizer.ggml.token_type"),
            Some(&GgufValue::ArraySummary {
                element_type: 4,
                len: 3
            })
        );
    }

    #[test]
    fn oversized_u64_saturates_instead_of_wrapping() {
        let mut payload = Vec::new();
        payload.write_u64::<LittleEndian>(u64::MAX).unwrap();
        let bytes = build_gguf(&[("custom.huge", 10, payload)]);
        let file = write_temp(&bytes);

        let info = read_model_info(file.path());
        assert!(info.error.is_none());
        assert_eq!(
            info.metadata.get("custom.huge"),
            Some(&GgufValue::Int(i64::MAX))
        );
    }

    #[test]
    fn nested_arrays_are_walked_correctly() {
        // Outer array of two inner u32 arrays, followed by a scalar entry
        // that only parses if the nested skip lands on the right offset.
        let mut inner = Vec::new();
        inner.write_u32::<LittleEndian>(4).unwrap(); // u32 elements
        inner.write_u64::<LittleEndian>(2).unwrap();
        inner.write_u32::<LittleEndian>(10).unwrap();
        inner.write_u32::<LittleEndian>(20).unwrap();

        let mut outer = Vec::new();
        outer.write_u32::<LittleEndian>(9).unwrap(); // array elements
        outer.write_u64::<LittleEndian>(2).unwrap();
        outer.extend_from_slice(&inner);
        outer.extend_from_slice(&inner);

        let bytes = build_gguf(&[
            ("custom.nested", 9, outer),
            ("general.architecture", 8, string_payload("llama")),
        ]);
        let file = write_temp(&bytes);

        let info = read_model_info(file.path());
        assert!(info.error.is_none());
        assert_eq!(info.architecture, "llama");
        assert_eq!(
            info.metadata.get("custom.nested"),
            Some(&GgufValue::ArraySummary {
                element_type: 9,
                len: 2
            })
        );
    }

    #[test]
    fn string_arrays_are_walked_correctly() {
        let mut array = Vec::new();
        array.write_u32::<LittleEndian>(8).unwrap(); // string elements
        array.write_u64::<LittleEndian>(2).unwrap();
        write_string(&mut array, "hello");
        write_string(&mut array, "world");
        let bytes = build_gguf(&[
            ("tokenizer.ggml.tokens", 9, array),
            ("general.name", 8, string_payload("test model")),
        ]);
        let file = write_temp(&bytes);

        let info = read_model_info(file.path());
        assert!(info.error.is_none());
        assert_eq!(info.name, "test model");
    }

    #[test]
    fn unknown_value_type_is_a_hard_error() {
        let bytes = build_gguf(&[("mystery.key", 99, Vec::new())]);
        let file = write_temp(&bytes);

        let info = read_model_info(file.path());
        assert_eq!(info.architecture, "unknown");
        assert!(info.error.as_deref().unwrap_or("").contains("99"));
    }

    #[test]
    fn derives_architecture_scoped_parameters() {
        let bytes = build_gguf(&[
            ("general.architecture", 8, string_payload("llama")),
            ("general.name", 8, string_payload("Llama Test")),
            ("general.file_type", 4, u32_payload(15)),
            ("llama.context_length", 4, u32_payload(4096)),
            ("llama.block_count", 4, u32_payload(32)),
            ("llama.embedding_length", 4, u32_payload(4096)),
            ("llama.attention.head_count", 4, u32_payload(32)),
        ]);
        let file = write_temp(&bytes);

        let info = read_model_info(file.path());
        assert!(info.error.is_none());
        assert_eq!(info.architecture, "llama");
        assert_eq!(info.name, "Llama Test");
        assert_eq!(info.quantization, "Q4_K_M");
        assert_eq!(info.context_length, Some(4096));
        assert_eq!(info.parameters.get("block_count"), Some(&32));
        assert_eq!(info.parameters.get("attention.head_count"), Some(&32));
        assert_eq!(info.parameters.get("feed_forward_length"), None);
    }

    #[test]
    fn unmapped_file_type_gets_unknown_label() {
        let bytes = build_gguf(&[("general.file_type", 4, u32_payload(42))]);
        let file = write_temp(&bytes);

        let info = read_model_info(file.path());
        assert_eq!(info.quantization, "Unknown(42)");
    }

    #[test]
    fn invalid_utf8_in_key_is_replaced_not_fatal() {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(GGUF_MAGIC).unwrap();
        buf.write_u32::<LittleEndian>(3).unwrap();
        buf.write_u64::<LittleEndian>(0).unwrap();
        buf.write_u64::<LittleEndian>(1).unwrap();
        buf.write_u64::<LittleEndian>(2).unwrap();
        buf.extend_from_slice(&[0xff, 0xfe]); // invalid UTF-8 key
        buf.write_u32::<LittleEndian>(7).unwrap(); // bool
        buf.push(1);
        let file = write_temp(&buf);

        let info = read_model_info(file.path());
        assert!(info.error.is_none());
        assert_eq!(info.metadata.len(), 1);
    }

    #[test]
    fn detects_gguf_magic() {
        let bytes = build_gguf(&[]);
        let file = write_temp(&bytes);
        assert!(is_gguf_file(file.path()));

        let other = write_temp(b"plain text");
        assert!(!is_gguf_file(other.path()));
    }
}
