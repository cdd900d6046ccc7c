mod reader;
mod types;

pub use reader::{is_gguf_file, read_model_info, GgufReader, GGUF_MAGIC};
pub use types::{quantization_label, GgufError, GgufValue, ModelFileInfo};
