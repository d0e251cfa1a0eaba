//! The relay source shipped to the remote host.

use crate::error_handling::types::ConfigError;
use log::info;
use rust_embed::RustEmbed;
use std::path::Path;

/// Name of the compiled relay unit on the remote host.
pub const RELAY_CLASS: &str = "OracleSocks5Proxy";

/// Largest chunk handed to one bind variable. 8000 characters stay below the
/// 32767-byte PL/SQL limit for any UTF-8 input.
pub const UPLOAD_CHUNK_CHARS: usize = 8000;

#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/assets/relay/"]
struct RelayAssets;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySource {
    class_name: String,
    text: String,
}

impl RelaySource {
    pub fn new(class_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            text: text.into(),
        }
    }

    /// The relay source embedded in the binary.
    pub fn embedded() -> Result<Self, ConfigError> {
        let file_name = format!("{}.java", RELAY_CLASS);
        let asset = RelayAssets::get(&file_name)
            .ok_or_else(|| ConfigError::AssetMissing(file_name.clone()))?;
        let text = String::from_utf8(asset.data.into_owned())
            .map_err(|e| ConfigError::AssetMissing(format!("{} is not UTF-8: {}", file_name, e)))?;
        Ok(Self::new(RELAY_CLASS, text))
    }

    /// Loads an alternative source whose public class is named after the
    /// file stem.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let class_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ConfigError::MissingField(format!("class name in {}", path.display())))?
            .to_string();
        let text = std::fs::read_to_string(path)?;
        info!("Using relay source {} from {}", class_name, path.display());
        Ok(Self::new(class_name, text))
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Splits the source into pieces of at most `max_chars` characters,
    /// never inside a UTF-8 sequence.
    pub fn chunks(&self, max_chars: usize) -> Vec<&str> {
        let max_chars = max_chars.max(1);
        let mut pieces = Vec::new();
        let mut rest = self.text.as_str();
        while !rest.is_empty() {
            let split = rest
                .char_indices()
                .nth(max_chars)
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            let (head, tail) = rest.split_at(split);
            pieces.push(head);
            rest = tail;
        }
        pieces
    }
}
