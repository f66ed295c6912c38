//! Response line codec.
//!
//! One JSON object per connection, newline-terminated:
//! `{"application": "<name>", "metadata": "<title>"}`. Strings go through
//! `serde_json`, so quotes and backslashes in titles are escaped.

use crate::error::{AppDetectError, Result};
use crate::events::WindowInfo;
use serde::{Deserialize, Serialize};
use std::io;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireResponse {
    pub application: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
}

impl WireResponse {
    pub fn from_info(info: &WindowInfo, include_document: bool) -> Self {
        Self {
            application: info.application_name.to_string(),
            metadata: info.title.as_deref().map(str::to_string),
            document: if include_document {
                info.document.as_deref().map(str::to_string)
            } else {
                None
            },
        }
    }
}

/// `serde_json` formatter producing `{"a": 1, "b": 2}` on a single line.
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Сериализует снимок в одну строку с завершающим `\n`
pub fn encode_line(info: &WindowInfo, include_document: bool) -> Result<Vec<u8>> {
    let response = WireResponse::from_info(info, include_document);
    let mut buf = Vec::with_capacity(64);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    response
        .serialize(&mut serializer)
        .map_err(|e| AppDetectError::Internal(format!("Не удалось сериализовать ответ: {}", e)))?;
    buf.push(b'\n');
    Ok(buf)
}

pub fn decode_line(line: &str) -> Result<WireResponse> {
    serde_json::from_str(line.trim_end())
        .map_err(|e| AppDetectError::Internal(format!("Некорректный ответ сервера: {}", e)))
}
