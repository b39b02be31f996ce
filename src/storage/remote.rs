use std::collections::HashMap;
use std::time::Duration;

use crate::core::{DefinitionEntry, EnumerationMapping, EnumerationSet};
use crate::error::{EnumError, Result};

/// 拉取远程枚举文档（阻塞；只在 reload 线程上调用）
pub fn fetch_document(url: &str, timeout: Duration) -> Result<EnumerationSet> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| EnumError::unavailable(url, e))?;

    let body = client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .and_then(|resp| resp.error_for_status())
        .and_then(|resp| resp.bytes())
        .map_err(|e| EnumError::unavailable(url, e))?;

    tracing::debug!("Fetched enumeration document from {} ({} bytes)", url, body.len());
    parse_document_bytes(&body, url)
}

/// `{"<enum>": [{"value":..,"order":..}, ...], ...}` → EnumerationSet
pub fn parse_document(text: &str, origin: &str) -> Result<EnumerationSet> {
    parse_document_bytes(text.as_bytes(), origin)
}

/// 与本地文件一致：非法 UTF-8 报 malformed，不做有损解码
pub fn parse_document_bytes(bytes: &[u8], origin: &str) -> Result<EnumerationSet> {
    let doc: HashMap<String, Vec<DefinitionEntry>> =
        serde_json::from_slice(bytes).map_err(|e| EnumError::malformed(origin, e))?;

    let mut set = EnumerationSet::new();
    for (name, entries) in doc {
        let mapping = EnumerationMapping::from_definition(entries, &format!("{}#{}", origin, name))?;
        set.insert(name, mapping);
    }
    Ok(set)
}
