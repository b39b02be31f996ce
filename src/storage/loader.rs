use std::path::{Path, PathBuf};
use std::time::Duration;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::{EnumerationMapping, EnumerationSet};
use crate::error::{EnumError, Result};
use crate::storage::remote;

const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 10;

fn default_timeout_secs() -> u64 {
    DEFAULT_REMOTE_TIMEOUT_SECS
}

/// 枚举数据源抽象：每次调用构建一份完整的新 EnumerationSet。
///
/// ## 契约
/// - 全有或全无：任一枚举失败即整体返回 Err，不产生部分结果。
/// - 只负责构建，不负责发布（发布由 `EnumerationStore::replace` 完成）。
pub trait EnumerationSource: Send + Sync {
    fn load(&self) -> Result<EnumerationSet>;

    /// 日志 / 报表用的数据源描述
    fn describe(&self) -> String;
}

/// 三种数据源拓扑
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceSpec {
    /// 目录下每个普通文件一个枚举，枚举名 = 文件名
    Directory { path: PathBuf },
    /// 单文件，单个具名枚举
    File { path: PathBuf, name: String },
    /// 远程 JSON 对象：顶层 key 为枚举名，value 为定义数组
    Url {
        url: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

impl EnumerationSource for SourceSpec {
    fn load(&self) -> Result<EnumerationSet> {
        match self {
            SourceSpec::Directory { path } => load_directory(path),
            SourceSpec::File { path, name } => load_file(path, name),
            SourceSpec::Url { url, timeout_secs } => {
                remote::fetch_document(url, Duration::from_secs(*timeout_secs))
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            SourceSpec::Directory { path } => format!("directory {}", path.display()),
            SourceSpec::File { path, name } => format!("file {} as {}", path.display(), name),
            SourceSpec::Url { url, .. } => format!("url {}", url),
        }
    }
}

/// 目录拓扑：列出普通文件后并行解析
pub fn load_directory(dir: &Path) -> Result<EnumerationSet> {
    let origin = dir.display().to_string();
    let rd = std::fs::read_dir(dir).map_err(|e| EnumError::unavailable(&origin, e))?;

    let mut files: Vec<(String, PathBuf)> = Vec::new();
    for ent in rd {
        let ent = ent.map_err(|e| EnumError::unavailable(&origin, e))?;
        let path = ent.path();
        // 跟随符号链接判断；目录、设备文件等跳过
        let is_file = std::fs::metadata(&path).map(|m| m.is_file()).unwrap_or(false);
        if !is_file {
            tracing::debug!("Skipping non-regular entry {:?}", path);
            continue;
        }
        let name = ent.file_name().to_string_lossy().into_owned();
        files.push((name, path));
    }

    let parsed: Vec<(String, EnumerationMapping)> = files
        .into_par_iter()
        .map(|(name, path)| -> Result<(String, EnumerationMapping)> {
            let mapping = parse_file(&path)?;
            Ok((name, mapping))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(parsed.into_iter().collect())
}

/// 单文件拓扑
pub fn load_file(path: &Path, name: &str) -> Result<EnumerationSet> {
    let mapping = parse_file(path)?;
    let mut set = EnumerationSet::new();
    set.insert(name, mapping);
    Ok(set)
}

fn parse_file(path: &Path) -> Result<EnumerationMapping> {
    let origin = path.display().to_string();
    // 只有 I/O 失败算 unavailable；编码 / 结构问题交给解析器报 malformed
    let bytes = std::fs::read(path).map_err(|e| EnumError::unavailable(&origin, e))?;
    EnumerationMapping::parse_bytes(&bytes, &origin)
}
