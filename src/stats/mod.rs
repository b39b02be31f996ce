use std::fmt;

use serde::Serialize;

/// 枚举存储状态报告（/status 与 `check` 子命令共用）
#[derive(Clone, Debug, Default, Serialize)]
pub struct StoreReport {
    /// 数据源描述
    pub source: String,
    /// 当前快照代数
    pub generation: u64,
    /// 枚举个数
    pub enumeration_count: usize,
    /// 所有枚举的 value 总数
    pub total_values: usize,
    /// 成功 reload 次数（不含启动加载）
    pub reloads_ok: u64,
    /// 失败 reload 次数（旧快照保留）
    pub reloads_failed: u64,
    pub last_error: Option<String>,
}

impl StoreReport {
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

impl fmt::Display for StoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔══════════════════════════════════════════════════╗")?;
        writeln!(f, "║           enum-rank Store Report                 ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════╣")?;
        writeln!(f, "║ source: {}", self.source)?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(
            f,
            "║   generation:   {:>10}                       ║",
            self.generation
        )?;
        writeln!(
            f,
            "║   enumerations: {:>10}                       ║",
            self.enumeration_count
        )?;
        writeln!(
            f,
            "║   values:       {:>10}                       ║",
            self.total_values
        )?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(
            f,
            "║   reloads ok:   {:>10}                       ║",
            self.reloads_ok
        )?;
        writeln!(
            f,
            "║   reloads fail: {:>10}                       ║",
            self.reloads_failed
        )?;
        if let Some(err) = &self.last_error {
            writeln!(f, "║   last error: {}", err)?;
        }
        writeln!(f, "╚══════════════════════════════════════════════════╝")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_counts_and_error() {
        let report = StoreReport {
            generation: 3,
            enumeration_count: 2,
            total_values: 17,
            reloads_ok: 3,
            reloads_failed: 1,
            last_error: Some("no such file".to_string()),
            ..Default::default()
        }
        .with_source("directory /etc/enums");

        let text = report.to_string();
        assert!(text.contains("directory /etc/enums"));
        assert!(text.contains("17"));
        assert!(text.contains("last error: no such file"));
    }
}
