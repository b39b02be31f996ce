use serde::{Deserialize, Serialize};

/// 缺省值策略（配置项，启动时固定）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultPolicy {
    /// 文档没有该字段值
    pub no_value: i64,
    /// 文档值不在枚举里
    pub no_order: i64,
}

impl DefaultPolicy {
    pub fn new(no_value: i64, no_order: i64) -> Self {
        Self { no_value, no_order }
    }
}

/// 缺失时的对外语义
///
/// - `Substitute`：一律代入缺省值
/// - `Report`：存在性接口报告“无值”，交给宿主的 exists 语义处理
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbsentMode {
    #[default]
    Substitute,
    Report,
}
