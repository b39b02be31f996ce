use thiserror::Error;

pub type Result<T> = std::result::Result<T, EnumError>;

/// 枚举加载 / 求值错误
///
/// - `SourceUnavailable` / `MalformedDefinition`：reload 失败，旧快照保留
/// - `UnknownEnumeration` / `InvalidOperation`：请求错误，不重试
#[derive(Debug, Error)]
pub enum EnumError {
    #[error("enumeration source unavailable ({origin}): {reason}")]
    SourceUnavailable { origin: String, reason: String },

    #[error("malformed enumeration definition ({origin}): {reason}")]
    MalformedDefinition { origin: String, reason: String },

    #[error("no such enumeration: {name}")]
    UnknownEnumeration { name: String },

    #[error("invalid reload operation: {code}")]
    InvalidOperation { code: String },
}

impl EnumError {
    pub fn unavailable(origin: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(origin: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedDefinition {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }

    /// 请求侧错误（调用方参数问题），区别于数据源故障
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownEnumeration { .. } | Self::InvalidOperation { .. }
        )
    }
}
