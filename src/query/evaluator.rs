use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rayon::prelude::*;

use crate::core::{AbsentMode, DefaultPolicy, EnumerationMapping};
use crate::query::protocol::CacheKey;
use crate::query::source::FieldSource;

#[derive(Clone, Debug)]
enum FieldMode {
    /// 正常查表
    Lookup(Arc<EnumerationMapping>),
    /// 仅 reload 的占位求值器：不读字段，恒返回 no_value
    Noop,
}

/// 单文档求值器。
///
/// 构造时绑定一份映射快照与缺省策略；之后只读，可在任意多个线程上并发调用。
/// 相等性与哈希只看 `CacheKey`（枚举名 + generation），供宿主结果缓存去重。
#[derive(Clone, Debug)]
pub struct Evaluator {
    key: CacheKey,
    mode: FieldMode,
    policy: DefaultPolicy,
    absent_mode: AbsentMode,
}

impl Evaluator {
    pub fn lookup(
        key: CacheKey,
        mapping: Arc<EnumerationMapping>,
        policy: DefaultPolicy,
        absent_mode: AbsentMode,
    ) -> Self {
        Self {
            key,
            mode: FieldMode::Lookup(mapping),
            policy,
            absent_mode,
        }
    }

    pub fn noop(key: CacheKey, policy: DefaultPolicy, absent_mode: AbsentMode) -> Self {
        Self {
            key,
            mode: FieldMode::Noop,
            policy,
            absent_mode,
        }
    }

    pub fn cache_key(&self) -> &CacheKey {
        &self.key
    }

    /// 结果缓存使用的稳定描述
    pub fn description(&self) -> String {
        self.key.to_string()
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.mode, FieldMode::Noop)
    }

    /// 缺失一律代入缺省值
    pub fn value_for(&self, value: Option<&str>) -> i64 {
        self.resolve(value).unwrap_or_else(|absent| absent)
    }

    /// 存在性语义：`Report` 模式下缺失返回 None，`Substitute` 模式等同 `value_for`
    pub fn order_for(&self, value: Option<&str>) -> Option<i64> {
        match (self.resolve(value), self.absent_mode) {
            (Ok(order), _) => Some(order),
            (Err(default), AbsentMode::Substitute) => Some(default),
            (Err(_), AbsentMode::Report) => None,
        }
    }

    /// Ok(真实 order) / Err(应代入的缺省值)
    ///
    /// 占位求值器的 no_value 是确定的结果而非“缺失”，两种 AbsentMode 下都返回 Ok。
    fn resolve(&self, value: Option<&str>) -> Result<i64, i64> {
        let mapping = match &self.mode {
            FieldMode::Noop => return Ok(self.policy.no_value),
            FieldMode::Lookup(m) => m,
        };
        let Some(value) = value else {
            return Err(self.policy.no_value);
        };
        mapping.get(value).ok_or(self.policy.no_order)
    }

    /// 按 doc id 求值（字段字节按 UTF-8 有损解码）
    pub fn doc_value(&self, source: &dyn FieldSource, doc: u32) -> i64 {
        if self.is_noop() {
            return self.policy.no_value;
        }
        match source.field_bytes(doc) {
            Some(bytes) => self.value_for(Some(&String::from_utf8_lossy(bytes))),
            None => self.value_for(None),
        }
    }

    pub fn exists(&self, source: &dyn FieldSource, doc: u32) -> bool {
        if self.is_noop() {
            return true;
        }
        match source.field_bytes(doc) {
            Some(bytes) => self.order_for(Some(&String::from_utf8_lossy(bytes))).is_some(),
            None => self.order_for(None).is_some(),
        }
    }

    /// 批量并行打分，结果与 `docs` 顺序一致
    pub fn score_all(&self, source: &dyn FieldSource, docs: &[u32]) -> Vec<i64> {
        docs.par_iter()
            .map(|&doc| self.doc_value(source, doc))
            .collect()
    }
}

impl PartialEq for Evaluator {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Evaluator {}

impl Hash for Evaluator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}
