use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{EnumError, Result};

/// 定义文件中的一条记录：`{"value": ..., "order": <int>}`
///
/// 多余字段（如 `label`）忽略；`value` 保留原始 JSON，在构建映射时再做类型收敛。
#[derive(Clone, Debug, Deserialize)]
pub struct DefinitionEntry {
    pub value: serde_json::Value,
    pub order: i64,
}

/// 对外展示用（/enums 接口）
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderedValue {
    pub value: String,
    pub order: i64,
}

/// 单个枚举：value → order。构建后不可变，reload 时整体替换。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnumerationMapping {
    orders: HashMap<String, i64>,
}

impl EnumerationMapping {
    /// 按输入顺序插入；重复 value 以最后一次出现为准
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut orders = HashMap::new();
        for (value, order) in pairs {
            orders.insert(value.into(), order);
        }
        Self { orders }
    }

    /// 解析一份定义文本（JSON 数组）
    pub fn parse(text: &str, origin: &str) -> Result<Self> {
        Self::parse_bytes(text.as_bytes(), origin)
    }

    /// 解析原始字节；非法 UTF-8 同样视为定义格式错误
    pub fn parse_bytes(bytes: &[u8], origin: &str) -> Result<Self> {
        let entries: Vec<DefinitionEntry> =
            serde_json::from_slice(bytes).map_err(|e| EnumError::malformed(origin, e))?;
        Self::from_definition(entries, origin)
    }

    /// 已解码的记录 → 映射（value 收敛为文本）
    pub fn from_definition(entries: Vec<DefinitionEntry>, origin: &str) -> Result<Self> {
        let mut orders = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.into_iter().enumerate() {
            let Some(value) = coerce_value(&entry.value) else {
                let reason = format!(
                    "entry {}: value must be a string, number or boolean, got {}",
                    i, entry.value
                );
                return Err(EnumError::malformed(origin, reason));
            };
            orders.insert(value, entry.order);
        }
        Ok(Self { orders })
    }

    pub fn get(&self, value: &str) -> Option<i64> {
        self.orders.get(value).copied()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// 按 (order, value) 排序的全部条目
    pub fn entries(&self) -> Vec<OrderedValue> {
        let mut v: Vec<OrderedValue> = self
            .orders
            .iter()
            .map(|(value, order)| OrderedValue {
                value: value.clone(),
                order: *order,
            })
            .collect();
        v.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.value.cmp(&b.value)));
        v
    }
}

/// 标量 → 规范文本；null / 数组 / 对象不接受
fn coerce_value(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// 枚举名 → 映射。每个映射以 Arc 共享，求值器只持有自己那一份。
#[derive(Clone, Debug, Default)]
pub struct EnumerationSet {
    enums: HashMap<String, Arc<EnumerationMapping>>,
}

impl EnumerationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, mapping: EnumerationMapping) {
        self.enums.insert(name.into(), Arc::new(mapping));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<EnumerationMapping>> {
        self.enums.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.enums.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.enums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enums.is_empty()
    }

    /// 所有映射的条目总数
    pub fn total_entries(&self) -> usize {
        self.enums.values().map(|m| m.len()).sum()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut v: Vec<&str> = self.enums.keys().map(String::as_str).collect();
        v.sort_unstable();
        v
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<EnumerationMapping>)> {
        self.enums.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, EnumerationMapping)> for EnumerationSet {
    fn from_iter<T: IntoIterator<Item = (String, EnumerationMapping)>>(iter: T) -> Self {
        let mut set = Self::new();
        for (name, mapping) in iter {
            set.insert(name, mapping);
        }
        set
    }
}
