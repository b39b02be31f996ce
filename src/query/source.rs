/// 宿主文档层边界：按内部 doc id 取某字段的原始字节。
///
/// ## 契约
/// - 返回 `None` 表示该文档没有该字段值。
/// - 实现必须可被多个打分线程并发读取。
pub trait FieldSource: Send + Sync {
    fn field_bytes(&self, doc: u32) -> Option<&[u8]>;
}

/// 内存字段列：doc id 即下标
#[derive(Clone, Debug, Default)]
pub struct MemoryFieldSource {
    values: Vec<Option<Vec<u8>>>,
}

/// doc id 是 u32；超出即拒收
fn next_doc_id(len: usize) -> Option<u32> {
    u32::try_from(len).ok()
}

impl MemoryFieldSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一篇文档，返回其 doc id；doc id 空间耗尽时返回 None 且不追加
    pub fn push(&mut self, value: Option<&str>) -> Option<u32> {
        let doc = next_doc_id(self.values.len())?;
        self.values.push(value.map(|v| v.as_bytes().to_vec()));
        Some(doc)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 全部 doc id
    pub fn docs(&self) -> Vec<u32> {
        // push 保证 len <= u32::MAX + 1，此处不会截断
        (0..self.values.len()).filter_map(|i| u32::try_from(i).ok()).collect()
    }
}

impl<S: AsRef<str>> FromIterator<Option<S>> for MemoryFieldSource {
    fn from_iter<T: IntoIterator<Item = Option<S>>>(iter: T) -> Self {
        let mut src = Self::new();
        for v in iter {
            if src.push(v.as_ref().map(|s| s.as_ref())).is_none() {
                tracing::warn!("Field source is full at {} documents, dropping the rest", src.len());
                break;
            }
        }
        src
    }
}

impl FieldSource for MemoryFieldSource {
    fn field_bytes(&self, doc: u32) -> Option<&[u8]> {
        self.values.get(doc as usize)?.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_ids_are_dense_and_bounded() {
        let mut src = MemoryFieldSource::new();
        assert_eq!(src.push(Some("a")), Some(0));
        assert_eq!(src.push(None), Some(1));
        assert_eq!(src.docs(), vec![0, 1]);
        assert_eq!(src.field_bytes(0), Some(&b"a"[..]));
        assert_eq!(src.field_bytes(1), None);
        assert_eq!(src.field_bytes(2), None);

        assert_eq!(next_doc_id(0), Some(0));
        assert_eq!(next_doc_id(u32::MAX as usize), Some(u32::MAX));
        #[cfg(target_pointer_width = "64")]
        assert_eq!(next_doc_id(u32::MAX as usize + 1), None);
    }
}
