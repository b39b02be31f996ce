use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::core::{AbsentMode, DefaultPolicy};
use crate::error::{EnumError, Result};
use crate::index::{EnumerationStore, Snapshot};
use crate::query::evaluator::Evaluator;
use crate::stats::StoreReport;
use crate::storage::EnumerationSource;

/// 默认的 reload 前缀：`__status` = 先 reload 再按 `status` 求值，单独的 `__` = 仅 reload
pub const DEFAULT_RELOAD_PREFIX: &str = "__";

/// 结果缓存键：枚举名 + 快照 generation。
///
/// 同一快照、同名 → 相等（同一查询计划内去重）；
/// reload 前后 generation 不同 → 永不相等。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    enumeration: Option<Arc<str>>,
    generation: u64,
}

impl CacheKey {
    pub fn field(name: &str, generation: u64) -> Self {
        Self {
            enumeration: Some(Arc::from(name)),
            generation,
        }
    }

    /// 仅 reload 的占位求值器
    pub fn reload(generation: u64) -> Self {
        Self {
            enumeration: None,
            generation,
        }
    }

    pub fn enumeration(&self) -> Option<&str> {
        self.enumeration.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.enumeration {
            Some(name) => write!(
                f,
                "Enumerations evaluated on {} (generation {})",
                name, self.generation
            ),
            None => write!(f, "Enumeration reload (generation {})", self.generation),
        }
    }
}

/// 请求携带的操作码
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReloadOp {
    Evaluate,
    ReloadThenEvaluate,
    ReloadOnly,
}

impl ReloadOp {
    pub fn code(self) -> i64 {
        match self {
            ReloadOp::Evaluate => 0,
            ReloadOp::ReloadThenEvaluate => 1,
            ReloadOp::ReloadOnly => 2,
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(ReloadOp::Evaluate),
            1 => Ok(ReloadOp::ReloadThenEvaluate),
            2 => Ok(ReloadOp::ReloadOnly),
            other => Err(EnumError::InvalidOperation {
                code: other.to_string(),
            }),
        }
    }

    pub fn reloads(self) -> bool {
        !matches!(self, ReloadOp::Evaluate)
    }
}

impl FromStr for ReloadOp {
    type Err = EnumError;

    fn from_str(s: &str) -> Result<Self> {
        let code: i64 = s.trim().parse().map_err(|_| EnumError::InvalidOperation {
            code: s.to_string(),
        })?;
        Self::from_code(code)
    }
}

/// 一次求值请求：枚举名（== 文档字段名）+ 操作码
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvaluationRequest {
    pub name: String,
    pub op: ReloadOp,
    /// 由 reload 前缀触发：reload 后名称不存在时退化为仅 reload
    pub prefixed: bool,
}

impl EvaluationRequest {
    pub fn new(name: impl Into<String>, op: ReloadOp) -> Self {
        Self {
            name: name.into(),
            op,
            prefixed: false,
        }
    }

    fn prefixed(name: impl Into<String>, op: ReloadOp) -> Self {
        Self {
            prefixed: true,
            ..Self::new(name, op)
        }
    }

    /// 解析宿主传入的参数：名称 token + 可选操作码 token。
    ///
    /// 名称带 reload 前缀时强制 reload：剩余部分非空 → RELOAD_THEN_EVALUATE，
    /// 为空 → RELOAD_ONLY。剩余部分在新快照里不存在时同样按 RELOAD_ONLY 处理
    /// （宿主用 `enum(__foo)` 这类占位调用只触发 reload）。前缀为空串时不启用该约定。
    pub fn parse(name_token: &str, op_token: Option<&str>, reload_prefix: &str) -> Result<Self> {
        let op = match op_token {
            Some(tok) => tok.parse::<ReloadOp>()?,
            None => ReloadOp::Evaluate,
        };
        Ok(Self::with_prefix(name_token, op, reload_prefix))
    }

    /// 按 reload 前缀约定修正已知操作码
    pub fn with_prefix(name_token: &str, op: ReloadOp, reload_prefix: &str) -> Self {
        if reload_prefix.is_empty() {
            return Self::new(name_token, op);
        }
        match name_token.strip_prefix(reload_prefix) {
            Some("") => Self::prefixed("", ReloadOp::ReloadOnly),
            Some(rest) if op == ReloadOp::ReloadOnly => Self::prefixed(rest, op),
            Some(rest) => Self::prefixed(rest, ReloadOp::ReloadThenEvaluate),
            None => Self::new(name_token, op),
        }
    }
}

/// 函数入口：持有 Store 与数据源，按请求决定是否 reload，并构造求值器。
pub struct EnumRanker {
    store: Arc<EnumerationStore>,
    source: Arc<dyn EnumerationSource>,
    policy: DefaultPolicy,
    absent_mode: AbsentMode,
    reload_prefix: String,
}

impl EnumRanker {
    pub fn new(
        store: Arc<EnumerationStore>,
        source: Arc<dyn EnumerationSource>,
        policy: DefaultPolicy,
    ) -> Self {
        Self {
            store,
            source,
            policy,
            absent_mode: AbsentMode::default(),
            reload_prefix: DEFAULT_RELOAD_PREFIX.to_string(),
        }
    }

    /// 急切加载数据源；失败即启动失败
    pub fn open(source: Arc<dyn EnumerationSource>, policy: DefaultPolicy) -> Result<Self> {
        let store = Arc::new(EnumerationStore::open(source.as_ref())?);
        Ok(Self::new(store, source, policy))
    }

    pub fn with_absent_mode(mut self, absent_mode: AbsentMode) -> Self {
        self.absent_mode = absent_mode;
        self
    }

    pub fn with_reload_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.reload_prefix = prefix.into();
        self
    }

    pub fn store(&self) -> &Arc<EnumerationStore> {
        &self.store
    }

    pub fn policy(&self) -> DefaultPolicy {
        self.policy
    }

    pub fn reload_prefix(&self) -> &str {
        &self.reload_prefix
    }

    pub fn reload(&self) -> Result<Arc<Snapshot>> {
        self.store.reload_from(self.source.as_ref())
    }

    /// 宿主参数 → 求值器
    pub fn parse(&self, name_token: &str, op_token: Option<&str>) -> Result<Evaluator> {
        let req = EvaluationRequest::parse(name_token, op_token, &self.reload_prefix)?;
        self.evaluator(&req)
    }

    pub fn evaluator(&self, req: &EvaluationRequest) -> Result<Evaluator> {
        // reload 时直接使用本次发布的快照，而不是之后再读一次“当前”
        let snap = if req.op.reloads() {
            self.reload()?
        } else {
            self.store.snapshot()
        };

        let noop = || {
            Evaluator::noop(
                CacheKey::reload(snap.generation()),
                self.policy,
                self.absent_mode,
            )
        };

        if req.op == ReloadOp::ReloadOnly {
            return Ok(noop());
        }

        let mapping = match snap.get(&req.name) {
            Some(mapping) => mapping.clone(),
            None if req.prefixed => {
                tracing::debug!(
                    "Prefixed reload for unknown enumeration {}, treating as reload-only",
                    req.name
                );
                return Ok(noop());
            }
            None => {
                return Err(EnumError::UnknownEnumeration {
                    name: req.name.clone(),
                })
            }
        };
        tracing::debug!(
            "Resolved enumeration {} at generation {} ({:?})",
            req.name,
            snap.generation(),
            req.op
        );
        Ok(Evaluator::lookup(
            CacheKey::field(&req.name, snap.generation()),
            mapping,
            self.policy,
            self.absent_mode,
        ))
    }

    pub fn report(&self) -> StoreReport {
        self.store.report().with_source(self.source.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EnumerationMapping, EnumerationSet};
    use crate::query::source::MemoryFieldSource;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// 按队列依次返回预置结果的数据源
    struct ScriptedSource {
        queue: Mutex<VecDeque<Result<EnumerationSet>>>,
    }

    impl ScriptedSource {
        fn new(results: Vec<Result<EnumerationSet>>) -> Arc<Self> {
            Arc::new(Self {
                queue: Mutex::new(results.into()),
            })
        }
    }

    impl EnumerationSource for ScriptedSource {
        fn load(&self) -> Result<EnumerationSet> {
            self.queue
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(EnumError::unavailable("scripted", "exhausted")))
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn medals(gold: i64) -> EnumerationSet {
        let mut set = EnumerationSet::new();
        set.insert(
            "medal",
            EnumerationMapping::from_pairs([("gold", gold), ("silver", 2)]),
        );
        set
    }

    fn ranker(results: Vec<Result<EnumerationSet>>) -> EnumRanker {
        let source = ScriptedSource::new(results);
        EnumRanker::open(source, DefaultPolicy::new(-1, 0)).unwrap()
    }

    #[test]
    fn op_codes_parse() {
        assert_eq!("0".parse::<ReloadOp>().unwrap(), ReloadOp::Evaluate);
        assert_eq!("1".parse::<ReloadOp>().unwrap(), ReloadOp::ReloadThenEvaluate);
        assert_eq!(" 2 ".parse::<ReloadOp>().unwrap(), ReloadOp::ReloadOnly);
        for bad in ["3", "-1", "x", ""] {
            assert!(matches!(
                bad.parse::<ReloadOp>(),
                Err(EnumError::InvalidOperation { .. })
            ));
        }
        assert_eq!(ReloadOp::from_code(ReloadOp::ReloadOnly.code()).unwrap(), ReloadOp::ReloadOnly);
    }

    #[test]
    fn reload_prefix_convention() {
        let r = EvaluationRequest::parse("__medal", None, "__").unwrap();
        assert_eq!(r.name, "medal");
        assert_eq!(r.op, ReloadOp::ReloadThenEvaluate);
        assert!(r.prefixed);

        let r = EvaluationRequest::parse("__", None, "__").unwrap();
        assert_eq!(r.op, ReloadOp::ReloadOnly);

        let r = EvaluationRequest::parse("medal", Some("1"), "__").unwrap();
        assert_eq!(r, EvaluationRequest::new("medal", ReloadOp::ReloadThenEvaluate));

        // 前缀禁用时原样透传
        let r = EvaluationRequest::parse("__medal", None, "").unwrap();
        assert_eq!(r, EvaluationRequest::new("__medal", ReloadOp::Evaluate));
    }

    #[test]
    fn evaluate_twice_is_cache_equal() {
        let ranker = ranker(vec![Ok(medals(3))]);
        let a = ranker.parse("medal", None).unwrap();
        let b = ranker.parse("medal", Some("0")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.description(), b.description());
        assert_eq!(a.value_for(Some("gold")), b.value_for(Some("gold")));
        assert_eq!(ranker.store().generation(), 0);
    }

    #[test]
    fn reload_then_evaluate_uses_new_snapshot() {
        let ranker = ranker(vec![Ok(medals(3)), Ok(medals(30))]);
        let before = ranker.parse("medal", None).unwrap();
        let after = ranker.parse("medal", Some("1")).unwrap();

        assert_eq!(ranker.store().generation(), 1);
        assert_eq!(after.cache_key().generation(), 1);
        assert_ne!(before, after);
        assert_eq!(before.value_for(Some("gold")), 3);
        assert_eq!(after.value_for(Some("gold")), 30);
    }

    #[test]
    fn reload_only_returns_noop() {
        let ranker = ranker(vec![Ok(medals(3)), Ok(medals(3))]);
        let ev = ranker.parse("__", None).unwrap();
        assert!(ev.is_noop());
        assert_eq!(ev.cache_key().generation(), 1);
        assert_eq!(ev.cache_key().enumeration(), None);

        let docs: MemoryFieldSource = vec![Some("gold"), None].into_iter().collect();
        assert_eq!(ev.score_all(&docs, &docs.docs()), vec![-1, -1]);

        // 名称被忽略，即便不存在
        let ranker2 = self::ranker(vec![Ok(medals(3)), Ok(medals(3))]);
        assert!(ranker2.parse("no_such_field", Some("2")).unwrap().is_noop());
    }

    #[test]
    fn unknown_enumeration_is_request_error() {
        let ranker = ranker(vec![Ok(medals(3))]);
        let err = ranker.parse("colour", None).unwrap_err();
        assert!(matches!(err, EnumError::UnknownEnumeration { ref name } if name == "colour"));
        assert!(err.is_request_error());
        assert!(matches!(
            ranker.parse("medal", Some("9")),
            Err(EnumError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn prefixed_unknown_name_degrades_to_reload_only() {
        let ranker = ranker(vec![Ok(medals(3)), Ok(medals(3)), Ok(medals(3))]);
        let ev = ranker.parse("__foo", None).unwrap();
        assert!(ev.is_noop());
        assert_eq!(ev.cache_key().generation(), 1);
        assert_eq!(ev.cache_key().enumeration(), None);
        assert_eq!(ev.value_for(Some("gold")), -1);

        // 显式操作码 1 不享受该退化
        let err = ranker.parse("foo", Some("1")).unwrap_err();
        assert!(matches!(err, EnumError::UnknownEnumeration { ref name } if name == "foo"));
        assert_eq!(ranker.store().generation(), 2);
    }

    #[test]
    fn failed_reload_surfaces_and_keeps_snapshot() {
        let ranker = ranker(vec![
            Ok(medals(3)),
            Err(EnumError::malformed("medal", "missing field `order`")),
        ]);
        let err = ranker.parse("medal", Some("1")).unwrap_err();
        assert!(matches!(err, EnumError::MalformedDefinition { .. }));
        assert!(!err.is_request_error());

        let ev = ranker.parse("medal", None).unwrap();
        assert_eq!(ev.cache_key().generation(), 0);
        assert_eq!(ev.value_for(Some("gold")), 3);
        assert_eq!(ranker.report().reloads_failed, 1);
    }

    #[test]
    fn evaluator_isolated_from_later_reload() {
        let ranker = ranker(vec![Ok(medals(3)), Ok(medals(50))]);
        let held = ranker.parse("medal", None).unwrap();
        let docs: MemoryFieldSource = vec![Some("gold"), Some("silver")].into_iter().collect();

        let reloader = {
            let ranker = Arc::new(ranker);
            let r = ranker.clone();
            (std::thread::spawn(move || r.reload().map(|s| s.generation())), ranker)
        };
        for _ in 0..100 {
            assert_eq!(held.score_all(&docs, &docs.docs()), vec![3, 2]);
        }
        let (handle, ranker) = reloader;
        assert_eq!(handle.join().unwrap().unwrap(), 1);
        assert_eq!(held.score_all(&docs, &docs.docs()), vec![3, 2]);
        assert_eq!(ranker.parse("medal", None).unwrap().value_for(Some("gold")), 50);
    }

    #[test]
    fn absent_mode_reports_missing() {
        let ranker = ranker(vec![Ok(medals(3))]).with_absent_mode(AbsentMode::Report);
        let ev = ranker.parse("medal", None).unwrap();
        assert_eq!(ev.order_for(Some("bronze")), None);
        assert_eq!(ev.value_for(Some("bronze")), 0);
    }
}
