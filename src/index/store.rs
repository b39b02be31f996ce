use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::core::{EnumerationMapping, EnumerationSet};
use crate::error::Result;
use crate::stats::StoreReport;
use crate::storage::EnumerationSource;

/// 一次发布的不可变视图：枚举集合 + 代数（generation）
///
/// 二者位于同一个 Arc 内，读方拿到的永远是同一次发布的一对值。
#[derive(Debug, Default)]
pub struct Snapshot {
    enumerations: EnumerationSet,
    generation: u64,
}

impl Snapshot {
    pub fn enumerations(&self) -> &EnumerationSet {
        &self.enumerations
    }

    /// 已完成的 reload 次数（初始加载为 0）
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, name: &str) -> Option<&Arc<EnumerationMapping>> {
        self.enumerations.get(name)
    }
}

/// 枚举存储：唯一的写方。
///
/// - 读：`snapshot()` 为一次 ArcSwap load，无锁，不会等待 reload 的 I/O。
/// - 写：`replace` / `reload_from` 串行化在 `reload_gate` 上，读方从不触碰该锁。
/// - 旧快照在最后一个持有者（在途求值器）释放后自然回收。
pub struct EnumerationStore {
    current: ArcSwap<Snapshot>,
    reload_gate: Mutex<()>,
    reloads_ok: AtomicU64,
    reloads_failed: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl EnumerationStore {
    pub fn new(initial: EnumerationSet) -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot {
                enumerations: initial,
                generation: 0,
            }),
            reload_gate: Mutex::new(()),
            reloads_ok: AtomicU64::new(0),
            reloads_failed: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    /// 启动时的急切加载；失败直接返回（不回退为空表）
    pub fn open(source: &dyn EnumerationSource) -> Result<Self> {
        let set = source.load()?;
        tracing::info!(
            "Loaded {} enumerations ({} values) from {}",
            set.len(),
            set.total_entries(),
            source.describe()
        );
        Ok(Self::new(set))
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }

    /// 原子替换整张表，generation 恰好 +1
    pub fn replace(&self, set: EnumerationSet) -> Arc<Snapshot> {
        let _gate = self.reload_gate.lock();
        self.install(set)
    }

    /// 从数据源构建新表并发布。
    ///
    /// 构建在发布之前完成；失败时当前快照与 generation 均不变，错误原样返回。
    pub fn reload_from(&self, source: &dyn EnumerationSource) -> Result<Arc<Snapshot>> {
        let _gate = self.reload_gate.lock();
        match source.load() {
            Ok(set) => {
                let snap = self.install(set);
                tracing::info!(
                    "Enumerations reloaded from {}: {} enumerations, generation={}",
                    source.describe(),
                    snap.enumerations.len(),
                    snap.generation
                );
                Ok(snap)
            }
            Err(e) => {
                self.reloads_failed.fetch_add(1, Ordering::Relaxed);
                *self.last_error.lock() = Some(e.to_string());
                tracing::warn!(
                    "Enumeration reload failed, keeping generation {}: {}",
                    self.generation(),
                    e
                );
                Err(e)
            }
        }
    }

    // 调用方必须持有 reload_gate
    fn install(&self, set: EnumerationSet) -> Arc<Snapshot> {
        let generation = self.current.load().generation + 1;
        let next = Arc::new(Snapshot {
            enumerations: set,
            generation,
        });
        self.current.store(next.clone());
        self.reloads_ok.fetch_add(1, Ordering::Relaxed);
        next
    }

    pub fn report(&self) -> StoreReport {
        let snap = self.snapshot();
        StoreReport {
            source: String::new(),
            generation: snap.generation,
            enumeration_count: snap.enumerations.len(),
            total_values: snap.enumerations.total_entries(),
            reloads_ok: self.reloads_ok.load(Ordering::Relaxed),
            reloads_failed: self.reloads_failed.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EnumError;

    fn set_of(name: &str, pairs: &[(&str, i64)]) -> EnumerationSet {
        let mut set = EnumerationSet::new();
        set.insert(name, EnumerationMapping::from_pairs(pairs.iter().copied()));
        set
    }

    struct FailingSource;

    impl EnumerationSource for FailingSource {
        fn load(&self) -> Result<EnumerationSet> {
            Err(EnumError::malformed("failing", "missing field `order`"))
        }

        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    struct FixedSource(Vec<(&'static str, i64)>);

    impl EnumerationSource for FixedSource {
        fn load(&self) -> Result<EnumerationSet> {
            Ok(set_of("medal", &self.0))
        }

        fn describe(&self) -> String {
            "fixed".to_string()
        }
    }

    #[test]
    fn replace_bumps_generation_by_one() {
        let store = EnumerationStore::new(set_of("medal", &[("gold", 3)]));
        assert_eq!(store.generation(), 0);

        let snap = store.replace(set_of("medal", &[("gold", 30)]));
        assert_eq!(snap.generation(), 1);
        assert_eq!(store.generation(), 1);
        assert_eq!(store.snapshot().get("medal").unwrap().get("gold"), Some(30));
    }

    #[test]
    fn old_snapshot_survives_replace() {
        let store = EnumerationStore::new(set_of("medal", &[("gold", 3)]));
        let before = store.snapshot();
        store.replace(set_of("medal", &[("gold", 99), ("tin", 0)]));

        assert_eq!(before.generation(), 0);
        assert_eq!(before.get("medal").unwrap().get("gold"), Some(3));
        assert_eq!(before.get("medal").unwrap().get("tin"), None);
    }

    #[test]
    fn failed_reload_keeps_previous_snapshot() {
        let store = EnumerationStore::new(set_of("medal", &[("gold", 3)]));
        let err = store.reload_from(&FailingSource).unwrap_err();
        assert!(matches!(err, EnumError::MalformedDefinition { .. }));

        let snap = store.snapshot();
        assert_eq!(snap.generation(), 0);
        assert_eq!(snap.get("medal").unwrap().get("gold"), Some(3));

        let report = store.report();
        assert_eq!(report.reloads_failed, 1);
        assert_eq!(report.reloads_ok, 0);
        assert!(report.last_error.unwrap().contains("order"));
    }

    #[test]
    fn open_fails_on_bad_source() {
        assert!(EnumerationStore::open(&FailingSource).is_err());
        let store = EnumerationStore::open(&FixedSource(vec![("gold", 1)])).unwrap();
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn concurrent_reads_see_consistent_pairs() {
        let store = Arc::new(EnumerationStore::new(set_of("medal", &[("gold", 0)])));
        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 1..=200i64 {
                    store.replace(set_of("medal", &[("gold", i)]));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..2000 {
                        let snap = store.snapshot();
                        // 每次发布中 gold 的 order 与 generation 相同
                        let gold = snap.get("medal").unwrap().get("gold").unwrap();
                        assert_eq!(gold as u64, snap.generation());
                    }
                })
            })
            .collect();
        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(store.generation(), 200);
    }
}
