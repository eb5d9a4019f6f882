use crate::{Error, Factory};
use common::Platform;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// 进程级的工厂实例。
///
/// ```ignore
/// static FACTORY: Instance<Hsa> = Instance::new();
/// let factory = FACTORY.get_or_init(|| Factory::new(Hsa::load()?, Config::default()))?;
/// ```
pub struct Instance<P: Platform>(Mutex<Option<Arc<Factory<P>>>>);

impl<P: Platform> Default for Instance<P> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Platform> Instance<P> {
    #[inline]
    pub const fn new() -> Self {
        Self(Mutex::new(None))
    }

    /// 取得实例，不存在时用 `f` 构造。
    ///
    /// 构造在锁内进行，并发的调用者等待同一次构造的结果。构造失败时不保存任何东西。
    pub fn get_or_init(
        &self,
        f: impl FnOnce() -> Result<Factory<P>, Error>,
    ) -> Result<Arc<Factory<P>>, Error> {
        let mut guard = self.lock();
        if let Some(factory) = &*guard {
            return Ok(factory.clone());
        }
        let factory = Arc::new(f()?);
        *guard = Some(factory.clone());
        Ok(factory)
    }

    #[inline]
    pub fn get(&self) -> Option<Arc<Factory<P>>> {
        self.lock().clone()
    }

    /// 放弃持有的实例。最后一个引用释放时工厂析构。
    ///
    /// 返回是否持有过实例。
    pub fn shutdown(&self) -> bool {
        self.lock().take().is_some()
    }

    /// 构造过程中的 panic 不会留下半成品，锁中毒可以忽略。
    #[inline]
    fn lock(&self) -> MutexGuard<'_, Option<Arc<Factory<P>>>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{runtime_init, Config};
    use sim_runtime::SimPlatform;
    use std::{
        sync::atomic::{AtomicUsize, Ordering::SeqCst},
        thread,
    };

    #[test]
    fn test_instance() {
        static INSTANCE: Instance<SimPlatform> = Instance::new();
        static BUILT: AtomicUsize = AtomicUsize::new(0);

        assert!(INSTANCE.get().is_none());
        assert!(INSTANCE
            .get_or_init(|| Err(runtime_init(None, "refused")))
            .is_err());
        assert!(INSTANCE.get().is_none());

        let handles = (0..4)
            .map(|_| {
                thread::spawn(|| {
                    INSTANCE
                        .get_or_init(|| {
                            BUILT.fetch_add(1, SeqCst);
                            Factory::new(
                                SimPlatform::builder().host().accelerator().build(),
                                Config::default(),
                            )
                        })
                        .unwrap()
                })
            })
            .collect::<Vec<_>>();
        let factories = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(BUILT.load(SeqCst), 1);
        assert!(factories.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));

        let held = INSTANCE.get().unwrap();
        assert!(INSTANCE.shutdown());
        assert!(!INSTANCE.shutdown());
        assert!(INSTANCE.get().is_none());
        // 仍被持有的引用可以继续使用
        assert_eq!(held.accelerator_count(), 1);
        assert_eq!(held.platform().init_count(), 1);
    }

    #[test]
    fn test_panicking_init() {
        static INSTANCE: Instance<SimPlatform> = Instance::new();

        let result = thread::spawn(|| {
            INSTANCE.get_or_init(|| {
                Factory::new(
                    SimPlatform::builder().build(),
                    Config {
                        page_size: 3,
                        ..Default::default()
                    },
                )
            })
        })
        .join();
        assert!(result.is_err());

        assert!(INSTANCE.get().is_none());
        assert!(!INSTANCE.shutdown());
        let factory = INSTANCE
            .get_or_init(|| Factory::new(SimPlatform::builder().host().build(), Config::default()))
            .unwrap();
        assert_eq!(factory.host_count(), 1);
        assert!(INSTANCE.shutdown());
    }
}
