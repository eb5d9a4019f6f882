use crate::{AgentInfo, Factory};
use common::{align_up, Agent, MemPool, Platform};
use log::{debug, warn};
use std::ptr::NonNull;

impl<P: Platform> Factory<P> {
    /// 把 `size` 向上取整到页大小的倍数，溢出时返回 `None`。
    #[inline]
    pub fn round_up(&self, size: usize) -> Option<usize> {
        align_up(size, self.config.page_size)
    }

    /// 从加速器的本地池分配，只有该加速器可以访问。
    pub fn allocate_local(&self, agent: &AgentInfo, size: usize) -> Option<NonNull<u8>> {
        let Some(pool) = agent.local_pool else {
            warn!("agent {:#x} has no local pool", agent.agent.0);
            return None;
        };
        self.allocate(pool, size, &[agent.agent], "local")
    }

    /// 分配内核参数缓冲区，所有主机代理和 `agent` 都可以访问。
    pub fn allocate_kernarg(&self, agent: &AgentInfo, size: usize) -> Option<NonNull<u8>> {
        let pool = self.catalog.host(0).and_then(|host| host.kernarg_pool);
        self.allocate_shared(pool, agent, size, "kernarg")
    }

    /// 分配主机系统存储，所有主机代理和 `agent` 都可以访问。
    pub fn allocate_system(&self, agent: &AgentInfo, size: usize) -> Option<NonNull<u8>> {
        let pool = self.catalog.host(0).and_then(|host| host.system_pool);
        self.allocate_shared(pool, agent, size, "system")
    }

    /// 释放由本工厂分配的存储。
    pub fn free(&self, ptr: NonNull<u8>) -> bool {
        match self.platform.pool_free(ptr) {
            Ok(()) => true,
            Err(s) => {
                warn!("free {ptr:p} failed: {}", self.platform.status_string(s));
                false
            }
        }
    }

    fn allocate_shared(
        &self,
        pool: Option<MemPool>,
        agent: &AgentInfo,
        size: usize,
        label: &str,
    ) -> Option<NonNull<u8>> {
        let Some(pool) = pool else {
            warn!("no host {label} pool, nothing allocated");
            return None;
        };
        let access = self
            .catalog
            .hosts()
            .map(|host| host.agent)
            .chain([agent.agent])
            .collect::<Vec<Agent>>();
        self.allocate(pool, size, &access, label)
    }

    fn allocate(
        &self,
        pool: MemPool,
        size: usize,
        access: &[Agent],
        label: &str,
    ) -> Option<NonNull<u8>> {
        let Some(size) = self.round_up(size) else {
            warn!("{label} memory of {size} bytes overflows page rounding");
            return None;
        };
        let ptr = match self.platform.pool_allocate(pool, size) {
            Ok(ptr) => ptr,
            Err(s) => {
                warn!(
                    "allocate {size} bytes of {label} memory failed: {}",
                    self.platform.status_string(s)
                );
                return None;
            }
        };
        if let Err(s) = self.platform.allow_access(access, ptr) {
            warn!(
                "allow access to {label} memory {ptr:p} failed: {}",
                self.platform.status_string(s)
            );
            if let Err(s) = self.platform.pool_free(ptr) {
                warn!("free {ptr:p} failed: {}", self.platform.status_string(s));
            }
            return None;
        }
        debug!("allocated {size} bytes of {label} memory at {ptr:p}");
        Some(ptr)
    }
}

#[cfg(test)]
mod test {
    use crate::{Config, Factory};
    use rand::Rng;
    use sim_runtime::{Fault, SimHost, SimPlatform};

    fn factory(sim: SimPlatform) -> Factory<SimPlatform> {
        Factory::new(sim, Config::default()).unwrap()
    }

    #[test]
    fn test_round_up() {
        let factory = factory(SimPlatform::builder().build());
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let n = rng.gen_range(0..1 << 40);
            let rounded = factory.round_up(n).unwrap();
            assert!(rounded >= n);
            assert_eq!(rounded % 4096, 0);
            assert!(rounded - n < 4096);
            assert_eq!(factory.round_up(rounded), Some(rounded));
        }
        assert_eq!(factory.round_up(usize::MAX - 10), None);
        assert_eq!(factory.config().page_size, 4096);
    }

    #[test]
    fn test_huge_size() {
        let f = factory(SimPlatform::builder().host().accelerator().build());
        let gpu = f.accelerator(0).unwrap();
        assert!(f.allocate_local(gpu, usize::MAX - 10).is_none());
        assert!(f.allocate_kernarg(gpu, usize::MAX - 10).is_none());
        assert!(f.allocate_system(gpu, usize::MAX - 10).is_none());
        assert_eq!(f.platform().live_allocations(), 0);
    }

    #[test]
    fn test_kernarg_one_byte() {
        let f = factory(SimPlatform::builder().host().accelerator().build());
        let gpu = f.accelerator(0).unwrap();
        let host = f.host(0).unwrap();

        let ptr = f.allocate_kernarg(gpu, 1).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 4096, 0);
        let sim = f.platform();
        assert_eq!(sim.allocation_size(ptr), Some(4096));
        assert_eq!(sim.pool_of(ptr), host.kernarg_pool);
        assert_eq!(sim.access_of(ptr), Some(vec![host.agent, gpu.agent]));
        assert!(f.free(ptr));
        assert!(!f.free(ptr));
    }

    #[test]
    fn test_access() {
        let f = factory(
            SimPlatform::builder()
                .host()
                .accelerator()
                .host()
                .accelerator()
                .build(),
        );
        let gpu = f.accelerator(1).unwrap();
        let hosts = [f.host(0).unwrap().agent, f.host(1).unwrap().agent];

        let local = f.allocate_local(gpu, 5000).unwrap();
        let system = f.allocate_system(gpu, 5000).unwrap();
        let sim = f.platform();
        assert_eq!(sim.allocation_size(local), Some(8192));
        assert_eq!(sim.pool_of(local), gpu.local_pool);
        assert_eq!(sim.access_of(local), Some(vec![gpu.agent]));
        assert_eq!(sim.pool_of(system), f.host(0).unwrap().system_pool);
        assert_eq!(
            sim.access_of(system),
            Some(vec![hosts[0], hosts[1], gpu.agent])
        );
    }

    #[test]
    fn test_no_host() {
        let f = factory(SimPlatform::builder().accelerator().build());
        let gpu = f.accelerator(0).unwrap();
        assert_eq!(f.host_count(), 0);
        assert!(f.allocate_kernarg(gpu, 64).is_none());
        assert!(f.allocate_system(gpu, 64).is_none());
        assert!(f.allocate_local(gpu, 64).is_some());
    }

    #[test]
    fn test_wrong_class() {
        let f = factory(SimPlatform::builder().host().accelerator().build());
        let host = f.host(0).unwrap();
        assert!(f.allocate_local(host, 64).is_none());
    }

    #[test]
    fn test_missing_host_pool() {
        let f = factory(
            SimPlatform::builder()
                .host_with(SimHost {
                    system_pool: true,
                    kernarg_pool: false,
                })
                .accelerator()
                .build(),
        );
        let gpu = f.accelerator(0).unwrap();
        assert!(f.allocate_kernarg(gpu, 64).is_none());
        assert!(f.allocate_system(gpu, 64).is_some());
    }

    #[test]
    fn test_failures() {
        let f = factory(
            SimPlatform::builder()
                .host()
                .accelerator()
                .fail(Fault::PoolAllocate)
                .build(),
        );
        let gpu = f.accelerator(0).unwrap();
        assert!(f.allocate_local(gpu, 64).is_none());
        assert!(f.allocate_kernarg(gpu, 64).is_none());

        let f = factory(
            SimPlatform::builder()
                .host()
                .accelerator()
                .fail(Fault::AllowAccess)
                .build(),
        );
        let gpu = f.accelerator(0).unwrap();
        assert!(f.allocate_system(gpu, 64).is_none());
        // 授权失败的分配已归还
        assert_eq!(f.platform().live_allocations(), 0);

        let f = factory(
            SimPlatform::builder()
                .host()
                .accelerator()
                .fail(Fault::AllowAccess)
                .fail(Fault::PoolFree)
                .build(),
        );
        let gpu = f.accelerator(0).unwrap();
        assert!(f.allocate_local(gpu, 64).is_none());
        // 归还也失败时只留下告警
        assert_eq!(f.platform().live_allocations(), 1);
    }
}
