//! 异构计算平台的资源工厂。
//!
//! 构造时发现平台上的全部代理并挑选各自的存储池，
//! 之后提供分配、代码对象加载、命令提交和同步拷贝。

#![deny(warnings)]

mod agent;
mod alloc;
mod copy;
mod discovery;
mod error;
mod instance;
mod loader;
mod pool;
mod queue;
mod submit;

pub use agent::{AcceleratorProps, AgentClass, AgentInfo};
pub use common::{
    align_up, header, Agent, Dispatch, Executable, FenceScope, KernelDescriptor, Packet,
    PacketType, Platform, Ring, Signal, Status, Symbol,
};
pub use error::{functions::*, Error, ErrorKind};
pub use instance::Instance;
pub use submit::submit;

use agent::Catalog;
use log::{info, warn};

/// 工厂的配置。
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// 构造时初始化运行时，析构时关闭运行时。
    pub initialize_runtime: bool,
    /// 分配的粒度，必须是 2 的幂。
    pub page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initialize_runtime: true,
            page_size: 0x1000,
        }
    }
}

/// 资源工厂。
///
/// 目录在构造时建立，此后只读，可以在线程间共享。
pub struct Factory<P: Platform> {
    platform: P,
    config: Config,
    catalog: Catalog,
}

impl<P: Platform> Factory<P> {
    pub fn new(platform: P, config: Config) -> Result<Self, Error> {
        assert!(
            config.page_size.is_power_of_two(),
            "page size {:#x} is not a power of two",
            config.page_size
        );
        if config.initialize_runtime {
            platform.init().map_err(|s| runtime_init(s, "init runtime"))?;
            info!("runtime initialized");
        }
        // 构造失败时由析构函数关闭运行时
        let mut factory = Self {
            platform,
            config,
            catalog: Catalog::default(),
        };
        factory.catalog = discovery::discover(&factory.platform)?;
        info!(
            "{} host agent(s), {} accelerator agent(s)",
            factory.catalog.host_count(),
            factory.catalog.accelerator_count()
        );
        Ok(factory)
    }

    #[inline]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn accelerator_count(&self) -> usize {
        self.catalog.accelerator_count()
    }

    #[inline]
    pub fn host_count(&self) -> usize {
        self.catalog.host_count()
    }

    #[inline]
    pub fn accelerator(&self, index: usize) -> Option<&AgentInfo> {
        self.catalog.accelerator(index)
    }

    #[inline]
    pub fn host(&self, index: usize) -> Option<&AgentInfo> {
        self.catalog.host(index)
    }

    /// 按句柄查找代理记录。
    #[inline]
    pub fn agent_info(&self, agent: Agent) -> Option<&AgentInfo> {
        self.catalog.get(agent)
    }

    pub fn host_agents(&self) -> impl Iterator<Item = Agent> + '_ {
        self.catalog.hosts().map(|info| info.agent)
    }

    /// 在 info 级别输出所有加速器的属性。
    pub fn log_accelerators(&self, header: &str) {
        info!("{header} :");
        for info in self.catalog.accelerators() {
            for line in info.to_string().lines() {
                info!("{line}")
            }
        }
    }
}

impl<P: Platform> Drop for Factory<P> {
    fn drop(&mut self) {
        if self.config.initialize_runtime {
            match self.platform.shut_down() {
                Ok(()) => info!("runtime shut down"),
                Err(s) => warn!("shut down runtime failed: {}", self.platform.status_string(s)),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use sim_runtime::{Fault, SimPlatform};

    #[test]
    fn test_lifecycle() {
        let sim = SimPlatform::builder().host().accelerator().build();
        let f = Factory::new(sim, Config::default()).unwrap();
        assert_eq!(f.platform().init_count(), 1);
        assert_eq!(f.host_count(), 1);
        assert_eq!(f.accelerator_count(), 1);

        let gpu = f.accelerator(0).unwrap();
        assert_eq!(f.agent_info(gpu.agent), Some(gpu));
        assert!(f.accelerator(1).is_none());
        assert!(f.host(1).is_none());
        assert_eq!(
            f.host_agents().collect::<Vec<_>>(),
            [f.host(0).unwrap().agent]
        );
        f.log_accelerators("accelerators");
    }

    #[test]
    fn test_external_runtime() {
        let sim = SimPlatform::builder().accelerator().build();
        let f = Factory::new(
            sim,
            Config {
                initialize_runtime: false,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(f.platform().init_count(), 0);
        // 不初始化也不关闭
        drop(f);
    }

    #[test]
    fn test_discovery_failure() {
        let sim = SimPlatform::builder()
            .host()
            .fail(Fault::IterateAgents)
            .build();
        let e = Factory::new(sim, Config::default()).err().unwrap();
        assert_eq!(e.kind, ErrorKind::AgentDiscovery);
    }

    #[test]
    fn test_scenario() {
        use std::{sync::mpsc, thread, time::Duration};

        let f = Factory::new(
            SimPlatform::builder().host().accelerator().build(),
            Config::default(),
        )
        .unwrap();
        let gpu = f.accelerator(0).unwrap();

        let kernarg = f.allocate_kernarg(gpu, 1).unwrap();
        assert_eq!(kernarg.as_ptr() as usize % 4096, 0);

        let queue = f.create_queue(gpu, 8).unwrap();
        let packet = Packet::dispatch(&Dispatch {
            header: header(
                PacketType::KernelDispatch,
                true,
                FenceScope::System,
                FenceScope::System,
            ),
            workgroup: [64, 1, 1],
            grid: [64, 1, 1],
            private_segment_size: 0,
            group_segment_size: 0,
            kernel_object: 0x100,
            kernarg_address: kernarg.as_ptr() as _,
            completion_signal: None,
        });
        for i in 0..8 {
            assert_eq!(f.submit(&queue, &packet), i);
        }

        let (tx, rx) = mpsc::channel();
        let (fr, qr, pr) = (&f, &queue, &packet);
        thread::scope(|s| {
            s.spawn(move || tx.send(fr.submit(qr, pr)).unwrap());
            thread::sleep(Duration::from_millis(50));
            assert!(rx.try_recv().is_err());
            queue.set_read_index(1);
            assert_eq!(rx.recv_timeout(Duration::from_secs(10)), Ok(8));
        });
        assert!(f.destroy_queue(queue));
    }
}
