use common::{Agent, GlobalFlags, MemPool, Platform, Segment, Status};
use std::ops::ControlFlow;

/// 池的两种挑选口径。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum PoolKind {
    /// 全局段，不带 kernarg 标志。
    Standard,
    /// 全局段，带 kernarg 标志。
    Kernarg,
}

impl PoolKind {
    #[inline]
    fn accepts(self, flags: GlobalFlags) -> bool {
        flags.contains(GlobalFlags::KERNARG_INIT) == (self == Self::Kernarg)
    }
}

/// 找到代理上第一个满足 `kind` 的池。
///
/// 没有匹配的池返回 `Ok(None)`；属性查询失败则中止并返回错误。
pub(crate) fn find_pool<P: Platform>(
    platform: &P,
    agent: Agent,
    kind: PoolKind,
) -> Result<Option<MemPool>, Status> {
    let mut found = None;
    let flow = platform.iterate_memory_pools(agent, &mut |pool| {
        if platform.pool_segment(pool)? != Segment::Global {
            return Ok(ControlFlow::Continue(()));
        }
        if kind.accepts(platform.pool_global_flags(pool)?) {
            found = Some(pool);
            Ok(ControlFlow::Break(()))
        } else {
            Ok(ControlFlow::Continue(()))
        }
    })?;
    Ok(match flow {
        ControlFlow::Break(()) => found,
        ControlFlow::Continue(()) => None,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use sim_runtime::{Fault, SimHost, SimPlatform};

    #[test]
    fn test_host_pools() {
        let sim = SimPlatform::builder().host().build();
        let host = sim.agents()[0];

        let standard = find_pool(&sim, host, PoolKind::Standard).unwrap().unwrap();
        let kernarg = find_pool(&sim, host, PoolKind::Kernarg).unwrap().unwrap();
        assert_ne!(standard, kernarg);
        assert!(!sim
            .pool_global_flags(standard)
            .unwrap()
            .contains(GlobalFlags::KERNARG_INIT));
        assert!(sim
            .pool_global_flags(kernarg)
            .unwrap()
            .contains(GlobalFlags::KERNARG_INIT));
    }

    #[test]
    fn test_skip_group_segment() {
        let sim = SimPlatform::builder().accelerator().build();
        let gpu = sim.agents()[0];

        let local = find_pool(&sim, gpu, PoolKind::Standard).unwrap().unwrap();
        assert_eq!(sim.pool_segment(local), Ok(Segment::Global));
        assert_eq!(find_pool(&sim, gpu, PoolKind::Kernarg), Ok(None));
    }

    #[test]
    fn test_no_match() {
        let sim = SimPlatform::builder()
            .host_with(SimHost {
                system_pool: false,
                kernarg_pool: true,
            })
            .build();
        let host = sim.agents()[0];
        assert_eq!(find_pool(&sim, host, PoolKind::Standard), Ok(None));
        assert!(find_pool(&sim, host, PoolKind::Kernarg).unwrap().is_some());
    }

    #[test]
    fn test_query_error() {
        let sim = SimPlatform::builder().host().fail(Fault::PoolInfo).build();
        let host = sim.agents()[0];
        assert_eq!(
            find_pool(&sim, host, PoolKind::Standard),
            Err(Status::ERROR)
        );
    }
}
