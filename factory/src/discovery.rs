use crate::{
    agent::{AcceleratorProps, AgentClass, AgentInfo, Catalog},
    pool::{find_pool, PoolKind},
    Error,
};
use common::{Agent, AgentAttr, DeviceType, MemPool, Platform, Profile};
use log::{info, warn};
use std::ops::ControlFlow;

/// 枚举平台上的全部代理并建立目录。
pub(crate) fn discover<P: Platform>(platform: &P) -> Result<Catalog, Error> {
    let mut agents = Vec::new();
    let _flow = platform
        .iterate_agents(&mut |agent| {
            agents.push(agent);
            Ok(ControlFlow::Continue(()))
        })
        .map_err(|s| crate::agent_discovery(s, "iterate agents"))?;

    let mut catalog = Catalog::default();
    for agent in agents {
        let device = platform
            .agent_device(agent)
            .map_err(|s| crate::agent_discovery(s, format!("device type of agent {:#x}", agent.0)))?;
        let info = match device {
            DeviceType::Cpu => {
                let mut info = AgentInfo::host(agent, catalog.next_index(AgentClass::Host));
                info.system_pool = pool(platform, agent, PoolKind::Standard, "system")?;
                info.kernarg_pool = pool(platform, agent, PoolKind::Kernarg, "kernarg")?;
                info
            }
            DeviceType::Gpu => {
                let props = accelerator_props(platform, agent);
                let index = catalog.next_index(AgentClass::Accelerator);
                let mut info = AgentInfo::accelerator(agent, index, props);
                info.local_pool = pool(platform, agent, PoolKind::Standard, "local")?;
                info
            }
            DeviceType::Dsp => {
                warn!("agent {:#x} is neither host nor accelerator, skipped", agent.0);
                continue;
            }
        };
        info!(
            "discovered {:?}[{}] {:#x}",
            info.class, info.index, info.agent.0
        );
        catalog.push(info)
    }
    Ok(catalog)
}

fn pool<P: Platform>(
    platform: &P,
    agent: Agent,
    kind: PoolKind,
    label: &str,
) -> Result<Option<MemPool>, Error> {
    match find_pool(platform, agent, kind) {
        Ok(Some(pool)) => Ok(Some(pool)),
        Ok(None) => {
            warn!("no {label} pool on agent {:#x}", agent.0);
            Ok(None)
        }
        Err(s) => Err(crate::agent_discovery(
            s,
            format!("iterate memory pools ({label} pool) of agent {:#x}", agent.0),
        )),
    }
}

fn accelerator_props<P: Platform>(platform: &P, agent: Agent) -> AcceleratorProps {
    let attr = |attr: AgentAttr| {
        platform.agent_attr(agent, attr).unwrap_or_else(|s| {
            warn!("query {attr:?} of agent {:#x} failed: {s}", agent.0);
            0
        })
    };
    let name = platform.agent_name(agent).unwrap_or_else(|s| {
        warn!("query name of agent {:#x} failed: {s}", agent.0);
        String::new()
    });
    let profile = platform.agent_profile(agent).unwrap_or_else(|s| {
        warn!("query profile of agent {:#x} failed: {s}", agent.0);
        Profile::Base
    });
    AcceleratorProps {
        gfxip: name.chars().take(4).collect(),
        name,
        wavefront_size: attr(AgentAttr::WavefrontSize),
        queue_max_size: attr(AgentAttr::QueueMaxSize),
        profile,
        compute_units: attr(AgentAttr::ComputeUnitCount),
        waves_per_cu: attr(AgentAttr::MaxWavesPerCu),
        simds_per_cu: attr(AgentAttr::SimdsPerCu),
        shader_engines: attr(AgentAttr::ShaderEngines),
        arrays_per_engine: attr(AgentAttr::ShaderArraysPerEngine),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ErrorKind;
    use common::Status;
    use sim_runtime::{Fault, SimAccelerator, SimHost, SimPlatform};

    #[test]
    fn test_classify() {
        let sim = SimPlatform::builder()
            .host()
            .accelerator()
            .dsp()
            .accelerator_with(SimAccelerator {
                name: "gfx1100".into(),
                profile: Profile::Full,
                ..Default::default()
            })
            .build();
        let catalog = discover(&sim).unwrap();

        assert_eq!(catalog.host_count(), 1);
        assert_eq!(catalog.accelerator_count(), 2);
        for info in catalog.hosts() {
            assert!(info.system_pool.is_some());
            assert!(info.kernarg_pool.is_some());
            assert!(info.local_pool.is_none());
            assert!(info.props.is_none());
        }
        for info in catalog.accelerators() {
            assert!(info.local_pool.is_some());
            assert!(info.system_pool.is_none());
            assert!(info.kernarg_pool.is_none());
        }

        let second = catalog.accelerator(1).unwrap();
        assert_eq!(second.index, 1);
        assert!(second.is_apu());
        let props = second.props.as_ref().unwrap();
        assert_eq!(props.name, "gfx1100");
        assert_eq!(props.gfxip, "gfx1");
        assert_eq!(props.compute_units, 60);

        let dsp = sim.agents()[2];
        assert!(catalog.get(dsp).is_none());
    }

    #[test]
    fn test_missing_pool_is_not_fatal() {
        let sim = SimPlatform::builder()
            .host_with(SimHost {
                system_pool: true,
                kernarg_pool: false,
            })
            .build();
        let catalog = discover(&sim).unwrap();
        let host = catalog.host(0).unwrap();
        assert!(host.system_pool.is_some());
        assert!(host.kernarg_pool.is_none());
    }

    #[test]
    fn test_enumeration_failure() {
        let sim = SimPlatform::builder()
            .host()
            .fail(Fault::IterateAgents)
            .build();
        let e = discover(&sim).unwrap_err();
        assert_eq!(e.kind, ErrorKind::AgentDiscovery);
        assert_eq!(e.status, Some(Status::ERROR));
    }

    #[test]
    fn test_pool_query_failure() {
        let sim = SimPlatform::builder()
            .accelerator()
            .fail(Fault::PoolInfo)
            .build();
        let e = discover(&sim).unwrap_err();
        assert_eq!(e.kind, ErrorKind::AgentDiscovery);
        assert!(e.info.contains("local pool"));
    }
}
