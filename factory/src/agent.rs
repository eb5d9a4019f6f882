use common::{Agent, MemPool, Profile};
use std::{collections::HashMap, fmt};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AgentClass {
    Host,
    Accelerator,
}

/// 加速器的查询属性。查询失败的属性记为 0。
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AcceleratorProps {
    pub name: String,
    /// 名字的前 4 个字符，即架构标识。
    pub gfxip: String,
    pub wavefront_size: u32,
    pub queue_max_size: u32,
    pub profile: Profile,
    pub compute_units: u32,
    pub waves_per_cu: u32,
    pub simds_per_cu: u32,
    pub shader_engines: u32,
    pub arrays_per_engine: u32,
}

/// 一个计算代理及其存储池。
///
/// 主机代理持有 `system_pool` 和 `kernarg_pool`，加速器代理持有 `local_pool` 和 `props`。
/// 池字段为 `None` 表示代理上没有满足条件的池。
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AgentInfo {
    pub agent: Agent,
    pub class: AgentClass,
    /// 类别内从 0 开始的序号。
    pub index: usize,
    pub props: Option<AcceleratorProps>,
    pub local_pool: Option<MemPool>,
    pub kernarg_pool: Option<MemPool>,
    pub system_pool: Option<MemPool>,
}

impl AgentInfo {
    pub(crate) fn host(agent: Agent, index: usize) -> Self {
        Self {
            agent,
            class: AgentClass::Host,
            index,
            props: None,
            local_pool: None,
            kernarg_pool: None,
            system_pool: None,
        }
    }

    pub(crate) fn accelerator(agent: Agent, index: usize, props: AcceleratorProps) -> Self {
        Self {
            agent,
            class: AgentClass::Accelerator,
            index,
            props: Some(props),
            local_pool: None,
            kernarg_pool: None,
            system_pool: None,
        }
    }

    #[inline]
    pub fn is_host(&self) -> bool {
        self.class == AgentClass::Host
    }

    #[inline]
    pub fn is_accelerator(&self) -> bool {
        self.class == AgentClass::Accelerator
    }

    /// 完整档次的加速器与主机共享存储。
    #[inline]
    pub fn is_apu(&self) -> bool {
        self.props
            .as_ref()
            .is_some_and(|p| p.profile == Profile::Full)
    }
}

impl fmt::Display for AgentInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Some(props) = &self.props else {
            return writeln!(f, "> host[{}] : {:#x}", self.index, self.agent.0);
        };
        let profile = match props.profile {
            Profile::Base => "base",
            Profile::Full => "full",
        };
        writeln!(f, "> agent[{}] :", self.index)?;
        writeln!(f, ">> Name : {}", props.name)?;
        writeln!(f, ">> APU : {}", self.is_apu())?;
        writeln!(f, ">> HSAIL profile : {profile}")?;
        writeln!(f, ">> Max Wave Size : {}", props.wavefront_size)?;
        writeln!(f, ">> Max Queue Size : {}", props.queue_max_size)?;
        writeln!(f, ">> CU number : {}", props.compute_units)?;
        writeln!(f, ">> Waves per CU : {}", props.waves_per_cu)?;
        writeln!(f, ">> SIMDs per CU : {}", props.simds_per_cu)?;
        writeln!(f, ">> SE number : {}", props.shader_engines)?;
        writeln!(f, ">> Shader Arrays per SE : {}", props.arrays_per_engine)
    }
}

/// 代理记录的仓库。
///
/// 记录按发现顺序存放在 `records` 中，两个类别序列和句柄索引都只保存位置。
#[derive(Default, Debug)]
pub(crate) struct Catalog {
    records: Vec<AgentInfo>,
    hosts: Vec<usize>,
    accelerators: Vec<usize>,
    index: HashMap<Agent, usize>,
}

impl Catalog {
    pub fn push(&mut self, info: AgentInfo) {
        let pos = self.records.len();
        match info.class {
            AgentClass::Host => self.hosts.push(pos),
            AgentClass::Accelerator => self.accelerators.push(pos),
        }
        self.index.insert(info.agent, pos);
        self.records.push(info)
    }

    /// 下一个记录在类别内的序号。
    #[inline]
    pub fn next_index(&self, class: AgentClass) -> usize {
        match class {
            AgentClass::Host => self.hosts.len(),
            AgentClass::Accelerator => self.accelerators.len(),
        }
    }

    #[inline]
    pub fn hosts(&self) -> impl Iterator<Item = &AgentInfo> + '_ {
        self.hosts.iter().map(|&i| &self.records[i])
    }

    #[inline]
    pub fn accelerators(&self) -> impl Iterator<Item = &AgentInfo> + '_ {
        self.accelerators.iter().map(|&i| &self.records[i])
    }

    #[inline]
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    #[inline]
    pub fn accelerator_count(&self) -> usize {
        self.accelerators.len()
    }

    #[inline]
    pub fn host(&self, index: usize) -> Option<&AgentInfo> {
        self.hosts.get(index).map(|&i| &self.records[i])
    }

    #[inline]
    pub fn accelerator(&self, index: usize) -> Option<&AgentInfo> {
        self.accelerators.get(index).map(|&i| &self.records[i])
    }

    #[inline]
    pub fn get(&self, agent: Agent) -> Option<&AgentInfo> {
        self.index.get(&agent).map(|&i| &self.records[i])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn props(profile: Profile) -> AcceleratorProps {
        AcceleratorProps {
            name: "gfx90a".into(),
            gfxip: "gfx9".into(),
            wavefront_size: 64,
            queue_max_size: 131072,
            profile,
            compute_units: 104,
            waves_per_cu: 32,
            simds_per_cu: 4,
            shader_engines: 8,
            arrays_per_engine: 1,
        }
    }

    #[test]
    fn test_catalog() {
        let mut catalog = Catalog::default();
        for (handle, class) in [
            (10, AgentClass::Host),
            (20, AgentClass::Accelerator),
            (30, AgentClass::Accelerator),
            (40, AgentClass::Host),
        ] {
            let index = catalog.next_index(class);
            catalog.push(match class {
                AgentClass::Host => AgentInfo::host(Agent(handle), index),
                AgentClass::Accelerator => {
                    AgentInfo::accelerator(Agent(handle), index, props(Profile::Base))
                }
            });
        }

        assert_eq!(catalog.host_count(), 2);
        assert_eq!(catalog.accelerator_count(), 2);
        assert_eq!(catalog.host(1).unwrap().agent, Agent(40));
        assert_eq!(catalog.accelerator(1).unwrap().agent, Agent(30));
        assert_eq!(catalog.accelerator(1).unwrap().index, 1);
        assert!(catalog.accelerator(2).is_none());
        assert_eq!(catalog.get(Agent(20)).unwrap().class, AgentClass::Accelerator);
        assert!(catalog.get(Agent(50)).is_none());
        assert_eq!(
            catalog.hosts().map(|a| a.agent).collect::<Vec<_>>(),
            [Agent(10), Agent(40)]
        );
    }

    #[test]
    fn test_apu() {
        let host = AgentInfo::host(Agent(1), 0);
        assert!(host.is_host());
        assert!(!host.is_accelerator());
        assert!(!host.is_apu());
        assert!(!AgentInfo::accelerator(Agent(2), 0, props(Profile::Base)).is_apu());
        let apu = AgentInfo::accelerator(Agent(2), 0, props(Profile::Full));
        assert!(apu.is_accelerator());
        assert!(!apu.is_host());
        assert!(apu.is_apu());
    }

    #[test]
    fn test_display() {
        let text = AgentInfo::accelerator(Agent(2), 3, props(Profile::Full)).to_string();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("> agent[3] :"));
        assert_eq!(lines.next(), Some(">> Name : gfx90a"));
        assert_eq!(lines.next(), Some(">> APU : true"));
        assert_eq!(lines.next(), Some(">> HSAIL profile : full"));
        assert_eq!(lines.last(), Some(">> Shader Arrays per SE : 1"));
    }
}
