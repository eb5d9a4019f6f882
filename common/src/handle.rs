macro_rules! handle {
    ($( $(#[$attr:meta])* $name:ident )*) => {
        $(
            $(#[$attr])*
            #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
            #[repr(transparent)]
            pub struct $name(pub u64);
        )*
    };
}

handle! {
    /// 计算代理（主机处理器或加速器）。
    Agent
    /// 代理上的一个存储池。
    MemPool
    /// 完成信号。
    Signal
    /// 代码对象读取器。
    CodeObjectReader
    /// 可执行体。
    Executable
    /// 可执行体中的符号。
    Symbol
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum DeviceType {
    Cpu,
    Gpu,
    Dsp,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Profile {
    Base,
    Full,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum FloatRounding {
    Default,
    Zero,
    Near,
}

/// 存储池所在的段。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Segment {
    Global,
    ReadOnly,
    Private,
    Group,
}

/// 全局段存储池的标志位。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
#[repr(transparent)]
pub struct GlobalFlags(pub u32);

impl GlobalFlags {
    pub const KERNARG_INIT: Self = Self(1);
    pub const FINE_GRAINED: Self = Self(2);
    pub const COARSE_GRAINED: Self = Self(4);

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for GlobalFlags {
    type Output = Self;
    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// 以 `u32` 返回的代理属性。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AgentAttr {
    WavefrontSize,
    QueueMaxSize,
    ComputeUnitCount,
    MaxWavesPerCu,
    SimdsPerCu,
    ShaderEngines,
    ShaderArraysPerEngine,
}

/// 发射内核所需的符号信息。
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct KernelDescriptor {
    pub object: u64,
    pub kernarg_segment_size: u32,
    pub group_segment_size: u32,
    pub private_segment_size: u32,
}
