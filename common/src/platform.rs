use crate::{
    Agent, AgentAttr, CodeObjectReader, DeviceType, Executable, FloatRounding, GlobalFlags,
    KernelDescriptor, MemPool, Profile, Ring, Segment, Signal, Status, Symbol,
};
use std::{ffi::CStr, fs::File, ops::ControlFlow, ptr::NonNull};

/// 迭代回调。返回 [`ControlFlow::Break`] 提前结束迭代，返回错误则中止迭代并传播该错误。
pub type Visit<'a, T> = &'a mut dyn FnMut(T) -> Result<ControlFlow<()>, Status>;

/// 异构计算平台运行时。
///
/// 约定资源工厂向运行时索取的全部原语，由 `devices/` 下的实现提供。
/// 实现只做转发，不做策略：池的挑选、页对齐、访问授权的对象都由调用者决定。
pub trait Platform {
    /// 平台的硬件队列类型。
    type Queue: Ring;

    fn init(&self) -> Result<(), Status>;
    fn shut_down(&self) -> Result<(), Status>;

    /// 遍历所有代理。
    ///
    /// 回调提前结束时返回 `Ok(Break)`，完整遍历时返回 `Ok(Continue)`。
    fn iterate_agents(&self, visit: Visit<Agent>) -> Result<ControlFlow<()>, Status>;
    fn agent_device(&self, agent: Agent) -> Result<DeviceType, Status>;
    fn agent_name(&self, agent: Agent) -> Result<String, Status>;
    fn agent_profile(&self, agent: Agent) -> Result<Profile, Status>;
    fn agent_attr(&self, agent: Agent, attr: AgentAttr) -> Result<u32, Status>;

    /// 遍历代理的存储池，语义同 [`Platform::iterate_agents`]。
    fn iterate_memory_pools(
        &self,
        agent: Agent,
        visit: Visit<MemPool>,
    ) -> Result<ControlFlow<()>, Status>;
    fn pool_segment(&self, pool: MemPool) -> Result<Segment, Status>;
    fn pool_global_flags(&self, pool: MemPool) -> Result<GlobalFlags, Status>;
    fn pool_allocate(&self, pool: MemPool, size: usize) -> Result<NonNull<u8>, Status>;
    fn pool_free(&self, ptr: NonNull<u8>) -> Result<(), Status>;
    /// 授权 `agents` 中的每个代理访问 `ptr` 所在的分配。
    fn allow_access(&self, agents: &[Agent], ptr: NonNull<u8>) -> Result<(), Status>;

    /// 在代理上创建可容纳 `size` 个包的多生产者队列。
    fn queue_create(&self, agent: Agent, size: u32) -> Result<Self::Queue, Status>;
    fn queue_destroy(&self, queue: Self::Queue) -> Result<(), Status>;

    fn signal_create(&self, initial: i64) -> Result<Signal, Status>;
    fn signal_destroy(&self, signal: Signal) -> Result<(), Status>;
    /// 阻塞等待信号值小于 `compare`，等待期间让出处理器。返回观察到的信号值。
    fn signal_wait_lt(&self, signal: Signal, compare: i64) -> i64;

    /// 异步拷贝，完成后 `completion` 减一。
    ///
    /// # Safety
    ///
    /// `dst` 和 `src` 必须在拷贝完成前保持有效，且分别可由 `dst_agent` 与 `src_agent` 访问。
    #[allow(clippy::too_many_arguments)]
    unsafe fn async_copy(
        &self,
        dst: *mut u8,
        dst_agent: Agent,
        src: *const u8,
        src_agent: Agent,
        size: usize,
        completion: Signal,
    ) -> Result<(), Status>;

    fn code_object_reader_create(&self, file: &File) -> Result<CodeObjectReader, Status>;
    fn code_object_reader_destroy(&self, reader: CodeObjectReader) -> Result<(), Status>;
    fn executable_create(
        &self,
        profile: Profile,
        rounding: FloatRounding,
    ) -> Result<Executable, Status>;
    fn executable_load(
        &self,
        executable: Executable,
        agent: Agent,
        reader: CodeObjectReader,
    ) -> Result<(), Status>;
    fn executable_freeze(&self, executable: Executable) -> Result<(), Status>;
    fn executable_symbol(
        &self,
        executable: Executable,
        name: &CStr,
        agent: Agent,
    ) -> Result<Symbol, Status>;
    fn executable_destroy(&self, executable: Executable) -> Result<(), Status>;
    fn kernel_descriptor(&self, symbol: Symbol) -> Result<KernelDescriptor, Status>;

    /// 状态码的可读描述。
    #[inline]
    fn status_string(&self, status: Status) -> String {
        status.to_string()
    }
}
