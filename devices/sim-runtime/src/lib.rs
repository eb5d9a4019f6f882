//! 纯软件的异构平台。
//!
//! 代理、存储池、队列和信号都在进程内模拟：分配是真实的页对齐堆内存，
//! 队列槽位是真实的共享内存，异步拷贝在工作线程上完成。
//! 可以按需注入失败，用来覆盖调用者的错误路径。

#![deny(warnings)]

mod code_object;
mod queue;
mod signal;

use code_object::SimExecutable;
use common::{
    Agent, AgentAttr, CodeObjectReader, DeviceType, Executable, FloatRounding, GlobalFlags,
    KernelDescriptor, MemPool, Platform, Profile, Segment, Signal, Status, Symbol, Visit,
};
use log::debug;
use signal::SimSignal;
use std::{
    alloc::{alloc_zeroed, dealloc, Layout},
    collections::HashMap,
    ffi::CStr,
    fs::File,
    io::Read,
    ops::ControlFlow,
    ptr::{copy_nonoverlapping, NonNull},
    sync::{
        atomic::{
            AtomicU64, AtomicUsize,
            Ordering::{Relaxed, SeqCst},
        },
        Arc, Mutex,
    },
    thread,
};

pub use queue::SimQueue;

/// 可注入的失败点。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Fault {
    IterateAgents,
    PoolInfo,
    PoolAllocate,
    AllowAccess,
    PoolFree,
    SignalCreate,
    AsyncCopy,
    CodeObjectReader,
}

/// 主机代理拥有哪些存储池。
#[derive(Clone, Copy, Debug)]
pub struct SimHost {
    pub system_pool: bool,
    pub kernarg_pool: bool,
}

impl Default for SimHost {
    fn default() -> Self {
        Self {
            system_pool: true,
            kernarg_pool: true,
        }
    }
}

/// 加速器代理的属性。
#[derive(Clone, Debug)]
pub struct SimAccelerator {
    pub name: String,
    pub profile: Profile,
    pub wavefront_size: u32,
    pub queue_max_size: u32,
    pub compute_units: u32,
    pub waves_per_cu: u32,
    pub simds_per_cu: u32,
    pub shader_engines: u32,
    pub arrays_per_engine: u32,
}

impl Default for SimAccelerator {
    fn default() -> Self {
        Self {
            name: "gfx906".into(),
            profile: Profile::Base,
            wavefront_size: 64,
            queue_max_size: 128 * 1024,
            compute_units: 60,
            waves_per_cu: 40,
            simds_per_cu: 4,
            shader_engines: 4,
            arrays_per_engine: 1,
        }
    }
}

#[derive(Default)]
pub struct Builder {
    page_size: Option<usize>,
    agents: Vec<AgentSpec>,
    faults: Vec<Fault>,
}

enum AgentSpec {
    Host(SimHost),
    Accelerator(SimAccelerator),
    Dsp,
}

impl Builder {
    pub fn page_size(mut self, page_size: usize) -> Self {
        assert!(page_size.is_power_of_two());
        self.page_size = Some(page_size);
        self
    }

    pub fn host(self) -> Self {
        self.host_with(SimHost::default())
    }

    pub fn host_with(mut self, host: SimHost) -> Self {
        self.agents.push(AgentSpec::Host(host));
        self
    }

    pub fn accelerator(self) -> Self {
        self.accelerator_with(SimAccelerator::default())
    }

    pub fn accelerator_with(mut self, accelerator: SimAccelerator) -> Self {
        self.agents.push(AgentSpec::Accelerator(accelerator));
        self
    }

    /// 既不是主机也不是加速器的代理。
    pub fn dsp(mut self) -> Self {
        self.agents.push(AgentSpec::Dsp);
        self
    }

    pub fn fail(mut self, fault: Fault) -> Self {
        self.faults.push(fault);
        self
    }

    pub fn build(self) -> SimPlatform {
        let next = AtomicU64::new(1);
        let mut agents = Vec::new();
        let mut pools = Vec::new();
        let mut pool = |owner: Agent, segment, flags| {
            let handle = MemPool(next.fetch_add(1, Relaxed));
            pools.push(SimPool {
                handle,
                owner,
                segment,
                flags,
            });
            handle
        };

        for spec in self.agents {
            let handle = Agent(next.fetch_add(1, Relaxed));
            let agent = match spec {
                AgentSpec::Host(host) => {
                    let mut owned = Vec::new();
                    if host.system_pool {
                        owned.push(pool(handle, Segment::Global, GlobalFlags::FINE_GRAINED));
                    }
                    if host.kernarg_pool {
                        owned.push(pool(
                            handle,
                            Segment::Global,
                            GlobalFlags::KERNARG_INIT | GlobalFlags::FINE_GRAINED,
                        ));
                    }
                    SimAgent {
                        handle,
                        device: DeviceType::Cpu,
                        accelerator: None,
                        pools: owned,
                    }
                }
                AgentSpec::Accelerator(accelerator) => {
                    // 组段池排在前面，挑选全局池时必须跳过它
                    let owned = vec![
                        pool(handle, Segment::Group, GlobalFlags::default()),
                        pool(handle, Segment::Global, GlobalFlags::COARSE_GRAINED),
                    ];
                    SimAgent {
                        handle,
                        device: DeviceType::Gpu,
                        accelerator: Some(accelerator),
                        pools: owned,
                    }
                }
                AgentSpec::Dsp => SimAgent {
                    handle,
                    device: DeviceType::Dsp,
                    accelerator: None,
                    pools: Vec::new(),
                },
            };
            agents.push(agent)
        }

        SimPlatform {
            agents,
            pools,
            page_size: self.page_size.unwrap_or(0x1000),
            faults: self.faults,
            next,
            init_count: AtomicUsize::new(0),
            state: Default::default(),
        }
    }
}

struct SimAgent {
    handle: Agent,
    device: DeviceType,
    accelerator: Option<SimAccelerator>,
    pools: Vec<MemPool>,
}

struct SimPool {
    handle: MemPool,
    owner: Agent,
    segment: Segment,
    flags: GlobalFlags,
}

struct Allocation {
    layout: Layout,
    pool: MemPool,
    access: Vec<Agent>,
}

#[derive(Default)]
struct State {
    allocations: HashMap<usize, Allocation>,
    queues: HashMap<u64, SimQueue>,
    signals: HashMap<Signal, Arc<SimSignal>>,
    readers: HashMap<CodeObjectReader, Vec<code_object::KernelEntry>>,
    executables: HashMap<Executable, SimExecutable>,
    symbols: HashMap<Symbol, (Executable, KernelDescriptor)>,
}

/// 软件平台。
pub struct SimPlatform {
    agents: Vec<SimAgent>,
    pools: Vec<SimPool>,
    page_size: usize,
    faults: Vec<Fault>,
    next: AtomicU64,
    init_count: AtomicUsize,
    state: Mutex<State>,
}

impl Drop for SimPlatform {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap();
        for (ptr, allocation) in state.allocations.drain() {
            unsafe { dealloc(ptr as *mut u8, allocation.layout) }
        }
    }
}

impl SimPlatform {
    #[inline]
    pub fn builder() -> Builder {
        Builder::default()
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// 运行时当前被初始化的次数。
    #[inline]
    pub fn init_count(&self) -> usize {
        self.init_count.load(SeqCst)
    }

    /// 按枚举顺序列出代理。
    pub fn agents(&self) -> Vec<Agent> {
        self.agents.iter().map(|a| a.handle).collect()
    }

    /// `ptr` 所在分配的授权代理。
    pub fn access_of(&self, ptr: NonNull<u8>) -> Option<Vec<Agent>> {
        let state = self.state.lock().unwrap();
        state
            .allocations
            .get(&(ptr.as_ptr() as usize))
            .map(|a| a.access.clone())
    }

    /// `ptr` 所在分配来自哪个池。
    pub fn pool_of(&self, ptr: NonNull<u8>) -> Option<MemPool> {
        let state = self.state.lock().unwrap();
        state
            .allocations
            .get(&(ptr.as_ptr() as usize))
            .map(|a| a.pool)
    }

    /// 分配的实际字节数。
    pub fn allocation_size(&self, ptr: NonNull<u8>) -> Option<usize> {
        let state = self.state.lock().unwrap();
        state
            .allocations
            .get(&(ptr.as_ptr() as usize))
            .map(|a| a.layout.size())
    }

    pub fn live_allocations(&self) -> usize {
        self.state.lock().unwrap().allocations.len()
    }

    pub fn live_signals(&self) -> usize {
        self.state.lock().unwrap().signals.len()
    }

    pub fn signal_value(&self, signal: Signal) -> Option<i64> {
        self.signal(signal).map(|s| s.load())
    }

    pub fn signal_store(&self, signal: Signal, val: i64) {
        if let Some(s) = self.signal(signal) {
            s.store(val)
        }
    }

    #[inline]
    fn fails(&self, fault: Fault) -> bool {
        self.faults.contains(&fault)
    }

    #[inline]
    fn handle(&self) -> u64 {
        self.next.fetch_add(1, Relaxed)
    }

    fn agent(&self, agent: Agent) -> Result<&SimAgent, Status> {
        self.agents
            .iter()
            .find(|a| a.handle == agent)
            .ok_or(Status::ERROR_INVALID_AGENT)
    }

    fn accelerator(&self, agent: Agent) -> Result<&SimAccelerator, Status> {
        self.agent(agent)?
            .accelerator
            .as_ref()
            .ok_or(Status::ERROR_INVALID_AGENT)
    }

    fn pool(&self, pool: MemPool) -> Result<&SimPool, Status> {
        if self.fails(Fault::PoolInfo) {
            return Err(Status::ERROR);
        }
        self.pools
            .iter()
            .find(|p| p.handle == pool)
            .ok_or(Status::ERROR_INVALID_ARGUMENT)
    }

    fn signal(&self, signal: Signal) -> Option<Arc<SimSignal>> {
        self.state.lock().unwrap().signals.get(&signal).cloned()
    }
}

fn iterate<T>(
    items: impl IntoIterator<Item = T>,
    visit: Visit<T>,
) -> Result<ControlFlow<()>, Status> {
    for item in items {
        if visit(item)?.is_break() {
            return Ok(ControlFlow::Break(()));
        }
    }
    Ok(ControlFlow::Continue(()))
}

impl Platform for SimPlatform {
    type Queue = SimQueue;

    fn init(&self) -> Result<(), Status> {
        self.init_count.fetch_add(1, SeqCst);
        Ok(())
    }

    fn shut_down(&self) -> Result<(), Status> {
        self.init_count
            .fetch_update(SeqCst, SeqCst, |n| n.checked_sub(1))
            .map(|_| ())
            .map_err(|_| Status::ERROR_NOT_INITIALIZED)
    }

    fn iterate_agents(&self, visit: Visit<Agent>) -> Result<ControlFlow<()>, Status> {
        if self.fails(Fault::IterateAgents) {
            return Err(Status::ERROR);
        }
        iterate(self.agents.iter().map(|a| a.handle), visit)
    }

    fn agent_device(&self, agent: Agent) -> Result<DeviceType, Status> {
        self.agent(agent).map(|a| a.device)
    }

    fn agent_name(&self, agent: Agent) -> Result<String, Status> {
        let agent = self.agent(agent)?;
        Ok(match (&agent.accelerator, agent.device) {
            (Some(acc), _) => acc.name.clone(),
            (None, DeviceType::Cpu) => "Sim Host Processor".into(),
            (None, _) => "Sim DSP".into(),
        })
    }

    fn agent_profile(&self, agent: Agent) -> Result<Profile, Status> {
        let agent = self.agent(agent)?;
        Ok(agent.accelerator.as_ref().map_or(Profile::Full, |a| a.profile))
    }

    fn agent_attr(&self, agent: Agent, attr: AgentAttr) -> Result<u32, Status> {
        let acc = self.accelerator(agent)?;
        Ok(match attr {
            AgentAttr::WavefrontSize => acc.wavefront_size,
            AgentAttr::QueueMaxSize => acc.queue_max_size,
            AgentAttr::ComputeUnitCount => acc.compute_units,
            AgentAttr::MaxWavesPerCu => acc.waves_per_cu,
            AgentAttr::SimdsPerCu => acc.simds_per_cu,
            AgentAttr::ShaderEngines => acc.shader_engines,
            AgentAttr::ShaderArraysPerEngine => acc.arrays_per_engine,
        })
    }

    fn iterate_memory_pools(
        &self,
        agent: Agent,
        visit: Visit<MemPool>,
    ) -> Result<ControlFlow<()>, Status> {
        let agent = self.agent(agent)?;
        iterate(agent.pools.iter().copied(), visit)
    }

    fn pool_segment(&self, pool: MemPool) -> Result<Segment, Status> {
        self.pool(pool).map(|p| p.segment)
    }

    fn pool_global_flags(&self, pool: MemPool) -> Result<GlobalFlags, Status> {
        let pool = self.pool(pool)?;
        match pool.segment {
            Segment::Global => Ok(pool.flags),
            _ => Err(Status::ERROR_INVALID_ARGUMENT),
        }
    }

    fn pool_allocate(&self, pool: MemPool, size: usize) -> Result<NonNull<u8>, Status> {
        let pool = self.pool(pool)?;
        if pool.segment != Segment::Global || size == 0 {
            return Err(Status::ERROR_INVALID_ARGUMENT);
        }
        if self.fails(Fault::PoolAllocate) {
            return Err(Status::ERROR_OUT_OF_RESOURCES);
        }
        let layout = Layout::from_size_align(size, self.page_size)
            .map_err(|_| Status::ERROR_INVALID_ALLOCATION)?;
        let ptr = NonNull::new(unsafe { alloc_zeroed(layout) })
            .ok_or(Status::ERROR_OUT_OF_RESOURCES)?;
        self.state.lock().unwrap().allocations.insert(
            ptr.as_ptr() as usize,
            Allocation {
                layout,
                pool: pool.handle,
                access: vec![pool.owner],
            },
        );
        Ok(ptr)
    }

    fn pool_free(&self, ptr: NonNull<u8>) -> Result<(), Status> {
        if self.fails(Fault::PoolFree) {
            return Err(Status::ERROR);
        }
        let allocation = self
            .state
            .lock()
            .unwrap()
            .allocations
            .remove(&(ptr.as_ptr() as usize))
            .ok_or(Status::ERROR_INVALID_ALLOCATION)?;
        unsafe { dealloc(ptr.as_ptr(), allocation.layout) };
        Ok(())
    }

    fn allow_access(&self, agents: &[Agent], ptr: NonNull<u8>) -> Result<(), Status> {
        if self.fails(Fault::AllowAccess) {
            return Err(Status::ERROR);
        }
        if agents.is_empty() {
            return Err(Status::ERROR_INVALID_ARGUMENT);
        }
        for &agent in agents {
            self.agent(agent)?;
        }
        let mut state = self.state.lock().unwrap();
        let allocation = state
            .allocations
            .get_mut(&(ptr.as_ptr() as usize))
            .ok_or(Status::ERROR_INVALID_ALLOCATION)?;
        allocation.access = agents.to_vec();
        Ok(())
    }

    fn queue_create(&self, agent: Agent, size: u32) -> Result<SimQueue, Status> {
        let acc = self.accelerator(agent)?;
        if !size.is_power_of_two() || size > acc.queue_max_size {
            return Err(Status::ERROR_INVALID_QUEUE_CREATION);
        }
        let queue = SimQueue::new(self.handle(), agent, size);
        self.state
            .lock()
            .unwrap()
            .queues
            .insert(queue.id(), queue.clone());
        Ok(queue)
    }

    fn queue_destroy(&self, queue: SimQueue) -> Result<(), Status> {
        self.state
            .lock()
            .unwrap()
            .queues
            .remove(&queue.id())
            .map(|_| ())
            .ok_or(Status::ERROR_INVALID_QUEUE)
    }

    fn signal_create(&self, initial: i64) -> Result<Signal, Status> {
        if self.fails(Fault::SignalCreate) {
            return Err(Status::ERROR_OUT_OF_RESOURCES);
        }
        let signal = Signal(self.handle());
        self.state
            .lock()
            .unwrap()
            .signals
            .insert(signal, Arc::new(SimSignal::new(initial)));
        Ok(signal)
    }

    fn signal_destroy(&self, signal: Signal) -> Result<(), Status> {
        self.state
            .lock()
            .unwrap()
            .signals
            .remove(&signal)
            .map(|_| ())
            .ok_or(Status::ERROR_INVALID_SIGNAL)
    }

    fn signal_wait_lt(&self, signal: Signal, compare: i64) -> i64 {
        match self.signal(signal) {
            Some(s) => s.wait_lt(compare),
            None => compare,
        }
    }

    unsafe fn async_copy(
        &self,
        dst: *mut u8,
        dst_agent: Agent,
        src: *const u8,
        src_agent: Agent,
        size: usize,
        completion: Signal,
    ) -> Result<(), Status> {
        if self.fails(Fault::AsyncCopy) {
            return Err(Status::ERROR);
        }
        self.agent(dst_agent)?;
        self.agent(src_agent)?;
        if dst.is_null() || src.is_null() {
            return Err(Status::ERROR_INVALID_ARGUMENT);
        }
        let signal = self.signal(completion).ok_or(Status::ERROR_INVALID_SIGNAL)?;

        let (dst, src) = (dst as usize, src as usize);
        debug!("sim copy {size} bytes {src:#x} -> {dst:#x}");
        thread::spawn(move || {
            unsafe { copy_nonoverlapping(src as *const u8, dst as *mut u8, size) };
            signal.subtract(1)
        });
        Ok(())
    }

    fn code_object_reader_create(&self, file: &File) -> Result<CodeObjectReader, Status> {
        if self.fails(Fault::CodeObjectReader) {
            return Err(Status::ERROR_INVALID_CODE_OBJECT_READER);
        }
        let mut bytes = Vec::new();
        let mut file = file;
        file.read_to_end(&mut bytes)
            .map_err(|_| Status::ERROR_INVALID_CODE_OBJECT_READER)?;
        let entries = code_object::parse(&bytes)?;

        let reader = CodeObjectReader(self.handle());
        self.state.lock().unwrap().readers.insert(reader, entries);
        Ok(reader)
    }

    fn code_object_reader_destroy(&self, reader: CodeObjectReader) -> Result<(), Status> {
        self.state
            .lock()
            .unwrap()
            .readers
            .remove(&reader)
            .map(|_| ())
            .ok_or(Status::ERROR_INVALID_CODE_OBJECT_READER)
    }

    fn executable_create(
        &self,
        _profile: Profile,
        _rounding: FloatRounding,
    ) -> Result<Executable, Status> {
        let executable = Executable(self.handle());
        self.state
            .lock()
            .unwrap()
            .executables
            .insert(executable, SimExecutable::new());
        Ok(executable)
    }

    fn executable_load(
        &self,
        executable: Executable,
        agent: Agent,
        reader: CodeObjectReader,
    ) -> Result<(), Status> {
        self.accelerator(agent)?;
        let mut state = self.state.lock().unwrap();
        let entries = state
            .readers
            .get(&reader)
            .cloned()
            .ok_or(Status::ERROR_INVALID_CODE_OBJECT_READER)?;
        let exe = state
            .executables
            .get_mut(&executable)
            .ok_or(Status::ERROR_INVALID_EXECUTABLE)?;
        if exe.frozen {
            return Err(Status::ERROR_FROZEN_EXECUTABLE);
        }
        exe.loaded.extend(entries.into_iter().map(|e| (agent, e)));
        Ok(())
    }

    fn executable_freeze(&self, executable: Executable) -> Result<(), Status> {
        let mut state = self.state.lock().unwrap();
        let exe = state
            .executables
            .get_mut(&executable)
            .ok_or(Status::ERROR_INVALID_EXECUTABLE)?;
        if exe.frozen {
            return Err(Status::ERROR_FROZEN_EXECUTABLE);
        }
        exe.frozen = true;
        Ok(())
    }

    fn executable_symbol(
        &self,
        executable: Executable,
        name: &CStr,
        agent: Agent,
    ) -> Result<Symbol, Status> {
        let name = name.to_str().map_err(|_| Status::ERROR_INVALID_SYMBOL_NAME)?;
        let symbol = Symbol(self.handle());

        let mut state = self.state.lock().unwrap();
        let exe = state
            .executables
            .get(&executable)
            .ok_or(Status::ERROR_INVALID_EXECUTABLE)?;
        if !exe.frozen {
            return Err(Status::ERROR_INVALID_EXECUTABLE);
        }
        let entry = exe
            .find(name, agent)
            .ok_or(Status::ERROR_INVALID_SYMBOL_NAME)?;
        let descriptor = KernelDescriptor {
            object: symbol.0 << 8,
            kernarg_segment_size: entry.kernarg_segment_size,
            group_segment_size: 0,
            private_segment_size: 0,
        };
        state.symbols.insert(symbol, (executable, descriptor));
        Ok(symbol)
    }

    fn executable_destroy(&self, executable: Executable) -> Result<(), Status> {
        let mut state = self.state.lock().unwrap();
        state
            .executables
            .remove(&executable)
            .ok_or(Status::ERROR_INVALID_EXECUTABLE)?;
        state.symbols.retain(|_, (owner, _)| *owner != executable);
        Ok(())
    }

    fn kernel_descriptor(&self, symbol: Symbol) -> Result<KernelDescriptor, Status> {
        self.state
            .lock()
            .unwrap()
            .symbols
            .get(&symbol)
            .map(|(_, d)| *d)
            .ok_or(Status::ERROR_INVALID_SYMBOL_NAME)
    }
}
