#![deny(warnings)]

pub mod ffi;
mod queue;

pub use queue::HsaQueue;

use common::{
    Agent, AgentAttr, CodeObjectReader, DeviceType, Executable, FloatRounding, GlobalFlags,
    KernelDescriptor, MemPool, Platform, Profile, Segment, Signal, Status, Symbol, Visit,
};
use ffi::*;
use log::info;
use std::{
    ffi::{c_void, CStr},
    fs::File,
    mem::MaybeUninit,
    ops::ControlFlow,
    os::fd::AsRawFd,
    ptr::{null, null_mut, NonNull},
    sync::Arc,
};

/// 运行时动态库的默认名字。
pub const DEFAULT_LIB: &str = "libhsa-runtime64.so.1";

/// 通过动态加载的 ROCm 运行时实现的平台。
#[derive(Clone)]
pub struct Hsa(Arc<Api>);

impl Hsa {
    /// 加载运行时动态库。
    ///
    /// 优先使用环境变量 `HSA_RUNTIME_LIB` 指定的路径。
    pub fn load() -> Result<Self, libloading::Error> {
        let path = std::env::var("HSA_RUNTIME_LIB").unwrap_or_else(|_| DEFAULT_LIB.into());
        let api = Api::load(&path)?;
        info!("hsa runtime loaded from {path}");
        Ok(Self(Arc::new(api)))
    }
}

#[inline]
const fn check(raw: hsa_status_t) -> Result<(), Status> {
    Status::check(raw)
}

#[inline]
const fn raw(handle: u64) -> hsa_handle_t {
    hsa_handle_t { handle }
}

struct Iteration<'a, T> {
    visit: Visit<'a, T>,
    wrap: fn(u64) -> T,
    error: Option<Status>,
}

unsafe extern "C" fn trampoline<T>(handle: hsa_handle_t, data: *mut c_void) -> hsa_status_t {
    let it = &mut *data.cast::<Iteration<T>>();
    match (it.visit)((it.wrap)(handle.handle)) {
        Ok(ControlFlow::Continue(())) => HSA_STATUS_SUCCESS,
        Ok(ControlFlow::Break(())) => HSA_STATUS_INFO_BREAK,
        Err(e) => {
            it.error = Some(e);
            e.0
        }
    }
}

fn iterate<T>(
    visit: Visit<T>,
    wrap: fn(u64) -> T,
    f: impl FnOnce(*mut c_void) -> hsa_status_t,
) -> Result<ControlFlow<()>, Status> {
    let mut it = Iteration {
        visit,
        wrap,
        error: None,
    };
    let status = f((&mut it as *mut Iteration<T>).cast());
    if let Some(e) = it.error {
        return Err(e);
    }
    match status {
        HSA_STATUS_SUCCESS => Ok(ControlFlow::Continue(())),
        HSA_STATUS_INFO_BREAK => Ok(ControlFlow::Break(())),
        e => Err(Status(e)),
    }
}

impl Hsa {
    fn agent_info<T: Copy>(&self, agent: Agent, attr: u32) -> Result<T, Status> {
        let mut ans = MaybeUninit::<T>::uninit();
        check(unsafe { (self.0.hsa_agent_get_info)(raw(agent.0), attr, ans.as_mut_ptr().cast()) })?;
        Ok(unsafe { ans.assume_init() })
    }

    fn pool_info(&self, pool: MemPool, attr: u32) -> Result<u32, Status> {
        let mut ans = 0u32;
        check(unsafe {
            (self.0.hsa_amd_memory_pool_get_info)(raw(pool.0), attr, (&mut ans as *mut u32).cast())
        })?;
        Ok(ans)
    }

    fn symbol_info<T: Copy + Default>(&self, symbol: Symbol, attr: u32) -> Result<T, Status> {
        let mut ans = T::default();
        check(unsafe {
            (self.0.hsa_executable_symbol_get_info)(
                raw(symbol.0),
                attr,
                (&mut ans as *mut T).cast(),
            )
        })?;
        Ok(ans)
    }
}

impl Platform for Hsa {
    type Queue = HsaQueue;

    fn init(&self) -> Result<(), Status> {
        check(unsafe { (self.0.hsa_init)() })
    }

    fn shut_down(&self) -> Result<(), Status> {
        check(unsafe { (self.0.hsa_shut_down)() })
    }

    fn iterate_agents(&self, visit: Visit<Agent>) -> Result<ControlFlow<()>, Status> {
        iterate(visit, Agent, |data| unsafe {
            (self.0.hsa_iterate_agents)(trampoline::<Agent>, data)
        })
    }

    fn agent_device(&self, agent: Agent) -> Result<DeviceType, Status> {
        match self.agent_info::<u32>(agent, HSA_AGENT_INFO_DEVICE)? {
            HSA_DEVICE_TYPE_CPU => Ok(DeviceType::Cpu),
            HSA_DEVICE_TYPE_GPU => Ok(DeviceType::Gpu),
            _ => Ok(DeviceType::Dsp),
        }
    }

    fn agent_name(&self, agent: Agent) -> Result<String, Status> {
        let name = self.agent_info::<[u8; AGENT_NAME_LEN]>(agent, HSA_AGENT_INFO_NAME)?;
        let len = name.iter().position(|&b| b == 0).unwrap_or(name.len());
        Ok(String::from_utf8_lossy(&name[..len]).into_owned())
    }

    fn agent_profile(&self, agent: Agent) -> Result<Profile, Status> {
        match self.agent_info::<u32>(agent, HSA_AGENT_INFO_PROFILE)? {
            HSA_PROFILE_BASE => Ok(Profile::Base),
            HSA_PROFILE_FULL => Ok(Profile::Full),
            _ => Err(Status::ERROR_INVALID_ARGUMENT),
        }
    }

    fn agent_attr(&self, agent: Agent, attr: AgentAttr) -> Result<u32, Status> {
        let attr = match attr {
            AgentAttr::WavefrontSize => HSA_AGENT_INFO_WAVEFRONT_SIZE,
            AgentAttr::QueueMaxSize => HSA_AGENT_INFO_QUEUE_MAX_SIZE,
            AgentAttr::ComputeUnitCount => HSA_AMD_AGENT_INFO_COMPUTE_UNIT_COUNT,
            AgentAttr::MaxWavesPerCu => HSA_AMD_AGENT_INFO_MAX_WAVES_PER_CU,
            AgentAttr::SimdsPerCu => HSA_AMD_AGENT_INFO_NUM_SIMDS_PER_CU,
            AgentAttr::ShaderEngines => HSA_AMD_AGENT_INFO_NUM_SHADER_ENGINES,
            AgentAttr::ShaderArraysPerEngine => HSA_AMD_AGENT_INFO_NUM_SHADER_ARRAYS_PER_SE,
        };
        self.agent_info(agent, attr)
    }

    fn iterate_memory_pools(
        &self,
        agent: Agent,
        visit: Visit<MemPool>,
    ) -> Result<ControlFlow<()>, Status> {
        iterate(visit, MemPool, |data| unsafe {
            (self.0.hsa_amd_agent_iterate_memory_pools)(raw(agent.0), trampoline::<MemPool>, data)
        })
    }

    fn pool_segment(&self, pool: MemPool) -> Result<Segment, Status> {
        match self.pool_info(pool, HSA_AMD_MEMORY_POOL_INFO_SEGMENT)? {
            HSA_AMD_SEGMENT_GLOBAL => Ok(Segment::Global),
            HSA_AMD_SEGMENT_READONLY => Ok(Segment::ReadOnly),
            HSA_AMD_SEGMENT_PRIVATE => Ok(Segment::Private),
            HSA_AMD_SEGMENT_GROUP => Ok(Segment::Group),
            _ => Err(Status::ERROR_INVALID_ARGUMENT),
        }
    }

    fn pool_global_flags(&self, pool: MemPool) -> Result<GlobalFlags, Status> {
        self.pool_info(pool, HSA_AMD_MEMORY_POOL_INFO_GLOBAL_FLAGS)
            .map(GlobalFlags)
    }

    fn pool_allocate(&self, pool: MemPool, size: usize) -> Result<NonNull<u8>, Status> {
        let mut ptr = null_mut();
        check(unsafe { (self.0.hsa_amd_memory_pool_allocate)(raw(pool.0), size, 0, &mut ptr) })?;
        NonNull::new(ptr.cast()).ok_or(Status::ERROR_OUT_OF_RESOURCES)
    }

    fn pool_free(&self, ptr: NonNull<u8>) -> Result<(), Status> {
        check(unsafe { (self.0.hsa_amd_memory_pool_free)(ptr.as_ptr().cast()) })
    }

    fn allow_access(&self, agents: &[Agent], ptr: NonNull<u8>) -> Result<(), Status> {
        let agents = agents.iter().map(|a| raw(a.0)).collect::<Vec<_>>();
        check(unsafe {
            (self.0.hsa_amd_agents_allow_access)(
                agents.len() as _,
                agents.as_ptr(),
                null(),
                ptr.as_ptr().cast_const().cast(),
            )
        })
    }

    fn queue_create(&self, agent: Agent, size: u32) -> Result<HsaQueue, Status> {
        let mut queue = null_mut();
        check(unsafe {
            (self.0.hsa_queue_create)(
                raw(agent.0),
                size,
                HSA_QUEUE_TYPE_MULTI,
                None,
                null_mut(),
                u32::MAX,
                u32::MAX,
                &mut queue,
            )
        })?;
        let raw = NonNull::new(queue).ok_or(Status::ERROR_INVALID_QUEUE_CREATION)?;
        Ok(HsaQueue {
            raw,
            api: self.0.clone(),
        })
    }

    fn queue_destroy(&self, queue: HsaQueue) -> Result<(), Status> {
        check(unsafe { (self.0.hsa_queue_destroy)(queue.as_raw()) })
    }

    fn signal_create(&self, initial: i64) -> Result<Signal, Status> {
        let mut signal = raw(0);
        check(unsafe { (self.0.hsa_signal_create)(initial, 0, null(), &mut signal) })?;
        Ok(Signal(signal.handle))
    }

    fn signal_destroy(&self, signal: Signal) -> Result<(), Status> {
        check(unsafe { (self.0.hsa_signal_destroy)(raw(signal.0)) })
    }

    fn signal_wait_lt(&self, signal: Signal, compare: i64) -> i64 {
        unsafe {
            (self.0.hsa_signal_wait_scacquire)(
                raw(signal.0),
                HSA_SIGNAL_CONDITION_LT,
                compare,
                u64::MAX,
                HSA_WAIT_STATE_BLOCKED,
            )
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
        check((self.0.hsa_amd_memory_async_copy)(
            dst.cast(),
            raw(dst_agent.0),
            src.cast(),
            raw(src_agent.0),
            size,
            0,
            null(),
            raw(completion.0),
        ))
    }

    fn code_object_reader_create(&self, file: &File) -> Result<CodeObjectReader, Status> {
        let mut reader = raw(0);
        check(unsafe {
            (self.0.hsa_code_object_reader_create_from_file)(file.as_raw_fd(), &mut reader)
        })?;
        Ok(CodeObjectReader(reader.handle))
    }

    fn code_object_reader_destroy(&self, reader: CodeObjectReader) -> Result<(), Status> {
        check(unsafe { (self.0.hsa_code_object_reader_destroy)(raw(reader.0)) })
    }

    fn executable_create(
        &self,
        profile: Profile,
        rounding: FloatRounding,
    ) -> Result<Executable, Status> {
        let profile = match profile {
            Profile::Base => HSA_PROFILE_BASE,
            Profile::Full => HSA_PROFILE_FULL,
        };
        let rounding = match rounding {
            FloatRounding::Default => HSA_DEFAULT_FLOAT_ROUNDING_MODE_DEFAULT,
            FloatRounding::Zero => HSA_DEFAULT_FLOAT_ROUNDING_MODE_ZERO,
            FloatRounding::Near => HSA_DEFAULT_FLOAT_ROUNDING_MODE_NEAR,
        };
        let mut exe = raw(0);
        check(unsafe { (self.0.hsa_executable_create_alt)(profile, rounding, null(), &mut exe) })?;
        Ok(Executable(exe.handle))
    }

    fn executable_load(
        &self,
        executable: Executable,
        agent: Agent,
        reader: CodeObjectReader,
    ) -> Result<(), Status> {
        check(unsafe {
            (self.0.hsa_executable_load_agent_code_object)(
                raw(executable.0),
                raw(agent.0),
                raw(reader.0),
                null(),
                null_mut(),
            )
        })
    }

    fn executable_freeze(&self, executable: Executable) -> Result<(), Status> {
        check(unsafe { (self.0.hsa_executable_freeze)(raw(executable.0), null()) })
    }

    fn executable_symbol(
        &self,
        executable: Executable,
        name: &CStr,
        agent: Agent,
    ) -> Result<Symbol, Status> {
        let agent = raw(agent.0);
        let mut symbol = raw(0);
        check(unsafe {
            (self.0.hsa_executable_get_symbol_by_name)(
                raw(executable.0),
                name.as_ptr(),
                &agent,
                &mut symbol,
            )
        })?;
        Ok(Symbol(symbol.handle))
    }

    fn executable_destroy(&self, executable: Executable) -> Result<(), Status> {
        check(unsafe { (self.0.hsa_executable_destroy)(raw(executable.0)) })
    }

    fn kernel_descriptor(&self, symbol: Symbol) -> Result<KernelDescriptor, Status> {
        Ok(KernelDescriptor {
            object: self.symbol_info(symbol, HSA_EXECUTABLE_SYMBOL_INFO_KERNEL_OBJECT)?,
            kernarg_segment_size: self
                .symbol_info(symbol, HSA_EXECUTABLE_SYMBOL_INFO_KERNEL_KERNARG_SEGMENT_SIZE)?,
            group_segment_size: self
                .symbol_info(symbol, HSA_EXECUTABLE_SYMBOL_INFO_KERNEL_GROUP_SEGMENT_SIZE)?,
            private_segment_size: self
                .symbol_info(symbol, HSA_EXECUTABLE_SYMBOL_INFO_KERNEL_PRIVATE_SEGMENT_SIZE)?,
        })
    }

    fn status_string(&self, status: Status) -> String {
        let mut ptr = null();
        match check(unsafe { (self.0.hsa_status_string)(status.0, &mut ptr) }) {
            Ok(()) if !ptr.is_null() => unsafe { CStr::from_ptr(ptr) }
                .to_string_lossy()
                .into_owned(),
            _ => status.to_string(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn load() -> Option<Hsa> {
        let hsa = Hsa::load().ok()?;
        hsa.init().ok()?;
        Some(hsa)
    }

    #[test]
    fn test_agents() {
        let Some(hsa) = load() else {
            return;
        };
        let mut agents = Vec::new();
        let flow = hsa
            .iterate_agents(&mut |agent| {
                agents.push(agent);
                Ok(ControlFlow::Continue(()))
            })
            .unwrap();
        assert!(flow.is_continue());
        for agent in agents {
            let device = hsa.agent_device(agent).unwrap();
            let name = hsa.agent_name(agent).unwrap();
            assert!(!name.is_empty());
            println!("{device:?} {name}");
        }
        hsa.shut_down().unwrap();
    }

    #[test]
    fn test_iterate_break() {
        let Some(hsa) = load() else {
            return;
        };
        let mut count = 0;
        let flow = hsa
            .iterate_agents(&mut |_| {
                count += 1;
                Ok(ControlFlow::Break(()))
            })
            .unwrap();
        assert!(flow.is_break());
        assert_eq!(count, 1);
        hsa.shut_down().unwrap();
    }

    #[test]
    fn test_status_string() {
        let Some(hsa) = load() else {
            return;
        };
        assert!(!hsa.status_string(Status::ERROR_INVALID_ARGUMENT).is_empty());
        hsa.shut_down().unwrap();
    }
}
