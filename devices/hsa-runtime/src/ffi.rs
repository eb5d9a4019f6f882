#![allow(non_camel_case_types)]

use libloading::Library;
use std::ffi::{c_char, c_int, c_void, OsStr};

pub type hsa_status_t = u32;

#[derive(Clone, Copy)]
#[repr(C)]
pub struct hsa_handle_t {
    pub handle: u64,
}

pub type hsa_agent_t = hsa_handle_t;
pub type hsa_amd_memory_pool_t = hsa_handle_t;
pub type hsa_signal_t = hsa_handle_t;
pub type hsa_code_object_reader_t = hsa_handle_t;
pub type hsa_executable_t = hsa_handle_t;
pub type hsa_executable_symbol_t = hsa_handle_t;
pub type hsa_loaded_code_object_t = hsa_handle_t;

#[repr(C)]
pub struct hsa_queue_t {
    pub type_: u32,
    pub features: u32,
    pub base_address: *mut c_void,
    pub doorbell_signal: hsa_signal_t,
    pub size: u32,
    pub reserved1: u32,
    pub id: u64,
}

pub type agent_callback_t = unsafe extern "C" fn(hsa_agent_t, *mut c_void) -> hsa_status_t;
pub type pool_callback_t =
    unsafe extern "C" fn(hsa_amd_memory_pool_t, *mut c_void) -> hsa_status_t;
pub type queue_callback_t = unsafe extern "C" fn(hsa_status_t, *mut hsa_queue_t, *mut c_void);

pub const HSA_STATUS_SUCCESS: hsa_status_t = 0x0;
pub const HSA_STATUS_INFO_BREAK: hsa_status_t = 0x1;

pub const HSA_AGENT_INFO_NAME: u32 = 0;
pub const HSA_AGENT_INFO_PROFILE: u32 = 4;
pub const HSA_AGENT_INFO_WAVEFRONT_SIZE: u32 = 6;
pub const HSA_AGENT_INFO_QUEUE_MAX_SIZE: u32 = 14;
pub const HSA_AGENT_INFO_DEVICE: u32 = 17;
pub const HSA_AMD_AGENT_INFO_COMPUTE_UNIT_COUNT: u32 = 0xA002;
pub const HSA_AMD_AGENT_INFO_MAX_WAVES_PER_CU: u32 = 0xA00A;
pub const HSA_AMD_AGENT_INFO_NUM_SIMDS_PER_CU: u32 = 0xA00B;
pub const HSA_AMD_AGENT_INFO_NUM_SHADER_ENGINES: u32 = 0xA00C;
pub const HSA_AMD_AGENT_INFO_NUM_SHADER_ARRAYS_PER_SE: u32 = 0xA00D;

pub const HSA_DEVICE_TYPE_CPU: u32 = 0;
pub const HSA_DEVICE_TYPE_GPU: u32 = 1;

pub const HSA_PROFILE_BASE: u32 = 0;
pub const HSA_PROFILE_FULL: u32 = 1;

pub const HSA_DEFAULT_FLOAT_ROUNDING_MODE_DEFAULT: u32 = 0;
pub const HSA_DEFAULT_FLOAT_ROUNDING_MODE_ZERO: u32 = 1;
pub const HSA_DEFAULT_FLOAT_ROUNDING_MODE_NEAR: u32 = 2;

pub const HSA_AMD_MEMORY_POOL_INFO_SEGMENT: u32 = 0;
pub const HSA_AMD_MEMORY_POOL_INFO_GLOBAL_FLAGS: u32 = 1;

pub const HSA_AMD_SEGMENT_GLOBAL: u32 = 0;
pub const HSA_AMD_SEGMENT_READONLY: u32 = 1;
pub const HSA_AMD_SEGMENT_PRIVATE: u32 = 2;
pub const HSA_AMD_SEGMENT_GROUP: u32 = 3;

pub const HSA_QUEUE_TYPE_MULTI: u32 = 0;

pub const HSA_SIGNAL_CONDITION_LT: u32 = 2;
pub const HSA_WAIT_STATE_BLOCKED: u32 = 0;

pub const HSA_EXECUTABLE_SYMBOL_INFO_KERNEL_OBJECT: u32 = 22;
pub const HSA_EXECUTABLE_SYMBOL_INFO_KERNEL_KERNARG_SEGMENT_SIZE: u32 = 11;
pub const HSA_EXECUTABLE_SYMBOL_INFO_KERNEL_GROUP_SEGMENT_SIZE: u32 = 13;
pub const HSA_EXECUTABLE_SYMBOL_INFO_KERNEL_PRIVATE_SEGMENT_SIZE: u32 = 14;

/// 名字缓冲区的长度，由运行时规定。
pub const AGENT_NAME_LEN: usize = 64;

macro_rules! api {
    ($( fn $name:ident($($arg:ty),* $(,)?) $(-> $ret:ty)?; )*) => {
        /// 运行时动态库的函数表。
        pub struct Api {
            $( pub $name: unsafe extern "C" fn($($arg),*) $(-> $ret)?, )*
            _lib: Library,
        }

        impl Api {
            pub fn load(path: impl AsRef<OsStr>) -> Result<Self, libloading::Error> {
                let lib = unsafe { Library::new(path) }?;
                $(
                    let $name = unsafe {
                        *lib.get::<unsafe extern "C" fn($($arg),*) $(-> $ret)?>(
                            concat!(stringify!($name), "\0").as_bytes(),
                        )?
                    };
                )*
                Ok(Self { $( $name, )* _lib: lib })
            }
        }
    };
}

api! {
    fn hsa_init() -> hsa_status_t;
    fn hsa_shut_down() -> hsa_status_t;
    fn hsa_status_string(hsa_status_t, *mut *const c_char) -> hsa_status_t;

    fn hsa_iterate_agents(agent_callback_t, *mut c_void) -> hsa_status_t;
    fn hsa_agent_get_info(hsa_agent_t, u32, *mut c_void) -> hsa_status_t;

    fn hsa_amd_agent_iterate_memory_pools(hsa_agent_t, pool_callback_t, *mut c_void) -> hsa_status_t;
    fn hsa_amd_memory_pool_get_info(hsa_amd_memory_pool_t, u32, *mut c_void) -> hsa_status_t;
    fn hsa_amd_memory_pool_allocate(hsa_amd_memory_pool_t, usize, u32, *mut *mut c_void) -> hsa_status_t;
    fn hsa_amd_memory_pool_free(*mut c_void) -> hsa_status_t;
    fn hsa_amd_agents_allow_access(u32, *const hsa_agent_t, *const u32, *const c_void) -> hsa_status_t;
    fn hsa_amd_memory_async_copy(
        *mut c_void,
        hsa_agent_t,
        *const c_void,
        hsa_agent_t,
        usize,
        u32,
        *const hsa_signal_t,
        hsa_signal_t,
    ) -> hsa_status_t;

    fn hsa_queue_create(
        hsa_agent_t,
        u32,
        u32,
        Option<queue_callback_t>,
        *mut c_void,
        u32,
        u32,
        *mut *mut hsa_queue_t,
    ) -> hsa_status_t;
    fn hsa_queue_destroy(*mut hsa_queue_t) -> hsa_status_t;
    fn hsa_queue_add_write_index_relaxed(*const hsa_queue_t, u64) -> u64;
    fn hsa_queue_load_read_index_relaxed(*const hsa_queue_t) -> u64;

    fn hsa_signal_create(i64, u32, *const hsa_agent_t, *mut hsa_signal_t) -> hsa_status_t;
    fn hsa_signal_destroy(hsa_signal_t) -> hsa_status_t;
    fn hsa_signal_store_relaxed(hsa_signal_t, i64);
    fn hsa_signal_wait_scacquire(hsa_signal_t, u32, i64, u64, u32) -> i64;

    fn hsa_code_object_reader_create_from_file(c_int, *mut hsa_code_object_reader_t) -> hsa_status_t;
    fn hsa_code_object_reader_destroy(hsa_code_object_reader_t) -> hsa_status_t;
    fn hsa_executable_create_alt(u32, u32, *const c_char, *mut hsa_executable_t) -> hsa_status_t;
    fn hsa_executable_load_agent_code_object(
        hsa_executable_t,
        hsa_agent_t,
        hsa_code_object_reader_t,
        *const c_char,
        *mut hsa_loaded_code_object_t,
    ) -> hsa_status_t;
    fn hsa_executable_freeze(hsa_executable_t, *const c_char) -> hsa_status_t;
    fn hsa_executable_get_symbol_by_name(
        hsa_executable_t,
        *const c_char,
        *const hsa_agent_t,
        *mut hsa_executable_symbol_t,
    ) -> hsa_status_t;
    fn hsa_executable_symbol_get_info(hsa_executable_symbol_t, u32, *mut c_void) -> hsa_status_t;
    fn hsa_executable_destroy(hsa_executable_t) -> hsa_status_t;
}
