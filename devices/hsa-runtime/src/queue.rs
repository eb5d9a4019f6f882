use crate::ffi::{hsa_queue_t, Api};
use common::Ring;
use std::{ptr::NonNull, sync::Arc};

/// 运行时创建的硬件队列。
pub struct HsaQueue {
    pub(crate) raw: NonNull<hsa_queue_t>,
    pub(crate) api: Arc<Api>,
}

// 队列结构由运行时持有，读写指针的访问都经过运行时的原子接口。
unsafe impl Send for HsaQueue {}
unsafe impl Sync for HsaQueue {}

impl HsaQueue {
    #[inline]
    pub fn id(&self) -> u64 {
        unsafe { self.raw.as_ref() }.id
    }

    #[inline]
    pub fn as_raw(&self) -> *mut hsa_queue_t {
        self.raw.as_ptr()
    }
}

impl Ring for HsaQueue {
    #[inline]
    fn size(&self) -> u32 {
        unsafe { self.raw.as_ref() }.size
    }

    #[inline]
    fn base_address(&self) -> *mut u8 {
        unsafe { self.raw.as_ref() }.base_address.cast()
    }

    #[inline]
    fn add_write_index(&self, val: u64) -> u64 {
        unsafe { (self.api.hsa_queue_add_write_index_relaxed)(self.raw.as_ptr(), val) }
    }

    #[inline]
    fn load_read_index(&self) -> u64 {
        unsafe { (self.api.hsa_queue_load_read_index_relaxed)(self.raw.as_ptr()) }
    }

    #[inline]
    fn ring_doorbell(&self, val: u64) {
        let doorbell = unsafe { self.raw.as_ref() }.doorbell_signal;
        unsafe { (self.api.hsa_signal_store_relaxed)(doorbell, val as i64) }
    }
}
