use crate::{HEADER_SIZE, PACKET_SIZE};
use std::{
    ptr::copy_nonoverlapping,
    sync::atomic::{AtomicU32, Ordering::Release},
};

/// 硬件可见的命令环形队列。
///
/// 生产者侧所需的全部原语。消费者是异步推进读指针的硬件，
/// 生产者与消费者之间唯一的同步边是槽位头部字上的 release 写 / acquire 读。
pub trait Ring {
    /// 槽位数。
    fn size(&self) -> u32;
    /// 槽位存储的基址，按 [`PACKET_SIZE`] 对齐。
    fn base_address(&self) -> *mut u8;
    /// 原子地把写指针加上 `val`，返回旧值。relaxed。
    fn add_write_index(&self, val: u64) -> u64;
    /// 读取消费者的读指针。relaxed。
    fn load_read_index(&self) -> u64;
    /// 写门铃信号。relaxed。
    fn ring_doorbell(&self, val: u64);

    /// 把头部字之后的字节写入槽位。
    ///
    /// # Safety
    ///
    /// `slot` 必须指向本队列的一个槽位，且该槽位此时归生产者所有。
    #[inline]
    unsafe fn write_payload(&self, slot: *mut u8, payload: &[u8]) {
        debug_assert_eq!(payload.len(), PACKET_SIZE - HEADER_SIZE);
        copy_nonoverlapping(payload.as_ptr(), slot.add(HEADER_SIZE), payload.len())
    }

    /// 以 release 语义写入头部字，使槽位对消费者可见。
    ///
    /// # Safety
    ///
    /// 同 [`Ring::write_payload`]，且负载必须已经写完。
    #[inline]
    unsafe fn publish_header(&self, slot: *mut u8, header: u32) {
        (*slot.cast::<AtomicU32>()).store(header, Release)
    }
}

impl<R: Ring + ?Sized> Ring for &R {
    #[inline]
    fn size(&self) -> u32 {
        (**self).size()
    }
    #[inline]
    fn base_address(&self) -> *mut u8 {
        (**self).base_address()
    }
    #[inline]
    fn add_write_index(&self, val: u64) -> u64 {
        (**self).add_write_index(val)
    }
    #[inline]
    fn load_read_index(&self) -> u64 {
        (**self).load_read_index()
    }
    #[inline]
    fn ring_doorbell(&self, val: u64) {
        (**self).ring_doorbell(val)
    }
    #[inline]
    unsafe fn write_payload(&self, slot: *mut u8, payload: &[u8]) {
        (**self).write_payload(slot, payload)
    }
    #[inline]
    unsafe fn publish_header(&self, slot: *mut u8, header: u32) {
        (**self).publish_header(slot, header)
    }
}

impl<R: Ring + ?Sized> Ring for std::sync::Arc<R> {
    #[inline]
    fn size(&self) -> u32 {
        (**self).size()
    }
    #[inline]
    fn base_address(&self) -> *mut u8 {
        (**self).base_address()
    }
    #[inline]
    fn add_write_index(&self, val: u64) -> u64 {
        (**self).add_write_index(val)
    }
    #[inline]
    fn load_read_index(&self) -> u64 {
        (**self).load_read_index()
    }
    #[inline]
    fn ring_doorbell(&self, val: u64) {
        (**self).ring_doorbell(val)
    }
    #[inline]
    unsafe fn write_payload(&self, slot: *mut u8, payload: &[u8]) {
        (**self).write_payload(slot, payload)
    }
    #[inline]
    unsafe fn publish_header(&self, slot: *mut u8, header: u32) {
        (**self).publish_header(slot, header)
    }
}
