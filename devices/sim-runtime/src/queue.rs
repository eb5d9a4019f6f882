use common::{Agent, Packet, PacketType, Ring, HEADER_SIZE, PACKET_SIZE};
use std::{
    alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout},
    ptr::{copy_nonoverlapping, NonNull},
    sync::{
        atomic::{
            AtomicU32, AtomicU64,
            Ordering::{Acquire, Relaxed, Release},
        },
        Arc,
    },
};

/// 软件队列。
///
/// 生产者侧通过 [`Ring`] 访问；[`SimQueue::try_consume`] 扮演硬件消费者。
#[derive(Clone)]
pub struct SimQueue(Arc<Inner>);

struct Inner {
    id: u64,
    agent: Agent,
    base: NonNull<u8>,
    layout: Layout,
    size: u32,
    write_index: AtomicU64,
    read_index: AtomicU64,
    doorbell: AtomicU64,
}

// 槽位存储只通过原子头部字与读写指针协调访问。
unsafe impl Send for Inner {}
unsafe impl Sync for Inner {}

impl Drop for Inner {
    fn drop(&mut self) {
        unsafe { dealloc(self.base.as_ptr(), self.layout) }
    }
}

impl SimQueue {
    pub(crate) fn new(id: u64, agent: Agent, size: u32) -> Self {
        let layout = Layout::from_size_align(size as usize * PACKET_SIZE, PACKET_SIZE).unwrap();
        let Some(base) = NonNull::new(unsafe { alloc_zeroed(layout) }) else {
            handle_alloc_error(layout)
        };
        // 硬件队列创建时所有槽位都是 INVALID
        for i in 0..size as usize {
            unsafe {
                base.as_ptr()
                    .add(i * PACKET_SIZE)
                    .write(PacketType::Invalid as u8)
            }
        }
        Self(Arc::new(Inner {
            id,
            agent,
            base,
            layout,
            size,
            write_index: AtomicU64::new(0),
            read_index: AtomicU64::new(0),
            doorbell: AtomicU64::new(0),
        }))
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    #[inline]
    pub fn agent(&self) -> Agent {
        self.0.agent
    }

    #[inline]
    pub fn write_index(&self) -> u64 {
        self.0.write_index.load(Relaxed)
    }

    #[inline]
    pub fn read_index(&self) -> u64 {
        self.0.read_index.load(Acquire)
    }

    /// 直接改写读指针，模拟消费者跳过若干包。
    #[inline]
    pub fn set_read_index(&self, val: u64) {
        self.0.read_index.store(val, Release)
    }

    /// 最近一次门铃写入的值。
    #[inline]
    pub fn doorbell(&self) -> u64 {
        self.0.doorbell.load(Relaxed)
    }

    fn header(&self, index: u64) -> (&AtomicU32, *mut u8) {
        let slot = unsafe {
            self.0
                .base
                .as_ptr()
                .add((index % self.0.size as u64) as usize * PACKET_SIZE)
        };
        (unsafe { &*slot.cast::<AtomicU32>() }, slot)
    }

    /// 按消费者的方式取出读指针处的包。
    ///
    /// 头部仍为 INVALID 时返回 `None`。取出后槽位头部复位为 INVALID，读指针加一。
    pub fn try_consume(&self) -> Option<Packet> {
        let read = self.0.read_index.load(Relaxed);
        let (header, slot) = self.header(read);

        let word = header.load(Acquire);
        if word as u8 == PacketType::Invalid as u8 {
            return None;
        }

        let mut bytes = [0u8; PACKET_SIZE];
        bytes[..HEADER_SIZE].copy_from_slice(&word.to_ne_bytes());
        unsafe {
            copy_nonoverlapping(
                slot.add(HEADER_SIZE),
                bytes[HEADER_SIZE..].as_mut_ptr(),
                PACKET_SIZE - HEADER_SIZE,
            )
        };

        header.store(PacketType::Invalid as u32, Release);
        self.0.read_index.store(read + 1, Release);
        Some(Packet::from_bytes(bytes))
    }
}

impl Ring for SimQueue {
    #[inline]
    fn size(&self) -> u32 {
        self.0.size
    }
    #[inline]
    fn base_address(&self) -> *mut u8 {
        self.0.base.as_ptr()
    }
    #[inline]
    fn add_write_index(&self, val: u64) -> u64 {
        self.0.write_index.fetch_add(val, Relaxed)
    }
    #[inline]
    fn load_read_index(&self) -> u64 {
        self.0.read_index.load(Relaxed)
    }
    #[inline]
    fn ring_doorbell(&self, val: u64) {
        self.0.doorbell.store(val, Relaxed)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_consume_empty() {
        let queue = SimQueue::new(1, Agent(1), 4);
        assert!(queue.try_consume().is_none());
        assert_eq!(queue.read_index(), 0);
        assert_eq!(queue.base_address() as usize % PACKET_SIZE, 0);
    }

    #[test]
    fn test_consume_published() {
        let queue = SimQueue::new(1, Agent(1), 4);
        let mut bytes = [0xabu8; PACKET_SIZE];
        bytes[..HEADER_SIZE].copy_from_slice(&(PacketType::KernelDispatch as u32).to_ne_bytes());
        let packet = Packet::from_bytes(bytes);

        let slot = queue.base_address();
        assert_eq!(queue.add_write_index(1), 0);
        assert_eq!(queue.write_index(), 1);
        unsafe {
            queue.write_payload(slot, packet.payload());
            queue.publish_header(slot, packet.header_word());
        }

        assert_eq!(queue.try_consume(), Some(packet));
        assert_eq!(queue.read_index(), 1);
        // 槽位已复位
        queue.set_read_index(0);
        assert!(queue.try_consume().is_none());
    }
}
