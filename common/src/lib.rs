#![deny(warnings)]

mod handle;
mod packet;
mod platform;
mod ring;
mod status;

pub use handle::{
    Agent, AgentAttr, CodeObjectReader, DeviceType, Executable, FloatRounding, GlobalFlags,
    KernelDescriptor, MemPool, Profile, Segment, Signal, Symbol,
};
pub use packet::{header, Dispatch, FenceScope, Packet, PacketType, HEADER_SIZE, PACKET_SIZE};
pub use platform::{Platform, Visit};
pub use ring::Ring;
pub use status::Status;

/// 把 `size` 向上取整到 `align` 的倍数，溢出时返回 `None`。`align` 必须是 2 的幂。
#[inline]
pub const fn align_up(size: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    let mask = align - 1;
    match size.checked_add(mask) {
        Some(n) => Some(n & !mask),
        None => None,
    }
}

#[test]
fn test_align_up() {
    assert_eq!(align_up(0, 0x1000), Some(0));
    assert_eq!(align_up(1, 0x1000), Some(0x1000));
    assert_eq!(align_up(0x1000, 0x1000), Some(0x1000));
    assert_eq!(align_up(0x1001, 0x1000), Some(0x2000));
    assert_eq!(align_up(usize::MAX - 0xfff, 0x1000), Some(usize::MAX - 0xfff));
    assert_eq!(align_up(usize::MAX - 10, 0x1000), None);
}
