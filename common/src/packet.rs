use crate::Signal;

/// 队列槽位的字节数。
pub const PACKET_SIZE: usize = 64;
/// 槽位中头部字的字节数。
pub const HEADER_SIZE: usize = std::mem::size_of::<u32>();

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum PacketType {
    VendorSpecific = 0,
    Invalid = 1,
    KernelDispatch = 2,
    BarrierAnd = 3,
    AgentDispatch = 4,
    BarrierOr = 5,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum FenceScope {
    None = 0,
    Agent = 1,
    System = 2,
}

const HEADER_BARRIER: u16 = 8;
const HEADER_ACQUIRE_FENCE_SCOPE: u16 = 9;
const HEADER_RELEASE_FENCE_SCOPE: u16 = 11;

/// 组装 16 位包头。
#[inline]
pub const fn header(ty: PacketType, barrier: bool, acquire: FenceScope, release: FenceScope) -> u16 {
    (ty as u16)
        | ((barrier as u16) << HEADER_BARRIER)
        | ((acquire as u16) << HEADER_ACQUIRE_FENCE_SCOPE)
        | ((release as u16) << HEADER_RELEASE_FENCE_SCOPE)
}

/// 一个命令包，恰好占据一个队列槽位。
///
/// 第一个 32 位字是头部（16 位包头 + 16 位 setup）。
/// 发布时头部必须最后写入，见 [`Ring`](crate::Ring)。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(C, align(64))]
pub struct Packet([u8; PACKET_SIZE]);

impl Default for Packet {
    #[inline]
    fn default() -> Self {
        Self::invalid()
    }
}

impl Packet {
    /// 头部为 INVALID、其余全零的包。硬件不会处理这样的槽位。
    pub const fn invalid() -> Self {
        let mut bytes = [0; PACKET_SIZE];
        bytes[0] = PacketType::Invalid as u8;
        Self(bytes)
    }

    #[inline]
    pub const fn from_bytes(bytes: [u8; PACKET_SIZE]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub const fn as_bytes(&self) -> &[u8; PACKET_SIZE] {
        &self.0
    }

    /// 头部字，即发布时最后写入的 32 位。
    #[inline]
    pub fn header_word(&self) -> u32 {
        u32::from_ne_bytes(self.0[..HEADER_SIZE].try_into().unwrap())
    }

    /// 头部字之后的全部字节。
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.0[HEADER_SIZE..]
    }

    #[inline]
    pub fn packet_type(&self) -> u8 {
        self.0[0]
    }

    pub fn dispatch(dispatch: &Dispatch) -> Self {
        let Dispatch {
            header,
            workgroup,
            grid,
            private_segment_size,
            group_segment_size,
            kernel_object,
            kernarg_address,
            completion_signal,
        } = *dispatch;
        assert!(workgroup.iter().all(|&n| n > 0));
        assert!(grid.iter().all(|&n| n > 0));

        let dims = if grid[2] > 1 || workgroup[2] > 1 {
            3u16
        } else if grid[1] > 1 || workgroup[1] > 1 {
            2
        } else {
            1
        };

        let mut w = Writer::new();
        w.u16(header).u16(dims);
        for n in workgroup {
            w.u16(n);
        }
        w.u16(0);
        for n in grid {
            w.u32(n);
        }
        w.u32(private_segment_size)
            .u32(group_segment_size)
            .u64(kernel_object)
            .u64(kernarg_address)
            .u64(0)
            .u64(completion_signal.map_or(0, |s| s.0));
        w.finish()
    }

    /// AND 屏障包：等待至多 5 个依赖信号全部归零。
    pub fn barrier_and(header: u16, deps: &[Signal], completion_signal: Option<Signal>) -> Self {
        assert!(deps.len() <= 5, "barrier packet holds at most 5 dependencies");

        let mut w = Writer::new();
        w.u16(header).u16(0).u32(0);
        for i in 0..5 {
            w.u64(deps.get(i).map_or(0, |s| s.0));
        }
        w.u64(0).u64(completion_signal.map_or(0, |s| s.0));
        w.finish()
    }
}

/// 内核派发包的字段。
#[derive(Clone, Copy, Debug)]
pub struct Dispatch {
    pub header: u16,
    pub workgroup: [u16; 3],
    pub grid: [u32; 3],
    pub private_segment_size: u32,
    pub group_segment_size: u32,
    pub kernel_object: u64,
    pub kernarg_address: u64,
    pub completion_signal: Option<Signal>,
}

struct Writer {
    bytes: [u8; PACKET_SIZE],
    len: usize,
}

impl Writer {
    #[inline]
    const fn new() -> Self {
        Self {
            bytes: [0; PACKET_SIZE],
            len: 0,
        }
    }

    #[inline]
    fn put(&mut self, src: &[u8]) -> &mut Self {
        self.bytes[self.len..][..src.len()].copy_from_slice(src);
        self.len += src.len();
        self
    }

    #[inline]
    fn u16(&mut self, val: u16) -> &mut Self {
        self.put(&val.to_ne_bytes())
    }

    #[inline]
    fn u32(&mut self, val: u32) -> &mut Self {
        self.put(&val.to_ne_bytes())
    }

    #[inline]
    fn u64(&mut self, val: u64) -> &mut Self {
        self.put(&val.to_ne_bytes())
    }

    #[inline]
    fn finish(&self) -> Packet {
        assert_eq!(self.len, PACKET_SIZE);
        Packet(self.bytes)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_header() {
        let h = header(
            PacketType::KernelDispatch,
            true,
            FenceScope::System,
            FenceScope::Agent,
        );
        assert_eq!(h & 0xff, 2);
        assert_eq!((h >> 8) & 1, 1);
        assert_eq!((h >> 9) & 3, 2);
        assert_eq!((h >> 11) & 3, 1);
    }

    #[test]
    fn test_dispatch_layout() {
        let h = header(
            PacketType::KernelDispatch,
            false,
            FenceScope::System,
            FenceScope::System,
        );
        let packet = Packet::dispatch(&Dispatch {
            header: h,
            workgroup: [4, 4, 1],
            grid: [1024, 1024, 1],
            private_segment_size: 0,
            group_segment_size: 256,
            kernel_object: 0xdead_beef,
            kernarg_address: 0x1000,
            completion_signal: Some(Signal(7)),
        });
        let bytes = packet.as_bytes();
        assert_eq!(packet.header_word(), h as u32 | 2 << 16);
        assert_eq!(u16::from_ne_bytes([bytes[4], bytes[5]]), 4);
        assert_eq!(u32::from_ne_bytes(bytes[12..16].try_into().unwrap()), 1024);
        assert_eq!(u32::from_ne_bytes(bytes[28..32].try_into().unwrap()), 256);
        assert_eq!(
            u64::from_ne_bytes(bytes[32..40].try_into().unwrap()),
            0xdead_beef
        );
        assert_eq!(u64::from_ne_bytes(bytes[40..48].try_into().unwrap()), 0x1000);
        assert_eq!(u64::from_ne_bytes(bytes[56..64].try_into().unwrap()), 7);
        assert_eq!(packet.payload().len(), PACKET_SIZE - HEADER_SIZE);
    }

    #[test]
    fn test_barrier_and() {
        let h = header(PacketType::BarrierAnd, true, FenceScope::None, FenceScope::None);
        let packet = Packet::barrier_and(h, &[Signal(1), Signal(2)], None);
        let bytes = packet.as_bytes();
        assert_eq!(packet.packet_type(), PacketType::BarrierAnd as u8);
        assert_eq!(u64::from_ne_bytes(bytes[8..16].try_into().unwrap()), 1);
        assert_eq!(u64::from_ne_bytes(bytes[16..24].try_into().unwrap()), 2);
        assert_eq!(u64::from_ne_bytes(bytes[24..32].try_into().unwrap()), 0);
    }

    #[test]
    fn test_invalid() {
        let packet = Packet::default();
        assert_eq!(packet.packet_type(), PacketType::Invalid as u8);
        assert_eq!(std::mem::align_of::<Packet>(), PACKET_SIZE);
        assert_eq!(std::mem::size_of::<Packet>(), PACKET_SIZE);
    }
}
