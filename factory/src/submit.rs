use common::{Packet, Ring, PACKET_SIZE};
use log::debug;
use std::thread::yield_now;

/// 把 `packet` 发布到队列，返回为它分配的写指针。
///
/// 队满时让出处理器并无限期等待消费者推进读指针。
/// 同一队列上的生产者需要由调用者互斥：多个线程交错执行本函数会破坏槽位。
pub fn submit<R: Ring + ?Sized>(queue: &R, packet: &Packet) -> u64 {
    let size = queue.size() as u64;
    assert_ne!(size, 0, "queue has no slots");

    let write = queue.add_write_index(1);
    while write.wrapping_sub(queue.load_read_index()) >= size {
        yield_now()
    }

    let slot = if size.is_power_of_two() {
        write & (size - 1)
    } else {
        write % size
    };
    unsafe {
        let slot = queue.base_address().add(slot as usize * PACKET_SIZE);
        queue.write_payload(slot, packet.payload());
        queue.publish_header(slot, packet.header_word());
    }

    queue.ring_doorbell(write);
    debug!("submitted packet {write}");
    write
}
