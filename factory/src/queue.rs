use crate::{submit, AgentInfo, Factory};
use common::{Packet, Platform, Signal};
use log::{info, warn};

impl<P: Platform> Factory<P> {
    /// 在加速器上创建可容纳 `packets` 个包的队列，由调用者销毁。
    pub fn create_queue(&self, agent: &AgentInfo, packets: u32) -> Option<P::Queue> {
        match self.platform.queue_create(agent.agent, packets) {
            Ok(queue) => {
                info!("created queue of {packets} packets on agent {:#x}", agent.agent.0);
                Some(queue)
            }
            Err(s) => {
                warn!("create queue failed: {}", self.platform.status_string(s));
                None
            }
        }
    }

    pub fn destroy_queue(&self, queue: P::Queue) -> bool {
        match self.platform.queue_destroy(queue) {
            Ok(()) => true,
            Err(s) => {
                warn!("destroy queue failed: {}", self.platform.status_string(s));
                false
            }
        }
    }

    pub fn create_signal(&self, value: i64) -> Option<Signal> {
        match self.platform.signal_create(value) {
            Ok(signal) => Some(signal),
            Err(s) => {
                warn!("create signal failed: {}", self.platform.status_string(s));
                None
            }
        }
    }

    pub fn destroy_signal(&self, signal: Signal) -> bool {
        match self.platform.signal_destroy(signal) {
            Ok(()) => true,
            Err(s) => {
                warn!("destroy signal failed: {}", self.platform.status_string(s));
                false
            }
        }
    }

    /// 见 [`submit`](crate::submit())。
    #[inline]
    pub fn submit(&self, queue: &P::Queue, packet: &Packet) -> u64 {
        submit(queue, packet)
    }
}
