use crate::{AgentInfo, Factory};
use common::{Agent, Platform};
use log::warn;

impl<P: Platform> Factory<P> {
    /// 把加速器上的 `size` 字节同步拷贝到主机。
    ///
    /// # Safety
    ///
    /// `src` 必须是 `agent` 可访问的有效存储，`dst` 必须是第一个主机代理可访问的有效存储，
    /// 两者都至少 `size` 字节。
    #[inline]
    pub unsafe fn copy_to_host(
        &self,
        agent: &AgentInfo,
        dst: *mut u8,
        src: *const u8,
        size: usize,
    ) -> bool {
        self.copy_to_host_raw(agent.agent, dst, src, size)
    }

    /// 同 [`Factory::copy_to_host`]，以代理句柄指定源。
    ///
    /// # Safety
    ///
    /// 同 [`Factory::copy_to_host`]。
    pub unsafe fn copy_to_host_raw(
        &self,
        agent: Agent,
        dst: *mut u8,
        src: *const u8,
        size: usize,
    ) -> bool {
        let Some(host) = self.catalog.host(0) else {
            warn!("copy to host without host agent");
            return false;
        };
        let signal = match self.platform.signal_create(1) {
            Ok(signal) => signal,
            Err(s) => {
                warn!("create copy signal failed: {}", self.platform.status_string(s));
                return false;
            }
        };

        let mut ok = match self
            .platform
            .async_copy(dst, host.agent, src, agent, size, signal)
        {
            Ok(()) => match self.platform.signal_wait_lt(signal, 1) {
                0 => true,
                value => {
                    warn!("copy signal ends at {value}");
                    false
                }
            },
            Err(s) => {
                warn!("async copy failed: {}", self.platform.status_string(s));
                false
            }
        };

        if let Err(s) = self.platform.signal_destroy(signal) {
            warn!("destroy copy signal failed: {}", self.platform.status_string(s));
            ok = false
        }
        ok
    }
}
