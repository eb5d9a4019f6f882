use crate::{
    code_object, executable, missing_artifact, symbol_not_found, AgentInfo, Error, Factory,
};
use common::{
    CodeObjectReader, Executable, FloatRounding, KernelDescriptor, Platform, Profile, Status,
    Symbol,
};
use log::{info, warn};
use std::{ffi::CString, fs::File, path::Path};

impl<P: Platform> Factory<P> {
    /// 加载代码对象并解析其中名为 `name` 的符号。
    ///
    /// 返回冻结的可执行体和符号，可执行体由调用者销毁。
    pub fn load_kernel(
        &self,
        agent: &AgentInfo,
        path: impl AsRef<Path>,
        name: &str,
    ) -> Result<(Executable, Symbol), Error> {
        let path = path.as_ref();
        info!("code object filename: {}", path.display());

        let file = File::open(path).map_err(|e| {
            warn!("failed to load {}: {e}", path.display());
            missing_artifact(None, format!("{}: {e}", path.display()))
        })?;
        let reader = self
            .platform
            .code_object_reader_create(&file)
            .map_err(|s| code_object(s, format!("create reader of {}", path.display())))?;

        let ans = self.build_executable(agent, reader, name);
        if let Err(s) = self.platform.code_object_reader_destroy(reader) {
            warn!("destroy code object reader failed: {}", self.platform.status_string(s));
        }
        ans
    }

    fn build_executable(
        &self,
        agent: &AgentInfo,
        reader: CodeObjectReader,
        name: &str,
    ) -> Result<(Executable, Symbol), Error> {
        let exe = self
            .platform
            .executable_create(Profile::Full, FloatRounding::Default)
            .map_err(|s| executable(s, "create executable"))?;

        let resolve = || -> Result<Symbol, Error> {
            self.platform
                .executable_load(exe, agent.agent, reader)
                .map_err(|s| code_object(s, "load code object"))?;
            self.platform
                .executable_freeze(exe)
                .map_err(|s| executable(s, "freeze executable"))?;
            let cname =
                CString::new(name).map_err(|_| symbol_not_found(None, format!("{name:?}")))?;
            self.platform
                .executable_symbol(exe, &cname, agent.agent)
                .map_err(|s| symbol_not_found(s, name))
        };

        match resolve() {
            Ok(symbol) => Ok((exe, symbol)),
            Err(e) => {
                warn!("{e}");
                if let Err(s) = self.platform.executable_destroy(exe) {
                    warn!("destroy executable failed: {}", self.platform.status_string(s));
                }
                Err(e)
            }
        }
    }

    /// 符号的内核对象和段大小。
    pub fn kernel_descriptor(&self, symbol: Symbol) -> Result<KernelDescriptor, Status> {
        self.platform.kernel_descriptor(symbol)
    }

    pub fn destroy_executable(&self, executable: Executable) -> bool {
        match self.platform.executable_destroy(executable) {
            Ok(()) => true,
            Err(s) => {
                warn!("destroy executable failed: {}", self.platform.status_string(s));
                false
            }
        }
    }
}
