use common::Status;
use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorKind {
    RuntimeInit,
    AgentDiscovery,
    MissingArtifact,
    CodeObject,
    Executable,
    SymbolNotFound,
}

/// 资源工厂的致命错误。
///
/// `status` 是触发错误的运行时状态码，不是由运行时调用引起的错误没有状态码。
#[derive(Clone, Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub status: Option<Status>,
    pub info: String,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.info)?;
        if let Some(status) = self.status {
            write!(f, " ({status})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

pub mod functions {
    use super::{Error, ErrorKind::*};
    use common::Status;

    macro_rules! builder {
        ($ty:ident: $name:ident $kind:expr) => {
            #[inline]
            pub fn $name(status: impl Into<Option<Status>>, info: impl Into<String>) -> $ty {
                $ty {
                    kind: $kind,
                    status: status.into(),
                    info: info.into(),
                }
            }
        };
    }

    builder!(Error: runtime_init      RuntimeInit    );
    builder!(Error: agent_discovery   AgentDiscovery );
    builder!(Error: missing_artifact  MissingArtifact);
    builder!(Error: code_object       CodeObject     );
    builder!(Error: executable        Executable     );
    builder!(Error: symbol_not_found  SymbolNotFound );
}

#[test]
fn test_display() {
    use functions::*;

    let e = missing_artifact(None, "kernel.co");
    assert_eq!(e.kind, ErrorKind::MissingArtifact);
    assert_eq!(e.to_string(), "MissingArtifact: kernel.co");

    let e = agent_discovery(Status::ERROR, "iterate agents");
    assert_eq!(e.status, Some(Status::ERROR));
    assert!(e.to_string().starts_with("AgentDiscovery: iterate agents ("));
}
