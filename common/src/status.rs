use core::fmt;
use std::error::Error;

/// 运行时返回的状态码。
///
/// 数值与运行时头文件中的定义一致，因此可以直接在 FFI 边界上传递。
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Status(pub u32);

impl Status {
    pub const SUCCESS: Self = Self(0x0);
    /// 迭代回调要求提前结束。不是错误。
    pub const INFO_BREAK: Self = Self(0x1);
    pub const ERROR: Self = Self(0x1000);
    pub const ERROR_INVALID_ARGUMENT: Self = Self(0x1001);
    pub const ERROR_INVALID_QUEUE_CREATION: Self = Self(0x1002);
    pub const ERROR_INVALID_ALLOCATION: Self = Self(0x1003);
    pub const ERROR_INVALID_AGENT: Self = Self(0x1004);
    pub const ERROR_INVALID_REGION: Self = Self(0x1005);
    pub const ERROR_INVALID_SIGNAL: Self = Self(0x1006);
    pub const ERROR_INVALID_QUEUE: Self = Self(0x1007);
    pub const ERROR_OUT_OF_RESOURCES: Self = Self(0x1008);
    pub const ERROR_INVALID_PACKET_FORMAT: Self = Self(0x1009);
    pub const ERROR_RESOURCE_FREE: Self = Self(0x100A);
    pub const ERROR_NOT_INITIALIZED: Self = Self(0x100B);
    pub const ERROR_INVALID_CODE_OBJECT: Self = Self(0x1010);
    pub const ERROR_INVALID_EXECUTABLE: Self = Self(0x1011);
    pub const ERROR_FROZEN_EXECUTABLE: Self = Self(0x1012);
    pub const ERROR_INVALID_SYMBOL_NAME: Self = Self(0x1013);
    pub const ERROR_INVALID_EXECUTABLE_SYMBOL: Self = Self(0x1019);
    pub const ERROR_INVALID_CODE_OBJECT_READER: Self = Self(0x1021);
    pub const ERROR_FATAL: Self = Self(0x1026);

    /// 把原始状态码转换为 [`Result`]。
    ///
    /// 只有 [`Status::SUCCESS`] 被视为成功，[`Status::INFO_BREAK`] 由调用者自行解释。
    #[inline]
    pub const fn check(raw: u32) -> Result<(), Self> {
        if raw == Self::SUCCESS.0 {
            Ok(())
        } else {
            Err(Self(raw))
        }
    }

    #[inline]
    pub const fn is_success(self) -> bool {
        self.0 == Self::SUCCESS.0
    }

    pub const fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::SUCCESS => "SUCCESS",
            Self::INFO_BREAK => "INFO_BREAK",
            Self::ERROR => "ERROR",
            Self::ERROR_INVALID_ARGUMENT => "ERROR_INVALID_ARGUMENT",
            Self::ERROR_INVALID_QUEUE_CREATION => "ERROR_INVALID_QUEUE_CREATION",
            Self::ERROR_INVALID_ALLOCATION => "ERROR_INVALID_ALLOCATION",
            Self::ERROR_INVALID_AGENT => "ERROR_INVALID_AGENT",
            Self::ERROR_INVALID_REGION => "ERROR_INVALID_REGION",
            Self::ERROR_INVALID_SIGNAL => "ERROR_INVALID_SIGNAL",
            Self::ERROR_INVALID_QUEUE => "ERROR_INVALID_QUEUE",
            Self::ERROR_OUT_OF_RESOURCES => "ERROR_OUT_OF_RESOURCES",
            Self::ERROR_INVALID_PACKET_FORMAT => "ERROR_INVALID_PACKET_FORMAT",
            Self::ERROR_RESOURCE_FREE => "ERROR_RESOURCE_FREE",
            Self::ERROR_NOT_INITIALIZED => "ERROR_NOT_INITIALIZED",
            Self::ERROR_INVALID_CODE_OBJECT => "ERROR_INVALID_CODE_OBJECT",
            Self::ERROR_INVALID_EXECUTABLE => "ERROR_INVALID_EXECUTABLE",
            Self::ERROR_FROZEN_EXECUTABLE => "ERROR_FROZEN_EXECUTABLE",
            Self::ERROR_INVALID_SYMBOL_NAME => "ERROR_INVALID_SYMBOL_NAME",
            Self::ERROR_INVALID_EXECUTABLE_SYMBOL => "ERROR_INVALID_EXECUTABLE_SYMBOL",
            Self::ERROR_INVALID_CODE_OBJECT_READER => "ERROR_INVALID_CODE_OBJECT_READER",
            Self::ERROR_FATAL => "ERROR_FATAL",
            _ => return None,
        })
    }
}

impl Error for Status {}

impl fmt::Debug for Status {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Status({:#x})", self.0)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({:#x})", self.0),
            None => write!(f, "unknown status ({:#x})", self.0),
        }
    }
}

#[test]
fn test_check() {
    assert_eq!(Status::check(0), Ok(()));
    assert!(Status::SUCCESS.is_success());
    assert!(!Status::INFO_BREAK.is_success());
    assert_eq!(Status::check(0x1021), Err(Status::ERROR_INVALID_CODE_OBJECT_READER));
    assert_eq!(Status::ERROR_FATAL.to_string(), "ERROR_FATAL (0x1026)");
    assert_eq!(
        Status(0x1019).to_string(),
        "ERROR_INVALID_EXECUTABLE_SYMBOL (0x1019)"
    );
    assert_eq!(Status::check(0x1008), Err(Status::ERROR_OUT_OF_RESOURCES));
    assert_eq!(
        Status::ERROR_INVALID_AGENT.to_string(),
        "ERROR_INVALID_AGENT (0x1004)"
    );
    assert_eq!(Status(0x7777).to_string(), "unknown status (0x7777)");
}
