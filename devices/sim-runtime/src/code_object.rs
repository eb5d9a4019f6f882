//! 软件平台的代码对象格式：UTF-8 文本，每行一个内核符号，可选地跟一个 kernarg 段大小。
//!
//! ```text
//! # comment
//! matrix_transpose 24
//! copy_kernel
//! ```

use common::{Agent, Status};

#[derive(Clone, PartialEq, Eq, Debug)]
pub(crate) struct KernelEntry {
    pub name: String,
    pub kernarg_segment_size: u32,
}

pub(crate) fn parse(bytes: &[u8]) -> Result<Vec<KernelEntry>, Status> {
    let text = std::str::from_utf8(bytes).map_err(|_| Status::ERROR_INVALID_CODE_OBJECT)?;
    let mut ans = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let name = fields.next().unwrap().to_string();
        let kernarg_segment_size = match fields.next() {
            Some(size) => size
                .parse()
                .map_err(|_| Status::ERROR_INVALID_CODE_OBJECT)?,
            None => 0,
        };
        if fields.next().is_some() {
            return Err(Status::ERROR_INVALID_CODE_OBJECT);
        }
        ans.push(KernelEntry {
            name,
            kernarg_segment_size,
        })
    }
    if ans.is_empty() {
        Err(Status::ERROR_INVALID_CODE_OBJECT)
    } else {
        Ok(ans)
    }
}

pub(crate) struct SimExecutable {
    pub frozen: bool,
    pub loaded: Vec<(Agent, KernelEntry)>,
}

impl SimExecutable {
    pub fn new() -> Self {
        Self {
            frozen: false,
            loaded: Vec::new(),
        }
    }

    pub fn find(&self, name: &str, agent: Agent) -> Option<&KernelEntry> {
        self.loaded
            .iter()
            .find(|(a, k)| *a == agent && k.name == name)
            .map(|(_, k)| k)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse() {
        let entries = parse(b"# kernels\nmatrix_transpose 24\n\n  copy_kernel  \n").unwrap();
        assert_eq!(
            entries,
            [
                KernelEntry {
                    name: "matrix_transpose".into(),
                    kernarg_segment_size: 24,
                },
                KernelEntry {
                    name: "copy_kernel".into(),
                    kernarg_segment_size: 0,
                },
            ]
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert_eq!(parse(b""), Err(Status::ERROR_INVALID_CODE_OBJECT));
        assert_eq!(parse(b"k x"), Err(Status::ERROR_INVALID_CODE_OBJECT));
        assert_eq!(parse(b"k 1 2"), Err(Status::ERROR_INVALID_CODE_OBJECT));
        assert_eq!(parse(&[0xff, 0xfe]), Err(Status::ERROR_INVALID_CODE_OBJECT));
    }
}
