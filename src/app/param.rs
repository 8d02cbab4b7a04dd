//! Loosely-typed values handed over by a host binding.
//!
//! Advertisement payloads and pairing PINs arrive from the host application
//! without static typing.  [`HostParam`] carries them as-is so the engine can
//! apply the type checks itself and degrade safely on anything unexpected.

#[derive(Debug, Clone, PartialEq)]
pub enum HostParam {
    Bytes(Vec<u8>),
    Text(String),
    Integer(i64),
    Boolean(bool),
    List(Vec<HostParam>),
    Table(Vec<(String, HostParam)>),
}

impl HostParam {
    /// Short type name for log lines.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "bytes",
            Self::Text(_) => "string",
            Self::Integer(_) => "integer",
            Self::Boolean(_) => "bool",
            Self::List(_) => "array",
            Self::Table(_) => "table",
        }
    }
}

impl From<&[u8]> for HostParam {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for HostParam {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<&str> for HostParam {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<i64> for HostParam {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for HostParam {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}
