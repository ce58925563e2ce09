//! Dynamic values carried by a transaction and the types that describe them.

/// Token naming a registered endpoint.
///
/// Tokens are minted by the receiving side's registry; on the wire a handle is
/// nothing more than this number.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct HandleId(pub u64);

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handle-{}", self.0)
    }
}

/// Declared type of a parameter or return value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Void,
    Bool,
    I32,
    I64,
    String,
    Handle,
    /// Homogeneous list.
    List(Box<ValueType>),
}

impl ValueType {
    pub fn list_of(inner: ValueType) -> Self {
        Self::List(Box::new(inner))
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Void => write!(f, "void"),
            Self::Bool => write!(f, "bool"),
            Self::I32 => write!(f, "i32"),
            Self::I64 => write!(f, "i64"),
            Self::String => write!(f, "string"),
            Self::Handle => write!(f, "handle"),
            Self::List(inner) => write!(f, "list<{}>", inner),
        }
    }
}

/// A value crossing a transaction boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Void,
    Bool(bool),
    I32(i32),
    I64(i64),
    String(String),
    Handle(HandleId),
    List(Vec<Value>),
}

impl Value {
    /// Returns `true` if this value is an instance of `ty`.
    pub fn matches(&self, ty: &ValueType) -> bool {
        match (self, ty) {
            (Value::Void, ValueType::Void)
            | (Value::Bool(_), ValueType::Bool)
            | (Value::I32(_), ValueType::I32)
            | (Value::I64(_), ValueType::I64)
            | (Value::String(_), ValueType::String)
            | (Value::Handle(_), ValueType::Handle) => true,
            (Value::List(items), ValueType::List(inner)) => items.iter().all(|v| v.matches(inner)),
            _ => false,
        }
    }

    /// Short name of the value's shape, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Bool(_) => "bool",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::String(_) => "string",
            Value::Handle(_) => "handle",
            Value::List(_) => "list",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<HandleId> {
        match self {
            Value::Handle(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self { Value::Bool(v) }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self { Value::I32(v) }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self { Value::I64(v) }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self { Value::String(v.to_string()) }
}

impl From<String> for Value {
    fn from(v: String) -> Self { Value::String(v) }
}

impl From<HandleId> for Value {
    fn from(v: HandleId) -> Self { Value::Handle(v) }
}
