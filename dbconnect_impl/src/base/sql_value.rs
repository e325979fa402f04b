/// A dynamically typed value, shaped by a [`SqlType`](crate::SqlType).
///
/// Parameter values are destructured against the request's parameter
/// descriptor; decoded rows are built up along the row descriptor.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    Unit,
    Bool(bool),
    Int(i64),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float(f64),
    Text(String),
    Octets(Vec<u8>),
    Date(time::Date),
    Timestamp(time::OffsetDateTime),
    TimeSpan(time::Duration),
    /// An absent optional group.
    Null,
    /// A present optional group.
    Some(Box<SqlValue>),
    Tup2(Box<SqlValue>, Box<SqlValue>),
    Tup3(Box<SqlValue>, Box<SqlValue>, Box<SqlValue>),
    Tup4(Box<SqlValue>, Box<SqlValue>, Box<SqlValue>, Box<SqlValue>),
}

impl SqlValue {
    pub fn some(v: SqlValue) -> SqlValue {
        SqlValue::Some(Box::new(v))
    }

    pub fn tup2(v0: SqlValue, v1: SqlValue) -> SqlValue {
        SqlValue::Tup2(Box::new(v0), Box::new(v1))
    }

    pub fn tup3(v0: SqlValue, v1: SqlValue, v2: SqlValue) -> SqlValue {
        SqlValue::Tup3(Box::new(v0), Box::new(v1), Box::new(v2))
    }

    pub fn tup4(v0: SqlValue, v1: SqlValue, v2: SqlValue, v3: SqlValue) -> SqlValue {
        SqlValue::Tup4(Box::new(v0), Box::new(v1), Box::new(v2), Box::new(v3))
    }

    /// A short kind name for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SqlValue::Unit => "unit",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int",
            SqlValue::Int16(_) => "int16",
            SqlValue::Int32(_) => "int32",
            SqlValue::Int64(_) => "int64",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::Octets(_) => "octets",
            SqlValue::Date(_) => "date",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::TimeSpan(_) => "time_span",
            SqlValue::Null => "null",
            SqlValue::Some(_) => "some",
            SqlValue::Tup2(..) => "tup2",
            SqlValue::Tup3(..) => "tup3",
            SqlValue::Tup4(..) => "tup4",
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}
impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}
impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int32(v)
    }
}
impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        SqlValue::Int16(v)
    }
}
impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}
impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}
impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}
impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Octets(v)
    }
}
