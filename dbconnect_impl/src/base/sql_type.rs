use crate::base::SqlValue;
use debug_ignore::DebugIgnore;
use std::sync::Arc;

/// Conversion applied by a [`SqlType::Custom`] layer, in one direction.
///
/// Failures are reported as free-form strings; the caller wraps them into the
/// appropriate encode/decode rejection carrying the full type context.
pub type CustomCodec = Arc<dyn Fn(&SqlValue) -> Result<SqlValue, String> + Send + Sync>;

/// A first-class description of the shape of a query's parameters or rows.
///
/// Parameter encoding and row decoding interpret this tree at runtime; the
/// number of primitive leaves equals the width of the parameter or row array.
#[derive(Clone, Debug)]
pub enum SqlType {
    /// No fields.
    Unit,
    /// A single primitive field.
    Prim(PrimType),
    /// A nullable group; `None` is represented by all-NULL cells.
    Option(Box<SqlType>),
    /// Two adjacent groups.
    Tup2(Box<SqlType>, Box<SqlType>),
    /// Three adjacent groups.
    Tup3(Box<SqlType>, Box<SqlType>, Box<SqlType>),
    /// Four adjacent groups.
    Tup4(Box<SqlType>, Box<SqlType>, Box<SqlType>, Box<SqlType>),
    /// A user-defined value coded through a representation type.
    Custom(CustomType),
    /// A named annotation, transparent to coding.
    Annot(String, Box<SqlType>),
}

/// The kinds of primitive fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PrimType {
    Bool,
    /// Native-width integer; transferred as BIGINT.
    Int,
    Int16,
    Int32,
    Int64,
    Float,
    Text,
    Octets,
    Date,
    /// Point in time, transferred as TIMESTAMPTZ; sessions run in UTC.
    Timestamp,
    /// Time span, transferred as INTERVAL.
    TimeSpan,
    /// A user-defined enum type, resolved to its OID per connection.
    Enum(String),
}

/// A user-defined coding layer: values are converted to and from a
/// representation type which is then coded the regular way.
#[derive(Clone, Debug)]
pub struct CustomType {
    pub(crate) rep: Box<SqlType>,
    pub(crate) encode: DebugIgnore<CustomCodec>,
    pub(crate) decode: DebugIgnore<CustomCodec>,
}

impl SqlType {
    pub const UNIT: SqlType = SqlType::Unit;
    pub const BOOL: SqlType = SqlType::Prim(PrimType::Bool);
    pub const INT: SqlType = SqlType::Prim(PrimType::Int);
    pub const INT16: SqlType = SqlType::Prim(PrimType::Int16);
    pub const INT32: SqlType = SqlType::Prim(PrimType::Int32);
    pub const INT64: SqlType = SqlType::Prim(PrimType::Int64);
    pub const FLOAT: SqlType = SqlType::Prim(PrimType::Float);
    pub const TEXT: SqlType = SqlType::Prim(PrimType::Text);
    pub const OCTETS: SqlType = SqlType::Prim(PrimType::Octets);
    pub const DATE: SqlType = SqlType::Prim(PrimType::Date);
    pub const TIMESTAMP: SqlType = SqlType::Prim(PrimType::Timestamp);
    pub const TIME_SPAN: SqlType = SqlType::Prim(PrimType::TimeSpan);

    /// A user-defined enum type with the given database type name.
    pub fn enum_type(name: impl Into<String>) -> SqlType {
        SqlType::Prim(PrimType::Enum(name.into()))
    }

    pub fn option(t: SqlType) -> SqlType {
        SqlType::Option(Box::new(t))
    }

    pub fn tup2(t0: SqlType, t1: SqlType) -> SqlType {
        SqlType::Tup2(Box::new(t0), Box::new(t1))
    }

    pub fn tup3(t0: SqlType, t1: SqlType, t2: SqlType) -> SqlType {
        SqlType::Tup3(Box::new(t0), Box::new(t1), Box::new(t2))
    }

    pub fn tup4(t0: SqlType, t1: SqlType, t2: SqlType, t3: SqlType) -> SqlType {
        SqlType::Tup4(Box::new(t0), Box::new(t1), Box::new(t2), Box::new(t3))
    }

    /// A custom coding layer over the representation type `rep`.
    pub fn custom(rep: SqlType, encode: CustomCodec, decode: CustomCodec) -> SqlType {
        SqlType::Custom(CustomType {
            rep: Box::new(rep),
            encode: DebugIgnore(encode),
            decode: DebugIgnore(decode),
        })
    }

    pub fn annot(name: impl Into<String>, t: SqlType) -> SqlType {
        SqlType::Annot(name.into(), Box::new(t))
    }

    /// The number of primitive leaves, which equals the parameter or row
    /// array width for this descriptor.
    #[must_use]
    pub fn length(&self) -> usize {
        match self {
            SqlType::Unit => 0,
            SqlType::Prim(_) => 1,
            SqlType::Option(t) | SqlType::Annot(_, t) => t.length(),
            SqlType::Tup2(t0, t1) => t0.length() + t1.length(),
            SqlType::Tup3(t0, t1, t2) => t0.length() + t1.length() + t2.length(),
            SqlType::Tup4(t0, t1, t2, t3) => {
                t0.length() + t1.length() + t2.length() + t3.length()
            }
            SqlType::Custom(c) => c.rep.length(),
        }
    }

    // Collects the names of all enum leaves, including those below custom
    // representations, for OID probing.
    pub(crate) fn collect_enum_names<'a>(&'a self, acc: &mut Vec<&'a str>) {
        match self {
            SqlType::Unit => {}
            SqlType::Prim(PrimType::Enum(name)) => acc.push(name),
            SqlType::Prim(_) => {}
            SqlType::Option(t) | SqlType::Annot(_, t) => t.collect_enum_names(acc),
            SqlType::Tup2(t0, t1) => {
                t0.collect_enum_names(acc);
                t1.collect_enum_names(acc);
            }
            SqlType::Tup3(t0, t1, t2) => {
                t0.collect_enum_names(acc);
                t1.collect_enum_names(acc);
                t2.collect_enum_names(acc);
            }
            SqlType::Tup4(t0, t1, t2, t3) => {
                t0.collect_enum_names(acc);
                t1.collect_enum_names(acc);
                t2.collect_enum_names(acc);
                t3.collect_enum_names(acc);
            }
            SqlType::Custom(c) => c.rep.collect_enum_names(acc),
        }
    }
}

impl std::fmt::Display for PrimType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            PrimType::Bool => write!(f, "bool"),
            PrimType::Int => write!(f, "int"),
            PrimType::Int16 => write!(f, "int16"),
            PrimType::Int32 => write!(f, "int32"),
            PrimType::Int64 => write!(f, "int64"),
            PrimType::Float => write!(f, "float"),
            PrimType::Text => write!(f, "text"),
            PrimType::Octets => write!(f, "octets"),
            PrimType::Date => write!(f, "date"),
            PrimType::Timestamp => write!(f, "timestamp"),
            PrimType::TimeSpan => write!(f, "time_span"),
            PrimType::Enum(name) => write!(f, "enum({name})"),
        }
    }
}

impl std::fmt::Display for SqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SqlType::Unit => write!(f, "unit"),
            SqlType::Prim(p) => write!(f, "{p}"),
            SqlType::Option(t) => write!(f, "option({t})"),
            SqlType::Tup2(t0, t1) => write!(f, "tup2({t0}, {t1})"),
            SqlType::Tup3(t0, t1, t2) => write!(f, "tup3({t0}, {t1}, {t2})"),
            SqlType::Tup4(t0, t1, t2, t3) => write!(f, "tup4({t0}, {t1}, {t2}, {t3})"),
            SqlType::Custom(c) => write!(f, "custom({})", c.rep),
            SqlType::Annot(name, t) => write!(f, "{name} := {t}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SqlType;

    #[test]
    fn length_counts_primitive_leaves() {
        assert_eq!(SqlType::UNIT.length(), 0);
        assert_eq!(SqlType::INT.length(), 1);
        assert_eq!(
            SqlType::tup3(
                SqlType::TEXT,
                SqlType::option(SqlType::tup2(SqlType::INT, SqlType::BOOL)),
                SqlType::UNIT,
            )
            .length(),
            3
        );
        let rep = SqlType::tup2(SqlType::INT, SqlType::INT);
        let custom = SqlType::custom(
            rep,
            std::sync::Arc::new(|v| Ok(v.clone())),
            std::sync::Arc::new(|v| Ok(v.clone())),
        );
        assert_eq!(custom.length(), 2);
    }

    #[test]
    fn collects_enum_names_below_wrappers() {
        let t = SqlType::tup2(
            SqlType::option(SqlType::enum_type("mood")),
            SqlType::annot("tag", SqlType::enum_type("color")),
        );
        let mut names = Vec::new();
        t.collect_enum_names(&mut names);
        assert_eq!(names, vec!["mood", "color"]);
    }
}
