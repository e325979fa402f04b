use crate::base::PrimType;
use std::collections::HashMap;

/// A PostgreSQL type identifier from `pg_catalog.pg_type`.
pub type Oid = u32;

pub(crate) const BOOL: Oid = 16;
pub(crate) const BYTEA: Oid = 17;
pub(crate) const INT8: Oid = 20;
pub(crate) const INT2: Oid = 21;
pub(crate) const INT4: Oid = 23;
pub(crate) const FLOAT8: Oid = 701;
pub(crate) const DATE: Oid = 1082;
pub(crate) const TIMESTAMPTZ: Oid = 1184;
pub(crate) const INTERVAL: Oid = 1186;

/// Zero leaves the parameter type unspecified, so the server infers it from
/// context; used for strings so they coerce to the column type.
pub(crate) const UNSPECIFIED: Oid = 0;

#[derive(Debug)]
pub(crate) enum OidLookupError {
    /// The named enum type has not been resolved on this connection.
    MissingEnum { name: String },
}

// The fixed kind → OID table. Int is transferred as INT8 because it spans
// the full native integer range.
pub(crate) fn prim_oid(
    prim: &PrimType,
    enum_oids: &HashMap<String, Oid>,
) -> Result<Oid, OidLookupError> {
    Ok(match prim {
        PrimType::Bool => BOOL,
        PrimType::Int | PrimType::Int64 => INT8,
        PrimType::Int16 => INT2,
        PrimType::Int32 => INT4,
        PrimType::Float => FLOAT8,
        PrimType::Text => UNSPECIFIED,
        PrimType::Octets => BYTEA,
        PrimType::Date => DATE,
        PrimType::Timestamp => TIMESTAMPTZ,
        PrimType::TimeSpan => INTERVAL,
        PrimType::Enum(name) => match enum_oids.get(name) {
            Some(oid) => *oid,
            None => {
                return Err(OidLookupError::MissingEnum {
                    name: name.clone(),
                })
            }
        },
    })
}
