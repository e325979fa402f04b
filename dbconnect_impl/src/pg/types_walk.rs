//! Derives per-field parameter metadata from a type descriptor.

use crate::{
    pg::oids::{self, Oid, OidLookupError},
    SqlType,
};
use std::collections::HashMap;

#[derive(Debug)]
pub(crate) enum WalkError {
    /// An enum leaf without a resolved OID; surfaces as a missing encoding.
    MissingEnum { name: String },
    /// The descriptor's declared length does not match its leaves.
    LengthMismatch { declared: usize, walked: usize },
}

/// Walks `t` left to right, assigning each field leaf its OID and setting
/// the binary flag exactly for BYTEA fields.
///
/// `oids` and `binary` must both have length `t.length()`; the cursor is
/// checked against it afterwards.
pub(crate) fn init_param_types(
    oids: &mut [Oid],
    binary: &mut [bool],
    t: &SqlType,
    enum_oids: &HashMap<String, Oid>,
) -> Result<(), WalkError> {
    let mut cursor = 0;
    walk(t, oids, binary, enum_oids, &mut cursor)?;
    if cursor == t.length() {
        Ok(())
    } else {
        Err(WalkError::LengthMismatch {
            declared: t.length(),
            walked: cursor,
        })
    }
}

fn walk(
    t: &SqlType,
    oids: &mut [Oid],
    binary: &mut [bool],
    enum_oids: &HashMap<String, Oid>,
    cursor: &mut usize,
) -> Result<(), WalkError> {
    match t {
        SqlType::Unit => Ok(()),
        SqlType::Prim(prim) => {
            let oid = oids::prim_oid(prim, enum_oids)
                .map_err(|OidLookupError::MissingEnum { name }| WalkError::MissingEnum { name })?;
            oids[*cursor] = oid;
            binary[*cursor] = oid == oids::BYTEA;
            *cursor += 1;
            Ok(())
        }
        SqlType::Option(inner) | SqlType::Annot(_, inner) => {
            walk(inner, oids, binary, enum_oids, cursor)
        }
        SqlType::Tup2(t0, t1) => {
            walk(t0, oids, binary, enum_oids, cursor)?;
            walk(t1, oids, binary, enum_oids, cursor)
        }
        SqlType::Tup3(t0, t1, t2) => {
            walk(t0, oids, binary, enum_oids, cursor)?;
            walk(t1, oids, binary, enum_oids, cursor)?;
            walk(t2, oids, binary, enum_oids, cursor)
        }
        SqlType::Tup4(t0, t1, t2, t3) => {
            walk(t0, oids, binary, enum_oids, cursor)?;
            walk(t1, oids, binary, enum_oids, cursor)?;
            walk(t2, oids, binary, enum_oids, cursor)?;
            walk(t3, oids, binary, enum_oids, cursor)
        }
        SqlType::Custom(c) => walk(&c.rep, oids, binary, enum_oids, cursor),
    }
}
