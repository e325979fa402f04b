// Requests the connector issues on its own behalf.

use crate::{
    base::{RequestSpec, RowMult},
    SqlType,
};

lazy_static! {
    pub(crate) static ref BEGIN: RequestSpec =
        RequestSpec::prepared(SqlType::UNIT, SqlType::UNIT, RowMult::Zero, "BEGIN");
    pub(crate) static ref COMMIT: RequestSpec =
        RequestSpec::prepared(SqlType::UNIT, SqlType::UNIT, RowMult::Zero, "COMMIT");
    pub(crate) static ref ROLLBACK: RequestSpec =
        RequestSpec::prepared(SqlType::UNIT, SqlType::UNIT, RowMult::Zero, "ROLLBACK");
    pub(crate) static ref SET_TIMEZONE_UTC: RequestSpec = RequestSpec::oneshot(
        SqlType::UNIT,
        SqlType::UNIT,
        RowMult::Zero,
        "SET TimeZone TO 'UTC'",
    );
    pub(crate) static ref TYPE_OID: RequestSpec = RequestSpec::oneshot(
        SqlType::TEXT,
        SqlType::INT64,
        RowMult::ZeroOrOne,
        "SELECT oid FROM pg_catalog.pg_type WHERE typname = ?",
    );
}
