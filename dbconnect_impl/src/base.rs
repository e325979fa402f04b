// The driver-independent vocabulary: type descriptors, dynamic values,
// query templates, and request descriptors.

mod query_template;
mod request_spec;
mod sql_type;
mod sql_value;

pub use {
    query_template::QueryTemplate,
    request_spec::{RequestSpec, RowMult},
    sql_type::{CustomCodec, CustomType, PrimType, SqlType},
    sql_value::SqlValue,
};
