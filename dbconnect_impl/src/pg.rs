// The PostgreSQL driver: OID assignment, value codecs, query rendering.

pub(crate) mod codec;
pub(crate) mod driver;
pub(crate) mod oids;
pub(crate) mod types_walk;

pub(crate) use driver::PgDriver;
