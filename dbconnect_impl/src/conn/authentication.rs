mod crypto_util;
mod scram;

pub(crate) use scram::ScramSha256;
