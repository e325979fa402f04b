//! Client → server messages, serialized into a send buffer.
//!
//! Every message except the startup packet is a tag byte followed by a
//! big-endian i32 length that covers the length field and the payload.

/// A parameter value ready for the wire, in the format its flag announced.
#[derive(Clone, Debug)]
pub(crate) enum EncodedParam {
    Text(String),
    Binary(Vec<u8>),
}

impl EncodedParam {
    fn bytes(&self) -> &[u8] {
        match self {
            EncodedParam::Text(s) => s.as_bytes(),
            EncodedParam::Binary(b) => b,
        }
    }
}

fn frame(buf: &mut Vec<u8>, tag: u8, body: impl FnOnce(&mut Vec<u8>)) {
    buf.push(tag);
    let len_pos = buf.len();
    buf.extend_from_slice(&[0; 4]);
    body(buf);
    let len = (buf.len() - len_pos) as i32;
    buf[len_pos..len_pos + 4].copy_from_slice(&len.to_be_bytes());
}

fn put_cstr(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

fn put_i16(buf: &mut Vec<u8>, v: i16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

/// The untagged startup packet: protocol 3.0 plus key/value parameters.
pub(crate) fn startup(user: &str, database: &str, options: &[(String, String)]) -> Vec<u8> {
    let mut body = Vec::with_capacity(64);
    put_i32(&mut body, 196_608); // protocol 3.0
    put_cstr(&mut body, "user");
    put_cstr(&mut body, user);
    put_cstr(&mut body, "database");
    put_cstr(&mut body, database);
    for (key, value) in options {
        put_cstr(&mut body, key);
        put_cstr(&mut body, value);
    }
    body.push(0);

    let mut buf = Vec::with_capacity(body.len() + 4);
    put_i32(&mut buf, body.len() as i32 + 4);
    buf.extend_from_slice(&body);
    buf
}

pub(crate) fn password(pw: &str, buf: &mut Vec<u8>) {
    frame(buf, b'p', |b| put_cstr(b, pw));
}

pub(crate) fn sasl_initial_response(mechanism: &str, data: &[u8], buf: &mut Vec<u8>) {
    frame(buf, b'p', |b| {
        put_cstr(b, mechanism);
        put_i32(b, data.len() as i32);
        b.extend_from_slice(data);
    });
}

pub(crate) fn sasl_response(data: &[u8], buf: &mut Vec<u8>) {
    frame(buf, b'p', |b| b.extend_from_slice(data));
}

pub(crate) fn parse(stmt_name: &str, query: &str, param_oids: &[u32], buf: &mut Vec<u8>) {
    frame(buf, b'P', |b| {
        put_cstr(b, stmt_name);
        put_cstr(b, query);
        put_i16(b, param_oids.len() as i16);
        for oid in param_oids {
            b.extend_from_slice(&oid.to_be_bytes());
        }
    });
}

pub(crate) fn bind(
    portal: &str,
    stmt_name: &str,
    binary_flags: &[bool],
    params: &[Option<EncodedParam>],
    buf: &mut Vec<u8>,
) {
    frame(buf, b'B', |b| {
        put_cstr(b, portal);
        put_cstr(b, stmt_name);
        put_i16(b, binary_flags.len() as i16);
        for flag in binary_flags {
            put_i16(b, i16::from(*flag));
        }
        put_i16(b, params.len() as i16);
        for param in params {
            match param {
                None => put_i32(b, -1),
                Some(p) => {
                    let bytes = p.bytes();
                    put_i32(b, bytes.len() as i32);
                    b.extend_from_slice(bytes);
                }
            }
        }
        // all result columns in text format
        put_i16(b, 0);
    });
}

pub(crate) fn describe_portal(portal: &str, buf: &mut Vec<u8>) {
    frame(buf, b'D', |b| {
        b.push(b'P');
        put_cstr(b, portal);
    });
}

pub(crate) fn execute(portal: &str, buf: &mut Vec<u8>) {
    frame(buf, b'E', |b| {
        put_cstr(b, portal);
        put_i32(b, 0); // no row limit
    });
}

pub(crate) fn sync(buf: &mut Vec<u8>) {
    frame(buf, b'S', |_| {});
}

pub(crate) fn copy_data(data: &[u8], buf: &mut Vec<u8>) {
    frame(buf, b'd', |b| b.extend_from_slice(data));
}

pub(crate) fn copy_done(buf: &mut Vec<u8>) {
    frame(buf, b'c', |_| {});
}

pub(crate) fn copy_fail(reason: &str, buf: &mut Vec<u8>) {
    frame(buf, b'f', |b| put_cstr(b, reason));
}

pub(crate) fn terminate(buf: &mut Vec<u8>) {
    frame(buf, b'X', |_| {});
}
