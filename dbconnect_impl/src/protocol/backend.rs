//! Server → client messages, parsed from a received frame.

use crate::protocol::ServerMsg;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;

// Parse failures are plain strings; the connection wraps them with URI and
// query context.
pub(crate) type ParseResult<T> = Result<T, String>;

#[derive(Debug)]
pub(crate) enum BackendMessage {
    Authentication(AuthRequest),
    BackendKeyData { pid: i32, secret: i32 },
    ParameterStatus { name: String, value: String },
    ReadyForQuery { txn_status: u8 },
    RowDescription { columns: Vec<ColumnDesc> },
    DataRow { cells: Vec<Option<Vec<u8>>> },
    CommandComplete { tag: String },
    EmptyQueryResponse,
    ErrorResponse(ServerMsg),
    NoticeResponse(ServerMsg),
    NotificationResponse,
    ParseComplete,
    BindComplete,
    CloseComplete,
    NoData,
    ParameterDescription { oids: Vec<u32> },
    PortalSuspended,
    CopyInResponse { column_count: u16 },
    CopyOutResponse,
    CopyData,
    CopyDone,
    Unknown(u8),
}

#[derive(Debug)]
pub(crate) enum AuthRequest {
    Ok,
    CleartextPassword,
    Md5Password,
    Sasl { mechanisms: Vec<String> },
    SaslContinue { data: Vec<u8> },
    SaslFinal { data: Vec<u8> },
    Other(i32),
}

#[derive(Debug, Clone)]
pub(crate) struct ColumnDesc {
    pub name: String,
    pub type_oid: u32,
}

impl BackendMessage {
    pub(crate) fn parse(tag: u8, payload: &[u8]) -> ParseResult<Self> {
        let mut rdr = std::io::Cursor::new(payload);
        match tag {
            b'R' => parse_authentication(&mut rdr).map(BackendMessage::Authentication),
            b'K' => Ok(BackendMessage::BackendKeyData {
                pid: read_i32(&mut rdr)?,
                secret: read_i32(&mut rdr)?,
            }),
            b'S' => Ok(BackendMessage::ParameterStatus {
                name: read_cstr(&mut rdr)?,
                value: read_cstr(&mut rdr)?,
            }),
            b'Z' => Ok(BackendMessage::ReadyForQuery {
                txn_status: read_u8(&mut rdr)?,
            }),
            b'T' => parse_row_description(&mut rdr),
            b'D' => parse_data_row(&mut rdr),
            b'C' => Ok(BackendMessage::CommandComplete {
                tag: read_cstr(&mut rdr)?,
            }),
            b'I' => Ok(BackendMessage::EmptyQueryResponse),
            b'E' => parse_fields(&mut rdr).map(|f| {
                BackendMessage::ErrorResponse(ServerMsg::from_fields(f))
            }),
            b'N' => parse_fields(&mut rdr).map(|f| {
                BackendMessage::NoticeResponse(ServerMsg::from_fields(f))
            }),
            b'A' => Ok(BackendMessage::NotificationResponse),
            b'1' => Ok(BackendMessage::ParseComplete),
            b'2' => Ok(BackendMessage::BindComplete),
            b'3' => Ok(BackendMessage::CloseComplete),
            b'n' => Ok(BackendMessage::NoData),
            b't' => parse_parameter_description(&mut rdr),
            b's' => Ok(BackendMessage::PortalSuspended),
            b'G' => parse_copy_response(&mut rdr)
                .map(|column_count| BackendMessage::CopyInResponse { column_count }),
            b'H' => Ok(BackendMessage::CopyOutResponse),
            b'd' => Ok(BackendMessage::CopyData),
            b'c' => Ok(BackendMessage::CopyDone),
            other => Ok(BackendMessage::Unknown(other)),
        }
    }
}

fn parse_authentication(rdr: &mut std::io::Cursor<&[u8]>) -> ParseResult<AuthRequest> {
    let code = read_i32(rdr)?;
    match code {
        0 => Ok(AuthRequest::Ok),
        3 => Ok(AuthRequest::CleartextPassword),
        5 => Ok(AuthRequest::Md5Password),
        10 => {
            let mut mechanisms = Vec::new();
            loop {
                let m = read_cstr(rdr)?;
                if m.is_empty() {
                    break;
                }
                mechanisms.push(m);
            }
            Ok(AuthRequest::Sasl { mechanisms })
        }
        11 => Ok(AuthRequest::SaslContinue {
            data: read_rest(rdr),
        }),
        12 => Ok(AuthRequest::SaslFinal {
            data: read_rest(rdr),
        }),
        other => Ok(AuthRequest::Other(other)),
    }
}

fn parse_row_description(rdr: &mut std::io::Cursor<&[u8]>) -> ParseResult<BackendMessage> {
    let count = read_i16(rdr)?;
    let mut columns = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        let name = read_cstr(rdr)?;
        let _table_oid = read_i32(rdr)?;
        let _column_attr = read_i16(rdr)?;
        let type_oid = read_u32(rdr)?;
        let _type_size = read_i16(rdr)?;
        let _type_modifier = read_i32(rdr)?;
        let _format = read_i16(rdr)?;
        columns.push(ColumnDesc { name, type_oid });
    }
    Ok(BackendMessage::RowDescription { columns })
}

fn parse_data_row(rdr: &mut std::io::Cursor<&[u8]>) -> ParseResult<BackendMessage> {
    let count = read_i16(rdr)?;
    let mut cells = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        let len = read_i32(rdr)?;
        if len < 0 {
            cells.push(None);
        } else {
            let mut bytes = vec![0; len as usize];
            rdr.read_exact(&mut bytes)
                .map_err(|_| "short DataRow cell".to_string())?;
            cells.push(Some(bytes));
        }
    }
    Ok(BackendMessage::DataRow { cells })
}

fn parse_parameter_description(rdr: &mut std::io::Cursor<&[u8]>) -> ParseResult<BackendMessage> {
    let count = read_i16(rdr)?;
    let mut oids = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        oids.push(read_u32(rdr)?);
    }
    Ok(BackendMessage::ParameterDescription { oids })
}

fn parse_copy_response(rdr: &mut std::io::Cursor<&[u8]>) -> ParseResult<u16> {
    let _overall_format = read_u8(rdr)?;
    let count = read_i16(rdr)?;
    Ok(count.max(0) as u16)
}

// The (field-type, value) list of an ErrorResponse/NoticeResponse,
// terminated by a zero byte.
fn parse_fields(rdr: &mut std::io::Cursor<&[u8]>) -> ParseResult<Vec<(u8, String)>> {
    let mut fields = Vec::new();
    loop {
        let key = read_u8(rdr)?;
        if key == 0 {
            return Ok(fields);
        }
        fields.push((key, read_cstr(rdr)?));
    }
}

fn read_u8(rdr: &mut std::io::Cursor<&[u8]>) -> ParseResult<u8> {
    rdr.read_u8().map_err(|_| "short message".to_string())
}

fn read_i16(rdr: &mut std::io::Cursor<&[u8]>) -> ParseResult<i16> {
    rdr.read_i16::<BigEndian>()
        .map_err(|_| "short message".to_string())
}

fn read_i32(rdr: &mut std::io::Cursor<&[u8]>) -> ParseResult<i32> {
    rdr.read_i32::<BigEndian>()
        .map_err(|_| "short message".to_string())
}

fn read_u32(rdr: &mut std::io::Cursor<&[u8]>) -> ParseResult<u32> {
    rdr.read_u32::<BigEndian>()
        .map_err(|_| "short message".to_string())
}

fn read_cstr(rdr: &mut std::io::Cursor<&[u8]>) -> ParseResult<String> {
    let start = rdr.position() as usize;
    let bytes = *rdr.get_ref();
    match bytes[start..].iter().position(|b| *b == 0) {
        Some(end) => {
            let s = String::from_utf8(bytes[start..start + end].to_vec())
                .map_err(|_| "non-UTF-8 string in message".to_string())?;
            rdr.set_position((start + end + 1) as u64);
            Ok(s)
        }
        None => Err("unterminated string in message".to_string()),
    }
}

fn read_rest(rdr: &mut std::io::Cursor<&[u8]>) -> Vec<u8> {
    let start = rdr.position() as usize;
    let bytes = *rdr.get_ref();
    let rest = bytes[start..].to_vec();
    rdr.set_position(bytes.len() as u64);
    rest
}

#[cfg(test)]
mod tests {
    use super::{AuthRequest, BackendMessage};

    #[test]
    fn parses_ready_for_query() {
        match BackendMessage::parse(b'Z', b"I").unwrap() {
            BackendMessage::ReadyForQuery { txn_status } => assert_eq!(txn_status, b'I'),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn parses_sasl_mechanism_list() {
        match BackendMessage::parse(b'R', b"\x00\x00\x00\x0aSCRAM-SHA-256\0\0").unwrap() {
            BackendMessage::Authentication(AuthRequest::Sasl { mechanisms }) => {
                assert_eq!(mechanisms, vec!["SCRAM-SHA-256".to_string()]);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn parses_data_row_with_null_cell() {
        let payload = [
            0, 2, // two cells
            0, 0, 0, 2, b'4', b'2', // "42"
            0xff, 0xff, 0xff, 0xff, // NULL
        ];
        match BackendMessage::parse(b'D', &payload).unwrap() {
            BackendMessage::DataRow { cells } => {
                assert_eq!(cells.len(), 2);
                assert_eq!(cells[0].as_deref(), Some(&b"42"[..]));
                assert!(cells[1].is_none());
            }
            other => panic!("unexpected message {other:?}"),
        }
    }
}
