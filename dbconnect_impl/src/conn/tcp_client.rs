//! The byte transport: one frame in, one buffer out.

#[cfg(feature = "sync")]
use std::io::{BufReader, BufWriter, Read, Write};

#[cfg(feature = "async")]
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufStream};

#[derive(Debug)]
pub(crate) enum TcpClient {
    #[cfg(feature = "sync")]
    SyncPlain(SyncPlainTcpClient),
    #[cfg(feature = "async")]
    AsyncPlain(AsyncPlainTcpClient),
    /// No transport; the connection was closed or moved out for shutdown.
    Dead,
}

impl TcpClient {
    pub(crate) fn is_dead(&self) -> bool {
        matches!(self, TcpClient::Dead)
    }
}

/// A received frame: the tag byte and the payload after the length field.
pub(crate) struct Frame {
    pub tag: u8,
    pub payload: Vec<u8>,
}

// Frames larger than this indicate a protocol breakdown, not data.
const MAX_FRAME_SIZE: usize = 256 * 1024 * 1024;

fn frame_len(tag: u8, raw: i32) -> std::io::Result<usize> {
    let body = raw as i64 - 4;
    if body < 0 || body as usize > MAX_FRAME_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("nonsensical frame length {raw} for message '{}'", tag as char),
        ));
    }
    Ok(body as usize)
}

#[cfg(feature = "sync")]
#[derive(Debug)]
pub(crate) struct SyncPlainTcpClient {
    reader: BufReader<std::net::TcpStream>,
    writer: BufWriter<std::net::TcpStream>,
}

#[cfg(feature = "sync")]
impl SyncPlainTcpClient {
    pub fn try_new(addr: &str) -> std::io::Result<Self> {
        let stream = std::net::TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
        })
    }

    pub fn send(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(buf)?;
        self.writer.flush()
    }

    pub fn read_frame(&mut self) -> std::io::Result<Frame> {
        let mut head = [0_u8; 5];
        self.reader.read_exact(&mut head)?;
        let tag = head[0];
        let raw_len = i32::from_be_bytes([head[1], head[2], head[3], head[4]]);
        let mut payload = vec![0; frame_len(tag, raw_len)?];
        self.reader.read_exact(&mut payload)?;
        Ok(Frame { tag, payload })
    }
}

#[cfg(feature = "async")]
#[derive(Debug)]
pub(crate) struct AsyncPlainTcpClient {
    stream: BufStream<tokio::net::TcpStream>,
}

#[cfg(feature = "async")]
impl AsyncPlainTcpClient {
    pub async fn try_new(addr: &str) -> std::io::Result<Self> {
        let stream = tokio::net::TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream: BufStream::new(stream),
        })
    }

    pub async fn send(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(buf).await?;
        self.stream.flush().await
    }

    pub async fn read_frame(&mut self) -> std::io::Result<Frame> {
        let mut head = [0_u8; 5];
        self.stream.read_exact(&mut head).await?;
        let tag = head[0];
        let raw_len = i32::from_be_bytes([head[1], head[2], head[3], head[4]]);
        let mut payload = vec![0; frame_len(tag, raw_len)?];
        self.stream.read_exact(&mut payload).await?;
        Ok(Frame { tag, payload })
    }
}
