//! Exact-length reads with frame-start resynchronization.
//!
//! Some node error paths leave the reply stream offset by a stray byte.
//! Every frame opens with the version byte 0x02 followed by a message type
//! of 0x01 or 0x03, so a misaligned reader can hunt for that two-byte
//! sentinel, discard whatever precedes it, and resume fixed-length reads
//! from there. On a stream that is already aligned the hunt matches
//! immediately and discards nothing.

use aerolite_protocol::{MessageType, PROTOCOL_VERSION};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

const FRAME_SENTINEL: u8 = PROTOCOL_VERSION;
const TYPE_INFO: u8 = MessageType::Info as u8;
const TYPE_MESSAGE: u8 = MessageType::Message as u8;

/// Reads exactly `n` bytes. When `resync` is set, first scans for the
/// frame-start sentinel and counts its two bytes toward `n`.
///
/// Failing to find the sentinel before EOF, or any underrun, reports
/// `UnexpectedEof`: the stream is dead as far as framing is concerned.
pub(crate) async fn read_exact_or_resync<S>(
    stream: &mut S,
    n: usize,
    resync: bool,
) -> io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; n];
    if !resync || n < 2 {
        stream.read_exact(&mut buf).await?;
        return Ok(buf);
    }

    let mut lead = stream.read_u8().await?;
    let msg_type = loop {
        if lead != FRAME_SENTINEL {
            lead = stream.read_u8().await?;
            continue;
        }
        let next = stream.read_u8().await?;
        if next == TYPE_INFO || next == TYPE_MESSAGE {
            break next;
        }
        // a failed second byte may itself open a frame (e.g. 02 02 03)
        lead = next;
    };

    buf[0] = FRAME_SENTINEL;
    buf[1] = msg_type;
    stream.read_exact(&mut buf[2..]).await?;
    Ok(buf)
}

/// Blocking twin of [`read_exact_or_resync`] over `std::io` streams.
pub(crate) fn read_exact_or_resync_blocking<S>(
    stream: &mut S,
    n: usize,
    resync: bool,
) -> io::Result<Vec<u8>>
where
    S: io::Read,
{
    let mut buf = vec![0u8; n];
    if !resync || n < 2 {
        stream.read_exact(&mut buf)?;
        return Ok(buf);
    }

    let mut lead = read_u8(stream)?;
    let msg_type = loop {
        if lead != FRAME_SENTINEL {
            lead = read_u8(stream)?;
            continue;
        }
        let next = read_u8(stream)?;
        if next == TYPE_INFO || next == TYPE_MESSAGE {
            break next;
        }
        lead = next;
    };

    buf[0] = FRAME_SENTINEL;
    buf[1] = msg_type;
    stream.read_exact(&mut buf[2..])?;
    Ok(buf)
}

fn read_u8<S: io::Read>(stream: &mut S) -> io::Result<u8> {
    let mut byte = [0u8; 1];
    stream.read_exact(&mut byte)?;
    Ok(byte[0])
}
