//! Frame codec.
//!
//! Outbound frames are built and encoded by tungstenite. Inbound frames are
//! read here with exact-size reads so nothing past the current message is
//! consumed from the socket.

use std::io::{self, Cursor, Read, Write};

use bytes::{Buf, Bytes, BytesMut};
use tungstenite::protocol::frame::coding::{CloseCode, Control, Data, OpCode};
use tungstenite::protocol::frame::{CloseFrame, Frame as WireFrame, FrameHeader};

use super::error::ProtocolError;

/// Largest payload a control frame may carry.
const MAX_CONTROL_PAYLOAD: u64 = 125;

/// Largest close reason that fits next to the status code.
const MAX_CLOSE_REASON: usize = 123;

/// Fixed bytes plus the widest length field and the mask.
const MAX_HEADER_SIZE: usize = 14;

/// One inbound message: a complete data message or a single control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    op: OpCode,
    payload: Bytes,
}

impl Frame {
    pub fn new(op: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            op,
            payload: payload.into(),
        }
    }

    pub fn op(&self) -> OpCode {
        self.op
    }

    pub fn is_control(&self) -> bool {
        matches!(self.op, OpCode::Control(_))
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Reader positioned at the start of the payload.
    pub fn reader(&self) -> impl Read {
        self.payload.clone().reader()
    }

    /// Payload as text, for text messages.
    pub fn as_text(&self) -> Option<&str> {
        match self.op {
            OpCode::Data(Data::Text) => std::str::from_utf8(&self.payload).ok(),
            _ => None,
        }
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

/// Decode a close frame body into its status code and reason.
pub fn parse_close_body(payload: &[u8]) -> Result<(Option<CloseCode>, String), ProtocolError> {
    match payload.len() {
        0 => Ok((None, String::new())),
        1 => Err(ProtocolError::InvalidClosePayload),
        _ => {
            let code = CloseCode::from(u16::from_be_bytes([payload[0], payload[1]]));
            let reason = std::str::from_utf8(&payload[2..])
                .map_err(|_| ProtocolError::InvalidUtf8)?
                .to_string();
            Ok((Some(code), reason))
        }
    }
}

/// Write one unmasked final frame, buffered and flushed as a unit.
pub fn write_frame<W: Write>(w: &mut W, op: OpCode, payload: &[u8]) -> Result<(), ProtocolError> {
    let frame = match op {
        OpCode::Data(_) => WireFrame::message(payload.to_vec(), op, true),
        OpCode::Control(_) => WireFrame::from_payload(
            FrameHeader {
                opcode: op,
                ..FrameHeader::default()
            },
            payload.to_vec(),
        ),
    };
    send(w, frame)
}

/// Write a close frame carrying `code` and `reason`.
///
/// The reason is truncated on a character boundary to fit a control frame.
pub fn write_close<W: Write>(w: &mut W, code: CloseCode, reason: &str) -> Result<(), ProtocolError> {
    let mut end = reason.len().min(MAX_CLOSE_REASON);
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    send(
        w,
        WireFrame::close(Some(CloseFrame {
            code,
            reason: reason[..end].into(),
        })),
    )
}

fn send<W: Write>(w: &mut W, frame: WireFrame) -> Result<(), ProtocolError> {
    let mut buf = Vec::with_capacity(frame.len());
    frame.format(&mut buf)?;
    w.write_all(&buf)?;
    w.flush()?;
    Ok(())
}

/// Answer a control frame: ping gets a pong, close gets its status echoed.
///
/// Returns [`ProtocolError::Closed`] after answering a close frame.
pub fn handle_control<W: Write>(w: &mut W, op: OpCode, payload: &[u8]) -> Result<(), ProtocolError> {
    match op {
        OpCode::Control(Control::Ping) => send(w, WireFrame::pong(payload.to_vec())),
        OpCode::Control(Control::Close) => {
            let (code, reason) = parse_close_body(payload)?;
            let reply = code.map(|code| CloseFrame {
                code: if code.is_allowed() { code } else { CloseCode::Protocol },
                reason: "".into(),
            });
            send(w, WireFrame::close(reply))?;
            Err(ProtocolError::Closed { code, reason })
        }
        _ => Ok(()),
    }
}

/// Read the next message from a client stream.
///
/// A control frame arriving first is answered and returned as is. Data
/// frames are reassembled across continuations; control frames interleaved
/// with the fragments are answered inline. Messages larger than `max_size`
/// fail before their payload is read.
pub fn read_message<S>(stream: &mut S, max_size: usize) -> Result<Frame, ProtocolError>
where
    S: Read + Write,
{
    let mut message: Option<(OpCode, BytesMut)> = None;

    loop {
        let (header, length) = read_header(stream)?;
        validate(&header, length)?;

        if let OpCode::Control(_) = header.opcode {
            let mut payload = BytesMut::new();
            read_payload(stream, &header, length, &mut payload, MAX_CONTROL_PAYLOAD as usize)?;
            handle_control(stream, header.opcode, &payload)?;
            if message.is_none() {
                return Ok(Frame::new(header.opcode, payload.freeze()));
            }
            continue;
        }

        let continuation = OpCode::Data(Data::Continue);
        let (op, mut buf) = match message.take() {
            None if header.opcode == continuation => {
                return Err(ProtocolError::UnexpectedContinuation)
            }
            None => (header.opcode, BytesMut::new()),
            Some(partial) if header.opcode == continuation => partial,
            Some(_) => return Err(ProtocolError::ExpectedContinuation),
        };

        read_payload(stream, &header, length, &mut buf, max_size)?;

        if !header.is_final {
            message = Some((op, buf));
            continue;
        }

        if op == OpCode::Data(Data::Text) && std::str::from_utf8(&buf).is_err() {
            return Err(ProtocolError::InvalidUtf8);
        }
        return Ok(Frame::new(op, buf.freeze()));
    }
}

/// Read one header, consuming exactly its encoded size, and parse it.
fn read_header<R: Read>(r: &mut R) -> Result<(FrameHeader, u64), ProtocolError> {
    let mut head = [0u8; MAX_HEADER_SIZE];
    r.read_exact(&mut head[..2])?;

    let extended = match head[1] & 0x7f {
        126 => 2,
        127 => 8,
        _ => 0,
    };
    let mask = if head[1] & 0x80 != 0 { 4 } else { 0 };
    let size = 2 + extended + mask;
    r.read_exact(&mut head[2..size])?;

    if extended == 8 && head[2] & 0x80 != 0 {
        return Err(ProtocolError::InvalidLength);
    }

    FrameHeader::parse(&mut Cursor::new(&head[..size]))?
        .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof).into())
}

fn validate(header: &FrameHeader, length: u64) -> Result<(), ProtocolError> {
    if header.rsv1 || header.rsv2 || header.rsv3 {
        return Err(ProtocolError::ReservedBits);
    }
    if header.mask.is_none() {
        return Err(ProtocolError::UnmaskedFrame);
    }
    if let OpCode::Control(_) = header.opcode {
        if !header.is_final {
            return Err(ProtocolError::FragmentedControl);
        }
        if length > MAX_CONTROL_PAYLOAD {
            return Err(ProtocolError::ControlTooLong(length));
        }
    }
    Ok(())
}

/// Append the frame payload to `buf`, unmasking it in place.
fn read_payload<R: Read>(
    r: &mut R,
    header: &FrameHeader,
    length: u64,
    buf: &mut BytesMut,
    max_size: usize,
) -> Result<(), ProtocolError> {
    let start = buf.len();
    let size = start as u64 + length;
    if size > max_size as u64 {
        return Err(ProtocolError::MessageTooLarge {
            size,
            max: max_size,
        });
    }

    buf.resize(size as usize, 0);
    r.read_exact(&mut buf[start..])?;
    if let Some(key) = header.mask {
        for (i, byte) in buf[start..].iter_mut().enumerate() {
            *byte ^= key[i & 3];
        }
    }
    Ok(())
}
