// src/core/protocol/codec.rs

//! Newline-delimited JSON framing over the subscribe channel's duplex
//! byte stream, on top of a plain `TcpStream`/`UnixStream`.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::errors::LivecfgError;
use crate::core::protocol::frame::{PullFrame, ServerFrame};

const NEWLINE: u8 = b'\n';

#[derive(Debug, Default)]
pub struct ConfigFrameCodec;

impl Decoder for ConfigFrameCodec {
    type Item = PullFrame;
    type Error = LivecfgError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(pos) = src.iter().position(|&b| b == NEWLINE) else {
            return Ok(None);
        };
        let line = src.split_to(pos);
        src.advance(1); // consume the newline itself
        if line.is_empty() {
            return self.decode(src);
        }
        let frame = serde_json::from_slice(&line)?;
        Ok(Some(frame))
    }
}

impl Encoder<ServerFrame> for ConfigFrameCodec {
    type Error = LivecfgError;

    fn encode(&mut self, item: ServerFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut encoded = serde_json::to_vec(&item)?;
        encoded.push(NEWLINE);
        dst.extend_from_slice(&encoded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::frame::{ErrorFrame, MessageType, PushFrame};
    use crate::core::push::ResponseMode;
    use indexmap::IndexMap;

    #[test]
    fn decodes_a_pull_frame_split_across_reads() {
        let mut codec = ConfigFrameCodec;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(br#"{"message_type":"no_change","config_name":"App"}"#);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"\n");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.config_name, "App");
        assert_eq!(frame.env, "default");
    }

    #[test]
    fn encodes_a_push_frame_with_trailing_newline() {
        let mut codec = ConfigFrameCodec;
        let mut buf = BytesMut::new();
        let frame = ServerFrame::Push(PushFrame {
            message_type: MessageType::Changed,
            config_name: "App".to_string(),
            hash_code: "deadbeefcafebabe".to_string(),
            data: IndexMap::new(),
            env: "default".to_string(),
            response_mode: ResponseMode::Notify,
        });
        codec.encode(frame, &mut buf).unwrap();
        assert_eq!(*buf.last().unwrap(), b'\n');
    }

    #[test]
    fn encodes_an_error_frame() {
        let mut codec = ConfigFrameCodec;
        let mut buf = BytesMut::new();
        let frame = ServerFrame::Error(ErrorFrame {
            code: 400,
            error_msg: "Number of connection is already the maximum 1.".to_string(),
        });
        codec.encode(frame, &mut buf).unwrap();
        let text = String::from_utf8(buf.to_vec()).unwrap();
        assert!(text.contains("\"code\":400"));
    }
}
