// src/core/protocol/mod.rs

//! The subscribe channel's wire protocol: frame shapes and a
//! newline-delimited JSON codec over `Framed<S, ConfigFrameCodec>`.

pub mod codec;
pub mod frame;

pub use codec::ConfigFrameCodec;
pub use frame::{ErrorFrame, MessageType, PullFrame, PushFrame, ServerFrame};
