//! # uniftp Protocol Library
//!
//! This crate provides the message definitions and framing used on the
//! uniftp control channel, the local Unix domain socket through which the
//! FTP service is enabled, disabled, and queried at runtime.
//!
//! ## Overview
//!
//! - **Message Definitions**: [`ControlRequest`], [`ControlResponse`] and the
//!   typed [`Command`] set understood by the daemon
//! - **Frame Codec**: UTF-8 JSON documents terminated by a single NUL byte,
//!   with no length prefix
//!
//! ## Wire Format
//!
//! ```text
//! ┌──────────────────────────────────────────────┬──────┐
//! │ {"command": "status_ftp", "params": {}}      │ 0x00 │
//! └──────────────────────────────────────────────┴──────┘
//! ```
//!
//! One request and one response are exchanged per connection.
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{Command, ControlRequest, ControlResponse, FrameDecoder, encode_frame};
//!
//! let request = ControlRequest::new(Command::StatusFtp);
//! let bytes = encode_frame(&request).unwrap();
//! assert_eq!(bytes.last(), Some(&0u8));
//!
//! let mut decoder = FrameDecoder::new();
//! decoder.extend(&bytes).unwrap();
//! let payload = decoder.next_frame().unwrap();
//! let decoded: ControlRequest = protocol::decode_payload(&payload).unwrap();
//! assert_eq!(decoded.command, "status_ftp");
//!
//! let response = ControlResponse::with_status(true);
//! assert_eq!(
//!     serde_json::to_string(&response).unwrap(),
//!     r#"{"success":true,"status":true}"#
//! );
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Control message definitions
//! - [`framing`]: NUL-terminated frame codec
//! - [`error`]: Error types

pub mod error;
pub mod framing;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use framing::{decode_payload, encode_frame, FrameDecoder, FRAME_TERMINATOR, MAX_FRAME_SIZE};
pub use messages::{Command, ControlRequest, ControlResponse};
