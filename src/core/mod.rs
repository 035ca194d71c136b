//! # Core Wire Components
//!
//! Low-level byte handling: the decoding cursor, the composable wire codec and
//! stream framing.
//!
//! ## Components
//! - **Parser**: forward-only cursor that fails with `Underrun` instead of
//!   reading past its buffer
//! - **Codec**: `Wire` implementations for every primitive shape plus the
//!   `wire_record!` / `wire_union!` macros for composite messages
//! - **Frame**: tokio codec for length-prefixed frames and keepalives
//!
//! ## Wire Format
//! ```text
//! Stream:  [Marker(1)=0] [Port(2)]  then  { [Length(4)] [Payload(Length)] }*
//! Payload: [ProcedureId(16)] [Body(N)]
//! ```
//!
//! ## Security
//! - Maximum frame size: 16MB (prevents memory exhaustion)
//! - Length and count prefixes are checked against the remaining input before
//!   any allocation

pub mod codec;
pub mod frame;
pub mod parser;
