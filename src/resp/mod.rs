//! RESP2 wire protocol: frame model, incremental parser, encoder.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Frame sum type and constructors.
pub mod frame;
/// Incremental decoding of client byte streams.
pub mod parser;
/// Frame serialization.
pub mod writer;

pub use frame::{Frame, ProtocolError};
pub use parser::{MAX_ARRAY_LEN, MAX_BULK_LEN, MAX_INLINE_LEN, parse};
pub use writer::encode;
