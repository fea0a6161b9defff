/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! UART-over-BLE bridge data plane: chunked outbound writes against a link
//! MTU, inbound notification ingestion, a shared timestamped transcript,
//! optional publish/subscribe mirroring, and transcript export in four
//! text formats.

pub mod bridge;
pub mod chunk;
pub mod codec;
pub mod config;
pub mod consts;
pub mod error;
pub mod export;
pub mod router;
pub mod transcript;
pub mod transport;

pub use crate::bridge::{BridgeConfig, BridgeHandle, MessageBridge, SubscribeBehaviour};
pub use crate::chunk::{chunks, Chunks};
pub use crate::codec::{decode_payload, DecodeMode};
pub use crate::config::{DisplayMode, Preferences};
pub use crate::error::UartError;
pub use crate::export::{render, ExportFormat};
pub use crate::router::{ConnectionState, TransferEvent, TransferRouter};
pub use crate::transcript::{Direction, Transcript, TransferRecord};
pub use crate::transport::UartTransport;
