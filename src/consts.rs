/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use lazy_static::lazy_static;
use uuid::Uuid;

/// Largest payload slice written to the TX characteristic in one go.
/// Matches the 20-byte ATT default the peripheral firmware assumes.
pub const TX_MAX_CHUNK: usize = 20;

lazy_static! {
    /// Nordic UART service UUID.
    pub static ref UART_SERVICE_UUID: Uuid =
        Uuid::parse_str("6e400001-b5a3-f393-e0a9-e50e24dcca9e").unwrap();
    /// RX characteristic. The peripheral notifies inbound data here.
    pub static ref UART_RX_CHARACTERISTIC_UUID: Uuid =
        Uuid::parse_str("6e400003-b5a3-f393-e0a9-e50e24dcca9e").unwrap();
    /// TX characteristic. Outbound chunks are written here.
    pub static ref UART_TX_CHARACTERISTIC_UUID: Uuid =
        Uuid::parse_str("6e400002-b5a3-f393-e0a9-e50e24dcca9e").unwrap();
}
