/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum UartError {
    #[error("Link is not ready for transfers yet")]
    NotReady,
    #[error("Link is closed")]
    Closed,
    #[error("Failed to encode outbound text: {0}")]
    Encoding(String),
    #[error("Transport failure: {0}")]
    Transport(String),
    #[error("Bridge failure: {0}")]
    Bridge(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("Transcript is empty, nothing to export")]
    NothingToExport,
    #[error("Failed to fetch adapter list: {0}")]
    BTAdapterError(String),
    #[error("Generic BT error: {0}")]
    BTFailure(String),
    #[error("BT characteristics does not exist. Maybe invalid device?")]
    BTNoCharacteristics,
    #[error("Index out of bounds.")]
    OutOfBounds,
}
