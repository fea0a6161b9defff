/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use async_trait::async_trait;

use crate::error::UartError;

#[cfg(feature = "ble")]
pub mod ble;

/// Link write primitive consumed by the router.
///
/// Called once per fragment. Implementations must queue writes in call
/// order; the router awaits each call before submitting the next fragment,
/// so a slow link applies backpressure by completing slowly.
#[async_trait]
pub trait UartTransport: Send + Sync {
    async fn write(&self, data: &[u8]) -> Result<(), UartError>;
}
