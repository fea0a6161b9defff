/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::UartTransport;
use crate::consts::{
    UART_RX_CHARACTERISTIC_UUID, UART_SERVICE_UUID, UART_TX_CHARACTERISTIC_UUID,
};
use crate::error::UartError;
use async_stream::stream;
use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::{BoxStream, StreamExt};
use log::{debug, trace};
use pretty_hex::*;

use std::time::Duration;
use tokio::time;

/// Enumerates adapters and finds peripherals advertising the UART service.
pub struct UartScanner {
    bt_adapters: Vec<Adapter>,
    adapter_idx: usize,
}

impl UartScanner {
    pub async fn new() -> Result<Self, UartError> {
        let manager = Manager::new()
            .await
            .map_err(|e| -> UartError { UartError::BTFailure(e.to_string()) })?;
        let adapters = manager
            .adapters()
            .await
            .map_err(|e| -> UartError { UartError::BTAdapterError(e.to_string()) })?;

        if adapters.is_empty() {
            return Err(UartError::BTFailure("Adapter does not exist.".to_string()));
        }

        Ok(Self {
            bt_adapters: adapters,
            adapter_idx: 0,
        })
    }

    /// Fetch adapters present in system
    pub async fn get_adapter_name(&self) -> Result<Vec<String>, UartError> {
        let mut ret: Vec<String> = vec![];
        for adapter in self.bt_adapters.iter() {
            let info = adapter
                .adapter_info()
                .await
                .map_err(|e| -> UartError { UartError::BTAdapterError(e.to_string()) })?;

            ret.push(info);
        }

        Ok(ret)
    }

    /// Set adapter idx
    pub fn set_adapter(&mut self, idx: usize) -> Result<(), UartError> {
        if self.bt_adapters.len() > idx {
            self.adapter_idx = idx;
            Ok(())
        } else {
            Err(UartError::OutOfBounds)
        }
    }

    /// Scan for peripherals advertising the UART service, then stop.
    pub async fn scan(&self, duration: Duration) -> Result<(), UartError> {
        let central = &self.bt_adapters[self.adapter_idx];
        central
            .start_scan(ScanFilter {
                services: vec![*UART_SERVICE_UUID],
            })
            .await
            .map_err(|e| -> UartError { UartError::BTFailure(e.to_string()) })?;
        time::sleep(duration).await;
        central
            .stop_scan()
            .await
            .map_err(|e| -> UartError { UartError::BTFailure(e.to_string()) })?;
        Ok(())
    }

    /// First scanned peripheral whose advertised name contains `name`.
    /// An empty `name` matches any peripheral seen by the scan filter.
    pub async fn search_by_name(&self, name: &str) -> Result<Option<Peripheral>, UartError> {
        let central = &self.bt_adapters[self.adapter_idx];
        let peripherals = central
            .peripherals()
            .await
            .map_err(|e| -> UartError { UartError::BTFailure(e.to_string()) })?;

        for p in peripherals {
            let properties = p
                .properties()
                .await
                .map_err(|e| -> UartError { UartError::BTFailure(e.to_string()) })?;
            let local_name = properties.and_then(|props| props.local_name);

            if local_name.iter().any(|n| n.contains(name)) {
                return Ok(Some(p));
            }
        }
        Ok(None)
    }
}

#[derive(Clone)]
struct UartCharacteristics {
    rx: Characteristic,
    tx: Characteristic,
}

/// Connected UART peripheral: writes go to the TX characteristic, inbound
/// data arrives as RX characteristic notifications.
pub struct BleUartTransport {
    peripheral: Peripheral,
    chars: UartCharacteristics,
}

impl BleUartTransport {
    /// Connect, discover services and resolve both UART characteristics,
    /// then subscribe to RX notifications.
    pub async fn connect(peripheral: Peripheral) -> Result<Self, UartError> {
        peripheral
            .connect()
            .await
            .map_err(|e| -> UartError { UartError::BTFailure(e.to_string()) })?;

        peripheral
            .discover_services()
            .await
            .map_err(|e| -> UartError { UartError::BTFailure(e.to_string()) })?;

        let chars = peripheral.characteristics();
        let rx = chars
            .iter()
            .find(|c| c.uuid == *UART_RX_CHARACTERISTIC_UUID)
            .ok_or(UartError::BTNoCharacteristics)?
            .clone();
        let tx = chars
            .iter()
            .find(|c| c.uuid == *UART_TX_CHARACTERISTIC_UUID)
            .ok_or(UartError::BTNoCharacteristics)?
            .clone();

        peripheral
            .subscribe(&rx)
            .await
            .map_err(|e| -> UartError { UartError::BTFailure(e.to_string()) })?;
        debug!("UART characteristics resolved, RX notifications enabled");

        Ok(Self {
            peripheral,
            chars: UartCharacteristics { rx, tx },
        })
    }

    /// Resolved (RX, TX) characteristic identifiers, for driving
    /// [`crate::router::TransferRouter::characteristic_discovered`].
    pub fn characteristic_ids(&self) -> (String, String) {
        (
            self.chars.rx.uuid.to_string(),
            self.chars.tx.uuid.to_string(),
        )
    }

    /// Inbound byte stream: one item per RX characteristic notification.
    pub async fn notifications(&self) -> Result<BoxStream<'static, Vec<u8>>, UartError> {
        let rx_uuid = self.chars.rx.uuid;
        let mut notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(|e| -> UartError { UartError::Transport(e.to_string()) })?;

        Ok(stream! {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != rx_uuid {
                    continue;
                }
                trace!("BTLE RX: {:?}\n", &notification.value.hex_dump());
                yield notification.value;
            }
        }
        .boxed())
    }

    pub async fn disconnect(&self) -> Result<(), UartError> {
        self.peripheral
            .disconnect()
            .await
            .map_err(|e| -> UartError { UartError::BTFailure(e.to_string()) })
    }
}

#[async_trait]
impl UartTransport for BleUartTransport {
    async fn write(&self, data: &[u8]) -> Result<(), UartError> {
        trace!("BTLE TX: {:?}\n", &data.hex_dump());
        self.peripheral
            .write(&self.chars.tx, data, WriteType::WithoutResponse)
            .await
            .map_err(|e| -> UartError { UartError::Transport(e.to_string()) })
    }
}
