/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::UartError;

/// External publish/subscribe system mirroring the transcript to remote
/// listeners. Publishes are best-effort throughout: a failing bridge never
/// fails a transfer and never drops a record.
///
/// Inbound bridge traffic is the host's job to deliver: hand each message
/// to [`crate::router::TransferRouter::send`] with
/// `originated_from_bridge = true`.
#[async_trait]
pub trait MessageBridge: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), UartError>;
}

/// What to do with messages that arrived from the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeBehaviour {
    /// Record them locally without touching the link.
    LocalOnly,
    /// Forward them onto the link as if typed locally.
    Transmit,
}

/// Bridge wiring for one router instance.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Master switch for both publish feeds.
    pub publish_enabled: bool,
    /// Topic receiving locally-originated (TX) text.
    pub tx_topic: String,
    /// Topic receiving link-originated (RX) text.
    pub rx_topic: String,
    pub subscribe_behaviour: SubscribeBehaviour,
}

/// A bridge implementation paired with its configuration.
#[derive(Clone)]
pub struct BridgeHandle {
    pub bridge: Arc<dyn MessageBridge>,
    pub config: BridgeConfig,
}

impl BridgeHandle {
    pub fn new(bridge: Arc<dyn MessageBridge>, config: BridgeConfig) -> Self {
        Self { bridge, config }
    }
}
