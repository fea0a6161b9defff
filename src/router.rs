/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use log::{trace, warn};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::bridge::{BridgeHandle, SubscribeBehaviour};
use crate::chunk;
use crate::codec::{decode_payload, DecodeMode};
use crate::consts::{TX_MAX_CHUNK, UART_RX_CHARACTERISTIC_UUID, UART_TX_CHARACTERISTIC_UUID};
use crate::error::UartError;
use crate::export::{self, ExportFormat};
use crate::transcript::{Direction, Transcript, TransferRecord};
use crate::transport::UartTransport;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Externally visible connection lifecycle:
/// `Idle -> Discovering -> Ready -> (Sending | Receiving)* -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Discovering,
    Ready,
    Sending,
    Receiving,
    Closed,
}

/// Internal lifecycle. `Sending`/`Receiving` are not phases of their own;
/// they are derived from the in-flight transfer counters while `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkPhase {
    Idle,
    Discovering { rx_resolved: bool, tx_resolved: bool },
    Ready,
    Closed,
}

/// Emitted after every transcript mutation so view layers can refresh
/// without polling.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    Sent(Arc<TransferRecord>),
    Received(Arc<TransferRecord>),
    Cleared,
}

/// Decrements an in-flight counter when the transfer scope ends.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Orchestrates one logical UART-over-BLE connection: outbound chunked
/// sends, inbound notification ingestion, the shared transcript, and the
/// optional message bridge. Collaborators are injected at construction;
/// there is no process-wide state.
pub struct TransferRouter {
    transport: Arc<dyn UartTransport>,
    bridge: Option<BridgeHandle>,
    transcript: Transcript,
    max_chunk_size: usize,
    phase: Mutex<LinkPhase>,
    sends_in_flight: AtomicUsize,
    recvs_in_flight: AtomicUsize,
    send_serial: async_lock::Mutex<()>,
    events: broadcast::Sender<TransferEvent>,
}

impl TransferRouter {
    pub fn new(transport: Arc<dyn UartTransport>, bridge: Option<BridgeHandle>) -> Self {
        Self::with_max_chunk_size(transport, bridge, TX_MAX_CHUNK)
    }

    pub fn with_max_chunk_size(
        transport: Arc<dyn UartTransport>,
        bridge: Option<BridgeHandle>,
        max_chunk_size: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            transport,
            bridge,
            transcript: Transcript::new(),
            max_chunk_size,
            phase: Mutex::new(LinkPhase::Idle),
            sends_in_flight: AtomicUsize::new(0),
            recvs_in_flight: AtomicUsize::new(0),
            send_serial: async_lock::Mutex::new(()),
            events,
        }
    }

    /// A transport became available; start resolving its characteristics.
    pub fn begin_discovery(&self) -> Result<ConnectionState, UartError> {
        let mut phase = self.phase.lock().unwrap();
        match *phase {
            LinkPhase::Idle | LinkPhase::Discovering { .. } => {
                *phase = LinkPhase::Discovering {
                    rx_resolved: false,
                    tx_resolved: false,
                };
                Ok(ConnectionState::Discovering)
            }
            LinkPhase::Ready => Err(UartError::InvalidArgument("link is already ready")),
            LinkPhase::Closed => Err(UartError::Closed),
        }
    }

    /// Offer a discovered characteristic identifier. Identifiers coming
    /// from platform BLE stacks vary in case, so candidates are parsed
    /// (any case accepted) and compared by value against the fixed RX/TX
    /// UUIDs; anything else is ignored. Once both are resolved the link
    /// becomes `Ready`: sends are enabled and notifications may flow.
    pub fn characteristic_discovered(&self, uuid: &str) -> Result<ConnectionState, UartError> {
        let candidate = Uuid::parse_str(uuid.trim()).ok();

        let mut phase = self.phase.lock().unwrap();
        match *phase {
            LinkPhase::Discovering {
                mut rx_resolved,
                mut tx_resolved,
            } => {
                if candidate == Some(*UART_RX_CHARACTERISTIC_UUID) {
                    rx_resolved = true;
                }
                if candidate == Some(*UART_TX_CHARACTERISTIC_UUID) {
                    tx_resolved = true;
                }
                *phase = if rx_resolved && tx_resolved {
                    trace!("Both UART characteristics resolved, link ready");
                    LinkPhase::Ready
                } else {
                    LinkPhase::Discovering {
                        rx_resolved,
                        tx_resolved,
                    }
                };
                Ok(self.derive_state(*phase))
            }
            LinkPhase::Ready => Ok(ConnectionState::Ready),
            LinkPhase::Idle => Err(UartError::NotReady),
            LinkPhase::Closed => Err(UartError::Closed),
        }
    }

    /// Send text over the link.
    ///
    /// Publishes the raw text to the bridge's TX feed first (best-effort),
    /// unless the message itself came from the bridge: bridge-originated
    /// text is never echoed back to the bridge. Bridge-originated text is
    /// forwarded onto the link only under [`SubscribeBehaviour::Transmit`];
    /// either way a `Sent` record is appended.
    ///
    /// A transport failure aborts the remaining fragments and is returned
    /// as a value; no record is appended for a payload the link rejected.
    pub async fn send(
        &self,
        text: &str,
        originated_from_bridge: bool,
    ) -> Result<Arc<TransferRecord>, UartError> {
        self.ensure_transfer_allowed()?;

        if let Some(handle) = &self.bridge {
            if handle.config.publish_enabled && !originated_from_bridge {
                if let Err(e) = handle.bridge.publish(&handle.config.tx_topic, text).await {
                    warn!("Bridge publish (TX feed) failed: {}", e);
                }
            }
        }

        let payload = Bytes::copy_from_slice(text.as_bytes());

        self.sends_in_flight.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight(&self.sends_in_flight);

        self.transmit(&payload, originated_from_bridge).await?;

        let record = self.transcript.append(Direction::Sent, payload);
        let _ = self.events.send(TransferEvent::Sent(record.clone()));
        Ok(record)
    }

    async fn transmit(&self, payload: &Bytes, originated_from_bridge: bool) -> Result<(), UartError> {
        let forward = !originated_from_bridge
            || self
                .bridge
                .as_ref()
                .map(|h| h.config.subscribe_behaviour == SubscribeBehaviour::Transmit)
                .unwrap_or(true);
        if !forward {
            return Ok(());
        }

        // One payload on the link at a time; fragments of two payloads
        // must never interleave. Awaiting each write is the backpressure
        // point for the next fragment.
        let _serial = self.send_serial.lock().await;
        for fragment in chunk::chunks(payload, self.max_chunk_size)? {
            self.ensure_not_closed()?;
            trace!("TX fragment: {} bytes", fragment.len());
            self.transport.write(fragment).await?;
        }
        Ok(())
    }

    /// Ingest bytes notified by the transport. Valid any time after the
    /// link became ready. The record is appended before the bridge publish
    /// so a failing bridge can never drop received data.
    pub async fn receive(&self, data: &[u8]) -> Result<Arc<TransferRecord>, UartError> {
        self.ensure_transfer_allowed()?;

        self.recvs_in_flight.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight(&self.recvs_in_flight);

        let record = self
            .transcript
            .append(Direction::Received, Bytes::copy_from_slice(data));
        let _ = self.events.send(TransferEvent::Received(record.clone()));

        if let Some(handle) = &self.bridge {
            if handle.config.publish_enabled {
                match decode_payload(data, DecodeMode::Utf8) {
                    Some(text) => {
                        if let Err(e) = handle.bridge.publish(&handle.config.rx_topic, &text).await
                        {
                            warn!("Bridge publish (RX feed) failed: {}", e);
                        }
                    }
                    None => trace!("RX payload is not UTF-8, skipping bridge publish"),
                }
            }
        }

        Ok(record)
    }

    /// Clear the transcript and both byte counters. Connection state is
    /// untouched.
    pub fn reset(&self) {
        self.transcript.clear();
        let _ = self.events.send(TransferEvent::Cleared);
    }

    /// Terminal teardown. Safe to call concurrently with in-flight
    /// transfers: they either complete or fail with `Closed`; the
    /// transcript never ends up half-written.
    pub fn close(&self) {
        *self.phase.lock().unwrap() = LinkPhase::Closed;
    }

    pub fn current_state(&self) -> ConnectionState {
        let phase = *self.phase.lock().unwrap();
        self.derive_state(phase)
    }

    /// Render the full transcript. Echo policy never applies to export.
    pub fn export(&self, format: ExportFormat, mode: DecodeMode) -> Result<String, UartError> {
        export::render(&self.transcript.snapshot(), format, mode)
    }

    pub fn snapshot(&self) -> Vec<Arc<TransferRecord>> {
        self.transcript.snapshot()
    }

    pub fn filtered<F>(&self, predicate: F) -> Vec<Arc<TransferRecord>>
    where
        F: Fn(&TransferRecord) -> bool,
    {
        self.transcript.filtered(predicate)
    }

    pub fn visible_records(&self, echo_enabled: bool) -> Vec<Arc<TransferRecord>> {
        self.transcript.visible(echo_enabled)
    }

    pub fn sent_bytes(&self) -> usize {
        self.transcript.sent_bytes()
    }

    pub fn received_bytes(&self) -> usize {
        self.transcript.received_bytes()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Subscribe to transcript mutations.
    pub fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.events.subscribe()
    }

    fn derive_state(&self, phase: LinkPhase) -> ConnectionState {
        match phase {
            LinkPhase::Idle => ConnectionState::Idle,
            LinkPhase::Discovering { .. } => ConnectionState::Discovering,
            LinkPhase::Closed => ConnectionState::Closed,
            LinkPhase::Ready => {
                if self.sends_in_flight.load(Ordering::SeqCst) > 0 {
                    ConnectionState::Sending
                } else if self.recvs_in_flight.load(Ordering::SeqCst) > 0 {
                    ConnectionState::Receiving
                } else {
                    ConnectionState::Ready
                }
            }
        }
    }

    fn ensure_transfer_allowed(&self) -> Result<(), UartError> {
        match *self.phase.lock().unwrap() {
            LinkPhase::Ready => Ok(()),
            LinkPhase::Closed => Err(UartError::Closed),
            LinkPhase::Idle | LinkPhase::Discovering { .. } => Err(UartError::NotReady),
        }
    }

    fn ensure_not_closed(&self) -> Result<(), UartError> {
        if matches!(*self.phase.lock().unwrap(), LinkPhase::Closed) {
            Err(UartError::Closed)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bridge::{BridgeConfig, MessageBridge};
    use async_trait::async_trait;

    struct TestTransport {
        writes: Mutex<Vec<Vec<u8>>>,
        fail: bool,
    }

    impl TestTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                writes: Mutex::new(vec![]),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                writes: Mutex::new(vec![]),
                fail: true,
            })
        }

        fn writes(&self) -> Vec<Vec<u8>> {
            self.writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UartTransport for TestTransport {
        async fn write(&self, data: &[u8]) -> Result<(), UartError> {
            if self.fail {
                return Err(UartError::Transport("injected failure".to_string()));
            }
            self.writes.lock().unwrap().push(data.to_vec());
            Ok(())
        }
    }

    struct TestBridge {
        published: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl TestBridge {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                published: Mutex::new(vec![]),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                published: Mutex::new(vec![]),
                fail: true,
            })
        }

        fn published(&self) -> Vec<(String, String)> {
            self.published.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageBridge for TestBridge {
        async fn publish(&self, topic: &str, payload: &str) -> Result<(), UartError> {
            if self.fail {
                return Err(UartError::Bridge("injected failure".to_string()));
            }
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_string()));
            Ok(())
        }
    }

    fn bridge_handle(bridge: Arc<TestBridge>, behaviour: SubscribeBehaviour) -> BridgeHandle {
        BridgeHandle::new(
            bridge,
            BridgeConfig {
                publish_enabled: true,
                tx_topic: "uart/tx".to_string(),
                rx_topic: "uart/rx".to_string(),
                subscribe_behaviour: behaviour,
            },
        )
    }

    fn make_ready(router: &TransferRouter) {
        router.begin_discovery().unwrap();
        // Identifier case must not matter.
        router
            .characteristic_discovered("6E400003-B5A3-F393-E0A9-E50E24DCCA9E")
            .unwrap();
        router
            .characteristic_discovered("6e400002-b5a3-f393-e0a9-e50e24dcca9e")
            .unwrap();
        assert_eq!(router.current_state(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn send_before_ready_fails_without_side_effects() {
        let transport = TestTransport::new();
        let router = TransferRouter::new(transport.clone(), None);

        assert_eq!(
            router.send("hi", false).await.unwrap_err(),
            UartError::NotReady
        );
        assert!(transport.writes().is_empty());
        assert!(router.snapshot().is_empty());
        assert_eq!(router.sent_bytes(), 0);
    }

    #[tokio::test]
    async fn discovery_needs_both_characteristics() {
        let router = TransferRouter::new(TestTransport::new(), None);
        assert_eq!(router.current_state(), ConnectionState::Idle);

        router.begin_discovery().unwrap();
        assert_eq!(router.current_state(), ConnectionState::Discovering);

        // Unrelated characteristic is ignored.
        let state = router
            .characteristic_discovered("00002a00-0000-1000-8000-00805f9b34fb")
            .unwrap();
        assert_eq!(state, ConnectionState::Discovering);

        let state = router
            .characteristic_discovered("6E400003-B5A3-F393-E0A9-E50E24DCCA9E")
            .unwrap();
        assert_eq!(state, ConnectionState::Discovering);

        let state = router
            .characteristic_discovered("6E400002-B5A3-F393-E0A9-E50E24DCCA9E")
            .unwrap();
        assert_eq!(state, ConnectionState::Ready);
    }

    #[tokio::test]
    async fn send_chunks_in_order() {
        let transport = TestTransport::new();
        let router = TransferRouter::with_max_chunk_size(transport.clone(), None, 4);
        make_ready(&router);

        router.send("abcdefghij", false).await.unwrap();

        assert_eq!(
            transport.writes(),
            vec![b"abcd".to_vec(), b"efgh".to_vec(), b"ij".to_vec()]
        );
        assert_eq!(router.sent_bytes(), 10);
        assert_eq!(router.snapshot().len(), 1);
        assert_eq!(router.snapshot()[0].direction, Direction::Sent);
    }

    #[tokio::test]
    async fn empty_send_writes_nothing_but_is_recorded() {
        let transport = TestTransport::new();
        let router = TransferRouter::new(transport.clone(), None);
        make_ready(&router);

        router.send("", false).await.unwrap();

        assert!(transport.writes().is_empty());
        assert_eq!(router.snapshot().len(), 1);
        assert_eq!(router.sent_bytes(), 0);
    }

    #[tokio::test]
    async fn zero_chunk_size_is_an_invalid_argument() {
        let router = TransferRouter::with_max_chunk_size(TestTransport::new(), None, 0);
        make_ready(&router);

        assert_eq!(
            router.send("hi", false).await.unwrap_err(),
            UartError::InvalidArgument("max_chunk_size must be > 0")
        );
        assert!(router.snapshot().is_empty());
    }

    #[tokio::test]
    async fn local_send_publishes_to_tx_feed() {
        let bridge = TestBridge::new();
        let router = TransferRouter::new(
            TestTransport::new(),
            Some(bridge_handle(bridge.clone(), SubscribeBehaviour::Transmit)),
        );
        make_ready(&router);

        router.send("hello", false).await.unwrap();

        assert_eq!(
            bridge.published(),
            vec![("uart/tx".to_string(), "hello".to_string())]
        );
    }

    #[tokio::test]
    async fn bridge_originated_send_is_never_republished() {
        let bridge = TestBridge::new();
        let transport = TestTransport::new();
        let router = TransferRouter::new(
            transport.clone(),
            Some(bridge_handle(bridge.clone(), SubscribeBehaviour::Transmit)),
        );
        make_ready(&router);

        router.send("from-bridge", true).await.unwrap();

        assert!(bridge.published().is_empty());
        // Transmit behaviour still forwards onto the link.
        assert!(!transport.writes().is_empty());
        assert_eq!(router.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn local_only_behaviour_records_without_transmitting() {
        let bridge = TestBridge::new();
        let transport = TestTransport::new();
        let router = TransferRouter::new(
            transport.clone(),
            Some(bridge_handle(bridge.clone(), SubscribeBehaviour::LocalOnly)),
        );
        make_ready(&router);

        let record = router.send("mirror-only", true).await.unwrap();

        assert!(transport.writes().is_empty());
        assert_eq!(record.direction, Direction::Sent);
        assert_eq!(router.sent_bytes(), "mirror-only".len());
    }

    #[tokio::test]
    async fn receive_appends_then_publishes() {
        let bridge = TestBridge::new();
        let router = TransferRouter::new(
            TestTransport::new(),
            Some(bridge_handle(bridge.clone(), SubscribeBehaviour::LocalOnly)),
        );
        make_ready(&router);

        let record = router.receive(b"pong").await.unwrap();

        assert_eq!(record.direction, Direction::Received);
        assert_eq!(router.received_bytes(), 4);
        assert_eq!(
            bridge.published(),
            vec![("uart/rx".to_string(), "pong".to_string())]
        );
    }

    #[tokio::test]
    async fn receive_skips_publish_for_non_utf8_but_keeps_record() {
        let bridge = TestBridge::new();
        let router = TransferRouter::new(
            TestTransport::new(),
            Some(bridge_handle(bridge.clone(), SubscribeBehaviour::LocalOnly)),
        );
        make_ready(&router);

        router.receive(&[0xff, 0xfe]).await.unwrap();

        assert!(bridge.published().is_empty());
        assert_eq!(router.snapshot().len(), 1);
        assert_eq!(router.received_bytes(), 2);
    }

    #[tokio::test]
    async fn bridge_failure_never_drops_a_received_record() {
        let router = TransferRouter::new(
            TestTransport::new(),
            Some(bridge_handle(
                TestBridge::failing(),
                SubscribeBehaviour::LocalOnly,
            )),
        );
        make_ready(&router);

        let record = router.receive(b"kept").await.unwrap();
        assert_eq!(record.payload.as_ref(), b"kept");
        assert_eq!(router.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn transport_failure_appends_no_record() {
        let router = TransferRouter::new(TestTransport::failing(), None);
        make_ready(&router);

        match router.send("doomed", false).await {
            Err(UartError::Transport(_)) => {}
            other => panic!("expected transport error, got {:?}", other.map(|_| ())),
        }
        assert!(router.snapshot().is_empty());
        assert_eq!(router.sent_bytes(), 0);
        assert_eq!(router.current_state(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn closed_is_terminal() {
        let transport = TestTransport::new();
        let router = TransferRouter::new(transport.clone(), None);
        make_ready(&router);
        router.close();

        assert_eq!(router.current_state(), ConnectionState::Closed);
        assert_eq!(
            router.send("late", false).await.unwrap_err(),
            UartError::Closed
        );
        assert_eq!(router.receive(b"late").await.unwrap_err(), UartError::Closed);
        assert_eq!(router.begin_discovery().unwrap_err(), UartError::Closed);
        assert!(transport.writes().is_empty());
    }

    #[tokio::test]
    async fn reset_clears_transcript_but_not_state() {
        let router = TransferRouter::new(TestTransport::new(), None);
        make_ready(&router);

        router.send("one", false).await.unwrap();
        router.receive(b"two").await.unwrap();
        router.reset();

        assert!(router.snapshot().is_empty());
        assert_eq!(router.sent_bytes(), 0);
        assert_eq!(router.received_bytes(), 0);
        assert_eq!(router.current_state(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn transfer_events_are_emitted() {
        let router = TransferRouter::new(TestTransport::new(), None);
        make_ready(&router);
        let mut events = router.subscribe();

        router.send("ping", false).await.unwrap();
        router.receive(b"pong").await.unwrap();
        router.reset();

        assert!(matches!(events.try_recv().unwrap(), TransferEvent::Sent(_)));
        assert!(matches!(
            events.try_recv().unwrap(),
            TransferEvent::Received(_)
        ));
        assert!(matches!(events.try_recv().unwrap(), TransferEvent::Cleared));
    }

    #[tokio::test]
    async fn export_round_trip_through_router() {
        let router = TransferRouter::new(TestTransport::new(), None);
        make_ready(&router);

        assert_eq!(
            router
                .export(ExportFormat::Json, DecodeMode::Utf8)
                .unwrap_err(),
            UartError::NothingToExport
        );

        router.send("hi", false).await.unwrap();
        let csv = router.export(ExportFormat::Csv, DecodeMode::Utf8).unwrap();
        assert!(csv.starts_with("Timestamp,Mode,Data\r\n"));
        assert!(csv.contains(",TX,\"hi\""));
    }

    #[tokio::test]
    async fn echo_policy_reaches_view_but_not_export() {
        let router = TransferRouter::new(TestTransport::new(), None);
        make_ready(&router);

        router.send("a", false).await.unwrap();
        router.receive(b"b").await.unwrap();
        router.send("c", false).await.unwrap();

        let visible = router.visible_records(false);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].payload.as_ref(), b"b");

        let text = router.export(ExportFormat::Text, DecodeMode::Utf8).unwrap();
        assert_eq!(text, "abc");
    }
}
