/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use log::warn;
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::LinesStream;

use uart_bridge::transport::ble::{BleUartTransport, UartScanner};
use uart_bridge::{
    decode_payload, DecodeMode, DisplayMode, ExportFormat, Preferences, TransferEvent,
    TransferRouter,
};

use clap::Parser;

#[macro_use]
extern crate lazy_static;

#[derive(clap::Parser)]
#[clap(about, version, author)]
struct Args {
    /// Bluetooth adapter index
    #[clap(long, short = 'a', default_value_t = 0)]
    adapter: usize,
    /// Substring of the peripheral's advertised name; empty matches any
    /// peripheral advertising the UART service
    #[clap(long, short = 'n', default_value = "")]
    name: String,
    /// Display and export payloads as hex instead of UTF-8
    #[clap(long)]
    hex: bool,
    /// Hide locally-sent data from the live output
    #[clap(long)]
    no_echo: bool,
    /// Do not append a newline to each sent line
    #[clap(long)]
    no_eol: bool,
    /// Export the transcript to this file on exit
    #[clap(long, short = 'e', value_name = "PATH")]
    export: Option<String>,
    /// Export format: txt, csv, json or xml
    #[clap(long, short = 'f', default_value = "txt")]
    format: String,
}

lazy_static! {
    static ref ARGS: Args = Args::parse();
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let format = match ARGS.format.as_str() {
        "txt" => ExportFormat::Text,
        "csv" => ExportFormat::Csv,
        "json" => ExportFormat::Json,
        "xml" => ExportFormat::Xml,
        other => {
            eprintln!("Unknown export format: {}. Use --help for more information.", other);
            return;
        }
    };

    let prefs = Preferences {
        decode_mode: if ARGS.hex {
            DecodeMode::Hex
        } else {
            DecodeMode::Utf8
        },
        echo_enabled: !ARGS.no_echo,
        auto_eol: !ARGS.no_eol,
        display_mode: DisplayMode::Text,
    };

    let mut scanner = UartScanner::new().await.unwrap();
    println!("Adapters: {:?}", scanner.get_adapter_name().await.unwrap());
    scanner.set_adapter(ARGS.adapter).unwrap();

    println!("Scanning for UART peripherals...");
    scanner.scan(Duration::from_secs(2)).await.unwrap();
    let peripheral = scanner
        .search_by_name(&ARGS.name)
        .await
        .unwrap()
        .expect("No matching UART peripheral found.");

    let transport = Arc::new(BleUartTransport::connect(peripheral).await.unwrap());
    let router = Arc::new(TransferRouter::new(transport.clone(), None));

    router.begin_discovery().unwrap();
    let (rx_id, tx_id) = transport.characteristic_ids();
    router.characteristic_discovered(&rx_id).unwrap();
    router.characteristic_discovered(&tx_id).unwrap();
    println!("Link ready. Type lines to send; EOF (Ctrl-D) to quit.");

    let mut notifications = transport.notifications().await.unwrap();
    let ingest = router.clone();
    tokio::spawn(async move {
        while let Some(data) = notifications.next().await {
            if ingest.receive(&data).await.is_err() {
                break;
            }
        }
    });

    let mut events = router.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            let record = match event {
                TransferEvent::Received(record) => record,
                TransferEvent::Sent(record) if prefs.echo_enabled => record,
                _ => continue,
            };
            if let Some(text) = decode_payload(&record.payload, prefs.decode_mode) {
                print!("{}", text);
                let _ = std::io::stdout().flush();
            }
        }
    });

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = LinesStream::new(stdin.lines());
    while let Some(line) = lines.next().await {
        let mut text = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        if prefs.auto_eol {
            text.push('\n');
        }
        if let Err(e) = router.send(&text, false).await {
            warn!("Send failed: {}", e);
        }
    }

    if let Some(path) = &ARGS.export {
        match router.export(format, prefs.decode_mode) {
            Ok(rendered) => {
                tokio::fs::write(path, rendered).await.unwrap();
                println!(
                    "Exported {} sent / {} received bytes to {}",
                    router.sent_bytes(),
                    router.received_bytes(),
                    path
                );
            }
            Err(e) => eprintln!("Export failed: {}", e),
        }
    }

    router.close();
    transport.disconnect().await.ok();
}
