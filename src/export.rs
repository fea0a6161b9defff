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

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;

use crate::codec::{decode_payload, DecodeMode};
use crate::error::UartError;
use crate::transcript::TransferRecord;

/// Target layout for a transcript export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Text,
    Csv,
    Json,
    Xml,
}

impl ExportFormat {
    /// Conventional file extension for the format.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Text => "txt",
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Xml => "xml",
        }
    }
}

/// Render a transcript snapshot into one of the export layouts.
///
/// Pure except for one check: an empty snapshot is `NothingToExport`, so
/// callers can bail out before ever prompting for a save path. Echo policy
/// never applies here; every record of the snapshot is considered.
pub fn render(
    records: &[Arc<TransferRecord>],
    format: ExportFormat,
    mode: DecodeMode,
) -> Result<String, UartError> {
    if records.is_empty() {
        return Err(UartError::NothingToExport);
    }

    match format {
        ExportFormat::Text => Ok(render_text(records, mode)),
        ExportFormat::Csv => Ok(render_csv(records, mode)),
        ExportFormat::Json => render_json(records, mode),
        ExportFormat::Xml => Ok(render_xml(records, mode)),
    }
}

/// Plain text: the raw transcript with no separators.
///
/// Hex mode decodes the concatenation of all payloads as one unit; UTF-8
/// mode decodes per record and joins the results, skipping records with no
/// renderable text. The two are not equivalent when a multi-byte character
/// straddles a record boundary; both behaviours are kept on purpose.
fn render_text(records: &[Arc<TransferRecord>], mode: DecodeMode) -> String {
    match mode {
        DecodeMode::Hex => {
            let mut raw = Vec::new();
            for record in records {
                raw.extend_from_slice(&record.payload);
            }
            hex::encode(raw)
        }
        DecodeMode::Utf8 => records
            .iter()
            .filter_map(|r| decode_payload(&r.payload, DecodeMode::Utf8))
            .collect(),
    }
}

/// CSV: `Timestamp,Mode,Data` header, CRLF rows, one row per record.
///
/// Undecodable records keep their row with an empty Data field so the
/// export stays consistent with the byte counters shown to the user.
fn render_csv(records: &[Arc<TransferRecord>], mode: DecodeMode) -> String {
    let mut text = String::from("Timestamp,Mode,Data\r\n");

    for record in records {
        let data = decode_payload(&record.payload, mode).unwrap_or_default();
        text.push_str(&format!(
            "{},{},{}\r\n",
            clock_time(&record.timestamp),
            record.direction.mode_label(),
            csv_field(&data),
        ));
    }

    text
}

#[derive(Serialize)]
struct ExportItem {
    timestamp: f64,
    mode: &'static str,
    data: String,
}

#[derive(Serialize)]
struct ExportRoot {
    items: Vec<ExportItem>,
}

/// JSON: `{ "items": [...] }`, pretty-printed.
///
/// Records whose decode is absent are omitted from `items`. CSV keeps them
/// as empty fields instead; the asymmetry is inherited and deliberate.
fn render_json(records: &[Arc<TransferRecord>], mode: DecodeMode) -> Result<String, UartError> {
    let items = records
        .iter()
        .filter_map(|record| {
            decode_payload(&record.payload, mode).map(|data| ExportItem {
                timestamp: unix_seconds(&record.timestamp),
                mode: record.direction.mode_label(),
                data,
            })
        })
        .collect();

    serde_json::to_string_pretty(&ExportRoot { items })
        .map_err(|e| UartError::Encoding(e.to_string()))
}

/// XML: `<uart>` root with one `<item>` per record, data in CDATA.
/// Omission on absent decode matches the JSON serializer.
fn render_xml(records: &[Arc<TransferRecord>], mode: DecodeMode) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<uart>\n");

    for record in records {
        let data = match decode_payload(&record.payload, mode) {
            Some(data) => data,
            None => continue,
        };
        xml.push_str("    <item>\n");
        xml.push_str(&format!(
            "        <timestamp>{}</timestamp>\n",
            unix_seconds(&record.timestamp)
        ));
        xml.push_str(&format!(
            "        <mode>{}</mode>\n",
            record.direction.mode_label()
        ));
        xml.push_str(&format!(
            "        <data><![CDATA[{}]]></data>\n",
            cdata_escape(&data)
        ));
        xml.push_str("    </item>\n");
    }

    xml.push_str("</uart>\n");
    xml
}

/// Fixed CSV timestamp pattern: `HH:MM:SS:FFFF`, four fractional digits
/// (hundreds of microseconds).
fn clock_time(timestamp: &DateTime<Utc>) -> String {
    format!(
        "{:02}:{:02}:{:02}:{:04}",
        timestamp.hour(),
        timestamp.minute(),
        timestamp.second(),
        timestamp.timestamp_subsec_micros() / 100,
    )
}

fn unix_seconds(timestamp: &DateTime<Utc>) -> f64 {
    timestamp.timestamp_micros() as f64 / 1_000_000.0
}

/// Minimal RFC-4180 quoting: always wrapped in double quotes, embedded
/// quotes doubled, embedded line breaks stripped outright since they would
/// break row framing.
fn csv_field(data: &str) -> String {
    let flat: String = data.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    format!("\"{}\"", flat.replace('"', "\"\""))
}

/// A literal `]]>` inside CDATA has to be split across two sections.
fn cdata_escape(data: &str) -> String {
    data.replace("]]>", "]]]]><![CDATA[>")
}
