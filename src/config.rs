/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::codec::DecodeMode;

/// How a consumer wants the transcript presented. Affects queries only,
/// never what is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Concatenated text of the visible records.
    Text,
    /// One row per visible record.
    Table,
}

/// Read-only user preferences, supplied by the embedding application at
/// call time. The core never stores or mutates these.
#[derive(Debug, Clone, Copy)]
pub struct Preferences {
    pub decode_mode: DecodeMode,
    /// Show locally-sent data in the live views.
    pub echo_enabled: bool,
    /// Append a newline to outbound text at the input boundary.
    pub auto_eol: bool,
    pub display_mode: DisplayMode,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            decode_mode: DecodeMode::Utf8,
            echo_enabled: true,
            auto_eol: true,
            display_mode: DisplayMode::Text,
        }
    }
}
