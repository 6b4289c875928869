// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Host-runnable DFU target.
//!
//! Receives the tagged record stream over a serial link (or from a capture
//! file), drives the modem through full-DFU mode and stores the images.

pub mod modem;
pub mod session;
pub mod sink;
