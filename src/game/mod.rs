// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Board state, fog-of-war visibility and spawn placement.

pub mod board;
pub mod fog;
pub mod spawn;

pub use board::Board;
pub use fog::{FogOfWar, Stakeholders};
pub use spawn::{spawn_challenge, spawn_location};
