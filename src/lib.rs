// lib.rs - bot engine
//
// simple-irc-bot - simple IRC bot
// Copyright (C) 2022  Mateusz Szpakowski
//
// This library is free software; you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public
// License as published by the Free Software Foundation; either
// version 2.1 of the License, or (at your option) any later version.
//
// This library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this library; if not, write to the Free Software
// Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA  02110-1301  USA

//! Engine of simple IRC bot: protocol description (grammar), events,
//! commands and users with access levels. Extensions use these modules to
//! register callbacks and commands.

pub mod access;
pub mod bot;
pub mod builtin;
pub mod config;
pub mod core_events;
pub mod error;
pub mod grammar;
pub mod help;
pub mod proto_event;
pub mod registrar;
pub mod state;
pub mod utils;
