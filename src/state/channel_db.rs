// channel_db.rs - channel database
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

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

use super::structs::*;

/// Channels of all servers. Key is (server key, lowercase channel name).
#[derive(Default)]
pub struct ChannelDb {
    channels: Mutex<HashMap<(String, String), SharedChannel>>,
}

fn channel_key(server_key: &str, name: &str) -> (String, String) {
    (server_key.to_string(), name.to_lowercase())
}

impl ChannelDb {
    pub fn new() -> ChannelDb {
        ChannelDb::default()
    }

    /// Adds channel. If channel already exists then it is returned.
    pub fn add(&self, channel: Channel) -> SharedChannel {
        let key = channel_key(channel.server_key(), channel.name());
        self.channels
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(channel)))
            .clone()
    }

    pub fn find(&self, server_key: &str, name: &str) -> Option<SharedChannel> {
        self.channels.lock().get(&channel_key(server_key, name)).cloned()
    }

    pub fn find_or_create(&self, server_key: &str, name: &str) -> SharedChannel {
        self.channels
            .lock()
            .entry(channel_key(server_key, name))
            .or_insert_with(|| Arc::new(RwLock::new(Channel::new(server_key, name, false))))
            .clone()
    }

    pub fn remove(&self, server_key: &str, name: &str) -> Option<SharedChannel> {
        self.channels.lock().remove(&channel_key(server_key, name))
    }

    pub fn channels(&self, server_key: &str) -> Vec<SharedChannel> {
        self.channels
            .lock()
            .iter()
            .filter(|((s, _), _)| s == server_key)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Removes user from membership of all channels in server.
    pub fn remove_member(&self, server_key: &str, fullhost: &str, nick: &str) {
        self.channels
            .lock()
            .iter()
            .filter(|((s, _), _)| s == server_key)
            .for_each(|(_, c)| c.write().remove_user(fullhost, nick));
    }

    /// Renames member in all channels in server.
    pub fn rename_member(&self, server_key: &str, old_fullhost: &str,
                old_nick: &str, fullhost: &str, nick: &str) {
        self.channels
            .lock()
            .iter()
            .filter(|((s, _), _)| s == server_key)
            .for_each(|(_, c)| c.write().rename_user(old_fullhost, old_nick, fullhost, nick));
    }

    /// Clears membership of all channels in server (after disconnection).
    pub fn clear_server(&self, server_key: &str) {
        self.channels
            .lock()
            .iter()
            .filter(|((s, _), _)| s == server_key)
            .for_each(|(_, c)| c.write().clear_users());
    }

    /// Drops non-explicit channels and clears membership of the remaining.
    pub fn prepare_for_serialization(&self) {
        let mut channels = self.channels.lock();
        channels.retain(|_, c| c.read().explicit);
        channels.values().for_each(|c| c.write().clear_users());
    }

    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }
}
