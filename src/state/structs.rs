// structs.rs - identity structures
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

use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::access::Access;
use crate::error::{BotError, Result};

pub type SharedUser = Arc<RwLock<User>>;
pub type SharedChannel = Arc<RwLock<Channel>>;

pub fn new_shared_user(user: User) -> SharedUser {
    Arc::new(RwLock::new(user))
}

/// Selects the connection and optionally the channel through which an user
/// is viewed. Empty scope means global view.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Scope {
    pub server: Option<String>,
    pub channel: Option<String>,
}

impl Scope {
    pub fn global() -> Scope {
        Scope::default()
    }

    pub fn server(server_key: &str) -> Scope {
        Scope {
            server: Some(server_key.to_string()),
            channel: None,
        }
    }

    pub fn channel(server_key: &str, channel: &str) -> Scope {
        Scope {
            server: Some(server_key.to_string()),
            channel: Some(channel.to_lowercase()),
        }
    }
}

// split fullhost in form: nick[!user]@host
pub fn split_fullhost(fullhost: &str) -> (&str, Option<&str>, Option<&str>) {
    let (nick_user, host) = match fullhost.split_once('@') {
        Some((nu, h)) => (nu, Some(h)),
        None => (fullhost, None),
    };
    match nick_user.split_once('!') {
        Some((nick, user)) => (nick, Some(user), host),
        None => (nick_user, None, host),
    }
}

/// Host mask used to recognize an user.
#[derive(Clone, Debug)]
pub enum HostMask {
    Exact(String),
    Pattern(Regex),
}

impl HostMask {
    pub fn exact(host: &str) -> HostMask {
        HostMask::Exact(host.to_string())
    }

    pub fn pattern(pattern: &str) -> Result<HostMask> {
        Regex::new(pattern)
            .map(HostMask::Pattern)
            .map_err(|e| BotError::InvalidArgument(e.to_string()))
    }

    pub fn matches(&self, host: &str) -> bool {
        match self {
            HostMask::Exact(h) => h.eq_ignore_ascii_case(host),
            HostMask::Pattern(re) => re.is_match(host),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            HostMask::Exact(h) => h,
            HostMask::Pattern(re) => re.as_str(),
        }
    }
}

impl PartialEq for HostMask {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostMask::Exact(h1), HostMask::Exact(h2)) => h1.eq_ignore_ascii_case(h2),
            (HostMask::Pattern(p1), HostMask::Pattern(p2)) => p1.as_str() == p2.as_str(),
            _ => false,
        }
    }
}

/// User state and access in a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelUser {
    channel_name: String,
    pub access: Access,
    modes: Option<String>,
    online: bool,
    pub explicit: bool,
}

impl ChannelUser {
    pub fn new(channel_name: &str, access: Access) -> ChannelUser {
        ChannelUser {
            channel_name: channel_name.to_lowercase(),
            access,
            modes: None,
            online: false,
            explicit: false,
        }
    }

    pub fn set_state(&mut self, modes: &str) {
        self.modes = Some(modes.to_string());
        self.online = true;
    }

    pub fn wipe_state(&mut self) {
        self.modes = None;
        self.online = false;
    }

    pub fn has_mode(&self, mode: char) -> bool {
        self.modes.as_ref().map_or(false, |m| m.contains(mode))
    }

    pub fn modes(&self) -> Option<&str> {
        self.modes.as_deref()
    }

    pub fn online(&self) -> bool {
        self.online
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }
}

/// User state and access in a server (connection).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerUser {
    server_key: String,
    pub access: Access,
    fullhost: Option<String>,
    nick: Option<String>,
    user: Option<String>,
    host: Option<String>,
    realname: Option<String>,
    online: bool,
    chanlist: Vec<String>, // joined channels
    channels: HashMap<String, ChannelUser>,
}

impl ServerUser {
    pub fn new(server_key: &str, access: Access) -> ServerUser {
        ServerUser {
            server_key: server_key.to_string(),
            access,
            fullhost: None,
            nick: None,
            user: None,
            host: None,
            realname: None,
            online: false,
            chanlist: vec![],
            channels: HashMap::new(),
        }
    }

    pub fn set_fullhost(&mut self, fullhost: &str) {
        let (nick, user, host) = split_fullhost(fullhost);
        self.nick = Some(nick.to_string());
        self.user = user.map(|x| x.to_string());
        self.host = host.map(|x| x.to_string());
        self.fullhost = Some(fullhost.to_string());
        self.online = true;
    }

    pub fn set_state(&mut self, fullhost: &str, realname: Option<&str>, channels: &[&str]) {
        self.set_fullhost(fullhost);
        self.realname = realname.map(|x| x.to_string());
        self.chanlist = channels.iter().map(|c| c.to_lowercase()).collect();
    }

    // clear transient state and drop non-explicit channels
    pub fn wipe_state(&mut self) {
        self.fullhost = None;
        self.nick = None;
        self.user = None;
        self.host = None;
        self.realname = None;
        self.online = false;
        self.chanlist.clear();
        self.channels.retain(|_, c| c.explicit);
        self.channels.values_mut().for_each(|c| c.wipe_state());
    }

    pub fn add_channel(&mut self, channel_name: &str, access: Access) -> &mut ChannelUser {
        let channel_name = channel_name.to_lowercase();
        self.channels
            .entry(channel_name.clone())
            .or_insert_with(|| ChannelUser::new(&channel_name, access))
    }

    pub fn remove_channel(&mut self, channel_name: &str) -> Option<ChannelUser> {
        self.channels.remove(&channel_name.to_lowercase())
    }

    pub fn channel(&self, channel_name: &str) -> Option<&ChannelUser> {
        self.channels.get(&channel_name.to_lowercase())
    }

    pub fn channel_mut(&mut self, channel_name: &str) -> Option<&mut ChannelUser> {
        self.channels.get_mut(&channel_name.to_lowercase())
    }

    /// Marks channel as joined and creates its ChannelUser if needed.
    pub fn join(&mut self, channel_name: &str) {
        let channel_name = channel_name.to_lowercase();
        if !self.chanlist.contains(&channel_name) {
            self.chanlist.push(channel_name.clone());
        }
        let chuser = self.add_channel(&channel_name, Access::default());
        if !chuser.online {
            chuser.set_state("");
        }
    }

    pub fn part(&mut self, channel_name: &str) {
        let channel_name = channel_name.to_lowercase();
        self.chanlist.retain(|c| *c != channel_name);
        let explicit = self.channels.get(&channel_name).map(|c| c.explicit);
        match explicit {
            Some(true) => {
                if let Some(c) = self.channels.get_mut(&channel_name) {
                    c.wipe_state();
                }
            }
            Some(false) => {
                self.channels.remove(&channel_name);
            }
            None => {}
        }
    }

    pub fn is_joined(&self, channel_name: &str) -> bool {
        let channel_name = channel_name.to_lowercase();
        self.chanlist.contains(&channel_name)
    }

    pub fn channels(&self) -> &[String] {
        &self.chanlist
    }

    pub fn server_key(&self) -> &str {
        &self.server_key
    }
    pub fn fullhost(&self) -> Option<&str> {
        self.fullhost.as_deref()
    }
    pub fn nick(&self) -> Option<&str> {
        self.nick.as_deref()
    }
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }
    pub fn realname(&self) -> Option<&str> {
        self.realname.as_deref()
    }
    pub fn online(&self) -> bool {
        self.online
    }
}

/// An IRC user (identity). It can be known in many servers.
#[derive(Clone, Debug, Default)]
pub struct User {
    hosts: Vec<HostMask>,
    servers: HashMap<String, ServerUser>,
    pub global_access: Access,
    // explicit users survive serialization, other are only state
    pub explicit: bool,
}

impl User {
    pub fn new() -> User {
        User::default()
    }

    pub fn new_explicit() -> User {
        User {
            explicit: true,
            ..User::default()
        }
    }

    pub fn add_host(&mut self, mask: HostMask) {
        if !self.hosts.contains(&mask) {
            self.hosts.push(mask);
        }
    }

    pub fn remove_host(&mut self, mask: &str) -> bool {
        let len = self.hosts.len();
        self.hosts.retain(|h| h.as_str() != mask);
        len != self.hosts.len()
    }

    // replace exact host mask - used while nick changes
    pub fn replace_exact_host(&mut self, old_host: &str, new_host: &str) -> bool {
        let mut replaced = false;
        self.hosts.iter_mut().for_each(|h| {
            if let HostMask::Exact(ref mut s) = h {
                if s.eq_ignore_ascii_case(old_host) {
                    *s = new_host.to_string();
                    replaced = true;
                }
            }
        });
        replaced
    }

    pub fn hosts(&self) -> &[HostMask] {
        &self.hosts
    }

    pub fn matches_host(&self, host: &str) -> bool {
        self.hosts.iter().any(|h| h.matches(host))
    }

    pub fn add_server(&mut self, server_key: &str, access: Access) -> &mut ServerUser {
        self.servers
            .entry(server_key.to_string())
            .or_insert_with(|| ServerUser::new(server_key, access))
    }

    pub fn remove_server(&mut self, server_key: &str) -> Option<ServerUser> {
        self.servers.remove(server_key)
    }

    pub fn server(&self, server_key: &str) -> Option<&ServerUser> {
        self.servers.get(server_key)
    }

    pub fn server_mut(&mut self, server_key: &str) -> Option<&mut ServerUser> {
        self.servers.get_mut(server_key)
    }

    pub fn online_anywhere(&self) -> bool {
        self.servers.values().any(|s| s.online())
    }

    pub fn wipe_all_state(&mut self) {
        self.servers.values_mut().for_each(|s| s.wipe_state());
    }

    /// Returns user viewed through scope. Fails if scope refers to
    /// a server or a channel that this user doesn't have.
    pub fn scoped<'a>(&'a self, scope: &Scope) -> Result<ScopedUser<'a>> {
        let server = match scope.server {
            Some(ref key) => Some(self.server(key).ok_or_else(|| {
                BotError::Context(format!("User has no server '{}'", key))
            })?),
            None => None,
        };
        let channel = match (server, scope.channel.as_ref()) {
            (Some(s), Some(name)) => Some(s.channel(name).ok_or_else(|| {
                BotError::Context(format!("User has no channel '{}'", name))
            })?),
            (None, Some(name)) => {
                return Err(BotError::Context(format!(
                    "Channel '{}' without server",
                    name
                )))
            }
            _ => None,
        };
        Ok(ScopedUser {
            user: self,
            server,
            channel,
        })
    }

    /// Effective access in scope: global merged with server and channel access.
    pub fn access(&self, scope: &Scope) -> Result<Access> {
        Ok(self.scoped(scope)?.access())
    }
}

/// User viewed through a scope.
#[derive(Clone, Copy, Debug)]
pub struct ScopedUser<'a> {
    user: &'a User,
    server: Option<&'a ServerUser>,
    channel: Option<&'a ChannelUser>,
}

impl<'a> ScopedUser<'a> {
    pub fn access(&self) -> Access {
        if self.server.is_none() && self.channel.is_none() {
            return self.user.global_access;
        }
        Access::merge(vec![
            Some(&self.user.global_access),
            self.server.map(|s| &s.access),
            self.channel.map(|c| &c.access),
        ])
    }

    pub fn fullhost(&self) -> Option<&'a str> {
        self.server.and_then(|s| s.fullhost())
    }

    pub fn nick(&self) -> Option<&'a str> {
        self.server.and_then(|s| s.nick())
    }

    pub fn channels(&self) -> &'a [String] {
        self.server.map_or(&[], |s| s.channels())
    }

    pub fn modes(&self) -> Option<&'a str> {
        self.channel.and_then(|c| c.modes())
    }

    pub fn has_mode(&self, mode: char) -> bool {
        self.channel.map_or(false, |c| c.has_mode(mode))
    }

    pub fn online(&self) -> bool {
        match (self.server, self.channel) {
            (_, Some(c)) => c.online(),
            (Some(s), None) => s.online(),
            _ => false,
        }
    }
}

/// An IRC channel in a server with its known members.
#[derive(Debug)]
pub struct Channel {
    server_key: String,
    name: String,
    users: HashMap<String, SharedUser>, // key is fullhost
    nicks: HashMap<String, SharedUser>, // key is lowercase nick
    pub explicit: bool,
}

impl Channel {
    pub fn new(server_key: &str, name: &str, explicit: bool) -> Channel {
        Channel {
            server_key: server_key.to_string(),
            name: name.to_lowercase(),
            users: HashMap::new(),
            nicks: HashMap::new(),
            explicit,
        }
    }

    pub fn add_user(&mut self, fullhost: &str, nick: &str, user: SharedUser) {
        self.users.insert(fullhost.to_string(), user.clone());
        self.nicks.insert(nick.to_lowercase(), user);
    }

    pub fn remove_user(&mut self, fullhost: &str, nick: &str) {
        self.users.remove(fullhost);
        self.nicks.remove(&nick.to_lowercase());
    }

    pub fn rename_user(&mut self, old_fullhost: &str, old_nick: &str,
                fullhost: &str, nick: &str) {
        if let Some(user) = self.users.remove(old_fullhost) {
            self.nicks.remove(&old_nick.to_lowercase());
            self.add_user(fullhost, nick, user);
        }
    }

    /// Finds member by fullhost (if contains '@') or by nick.
    pub fn find(&self, lookup: &str) -> Option<SharedUser> {
        if lookup.contains('@') {
            self.users.get(lookup).cloned()
        } else {
            self.nicks.get(&lookup.to_lowercase()).cloned()
        }
    }

    pub fn clear_users(&mut self) {
        self.users.clear();
        self.nicks.clear();
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn server_key(&self) -> &str {
        &self.server_key
    }
}
