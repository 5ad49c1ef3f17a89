// user_db.rs - user database and its caches
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

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::*;

use super::structs::*;

#[derive(Default)]
struct UserDbInner {
    users: Vec<SharedUser>,
    host_cache: HashMap<String, SharedUser>,
    // key is (server key, lowercase nick)
    nick_cache: HashMap<(String, String), SharedUser>,
}

impl UserDbInner {
    fn forget_user(&mut self, user: &SharedUser) {
        self.host_cache.retain(|_, u| !Arc::ptr_eq(u, user));
        self.nick_cache.retain(|_, u| !Arc::ptr_eq(u, user));
    }
}

/// Database of all known users shared by all connections.
///
/// Lookups by host and by nick are memoized. A caller must not hold
/// a lock of an user while calling methods of UserDb.
#[derive(Default)]
pub struct UserDb {
    inner: Mutex<UserDbInner>,
}

impl UserDb {
    pub fn new() -> UserDb {
        UserDb::default()
    }

    pub fn add(&self, user: SharedUser) {
        let mut inner = self.inner.lock();
        if !inner.users.iter().any(|u| Arc::ptr_eq(u, &user)) {
            // new host masks can shadow cached lookups
            inner.host_cache.clear();
            inner.users.push(user);
        }
    }

    pub fn add_user(&self, user: User) -> SharedUser {
        let user = new_shared_user(user);
        self.add(user.clone());
        user
    }

    pub fn remove(&self, user: &SharedUser) -> bool {
        let mut inner = self.inner.lock();
        let len = inner.users.len();
        inner.users.retain(|u| !Arc::ptr_eq(u, user));
        inner.forget_user(user);
        len != inner.users.len()
    }

    pub fn remove_host(&self, user: &SharedUser, mask: &str) -> bool {
        let mut inner = self.inner.lock();
        let removed = user.write().remove_host(mask);
        if removed {
            inner.forget_user(user);
        }
        removed
    }

    /// Finds user whose host masks match given fullhost.
    pub fn find(&self, host: &str) -> Option<SharedUser> {
        let mut inner = self.inner.lock();
        if let Some(user) = inner.host_cache.get(host) {
            return Some(user.clone());
        }
        let found = inner.users.iter().find(|u| u.read().matches_host(host)).cloned();
        if let Some(ref user) = found {
            inner.host_cache.insert(host.to_string(), user.clone());
        }
        found
    }

    /// Finds user matching fullhost or adds user made by `make`.
    /// Lookup and insertion are done under one lock. Returns also true if user was created.
    pub fn find_or_insert_with<F>(&self, host: &str, make: F) -> (SharedUser, bool)
    where
        F: FnOnce() -> User,
    {
        let mut inner = self.inner.lock();
        if let Some(user) = inner.host_cache.get(host) {
            return (user.clone(), false);
        }
        let found = inner.users.iter().find(|u| u.read().matches_host(host)).cloned();
        let (user, created) = match found {
            Some(user) => (user, false),
            None => {
                let user = new_shared_user(make());
                inner.host_cache.clear();
                inner.users.push(user.clone());
                (user, true)
            }
        };
        inner.host_cache.insert(host.to_string(), user.clone());
        (user, created)
    }

    /// Finds user by its current nick in a server.
    pub fn find_by_nick(&self, server_key: &str, nick: &str) -> Option<SharedUser> {
        let key = (server_key.to_string(), nick.to_lowercase());
        let mut inner = self.inner.lock();
        if let Some(user) = inner.nick_cache.get(&key) {
            return Some(user.clone());
        }
        let found = inner
            .users
            .iter()
            .find(|u| {
                u.read()
                    .server(server_key)
                    .and_then(|s| s.nick())
                    .map_or(false, |n| n.eq_ignore_ascii_case(nick))
            })
            .cloned();
        if let Some(ref user) = found {
            inner.nick_cache.insert(key, user.clone());
        }
        found
    }

    pub fn is_cached(&self, host: &str) -> bool {
        self.inner.lock().host_cache.contains_key(host)
    }

    pub fn invalidate_cache(&self, host: &str) {
        self.inner.lock().host_cache.remove(host);
    }

    /// Invalidates nick cache entry or all entries of the server if nick is None.
    pub fn invalidate_nick_cache(&self, server_key: &str, nick: Option<&str>) {
        let mut inner = self.inner.lock();
        match nick {
            Some(nick) => {
                inner.nick_cache.remove(&(server_key.to_string(), nick.to_lowercase()));
            }
            None => inner.nick_cache.retain(|(s, _), _| s != server_key),
        }
    }

    pub fn flush_cache(&self) {
        let mut inner = self.inner.lock();
        inner.host_cache.clear();
        inner.nick_cache.clear();
    }

    /// Handles nick change of user known by old fullhost in server.
    /// Returns renamed user and its new fullhost.
    pub fn rename(&self, server_key: &str, old_fullhost: &str, new_nick: &str)
                -> Option<(SharedUser, String)> {
        let user = self.find(old_fullhost)?;
        let (old_nick, _, _) = split_fullhost(old_fullhost);
        let new_fullhost = format!("{}{}", new_nick, &old_fullhost[old_nick.len()..]);
        {
            let mut u = user.write();
            u.replace_exact_host(old_fullhost, &new_fullhost);
            if let Some(suser) = u.server_mut(server_key) {
                suser.set_fullhost(&new_fullhost);
            }
        }
        self.invalidate_cache(old_fullhost);
        self.invalidate_nick_cache(server_key, Some(old_nick));
        debug!("User {} renamed to {} in {}", old_fullhost, new_fullhost, server_key);
        Some((user, new_fullhost))
    }

    pub fn users(&self) -> Vec<SharedUser> {
        self.inner.lock().users.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().users.len()
    }

    /// Wipes transient state of all users in the server (after disconnection).
    pub fn wipe_server_state(&self, server_key: &str) {
        let mut inner = self.inner.lock();
        inner.users.iter().for_each(|u| {
            if let Some(s) = u.write().server_mut(server_key) {
                s.wipe_state();
            }
        });
        inner.nick_cache.retain(|(s, _), _| s != server_key);
    }

    /// Drops non-explicit users and wipes state of the remaining users.
    pub fn prepare_for_serialization(&self) {
        let mut inner = self.inner.lock();
        inner.users.retain(|u| u.read().explicit);
        inner.users.iter().for_each(|u| u.write().wipe_all_state());
        inner.host_cache.clear();
        inner.nick_cache.clear();
        info!("Prepared {} users for serialization", inner.users.len());
    }
}
