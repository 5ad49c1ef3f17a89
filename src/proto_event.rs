// proto_event.rs - protocol event dispatcher
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
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::*;

use crate::access::Access;
use crate::error::{BotError, Result};
use crate::grammar::*;
use crate::state::*;
use crate::utils::is_channel_name;

/// Events that are not defined by protocol description.
pub const PSEUDO_EVENTS: [&str; 3] = ["raw", "connect", "disconnect"];

/// Value of argument of protocol message.
#[derive(Clone, Debug)]
pub enum ArgValue {
    // missing optional argument
    Nil,
    Text(String),
    List(Vec<String>),
    Channel(SharedChannel),
    ChannelList(Vec<SharedChannel>),
}

/// Arguments passed to event callbacks.
#[derive(Clone, Debug, Default)]
pub struct Args {
    pub from: Option<SharedUser>,
    pub origin: Option<String>,
    pub scope: Scope,
    pub values: HashMap<String, ArgValue>,
}

impl Args {
    pub fn new() -> Args {
        Args::default()
    }

    pub fn with(mut self, name: &str, value: ArgValue) -> Args {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: ArgValue) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    pub fn is_nil(&self, name: &str) -> bool {
        matches!(self.values.get(name), None | Some(ArgValue::Nil))
    }

    /// Returns argument if it is text (single token or rest of message).
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ArgValue::Text(t)) => Some(t),
            _ => None,
        }
    }

    /// Returns argument as list of strings. Channels are given by names.
    pub fn strings(&self, name: &str) -> Vec<String> {
        match self.values.get(name) {
            Some(ArgValue::Text(t)) => vec![t.clone()],
            Some(ArgValue::List(l)) => l.clone(),
            Some(ArgValue::Channel(c)) => vec![c.read().name().to_string()],
            Some(ArgValue::ChannelList(cl)) => {
                cl.iter().map(|c| c.read().name().to_string()).collect()
            }
            Some(ArgValue::Nil) | None => vec![],
        }
    }

    pub fn channel(&self, name: &str) -> Option<SharedChannel> {
        match self.values.get(name) {
            Some(ArgValue::Channel(c)) => Some(c.clone()),
            _ => None,
        }
    }

    pub fn channels(&self, name: &str) -> Vec<SharedChannel> {
        match self.values.get(name) {
            Some(ArgValue::Channel(c)) => vec![c.clone()],
            Some(ArgValue::ChannelList(cl)) => cl.clone(),
            _ => vec![],
        }
    }

    /// Access of sender in scope of message.
    pub fn sender_access(&self) -> Option<Access> {
        self.from.as_ref().and_then(|u| u.read().access(&self.scope).ok())
    }

    pub fn sender_nick(&self) -> Option<String> {
        let server_key = self.scope.server.as_ref()?;
        let user = self.from.as_ref()?.read();
        user.server(server_key).and_then(|s| s.nick()).map(|n| n.to_string())
    }
}

pub type Callback = Arc<dyn Fn(&Args) + Send + Sync>;

/// Token returned by register. It is used to unregister callback.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Token {
    pub event: String,
    id: u64,
}

struct EventEntry {
    // None for pseudo events
    rules: Option<Vec<Rule>>,
    callbacks: Vec<(u64, Callback)>,
}

impl EventEntry {
    fn pseudo() -> EventEntry {
        EventEntry { rules: None, callbacks: vec![] }
    }
}

/// Protocol event dispatcher for one connection.
pub struct ProtoEvent {
    server_key: String,
    user_db: Arc<UserDb>,
    channel_db: Arc<ChannelDb>,
    events: RwLock<HashMap<String, EventEntry>>,
    helper: Helper,
    next_token: AtomicU64,
}

impl ProtoEvent {
    pub fn new(server_key: &str, user_db: Arc<UserDb>, channel_db: Arc<ChannelDb>)
                -> ProtoEvent {
        let events = PSEUDO_EVENTS
            .iter()
            .map(|e| (e.to_string(), EventEntry::pseudo()))
            .collect::<HashMap<_, _>>();
        ProtoEvent {
            server_key: server_key.to_string(),
            user_db,
            channel_db,
            events: RwLock::new(events),
            helper: Helper::new(),
            next_token: AtomicU64::new(1),
        }
    }

    pub fn server_key(&self) -> &str {
        &self.server_key
    }

    pub fn helper(&self) -> &Helper {
        &self.helper
    }

    pub fn user_db(&self) -> &Arc<UserDb> {
        &self.user_db
    }

    pub fn channel_db(&self) -> &Arc<ChannelDb> {
        &self.channel_db
    }

    /// Defines event from protocol description line. Callbacks of already
    /// defined event are kept.
    pub fn define(&self, line: &str) -> Result<String> {
        let event = compile_line(line)?;
        self.helper.insert(&event.key, build_formatter(&event));
        let mut events = self.events.write();
        let entry = events.entry(event.key.clone()).or_insert_with(EventEntry::pseudo);
        entry.rules = Some(event.rules);
        Ok(event.key)
    }

    /// Defines events from lines. Empty lines and comments are skipped.
    pub fn load_grammar<'a, I>(&self, lines: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut count = 0;
        for line in lines {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with(';') {
                continue;
            }
            self.define(trimmed)?;
            count += 1;
        }
        info!("Loaded {} protocol events for {}", count, self.server_key);
        Ok(count)
    }

    /// Removes event with its callbacks and formatter. Pseudo events can't be removed.
    pub fn retract(&self, event: &str) -> bool {
        let key = event_key(event);
        if PSEUDO_EVENTS.contains(&key.as_str()) {
            return false;
        }
        self.helper.remove(&key);
        self.events.write().remove(&key).is_some()
    }

    /// Registers callback. Returns None if event is not defined.
    pub fn register(&self, event: &str, callback: Callback) -> Option<Token> {
        let key = event_key(event);
        let mut events = self.events.write();
        let entry = events.get_mut(&key)?;
        let id = self.next_token.fetch_add(1, Ordering::SeqCst);
        entry.callbacks.push((id, callback));
        Some(Token { event: key, id })
    }

    pub fn unregister(&self, token: &Token) -> bool {
        let mut events = self.events.write();
        match events.get_mut(&token.event) {
            Some(entry) => {
                let len = entry.callbacks.len();
                entry.callbacks.retain(|(id, _)| *id != token.id);
                len != entry.callbacks.len()
            }
            None => false,
        }
    }

    /// Removes all callbacks. If hard then also removes all non-pseudo
    /// events and their formatters.
    pub fn clear(&self, hard: bool) {
        let mut events = self.events.write();
        events.values_mut().for_each(|e| e.callbacks.clear());
        if hard {
            events.retain(|k, _| PSEUDO_EVENTS.contains(&k.as_str()));
            self.helper.clear();
        }
    }

    pub fn has_event(&self, event: &str) -> bool {
        self.events.read().contains_key(&event_key(event))
    }

    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }

    pub fn callback_count(&self, event: &str) -> usize {
        self.events.read().get(&event_key(event)).map_or(0, |e| e.callbacks.len())
    }

    /// Names of first two arguments of message event (privmsg or notice).
    pub fn message_arg_names(&self, event: &str) -> (String, String) {
        let events = self.events.read();
        let names = events
            .get(&event_key(event))
            .and_then(|e| e.rules.as_ref())
            .map(|rules| rules.iter().filter_map(|r| r.name()).take(2)
                    .map(|n| n.to_string()).collect::<Vec<_>>())
            .unwrap_or_default();
        match names.as_slice() {
            [target, msg] => (target.clone(), msg.clone()),
            _ => ("target".to_string(), "msg".to_string()),
        }
    }

    fn snapshot(&self, key: &str) -> Option<(Option<Vec<Rule>>, Vec<Callback>)> {
        let events = self.events.read();
        let entry = events.get(key)?;
        if entry.callbacks.is_empty() {
            return None;
        }
        Some((
            entry.rules.clone(),
            entry.callbacks.iter().map(|(_, cb)| cb.clone()).collect(),
        ))
    }

    /// Calls callbacks of event with given arguments.
    pub fn fire(&self, event: &str, args: &Args) {
        if let Some((_, callbacks)) = self.snapshot(&event_key(event)) {
            callbacks.iter().for_each(|cb| cb(args));
        }
    }

    /// Parses message from server and dispatches it to callbacks.
    pub fn parse(&self, line: &str) -> Result<()> {
        let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
        let parts = line.split_whitespace().collect::<Vec<_>>();
        if parts.is_empty() {
            return Ok(());
        }
        let (origin, offset) = match parts[0].strip_prefix(':') {
            Some(origin) => (Some(origin), 1),
            None => (None, 0),
        };

        let mut result = Ok(());
        if let Some(command) = parts.get(offset) {
            if let Some((rules, callbacks)) = self.snapshot(&event_key(command)) {
                let rules = rules.unwrap_or_default();
                result = self.build_args(origin, &rules, &parts[offset + 1..], line)
                    .map(|args| callbacks.iter().for_each(|cb| cb(&args)));
            }
        }

        if let Some((_, callbacks)) = self.snapshot("raw") {
            let mut args = Args::new();
            let raw = match origin {
                Some(origin) => {
                    args.origin = Some(origin.to_string());
                    line.trim_start().splitn(2, ' ').nth(1).unwrap_or("").trim_start()
                }
                None => line,
            };
            args.set("raw", ArgValue::Text(raw.to_string()));
            callbacks.iter().for_each(|cb| cb(&args));
        }
        result
    }

    fn build_args(&self, origin: Option<&str>, rules: &[Rule], tokens: &[&str], line: &str)
                -> Result<Args> {
        let mut args = Args::new();
        if let Some(origin) = origin {
            args.from = Some(self.resolve_origin(origin));
            args.origin = Some(origin.to_string());
            args.scope = Scope::server(&self.server_key);
        }
        self.pull_args(rules, tokens, 0, &mut args, line)?;
        Ok(args)
    }

    // find or create user of origin and refresh its state in this server
    fn resolve_origin(&self, origin: &str) -> SharedUser {
        let (user, created) = self.user_db.find_or_insert_with(origin, || {
            let mut user = User::new();
            user.add_host(HostMask::exact(origin));
            user.add_server(&self.server_key, Access::default()).set_fullhost(origin);
            user
        });
        if created {
            debug!("New user {} in {}", origin, self.server_key);
            return user;
        }
        let stale = {
            let mut u = user.write();
            match u.server_mut(&self.server_key) {
                Some(s) if s.online() && s.fullhost() == Some(origin) => None,
                Some(s) => {
                    let old_nick = s.nick().map(|n| n.to_string());
                    s.set_fullhost(origin);
                    Some(old_nick)
                }
                None => {
                    u.add_server(&self.server_key, Access::default()).set_fullhost(origin);
                    Some(None)
                }
            }
        };
        if let Some(old_nick) = stale {
            if let Some(old_nick) = old_nick {
                self.user_db.invalidate_nick_cache(&self.server_key, Some(&old_nick));
            }
            let (nick, _, _) = split_fullhost(origin);
            self.user_db.invalidate_nick_cache(&self.server_key, Some(nick));
        }
        user
    }

    // bind channel to scope if sender is in this channel
    fn set_channel_scope(&self, args: &mut Args, channel: &str) {
        let in_channel = args.from.as_ref().map_or(false, |u| {
            u.read().server(&self.server_key).map_or(false, |s| {
                s.is_joined(channel) && s.channel(channel).is_some()
            })
        });
        if in_channel {
            args.scope = Scope::channel(&self.server_key, channel);
        }
    }

    // returns offset after pulled arguments or None if rest of message was pulled
    fn pull_args(&self, rules: &[Rule], tokens: &[&str], mut offset: usize,
                args: &mut Args, line: &str) -> Result<Option<usize>> {
        let next_token = |offset: usize| {
            tokens.get(offset).copied().ok_or_else(|| BotError::Parse(line.to_string()))
        };
        for rule in rules {
            match rule {
                Rule::Optional(nested) => {
                    if offset >= tokens.len() {
                        let mut names = vec![];
                        rule.collect_names(&mut names);
                        names.iter().for_each(|n| args.set(n, ArgValue::Nil));
                        continue;
                    }
                    match self.pull_args(nested, tokens, offset, args, line)? {
                        Some(new_offset) => offset = new_offset,
                        None => return Ok(None),
                    }
                    continue;
                }
                Rule::Single(name) => {
                    args.set(name, ArgValue::Text(next_token(offset)?.to_string()));
                }
                Rule::List(name) => {
                    let list = next_token(offset)?.split(',').filter(|x| !x.is_empty())
                        .map(|x| x.to_string()).collect();
                    args.set(name, ArgValue::List(list));
                }
                Rule::Channel(name) => {
                    let token = next_token(offset)?;
                    let chname = token.strip_prefix(':').unwrap_or(token);
                    if is_channel_name(chname) {
                        let channel = self.channel_db.find_or_create(&self.server_key, chname);
                        self.set_channel_scope(args, chname);
                        args.set(name, ArgValue::Channel(channel));
                    } else {
                        args.set(name, ArgValue::Text(chname.to_string()));
                    }
                }
                Rule::ChannelList(name) => {
                    let token = next_token(offset)?;
                    let channels = token.strip_prefix(':').unwrap_or(token)
                        .split(',')
                        .filter(|x| !x.is_empty())
                        .map(|c| self.channel_db.find_or_create(&self.server_key, c))
                        .collect();
                    args.set(name, ArgValue::ChannelList(channels));
                }
                Rule::Remaining(name) => {
                    let first = next_token(offset)?;
                    let mut text = first.strip_prefix(':').unwrap_or(first).to_string();
                    tokens[offset + 1..].iter().for_each(|t| {
                        text.push(' ');
                        text += t;
                    });
                    args.set(name, ArgValue::Text(text));
                    return Ok(None);
                }
            }
            offset += 1;
        }
        Ok(Some(offset))
    }
}
