// registrar.rs - chat command registrar
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

use flagset::FlagSet;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::*;

use crate::access::{parse_flags, Access, Flag, MAX_POWER};
use crate::error::{BotError, Result};
use crate::proto_event::*;
use crate::utils::is_channel_name;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MsgKind {
    Privmsg,
    Notice,
    Both,
}

impl MsgKind {
    fn event(self) -> &'static str {
        match self {
            MsgKind::Privmsg => "privmsg",
            MsgKind::Notice => "notice",
            MsgKind::Both => "privmsg",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Visibility {
    // message sent to channel
    Public,
    Private,
    Both,
}

/// Matcher of command. Both kinds are anchored at start of text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Matcher {
    Literal(String),
    Pattern(String),
}

impl Matcher {
    pub fn literal(text: &str) -> Matcher {
        Matcher::Literal(text.to_string())
    }

    pub fn pattern(pattern: &str) -> Matcher {
        Matcher::Pattern(pattern.to_string())
    }

    fn compile(&self) -> Result<Regex> {
        let pattern = match self {
            Matcher::Literal(t) => regex::escape(t),
            Matcher::Pattern(p) => p.clone(),
        };
        Regex::new(&format!("^(?:{})", pattern))
            .map_err(|e| BotError::InvalidArgument(e.to_string()))
    }
}

/// Access required to call command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessRequirement {
    pub power: Option<i32>,
    pub any_of: Option<FlagSet<Flag>>,
    pub all_of: Option<FlagSet<Flag>>,
}

impl AccessRequirement {
    pub fn power(power: i32) -> AccessRequirement {
        AccessRequirement { power: Some(power), ..AccessRequirement::default() }
    }

    pub fn any_of(letters: &str) -> Result<AccessRequirement> {
        Ok(AccessRequirement { any_of: Some(parse_flags(letters)?),
                ..AccessRequirement::default() })
    }

    pub fn all_of(letters: &str) -> Result<AccessRequirement> {
        Ok(AccessRequirement { all_of: Some(parse_flags(letters)?),
                ..AccessRequirement::default() })
    }

    fn validate(&self) -> Result<()> {
        if self.power.is_none() && self.any_of.is_none() && self.all_of.is_none() {
            return Err(BotError::InvalidArgument("Empty access requirement".to_string()));
        }
        if let Some(power) = self.power {
            if !(0..=MAX_POWER).contains(&power) {
                return Err(BotError::InvalidArgument(format!(
                        "Required power {} must be in [0..100]", power)));
            }
        }
        Ok(())
    }

    pub fn check(&self, access: Option<Access>) -> bool {
        let access = match access {
            Some(a) => a,
            None => return false,
        };
        self.power.map_or(true, |p| i32::from(access.power()) >= p) &&
            self.any_of.map_or(true, |f| access.has_any(f)) &&
            self.all_of.map_or(true, |f| access.has(f))
    }
}

/// Token of registered command.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommandToken {
    pub kind: MsgKind,
    pub visibility: Visibility,
    id: u64,
}

struct Command {
    id: u64,
    matcher: Regex,
    callback: Callback,
    access: Option<AccessRequirement>,
}

#[derive(Default)]
struct RegistrarInner {
    commands: HashMap<(MsgKind, Visibility), Vec<Command>>,
    privmsg_token: Option<Token>,
    notice_token: Option<Token>,
}

/// Routes prefixed chat commands (received by PRIVMSG or NOTICE) to callbacks.
pub struct Registrar {
    proto: Arc<ProtoEvent>,
    prefix: String,
    inner: Mutex<RegistrarInner>,
    next_id: AtomicU64,
}

impl Registrar {
    pub fn new(proto: Arc<ProtoEvent>, prefix: &str) -> Arc<Registrar> {
        Arc::new(Registrar {
            proto,
            prefix: prefix.to_string(),
            inner: Mutex::new(RegistrarInner::default()),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn proto(&self) -> &Arc<ProtoEvent> {
        &self.proto
    }

    pub fn register(self: &Arc<Self>, kind: MsgKind, visibility: Visibility,
                callback: Callback, matcher: Matcher, access: Option<AccessRequirement>)
                -> Result<CommandToken> {
        if let Some(ref access) = access {
            access.validate()?;
        }
        let matcher = matcher.compile()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let need_privmsg = kind != MsgKind::Notice;
        let need_notice = kind != MsgKind::Privmsg;
        let mut inner = self.inner.lock();
        if need_privmsg && inner.privmsg_token.is_none() {
            inner.privmsg_token = self.subscribe(MsgKind::Privmsg);
        }
        if need_notice && inner.notice_token.is_none() {
            inner.notice_token = self.subscribe(MsgKind::Notice);
        }
        inner.commands.entry((kind, visibility)).or_default().push(Command {
            id,
            matcher,
            callback,
            access,
        });
        Ok(CommandToken { kind, visibility, id })
    }

    fn subscribe(self: &Arc<Self>, kind: MsgKind) -> Option<Token> {
        let registrar: Weak<Registrar> = Arc::downgrade(self);
        let token = self.proto.register(kind.event(), Arc::new(move |args: &Args| {
            if let Some(r) = registrar.upgrade() {
                r.dispatch(kind, args);
            }
        }));
        if token.is_none() {
            warn!("No event '{}' to route commands", kind.event());
        }
        token
    }

    pub fn unregister(&self, token: &CommandToken) -> bool {
        let mut inner = self.inner.lock();
        match inner.commands.get_mut(&(token.kind, token.visibility)) {
            Some(commands) => {
                let len = commands.len();
                commands.retain(|c| c.id != token.id);
                len != commands.len()
            }
            None => false,
        }
    }

    /// Removes all commands and unsubscribes from dispatcher.
    pub fn collapse(&self) {
        let mut inner = self.inner.lock();
        if let Some(token) = inner.privmsg_token.take() {
            self.proto.unregister(&token);
        }
        if let Some(token) = inner.notice_token.take() {
            self.proto.unregister(&token);
        }
        inner.commands.clear();
    }

    pub fn command_count(&self) -> usize {
        self.inner.lock().commands.values().map(|c| c.len()).sum()
    }

    fn dispatch(&self, kind: MsgKind, args: &Args) {
        let (target_name, msg_name) = self.proto.message_arg_names(kind.event());
        // decided by target name, it can be bound as plain text
        let public = args.strings(&target_name).first().map_or(false, |t| is_channel_name(t));
        let text = match args.text(&msg_name) {
            Some(t) => t,
            None => return,
        };
        let text = match text.strip_prefix(self.prefix.as_str()) {
            Some(t) => t,
            None if public => return,
            None => text,
        };
        if text.is_empty() {
            return;
        }
        let visibility = if public { Visibility::Public } else { Visibility::Private };

        // snapshot candidates in priority order
        let candidates = {
            let inner = self.inner.lock();
            [(kind, visibility), (kind, Visibility::Both),
                (MsgKind::Both, visibility), (MsgKind::Both, Visibility::Both)]
                .iter()
                .filter_map(|key| inner.commands.get(key))
                .flat_map(|commands| commands.iter())
                .map(|c| (c.matcher.clone(), c.callback.clone(), c.access.clone()))
                .collect::<Vec<_>>()
        };

        for (matcher, callback, access) in candidates {
            let m = match matcher.find(text) {
                Some(m) => m,
                None => continue,
            };
            if let Some(access) = access {
                if !access.check(args.sender_access()) {
                    debug!("Command '{}' denied for {:?}", text, args.origin);
                    continue;
                }
            }
            let rest = &text[m.end()..];
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            let mut cmd_args = args.clone();
            cmd_args.set(&msg_name, ArgValue::Text(rest.to_string()));
            callback(&cmd_args);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::grammar::{grammar_lines, DEFAULT_GRAMMAR};
    use crate::state::*;

    fn proto_event() -> Arc<ProtoEvent> {
        let proto = ProtoEvent::new("gamesurge", Arc::new(UserDb::new()),
                Arc::new(ChannelDb::new()));
        proto.load_grammar(grammar_lines(DEFAULT_GRAMMAR)).unwrap();
        Arc::new(proto)
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, Callback) {
        let out = Arc::new(Mutex::new(vec![]));
        let out2 = out.clone();
        (out, Arc::new(move |args: &Args| {
            out2.lock().push(args.text("msg").unwrap_or("").to_string())
        }))
    }

    #[test]
    fn test_registrar_private_command() {
        let proto = proto_event();
        let registrar = Registrar::new(proto.clone(), "!");
        let (calls, cb) = recorder();
        registrar.register(MsgKind::Privmsg, Visibility::Private, cb,
                Matcher::literal("hi"), None).unwrap();
        assert_eq!(1, proto.callback_count("privmsg"));
        assert_eq!(0, proto.callback_count("notice"));
        proto.parse(":fish!~fish@fish.com PRIVMSG Aaron :!hi there").unwrap();
        assert_eq!(vec!["there".to_string()], *calls.lock());
        // prefix is not required in private
        proto.parse(":fish!~fish@fish.com PRIVMSG Aaron :hi again").unwrap();
        assert_eq!(vec!["there".to_string(), "again".to_string()], *calls.lock());
        // channel target without prefix doesn't fire
        proto.parse(":fish!~fish@fish.com PRIVMSG #rust :hi there").unwrap();
        // public message doesn't fire private command
        proto.parse(":fish!~fish@fish.com PRIVMSG #rust :!hi there").unwrap();
        // notice doesn't fire privmsg command
        proto.parse(":fish!~fish@fish.com NOTICE Aaron :!hi there").unwrap();
        assert_eq!(2, calls.lock().len());
    }

    #[test]
    fn test_registrar_public_command() {
        let proto = proto_event();
        let registrar = Registrar::new(proto.clone(), "!");
        let (calls, cb) = recorder();
        registrar.register(MsgKind::Privmsg, Visibility::Public, cb,
                Matcher::literal("c++"), None).unwrap();
        proto.parse(":fish!~fish@fish.com PRIVMSG #rust :c++ is good").unwrap();
        proto.parse(":fish!~fish@fish.com PRIVMSG #rust :!cxx").unwrap();
        proto.parse(":fish!~fish@fish.com PRIVMSG #rust :!c++ is good").unwrap();
        proto.parse(":fish!~fish@fish.com PRIVMSG #rust :!c++").unwrap();
        // anchored at start
        proto.parse(":fish!~fish@fish.com PRIVMSG #rust :!say c++").unwrap();
        // only prefix
        proto.parse(":fish!~fish@fish.com PRIVMSG #rust :!").unwrap();
        assert_eq!(vec!["is good".to_string(), "".to_string()], *calls.lock());
    }

    #[test]
    fn test_registrar_public_by_target_name() {
        let proto = ProtoEvent::new("gamesurge", Arc::new(UserDb::new()),
                Arc::new(ChannelDb::new()));
        proto.define("PRIVMSG target :msg").unwrap();
        let proto = Arc::new(proto);
        let registrar = Registrar::new(proto.clone(), "!");
        let (private_calls, cb) = recorder();
        registrar.register(MsgKind::Privmsg, Visibility::Private, cb,
                Matcher::literal("hi"), None).unwrap();
        let (public_calls, cb) = recorder();
        registrar.register(MsgKind::Privmsg, Visibility::Public, cb,
                Matcher::literal("hi"), None).unwrap();
        proto.parse(":fish!~fish@fish.com PRIVMSG #rust :hi there").unwrap();
        assert!(private_calls.lock().is_empty());
        assert!(public_calls.lock().is_empty());
        proto.parse(":fish!~fish@fish.com PRIVMSG #rust :!hi there").unwrap();
        assert!(private_calls.lock().is_empty());
        assert_eq!(vec!["there".to_string()], *public_calls.lock());
        proto.parse(":fish!~fish@fish.com PRIVMSG Aaron :hi you").unwrap();
        assert_eq!(vec!["you".to_string()], *private_calls.lock());
    }

    #[test]
    fn test_registrar_pattern_and_buckets() {
        let proto = proto_event();
        let registrar = Registrar::new(proto.clone(), "!");
        let order = Arc::new(Mutex::new(vec![]));
        let entries = [
            (MsgKind::Both, Visibility::Both, "bb"),
            (MsgKind::Both, Visibility::Private, "bp"),
            (MsgKind::Privmsg, Visibility::Both, "pb"),
            (MsgKind::Privmsg, Visibility::Private, "pp"),
            (MsgKind::Privmsg, Visibility::Private, "pp2"),
            (MsgKind::Notice, Visibility::Private, "np"),
            (MsgKind::Privmsg, Visibility::Public, "pub"),
        ];
        for (kind, vis, name) in entries.iter() {
            let order = order.clone();
            let name = name.to_string();
            registrar.register(*kind, *vis, Arc::new(move |args: &Args| {
                order.lock().push(format!("{}:{}", name, args.text("msg").unwrap_or("")))
            }), Matcher::pattern("h[ae]llo"), None).unwrap();
        }
        proto.parse(":fish!~fish@fish.com PRIVMSG Aaron :!hallo world").unwrap();
        assert_eq!(vec!["pp:world", "pp2:world", "pb:world", "bp:world", "bb:world"],
                *order.lock());
        order.lock().clear();
        proto.parse(":fish!~fish@fish.com NOTICE Aaron :hello").unwrap();
        assert_eq!(vec!["np:", "bp:", "bb:"], *order.lock());
        order.lock().clear();
        proto.parse(":fish!~fish@fish.com PRIVMSG Aaron :!hullo").unwrap();
        assert!(order.lock().is_empty());
    }

    #[test]
    fn test_registrar_access_gating() {
        let proto = proto_event();
        let registrar = Registrar::new(proto.clone(), "!");
        let mut user = User::new_explicit();
        user.add_host(HostMask::exact("fish!~fish@fish.com"));
        user.global_access = Access::with_letters(5, "").unwrap();
        let user = proto.user_db().add_user(user);

        let (calls, cb) = recorder();
        registrar.register(MsgKind::Privmsg, Visibility::Private, cb.clone(),
                Matcher::literal("op"), Some(AccessRequirement::power(10))).unwrap();
        let line = ":fish!~fish@fish.com PRIVMSG Aaron :!op now";
        proto.parse(line).unwrap();
        assert!(calls.lock().is_empty());
        user.write().global_access.set_power(10).unwrap();
        proto.parse(line).unwrap();
        assert_eq!(1, calls.lock().len());

        let (calls, cb) = recorder();
        registrar.register(MsgKind::Privmsg, Visibility::Private, cb,
                Matcher::literal("kick"), Some(AccessRequirement {
                    power: Some(10), any_of: Some(parse_flags("ab").unwrap()), all_of: None
                })).unwrap();
        let line = ":fish!~fish@fish.com PRIVMSG Aaron :!kick shark";
        proto.parse(line).unwrap();
        assert!(calls.lock().is_empty());
        user.write().global_access.add(Flag::B);
        proto.parse(line).unwrap();
        assert_eq!(vec!["shark".to_string()], *calls.lock());

        let (calls, cb) = recorder();
        registrar.register(MsgKind::Privmsg, Visibility::Private, cb,
                Matcher::literal("ban"), Some(AccessRequirement::all_of("ab").unwrap()))
                .unwrap();
        let line = ":fish!~fish@fish.com PRIVMSG Aaron :!ban shark";
        proto.parse(line).unwrap();
        assert!(calls.lock().is_empty());
        user.write().global_access.add(Flag::A);
        proto.parse(line).unwrap();
        assert_eq!(1, calls.lock().len());
    }

    #[test]
    fn test_registrar_access_without_sender() {
        let req = AccessRequirement::power(0);
        assert!(!req.check(None));
        assert!(req.check(Some(Access::default())));
        assert!(AccessRequirement::any_of("a").unwrap()
                .check(Some(Access::with_letters(0, "ac").unwrap())));
        assert!(!AccessRequirement::all_of("ab").unwrap()
                .check(Some(Access::with_letters(0, "ac").unwrap())));
    }

    #[test]
    fn test_registrar_invalid_requirement() {
        let proto = proto_event();
        let registrar = Registrar::new(proto.clone(), "!");
        let (_, cb) = recorder();
        assert!(matches!(
            registrar.register(MsgKind::Privmsg, Visibility::Both, cb.clone(),
                Matcher::literal("x"), Some(AccessRequirement::default())),
            Err(BotError::InvalidArgument(_))
        ));
        assert!(matches!(
            registrar.register(MsgKind::Privmsg, Visibility::Both, cb.clone(),
                Matcher::literal("x"), Some(AccessRequirement::power(101))),
            Err(BotError::InvalidArgument(_))
        ));
        assert!(matches!(
            registrar.register(MsgKind::Privmsg, Visibility::Both, cb,
                Matcher::pattern("(x"), None),
            Err(BotError::InvalidArgument(_))
        ));
        assert!(AccessRequirement::any_of("y").is_err());
        assert_eq!(0, registrar.command_count());
        assert_eq!(0, proto.callback_count("privmsg"));
    }

    #[test]
    fn test_registrar_unregister_collapse() {
        let proto = proto_event();
        let registrar = Registrar::new(proto.clone(), "!");
        let (calls, cb) = recorder();
        let t1 = registrar.register(MsgKind::Both, Visibility::Both, cb.clone(),
                Matcher::literal("a"), None).unwrap();
        registrar.register(MsgKind::Both, Visibility::Both, cb.clone(),
                Matcher::literal("b"), None).unwrap();
        assert_eq!(1, proto.callback_count("privmsg"));
        assert_eq!(1, proto.callback_count("notice"));
        assert!(registrar.unregister(&t1));
        assert!(!registrar.unregister(&t1));
        proto.parse(":fish!~fish@fish.com PRIVMSG Aaron :!a x").unwrap();
        proto.parse(":fish!~fish@fish.com PRIVMSG Aaron :!b y").unwrap();
        assert_eq!(vec!["y".to_string()], *calls.lock());

        registrar.collapse();
        assert_eq!(0, proto.callback_count("privmsg"));
        assert_eq!(0, proto.callback_count("notice"));
        assert_eq!(0, registrar.command_count());
        proto.parse(":fish!~fish@fish.com PRIVMSG Aaron :!b y").unwrap();
        assert_eq!(1, calls.lock().len());

        registrar.register(MsgKind::Privmsg, Visibility::Both, cb,
                Matcher::literal("b"), None).unwrap();
        assert_eq!(1, proto.callback_count("privmsg"));
        proto.parse(":fish!~fish@fish.com PRIVMSG Aaron :!b z").unwrap();
        assert_eq!(2, calls.lock().len());
    }
}
