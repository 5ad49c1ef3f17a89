// core_events.rs - core event handlers of bot
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
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::UnboundedSender;
use tracing::*;

use crate::error::Result;
use crate::grammar::FormatValue;
use crate::proto_event::*;
use crate::state::*;

/// Bot's own identity in a server.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BotState {
    nick: Option<String>,
    user: Option<String>,
    host: Option<String>,
    fullhost: Option<String>,
}

impl BotState {
    pub fn set_fullhost(&mut self, fullhost: &str) {
        let (nick, user, host) = split_fullhost(fullhost);
        self.nick = Some(nick.to_string());
        self.user = user.map(|u| u.to_string());
        self.host = host.map(|h| h.to_string());
        self.fullhost = Some(fullhost.to_string());
    }

    pub fn set_nick(&mut self, nick: &str) {
        self.fullhost = self.fullhost.as_ref().map(|fh| {
            let (old_nick, _, _) = split_fullhost(fh);
            format!("{}{}", nick, &fh[old_nick.len()..])
        });
        self.nick = Some(nick.to_string());
    }

    pub fn is_me(&self, nick: &str) -> bool {
        self.nick.as_ref().map_or(false, |n| n.eq_ignore_ascii_case(nick))
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
    pub fn fullhost(&self) -> Option<&str> {
        self.fullhost.as_deref()
    }
}

/// Settings used to register bot in server.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BotIdentity {
    pub nick: String,
    pub altnick: String,
    pub username: String,
    pub realname: String,
    pub password: Option<String>,
    // channels joined after registration
    pub channels: Vec<String>,
}

/// Handlers of events required to keep bot alive and its state current.
pub struct CoreEvents {
    proto: Arc<ProtoEvent>,
    sender: UnboundedSender<String>,
    identity: BotIdentity,
    state: Mutex<BotState>,
    pings: AtomicUsize,
    tokens: Mutex<Vec<Token>>,
}

type Handler = fn(&CoreEvents, &Args);

impl CoreEvents {
    pub fn new(proto: Arc<ProtoEvent>, sender: UnboundedSender<String>,
                identity: BotIdentity) -> Arc<CoreEvents> {
        let core = Arc::new(CoreEvents {
            proto,
            sender,
            identity,
            state: Mutex::new(BotState::default()),
            pings: AtomicUsize::new(0),
            tokens: Mutex::new(vec![]),
        });
        let handlers: [(&str, Handler); 10] = [
            ("connect", CoreEvents::connect),
            ("disconnect", CoreEvents::disconnect),
            ("ping", CoreEvents::ping),
            ("001", CoreEvents::welcome),
            ("433", CoreEvents::nick_in_use),
            ("nick", CoreEvents::nick),
            ("join", CoreEvents::join),
            ("part", CoreEvents::part),
            ("kick", CoreEvents::kick),
            ("quit", CoreEvents::quit),
        ];
        let tokens = handlers
            .iter()
            .filter_map(|(event, handler)| {
                let weak: Weak<CoreEvents> = Arc::downgrade(&core);
                let handler = *handler;
                let token = core.proto.register(event, Arc::new(move |args: &Args| {
                    if let Some(core) = weak.upgrade() {
                        handler(&core, args);
                    }
                }));
                if token.is_none() {
                    warn!("No event '{}' for core handler", event);
                }
                token
            })
            .collect::<Vec<_>>();
        *core.tokens.lock() = tokens;
        core
    }

    /// Unregisters all core handlers.
    pub fn collapse(&self) {
        self.tokens.lock().drain(..).for_each(|t| {
            self.proto.unregister(&t);
        });
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> BotState {
        self.state.lock().clone()
    }

    fn send(&self, line: Result<String>) {
        match line {
            Ok(line) => {
                if self.sender.send(line).is_err() {
                    warn!("Connection to {} is closed, message dropped", self.proto.server_key());
                }
            }
            Err(e) => error!("Can't format message: {}", e),
        }
    }

    fn format(&self, event: &str, args: &[(&str, FormatValue)]) -> Result<String> {
        self.proto.helper().format(event, args)
    }

    fn connect(&self, _: &Args) {
        if let Some(ref password) = self.identity.password {
            self.send(self.format("pass", &[("password", password.into())]));
        }
        *self.state.lock() = BotState::default();
        self.send_nick(&self.identity.nick);
        self.send(self.format("user", &[("username", (&self.identity.username).into()),
                ("mode", "0".into()), ("unused", "*".into()),
                ("realname", (&self.identity.realname).into())]));
    }

    fn send_nick(&self, nick: &str) {
        self.state.lock().nick = Some(nick.to_string());
        self.send(self.format("nick", &[("nick", nick.into())]));
    }

    fn disconnect(&self, _: &Args) {
        *self.state.lock() = BotState::default();
    }

    fn ping(&self, args: &Args) {
        let id = args.text("id").unwrap_or("");
        self.send(self.format("pong", &[("id", id.into())]));
        self.pings.fetch_add(1, Ordering::SeqCst);
    }

    fn welcome(&self, args: &Args) {
        if let Some(nick) = args.text("nick") {
            self.state.lock().set_nick(nick);
            info!("Registered in {} as {}", self.proto.server_key(), nick);
        }
        if !self.identity.channels.is_empty() {
            self.send(self.format("join",
                    &[("channels", self.identity.channels.clone().into())]));
        }
    }

    fn nick_in_use(&self, args: &Args) {
        let nick = args.text("nick").unwrap_or(&self.identity.nick);
        let new_nick = if nick.eq_ignore_ascii_case(&self.identity.nick) &&
                !self.identity.altnick.is_empty() {
            self.identity.altnick.clone()
        } else {
            format!("{}_", nick)
        };
        warn!("Nick {} is in use, trying {}", nick, new_nick);
        self.send_nick(&new_nick);
    }

    fn nick(&self, args: &Args) {
        let (origin, new_nick) = match (args.origin.as_ref(), args.text("nick")) {
            (Some(o), Some(n)) => (o, n.strip_prefix(':').unwrap_or(n)),
            _ => return,
        };
        let server_key = self.proto.server_key();
        let (old_nick, _, _) = split_fullhost(origin);
        {
            let mut state = self.state.lock();
            if state.is_me(old_nick) {
                state.set_nick(new_nick);
                info!("Bot nick changed to {} in {}", new_nick, server_key);
            }
        }
        if let Some((_, fullhost)) = self.proto.user_db().rename(server_key, origin, new_nick) {
            self.proto.channel_db().rename_member(server_key, origin, old_nick,
                    &fullhost, new_nick);
        }
    }

    fn join(&self, args: &Args) {
        let (user, origin) = match (args.from.as_ref(), args.origin.as_ref()) {
            (Some(u), Some(o)) => (u, o),
            _ => return,
        };
        let server_key = self.proto.server_key();
        let (nick, _, _) = split_fullhost(origin);
        {
            let mut state = self.state.lock();
            if state.is_me(nick) {
                state.set_fullhost(origin);
            }
        }
        for channel in args.channels("channels") {
            let name = channel.read().name().to_string();
            if let Some(suser) = user.write().server_mut(server_key) {
                suser.join(&name);
            }
            channel.write().add_user(origin, nick, user.clone());
            debug!("{} joined {} in {}", nick, name, server_key);
        }
    }

    fn part(&self, args: &Args) {
        let (user, origin) = match (args.from.as_ref(), args.origin.as_ref()) {
            (Some(u), Some(o)) => (u, o),
            _ => return,
        };
        let (nick, _, _) = split_fullhost(origin);
        for channel in args.channels("channels") {
            self.leave(user, origin, nick, &channel);
        }
    }

    fn kick(&self, args: &Args) {
        let channel = match args.channel("channel") {
            Some(c) => c,
            None => return,
        };
        let server_key = self.proto.server_key();
        for nick in args.strings("nicks") {
            let user = channel.read().find(&nick)
                .or_else(|| self.proto.user_db().find_by_nick(server_key, &nick));
            if let Some(user) = user {
                let fullhost = user.read().server(server_key)
                    .and_then(|s| s.fullhost()).map(|f| f.to_string());
                if let Some(fullhost) = fullhost {
                    self.leave(&user, &fullhost, &nick, &channel);
                }
            }
        }
    }

    fn leave(&self, user: &SharedUser, fullhost: &str, nick: &str, channel: &SharedChannel) {
        let name = channel.read().name().to_string();
        if let Some(suser) = user.write().server_mut(self.proto.server_key()) {
            suser.part(&name);
        }
        channel.write().remove_user(fullhost, nick);
    }

    fn quit(&self, args: &Args) {
        let (user, origin) = match (args.from.as_ref(), args.origin.as_ref()) {
            (Some(u), Some(o)) => (u, o),
            _ => return,
        };
        let server_key = self.proto.server_key();
        let (nick, _, _) = split_fullhost(origin);
        let keep = {
            let mut u = user.write();
            if let Some(suser) = u.server_mut(server_key) {
                suser.wipe_state();
            }
            u.explicit || u.online_anywhere()
        };
        self.proto.channel_db().remove_member(server_key, origin, nick);
        self.proto.user_db().invalidate_nick_cache(server_key, Some(nick));
        if !keep {
            self.proto.user_db().remove(user);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::grammar::{grammar_lines, DEFAULT_GRAMMAR};
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn core_events(identity: BotIdentity)
                -> (Arc<ProtoEvent>, Arc<CoreEvents>, UnboundedReceiver<String>) {
        let proto = ProtoEvent::new("gamesurge", Arc::new(UserDb::new()),
                Arc::new(ChannelDb::new()));
        proto.load_grammar(grammar_lines(DEFAULT_GRAMMAR)).unwrap();
        let proto = Arc::new(proto);
        let (sender, receiver) = unbounded_channel();
        let core = CoreEvents::new(proto.clone(), sender, identity);
        (proto, core, receiver)
    }

    fn identity() -> BotIdentity {
        BotIdentity {
            nick: "Aaron".to_string(),
            altnick: "Aaron2".to_string(),
            username: "aaron".to_string(),
            realname: "Aaron Bot".to_string(),
            password: None,
            channels: vec!["#rust".to_string(), "#c++".to_string()],
        }
    }

    fn received(receiver: &mut UnboundedReceiver<String>) -> Vec<String> {
        let mut out = vec![];
        while let Ok(line) = receiver.try_recv() {
            out.push(line);
        }
        out
    }

    #[test]
    fn test_bot_state() {
        let mut state = BotState::default();
        assert!(!state.is_me("Aaron"));
        state.set_fullhost("Aaron!~aaron@bitforge.ca");
        assert_eq!(Some("Aaron"), state.nick());
        assert_eq!(Some("~aaron"), state.user());
        assert_eq!(Some("bitforge.ca"), state.host());
        assert!(state.is_me("aaron"));
        state.set_nick("Bob");
        assert_eq!(Some("Bob!~aaron@bitforge.ca"), state.fullhost());
        assert_eq!(Some("Bob"), state.nick());
    }

    #[test]
    fn test_core_events_connect() {
        let mut ident = identity();
        ident.password = Some("secret".to_string());
        let (proto, _core, mut receiver) = core_events(ident);
        proto.fire("connect", &Args::new());
        assert_eq!(vec!["PASS secret", "NICK Aaron", "USER aaron 0 * :Aaron Bot"],
                received(&mut receiver));
    }

    #[test]
    fn test_core_events_ping() {
        let (proto, core, mut receiver) = core_events(identity());
        proto.parse("PING :irc.gamesurge.net").unwrap();
        proto.parse("PING :12345").unwrap();
        assert_eq!(vec!["PONG :irc.gamesurge.net", "PONG :12345"], received(&mut receiver));
        assert_eq!(2, core.pings());
    }

    #[test]
    fn test_core_events_welcome_and_nick_in_use() {
        let (proto, core, mut receiver) = core_events(identity());
        proto.fire("connect", &Args::new());
        received(&mut receiver);
        proto.parse(":irc.gamesurge.net 433 * Aaron :Nickname is already in use").unwrap();
        assert_eq!(vec!["NICK Aaron2"], received(&mut receiver));
        proto.parse(":irc.gamesurge.net 433 * Aaron2 :Nickname is already in use").unwrap();
        assert_eq!(vec!["NICK Aaron2_"], received(&mut receiver));
        proto.parse(":irc.gamesurge.net 001 Aaron2_ :Welcome to GameSurge").unwrap();
        assert_eq!(vec!["JOIN #rust,#c++"], received(&mut receiver));
        assert_eq!(Some("Aaron2_"), core.state().nick());
    }

    #[test]
    fn test_core_events_join_part() {
        let (proto, core, _receiver) = core_events(identity());
        proto.parse(":irc.gamesurge.net 001 Aaron :Welcome").unwrap();
        proto.parse(":Aaron!~aaron@bitforge.ca JOIN #rust").unwrap();
        assert_eq!(Some("Aaron!~aaron@bitforge.ca"), core.state().fullhost());
        proto.parse(":fish!~fish@fish.com JOIN :#rust,#c++").unwrap();
        let user = proto.user_db().find("fish!~fish@fish.com").unwrap();
        {
            let u = user.read();
            let suser = u.server("gamesurge").unwrap();
            assert_eq!(&["#rust".to_string(), "#c++".to_string()], suser.channels());
            assert!(suser.channel("#rust").unwrap().online());
        }
        let rust = proto.channel_db().find("gamesurge", "#rust").unwrap();
        assert_eq!(2, rust.read().user_count());
        assert!(Arc::ptr_eq(&user, &rust.read().find("fish").unwrap()));

        proto.parse(":fish!~fish@fish.com PART #rust :bye").unwrap();
        assert_eq!(1, rust.read().user_count());
        assert!(rust.read().find("fish").is_none());
        let u = user.read();
        assert_eq!(&["#c++".to_string()], u.server("gamesurge").unwrap().channels());
    }

    #[test]
    fn test_core_events_kick() {
        let (proto, _core, _receiver) = core_events(identity());
        proto.parse(":fish!~fish@fish.com JOIN #rust").unwrap();
        proto.parse(":op!~op@op.org KICK #rust fish :bye").unwrap();
        let rust = proto.channel_db().find("gamesurge", "#rust").unwrap();
        assert_eq!(0, rust.read().user_count());
        let user = proto.user_db().find("fish!~fish@fish.com").unwrap();
        assert!(!user.read().server("gamesurge").unwrap().is_joined("#rust"));
    }

    #[test]
    fn test_core_events_nick_change() {
        let (proto, core, _receiver) = core_events(identity());
        proto.parse(":irc.gamesurge.net 001 Aaron :Welcome").unwrap();
        proto.parse(":Aaron!~aaron@bitforge.ca JOIN #rust").unwrap();
        proto.parse(":fish!~fish@fish.com JOIN #rust").unwrap();
        proto.parse(":fish!~fish@fish.com NICK shark").unwrap();
        let rust = proto.channel_db().find("gamesurge", "#rust").unwrap();
        assert!(rust.read().find("fish").is_none());
        assert!(rust.read().find("shark!~fish@fish.com").is_some());
        let user = proto.user_db().find("shark!~fish@fish.com").unwrap();
        assert_eq!(Some("shark"), user.read().server("gamesurge").unwrap().nick());
        assert!(proto.user_db().find("fish!~fish@fish.com").is_none());

        proto.parse(":Aaron!~aaron@bitforge.ca NICK :Bob").unwrap();
        assert_eq!(Some("Bob!~aaron@bitforge.ca"), core.state().fullhost());
    }

    #[test]
    fn test_core_events_quit() {
        let (proto, _core, _receiver) = core_events(identity());
        proto.parse(":fish!~fish@fish.com JOIN #rust").unwrap();
        let mut explicit = User::new_explicit();
        explicit.add_host(HostMask::exact("Aaron!~aaron@bitforge.ca"));
        let explicit = proto.user_db().add_user(explicit);
        proto.parse(":Aaron!~aaron@bitforge.ca JOIN #rust").unwrap();
        assert_eq!(2, proto.user_db().len());
        proto.parse(":fish!~fish@fish.com QUIT :Leaving").unwrap();
        proto.parse(":Aaron!~aaron@bitforge.ca QUIT").unwrap();
        let rust = proto.channel_db().find("gamesurge", "#rust").unwrap();
        assert_eq!(0, rust.read().user_count());
        assert_eq!(1, proto.user_db().len());
        assert!(!explicit.read().server("gamesurge").unwrap().online());
    }

    #[test]
    fn test_core_events_collapse() {
        let (proto, core, mut receiver) = core_events(identity());
        core.collapse();
        proto.parse("PING :x").unwrap();
        assert!(received(&mut receiver).is_empty());
        assert_eq!(0, proto.callback_count("ping"));
    }
}
