// builtin.rs - builtin bot commands
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

use std::sync::{Arc, Weak};
use tokio::sync::mpsc::UnboundedSender;
use tracing::*;

use crate::error::Result;
use crate::help::{find_topic, topic_names};
use crate::proto_event::*;
use crate::registrar::*;

// sends reply by NOTICE to sender of command
fn reply(proto: &ProtoEvent, sender: &UnboundedSender<String>, args: &Args, text: &str) {
    let nick = match args.sender_nick() {
        Some(nick) => nick,
        None => return,
    };
    let (target_name, msg_name) = proto.message_arg_names("notice");
    match proto.helper().format("notice",
            &[(target_name.as_str(), nick.into()), (msg_name.as_str(), text.into())]) {
        Ok(line) => {
            if sender.send(line).is_err() {
                warn!("Reply dropped: connection closed");
            }
        }
        Err(e) => error!("Can't format reply: {}", e),
    }
}

fn access_command(proto: &ProtoEvent, sender: &UnboundedSender<String>, args: &Args) {
    match args.sender_access() {
        Some(access) => reply(proto, sender, args, &access.to_string()),
        None => reply(proto, sender, args, "No access"),
    }
}

fn help_command(proto: &ProtoEvent, sender: &UnboundedSender<String>, args: &Args) {
    let (_, msg_name) = proto.message_arg_names("privmsg");
    let topic = args.text(&msg_name).unwrap_or("").trim();
    let topic = if topic.is_empty() { "main" } else { topic };
    match find_topic(topic) {
        Some(content) => {
            content.lines().for_each(|line| reply(proto, sender, args, line));
            if topic == "main" {
                reply(proto, sender, args, &format!("Topics: {}", topic_names().join(", ")));
            }
        }
        None => reply(proto, sender, args, &format!("No help for '{}'", topic)),
    }
}

type Handler = fn(&ProtoEvent, &UnboundedSender<String>, &Args);

/// Registers builtin commands (access, help) answered in private or in channel.
pub fn register_builtins(registrar: &Arc<Registrar>, sender: UnboundedSender<String>)
            -> Result<Vec<CommandToken>> {
    let commands: [(&str, Handler); 2] = [("access", access_command), ("help", help_command)];
    let mut tokens = vec![];
    for (name, handler) in commands.iter() {
        let proto: Weak<ProtoEvent> = Arc::downgrade(registrar.proto());
        let sender = sender.clone();
        let handler = *handler;
        tokens.push(registrar.register(MsgKind::Privmsg, Visibility::Both,
            Arc::new(move |args: &Args| {
                if let Some(proto) = proto.upgrade() {
                    handler(&proto, &sender, args);
                }
            }), Matcher::pattern(&format!("{}\\b", regex::escape(name))), None)?);
    }
    Ok(tokens)
}
