// config.rs - configuration
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

use std::collections::HashSet;
use std::error::Error;
use std::fs::File;
use std::io::Read;
use serde_derive::{Serialize, Deserialize};
use tracing::*;
use validator::Validate;

use crate::access::Access;
use crate::bot::BotSettings;
use crate::core_events::BotIdentity;
use crate::error::{BotError, Result};
use crate::state::*;
use crate::utils::*;

#[derive(clap::Parser, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    #[clap(short, long, help="Configuration file path")]
    config: Option<String>,
    #[clap(short, long, help="Bot nickname")]
    nick: Option<String>,
    #[clap(short, long, help="Command prefix")]
    prefix: Option<String>,
    #[clap(short, long, help="Protocol description file path")]
    grammar: Option<String>,
}

fn default_command_prefix() -> String {
    "!".to_string()
}

fn default_port() -> u16 {
    6667
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub key: String,
    #[validate(length(min = 1))]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub password: Option<String>,
    #[validate(custom = "validate_channels")]
    pub channels: Option<Vec<String>>,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Validate)]
pub struct ChannelAccessConfig {
    #[validate(custom = "validate_channel")]
    pub name: String,
    #[serde(default)]
    #[validate(range(min = 0, max = 100))]
    pub power: i32,
    #[serde(default)]
    #[validate(custom = "validate_flags")]
    pub flags: String,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Validate)]
pub struct ServerAccessConfig {
    pub key: String,
    #[serde(default)]
    #[validate(range(min = 0, max = 100))]
    pub power: i32,
    #[serde(default)]
    #[validate(custom = "validate_flags")]
    pub flags: String,
    #[validate]
    pub channels: Option<Vec<ChannelAccessConfig>>,
}

/// Explicit (persistent) identity.
#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Validate)]
pub struct UserConfig {
    // exact host masks
    pub hosts: Option<Vec<String>>,
    // regular expressions matched against fullhost
    pub patterns: Option<Vec<String>>,
    #[serde(default)]
    #[validate(range(min = 0, max = 100))]
    pub power: i32,
    #[serde(default)]
    #[validate(custom = "validate_flags")]
    pub flags: String,
    #[validate]
    pub servers: Option<Vec<ServerAccessConfig>>,
}

/// Main configuration structure.
#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Validate)]
pub struct MainConfig {
    #[validate(custom = "validate_nickname")]
    pub nick: String,
    #[validate(custom = "validate_nickname")]
    pub altnick: Option<String>,
    #[validate(length(min = 1))]
    pub username: String,
    pub realname: String,
    #[serde(default = "default_command_prefix")]
    #[validate(length(min = 1))]
    pub command_prefix: String,
    pub grammar: Option<String>,
    #[validate]
    pub servers: Vec<ServerConfig>,
    #[validate]
    pub users: Option<Vec<UserConfig>>,
}

impl MainConfig {
    pub fn new(cli: Cli) -> std::result::Result<MainConfig, Box<dyn Error>> {
        let config_path = cli.config.as_deref().unwrap_or("simple-irc-bot.toml");
        let mut config_file = File::open(config_path)?;
        let mut config_str = String::new();
        config_file.read_to_string(&mut config_str)?;
        // modify configuration by CLI options
        let mut config: MainConfig = toml::from_str(&config_str)?;
        if let Some(nick) = cli.nick {
            config.nick = nick;
        }
        if let Some(prefix) = cli.prefix {
            config.command_prefix = prefix;
        }
        if let Some(grammar) = cli.grammar {
            config.grammar = Some(grammar);
        }
        config.validate()?;
        config.check_servers()?;
        Ok(config)
    }

    fn check_servers(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(BotError::Config("No servers to connect".to_string()));
        }
        let mut keys = HashSet::new();
        for server in &self.servers {
            if !keys.insert(server.key.as_str()) {
                return Err(BotError::Config(format!("Duplicate server key '{}'",
                        server.key)));
            }
        }
        Ok(())
    }

    /// Returns settings of bot instance for every server.
    pub fn bot_settings(&self) -> Vec<BotSettings> {
        self.servers.iter().map(|server| BotSettings {
            server_key: server.key.clone(),
            address: server.address.clone(),
            port: server.port,
            identity: BotIdentity {
                nick: self.nick.clone(),
                altnick: self.altnick.clone().unwrap_or_default(),
                username: self.username.clone(),
                realname: self.realname.clone(),
                password: server.password.clone(),
                channels: server.channels.clone().unwrap_or_default(),
            },
            command_prefix: self.command_prefix.clone(),
        }).collect()
    }

    /// Adds users declared in configuration to user database as explicit users.
    pub fn load_users(&self, user_db: &UserDb) -> Result<usize> {
        let users = match self.users {
            Some(ref users) => users,
            None => return Ok(0),
        };
        for uconfig in users {
            let mut user = User::new_explicit();
            uconfig.hosts.iter().flatten().for_each(|h| user.add_host(HostMask::exact(h)));
            for pattern in uconfig.patterns.iter().flatten() {
                user.add_host(HostMask::pattern(pattern)?);
            }
            if user.hosts().is_empty() {
                return Err(BotError::Config("User without hosts".to_string()));
            }
            user.global_access = Access::with_letters(uconfig.power, &uconfig.flags)?;
            for sconfig in uconfig.servers.iter().flatten() {
                let access = Access::with_letters(sconfig.power, &sconfig.flags)?;
                let server = user.add_server(&sconfig.key, access);
                for chconfig in sconfig.channels.iter().flatten() {
                    let access = Access::with_letters(chconfig.power, &chconfig.flags)?;
                    server.add_channel(&chconfig.name, access).explicit = true;
                }
            }
            user_db.add_user(user);
        }
        info!("Loaded {} users from configuration", users.len());
        Ok(users.len())
    }
}

impl Default for MainConfig {
    fn default() -> Self {
        MainConfig{ nick: "simplebot".to_string(),
            altnick: None,
            username: "simplebot".to_string(),
            realname: "Simple IRC Bot".to_string(),
            command_prefix: default_command_prefix(),
            grammar: None,
            servers: vec![],
            users: None }
    }
}
