// main.rs - main program
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

use clap::Parser;
use std::error::Error;
use std::fs;
use std::sync::Arc;
use tokio::signal;
use tracing::*;
use tracing_subscriber::EnvFilter;

use simple_irc_bot::bot::BotInstance;
use simple_irc_bot::config::*;
use simple_irc_bot::grammar::DEFAULT_GRAMMAR;
use simple_irc_bot::state::{ChannelDb, UserDb};

// waits for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Can't install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Can't install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = MainConfig::new(cli)?;
    let grammar = match config.grammar {
        Some(ref path) => fs::read_to_string(path)?,
        None => DEFAULT_GRAMMAR.to_string(),
    };

    let user_db = Arc::new(UserDb::new());
    let channel_db = Arc::new(ChannelDb::new());
    config.load_users(&user_db)?;

    let mut halts = vec![];
    let mut handles = vec![];
    for settings in config.bot_settings() {
        let server_key = settings.server_key.clone();
        let mut bot = BotInstance::new(settings, &grammar, user_db.clone(), channel_db.clone())?;
        halts.extend(bot.take_halt());
        handles.push((server_key, tokio::spawn(bot.run())));
    }

    let bots = async move {
        for (server_key, handle) in handles {
            match handle.await {
                Ok(Ok(())) => info!("Bot for {} finished", server_key),
                Ok(Err(e)) => error!("Bot for {} failed: {}", server_key, e),
                Err(e) => error!("Bot task for {} panicked: {}", server_key, e),
            }
        }
    };
    tokio::pin!(bots);
    tokio::select! {
        _ = &mut bots => {},
        _ = shutdown_signal() => {
            halts.into_iter().for_each(|halt| halt.halt("Shutting down"));
            bots.await;
        }
    }

    user_db.prepare_for_serialization();
    channel_db.prepare_for_serialization();
    Ok(())
}
