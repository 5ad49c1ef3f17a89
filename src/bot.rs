// bot.rs - bot instance (connection to server)
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

use futures::SinkExt;
use std::error::Error;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;
use tracing::*;

use crate::builtin::register_builtins;
use crate::core_events::*;
use crate::error::Result;
use crate::grammar::grammar_lines;
use crate::proto_event::*;
use crate::registrar::Registrar;
use crate::state::*;
use crate::utils::*;

/// Settings of single connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotSettings {
    pub server_key: String,
    pub address: String,
    pub port: u16,
    pub identity: BotIdentity,
    pub command_prefix: String,
}

/// Handle used to stop running bot instance.
pub struct Halt(oneshot::Sender<String>);

impl Halt {
    pub fn halt(self, reason: &str) {
        // if bot is already stopped then nothing to do
        let _ = self.0.send(reason.to_string());
    }
}

/// Bot connected to one server.
pub struct BotInstance {
    settings: BotSettings,
    proto: Arc<ProtoEvent>,
    core: Arc<CoreEvents>,
    registrar: Arc<Registrar>,
    sender: UnboundedSender<String>,
    receiver: UnboundedReceiver<String>,
    quit_sender: Option<oneshot::Sender<String>>,
    quit_receiver: oneshot::Receiver<String>,
}

impl BotInstance {
    pub fn new(settings: BotSettings, grammar: &str, user_db: Arc<UserDb>,
                channel_db: Arc<ChannelDb>) -> Result<BotInstance> {
        let proto = ProtoEvent::new(&settings.server_key, user_db, channel_db);
        proto.load_grammar(grammar_lines(grammar))?;
        let proto = Arc::new(proto);
        let (sender, receiver) = unbounded_channel();
        let (quit_sender, quit_receiver) = oneshot::channel();
        let core = CoreEvents::new(proto.clone(), sender.clone(), settings.identity.clone());
        let registrar = Registrar::new(proto.clone(), &settings.command_prefix);
        register_builtins(&registrar, sender.clone())?;
        Ok(BotInstance {
            settings,
            proto,
            core,
            registrar,
            sender,
            receiver,
            quit_sender: Some(quit_sender),
            quit_receiver,
        })
    }

    pub fn proto(&self) -> &Arc<ProtoEvent> {
        &self.proto
    }

    pub fn core(&self) -> &Arc<CoreEvents> {
        &self.core
    }

    pub fn registrar(&self) -> &Arc<Registrar> {
        &self.registrar
    }

    /// Sender of outbound messages.
    pub fn sender(&self) -> UnboundedSender<String> {
        self.sender.clone()
    }

    pub fn take_halt(&mut self) -> Option<Halt> {
        self.quit_sender.take().map(Halt)
    }

    /// Connects to server and processes messages until disconnection or halt.
    pub async fn run(mut self) -> std::result::Result<(), Box<dyn Error + Send + Sync>> {
        let server_key = self.settings.server_key.clone();
        let stream = TcpStream::connect((self.settings.address.as_str(), self.settings.port))
                .await?;
        info!("Connected to {} ({}:{})", server_key, self.settings.address,
                self.settings.port);
        let mut stream = Framed::new(stream, IRCLinesCodec::new_with_max_length(MAX_LINE_LENGTH));

        let connect_args = Args::new()
            .with("address", ArgValue::Text(self.settings.address.clone()))
            .with("port", ArgValue::Text(self.settings.port.to_string()));
        self.proto.fire("connect", &connect_args);

        let result = self.process(&mut stream).await;
        if let Err(ref e) = result {
            error!("Connection error in {}: {}", server_key, e);
        }

        self.proto.fire("disconnect", &Args::new());
        self.registrar.collapse();
        self.core.collapse();
        self.proto.user_db().wipe_server_state(&server_key);
        self.proto.channel_db().clear_server(&server_key);
        info!("Disconnected from {}", server_key);
        result
    }

    async fn process(&mut self, stream: &mut Framed<TcpStream, IRCLinesCodec>)
                -> std::result::Result<(), Box<dyn Error + Send + Sync>> {
        let mut halt_dropped = false;
        loop {
            tokio::select! {
                Some(msg) = self.receiver.recv() => {
                    stream.feed(msg).await?;
                    // send all queued messages at once
                    while let Ok(msg) = self.receiver.try_recv() {
                        stream.feed(msg).await?;
                    }
                    SinkExt::<String>::flush(stream).await?;
                },
                res = &mut self.quit_receiver, if !halt_dropped => {
                    match res {
                        Ok(reason) => {
                            let quit = self.proto.helper().format("quit",
                                    &[("reason", reason.as_str().into())])
                                    .unwrap_or_else(|_| format!("QUIT :{}", reason));
                            stream.send(quit).await?;
                            info!("Bot halted in {}: {}", self.settings.server_key, reason);
                            return Ok(());
                        }
                        Err(_) => halt_dropped = true,
                    }
                },
                msg_str_res = stream.next() => {
                    match msg_str_res {
                        Some(Ok(line)) => {
                            if let Err(e) = self.proto.parse(&line) {
                                warn!("{}: {}", self.settings.server_key, e);
                            }
                        }
                        Some(Err(e)) => return Err(Box::new(e)),
                        // if end of stream
                        None => return Ok(()),
                    }
                },
            }
        }
    }
}
