// utils.rs - utilities
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

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LinesCodec};
use validator::ValidationError;

// maximal length of line received from server
pub const MAX_LINE_LENGTH: usize = 2000;

// special LinesCodec for IRC - encode with "\r\n".
pub struct IRCLinesCodec(LinesCodec);

impl IRCLinesCodec {
    pub fn new() -> IRCLinesCodec {
        IRCLinesCodec(LinesCodec::new())
    }

    pub fn new_with_max_length(max_length: usize) -> IRCLinesCodec {
        IRCLinesCodec(LinesCodec::new_with_max_length(max_length))
    }
}

impl<T: AsRef<str>> Encoder<T> for IRCLinesCodec {
    type Error = <LinesCodec as Encoder<T>>::Error;

    fn encode(&mut self, line: T, buf: &mut BytesMut) -> Result<(), Self::Error> {
        let line = line.as_ref();
        buf.reserve(line.len() + 2);
        buf.put(line.as_bytes());
        // put "\r\n"
        buf.put_u8(b'\r');
        buf.put_u8(b'\n');
        Ok(())
    }
}

impl Decoder for IRCLinesCodec {
    type Item = <LinesCodec as Decoder>::Item;
    type Error = <LinesCodec as Decoder>::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        self.0.decode(buf)
    }
}

pub fn is_channel_name(name: &str) -> bool {
    name.starts_with('#') || name.starts_with('&')
}

pub fn validate_nickname(nick: &str) -> Result<(), ValidationError> {
    if nick.is_empty() || is_channel_name(nick) {
        Err(ValidationError::new("Nickname must not be empty or have channel prefix."))
    } else if nick.contains(|c: char| c == ' ' || c == ',' || c == ':' ||
            c == '!' || c == '@') {
        Err(ValidationError::new("Nickname must not contains ' ', ',', ':', '!' or '@'."))
    } else {
        Ok(())
    }
}

pub fn validate_channel(channel: &str) -> Result<(), ValidationError> {
    if !channel.contains(':') && !channel.contains(',') && !channel.contains(' ') &&
            is_channel_name(channel) {
        Ok(())
    } else {
        Err(ValidationError::new("Channel name must have '#' or '&' at start and \
                must not contains ',', ' ' or ':'."))
    }
}

pub fn validate_channels(channels: &Vec<String>) -> Result<(), ValidationError> {
    channels.iter().try_for_each(|c| validate_channel(c))
}

pub fn validate_flags(flags: &str) -> Result<(), ValidationError> {
    crate::access::parse_flags(flags)
        .map(|_| ())
        .map_err(|_| ValidationError::new("Unknown access flag."))
}
