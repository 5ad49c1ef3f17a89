// error.rs - errors
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

use thiserror::Error;

/// Errors raised by the protocol engine, the command registrar and
/// the identity model.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum BotError {
    /// Malformed line in a protocol description (grammar).
    #[error("Invalid protocol format: {0}")]
    Format(String),
    /// Well-formed event, but the wire message has not enough tokens.
    #[error("Can't parse protocol message: {0}")]
    Parse(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Scope refers to a connection or channel unknown to the identity.
    #[error("Bad context: {0}")]
    Context(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bot_error_display() {
        assert_eq!(
            "Invalid protocol format: hello !!4".to_string(),
            BotError::Format("hello !!4".to_string()).to_string()
        );
        assert_eq!(
            "Can't parse protocol message: KICK #chan".to_string(),
            BotError::Parse("KICK #chan".to_string()).to_string()
        );
        assert_eq!(
            "Bad context: no server 'freenode'".to_string(),
            BotError::Context("no server 'freenode'".to_string()).to_string()
        );
    }
}
