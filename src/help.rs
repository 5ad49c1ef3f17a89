// help.rs - help topics
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

// help topics list with its content.
pub static HELP_TOPICS: [(&str, &str); 3] = [
    (
        "access",
        r##"access - show your access in current place.
Power is in range 0..100. Flags are letters from 'a' to 'z' except 'y'.
Access in channel is merged from global, server and channel access."##,
    ),
    (
        "help",
        r##"help [topic] - show list of topics or content of topic."##,
    ),
    (
        "main",
        r##"This is Simple IRC Bot.
Commands must be prefixed in channels. In private messages prefix is optional.
Use 'help <topic>' to read about topic."##,
    ),
];

/// Finds help topic (case-insensitive).
pub fn find_topic(name: &str) -> Option<&'static str> {
    HELP_TOPICS
        .iter()
        .find(|(topic, _)| topic.eq_ignore_ascii_case(name))
        .map(|(_, content)| *content)
}

pub fn topic_names() -> Vec<&'static str> {
    HELP_TOPICS.iter().map(|(topic, _)| *topic).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_find_topic() {
        assert!(find_topic("ACCESS").unwrap().starts_with("access - "));
        assert!(find_topic("Main").is_some());
        assert_eq!(None, find_topic("xxx"));
        assert_eq!(vec!["access", "help", "main"], topic_names());
    }
}
