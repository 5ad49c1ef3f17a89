// grammar.rs - protocol description compiler
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

use lazy_static::lazy_static;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{BotError, Result};

lazy_static! {
    static ref EVENT_WORD_RE: Regex = Regex::new(r"^([0-9]+|[A-Za-z]+)$").unwrap();
    static ref ARG_NAME_RE: Regex = Regex::new(r"^[A-Za-z]+$").unwrap();
}

/// Built-in description of IRC protocol.
pub static DEFAULT_GRAMMAR: &str = include_str!("irc.proto");

/// Rule of single argument of protocol message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rule {
    Single(String),
    // rest of message, must be last
    Remaining(String),
    // comma separated list
    List(String),
    Channel(String),
    ChannelList(String),
    Optional(Vec<Rule>),
}

impl Rule {
    pub fn name(&self) -> Option<&str> {
        match self {
            Rule::Single(n) | Rule::Remaining(n) | Rule::List(n) |
            Rule::Channel(n) | Rule::ChannelList(n) => Some(n),
            Rule::Optional(_) => None,
        }
    }

    // collect names of this rule and nested rules
    pub fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Rule::Optional(rules) => rules.iter().for_each(|r| r.collect_names(out)),
            _ => out.extend(self.name()),
        }
    }
}

/// Compiled protocol event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledEvent {
    pub key: String,
    // command word as written in description
    pub command: String,
    pub rules: Vec<Rule>,
}

impl CompiledEvent {
    pub fn arg_names(&self) -> Vec<&str> {
        let mut names = vec![];
        self.rules.iter().for_each(|r| r.collect_names(&mut names));
        names
    }
}

/// Normalizes command word to event key: lowercase word or 'e' and digits
/// for numeric replies.
pub fn event_key(word: &str) -> String {
    if !word.is_empty() && word.bytes().all(|c| c.is_ascii_digit()) {
        format!("e{}", word)
    } else {
        word.to_lowercase()
    }
}

/// Returns lines of description text that should be compiled: skips empty
/// lines and comments (started by ';').
pub fn grammar_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with(';'))
}

/// Compiles single line of protocol description,
/// for example: "KICK *#channels *nicks [:comment]".
pub fn compile_line(line: &str) -> Result<CompiledEvent> {
    let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
    let tokens = line.split_whitespace().collect::<Vec<_>>();
    if tokens.is_empty() {
        return Err(BotError::InvalidArgument("Empty protocol description".to_string()));
    }
    let command = tokens[0];
    if !EVENT_WORD_RE.is_match(command) {
        return Err(BotError::Format(command.to_string()));
    }
    let rules = compile_rules(&tokens[1..])?;
    if rule_after_remaining(&rules, &mut false) {
        return Err(BotError::Format(format!("Argument after rest of message: {}", line)));
    }
    Ok(CompiledEvent {
        key: event_key(command),
        command: command.to_string(),
        rules,
    })
}

// rest of message ends arguments, no rule can follow it
fn rule_after_remaining(rules: &[Rule], seen: &mut bool) -> bool {
    for rule in rules {
        if *seen {
            return true;
        }
        match rule {
            Rule::Remaining(_) => *seen = true,
            Rule::Optional(inner) => {
                if rule_after_remaining(inner, seen) {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

fn compile_rules(tokens: &[&str]) -> Result<Vec<Rule>> {
    let mut rules = vec![];
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i].starts_with('[') {
            let end = find_optional_end(tokens, i)?;
            let mut inner = tokens[i..=end].iter().map(|t| t.to_string()).collect::<Vec<_>>();
            inner[0].remove(0);
            let last = inner.len() - 1;
            inner[last].pop();
            let inner = inner.iter().map(|t| t.as_str())
                    .filter(|t| !t.is_empty()).collect::<Vec<_>>();
            if inner.is_empty() {
                return Err(BotError::Format(tokens[i..=end].join(" ")));
            }
            rules.push(Rule::Optional(compile_rules(&inner)?));
            i = end + 1;
        } else {
            rules.push(compile_token(tokens[i])?);
            i += 1;
        }
    }
    Ok(rules)
}

// find token that closes optional group opened at start
fn find_optional_end(tokens: &[&str], start: usize) -> Result<usize> {
    let mut depth = 0;
    for (i, token) in tokens.iter().enumerate().skip(start) {
        depth += token.chars().take_while(|c| *c == '[').count();
        let closed = token.chars().rev().take_while(|c| *c == ']').count();
        if closed >= depth {
            return Ok(i);
        }
        depth -= closed;
    }
    Err(BotError::Format(format!("Unterminated optional: {}", tokens[start..].join(" "))))
}

fn compile_token(token: &str) -> Result<Rule> {
    let format_error = || BotError::Format(token.to_string());
    let (remaining, arg) = match token.strip_prefix(':') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    let (list, arg) = match arg.strip_prefix('*') {
        Some(rest) => (true, rest),
        None => (false, arg),
    };
    let (channel, arg) = match arg.strip_prefix('#') {
        Some(rest) => (true, rest),
        None => (false, arg),
    };
    if remaining && (list || channel) {
        return Err(format_error());
    }
    if !ARG_NAME_RE.is_match(arg) {
        return Err(format_error());
    }
    let name = arg.to_string();
    Ok(match (remaining, list, channel) {
        (true, _, _) => Rule::Remaining(name),
        (_, true, true) => Rule::ChannelList(name),
        (_, true, false) => Rule::List(name),
        (_, false, true) => Rule::Channel(name),
        _ => Rule::Single(name),
    })
}

/// Value of argument passed to formatter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormatValue {
    Text(String),
    List(Vec<String>),
}

impl FormatValue {
    fn is_empty(&self) -> bool {
        match self {
            FormatValue::Text(t) => t.is_empty(),
            FormatValue::List(l) => l.is_empty(),
        }
    }

    fn render(&self) -> String {
        match self {
            FormatValue::Text(t) => t.clone(),
            FormatValue::List(l) => l.join(","),
        }
    }
}

impl From<&str> for FormatValue {
    fn from(t: &str) -> Self {
        FormatValue::Text(t.to_string())
    }
}

impl From<String> for FormatValue {
    fn from(t: String) -> Self {
        FormatValue::Text(t)
    }
}

impl From<&String> for FormatValue {
    fn from(t: &String) -> Self {
        FormatValue::Text(t.clone())
    }
}

impl From<Vec<String>> for FormatValue {
    fn from(l: Vec<String>) -> Self {
        FormatValue::List(l)
    }
}

impl From<&[&str]> for FormatValue {
    fn from(l: &[&str]) -> Self {
        FormatValue::List(l.iter().map(|x| x.to_string()).collect())
    }
}

/// Formatter builds protocol message from named arguments.
pub type Formatter = Arc<dyn Fn(&[(&str, FormatValue)]) -> Result<String> + Send + Sync>;

struct FormatArg {
    name: String,
    remaining: bool,
    optional: bool,
}

fn flatten_format_args(rules: &[Rule], optional: bool, out: &mut Vec<FormatArg>) {
    // after first optional group all arguments are optional
    let mut optional = optional;
    for rule in rules {
        match rule {
            Rule::Optional(nested) => {
                optional = true;
                flatten_format_args(nested, true, out);
            }
            Rule::Remaining(name) => out.push(FormatArg {
                name: name.clone(),
                remaining: true,
                optional,
            }),
            _ => out.push(FormatArg {
                name: rule.name().unwrap_or_default().to_string(),
                remaining: false,
                optional,
            }),
        }
    }
}

pub fn build_formatter(event: &CompiledEvent) -> Formatter {
    let mut args = vec![];
    flatten_format_args(&event.rules, false, &mut args);
    let command = event.command.to_uppercase();
    Arc::new(move |values: &[(&str, FormatValue)]| {
        let mut out = command.clone();
        for arg in &args {
            let value = values.iter().find(|(n, _)| *n == arg.name).map(|(_, v)| v);
            match value {
                Some(v) if !(arg.optional && v.is_empty()) => {
                    out.push(' ');
                    if arg.remaining {
                        out.push(':');
                    }
                    out += &v.render();
                }
                None if !arg.optional => {
                    return Err(BotError::InvalidArgument(format!(
                        "Missing argument '{}' for {}",
                        arg.name, command
                    )));
                }
                _ => {}
            }
        }
        Ok(out)
    })
}

/// Registry of formatters keyed by event key.
#[derive(Default)]
pub struct Helper {
    formatters: RwLock<HashMap<String, Formatter>>,
}

impl Helper {
    pub fn new() -> Helper {
        Helper::default()
    }

    pub fn insert(&self, key: &str, formatter: Formatter) {
        self.formatters.write().insert(key.to_string(), formatter);
    }

    pub fn remove(&self, key: &str) -> bool {
        self.formatters.write().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.formatters.write().clear();
    }

    pub fn has(&self, event: &str) -> bool {
        self.formatters.read().contains_key(&event_key(event))
    }

    /// Formats message of event (for example "privmsg" or "001").
    pub fn format(&self, event: &str, args: &[(&str, FormatValue)]) -> Result<String> {
        let formatter = self.formatters.read().get(&event_key(event)).cloned();
        match formatter {
            Some(f) => f(args),
            None => Err(BotError::InvalidArgument(format!("Unknown event '{}'", event))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn single(n: &str) -> Rule {
        Rule::Single(n.to_string())
    }

    #[test]
    fn test_event_key() {
        assert_eq!("privmsg", event_key("PRIVMSG"));
        assert_eq!("e001", event_key("001"));
        assert_eq!("e433", event_key("433"));
    }

    #[test]
    fn test_compile_line() {
        assert_eq!(
            Ok(CompiledEvent {
                key: "kick".to_string(),
                command: "KICK".to_string(),
                rules: vec![
                    Rule::ChannelList("channels".to_string()),
                    Rule::List("nicks".to_string()),
                    Rule::Optional(vec![Rule::Remaining("comment".to_string())]),
                ]
            }),
            compile_line("KICK *#channels *nicks [:comment]\r\n")
        );
        assert_eq!(
            Ok(CompiledEvent {
                key: "e001".to_string(),
                command: "001".to_string(),
                rules: vec![single("nick"), Rule::Remaining("msg".to_string())],
            }),
            compile_line("001 nick :msg")
        );
        let event = compile_line("PRIVMSG #target :msg").unwrap();
        assert_eq!(
            vec![Rule::Channel("target".to_string()), Rule::Remaining("msg".to_string())],
            event.rules
        );
        assert_eq!(vec![] as Vec<Rule>, compile_line("QUIT").unwrap().rules);
    }

    #[test]
    fn test_compile_nested_optional() {
        assert_eq!(
            vec![Rule::Optional(vec![
                single("first"),
                Rule::Optional(vec![single("second")])
            ])],
            compile_line("LIST [first [second]]").unwrap().rules
        );
        assert_eq!(
            vec![
                single("a"),
                Rule::Optional(vec![single("b")]),
                Rule::Optional(vec![single("c"), single("d")])
            ],
            compile_line("CMD a [b] [c d]").unwrap().rules
        );
        assert_eq!(
            vec!["first", "second"],
            compile_line("LIST [first [second]]").unwrap().arg_names()
        );
    }

    #[test]
    fn test_compile_errors() {
        assert!(matches!(compile_line("hello !!4"), Err(BotError::Format(_))));
        assert!(matches!(compile_line("a1b x"), Err(BotError::Format(_))));
        assert!(matches!(compile_line("CMD :*x"), Err(BotError::Format(_))));
        assert!(matches!(compile_line("CMD :#x"), Err(BotError::Format(_))));
        assert!(matches!(compile_line("CMD x1"), Err(BotError::Format(_))));
        assert!(matches!(compile_line("CMD [a b"), Err(BotError::Format(_))));
        assert!(matches!(compile_line("CMD []"), Err(BotError::Format(_))));
        assert!(matches!(compile_line("CMD a]"), Err(BotError::Format(_))));
        assert!(matches!(compile_line("CMD :a b"), Err(BotError::Format(_))));
        assert!(matches!(compile_line("CMD [:a] b"), Err(BotError::Format(_))));
        assert!(matches!(compile_line("CMD [:a [b]]"), Err(BotError::Format(_))));
        assert!(compile_line("CMD a [b [:c]]").is_ok());
        assert!(matches!(compile_line(""), Err(BotError::InvalidArgument(_))));
        assert!(matches!(compile_line("  \r\n"), Err(BotError::InvalidArgument(_))));
    }

    #[test]
    fn test_grammar_lines() {
        let text = "; comment\nPING :id\n\n   \nPONG :id\r\n";
        assert_eq!(vec!["PING :id", "PONG :id"], grammar_lines(text).collect::<Vec<_>>());
        // default grammar must compile
        grammar_lines(DEFAULT_GRAMMAR).for_each(|l| {
            compile_line(l).unwrap();
        });
    }

    #[test]
    fn test_formatter() {
        let privmsg = build_formatter(&compile_line("PRIVMSG #target :msg").unwrap());
        assert_eq!(
            Ok("PRIVMSG #rust :hello world".to_string()),
            privmsg(&[("target", "#rust".into()), ("msg", "hello world".into())])
        );
        assert!(matches!(
            privmsg(&[("target", "#rust".into())]),
            Err(BotError::InvalidArgument(_))
        ));

        let kick = build_formatter(&compile_line("kick *#channels *nicks [:comment]").unwrap());
        let channels: &[&str] = &["#a", "#b"];
        assert_eq!(
            Ok("KICK #a,#b fish,shark".to_string()),
            kick(&[("channels", channels.into()),
                ("nicks", vec!["fish".to_string(), "shark".to_string()].into())])
        );
        assert_eq!(
            Ok("KICK #a,#b fish :go away".to_string()),
            kick(&[("channels", channels.into()), ("nicks", "fish".into()),
                ("comment", "go away".into())])
        );
        assert_eq!(
            Ok("KICK #a,#b fish".to_string()),
            kick(&[("channels", channels.into()), ("nicks", "fish".into()),
                ("comment", "".into())])
        );

        let list = build_formatter(&compile_line("LIST [first [second]]").unwrap());
        assert_eq!(Ok("LIST".to_string()), list(&[]));
        assert_eq!(Ok("LIST a".to_string()), list(&[("first", "a".into())]));
        assert_eq!(
            Ok("LIST a b".to_string()),
            list(&[("first", "a".into()), ("second", "b".into())])
        );

        let mode = build_formatter(
            &compile_line("MODE #target modestr [limit] [user] [banmask]").unwrap());
        assert_eq!(
            Ok("MODE #rust +o fish".to_string()),
            mode(&[("target", "#rust".into()), ("modestr", "+o".into()),
                ("user", "fish".into())])
        );

        let e001 = build_formatter(&compile_line("001 nick :msg").unwrap());
        assert_eq!(
            Ok("001 fish :Welcome".to_string()),
            e001(&[("nick", "fish".into()), ("msg", "Welcome".into())])
        );
    }

    #[test]
    fn test_helper() {
        let helper = Helper::new();
        let event = compile_line("PING :id").unwrap();
        helper.insert(&event.key, build_formatter(&event));
        assert!(helper.has("PING"));
        assert_eq!(Ok("PING :xyz".to_string()), helper.format("ping", &[("id", "xyz".into())]));
        assert!(helper.remove("ping"));
        assert!(!helper.remove("ping"));
        assert!(matches!(
            helper.format("ping", &[("id", "xyz".into())]),
            Err(BotError::InvalidArgument(_))
        ));
    }
}
