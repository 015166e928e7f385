//! IRC protocol line codec.

/// Origin of an IRC message: `nick!user@host` or a bare server name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcPrefix {
    pub nickname: String,
    pub username: Option<String>,
    pub host: Option<String>,
}

impl IrcPrefix {
    pub fn parse(raw: &str) -> Self {
        let (nick_user, host) = match raw.split_once('@') {
            Some((left, host)) => (left, Some(host.to_string())),
            None => (raw, None),
        };
        let (nickname, username) = match nick_user.split_once('!') {
            Some((nickname, username)) => (nickname, Some(username.to_string())),
            None => (nick_user, None),
        };
        Self {
            nickname: nickname.to_string(),
            username,
            host,
        }
    }
}

/// One parsed protocol line. Message tags are discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    pub prefix: Option<IrcPrefix>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Parses a single line; returns `None` for blank or command-less input.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        if let Some(tagged) = rest.strip_prefix('@') {
            rest = tagged.split_once(' ').map(|(_, after)| after)?;
        }
        rest = rest.trim_start_matches(' ');

        let mut prefix = None;
        if let Some(prefixed) = rest.strip_prefix(':') {
            let (raw_prefix, after) = prefixed.split_once(' ')?;
            prefix = Some(IrcPrefix::parse(raw_prefix));
            rest = after.trim_start_matches(' ');
        }

        let (command, mut rest) = match rest.split_once(' ') {
            Some((command, after)) => (command, after),
            None => (rest, ""),
        };
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, after)) => {
                    params.push(param.to_string());
                    rest = after;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Some(Self {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    pub fn source_nickname(&self) -> Option<&str> {
        self.prefix.as_ref().map(|prefix| prefix.nickname.as_str())
    }
}

/// Strips CR/LF so user-controlled text cannot inject protocol lines.
pub fn sanitize_line_text(text: &str) -> String {
    text.chars()
        .map(|character| match character {
            '\r' | '\n' | '\0' => ' ',
            other => other,
        })
        .collect()
}

pub fn privmsg_line(target: &str, text: &str) -> String {
    format!("PRIVMSG {target} :{}", sanitize_line_text(text))
}
