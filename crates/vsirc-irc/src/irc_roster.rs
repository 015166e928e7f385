//! Live membership of one IRC channel, maintained from server traffic.

use vsirc_core::PeerIdentity;

use crate::irc_message::IrcMessage;

const NAMES_MODE_PREFIXES: &[char] = &['~', '&', '@', '%', '+', '!'];

#[derive(Debug, Clone, PartialEq, Eq)]
struct RosterMember {
    nickname: String,
    account_name: Option<String>,
}

/// Outcome of applying one server line to a [`ChannelRoster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RosterUpdate {
    pub changed: bool,
    /// The server finished the initial NAMES listing for this channel.
    pub names_complete: bool,
}

/// Members of one channel in discovery order.
#[derive(Debug, Clone)]
pub struct ChannelRoster {
    channel: String,
    local_nickname: String,
    local_account: String,
    members: Vec<RosterMember>,
}

/// IRC servers prepend `~` to usernames without ident confirmation.
fn normalize_account_name(username: &str) -> String {
    username.trim_start_matches('~').to_string()
}

impl ChannelRoster {
    pub fn new(
        channel: impl Into<String>,
        local_nickname: impl Into<String>,
        local_account: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            local_nickname: local_nickname.into(),
            local_account: local_account.into(),
            members: Vec::new(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn local_nickname(&self) -> &str {
        &self.local_nickname
    }

    pub fn set_local_nickname(&mut self, nickname: impl Into<String>) {
        self.local_nickname = nickname.into();
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn is_this_channel(&self, name: Option<&str>) -> bool {
        name.is_some_and(|name| name.eq_ignore_ascii_case(&self.channel))
    }

    fn position(&self, nickname: &str) -> Option<usize> {
        self.members
            .iter()
            .position(|member| member.nickname.eq_ignore_ascii_case(nickname))
    }

    fn upsert(&mut self, nickname: &str, account_name: Option<String>) -> bool {
        match self.position(nickname) {
            Some(index) => {
                let member = &mut self.members[index];
                if account_name.is_some() && member.account_name != account_name {
                    member.account_name = account_name;
                    return true;
                }
                false
            }
            None => {
                self.members.push(RosterMember {
                    nickname: nickname.to_string(),
                    account_name,
                });
                true
            }
        }
    }

    fn remove(&mut self, nickname: &str) -> bool {
        match self.position(nickname) {
            Some(index) => {
                self.members.remove(index);
                true
            }
            None => false,
        }
    }

    fn rename(&mut self, from: &str, to: &str) -> bool {
        if from.eq_ignore_ascii_case(&self.local_nickname) {
            self.local_nickname = to.to_string();
        }
        match self.position(from) {
            Some(index) => {
                self.members[index].nickname = to.to_string();
                true
            }
            None => false,
        }
    }

    /// Folds one server line into the roster.
    pub fn apply(&mut self, message: &IrcMessage) -> RosterUpdate {
        let mut update = RosterUpdate::default();
        match message.command.as_str() {
            // RPL_NAMREPLY: <me> <symbol> <channel> :<names>
            "353" if self.is_this_channel(message.param(2)) => {
                for raw in message.param(3).unwrap_or_default().split_whitespace() {
                    let nickname = raw.trim_start_matches(NAMES_MODE_PREFIXES);
                    if !nickname.is_empty() {
                        update.changed |= self.upsert(nickname, None);
                    }
                }
            }
            // RPL_ENDOFNAMES: <me> <channel> :End of /NAMES list.
            "366" if self.is_this_channel(message.param(1)) => {
                update.names_complete = true;
            }
            // RPL_WHOREPLY: <me> <channel> <user> <host> <server> <nick> <flags> :<hops> <realname>
            "352" if self.is_this_channel(message.param(1)) => {
                if let (Some(username), Some(nickname)) = (message.param(2), message.param(5)) {
                    update.changed |= self.upsert(nickname, Some(normalize_account_name(username)));
                }
            }
            "JOIN" if self.is_this_channel(message.param(0)) => {
                if let Some(prefix) = &message.prefix {
                    let account = prefix.username.as_deref().map(normalize_account_name);
                    update.changed |= self.upsert(&prefix.nickname, account);
                }
            }
            "PART" if self.is_this_channel(message.param(0)) => {
                if let Some(nickname) = message.source_nickname() {
                    update.changed |= self.remove(nickname);
                }
            }
            "KICK" if self.is_this_channel(message.param(0)) => {
                if let Some(nickname) = message.param(1) {
                    update.changed |= self.remove(nickname);
                }
            }
            "QUIT" => {
                if let Some(nickname) = message.source_nickname() {
                    update.changed |= self.remove(nickname);
                }
            }
            "NICK" => {
                if let (Some(from), Some(to)) = (message.source_nickname(), message.param(0)) {
                    let from = from.to_string();
                    update.changed |= self.rename(&from, to);
                }
            }
            _ => {}
        }
        update
    }

    /// Current members as peer identities, the local user flagged.
    pub fn snapshot(&self) -> Vec<PeerIdentity> {
        self.members
            .iter()
            .map(|member| {
                let is_local = member.nickname.eq_ignore_ascii_case(&self.local_nickname);
                let account_name = match (&member.account_name, is_local) {
                    (Some(account), _) => Some(account.clone()),
                    (None, true) => Some(self.local_account.clone()),
                    (None, false) => None,
                };
                PeerIdentity {
                    display_name: member.nickname.clone(),
                    account_name,
                    is_local,
                }
            })
            .collect()
    }
}
