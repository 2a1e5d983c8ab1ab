use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteAction {
    Up,
    Down,
    Remove,
}

impl VoteAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteAction::Up => "up",
            VoteAction::Down => "down",
            VoteAction::Remove => "remove",
        }
    }

    /// Stored direction for up/down, `None` for remove.
    pub fn direction(&self) -> Option<bool> {
        match self {
            VoteAction::Up => Some(true),
            VoteAction::Down => Some(false),
            VoteAction::Remove => None,
        }
    }
}

impl FromStr for VoteAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "up" => Ok(VoteAction::Up),
            "down" => Ok(VoteAction::Down),
            "remove" => Ok(VoteAction::Remove),
            other => Err(format!("unknown vote action '{}'", other)),
        }
    }
}

impl fmt::Display for VoteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Up and down counts for one quote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteTally {
    pub up: i64,
    pub down: i64,
}

impl VoteTally {
    pub fn count(&self) -> i64 {
        self.up + self.down
    }

    /// Net score: upvotes minus downvotes.
    pub fn sum(&self) -> i64 {
        self.up - self.down
    }
}

/// What a vote mutation reports back, enough to redraw a vote widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteOutcome {
    pub quote_id: i64,
    pub action: VoteAction,
    pub vote_count: i64,
    pub vote_sum: i64,
}

impl VoteOutcome {
    pub fn new(quote_id: i64, action: VoteAction, tally: VoteTally) -> Self {
        Self {
            quote_id,
            action,
            vote_count: tally.count(),
            vote_sum: tally.sum(),
        }
    }
}
