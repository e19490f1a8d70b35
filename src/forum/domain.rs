// Domain types - Pure, no side effects
use std::fmt;
use std::str::FromStr;

/// A submitted vote: +1 or -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteValue {
    Up,
    Down,
}

impl VoteValue {
    /// Signed value as stored in the `votes` table.
    pub fn sign(self) -> i64 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }

    pub fn from_sign(sign: i64) -> Option<Self> {
        match sign {
            1 => Some(Self::Up),
            -1 => Some(Self::Down),
            _ => None,
        }
    }
}

impl FromStr for VoteValue {
    type Err = VoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .ok()
            .and_then(Self::from_sign)
            .ok_or(VoteError::InvalidValue)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteError {
    InvalidValue,
}

impl fmt::Display for VoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue => write!(f, "Invalid vote"),
        }
    }
}

impl std::error::Error for VoteError {}

/// Where a user stands on a single post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoteState {
    #[default]
    None,
    Upvoted,
    Downvoted,
}

impl VoteState {
    /// Build the state from the user's stored vote row, if any.
    pub fn from_stored(vote: Option<VoteValue>) -> Self {
        match vote {
            Some(VoteValue::Up) => Self::Upvoted,
            Some(VoteValue::Down) => Self::Downvoted,
            None => Self::None,
        }
    }

    pub fn current_vote(self) -> Option<VoteValue> {
        match self {
            Self::None => None,
            Self::Upvoted => Some(VoteValue::Up),
            Self::Downvoted => Some(VoteValue::Down),
        }
    }

    pub fn state_name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Upvoted => "upvoted",
            Self::Downvoted => "downvoted",
        }
    }

    /// Resolve a submitted vote against the current state.
    ///
    /// Repeating the current vote withdraws it; the opposite vote flips it.
    pub fn apply(self, input: VoteValue) -> VoteTransition {
        let (to, upvotes_delta, downvotes_delta, row) = match (self, input) {
            (Self::None, VoteValue::Up) => (Self::Upvoted, 1, 0, VoteRowChange::Insert(input)),
            (Self::None, VoteValue::Down) => {
                (Self::Downvoted, 0, 1, VoteRowChange::Insert(input))
            }
            (Self::Upvoted, VoteValue::Up) => (Self::None, -1, 0, VoteRowChange::Delete),
            (Self::Upvoted, VoteValue::Down) => {
                (Self::Downvoted, -1, 1, VoteRowChange::Update(input))
            }
            (Self::Downvoted, VoteValue::Up) => {
                (Self::Upvoted, 1, -1, VoteRowChange::Update(input))
            }
            (Self::Downvoted, VoteValue::Down) => (Self::None, 0, -1, VoteRowChange::Delete),
        };

        VoteTransition {
            from: self,
            to,
            upvotes_delta,
            downvotes_delta,
            row,
        }
    }
}

/// What has to happen to the user's row in the `votes` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteRowChange {
    Insert(VoteValue),
    Update(VoteValue),
    Delete,
}

/// Outcome of one vote submission: new state plus counter deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTransition {
    pub from: VoteState,
    pub to: VoteState,
    pub upvotes_delta: i64,
    pub downvotes_delta: i64,
    pub row: VoteRowChange,
}

impl VoteTransition {
    /// Text returned to the client.
    pub fn message(&self) -> &'static str {
        match self.to {
            VoteState::None => "Vote removed",
            VoteState::Upvoted => "Upvote added",
            VoteState::Downvoted => "Downvote added",
        }
    }
}

/// Result of an applied vote, with the post's counters after the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteOutcome {
    pub transition: VoteTransition,
    pub upvotes: i64,
    pub downvotes: i64,
}

// --- Categories ---

const CATEGORY_SEPARATOR: char = ',';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryError {
    Unknown(String),
}

impl fmt::Display for CategoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(name) => write!(f, "Invalid category : {}", name),
        }
    }
}

impl std::error::Error for CategoryError {}

/// Every submitted name must exactly match (case-sensitive) a known one.
pub fn validate_categories<S: AsRef<str>>(
    submitted: &[String],
    known: &[S],
) -> Result<(), CategoryError> {
    match submitted
        .iter()
        .find(|name| !known.iter().any(|k| k.as_ref() == name.as_str()))
    {
        Some(unknown) => Err(CategoryError::Unknown(unknown.clone())),
        None => Ok(()),
    }
}

pub fn join_categories(categories: &[String]) -> String {
    categories.join(&CATEGORY_SEPARATOR.to_string())
}

pub fn split_categories(stored: &str) -> Vec<String> {
    stored
        .split(CATEGORY_SEPARATOR)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
