use std::{error::Error, fmt};

// Precondition and not-found failures are ordinary return values: the
// command layer maps each variant to a user-facing message. Storage wraps
// anything the store itself failed at; the transaction has already rolled
// back by the time the caller sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum RaceError {
    NotOpen,
    AlreadyJoined,
    NotFound,
    RaceStarted,
    AlreadyReady,
    NotReady,
    TooFewPlayers,
    NotJoined,
    RaceNotStarted,
    AlreadyDone,
    NotDone,
    NotStarted,
    TooEarly,
    Banned,
    Storage(String),
}

impl fmt::Display for RaceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RaceError::NotOpen => write!(f, "Race is not open to entrants"),
            RaceError::AlreadyJoined => write!(f, "Runner has already joined this race"),
            RaceError::NotFound => write!(f, "No such race or entry"),
            RaceError::RaceStarted => write!(f, "Race has already started"),
            RaceError::AlreadyReady => write!(f, "Runner is already ready"),
            RaceError::NotReady => write!(f, "Runner has not readied up"),
            RaceError::TooFewPlayers => write!(f, "A race needs at least two runners"),
            RaceError::NotJoined => write!(f, "Runner has not readied up for this race"),
            RaceError::RaceNotStarted => write!(f, "Race has not started"),
            RaceError::AlreadyDone => write!(f, "Runner has already finished"),
            RaceError::NotDone => write!(f, "Runner has not finished"),
            RaceError::NotStarted => write!(f, "Race has not started"),
            RaceError::TooEarly => write!(f, "The countdown is still running"),
            RaceError::Banned => write!(f, "Runner is banned from racing"),
            RaceError::Storage(details) => write!(f, "Storage error: {}", details),
        }
    }
}

impl Error for RaceError {}

impl From<diesel::result::Error> for RaceError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => RaceError::NotFound,
            e => RaceError::Storage(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AsyncRaceError {
    NotOpen,
    NotClosed,
    MustCloseFirst,
    NotInvited,
    NotInvitational,
    NotFound,
    BadTime,
    Banned,
    Storage(String),
}

impl fmt::Display for AsyncRaceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AsyncRaceError::NotOpen => write!(f, "Race is not open for submissions"),
            AsyncRaceError::NotClosed => write!(f, "Race is not closed"),
            AsyncRaceError::MustCloseFirst => {
                write!(f, "Race must be closed before it can be purged")
            }
            AsyncRaceError::NotInvited => write!(f, "Runner has not been invited to this race"),
            AsyncRaceError::NotInvitational => write!(f, "Race is not invitational"),
            AsyncRaceError::NotFound => write!(f, "No such race or submission"),
            AsyncRaceError::BadTime => write!(f, "Could not read a finish time from submission"),
            AsyncRaceError::Banned => write!(f, "Runner is banned from racing"),
            AsyncRaceError::Storage(details) => write!(f, "Storage error: {}", details),
        }
    }
}

impl Error for AsyncRaceError {}

impl From<diesel::result::Error> for AsyncRaceError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => AsyncRaceError::NotFound,
            e => AsyncRaceError::Storage(e.to_string()),
        }
    }
}
