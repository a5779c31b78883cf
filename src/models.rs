//! Domain model for live competition data
//!
//! All entities are identified by a positive integer ID unique within
//! their collection. ID 0 is the fallback for source IDs that failed to
//! parse; such entities never resolve against the canonical collections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entities that carry a collection-unique integer ID.
///
/// Used by the generic upsert merge in the reconciliation path.
pub trait HasId {
    fn id(&self) -> u32;
}

/// The competition itself. Singleton; replaced wholesale on a complete
/// snapshot, merged field-by-field on a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub organizer: String,
    /// Competition day at its zero time (time-of-day is the feed's
    /// reference point for all decisecond offsets).
    pub start: DateTime<Utc>,
}

/// A timing checkpoint out on the course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub id: u32,
    pub name: String,
}

impl Control {
    /// Reference carrying only an ID, pending resolution.
    pub fn shell(id: u32) -> Self {
        Control {
            id,
            name: String::new(),
        }
    }
}

impl HasId for Control {
    fn id(&self) -> u32 {
        self.id
    }
}

/// A competition class with its expected radio controls in course order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub id: u32,
    /// Sort priority for display; lower sorts first.
    pub order_key: u32,
    pub radio_controls: Vec<Control>,
    pub name: String,
}

impl Class {
    pub fn shell(id: u32) -> Self {
        Class {
            id,
            order_key: 0,
            radio_controls: Vec::new(),
            name: String::new(),
        }
    }
}

impl HasId for Class {
    fn id(&self) -> u32 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Club {
    pub id: u32,
    pub country_code: String,
    pub name: String,
}

impl Club {
    pub fn shell(id: u32) -> Self {
        Club {
            id,
            country_code: String::new(),
            name: String::new(),
        }
    }
}

impl HasId for Club {
    fn id(&self) -> u32 {
        self.id
    }
}

/// Competitor status as reported by the MOP feed.
///
/// Wire codes follow the MeOS status table. Unknown codes coerce to
/// `NotStarted` under the same leniency policy as unparsable numerics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompetitorStatus {
    NotStarted,
    Finished,
    Running,
    NotFinished,
    MissPunch,
    Disqualified,
    MaxTime,
    NotStartedAdministrative,
    Cancelled,
    NotCompeting,
}

impl CompetitorStatus {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => CompetitorStatus::Finished,
            2 => CompetitorStatus::Running,
            3 => CompetitorStatus::NotFinished,
            4 => CompetitorStatus::MissPunch,
            5 => CompetitorStatus::Disqualified,
            6 => CompetitorStatus::MaxTime,
            20 => CompetitorStatus::NotStartedAdministrative,
            21 => CompetitorStatus::Cancelled,
            99 => CompetitorStatus::NotCompeting,
            _ => CompetitorStatus::NotStarted,
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            CompetitorStatus::NotStarted => 0,
            CompetitorStatus::Finished => 1,
            CompetitorStatus::Running => 2,
            CompetitorStatus::NotFinished => 3,
            CompetitorStatus::MissPunch => 4,
            CompetitorStatus::Disqualified => 5,
            CompetitorStatus::MaxTime => 6,
            CompetitorStatus::NotStartedAdministrative => 20,
            CompetitorStatus::Cancelled => 21,
            CompetitorStatus::NotCompeting => 99,
        }
    }
}

/// A passing recorded at a radio control, as an absolute timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub control: Control,
    pub passing_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competitor {
    pub id: u32,
    /// Punch-card number.
    pub card: u32,
    pub club: Club,
    pub class: Class,
    pub status: CompetitorStatus,
    /// Absent when the feed reports the start as effectively unset.
    pub start_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
    pub name: String,
    /// Ordered by ascending passing time.
    pub splits: Vec<Split>,
}

impl HasId for Competitor {
    fn id(&self) -> u32 {
        self.id
    }
}
