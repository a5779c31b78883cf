//! Wire-to-domain conversion, merge, and reference resolution
//!
//! Numeric fields parse leniently: a malformed or empty ID, card
//! number, or time coerces to 0 instead of failing the cycle. The feed
//! is noisy in practice and a dropped cycle costs more than a zeroed
//! field.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Timelike, Utc};

use crate::models::{Class, Club, Competitor, CompetitorStatus, Control, Event, HasId, Split};

use super::protocol::{MopClass, MopCompetition, MopCompetitor, MopControl, MopDocument, MopKind, MopOrg};

pub fn parse_u32(s: &str) -> u32 {
    s.trim().parse().unwrap_or(0)
}

fn deciseconds_to_duration(deciseconds: u32) -> Duration {
    Duration::milliseconds(i64::from(deciseconds) * 100)
}

/// Absolute competition start from the `date` and `zerotime` attributes.
pub fn competition_time(competition: &MopCompetition) -> Option<DateTime<Utc>> {
    let joined = format!("{}T{}", competition.date, competition.zero_time);
    NaiveDateTime::parse_from_str(&joined, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|t| t.and_utc())
}

/// Merge the envelope's competition record into the current event.
///
/// A complete snapshot replaces the event wholesale; a diff overwrites
/// only non-empty fields. Either way an event exists after the first
/// successful cycle.
pub fn merge_event(current: Option<Event>, document: &MopDocument) -> Event {
    let mut event = current.unwrap_or_else(|| Event {
        name: String::new(),
        organizer: String::new(),
        start: DateTime::UNIX_EPOCH,
    });

    match (&document.kind, &document.competition) {
        (MopKind::Complete, Some(competition)) => {
            event.name = competition.name.clone();
            event.organizer = competition.organizer.clone();
            event.start = competition_time(competition).unwrap_or(DateTime::UNIX_EPOCH);
        }
        (MopKind::Diff, Some(competition)) => {
            if !competition.name.is_empty() {
                event.name = competition.name.clone();
            }
            if !competition.organizer.is_empty() {
                event.organizer = competition.organizer.clone();
            }
            if let Some(start) = competition_time(competition) {
                event.start = start;
            }
        }
        (_, None) => {}
    }

    event
}

pub fn convert_controls(controls: &[MopControl]) -> Vec<Control> {
    controls
        .iter()
        .map(|ctrl| Control {
            id: parse_u32(&ctrl.id),
            name: ctrl.name.clone(),
        })
        .collect()
}

pub fn convert_classes(classes: &[MopClass]) -> Vec<Class> {
    classes
        .iter()
        .map(|cls| {
            // Radio controls stay as shells until the resolution pass.
            let radio_controls = if cls.radio.is_empty() {
                Vec::new()
            } else {
                cls.radio
                    .split(',')
                    .map(|id| Control::shell(parse_u32(id)))
                    .collect()
            };
            Class {
                id: parse_u32(&cls.id),
                order_key: parse_u32(&cls.order),
                radio_controls,
                name: cls.name.clone(),
            }
        })
        .collect()
}

pub fn convert_clubs(organizations: &[MopOrg]) -> Vec<Club> {
    organizations
        .iter()
        .map(|org| Club {
            id: parse_u32(&org.id),
            country_code: org.nationality.clone(),
            name: org.name.clone(),
        })
        .collect()
}

/// Convert wire competitors, deriving absolute timestamps from the
/// event's zero time.
///
/// A start offset of 0, or one equal to the event's own
/// zero-time-of-day offset, means the start is effectively unset: the
/// competitor gets no start time, no finish time and no splits.
pub fn convert_competitors(
    competitors: &[MopCompetitor],
    event: Option<&Event>,
) -> Vec<Competitor> {
    competitors
        .iter()
        .map(|cmp| {
            let mut competitor = Competitor {
                id: parse_u32(&cmp.id),
                card: parse_u32(&cmp.card),
                club: Club::shell(parse_u32(&cmp.org)),
                class: Class::shell(parse_u32(&cmp.class)),
                status: CompetitorStatus::from_code(parse_u32(&cmp.status)),
                start_time: None,
                finish_time: None,
                name: cmp.name.clone(),
                splits: Vec::new(),
            };

            let start_deciseconds = parse_u32(&cmp.start_time);
            if let Some(event) = event {
                if start_deciseconds > 0
                    && start_deciseconds != zero_time_deciseconds(event.start)
                {
                    let start_time = time_of_day(event.start, start_deciseconds);
                    competitor.start_time = Some(start_time);

                    let running_deciseconds = parse_u32(&cmp.running_time);
                    if running_deciseconds > 0 {
                        competitor.finish_time =
                            Some(start_time + deciseconds_to_duration(running_deciseconds));
                    }

                    competitor.splits = parse_splits(&cmp.radio, start_time);
                }
            }

            competitor
        })
        .collect()
}

/// Parse the delimited `controlID,deciseconds` punch list. Pairs with
/// the wrong field count are skipped; an unparsable offset coerces to
/// 0 rather than dropping the punch.
fn parse_splits(radio: &str, start_time: DateTime<Utc>) -> Vec<Split> {
    if radio.is_empty() {
        return Vec::new();
    }

    let mut splits: Vec<Split> = radio
        .split(';')
        .filter_map(|pair| {
            let parts: Vec<&str> = pair.split(',').collect();
            if parts.len() != 2 {
                return None;
            }
            Some(Split {
                control: Control::shell(parse_u32(parts[0])),
                passing_time: start_time + deciseconds_to_duration(parse_u32(parts[1])),
            })
        })
        .collect();

    splits.sort_by_key(|split| split.passing_time);
    splits
}

fn zero_time_deciseconds(event_start: DateTime<Utc>) -> u32 {
    event_start.num_seconds_from_midnight() * 10
}

/// Place a decisecond offset on the event's date as a wall-clock time.
fn time_of_day(event_start: DateTime<Utc>, deciseconds: u32) -> DateTime<Utc> {
    let seconds = deciseconds / 10;
    let hours = (seconds / 3600) % 24;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    let nanos = (deciseconds % 10) * 100_000_000;
    let time = NaiveTime::from_hms_nano_opt(hours, minutes, secs, nanos).unwrap_or_default();
    NaiveDateTime::new(event_start.date_naive(), time).and_utc()
}

/// Merge an incoming batch into the current collection.
///
/// A complete snapshot replaces the collection; a diff overwrites
/// matching IDs in place (preserving position) and appends unseen IDs.
pub fn upsert<T: HasId + Clone>(current: &[T], updates: Vec<T>, complete: bool) -> Vec<T> {
    if complete {
        return updates;
    }

    let mut result = current.to_vec();
    for update in updates {
        match result.iter_mut().find(|existing| existing.id() == update.id()) {
            Some(existing) => *existing = update,
            None => result.push(update),
        }
    }
    result
}

/// Replace shell references with canonical entities across the merged
/// collections.
///
/// Runs over the merged result rather than the newly arrived records: a
/// diff may reference an entity whose full definition arrived cycles
/// ago. Class radio lists keep only resolvable controls; competitor
/// references stay as shells when the target is genuinely unknown.
pub fn resolve_references(
    classes: &mut [Class],
    competitors: &mut [Competitor],
    controls: &[Control],
    clubs: &[Club],
) {
    let control_by_id: HashMap<u32, &Control> =
        controls.iter().map(|ctrl| (ctrl.id, ctrl)).collect();

    for class in classes.iter_mut() {
        class.radio_controls = class
            .radio_controls
            .iter()
            .filter_map(|rc| control_by_id.get(&rc.id).map(|ctrl| (*ctrl).clone()))
            .collect();
    }

    let class_by_id: HashMap<u32, &Class> = classes.iter().map(|cls| (cls.id, cls)).collect();
    let club_by_id: HashMap<u32, &Club> = clubs.iter().map(|club| (club.id, club)).collect();

    for competitor in competitors.iter_mut() {
        if let Some(club) = club_by_id.get(&competitor.club.id) {
            competitor.club = (*club).clone();
        }
        if let Some(class) = class_by_id.get(&competitor.class.id) {
            competitor.class = (*class).clone();
        }
        for split in competitor.splits.iter_mut() {
            if let Some(control) = control_by_id.get(&split.control.id) {
                split.control = (*control).clone();
            }
        }
    }
}
