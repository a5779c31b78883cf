//! Scripted competition lifecycle generator
//!
//! Produces a full roster and then drives it through a start-list,
//! running and results phase before resetting for the next cycle.
//! Per-competitor timings are precomputed once per cycle; ticks only
//! reveal what the precomputed schedule says has happened by now.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SimulationConfig;
use crate::models::{Class, Club, Competitor, CompetitorStatus, Control, Event, Split};

const FIRST_NAMES: &[&str] = &[
    "Emma", "Oliver", "Sophia", "Liam", "Isabella", "Noah", "Mia", "Lucas", "Charlotte", "Ethan",
    "Amelia", "Mason", "Harper", "Elijah", "Evelyn", "James", "Abigail", "Benjamin", "Emily",
    "William",
];
const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez", "Hernandez", "Lopez", "Gonzalez", "Wilson", "Anderson", "Thomas", "Taylor",
    "Moore", "Jackson", "Martin",
];
const CLUB_NAMES: &[&str] = &[
    "OK Silva", "OK Pan", "OK Linné", "Lynx OK", "OK Orion", "OK Ravinen", "OK Kompassen",
    "OK Denseln", "Stora Tuna OK", "OK Kåre", "Sävedalens AIK", "Göteborg-Majorna OK",
    "Matteus SI", "Järfälla OK", "OK Södertörn",
];
const CLASS_NAMES: &[&str] = &[
    "Men Elite", "Women Elite", "Men Junior", "Women Junior", "Men 21", "Women 21", "Men 35",
    "Women 35", "Men 40", "Women 40",
];

/// Offsets from a competitor's start, fixed for the whole cycle.
struct CompetitorTiming {
    total: Duration,
    /// Cumulative offsets per radio control, strictly inside `total`.
    splits: Vec<Duration>,
}

pub struct Generator {
    config: SimulationConfig,
    duration: Duration,
    phase_start: Duration,
    phase_running: Duration,
    start_time: DateTime<Utc>,
    simulation_time: DateTime<Utc>,
    controls: Vec<Control>,
    clubs: Vec<Club>,
    classes: Vec<Class>,
    competitors: Vec<Competitor>,
    timings: HashMap<u32, CompetitorTiming>,
    rng: StdRng,
}

impl Generator {
    pub fn new(config: SimulationConfig) -> Self {
        let duration = Duration::from_std(config.duration).unwrap_or_else(|_| Duration::zero());
        let phase_start =
            Duration::from_std(config.phase_start).unwrap_or_else(|_| Duration::zero());
        let phase_running =
            Duration::from_std(config.phase_running).unwrap_or_else(|_| Duration::zero());

        Generator {
            config,
            duration,
            phase_start,
            phase_running,
            start_time: DateTime::UNIX_EPOCH,
            simulation_time: DateTime::UNIX_EPOCH,
            controls: Vec::new(),
            clubs: Vec::new(),
            classes: Vec::new(),
            competitors: Vec::new(),
            timings: HashMap::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Build the event, roster and per-competitor timings for a fresh
    /// cycle anchored at `base_time`.
    pub fn generate_initial(
        &mut self,
        base_time: DateTime<Utc>,
    ) -> (Event, Vec<Control>, Vec<Class>, Vec<Club>, Vec<Competitor>) {
        self.start_time = base_time;
        self.simulation_time = base_time;

        let event = Event {
            name: "Simulation Event".to_string(),
            organizer: "MeOS Live Simulator".to_string(),
            start: base_time,
        };

        self.controls = (1..=self.config.radio_controls)
            .map(|i| Control {
                id: i as u32,
                name: format!("Radio {i}"),
            })
            .collect();

        self.clubs = CLUB_NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| Club {
                id: i as u32 + 1,
                country_code: "SWE".to_string(),
                name: (*name).to_string(),
            })
            .collect();

        self.classes = (1..=self.config.num_classes)
            .map(|i| {
                let name = CLASS_NAMES
                    .get(i - 1)
                    .map(|n| (*n).to_string())
                    .unwrap_or_else(|| format!("Class {i}"));

                // Vary the course a little: every third class reports
                // one radio control fewer.
                let mut radio_controls = self.controls.clone();
                if self.config.radio_controls > 1 && i % 3 == 0 {
                    radio_controls.pop();
                }

                Class {
                    id: i as u32,
                    order_key: (i * 10) as u32,
                    radio_controls,
                    name,
                }
            })
            .collect();

        self.generate_competitors(base_time);

        (
            event,
            self.controls.clone(),
            self.classes.clone(),
            self.clubs.clone(),
            self.competitors.clone(),
        )
    }

    fn generate_competitors(&mut self, base_time: DateTime<Utc>) {
        let interval = self.start_interval();
        let mut competitors = Vec::new();
        let mut id: u32 = 1;
        let mut index: i32 = 0;

        let classes = self.classes.clone();
        for class in &classes {
            for _ in 0..self.config.runners_per_class {
                let first = FIRST_NAMES[self.rng.gen_range(0..FIRST_NAMES.len())];
                let last = LAST_NAMES[self.rng.gen_range(0..LAST_NAMES.len())];
                let club = self.clubs[self.rng.gen_range(0..self.clubs.len())].clone();

                let start_offset = if self.config.mass_start {
                    Duration::zero()
                } else {
                    interval * index
                };

                competitors.push(Competitor {
                    id,
                    card: 500_000 + id,
                    club,
                    class: class.clone(),
                    status: CompetitorStatus::NotStarted,
                    start_time: Some(base_time + self.phase_start + start_offset),
                    finish_time: None,
                    name: format!("{first} {last}"),
                    splits: Vec::new(),
                });

                let timing = generate_timing(&mut self.rng, self.phase_running, class);
                self.timings.insert(id, timing);

                id += 1;
                index += 1;
            }
        }

        self.competitors = competitors;
    }

    /// Stagger interval chosen so even the last starter keeps enough of
    /// the running phase to plausibly finish.
    fn start_interval(&self) -> Duration {
        let min_run = minimum_run_time(self.phase_running);
        let max_offset = (self.phase_running - min_run).max(Duration::zero());
        let total = (self.config.num_classes * self.config.runners_per_class) as i32;

        if total > 0 && max_offset > Duration::zero() {
            (max_offset / total).clamp(Duration::seconds(10), Duration::minutes(2))
        } else {
            Duration::seconds(30)
        }
    }

    /// Advance the lifecycle to `now` and return a copy of the roster.
    pub fn update(&mut self, now: DateTime<Utc>) -> Vec<Competitor> {
        self.simulation_time = now;
        let elapsed = now - self.start_time;

        if elapsed >= self.duration {
            self.reset(now);
            return self.competitors.clone();
        }

        let running_end_offset = self.phase_start + self.phase_running;
        if elapsed >= self.phase_start {
            let progress = if elapsed < running_end_offset {
                (elapsed - self.phase_start).num_milliseconds() as f64
                    / self.phase_running.num_milliseconds().max(1) as f64
            } else {
                1.0
            };
            self.advance_competitors(progress);
        }

        self.competitors.clone()
    }

    /// Current phase name and the time until the next phase begins.
    pub fn current_phase(&self) -> (&'static str, Duration) {
        let elapsed = self.simulation_time - self.start_time;

        if elapsed < self.phase_start {
            return ("Start List", self.phase_start - elapsed);
        }
        let running_end = self.phase_start + self.phase_running;
        if elapsed < running_end {
            return ("Running", running_end - elapsed);
        }
        if elapsed < self.duration {
            return ("Results", self.duration - elapsed);
        }
        ("Resetting", Duration::zero())
    }

    fn advance_competitors(&mut self, progress: f64) {
        let running_end = self.start_time + self.phase_start + self.phase_running;
        let phase_running = self.phase_running;

        for competitor in self.competitors.iter_mut() {
            if competitor.status == CompetitorStatus::Finished && competitor.finish_time.is_some()
            {
                continue;
            }
            let Some(timing) = self.timings.get(&competitor.id) else {
                continue;
            };
            let Some(start) = competitor.start_time else {
                continue;
            };

            if self.simulation_time < start {
                competitor.status = CompetitorStatus::NotStarted;
                continue;
            }
            if competitor.status == CompetitorStatus::NotStarted {
                competitor.status = CompetitorStatus::Running;
            }

            let elapsed_since_start = self.simulation_time - start;

            // Progressive, monotonic reveal of the precomputed splits.
            let radio_count = competitor.class.radio_controls.len();
            let mut revealed: Vec<Split> = Vec::with_capacity(radio_count);
            for (j, control) in competitor.class.radio_controls.iter().enumerate() {
                if let Some(&offset) = timing.splits.get(j) {
                    let passing = start + offset;
                    if (elapsed_since_start >= offset || progress >= 1.0) && passing < running_end
                    {
                        revealed.push(Split {
                            control: control.clone(),
                            passing_time: passing,
                        });
                    }
                } else if progress >= 1.0 {
                    // No precomputed offset for this control; place it
                    // proportionally inside the total time.
                    let ratio = (j + 1) as f64 / (radio_count + 1) as f64;
                    revealed.push(Split {
                        control: control.clone(),
                        passing_time: start + mul_f64(timing.total, ratio * 0.9),
                    });
                }
            }
            if revealed.len() > competitor.splits.len() {
                competitor.splits = revealed;
            }

            let natural_finish = start + timing.total;
            if (elapsed_since_start >= timing.total || progress >= 1.0)
                && natural_finish < running_end
            {
                competitor.status = CompetitorStatus::Finished;
                competitor.finish_time = Some(natural_finish);
            } else if progress >= 1.0 {
                // Natural finish spills past the phase boundary: clamp
                // inside it with a safety margin and make the splits
                // self-consistent.
                let mut capped = running_end - Duration::seconds(1);
                if capped <= start {
                    capped = start + minimum_run_time(phase_running);
                }
                competitor.status = CompetitorStatus::Finished;
                competitor.finish_time = Some(capped);
                rebuild_splits(competitor, start, capped);
            }
        }
    }

    /// Revert every competitor to the start list and begin a new cycle
    /// anchored at `now`.
    fn reset(&mut self, now: DateTime<Utc>) {
        self.start_time = now;
        self.simulation_time = now;

        let interval = self.start_interval();
        let phase_start = self.phase_start;
        let phase_running = self.phase_running;
        let mass_start = self.config.mass_start;
        let mut index: i32 = 0;

        for competitor in self.competitors.iter_mut() {
            competitor.status = CompetitorStatus::NotStarted;
            competitor.finish_time = None;
            competitor.splits.clear();

            let start_offset = if mass_start {
                Duration::zero()
            } else {
                interval * index
            };
            competitor.start_time = Some(now + phase_start + start_offset);
            index += 1;

            let timing = generate_timing(&mut self.rng, phase_running, &competitor.class);
            self.timings.insert(competitor.id, timing);
        }
    }
}

fn mul_f64(duration: Duration, factor: f64) -> Duration {
    Duration::milliseconds((duration.num_milliseconds() as f64 * factor) as i64)
}

fn minimum_run_time(phase_running: Duration) -> Duration {
    if phase_running < Duration::minutes(5) {
        phase_running / 2
    } else {
        Duration::minutes(5)
    }
}

/// Finish-time range in minutes for a class, capped by feasibility.
fn class_minutes(name: &str, max_allowed: i64) -> (i64, i64) {
    let (min, max) = match name {
        "Men Elite" => (45, 60),
        "Women Elite" => (40, 55),
        "Men Junior" => (30, 40),
        _ => (45, 60),
    };
    let max = max.min(max_allowed).max(1);
    let min = if min > max { ((max as f64) * 0.7) as i64 } else { min };
    (min.max(1), max)
}

/// Draw a total finish time and split offsets for one competitor.
///
/// The total stays under 90% of the running phase so the phase can
/// always complete; split offsets are increasing fractions of the total
/// with bounded jitter, each at least one minimum leg beyond the
/// previous and leaving room for the final leg.
fn generate_timing(rng: &mut StdRng, phase_running: Duration, class: &Class) -> CompetitorTiming {
    let max_time = mul_f64(phase_running, 0.9);

    let total = if phase_running < Duration::minutes(5) {
        // Short cycles: wide spread between 30% and 90% of the cap.
        let min_time = mul_f64(max_time, 0.3);
        let range_ms = mul_f64(max_time, 0.6).num_milliseconds().max(1);
        let base = min_time + Duration::milliseconds(rng.gen_range(0..range_ms));
        let jitter = Duration::milliseconds(rng.gen_range(-5_000..5_000));
        (base + jitter).max(Duration::seconds(5)).min(max_time)
    } else {
        let (min_minutes, max_minutes) = class_minutes(&class.name, max_time.num_minutes());
        let range = (max_minutes - min_minutes).max(1);
        let base = Duration::minutes(min_minutes + rng.gen_range(0..=range));
        let jitter = Duration::seconds(rng.gen_range(-30..30))
            + Duration::milliseconds(rng.gen_range(0..10) * 100);
        (base + jitter).max(Duration::minutes(min_minutes)).min(max_time)
    };

    CompetitorTiming {
        splits: generate_split_times(rng, total, class),
        total,
    }
}

fn generate_split_times(rng: &mut StdRng, total: Duration, class: &Class) -> Vec<Duration> {
    let radio_count = class.radio_controls.len();
    if radio_count == 0 {
        return Vec::new();
    }

    // Reserve the tail of the run for the final leg to the finish.
    let reserve_ratio = if total < Duration::minutes(5) { 0.15 } else { 0.10 };
    let max_split = mul_f64(total, 1.0 - reserve_ratio);

    let min_leg = if total < Duration::minutes(2) {
        (total / (radio_count as i32 + 2)).max(Duration::seconds(5))
    } else if total < Duration::minutes(5) {
        Duration::seconds(15)
    } else {
        Duration::seconds(30)
    };

    let mut splits: Vec<Duration> = Vec::with_capacity(radio_count);
    for i in 0..radio_count {
        let base_ratio = (i + 1) as f64 / (radio_count + 1) as f64;
        let variation = (rng.gen::<f64>() - 0.5) * 0.1;
        let mut split = mul_f64(max_split, base_ratio + variation);

        let min_cumulative = min_leg * (i as i32 + 1);
        if split < min_cumulative {
            split = min_cumulative;
        }
        if i > 0 && split <= splits[i - 1] {
            split = splits[i - 1] + min_leg;
        }
        let max_allowed = max_split - min_leg * (radio_count - i) as i32;
        if split > max_allowed {
            split = max_allowed;
        }

        splits.push(split);
    }

    splits
}

/// Rebuild a clamped competitor's split list so every control has a
/// passing time strictly inside (start, capped), non-decreasing.
/// Already-revealed splits that fit are kept.
fn rebuild_splits(competitor: &mut Competitor, start: DateTime<Utc>, capped: DateTime<Utc>) {
    let radio_count = competitor.class.radio_controls.len();
    if radio_count == 0 {
        competitor.splits.clear();
        return;
    }

    let available = capped - start;
    let controls: Vec<Control> = competitor.class.radio_controls.clone();
    let mut rebuilt: Vec<Split> = Vec::with_capacity(radio_count);
    let mut prev = Duration::zero();

    for (j, control) in controls.into_iter().enumerate() {
        let existing = competitor
            .splits
            .get(j)
            .map(|split| split.passing_time - start);

        let candidate = match existing {
            Some(offset) if offset < available => offset,
            _ => mul_f64(available, (j + 1) as f64 / (radio_count + 1) as f64 * 0.9),
        };

        let mut offset = candidate.max(prev);
        if offset >= available {
            offset = prev + (available - prev) / 2;
        }

        rebuilt.push(Split {
            control,
            passing_time: start + offset,
        });
        prev = offset;
    }

    competitor.splits = rebuilt;
}
