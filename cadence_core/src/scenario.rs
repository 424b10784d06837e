//! Scenario generation: deterministic business-event volumes and issue
//! injection derived from the simulated calendar position.
//!
//! Volume per tick is `round(base_rate[theme] * hour_multiplier[hour] *
//! jitter)` with jitter drawn uniformly from [0.7, 1.3]. All randomness
//! comes from a seeded ChaCha8 stream, so two generators built with the
//! same seed produce identical sequences for identical inputs; in
//! production the stream simply advances across calls.

use crate::error::TickError;
use cadence_env::{EventCategory, EventDescriptor, Priority};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

/// Weekday themes cycling over the simulated week.
///
/// Days 6 and 7 wrap back onto the first themes, so a 7-day cycle sees
/// `Kickoff, Production, Logistics, Finance, Clearance, Kickoff, Production`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DayTheme {
    /// Week kickoff: quoting and order intake
    Kickoff,
    /// Production push
    Production,
    /// Shipping and warehouse day
    Logistics,
    /// Invoicing and payment runs
    Finance,
    /// End-of-week clearance and support backlog
    Clearance,
}

impl DayTheme {
    /// Theme for a simulated day (1..=7).
    pub fn for_day(sim_day: u8) -> Self {
        match sim_day.saturating_sub(1) % 5 {
            0 => DayTheme::Kickoff,
            1 => DayTheme::Production,
            2 => DayTheme::Logistics,
            3 => DayTheme::Finance,
            _ => DayTheme::Clearance,
        }
    }

    /// Baseline events per simulated hour for this theme.
    pub fn base_rate(&self) -> f64 {
        match self {
            DayTheme::Kickoff => 8.0,
            DayTheme::Production => 12.0,
            DayTheme::Logistics => 10.0,
            DayTheme::Finance => 9.0,
            DayTheme::Clearance => 14.0,
        }
    }

    /// Dominant business category generated under this theme.
    pub fn category(&self) -> EventCategory {
        match self {
            DayTheme::Kickoff => EventCategory::Orders,
            DayTheme::Production => EventCategory::Production,
            DayTheme::Logistics => EventCategory::Logistics,
            DayTheme::Finance => EventCategory::Billing,
            DayTheme::Clearance => EventCategory::Support,
        }
    }

    /// Theme name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            DayTheme::Kickoff => "kickoff",
            DayTheme::Production => "production",
            DayTheme::Logistics => "logistics",
            DayTheme::Finance => "finance",
            DayTheme::Clearance => "clearance",
        }
    }
}

/// Hour-of-day demand multiplier with morning/afternoon/evening peak bands.
pub fn hour_multiplier(hour: u8) -> f64 {
    match hour {
        0..=5 => 0.2,
        6..=8 => 0.6,
        9..=11 => 1.5,
        12..=13 => 1.0,
        14..=16 => 1.4,
        17..=18 => 0.9,
        19..=21 => 1.2,
        _ => 0.4,
    }
}

/// Whether the hour falls in one of the designated peak bands.
pub fn is_peak_hour(hour: u8) -> bool {
    matches!(hour, 9..=11 | 14..=16 | 19..=21)
}

/// Severity of an injected issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IssueSeverity {
    /// Localized nuisance
    Minor,
    /// Affects a whole category
    Major,
    /// Business-stopping
    Critical,
}

impl IssueSeverity {
    /// Weight by which one active issue of this severity shifts the
    /// priority distribution of subsequently generated events toward the
    /// upper tiers. Summed over active issues and capped by
    /// `ScenarioConfig::escalation_cap`.
    pub fn escalation(&self) -> f64 {
        match self {
            IssueSeverity::Minor => 0.05,
            IssueSeverity::Major => 0.12,
            IssueSeverity::Critical => 0.25,
        }
    }
}

/// Lifecycle state of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IssueStatus {
    /// Influencing event generation
    Active,
    /// Closed, kept for bookkeeping until cycle reset
    Resolved,
}

/// A simulated ongoing business problem.
///
/// Issues persist until explicitly resolved or until cycle reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    /// Stable identifier
    pub id: Uuid,
    /// Affected business category
    pub category: EventCategory,
    /// Severity (drives the escalation weight)
    pub severity: IssueSeverity,
    /// Simulated day of creation
    pub created_day: u8,
    /// Simulated hour of creation
    pub created_hour: u8,
    /// Current status
    pub status: IssueStatus,
}

/// Tunable generation thresholds.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// Seed for the generator's RNG stream
    pub seed: u64,
    /// Per-tick probability of injecting a new issue off-peak
    pub inject_probability: f64,
    /// Multiplier applied to the injection probability during peak hours
    pub peak_inject_multiplier: f64,
    /// Per-tick probability of auto-resolving the oldest active issue
    pub resolve_probability: f64,
    /// Hard cap on simultaneously active issues
    pub max_active_issues: usize,
    /// Upper bound on the summed escalation weight
    pub escalation_cap: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            inject_probability: 0.04,
            peak_inject_multiplier: 2.0,
            resolve_probability: 0.08,
            max_active_issues: 5,
            escalation_cap: 0.30,
        }
    }
}

impl ScenarioConfig {
    /// Convenience constructor for a seeded default config.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }
}

/// Base priority distribution: critical, high, normal, low.
const BASE_PRIORITY_WEIGHTS: [f64; 4] = [0.05, 0.20, 0.50, 0.25];

/// Deterministic generator of event descriptors and issues.
pub struct ScenarioGenerator {
    config: ScenarioConfig,
    rng: ChaCha8Rng,
    issues: Vec<Issue>,
}

impl ScenarioGenerator {
    /// Creates a generator whose RNG stream starts at `config.seed`.
    pub fn new(config: ScenarioConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            issues: Vec::new(),
        }
    }

    /// Generates the event descriptors for one simulated-hour tick and
    /// rolls issue injection/resolution for that position.
    ///
    /// Returns one descriptor per priority tier with a non-zero target
    /// count. The RNG stream advances across calls.
    pub fn tick(
        &mut self,
        sim_day: u8,
        sim_hour: u8,
    ) -> Result<Vec<EventDescriptor>, TickError> {
        if !(1..=7).contains(&sim_day) || sim_hour > 23 {
            return Err(TickError::CalendarOutOfRange {
                day: sim_day,
                hour: sim_hour,
            });
        }

        let theme = DayTheme::for_day(sim_day);
        let jitter: f64 = self.rng.gen_range(0.7..=1.3);
        let volume = (theme.base_rate() * hour_multiplier(sim_hour) * jitter).round() as u32;

        let weights = self.priority_weights();
        let mut events = Vec::with_capacity(4);
        for (tier, weight) in Priority::DISPATCH_ORDER.iter().zip(weights) {
            let target = (volume as f64 * weight).round() as u32;
            if target > 0 {
                events.push(EventDescriptor::new(
                    *tier,
                    theme.category(),
                    target,
                    sim_day,
                    sim_hour,
                ));
            }
        }
        debug!(
            day = sim_day,
            hour = sim_hour,
            theme = theme.name(),
            volume,
            tiers = events.len(),
            "generated tick"
        );

        self.roll_issues(sim_day, sim_hour, theme);
        Ok(events)
    }

    /// Priority distribution shifted by the summed escalation weight of the
    /// active issues: the shifted mass leaves the normal/low tiers and lands
    /// 40/60 on critical/high. Weights always sum to 1.
    fn priority_weights(&self) -> [f64; 4] {
        let shift: f64 = self
            .issues
            .iter()
            .filter(|i| i.status == IssueStatus::Active)
            .map(|i| i.severity.escalation())
            .sum::<f64>()
            .min(self.config.escalation_cap);

        let [crit, high, normal, low] = BASE_PRIORITY_WEIGHTS;
        let moved = (normal + low) * shift;
        [
            crit + moved * 0.4,
            high + moved * 0.6,
            normal * (1.0 - shift),
            low * (1.0 - shift),
        ]
    }

    fn roll_issues(&mut self, sim_day: u8, sim_hour: u8, theme: DayTheme) {
        let inject_p = self.config.inject_probability
            * if is_peak_hour(sim_hour) {
                self.config.peak_inject_multiplier
            } else {
                1.0
            };

        if self.rng.gen::<f64>() < inject_p && self.active_issue_count() < self.config.max_active_issues
        {
            let severity = match self.rng.gen::<f64>() {
                r if r < 0.50 => IssueSeverity::Minor,
                r if r < 0.85 => IssueSeverity::Major,
                _ => IssueSeverity::Critical,
            };
            let id = self.open_issue(theme.category(), severity, sim_day, sim_hour);
            info!(
                %id,
                category = theme.category().name(),
                ?severity,
                day = sim_day,
                hour = sim_hour,
                "issue injected"
            );
        }

        if self.active_issue_count() > 0 && self.rng.gen::<f64>() < self.config.resolve_probability
        {
            let oldest = self
                .issues
                .iter()
                .find(|i| i.status == IssueStatus::Active)
                .map(|i| i.id);
            if let Some(id) = oldest {
                self.resolve(id);
            }
        }
    }

    /// Opens an issue directly, bypassing the probability roll. The id is
    /// drawn from the generator's RNG stream so seeded runs reproduce it.
    pub fn open_issue(
        &mut self,
        category: EventCategory,
        severity: IssueSeverity,
        sim_day: u8,
        sim_hour: u8,
    ) -> Uuid {
        let id = Uuid::from_u128(self.rng.gen());
        self.issues.push(Issue {
            id,
            category,
            severity,
            created_day: sim_day,
            created_hour: sim_hour,
            status: IssueStatus::Active,
        });
        id
    }

    /// Resolves an active issue. Returns false if unknown or already
    /// resolved.
    pub fn resolve(&mut self, id: Uuid) -> bool {
        match self
            .issues
            .iter_mut()
            .find(|i| i.id == id && i.status == IssueStatus::Active)
        {
            Some(issue) => {
                issue.status = IssueStatus::Resolved;
                info!(%id, "issue resolved");
                true
            }
            None => false,
        }
    }

    /// Clones of the currently active issues.
    pub fn active_issues(&self) -> Vec<Issue> {
        self.issues
            .iter()
            .filter(|i| i.status == IssueStatus::Active)
            .cloned()
            .collect()
    }

    /// Number of active issues.
    pub fn active_issue_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.status == IssueStatus::Active)
            .count()
    }

    /// Cycle reset: clears all issues. The RNG stream is deliberately NOT
    /// reseeded, so consecutive cycles differ.
    pub fn reset(&mut self) {
        self.issues.clear();
    }
}
