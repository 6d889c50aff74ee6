//! Sabotage mechanics: side-challenge catalog, power accrual, activation,
//! and the escape counter
//!
//! The challenger accrues power by logging side-challenges; at 20 or more
//! the pool can be spent, which zeroes it, docks the defender half the spent
//! power in points, and flips the war's sabotage flag. The defender clears
//! the sabotage by logging three distinct escape tasks.

use serde::Serialize;

/// Minimum pool required to activate a sabotage
pub const ACTIVATION_THRESHOLD: i64 = 20;

/// Distinct escape tasks a sabotaged defender must log
pub const ESCAPE_TASKS_REQUIRED: i64 = 3;

/// Task id prefix marking escape tasks
pub const ESCAPE_PREFIX: &str = "escape_";

/// A side-challenge the challenger can log for sabotage power, or an
/// escape task the defender can log to break free
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SabotageTask {
    /// Stable catalog id
    pub id: &'static str,
    /// Display title
    pub title: &'static str,
    /// Power granted to the challenger's pool (0 for escape tasks)
    pub power: i64,
}

/// Power-granting side-challenges
const POWER_TASKS: &[SabotageTask] = &[
    SabotageTask {
        id: "cold_shower",
        title: "Take a cold shower",
        power: 5,
    },
    SabotageTask {
        id: "early_wakeup",
        title: "Wake up before 6am",
        power: 10,
    },
    SabotageTask {
        id: "no_sugar_day",
        title: "Go a full day without sugar",
        power: 5,
    },
    SabotageTask {
        id: "double_workout",
        title: "Do two workouts in one day",
        power: 15,
    },
    SabotageTask {
        id: "digital_detox_evening",
        title: "No screens after 8pm",
        power: 10,
    },
];

/// Escape tasks; ids carry the escape_ prefix
const ESCAPE_TASKS: &[SabotageTask] = &[
    SabotageTask {
        id: "escape_run_2k",
        title: "Run 2km",
        power: 0,
    },
    SabotageTask {
        id: "escape_meditate",
        title: "Meditate for 10 minutes",
        power: 0,
    },
    SabotageTask {
        id: "escape_journal",
        title: "Write a journal entry",
        power: 0,
    },
    SabotageTask {
        id: "escape_pushups",
        title: "Do 50 pushups",
        power: 0,
    },
];

/// Power-granting catalog (challenger side)
pub fn power_catalog() -> &'static [SabotageTask] {
    POWER_TASKS
}

/// Escape-task catalog (defender side)
pub fn escape_catalog() -> &'static [SabotageTask] {
    ESCAPE_TASKS
}

/// Look up any catalog task by id
pub fn find_task(id: &str) -> Option<&'static SabotageTask> {
    POWER_TASKS
        .iter()
        .chain(ESCAPE_TASKS.iter())
        .find(|t| t.id == id)
}

/// Whether a task id names an escape task
pub fn is_escape_task(id: &str) -> bool {
    id.starts_with(ESCAPE_PREFIX)
}

/// Result of spending a sabotage pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation {
    /// Points docked from the defender (half the spent pool)
    pub penalty_points: i64,
    /// Intensity tier recorded on the war (1..=3)
    pub intensity: i64,
}

/// Spend a sabotage pool. Fails below the activation threshold; on success
/// the caller zeroes the pool and applies the penalty.
pub fn activate(pool: i64) -> Option<Activation> {
    if pool < ACTIVATION_THRESHOLD {
        return None;
    }

    Some(Activation {
        penalty_points: pool / 2,
        intensity: intensity_for(pool),
    })
}

/// Intensity tier for a spent pool
fn intensity_for(pool: i64) -> i64 {
    match pool {
        p if p >= 50 => 3,
        p if p >= 30 => 2,
        _ => 1,
    }
}

/// Whether logging one more distinct escape task clears the sabotage
pub fn escape_clears(tasks_done_before: i64) -> bool {
    tasks_done_before + 1 >= ESCAPE_TASKS_REQUIRED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activation_below_threshold_fails() {
        assert!(activate(0).is_none());
        assert!(activate(19).is_none());
    }

    #[test]
    fn test_activation_at_threshold() {
        let act = activate(20).unwrap();
        assert_eq!(act.penalty_points, 10);
        assert_eq!(act.intensity, 1);
    }

    #[test]
    fn test_penalty_is_half_the_pool() {
        assert_eq!(activate(20).unwrap().penalty_points, 10);
        assert_eq!(activate(25).unwrap().penalty_points, 12);
        assert_eq!(activate(60).unwrap().penalty_points, 30);
    }

    #[test]
    fn test_intensity_tiers() {
        assert_eq!(activate(20).unwrap().intensity, 1);
        assert_eq!(activate(29).unwrap().intensity, 1);
        assert_eq!(activate(30).unwrap().intensity, 2);
        assert_eq!(activate(49).unwrap().intensity, 2);
        assert_eq!(activate(50).unwrap().intensity, 3);
        assert_eq!(activate(100).unwrap().intensity, 3);
    }

    #[test]
    fn test_escape_requires_exactly_three() {
        // 1st and 2nd distinct tasks do not clear
        assert!(!escape_clears(0));
        assert!(!escape_clears(1));
        // 3rd does
        assert!(escape_clears(2));
    }

    #[test]
    fn test_catalog_lookup() {
        let task = find_task("double_workout").unwrap();
        assert_eq!(task.power, 15);
        assert!(find_task("escape_run_2k").is_some());
        assert!(find_task("made_up_task").is_none());
    }

    #[test]
    fn test_escape_prefix_convention() {
        for task in escape_catalog() {
            assert!(is_escape_task(task.id));
            assert_eq!(task.power, 0);
        }
        for task in power_catalog() {
            assert!(!is_escape_task(task.id));
            assert!(task.power > 0);
        }
    }

    #[test]
    fn test_catalog_ids_are_distinct() {
        let mut ids: Vec<&str> = power_catalog()
            .iter()
            .chain(escape_catalog())
            .map(|t| t.id)
            .collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }
}
