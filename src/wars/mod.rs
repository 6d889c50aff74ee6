//! War and sabotage domain rules
//!
//! Pure logic, shared by every handler that touches a war. Persistence
//! lives in `crate::db`, HTTP in `crate::routes::wars`.

pub mod rules;
pub mod sabotage;

pub use rules::{acceptance_deadline, Settlement, WarStatus};
pub use sabotage::{
    activate, escape_catalog, escape_clears, find_task, is_escape_task, power_catalog,
    Activation, SabotageTask, ACTIVATION_THRESHOLD, ESCAPE_TASKS_REQUIRED,
};
