//! HTTP routes for StreakWars

pub mod auth_routes;
pub mod challenges;
pub mod flavor;
pub mod friends;
pub mod groups;
pub mod habits;
pub mod health;
pub mod rewards;
pub mod users;
pub mod util;
pub mod wars;

pub use auth_routes::handle_auth_request;
pub use challenges::handle_challenges_request;
pub use flavor::handle_flavor_request;
pub use friends::handle_friends_request;
pub use groups::handle_groups_request;
pub use habits::handle_habits_request;
pub use health::{health_check, readiness_check, version_info};
pub use rewards::handle_rewards_request;
pub use users::handle_users_request;
pub use wars::handle_wars_request;
