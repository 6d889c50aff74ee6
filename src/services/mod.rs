//! Services: the coin ledger, outbound integrations, and background tasks

pub mod expiry;
pub mod flavor;
pub mod ledger;
pub mod mailer;
pub mod search;
pub mod speech;

pub use expiry::spawn_war_expiry_task;
pub use flavor::{FlavorService, FlavorStyle};
pub use mailer::MailerService;
pub use search::SearchService;
pub use speech::SpeechService;
