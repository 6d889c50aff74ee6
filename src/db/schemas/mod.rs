//! Database schemas for StreakWars
//!
//! Defines MongoDB document structures for users, habits, challenges, wars,
//! friendships, groups, and the rewards ledger.

mod challenge;
mod habit;
mod metadata;
mod rewards;
mod social;
mod user;
mod war;

pub use challenge::{
    ChallengeDoc, ChallengeParticipantDoc, CHALLENGE_COLLECTION, PARTICIPANT_COLLECTION,
};
pub use habit::{HabitCompletionDoc, HabitDoc, COMPLETION_COLLECTION, HABIT_COLLECTION};
pub use metadata::Metadata;
pub use rewards::{RewardsTransactionDoc, TransactionKind, REWARDS_COLLECTION};
pub use social::{
    FriendshipDoc, FriendshipStatus, GroupDoc, GroupMemberDoc, FRIENDSHIP_COLLECTION,
    GROUP_COLLECTION, GROUP_MEMBER_COLLECTION,
};
pub use user::{UserDoc, USER_COLLECTION};
pub use war::{
    SabotageCompletionDoc, WarDoc, SABOTAGE_COMPLETION_COLLECTION, WAR_COLLECTION,
};
