//! Friendship and group document schemas

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for friendships
pub const FRIENDSHIP_COLLECTION: &str = "friendships";

/// Collection name for groups
pub const GROUP_COLLECTION: &str = "groups";

/// Collection name for group members
pub const GROUP_MEMBER_COLLECTION: &str = "group_members";

/// Friendship request state
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FriendshipStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
}

/// A directed friendship request between two users
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FriendshipDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// User who sent the request
    pub requester_id: ObjectId,

    /// User who received the request
    pub addressee_id: ObjectId,

    /// Current state
    #[serde(default)]
    pub status: FriendshipStatus,
}

impl FriendshipDoc {
    pub fn new(requester_id: ObjectId, addressee_id: ObjectId) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            requester_id,
            addressee_id,
            status: FriendshipStatus::Pending,
        }
    }
}

impl IntoIndexes for FriendshipDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // One row per ordered pair; the reverse direction is checked
            // at request time
            (
                doc! { "requester_id": 1, "addressee_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("friendship_pair_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "addressee_id": 1, "status": 1 },
                Some(
                    IndexOptions::builder()
                        .name("friendship_addressee_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for FriendshipDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// A user-created group
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GroupDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Group name
    pub name: String,

    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Creating user
    pub created_by: ObjectId,

    /// Denormalized member count for list views
    #[serde(default)]
    pub member_count: i64,
}

impl GroupDoc {
    pub fn new(name: String, created_by: ObjectId) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            name,
            description: None,
            created_by,
            member_count: 0,
        }
    }
}

impl IntoIndexes for GroupDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "created_by": 1 },
            Some(
                IndexOptions::builder()
                    .name("group_creator_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for GroupDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// Group membership row
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GroupMemberDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Parent group
    pub group_id: ObjectId,

    /// Member user
    pub user_id: ObjectId,
}

impl GroupMemberDoc {
    pub fn new(group_id: ObjectId, user_id: ObjectId) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            group_id,
            user_id,
        }
    }
}

impl IntoIndexes for GroupMemberDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "group_id": 1, "user_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("group_member_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for GroupMemberDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
