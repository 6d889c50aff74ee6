//! Group endpoints
//!
//! ## Endpoints
//!
//! - `POST /api/groups` - Create a group (creator auto-joins)
//! - `GET /api/groups` - List groups
//! - `POST /api/groups/{id}/join` - Join a group
//! - `POST /api/groups/{id}/leave` - Leave a group
//! - `GET /api/groups/{id}/members` - List members

use bson::{doc, DateTime};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::schemas::{
    GroupDoc, GroupMemberDoc, UserDoc, GROUP_COLLECTION, GROUP_MEMBER_COLLECTION, USER_COLLECTION,
};
use crate::routes::util::{
    app_error_response, claims_user_id, error_response, json_response, parse_json_body,
    parse_object_id, require_auth, require_mongo, FullBody,
};
use crate::server::AppState;
use crate::types::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResponse {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_by: String,
    pub member_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMemberEntry {
    pub user_id: String,
    pub display_name: String,
    pub avatar_emoji: String,
    pub total_points: i64,
}

/// Main handler for /api/groups* routes
pub async fn handle_groups_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<FullBody> {
    let method = req.method().clone();
    let subpath = path.strip_prefix("/api/groups").unwrap_or("");

    match (method, subpath) {
        (Method::POST, "") | (Method::POST, "/") => handle_create(req, state).await,
        (Method::GET, "") | (Method::GET, "/") => handle_list(req, state).await,

        (Method::POST, p) if p.ends_with("/join") => {
            let id = p
                .strip_prefix('/')
                .and_then(|s| s.strip_suffix("/join"))
                .unwrap_or("");
            handle_join(req, state, id).await
        }
        (Method::POST, p) if p.ends_with("/leave") => {
            let id = p
                .strip_prefix('/')
                .and_then(|s| s.strip_suffix("/leave"))
                .unwrap_or("");
            handle_leave(req, state, id).await
        }
        (Method::GET, p) if p.ends_with("/members") => {
            let id = p
                .strip_prefix('/')
                .and_then(|s| s.strip_suffix("/members"))
                .unwrap_or("");
            handle_members(req, state, id).await
        }

        _ => error_response(StatusCode::NOT_FOUND, "Not found", None),
    }
}

/// POST /api/groups
async fn handle_create(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let body: CreateGroupRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return app_error_response(&e),
    };

    if body.name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Group name is required", None);
    }

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let groups = match mongo.collection::<GroupDoc>(GROUP_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };
    let members = match mongo.collection::<GroupMemberDoc>(GROUP_MEMBER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let mut group = GroupDoc::new(body.name.trim().to_string(), user_id);
    group.description = body.description;
    group.member_count = 1;

    let name = group.name.clone();
    let description = group.description.clone();

    let group_id = match groups.insert_one(group).await {
        Ok(id) => id,
        Err(e) => return app_error_response(&e),
    };

    // The creator is the first member
    if let Err(e) = members.insert_one(GroupMemberDoc::new(group_id, user_id)).await {
        return app_error_response(&e);
    }

    json_response(
        StatusCode::CREATED,
        &GroupResponse {
            id: group_id.to_hex(),
            name,
            description,
            created_by: user_id.to_hex(),
            member_count: 1,
        },
    )
}

/// GET /api/groups
async fn handle_list(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    if let Err(resp) = require_auth(&req, &state) {
        return resp;
    }

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let groups = match mongo.collection::<GroupDoc>(GROUP_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let docs = match groups.find_many(doc! {}).await {
        Ok(d) => d,
        Err(e) => return app_error_response(&e),
    };

    let list: Vec<GroupResponse> = docs
        .iter()
        .map(|g| GroupResponse {
            id: g._id.map(|id| id.to_hex()).unwrap_or_default(),
            name: g.name.clone(),
            description: g.description.clone(),
            created_by: g.created_by.to_hex(),
            member_count: g.member_count,
        })
        .collect();

    json_response(StatusCode::OK, &list)
}

/// POST /api/groups/{id}/join
async fn handle_join(
    req: Request<Incoming>,
    state: Arc<AppState>,
    group_id: &str,
) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let group_oid = match parse_object_id(group_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let groups = match mongo.collection::<GroupDoc>(GROUP_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };
    match groups.find_one(doc! { "_id": group_oid }).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Group not found", None),
        Err(e) => return app_error_response(&e),
    }

    let members = match mongo.collection::<GroupMemberDoc>(GROUP_MEMBER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    match members.insert_one(GroupMemberDoc::new(group_oid, user_id)).await {
        Ok(_) => {}
        Err(AppError::Conflict(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                "Already a member of this group",
                Some("ALREADY_MEMBER"),
            )
        }
        Err(e) => return app_error_response(&e),
    }

    if let Err(e) = groups
        .update_one(
            doc! { "_id": group_oid },
            doc! {
                "$inc": { "member_count": 1 },
                "$set": { "metadata.updated_at": DateTime::now() },
            },
        )
        .await
    {
        return app_error_response(&e);
    }

    json_response(
        StatusCode::CREATED,
        &serde_json::json!({ "success": true, "groupId": group_oid.to_hex() }),
    )
}

/// POST /api/groups/{id}/leave
async fn handle_leave(
    req: Request<Incoming>,
    state: Arc<AppState>,
    group_id: &str,
) -> Response<FullBody> {
    let claims = match require_auth(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let group_oid = match parse_object_id(group_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let members = match mongo.collection::<GroupMemberDoc>(GROUP_MEMBER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let deleted = match members
        .delete_many(doc! { "group_id": group_oid, "user_id": user_id })
        .await
    {
        Ok(r) => r,
        Err(e) => return app_error_response(&e),
    };

    if deleted.deleted_count == 0 {
        return error_response(
            StatusCode::NOT_FOUND,
            "Not a member of this group",
            Some("NOT_MEMBER"),
        );
    }

    let groups = match mongo.collection::<GroupDoc>(GROUP_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };
    if let Err(e) = groups
        .update_one(
            doc! { "_id": group_oid, "member_count": { "$gt": 0 } },
            doc! {
                "$inc": { "member_count": -1 },
                "$set": { "metadata.updated_at": DateTime::now() },
            },
        )
        .await
    {
        return app_error_response(&e);
    }

    json_response(
        StatusCode::OK,
        &serde_json::json!({ "success": true, "groupId": group_oid.to_hex() }),
    )
}

/// GET /api/groups/{id}/members
async fn handle_members(
    req: Request<Incoming>,
    state: Arc<AppState>,
    group_id: &str,
) -> Response<FullBody> {
    if let Err(resp) = require_auth(&req, &state) {
        return resp;
    }
    let group_oid = match parse_object_id(group_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let mongo = match require_mongo(&state) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let members = match mongo.collection::<GroupMemberDoc>(GROUP_MEMBER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let rows = match members.find_many(doc! { "group_id": group_oid }).await {
        Ok(r) => r,
        Err(e) => return app_error_response(&e),
    };

    let users = match mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return app_error_response(&e),
    };

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let user = match users.find_one(doc! { "_id": row.user_id }).await {
            Ok(Some(u)) => u,
            Ok(None) => continue,
            Err(e) => return app_error_response(&e),
        };
        entries.push(GroupMemberEntry {
            user_id: row.user_id.to_hex(),
            display_name: user.display_name,
            avatar_emoji: user.avatar_emoji,
            total_points: user.total_points,
        });
    }

    json_response(StatusCode::OK, &entries)
}
