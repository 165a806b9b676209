//! ActivityStreams shapes for users and posts.

use serde_json::{Value, json};

use super::{FederationBridge, rfc3339};
use crate::models::post::Visibility;
use crate::models::{post, tenant, user};

pub const ACTIVITY_STREAMS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";
pub const PUBLIC_COLLECTION: &str = "https://www.w3.org/ns/activitystreams#Public";
pub const ACTIVITY_JSON: &str = "application/activity+json";

pub struct ActivityPubMapper<'a> {
    bridge: &'a FederationBridge,
}

impl<'a> ActivityPubMapper<'a> {
    pub fn new(bridge: &'a FederationBridge) -> Self {
        Self { bridge }
    }

    pub fn actor_id(&self, tenant: &tenant::Model, user: &user::Model) -> String {
        format!("{}/users/{}", self.bridge.tenant_root(tenant), user.id)
    }

    pub fn note_id(&self, tenant: &tenant::Model, post: &post::Model) -> String {
        format!("{}/posts/{}", self.bridge.tenant_root(tenant), post.id)
    }

    pub fn person(&self, tenant: &tenant::Model, user: &user::Model) -> Value {
        let id = self.actor_id(tenant, user);
        json!({
            "@context": ACTIVITY_STREAMS_CONTEXT,
            "type": "Person",
            "id": id,
            "preferredUsername": preferred_username(user),
            "name": user.name,
            "inbox": format!("{id}/inbox"),
            "outbox": format!("{id}/outbox"),
            "followers": format!("{id}/followers"),
            "url": id,
        })
    }

    fn note_body(&self, tenant: &tenant::Model, post: &post::Model, author: &user::Model) -> Value {
        let actor = self.actor_id(tenant, author);
        let followers = format!("{actor}/followers");
        let (to, cc) = if post.visibility == Visibility::Public.as_str() {
            (vec![PUBLIC_COLLECTION.to_string()], vec![followers])
        } else {
            (vec![followers], Vec::new())
        };

        json!({
            "type": "Note",
            "id": self.note_id(tenant, post),
            "attributedTo": actor,
            "content": super::escape_html(&post.content),
            "published": post.published_at.map(rfc3339),
            "to": to,
            "cc": cc,
        })
    }

    pub fn note(&self, tenant: &tenant::Model, post: &post::Model, author: &user::Model) -> Value {
        let mut note = self.note_body(tenant, post, author);
        if let Value::Object(map) = &mut note {
            map.insert("@context".to_string(), json!(ACTIVITY_STREAMS_CONTEXT));
        }
        note
    }

    /// `Create` activity wrapping the post's note.
    pub fn create_activity(
        &self,
        tenant: &tenant::Model,
        post: &post::Model,
        author: &user::Model,
    ) -> Value {
        let note = self.note_body(tenant, post, author);
        json!({
            "@context": ACTIVITY_STREAMS_CONTEXT,
            "type": "Create",
            "id": format!("{}/activity", self.note_id(tenant, post)),
            "actor": self.actor_id(tenant, author),
            "published": note["published"].clone(),
            "to": note["to"].clone(),
            "cc": note["cc"].clone(),
            "object": note,
        })
    }

    /// `OrderedCollection` of `Create` activities, newest first.
    pub fn outbox(&self, tenant: &tenant::Model, author: &user::Model, posts: &[post::Model]) -> Value {
        let items: Vec<Value> = posts
            .iter()
            .map(|post| self.create_activity(tenant, post, author))
            .collect();

        json!({
            "@context": ACTIVITY_STREAMS_CONTEXT,
            "type": "OrderedCollection",
            "id": format!("{}/outbox", self.actor_id(tenant, author)),
            "totalItems": items.len(),
            "orderedItems": items,
        })
    }
}

/// Local part of the email, reduced to characters safe in a handle.
fn preferred_username(user: &user::Model) -> String {
    let local = user.email.split('@').next().unwrap_or_default();
    let handle: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
        .collect();
    if handle.is_empty() {
        user.id.simple().to_string()
    } else {
        handle.to_lowercase()
    }
}
