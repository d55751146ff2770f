//! Records as the source helpdesk API returns them, and their canonical shapes.
//!
//! Decoding is lenient: unknown fields are ignored and missing or `null` ones
//! default, so a record that lacks something required reaches the store and gets
//! reported there. A record whose fields have the wrong type fails `decode`; the
//! exporter reports it and moves on.

use crate::entities::{Category, Comment, User};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub const USER_PATH: &str = "users/{id}.json";
pub const USERS_TEMPLATE: &str = "users.json?page=%d";
pub const FORUMS_PATH: &str = "forums.json";
pub const ENTRIES_TEMPLATE: &str = "forums/{id}/entries.json?page=%d";
pub const POSTS_TEMPLATE: &str = "entries/{id}/posts.json?page=%d";
pub const POSTS_KEY: &str = "posts";
pub const OPEN_TICKETS_TEMPLATE: &str =
    "search.json?query=type:ticket+status:open+status:pending+status:new&page=%d";

/// Substitute a record id into one of the path constants above.
pub fn path_for(template: &str, id: u64) -> String {
    template.replace("{id}", &id.to_string())
}

/// `null` decodes like a missing field.
fn nullable<'de, D, T>(d: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// Decode one raw record; `what` names it in the error.
pub fn decode<T: DeserializeOwned>(value: &Value, what: &str) -> Result<T> {
    T::deserialize(value).with_context(|| format!("decode {what} record"))
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RemoteUser {
    pub id: Option<u64>,
    pub email: Option<String>,
    pub name: Option<String>,
    /// 0 = end user, anything else = agent/admin.
    #[serde(deserialize_with = "nullable")]
    pub roles: i64,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl RemoteUser {
    pub fn state(&self) -> &'static str {
        if self.roles == 0 { "user" } else { "support" }
    }

    pub fn to_user(&self) -> User {
        User {
            email: self.email.clone(),
            name: self.name.clone(),
            state: Some(self.state().to_string()),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RemoteForum {
    pub id: Option<u64>,
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    pub description: Option<String>,
}

impl RemoteForum {
    pub fn to_category(&self) -> Category {
        Category {
            name: self.name.clone(),
            summary: self.description.clone().filter(|s| !s.trim().is_empty()),
        }
    }
}

/// A forum entry: the opening post of a discussion.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RemoteEntry {
    pub id: Option<u64>,
    #[serde(deserialize_with = "nullable")]
    pub title: String,
    #[serde(deserialize_with = "nullable")]
    pub body: String,
    pub submitter_id: Option<u64>,
    pub is_public: Option<bool>,
    pub is_locked: Option<bool>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl RemoteEntry {
    pub fn state(&self) -> Option<String> {
        self.is_locked.filter(|l| *l).map(|_| "closed".to_string())
    }
    pub fn private(&self) -> Option<bool> {
        self.is_public.map(|p| !p)
    }
}

/// A reply inside an entry.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RemotePost {
    #[serde(deserialize_with = "nullable")]
    pub body: String,
    pub user_id: Option<u64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RemoteTicket {
    pub nice_id: Option<u64>,
    pub subject: Option<String>,
    pub description: Option<String>,
    pub requester_id: Option<u64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub comments: Vec<RemoteTicketComment>,
}

impl RemoteTicket {
    /// Subject, else the first line of the description, else the ticket number.
    pub fn title(&self) -> String {
        if let Some(s) = self.subject.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            return s.to_string();
        }
        if let Some(line) = self
            .description
            .as_deref()
            .and_then(|d| d.lines().map(str::trim).find(|l| !l.is_empty()))
        {
            return line.to_string();
        }
        match self.nice_id {
            Some(n) => format!("Ticket #{n}"),
            None => "Ticket".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RemoteTicketComment {
    pub author_id: Option<u64>,
    #[serde(deserialize_with = "nullable")]
    pub value: String,
    pub created_at: Option<String>,
}

impl RemoteTicketComment {
    pub fn to_comment(&self, author_email: Option<String>) -> Comment {
        Comment {
            body: self.value.trim().to_string(),
            author_email,
            created_at: self.created_at.clone(),
            updated_at: self.created_at.clone(),
        }
    }
}
