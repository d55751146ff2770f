//! Per-type validation rules. Every rule runs; all failures are collected.

use crate::entities::{Category, Comment, Discussion, EntityKind, KbArticle, Section, User, USER_STATES};

/// Result of validating one entity: ok when `problems` is empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Validation {
    pub problems: Vec<String>,
}

impl Validation {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }

    fn require(&mut self, cond: bool, msg: impl Into<String>) {
        if !cond {
            self.problems.push(msg.into());
        }
    }
}

/// Pure validation predicate implemented by every storable entity.
pub trait Validate {
    const KIND: EntityKind;
    fn validate(&self) -> Validation;
}

fn present(v: &Option<String>) -> bool {
    v.as_deref().is_some_and(|s| !s.trim().is_empty())
}

impl Validate for User {
    const KIND: EntityKind = EntityKind::User;

    fn validate(&self) -> Validation {
        let mut v = Validation::default();
        v.require(present(&self.email), "Missing email");
        match self.state.as_deref() {
            None => {}
            Some(s) => v.require(USER_STATES.contains(&s), format!("Invalid state {s:?}")),
        }
        v
    }
}

impl Validate for Category {
    const KIND: EntityKind = EntityKind::Category;

    fn validate(&self) -> Validation {
        let mut v = Validation::default();
        v.require(!self.name.trim().is_empty(), "Missing name");
        v
    }
}

impl Validate for Section {
    const KIND: EntityKind = EntityKind::Section;

    fn validate(&self) -> Validation {
        let mut v = Validation::default();
        v.require(!self.title.trim().is_empty(), "Missing title");
        v
    }
}

impl Validate for Discussion {
    const KIND: EntityKind = EntityKind::Discussion;

    fn validate(&self) -> Validation {
        let mut v = Validation::default();
        v.require(present(&self.author_email), "Missing author_email");
        v.require(!self.comments.is_empty(), "Missing comments");
        for (i, c) in self.comments.iter().enumerate() {
            v.problems.extend(
                comment_problems(c).into_iter().map(|p| format!("Comment {}: {p}", i + 1)),
            );
        }
        v
    }
}

fn comment_problems(c: &Comment) -> Vec<String> {
    let mut v = Validation::default();
    v.require(present(&c.author_email), "Missing author_email");
    v.problems
}

impl Validate for KbArticle {
    const KIND: EntityKind = EntityKind::Kb;

    fn validate(&self) -> Validation {
        let mut v = Validation::default();
        v.require(!self.title.trim().is_empty(), "Missing title");
        v.require(!self.body.trim().is_empty(), "Missing body");
        v
    }
}
