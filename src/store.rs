//! Archive Store: validates, keys, numbers and persists entities for one export run.
//!
//! Layout under the session's export dir:
//!
//! ```text
//! users/<normalized-email>.json
//! categories/<id>.json
//! categories/<id>/<n>.json      discussions, n = 1, 2, 3, ...
//! sections/<id>.json
//! sections/<id>/<n>.json        kb articles, n = 1, 2, 3, ...
//! ```
//!
//! Write-through and buffered mode produce the same bytes at the same paths.

use crate::archiver::Archiver;
use crate::entities::{Category, Discussion, EntityKind, KbArticle, Section, User};
use crate::error::ExportError;
use crate::json_file::{to_json_line, write_bytes_file};
use crate::keys::{normalize, CategoryKey, SectionKey};
use crate::session::{ExportSession, WriteMode};
use crate::util::{remove_dir_with_backoff, remove_with_backoff};
use crate::validate::Validate;
use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

/// Outcome of an add operation that did not hit a fatal error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome<T> {
    Stored(T),
    /// Dropped for data-quality reasons; the problems are also in the report.
    Rejected(Vec<String>),
}

impl<T> Outcome<T> {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored(_))
    }
    pub fn stored(self) -> Option<T> {
        match self {
            Self::Stored(v) => Some(v),
            Self::Rejected(_) => None,
        }
    }
    pub fn problems(&self) -> &[String] {
        match self {
            Self::Stored(_) => &[],
            Self::Rejected(p) => p,
        }
    }
}

/// Accepted counts per entity type (`user`, `discussion`, ...), rejected counts
/// under `invalid:<type>` and children dropped with their parent under `skipped:<type>`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats(BTreeMap<String, u64>);

impl Stats {
    fn bump(&mut self, key: String) {
        self.add(key, 1);
    }
    fn add(&mut self, key: String, n: u64) {
        *self.0.entry(key).or_insert(0) += n;
    }
    pub fn get(&self, key: &str) -> u64 {
        self.0.get(key).copied().unwrap_or(0)
    }
    pub fn accepted(&self, kind: EntityKind) -> u64 {
        self.get(kind.as_str())
    }
    pub fn invalid(&self, kind: EntityKind) -> u64 {
        self.get(&format!("invalid:{kind}"))
    }
    pub fn skipped(&self, kind: EntityKind) -> u64 {
        self.get(&format!("skipped:{kind}"))
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in &self.0 {
            writeln!(f, "{k}: {v}")?;
        }
        Ok(())
    }
}

pub struct ArchiveStore {
    session: ExportSession,
    // parent key -> number of children stored so far
    categories: HashMap<CategoryKey, u64>,
    sections: HashMap<SectionKey, u64>,
    // buffered mode only, in acceptance order
    pending: Vec<(PathBuf, Vec<u8>)>,
    report: Vec<String>,
    stats: Stats,
    finished: bool,
}

impl ArchiveStore {
    pub fn new(session: ExportSession) -> Self {
        Self {
            session,
            categories: HashMap::new(),
            sections: HashMap::new(),
            pending: Vec::new(),
            report: Vec::new(),
            stats: Stats::default(),
            finished: false,
        }
    }

    pub fn session(&self) -> &ExportSession {
        &self.session
    }

    /// Every problem seen so far (rejected, undecodable or skipped), in encounter order.
    pub fn report(&self) -> &[String] {
        &self.report
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Defaults `state` to `"user"` when the caller left it out.
    pub fn add_user(&mut self, mut user: User) -> Result<Outcome<User>> {
        if user.state.is_none() {
            user.state = Some("user".to_string());
        }
        if let Some(problems) = self.check(&user) {
            return Ok(Outcome::Rejected(problems));
        }
        let email = user.email.as_deref().unwrap_or_default();
        let rel = PathBuf::from("users").join(format!("{}.json", normalize(email)));
        self.persist(rel, &user)?;
        self.stats.bump(EntityKind::User.to_string());
        Ok(Outcome::Stored(user))
    }

    /// Returns the key discussions attach to. A colliding id overwrites the category
    /// file but keeps its discussion numbering.
    pub fn add_category(&mut self, category: Category) -> Result<Outcome<CategoryKey>> {
        if let Some(problems) = self.check(&category) {
            return Ok(Outcome::Rejected(problems));
        }
        let key = CategoryKey::from_name(&category.name);
        if self.categories.contains_key(&key) {
            tracing::warn!("category {key} collides with an earlier category; overwriting");
        }
        let rel = PathBuf::from("categories").join(format!("{}.json", key.id()));
        self.persist(rel, &category)?;
        self.categories.entry(key.clone()).or_insert(0);
        self.stats.bump(EntityKind::Category.to_string());
        Ok(Outcome::Stored(key))
    }

    pub fn add_section(&mut self, section: Section) -> Result<Outcome<SectionKey>> {
        if let Some(problems) = self.check(&section) {
            return Ok(Outcome::Rejected(problems));
        }
        let key = SectionKey::from_title(&section.title);
        if self.sections.contains_key(&key) {
            tracing::warn!("section {key} collides with an earlier section; overwriting");
        }
        let rel = PathBuf::from("sections").join(format!("{}.json", key.id()));
        self.persist(rel, &section)?;
        self.sections.entry(key.clone()).or_insert(0);
        self.stats.bump(EntityKind::Section.to_string());
        Ok(Outcome::Stored(key))
    }

    /// Stores the discussion as the next number under `category`; returns that number.
    /// A missing or unknown category key is fatal.
    pub fn add_discussion(
        &mut self,
        category: Option<&CategoryKey>,
        discussion: Discussion,
    ) -> Result<Outcome<u64>> {
        let key = category.ok_or(ExportError::MissingParent { kind: "discussion", parent: "category" })?;
        if !self.categories.contains_key(key) {
            return Err(ExportError::UnknownParent { kind: "discussion", key: key.to_string() }.into());
        }
        if let Some(problems) = self.check(&discussion) {
            return Ok(Outcome::Rejected(problems));
        }
        let n = self.categories.get(key).copied().unwrap_or(0) + 1;
        let rel = PathBuf::from("categories").join(key.id()).join(format!("{n}.json"));
        self.persist(rel, &discussion)?;
        self.categories.insert(key.clone(), n);
        self.stats.bump(EntityKind::Discussion.to_string());
        Ok(Outcome::Stored(n))
    }

    pub fn add_kb(&mut self, section: Option<&SectionKey>, article: KbArticle) -> Result<Outcome<u64>> {
        let key = section.ok_or(ExportError::MissingParent { kind: "kb article", parent: "section" })?;
        if !self.sections.contains_key(key) {
            return Err(ExportError::UnknownParent { kind: "kb article", key: key.to_string() }.into());
        }
        if let Some(problems) = self.check(&article) {
            return Ok(Outcome::Rejected(problems));
        }
        let n = self.sections.get(key).copied().unwrap_or(0) + 1;
        let rel = PathBuf::from("sections").join(key.id()).join(format!("{n}.json"));
        self.persist(rel, &article)?;
        self.sections.insert(key.clone(), n);
        self.stats.bump(EntityKind::Kb.to_string());
        Ok(Outcome::Stored(n))
    }

    /// Record a raw remote record that could not be decoded into a `kind` entity.
    /// It is reported and counted like any other rejected entity.
    pub fn reject_undecodable(&mut self, kind: EntityKind, reason: &str, raw: &Value) {
        self.report.push(format!("Invalid {kind}: Undecodable record ({reason}): {raw}"));
        tracing::warn!(kind = %kind, reason, "undecodable record");
        self.stats.bump(format!("invalid:{kind}"));
    }

    /// Record `count` children of a rejected parent that were never offered to the store.
    pub fn skip_children(&mut self, kind: EntityKind, count: u64, reason: &str) {
        self.report.push(format!("Skipped {count} {kind}: {reason}"));
        tracing::warn!(kind = %kind, count, reason, "skipped children");
        self.stats.add(format!("skipped:{kind}"), count);
    }

    /// Flush buffered entities, package the export dir into the session's archive path
    /// and remove the export dir. Returns the archive path.
    pub fn write_archive(&mut self, archiver: &dyn Archiver) -> Result<PathBuf> {
        if self.finished {
            return Err(anyhow!("archive for {} was already written", self.session.site()));
        }
        self.flush_pending()?;

        let dest = self.session.archive_path().to_path_buf();
        let packaged = match archiver.package(self.session.export_dir(), &dest) {
            Ok(p) => p,
            Err(e) => {
                remove_with_backoff(&dest)?;
                return Err(e);
            }
        };
        remove_dir_with_backoff(self.session.export_dir())?;
        self.finished = true;
        tracing::info!("wrote archive {}", packaged.display());
        Ok(packaged)
    }

    /// Abandon the run: drop buffered entities and remove the export dir without packaging.
    pub fn discard(&mut self) -> Result<()> {
        self.pending.clear();
        if !self.finished {
            remove_dir_with_backoff(self.session.export_dir())?;
            self.finished = true;
        }
        Ok(())
    }

    // -------- internals --------

    /// Problems when invalid (already reported and counted), None when ok.
    fn check<E: Validate + Serialize>(&mut self, entity: &E) -> Option<Vec<String>> {
        let validation = entity.validate();
        if validation.is_ok() {
            return None;
        }
        let kind = E::KIND;
        let raw = serde_json::to_string(entity).unwrap_or_else(|_| "<unprintable>".to_string());
        for p in &validation.problems {
            self.report.push(format!("Invalid {kind}: {p}: {raw}"));
        }
        tracing::warn!(kind = %kind, problems = ?validation.problems, "rejected entity");
        self.stats.bump(format!("invalid:{kind}"));
        Some(validation.problems)
    }

    fn persist<T: Serialize>(&mut self, rel: PathBuf, entity: &T) -> Result<()> {
        if self.finished {
            return Err(anyhow!("export for {} is already finalized", self.session.site()));
        }
        let bytes = to_json_line(entity)?;
        match self.session.mode() {
            WriteMode::WriteThrough => write_bytes_file(&self.session.export_dir().join(&rel), &bytes),
            WriteMode::Buffered => {
                self.pending.push((rel, bytes));
                Ok(())
            }
        }
    }

    fn flush_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        tracing::info!("flushing {} buffered entities", self.pending.len());
        let root: &Path = self.session.export_dir();
        for (rel, bytes) in &self.pending {
            write_bytes_file(&root.join(rel), bytes)?;
        }
        self.pending.clear();
        Ok(())
    }
}
