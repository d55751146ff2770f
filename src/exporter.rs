//! Export pipeline: users, then forums with their discussions, then open tickets,
//! then packaging. Stages run one after another on the calling thread.

use crate::archiver::Archiver;
use crate::config::{ExportOptions, TextMode};
use crate::entities::{Category, Comment, Discussion, EntityKind};
use crate::fetcher::{Fetcher, HttpTransport, Transport};
use crate::progress::ProgressScope;
use crate::remote::{
    decode, path_for, RemoteEntry, RemoteForum, RemotePost, RemoteTicket, RemoteUser, ENTRIES_TEMPLATE,
    FORUMS_PATH, OPEN_TICKETS_TEMPLATE, POSTS_KEY, POSTS_TEMPLATE, USERS_TEMPLATE, USER_PATH,
};
use crate::session::ExportSession;
use crate::store::{ArchiveStore, Outcome};
use crate::text::{CommandExtractor, TagStripExtractor, TextExtractor};
use crate::util::init_tracing_once;
use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// Name of the category open tickets are filed under.
pub const TICKETS_CATEGORY: &str = "Tickets";

/// Build the configured body converter. A command converter must be installed.
pub fn build_extractor(mode: &TextMode) -> Result<Box<dyn TextExtractor>> {
    match mode {
        TextMode::Builtin => Ok(Box::new(TagStripExtractor)),
        TextMode::Command { program, args } => {
            let extractor = CommandExtractor::new(program.clone()).with_args(args.iter().cloned());
            let found = extractor.ensure_available()?;
            info!("converting bodies with {}", found.display());
            Ok(Box::new(extractor))
        }
    }
}

pub struct Exporter<T: Transport> {
    fetcher: Fetcher<T>,
    store: ArchiveStore,
    extractor: Box<dyn TextExtractor>,
    // remote user id -> email, filled by the user stage and on-demand lookups;
    // None marks an id whose lookup failed or had no email
    authors: HashMap<u64, Option<String>>,
    include_tickets: bool,
    progress: bool,
}

impl Exporter<HttpTransport> {
    /// Wire up a live export from options. Checks prerequisites before any request
    /// is made.
    pub fn from_options(opts: &ExportOptions) -> Result<Self> {
        init_tracing_once();
        for (name, value) in [("subdomain", &opts.subdomain), ("email", &opts.email), ("password", &opts.password)] {
            if value.trim().is_empty() {
                return Err(anyhow!("{name} is required"));
            }
        }
        let extractor = build_extractor(&opts.text)?;
        let transport =
            HttpTransport::new(&opts.api_base_url(), &opts.email, &opts.password, opts.request_timeout)?;
        let fetcher = Fetcher::new(transport)
            .with_throttle_wait(opts.throttle_wait)
            .with_max_throttle_retries(opts.max_throttle_retries);
        let session = ExportSession::create(opts.site(), &opts.work_dir, &opts.out_dir, opts.write_mode)?;
        info!(
            "exporting {} from {} into {}",
            opts.site(),
            opts.api_base_url(),
            session.export_dir().display()
        );
        Ok(Self::new(fetcher, ArchiveStore::new(session), extractor)
            .with_tickets(opts.include_tickets)
            .with_progress(opts.progress))
    }
}

impl<T: Transport> Exporter<T> {
    pub fn new(fetcher: Fetcher<T>, store: ArchiveStore, extractor: Box<dyn TextExtractor>) -> Self {
        Self {
            fetcher,
            store,
            extractor,
            authors: HashMap::new(),
            include_tickets: true,
            progress: false,
        }
    }

    pub fn with_tickets(mut self, yes: bool) -> Self {
        self.include_tickets = yes;
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }

    pub fn store(&self) -> &ArchiveStore {
        &self.store
    }
    pub fn fetcher(&self) -> &Fetcher<T> {
        &self.fetcher
    }

    /// Run every stage and package the result. On error nothing is packaged;
    /// call `discard` to remove the partial export dir.
    pub fn run(&mut self, archiver: &dyn Archiver) -> Result<PathBuf> {
        self.export_users().context("exporting users")?;
        self.export_categories().context("exporting forums")?;
        if self.include_tickets {
            self.export_tickets().context("exporting open tickets")?;
        }
        let archive = self.store.write_archive(archiver)?;
        info!(
            "export of {} finished: {} requests, {} throttle waits, {} report lines",
            self.store.session().site(),
            self.fetcher.requests(),
            self.fetcher.throttle_waits(),
            self.store.report().len()
        );
        Ok(archive)
    }

    pub fn discard(&mut self) -> Result<()> {
        self.store.discard()
    }

    /// Stage 1. Also seeds the author cache.
    pub fn export_users(&mut self) -> Result<()> {
        let pb = ProgressScope::stage("Users", self.progress);
        let records = self.fetcher.fetch_paginated(USERS_TEMPLATE, None)?;
        info!("fetched {} users", records.len());
        for raw in records {
            let Some(remote) = self.decode_or_report::<RemoteUser>(&raw, EntityKind::User, "user") else {
                continue;
            };
            if let Some(id) = remote.id {
                let email = remote.email.clone().filter(|e| !e.trim().is_empty());
                self.authors.insert(id, email);
            }
            self.store.add_user(remote.to_user())?;
            pb.inc(1);
        }
        pb.finish("users done");
        Ok(())
    }

    /// Stage 2. One category per forum; one discussion per forum entry.
    pub fn export_categories(&mut self) -> Result<()> {
        let pb = ProgressScope::stage("Forums", self.progress);
        let forums = self.fetcher.fetch_list(FORUMS_PATH, None)?;
        info!("fetched {} forums", forums.len());
        for raw in forums {
            let Some(forum) = self.decode_or_report::<RemoteForum>(&raw, EntityKind::Category, "forum") else {
                continue;
            };
            let Some(forum_id) = forum.id else {
                self.store.reject_undecodable(EntityKind::Category, "missing forum id", &raw);
                continue;
            };
            let entries_path = path_for(ENTRIES_TEMPLATE, forum_id);
            let key = match self.store.add_category(forum.to_category())? {
                Outcome::Stored(key) => key,
                Outcome::Rejected(_) => {
                    // entries are counted, not mapped: their posts are never fetched
                    let entries = self.fetcher.fetch_paginated(&entries_path, None)?;
                    let reason = format!("entries of rejected forum {forum_id}");
                    self.store.skip_children(EntityKind::Discussion, entries.len() as u64, &reason);
                    continue;
                }
            };
            pb.set_message(format!("Forum {}", forum.name));
            let entries = self.fetcher.fetch_paginated(&entries_path, None)?;
            for raw in entries {
                let Some(entry) = self.decode_or_report::<RemoteEntry>(&raw, EntityKind::Discussion, "entry")
                else {
                    continue;
                };
                let Some(entry_id) = entry.id else {
                    self.store.reject_undecodable(EntityKind::Discussion, "missing entry id", &raw);
                    continue;
                };
                if let Some(discussion) = self.entry_discussion(entry_id, &entry)? {
                    self.store.add_discussion(Some(&key), discussion)?;
                }
                pb.inc(1);
            }
        }
        pb.finish("forums done");
        Ok(())
    }

    /// Stage 3. Open, pending and new tickets become discussions in one extra category.
    pub fn export_tickets(&mut self) -> Result<()> {
        let records = self.fetcher.fetch_paginated(OPEN_TICKETS_TEMPLATE, None)?;
        if records.is_empty() {
            info!("no open tickets");
            return Ok(());
        }
        info!("fetched {} open tickets", records.len());
        let pb = ProgressScope::stage("Tickets", self.progress);
        let category = Category {
            name: TICKETS_CATEGORY.to_string(),
            summary: Some("Open tickets".to_string()),
        };
        let Some(key) = self.store.add_category(category)?.stored() else {
            return Err(anyhow!("the {TICKETS_CATEGORY} category was rejected"));
        };
        for raw in records {
            let Some(ticket) = self.decode_or_report::<RemoteTicket>(&raw, EntityKind::Discussion, "ticket") else {
                continue;
            };
            let discussion = self.ticket_discussion(&ticket);
            self.store.add_discussion(Some(&key), discussion)?;
            pb.inc(1);
        }
        pb.finish("tickets done");
        Ok(())
    }

    /// Email for a remote user id: cache first, then a one-off lookup. Each id is
    /// looked up at most once; a failed lookup is cached as `None` and the entity
    /// gets reported downstream.
    pub fn author_email(&mut self, id: Option<u64>) -> Option<String> {
        let id = id?;
        if let Some(known) = self.authors.get(&id) {
            return known.clone();
        }
        let email = match self.lookup_user(id) {
            Ok(Some(email)) => Some(email),
            Ok(None) => {
                warn!("user {id} has no email");
                None
            }
            Err(e) => {
                warn!("lookup of user {id} failed: {e:#}");
                None
            }
        };
        self.authors.insert(id, email.clone());
        email
    }

    // -------- mapping --------

    /// Decode a raw record; one that does not decode is reported under `kind` and skipped.
    fn decode_or_report<R: DeserializeOwned>(&mut self, raw: &Value, kind: EntityKind, what: &str) -> Option<R> {
        match decode(raw, what) {
            Ok(record) => Some(record),
            Err(e) => {
                self.store.reject_undecodable(kind, &format!("{e:#}"), raw);
                None
            }
        }
    }

    fn lookup_user(&mut self, id: u64) -> Result<Option<String>> {
        let value = match self.fetcher.fetch_page(&path_for(USER_PATH, id), None)? {
            Value::Object(mut m) if m.get("user").is_some_and(Value::is_object) => {
                m.remove("user").unwrap_or(Value::Null)
            }
            v => v,
        };
        let user: RemoteUser = decode(&value, "user")?;
        Ok(user.email.filter(|e| !e.trim().is_empty()))
    }

    /// `None` when one of the entry's posts does not decode; that is reported here.
    fn entry_discussion(&mut self, entry_id: u64, entry: &RemoteEntry) -> Result<Option<Discussion>> {
        let author = self.author_email(entry.submitter_id);
        let mut comments = vec![Comment {
            body: self.plain_text(&entry.body)?,
            author_email: author.clone(),
            created_at: entry.created_at.clone(),
            updated_at: entry.updated_at.clone(),
        }];

        let posts = self
            .fetcher
            .fetch_paginated(&path_for(POSTS_TEMPLATE, entry_id), Some(POSTS_KEY))?;
        for raw in posts {
            let post: RemotePost = match decode(&raw, "post") {
                Ok(post) => post,
                Err(e) => {
                    let reason = format!("post of entry {entry_id}: {e:#}");
                    self.store.reject_undecodable(EntityKind::Discussion, &reason, &raw);
                    return Ok(None);
                }
            };
            comments.push(Comment {
                body: self.plain_text(&post.body)?,
                author_email: self.author_email(post.user_id),
                created_at: post.created_at.clone(),
                updated_at: post.updated_at.clone(),
            });
        }

        Ok(Some(Discussion {
            title: entry.title.clone(),
            author_email: author,
            state: entry.state(),
            private: entry.private(),
            created_at: entry.created_at.clone(),
            updated_at: entry.updated_at.clone(),
            comments,
        }))
    }

    fn ticket_discussion(&mut self, ticket: &RemoteTicket) -> Discussion {
        let mut comments = Vec::with_capacity(ticket.comments.len());
        for c in &ticket.comments {
            let email = self.author_email(c.author_id);
            comments.push(c.to_comment(email));
        }
        Discussion {
            title: ticket.title(),
            author_email: self.author_email(ticket.requester_id),
            state: None,
            private: Some(true),
            created_at: ticket.created_at.clone(),
            updated_at: ticket.updated_at.clone(),
            comments,
        }
    }

    fn plain_text(&self, html: &str) -> Result<String> {
        if html.trim().is_empty() {
            return Ok(String::new());
        }
        self.extractor.extract_plain_text(html)
    }
}
