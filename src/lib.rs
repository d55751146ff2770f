mod config;
mod error;
mod keys;
mod entities;
mod validate;
mod session;
mod json_file;
mod store;

mod fetcher;
mod remote;
mod text;
mod archiver;
mod progress;
mod util;
mod exporter;

pub use crate::config::{ExportOptions, TextMode};
pub use crate::error::ExportError;
pub use crate::session::{ExportSession, WriteMode};

// Key generator and validator (pure).
pub use crate::keys::{normalize, CategoryKey, SectionKey};
pub use crate::entities::{Category, Comment, Discussion, EntityKind, KbArticle, Section, User, USER_STATES};
pub use crate::validate::{Validate, Validation};

// Archive store.
pub use crate::store::{ArchiveStore, Outcome, Stats};

// Remote side: fetcher, transports and API record shapes.
pub use crate::fetcher::{Fetcher, HttpTransport, RawResponse, Transport, DEFAULT_THROTTLE_WAIT, PAGE_PLACEHOLDER, THROTTLE_STATUS};
pub use crate::remote::{RemoteEntry, RemoteForum, RemotePost, RemoteTicket, RemoteTicketComment, RemoteUser};

// Pluggable collaborators.
pub use crate::text::{CommandExtractor, TagStripExtractor, TextExtractor};
pub use crate::archiver::{Archiver, TarArchiver};

pub use crate::exporter::{build_extractor, Exporter, TICKETS_CATEGORY};
pub use crate::progress::ProgressScope;
pub use crate::util::init_tracing_once;
