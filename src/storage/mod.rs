//! Storage Layer
//!
//! The hosted datastore is the sole source of truth for contribution
//! records. `supabase` talks PostgREST, `records` holds the model and row
//! mapping, `watch` keeps a display cache fresh off the change feed.

pub mod records;
pub mod supabase;
pub mod watch;

pub use records::{ContributionRecord, NewRecord, RecordPatch, ValidationError};
pub use supabase::{RecordStore, StoreError, SupabaseStore};
pub use watch::{ChangeEvent, ChangeKind, RecordCache};
