//! PartForge Enrichment Engine
//!
//! The chunked streaming enrichment pipeline:
//! 1. Partition a part record set into bounded chunks by eligibility
//! 2. Dispatch chunks concurrently against the classifier
//! 3. Stream protocol events back to the consumer
//! 4. Reconcile returned results into the record set by identity key
//!
//! The same machinery runs twice: once for lifecycle classification over the
//! whole eligible set, and once for replacement lookup over the obsolete
//! subset with a different match-key mapping.

pub mod chunk;
pub mod dispatch;
pub mod event;
pub mod job;
pub mod normalize;
pub mod reconcile;
pub mod replacement;

pub use chunk::{is_eligible, partition, Chunk, ChunkPlan};
pub use dispatch::{Dispatcher, DispatcherSettings};
pub use event::StreamEvent;
pub use job::{EnrichmentJob, JobState};
pub use normalize::{keys_match, normalize, IdentityKey};
pub use reconcile::MergeStats;
pub use replacement::ReplacementJob;
