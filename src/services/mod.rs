//! Service layer: the `Matcher`, `TaskRuntime` components, credential and
//! cache plumbing, and the MusicBrainz collaborator.

pub mod cache;
pub mod credential_store;
pub mod matcher;
pub mod musicbrainz;
pub mod recovery_sweeper;
pub mod retry;
pub mod task_handler;
pub mod task_store;
pub mod transfer_handler;
pub mod worker_pool;
