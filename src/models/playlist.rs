//! `Playlist`, the cross-provider entity a transfer reads from and writes to.

use serde::{Deserialize, Serialize};

use super::track::Track;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Playlist {
    pub service_id: String,
    pub service_name: String,
    pub name: String,
    pub description: Option<String>,
    pub tracks: Vec<Track>,
}
