use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

use crate::config::Config;
use crate::eid::Eid;
use crate::ideas::{Idea, IdeaCreate, IdeaQuery, IdeaUpdate, Vote};
use crate::offers::{Deal, Offer, OfferCreate, OfferUpdate};
use crate::users::{OauthProfile, UserData, UserType};
use crate::vector::VectorizeReport;
use crate::voice::VoiceSearchOutcome;

use super::errors::AppError;

/// The platform operations, implemented both locally (CSV stores +
/// vector index) and remotely (thin client against a running daemon).
pub trait AppBackend: Send + Sync {
    fn config(&self) -> anyhow::Result<Arc<RwLock<Config>>, AppError>;
    fn update_config(&self, config: Config) -> anyhow::Result<(), AppError>;

    fn search(&self, query: IdeaQuery) -> anyhow::Result<Vec<Idea>, AppError>;
    fn create(&self, idea_create: IdeaCreate) -> anyhow::Result<Idea, AppError>;
    fn update(&self, id: &Eid, idea_update: IdeaUpdate) -> anyhow::Result<Idea, AppError>;
    fn delete(&self, id: &Eid) -> anyhow::Result<(), AppError>;
    fn vote(&self, id: &Eid, vote: Vote) -> anyhow::Result<Idea, AppError>;
    fn total(&self) -> anyhow::Result<usize, AppError>;
    fn industries(&self) -> anyhow::Result<Vec<String>, AppError>;

    /// Store a media file and append its public URL to the idea.
    fn upload_media(&self, id: &Eid, file: Vec<u8>) -> anyhow::Result<Idea, AppError>;

    /// Run the voice pipeline over a finished transcript.
    fn voice_search(&self, transcript: &str) -> anyhow::Result<VoiceSearchOutcome, AppError>;

    /// Re-embed the corpus (or one idea). Returns the report when run
    /// synchronously, None when queued.
    fn vectorize(&self, opts: VectorizeOpts)
        -> anyhow::Result<Option<VectorizeReport>, AppError>;

    fn create_offer(&self, offer_create: OfferCreate) -> anyhow::Result<Offer, AppError>;
    fn update_offer(
        &self,
        id: &Eid,
        offer_update: OfferUpdate,
    ) -> anyhow::Result<Offer, AppError>;
    fn offers_for_idea(&self, idea_id: &Eid) -> anyhow::Result<Vec<Offer>, AppError>;
    fn make_deal(&self, offer_id: &Eid, to_user: &Eid) -> anyhow::Result<Deal, AppError>;
    /// Deals a user participates in, on either side.
    fn deals_for_user(&self, user_id: &Eid) -> anyhow::Result<Vec<Deal>, AppError>;

    fn upsert_oauth_user(
        &self,
        profile: OauthProfile,
        user_type: UserType,
    ) -> anyhow::Result<UserData, AppError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorizeOpts {
    /// Restrict to one idea; None re-embeds the whole corpus.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idea_id: Option<Eid>,

    /// Queue the work instead of running it inline.
    #[serde(default)]
    pub async_run: bool,
}
