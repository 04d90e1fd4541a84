use std::sync::RwLock;

use anyhow::bail;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::{
    config::Config,
    eid::Eid,
    ideas::{self, IdeaQuery},
    offers, users,
    vector::VectorizeReport,
    voice::VoiceSearchOutcome,
    web::TotalResponse,
};

use super::{backend::*, errors::AppError};

pub struct AppRemote {
    remote_addr: String,
    basic_auth: Option<(String, Option<String>)>,
    bearer_token: Option<String>,
}

impl AppRemote {
    pub fn new(
        addr: &str,
        basic_auth: Option<(String, Option<String>)>,
        bearer_token: Option<String>,
    ) -> AppRemote {
        let remote_addr = addr.strip_suffix("/").unwrap_or(addr).to_string();

        AppRemote {
            remote_addr,
            basic_auth,
            bearer_token,
        }
    }

    fn get(&self, url: &str) -> reqwest::blocking::RequestBuilder {
        log::info!("{}{}", self.remote_addr, url);
        let url = format!("{}{}", self.remote_addr, url);

        self.authorize(reqwest::blocking::Client::new().get(&url))
    }

    fn post(&self, url: &str) -> reqwest::blocking::RequestBuilder {
        log::info!("{}{}", self.remote_addr, url);
        let url = format!("{}{}", self.remote_addr, url);

        self.authorize(reqwest::blocking::Client::new().post(&url))
    }

    fn authorize(
        &self,
        builder: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        let builder = match self.basic_auth.clone() {
            Some((username, password)) => builder.basic_auth(username, password),
            None => builder,
        };

        match self.bearer_token.clone() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum WebResponse<T> {
    Error { error: String },
    Data(T),
}

fn handle_response<T>(response: reqwest::blocking::Response) -> anyhow::Result<T>
where
    T: DeserializeOwned + Clone,
{
    let text = response.text()?;

    let web_response = serde_json::from_str::<WebResponse<T>>(&text).map_err(|err| {
        log::error!("{err}. tried to parse: {text:?}");
        err
    })?;

    match web_response {
        WebResponse::Data(data) => Ok(data),
        WebResponse::Error { error } => {
            bail!(error)
        }
    }
}

impl AppBackend for AppRemote {
    fn config(&self) -> anyhow::Result<Arc<RwLock<Config>>, AppError> {
        let resp = self.get("/api/config").send()?;
        Ok(handle_response::<Config>(resp).map(|c| Arc::new(RwLock::new(c)))?)
    }

    fn update_config(&self, config: Config) -> anyhow::Result<(), AppError> {
        let resp = self.post("/api/config").json(&config).send()?;

        handle_response::<Config>(resp)?;
        Ok(())
    }

    fn search(&self, query: IdeaQuery) -> anyhow::Result<Vec<ideas::Idea>, AppError> {
        log::debug!("search: {query:?}");
        let resp = self.post("/api/ideas/search").json(&query).send()?;

        Ok(handle_response(resp)?)
    }

    fn create(&self, idea_create: ideas::IdeaCreate) -> anyhow::Result<ideas::Idea, AppError> {
        let resp = self.post("/api/ideas/create").json(&idea_create).send()?;

        Ok(handle_response(resp)?)
    }

    fn update(
        &self,
        id: &Eid,
        idea_update: ideas::IdeaUpdate,
    ) -> anyhow::Result<ideas::Idea, AppError> {
        let resp = self
            .post("/api/ideas/update")
            .json(&json!({
                "id": id,
                "update": idea_update,
            }))
            .send()?;

        Ok(handle_response(resp)?)
    }

    fn delete(&self, id: &Eid) -> anyhow::Result<(), AppError> {
        let resp = self
            .post("/api/ideas/delete")
            .json(&json!({
                "id": id,
            }))
            .send()?;

        Ok(handle_response(resp)?)
    }

    fn vote(&self, id: &Eid, vote: ideas::Vote) -> anyhow::Result<ideas::Idea, AppError> {
        let resp = self
            .post("/api/ideas/vote")
            .json(&json!({
                "id": id,
                "direction": vote,
            }))
            .send()?;

        Ok(handle_response(resp)?)
    }

    fn total(&self) -> anyhow::Result<usize, AppError> {
        let resp = self.post("/api/ideas/total").send()?;
        let resp = handle_response::<TotalResponse>(resp)?;

        Ok(resp.total)
    }

    fn industries(&self) -> anyhow::Result<Vec<String>, AppError> {
        let resp = self.post("/api/ideas/industries").send()?;

        Ok(handle_response(resp)?)
    }

    fn upload_media(&self, id: &Eid, file: Vec<u8>) -> anyhow::Result<ideas::Idea, AppError> {
        use base64::{engine::general_purpose::STANDARD, Engine as _};

        let resp = self
            .post("/api/ideas/upload_media")
            .json(&json!({
                "id": id,
                "media_b64": STANDARD.encode(file),
            }))
            .send()?;

        Ok(handle_response(resp)?)
    }

    fn voice_search(&self, transcript: &str) -> anyhow::Result<VoiceSearchOutcome, AppError> {
        let resp = self
            .post("/api/voice/search")
            .json(&json!({
                "transcript": transcript,
            }))
            .send()?;

        Ok(handle_response(resp)?)
    }

    fn vectorize(
        &self,
        opts: VectorizeOpts,
    ) -> anyhow::Result<Option<VectorizeReport>, AppError> {
        let resp = self.post("/api/ideas/vectorize").json(&opts).send()?;

        Ok(handle_response(resp)?)
    }

    fn create_offer(
        &self,
        offer_create: offers::OfferCreate,
    ) -> anyhow::Result<offers::Offer, AppError> {
        let resp = self.post("/api/offers/create").json(&offer_create).send()?;

        Ok(handle_response(resp)?)
    }

    fn update_offer(
        &self,
        id: &Eid,
        offer_update: offers::OfferUpdate,
    ) -> anyhow::Result<offers::Offer, AppError> {
        let resp = self
            .post("/api/offers/update")
            .json(&json!({
                "id": id,
                "update": offer_update,
            }))
            .send()?;

        Ok(handle_response(resp)?)
    }

    fn offers_for_idea(&self, idea_id: &Eid) -> anyhow::Result<Vec<offers::Offer>, AppError> {
        let resp = self
            .post("/api/offers/by_idea")
            .json(&json!({
                "idea_id": idea_id,
            }))
            .send()?;

        Ok(handle_response(resp)?)
    }

    fn make_deal(
        &self,
        offer_id: &Eid,
        to_user: &Eid,
    ) -> anyhow::Result<offers::Deal, AppError> {
        let resp = self
            .post("/api/deals/create")
            .json(&json!({
                "offer_id": offer_id,
                "to_user": to_user,
            }))
            .send()?;

        Ok(handle_response(resp)?)
    }

    fn deals_for_user(&self, user_id: &Eid) -> anyhow::Result<Vec<offers::Deal>, AppError> {
        let resp = self
            .post("/api/deals/by_user")
            .json(&json!({
                "user_id": user_id,
            }))
            .send()?;

        Ok(handle_response(resp)?)
    }

    fn upsert_oauth_user(
        &self,
        profile: users::OauthProfile,
        user_type: users::UserType,
    ) -> anyhow::Result<users::UserData, AppError> {
        let resp = self
            .post("/api/users/upsert")
            .json(&json!({
                "profile": profile,
                "user_type": user_type,
            }))
            .send()?;

        Ok(handle_response(resp)?)
    }
}
