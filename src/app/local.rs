use crate::{
    ai::ChatClient,
    config::Config,
    eid::Eid,
    ideas::{self, IdeaQuery},
    offers,
    storage::{self, public_url, BackendLocal},
    users,
    vector::{VectorSearchError, VectorSearchService, VectorizeReport},
    voice::{
        CancelToken, CommandInterpreter, EmbedQuery, PipelineOpts, SearchSimilar, VoiceError,
        VoicePipeline, VoiceSearchOutcome,
    },
};

use super::factory::AppPaths;
use super::task_runner::{self, Status, Task};
use anyhow::anyhow;
use std::sync::{mpsc, Arc, RwLock};

use super::{backend::*, errors::AppError};

pub struct AppLocal {
    pub idea_mgr: Arc<dyn ideas::IdeaManager>,
    pub offer_book: Arc<dyn offers::OfferBook>,
    pub user_store: Arc<dyn users::UserStore>,
    pub storage_mgr: Arc<dyn storage::StorageManager>,

    vector: Arc<VectorSearchService>,

    task_tx: Option<Arc<mpsc::Sender<Task>>>,
    task_queue_handle: Option<std::thread::JoinHandle<()>>,

    config: Arc<RwLock<Config>>,
}

impl AppLocal {
    pub fn new(
        config: Arc<RwLock<Config>>,
        paths: &AppPaths,
        storage_mgr: BackendLocal,
    ) -> anyhow::Result<Self> {
        let idea_mgr = Arc::new(ideas::BackendCsv::load(&paths.ideas_path)?);
        let offer_book = Arc::new(offers::BackendCsv::load(
            &paths.offers_path,
            &paths.deals_path,
        )?);
        let user_store = Arc::new(users::BackendCsv::load(&paths.users_path)?);
        let storage_mgr = Arc::new(storage_mgr);

        let ai_config = config.read().expect("config lock poisoned").ai.clone();
        let vector = Arc::new(VectorSearchService::new(
            &ai_config,
            std::path::PathBuf::from(&paths.base_path),
        ));

        idea_mgr.save();

        Ok(Self {
            idea_mgr,
            offer_book,
            user_store,
            storage_mgr,
            vector,
            task_tx: None,
            task_queue_handle: None,
            config,
        })
    }

    pub fn run_queue(&mut self) {
        let (task_tx, task_rx) = mpsc::channel::<Task>();

        let handle = std::thread::spawn({
            let idea_mgr = self.idea_mgr.clone();
            let user_store = self.user_store.clone();
            let vector = self.vector.clone();
            let config = self.config.clone();

            let mut queue_dump = task_runner::read_queue_dump();
            let task_list = queue_dump.queue.clone();

            queue_dump.queue = Vec::new();
            task_runner::write_queue_dump(&queue_dump);

            std::thread::spawn({
                let task_tx = task_tx.clone();

                move || {
                    for task in task_list {
                        if let Status::Done = task.status {
                            continue;
                        }

                        log::info!("restarting interrupted task \"{:?}\"", task.task);
                        if let Err(err) = task_tx.send(task.task) {
                            log::error!("failed to initialize interrupted task: {err:?}");
                        }
                    }
                }
            });

            move || {
                task_runner::start_queue(task_rx, idea_mgr, user_store, vector, config);
            }
        });

        self.task_queue_handle = Some(handle);
        self.task_tx = Some(Arc::new(task_tx));
    }

    pub fn wait_task_queue_finish(&mut self) {
        if let Some(handle) = self.task_queue_handle.take() {
            if let Err(err) = handle.join() {
                log::error!("task queue panicked: {err:?}");
            }
        }
    }

    pub fn shutdown(&self) {
        if let Some(task_tx) = self.task_tx.as_ref() {
            if let Err(err) = task_tx.send(Task::Shutdown) {
                log::error!("{err}");
            }
        }
    }

    fn schedule_vectorize(&self, idea_id: Option<Eid>) {
        match self.task_tx.as_ref() {
            Some(task_tx) => {
                if let Err(err) = task_tx.send(Task::Vectorize { idea_id }) {
                    log::error!("failed to queue vectorize task: {err:?}");
                }
            }
            // standalone CLI runs without the queue; embeddings catch up
            // on the next vectorize pass
            None => log::debug!("no task queue running, skipping background vectorize"),
        }
    }
}

/// EmbedQuery adapter over the vector service.
struct QueryEmbedder<'a>(&'a VectorSearchService);

impl EmbedQuery for QueryEmbedder<'_> {
    fn embed_query(&self, value: &str) -> Result<Vec<f32>, VoiceError> {
        self.0.embed_query(value).map_err(|err| match err {
            VectorSearchError::Ai(ai) => VoiceError::Ai(ai),
            other => VoiceError::Search(other.to_string()),
        })
    }
}

/// SearchSimilar adapter: index hits resolved back to idea records,
/// preserving similarity order. Ids the store no longer knows are
/// dropped.
struct LocalSearcher<'a> {
    vector: &'a VectorSearchService,
    idea_mgr: &'a dyn ideas::IdeaManager,
}

impl SearchSimilar for LocalSearcher<'_> {
    fn search_similar(
        &self,
        embedding: &[f32],
        threshold: f32,
        match_count: usize,
    ) -> Result<Vec<ideas::Idea>, VoiceError> {
        let hits = self
            .vector
            .search(embedding, threshold, match_count)
            .map_err(|err| VoiceError::Search(err.to_string()))?;

        let mut result = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.idea_mgr.get(&hit.id) {
                Ok(Some(idea)) => result.push(idea),
                Ok(None) => log::warn!("vector hit {} has no idea row", hit.id),
                Err(err) => return Err(VoiceError::Search(err.to_string())),
            }
        }

        Ok(result)
    }
}

impl AppBackend for AppLocal {
    fn config(&self) -> anyhow::Result<Arc<RwLock<Config>>, AppError> {
        Ok(self.config.clone())
    }

    fn update_config(&self, config: Config) -> anyhow::Result<(), AppError> {
        *self.config.write().expect("config lock poisoned") = config;
        Ok(())
    }

    fn search(&self, query: IdeaQuery) -> anyhow::Result<Vec<ideas::Idea>, AppError> {
        let mut query = query;

        if query.title.clone().unwrap_or_default().is_empty() {
            query.title = None;
        };
        if query.location.clone().unwrap_or_default().is_empty() {
            query.location = None;
        };

        Ok(self.idea_mgr.search(query)?)
    }

    fn create(&self, idea_create: ideas::IdeaCreate) -> anyhow::Result<ideas::Idea, AppError> {
        let idea = self.idea_mgr.create(idea_create)?;

        self.schedule_vectorize(Some(idea.id.clone()));

        Ok(idea)
    }

    fn update(
        &self,
        id: &Eid,
        idea_update: ideas::IdeaUpdate,
    ) -> anyhow::Result<ideas::Idea, AppError> {
        let idea = self.idea_mgr.update(id, idea_update).map_err(|err| {
            if err.to_string().contains("not found") {
                AppError::NotFound
            } else {
                AppError::Other(err)
            }
        })?;

        // content may have changed; refresh its embedding
        self.schedule_vectorize(Some(idea.id.clone()));

        Ok(idea)
    }

    fn delete(&self, id: &Eid) -> anyhow::Result<(), AppError> {
        self.idea_mgr
            .get(id)?
            .ok_or(AppError::NotFound)?;

        self.idea_mgr.delete(id)?;

        if let Err(err) = self.vector.remove_idea(id) {
            log::error!("failed to drop vector for {id}: {err}");
        }

        Ok(())
    }

    fn vote(&self, id: &Eid, vote: ideas::Vote) -> anyhow::Result<ideas::Idea, AppError> {
        self.idea_mgr.vote(id, vote).map_err(|err| {
            if err.to_string().contains("not found") {
                AppError::NotFound
            } else {
                AppError::Other(err)
            }
        })
    }

    fn total(&self) -> anyhow::Result<usize, AppError> {
        Ok(self.idea_mgr.total()?)
    }

    fn industries(&self) -> anyhow::Result<Vec<String>, AppError> {
        Ok(self.idea_mgr.industries()?)
    }

    fn upload_media(&self, id: &Eid, file: Vec<u8>) -> anyhow::Result<ideas::Idea, AppError> {
        self.idea_mgr
            .get(id)?
            .ok_or(AppError::NotFound)?;

        let media_id = Eid::new().to_string();
        self.storage_mgr.write(&media_id, &file)?;

        let idea = self.idea_mgr.get(id)?.ok_or(AppError::NotFound)?;
        let mut media = idea.media.clone();
        media.push(public_url(&media_id));

        Ok(self.idea_mgr.update(
            id,
            ideas::IdeaUpdate {
                media: Some(media),
                ..Default::default()
            },
        )?)
    }

    fn voice_search(&self, transcript: &str) -> anyhow::Result<VoiceSearchOutcome, AppError> {
        let config = self.config.read().expect("config lock poisoned");
        let opts = PipelineOpts {
            similarity_threshold: config.voice.similarity_threshold,
            match_count: config.voice.match_count,
        };
        let chat = ChatClient::new(&config.ai);
        drop(config);

        let interpreter = CommandInterpreter::new(chat);
        let embedder = QueryEmbedder(self.vector.as_ref());
        let searcher = LocalSearcher {
            vector: self.vector.as_ref(),
            idea_mgr: self.idea_mgr.as_ref(),
        };

        let pipeline = VoicePipeline::new(&interpreter, &embedder, &searcher, opts);
        Ok(pipeline.run(transcript, &CancelToken::new())?)
    }

    fn vectorize(
        &self,
        opts: VectorizeOpts,
    ) -> anyhow::Result<Option<VectorizeReport>, AppError> {
        if opts.async_run {
            self.schedule_vectorize(opts.idea_id);
            return Ok(None);
        }

        let query = IdeaQuery {
            id: opts.idea_id.clone(),
            ..Default::default()
        };
        let ideas = self.idea_mgr.search(query)?;

        if opts.idea_id.is_some() && ideas.is_empty() {
            return Err(AppError::NotFound);
        }

        let user_store = self.user_store.clone();
        let founder_of = |user_id: &Eid| {
            user_store
                .get(user_id)
                .map_err(|err| log::error!("founder lookup failed: {err}"))
                .ok()
                .flatten()
        };

        let report = self.vector.vectorize(&ideas, founder_of)?;
        Ok(Some(report))
    }

    fn create_offer(
        &self,
        offer_create: offers::OfferCreate,
    ) -> anyhow::Result<offers::Offer, AppError> {
        self.idea_mgr
            .get(&offer_create.idea_id)?
            .ok_or(AppError::NotFound)?;

        if !offers::OFFER_KINDS.contains(&offer_create.kind.as_str()) {
            return Err(AppError::Other(anyhow!(
                "unknown offer kind {:?}",
                offer_create.kind
            )));
        }

        Ok(self.offer_book.create_offer(offer_create)?)
    }

    fn update_offer(
        &self,
        id: &Eid,
        offer_update: offers::OfferUpdate,
    ) -> anyhow::Result<offers::Offer, AppError> {
        self.offer_book.update_offer(id, offer_update).map_err(|err| {
            if err.to_string().contains("not found") {
                AppError::NotFound
            } else {
                AppError::Other(err)
            }
        })
    }

    fn offers_for_idea(&self, idea_id: &Eid) -> anyhow::Result<Vec<offers::Offer>, AppError> {
        Ok(self.offer_book.offers_for_idea(idea_id)?)
    }

    fn make_deal(
        &self,
        offer_id: &Eid,
        to_user: &Eid,
    ) -> anyhow::Result<offers::Deal, AppError> {
        self.offer_book
            .get_offer(offer_id)?
            .ok_or(AppError::NotFound)?;

        Ok(self.offer_book.record_deal(offer_id, to_user)?)
    }

    fn deals_for_user(&self, user_id: &Eid) -> anyhow::Result<Vec<offers::Deal>, AppError> {
        Ok(self.offer_book.deals_for_user(user_id)?)
    }

    fn upsert_oauth_user(
        &self,
        profile: users::OauthProfile,
        user_type: users::UserType,
    ) -> anyhow::Result<users::UserData, AppError> {
        let (user, outcome) = self.user_store.upsert_oauth(&profile, user_type)?;
        log::debug!("oauth upsert for {}: {outcome:?}", user.email);
        Ok(user)
    }
}

impl AppLocal {
    #[cfg(test)]
    pub fn new_with(
        idea_mgr: Arc<dyn ideas::IdeaManager>,
        offer_book: Arc<dyn offers::OfferBook>,
        user_store: Arc<dyn users::UserStore>,
        storage_mgr: Arc<dyn storage::StorageManager>,
        vector: Arc<VectorSearchService>,
        config: Arc<RwLock<Config>>,
    ) -> Self {
        Self {
            idea_mgr,
            offer_book,
            user_store,
            storage_mgr,
            vector,
            task_tx: None,
            task_queue_handle: None,
            config,
        }
    }
}
