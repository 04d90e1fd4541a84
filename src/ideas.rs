use crate::eid::Eid;
use crate::filter::{self, IdeaFilter};
use crate::parse_tags;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    hash::Hash,
    io::ErrorKind,
    sync::{Arc, RwLock},
    time::Instant,
};

/// Country/state/suburb strings, one-to-one with an idea.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressDetail {
    pub id: Eid,
    pub country: String,
    pub state: String,
    pub suburb: String,
}

/// A founder-submitted pitch record.
#[derive(Debug, Clone, Eq, Default, Serialize, Deserialize)]
pub struct Idea {
    pub id: Eid,

    pub title: String,
    pub description: String,
    pub created_at: String,

    /// Public URLs of uploaded media, in display order
    pub media: Vec<String>,

    pub upvotes: u64,
    pub downvotes: u64,

    pub industry: String,
    pub tags: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    pub user_id: Eid,

    #[serde(default)]
    pub verified: bool,

    pub address_detail: AddressDetail,
}

impl Hash for Idea {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl PartialEq for Idea {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IdeaCreate {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub industry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    pub user_id: Eid,

    pub country: String,
    pub state: String,
    pub suburb: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IdeaUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub append_tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_tags: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suburb: Option<String>,
}

/// A single vote action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Up,
    Down,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IdeaQuery {
    pub id: Option<Eid>,
    pub title: Option<String>,
    pub location: Option<String>,
    pub industries: Option<Vec<String>>,
    pub user_id: Option<Eid>,

    #[serde(default)]
    pub limit: Option<usize>,
}

impl IdeaQuery {
    pub fn is_match_all(&self) -> bool {
        self.id.is_none()
            && self.title.is_none()
            && self.location.is_none()
            && self.user_id.is_none()
            && self
                .industries
                .as_ref()
                .map(|industries| industries.is_empty())
                .unwrap_or(true)
    }
}

pub trait IdeaManager: Send + Sync {
    /// Search ideas. The result is always ordered by upvotes descending.
    fn search(&self, query: IdeaQuery) -> anyhow::Result<Vec<Idea>>;
    fn get(&self, id: &Eid) -> anyhow::Result<Option<Idea>>;
    fn create(&self, create: IdeaCreate) -> anyhow::Result<Idea>;
    fn update(&self, id: &Eid, update: IdeaUpdate) -> anyhow::Result<Idea>;
    fn delete(&self, id: &Eid) -> anyhow::Result<()>;
    /// Atomic read-modify-write vote increment.
    fn vote(&self, id: &Eid, vote: Vote) -> anyhow::Result<Idea>;
    fn total(&self) -> anyhow::Result<usize>;
    /// Distinct industry tags present in the corpus, sorted.
    fn industries(&self) -> anyhow::Result<Vec<String>>;
}

#[derive(Debug, Clone, Default)]
pub struct BackendCsv {
    list: Arc<RwLock<Vec<Idea>>>,
    path: String,
}

const CSV_HEADERS: [&str; 16] = [
    "id",
    "title",
    "description",
    "created_at",
    "media",
    "upvotes",
    "downvotes",
    "industry",
    "tags",
    "url",
    "user_id",
    "verified",
    "address_id",
    "country",
    "state",
    "suburb",
];

fn field(record: &csv::StringRecord, idx: usize, name: &str) -> anyhow::Result<String> {
    Ok(record
        .get(idx)
        .ok_or(anyhow!("couldnt get record {name}"))?
        .to_string())
}

impl BackendCsv {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        if let Err(err) = std::fs::metadata(path) {
            match err.kind() {
                ErrorKind::NotFound => {
                    log::info!("Creating new idea database at {path}");
                    let mut csv_wrt = csv::Writer::from_path(path)?;
                    csv_wrt.write_record(CSV_HEADERS)?;
                    csv_wrt.flush()?;
                }
                _ => Err(err)?,
            }
        }

        let now = Instant::now();
        let mut csv_reader = csv::Reader::from_path(path)?;
        let iter = csv_reader.records();

        let mut ideas = vec![];
        for record in iter {
            let record = record?;

            let media = field(&record, 4, "media")?;
            let url = field(&record, 9, "url")?;

            let idea = Idea {
                id: field(&record, 0, "id")?.into(),
                title: field(&record, 1, "title")?,
                description: field(&record, 2, "description")?,
                created_at: field(&record, 3, "created_at")?,
                media: media.split_whitespace().map(String::from).collect(),
                upvotes: field(&record, 5, "upvotes")?.parse::<u64>()?,
                downvotes: field(&record, 6, "downvotes")?.parse::<u64>()?,
                industry: field(&record, 7, "industry")?,
                tags: parse_tags(field(&record, 8, "tags")?),
                url: if url.is_empty() { None } else { Some(url) },
                user_id: field(&record, 10, "user_id")?.into(),
                verified: field(&record, 11, "verified")? == "true",
                address_detail: AddressDetail {
                    id: field(&record, 12, "address_id")?.into(),
                    country: field(&record, 13, "country")?,
                    state: field(&record, 14, "state")?,
                    suburb: field(&record, 15, "suburb")?,
                },
            };

            ideas.push(idea);
        }

        log::debug!(
            "took {}ms to read ideas csv",
            now.elapsed().as_micros() as f64 / 1000.0
        );

        let mgr = BackendCsv {
            list: Arc::new(RwLock::new(ideas)),
            path: path.to_string(),
        };

        Ok(mgr)
    }

    pub fn save(&self) {
        let ideas = self.list.write().expect("idea store lock poisoned");

        let temp_path = format!("{}-tmp", &self.path);
        let mut csv_wrt = csv::Writer::from_path(&temp_path).expect("writable idea database");
        csv_wrt.write_record(CSV_HEADERS).expect("csv header");
        for idea in ideas.iter() {
            csv_wrt
                .write_record([
                    idea.id.as_str(),
                    &idea.title,
                    &idea.description,
                    &idea.created_at,
                    &idea.media.join(" "),
                    &idea.upvotes.to_string(),
                    &idea.downvotes.to_string(),
                    &idea.industry,
                    &idea.tags.join(","),
                    idea.url.as_deref().unwrap_or_default(),
                    idea.user_id.as_str(),
                    if idea.verified { "true" } else { "false" },
                    idea.address_detail.id.as_str(),
                    &idea.address_detail.country,
                    &idea.address_detail.state,
                    &idea.address_detail.suburb,
                ])
                .expect("csv record");
        }
        csv_wrt.flush().expect("csv flush");
        std::fs::rename(&temp_path, &self.path).expect("csv rename");
    }

    fn apply_update(idea: &mut Idea, update: IdeaUpdate) {
        if let Some(title) = update.title {
            idea.title = title;
        }
        if let Some(description) = update.description {
            idea.description = description;
        }
        if let Some(industry) = update.industry {
            idea.industry = industry;
        }

        if let Some(tags) = update.tags {
            idea.tags = tags;
            let mut seen = HashSet::new();
            idea.tags.retain(|item| seen.insert(item.clone()));
        }

        if let Some(delete_tags) = update.remove_tags {
            idea.tags.retain(|item| !delete_tags.iter().any(|t| t == item));
        }

        if let Some(mut tags) = update.append_tags {
            idea.tags.append(&mut tags);
            let mut seen = HashSet::new();
            idea.tags.retain(|item| seen.insert(item.clone()));
        }

        if let Some(url) = update.url {
            idea.url = if url.is_empty() { None } else { Some(url) };
        }
        if let Some(media) = update.media {
            idea.media = media;
        }
        if let Some(verified) = update.verified {
            idea.verified = verified;
        }
        if let Some(country) = update.country {
            idea.address_detail.country = country;
        }
        if let Some(state) = update.state {
            idea.address_detail.state = state;
        }
        if let Some(suburb) = update.suburb {
            idea.address_detail.suburb = suburb;
        }
    }
}

impl IdeaManager for BackendCsv {
    fn create(&self, idea_create: IdeaCreate) -> anyhow::Result<Idea> {
        let mut idea_create = idea_create;
        if let Some(ref mut tags) = idea_create.tags {
            let mut seen = HashSet::new();
            tags.retain(|item| seen.insert(item.clone()));
        };

        let idea = Idea {
            id: Eid::new(),
            title: idea_create.title,
            description: idea_create.description.unwrap_or_default(),
            created_at: chrono::Utc::now().to_rfc3339(),
            media: vec![],
            upvotes: 0,
            downvotes: 0,
            industry: idea_create.industry,
            tags: idea_create.tags.unwrap_or_default(),
            url: idea_create.url,
            user_id: idea_create.user_id,
            verified: false,
            address_detail: AddressDetail {
                id: Eid::new(),
                country: idea_create.country,
                state: idea_create.state,
                suburb: idea_create.suburb,
            },
        };

        self.list
            .write()
            .expect("idea store lock poisoned")
            .push(idea.clone());

        self.save();

        Ok(idea)
    }

    fn get(&self, id: &Eid) -> anyhow::Result<Option<Idea>> {
        let ideas = self.list.read().expect("idea store lock poisoned");
        Ok(ideas.iter().find(|idea| &idea.id == id).cloned())
    }

    fn delete(&self, id: &Eid) -> anyhow::Result<()> {
        let mut ideas = self.list.write().expect("idea store lock poisoned");
        let result = ideas.iter().position(|idea| &idea.id == id).map(|idx| {
            ideas.remove(idx);
        });

        drop(ideas);

        if result.is_some() {
            self.save();
        }

        Ok(())
    }

    fn update(&self, id: &Eid, idea_update: IdeaUpdate) -> anyhow::Result<Idea> {
        let mut ideas = self.list.write().expect("idea store lock poisoned");

        let idea_idx = ideas
            .iter()
            .position(|idea| &idea.id == id)
            .ok_or_else(|| anyhow!("Idea with id {} not found", id))?;

        Self::apply_update(&mut ideas[idea_idx], idea_update);

        let result = ideas[idea_idx].clone();
        drop(ideas);

        self.save();

        Ok(result)
    }

    fn vote(&self, id: &Eid, vote: Vote) -> anyhow::Result<Idea> {
        // Read-modify-write under the write lock. No lost updates
        // between concurrent voters on this process.
        let mut ideas = self.list.write().expect("idea store lock poisoned");

        let idea = ideas
            .iter_mut()
            .find(|idea| &idea.id == id)
            .ok_or_else(|| anyhow!("Idea with id {} not found", id))?;

        match vote {
            Vote::Up => idea.upvotes += 1,
            Vote::Down => idea.downvotes += 1,
        }

        let result = idea.clone();
        drop(ideas);

        self.save();

        Ok(result)
    }

    fn total(&self) -> anyhow::Result<usize> {
        Ok(self.list.read().expect("idea store lock poisoned").len())
    }

    fn industries(&self) -> anyhow::Result<Vec<String>> {
        let ideas = self.list.read().expect("idea store lock poisoned");
        let mut industries: Vec<String> = ideas
            .iter()
            .map(|idea| idea.industry.to_lowercase())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        industries.sort();
        Ok(industries)
    }

    fn search(&self, query: IdeaQuery) -> anyhow::Result<Vec<Idea>> {
        let ideas = self.list.read().expect("idea store lock poisoned");

        let mut output: Vec<Idea> = if query.is_match_all() {
            ideas.clone()
        } else {
            let idea_filter = IdeaFilter {
                query: query.title.clone().unwrap_or_default(),
                location: query
                    .location
                    .clone()
                    .unwrap_or_else(|| filter::ALL_LOCATIONS.to_string()),
                industries: query.industries.clone().unwrap_or_default(),
            };

            ideas
                .iter()
                .filter(|idea| {
                    if let Some(id) = &query.id {
                        if &idea.id != id {
                            return false;
                        }
                    }
                    if let Some(user_id) = &query.user_id {
                        if &idea.user_id != user_id {
                            return false;
                        }
                    }
                    idea_filter.matches(idea)
                })
                .cloned()
                .collect()
        };

        filter::sort_by_upvotes(&mut output);

        if let Some(limit) = query.limit {
            output.truncate(limit);
        }

        Ok(output)
    }
}
