use crate::eid::Eid;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::{
    io::ErrorKind,
    sync::{Arc, RwLock},
};

/// Offer kinds a founder can attach to an idea.
pub const OFFER_KINDS: [&str; 4] = ["Commission", "Fixed Price", "Equity", "Revenue Share"];

/// A monetizable proposal attached to one idea.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: Eid,
    pub idea_id: Eid,
    pub user_id: Eid,

    pub kind: String,
    pub description: String,
    pub commission: f32,
    pub active: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_code: Option<String>,

    pub deal_counts: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OfferCreate {
    pub idea_id: Eid,
    pub user_id: Eid,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub commission: f32,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_code: Option<String>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OfferUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_code: Option<String>,
}

/// Acceptance of an offer by a distributor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: Eid,
    pub offer_id: Eid,
    /// The offer owner
    pub from_user: Eid,
    /// The accepting distributor
    pub to_user: Eid,
    pub status: bool,
    pub created_at: String,
}

pub trait OfferBook: Send + Sync {
    fn create_offer(&self, create: OfferCreate) -> anyhow::Result<Offer>;
    fn update_offer(&self, id: &Eid, update: OfferUpdate) -> anyhow::Result<Offer>;
    fn get_offer(&self, id: &Eid) -> anyhow::Result<Option<Offer>>;
    fn offers_for_idea(&self, idea_id: &Eid) -> anyhow::Result<Vec<Offer>>;
    fn offers_for_user(&self, user_id: &Eid) -> anyhow::Result<Vec<Offer>>;
    /// Insert a deal and increment the parent offer's deal count,
    /// both under the same write lock.
    fn record_deal(&self, offer_id: &Eid, to_user: &Eid) -> anyhow::Result<Deal>;
    fn deals_for_user(&self, user_id: &Eid) -> anyhow::Result<Vec<Deal>>;
}

const OFFER_HEADERS: [&str; 9] = [
    "id",
    "idea_id",
    "user_id",
    "kind",
    "description",
    "commission",
    "active",
    "payment_link",
    "promotion_code",
];

const DEAL_HEADERS: [&str; 6] = [
    "id",
    "offer_id",
    "from_user",
    "to_user",
    "status",
    "created_at",
];

/// CSV-backed offer and deal store. Deal counts are derived from the
/// deal rows on load rather than stored redundantly.
#[derive(Debug, Clone, Default)]
pub struct BackendCsv {
    offers: Arc<RwLock<Vec<Offer>>>,
    deals: Arc<RwLock<Vec<Deal>>>,
    offers_path: String,
    deals_path: String,
}

fn ensure_csv(path: &str, headers: &[&str]) -> anyhow::Result<()> {
    if let Err(err) = std::fs::metadata(path) {
        match err.kind() {
            ErrorKind::NotFound => {
                let mut csv_wrt = csv::Writer::from_path(path)?;
                csv_wrt.write_record(headers)?;
                csv_wrt.flush()?;
            }
            _ => Err(err)?,
        }
    }
    Ok(())
}

fn field(record: &csv::StringRecord, idx: usize, name: &str) -> anyhow::Result<String> {
    Ok(record
        .get(idx)
        .ok_or(anyhow!("couldnt get record {name}"))?
        .to_string())
}

impl BackendCsv {
    pub fn load(offers_path: &str, deals_path: &str) -> anyhow::Result<Self> {
        ensure_csv(offers_path, &OFFER_HEADERS)?;
        ensure_csv(deals_path, &DEAL_HEADERS)?;

        let mut offers = vec![];
        let mut csv_reader = csv::Reader::from_path(offers_path)?;
        for record in csv_reader.records() {
            let record = record?;
            let payment_link = field(&record, 7, "payment_link")?;
            let promotion_code = field(&record, 8, "promotion_code")?;

            offers.push(Offer {
                id: field(&record, 0, "id")?.into(),
                idea_id: field(&record, 1, "idea_id")?.into(),
                user_id: field(&record, 2, "user_id")?.into(),
                kind: field(&record, 3, "kind")?,
                description: field(&record, 4, "description")?,
                commission: field(&record, 5, "commission")?.parse::<f32>()?,
                active: field(&record, 6, "active")? == "true",
                payment_link: (!payment_link.is_empty()).then_some(payment_link),
                promotion_code: (!promotion_code.is_empty()).then_some(promotion_code),
                deal_counts: 0,
            });
        }

        let mut deals = vec![];
        let mut csv_reader = csv::Reader::from_path(deals_path)?;
        for record in csv_reader.records() {
            let record = record?;
            deals.push(Deal {
                id: field(&record, 0, "id")?.into(),
                offer_id: field(&record, 1, "offer_id")?.into(),
                from_user: field(&record, 2, "from_user")?.into(),
                to_user: field(&record, 3, "to_user")?.into(),
                status: field(&record, 4, "status")? == "true",
                created_at: field(&record, 5, "created_at")?,
            });
        }

        // derive deal counters
        for offer in offers.iter_mut() {
            offer.deal_counts = deals.iter().filter(|d| d.offer_id == offer.id).count() as u64;
        }

        Ok(BackendCsv {
            offers: Arc::new(RwLock::new(offers)),
            deals: Arc::new(RwLock::new(deals)),
            offers_path: offers_path.to_string(),
            deals_path: deals_path.to_string(),
        })
    }

    fn save_offers(&self) {
        let offers = self.offers.read().expect("offer store lock poisoned");

        let temp_path = format!("{}-tmp", &self.offers_path);
        let mut csv_wrt = csv::Writer::from_path(&temp_path).expect("writable offer database");
        csv_wrt.write_record(OFFER_HEADERS).expect("csv header");
        for offer in offers.iter() {
            csv_wrt
                .write_record([
                    offer.id.as_str(),
                    offer.idea_id.as_str(),
                    offer.user_id.as_str(),
                    &offer.kind,
                    &offer.description,
                    &offer.commission.to_string(),
                    if offer.active { "true" } else { "false" },
                    offer.payment_link.as_deref().unwrap_or_default(),
                    offer.promotion_code.as_deref().unwrap_or_default(),
                ])
                .expect("csv record");
        }
        csv_wrt.flush().expect("csv flush");
        std::fs::rename(&temp_path, &self.offers_path).expect("csv rename");
    }

    fn save_deals(&self) {
        let deals = self.deals.read().expect("deal store lock poisoned");

        let temp_path = format!("{}-tmp", &self.deals_path);
        let mut csv_wrt = csv::Writer::from_path(&temp_path).expect("writable deal database");
        csv_wrt.write_record(DEAL_HEADERS).expect("csv header");
        for deal in deals.iter() {
            csv_wrt
                .write_record([
                    deal.id.as_str(),
                    deal.offer_id.as_str(),
                    deal.from_user.as_str(),
                    deal.to_user.as_str(),
                    if deal.status { "true" } else { "false" },
                    &deal.created_at,
                ])
                .expect("csv record");
        }
        csv_wrt.flush().expect("csv flush");
        std::fs::rename(&temp_path, &self.deals_path).expect("csv rename");
    }
}

impl OfferBook for BackendCsv {
    fn create_offer(&self, create: OfferCreate) -> anyhow::Result<Offer> {
        let offer = Offer {
            id: Eid::new(),
            idea_id: create.idea_id,
            user_id: create.user_id,
            kind: create.kind,
            description: create.description.unwrap_or_default(),
            commission: create.commission,
            active: create.active,
            payment_link: create.payment_link,
            promotion_code: create.promotion_code,
            deal_counts: 0,
        };

        self.offers
            .write()
            .expect("offer store lock poisoned")
            .push(offer.clone());

        self.save_offers();

        Ok(offer)
    }

    fn update_offer(&self, id: &Eid, update: OfferUpdate) -> anyhow::Result<Offer> {
        let mut offers = self.offers.write().expect("offer store lock poisoned");

        let offer = offers
            .iter_mut()
            .find(|offer| &offer.id == id)
            .ok_or_else(|| anyhow!("Offer with id {} not found", id))?;

        if let Some(kind) = update.kind {
            offer.kind = kind;
        }
        if let Some(description) = update.description {
            offer.description = description;
        }
        if let Some(commission) = update.commission {
            offer.commission = commission;
        }
        if let Some(active) = update.active {
            offer.active = active;
        }
        if let Some(payment_link) = update.payment_link {
            offer.payment_link = (!payment_link.is_empty()).then_some(payment_link);
        }
        if let Some(promotion_code) = update.promotion_code {
            offer.promotion_code = (!promotion_code.is_empty()).then_some(promotion_code);
        }

        let result = offer.clone();
        drop(offers);

        self.save_offers();

        Ok(result)
    }

    fn get_offer(&self, id: &Eid) -> anyhow::Result<Option<Offer>> {
        let offers = self.offers.read().expect("offer store lock poisoned");
        Ok(offers.iter().find(|offer| &offer.id == id).cloned())
    }

    fn offers_for_idea(&self, idea_id: &Eid) -> anyhow::Result<Vec<Offer>> {
        let offers = self.offers.read().expect("offer store lock poisoned");
        Ok(offers
            .iter()
            .filter(|offer| &offer.idea_id == idea_id)
            .cloned()
            .collect())
    }

    fn offers_for_user(&self, user_id: &Eid) -> anyhow::Result<Vec<Offer>> {
        let offers = self.offers.read().expect("offer store lock poisoned");
        Ok(offers
            .iter()
            .filter(|offer| &offer.user_id == user_id)
            .cloned()
            .collect())
    }

    fn record_deal(&self, offer_id: &Eid, to_user: &Eid) -> anyhow::Result<Deal> {
        // Hold the offer write lock across deal insert + counter bump so
        // the counter can never drift from the deal rows.
        let mut offers = self.offers.write().expect("offer store lock poisoned");

        let offer = offers
            .iter_mut()
            .find(|offer| &offer.id == offer_id)
            .ok_or_else(|| anyhow!("Offer with id {} not found", offer_id))?;

        if !offer.active {
            return Err(anyhow!("Offer {} is not active", offer_id));
        }

        let deal = Deal {
            id: Eid::new(),
            offer_id: offer_id.clone(),
            from_user: offer.user_id.clone(),
            to_user: to_user.clone(),
            status: true,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        offer.deal_counts += 1;

        self.deals
            .write()
            .expect("deal store lock poisoned")
            .push(deal.clone());

        drop(offers);

        self.save_deals();
        self.save_offers();

        Ok(deal)
    }

    fn deals_for_user(&self, user_id: &Eid) -> anyhow::Result<Vec<Deal>> {
        let deals = self.deals.read().expect("deal store lock poisoned");
        Ok(deals
            .iter()
            .filter(|deal| &deal.to_user == user_id || &deal.from_user == user_id)
            .cloned()
            .collect())
    }
}
