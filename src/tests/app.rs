use std::sync::Arc;
use std::sync::RwLock;

use crate::app::{backend::AppBackend, local::AppLocal};
use crate::config::Config;
use crate::eid::Eid;
use crate::ideas::{self, IdeaCreate, IdeaQuery, IdeaUpdate, Vote};
use crate::offers::{self, OfferCreate};
use crate::storage::{self, StorageManager};
use crate::users::{self, OauthProfile, UserType};
use crate::vector::VectorSearchService;
use crate::{filter, parse_tags};

/// Creates an isolated AppLocal using a unique temp directory.
/// Each test gets its own directory so parallel tests never collide,
/// and no real data is touched.
pub fn create_app() -> (AppLocal, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let base = tmp.path().to_str().unwrap().to_string();

    let idea_mgr = Arc::new(
        ideas::BackendCsv::load(tmp.path().join("ideas.csv").to_str().unwrap())
            .expect("failed to create idea csv"),
    );
    let offer_book = Arc::new(
        offers::BackendCsv::load(
            tmp.path().join("offers.csv").to_str().unwrap(),
            tmp.path().join("deals.csv").to_str().unwrap(),
        )
        .expect("failed to create offer csv"),
    );
    let user_store = Arc::new(
        users::BackendCsv::load(tmp.path().join("users.csv").to_str().unwrap())
            .expect("failed to create user csv"),
    );
    let storage_mgr = Arc::new(
        storage::BackendLocal::new(tmp.path().join("uploads").to_str().unwrap())
            .expect("failed to create storage"),
    );

    let config = Arc::new(RwLock::new(
        Config::load_with(&base).expect("failed to load config"),
    ));
    let ai_config = config.read().unwrap().ai.clone();
    let vector = Arc::new(VectorSearchService::new(
        &ai_config,
        tmp.path().to_path_buf(),
    ));

    let app = AppLocal::new_with(
        idea_mgr,
        offer_book,
        user_store,
        storage_mgr,
        vector,
        config,
    );
    (app, tmp)
}

fn sample_create(title: &str, industry: &str, state: &str, country: &str) -> IdeaCreate {
    IdeaCreate {
        title: title.to_string(),
        description: Some(format!("{title} description")),
        industry: industry.to_string(),
        tags: Some(parse_tags("b2b,saas".to_string())),
        user_id: Eid::new(),
        country: country.to_string(),
        state: state.to_string(),
        suburb: "".to_string(),
        ..Default::default()
    }
}

#[test]
pub fn test_create_idea() {
    let (app, _tmp) = create_app();

    let idea = app
        .create(sample_create("Solar Grid", "sustainability", "NSW", "Australia"))
        .unwrap();

    assert_eq!(&idea.title, "Solar Grid");
    assert_eq!(idea.upvotes, 0);
    assert_eq!(idea.address_detail.country, "Australia");
    assert_eq!(idea.tags, vec!["b2b", "saas"]);
    assert!(!idea.created_at.is_empty());
}

#[test]
pub fn test_search_is_sorted_by_upvotes() {
    let (app, _tmp) = create_app();

    let a = app
        .create(sample_create("A", "ai", "NSW", "Australia"))
        .unwrap();
    let b = app
        .create(sample_create("B", "fintech", "NSW", "Australia"))
        .unwrap();
    app.create(sample_create("C", "ai", "Bavaria", "Germany"))
        .unwrap();

    app.vote(&b.id, Vote::Up).unwrap();
    app.vote(&b.id, Vote::Up).unwrap();
    app.vote(&a.id, Vote::Up).unwrap();

    let ideas = app.search(IdeaQuery::default()).unwrap();
    assert_eq!(ideas.len(), 3);
    assert!(filter::is_sorted_by_upvotes(&ideas));
    assert_eq!(ideas[0].id, b.id);
}

#[test]
pub fn test_search_filters_and_is_match_all() {
    let (app, _tmp) = create_app();

    app.create(sample_create("Solar Grid", "sustainability", "NSW", "Australia"))
        .unwrap();
    app.create(sample_create("PayFlow", "fintech", "NSW", "Australia"))
        .unwrap();
    app.create(sample_create("MediTrack", "healthcare", "California", "United States"))
        .unwrap();

    // empty strings in the query are treated as unset
    let all = app
        .search(IdeaQuery {
            title: Some("".to_string()),
            location: Some("".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(all.len(), 3);

    let fintech = app
        .search(IdeaQuery {
            industries: Some(vec!["fintech".to_string()]),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(fintech.len(), 1);
    assert_eq!(fintech[0].title, "PayFlow");

    let aussie = app
        .search(IdeaQuery {
            location: Some("NSW, Australia".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(aussie.len(), 2);
}

#[test]
pub fn test_vote_increments_are_monotonic() {
    let (app, _tmp) = create_app();

    let idea = app
        .create(sample_create("Votable", "ai", "NSW", "Australia"))
        .unwrap();

    let after_up = app.vote(&idea.id, Vote::Up).unwrap();
    assert_eq!(after_up.upvotes, 1);
    assert_eq!(after_up.downvotes, 0);

    let after_down = app.vote(&idea.id, Vote::Down).unwrap();
    assert_eq!(after_down.upvotes, 1);
    assert_eq!(after_down.downvotes, 1);
}

#[test]
pub fn test_concurrent_votes_do_not_lose_updates() {
    let (app, _tmp) = create_app();
    let app = Arc::new(app);

    let idea = app
        .create(sample_create("Hot Idea", "ai", "NSW", "Australia"))
        .unwrap();

    let mut handles = vec![];
    for _ in 0..8 {
        let app = app.clone();
        let id = idea.id.clone();
        handles.push(std::thread::spawn(move || {
            for _ in 0..5 {
                app.vote(&id, Vote::Up).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let ideas = app
        .search(IdeaQuery {
            id: Some(idea.id.clone()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(ideas[0].upvotes, 40);
}

#[test]
pub fn test_update_idea_fields() {
    let (app, _tmp) = create_app();

    let idea = app
        .create(sample_create("Old Title", "ai", "NSW", "Australia"))
        .unwrap();

    let updated = app
        .update(
            &idea.id,
            IdeaUpdate {
                title: Some("New Title".to_string()),
                append_tags: Some(vec!["fresh".to_string()]),
                state: Some("VIC".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(updated.title, "New Title");
    assert!(updated.tags.contains(&"fresh".to_string()));
    assert_eq!(updated.address_detail.state, "VIC");
}

#[test]
pub fn test_delete_idea() {
    let (app, _tmp) = create_app();

    let idea = app
        .create(sample_create("Doomed", "ai", "NSW", "Australia"))
        .unwrap();
    assert_eq!(app.total().unwrap(), 1);

    app.delete(&idea.id).unwrap();
    assert_eq!(app.total().unwrap(), 0);

    assert!(matches!(
        app.delete(&idea.id),
        Err(crate::app::AppError::NotFound)
    ));
}

#[test]
pub fn test_upload_media_appends_public_url() {
    let (app, _tmp) = create_app();

    let idea = app
        .create(sample_create("Pictured", "ai", "NSW", "Australia"))
        .unwrap();

    let idea = app.upload_media(&idea.id, b"first image".to_vec()).unwrap();
    let idea = app.upload_media(&idea.id, b"second image".to_vec()).unwrap();

    assert_eq!(idea.media.len(), 2);
    for url in &idea.media {
        assert!(url.starts_with("/api/file/"), "unexpected url {url}");
    }

    // the stored object is readable back through the storage manager
    let ident = idea.media[0].strip_prefix("/api/file/").unwrap();
    assert_eq!(app.storage_mgr.read(ident).unwrap(), b"first image");
}

#[test]
pub fn test_offer_and_deal_flow() {
    let (app, _tmp) = create_app();

    let founder = Eid::new();
    let distributor = Eid::new();

    let idea = app
        .create(sample_create("Dealable", "ecommerce", "NSW", "Australia"))
        .unwrap();

    let offer = app
        .create_offer(OfferCreate {
            idea_id: idea.id.clone(),
            user_id: founder.clone(),
            kind: "Commission".to_string(),
            description: Some("15% per sale".to_string()),
            commission: 15.0,
            active: true,
            ..Default::default()
        })
        .unwrap();

    let deal = app.make_deal(&offer.id, &distributor).unwrap();
    assert!(deal.status);
    assert_eq!(deal.from_user, founder);
    assert_eq!(deal.to_user, distributor);

    let offers = app.offers_for_idea(&idea.id).unwrap();
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].deal_counts, 1);

    // both participants see the deal
    assert_eq!(app.deals_for_user(&founder).unwrap().len(), 1);
    assert_eq!(app.deals_for_user(&distributor).unwrap().len(), 1);
    assert!(app.deals_for_user(&Eid::new()).unwrap().is_empty());
}

#[test]
pub fn test_offer_with_unknown_kind_rejected() {
    let (app, _tmp) = create_app();

    let idea = app
        .create(sample_create("Kindless", "ai", "NSW", "Australia"))
        .unwrap();

    let result = app.create_offer(OfferCreate {
        idea_id: idea.id.clone(),
        user_id: Eid::new(),
        kind: "Barter".to_string(),
        commission: 1.0,
        active: true,
        ..Default::default()
    });

    assert!(result.is_err());
}

#[test]
pub fn test_offer_for_missing_idea_rejected() {
    let (app, _tmp) = create_app();

    let result = app.create_offer(OfferCreate {
        idea_id: Eid::new(),
        user_id: Eid::new(),
        kind: "Equity".to_string(),
        commission: 5.0,
        active: true,
        ..Default::default()
    });

    assert!(matches!(result, Err(crate::app::AppError::NotFound)));
}

#[test]
pub fn test_oauth_upsert_through_backend() {
    let (app, _tmp) = create_app();

    let profile = OauthProfile {
        email: "new@example.com".to_string(),
        name: Some("New User".to_string()),
        picture: Some("https://img/p.png".to_string()),
        email_verified: Some(true),
        given_name: None,
        family_name: None,
    };

    let user = app
        .upsert_oauth_user(profile.clone(), UserType::Distributor)
        .unwrap();
    assert_eq!(user.user_type, UserType::Distributor);

    // same email again: no duplicate row
    let again = app
        .upsert_oauth_user(profile, UserType::Distributor)
        .unwrap();
    assert_eq!(again.id, user.id);
}

#[test]
pub fn test_ideas_survive_reload() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("ideas.csv");

    let id = {
        let store = ideas::BackendCsv::load(path.to_str().unwrap()).unwrap();
        let idea = crate::ideas::IdeaManager::create(
            &store,
            sample_create("Durable", "ai", "NSW", "Australia"),
        )
        .unwrap();
        crate::ideas::IdeaManager::vote(&store, &idea.id, Vote::Up).unwrap();
        idea.id
    };

    let reloaded = ideas::BackendCsv::load(path.to_str().unwrap()).unwrap();
    let idea = crate::ideas::IdeaManager::get(&reloaded, &id).unwrap().unwrap();
    assert_eq!(idea.title, "Durable");
    assert_eq!(idea.upvotes, 1);
    assert_eq!(idea.address_detail.state, "NSW");
    assert_eq!(idea.tags, vec!["b2b", "saas"]);
}
