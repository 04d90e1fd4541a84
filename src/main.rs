use anyhow::bail;
use clap::Parser;

mod ai;
mod app;
mod cli;
mod config;
mod eid;
mod filter;
mod ideas;
mod lock;
mod offers;
mod session;
mod storage;
#[cfg(test)]
mod tests;
mod users;
mod vector;
mod voice;
mod web;

use app::{AppBackend, AppFactory, VectorizeOpts};
use cli::{ActionArgs, OfferArgs};
use eid::Eid;
use ideas::{IdeaCreate, IdeaQuery, IdeaUpdate, Vote};
use inquire::error::InquireResult;
use offers::{OfferCreate, OfferUpdate};

pub fn parse_tags(tags: String) -> Vec<String> {
    tags.split(',')
        .flat_map(|value| {
            value
                .split(' ')
                .filter(|value| !value.is_empty())
                .collect::<Vec<_>>()
        })
        .map(|s| s.to_lowercase().to_string())
        .collect::<Vec<_>>()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();

    let paths = AppFactory::get_paths()?;

    if let cli::Command::Daemon {} = args.command {
        let _lock = lock::FileLock::try_acquire(std::path::Path::new(&paths.base_path))?;

        let mut app = AppFactory::create_local_app(&paths)?;
        app.run_queue();
        web::start_daemon(app, paths.uploads_path.clone());
        return Ok(());
    }

    let _guard = lock::LockGuard::acquire_if_local(std::path::Path::new(&paths.base_path))?;
    let app = AppFactory::create_backend(&paths)?;

    match args.command {
        cli::Command::Daemon {} => unreachable!("handled above"),

        cli::Command::Search {
            title,
            location,
            industry,
            id,
            user,
            count,
            limit,
            action,
        } => {
            let query = IdeaQuery {
                id: id.map(Eid::from),
                title,
                location,
                industries: if industry.is_empty() {
                    None
                } else {
                    Some(industry)
                },
                user_id: user.map(Eid::from),
                limit,
            };
            let ideas = app.search(query.clone())?;

            if ideas.is_empty() {
                println!("{}", serde_json::to_string_pretty(&ideas)?);
                return Ok(());
            }

            if count {
                println!("{} ideas found", ideas.len());
                return Ok(());
            }

            match action {
                // print results
                None => {
                    println!("{}", serde_json::to_string_pretty(&ideas)?);
                    Ok(())
                }

                // update results
                Some(ActionArgs::Update {
                    title,
                    description,
                    industry,
                    tags,
                    append_tags,
                    remove_tags,
                    url,
                    country,
                    state,
                    suburb,
                }) => {
                    let idea_update = IdeaUpdate {
                        title,
                        description,
                        industry,
                        tags: tags.map(parse_tags),
                        append_tags: append_tags.map(parse_tags),
                        remove_tags: remove_tags.map(parse_tags),
                        url,
                        country,
                        state,
                        suburb,
                        ..Default::default()
                    };

                    if idea_update.title.is_none()
                        && idea_update.description.is_none()
                        && idea_update.industry.is_none()
                        && idea_update.tags.is_none()
                        && idea_update.append_tags.is_none()
                        && idea_update.remove_tags.is_none()
                        && idea_update.url.is_none()
                        && idea_update.country.is_none()
                        && idea_update.state.is_none()
                        && idea_update.suburb.is_none()
                    {
                        println!("This update request does nothing");
                        return Ok(());
                    }

                    if query.is_match_all() {
                        match inquire::prompt_confirmation(format!(
                            "You are about to update every single idea ({} items). Are you really sure?",
                            ideas.len()
                        )) {
                            InquireResult::Ok(true) => {}
                            InquireResult::Ok(false) => return Ok(()),
                            InquireResult::Err(err) => bail!("An error occurred: {}", err),
                        }
                    }

                    let mut updated = 0;
                    for idea in &ideas {
                        app.update(&idea.id, idea_update.clone())?;
                        updated += 1;
                    }

                    println!("{updated} items updated");

                    Ok(())
                }

                // delete results
                Some(ActionArgs::Delete { yes, force }) => {
                    let is_wipe = !force && query.is_match_all();

                    if !yes {
                        match inquire::prompt_confirmation(format!(
                            "Are you sure you want to delete {} ideas?",
                            ideas.len()
                        )) {
                            InquireResult::Ok(true) => {}
                            InquireResult::Ok(false) => return Ok(()),
                            InquireResult::Err(err) => bail!("An error occurred: {}", err),
                        }
                    }

                    if is_wipe {
                        match inquire::prompt_confirmation(
                            "You are about to wipe your entire idea database. Are you really sure?",
                        ) {
                            InquireResult::Ok(true) => {}
                            InquireResult::Ok(false) => return Ok(()),
                            InquireResult::Err(err) => bail!("An error occurred: {}", err),
                        }
                    }

                    let mut removed = 0;
                    for idea in &ideas {
                        app.delete(&idea.id)?;
                        removed += 1;
                    }

                    println!("{removed} items removed");
                    Ok(())
                }
            }
        }

        cli::Command::Add {
            title,
            description,
            industry,
            tags,
            url,
            user,
            country,
            state,
            suburb,
            media,
        } => {
            let idea_create = IdeaCreate {
                title,
                description,
                industry,
                tags: tags.map(parse_tags),
                url,
                user_id: user.into(),
                country,
                state,
                suburb,
            };

            let mut idea = app.create(idea_create)?;

            for path in media {
                let file = std::fs::read(&path)?;
                idea = app.upload_media(&idea.id, file)?;
            }

            println!("{}", serde_json::to_string_pretty(&idea)?);
            Ok(())
        }

        cli::Command::Vote { id, down } => {
            let vote = if down { Vote::Down } else { Vote::Up };
            let idea = app.vote(&id.into(), vote)?;
            println!("{}", serde_json::to_string_pretty(&idea)?);
            Ok(())
        }

        cli::Command::Voice { transcript } => {
            let raw = match transcript {
                Some(transcript) => transcript,
                None => {
                    let mut buf = String::new();
                    std::io::Read::read_to_string(&mut std::io::stdin(), &mut buf)?;
                    buf
                }
            };

            // same lifecycle as the microphone toggle: stopping with an
            // empty transcript never reaches the pipeline
            let mut capture = voice::TranscriptCapture::new();
            capture.start()?;
            capture.update_transcript(&raw)?;
            let Some(transcript) = capture.stop() else {
                println!("empty transcript, nothing to search");
                return Ok(());
            };

            let result = app.voice_search(&transcript);
            capture.finish();
            let outcome = result?;

            if outcome.show_search_bar() {
                log::info!("no confident match; use the manual search filters");
            }

            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }

        cli::Command::Vectorize { id, background } => {
            let report = app.vectorize(VectorizeOpts {
                idea_id: id.map(Eid::from),
                async_run: background,
            })?;

            match report {
                Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                None => println!("vectorize queued"),
            }
            Ok(())
        }

        cli::Command::Offer { action } => match action {
            OfferArgs::Add {
                idea,
                user,
                kind,
                description,
                commission,
                payment_link,
                promotion_code,
                inactive,
            } => {
                let offer = app.create_offer(OfferCreate {
                    idea_id: idea.into(),
                    user_id: user.into(),
                    kind,
                    description,
                    commission,
                    active: !inactive,
                    payment_link,
                    promotion_code,
                })?;
                println!("{}", serde_json::to_string_pretty(&offer)?);
                Ok(())
            }

            OfferArgs::Update {
                id,
                kind,
                description,
                commission,
                active,
                payment_link,
                promotion_code,
            } => {
                let offer = app.update_offer(
                    &id.into(),
                    OfferUpdate {
                        kind,
                        description,
                        commission,
                        active,
                        payment_link,
                        promotion_code,
                    },
                )?;
                println!("{}", serde_json::to_string_pretty(&offer)?);
                Ok(())
            }

            OfferArgs::List { idea } => {
                let offers = app.offers_for_idea(&idea.into())?;
                println!("{}", serde_json::to_string_pretty(&offers)?);
                Ok(())
            }
        },

        cli::Command::Deal { offer, user } => {
            let deal = app.make_deal(&offer.into(), &user.into())?;
            println!("{}", serde_json::to_string_pretty(&deal)?);
            Ok(())
        }

        cli::Command::Deals { user } => {
            let deals = app.deals_for_user(&user.into())?;
            println!("{}", serde_json::to_string_pretty(&deals)?);
            Ok(())
        }
    }
}
