//! Client-side idea filtering and presentation state.
//!
//! The manual filter is a pure function of the loaded idea list and the
//! current (query, location, industries) selection. All three predicates
//! AND together; an empty/default selection for a predicate matches all.

use serde::{Deserialize, Serialize};

use crate::eid::Eid;
use crate::ideas::{Idea, Vote};
use crate::voice::VoiceSearchOutcome;

/// Sentinel location selection that matches every idea.
pub const ALL_LOCATIONS: &str = "All Locations";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdeaFilter {
    /// Case-insensitive substring match on title. Empty matches all.
    pub query: String,
    /// `"state, country"` exact match, or substring match against state
    /// or country independently. [`ALL_LOCATIONS`] matches all.
    pub location: String,
    /// Industry multi-select. Empty matches all.
    pub industries: Vec<String>,
}

impl Default for IdeaFilter {
    fn default() -> Self {
        Self {
            query: String::new(),
            location: ALL_LOCATIONS.to_string(),
            industries: vec![],
        }
    }
}

impl IdeaFilter {
    pub fn is_match_all(&self) -> bool {
        self.query.is_empty() && self.location == ALL_LOCATIONS && self.industries.is_empty()
    }

    pub fn matches(&self, idea: &Idea) -> bool {
        let idea_location = format!(
            "{}, {}",
            idea.address_detail.state, idea.address_detail.country
        );

        let matches_search = self.query.is_empty()
            || idea
                .title
                .to_lowercase()
                .contains(&self.query.to_lowercase());

        let matches_location = self.location == ALL_LOCATIONS
            || idea_location == self.location
            || idea
                .address_detail
                .state
                .to_lowercase()
                .contains(&self.location.to_lowercase())
            || idea
                .address_detail
                .country
                .to_lowercase()
                .contains(&self.location.to_lowercase());

        let matches_industry =
            self.industries.is_empty() || self.industries.contains(&idea.industry);

        matches_search && matches_location && matches_industry
    }

    /// Apply the filter to a list. Pure and idempotent.
    pub fn apply(&self, ideas: &[Idea]) -> Vec<Idea> {
        ideas
            .iter()
            .filter(|idea| self.matches(idea))
            .cloned()
            .collect()
    }
}

/// Distinct `"state, country"` strings present in the list, sorted,
/// with [`ALL_LOCATIONS`] first.
pub fn unique_locations(ideas: &[Idea]) -> Vec<String> {
    let mut locations: Vec<String> = ideas
        .iter()
        .map(|idea| {
            format!(
                "{}, {}",
                idea.address_detail.state, idea.address_detail.country
            )
        })
        .collect();
    locations.sort();
    locations.dedup();
    locations.insert(0, ALL_LOCATIONS.to_string());
    locations
}

/// Sort by upvotes descending. Stable, so equal-vote ideas keep order.
pub fn sort_by_upvotes(ideas: &mut [Idea]) {
    ideas.sort_by(|a, b| b.upvotes.cmp(&a.upvotes));
}

pub fn is_sorted_by_upvotes(ideas: &[Idea]) -> bool {
    ideas.windows(2).all(|w| w[0].upvotes >= w[1].upvotes)
}

/// The visible idea list plus the manual search bar state.
///
/// Holds either the full fetch (ordered by upvotes descending) or a voice
/// search result set. Voice results fully replace the list; they are not
/// merged with the manual filter selection.
#[derive(Debug, Clone, Default)]
pub struct IdeaBoard {
    ideas: Vec<Idea>,
    pub filter: IdeaFilter,
    pub show_search_bar: bool,
}

impl IdeaBoard {
    pub fn new(mut ideas: Vec<Idea>) -> Self {
        sort_by_upvotes(&mut ideas);
        Self {
            ideas,
            filter: IdeaFilter::default(),
            show_search_bar: true,
        }
    }

    pub fn ideas(&self) -> &[Idea] {
        &self.ideas
    }

    /// The list as rendered: manual filter applied over whatever is loaded.
    pub fn visible(&self) -> Vec<Idea> {
        self.filter.apply(&self.ideas)
    }

    /// Zero rows reveal the manual search bar; one or more rows replace
    /// the visible list and hide it.
    pub fn apply_voice_outcome(&mut self, outcome: VoiceSearchOutcome) {
        match outcome {
            VoiceSearchOutcome::Matches { ideas, .. } => {
                self.ideas = ideas;
                self.show_search_bar = false;
            }
            VoiceSearchOutcome::NoMatch { .. } => {
                self.show_search_bar = true;
            }
        }
    }

    /// Optimistic local vote. Keeps a descending-upvote ordering sorted.
    pub fn apply_vote(&mut self, id: &Eid, vote: Vote) {
        if let Some(idea) = self.ideas.iter_mut().find(|idea| &idea.id == id) {
            match vote {
                Vote::Up => idea.upvotes += 1,
                Vote::Down => idea.downvotes += 1,
            }
        }
        sort_by_upvotes(&mut self.ideas);
    }

    /// Undo an optimistic vote after the backend rejected it.
    pub fn revert_vote(&mut self, id: &Eid, vote: Vote) {
        if let Some(idea) = self.ideas.iter_mut().find(|idea| &idea.id == id) {
            match vote {
                Vote::Up => idea.upvotes = idea.upvotes.saturating_sub(1),
                Vote::Down => idea.downvotes = idea.downvotes.saturating_sub(1),
            }
        }
        sort_by_upvotes(&mut self.ideas);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ideas::AddressDetail;

    fn idea(title: &str, state: &str, country: &str, industry: &str, upvotes: u64) -> Idea {
        Idea {
            id: Eid::new(),
            title: title.to_string(),
            industry: industry.to_string(),
            upvotes,
            address_detail: AddressDetail {
                id: Eid::new(),
                country: country.to_string(),
                state: state.to_string(),
                suburb: "".to_string(),
            },
            ..Default::default()
        }
    }

    fn sample() -> Vec<Idea> {
        vec![
            idea("Solar Grid", "NSW", "Australia", "sustainability", 12),
            idea("MediTrack", "California", "United States", "healthcare", 8),
            idea("PayFlow", "NSW", "Australia", "fintech", 5),
            idea("ShopSmart", "Bavaria", "Germany", "ecommerce", 2),
        ]
    }

    #[test]
    fn test_default_filter_matches_all() {
        let ideas = sample();
        let filter = IdeaFilter::default();
        assert_eq!(filter.apply(&ideas).len(), ideas.len());
    }

    #[test]
    fn test_title_substring_case_insensitive() {
        let ideas = sample();
        let filter = IdeaFilter {
            query: "pay".to_string(),
            ..Default::default()
        };
        let result = filter.apply(&ideas);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].title, "PayFlow");
    }

    #[test]
    fn test_location_exact_and_substring() {
        let ideas = sample();

        let exact = IdeaFilter {
            location: "NSW, Australia".to_string(),
            ..Default::default()
        };
        assert_eq!(exact.apply(&ideas).len(), 2);

        let partial = IdeaFilter {
            location: "germ".to_string(),
            ..Default::default()
        };
        let result = partial.apply(&ideas);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].title, "ShopSmart");
    }

    #[test]
    fn test_industry_multi_select() {
        let ideas = sample();
        let filter = IdeaFilter {
            industries: vec!["fintech".to_string(), "healthcare".to_string()],
            ..Default::default()
        };
        assert_eq!(filter.apply(&ideas).len(), 2);
    }

    #[test]
    fn test_predicates_are_anded() {
        let ideas = sample();
        let filter = IdeaFilter {
            query: "solar".to_string(),
            location: "NSW, Australia".to_string(),
            industries: vec!["fintech".to_string()],
            ..Default::default()
        };
        // Title and location match Solar Grid but industry does not
        assert!(filter.apply(&ideas).is_empty());
    }

    #[test]
    fn test_filter_is_idempotent() {
        let ideas = sample();
        let filter = IdeaFilter {
            location: "Australia".to_string(),
            ..Default::default()
        };
        let once = filter.apply(&ideas);
        let twice = filter.apply(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unique_locations_sorted_with_sentinel() {
        let ideas = sample();
        let locations = unique_locations(&ideas);
        assert_eq!(locations[0], ALL_LOCATIONS);
        assert_eq!(locations.len(), 4);
        let mut rest = locations[1..].to_vec();
        let sorted = {
            rest.sort();
            rest
        };
        assert_eq!(locations[1..].to_vec(), sorted);
    }

    #[test]
    fn test_vote_keeps_descending_order() {
        let mut board = IdeaBoard::new(sample());
        assert!(is_sorted_by_upvotes(board.ideas()));

        let id = board.ideas()[2].id.clone();
        board.apply_vote(&id, Vote::Up);
        assert!(is_sorted_by_upvotes(board.ideas()));

        // vote enough to overtake the leader
        for _ in 0..10 {
            board.apply_vote(&id, Vote::Up);
        }
        assert!(is_sorted_by_upvotes(board.ideas()));
        assert_eq!(board.ideas()[0].id, id);
    }

    #[test]
    fn test_revert_vote_saturates_at_zero() {
        let mut board = IdeaBoard::new(vec![idea("Zero", "NSW", "Australia", "ai", 0)]);
        let id = board.ideas()[0].id.clone();
        board.revert_vote(&id, Vote::Up);
        assert_eq!(board.ideas()[0].upvotes, 0);
    }
}
