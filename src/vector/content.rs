//! Content composition for idea embeddings.
//!
//! Builds the text that gets embedded for an idea: industry, title,
//! country, founder identity, summarized description, tags. Also
//! provides the change-detection hash used to skip re-embedding
//! unchanged ideas.

use crate::ideas::Idea;
use crate::users::UserData;

/// Ceiling for the summarized description, in characters.
pub const SUMMARY_MAX_CHARS: usize = 100;

/// Compose the embedding input for an idea.
///
/// `description_summary` is the already-summarized description (the
/// caller owns the summarize-or-truncate decision). Returns `None`
/// when there is nothing worth embedding.
pub fn compose_content(
    idea: &Idea,
    founder: Option<&UserData>,
    description_summary: &str,
) -> Option<String> {
    let founder_name = founder.map(|user| user.name.as_str()).unwrap_or_default();
    let founder_email = founder.map(|user| user.email.as_str()).unwrap_or_default();

    let parts = [
        format!("Industry: {}", idea.industry),
        format!("Title: {}", idea.title),
        format!("Country: {}", idea.address_detail.country),
        format!("Founder: {founder_name}"),
        format!("Email: {founder_email}"),
        format!("Description: {description_summary}"),
        idea.tags.join(","),
    ];

    let content = parts.join(" ").trim().to_string();

    if idea.title.trim().is_empty() && description_summary.trim().is_empty() {
        return None;
    }

    Some(content)
}

/// Hash of the fields that feed [`compose_content`]. Used to decide
/// whether an idea needs re-embedding.
pub fn content_hash(idea: &Idea) -> u64 {
    use std::hash::{Hash, Hasher};

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    idea.industry.trim().hash(&mut hasher);
    idea.title.trim().hash(&mut hasher);
    idea.address_detail.country.trim().hash(&mut hasher);
    idea.description.trim().hash(&mut hasher);
    idea.tags.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eid::Eid;
    use crate::ideas::AddressDetail;

    fn idea() -> Idea {
        Idea {
            id: Eid::new(),
            title: "Solar Grid".to_string(),
            description: "Community-owned solar microgrids".to_string(),
            industry: "sustainability".to_string(),
            tags: vec!["solar".to_string(), "energy".to_string()],
            address_detail: AddressDetail {
                id: Eid::new(),
                country: "Australia".to_string(),
                state: "NSW".to_string(),
                suburb: "Newtown".to_string(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_compose_includes_all_fields() {
        let founder = UserData {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            ..Default::default()
        };

        let content = compose_content(&idea(), Some(&founder), "Community solar").unwrap();

        assert!(content.contains("Industry: sustainability"));
        assert!(content.contains("Title: Solar Grid"));
        assert!(content.contains("Country: Australia"));
        assert!(content.contains("Founder: Ada"));
        assert!(content.contains("Email: ada@example.com"));
        assert!(content.contains("Description: Community solar"));
        assert!(content.contains("solar,energy"));
    }

    #[test]
    fn test_compose_without_founder() {
        let content = compose_content(&idea(), None, "summary").unwrap();
        assert!(content.contains("Founder: "));
    }

    #[test]
    fn test_compose_empty_idea_is_none() {
        let mut blank = idea();
        blank.title = "  ".to_string();
        assert!(compose_content(&blank, None, "").is_none());
    }

    #[test]
    fn test_content_hash_tracks_relevant_fields() {
        let a = idea();
        let mut b = a.clone();
        assert_eq!(content_hash(&a), content_hash(&b));

        // votes do not invalidate the embedding
        b.upvotes = 99;
        assert_eq!(content_hash(&a), content_hash(&b));

        b.title = "Wind Grid".to_string();
        assert_ne!(content_hash(&a), content_hash(&b));
    }
}
