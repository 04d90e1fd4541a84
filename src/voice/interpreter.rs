//! Voice command interpretation.
//!
//! One chat-completion round with a fixed instruction template turns a
//! free-text transcript into a structured search command. The reply is
//! parsed strictly: anything that is not the documented JSON shape is
//! a typed error, not a blind cast.

use serde::{Deserialize, Serialize};

use crate::ai::chat::{ChatClient, ChatMessage};
use crate::voice::pipeline::VoiceError;

/// The interpreter runs cold so the same transcript maps to the same
/// command.
const INTERPRETER_TEMPERATURE: f32 = 0.0;
const INTERPRETER_MAX_TOKENS: u32 = 200;

/// Categories the prompt teaches the model to recognize.
pub const CATEGORIES: [&str; 6] = [
    "software",
    "healthcare",
    "fintech",
    "ecommerce",
    "ai",
    "sustainability",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Name,
    Location,
    Category,
}

/// A validated interpreter verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpretedCommand {
    Search { kind: SearchType, value: String },
    /// No search criteria detected in the transcript.
    Other,
}

/// Raw wire shape of the model reply, before validation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCommand {
    command: String,
    parameters: RawParameters,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawParameters {
    #[serde(rename = "type")]
    kind: String,
    value: String,
}

/// Validate a raw model reply into a command.
pub fn parse_reply(reply: &str) -> Result<InterpretedCommand, VoiceError> {
    let raw: RawCommand = serde_json::from_str(reply)
        .map_err(|err| VoiceError::BadInterpretation(format!("not the documented JSON: {err}")))?;

    match raw.command.as_str() {
        "other" => Ok(InterpretedCommand::Other),
        "search" => {
            let kind = match raw.parameters.kind.as_str() {
                "name" => SearchType::Name,
                "location" => SearchType::Location,
                "category" => SearchType::Category,
                other => {
                    return Err(VoiceError::BadInterpretation(format!(
                        "unknown search type {other:?}"
                    )))
                }
            };

            let value = raw.parameters.value.trim().to_string();
            if value.is_empty() {
                return Err(VoiceError::BadInterpretation(
                    "search command with empty value".to_string(),
                ));
            }

            Ok(InterpretedCommand::Search { kind, value })
        }
        other => Err(VoiceError::BadInterpretation(format!(
            "unknown command {other:?}"
        ))),
    }
}

/// The fixed instruction template, with the transcript substituted in.
pub fn build_prompt(transcript: &str) -> String {
    format!(
        r#"Extract the search criteria from this voice input:
"{transcript}"

Respond only with a JSON object in this format:
{{
    "command": "search",
    "parameters": {{
        "type": "name" | "location" | "category",
        "value": string
    }}
}}

Rules:
1. For business name searches: When user mentions "search for", "find", "look for" followed by business names
   Example: "search for AI companies" -> {{"command": "search", "parameters": {{"type": "name", "value": "AI"}}}}

2. For location searches: When user mentions "in", "from", "at" followed by location names
   Example: "show businesses in New York" -> {{"command": "search", "parameters": {{"type": "location", "value": "New York"}}}}

3. For category searches: When user mentions any of these categories: software, healthcare, fintech, ecommerce, ai, sustainability
   Example: "show me fintech companies" -> {{"command": "search", "parameters": {{"type": "category", "value": "fintech"}}}}

If no specific search criteria is detected, respond with:
{{"command": "other", "parameters": {{"type": "", "value": ""}}}}
"#
    )
}

/// Seam for the pipeline; the live implementation calls the chat API.
pub trait Interpret: Send + Sync {
    fn interpret(&self, transcript: &str) -> Result<InterpretedCommand, VoiceError>;
}

pub struct CommandInterpreter {
    chat: ChatClient,
}

impl CommandInterpreter {
    pub fn new(chat: ChatClient) -> Self {
        Self { chat }
    }
}

impl Interpret for CommandInterpreter {
    fn interpret(&self, transcript: &str) -> Result<InterpretedCommand, VoiceError> {
        let messages = [ChatMessage::user(build_prompt(transcript))];
        let reply = self
            .chat
            .complete(&messages, INTERPRETER_MAX_TOKENS, INTERPRETER_TEMPERATURE)?;

        log::debug!("interpreter reply: {reply}");
        parse_reply(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_commands() {
        let cases = [
            (
                r#"{"command":"search","parameters":{"type":"name","value":"AI"}}"#,
                (SearchType::Name, "AI"),
            ),
            (
                r#"{"command":"search","parameters":{"type":"location","value":"New York"}}"#,
                (SearchType::Location, "New York"),
            ),
            (
                r#"{"command":"search","parameters":{"type":"category","value":"fintech"}}"#,
                (SearchType::Category, "fintech"),
            ),
        ];

        for (reply, (kind, value)) in cases {
            match parse_reply(reply).unwrap() {
                InterpretedCommand::Search { kind: k, value: v } => {
                    assert_eq!(k, kind);
                    assert_eq!(v, value);
                }
                other => panic!("expected search, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_other_command() {
        let reply = r#"{"command":"other","parameters":{"type":"","value":""}}"#;
        assert_eq!(parse_reply(reply).unwrap(), InterpretedCommand::Other);
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(
            parse_reply("I could not find a search query"),
            Err(VoiceError::BadInterpretation(_))
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_command() {
        let reply = r#"{"command":"filter","parameters":{"type":"name","value":"x"}}"#;
        assert!(matches!(
            parse_reply(reply),
            Err(VoiceError::BadInterpretation(_))
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let reply = r#"{"command":"search","parameters":{"type":"color","value":"red"}}"#;
        assert!(matches!(
            parse_reply(reply),
            Err(VoiceError::BadInterpretation(_))
        ));
    }

    #[test]
    fn test_parse_rejects_empty_value() {
        let reply = r#"{"command":"search","parameters":{"type":"name","value":"  "}}"#;
        assert!(matches!(
            parse_reply(reply),
            Err(VoiceError::BadInterpretation(_))
        ));
    }

    #[test]
    fn test_parse_rejects_extra_fields() {
        let reply =
            r#"{"command":"search","parameters":{"type":"name","value":"x"},"note":"hi"}"#;
        assert!(matches!(
            parse_reply(reply),
            Err(VoiceError::BadInterpretation(_))
        ));
    }

    #[test]
    fn test_prompt_embeds_transcript_and_rules() {
        let prompt = build_prompt("find AI companies");
        assert!(prompt.contains("\"find AI companies\""));
        for category in CATEGORIES {
            assert!(prompt.contains(category), "prompt lists {category}");
        }
        assert!(prompt.contains(r#""command": "other""#));
    }
}
