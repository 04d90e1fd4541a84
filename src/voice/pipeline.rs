//! Voice search orchestration.
//!
//! Strictly sequential: interpret -> embed -> similarity search. The
//! interpreter's extracted value is embedded and vector-searched
//! regardless of the interpreted type; the type is surfaced in the
//! outcome for display. Cancellation is checked between steps, and
//! every network step inherits the AI client's request timeout.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ai::AiError;
use crate::ideas::Idea;
use crate::voice::interpreter::{Interpret, InterpretedCommand, SearchType};

#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("transcript is empty")]
    EmptyTranscript,

    #[error("voice search cancelled")]
    Cancelled,

    #[error("interpreter returned malformed output: {0}")]
    BadInterpretation(String),

    #[error(transparent)]
    Ai(#[from] AiError),

    #[error("vector search failed: {0}")]
    Search(String),
}

/// Cooperative cancellation flag shared with whoever owns the stop
/// button. Cancelling does not abort an in-flight request (those are
/// bounded by the client timeout); it stops the pipeline at the next
/// step boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The interpreted search the pipeline acted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpreted {
    #[serde(rename = "type")]
    pub kind: SearchType,
    pub value: String,
}

/// What the presenter does with the result: replace the list, or fall
/// back to the manual search bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VoiceSearchOutcome {
    Matches {
        interpreted: Interpreted,
        ideas: Vec<Idea>,
    },
    NoMatch {
        interpreted: Option<Interpreted>,
    },
}

impl VoiceSearchOutcome {
    pub fn show_search_bar(&self) -> bool {
        matches!(self, VoiceSearchOutcome::NoMatch { .. })
    }
}

/// Embeds an extracted search value.
pub trait EmbedQuery: Send + Sync {
    fn embed_query(&self, value: &str) -> Result<Vec<f32>, VoiceError>;
}

/// Runs the similarity search against the idea corpus.
pub trait SearchSimilar: Send + Sync {
    fn search_similar(
        &self,
        embedding: &[f32],
        threshold: f32,
        match_count: usize,
    ) -> Result<Vec<Idea>, VoiceError>;
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOpts {
    pub similarity_threshold: f32,
    pub match_count: usize,
}

pub struct VoicePipeline<'a> {
    interpreter: &'a dyn Interpret,
    embedder: &'a dyn EmbedQuery,
    searcher: &'a dyn SearchSimilar,
    opts: PipelineOpts,
}

impl<'a> VoicePipeline<'a> {
    pub fn new(
        interpreter: &'a dyn Interpret,
        embedder: &'a dyn EmbedQuery,
        searcher: &'a dyn SearchSimilar,
        opts: PipelineOpts,
    ) -> Self {
        Self {
            interpreter,
            embedder,
            searcher,
            opts,
        }
    }

    pub fn run(
        &self,
        transcript: &str,
        cancel: &CancelToken,
    ) -> Result<VoiceSearchOutcome, VoiceError> {
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Err(VoiceError::EmptyTranscript);
        }

        if cancel.is_cancelled() {
            return Err(VoiceError::Cancelled);
        }

        let command = self.interpreter.interpret(transcript)?;
        let (kind, value) = match command {
            InterpretedCommand::Other => {
                log::info!("no search criteria in transcript {transcript:?}");
                return Ok(VoiceSearchOutcome::NoMatch { interpreted: None });
            }
            InterpretedCommand::Search { kind, value } => (kind, value),
        };

        if cancel.is_cancelled() {
            return Err(VoiceError::Cancelled);
        }

        let embedding = self.embedder.embed_query(&value)?;

        if cancel.is_cancelled() {
            return Err(VoiceError::Cancelled);
        }

        let ideas = self.searcher.search_similar(
            &embedding,
            self.opts.similarity_threshold,
            self.opts.match_count,
        )?;

        let interpreted = Interpreted { kind, value };

        if ideas.is_empty() {
            log::info!(
                "vector search found nothing for {:?}, falling back to manual search",
                interpreted.value
            );
            return Ok(VoiceSearchOutcome::NoMatch {
                interpreted: Some(interpreted),
            });
        }

        Ok(VoiceSearchOutcome::Matches { interpreted, ideas })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eid::Eid;
    use std::sync::Mutex;

    struct FixedInterpreter(InterpretedCommand);

    impl Interpret for FixedInterpreter {
        fn interpret(&self, _transcript: &str) -> Result<InterpretedCommand, VoiceError> {
            Ok(self.0.clone())
        }
    }

    /// Records the value it was asked to embed.
    struct RecordingEmbedder {
        seen: Mutex<Vec<String>>,
        vector: Vec<f32>,
    }

    impl RecordingEmbedder {
        fn new(vector: Vec<f32>) -> Self {
            Self {
                seen: Mutex::new(vec![]),
                vector,
            }
        }
    }

    impl EmbedQuery for RecordingEmbedder {
        fn embed_query(&self, value: &str) -> Result<Vec<f32>, VoiceError> {
            self.seen.lock().unwrap().push(value.to_string());
            Ok(self.vector.clone())
        }
    }

    /// Records the (embedding, threshold, count) triple it was called with.
    struct RecordingSearcher {
        calls: Mutex<Vec<(Vec<f32>, f32, usize)>>,
        results: Vec<Idea>,
    }

    impl RecordingSearcher {
        fn new(results: Vec<Idea>) -> Self {
            Self {
                calls: Mutex::new(vec![]),
                results,
            }
        }
    }

    impl SearchSimilar for RecordingSearcher {
        fn search_similar(
            &self,
            embedding: &[f32],
            threshold: f32,
            match_count: usize,
        ) -> Result<Vec<Idea>, VoiceError> {
            self.calls
                .lock()
                .unwrap()
                .push((embedding.to_vec(), threshold, match_count));
            Ok(self.results.clone())
        }
    }

    fn idea(title: &str) -> Idea {
        Idea {
            id: Eid::new(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    fn opts() -> PipelineOpts {
        PipelineOpts {
            similarity_threshold: 0.32,
            match_count: 10,
        }
    }

    #[test]
    fn test_embeds_exact_value_and_propagates_constants() {
        let interpreter = FixedInterpreter(InterpretedCommand::Search {
            kind: SearchType::Category,
            value: "ai".to_string(),
        });
        let embedder = RecordingEmbedder::new(vec![0.5, 0.5]);
        let searcher = RecordingSearcher::new(vec![idea("AI bookkeeping")]);

        let pipeline = VoicePipeline::new(&interpreter, &embedder, &searcher, opts());
        let outcome = pipeline.run("find AI companies", &CancelToken::new()).unwrap();

        // embedding called with exactly the extracted value
        assert_eq!(*embedder.seen.lock().unwrap(), vec!["ai".to_string()]);

        // search called with exactly that embedding, threshold 0.32, cap 10
        let calls = searcher.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, vec![0.5, 0.5]);
        assert!((calls[0].1 - 0.32).abs() < f32::EPSILON);
        assert_eq!(calls[0].2, 10);

        match outcome {
            VoiceSearchOutcome::Matches { interpreted, ideas } => {
                assert_eq!(interpreted.kind, SearchType::Category);
                assert_eq!(interpreted.value, "ai");
                assert_eq!(ideas.len(), 1);
            }
            other => panic!("expected matches, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_rows_reveals_search_bar() {
        let interpreter = FixedInterpreter(InterpretedCommand::Search {
            kind: SearchType::Name,
            value: "nonexistent".to_string(),
        });
        let embedder = RecordingEmbedder::new(vec![1.0]);
        let searcher = RecordingSearcher::new(vec![]);

        let pipeline = VoicePipeline::new(&interpreter, &embedder, &searcher, opts());
        let outcome = pipeline.run("find nonexistent", &CancelToken::new()).unwrap();

        assert!(outcome.show_search_bar());
        match outcome {
            VoiceSearchOutcome::NoMatch { interpreted } => {
                assert_eq!(interpreted.unwrap().value, "nonexistent");
            }
            other => panic!("expected no match, got {other:?}"),
        }
    }

    #[test]
    fn test_other_command_skips_embedding() {
        let interpreter = FixedInterpreter(InterpretedCommand::Other);
        let embedder = RecordingEmbedder::new(vec![1.0]);
        let searcher = RecordingSearcher::new(vec![idea("whatever")]);

        let pipeline = VoicePipeline::new(&interpreter, &embedder, &searcher, opts());
        let outcome = pipeline.run("hello there", &CancelToken::new()).unwrap();

        assert!(outcome.show_search_bar());
        assert!(embedder.seen.lock().unwrap().is_empty());
        assert!(searcher.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_empty_transcript_is_rejected() {
        let interpreter = FixedInterpreter(InterpretedCommand::Other);
        let embedder = RecordingEmbedder::new(vec![]);
        let searcher = RecordingSearcher::new(vec![]);

        let pipeline = VoicePipeline::new(&interpreter, &embedder, &searcher, opts());
        assert!(matches!(
            pipeline.run("   ", &CancelToken::new()),
            Err(VoiceError::EmptyTranscript)
        ));
    }

    #[test]
    fn test_cancelled_before_start() {
        let interpreter = FixedInterpreter(InterpretedCommand::Search {
            kind: SearchType::Name,
            value: "ai".to_string(),
        });
        let embedder = RecordingEmbedder::new(vec![1.0]);
        let searcher = RecordingSearcher::new(vec![]);

        let cancel = CancelToken::new();
        cancel.cancel();

        let pipeline = VoicePipeline::new(&interpreter, &embedder, &searcher, opts());
        assert!(matches!(
            pipeline.run("find ai", &cancel),
            Err(VoiceError::Cancelled)
        ));
        assert!(embedder.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_interpreter_failure_aborts_before_embedding() {
        struct FailingInterpreter;
        impl Interpret for FailingInterpreter {
            fn interpret(&self, _t: &str) -> Result<InterpretedCommand, VoiceError> {
                Err(VoiceError::BadInterpretation("not json".to_string()))
            }
        }

        let embedder = RecordingEmbedder::new(vec![1.0]);
        let searcher = RecordingSearcher::new(vec![]);

        let pipeline = VoicePipeline::new(&FailingInterpreter, &embedder, &searcher, opts());
        assert!(matches!(
            pipeline.run("find ai", &CancelToken::new()),
            Err(VoiceError::BadInterpretation(_))
        ));
        assert!(embedder.seen.lock().unwrap().is_empty());
    }
}
