//! Conversational session orchestration.
//!
//! A [`Session`] holds a role, a FIFO-bounded history of (question, answer)
//! turns, and the turn state machine. Each question runs
//! `Idle → Retrieving → Generating → Ready`; any stage may fall to `Failed`,
//! in which case the turn is not recorded and the session stays usable —
//! failure is per-turn, never session-terminal.
//!
//! Prompts are assembled from the role instruction, prior turns
//! (oldest-first), the retrieved chunks with source attribution, any
//! externally supplied context blocks, and the new question.

use std::collections::VecDeque;
use thiserror::Error;

use crate::embedding::EmbeddingProvider;
use crate::generate::{GenerationError, Generator};
use crate::retrieve::{retrieve, RetrievalError, RetrievalOptions, RetrievalResult};
use crate::store::IndexStore;

/// Closed set of personas conditioning the assistant's instructions.
/// Unrecognized role strings map to [`Role::Other`], which carries an
/// explicit default instruction — never a silently invented persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Developer,
    Tester,
    User,
    Other,
}

impl Role {
    pub fn parse(s: &str) -> Role {
        match s.trim().to_lowercase().as_str() {
            "developer" => Role::Developer,
            "tester" => Role::Tester,
            "user" => Role::User,
            _ => Role::Other,
        }
    }

    pub fn instruction(&self) -> &'static str {
        match self {
            Role::Developer => "Explain code, architecture, and impact of changes.",
            Role::Tester => {
                "Explain features, suggest test cases and edge cases. \
                 Use DOM and XPath context if available."
            }
            Role::User => "Explain functionality and navigation in simple language.",
            Role::Other => "You are a helpful assistant.",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Developer => "developer",
            Role::Tester => "tester",
            Role::User => "user",
            Role::Other => "assistant",
        }
    }
}

/// Where a session currently is in its turn lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Retrieving,
    Generating,
    Ready,
    Failed,
}

/// One completed (question, answer) exchange.
#[derive(Debug, Clone)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

/// Optional context supplied from outside the retrieval pipeline.
/// Each field is independently omittable and checked before use.
#[derive(Debug, Clone, Default)]
pub struct ExternalContext {
    /// Page-element description, e.g. locator output.
    pub dom: Option<String>,
    /// Execution trace excerpt.
    pub trace: Option<String>,
}

#[derive(Debug, Error)]
pub enum AskError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Debug view of one answered turn: the answer plus the retrieved chunks,
/// their per-channel scores, and their originating paths. Producing this
/// view never changes the ranking or the session state.
#[derive(Debug, Clone)]
pub struct AskDebug {
    pub answer: String,
    pub sources: Vec<String>,
    pub scores: Vec<ScoreDetail>,
    pub chunks: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ScoreDetail {
    pub vector: f64,
    pub lexical: f64,
    pub fused: f64,
}

pub struct Session {
    role: Role,
    history: VecDeque<Turn>,
    history_cap: usize,
    state: SessionState,
}

impl Session {
    pub fn new(role: Role, history_cap: usize) -> Self {
        Self {
            role,
            history: VecDeque::new(),
            history_cap,
            state: SessionState::Idle,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &VecDeque<Turn> {
        &self.history
    }

    /// Answer one question. On success the turn is recorded and history is
    /// trimmed FIFO to the cap; on failure nothing is recorded and the next
    /// call starts again from `Idle`.
    pub async fn ask(
        &mut self,
        store: &IndexStore,
        embedder: &dyn EmbeddingProvider,
        generator: &dyn Generator,
        opts: &RetrievalOptions,
        question: &str,
        external: &ExternalContext,
    ) -> Result<String, AskError> {
        let (answer, _results) = self
            .run_turn(store, embedder, generator, opts, question, external)
            .await?;
        Ok(answer)
    }

    /// Like [`ask`](Self::ask), additionally exposing the retrieved chunks
    /// for inspection.
    pub async fn ask_debug(
        &mut self,
        store: &IndexStore,
        embedder: &dyn EmbeddingProvider,
        generator: &dyn Generator,
        opts: &RetrievalOptions,
        question: &str,
        external: &ExternalContext,
    ) -> Result<AskDebug, AskError> {
        let (answer, results) = self
            .run_turn(store, embedder, generator, opts, question, external)
            .await?;

        Ok(AskDebug {
            answer,
            sources: results.iter().map(|r| r.document_path.clone()).collect(),
            scores: results
                .iter()
                .map(|r| ScoreDetail {
                    vector: r.vector_score,
                    lexical: r.lexical_score,
                    fused: r.fused_score,
                })
                .collect(),
            chunks: results.into_iter().map(|r| r.text).collect(),
        })
    }

    async fn run_turn(
        &mut self,
        store: &IndexStore,
        embedder: &dyn EmbeddingProvider,
        generator: &dyn Generator,
        opts: &RetrievalOptions,
        question: &str,
        external: &ExternalContext,
    ) -> Result<(String, Vec<RetrievalResult>), AskError> {
        // A failed previous turn left the session at Failed; a new turn
        // implicitly passes through Idle again.
        self.state = SessionState::Retrieving;
        let results = match retrieve(store, embedder, question, opts).await {
            Ok(r) => r,
            Err(e) => {
                self.state = SessionState::Failed;
                return Err(e.into());
            }
        };

        self.state = SessionState::Generating;
        let prompt = assemble_prompt(self.role, &self.history, &results, external, question);
        let answer = match generator.generate(&prompt).await {
            Ok(a) => a,
            Err(e) => {
                self.state = SessionState::Failed;
                return Err(e.into());
            }
        };

        self.history.push_back(Turn {
            question: question.to_string(),
            answer: answer.clone(),
        });
        while self.history.len() > self.history_cap {
            self.history.pop_front();
        }

        self.state = SessionState::Ready;
        Ok((answer, results))
    }
}

/// Build the generation prompt. Sections with nothing to say are omitted
/// entirely rather than rendered empty.
pub fn assemble_prompt(
    role: Role,
    history: &VecDeque<Turn>,
    results: &[RetrievalResult],
    external: &ExternalContext,
    question: &str,
) -> String {
    let mut prompt = String::new();

    match role {
        Role::Other => prompt.push_str(role.instruction()),
        r => prompt.push_str(&format!(
            "You are an assistant helping a {}. {}",
            r.label(),
            r.instruction()
        )),
    }
    prompt.push('\n');

    if !history.is_empty() {
        prompt.push_str("\nChat History:\n");
        for turn in history {
            prompt.push_str(&format!("Q: {}\nA: {}\n", turn.question, turn.answer));
        }
    }

    if !results.is_empty() {
        prompt.push_str("\nContext:\n");
        for r in results {
            prompt.push_str(&format!(
                "[source: {}#{}]\n{}\n\n",
                r.document_path, r.chunk_index, r.text
            ));
        }
    }

    if let Some(dom) = &external.dom {
        prompt.push_str("\n[DOM CONTEXT]\n");
        prompt.push_str(dom);
        prompt.push('\n');
    }

    if let Some(trace) = &external.trace {
        prompt.push_str("\n[TRACE LOG]\n");
        prompt.push_str(trace);
        prompt.push('\n');
    }

    prompt.push_str(&format!("\nQuestion: {}\nAnswer:", question));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_document;
    use crate::embedding::HashProvider;
    use crate::store::IndexBuilder;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    /// Records every prompt it sees and answers with a counter.
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingGenerator {
        fn new() -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl Generator for RecordingGenerator {
        fn model_name(&self) -> &str {
            "recording"
        }

        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(prompt.to_string());
            Ok(format!("answer {}", prompts.len()))
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        fn model_name(&self) -> &str {
            "failing"
        }

        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            Err(GenerationError::Timeout(1))
        }
    }

    async fn build_index(path: &Path) {
        let embedder = HashProvider::new(128);
        let builder = IndexBuilder::create(path).await.unwrap();
        builder.put_meta("dims", "128").await.unwrap();
        let doc_id = builder
            .insert_document("auth.rs", "code")
            .await
            .unwrap();
        for chunk in chunk_document(
            "auth.rs",
            "fn login(user: &str) { /* validates credentials */ }",
            1000,
            150,
        ) {
            let vec = embedder.embed_query(&chunk.text).await.unwrap();
            builder.insert_chunk(doc_id, &chunk, &vec).await.unwrap();
        }
        builder.commit().await.unwrap();
    }

    #[test]
    fn test_role_parse_closed_set() {
        assert_eq!(Role::parse("developer"), Role::Developer);
        assert_eq!(Role::parse("TESTER"), Role::Tester);
        assert_eq!(Role::parse(" user "), Role::User);
        assert_eq!(Role::parse("wizard"), Role::Other);
        assert_eq!(Role::parse(""), Role::Other);
    }

    #[test]
    fn test_unknown_role_gets_default_instruction() {
        let prompt = assemble_prompt(
            Role::parse("wizard"),
            &VecDeque::new(),
            &[],
            &ExternalContext::default(),
            "hi",
        );
        assert!(prompt.starts_with("You are a helpful assistant."));
        assert!(!prompt.contains("wizard"));
    }

    #[test]
    fn test_prompt_sections_and_attribution() {
        let results = vec![RetrievalResult {
            chunk_id: 1,
            document_path: "src/auth.rs".to_string(),
            chunk_index: 0,
            text: "fn login() {}".to_string(),
            vector_score: 1.0,
            lexical_score: 0.5,
            fused_score: 0.75,
        }];
        let external = ExternalContext {
            dom: Some("button#submit".to_string()),
            trace: None,
        };
        let prompt = assemble_prompt(Role::Tester, &VecDeque::new(), &results, &external, "what?");

        assert!(prompt.contains("helping a tester"));
        assert!(prompt.contains("[source: src/auth.rs#0]"));
        assert!(prompt.contains("[DOM CONTEXT]\nbutton#submit"));
        assert!(!prompt.contains("[TRACE LOG]"), "omitted context stays out");
        assert!(prompt.ends_with("Question: what?\nAnswer:"));
    }

    #[tokio::test]
    async fn test_history_cap_drops_oldest_turns() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.sqlite");
        build_index(&path).await;
        let store = IndexStore::open(&path).await.unwrap();
        let embedder = HashProvider::new(128);
        let generator = RecordingGenerator::new();
        let opts = RetrievalOptions::default();

        let cap = 3;
        let mut session = Session::new(Role::Developer, cap);
        for i in 0..cap + 5 {
            session
                .ask(
                    &store,
                    &embedder,
                    &generator,
                    &opts,
                    &format!("question number {}", i),
                    &ExternalContext::default(),
                )
                .await
                .unwrap();
        }

        assert_eq!(session.history().len(), cap);

        // After cap + 5 completed turns, the next prompt must contain none
        // of the first five questions.
        session
            .ask(
                &store,
                &embedder,
                &generator,
                &opts,
                "one final question",
                &ExternalContext::default(),
            )
            .await
            .unwrap();
        let last_prompt = generator.last_prompt();
        for dropped in 0..5 {
            assert!(
                !last_prompt.contains(&format!("question number {}", dropped)),
                "dropped turn {} leaked into the prompt",
                dropped
            );
        }
        // The most recent capped turns are still present
        assert!(last_prompt.contains(&format!("question number {}", cap + 4)));
        store.close().await;
    }

    #[tokio::test]
    async fn test_failed_turn_not_recorded_session_survives() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.sqlite");
        build_index(&path).await;
        let store = IndexStore::open(&path).await.unwrap();
        let embedder = HashProvider::new(128);
        let opts = RetrievalOptions::default();

        let mut session = Session::new(Role::User, 5);

        let err = session
            .ask(
                &store,
                &embedder,
                &FailingGenerator,
                &opts,
                "does this fail?",
                &ExternalContext::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AskError::Generation(_)));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.history().is_empty(), "failed turn must not be recorded");

        // Session is still usable with a working generator
        let generator = RecordingGenerator::new();
        session
            .ask(
                &store,
                &embedder,
                &generator,
                &opts,
                "and now?",
                &ExternalContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.history().len(), 1);
        assert!(
            !generator.last_prompt().contains("does this fail?"),
            "failed turn must not appear in later prompts"
        );
        store.close().await;
    }

    #[tokio::test]
    async fn test_ask_debug_exposes_sources_without_changing_state() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.sqlite");
        build_index(&path).await;
        let store = IndexStore::open(&path).await.unwrap();
        let embedder = HashProvider::new(128);
        let generator = RecordingGenerator::new();
        let opts = RetrievalOptions::default();

        let mut session = Session::new(Role::Developer, 5);
        let debug = session
            .ask_debug(
                &store,
                &embedder,
                &generator,
                &opts,
                "what does login do?",
                &ExternalContext::default(),
            )
            .await
            .unwrap();

        assert!(!debug.sources.is_empty());
        assert_eq!(debug.sources[0], "auth.rs");
        assert_eq!(debug.sources.len(), debug.scores.len());
        assert_eq!(debug.sources.len(), debug.chunks.len());
        assert!(debug.chunks[0].contains("login"));
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.history().len(), 1);

        // A plain ask over the same question yields the same answer shape:
        // debug exposure did not perturb ranking or history handling.
        let mut plain = Session::new(Role::Developer, 5);
        plain
            .ask(
                &store,
                &embedder,
                &generator,
                &opts,
                "what does login do?",
                &ExternalContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(plain.history().len(), 1);
        store.close().await;
    }
}
