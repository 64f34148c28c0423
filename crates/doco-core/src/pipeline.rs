//! Ingestion and retrieval-augmented answering.
//!
//! The [`Pipeline`] owns one of each collaborator and runs three
//! operations over them:
//!
//! | Operation | Steps |
//! |-----------|-------|
//! | [`ingest`](Pipeline::ingest) | extract → chunk → embed (`Document`) → persist |
//! | [`answer`](Pipeline::answer) | embed (`Query`) → vector search → build prompt → generate → parse |
//! | [`summarize`](Pipeline::summarize) | generate with the document inline → parse |
//!
//! Every stage fails fast with the matching [`PipelineError`] variant. There
//! is no retry and no compensating delete: a persistence failure halfway
//! through a batch leaves the earlier chunks in the store until they expire.

use std::sync::Arc;

use anyhow::anyhow;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::chunk::{chunk_text, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::embedding::{Embedder, EmbeddingPurpose};
use crate::error::PipelineError;
use crate::models::{AnalysisResult, Document, NewChunk};
use crate::prompt;
use crate::provider::{AnswerGenerator, GenerationRequest, TextExtractor};
use crate::store::{ChunkStore, VectorSearchParams};

/// Tuning knobs for the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub search: VectorSearchParams,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            search: VectorSearchParams::default(),
        }
    }
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Number of chunks persisted (indices `0..chunks`).
    pub chunks: usize,
    /// Characters of extracted text.
    pub characters: usize,
    /// SHA-256 of the uploaded bytes, hex encoded.
    pub digest: String,
}

/// Text extracted from a document and its chunk windows, before embedding.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub text: String,
    pub chunks: Vec<String>,
}

pub struct Pipeline {
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn ChunkStore>,
    generator: Arc<dyn AnswerGenerator>,
    params: PipelineParams,
}

impl Pipeline {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn ChunkStore>,
        generator: Arc<dyn AnswerGenerator>,
        params: PipelineParams,
    ) -> Self {
        Self {
            extractor,
            embedder,
            store,
            generator,
            params,
        }
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    /// Every vector must have the embedder's declared length. An embedder
    /// that declares 0 dimensions is not checked.
    fn check_dims(&self, vectors: &[Vec<f32>]) -> Result<(), PipelineError> {
        let dims = self.embedder.dims();
        if dims == 0 {
            return Ok(());
        }
        match vectors.iter().find(|v| v.len() != dims) {
            Some(v) => Err(PipelineError::Embedding(anyhow!(
                "{} returned a {}-dim vector, expected {}",
                self.embedder.model_name(),
                v.len(),
                dims
            ))),
            None => Ok(()),
        }
    }

    /// Extract and chunk without embedding or persisting anything.
    pub async fn prepare(&self, document: &Document) -> Result<PreparedDocument, PipelineError> {
        let text = self
            .extractor
            .extract_text(document)
            .await
            .map_err(PipelineError::Extraction)?;

        if text.trim().is_empty() {
            return Err(PipelineError::Extraction(anyhow!(
                "{} extractor returned no text",
                self.extractor.name()
            )));
        }

        let chunks = chunk_text(&text, self.params.chunk_size, self.params.chunk_overlap)
            .map_err(|e| PipelineError::InvalidArgument(e.to_string()))?;

        debug!(
            extractor = self.extractor.name(),
            characters = text.chars().count(),
            chunks = chunks.len(),
            "document prepared"
        );

        Ok(PreparedDocument { text, chunks })
    }

    /// Extract, chunk, embed and persist a document.
    ///
    /// Returns only after every chunk is persisted.
    pub async fn ingest(&self, document: &Document) -> Result<IngestReport, PipelineError> {
        let digest = format!("{:x}", Sha256::digest(&document.bytes));
        info!(
            digest = %digest,
            media_type = %document.media_type,
            bytes = document.bytes.len(),
            "ingest started"
        );

        let prepared = self.prepare(document).await?;

        let embeddings = self
            .embedder
            .embed(&prepared.chunks, EmbeddingPurpose::Document)
            .await
            .map_err(PipelineError::Embedding)?;

        if embeddings.len() != prepared.chunks.len() {
            return Err(PipelineError::Embedding(anyhow!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                prepared.chunks.len()
            )));
        }
        self.check_dims(&embeddings)?;

        let batch: Vec<NewChunk> = prepared
            .chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (text, embedding))| NewChunk {
                index: i as i64,
                text,
                embedding,
            })
            .collect();

        self.store
            .insert_chunks(&batch)
            .await
            .map_err(PipelineError::Persistence)?;

        let report = IngestReport {
            chunks: batch.len(),
            characters: prepared.text.chars().count(),
            digest,
        };
        info!(
            digest = %report.digest,
            chunks = report.chunks,
            model = self.embedder.model_name(),
            "ingest complete"
        );
        Ok(report)
    }

    /// Answer a question from the chunks currently in the store.
    pub async fn answer(&self, question: &str) -> Result<AnalysisResult, PipelineError> {
        if question.trim().is_empty() {
            return Err(PipelineError::InvalidArgument(
                "question must not be empty".to_string(),
            ));
        }

        let query_vec = self
            .embedder
            .embed_one(question, EmbeddingPurpose::Query)
            .await
            .map_err(PipelineError::Embedding)?;
        self.check_dims(std::slice::from_ref(&query_vec))?;

        let hits = self
            .store
            .vector_search(&query_vec, &self.params.search)
            .await
            .map_err(PipelineError::Search)?;

        if hits.is_empty() {
            warn!("vector search returned no live chunks; answering without context");
        } else {
            debug!(
                hits = hits.len(),
                top_score = hits[0].score,
                "retrieved context"
            );
        }

        let context = prompt::build_context(&hits);
        let full_prompt = prompt::build_prompt(&context, question);
        let instruction = prompt::answer_instruction();
        let schema = prompt::analysis_schema();

        let raw = self
            .generator
            .generate(&GenerationRequest {
                system_instruction: &instruction,
                prompt: Some(&full_prompt),
                document: None,
                response_schema: &schema,
            })
            .await
            .map_err(PipelineError::Generation)?;

        parse_analysis(&raw)
    }

    /// Summarize a document directly, without touching the chunk store.
    pub async fn summarize(
        &self,
        document: &Document,
        custom_prompt: Option<&str>,
    ) -> Result<AnalysisResult, PipelineError> {
        let text_prompt = custom_prompt
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(prompt::DEFAULT_SUMMARY_PROMPT);
        let schema = prompt::analysis_schema();

        let raw = self
            .generator
            .generate(&GenerationRequest {
                system_instruction: prompt::SUMMARY_INSTRUCTION,
                prompt: Some(text_prompt),
                document: Some(document),
                response_schema: &schema,
            })
            .await
            .map_err(PipelineError::Generation)?;

        parse_analysis(&raw)
    }
}

/// Parse generator output into an [`AnalysisResult`].
///
/// Accepts bare JSON or JSON wrapped in a Markdown code fence.
pub fn parse_analysis(raw: &str) -> Result<AnalysisResult, PipelineError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(PipelineError::Generation(anyhow!(
            "generator returned an empty response"
        )));
    }
    serde_json::from_str(body).map_err(|e| {
        PipelineError::Generation(anyhow!("response is not a valid analysis result: {}", e))
    })
}

/// Trim a Markdown code fence (```` ```json ... ``` ````) if present.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::ScoredChunk;
    use crate::store::memory::InMemoryStore;
    use crate::store::{default_ttl, StoreStats};
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedExtractor(String);

    #[async_trait]
    impl TextExtractor for FixedExtractor {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn extract_text(&self, _document: &Document) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct FailingExtractor;

    #[async_trait]
    impl TextExtractor for FailingExtractor {
        fn name(&self) -> &str {
            "failing"
        }
        async fn extract_text(&self, _document: &Document) -> Result<String> {
            anyhow::bail!("service returned malformed output")
        }
    }

    /// Letter-frequency vectors: texts sharing letters score as similar.
    #[derive(Default)]
    struct LetterEmbedder {
        purposes: Mutex<Vec<EmbeddingPurpose>>,
        drop_last: bool,
        /// Truncate vectors produced for this purpose to three values.
        short_for: Option<EmbeddingPurpose>,
    }

    fn letters(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; 26];
        for c in text.to_ascii_lowercase().chars() {
            if c.is_ascii_lowercase() {
                v[(c as u8 - b'a') as usize] += 1.0;
            }
        }
        v
    }

    #[async_trait]
    impl Embedder for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }
        fn dims(&self) -> usize {
            26
        }
        async fn embed(
            &self,
            texts: &[String],
            purpose: EmbeddingPurpose,
        ) -> Result<Vec<Vec<f32>>> {
            self.purposes.lock().unwrap().push(purpose);
            let mut out: Vec<Vec<f32>> = texts.iter().map(|t| letters(t)).collect();
            if self.short_for == Some(purpose) {
                for v in &mut out {
                    v.truncate(3);
                }
            }
            if self.drop_last {
                out.pop();
            }
            Ok(out)
        }
    }

    /// Store that fails on the nth write.
    struct FlakyStore {
        inner: InMemoryStore,
        fail_at: usize,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl ChunkStore for FlakyStore {
        async fn insert_chunk(&self, chunk: &NewChunk) -> Result<()> {
            let n = self.writes.fetch_add(1, Ordering::SeqCst);
            if n == self.fail_at {
                anyhow::bail!("write {} rejected", n);
            }
            self.inner.insert_chunk(chunk).await
        }
        async fn vector_search(
            &self,
            query: &[f32],
            params: &VectorSearchParams,
        ) -> Result<Vec<ScoredChunk>> {
            self.inner.vector_search(query, params).await
        }
        async fn purge_expired(&self) -> Result<u64> {
            self.inner.purge_expired().await
        }
        async fn stats(&self) -> Result<StoreStats> {
            self.inner.stats().await
        }
    }

    /// Answers from the context when the keyword is present, otherwise
    /// returns the fallback sentence. Records the last prompt.
    #[derive(Default)]
    struct KeywordGenerator {
        last_prompt: Mutex<Option<String>>,
        last_instruction: Mutex<Option<String>>,
        raw_override: Option<String>,
    }

    #[async_trait]
    impl AnswerGenerator for KeywordGenerator {
        fn model_name(&self) -> &str {
            "keyword"
        }
        async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
            let p = request.prompt.unwrap_or_default().to_string();
            *self.last_prompt.lock().unwrap() = Some(p.clone());
            *self.last_instruction.lock().unwrap() = Some(request.system_instruction.to_string());
            if let Some(raw) = &self.raw_override {
                return Ok(raw.clone());
            }
            let summary = if p.contains("Paris") {
                "The capital is Paris.".to_string()
            } else {
                prompt::NOT_FOUND_ANSWER.to_string()
            };
            Ok(serde_json::to_string(&AnalysisResult {
                summary,
                key_points: vec![],
                action_items: vec![],
                tone: "Neutral".to_string(),
            })?)
        }
    }

    const FRANCE: &str = "France is a country in Europe. Its capital city is Paris, \
        which sits on the Seine. Paris hosts the Louvre museum.";

    fn doc() -> Document {
        Document::new(b"%PDF-fake".to_vec(), "application/pdf")
    }

    fn small_params() -> PipelineParams {
        PipelineParams {
            chunk_size: 40,
            chunk_overlap: 10,
            search: VectorSearchParams {
                num_candidates: 100,
                limit: 5,
            },
        }
    }

    struct Harness {
        pipeline: Pipeline,
        embedder: Arc<LetterEmbedder>,
        store: Arc<InMemoryStore>,
        generator: Arc<KeywordGenerator>,
        clock: Arc<ManualClock>,
    }

    fn harness(text: &str) -> Harness {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        ));
        let store = Arc::new(InMemoryStore::with_clock(default_ttl(), clock.clone()));
        let embedder = Arc::new(LetterEmbedder::default());
        let generator = Arc::new(KeywordGenerator::default());
        let pipeline = Pipeline::new(
            Arc::new(FixedExtractor(text.to_string())),
            embedder.clone(),
            store.clone(),
            generator.clone(),
            small_params(),
        );
        Harness {
            pipeline,
            embedder,
            store,
            generator,
            clock,
        }
    }

    #[tokio::test]
    async fn test_ingest_persists_every_chunk_with_index() {
        let h = harness(FRANCE);
        let report = h.pipeline.ingest(&doc()).await.unwrap();
        let expected = chunk_text(FRANCE, 40, 10).unwrap();

        assert_eq!(report.chunks, expected.len());
        let stored = h.store.all_chunks();
        assert_eq!(stored.len(), expected.len());
        for (i, c) in stored.iter().enumerate() {
            assert_eq!(c.index, i as i64);
            assert_eq!(c.text, expected[i]);
        }
        assert_eq!(
            *h.embedder.purposes.lock().unwrap(),
            vec![EmbeddingPurpose::Document]
        );
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent_in_shape() {
        let h = harness(FRANCE);
        let first = h.pipeline.ingest(&doc()).await.unwrap();
        let second = h.pipeline.ingest(&doc()).await.unwrap();
        assert_eq!(first, second);

        let stored = h.store.all_chunks();
        let (a, b) = stored.split_at(first.chunks);
        let ia: Vec<i64> = a.iter().map(|c| c.index).collect();
        let ib: Vec<i64> = b.iter().map(|c| c.index).collect();
        assert_eq!(ia, ib);
    }

    #[tokio::test]
    async fn test_extraction_failure() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = Pipeline::new(
            Arc::new(FailingExtractor),
            Arc::new(LetterEmbedder::default()),
            store.clone(),
            Arc::new(KeywordGenerator::default()),
            small_params(),
        );
        let err = pipeline.ingest(&doc()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_blank_extraction_is_an_error() {
        let h = harness("   \n  ");
        let err = h.pipeline.ingest(&doc()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)));
    }

    #[tokio::test]
    async fn test_embedding_count_mismatch() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = Pipeline::new(
            Arc::new(FixedExtractor(FRANCE.to_string())),
            Arc::new(LetterEmbedder {
                drop_last: true,
                ..Default::default()
            }),
            store.clone(),
            Arc::new(KeywordGenerator::default()),
            small_params(),
        );
        let err = pipeline.ingest(&doc()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Embedding(_)));
        assert!(store.is_empty(), "nothing is written before embeddings check out");
    }

    fn short_vector_pipeline(purpose: EmbeddingPurpose, store: Arc<InMemoryStore>) -> Pipeline {
        Pipeline::new(
            Arc::new(FixedExtractor(FRANCE.to_string())),
            Arc::new(LetterEmbedder {
                short_for: Some(purpose),
                ..Default::default()
            }),
            store,
            Arc::new(KeywordGenerator::default()),
            small_params(),
        )
    }

    #[tokio::test]
    async fn test_document_vectors_must_match_dims() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = short_vector_pipeline(EmbeddingPurpose::Document, store.clone());
        let err = pipeline.ingest(&doc()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Embedding(_)));
        assert!(err.to_string().contains("3-dim"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_query_vector_must_match_dims() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = short_vector_pipeline(EmbeddingPurpose::Query, store.clone());
        pipeline.ingest(&doc()).await.unwrap();
        let err = pipeline.answer("What is the capital?").await.unwrap_err();
        assert!(matches!(err, PipelineError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_persistence_failure_aborts_remaining_writes() {
        let flaky = Arc::new(FlakyStore {
            inner: InMemoryStore::new(),
            fail_at: 1,
            writes: AtomicUsize::new(0),
        });
        let pipeline = Pipeline::new(
            Arc::new(FixedExtractor(FRANCE.to_string())),
            Arc::new(LetterEmbedder::default()),
            flaky.clone(),
            Arc::new(KeywordGenerator::default()),
            small_params(),
        );
        let err = pipeline.ingest(&doc()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Persistence(_)));
        // first write landed, the failing one stopped the rest
        assert_eq!(flaky.writes.load(Ordering::SeqCst), 2);
        assert_eq!(flaky.inner.len(), 1);
    }

    #[tokio::test]
    async fn test_answer_uses_query_purpose_and_context() {
        let h = harness(FRANCE);
        h.pipeline.ingest(&doc()).await.unwrap();
        let result = h.pipeline.answer("What is the capital of France?").await.unwrap();

        assert_eq!(result.summary, "The capital is Paris.");
        assert_eq!(
            *h.embedder.purposes.lock().unwrap(),
            vec![EmbeddingPurpose::Document, EmbeddingPurpose::Query]
        );

        let sent = h.generator.last_prompt.lock().unwrap().clone().unwrap();
        assert!(sent.ends_with(" \n\n What is the capital of France?"));
        assert!(sent.contains(prompt::CONTEXT_DELIMITER));
        let instruction = h.generator.last_instruction.lock().unwrap().clone().unwrap();
        assert!(instruction.contains(prompt::NOT_FOUND_ANSWER));
    }

    #[tokio::test]
    async fn test_answer_returns_fallback_when_context_lacks_answer() {
        let h = harness("Quarterly revenue grew by four percent across all regions.");
        h.pipeline.ingest(&doc()).await.unwrap();
        let result = h.pipeline.answer("Who painted the Mona Lisa?").await.unwrap();
        assert_eq!(result.summary, prompt::NOT_FOUND_ANSWER);
    }

    #[tokio::test]
    async fn test_answer_limits_context_to_top_k() {
        let long = "Paris is lovely in spring. ".repeat(40);
        let h = harness(&long);
        h.pipeline.ingest(&doc()).await.unwrap();
        h.pipeline.answer("Paris?").await.unwrap();
        let sent = h.generator.last_prompt.lock().unwrap().clone().unwrap();
        assert_eq!(sent.matches(prompt::CONTEXT_DELIMITER).count(), 4);
    }

    #[tokio::test]
    async fn test_answer_after_ttl_has_no_context() {
        let h = harness(FRANCE);
        h.pipeline.ingest(&doc()).await.unwrap();
        h.clock.advance(Duration::minutes(25));
        let result = h.pipeline.answer("What is the capital of France?").await.unwrap();
        assert_eq!(result.summary, prompt::NOT_FOUND_ANSWER);
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let h = harness(FRANCE);
        let err = h.pipeline.answer("   ").await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_unparseable_generation() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = Pipeline::new(
            Arc::new(FixedExtractor(FRANCE.to_string())),
            Arc::new(LetterEmbedder::default()),
            store,
            Arc::new(KeywordGenerator {
                raw_override: Some("not json".to_string()),
                ..Default::default()
            }),
            small_params(),
        );
        let err = pipeline.answer("anything").await.unwrap_err();
        assert!(matches!(err, PipelineError::Generation(_)));
    }

    #[tokio::test]
    async fn test_summarize_sends_document_inline() {
        let h = harness(FRANCE);
        let result = h.pipeline.summarize(&doc(), None).await.unwrap();
        assert_eq!(result.tone, "Neutral");
        let sent = h.generator.last_prompt.lock().unwrap().clone().unwrap();
        assert_eq!(sent, prompt::DEFAULT_SUMMARY_PROMPT);
        assert!(h.store.is_empty());
    }

    #[test]
    fn test_parse_analysis_variants() {
        let json = r#"{"summary":"s","keyPoints":[],"actionItems":[],"tone":"Calm"}"#;
        assert_eq!(parse_analysis(json).unwrap().tone, "Calm");
        let fenced = format!("```json\n{}\n```", json);
        assert_eq!(parse_analysis(&fenced).unwrap().summary, "s");
        assert!(matches!(
            parse_analysis("  "),
            Err(PipelineError::Generation(_))
        ));
        assert!(parse_analysis(r#"{"summary":"s"}"#).is_err());
    }
}
