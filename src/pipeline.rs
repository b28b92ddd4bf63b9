//! Report pipeline and re-entrancy control.
//!
//! A run builds the region query, fetches and captures the region list, then
//! builds and fetches the state query, reconciles and renders. All state is
//! owned by the run. [`Trigger`] decides what happens when a new run starts
//! while another is still in flight.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::error::{ReportError, Result};
use crate::fetcher::OccurrenceSource;
use crate::query::{FormInput, OccurrenceQuery, QueryTemplate};
use crate::reconcile::{Reconciliation, RegionCapture};
use crate::reference::ReferenceTable;
use crate::render::{render, RenderOptions, RenderedList};

/// Everything a run needs, shared read-only between runs.
pub struct Pipeline {
    source: Arc<dyn OccurrenceSource>,
    template: QueryTemplate,
    reference: Arc<ReferenceTable>,
    render_options: RenderOptions,
}

impl Pipeline {
    pub fn new(source: Arc<dyn OccurrenceSource>, template: QueryTemplate) -> Self {
        Self {
            source,
            template,
            reference: Arc::new(ReferenceTable::new()),
            render_options: RenderOptions::default(),
        }
    }

    pub fn with_reference(mut self, reference: ReferenceTable) -> Self {
        self.reference = Arc::new(reference);
        self
    }

    pub fn with_render_options(mut self, options: RenderOptions) -> Self {
        self.render_options = options;
        self
    }

    pub fn template(&self) -> &QueryTemplate {
        &self.template
    }

    /// Run both queries in order and render the difference.
    pub async fn run(&self, input: &FormInput) -> Result<Report> {
        input.validate()?;
        let facet_field = self.template.facet_field();

        let region_query = self.template.region_query(input);
        info!("Fetching region list for {}", region_query.fips);
        let region_payload = self.source.fetch(&region_query).await?;
        let capture = RegionCapture::capture_region(&region_payload, facet_field)?;
        debug!("Captured {} region species", capture.len());

        // The state query is only issued once the region list is in hand.
        let state_query = self.template.state_query(input);
        info!("Fetching state list for {}", state_query.fips);
        let state_payload = self.source.fetch(&state_query).await?;
        let reconciliation = capture.reconcile(&state_payload, facet_field)?;

        let rendered = render(&reconciliation, &self.reference, &self.render_options);
        info!(
            "{} of {} region species are absent from {}",
            rendered.count,
            reconciliation.region_len(),
            state_query.fips
        );

        Ok(Report {
            input: input.clone(),
            region_query,
            state_query,
            reconciliation,
            rendered,
            reference: Arc::clone(&self.reference),
            generated_at: Utc::now(),
        })
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct Report {
    pub input: FormInput,
    pub region_query: OccurrenceQuery,
    pub state_query: OccurrenceQuery,
    pub reconciliation: Reconciliation,
    pub rendered: RenderedList,
    reference: Arc<ReferenceTable>,
    pub generated_at: DateTime<Utc>,
}

/// Machine-readable view of a report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary<'a> {
    pub code: &'a str,
    pub group: &'a str,
    pub count: usize,
    pub region_total: usize,
    pub state_total: usize,
    pub region_url: &'a str,
    pub state_url: &'a str,
    pub generated_at: DateTime<Utc>,
    pub species: Vec<SurvivingSpecies<'a>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SurvivingSpecies<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
}

impl Report {
    /// Number of surviving species.
    pub fn count(&self) -> usize {
        self.rendered.count
    }

    pub fn html(&self) -> &str {
        &self.rendered.html
    }

    pub fn summary(&self) -> ReportSummary<'_> {
        ReportSummary {
            code: &self.input.code,
            group: &self.input.group,
            count: self.count(),
            region_total: self.reconciliation.region_len(),
            state_total: self.reconciliation.state_len(),
            region_url: &self.region_query.url,
            state_url: &self.state_query.url,
            generated_at: self.generated_at,
            species: self
                .reconciliation
                .survivors()
                .map(|s| SurvivingSpecies {
                    name: &s.name,
                    occurrences: s.occurrences,
                    description: self.reference.describe(&s.name),
                })
                .collect(),
        }
    }
}

/// What a new trigger does to a run still in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunPolicy {
    /// Abort the in-flight run; its handle resolves to `Cancelled`.
    #[default]
    CancelPrevious,
    /// Wait for in-flight runs so that runs never overlap.
    Queue,
}

/// Entry point that turns input into spawned runs.
pub struct Trigger {
    pipeline: Arc<Pipeline>,
    policy: RunPolicy,
    in_flight: Mutex<Option<AbortHandle>>,
    queue: Arc<tokio::sync::Mutex<()>>,
}

impl Trigger {
    pub fn new(pipeline: Pipeline, policy: RunPolicy) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            policy,
            in_flight: Mutex::new(None),
            queue: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn policy(&self) -> RunPolicy {
        self.policy
    }

    /// Start a run. Must be called from within a tokio runtime.
    pub fn trigger(&self, input: FormInput) -> RunHandle {
        let pipeline = Arc::clone(&self.pipeline);
        let join = match self.policy {
            RunPolicy::CancelPrevious => {
                let mut slot = self
                    .in_flight
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if let Some(previous) = slot.take() {
                    if !previous.is_finished() {
                        warn!("New run triggered; cancelling the run in flight");
                        previous.abort();
                    }
                }
                let join = tokio::spawn(async move { pipeline.run(&input).await });
                *slot = Some(join.abort_handle());
                join
            }
            RunPolicy::Queue => {
                let queue = Arc::clone(&self.queue);
                tokio::spawn(async move {
                    let _turn = queue.lock_owned().await;
                    pipeline.run(&input).await
                })
            }
        };
        RunHandle { join }
    }
}

/// Handle to a spawned run.
pub struct RunHandle {
    join: JoinHandle<Result<Report>>,
}

impl RunHandle {
    /// Abort the run. Waiting on it afterwards yields `Cancelled`.
    pub fn cancel(&self) {
        self.join.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the run to finish.
    pub async fn wait(self) -> Result<Report> {
        match self.join.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(ReportError::Cancelled),
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;

    use crate::models::FacetPayload;
    use crate::query::QueryScope;

    fn payload(names: &[&str]) -> FacetPayload {
        let rows: Vec<_> = names.iter().map(|n| json!([n])).collect();
        FacetPayload::new(json!({
            "facet_counts": { "facet_fields": { "ITISscientificName": rows } }
        }))
    }

    /// Answers by `computedStateFips` value and records the call order.
    #[derive(Default)]
    struct StubSource {
        answers: HashMap<String, FacetPayload>,
        calls: Mutex<Vec<(QueryScope, String)>>,
    }

    impl StubSource {
        fn with(mut self, fips: &str, names: &[&str]) -> Self {
            self.answers.insert(fips.to_string(), payload(names));
            self
        }
    }

    #[async_trait]
    impl OccurrenceSource for StubSource {
        async fn fetch(&self, query: &OccurrenceQuery) -> Result<FacetPayload> {
            self.calls
                .lock()
                .unwrap()
                .push((query.scope, query.fips.clone()));
            if query.fips.contains("hang") {
                std::future::pending::<()>().await;
            }
            self.answers
                .get(&query.fips)
                .cloned()
                .ok_or_else(|| ReportError::NetworkFailure(format!("no stub for {}", query.fips)))
        }
    }

    fn pipeline(source: Arc<dyn OccurrenceSource>) -> Pipeline {
        Pipeline::new(source, QueryTemplate::default())
    }

    #[tokio::test]
    async fn test_run_region_minus_state() {
        let source = Arc::new(
            StubSource::default()
                .with("037X", &["A", "B", "A", "C"])
                .with("06X", &["A"]),
        );
        let mut reference = ReferenceTable::new();
        reference.insert("C", "(desc C)");

        let report = pipeline(source.clone())
            .with_reference(reference)
            .run(&FormInput::new("06037", "X"))
            .await
            .unwrap();

        assert_eq!(report.count(), 2);
        assert!(report.html().contains("There are 2 species of non-natives"));
        assert!(report.html().contains(">C</a> (desc C)"));

        let calls = source.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                (QueryScope::Region, "037X".to_string()),
                (QueryScope::State, "06X".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_summary() {
        let source = Arc::new(
            StubSource::default()
                .with("037X", &["A", "B"])
                .with("06X", &["B"]),
        );
        let mut reference = ReferenceTable::new();
        reference.insert("A", "(a)");
        let report = pipeline(source)
            .with_reference(reference)
            .run(&FormInput::new("06037", "X"))
            .await
            .unwrap();

        let summary = serde_json::to_value(report.summary()).unwrap();
        assert_eq!(summary["count"], 1);
        assert_eq!(summary["region_total"], 2);
        assert_eq!(summary["state_total"], 1);
        assert_eq!(summary["species"][0]["name"], "A");
        assert_eq!(summary["species"][0]["description"], "(a)");
    }

    #[tokio::test]
    async fn test_blank_input_fetches_nothing() {
        let source = Arc::new(StubSource::default());
        let err = pipeline(source.clone())
            .run(&FormInput::new("", "X"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::EmptyInput { field: "code" }));
        assert!(source.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_region_failure_skips_state_fetch() {
        let source = Arc::new(StubSource::default().with("06X", &["A"]));
        let err = pipeline(source.clone())
            .run(&FormInput::new("06037", "X"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::NetworkFailure(_)));
        assert_eq!(source.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_new_trigger_cancels_run_in_flight() {
        let source = Arc::new(
            StubSource::default()
                .with("037X", &["A", "B"])
                .with("06X", &[]),
        );
        let trigger = Trigger::new(pipeline(source), RunPolicy::CancelPrevious);

        // Any fips containing "hang" never answers.
        let first = trigger.trigger(FormInput::new("06037", "hang"));
        tokio::task::yield_now().await;
        let second = trigger.trigger(FormInput::new("06037", "X"));

        assert!(matches!(first.wait().await, Err(ReportError::Cancelled)));
        assert_eq!(second.wait().await.unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_cancel_handle() {
        let source = Arc::new(StubSource::default());
        let trigger = Trigger::new(pipeline(source), RunPolicy::Queue);
        let run = trigger.trigger(FormInput::new("06037", "hang"));
        run.cancel();
        assert!(matches!(run.wait().await, Err(ReportError::Cancelled)));
    }

    /// Blocks every region fetch until released.
    struct GatedSource {
        gate: Notify,
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl OccurrenceSource for GatedSource {
        async fn fetch(&self, query: &OccurrenceQuery) -> Result<FacetPayload> {
            if query.scope == QueryScope::Region {
                self.events.lock().unwrap().push("start".to_string());
                self.gate.notified().await;
                Ok(payload(&["A"]))
            } else {
                self.events.lock().unwrap().push("end".to_string());
                Ok(payload(&[]))
            }
        }
    }

    #[tokio::test]
    async fn test_queued_runs_do_not_overlap() {
        let source = Arc::new(GatedSource {
            gate: Notify::new(),
            events: Mutex::new(Vec::new()),
        });
        let trigger = Trigger::new(pipeline(source.clone()), RunPolicy::Queue);

        let first = trigger.trigger(FormInput::new("06037", "X"));
        let second = trigger.trigger(FormInput::new("06037", "X"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.events.lock().unwrap().len(), 1);

        source.gate.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;
        source.gate.notify_one();

        assert_eq!(first.wait().await.unwrap().count(), 1);
        assert_eq!(second.wait().await.unwrap().count(), 1);
        assert_eq!(
            source.events.lock().unwrap().clone(),
            vec!["start", "end", "start", "end"]
        );
    }
}
