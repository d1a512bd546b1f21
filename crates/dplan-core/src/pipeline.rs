use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::breadth::{self, BreadthRecommender, EngineRecommender};
use crate::catalog::{CatalogStore, EmptyCatalog, JsonCatalog};
use crate::config::{ConfigError, PlannerConfig};
use crate::edit::{self, EditOutcome};
use crate::error::PlanError;
use crate::external::{
    EngineError, EngineResponse, ExternalEngine, UnconfiguredEngine, build_engine,
};
use crate::llm::ChatClient;
use crate::merge::CourseSetMerger;
use crate::model::{ResolvedCourseSet, Transcript};
use crate::oracle::{DecisionOracle, LlmDecisionOracle, UnavailableOracle};
use crate::preferences::Preferences;
use crate::request::{GraduationTerm, build_schedule_request};
use crate::requirements;
use crate::resolver;

pub type StageProgressCallback = Arc<dyn Fn(StageProgressEvent) + Send + Sync + 'static>;

#[derive(Debug, Clone, Serialize)]
pub struct StageProgressEvent {
    pub kind: StageProgressEventKind,
    pub stage: Option<String>,
    pub elapsed_ms: f64,
    pub stage_elapsed_ms: Option<f64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageProgressEventKind {
    Begin,
    End,
    Note,
}

struct StageLogger {
    run_start: Instant,
    stage_start: Instant,
    current_stage: Option<String>,
    callback: Option<StageProgressCallback>,
}

impl StageLogger {
    fn new(callback: Option<StageProgressCallback>) -> Self {
        let now = Instant::now();
        Self {
            run_start: now,
            stage_start: now,
            current_stage: None,
            callback,
        }
    }

    fn begin(&mut self, name: &str) {
        let since_start = self.run_start.elapsed();
        info!(stage = name, elapsed_ms = %format_ms(since_start), "BEGIN");
        self.stage_start = Instant::now();
        self.current_stage = Some(name.to_string());
        self.emit(
            StageProgressEventKind::Begin,
            None,
            format!("Starting {name}"),
        );
    }

    fn end(&mut self) {
        let Some(name) = self.current_stage.clone() else {
            return;
        };
        let stage_elapsed = self.stage_start.elapsed();
        info!(
            stage = %name,
            elapsed_ms = %format_ms(self.run_start.elapsed()),
            stage_ms = %format_ms(stage_elapsed),
            "END"
        );
        self.emit(
            StageProgressEventKind::End,
            Some(stage_elapsed),
            format!("Finished {name} (Δ {} ms)", format_ms(stage_elapsed)),
        );
        self.current_stage = None;
    }

    fn note(&self, message: impl Into<String>) {
        let text = message.into();
        info!(stage = ?self.current_stage, "{text}");
        self.emit(
            StageProgressEventKind::Note,
            Some(self.stage_start.elapsed()),
            text,
        );
    }

    fn emit(&self, kind: StageProgressEventKind, stage_elapsed: Option<Duration>, message: String) {
        if let Some(cb) = &self.callback {
            cb(StageProgressEvent {
                kind,
                stage: self.current_stage.clone(),
                elapsed_ms: self.run_start.elapsed().as_secs_f64() * 1_000.0,
                stage_elapsed_ms: stage_elapsed.map(|d| d.as_secs_f64() * 1_000.0),
                message: Some(message),
            });
        }
    }
}

fn format_ms(d: Duration) -> String {
    format!("{:.3}", d.as_secs_f64() * 1_000.0)
}

/// Collaborators and timeouts for one process lifetime.
#[derive(Clone)]
pub struct PlannerContext {
    pub oracle: Arc<dyn DecisionOracle>,
    pub recommender: Arc<dyn BreadthRecommender>,
    pub engine: Arc<dyn ExternalEngine>,
    pub editor: Arc<dyn ExternalEngine>,
    pub catalog: Arc<dyn CatalogStore>,
    pub oracle_timeout: Duration,
    pub recommender_timeout: Duration,
    pub progress: Option<StageProgressCallback>,
}

impl PlannerContext {
    /// Context with the given oracle and every other collaborator unconfigured.
    pub fn new(oracle: Arc<dyn DecisionOracle>) -> Self {
        let config = PlannerConfig::default();
        Self {
            oracle,
            recommender: Arc::new(EngineRecommender::new(Arc::new(UnconfiguredEngine::new(
                "technical breadth recommender",
            )))),
            engine: Arc::new(UnconfiguredEngine::new("timetable engine")),
            editor: Arc::new(UnconfiguredEngine::new("schedule edit interpreter")),
            catalog: Arc::new(EmptyCatalog),
            oracle_timeout: config.oracle_timeout(),
            recommender_timeout: config.recommender_timeout(),
            progress: None,
        }
    }

    pub fn from_config(config: &PlannerConfig) -> Result<Self, ConfigError> {
        let oracle: Arc<dyn DecisionOracle> = match config.oracle.resolve_api_key() {
            Some(key) => {
                let client = ChatClient::new(
                    &config.oracle.base_url,
                    Some(key),
                    &config.oracle.model,
                    config.oracle.temperature,
                    config.oracle_timeout(),
                )
                .map_err(|err| ConfigError::Client(err.to_string()))?;
                Arc::new(LlmDecisionOracle::new(client))
            }
            None => {
                warn!("No oracle API key configured; decision queries will fail");
                Arc::new(UnavailableOracle::new("no API key configured"))
            }
        };

        let engine_err = |err: EngineError| ConfigError::Client(err.to_string());
        let recommender_engine = build_engine(
            "technical breadth recommender",
            &config.recommender,
            config.recommender_timeout(),
        )
        .map_err(engine_err)?;
        let engine = build_engine("timetable engine", &config.engine, config.engine_timeout())
            .map_err(engine_err)?;
        let editor = build_engine(
            "schedule edit interpreter",
            &config.editor,
            config.editor_timeout(),
        )
        .map_err(engine_err)?;

        let catalog: Arc<dyn CatalogStore> = match config.catalog.resolved_path() {
            Some(path) => Arc::new(
                JsonCatalog::load(&path).map_err(|err| ConfigError::Client(err.to_string()))?,
            ),
            None => Arc::new(EmptyCatalog),
        };

        Ok(Self {
            oracle,
            recommender: Arc::new(EngineRecommender::new(recommender_engine)),
            engine,
            editor,
            catalog,
            oracle_timeout: config.oracle_timeout(),
            recommender_timeout: config.recommender_timeout(),
            progress: None,
        })
    }

    pub fn with_recommender(mut self, recommender: Arc<dyn BreadthRecommender>) -> Self {
        self.recommender = recommender;
        self
    }

    pub fn with_engine(mut self, engine: Arc<dyn ExternalEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_editor(mut self, editor: Arc<dyn ExternalEngine>) -> Self {
        self.editor = editor;
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogStore>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    pub fn with_recommender_timeout(mut self, timeout: Duration) -> Self {
        self.recommender_timeout = timeout;
        self
    }

    pub fn with_progress(mut self, callback: StageProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }
}

/// Everything one planning run reads.
#[derive(Debug, Clone)]
pub struct PlanInput {
    /// Raw requirement payload: a tree, an array of trees or a nested tree.
    pub requirements: Value,
    pub transcript: Transcript,
    pub preferences: Preferences,
    pub grad_year: Option<i32>,
    pub grad_quarter: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanOutcome {
    pub courses_to_schedule: ResolvedCourseSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<EngineResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Resolve owed courses and ask the timetable engine for a schedule, dated
/// from the local calendar.
pub async fn plan_courses(ctx: &PlannerContext, input: PlanInput) -> Result<PlanOutcome, PlanError> {
    plan_courses_on(ctx, input, Local::now().date_naive()).await
}

pub async fn plan_courses_on(
    ctx: &PlannerContext,
    input: PlanInput,
    today: NaiveDate,
) -> Result<PlanOutcome, PlanError> {
    let mut logger = StageLogger::new(ctx.progress.clone());
    let PlanInput {
        requirements,
        transcript,
        preferences,
        grad_year,
        grad_quarter,
    } = input;

    logger.begin("Validate input");
    let checked = GraduationTerm::parse(grad_year, grad_quarter.as_deref()).and_then(|term| {
        preferences
            .validate()
            .map_err(PlanError::InvalidPreferences)?;
        Ok(term)
    });
    logger.end();
    let graduation = checked?;

    logger.begin("Normalize requirements");
    let sections = requirements::normalize(&requirements);
    logger.end();
    let sections = sections?;
    logger.note(format!("{} requirement sections", sections.len()));

    logger.begin("Resolve options");
    let units = resolver::plan_queries(&sections, &transcript);
    logger.note(format!("Dispatching {} decision queries", units.len()));
    let report =
        resolver::resolve_all(ctx.oracle.as_ref(), &units, &transcript, ctx.oracle_timeout).await;
    if report.failed > 0 {
        logger.note(format!(
            "{} of {} decision queries contributed nothing",
            report.failed, report.dispatched
        ));
    }
    logger.end();

    logger.begin("Merge course sets");
    let mut merger = CourseSetMerger::new(&transcript);
    for batch in &report.batches {
        merger.merge_batch(batch);
    }
    logger.note(format!("{} owed entries after merge", merger.set().len()));
    logger.end();

    let areas = preferences.breadth_areas();
    if !areas.is_empty() {
        logger.begin("Technical breadth");
        let breadth = breadth::augment(
            ctx.recommender.as_ref(),
            &mut merger,
            &transcript,
            &areas,
            ctx.recommender_timeout,
        )
        .await;
        logger.note(format!(
            "{} breadth courses added ({} of {} areas failed)",
            breadth.added, breadth.failed, breadth.requested
        ));
        logger.end();
    }
    let courses = merger.finish();

    logger.begin("Build schedule request");
    let request = build_schedule_request(
        today,
        graduation,
        courses.clone(),
        transcript,
        preferences,
    );
    let request_json = serde_json::to_value(&request);
    logger.end();

    logger.begin("Schedule");
    let scheduled = match request_json {
        Ok(payload) => match ctx.engine.invoke(&payload).await {
            Ok(reply) => EngineResponse::from_value(reply),
            Err(err) => Err(err),
        },
        Err(err) => Err(EngineError::InvalidJson(err.to_string())),
    };
    let outcome = match scheduled {
        Ok(schedule) => PlanOutcome {
            courses_to_schedule: courses,
            schedule: Some(schedule),
            error: None,
        },
        Err(err) => {
            warn!(error = %err, "Timetable engine did not produce a schedule");
            PlanOutcome {
                courses_to_schedule: courses,
                schedule: None,
                error: Some(format!("Scheduling did not complete: {err}")),
            }
        }
    };
    logger.end();

    Ok(outcome)
}

/// Apply a free-text edit to an existing timetable.
pub async fn edit_schedule(
    ctx: &PlannerContext,
    instruction: &str,
    schedule: &Value,
    transcript: &Transcript,
) -> EditOutcome {
    edit::interpret_schedule_edit(ctx.editor.as_ref(), instruction, schedule, transcript).await
}
