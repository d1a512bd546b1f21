use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use dplan_core::{
    BreadthRecommender, CourseKey, DecisionOracle, DecisionQuery, EngineError, ExternalEngine,
    JsonCatalog, OracleError, PlanInput, PlannerContext, Preferences, RecommendError, Transcript,
    edit_schedule, encode, plan_courses_on, requirements_for,
};
use serde_json::{Value, json};

/// Oracle answering by option title; unknown options get an empty list.
struct ScriptedOracle {
    replies: HashMap<String, String>,
    delay: HashMap<String, Duration>,
    seen: Mutex<Vec<DecisionQuery>>,
}

impl ScriptedOracle {
    fn new(replies: &[(&str, &str)]) -> Self {
        Self {
            replies: replies
                .iter()
                .map(|(option, reply)| (option.to_string(), reply.to_string()))
                .collect(),
            delay: HashMap::new(),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn slow(mut self, option: &str, delay: Duration) -> Self {
        self.delay.insert(option.to_string(), delay);
        self
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn decide(&self, query: &DecisionQuery) -> Result<String, OracleError> {
        self.seen.lock().unwrap().push(query.clone());
        if let Some(delay) = self.delay.get(&query.option_title) {
            tokio::time::sleep(*delay).await;
        }
        Ok(self
            .replies
            .get(&query.option_title)
            .cloned()
            .unwrap_or_else(|| r#"{"courses": []}"#.to_string()))
    }
}

/// Engine that records every payload and answers with a fixed reply.
struct RecordingEngine {
    reply: Result<Value, String>,
    payloads: Mutex<Vec<Value>>,
}

impl RecordingEngine {
    fn ok(reply: Value) -> Self {
        Self {
            reply: Ok(reply),
            payloads: Mutex::new(Vec::new()),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            payloads: Mutex::new(Vec::new()),
        }
    }

    fn last_payload(&self) -> Value {
        self.payloads.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl ExternalEngine for RecordingEngine {
    async fn invoke(&self, request: &Value) -> Result<Value, EngineError> {
        self.payloads.lock().unwrap().push(request.clone());
        match &self.reply {
            Ok(value) => Ok(value.clone()),
            Err(message) => Err(EngineError::Exit(message.clone())),
        }
    }
}

struct FixedRecommender(Vec<&'static str>);

#[async_trait]
impl BreadthRecommender for FixedRecommender {
    async fn recommend(
        &self,
        _transcript: &Transcript,
        _required: &[CourseKey],
        _area: &str,
    ) -> Result<Vec<CourseKey>, RecommendError> {
        Ok(self.0.iter().map(|key| encode(key).unwrap()).collect())
    }
}

fn transcript(value: Value) -> Transcript {
    serde_json::from_value(value).unwrap()
}

fn plan_input(requirements: Value, transcript: Transcript) -> PlanInput {
    PlanInput {
        requirements,
        transcript,
        preferences: Preferences::default(),
        grad_year: Some(2027),
        grad_quarter: Some("Spring".into()),
    }
}

fn august() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 8, 15).unwrap()
}

fn single_option(section: &str, option: &str, courses: &[&str]) -> Value {
    json!({
        "title": section,
        "options": [{"title": option, "courses": courses}]
    })
}

#[tokio::test]
async fn pipeline_resolves_required_course_and_skips_completed() {
    let oracle = Arc::new(ScriptedOracle::new(&[(
        "Lower Division",
        r#"{"courses": ["COM SCI 32", "COM SCI 31"]}"#,
    )]));
    let engine = Arc::new(RecordingEngine::ok(json!({"schedule": {"Fall 2025": {}}})));
    let ctx = PlannerContext::new(oracle.clone()).with_engine(engine.clone());

    let requirements = json!([single_option(
        "Computer Science Core",
        "Lower Division",
        &["COM SCI 31", "COM SCI 32"]
    )]);
    let outcome = plan_courses_on(
        &ctx,
        plan_input(requirements, transcript(json!({"COM SCI|31": "A"}))),
        august(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.courses_to_schedule.to_strings(), vec!["COM SCI|32"]);
    assert!(outcome.error.is_none());
    assert_eq!(outcome.schedule.unwrap().schedule, json!({"Fall 2025": {}}));

    let seen = oracle.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].section_title, "Computer Science Core");
}

#[tokio::test]
async fn pipeline_keeps_placeholders_verbatim() {
    let oracle = Arc::new(ScriptedOracle::new(&[(
        "Electives",
        r#"```json
{"courses": ["RESOLVE: Technical Breadth #1", "RESOLVE: Technical Breadth #2"]}
```"#,
    )]));
    let ctx = PlannerContext::new(oracle);

    let requirements = json!([single_option(
        "Technical Breadth",
        "Electives",
        &["Any three approved courses"]
    )]);
    let outcome = plan_courses_on(&ctx, plan_input(requirements, Transcript::new()), august())
        .await
        .unwrap();

    assert_eq!(
        outcome.courses_to_schedule.to_strings(),
        vec![
            "RESOLVE: Technical Breadth #1",
            "RESOLVE: Technical Breadth #2"
        ]
    );
    assert_eq!(outcome.courses_to_schedule.electives().count(), 2);
}

#[tokio::test]
async fn pipeline_tolerates_one_unparsable_answer() {
    let oracle = Arc::new(ScriptedOracle::new(&[
        ("First", r#"{"courses": ["MATH 31A"]}"#),
        ("Second", "I think you should take calculus."),
        ("Third", r#"{"courses": ["PHYSICS 1A"]}"#),
    ]));
    let ctx = PlannerContext::new(oracle.clone());

    let requirements = json!([
        single_option("Math", "First", &["MATH 31A"]),
        single_option("Chemistry", "Second", &["CHEM 20A"]),
        single_option("Physics", "Third", &["PHYSICS 1A"]),
    ]);
    let outcome = plan_courses_on(&ctx, plan_input(requirements, Transcript::new()), august())
        .await
        .unwrap();

    let mut courses = outcome.courses_to_schedule.to_strings();
    courses.sort();
    assert_eq!(courses, vec!["MATH|31A", "PHYSICS|1A"]);
    assert_eq!(oracle.seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn pipeline_drops_timed_out_queries() {
    let oracle = Arc::new(
        ScriptedOracle::new(&[
            ("Fast", r#"{"courses": ["MATH 31A"]}"#),
            ("Slow", r#"{"courses": ["MATH 31B"]}"#),
        ])
        .slow("Slow", Duration::from_secs(5)),
    );
    let ctx = PlannerContext::new(oracle).with_oracle_timeout(Duration::from_millis(100));

    let requirements = json!([
        single_option("Calculus I", "Fast", &["MATH 31A"]),
        single_option("Calculus II", "Slow", &["MATH 31B"]),
    ]);
    let outcome = plan_courses_on(&ctx, plan_input(requirements, Transcript::new()), august())
        .await
        .unwrap();

    assert_eq!(outcome.courses_to_schedule.to_strings(), vec!["MATH|31A"]);
}

#[tokio::test]
async fn pipeline_numbers_placeholders_across_sections() {
    let oracle = Arc::new(ScriptedOracle::new(&[
        (
            "Science A",
            r#"{"courses": ["RESOLVE: Science Elective #1", "RESOLVE: Science Elective #2"]}"#,
        ),
        ("Science B", r#"{"courses": ["RESOLVE: Science Elective #1"]}"#),
    ]));
    let ctx = PlannerContext::new(oracle);

    let requirements = json!([
        single_option("Science I", "Science A", &["Two science electives"]),
        single_option("Science II", "Science B", &["One science elective"]),
    ]);
    let outcome = plan_courses_on(&ctx, plan_input(requirements, Transcript::new()), august())
        .await
        .unwrap();

    let mut ordinals: Vec<u32> = outcome
        .courses_to_schedule
        .electives()
        .map(|placeholder| placeholder.ordinal())
        .collect();
    ordinals.sort();
    assert_eq!(ordinals, vec![1, 2, 3]);
}

#[tokio::test]
async fn pipeline_numbers_placeholders_across_sibling_options() {
    let oracle = Arc::new(ScriptedOracle::new(&[
        (
            "Upper Division",
            r#"{"courses": ["RESOLVE: CS Elective #1", "RESOLVE: CS Elective #2"]}"#,
        ),
        ("Capstone", r#"{"courses": ["RESOLVE: CS Elective #1"]}"#),
    ]));
    let ctx = PlannerContext::new(oracle);

    let requirements = json!([{
        "title": "Electives",
        "options": [
            {"title": "Upper Division", "courses": ["Two upper division electives"]},
            {"title": "Capstone", "courses": ["One capstone elective"]}
        ]
    }]);
    let outcome = plan_courses_on(&ctx, plan_input(requirements, Transcript::new()), august())
        .await
        .unwrap();

    let mut ordinals: Vec<u32> = outcome
        .courses_to_schedule
        .electives()
        .map(|placeholder| placeholder.ordinal())
        .collect();
    ordinals.sort();
    assert_eq!(ordinals, vec![1, 2, 3]);
}

#[tokio::test]
async fn pipeline_filters_breadth_recommendations_through_transcript() {
    let oracle = Arc::new(ScriptedOracle::new(&[(
        "Core",
        r#"{"courses": ["COM SCI 33"]}"#,
    )]));
    let ctx = PlannerContext::new(oracle).with_recommender(Arc::new(FixedRecommender(vec![
        "COM SCI 111",
        "COM SCI 118",
        "COM SCI 33",
    ])));

    let mut input = plan_input(
        json!([single_option("Systems", "Core", &["COM SCI 33"])]),
        transcript(json!({"COM SCI|111": "B+"})),
    );
    input.preferences.tech_breadth = Some("Networks".into());

    let outcome = plan_courses_on(&ctx, input, august()).await.unwrap();
    let set = &outcome.courses_to_schedule;

    assert!(set.contains_course(&encode("COM SCI 118").unwrap()));
    assert!(set.contains_course(&encode("COM SCI 33").unwrap()));
    assert!(!set.contains_course(&encode("COM SCI 111").unwrap()));
    assert_eq!(set.len(), 2);
}

#[tokio::test]
async fn pipeline_empty_requirements_yield_empty_set() {
    let oracle = Arc::new(ScriptedOracle::new(&[]));
    let engine = Arc::new(RecordingEngine::ok(json!({"schedule": {}})));
    let ctx = PlannerContext::new(oracle.clone()).with_engine(engine.clone());

    let outcome = plan_courses_on(&ctx, plan_input(json!([]), Transcript::new()), august())
        .await
        .unwrap();

    assert!(outcome.courses_to_schedule.is_empty());
    assert!(oracle.seen.lock().unwrap().is_empty());
    assert_eq!(engine.last_payload()["courses_to_schedule"], json!([]));
}

#[tokio::test]
async fn pipeline_sends_start_and_end_terms_to_engine() {
    let oracle = Arc::new(ScriptedOracle::new(&[]));
    let engine = Arc::new(RecordingEngine::ok(json!({"schedule": {}, "note": "ok"})));
    let ctx = PlannerContext::new(oracle).with_engine(engine.clone());

    let mut input = plan_input(json!([]), transcript(json!({"MATH|31A": "A-"})));
    input.grad_quarter = None;
    let outcome = plan_courses_on(&ctx, input, august()).await.unwrap();
    assert_eq!(outcome.schedule.unwrap().note.as_deref(), Some("ok"));

    let payload = engine.last_payload();
    assert_eq!(payload["start_year"], json!(2025));
    assert_eq!(payload["start_quarter"], json!("Summer"));
    assert_eq!(payload["end_year"], json!(2027));
    assert_eq!(payload["end_quarter"], json!("Spring"));
    assert_eq!(payload["transcript"], json!({"MATH|31A": "A-"}));
    assert!(payload["preferences"].is_object());
}

#[tokio::test]
async fn pipeline_reports_engine_failure_with_courses() {
    let oracle = Arc::new(ScriptedOracle::new(&[(
        "Core",
        r#"{"courses": ["MATH 32A"]}"#,
    )]));
    let engine = Arc::new(RecordingEngine::failing("solver crashed"));
    let ctx = PlannerContext::new(oracle).with_engine(engine);

    let outcome = plan_courses_on(
        &ctx,
        plan_input(
            json!([single_option("Math", "Core", &["MATH 32A"])]),
            Transcript::new(),
        ),
        august(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.courses_to_schedule.to_strings(), vec!["MATH|32A"]);
    assert!(outcome.schedule.is_none());
    assert!(outcome.error.unwrap().contains("solver crashed"));
}

#[tokio::test]
async fn pipeline_merges_double_major_catalog_trees() {
    let catalog = JsonCatalog::from_value(json!({
        "Computer Science": [single_option("CS Core", "CS Lower", &["COM SCI 31"])],
        "Mathematics": [
            single_option("Math Core", "Math Lower", &["MATH 31A", "COM SCI 31"])
        ]
    }))
    .unwrap();
    let requirements = requirements_for(
        &catalog,
        &["Computer Science".to_string(), "Mathematics".to_string()],
    )
    .await
    .unwrap();

    let oracle = Arc::new(ScriptedOracle::new(&[
        ("CS Lower", r#"{"courses": ["COM SCI 31"]}"#),
        ("Math Lower", r#"{"courses": ["MATH 31A", "COM SCI 31"]}"#),
    ]));
    let ctx = PlannerContext::new(oracle.clone());

    let outcome = plan_courses_on(&ctx, plan_input(requirements, Transcript::new()), august())
        .await
        .unwrap();

    let mut courses = outcome.courses_to_schedule.to_strings();
    courses.sort();
    assert_eq!(courses, vec!["COM SCI|31", "MATH|31A"]);
    assert_eq!(oracle.seen.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn edit_schedule_returns_cleaned_schedule() {
    let editor = Arc::new(RecordingEngine::ok(json!({
        "success": true,
        "message": "Moved COM SCI 32",
        "schedule": {
            "Fall 2025": {
                "COM SCI|32": {"lecture": "LEC 1", "discussion": "DIS 1A"},
                "FILLER": "free"
            }
        }
    })));
    let ctx = PlannerContext::new(Arc::new(ScriptedOracle::new(&[]))).with_editor(editor.clone());

    let outcome = edit_schedule(
        &ctx,
        "Move COM SCI 32 to fall",
        &json!({"Winter 2026": {"COM SCI|32": {"lecture": "LEC 1"}}}),
        &transcript(json!({"COM SCI|31": "A"})),
    )
    .await;

    assert!(outcome.success);
    assert_eq!(outcome.message, "Moved COM SCI 32");
    let schedule = outcome.schedule.unwrap();
    assert_eq!(
        schedule["Fall 2025"]["FILLER"],
        json!({"lecture": null, "discussion": null})
    );
    assert_eq!(
        schedule["Fall 2025"]["COM SCI|32"]["lecture"],
        json!("LEC 1")
    );

    let sent = editor.last_payload();
    assert_eq!(sent["operation"]["type"], json!("interpret"));
    assert_eq!(sent["operation"]["question"], json!("Move COM SCI 32 to fall"));
    assert_eq!(sent["preferences"]["allow_warnings"], json!(true));
}

#[tokio::test]
async fn edit_schedule_failure_uses_generic_message() {
    let editor = Arc::new(RecordingEngine::failing("traceback"));
    let ctx = PlannerContext::new(Arc::new(ScriptedOracle::new(&[]))).with_editor(editor);

    let outcome = edit_schedule(&ctx, "drop everything", &json!({}), &Transcript::new()).await;

    assert!(!outcome.success);
    assert!(outcome.schedule.is_none());
    assert!(!outcome.message.contains("traceback"));
}
