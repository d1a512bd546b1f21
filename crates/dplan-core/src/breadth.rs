//! Technical-breadth augmentation, run after the major requirements are merged.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::course_key::{CourseKey, parse_course};
use crate::external::{EngineError, ExternalEngine};
use crate::merge::CourseSetMerger;
use crate::model::Transcript;

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("recommender returned {0}, expected an array of course keys")]
    InvalidResponse(String),
}

#[async_trait]
pub trait BreadthRecommender: Send + Sync {
    async fn recommend(
        &self,
        transcript: &Transcript,
        required: &[CourseKey],
        area: &str,
    ) -> Result<Vec<CourseKey>, RecommendError>;
}

/// Recommender reached through an [`ExternalEngine`] speaking
/// `{transcript, required_courses, tech_breadth_area}` in and a JSON array of
/// `SUBJECT|NUMBER` strings out.
pub struct EngineRecommender {
    engine: Arc<dyn ExternalEngine>,
}

impl EngineRecommender {
    pub fn new(engine: Arc<dyn ExternalEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl BreadthRecommender for EngineRecommender {
    async fn recommend(
        &self,
        transcript: &Transcript,
        required: &[CourseKey],
        area: &str,
    ) -> Result<Vec<CourseKey>, RecommendError> {
        let request = json!({
            "transcript": transcript,
            "required_courses": required,
            "tech_breadth_area": area,
        });
        let reply = self.engine.invoke(&request).await?;
        let Value::Array(items) = reply else {
            return Err(RecommendError::InvalidResponse(kind_of(&reply).to_string()));
        };

        Ok(items
            .iter()
            .filter_map(|item| {
                let raw = item.as_str()?;
                match parse_course(raw) {
                    Ok(key) => Some(key),
                    Err(err) => {
                        warn!(area, token = raw, error = %err, "Discarding recommended course");
                        None
                    }
                }
            })
            .collect())
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "an object",
        Value::String(_) => "a string",
        Value::Number(_) => "a number",
        Value::Bool(_) => "a boolean",
        Value::Null => "null",
        Value::Array(_) => "an array",
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BreadthReport {
    pub requested: usize,
    pub failed: usize,
    pub added: usize,
}

/// Call the recommender once per area, concurrently, with the merged set as
/// context, then union the results. A failed area contributes nothing.
pub async fn augment(
    recommender: &dyn BreadthRecommender,
    merger: &mut CourseSetMerger<'_>,
    transcript: &Transcript,
    areas: &[&str],
    per_call: Duration,
) -> BreadthReport {
    let required: Vec<CourseKey> = merger.set().courses().cloned().collect();
    let calls = areas.iter().map(|area| {
        let required = &required;
        async move {
            let outcome = timeout(per_call, recommender.recommend(transcript, required, area)).await;
            (*area, outcome)
        }
    });
    let outcomes = join_all(calls).await;

    let mut report = BreadthReport {
        requested: areas.len(),
        ..BreadthReport::default()
    };
    for (area, outcome) in outcomes {
        match outcome {
            Ok(Ok(courses)) => {
                let added = merger.add_courses(courses);
                info!(area, added, "Technical breadth courses merged");
                report.added += added;
            }
            Ok(Err(err)) => {
                warn!(area, error = %err, "Technical breadth recommendation failed");
                report.failed += 1;
            }
            Err(_) => {
                warn!(area, timeout = ?per_call, "Technical breadth recommendation timed out");
                report.failed += 1;
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course_key::encode;
    use std::sync::Mutex;

    struct ScriptedEngine {
        reply: Result<Value, String>,
        seen: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl ExternalEngine for ScriptedEngine {
        async fn invoke(&self, request: &Value) -> Result<Value, EngineError> {
            self.seen.lock().unwrap().push(request.clone());
            match &self.reply {
                Ok(value) => Ok(value.clone()),
                Err(msg) => Err(EngineError::Remote(msg.clone())),
            }
        }
    }

    fn engine(reply: Result<Value, String>) -> Arc<ScriptedEngine> {
        Arc::new(ScriptedEngine {
            reply,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_engine_recommender_request_and_parse() {
        let scripted = engine(Ok(json!(["COM SCI|111", "EC ENGR 3", "bogus", 5])));
        let recommender = EngineRecommender::new(scripted.clone());
        let transcript: Transcript = [(encode("COM SCI 31").unwrap(), Some("A".into()))]
            .into_iter()
            .collect();

        let courses = recommender
            .recommend(&transcript, &[encode("COM SCI 32").unwrap()], "Computer Science")
            .await
            .unwrap();
        assert_eq!(
            courses,
            vec![encode("COM SCI 111").unwrap(), encode("EC ENGR 3").unwrap()]
        );

        let seen = scripted.seen.lock().unwrap();
        assert_eq!(seen[0]["required_courses"], json!(["COM SCI|32"]));
        assert_eq!(seen[0]["tech_breadth_area"], "Computer Science");
        assert_eq!(seen[0]["transcript"], json!({"COM SCI|31": "A"}));
    }

    #[tokio::test]
    async fn test_object_reply_is_invalid() {
        let recommender = EngineRecommender::new(engine(Ok(json!({"courses": []}))));
        let err = recommender
            .recommend(&Transcript::new(), &[], "Bioengineering")
            .await
            .unwrap_err();
        assert!(matches!(err, RecommendError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_augment_isolates_failures_and_filters_transcript() {
        struct ByArea;

        #[async_trait]
        impl BreadthRecommender for ByArea {
            async fn recommend(
                &self,
                _transcript: &Transcript,
                _required: &[CourseKey],
                area: &str,
            ) -> Result<Vec<CourseKey>, RecommendError> {
                match area {
                    "Good" => Ok(vec![encode("COM SCI 111").unwrap(), encode("COM SCI 31").unwrap()]),
                    _ => Err(RecommendError::InvalidResponse("null".into())),
                }
            }
        }

        let transcript: Transcript = [(encode("COM SCI 31").unwrap(), None)].into_iter().collect();
        let mut merger = CourseSetMerger::new(&transcript);
        let report = augment(
            &ByArea,
            &mut merger,
            &transcript,
            &["Bad", "Good"],
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(report, BreadthReport { requested: 2, failed: 1, added: 1 });
        assert_eq!(merger.set().to_strings(), vec!["COM SCI|111"]);
    }
}
