//! Core library crate: requirement normalization, decision-oracle fan-out,
//! course-set merging and schedule-request assembly.

pub mod breadth;
pub mod catalog;
pub mod config;
pub mod course_key;
pub mod edit;
pub mod error;
pub mod external;
pub mod llm;
pub mod logging;
pub mod merge;
pub mod model;
pub mod oracle;
pub mod pipeline;
pub mod placeholder;
pub mod preferences;
pub mod request;
pub mod requirements;
pub mod resolver;

pub use breadth::{BreadthRecommender, EngineRecommender, RecommendError};
pub use catalog::{CatalogError, CatalogStore, EmptyCatalog, JsonCatalog, requirements_for};
pub use config::{
    ConfigError, ConfigLoadResult, ConfigSource, EndpointConfig, EndpointKind, OracleConfig,
    PlannerConfig, RuntimeOverrides, apply_runtime_overrides, config_directory, config_path,
    load_config, load_config_from, sanitize_config, save_config_to,
};
pub use course_key::{CodecError, CourseKey, decode, encode, parse_course};
pub use edit::{EditOutcome, clean_schedule};
pub use error::PlanError;
pub use external::{EngineError, EngineResponse, ExternalEngine, HttpEngine, ProcessEngine};
pub use model::{CourseEntry, ResolvedCourseSet, Transcript};
pub use oracle::{DecisionOracle, DecisionQuery, LlmDecisionOracle, OracleError};
pub use pipeline::{
    PlanInput, PlanOutcome, PlannerContext, StageProgressCallback, StageProgressEvent,
    StageProgressEventKind, edit_schedule, plan_courses, plan_courses_on,
};
pub use placeholder::ElectivePlaceholder;
pub use preferences::{PreferenceKind, Preferences};
pub use request::{GraduationTerm, Quarter, ScheduleRequest, start_quarter_for_month};
pub use requirements::{RequirementError, RequirementOption, Section};
