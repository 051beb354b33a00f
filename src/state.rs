//! Application state: the practice engine, its judge, and the toolkit shelf.
//!
//! This module owns:
//!   - the lesson catalog (TOML bank first, then built-in seeds)
//!   - the judge selection (OpenAI when configured, heuristic otherwise)
//!   - the engine instance shared by HTTP and WebSocket handlers
//!   - the toolkit shelf fed by mastery events

use std::{collections::HashMap, sync::Arc};

use tracing::{info, instrument, warn};

use crate::catalog::LessonCatalog;
use crate::config::{load_mentor_config_from_env, MentorConfig};
use crate::engine::{Engine, EnginePolicy};
use crate::judge::{AnyJudge, HeuristicJudge, Judge};
use crate::openai::OpenAiJudge;
use crate::seeds::seed_lessons;
use crate::store::MemoryStore;
use crate::toolkit::ToolkitShelf;

pub type MentorEngine = Engine<AnyJudge, MemoryStore>;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MentorEngine>,
    pub toolkit: ToolkitShelf,
}

impl AppState {
    /// Build state from env: load config, build the catalog, pick the judge.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_mentor_config_from_env().unwrap_or_default();
        let judge = match OpenAiJudge::from_env(cfg.prompts.clone()) {
            Some(oa) => {
                info!(target: "lyra_mentor", base_url = %oa.base_url, model = %oa.model, "OpenAI judge enabled.");
                AnyJudge::OpenAi(oa)
            }
            None => {
                info!(target: "lyra_mentor", "OpenAI disabled (no OPENAI_API_KEY). Using heuristic judge.");
                AnyJudge::Heuristic(HeuristicJudge)
            }
        };
        Self::from_config(cfg, judge)
    }

    /// Build state from an explicit config and judge. Must run inside a Tokio runtime.
    pub fn from_config(cfg: MentorConfig, judge: AnyJudge) -> Self {
        // Config-bank lessons first so they shadow seeds with the same id.
        let mut entries = cfg.lessons;
        entries.extend(seed_lessons());
        let catalog = LessonCatalog::from_configs(entries);
        if catalog.is_empty() {
            warn!(target: "lyra_mentor", "Lesson catalog is empty; every lesson request will 404");
        }

        // Inventory summary by character.
        let mut by_character: HashMap<String, usize> = HashMap::new();
        for lesson in catalog.lessons() {
            *by_character.entry(lesson.character.clone()).or_default() += 1;
        }
        for (character, lessons) in by_character {
            info!(target: "lesson", %character, lessons, "Startup lesson inventory");
        }

        let policy = EnginePolicy::from(&cfg.engine);
        info!(
            target: "lyra_mentor",
            pass_threshold = policy.scoring.pass_threshold,
            mastery_threshold = policy.mastery_threshold,
            timeout = ?policy.evaluation_timeout,
            judge = judge.name(),
            "Engine configured"
        );

        let engine = Arc::new(Engine::new(catalog, judge, MemoryStore::new(), policy));
        let toolkit = ToolkitShelf::new();
        toolkit.spawn_listener(engine.subscribe());

        Self { engine, toolkit }
    }
}
