//! Cache-aware generation pipeline.
//!
//! One run walks `Start -> SlotResolved -> StateReady -> Generated -> Done`.
//! Two recovery edges exist:
//!
//! - a missing or undecodable slot is replaced by a fresh state while moving
//!   to `StateReady` (never an error);
//! - a state the backend rejects at generation time sends the run back to
//!   `StateReady` with a fresh state, at most once per run.
//!
//! Everything else the backend reports is fatal. A failed cache write after a
//! successful generation is only logged.

use crate::error::{CacheError, PipelineError};
use crate::generator::{ComputationState, Generation, Generator};
use crate::highlight::Highlighter;
use crate::postprocess;
use crate::prompt::{Mode, Request};
use crate::prompt_cache::{PromptCache, Slot};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    Available,
    Spent,
}

enum Stage {
    Start,
    SlotResolved(Slot),
    StateReady {
        slot: Slot,
        state: ComputationState,
        retry: Retry,
    },
    Generated {
        slot: Slot,
        generation: Generation,
    },
    Done(String),
}

pub struct Pipeline<'a> {
    generator: &'a dyn Generator,
    cache: Option<&'a PromptCache>,
    highlighter: &'a dyn Highlighter,
    max_tokens: u32,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        generator: &'a dyn Generator,
        cache: Option<&'a PromptCache>,
        highlighter: &'a dyn Highlighter,
        max_tokens: u32,
    ) -> Self {
        Self {
            generator,
            cache,
            highlighter,
            max_tokens,
        }
    }

    /// The cache in use, if the backend has state worth keeping.
    fn active_cache(&self) -> Option<&'a PromptCache> {
        self.cache.filter(|_| self.generator.stateful())
    }

    pub async fn run(&self, request: &Request) -> Result<String, PipelineError> {
        if request.is_blank() {
            return Err(PipelineError::EmptyRequest);
        }

        let prompt = request.prompt();
        let mut stage = Stage::Start;

        loop {
            stage = match stage {
                Stage::Start => Stage::SlotResolved(Slot::for_mode(request.mode)),

                Stage::SlotResolved(slot) => Stage::StateReady {
                    slot,
                    state: self.ready_state(slot),
                    retry: Retry::Available,
                },

                Stage::StateReady { slot, state, retry } => {
                    match self.generator.generate(&prompt, state, self.max_tokens).await {
                        Ok(generation) => Stage::Generated { slot, generation },
                        Err(err) if err.is_state_invalid() && retry == Retry::Available => {
                            warn!("{}; retrying with a fresh state", err);
                            self.discard(slot);
                            Stage::StateReady {
                                slot,
                                state: self.generator.fresh_state(),
                                retry: Retry::Spent,
                            }
                        }
                        Err(err) => {
                            return Err(PipelineError::from_generate(self.generator.name(), err));
                        }
                    }
                }

                Stage::Generated { slot, generation } => {
                    self.persist(slot, &generation.state);
                    Stage::Done(self.render(request.mode, &generation.text))
                }

                Stage::Done(text) => return Ok(text),
            };
        }
    }

    fn ready_state(&self, slot: Slot) -> ComputationState {
        let Some(cache) = self.active_cache() else {
            debug!("Prompt cache disabled for backend '{}'", self.generator.name());
            return self.generator.fresh_state();
        };

        match cache.load(slot, self.generator) {
            Ok(state) => {
                info!("Using prompt cache for {} mode", slot.mode());
                return state;
            }
            Err(CacheError::NotFound(path)) => {
                warn!("No prompt cache for {} mode, creating cache at {:?}", slot.mode(), path);
            }
            Err(err) => {
                warn!("{}; creating a new cache", err);
            }
        }

        self.discard(slot);
        self.generator.fresh_state()
    }

    fn discard(&self, slot: Slot) {
        if let Some(cache) = self.active_cache() {
            if let Err(err) = cache.discard(slot) {
                warn!("Could not remove prompt cache: {}", err);
            }
        }
    }

    fn persist(&self, slot: Slot, state: &ComputationState) {
        if let Some(cache) = self.active_cache() {
            if let Err(err) = cache.save(slot, state) {
                warn!("Could not save prompt cache: {}", err);
            }
        }
    }

    fn render(&self, mode: Mode, raw: &str) -> String {
        let text = postprocess::clean(mode, raw);
        match mode {
            Mode::Generate => text,
            Mode::Explain => self.highlighter.highlight(&text),
        }
    }
}
