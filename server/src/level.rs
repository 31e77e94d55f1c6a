//! Level pipeline collaborator.

use shared::messages::Point;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Narrow view of the level loader the tick loop needs: which level is
/// active, where heroes spawn, and whether the campaign has run out.
pub trait LevelCatalog: Send {
    /// Name of the currently loaded level, if any.
    fn current_level(&self) -> Option<String>;

    /// Start tile newly spawned heroes are placed on.
    fn start_position(&self) -> Point;

    /// True once the level pipeline is exhausted.
    fn campaign_over(&self) -> bool;
}

/// A single fixed level, enough for the dev server and tests.
pub struct StaticLevels {
    level_name: String,
    start: Point,
    over: Arc<AtomicBool>,
}

impl StaticLevels {
    pub fn new(level_name: &str, start: Point) -> Self {
        StaticLevels {
            level_name: level_name.to_string(),
            start,
            over: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle the host can flip to signal end of campaign.
    pub fn campaign_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.over)
    }
}

impl LevelCatalog for StaticLevels {
    fn current_level(&self) -> Option<String> {
        Some(self.level_name.clone())
    }

    fn start_position(&self) -> Point {
        self.start
    }

    fn campaign_over(&self) -> bool {
        self.over.load(Ordering::SeqCst)
    }
}
