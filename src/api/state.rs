use std::sync::Arc;

use crate::{
    engine::{Recommender, UpdateTrigger},
    store::InteractionStore,
    tracker::EventTracker,
};

/// Shared application state
///
/// Everything in here is cheap to clone: the engine pieces sit behind `Arc`s
/// and the tracker clones its channel sender.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn InteractionStore>,
    pub recommender: Arc<Recommender>,
    pub trigger: Arc<UpdateTrigger>,
    pub tracker: EventTracker,
}
