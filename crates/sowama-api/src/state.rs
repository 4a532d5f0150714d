use std::sync::Arc;

use sowama_engine::Engine;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub engine: Engine,
    pub jwt_secret: String,
}

impl AppStateInner {
    pub fn new(engine: Engine, jwt_secret: impl Into<String>) -> AppState {
        Arc::new(Self {
            engine,
            jwt_secret: jwt_secret.into(),
        })
    }
}
