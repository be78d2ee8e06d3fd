use std::sync::Arc;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::repositories::Repositories;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    repos: Repositories,
    db: Option<PgPool>,
}

impl AppState {
    /// `db` is `None` when the in-memory backend is selected.
    pub(crate) fn new(settings: Settings, repos: Repositories, db: Option<PgPool>) -> Self {
        Self { inner: Arc::new(InnerState { settings, repos, db }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn repos(&self) -> &Repositories {
        &self.inner.repos
    }

    pub(crate) fn db(&self) -> Option<&PgPool> {
        self.inner.db.as_ref()
    }
}
