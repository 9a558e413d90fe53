use std::sync::Arc;

use sqlx::{Pool, Postgres};

use crate::{
    config::Config,
    error::ApiError,
    form::RecipeLimits,
    jwt::SessionKey,
};

pub struct State {
    pub pool: Pool<Postgres>,
    pub config: Config,
    pub session_key: SessionKey,
}

impl State {
    pub fn new(config: Config, pool: Pool<Postgres>) -> Result<Arc<Self>, ApiError> {
        let session_key = SessionKey::new(&config.jwt_secret, config.jwt_lifetime_hours)?;

        Ok(Arc::new(Self {
            pool,
            config,
            session_key,
        }))
    }

    pub fn recipe_limits(&self) -> RecipeLimits {
        RecipeLimits::from(&self.config)
    }
}
