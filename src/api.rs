use serde_json::{json, Value};
use tracing::{debug, error};

use crate::cache::{CacheKey, Revalidation};
use crate::client::TrackerClient;
use crate::error::ApiError;
use crate::fetcher::RequestOptions;
use crate::models::{DeveloperAppForm, Game, OAuthAppForm, UserConfig};
use crate::resources::{alias_list_path, player_path};

const ALIAS_MAX_CHARS: usize = 64;

impl TrackerClient {
    pub fn vote_alias(&self, game: Game, alias_id: u32, up: bool) -> Result<Vec<Revalidation>, ApiError> {
        let direction = if up { "up" } else { "down" };
        self.send_write(
            &format!("user/{game}/alias/{alias_id}/vote/{direction}"),
            RequestOptions::post(Value::Null),
        )?;
        Ok(self.revalidate_alias_lists(game))
    }

    pub fn create_alias(&self, game: Game, song_id: u32, alias: &str) -> Result<Vec<Revalidation>, ApiError> {
        let alias = validate_alias(alias)?;
        self.send_write(
            &format!("user/{game}/alias"),
            RequestOptions::post(json!({ "song_id": song_id, "alias": alias })),
        )?;
        Ok(self.revalidate_alias_lists(game))
    }

    pub fn delete_alias(&self, game: Game, alias_id: u32) -> Result<Vec<Revalidation>, ApiError> {
        self.send_write(&format!("user/{game}/alias/{alias_id}"), RequestOptions::delete())?;
        Ok(self.revalidate_alias_lists(game))
    }

    pub fn update_user_config(&self, config: &UserConfig) -> Result<Revalidation, ApiError> {
        self.send_write("user/config", RequestOptions::put(serde_json::to_value(config)?))?;
        Ok(self.cache().revalidate(&CacheKey::new("user/config")))
    }

    pub fn create_developer_app(&self, form: &DeveloperAppForm) -> Result<Revalidation, ApiError> {
        form.validate()?;
        self.send_write("user/developer/apps", RequestOptions::post(serde_json::to_value(form)?))?;
        Ok(self.revalidate_developer_apps())
    }

    pub fn update_developer_app(&self, id: u32, form: &DeveloperAppForm) -> Result<Revalidation, ApiError> {
        form.validate()?;
        self.send_write(
            &format!("user/developer/apps/{id}"),
            RequestOptions::put(serde_json::to_value(form)?),
        )?;
        Ok(self.revalidate_developer_apps())
    }

    pub fn delete_developer_app(&self, id: u32) -> Result<Revalidation, ApiError> {
        self.send_write(&format!("user/developer/apps/{id}"), RequestOptions::delete())?;
        Ok(self.revalidate_developer_apps())
    }

    pub fn update_oauth_app(&self, client_id: &str, form: &OAuthAppForm) -> Result<Vec<Revalidation>, ApiError> {
        form.validate()?;
        let client_id = client_id.trim();
        if client_id.is_empty() {
            return Err(ApiError::validation("client_id", "client id is required"));
        }
        self.send_write(
            &format!("user/developer/oauth/{client_id}"),
            RequestOptions::put(serde_json::to_value(form)?),
        )?;
        Ok(vec![
            self.cache().revalidate(&CacheKey::new(format!("oauth/app/{client_id}"))),
            self.revalidate_developer_apps(),
        ])
    }

    pub fn unbind_player(&self, game: Game) -> Result<Vec<Revalidation>, ApiError> {
        let path = player_path(game);
        self.send_write(&path, RequestOptions::delete())?;
        Ok(self
            .cache()
            .revalidate_where(|key| key.path().starts_with(&path)))
    }

    pub(crate) fn send_write(&self, path: &str, options: RequestOptions) -> Result<(), ApiError> {
        debug!(path, "write");
        self.fetcher().fetch::<Value>(path, options)?;
        Ok(())
    }

    fn revalidate_alias_lists(&self, game: Game) -> Vec<Revalidation> {
        let path = alias_list_path(game);
        self.cache().revalidate_where(|key| key.path() == path)
    }

    fn revalidate_developer_apps(&self) -> Revalidation {
        self.cache()
            .revalidate(&CacheKey::new("user/developer/apps"))
    }
}

fn validate_alias(alias: &str) -> Result<&str, ApiError> {
    let alias = alias.trim();
    if alias.is_empty() {
        return Err(ApiError::validation("alias", "alias is required"));
    }
    if alias.chars().count() > ALIAS_MAX_CHARS {
        return Err(ApiError::validation(
            "alias",
            format!("alias must be at most {ALIAS_MAX_CHARS} characters"),
        ));
    }
    Ok(alias)
}

pub struct RetryableAction<'a, T> {
    label: String,
    action: Box<dyn Fn() -> Result<T, ApiError> + 'a>,
    attempts: u32,
    last_error: Option<ApiError>,
}

impl<'a, T> RetryableAction<'a, T> {
    pub fn new(label: impl Into<String>, action: impl Fn() -> Result<T, ApiError> + 'a) -> Self {
        Self {
            label: label.into(),
            action: Box::new(action),
            attempts: 0,
            last_error: None,
        }
    }

    pub fn run(&mut self) -> Result<T, ApiError> {
        self.attempts += 1;
        match (self.action)() {
            Ok(value) => {
                self.last_error = None;
                Ok(value)
            }
            Err(err) => {
                error!(action = %self.label, attempts = self.attempts, "write failed: {err}");
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    pub fn retry(&mut self) -> Result<T, ApiError> {
        debug!(action = %self.label, "retrying");
        self.run()
    }

    /// A retry button makes sense only after a failure the user cannot fix
    /// by editing the form.
    pub fn can_retry(&self) -> bool {
        self.last_error
            .as_ref()
            .is_some_and(|err| !matches!(err, ApiError::Validation { .. }))
    }

    pub fn last_error(&self) -> Option<&ApiError> {
        self.last_error.as_ref()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}
