use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::cache::{CacheKey, CachePolicy, Resource, ResourceSpec};
use crate::client::TrackerClient;
use crate::models::{
    Alias, AliasPage, AliasQuery, Bests, Collection, CollectionKind, DeveloperApp, Game, OAuthApp,
    Player, Score, SiteConfig, User, UserConfig, YearInReview,
};

pub fn alias_list_path(game: Game) -> String {
    format!("{game}/alias/list")
}

pub fn player_path(game: Game) -> String {
    format!("user/{game}/player")
}

impl TrackerClient {
    pub fn player_key(&self, game: Game) -> Option<CacheKey> {
        self.session_key(player_path(game))
    }

    pub fn player(&self, game: Game) -> Resource<Player> {
        let spec = self.spec::<Player, _>(self.player_key(game), |player| player);
        self.cache().subscribe(spec)
    }

    pub fn scores(&self, game: Game) -> Resource<Vec<Score>> {
        self.player_scoped(game, "scores", |scores: Option<Vec<Score>>| {
            scores.unwrap_or_default()
        })
    }

    pub fn bests(&self, game: Game) -> Resource<Bests> {
        self.player_scoped(game, "bests", |bests: Option<Bests>| bests.unwrap_or_default())
    }

    /// The server wraps the list in a single-entry map keyed by the plural
    /// kind (`{"plates": [...]}`); only the list is kept.
    pub fn collections(&self, game: Game, kind: CollectionKind) -> Resource<Vec<Collection>> {
        let key = CacheKey::with_query(
            format!("{game}/{}/list", kind.segment()),
            [("required", "true")],
        );
        let spec = self.spec(
            Some(key),
            |raw: Option<BTreeMap<String, Vec<Collection>>>| {
                raw.and_then(|map| map.into_values().next())
                    .unwrap_or_default()
            },
        );
        self.cache().subscribe(spec)
    }

    pub fn aliases(&self, game: Game, query: &AliasQuery) -> Resource<AliasPage> {
        let mut params = vec![
            ("page", query.page.max(1).to_string()),
            ("sort", query.sort.as_str().to_string()),
        ];
        if let Some(approved) = query.approved {
            params.push(("approved", approved.to_string()));
        }
        if let Some(song_id) = query.song_id {
            params.push(("song_id", song_id.to_string()));
        }
        let key = CacheKey::with_query(alias_list_path(game), params);
        let spec = self
            .spec(Some(key), |page: Option<AliasPage>| page.unwrap_or_default())
            .policy(CachePolicy::default().with_terminal_status(400));
        self.cache().subscribe(spec)
    }

    pub fn user(&self) -> Resource<User> {
        let spec = self.spec(self.session_key("user/profile"), |user: User| user);
        self.cache().subscribe(spec)
    }

    pub fn user_config(&self) -> Resource<UserConfig> {
        let spec = self.spec(
            self.session_key("user/config"),
            |config: Option<UserConfig>| config.unwrap_or_default(),
        );
        self.cache().subscribe(spec)
    }

    pub fn developer_apps(&self) -> Resource<Vec<DeveloperApp>> {
        let spec = self.spec(
            self.session_key("user/developer/apps"),
            |apps: Option<Vec<DeveloperApp>>| apps.unwrap_or_default(),
        );
        self.cache().subscribe(spec)
    }

    pub fn oauth_app(&self, client_id: &str) -> Resource<OAuthApp> {
        let client_id = client_id.trim();
        let key = (!client_id.is_empty()).then(|| CacheKey::new(format!("oauth/app/{client_id}")));
        let spec = self
            .spec(key, |app: OAuthApp| app)
            .policy(CachePolicy::immutable().with_terminal_status(400));
        self.cache().subscribe(spec)
    }

    pub fn year_in_review(&self, game: Game, year: u32) -> Resource<BTreeMap<String, YearInReview>> {
        let spec = self
            .spec(
                self.session_key(format!("user/{game}/player/year-in-review/{year}")),
                |raw: Option<BTreeMap<String, YearInReview>>| raw.unwrap_or_default(),
            )
            .policy(CachePolicy::immutable().with_terminal_status(400));
        self.cache().subscribe(spec)
    }

    pub fn site_config(&self) -> Resource<SiteConfig> {
        let spec = self
            .spec(
                Some(CacheKey::new("site/config")),
                |config: Option<SiteConfig>| config.unwrap_or_default(),
            )
            .policy(CachePolicy::immutable());
        self.cache().subscribe(spec)
    }

    fn player_scoped<R, T>(&self, game: Game, resource: &str, shape: fn(R) -> T) -> Resource<T>
    where
        R: DeserializeOwned + 'static,
        T: Clone + Send + Sync + 'static,
    {
        let dependency = self.player_key(game);
        let key = dependency
            .as_ref()
            .map(|_| CacheKey::new(format!("{}/{resource}", player_path(game))));
        let mut spec = self.spec(key, shape);
        if let Some(dependency) = dependency {
            spec = spec.depends_on(dependency);
        }
        self.cache().subscribe(spec)
    }

    fn session_key(&self, path: impl AsRef<str>) -> Option<CacheKey> {
        self.is_logged_in().then(|| CacheKey::new(path))
    }

    fn spec<R, T>(&self, key: Option<CacheKey>, shape: fn(R) -> T) -> ResourceSpec<T>
    where
        R: DeserializeOwned + 'static,
        T: Send + Sync + 'static,
    {
        let fetcher = Arc::clone(self.fetcher());
        let path = key
            .as_ref()
            .map(|key| key.as_str().to_string())
            .unwrap_or_default();
        ResourceSpec::new(key, move || fetcher.get::<R>(&path).map(shape))
    }
}

impl<T: Clone + Default + Send + Sync + 'static> Resource<T> {
    pub fn data_or_default(&self) -> T {
        self.data().unwrap_or_default()
    }
}

impl Resource<AliasPage> {
    pub fn aliases(&self) -> Vec<Alias> {
        self.data_or_default().aliases
    }

    pub fn page_count(&self) -> u32 {
        self.data().map_or(0, |page| page.page_count)
    }
}

impl Resource<BTreeMap<String, YearInReview>> {
    pub fn review(&self) -> Option<YearInReview> {
        self.data()
            .and_then(|map| map.into_values().next())
    }
}
