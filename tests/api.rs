mod common;

use std::cell::Cell;

use maimai_tracker::api::RetryableAction;
use maimai_tracker::error::ApiError;
use maimai_tracker::fetcher::Method;
use maimai_tracker::models::{AliasQuery, DeveloperAppForm, Game, OAuthAppForm, UserConfig};
use serde_json::{json, Value};

use common::{client, fixture_data, logged_in_client, MockTransport, Reply, WAIT};

#[test]
fn voting_revalidates_every_alias_page() {
    let mock = MockTransport::new();
    mock.on("maimai/alias/list", Reply::ok(fixture_data("alias_page.json")));
    mock.on("user/maimai/alias/42/vote/up", Reply::ok(Value::Null));
    let client = logged_in_client(&mock);

    let newest = client.aliases(Game::Maimai, &AliasQuery::default());
    let by_votes = client.aliases(
        Game::Maimai,
        &AliasQuery {
            sort: maimai_tracker::models::AliasSort::Votes,
            ..AliasQuery::default()
        },
    );
    newest.wait_for_data(WAIT).expect("newest page");
    by_votes.wait_for_data(WAIT).expect("votes page");
    assert_eq!(mock.count("maimai/alias/list"), 2);

    let revalidations = client
        .vote_alias(Game::Maimai, 42, true)
        .expect("vote accepted");
    assert_eq!(revalidations.len(), 2);
    for revalidation in revalidations {
        revalidation.wait(WAIT).expect("revalidated");
    }
    assert_eq!(mock.count("maimai/alias/list"), 4);
    assert_eq!(
        mock.last_request("user/maimai/alias/42/vote/up")
            .map(|req| req.method),
        Some(Method::Post)
    );
}

#[test]
fn alias_writes_do_not_touch_other_games() {
    let mock = MockTransport::new();
    mock.on("chunithm/alias/list", Reply::ok(json!({ "aliases": [], "page_count": 1 })));
    mock.on("user/maimai/alias", Reply::ok(Value::Null));
    let client = logged_in_client(&mock);

    let chunithm = client.aliases(Game::Chunithm, &AliasQuery::default());
    chunithm.wait_for_data(WAIT).expect("chunithm page");

    let revalidations = client
        .create_alias(Game::Maimai, 834, "  潘多拉 ")
        .expect("created");
    assert!(revalidations.is_empty());
    assert_eq!(mock.count("chunithm/alias/list"), 1);

    let request = mock.last_request("user/maimai/alias").expect("create request");
    let body: Value = serde_json::from_str(request.body.as_deref().unwrap_or("")).expect("body");
    assert_eq!(body, json!({ "song_id": 834, "alias": "潘多拉" }));
}

#[test]
fn invalid_alias_is_rejected_locally() {
    let mock = MockTransport::new();
    let client = logged_in_client(&mock);
    let err = client
        .create_alias(Game::Maimai, 834, "   ")
        .expect_err("blank alias");
    assert!(matches!(err, ApiError::Validation { field: "alias", .. }));
    assert!(mock.calls().is_empty());
}

#[test]
fn user_config_update_refreshes_the_cached_copy() {
    let mock = MockTransport::new();
    mock.on("user/config", Reply::ok(json!({ "allow_crawl_scores": false })));
    mock.on("user/config", Reply::ok(Value::Null));
    mock.on("user/config", Reply::ok(json!({ "allow_crawl_scores": true })));
    let client = logged_in_client(&mock);

    let config = client.user_config();
    let loaded = config.wait_for_data(WAIT).expect("config loads");
    assert!(!loaded.allow_crawl_scores);

    let update = UserConfig {
        allow_crawl_scores: true,
        ..loaded
    };
    client
        .update_user_config(&update)
        .expect("update accepted")
        .wait(WAIT)
        .expect("revalidated");
    assert!(config.data_or_default().allow_crawl_scores);

    let put = mock
        .calls()
        .into_iter()
        .find(|req| req.method == Method::Put)
        .expect("put request");
    let body: Value = serde_json::from_str(put.body.as_deref().unwrap_or("")).expect("body");
    assert_eq!(body["allow_crawl_scores"], true);
}

#[test]
fn developer_app_crud_revalidates_the_list() {
    let mock = MockTransport::new();
    mock.on("user/developer/apps", Reply::ok(fixture_data("developer_apps.json")));
    mock.on("user/developer/apps/3", Reply::ok(Value::Null));
    let client = logged_in_client(&mock);

    let apps = client.developer_apps();
    assert_eq!(apps.wait_for_data(WAIT).expect("apps").len(), 1);

    let form = DeveloperAppForm {
        name: "score-bot".to_string(),
        url: "https://bot.example.com".to_string(),
        reason: "sync scores".to_string(),
    };
    client
        .update_developer_app(3, &form)
        .expect("updated")
        .wait(WAIT)
        .expect("revalidated");
    client
        .delete_developer_app(3)
        .expect("deleted")
        .wait(WAIT)
        .expect("revalidated");
    assert_eq!(mock.count("user/developer/apps"), 3);
    assert_eq!(mock.count("user/developer/apps/3"), 2);

    let bad = DeveloperAppForm {
        url: "bot.example.com".to_string(),
        ..form
    };
    assert!(client.create_developer_app(&bad).is_err());
    assert_eq!(mock.count("user/developer/apps"), 3);
}

#[test]
fn oauth_app_update_needs_redirect_uris() {
    let mock = MockTransport::new();
    mock.on("user/developer/oauth/abc", Reply::ok(Value::Null));
    let client = logged_in_client(&mock);

    let mut form = OAuthAppForm {
        name: "Rating Viewer".to_string(),
        description: String::new(),
        website: "https://viewer.example.com".to_string(),
        redirect_uris: Vec::new(),
    };
    assert!(client.update_oauth_app("abc", &form).is_err());

    form.redirect_uris = vec!["https://viewer.example.com/callback".to_string()];
    client.update_oauth_app("abc", &form).expect("updated");
    assert_eq!(mock.count("user/developer/oauth/abc"), 1);
}

#[test]
fn unbinding_refreshes_player_scoped_resources() {
    let mock = MockTransport::new();
    mock.on("user/maimai/player", Reply::ok(fixture_data("player.json")));
    mock.on("user/maimai/player/bests", Reply::ok(fixture_data("bests.json")));
    let client = logged_in_client(&mock);

    let player = client.player(Game::Maimai);
    let bests = client.bests(Game::Maimai);
    player.wait_for_data(WAIT).expect("player");
    assert_eq!(bests.wait_for_data(WAIT).expect("bests").dx_total, 7501);

    let revalidations = client.unbind_player(Game::Maimai).expect("unbound");
    assert_eq!(revalidations.len(), 2);

    let delete = mock
        .calls()
        .into_iter()
        .find(|req| req.method == Method::Delete)
        .expect("delete request");
    assert!(delete.url.ends_with("user/maimai/player"));
}

#[test]
fn retryable_action_reruns_the_same_write() {
    let attempts = Cell::new(0);
    let mut action = RetryableAction::new("save alias", || {
        attempts.set(attempts.get() + 1);
        if attempts.get() < 2 {
            Err(ApiError::Transport("timeout".to_string()))
        } else {
            Ok(attempts.get())
        }
    });

    assert!(action.run().is_err());
    assert!(action.can_retry());
    assert_eq!(
        action.last_error().map(ApiError::user_message),
        Some("Could not reach the server. Please check your connection.")
    );

    assert_eq!(action.retry().expect("second try"), 2);
    assert!(!action.can_retry());
    assert_eq!(action.attempts(), 2);
    assert_eq!(action.label(), "save alias");
}

#[test]
fn validation_failures_are_not_offered_for_retry() {
    let mock = MockTransport::new();
    let client = client(&mock);
    let mut action = RetryableAction::new("create alias", || {
        client.create_alias(Game::Maimai, 1, "")
    });
    assert!(action.run().is_err());
    assert!(!action.can_retry());
}
